// stepviz - Step-by-step Program State Tracer
// Copyright (C) 2024 Zhuo Zhang and Wuqi Zhang
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Test utilities for integration tests

use std::sync::{Arc, Mutex};

/// Initialization utilities for tests
pub mod init {
    /// Initialize logging for a test
    pub fn init_test_environment() {
        stepviz_common::logging::ensure_test_logging(None);
    }
}

/// Logging and error capture utilities for tests
pub mod logging {
    use super::*;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    /// A custom tracing layer that captures error logs
    #[derive(Clone, Default)]
    pub struct ErrorCapture {
        errors: Arc<Mutex<Vec<String>>>,
    }

    impl ErrorCapture {
        /// Create a new ErrorCapture instance
        pub fn new() -> Self {
            Self::default()
        }

        /// Retrieve captured error messages
        pub fn get_errors(&self) -> Vec<String> {
            self.errors.lock().map(|errors| errors.clone()).unwrap_or_default()
        }

        /// Check if any errors were captured
        pub fn has_errors(&self) -> bool {
            !self.get_errors().is_empty()
        }
    }

    impl<S> tracing_subscriber::Layer<S> for ErrorCapture
    where
        S: tracing::Subscriber,
    {
        fn on_event(
            &self,
            event: &tracing::Event<'_>,
            _ctx: tracing_subscriber::layer::Context<'_, S>,
        ) {
            if event.metadata().level() != &Level::ERROR {
                return;
            }

            struct MessageVisitor {
                message: String,
            }

            impl tracing::field::Visit for MessageVisitor {
                fn record_debug(
                    &mut self,
                    field: &tracing::field::Field,
                    value: &dyn std::fmt::Debug,
                ) {
                    if field.name() == "message" {
                        self.message = format!("{value:?}");
                    }
                }

                fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
                    if field.name() == "message" {
                        self.message = value.to_string();
                    }
                }
            }

            let mut visitor = MessageVisitor { message: String::new() };
            event.record(&mut visitor);

            if !visitor.message.is_empty() {
                if let Ok(mut errors) = self.errors.lock() {
                    errors.push(visitor.message);
                }
            }
        }
    }

    /// Run `f` with error capture on the current thread
    ///
    /// The capture is scoped to the calling thread, so tests running in
    /// parallel never see each other's errors.
    pub fn with_error_capture<T>(f: impl FnOnce() -> T) -> (T, Vec<String>) {
        let error_capture = ErrorCapture::new();
        let subscriber = tracing_subscriber::registry()
            .with(error_capture.clone())
            .with(tracing_subscriber::fmt::layer().with_test_writer())
            .with(tracing_subscriber::EnvFilter::new("stepviz_engine=debug,stepviz_common=debug"));

        let result = tracing::subscriber::with_default(subscriber, f);
        (result, error_capture.get_errors())
    }
}

/// Scripted target programs
///
/// Each scenario scripts the events a small program raises when it is traced,
/// with the frames and heap the runtime would report at each of them.
pub mod programs {
    use stepviz_common::{
        test_utils::{temp_artifact, ScriptedBatch, ScriptedFrame, ScriptedObject, ScriptedVm},
        types::{Event, Location, ObjectId, Primitive, RawValue, ThreadInfo},
        Artifact,
    };
    use tempfile::TempDir;

    /// Main type of every scenario program
    pub const MAIN_TYPE: &str = "Hello";

    /// A traceable program
    pub struct Scenario {
        /// Scripted target
        pub vm: ScriptedVm,
        /// Launchable artifact
        pub artifact: Artifact,
        /// Keeps the artifact location alive
        pub dir: TempDir,
    }

    /// The entry thread
    pub fn main_thread() -> ThreadInfo {
        ThreadInfo::new(1, "main")
    }

    fn threads_at_launch() -> Vec<ThreadInfo> {
        vec![
            main_thread(),
            ThreadInfo::new(2, "Reference Handler"),
            ThreadInfo::new(3, "Finalizer"),
            ThreadInfo::new(4, "Signal Dispatcher"),
        ]
    }

    fn scenario(program_types: &[&str], vm: ScriptedVm) -> Scenario {
        let (dir, artifact) = temp_artifact(MAIN_TYPE, program_types)
            .unwrap_or_else(|e| panic!("temp artifact: {e}"));
        Scenario { vm, artifact, dir }
    }

    fn location(method: &str, line: i32) -> Location {
        Location::new(MAIN_TYPE, method, line)
    }

    fn main_frame(line: i32, variables: &[(&str, RawValue)]) -> ScriptedFrame {
        ScriptedFrame::new(location("main", line), variables.iter().copied())
    }

    fn entry(line: i32) -> Event {
        Event::MethodEntry { thread: main_thread(), location: location("main", line) }
    }

    fn exit(line: i32) -> Event {
        Event::MethodExit { thread: main_thread(), location: location("main", line) }
    }

    fn step(line: i32) -> Event {
        Event::Step { thread: main_thread(), location: location("main", line) }
    }

    /// A batch raising `event` on the entry thread with a single `main` frame
    fn at(event: Event, line: i32, variables: &[(&str, RawValue)]) -> ScriptedBatch {
        ScriptedBatch::new([event]).with_frames(main_thread().id, [main_frame(line, variables)])
    }

    fn program_end(vm: &mut ScriptedVm) {
        vm.push_batch(ScriptedBatch::new([
            Event::ThreadStart { thread: ThreadInfo::new(20, "DestroyJavaVM") },
            Event::ThreadDeath { thread: main_thread() },
        ]));
        vm.push_batch(ScriptedBatch::new([Event::VmDeath]));
    }

    /// ```java
    /// 1 public class Hello {
    /// 2     public static void main(String[] args) {
    /// 3         int x = 1;
    /// 4         long big = 9007199254740993L;
    /// 5         String s = "hi";
    /// 6         System.out.println(s);
    /// 7     }
    /// 8 }
    /// ```
    pub fn simple_locals() -> Scenario {
        let mut vm = ScriptedVm::new(threads_at_launch());
        let args: RawValue = vm.alloc(ScriptedObject::array("java.lang.String[]", [])).into();
        let x = RawValue::from(Primitive::Int(1));
        let big = RawValue::from(Primitive::Long(9_007_199_254_740_993));
        let s = vm.alloc_string("hi");

        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.push_batch(at(entry(3), 3, &[("args", args)]));
        vm.push_batch(at(step(3), 3, &[("args", args)]));
        vm.push_batch(at(step(4), 4, &[("args", args), ("x", x)]));
        vm.push_batch(at(step(5), 5, &[("args", args), ("x", x), ("big", big)]));
        vm.push_batch(at(step(6), 6, &[("args", args), ("x", x), ("big", big), ("s", s)]));
        vm.push_batch(
            at(step(7), 7, &[("args", args), ("x", x), ("big", big), ("s", s)]).with_stdout("hi\n"),
        );
        vm.push_batch(at(exit(7), 7, &[("args", args), ("x", x), ("big", big), ("s", s)]));
        program_end(&mut vm);

        scenario(&[MAIN_TYPE], vm)
    }

    /// ```java
    /// 3 Thread t = new Thread(() -> System.out.println("worker"));
    /// 4 t.start();
    /// 5 int y = 2;
    /// 6 }
    /// ```
    pub fn spawned_thread() -> Scenario {
        let worker = ThreadInfo::new(10, "Thread-0");
        let mut vm = ScriptedVm::new(threads_at_launch());
        let t = vm.alloc(ScriptedObject::instance("java.lang.Thread", [("name", RawValue::Null)]));
        let t = RawValue::from(t);

        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.push_batch(at(entry(3), 3, &[]));
        vm.push_batch(at(step(3), 3, &[]));
        vm.push_batch(at(step(4), 4, &[("t", t)]));
        vm.push_batch(ScriptedBatch::new([Event::ThreadStart { thread: worker.clone() }]));
        vm.push_batch(
            ScriptedBatch::new([Event::Step {
                thread: worker.clone(),
                location: location("lambda$main$0", 3),
            }])
            .with_frames(
                worker.id,
                [ScriptedFrame::new(
                    location("lambda$main$0", 3),
                    Vec::<(String, RawValue)>::new(),
                )],
            ),
        );
        vm.push_batch(ScriptedBatch::new([Event::ThreadDeath { thread: worker }]));
        vm.push_batch(at(step(5), 5, &[("t", t)]));
        vm.push_batch(at(exit(6), 6, &[("t", t), ("y", Primitive::Int(2).into())]));
        program_end(&mut vm);

        scenario(&[MAIN_TYPE], vm)
    }

    /// ```java
    /// 3 int d = 0;
    /// 4 int q = 10 / d;
    /// ```
    pub fn uncaught_exception() -> Scenario {
        let mut vm = ScriptedVm::new(threads_at_launch());
        let message = vm.alloc_string("/ by zero");
        let exception =
            vm.alloc(ScriptedObject::throwable("java.lang.ArithmeticException", message));
        let d = RawValue::from(Primitive::Int(0));

        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.push_batch(at(entry(3), 3, &[]));
        vm.push_batch(at(step(3), 3, &[]));
        vm.push_batch(at(step(4), 4, &[("d", d)]));
        vm.push_batch(at(
            Event::Exception {
                thread: main_thread(),
                location: location("main", 4),
                exception,
                exception_type: "java.lang.ArithmeticException".into(),
                catch_location: None,
            },
            4,
            &[("d", d)],
        ));
        vm.push_batch(
            ScriptedBatch::new([Event::ThreadDeath { thread: main_thread() }]).with_stderr(
                "Exception in thread \"main\" java.lang.ArithmeticException: / by zero\n",
            ),
        );
        vm.push_batch(ScriptedBatch::new([Event::VmDeath]));

        scenario(&[MAIN_TYPE], vm)
    }

    /// Identities of the two nodes of [`cyclic_graph`]
    pub struct CycleIds {
        /// First node
        pub a: ObjectId,
        /// Second node
        pub b: ObjectId,
    }

    /// ```java
    /// 5 Node a = new Node(1);
    /// 6 Node b = new Node(2);
    /// 7 a.next = b; b.next = a;
    /// 8 }
    /// ```
    pub fn cyclic_graph() -> (Scenario, CycleIds) {
        let mut vm = ScriptedVm::new(threads_at_launch());
        let a = vm.alloc(ScriptedObject::instance("Node", Vec::<(String, RawValue)>::new()));
        let b = vm.alloc(ScriptedObject::instance(
            "Node",
            [("next", RawValue::from(a)), ("value", Primitive::Int(2).into())],
        ));
        vm.set_fields(a, [("next", RawValue::from(b)), ("value", Primitive::Int(1).into())]);
        let vars = [("a", RawValue::from(a)), ("b", RawValue::from(b))];

        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.push_batch(at(step(8), 8, &vars));
        vm.push_batch(at(exit(8), 8, &vars));
        program_end(&mut vm);

        (scenario(&[MAIN_TYPE, "Node"], vm), CycleIds { a, b })
    }

    /// A single step with one local of every container shape
    ///
    /// With `broken_to_array`, every `toArray` call fails in the target.
    pub fn collections(broken_to_array: bool) -> Scenario {
        let mut vm = ScriptedVm::new(threads_at_launch());
        if broken_to_array {
            vm.fail_method("toArray");
        }

        let two = vm.alloc_string("two");
        let list = vm.alloc(ScriptedObject::array_list([
            RawValue::from(Primitive::Int(1)),
            two,
            RawValue::Null,
        ]));
        let five = vm.alloc(ScriptedObject::boxed(Primitive::Int(5)));
        let key = vm.alloc_string("k");
        let map = vm.alloc(ScriptedObject::hash_map([(key, RawValue::from(five))]));
        let set = vm.alloc(ScriptedObject::hash_set([RawValue::from(Primitive::Char('c'))]));
        let linked = vm.alloc(ScriptedObject::linked_list([RawValue::from(list)]));
        let arr = vm.alloc(ScriptedObject::array(
            "int[]",
            [Primitive::Int(1), Primitive::Int(2)].map(RawValue::from),
        ));
        let huge = vm.alloc(ScriptedObject::boxed(Primitive::Long(i64::MAX)));
        let vars = [
            ("list", RawValue::from(list)),
            ("map", RawValue::from(map)),
            ("set", RawValue::from(set)),
            ("linked", RawValue::from(linked)),
            ("arr", RawValue::from(arr)),
            ("huge", RawValue::from(huge)),
            ("ratio", RawValue::from(Primitive::Double(f64::NAN))),
        ];

        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.push_batch(at(step(10), 10, &vars));
        vm.push_batch(at(exit(10), 10, &vars));
        program_end(&mut vm);

        scenario(&[MAIN_TYPE], vm)
    }
}

/// Trace session drivers
pub mod driver {
    use std::thread;

    use stepviz_common::{
        test_utils::{ScriptedConnector, StaticArtifactProducer, VmJournal},
        types::{Command, Snapshot, ThrowInfo, TraceResult},
    };
    use stepviz_engine::{channel, TraceError, Tracer, TracerConfig};

    use super::{logging, programs::Scenario};

    /// Everything observed during one trace session
    pub struct TraceRun {
        /// Results in the order the consumer received them
        pub results: Vec<TraceResult>,
        /// What the tracer returned
        pub outcome: Result<usize, TraceError>,
        /// Errors logged by the tracer
        pub errors: Vec<String>,
        /// What the tracer asked of the target
        pub journal: VmJournal,
    }

    impl TraceRun {
        /// Published snapshots with what the traced thread threw
        pub fn snapshots(&self) -> Vec<(&Snapshot, Option<&ThrowInfo>)> {
            self.results
                .iter()
                .filter_map(|result| match result {
                    TraceResult::Snapshot { snapshot, threw } => Some((snapshot, threw.as_ref())),
                    _ => None,
                })
                .collect()
        }

        /// Captured program output, concatenated
        pub fn output(&self) -> String {
            self.results
                .iter()
                .filter_map(|result| match result {
                    TraceResult::Output { text } => Some(text.as_str()),
                    _ => None,
                })
                .collect()
        }

        /// Number of `error` results
        pub fn error_results(&self) -> usize {
            self.results.iter().filter(|r| matches!(r, TraceResult::Error { .. })).count()
        }
    }

    /// Trace `scenario`, advancing after every snapshot
    pub fn run_to_end(scenario: Scenario) -> TraceRun {
        run_with(scenario, TracerConfig::default(), |_| Command::Advance.to_string())
    }

    /// Trace `scenario`, answering the `n`th snapshot (one-based) with `respond(n)`
    ///
    /// The tracer runs on the calling thread with error capture; the consumer
    /// runs on a separate thread and sends the initial `advance` itself.
    pub fn run_with(
        scenario: Scenario,
        config: TracerConfig,
        mut respond: impl FnMut(usize) -> String + Send + 'static,
    ) -> TraceRun {
        let Scenario { vm, artifact, dir } = scenario;
        let connector = ScriptedConnector::new(vm);
        let journal = connector.journal();
        let (endpoint, mut client) = channel(config.channel_capacity);

        let consumer = thread::spawn(move || {
            let mut results = Vec::new();
            if client.blocking_send(Command::Advance).is_err() {
                return results;
            }
            let mut snapshots = 0;
            while let Some(result) = client.blocking_recv() {
                if matches!(result, TraceResult::Snapshot { .. }) {
                    snapshots += 1;
                    // the tracer may already be gone after a terminate
                    let _ = client.blocking_send_line(respond(snapshots));
                }
                let terminal = result.is_terminal();
                results.push(result);
                if terminal {
                    break;
                }
            }
            results
        });

        let producer = StaticArtifactProducer::new(artifact);
        let tracer = Tracer::new(connector, producer, config, endpoint);
        let (outcome, errors) = logging::with_error_capture(|| tracer.run());
        let results = consumer.join().unwrap_or_default();
        drop(dir);

        let journal = journal.lock().clone();
        TraceRun { results, outcome, errors, journal }
    }
}
