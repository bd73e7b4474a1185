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

//! Session control.
//!
//! A [`SessionController`] owns the target process and its debug connection.
//! It launches the target suspended at entry, subscribes to the events of the
//! program's own types on the entry thread, and then runs the
//! suspend/resume/dispatch loop, handing every event to an [`EventHandler`].
//!
//! # Thread admission
//!
//! Only the threads alive at attach time plus the configured housekeeping
//! threads may run. Any other thread is interrupted as soon as it starts, so a
//! trace always follows a single thread.
//!
//! # Termination
//!
//! The loop ends when the handler returns [`Flow::Stop`] (the target is asked
//! to exit) or when the debug connection goes away. A disconnect is the normal
//! way for a traced program to end and is never reported as an error.

use std::collections::HashSet;

use stepviz_common::{
    types::{
        Event, EventRequest, RequestKind, StepDepth, StepSize, SuspendPolicy, ThreadId, ThreadInfo,
    },
    Artifact, Connector, LaunchRequest, OutputStream, VirtualMachine, VmError,
};
use tracing::{debug, info, warn};

use crate::{
    config::TracerConfig,
    errors::{Result, TraceError},
};

/// What the session does after an event was handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    /// Keep running the target
    Continue,
    /// Ask the target to exit and end the session
    Stop,
}

/// Receives what a running session observes
pub trait EventHandler<V: VirtualMachine> {
    /// Text the target wrote to stdout or stderr
    fn on_output(&mut self, text: String) -> Result<()>;

    /// An event raised by the target, delivered while its thread is suspended
    fn on_event(&mut self, vm: &mut V, event: &Event) -> Result<Flow>;
}

struct Session<V> {
    vm: V,
    entry_thread: ThreadInfo,
    admitted: HashSet<String>,
}

enum State<V> {
    Idle,
    Attached(Session<V>),
    Finished,
}

/// Owns one target process for the lifetime of a trace
pub struct SessionController<C: Connector> {
    connector: C,
    config: TracerConfig,
    state: State<C::Vm>,
}

impl<C: Connector> SessionController<C> {
    /// Create a controller launching targets through `connector`
    pub fn new(connector: C, config: TracerConfig) -> Self {
        Self { connector, config, state: State::Idle }
    }

    /// Whether a target is attached and not yet run
    pub fn is_attached(&self) -> bool {
        matches!(self.state, State::Attached(_))
    }

    /// The thread being traced, once attached
    pub fn entry_thread(&self) -> Option<&ThreadInfo> {
        match &self.state {
            State::Attached(session) => Some(&session.entry_thread),
            _ => None,
        }
    }

    /// Launch the artifact suspended at entry and subscribe to its events
    pub fn attach(&mut self, artifact: &Artifact) -> Result<()> {
        if !matches!(self.state, State::Idle) {
            return Err(TraceError::InvalidState("a target was already attached".into()));
        }
        if !artifact.is_ready() {
            return Err(TraceError::InvalidState(format!(
                "artifact is not ready: {}",
                artifact.location.display()
            )));
        }

        let request = LaunchRequest {
            main_type: artifact.main_type.clone(),
            class_path: artifact.location.clone(),
            options: self.config.launch_options.clone(),
            suspend: true,
        };
        info!("Launching {} from {}", request.main_type, request.class_path.display());
        let mut vm = self.connector.launch(&request).map_err(TraceError::LaunchFailure)?;

        let threads = vm.all_threads().map_err(TraceError::LaunchFailure)?;
        let entry_thread = threads
            .iter()
            .find(|thread| thread.name == self.config.entry_thread)
            .cloned()
            .ok_or_else(|| {
                TraceError::LaunchFailure(VmError::Launch(format!(
                    "entry thread {:?} not found",
                    self.config.entry_thread
                )))
            })?;

        let admitted: HashSet<String> = threads
            .into_iter()
            .map(|thread| thread.name)
            .chain(self.config.housekeeping_threads.iter().cloned())
            .collect();
        debug!("Admitted threads: {admitted:?}");

        subscribe(&mut vm, entry_thread.id, &artifact.program_types)
            .map_err(TraceError::LaunchFailure)?;

        info!(
            "Attached to {} on thread {:?} ({} program types)",
            artifact.main_type,
            entry_thread.name,
            artifact.program_types.len()
        );
        self.state = State::Attached(Session { vm, entry_thread, admitted });
        Ok(())
    }

    /// Drive the attached target until it ends or the handler stops it
    pub fn run<H: EventHandler<C::Vm>>(&mut self, handler: &mut H) -> Result<()> {
        let mut session = match std::mem::replace(&mut self.state, State::Finished) {
            State::Attached(session) => session,
            State::Idle => {
                return Err(TraceError::InvalidState("no target attached".into()));
            }
            State::Finished => {
                return Err(TraceError::InvalidState("the session already ran".into()));
            }
        };

        match session.event_loop(handler, self.config.exit_code) {
            Err(err) if err.is_disconnect() => {
                info!("Target disconnected");
                Ok(())
            }
            other => other,
        }
    }
}

impl<V: VirtualMachine> Session<V> {
    fn event_loop<H: EventHandler<V>>(&mut self, handler: &mut H, exit_code: i32) -> Result<()> {
        loop {
            self.vm.resume()?;
            let events = self.vm.next_event_set()?;

            for event in events {
                if let Event::ThreadStart { thread } = &event {
                    self.admit(thread)?;
                }

                self.forward_output(handler)?;

                if handler.on_event(&mut self.vm, &event)? == Flow::Stop {
                    info!("Stopping the target with exit code {exit_code}");
                    self.vm.exit(exit_code)?;
                    return Ok(());
                }
            }
        }
    }

    fn admit(&mut self, thread: &ThreadInfo) -> Result<()> {
        if self.admitted.contains(&thread.name) {
            debug!("Thread {:?} admitted", thread.name);
            return Ok(());
        }
        debug!("Interrupting thread {:?}", thread.name);
        match self.vm.interrupt(thread.id) {
            Err(VmError::UnknownThread(id)) => {
                warn!("Thread {id} ended before it could be interrupted");
                Ok(())
            }
            other => Ok(other?),
        }
    }

    fn forward_output<H: EventHandler<V>>(&mut self, handler: &mut H) -> Result<()> {
        for stream in [OutputStream::Stdout, OutputStream::Stderr] {
            let bytes = self.vm.read_available(stream)?;
            if !bytes.is_empty() {
                handler.on_output(String::from_utf8_lossy(&bytes).into_owned())?;
            }
        }
        Ok(())
    }
}

/// Enable every request a trace needs
fn subscribe<V: VirtualMachine>(
    vm: &mut V,
    entry_thread: ThreadId,
    program_types: &[String],
) -> Result<(), VmError> {
    vm.enable_request(EventRequest::new(RequestKind::VmDeath).with_suspend(SuspendPolicy::All))?;
    vm.enable_request(EventRequest::new(RequestKind::ThreadStart))?;
    vm.enable_request(
        EventRequest::new(RequestKind::ThreadDeath).with_suspend(SuspendPolicy::None),
    )?;

    let step = RequestKind::Step { size: StepSize::Min, depth: StepDepth::Into };
    let exception = RequestKind::Exception { caught: true, uncaught: true };
    for kind in [RequestKind::MethodEntry, RequestKind::MethodExit, step, exception] {
        for program_type in program_types {
            vm.enable_request(
                EventRequest::new(kind)
                    .with_thread(entry_thread)
                    .with_class_filter(program_type.as_str()),
            )?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepviz_common::{
        test_utils::{temp_artifact, ScriptedBatch, ScriptedConnector, ScriptedFrame, ScriptedVm},
        types::{Location, RawValue},
    };

    #[derive(Default)]
    struct Recorder {
        output: Vec<String>,
        events: Vec<&'static str>,
        stop_after: Option<usize>,
        fail_with: Option<VmError>,
    }

    impl<V: VirtualMachine> EventHandler<V> for Recorder {
        fn on_output(&mut self, text: String) -> Result<()> {
            self.output.push(text);
            Ok(())
        }

        fn on_event(&mut self, _vm: &mut V, event: &Event) -> Result<Flow> {
            self.events.push(event.name());
            if let Some(err) = self.fail_with.take() {
                return Err(err.into());
            }
            match self.stop_after {
                Some(n) if self.events.len() >= n => Ok(Flow::Stop),
                _ => Ok(Flow::Continue),
            }
        }
    }

    fn main_thread() -> ThreadInfo {
        ThreadInfo::new(1, "main")
    }

    fn initial_threads() -> Vec<ThreadInfo> {
        vec![main_thread(), ThreadInfo::new(9, "Reference Handler")]
    }

    fn step(line: i32) -> Event {
        Event::Step { thread: main_thread(), location: Location::new("Hello", "main", line) }
    }

    fn frame(line: i32) -> ScriptedFrame {
        ScriptedFrame::new(Location::new("Hello", "main", line), Vec::<(String, RawValue)>::new())
    }

    #[test]
    fn test_attach_subscribes_per_program_type() {
        let (_dir, artifact) = temp_artifact("Hello", &["Hello", "Node"]).unwrap();
        let connector = ScriptedConnector::new(ScriptedVm::new(initial_threads()));
        let journal = connector.journal();
        let mut controller = SessionController::new(connector, TracerConfig::default());

        controller.attach(&artifact).unwrap();
        assert!(controller.is_attached());
        assert_eq!(controller.entry_thread(), Some(&main_thread()));

        let journal = journal.lock();
        assert_eq!(journal.launches.len(), 1);
        assert!(journal.launches[0].suspend);
        assert_eq!(journal.launches[0].main_type, "Hello");

        // death + thread start + thread death, then four families per type
        assert_eq!(journal.requests.len(), 3 + 4 * 2);
        let scoped: Vec<_> = journal.requests.iter().skip(3).collect();
        assert!(scoped.iter().all(|r| r.thread == Some(ThreadId(1))));
        assert!(scoped.iter().any(|r| r.class_filter.as_deref() == Some("Node")));
        assert!(journal
            .requests
            .iter()
            .any(|r| r.kind == RequestKind::ThreadDeath && r.suspend == SuspendPolicy::None));
    }

    #[test]
    fn test_attach_rejects_reuse_and_unready_artifacts() {
        let (dir, artifact) = temp_artifact("Hello", &["Hello"]).unwrap();
        let connector = ScriptedConnector::new(ScriptedVm::new(initial_threads()));
        let mut controller = SessionController::new(connector, TracerConfig::default());

        controller.attach(&artifact).unwrap();
        assert!(matches!(controller.attach(&artifact), Err(TraceError::InvalidState(_))));

        drop(dir);
        let connector = ScriptedConnector::new(ScriptedVm::new(initial_threads()));
        let mut controller = SessionController::new(connector, TracerConfig::default());
        assert!(matches!(controller.attach(&artifact), Err(TraceError::InvalidState(_))));
    }

    #[test]
    fn test_run_before_attach() {
        let connector = ScriptedConnector::new(ScriptedVm::new(initial_threads()));
        let mut controller = SessionController::new(connector, TracerConfig::default());
        assert!(matches!(
            controller.run(&mut Recorder::default()),
            Err(TraceError::InvalidState(_))
        ));
    }

    #[test]
    fn test_launch_failures() {
        let (_dir, artifact) = temp_artifact("Hello", &["Hello"]).unwrap();

        let connector = ScriptedConnector::failing("no runtime");
        let mut controller = SessionController::new(connector, TracerConfig::default());
        assert!(matches!(
            controller.attach(&artifact),
            Err(TraceError::LaunchFailure(VmError::Launch(_)))
        ));

        let connector = ScriptedConnector::new(ScriptedVm::new(initial_threads()));
        let config = TracerConfig::default().with_entry_thread("runner");
        let mut controller = SessionController::new(connector, config);
        assert!(matches!(controller.attach(&artifact), Err(TraceError::LaunchFailure(_))));
    }

    #[test]
    fn test_run_until_disconnect() {
        let (_dir, artifact) = temp_artifact("Hello", &["Hello"]).unwrap();
        let mut vm = ScriptedVm::new(initial_threads());
        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.push_batch(
            ScriptedBatch::new([step(3)]).with_frames(ThreadId(1), [frame(3)]).with_stdout("hi\n"),
        );
        vm.push_batch(ScriptedBatch::new([step(4)]).with_stderr("warn\n"));
        let connector = ScriptedConnector::new(vm);
        let journal = connector.journal();

        let mut controller = SessionController::new(connector, TracerConfig::default());
        controller.attach(&artifact).unwrap();
        let mut recorder = Recorder::default();
        controller.run(&mut recorder).unwrap();

        assert_eq!(recorder.events, vec!["vm-start", "step", "step"]);
        assert_eq!(recorder.output, vec!["hi\n", "warn\n"]);
        assert_eq!(journal.lock().exit_code, None);
        assert!(matches!(controller.run(&mut recorder), Err(TraceError::InvalidState(_))));
    }

    #[test]
    fn test_stop_exits_and_abandons_batch() {
        let (_dir, artifact) = temp_artifact("Hello", &["Hello"]).unwrap();
        let mut vm = ScriptedVm::new(initial_threads());
        vm.push_batch(ScriptedBatch::new([step(3), step(4)]));
        let connector = ScriptedConnector::new(vm);
        let journal = connector.journal();

        let config = TracerConfig::default().with_exit_code(7);
        let mut controller = SessionController::new(connector, config);
        controller.attach(&artifact).unwrap();
        let mut recorder = Recorder { stop_after: Some(1), ..Default::default() };
        controller.run(&mut recorder).unwrap();

        assert_eq!(recorder.events, vec!["step"]);
        assert_eq!(journal.lock().exit_code, Some(7));
    }

    #[test]
    fn test_foreign_threads_are_interrupted() {
        let (_dir, artifact) = temp_artifact("Hello", &["Hello"]).unwrap();
        let worker = ThreadInfo::new(2, "Thread-0");
        let cleaner = ThreadInfo::new(3, "Common-Cleaner");
        let mut vm = ScriptedVm::new(initial_threads());
        vm.push_batch(ScriptedBatch::new([
            Event::ThreadStart { thread: cleaner.clone() },
            Event::ThreadStart { thread: worker.clone() },
        ]));
        vm.push_batch(ScriptedBatch::new([Event::Step {
            thread: worker.clone(),
            location: Location::new("Hello", "lambda$main$0", 5),
        }]));
        let connector = ScriptedConnector::new(vm);
        let journal = connector.journal();

        let mut controller = SessionController::new(connector, TracerConfig::default());
        controller.attach(&artifact).unwrap();
        let mut recorder = Recorder::default();
        controller.run(&mut recorder).unwrap();

        assert_eq!(journal.lock().interrupted, vec![worker.id]);
        assert_eq!(recorder.events, vec!["thread-start", "thread-start"]);
    }

    #[test]
    fn test_handler_errors_surface_except_disconnect() {
        let (_dir, artifact) = temp_artifact("Hello", &["Hello"]).unwrap();

        let run_with = |err: VmError| {
            let mut vm = ScriptedVm::new(initial_threads());
            vm.push_batch(ScriptedBatch::new([step(3)]));
            let mut controller =
                SessionController::new(ScriptedConnector::new(vm), TracerConfig::default());
            controller.attach(&artifact).unwrap();
            controller.run(&mut Recorder { fail_with: Some(err), ..Default::default() })
        };

        assert!(run_with(VmError::Disconnected).is_ok());
        assert!(matches!(
            run_with(VmError::InvalidFrame),
            Err(TraceError::Introspection(VmError::InvalidFrame))
        ));
    }
}
