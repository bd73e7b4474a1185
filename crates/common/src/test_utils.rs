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

//! Scripted in-memory debug backend for tests.
//!
//! [`ScriptedVm`] replays a fixed script of event batches. It behaves like a
//! real backend in the ways the trace engine depends on:
//!
//! - events are only delivered when an enabled request matches them
//!   (`VmStart` is always delivered);
//! - events of interrupted threads are dropped, except their `ThreadDeath`;
//! - every method invocation invalidates previously obtained frame handles;
//! - after `exit` or once the script runs out, every call reports
//!   [`VmError::Disconnected`].
//!
//! Everything the engine asks of the backend is recorded in a shared
//! [`VmJournal`] that tests inspect after the session is over.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    io,
    path::PathBuf,
    sync::Arc,
};

use parking_lot::Mutex;
use tempfile::TempDir;
use tracing::debug;

use crate::{
    artifact::{Artifact, ArtifactProducer},
    types::{
        Event, EventRequest, EventSet, FrameHandle, Location, MethodRef, ObjectId, Primitive,
        RawValue, ThreadId, ThreadInfo, TypeInfo,
    },
    vm::{Connector, LaunchRequest, OutputStream, VirtualMachine, VmError, VmResult},
};

const COLLECTION_ANCESTORS: &[&str] =
    &["java.util.Collection", "java.lang.Iterable", "java.lang.Object"];

/// Everything the engine asked of a scripted backend
#[derive(Debug, Default, Clone)]
pub struct VmJournal {
    /// Launch requests received by the connector
    pub launches: Vec<LaunchRequest>,
    /// Enabled event requests, in order
    pub requests: Vec<EventRequest>,
    /// Interrupted threads, in order
    pub interrupted: Vec<ThreadId>,
    /// Number of resumes
    pub resumes: usize,
    /// Exit code requested by the engine
    pub exit_code: Option<i32>,
    /// Invoked methods as `(receiver, method name)`
    pub invocations: Vec<(ObjectId, String)>,
    /// Frame accesses made with an invalidated handle
    pub stale_frame_accesses: usize,
}

/// Contents of a scripted object
#[derive(Debug, Clone, PartialEq)]
pub enum ObjectBody {
    /// A string
    Text(String),
    /// Array elements
    Array(Vec<RawValue>),
    /// Named fields in declaration order
    Fields(Vec<(String, RawValue)>),
    /// Collection elements, in iteration order
    Collection(Vec<RawValue>),
    /// Map entries as key/value pairs, in iteration order
    Map(Vec<(RawValue, RawValue)>),
    /// A single map entry
    Entry(RawValue, RawValue),
}

/// An object living in a [`ScriptedVm`]
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedObject {
    /// Runtime type
    pub type_info: TypeInfo,
    /// Contents
    pub body: ObjectBody,
}

impl ScriptedObject {
    /// A `java.lang.String`
    pub fn string(text: impl Into<String>) -> Self {
        Self {
            type_info: TypeInfo::class("java.lang.String")
                .with_ancestors(["java.lang.CharSequence", "java.lang.Object"]),
            body: ObjectBody::Text(text.into()),
        }
    }

    /// An array of type `type_name`, e.g. `int[]`
    pub fn array(type_name: &str, elements: impl IntoIterator<Item = RawValue>) -> Self {
        Self {
            type_info: TypeInfo::array(type_name),
            body: ObjectBody::Array(elements.into_iter().collect()),
        }
    }

    /// A `java.util.ArrayList`
    pub fn array_list(elements: impl IntoIterator<Item = RawValue>) -> Self {
        let ancestors = &["java.util.AbstractList", "java.util.List"];
        Self::collection("java.util.ArrayList", ancestors, elements)
    }

    /// A `java.util.LinkedList`
    pub fn linked_list(elements: impl IntoIterator<Item = RawValue>) -> Self {
        Self::collection(
            "java.util.LinkedList",
            &["java.util.AbstractSequentialList", "java.util.List", "java.util.Deque"],
            elements,
        )
    }

    /// A `java.util.HashSet`
    pub fn hash_set(elements: impl IntoIterator<Item = RawValue>) -> Self {
        Self::collection("java.util.HashSet", &["java.util.AbstractSet", "java.util.Set"], elements)
    }

    /// A collection of an arbitrary type
    pub fn collection(
        type_name: &str,
        ancestors: &[&str],
        elements: impl IntoIterator<Item = RawValue>,
    ) -> Self {
        Self {
            type_info: TypeInfo::class(type_name)
                .with_ancestors(ancestors.iter().chain(COLLECTION_ANCESTORS).copied()),
            body: ObjectBody::Collection(elements.into_iter().collect()),
        }
    }

    /// A `java.util.HashMap`
    pub fn hash_map(entries: impl IntoIterator<Item = (RawValue, RawValue)>) -> Self {
        Self {
            type_info: TypeInfo::class("java.util.HashMap").with_ancestors([
                "java.util.AbstractMap",
                "java.util.Map",
                "java.lang.Object",
            ]),
            body: ObjectBody::Map(entries.into_iter().collect()),
        }
    }

    /// The boxed form of a primitive, e.g. `java.lang.Integer`
    pub fn boxed(value: Primitive) -> Self {
        let type_name = match value {
            Primitive::Boolean(_) => "java.lang.Boolean",
            Primitive::Char(_) => "java.lang.Character",
            Primitive::Byte(_) => "java.lang.Byte",
            Primitive::Short(_) => "java.lang.Short",
            Primitive::Int(_) => "java.lang.Integer",
            Primitive::Long(_) => "java.lang.Long",
            Primitive::Float(_) => "java.lang.Float",
            Primitive::Double(_) => "java.lang.Double",
        };
        Self {
            type_info: TypeInfo::class(type_name)
                .with_ancestors(["java.lang.Number", "java.lang.Object"]),
            body: ObjectBody::Fields(vec![("value".to_string(), value.into())]),
        }
    }

    /// An instance of a plain class with the given fields
    pub fn instance<I, S>(type_name: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (S, RawValue)>,
        S: Into<String>,
    {
        Self {
            type_info: TypeInfo::class(type_name).with_ancestors(["java.lang.Object"]),
            body: ObjectBody::Fields(fields.into_iter().map(|(n, v)| (n.into(), v)).collect()),
        }
    }

    /// A throwable of type `type_name` with a detail message
    pub fn throwable(type_name: &str, message: RawValue) -> Self {
        Self {
            type_info: TypeInfo::class(type_name).with_ancestors([
                "java.lang.RuntimeException",
                "java.lang.Exception",
                "java.lang.Throwable",
                "java.lang.Object",
            ]),
            body: ObjectBody::Fields(vec![
                ("detailMessage".to_string(), message),
                ("cause".to_string(), RawValue::Null),
            ]),
        }
    }
}

/// A frame in a scripted batch
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedFrame {
    /// Frame location
    pub location: Location,
    /// Visible variables
    pub variables: Vec<(String, RawValue)>,
}

impl ScriptedFrame {
    /// Create a frame
    pub fn new<I, S>(location: Location, variables: I) -> Self
    where
        I: IntoIterator<Item = (S, RawValue)>,
        S: Into<String>,
    {
        Self { location, variables: variables.into_iter().map(|(n, v)| (n.into(), v)).collect() }
    }
}

/// One batch of the script with the state threads are in when it is delivered
#[derive(Debug, Clone, Default)]
pub struct ScriptedBatch {
    /// Raised events, before request filtering
    pub events: Vec<Event>,
    /// Frames per thread, innermost first
    pub frames: HashMap<ThreadId, Vec<ScriptedFrame>>,
    /// Bytes the target writes to stdout before this batch
    pub stdout: Vec<u8>,
    /// Bytes the target writes to stderr before this batch
    pub stderr: Vec<u8>,
}

impl ScriptedBatch {
    /// A batch raising `events`
    pub fn new(events: impl IntoIterator<Item = Event>) -> Self {
        Self { events: events.into_iter().collect(), ..Default::default() }
    }

    /// Set the frames of `thread`, innermost first
    pub fn with_frames(
        mut self,
        thread: impl Into<ThreadId>,
        frames: impl IntoIterator<Item = ScriptedFrame>,
    ) -> Self {
        self.frames.insert(thread.into(), frames.into_iter().collect());
        self
    }

    /// Output written to stdout before this batch
    pub fn with_stdout(mut self, text: &str) -> Self {
        self.stdout.extend_from_slice(text.as_bytes());
        self
    }

    /// Output written to stderr before this batch
    pub fn with_stderr(mut self, text: &str) -> Self {
        self.stderr.extend_from_slice(text.as_bytes());
        self
    }
}

/// In-memory [`VirtualMachine`] replaying a script
#[derive(Debug)]
pub struct ScriptedVm {
    threads: Vec<ThreadInfo>,
    objects: BTreeMap<ObjectId, ScriptedObject>,
    next_object: u64,
    script: VecDeque<ScriptedBatch>,
    frames: HashMap<ThreadId, Vec<ScriptedFrame>>,
    epoch: u64,
    requests: Vec<EventRequest>,
    interrupted: HashSet<ThreadId>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    failing_methods: HashSet<String>,
    exited: bool,
    journal: Arc<Mutex<VmJournal>>,
}

impl ScriptedVm {
    /// A backend whose live threads at launch are `threads`
    pub fn new(threads: impl IntoIterator<Item = ThreadInfo>) -> Self {
        Self {
            threads: threads.into_iter().collect(),
            objects: BTreeMap::new(),
            next_object: 1,
            script: VecDeque::new(),
            frames: HashMap::new(),
            epoch: 0,
            requests: Vec::new(),
            interrupted: HashSet::new(),
            stdout: Vec::new(),
            stderr: Vec::new(),
            failing_methods: HashSet::new(),
            exited: false,
            journal: Arc::new(Mutex::new(VmJournal::default())),
        }
    }

    /// Shared journal of this backend
    pub fn journal(&self) -> Arc<Mutex<VmJournal>> {
        self.journal.clone()
    }

    /// Add an object and return its identity
    pub fn alloc(&mut self, object: ScriptedObject) -> ObjectId {
        let id = ObjectId(self.next_object);
        self.next_object += 1;
        self.objects.insert(id, object);
        id
    }

    /// Add a string object and return a reference to it
    pub fn alloc_string(&mut self, text: &str) -> RawValue {
        self.alloc(ScriptedObject::string(text)).into()
    }

    /// Replace the fields of an existing object, e.g. to close a cycle
    pub fn set_fields<I, S>(&mut self, object: ObjectId, fields: I)
    where
        I: IntoIterator<Item = (S, RawValue)>,
        S: Into<String>,
    {
        if let Some(entry) = self.objects.get_mut(&object) {
            let fields = fields.into_iter().map(|(n, v)| (n.into(), v)).collect();
            entry.body = ObjectBody::Fields(fields);
        }
    }

    /// Make every invocation of `method` fail
    pub fn fail_method(&mut self, method: &str) {
        self.failing_methods.insert(method.to_string());
    }

    /// Append a batch to the script
    pub fn push_batch(&mut self, batch: ScriptedBatch) {
        self.script.push_back(batch);
    }

    fn ensure_connected(&self) -> VmResult<()> {
        if self.exited {
            Err(VmError::Disconnected)
        } else {
            Ok(())
        }
    }

    fn object(&self, id: ObjectId) -> VmResult<&ScriptedObject> {
        self.objects.get(&id).ok_or(VmError::InvalidObject(id))
    }

    fn frame(&self, handle: &FrameHandle) -> VmResult<&ScriptedFrame> {
        self.ensure_connected()?;
        if handle.epoch != self.epoch {
            self.journal.lock().stale_frame_accesses += 1;
            return Err(VmError::InvalidFrame);
        }
        self.frames
            .get(&handle.thread)
            .and_then(|frames| frames.get(handle.depth))
            .ok_or(VmError::InvalidFrame)
    }

    fn is_deliverable(&self, event: &Event) -> bool {
        if matches!(event, Event::VmStart) {
            return true;
        }
        if let Some(thread) = event.thread() {
            let is_death = matches!(event, Event::ThreadDeath { .. });
            if self.interrupted.contains(&thread.id) && !is_death {
                return false;
            }
        }
        self.requests.iter().any(|request| request.matches(event))
    }

    fn track_threads(&mut self, event: &Event) {
        match event {
            Event::ThreadStart { thread } if !self.threads.iter().any(|t| t.id == thread.id) => {
                self.threads.push(thread.clone());
            }
            Event::ThreadDeath { thread } => self.threads.retain(|t| t.id != thread.id),
            _ => {}
        }
    }

    fn invocation_error(method: MethodRef, reason: &str) -> VmError {
        VmError::Invocation { method: method.to_string(), reason: reason.to_string() }
    }
}

impl VirtualMachine for ScriptedVm {
    fn all_threads(&self) -> VmResult<Vec<ThreadInfo>> {
        self.ensure_connected()?;
        Ok(self.threads.clone())
    }

    fn enable_request(&mut self, request: EventRequest) -> VmResult<()> {
        self.ensure_connected()?;
        self.journal.lock().requests.push(request.clone());
        self.requests.push(request);
        Ok(())
    }

    fn resume(&mut self) -> VmResult<()> {
        self.ensure_connected()?;
        self.journal.lock().resumes += 1;
        Ok(())
    }

    fn next_event_set(&mut self) -> VmResult<EventSet> {
        loop {
            self.ensure_connected()?;
            let Some(batch) = self.script.pop_front() else {
                self.exited = true;
                return Err(VmError::Disconnected);
            };

            self.epoch += 1;
            self.frames = batch.frames;
            self.stdout.extend(batch.stdout);
            self.stderr.extend(batch.stderr);

            let mut delivered = EventSet::default();
            for event in batch.events {
                self.track_threads(&event);
                if self.is_deliverable(&event) {
                    delivered.push(event);
                } else {
                    debug!("scripted backend dropped {} event", event.name());
                }
            }
            if !delivered.is_empty() {
                return Ok(delivered);
            }
        }
    }

    fn interrupt(&mut self, thread: ThreadId) -> VmResult<()> {
        self.ensure_connected()?;
        if !self.threads.iter().any(|t| t.id == thread) {
            return Err(VmError::UnknownThread(thread));
        }
        self.interrupted.insert(thread);
        self.journal.lock().interrupted.push(thread);
        Ok(())
    }

    fn exit(&mut self, code: i32) -> VmResult<()> {
        self.ensure_connected()?;
        self.exited = true;
        self.journal.lock().exit_code = Some(code);
        Ok(())
    }

    fn read_available(&mut self, stream: OutputStream) -> io::Result<Vec<u8>> {
        let buffer = match stream {
            OutputStream::Stdout => &mut self.stdout,
            OutputStream::Stderr => &mut self.stderr,
        };
        Ok(std::mem::take(buffer))
    }

    fn frames(&self, thread: ThreadId) -> VmResult<Vec<FrameHandle>> {
        self.ensure_connected()?;
        let count = match self.frames.get(&thread) {
            Some(frames) => frames.len(),
            None if self.threads.iter().any(|t| t.id == thread) => 0,
            None => return Err(VmError::UnknownThread(thread)),
        };
        Ok((0..count).map(|depth| FrameHandle { thread, depth, epoch: self.epoch }).collect())
    }

    fn frame_location(&self, frame: &FrameHandle) -> VmResult<Location> {
        Ok(self.frame(frame)?.location.clone())
    }

    fn visible_variables(&self, frame: &FrameHandle) -> VmResult<Vec<(String, RawValue)>> {
        Ok(self.frame(frame)?.variables.clone())
    }

    fn type_of(&self, object: ObjectId) -> VmResult<TypeInfo> {
        self.ensure_connected()?;
        Ok(self.object(object)?.type_info.clone())
    }

    fn string_value(&self, object: ObjectId) -> VmResult<String> {
        self.ensure_connected()?;
        match &self.object(object)?.body {
            ObjectBody::Text(text) => Ok(text.clone()),
            _ => Err(VmError::InvalidObject(object)),
        }
    }

    fn array_values(&self, object: ObjectId) -> VmResult<Vec<RawValue>> {
        self.ensure_connected()?;
        match &self.object(object)?.body {
            ObjectBody::Array(elements) => Ok(elements.clone()),
            _ => Err(VmError::InvalidObject(object)),
        }
    }

    fn field_value(&self, object: ObjectId, field: &str) -> VmResult<Option<RawValue>> {
        self.ensure_connected()?;
        match &self.object(object)?.body {
            ObjectBody::Fields(fields) => {
                Ok(fields.iter().find(|(name, _)| name == field).map(|(_, value)| *value))
            }
            _ => Ok(None),
        }
    }

    fn fields(&self, object: ObjectId) -> VmResult<Vec<(String, RawValue)>> {
        self.ensure_connected()?;
        match &self.object(object)?.body {
            ObjectBody::Fields(fields) => Ok(fields.clone()),
            _ => Ok(Vec::new()),
        }
    }

    fn invoke_method(
        &mut self,
        thread: ThreadId,
        object: ObjectId,
        method: MethodRef,
    ) -> VmResult<RawValue> {
        self.ensure_connected()?;
        if !self.threads.iter().any(|t| t.id == thread) {
            return Err(VmError::UnknownThread(thread));
        }

        self.journal.lock().invocations.push((object, method.name.to_string()));
        self.epoch += 1;

        if self.failing_methods.contains(method.name) {
            return Err(Self::invocation_error(method, "scripted failure"));
        }

        let body = self.object(object)?.body.clone();
        match (method.name, body) {
            ("toArray", ObjectBody::Collection(elements)) => {
                Ok(self.alloc(ScriptedObject::array("java.lang.Object[]", elements)).into())
            }
            ("entrySet", ObjectBody::Map(entries)) => {
                let entries: Vec<RawValue> = entries
                    .into_iter()
                    .map(|(key, value)| {
                        let entry = ScriptedObject {
                            type_info: TypeInfo::class("java.util.HashMap$Node")
                                .with_ancestors(["java.util.Map$Entry", "java.lang.Object"]),
                            body: ObjectBody::Entry(key, value),
                        };
                        self.alloc(entry).into()
                    })
                    .collect();
                Ok(self
                    .alloc(ScriptedObject::collection(
                        "java.util.HashMap$EntrySet",
                        &["java.util.AbstractSet", "java.util.Set"],
                        entries,
                    ))
                    .into())
            }
            ("getKey", ObjectBody::Entry(key, _)) => Ok(key),
            ("getValue", ObjectBody::Entry(_, value)) => Ok(value),
            _ => Err(Self::invocation_error(method, "no such method")),
        }
    }
}

/// [`Connector`] handing out a single [`ScriptedVm`]
#[derive(Debug)]
pub struct ScriptedConnector {
    vm: Mutex<Option<ScriptedVm>>,
    failure: Option<String>,
    journal: Arc<Mutex<VmJournal>>,
}

impl ScriptedConnector {
    /// A connector whose first launch yields `vm`
    pub fn new(vm: ScriptedVm) -> Self {
        let journal = vm.journal();
        Self { vm: Mutex::new(Some(vm)), failure: None, journal }
    }

    /// A connector whose launches always fail with `reason`
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            vm: Mutex::new(None),
            failure: Some(reason.into()),
            journal: Arc::new(Mutex::new(VmJournal::default())),
        }
    }

    /// Shared journal of the scripted backend
    pub fn journal(&self) -> Arc<Mutex<VmJournal>> {
        self.journal.clone()
    }
}

impl Connector for ScriptedConnector {
    type Vm = ScriptedVm;

    fn launch(&self, request: &LaunchRequest) -> VmResult<ScriptedVm> {
        self.journal.lock().launches.push(request.clone());
        if let Some(reason) = &self.failure {
            return Err(VmError::Launch(reason.clone()));
        }
        self.vm.lock().take().ok_or_else(|| VmError::Launch("target already launched".to_string()))
    }
}

/// [`ArtifactProducer`] returning a fixed artifact
#[derive(Debug, Clone)]
pub struct StaticArtifactProducer {
    artifact: Result<Artifact, String>,
    /// Number of produce calls
    pub produced: usize,
}

impl StaticArtifactProducer {
    /// A producer yielding `artifact`
    pub fn new(artifact: Artifact) -> Self {
        Self { artifact: Ok(artifact), produced: 0 }
    }

    /// A producer failing with `reason`, like a compile error
    pub fn failing(reason: impl Into<String>) -> Self {
        Self { artifact: Err(reason.into()), produced: 0 }
    }
}

impl ArtifactProducer for StaticArtifactProducer {
    fn produce(&mut self) -> eyre::Result<Artifact> {
        self.produced += 1;
        match &self.artifact {
            Ok(artifact) => Ok(artifact.clone()),
            Err(reason) => Err(eyre::eyre!("{reason}")),
        }
    }
}

/// Create an artifact whose output exists in a fresh temporary directory
///
/// The directory is deleted when the returned [`TempDir`] is dropped.
pub fn temp_artifact(main_type: &str, program_types: &[&str]) -> io::Result<(TempDir, Artifact)> {
    let dir = tempfile::Builder::new().prefix("stepviz-artifact-").tempdir()?;
    let location: PathBuf = dir.path().to_path_buf();
    std::fs::write(location.join(format!("{main_type}.class")), [0xCA, 0xFE, 0xBA, 0xBE])?;
    let artifact = Artifact::new(main_type, program_types.iter().copied(), location);
    Ok((dir, artifact))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{RequestKind, StepDepth, StepSize};

    fn main_thread() -> ThreadInfo {
        ThreadInfo::new(1, "main")
    }

    fn step(line: i32) -> Event {
        Event::Step { thread: main_thread(), location: Location::new("Hello", "main", line) }
    }

    #[test]
    fn test_events_need_matching_request() {
        let mut vm = ScriptedVm::new([main_thread()]);
        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.push_batch(ScriptedBatch::new([step(3)]));

        assert_eq!(vm.next_event_set().unwrap().len(), 1);
        assert!(matches!(vm.next_event_set(), Err(VmError::Disconnected)));
    }

    #[test]
    fn test_interrupted_thread_is_silenced() {
        let worker = ThreadInfo::new(2, "worker");
        let mut vm = ScriptedVm::new([main_thread()]);
        vm.enable_request(EventRequest::new(RequestKind::ThreadStart)).unwrap();
        vm.enable_request(EventRequest::new(RequestKind::ThreadDeath)).unwrap();
        vm.enable_request(EventRequest::new(RequestKind::Step {
            size: StepSize::Min,
            depth: StepDepth::Into,
        }))
        .unwrap();
        vm.push_batch(ScriptedBatch::new([Event::ThreadStart { thread: worker.clone() }]));
        vm.push_batch(ScriptedBatch::new([Event::Step {
            thread: worker.clone(),
            location: Location::new("Hello", "run", 8),
        }]));
        vm.push_batch(ScriptedBatch::new([Event::ThreadDeath { thread: worker.clone() }]));

        assert!(matches!(vm.next_event_set().unwrap()[0], Event::ThreadStart { .. }));
        vm.interrupt(worker.id).unwrap();
        assert!(matches!(vm.next_event_set().unwrap()[0], Event::ThreadDeath { .. }));
        assert_eq!(vm.journal().lock().interrupted, vec![worker.id]);
    }

    #[test]
    fn test_invocation_invalidates_frames() {
        let mut vm = ScriptedVm::new([main_thread()]);
        let list = vm.alloc(ScriptedObject::array_list([RawValue::from(Primitive::Int(1))]));
        vm.enable_request(EventRequest::new(RequestKind::Step {
            size: StepSize::Min,
            depth: StepDepth::Into,
        }))
        .unwrap();
        vm.push_batch(
            ScriptedBatch::new([step(3)]).with_frames(
                ThreadId(1),
                [ScriptedFrame::new(
                    Location::new("Hello", "main", 3),
                    [("list", RawValue::from(list))],
                )],
            ),
        );
        vm.next_event_set().unwrap();

        let frames = vm.frames(ThreadId(1)).unwrap();
        assert!(vm.frame_location(&frames[0]).is_ok());

        let array = vm.invoke_method(ThreadId(1), list, MethodRef::named("toArray")).unwrap();
        assert!(matches!(vm.frame_location(&frames[0]), Err(VmError::InvalidFrame)));
        assert_eq!(vm.journal().lock().stale_frame_accesses, 1);

        let RawValue::Object(array) = array else { panic!("expected an array") };
        assert_eq!(vm.array_values(array).unwrap(), vec![RawValue::from(Primitive::Int(1))]);
    }

    #[test]
    fn test_map_entries_through_invocations() {
        let mut vm = ScriptedVm::new([main_thread()]);
        let key = vm.alloc_string("a");
        let map = vm.alloc(ScriptedObject::hash_map([(key, RawValue::from(Primitive::Int(1)))]));

        let set = vm.invoke_method(ThreadId(1), map, MethodRef::named("entrySet")).unwrap();
        let RawValue::Object(set) = set else { panic!("expected an entry set") };
        let RawValue::Object(array) =
            vm.invoke_method(ThreadId(1), set, MethodRef::named("toArray")).unwrap()
        else {
            panic!("expected an array")
        };
        let RawValue::Object(entry) = vm.array_values(array).unwrap()[0] else {
            panic!("expected an entry")
        };

        assert_eq!(vm.invoke_method(ThreadId(1), entry, MethodRef::named("getKey")).unwrap(), key);
        vm.fail_method("getValue");
        assert!(matches!(
            vm.invoke_method(ThreadId(1), entry, MethodRef::named("getValue")),
            Err(VmError::Invocation { .. })
        ));
    }

    #[test]
    fn test_exit_disconnects() {
        let mut vm = ScriptedVm::new([main_thread()]);
        vm.push_batch(ScriptedBatch::new([Event::VmStart]));
        vm.exit(3).unwrap();

        assert!(matches!(vm.resume(), Err(VmError::Disconnected)));
        assert!(matches!(vm.next_event_set(), Err(VmError::Disconnected)));
        assert_eq!(vm.journal().lock().exit_code, Some(3));
    }

    #[test]
    fn test_connector_launches_once() {
        let connector = ScriptedConnector::new(ScriptedVm::new([main_thread()]));
        let request = LaunchRequest {
            main_type: "Hello".into(),
            class_path: PathBuf::from("/tmp"),
            options: vec![],
            suspend: true,
        };

        assert!(connector.launch(&request).is_ok());
        assert!(matches!(connector.launch(&request), Err(VmError::Launch(_))));
        assert_eq!(connector.journal().lock().launches.len(), 2);
    }

    #[test]
    fn test_temp_artifact_is_ready() {
        let (_dir, artifact) = temp_artifact("Hello", &["Hello", "Node"]).unwrap();
        assert!(artifact.is_ready());
        assert!(artifact.defines("Node"));
        assert!(StaticArtifactProducer::failing("does not compile").produce().is_err());
    }
}
