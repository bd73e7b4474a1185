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

//! Debug backend interfaces.
//!
//! The trace engine never talks to a wire protocol directly. A backend (for
//! example a JDWP client) implements [`Connector`] to launch a target under
//! debug control and [`VirtualMachine`] to drive and introspect it.
//!
//! # Handle validity
//!
//! [`FrameHandle`]s returned by [`VirtualMachine::frames`] become invalid as
//! soon as a method is invoked in the target. Callers must read everything
//! they need from frames before invoking anything.

use std::{io, path::PathBuf};

use thiserror::Error;

use crate::types::{
    EventRequest, EventSet, FrameHandle, Location, MethodRef, ObjectId, RawValue, ThreadId,
    ThreadInfo, TypeInfo,
};

/// Result alias for backend operations
pub type VmResult<T> = Result<T, VmError>;

/// Failures reported by a debug backend
#[derive(Debug, Error)]
pub enum VmError {
    /// The debug connection is gone (the target exited or was killed)
    #[error("target disconnected")]
    Disconnected,

    /// A frame handle was used after the frames it refers to changed
    #[error("stale frame handle")]
    InvalidFrame,

    /// The object was collected or never existed
    #[error("invalid object {0}")]
    InvalidObject(ObjectId),

    /// The thread is unknown to the target
    #[error("unknown thread {0}")]
    UnknownThread(ThreadId),

    /// The thread has no frames to inspect
    #[error("thread {0} has no frames")]
    NoFrames(ThreadId),

    /// The target was built without the debug information required
    #[error("debug information is absent")]
    AbsentInformation,

    /// A method invoked in the target failed or threw
    #[error("invocation of {method} failed: {reason}")]
    Invocation {
        /// Invoked method
        method: String,
        /// Failure description
        reason: String,
    },

    /// The target could not be launched
    #[error("launch failed: {0}")]
    Launch(String),

    /// I/O failure on the debug connection or the target's streams
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl VmError {
    /// Whether this error means the debug connection ended
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Standard stream of the target process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputStream {
    /// Standard output
    Stdout,
    /// Standard error
    Stderr,
}

/// How to launch a target under debug control
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    /// Entry type of the program
    pub main_type: String,
    /// Location of the launchable artifact
    pub class_path: PathBuf,
    /// Extra options passed to the runtime
    pub options: Vec<String>,
    /// Whether the target stays suspended at entry
    pub suspend: bool,
}

/// Launches targets under debug control
pub trait Connector {
    /// Debug connection produced by a successful launch
    type Vm: VirtualMachine;

    /// Start the target and establish the debug connection
    fn launch(&self, request: &LaunchRequest) -> VmResult<Self::Vm>;
}

/// A live debug connection to a target process
pub trait VirtualMachine {
    /// Threads currently alive in the target
    fn all_threads(&self) -> VmResult<Vec<ThreadInfo>>;

    /// Enable an event subscription
    fn enable_request(&mut self, request: EventRequest) -> VmResult<()>;

    /// Resume every suspended thread
    fn resume(&mut self) -> VmResult<()>;

    /// Block until the next batch of events is available
    ///
    /// Returns [`VmError::Disconnected`] once the connection is gone.
    fn next_event_set(&mut self) -> VmResult<EventSet>;

    /// Interrupt a thread
    fn interrupt(&mut self, thread: ThreadId) -> VmResult<()>;

    /// Ask the target to exit with `code`
    fn exit(&mut self, code: i32) -> VmResult<()>;

    /// Read the bytes already buffered on one of the target's output streams
    ///
    /// Never blocks; returns an empty buffer when nothing is available.
    fn read_available(&mut self, stream: OutputStream) -> io::Result<Vec<u8>>;

    /// Frames of a suspended thread, innermost first
    fn frames(&self, thread: ThreadId) -> VmResult<Vec<FrameHandle>>;

    /// Code location of a frame
    fn frame_location(&self, frame: &FrameHandle) -> VmResult<Location>;

    /// Variables visible at a frame's location, with their raw values
    fn visible_variables(&self, frame: &FrameHandle) -> VmResult<Vec<(String, RawValue)>>;

    /// Runtime type of an object
    fn type_of(&self, object: ObjectId) -> VmResult<TypeInfo>;

    /// Contents of a string object
    fn string_value(&self, object: ObjectId) -> VmResult<String>;

    /// Elements of an array object
    fn array_values(&self, object: ObjectId) -> VmResult<Vec<RawValue>>;

    /// Value of one field, `None` if the type declares no such field
    fn field_value(&self, object: ObjectId, field: &str) -> VmResult<Option<RawValue>>;

    /// All fields of an object, inherited ones included, in a stable order
    fn fields(&self, object: ObjectId) -> VmResult<Vec<(String, RawValue)>>;

    /// Invoke a no-argument method on `object` in `thread`, single-threaded
    ///
    /// Invalidates every [`FrameHandle`] obtained before the call.
    fn invoke_method(
        &mut self,
        thread: ThreadId,
        object: ObjectId,
        method: MethodRef,
    ) -> VmResult<RawValue>;
}
