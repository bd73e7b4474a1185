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

//! Snapshot building.
//!
//! The [`SnapshotBuilder`] turns one debug event into a [`Snapshot`] of the
//! event thread: its frames, outermost first, and the heap reachable from
//! their variables.
//!
//! Capturing happens in two phases. The sweep reads every frame's location
//! and variables while the frame handles are still valid; only then are the
//! captured values inspected, which may invoke methods in the target and
//! thereby invalidate every frame handle.

mod shape;
mod value;

pub use value::ValueInspector;

use std::collections::HashSet;

use stepviz_common::{
    types::{
        Event, Frame, Location, ObjectId, RawValue, Snapshot, SnapshotKind, ThreadId, ThrowInfo,
        Variable,
    },
    Artifact, VirtualMachine, VmError,
};
use tracing::debug;

use crate::errors::{Result, TraceError};

/// A built snapshot and, when the traced thread died of an uncaught fault,
/// what it threw
#[derive(Debug, Clone, PartialEq)]
pub struct Inspection {
    /// Captured state
    pub snapshot: Snapshot,
    /// The fault that ended the traced thread
    pub threw: Option<ThrowInfo>,
}

/// Classify an event
pub fn classify(event: &Event) -> SnapshotKind {
    match event {
        Event::MethodEntry { .. } => SnapshotKind::Call,
        Event::MethodExit { .. } | Event::ThreadDeath { .. } => SnapshotKind::Return,
        Event::Exception { .. } => SnapshotKind::Exception,
        _ => SnapshotKind::Line,
    }
}

/// A frame read during the sweep
struct CapturedFrame {
    location: Location,
    variables: Vec<(String, RawValue)>,
}

/// Builds snapshots for the types of one program
#[derive(Debug, Clone, Default)]
pub struct SnapshotBuilder {
    program_types: HashSet<String>,
}

impl SnapshotBuilder {
    /// A builder treating `program_types` as user-defined
    pub fn new<I, S>(program_types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { program_types: program_types.into_iter().map(Into::into).collect() }
    }

    /// A builder for the types an artifact defines
    pub fn for_artifact(artifact: &Artifact) -> Self {
        Self::new(artifact.program_types.iter().cloned())
    }

    /// Build the snapshot for `event`
    ///
    /// `previous` is the last event a snapshot was built for, with that
    /// snapshot. When `event` is the end of a thread right after an exception
    /// snapshot, the previous stack and heap are shared and the exception is
    /// reported as what the thread threw.
    pub fn build<V: VirtualMachine>(
        &self,
        vm: &mut V,
        event: &Event,
        previous: Option<(&Event, &Snapshot)>,
    ) -> Result<Inspection> {
        let kind = classify(event);

        if let (
            Event::ThreadDeath { .. },
            Some((Event::Exception { exception, exception_type, .. }, prev)),
        ) = (event, previous)
        {
            if prev.kind == SnapshotKind::Exception {
                let threw = ThrowInfo {
                    exception_type_name: exception_type.clone(),
                    message: detail_message(vm, *exception),
                };
                let snapshot =
                    Snapshot { kind, stack: prev.stack.clone(), heap: prev.heap.clone() };
                return Ok(Inspection { snapshot, threw: Some(threw) });
            }
        }

        let thread = event.thread().map(|t| t.id).ok_or_else(|| {
            TraceError::InvalidState(format!("{} event has no thread to inspect", event.name()))
        })?;

        let captured = sweep(vm, thread)?;

        let mut inspector = ValueInspector::new(vm, thread, &self.program_types);
        let mut stack = Vec::with_capacity(captured.len());
        for frame in captured.into_iter().rev() {
            let mut variables = Vec::with_capacity(frame.variables.len());
            for (name, raw) in frame.variables {
                variables.push(Variable { name, value: inspector.inspect(raw)? });
            }
            stack.push(Frame {
                source_line: frame.location.line - 1,
                name: frame.location.method,
                variables,
            });
        }
        let heap = inspector.into_heap();

        debug!(frames = stack.len(), objects = heap.len(), "Built {kind:?} snapshot");
        Ok(Inspection { snapshot: Snapshot::new(kind, stack, heap), threw: None })
    }
}

/// Read every frame of `thread`, innermost first
///
/// Takes the backend by shared reference: nothing can be invoked while frame
/// handles are alive.
fn sweep<V: VirtualMachine>(vm: &V, thread: ThreadId) -> Result<Vec<CapturedFrame>> {
    let handles = vm.frames(thread)?;
    if handles.is_empty() {
        return Err(VmError::NoFrames(thread).into());
    }
    handles
        .iter()
        .map(|handle| {
            Ok(CapturedFrame {
                location: vm.frame_location(handle)?,
                variables: vm.visible_variables(handle)?,
            })
        })
        .collect()
}

/// Best-effort detail message of a throwable
fn detail_message<V: VirtualMachine>(vm: &V, exception: ObjectId) -> Option<String> {
    match vm.field_value(exception, shape::DETAIL_MESSAGE_FIELD) {
        Ok(Some(RawValue::Object(message))) => vm.string_value(message).ok(),
        Ok(_) => None,
        Err(err) => {
            debug!("Detail message of {exception} unavailable: {err}");
            None
        }
    }
}
