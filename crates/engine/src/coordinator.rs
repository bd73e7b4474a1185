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

//! Step coordination.
//!
//! The [`StepCoordinator`] is the [`EventHandler`] of a trace session. For
//! every traceable event it builds a snapshot, publishes it, and then blocks
//! until the consumer allows the next step or asks to terminate.

use stepviz_common::{
    types::{Command, Event, Snapshot, SnapshotKind, TraceResult},
    VirtualMachine,
};
use tracing::{debug, info};

use crate::{
    channel::TracerEndpoint,
    errors::Result,
    inspector::{Inspection, SnapshotBuilder},
    session::{EventHandler, Flow},
};

/// Bridges session events to the command/result channel
pub struct StepCoordinator<'a> {
    endpoint: &'a mut TracerEndpoint,
    builder: SnapshotBuilder,
    previous: Option<(Event, Snapshot)>,
    steps: usize,
}

impl<'a> StepCoordinator<'a> {
    /// Create a coordinator publishing to `endpoint`
    pub fn new(endpoint: &'a mut TracerEndpoint, builder: SnapshotBuilder) -> Self {
        Self { endpoint, builder, previous: None, steps: 0 }
    }

    /// Number of snapshots published so far
    pub fn steps(&self) -> usize {
        self.steps
    }

    fn is_traceable(&self, event: &Event) -> bool {
        match event {
            Event::VmStart | Event::VmDeath | Event::ThreadStart { .. } => false,
            Event::ThreadDeath { thread } => matches!(
                &self.previous,
                Some((previous, snapshot))
                    if snapshot.kind == SnapshotKind::Exception
                        && previous.thread().map(|t| t.id) == Some(thread.id)
            ),
            _ => true,
        }
    }
}

impl<V: VirtualMachine> EventHandler<V> for StepCoordinator<'_> {
    fn on_output(&mut self, text: String) -> Result<()> {
        self.endpoint.publish(TraceResult::Output { text })
    }

    fn on_event(&mut self, vm: &mut V, event: &Event) -> Result<Flow> {
        if !self.is_traceable(event) {
            debug!("Passing over {} event", event.name());
            return Ok(Flow::Continue);
        }

        let previous = self.previous.as_ref().map(|(event, snapshot)| (event, snapshot));
        let Inspection { snapshot, threw } = self.builder.build(vm, event, previous)?;

        self.steps += 1;
        debug!(
            step = self.steps,
            kind = ?snapshot.kind,
            depth = snapshot.stack.len(),
            "Publishing snapshot for {} event",
            event.name()
        );
        self.previous = Some((event.clone(), snapshot.clone()));
        self.endpoint.publish(TraceResult::snapshot(snapshot, threw))?;

        match self.endpoint.next_command()? {
            Command::Advance => Ok(Flow::Continue),
            Command::Terminate => {
                info!("Terminate requested after {} steps", self.steps);
                Ok(Flow::Stop)
            }
        }
    }
}
