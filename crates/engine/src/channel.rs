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

//! Command/result channel between a tracer and its consumer.
//!
//! Two bounded queues decouple the pace of the tracer from the pace of the
//! consumer: commands flow in as text lines, results flow out as
//! [`TraceResult`]s. The tracer side blocks and must run on a blocking thread;
//! the client side can be used from async code or from a plain thread.
//!
//! Command lines are parsed by the tracer, so a garbled line surfaces as a
//! protocol violation of the session instead of failing on the client.

use stepviz_common::types::{Command, TraceResult};
use tokio::sync::mpsc;
use tracing::trace;

use crate::errors::{Result, TraceError};

/// Create a connected pair of endpoints whose queues hold `capacity` messages
pub fn channel(capacity: usize) -> (TracerEndpoint, ClientEndpoint) {
    let capacity = capacity.max(1);
    let (command_tx, command_rx) = mpsc::channel(capacity);
    let (result_tx, result_rx) = mpsc::channel(capacity);
    (
        TracerEndpoint { commands: command_rx, results: result_tx },
        ClientEndpoint { commands: Some(command_tx), results: result_rx },
    )
}

/// Tracer side of the channel
#[derive(Debug)]
pub struct TracerEndpoint {
    commands: mpsc::Receiver<String>,
    results: mpsc::Sender<TraceResult>,
}

impl TracerEndpoint {
    /// Block until the consumer sends the next command
    ///
    /// Fails with a protocol violation on unparsable input or when the
    /// consumer closed the command queue.
    pub fn next_command(&mut self) -> Result<Command> {
        let line = self.commands.blocking_recv().ok_or_else(|| TraceError::protocol(""))?;
        trace!("Received command line {line:?}");
        line.parse::<Command>().map_err(|_| TraceError::protocol(line))
    }

    /// Queue a result for the consumer, blocking while the queue is full
    pub fn publish(&self, result: TraceResult) -> Result<()> {
        self.results.blocking_send(result).map_err(|_| TraceError::ChannelClosed)
    }
}

/// Consumer side of the channel
#[derive(Debug)]
pub struct ClientEndpoint {
    commands: Option<mpsc::Sender<String>>,
    results: mpsc::Receiver<TraceResult>,
}

impl ClientEndpoint {
    /// Send a command
    pub async fn send(&self, command: Command) -> Result<()> {
        self.send_line(command.as_str()).await
    }

    /// Send a raw command line
    pub async fn send_line(&self, line: impl Into<String>) -> Result<()> {
        let commands = self.commands.as_ref().ok_or(TraceError::ChannelClosed)?;
        commands.send(line.into()).await.map_err(|_| TraceError::ChannelClosed)
    }

    /// Wait for the next result, `None` once the tracer is gone
    pub async fn recv(&mut self) -> Option<TraceResult> {
        self.results.recv().await
    }

    /// Blocking variant of [`Self::send`]
    pub fn blocking_send(&self, command: Command) -> Result<()> {
        self.blocking_send_line(command.as_str())
    }

    /// Blocking variant of [`Self::send_line`]
    pub fn blocking_send_line(&self, line: impl Into<String>) -> Result<()> {
        let commands = self.commands.as_ref().ok_or(TraceError::ChannelClosed)?;
        commands.blocking_send(line.into()).map_err(|_| TraceError::ChannelClosed)
    }

    /// Blocking variant of [`Self::recv`]
    pub fn blocking_recv(&mut self) -> Option<TraceResult> {
        self.results.blocking_recv()
    }

    /// Stop sending commands; a tracer waiting for one fails with a protocol violation
    pub fn close_commands(&mut self) {
        self.commands = None;
    }
}
