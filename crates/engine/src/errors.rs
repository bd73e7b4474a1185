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

//! Errors raised by the trace engine

use stepviz_common::VmError;
use thiserror::Error;

/// Result alias for trace engine operations
pub type Result<T, E = TraceError> = std::result::Result<T, E>;

/// Fatal failures of a trace session
///
/// Each of them ends the session and is reported to the consumer exactly once.
#[derive(Debug, Error)]
pub enum TraceError {
    /// The controller was used out of order or with an unusable artifact
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The target or its debug connection failed to start
    #[error("failed to launch the target: {0}")]
    LaunchFailure(#[source] VmError),

    /// The consumer sent something other than a command, or stopped sending
    #[error("protocol violation: received {received:?}")]
    ProtocolViolation {
        /// Offending input, empty when the command channel closed
        received: String,
    },

    /// Reading frames, variables, fields or array elements failed
    #[error("introspection failed: {0}")]
    Introspection(#[from] VmError),

    /// The program could not be turned into a launchable artifact
    #[error("artifact unavailable: {0:#}")]
    Artifact(eyre::Report),

    /// Reading the target's output failed
    #[error("output capture failed: {0}")]
    Io(#[from] std::io::Error),

    /// The consumer is gone
    #[error("result channel closed")]
    ChannelClosed,
}

impl TraceError {
    /// Whether this error only reports that the target went away
    pub fn is_disconnect(&self) -> bool {
        matches!(self, Self::Introspection(VmError::Disconnected))
    }

    pub(crate) fn protocol(received: impl Into<String>) -> Self {
        Self::ProtocolViolation { received: received.into() }
    }
}
