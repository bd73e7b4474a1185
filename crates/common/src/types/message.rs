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

//! Protocol messages between a tracer and its consumer.
//!
//! The consumer sends text [`Command`]s and reads tagged [`TraceResult`]s.
//! Exactly one `advance` starts the session; every following `advance`
//! permits one more step and `terminate` ends the session.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::types::{Snapshot, ThrowInfo};

/// Command sent by the consumer of a trace
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    /// Continue tracing for one more step
    Advance,
    /// Stop tracing and end the session
    Terminate,
}

impl Command {
    /// Wire text of the command
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Advance => "advance",
            Self::Terminate => "terminate",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for text that is not a command
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized command: {0:?}")]
pub struct ParseCommandError(pub String);

impl FromStr for Command {
    type Err = ParseCommandError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "advance" => Ok(Self::Advance),
            "terminate" => Ok(Self::Terminate),
            other => Err(ParseCommandError(other.to_string())),
        }
    }
}

/// Result emitted by a tracer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TraceResult {
    /// The target is attached and ready; emitted once, before any step
    Started,
    /// State after one admitted event
    Snapshot {
        /// Captured state
        snapshot: Snapshot,
        /// Fault that ended the traced thread, if any
        #[serde(default, skip_serializing_if = "Option::is_none")]
        threw: Option<ThrowInfo>,
    },
    /// Text the target wrote to its standard output or error
    Output {
        /// Captured text
        text: String,
    },
    /// Fatal failure; the session is over
    Error {
        /// Failure description
        message: String,
    },
    /// The session ended without error
    Finished,
}

impl TraceResult {
    /// Snapshot result
    pub fn snapshot(snapshot: Snapshot, threw: Option<ThrowInfo>) -> Self {
        Self::Snapshot { snapshot, threw }
    }

    /// Error result
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error { message: message.into() }
    }

    /// Whether no more results follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error { .. } | Self::Finished)
    }
}
