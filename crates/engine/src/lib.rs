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

//! stepviz engine - step-by-step tracing of a running program.
//!
//! The engine attaches to a target through a debug backend
//! ([`stepviz_common::Connector`]), steps it one event at a time and, after
//! every event, builds a [`stepviz_common::types::Snapshot`] of the traced
//! thread's stack and reachable heap. A consumer paces the trace through a
//! command/result [`channel`].

pub mod channel;
pub use channel::*;

pub mod config;
pub use config::*;

pub mod coordinator;
pub use coordinator::*;

pub mod core;
pub use core::*;

pub mod errors;
pub use errors::TraceError;

pub mod inspector;
pub use inspector::*;

pub mod session;
pub use session::*;
