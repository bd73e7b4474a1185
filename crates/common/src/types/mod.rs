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

//! Type definitions shared across stepviz components

/// Debug events raised by the target and the requests that subscribe to them
pub mod event;
/// Commands and results exchanged with the consumer of a trace
pub mod message;
/// Raw values, identities and type descriptors reported by the runtime
pub mod runtime;
/// The snapshot document: stack frames, values and heap objects
pub mod snapshot;

pub use event::*;
pub use message::*;
pub use runtime::*;
pub use snapshot::*;
