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

//! stepviz common - Shared functionality for stepviz components
//!
//! This crate provides the pieces shared by the trace engine and its consumers:
//! the snapshot document model, the runtime value and debug event model, the
//! collaborator interfaces a debug backend implements, and logging setup.

/// Common types used throughout stepviz including snapshots, runtime values and debug events
pub mod types;

/// Artifact description and the producer interface for launchable programs
pub mod artifact;
/// Environment variable names recognized by stepviz
pub mod env;
/// Logging setup and utilities for consistent logging across stepviz components
pub mod logging;
/// Scripted in-memory debug backend for tests
pub mod test_utils;
/// Debug backend interfaces: connector, virtual machine and their errors
pub mod vm;

pub use artifact::*;
pub use logging::*;
pub use vm::*;
