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

//! Environment variable name constants for stepviz configuration.
//!
//! # Environment Variables
//!
//! - [`STEPVIZ_CONFIG`] - Path of the TOML tracer configuration file
//! - [`STEPVIZ_LOG_DIR`] - Root directory for file logging

/// Environment variable holding the path of the tracer configuration file.
///
/// When unset, the tracer runs with its built-in defaults.
///
/// # Examples
///
/// ```bash
/// STEPVIZ_CONFIG=/etc/stepviz/tracer.toml cargo test
/// ```
pub const STEPVIZ_CONFIG: &str = "STEPVIZ_CONFIG";

/// Environment variable overriding the root directory used for log files.
///
/// # Default
///
/// `<system temp dir>/stepviz-logs`
pub const STEPVIZ_LOG_DIR: &str = "STEPVIZ_LOG_DIR";
