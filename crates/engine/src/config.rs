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

//! Tracer configuration.
//!
//! Configuration is read from a TOML file whose path may be given through the
//! `STEPVIZ_CONFIG` environment variable. Every key is optional:
//!
//! ```toml
//! entry_thread = "main"
//! housekeeping_threads = ["Common-Cleaner", "DestroyJavaVM"]
//! launch_options = ["-Xss4m"]
//! exit_code = 0
//! channel_capacity = 64
//! ```

use std::{env, fs, path::Path};

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use stepviz_common::env::STEPVIZ_CONFIG;
use tracing::debug;

/// Configuration of a trace session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerConfig {
    /// Name of the thread running the program's entry routine
    pub entry_thread: String,
    /// Runtime-internal threads that may start without being interrupted
    pub housekeeping_threads: Vec<String>,
    /// Extra options passed to the runtime at launch
    pub launch_options: Vec<String>,
    /// Exit code requested from the target on `terminate`
    pub exit_code: i32,
    /// Capacity of the command and result channels
    pub channel_capacity: usize,
}

impl Default for TracerConfig {
    fn default() -> Self {
        Self {
            entry_thread: "main".into(),
            housekeeping_threads: vec!["Common-Cleaner".into(), "DestroyJavaVM".into()],
            launch_options: Vec::new(),
            exit_code: 0,
            channel_capacity: 64,
        }
    }
}

impl TracerConfig {
    /// Set the entry thread name
    pub fn with_entry_thread(mut self, name: impl Into<String>) -> Self {
        self.entry_thread = name.into();
        self
    }

    /// Set the housekeeping thread names
    pub fn with_housekeeping_threads<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.housekeeping_threads = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the runtime launch options
    pub fn with_launch_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.launch_options = options.into_iter().map(Into::into).collect();
        self
    }

    /// Set the exit code requested on `terminate`
    pub fn with_exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    /// Set the channel capacity (at least one)
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path:?}"))?;

        let mut config: Self =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;
        config.channel_capacity = config.channel_capacity.max(1);

        debug!("Loaded tracer configuration from {path:?}");
        Ok(config)
    }

    /// Load configuration from the file named by `STEPVIZ_CONFIG`, or use defaults
    pub fn from_env() -> Result<Self> {
        match env::var_os(STEPVIZ_CONFIG) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}
