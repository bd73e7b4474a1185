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

//! Launchable artifacts.
//!
//! Building the program is not the tracer's job: an [`ArtifactProducer`]
//! turns the program into an [`Artifact`] and reports which types the program
//! itself defines. Those names scope every event subscription of a session.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// A built, launchable program
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artifact {
    /// Entry type of the program
    pub main_type: String,
    /// Every type the program defines
    pub program_types: Vec<String>,
    /// Where the launchable output lives
    pub location: PathBuf,
}

impl Artifact {
    /// Describe an artifact
    pub fn new<I, S>(main_type: impl Into<String>, program_types: I, location: PathBuf) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            main_type: main_type.into(),
            program_types: program_types.into_iter().map(Into::into).collect(),
            location,
        }
    }

    /// Whether the launchable output exists
    pub fn is_ready(&self) -> bool {
        self.location.exists()
    }

    /// Whether `type_name` is defined by the program
    pub fn defines(&self, type_name: &str) -> bool {
        self.program_types.iter().any(|t| t == type_name)
    }
}

/// Produces a launchable artifact
pub trait ArtifactProducer {
    /// Build the program and describe the result
    fn produce(&mut self) -> eyre::Result<Artifact>;
}
