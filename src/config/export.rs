// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::audio::SaveFormat;

/// Where and how slices are written.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct ExportConfig {
    #[serde(default)]
    format: SaveFormat,

    /// Default output directory. Relative paths resolve against the working directory.
    #[serde(default)]
    directory: Option<PathBuf>,
}

impl ExportConfig {
    pub fn new(format: SaveFormat, directory: Option<PathBuf>) -> Self {
        Self { format, directory }
    }

    pub fn format(&self) -> SaveFormat {
        self.format
    }

    pub fn directory(&self) -> Option<&Path> {
        self.directory.as_deref()
    }
}
