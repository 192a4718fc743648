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
use serde::Deserialize;

use crate::arrangement::{SnapMode, DEFAULT_DISPLAY_WIDTH};

/// Waveform display geometry.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct DisplayConfig {
    /// Width of the waveform in display units.
    #[serde(default = "default_width")]
    width: f64,

    #[serde(default)]
    snap_mode: SnapMode,
}

fn default_width() -> f64 {
    DEFAULT_DISPLAY_WIDTH
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            width: DEFAULT_DISPLAY_WIDTH,
            snap_mode: SnapMode::default(),
        }
    }
}

impl DisplayConfig {
    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn snap_mode(&self) -> SnapMode {
        self.snap_mode
    }
}
