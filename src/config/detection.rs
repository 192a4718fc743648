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

use crate::detection::{DetectionError, DetectionMethod, DetectionSettings};

const DEFAULT_THRESHOLD: f32 = 0.3;
const DEFAULT_WINDOW_SIZE: usize = 1024;
const DEFAULT_HOP_OVERLAP_PERCENT: f64 = 50.0;

/// Onset and beat detection settings.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct DetectionConfig {
    /// The onset detection function.
    #[serde(default)]
    method: DetectionMethod,

    /// Peak picking threshold. Lower values find more onsets.
    #[serde(default = "default_threshold")]
    threshold: f32,

    /// Analysis window size in samples. Must be a power of two.
    #[serde(default = "default_window_size")]
    window_size: usize,

    /// Hop size as a percentage of the window size.
    #[serde(default = "default_hop_overlap_percent")]
    hop_overlap_percent: f64,
}

fn default_threshold() -> f32 {
    DEFAULT_THRESHOLD
}

fn default_window_size() -> usize {
    DEFAULT_WINDOW_SIZE
}

fn default_hop_overlap_percent() -> f64 {
    DEFAULT_HOP_OVERLAP_PERCENT
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            method: DetectionMethod::default(),
            threshold: DEFAULT_THRESHOLD,
            window_size: DEFAULT_WINDOW_SIZE,
            hop_overlap_percent: DEFAULT_HOP_OVERLAP_PERCENT,
        }
    }
}

impl DetectionConfig {
    /// Creates a new detection configuration.
    pub fn new(
        method: DetectionMethod,
        threshold: f32,
        window_size: usize,
        hop_overlap_percent: f64,
    ) -> Self {
        Self {
            method,
            threshold,
            window_size,
            hop_overlap_percent,
        }
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn window_size(&self) -> usize {
        self.window_size
    }

    pub fn hop_overlap_percent(&self) -> f64 {
        self.hop_overlap_percent
    }

    /// Overrides the detection method, e.g. from the command line.
    pub fn set_method(&mut self, method: DetectionMethod) {
        self.method = method;
    }

    /// Builds the settings for one detection run over a sample at `sample_rate`.
    pub fn settings(&self, sample_rate: u32) -> Result<DetectionSettings, DetectionError> {
        DetectionSettings::from_overlap(
            self.method,
            self.threshold,
            self.window_size,
            self.hop_overlap_percent,
            sample_rate,
        )
    }
}
