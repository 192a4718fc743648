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

const DEFAULT_MAX_VOICES: usize = 16;
const DEFAULT_FIRST_NOTE: u8 = 36;
const DEFAULT_OUTPUT_SAMPLE_RATE: u32 = 44100;
const DEFAULT_OUTPUT_CHANNELS: u16 = 2;
const DEFAULT_BLOCK_SIZE: usize = 512;
const DEFAULT_QUEUE_SIZE: usize = 256;

/// Slice playback settings.
#[derive(Deserialize, Clone, Debug, PartialEq)]
pub struct SamplerConfig {
    /// Maximum number of simultaneously sounding slices.
    #[serde(default = "default_max_voices")]
    max_voices: usize,

    /// The MIDI note the first slice plays on. Later slices follow chromatically.
    #[serde(default = "default_first_note")]
    first_note: u8,

    /// Attack time in milliseconds.
    #[serde(default)]
    attack_ms: f64,

    /// Release time in milliseconds.
    #[serde(default)]
    release_ms: f64,

    #[serde(default = "default_output_sample_rate")]
    output_sample_rate: u32,

    /// 1 (mono) or 2 (stereo).
    #[serde(default = "default_output_channels")]
    output_channels: u16,

    /// Frames rendered per block.
    #[serde(default = "default_block_size")]
    block_size: usize,

    /// Capacity of the control to audio message queue.
    #[serde(default = "default_queue_size")]
    queue_size: usize,
}

fn default_max_voices() -> usize {
    DEFAULT_MAX_VOICES
}

fn default_first_note() -> u8 {
    DEFAULT_FIRST_NOTE
}

fn default_output_sample_rate() -> u32 {
    DEFAULT_OUTPUT_SAMPLE_RATE
}

fn default_output_channels() -> u16 {
    DEFAULT_OUTPUT_CHANNELS
}

fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}

fn default_queue_size() -> usize {
    DEFAULT_QUEUE_SIZE
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            max_voices: DEFAULT_MAX_VOICES,
            first_note: DEFAULT_FIRST_NOTE,
            attack_ms: 0.0,
            release_ms: 0.0,
            output_sample_rate: DEFAULT_OUTPUT_SAMPLE_RATE,
            output_channels: DEFAULT_OUTPUT_CHANNELS,
            block_size: DEFAULT_BLOCK_SIZE,
            queue_size: DEFAULT_QUEUE_SIZE,
        }
    }
}

impl SamplerConfig {
    pub fn max_voices(&self) -> usize {
        self.max_voices
    }

    pub fn first_note(&self) -> u8 {
        self.first_note
    }

    pub fn attack_ms(&self) -> f64 {
        self.attack_ms
    }

    pub fn release_ms(&self) -> f64 {
        self.release_ms
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    pub fn output_channels(&self) -> u16 {
        self.output_channels
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size
    }
}
