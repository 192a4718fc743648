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

//! Sample data containers and the audio file collaborator.

mod buffer;
mod error;
mod file;

pub use buffer::{SampleBuffer, SampleHeader, SampleRange, SharedSampleBuffer, MAX_CHANNELS};
pub use error::AudioFileError;
pub use file::{load_sample, load_sample_range, save_sample, SaveFormat};
