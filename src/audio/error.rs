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
use std::path::PathBuf;

use super::buffer::SampleRange;
use super::file::SaveFormat;

/// Error types for loading, saving and editing sample data.
#[derive(Debug, thiserror::Error)]
pub enum AudioFileError {
    #[error("Unreadable or unsupported audio file '{path}': {detail}")]
    FileFormat { path: String, detail: String },

    #[error("Only mono and stereo samples are supported (found {0} channels)")]
    UnsupportedChannels(u16),

    #[error("Not enough memory to hold {frames} frames x {channels} channels")]
    Allocation { frames: usize, channels: usize },

    #[error("no. of samples to write: {expected}, no. of samples written: {written}")]
    Write { expected: usize, written: usize },

    #[error("No encoder available for {0:?}")]
    UnsupportedSaveFormat(SaveFormat),

    #[error("Directory does not exist: {}", .0.display())]
    DirectoryMissing(PathBuf),

    #[error("Range {range} is outside a buffer of {num_frames} frames")]
    RangeOutOfBounds { range: SampleRange, num_frames: usize },

    #[error("Audio file error: {0}")]
    Decode(#[from] symphonia::core::errors::Error),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AudioFileError {
    /// A short title suitable for a warning box.
    pub fn title(&self) -> &'static str {
        match self {
            AudioFileError::FileFormat { .. }
            | AudioFileError::UnsupportedChannels(_)
            | AudioFileError::Decode(_) => "Couldn't open audio file",
            AudioFileError::Allocation { .. } => "Not enough memory to load audio file",
            AudioFileError::Write { .. } => "Error while writing to audio file",
            AudioFileError::UnsupportedSaveFormat(_)
            | AudioFileError::DirectoryMissing(_)
            | AudioFileError::Wav(_) => "Couldn't open file for writing",
            AudioFileError::RangeOutOfBounds { .. } => "Invalid sample range",
            AudioFileError::Io(_) => "File system error",
        }
    }

    /// The detail line accompanying [`AudioFileError::title`].
    pub fn detail(&self) -> String {
        self.to_string()
    }
}
