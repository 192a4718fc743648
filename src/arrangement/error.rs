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
use crate::audio::SampleRange;

use super::{SegmentId, SlicePointId};

/// Errors raised by arrangement operations given inputs that break their contract.
/// The arrangement is left unchanged when any of these is returned.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ArrangementError {
    #[error("Invalid sample ranges: {0}")]
    InvalidRange(String),

    #[error("Range {range} exceeds buffer of {total_frames} frames")]
    RangeOutOfBounds {
        range: SampleRange,
        total_frames: usize,
    },

    #[error("No segment at order position {0}")]
    NoSuchPosition(usize),

    #[error("No segment with id {0}")]
    NoSuchSegment(SegmentId),

    #[error("No slice point with id {0:?}")]
    NoSuchSlicePoint(SlicePointId),

    #[error("Frame {frame} lies outside the sample ({total_frames} frames)")]
    FrameOutOfBounds { frame: usize, total_frames: usize },

    #[error("Operation needs at least {0} segments")]
    NotEnoughSegments(usize),

    #[error("Cannot move segments by {delta} places")]
    InvalidMove { delta: isize },

    #[error("Loop markers are not shown")]
    NoLoopMarkers,

    #[error("No sample loaded")]
    Empty,
}
