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
use std::fmt;

use crate::audio::SampleRange;

/// Stable identifier of a segment, independent of its order position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SegmentId(pub(crate) u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "segment-{}", self.0)
    }
}

/// A waveform segment: one slice of the source buffer as shown and played.
#[derive(Debug, Clone, PartialEq)]
pub struct Segment {
    id: SegmentId,
    order_pos: usize,
    range: SampleRange,
    /// The segments this one was joined from, in order. Empty unless joined.
    joined: Vec<Segment>,
    /// Horizontal position in display units.
    x: f64,
    /// Width in display units.
    width: f64,
}

impl Segment {
    pub(crate) fn new(id: SegmentId, order_pos: usize, range: SampleRange) -> Self {
        Self {
            id,
            order_pos,
            range,
            joined: Vec::new(),
            x: 0.0,
            width: 0.0,
        }
    }

    /// Builds a joined segment from frame-contiguous constituents.
    pub(crate) fn joined(id: SegmentId, constituents: Vec<Segment>) -> Self {
        let start_frame = constituents
            .first()
            .map(|s| s.range.start_frame)
            .unwrap_or(0);
        let num_frames = constituents.iter().map(|s| s.range.num_frames).sum();
        let order_pos = constituents.first().map(|s| s.order_pos).unwrap_or(0);
        Self {
            id,
            order_pos,
            range: SampleRange::new(start_frame, num_frames),
            joined: constituents,
            x: 0.0,
            width: 0.0,
        }
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn order_pos(&self) -> usize {
        self.order_pos
    }

    pub fn range(&self) -> SampleRange {
        self.range
    }

    pub fn is_joined(&self) -> bool {
        !self.joined.is_empty()
    }

    /// The constituents of a joined segment.
    pub fn joined_segments(&self) -> &[Segment] {
        &self.joined
    }

    pub fn display_x(&self) -> f64 {
        self.x
    }

    pub fn display_width(&self) -> f64 {
        self.width
    }

    /// Returns true if the display position falls within this segment.
    pub fn covers_display_pos(&self, x: f64) -> bool {
        x >= self.x && x < self.x + self.width
    }

    pub(crate) fn set_order_pos(&mut self, order_pos: usize) {
        self.order_pos = order_pos;
    }

    pub(crate) fn set_geometry(&mut self, x: f64, width: f64) {
        self.x = x;
        self.width = width;
    }

    pub(crate) fn take_joined(&mut self) -> Vec<Segment> {
        std::mem::take(&mut self.joined)
    }
}
