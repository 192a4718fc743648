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
use tracing::debug;

use crate::audio::SampleRange;

use super::{reject, Arrangement, ArrangementError};

/// Distance in display units within which a dropped slice point snaps onto a loop
/// marker.
pub const SNAP_THRESHOLD: f64 = 30.0;

/// Which entities snap to which when dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SnapMode {
    #[default]
    Off,
    /// Loop markers snap to slice points, or to segment boundaries once the sample
    /// has been sliced.
    MarkersToSlices,
    /// Slice points snap to nearby loop markers.
    SlicesToMarkers,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerSide {
    Left,
    Right,
}

/// One loop marker. The frame addresses the sample buffer, the position is in
/// display units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopMarker {
    frame: usize,
    x: f64,
}

impl LoopMarker {
    pub fn frame(&self) -> usize {
        self.frame
    }

    pub fn display_x(&self) -> f64 {
        self.x
    }
}

/// The left/right loop marker pair.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopMarkers {
    left: LoopMarker,
    right: LoopMarker,
    visible: bool,
}

impl LoopMarkers {
    pub fn left(&self) -> LoopMarker {
        self.left
    }

    pub fn right(&self) -> LoopMarker {
        self.right
    }

    pub fn get(&self, side: MarkerSide) -> LoopMarker {
        match side {
            MarkerSide::Left => self.left,
            MarkerSide::Right => self.right,
        }
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub(crate) fn scale(&mut self, ratio: f64) {
        self.left.x *= ratio;
        self.right.x *= ratio;
    }

    fn get_mut(&mut self, side: MarkerSide) -> &mut LoopMarker {
        match side {
            MarkerSide::Left => &mut self.left,
            MarkerSide::Right => &mut self.right,
        }
    }
}

impl Arrangement {
    /// Shows the loop markers, creating them around the whole timeline the first
    /// time.
    pub fn show_loop_markers(&mut self) -> Result<&LoopMarkers, ArrangementError> {
        if self.segments.is_empty() {
            return reject(ArrangementError::Empty);
        }
        if self.loop_markers.is_none() {
            self.loop_markers = Some(self.full_range_markers());
        }
        match self.loop_markers.as_mut() {
            Some(markers) => {
                markers.visible = true;
                Ok(&*markers)
            }
            None => reject(ArrangementError::NoLoopMarkers),
        }
    }

    pub fn hide_loop_markers(&mut self) {
        if let Some(markers) = self.loop_markers.as_mut() {
            markers.visible = false;
        }
    }

    pub fn loop_markers(&self) -> Option<&LoopMarkers> {
        self.loop_markers.as_ref()
    }

    /// Drops a loop marker at a display position and returns its new frame. With
    /// [`SnapMode::MarkersToSlices`] the position is first snapped to the nearest
    /// slice point or segment boundary. Keeping the left marker before the right
    /// one is up to the caller.
    pub fn drag_loop_marker(&mut self, side: MarkerSide, x: f64) -> Result<usize, ArrangementError> {
        if self.loop_markers.is_none() {
            return reject(ArrangementError::NoLoopMarkers);
        }
        let max_x = self.frame_to_display_pos(self.total_frames().saturating_sub(1));
        let mut x = if x.is_finite() { x.clamp(0.0, max_x) } else { 0.0 };
        if self.snap_mode == SnapMode::MarkersToSlices {
            x = self.snap_loop_marker(x);
        }
        let frame = self.frame_at_marker_pos(x);

        if let Some(markers) = self.loop_markers.as_mut() {
            *markers.get_mut(side) = LoopMarker { frame, x };
        }
        debug!(?side, frame, "Loop marker moved");
        Ok(frame)
    }

    /// The parts of each segment between the loop markers, in playback order.
    pub fn ranges_between_loop_markers(&self) -> Vec<SampleRange> {
        let Some(markers) = self.loop_markers.as_ref() else {
            return Vec::new();
        };
        let left_frame = markers.left.frame;
        let right_frame = markers.right.frame;
        let left_pos = self.order_pos_at(markers.left.x);
        let mut right_pos = self.order_pos_at(markers.right.x);
        // A right marker on a segment's first frame ends the loop before it.
        if right_pos > left_pos && self.segments[right_pos].range().start_frame == right_frame {
            right_pos -= 1;
        }
        if left_pos > right_pos {
            return Vec::new();
        }

        self.segments[left_pos..=right_pos]
            .iter()
            .filter_map(|segment| {
                let range = segment.range();
                let start_frame = if left_frame > range.start_frame && left_frame < range.last_frame() {
                    left_frame
                } else {
                    range.start_frame
                };
                let num_frames = if right_frame > range.start_frame && right_frame < range.end_frame() {
                    right_frame.saturating_sub(start_frame)
                } else {
                    range.num_frames - (start_frame - range.start_frame)
                };
                (num_frames > 0).then(|| SampleRange::new(start_frame, num_frames))
            })
            .collect()
    }

    /// Number of timeline frames between the two loop markers.
    pub fn num_frames_between_loop_markers(&self) -> usize {
        self.loop_markers
            .as_ref()
            .map(|m| self.display_pos_to_frame(m.right.x - m.left.x))
            .unwrap_or(0)
    }

    /// Snaps a slice point drop position onto a visible loop marker within
    /// [`SNAP_THRESHOLD`].
    pub(crate) fn snap_to_loop_marker(&self, x: f64) -> f64 {
        match self.loop_markers.as_ref() {
            Some(markers) if markers.visible => {
                if (x - markers.left.x).abs() <= SNAP_THRESHOLD {
                    markers.left.x
                } else if (x - markers.right.x).abs() <= SNAP_THRESHOLD {
                    markers.right.x
                } else {
                    x
                }
            }
            _ => x,
        }
    }

    /// Puts back markers saved before an edit that reset them.
    pub(crate) fn restore_loop_markers(&mut self, markers: Option<LoopMarkers>) {
        self.loop_markers = markers;
    }

    pub(crate) fn reset_loop_markers(&mut self) {
        if self.loop_markers.is_some() && !self.segments.is_empty() {
            let visible = self.loop_markers.as_ref().is_some_and(|m| m.visible);
            let mut markers = self.full_range_markers();
            markers.visible = visible;
            self.loop_markers = Some(markers);
        }
    }

    /// Re-reads the marker frames after segments have moved under them.
    pub(crate) fn update_loop_marker_frames(&mut self) {
        if let Some(mut markers) = self.loop_markers.take() {
            markers.left.frame = self.frame_at_marker_pos(markers.left.x);
            markers.right.frame = self.frame_at_marker_pos(markers.right.x);
            self.loop_markers = Some(markers);
        }
    }

    fn full_range_markers(&self) -> LoopMarkers {
        let right_x = self.frame_to_display_pos(self.total_frames().saturating_sub(1));
        LoopMarkers {
            left: LoopMarker {
                frame: self.frame_at_marker_pos(0.0),
                x: 0.0,
            },
            right: LoopMarker {
                frame: self.frame_at_marker_pos(right_x),
                x: right_x,
            },
            visible: false,
        }
    }

    /// Index of the segment under a display position, or the first one.
    fn order_pos_at(&self, x: f64) -> usize {
        self.segments
            .iter()
            .position(|s| s.covers_display_pos(x))
            .unwrap_or(0)
    }

    /// Buffer frame under a display position.
    fn frame_at_marker_pos(&self, x: f64) -> usize {
        let segment = self
            .segments
            .iter()
            .find(|s| s.covers_display_pos(x))
            .or_else(|| self.segments.last());
        match segment {
            Some(segment) => {
                let range = segment.range();
                let offset = self.display_pos_to_frame(x - segment.display_x());
                (range.start_frame + offset).min(range.last_frame())
            }
            None => 0,
        }
    }

    fn snap_loop_marker(&self, x: f64) -> f64 {
        let max_x = self.frame_to_display_pos(self.total_frames().saturating_sub(1));
        let candidates: Vec<f64> = if self.segments.len() > 1 {
            self.segments
                .iter()
                .map(|s| s.display_x())
                .chain(std::iter::once(max_x))
                .collect()
        } else {
            std::iter::once(0.0)
                .chain(
                    self.slice_points
                        .iter()
                        .map(|p| self.frame_to_display_pos(p.frame()))
                        .filter(|&px| px > 0.0 && px < max_x),
                )
                .chain(std::iter::once(max_x))
                .collect()
        };

        let mut snapped = 0.0;
        let mut shortest = self.display_width;
        for candidate in candidates {
            let distance = (x - candidate).abs();
            if distance < shortest {
                shortest = distance;
                snapped = candidate;
            }
        }
        snapped
    }
}
