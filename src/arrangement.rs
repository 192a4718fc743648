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
//! The arrangement engine: an ordered list of waveform segments over a sample
//! buffer, together with the slice points and loop markers placed on it.
//!
//! Segments are addressed externally by order position and internally by a stable
//! [`SegmentId`], so that history commands can hold on to them across structural
//! edits. Every structural edit renumbers the order positions and re-derives the
//! display geometry so the segments fill the display width in proportion to their
//! frame counts.
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::audio::{SampleBuffer, SampleRange};

mod error;
mod loop_markers;
mod segment;
mod slice_points;

pub use error::ArrangementError;
pub use loop_markers::{LoopMarker, LoopMarkers, MarkerSide, SnapMode, SNAP_THRESHOLD};
pub use segment::{Segment, SegmentId};
pub use slice_points::{ranges_from_slice_points, SlicePoint, SlicePointId};

/// The display width used when none is configured.
pub const DEFAULT_DISPLAY_WIDTH: f64 = 1024.0;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Hands out identifiers for segments and slice points. Unique for the process.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Logs and returns an arrangement error. Rejected edits never change state.
pub(crate) fn reject<T>(err: ArrangementError) -> Result<T, ArrangementError> {
    warn!(error = %err, "Rejected arrangement edit");
    Err(err)
}

/// A copy of the complete arrangement state, used to revert wholesale edits.
#[derive(Debug, Clone, PartialEq)]
pub struct ArrangementSnapshot {
    source_frames: usize,
    segments: Vec<Segment>,
    slice_points: Vec<SlicePoint>,
    loop_markers: Option<LoopMarkers>,
}

/// The segment, slice point and loop marker state of the loaded sample.
#[derive(Clone)]
pub struct Arrangement {
    /// Length of the sample buffer the segments address.
    source_frames: usize,
    segments: Vec<Segment>,
    slice_points: Vec<SlicePoint>,
    loop_markers: Option<LoopMarkers>,
    display_width: f64,
    snap_mode: SnapMode,
}

impl Default for Arrangement {
    fn default() -> Self {
        Self::new(DEFAULT_DISPLAY_WIDTH)
    }
}

impl Arrangement {
    /// Creates an empty arrangement laid out over the given display width.
    pub fn new(display_width: f64) -> Self {
        let display_width = if display_width.is_finite() && display_width > 0.0 {
            display_width
        } else {
            DEFAULT_DISPLAY_WIDTH
        };
        Self {
            source_frames: 0,
            segments: Vec::new(),
            slice_points: Vec::new(),
            loop_markers: None,
            display_width,
            snap_mode: SnapMode::Off,
        }
    }

    /// Number of frames in the underlying sample buffer.
    pub fn source_frames(&self) -> usize {
        self.source_frames
    }

    /// Number of frames covered by the current segments.
    pub fn total_frames(&self) -> usize {
        self.segments.iter().map(|s| s.range().num_frames).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn display_width(&self) -> f64 {
        self.display_width
    }

    pub fn snap_mode(&self) -> SnapMode {
        self.snap_mode
    }

    pub fn set_snap_mode(&mut self, snap_mode: SnapMode) {
        self.snap_mode = snap_mode;
    }

    /// The segments in order position order.
    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn segment(&self, order_pos: usize) -> Option<&Segment> {
        self.segments.get(order_pos)
    }

    /// Looks up the current order position of a segment.
    pub fn position_of(&self, id: SegmentId) -> Option<usize> {
        self.segments.iter().position(|s| s.id() == id)
    }

    /// The sample range of every segment in order.
    pub fn sample_ranges(&self) -> Vec<SampleRange> {
        self.segments.iter().map(Segment::range).collect()
    }

    /// Replaces everything with a single segment covering the whole buffer.
    pub fn create_waveform(&mut self, buffer: &SampleBuffer) -> Result<&[Segment], ArrangementError> {
        if buffer.num_frames() == 0 {
            return reject(ArrangementError::Empty);
        }
        self.slice_points.clear();
        self.loop_markers = None;
        self.create_segments(buffer, &[buffer.full_range()])
    }

    /// Replaces the segment list with one segment per range. The ranges must
    /// partition the whole buffer in ascending frame order.
    pub fn create_segments(
        &mut self,
        buffer: &SampleBuffer,
        ranges: &[SampleRange],
    ) -> Result<&[Segment], ArrangementError> {
        self.set_segments(buffer.num_frames(), ranges)?;
        Ok(&self.segments)
    }

    pub(crate) fn set_segments(
        &mut self,
        total_frames: usize,
        ranges: &[SampleRange],
    ) -> Result<(), ArrangementError> {
        validate_partition(total_frames, ranges)?;

        self.source_frames = total_frames;
        self.segments = ranges
            .iter()
            .enumerate()
            .map(|(order_pos, range)| Segment::new(SegmentId(next_id()), order_pos, *range))
            .collect();
        self.layout();
        self.reset_loop_markers();
        debug!(
            segments = self.segments.len(),
            total_frames, "Created segments"
        );
        Ok(())
    }

    /// Merges the segments at the given consecutive order positions into one,
    /// placed at the first position. The segments must also be adjacent in frames.
    pub fn join(&mut self, order_positions: &[usize]) -> Result<&Segment, ArrangementError> {
        if order_positions.len() < 2 {
            return reject(ArrangementError::NotEnoughSegments(2));
        }
        self.check_positions(order_positions)?;
        if order_positions.windows(2).any(|pair| pair[1] != pair[0] + 1) {
            return reject(ArrangementError::InvalidRange(
                "join positions must be consecutive and ascending".to_string(),
            ));
        }
        for pair in order_positions.windows(2) {
            let left = self.segments[pair[0]].range();
            let right = self.segments[pair[1]].range();
            if left.end_frame() != right.start_frame {
                return reject(ArrangementError::InvalidRange(format!(
                    "segments {left} and {right} are not adjacent"
                )));
            }
        }

        let first = order_positions[0];
        let mut constituents: Vec<Segment> = order_positions
            .iter()
            .rev()
            .map(|&pos| self.segments.remove(pos))
            .collect();
        constituents.reverse();

        let joined = Segment::joined(SegmentId(next_id()), constituents);
        self.segments.insert(first, joined);
        self.renumber();
        self.layout();
        debug!(order_pos = first, count = order_positions.len(), "Joined segments");
        Ok(&self.segments[first])
    }

    /// Restores the constituents of a joined segment in its place. A segment that
    /// was never joined is left alone and an empty list is returned.
    pub fn split(&mut self, order_pos: usize) -> Result<Vec<Segment>, ArrangementError> {
        let Some(segment) = self.segments.get(order_pos) else {
            return reject(ArrangementError::NoSuchPosition(order_pos));
        };
        if !segment.is_joined() {
            return Ok(Vec::new());
        }

        let mut joined = self.segments.remove(order_pos);
        let constituents = joined.take_joined();
        let count = constituents.len();
        self.segments
            .splice(order_pos..order_pos, constituents);
        self.renumber();
        self.layout();
        debug!(order_pos, count, "Split segment");
        Ok(self.segments[order_pos..order_pos + count].to_vec())
    }

    /// Moves the selected segments by `delta` places. Unselected segments keep their
    /// relative order and fill the remaining places. Returns the new positions of the
    /// selection, ascending.
    pub fn move_segments(
        &mut self,
        order_positions: &[usize],
        delta: isize,
    ) -> Result<Vec<usize>, ArrangementError> {
        let selection = self.normalised_selection(order_positions)?;
        let len = self.segments.len();
        let targets: Option<Vec<usize>> = selection
            .iter()
            .map(|&pos| pos.checked_add_signed(delta).filter(|&t| t < len))
            .collect();
        let Some(targets) = targets else {
            return reject(ArrangementError::InvalidMove { delta });
        };
        if delta == 0 {
            return Ok(targets);
        }

        let mut selected = vec![false; len];
        for &pos in &selection {
            selected[pos] = true;
        }

        let mut slots: Vec<Option<Segment>> = (0..len).map(|_| None).collect();
        let mut rest = Vec::with_capacity(len - selection.len());
        for (pos, segment) in std::mem::take(&mut self.segments).into_iter().enumerate() {
            if selected[pos] {
                // Targets are distinct because the selection is.
                let target = pos.wrapping_add_signed(delta);
                slots[target] = Some(segment);
            } else {
                rest.push(segment);
            }
        }
        let mut rest = rest.into_iter();
        for slot in slots.iter_mut().filter(|slot| slot.is_none()) {
            *slot = rest.next();
        }
        self.segments = slots.into_iter().flatten().collect();

        self.renumber();
        self.layout();
        self.update_loop_marker_frames();
        debug!(count = targets.len(), delta, "Moved segments");
        Ok(targets)
    }

    /// Inserts segments at the given order position. Loop markers are reset to the
    /// new full range.
    pub fn insert_segments(
        &mut self,
        segments: Vec<Segment>,
        order_pos: usize,
    ) -> Result<(), ArrangementError> {
        if order_pos > self.segments.len() {
            return reject(ArrangementError::NoSuchPosition(order_pos));
        }
        for segment in &segments {
            let range = segment.range();
            if !range.fits_within(self.source_frames) {
                return reject(ArrangementError::RangeOutOfBounds {
                    range,
                    total_frames: self.source_frames,
                });
            }
        }

        let count = segments.len();
        self.segments.splice(order_pos..order_pos, segments);
        self.renumber();
        self.layout();
        self.reset_loop_markers();
        debug!(order_pos, count, "Inserted segments");
        Ok(())
    }

    /// Removes the segments at the given positions and returns them in ascending
    /// order, each still carrying the order position it was removed from. The
    /// remaining segments are re-laid out to fill the display, and loop markers are
    /// reset to the new full range.
    pub fn remove_segments(
        &mut self,
        order_positions: &[usize],
    ) -> Result<Vec<Segment>, ArrangementError> {
        let selection = self.normalised_selection(order_positions)?;
        if selection.len() == self.segments.len() {
            return reject(ArrangementError::InvalidRange(
                "cannot remove every segment".to_string(),
            ));
        }

        let mut removed: Vec<Segment> = selection
            .iter()
            .rev()
            .map(|&pos| self.segments.remove(pos))
            .collect();
        removed.reverse();

        self.renumber();
        self.layout();
        self.reset_loop_markers();
        debug!(count = removed.len(), "Removed segments");
        Ok(removed)
    }

    /// Maps a frame on the timeline to a horizontal display position.
    pub fn frame_to_display_pos(&self, frame: usize) -> f64 {
        let total = self.total_frames();
        if total == 0 {
            return 0.0;
        }
        frame.min(total - 1) as f64 * self.scale()
    }

    /// Maps a horizontal display position to the nearest frame on the timeline.
    pub fn display_pos_to_frame(&self, x: f64) -> usize {
        let total = self.total_frames();
        if total == 0 || !x.is_finite() || x <= 0.0 {
            return 0;
        }
        let frame = (x / self.scale()).round();
        if frame >= (total - 1) as f64 {
            total - 1
        } else {
            frame as usize
        }
    }

    /// Changes the display width and rescales every entity's geometry.
    pub fn resize(&mut self, display_width: f64) -> Result<(), ArrangementError> {
        if !display_width.is_finite() || display_width <= 0.0 {
            return reject(ArrangementError::InvalidRange(format!(
                "display width {display_width} must be positive"
            )));
        }
        let ratio = display_width / self.display_width;
        self.display_width = display_width;
        self.layout();
        if let Some(markers) = self.loop_markers.as_mut() {
            markers.scale(ratio);
        }
        Ok(())
    }

    /// Captures the complete state for a later [`Arrangement::restore`].
    pub fn snapshot(&self) -> ArrangementSnapshot {
        ArrangementSnapshot {
            source_frames: self.source_frames,
            segments: self.segments.clone(),
            slice_points: self.slice_points.clone(),
            loop_markers: self.loop_markers.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: ArrangementSnapshot) {
        self.source_frames = snapshot.source_frames;
        self.segments = snapshot.segments;
        self.slice_points = snapshot.slice_points;
        self.loop_markers = snapshot.loop_markers;
        self.layout();
    }

    /// Forgets the loaded sample.
    pub fn clear(&mut self) {
        self.source_frames = 0;
        self.segments.clear();
        self.slice_points.clear();
        self.loop_markers = None;
    }

    fn scale(&self) -> f64 {
        self.display_width / self.total_frames() as f64
    }

    fn renumber(&mut self) {
        for (order_pos, segment) in self.segments.iter_mut().enumerate() {
            segment.set_order_pos(order_pos);
        }
    }

    fn layout(&mut self) {
        let total = self.total_frames();
        if total == 0 {
            return;
        }
        let scale = self.display_width / total as f64;
        let mut x = 0.0;
        for segment in self.segments.iter_mut() {
            let width = segment.range().num_frames as f64 * scale;
            segment.set_geometry(x, width);
            x += width;
        }
    }

    fn check_positions(&self, order_positions: &[usize]) -> Result<(), ArrangementError> {
        match order_positions.iter().find(|&&pos| pos >= self.segments.len()) {
            Some(&pos) => reject(ArrangementError::NoSuchPosition(pos)),
            None => Ok(()),
        }
    }

    /// Sorts and de-duplicates a selection after checking every position exists.
    fn normalised_selection(&self, order_positions: &[usize]) -> Result<Vec<usize>, ArrangementError> {
        if order_positions.is_empty() {
            return reject(ArrangementError::NotEnoughSegments(1));
        }
        self.check_positions(order_positions)?;
        let mut selection = order_positions.to_vec();
        selection.sort_unstable();
        selection.dedup();
        Ok(selection)
    }
}

impl fmt::Debug for Arrangement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Arrangement")
            .field("source_frames", &self.source_frames)
            .field("segments", &self.sample_ranges())
            .field("slice_points", &self.slice_point_frames())
            .field("loop_markers", &self.loop_markers)
            .field("display_width", &self.display_width)
            .field("snap_mode", &self.snap_mode)
            .finish()
    }
}

/// Checks that the ranges cover `[0, total_frames)` without gaps or overlaps.
fn validate_partition(total_frames: usize, ranges: &[SampleRange]) -> Result<(), ArrangementError> {
    if ranges.is_empty() {
        return reject(ArrangementError::InvalidRange("no ranges given".to_string()));
    }
    let mut expected_start = 0;
    for range in ranges {
        if range.num_frames == 0 {
            return reject(ArrangementError::InvalidRange(format!("empty range {range}")));
        }
        if range.start_frame != expected_start {
            return reject(ArrangementError::InvalidRange(format!(
                "range {range} should start at frame {expected_start}"
            )));
        }
        if range.end_frame() > total_frames {
            return reject(ArrangementError::RangeOutOfBounds {
                range: *range,
                total_frames,
            });
        }
        expected_start = range.end_frame();
    }
    if expected_start != total_frames {
        return reject(ArrangementError::InvalidRange(format!(
            "ranges end at frame {expected_start} of {total_frames}"
        )));
    }
    Ok(())
}
