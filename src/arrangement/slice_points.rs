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
use tracing::debug;

use crate::audio::SampleRange;

use super::{next_id, reject, Arrangement, ArrangementError, SnapMode};

/// Stable identifier of a slice point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlicePointId(pub(crate) u64);

/// A cut position in the sample, waiting to become a segment boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlicePoint {
    id: SlicePointId,
    frame: usize,
}

impl SlicePoint {
    pub fn id(&self) -> SlicePointId {
        self.id
    }

    pub fn frame(&self) -> usize {
        self.frame
    }
}

/// Derives contiguous ranges covering `[0, total_frames)` cut at the given
/// frames. Cuts are sorted and de-duplicated, and cuts at the buffer edges or
/// beyond are ignored.
pub fn ranges_from_slice_points(frames: &[usize], total_frames: usize) -> Vec<SampleRange> {
    if total_frames == 0 {
        return Vec::new();
    }
    let mut cuts: Vec<usize> = frames
        .iter()
        .copied()
        .filter(|&frame| frame > 0 && frame < total_frames)
        .collect();
    cuts.sort_unstable();
    cuts.dedup();

    let mut ranges = Vec::with_capacity(cuts.len() + 1);
    let mut start = 0;
    for cut in cuts.into_iter().chain(std::iter::once(total_frames)) {
        ranges.push(SampleRange::new(start, cut - start));
        start = cut;
    }
    ranges
}

impl Arrangement {
    /// Places a slice point. Any frame inside the sample is accepted; minimum
    /// spacing is left to the caller.
    pub fn add_slice_point(&mut self, frame: usize) -> Result<SlicePointId, ArrangementError> {
        self.check_frame(frame)?;
        let id = SlicePointId(next_id());
        self.slice_points.push(SlicePoint { id, frame });
        Ok(id)
    }

    /// Places several slice points at once. Nothing is added if any frame is out
    /// of range.
    pub fn add_slice_points(&mut self, frames: &[usize]) -> Result<Vec<SlicePointId>, ArrangementError> {
        for &frame in frames {
            self.check_frame(frame)?;
        }
        Ok(frames
            .iter()
            .map(|&frame| {
                let id = SlicePointId(next_id());
                self.slice_points.push(SlicePoint { id, frame });
                id
            })
            .collect())
    }

    /// Puts back a slice point previously taken out with
    /// [`Arrangement::remove_slice_point`], keeping its identity.
    pub fn restore_slice_point(&mut self, point: SlicePoint) -> Result<(), ArrangementError> {
        self.check_frame(point.frame)?;
        if self.slice_point(point.id).is_none() {
            self.slice_points.push(point);
        }
        Ok(())
    }

    pub fn remove_slice_point(&mut self, id: SlicePointId) -> Result<SlicePoint, ArrangementError> {
        match self.slice_points.iter().position(|p| p.id == id) {
            Some(index) => Ok(self.slice_points.remove(index)),
            None => reject(ArrangementError::NoSuchSlicePoint(id)),
        }
    }

    /// Moves a slice point to a new frame and returns the frame it was at.
    pub fn move_slice_point(&mut self, id: SlicePointId, frame: usize) -> Result<usize, ArrangementError> {
        self.check_frame(frame)?;
        match self.slice_points.iter_mut().find(|p| p.id == id) {
            Some(point) => Ok(std::mem::replace(&mut point.frame, frame)),
            None => reject(ArrangementError::NoSuchSlicePoint(id)),
        }
    }

    /// Resolves the drop position of a dragged slice point to a frame, snapping it
    /// onto a nearby loop marker first when the snap mode asks for it. The point
    /// itself is not moved.
    pub fn slice_point_frame_at(&self, x: f64) -> usize {
        let x = if self.snap_mode == SnapMode::SlicesToMarkers {
            self.snap_to_loop_marker(x)
        } else {
            x
        };
        self.display_pos_to_frame(x)
    }

    pub fn slice_point(&self, id: SlicePointId) -> Option<&SlicePoint> {
        self.slice_points.iter().find(|p| p.id == id)
    }

    /// Slice points in the order they were placed.
    pub fn slice_points(&self) -> &[SlicePoint] {
        &self.slice_points
    }

    /// Finds a slice point sitting exactly at the given frame.
    pub fn slice_point_at_frame(&self, frame: usize) -> Option<&SlicePoint> {
        self.slice_points.iter().find(|p| p.frame == frame)
    }

    /// Slice point frames, ascending.
    pub fn slice_point_frames(&self) -> Vec<usize> {
        let mut frames: Vec<usize> = self.slice_points.iter().map(|p| p.frame).collect();
        frames.sort_unstable();
        frames
    }

    pub fn slice_point_display_pos(&self, id: SlicePointId) -> Option<f64> {
        self.slice_point(id).map(|p| self.frame_to_display_pos(p.frame))
    }

    pub fn clear_slice_points(&mut self) -> Vec<SlicePoint> {
        std::mem::take(&mut self.slice_points)
    }

    /// Cuts the whole sample at the current slice points, replacing every segment.
    /// The slice points are consumed.
    pub fn create_slices_from_points(&mut self) -> Result<Vec<SampleRange>, ArrangementError> {
        let frames = self.slice_point_frames();
        self.create_slices_at(&frames)
    }

    /// Cuts the whole sample at the given frames, replacing every segment and
    /// consuming the slice points.
    pub fn create_slices_at(&mut self, frames: &[usize]) -> Result<Vec<SampleRange>, ArrangementError> {
        if self.source_frames == 0 {
            return reject(ArrangementError::Empty);
        }
        let ranges = ranges_from_slice_points(frames, self.source_frames);
        self.set_segments(self.source_frames, &ranges)?;
        self.slice_points.clear();
        debug!(slices = ranges.len(), "Created slices from slice points");
        Ok(ranges)
    }

    fn check_frame(&self, frame: usize) -> Result<(), ArrangementError> {
        if frame >= self.source_frames {
            return reject(ArrangementError::FrameOutOfBounds {
                frame,
                total_frames: self.source_frames,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::SampleBuffer;

    fn arrangement(frames: usize) -> Arrangement {
        let buffer = SampleBuffer::from_planar(vec![vec![0.0; frames]]).expect("buffer");
        let mut arrangement = Arrangement::new(1000.0);
        arrangement.create_waveform(&buffer).expect("waveform");
        arrangement
    }

    #[test]
    fn test_slices_from_points_partition_the_buffer() {
        let mut arrangement = arrangement(44_100);
        for frame in [20_000, 10_000, 30_000] {
            arrangement.add_slice_point(frame).expect("slice point");
        }

        let ranges = arrangement.create_slices_from_points().expect("slices");
        assert_eq!(
            vec![
                SampleRange::new(0, 10_000),
                SampleRange::new(10_000, 10_000),
                SampleRange::new(20_000, 10_000),
                SampleRange::new(30_000, 14_100),
            ],
            ranges
        );
        assert_eq!(ranges, arrangement.sample_ranges());
        assert!(arrangement.slice_points().is_empty());
    }

    #[test]
    fn test_ranges_ignore_edges_and_duplicates() {
        assert_eq!(
            vec![SampleRange::new(0, 5), SampleRange::new(5, 5)],
            ranges_from_slice_points(&[0, 5, 5, 10, 12], 10)
        );
        assert_eq!(vec![SampleRange::new(0, 10)], ranges_from_slice_points(&[], 10));
        assert!(ranges_from_slice_points(&[3], 0).is_empty());
    }

    #[test]
    fn test_add_move_remove_slice_points() {
        let mut arrangement = arrangement(1000);
        let id = arrangement.add_slice_point(100).expect("add");
        assert_eq!(Some(100), arrangement.slice_point(id).map(SlicePoint::frame));

        assert_eq!(100, arrangement.move_slice_point(id, 300).expect("move"));
        assert_eq!(Some(300), arrangement.slice_point(id).map(SlicePoint::frame));
        assert_eq!(Some(300.0), arrangement.slice_point_display_pos(id));

        let removed = arrangement.remove_slice_point(id).expect("remove");
        assert!(arrangement.slice_points().is_empty());
        assert!(arrangement.remove_slice_point(id).is_err());

        arrangement.restore_slice_point(removed).expect("restore");
        assert_eq!(Some(&removed), arrangement.slice_point(id));
    }

    #[test]
    fn test_slice_points_must_be_inside_sample() {
        let mut arrangement = arrangement(1000);
        assert!(matches!(
            arrangement.add_slice_point(1000),
            Err(ArrangementError::FrameOutOfBounds { frame: 1000, .. })
        ));
        assert!(arrangement.add_slice_points(&[10, 2000]).is_err());
        assert!(arrangement.slice_points().is_empty());

        let ids = arrangement.add_slice_points(&[10, 20]).expect("add");
        assert_eq!(2, ids.len());
        assert_eq!(vec![10, 20], arrangement.slice_point_frames());
        assert!(arrangement.slice_point_at_frame(20).is_some());
    }

    #[test]
    fn test_create_slices_needs_a_sample() {
        let mut arrangement = Arrangement::default();
        assert!(matches!(
            arrangement.create_slices_at(&[5]),
            Err(ArrangementError::Empty)
        ));
    }
}
