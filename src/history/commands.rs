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
use crate::arrangement::{
    Arrangement, ArrangementError, ArrangementSnapshot, LoopMarkers, Segment, SlicePoint,
    SlicePointId,
};

use super::EditCommand;

/// Places a slice point. Redo restores the same point identity.
#[derive(Debug)]
pub struct AddSlicePoint {
    frame: usize,
    point: Option<SlicePoint>,
}

impl AddSlicePoint {
    pub fn new(frame: usize) -> Self {
        Self { frame, point: None }
    }

    /// The point created by the first apply.
    pub fn slice_point_id(&self) -> Option<SlicePointId> {
        self.point.map(|p| p.id())
    }
}

impl EditCommand for AddSlicePoint {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        match self.point {
            Some(point) => arrangement.restore_slice_point(point),
            None => {
                let id = arrangement.add_slice_point(self.frame)?;
                self.point = arrangement.slice_point(id).copied();
                Ok(())
            }
        }
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        match self.point {
            Some(point) => arrangement.remove_slice_point(point.id()).map(|_| ()),
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        "Add Slice Point"
    }
}

/// Moves a slice point between two known frames.
#[derive(Debug)]
pub struct MoveSlicePoint {
    id: SlicePointId,
    old_frame: usize,
    new_frame: usize,
}

impl MoveSlicePoint {
    pub fn new(id: SlicePointId, old_frame: usize, new_frame: usize) -> Self {
        Self {
            id,
            old_frame,
            new_frame,
        }
    }
}

impl EditCommand for MoveSlicePoint {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        arrangement.move_slice_point(self.id, self.new_frame).map(|_| ())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        arrangement.move_slice_point(self.id, self.old_frame).map(|_| ())
    }

    fn description(&self) -> &str {
        "Move Slice Point"
    }
}

#[derive(Debug)]
pub struct DeleteSlicePoint {
    id: SlicePointId,
    removed: Option<SlicePoint>,
}

impl DeleteSlicePoint {
    pub fn new(id: SlicePointId) -> Self {
        Self { id, removed: None }
    }
}

impl EditCommand for DeleteSlicePoint {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        self.removed = Some(arrangement.remove_slice_point(self.id)?);
        Ok(())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        match self.removed.take() {
            Some(point) => arrangement.restore_slice_point(point),
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        "Delete Slice Point"
    }
}

/// Reorders segments on the timeline.
#[derive(Debug)]
pub struct MoveSegments {
    order_positions: Vec<usize>,
    delta: isize,
    moved_to: Vec<usize>,
}

impl MoveSegments {
    pub fn new(order_positions: Vec<usize>, delta: isize) -> Self {
        Self {
            order_positions,
            delta,
            moved_to: Vec::new(),
        }
    }
}

impl EditCommand for MoveSegments {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        self.moved_to = arrangement.move_segments(&self.order_positions, self.delta)?;
        Ok(())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        arrangement
            .move_segments(&self.moved_to, -self.delta)
            .map(|_| ())
    }

    fn description(&self) -> &str {
        "Move Waveform Slice"
    }
}

#[derive(Debug)]
pub struct JoinSegments {
    order_positions: Vec<usize>,
}

impl JoinSegments {
    pub fn new(order_positions: Vec<usize>) -> Self {
        Self { order_positions }
    }
}

impl EditCommand for JoinSegments {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        arrangement.join(&self.order_positions).map(|_| ())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        match self.order_positions.first() {
            Some(&first) => arrangement.split(first).map(|_| ()),
            None => Ok(()),
        }
    }

    fn description(&self) -> &str {
        "Join Waveform Slices"
    }
}

/// Splits a joined segment. Splitting a plain segment records nothing to undo.
#[derive(Debug)]
pub struct SplitSegment {
    order_pos: usize,
    restored: usize,
}

impl SplitSegment {
    pub fn new(order_pos: usize) -> Self {
        Self {
            order_pos,
            restored: 0,
        }
    }
}

impl EditCommand for SplitSegment {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        self.restored = arrangement.split(self.order_pos)?.len();
        Ok(())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        if self.restored < 2 {
            return Ok(());
        }
        let positions: Vec<usize> = (self.order_pos..self.order_pos + self.restored).collect();
        arrangement.join(&positions).map(|_| ())
    }

    fn description(&self) -> &str {
        "Split Waveform Slice"
    }
}

/// Removes segments. Removal resets the loop markers, so the markers from before
/// are kept and put back on undo.
#[derive(Debug)]
pub struct RemoveSegments {
    order_positions: Vec<usize>,
    removed: Vec<Segment>,
    loop_markers: Option<LoopMarkers>,
}

impl RemoveSegments {
    pub fn new(order_positions: Vec<usize>) -> Self {
        Self {
            order_positions,
            removed: Vec::new(),
            loop_markers: None,
        }
    }
}

impl EditCommand for RemoveSegments {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        let loop_markers = arrangement.loop_markers().cloned();
        self.removed = arrangement.remove_segments(&self.order_positions)?;
        self.loop_markers = loop_markers;
        Ok(())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        // Ascending re-insertion puts every segment back at its old position.
        for segment in std::mem::take(&mut self.removed) {
            let order_pos = segment.order_pos();
            arrangement.insert_segments(vec![segment], order_pos)?;
        }
        arrangement.restore_loop_markers(self.loop_markers.take());
        Ok(())
    }

    fn description(&self) -> &str {
        "Delete Waveform Slices"
    }
}

/// Replaces the segments with slices cut at the given frames (or at the current
/// slice points). The whole arrangement is snapshotted either side of the edit.
#[derive(Debug)]
pub struct CreateSlices {
    frames: Option<Vec<usize>>,
    before: Option<ArrangementSnapshot>,
    after: Option<ArrangementSnapshot>,
}

impl CreateSlices {
    /// Slices at the arrangement's slice points.
    pub fn from_slice_points() -> Self {
        Self {
            frames: None,
            before: None,
            after: None,
        }
    }

    /// Slices at explicit frames.
    pub fn at_frames(frames: Vec<usize>) -> Self {
        Self {
            frames: Some(frames),
            before: None,
            after: None,
        }
    }
}

impl EditCommand for CreateSlices {
    fn apply(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        if let Some(after) = self.after.clone() {
            arrangement.restore(after);
            return Ok(());
        }
        let before = arrangement.snapshot();
        match &self.frames {
            Some(frames) => arrangement.create_slices_at(frames)?,
            None => arrangement.create_slices_from_points()?,
        };
        self.before = Some(before);
        self.after = Some(arrangement.snapshot());
        Ok(())
    }

    fn undo(&mut self, arrangement: &mut Arrangement) -> Result<(), ArrangementError> {
        if let Some(before) = self.before.clone() {
            arrangement.restore(before);
        }
        Ok(())
    }

    fn description(&self) -> &str {
        "Create Slices"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::arrangement::MarkerSide;
    use crate::audio::{SampleBuffer, SampleRange};
    use crate::history::History;

    fn arrangement() -> Arrangement {
        let buffer = SampleBuffer::from_planar(vec![vec![0.0; 1000]]).expect("buffer");
        let mut arrangement = Arrangement::new(1000.0);
        arrangement.create_waveform(&buffer).expect("waveform");
        arrangement
    }

    fn sliced() -> Arrangement {
        let mut arrangement = arrangement();
        arrangement
            .create_slices_at(&[250, 500, 750])
            .expect("slices");
        arrangement
    }

    #[test]
    fn test_add_slice_point_redo_keeps_identity() {
        let mut arrangement = arrangement();
        let mut history = History::new();
        let mut add = AddSlicePoint::new(400);
        add.apply(&mut arrangement).expect("apply");
        let id = add.slice_point_id().expect("id");
        history.push(Box::new(MoveSlicePoint::new(id, 400, 450)), &mut arrangement).expect("move");

        add.undo(&mut arrangement).expect("undo");
        assert!(arrangement.slice_point(id).is_none());
        add.apply(&mut arrangement).expect("redo");
        assert!(arrangement.slice_point(id).is_some());
    }

    #[test]
    fn test_move_and_delete_slice_point() {
        let mut arrangement = arrangement();
        let id = arrangement.add_slice_point(100).expect("add");
        let mut history = History::new();

        history
            .push(Box::new(MoveSlicePoint::new(id, 100, 150)), &mut arrangement)
            .expect("push");
        assert_eq!(vec![150], arrangement.slice_point_frames());
        history
            .push(Box::new(DeleteSlicePoint::new(id)), &mut arrangement)
            .expect("push");
        assert!(arrangement.slice_points().is_empty());

        history.undo(&mut arrangement).expect("undo");
        assert_eq!(vec![150], arrangement.slice_point_frames());
        history.undo(&mut arrangement).expect("undo");
        assert_eq!(vec![100], arrangement.slice_point_frames());
    }

    #[test]
    fn test_move_segments_undo() {
        let mut arrangement = sliced();
        let before = arrangement.sample_ranges();
        let mut history = History::new();

        history
            .push(Box::new(MoveSegments::new(vec![3], -2)), &mut arrangement)
            .expect("push");
        assert_eq!(SampleRange::new(750, 250), arrangement.sample_ranges()[1]);

        history.undo(&mut arrangement).expect("undo");
        assert_eq!(before, arrangement.sample_ranges());
        history.redo(&mut arrangement).expect("redo");
        assert_eq!(SampleRange::new(750, 250), arrangement.sample_ranges()[1]);
    }

    #[test]
    fn test_join_and_split_undo() {
        let mut arrangement = sliced();
        let before = arrangement.sample_ranges();
        let mut history = History::new();

        history
            .push(Box::new(JoinSegments::new(vec![1, 2])), &mut arrangement)
            .expect("join");
        assert_eq!(3, arrangement.len());
        history
            .push(Box::new(SplitSegment::new(1)), &mut arrangement)
            .expect("split");
        assert_eq!(before, arrangement.sample_ranges());

        history.undo(&mut arrangement).expect("undo split");
        assert_eq!(SampleRange::new(250, 500), arrangement.sample_ranges()[1]);
        history.undo(&mut arrangement).expect("undo join");
        assert_eq!(before, arrangement.sample_ranges());
    }

    #[test]
    fn test_join_after_reorder_undoes_to_same_order() {
        let mut arrangement = sliced();
        let mut history = History::new();
        history
            .push(Box::new(MoveSegments::new(vec![2], -1)), &mut arrangement)
            .expect("move");
        let reordered = arrangement.sample_ranges();
        assert_eq!(
            vec![
                SampleRange::new(0, 250),
                SampleRange::new(500, 250),
                SampleRange::new(250, 250),
                SampleRange::new(750, 250),
            ],
            reordered
        );

        // The first and third segments touch in frames but not in order.
        assert!(history
            .push(Box::new(JoinSegments::new(vec![0, 2])), &mut arrangement)
            .is_err());
        assert_eq!(reordered, arrangement.sample_ranges());
        assert_eq!(1, history.len());

        history
            .push(Box::new(JoinSegments::new(vec![2, 3])), &mut arrangement)
            .expect_err("not adjacent in frames");
        history
            .push(Box::new(MoveSegments::new(vec![1], 1)), &mut arrangement)
            .expect("move back");
        history
            .push(Box::new(JoinSegments::new(vec![0, 1])), &mut arrangement)
            .expect("join");
        assert_eq!(SampleRange::new(0, 500), arrangement.sample_ranges()[0]);
        history.undo(&mut arrangement).expect("undo join");
        history.undo(&mut arrangement).expect("undo move");
        assert_eq!(reordered, arrangement.sample_ranges());
    }

    #[test]
    fn test_split_of_plain_segment_undoes_to_nothing() {
        let mut arrangement = sliced();
        let mut split = SplitSegment::new(0);
        split.apply(&mut arrangement).expect("apply");
        split.undo(&mut arrangement).expect("undo");
        assert_eq!(4, arrangement.len());
    }

    #[test]
    fn test_remove_segments_undo() {
        let mut arrangement = sliced();
        let before = arrangement.segments().to_vec();
        let mut history = History::new();

        history
            .push(Box::new(RemoveSegments::new(vec![0, 2])), &mut arrangement)
            .expect("remove");
        assert_eq!(
            vec![SampleRange::new(250, 250), SampleRange::new(750, 250)],
            arrangement.sample_ranges()
        );
        history.undo(&mut arrangement).expect("undo");
        assert_eq!(before, arrangement.segments());
    }

    #[test]
    fn test_remove_segments_undo_restores_loop_markers() {
        let mut arrangement = sliced();
        arrangement.show_loop_markers().expect("markers");
        arrangement
            .drag_loop_marker(MarkerSide::Left, 300.0)
            .expect("left");
        arrangement
            .drag_loop_marker(MarkerSide::Right, 600.0)
            .expect("right");
        let before = arrangement.loop_markers().cloned().expect("markers");
        assert_eq!(300, before.left().frame());
        assert_eq!(600, before.right().frame());

        let mut history = History::new();
        history
            .push(Box::new(RemoveSegments::new(vec![3])), &mut arrangement)
            .expect("remove");
        assert_eq!(0, arrangement.loop_markers().expect("markers").left().frame());

        history.undo(&mut arrangement).expect("undo");
        assert_eq!(Some(&before), arrangement.loop_markers());
        assert_eq!(4, arrangement.len());

        history.redo(&mut arrangement).expect("redo");
        assert_eq!(3, arrangement.len());
        history.undo(&mut arrangement).expect("undo again");
        assert_eq!(Some(&before), arrangement.loop_markers());
    }

    #[test]
    fn test_create_slices_undo_restores_points() {
        let mut arrangement = arrangement();
        arrangement.add_slice_points(&[300, 600]).expect("points");
        let mut history = History::new();

        history
            .push(Box::new(CreateSlices::from_slice_points()), &mut arrangement)
            .expect("slice");
        assert_eq!(3, arrangement.len());
        assert!(arrangement.slice_points().is_empty());
        let sliced = arrangement.snapshot();

        history.undo(&mut arrangement).expect("undo");
        assert_eq!(1, arrangement.len());
        assert_eq!(vec![300, 600], arrangement.slice_point_frames());

        history.redo(&mut arrangement).expect("redo");
        assert_eq!(sliced, arrangement.snapshot());
    }
}
