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
//! The control-thread facade. An [`Editor`] owns the loaded sample, its
//! arrangement and edit history, and keeps an attached sampler's sounds in step
//! with the slice order. Callers drive it with [`Request`]s.
use std::collections::VecDeque;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::arrangement::{Arrangement, ArrangementError, LoopMarkers, MarkerSide, SlicePointId};
use crate::audio::{
    self, AudioFileError, SampleBuffer, SampleHeader, SampleRange, SaveFormat, SharedSampleBuffer,
};
use crate::config::{ConfigError, Settings};
use crate::detection::{
    self, DetectionError, DetectionMode, DetectionSettings, DetectorFactory,
    SpectralDetectorFactory,
};
use crate::history::{
    AddSlicePoint, CommandGroup, CreateSlices, DeleteSlicePoint, EditCommand, History,
    JoinSegments, MoveSegments, MoveSlicePoint, RemoveSegments, SplitSegment,
};
use crate::sampler::{self, SamplerError, SamplerHandle};

/// Velocity used when auditioning slices.
const AUDITION_VELOCITY: f32 = 1.0;

#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("No sample is loaded")]
    NoSample,

    #[error("No export directory given or configured")]
    NoExportDirectory,

    #[error("No sampler is attached")]
    NoSampler,

    #[error("Audio file error: {0}")]
    Audio(#[from] AudioFileError),

    #[error("Edit failed: {0}")]
    Arrangement(#[from] ArrangementError),

    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    #[error("Sampler error: {0}")]
    Sampler(#[from] SamplerError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Something the user asked the editor to do.
#[derive(Debug, Clone, PartialEq)]
pub enum Request {
    /// Loads a sample file, replacing whatever is open.
    Import(PathBuf),
    Close,
    FindOnsets,
    FindBeats,
    CalcBpm,
    AddSlicePoint {
        frame: usize,
    },
    /// Places a slice point at a display position, honouring the snap mode.
    AddSlicePointAt {
        x: f64,
    },
    MoveSlicePoint {
        id: SlicePointId,
        frame: usize,
    },
    DeleteSlicePoint {
        id: SlicePointId,
    },
    /// Cuts the sample at the current slice points.
    CreateSlices,
    Join {
        positions: Vec<usize>,
    },
    Split {
        order_pos: usize,
    },
    MoveSegments {
        positions: Vec<usize>,
        delta: isize,
    },
    RemoveSegments {
        positions: Vec<usize>,
    },
    Undo,
    Redo,
    /// Writes every segment to its own file, in arrangement order. Unset fields
    /// fall back to the export settings.
    ExportSlices {
        directory: Option<PathBuf>,
        format: Option<SaveFormat>,
    },
    ShowLoopMarkers,
    HideLoopMarkers,
    DragLoopMarker {
        side: MarkerSide,
        x: f64,
    },
    /// Changes the sample data itself. `None` edits the whole sample. These edits
    /// are not undoable; the arrangement and its history are kept.
    EditBuffer {
        range: Option<SampleRange>,
        edit: BufferEdit,
    },
    /// Plays the segment at an order position on its note.
    PlaySlice {
        order_pos: usize,
    },
    /// Plays an arbitrary range of the source sample.
    PlayRange(SampleRange),
    StopPlayback,
}

/// An in-place change to the loaded sample's audio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BufferEdit {
    Gain(f32),
    GainRamp { start_gain: f32, end_gain: f32 },
    Normalise,
    Reverse,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Loaded {
        header: SampleHeader,
        num_frames: usize,
    },
    Closed,
    /// Frames found by onset or beat detection that became slice points.
    Detected {
        frames: Vec<usize>,
    },
    Bpm(u32),
    SlicePointAdded(SlicePointId),
    /// The arrangement changed.
    Edited,
    /// The description of the command undone or redone, if there was one.
    History(Option<String>),
    Exported(Vec<PathBuf>),
    LoopMarkers(Option<LoopMarkers>),
    LoopMarkerMoved {
        frame: usize,
    },
    Playing,
    Stopped,
}

struct LoadedSample {
    path: PathBuf,
    buffer: SharedSampleBuffer,
    header: SampleHeader,
}

pub struct Editor {
    settings: Settings,
    sample: Option<LoadedSample>,
    arrangement: Arrangement,
    history: History,
    sampler: Option<SamplerHandle>,
    detector: Box<dyn DetectorFactory>,
}

impl Editor {
    /// Creates an editor using the built-in spectral detector.
    pub fn new(settings: Settings) -> Self {
        Self::with_detector(settings, Box::new(SpectralDetectorFactory))
    }

    pub fn with_detector(settings: Settings, detector: Box<dyn DetectorFactory>) -> Self {
        let arrangement = new_arrangement(&settings);
        Self {
            settings,
            sample: None,
            arrangement,
            history: History::new(),
            sampler: None,
            detector,
        }
    }

    /// Attaches a sampler. Its sounds are replaced with the current slices.
    pub fn attach_sampler(&mut self, handle: SamplerHandle) -> Result<(), EditorError> {
        self.sampler = Some(handle);
        self.sync_sampler()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn arrangement(&self) -> &Arrangement {
        &self.arrangement
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn is_loaded(&self) -> bool {
        self.sample.is_some()
    }

    pub fn path(&self) -> Option<&Path> {
        self.sample.as_ref().map(|s| s.path.as_path())
    }

    pub fn buffer(&self) -> Option<&SampleBuffer> {
        self.sample.as_ref().map(|s| s.buffer.as_ref())
    }

    pub fn header(&self) -> Option<&SampleHeader> {
        self.sample.as_ref().map(|s| &s.header)
    }

    /// Handles one request. A failed request leaves the editor as it was.
    pub fn handle(&mut self, request: Request) -> Result<Response, EditorError> {
        debug!(request = ?request, "Handling request");
        let result = self.dispatch(request);
        if let Err(e) = &result {
            warn!(err = %e, "Request failed");
        }
        result
    }

    /// Handles every queued request in order, carrying on past failures.
    pub fn drain(&mut self, queue: &mut VecDeque<Request>) -> Vec<Result<Response, EditorError>> {
        let mut results = Vec::with_capacity(queue.len());
        while let Some(request) = queue.pop_front() {
            results.push(self.handle(request));
        }
        results
    }

    fn dispatch(&mut self, request: Request) -> Result<Response, EditorError> {
        match request {
            Request::Import(path) => self.import(path),
            Request::Close => self.close(),
            Request::FindOnsets => self.find_slice_points(DetectionMode::Onset),
            Request::FindBeats => self.find_slice_points(DetectionMode::Beat),
            Request::CalcBpm => {
                let (buffer, settings) = self.detection_input()?;
                Ok(Response::Bpm(detection::calc_bpm(
                    &buffer,
                    &settings,
                    self.detector.as_ref(),
                )))
            }
            Request::AddSlicePoint { frame } => self.add_slice_point(frame),
            Request::AddSlicePointAt { x } => {
                self.require_sample()?;
                let frame = self.arrangement.slice_point_frame_at(x);
                self.add_slice_point(frame)
            }
            Request::MoveSlicePoint { id, frame } => {
                let old_frame = self
                    .arrangement
                    .slice_point(id)
                    .map(|p| p.frame())
                    .ok_or(ArrangementError::NoSuchSlicePoint(id))?;
                self.push(Box::new(MoveSlicePoint::new(id, old_frame, frame)))?;
                Ok(Response::Edited)
            }
            Request::DeleteSlicePoint { id } => {
                self.push(Box::new(DeleteSlicePoint::new(id)))?;
                Ok(Response::Edited)
            }
            Request::CreateSlices => {
                let sample = self.require_sample()?;
                let frames = detection::filter_slice_points(
                    &self.arrangement.slice_point_frames(),
                    sample.buffer.num_frames(),
                    sample.header.sample_rate,
                );
                self.push_structural(Box::new(CreateSlices::at_frames(frames)))
            }
            Request::Join { positions } => {
                self.push_structural(Box::new(JoinSegments::new(positions)))
            }
            Request::Split { order_pos } => {
                self.push_structural(Box::new(SplitSegment::new(order_pos)))
            }
            Request::MoveSegments { positions, delta } => {
                self.push_structural(Box::new(MoveSegments::new(positions, delta)))
            }
            Request::RemoveSegments { positions } => {
                self.push_structural(Box::new(RemoveSegments::new(positions)))
            }
            Request::Undo => {
                let description = self.history.undo(&mut self.arrangement)?;
                self.sync_sampler()?;
                Ok(Response::History(description))
            }
            Request::Redo => {
                let description = self.history.redo(&mut self.arrangement)?;
                self.sync_sampler()?;
                Ok(Response::History(description))
            }
            Request::ExportSlices { directory, format } => {
                let directory = directory
                    .or_else(|| self.settings.export().directory().map(Path::to_path_buf))
                    .ok_or(EditorError::NoExportDirectory)?;
                let format = format.unwrap_or(self.settings.export().format());
                Ok(Response::Exported(self.export_slices(&directory, format)?))
            }
            Request::ShowLoopMarkers => {
                self.require_sample()?;
                let markers = self.arrangement.show_loop_markers()?.clone();
                Ok(Response::LoopMarkers(Some(markers)))
            }
            Request::HideLoopMarkers => {
                self.arrangement.hide_loop_markers();
                Ok(Response::LoopMarkers(self.arrangement.loop_markers().cloned()))
            }
            Request::DragLoopMarker { side, x } => {
                let frame = self.arrangement.drag_loop_marker(side, x)?;
                Ok(Response::LoopMarkerMoved { frame })
            }
            Request::EditBuffer { range, edit } => self.edit_buffer(range, edit),
            Request::PlaySlice { order_pos } => {
                self.require_sample()?;
                if self.arrangement.segment(order_pos).is_none() {
                    return Err(ArrangementError::NoSuchPosition(order_pos).into());
                }
                let note = self.settings.sampler().first_note() as usize + order_pos;
                if note > 127 {
                    return Err(SamplerError::InvalidNote(note.min(u8::MAX as usize) as u8).into());
                }
                self.require_sampler()?
                    .note_on(note as u8, AUDITION_VELOCITY)?;
                Ok(Response::Playing)
            }
            Request::PlayRange(range) => {
                let num_frames = self.require_sample()?.buffer.num_frames();
                if !range.fits_within(num_frames) {
                    return Err(SamplerError::RangeOutOfBounds { range, num_frames }.into());
                }
                // Every slice shares the source buffer, so any slice's note can play any range.
                let note = self.settings.sampler().first_note();
                self.require_sampler()?
                    .play_range(note, AUDITION_VELOCITY, range)?;
                Ok(Response::Playing)
            }
            Request::StopPlayback => {
                self.require_sampler()?.all_notes_off(true)?;
                Ok(Response::Stopped)
            }
        }
    }

    fn import(&mut self, path: PathBuf) -> Result<Response, EditorError> {
        let (buffer, header) = audio::load_sample(&path)?;
        let buffer: SharedSampleBuffer = Arc::new(buffer);

        let mut arrangement = new_arrangement(&self.settings);
        arrangement.create_waveform(&buffer)?;
        self.arrangement = arrangement;
        self.history.clear();

        let num_frames = buffer.num_frames();
        info!(
            path = ?path,
            frames = num_frames,
            channels = header.num_channels,
            sample_rate = header.sample_rate,
            format = %header.format,
            "Sample imported"
        );
        self.sample = Some(LoadedSample {
            path,
            buffer,
            header: header.clone(),
        });
        self.sync_sampler()?;
        Ok(Response::Loaded { header, num_frames })
    }

    fn close(&mut self) -> Result<Response, EditorError> {
        if let Some(sample) = self.sample.take() {
            info!(path = ?sample.path, "Sample closed");
        }
        self.arrangement = new_arrangement(&self.settings);
        self.history.clear();
        self.sync_sampler()?;
        Ok(Response::Closed)
    }

    /// Runs detection and adds every new frame as a slice point, undoable as one edit.
    fn find_slice_points(&mut self, mode: DetectionMode) -> Result<Response, EditorError> {
        let (buffer, settings) = self.detection_input()?;
        let detected = detection::detect_slice_points(&buffer, &settings, mode, self.detector.as_ref());

        let mut frames = Vec::with_capacity(detected.len());
        for frame in detected {
            if frame < buffer.num_frames()
                && self.arrangement.slice_point_at_frame(frame).is_none()
                && !frames.contains(&frame)
            {
                frames.push(frame);
            }
        }
        if frames.is_empty() {
            return Ok(Response::Detected { frames });
        }

        let mut group = CommandGroup::new("Add Slice Points");
        for &frame in &frames {
            group.push(Box::new(AddSlicePoint::new(frame)));
        }
        self.push(Box::new(group))?;
        Ok(Response::Detected { frames })
    }

    fn add_slice_point(&mut self, frame: usize) -> Result<Response, EditorError> {
        self.push(Box::new(AddSlicePoint::new(frame)))?;
        // New points are appended.
        Ok(match self.arrangement.slice_points().last() {
            Some(point) => Response::SlicePointAdded(point.id()),
            None => Response::Edited,
        })
    }

    /// Applies an edit to a copy of the sample, then swaps it in and re-maps the sampler.
    fn edit_buffer(
        &mut self,
        range: Option<SampleRange>,
        edit: BufferEdit,
    ) -> Result<Response, EditorError> {
        let sample = self.sample.as_mut().ok_or(EditorError::NoSample)?;
        let range = range.unwrap_or_else(|| sample.buffer.full_range());
        let mut edited = sample.buffer.copy_range(sample.buffer.full_range())?;
        match edit {
            BufferEdit::Gain(gain) => edited.apply_gain(range, gain)?,
            BufferEdit::GainRamp {
                start_gain,
                end_gain,
            } => edited.apply_gain_ramp(range, start_gain, end_gain)?,
            BufferEdit::Normalise => edited.normalise(range)?,
            BufferEdit::Reverse => edited.reverse(range)?,
        }

        sample.buffer = Arc::new(edited);
        info!(range = %range, edit = ?edit, "Sample edited");
        self.sync_sampler()?;
        Ok(Response::Edited)
    }

    fn export_slices(
        &self,
        directory: &Path,
        format: SaveFormat,
    ) -> Result<Vec<PathBuf>, EditorError> {
        let sample = self.require_sample()?;
        let base_name = sample
            .path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "slice".to_string());

        let ranges = self.arrangement.sample_ranges();
        let paths = ranges
            .par_iter()
            .enumerate()
            .map(|(i, range)| {
                let slice = sample.buffer.copy_range(*range)?;
                audio::save_sample(
                    directory,
                    &format!("{}_{:03}", base_name, i + 1),
                    &slice,
                    &sample.header,
                    format,
                )
            })
            .collect::<Result<Vec<PathBuf>, AudioFileError>>()?;

        info!(
            directory = ?directory,
            slices = paths.len(),
            format = ?format,
            "Slices exported"
        );
        Ok(paths)
    }

    fn push(&mut self, command: Box<dyn EditCommand>) -> Result<(), EditorError> {
        self.require_sample()?;
        self.history.push(command, &mut self.arrangement)?;
        Ok(())
    }

    /// Pushes an edit that changes the segments, then re-maps the sampler.
    fn push_structural(&mut self, command: Box<dyn EditCommand>) -> Result<Response, EditorError> {
        self.push(command)?;
        self.sync_sampler()?;
        Ok(Response::Edited)
    }

    /// Rebuilds the sampler's sounds so note `first_note + n` plays segment `n`.
    fn sync_sampler(&self) -> Result<(), EditorError> {
        let Some(handle) = self.sampler.as_ref() else {
            return Ok(());
        };
        handle.collect_retired();

        let sounds = match self.sample.as_ref() {
            Some(sample) => {
                let config = self.settings.sampler();
                sampler::slice_sounds(
                    sample.buffer.clone(),
                    sample.header.sample_rate,
                    &self.arrangement.sample_ranges(),
                    config.first_note(),
                    sampler::ms_to_samples(config.attack_ms(), config.output_sample_rate()),
                    sampler::ms_to_samples(config.release_ms(), config.output_sample_rate()),
                )?
            }
            None => Vec::new(),
        };
        debug!(sounds = sounds.len(), "Syncing sampler sounds");
        handle.set_sounds(sounds)?;
        Ok(())
    }

    fn detection_input(&self) -> Result<(SharedSampleBuffer, DetectionSettings), EditorError> {
        let sample = self.require_sample()?;
        let settings = self
            .settings
            .detection()
            .settings(sample.header.sample_rate)?;
        Ok((sample.buffer.clone(), settings))
    }

    fn require_sample(&self) -> Result<&LoadedSample, EditorError> {
        self.sample.as_ref().ok_or(EditorError::NoSample)
    }

    fn require_sampler(&self) -> Result<&SamplerHandle, EditorError> {
        self.sampler.as_ref().ok_or(EditorError::NoSampler)
    }
}

fn new_arrangement(settings: &Settings) -> Arrangement {
    let mut arrangement = Arrangement::new(settings.display().width());
    arrangement.set_snap_mode(settings.display().snap_mode());
    arrangement
}

impl fmt::Debug for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Editor")
            .field("path", &self.path())
            .field("arrangement", &self.arrangement)
            .field("history", &self.history)
            .field("sampler_attached", &self.sampler.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;
    use crate::detection::DetectorOutput;
    use crate::sampler::Sampler;
    use crate::testutil::{sine, write_wav, ScriptedDetectorFactory};

    const SAMPLE_RATE: u32 = 44100;

    /// Reports each frame as detected on hops 20, 40, 60...
    fn detections(frames: &[usize], bpm: f32) -> ScriptedDetectorFactory {
        let mut outputs = vec![DetectorOutput::default(); 128];
        for (i, &frame) in frames.iter().enumerate() {
            outputs[(i + 1) * 20] = DetectorOutput {
                detected: true,
                last_frame: frame,
                bpm,
            };
        }
        ScriptedDetectorFactory::new(outputs)
    }

    fn editor_with(dir: &Path, factory: ScriptedDetectorFactory) -> (Editor, PathBuf) {
        let path = dir.join("loop.wav");
        write_wav(
            path.clone(),
            vec![sine(440.0, 0.5, SAMPLE_RATE, 44100)],
            SAMPLE_RATE,
        )
        .unwrap();
        (
            Editor::with_detector(Settings::default(), Box::new(factory)),
            path,
        )
    }

    fn render(sampler: &mut Sampler) {
        let mut left = vec![0.0f32; 64];
        let mut right = vec![0.0f32; 64];
        sampler.render_next_block(&mut [&mut left[..], &mut right[..]], 0, 64);
    }

    #[test]
    fn test_requires_sample() {
        let mut editor = Editor::new(Settings::default());
        assert!(matches!(
            editor.handle(Request::FindOnsets),
            Err(EditorError::NoSample)
        ));
        assert!(matches!(
            editor.handle(Request::AddSlicePoint { frame: 10 }),
            Err(EditorError::NoSample)
        ));
        assert!(matches!(
            editor.handle(Request::Import(PathBuf::from("/nonexistent/loop.wav"))),
            Err(EditorError::Audio(_))
        ));
        assert!(!editor.is_loaded());
        assert_eq!(editor.handle(Request::Undo).unwrap(), Response::History(None));
    }

    #[test]
    fn test_onsets_slice_and_undo() {
        let dir = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[11025, 22050, 33075], 0.0));

        match editor.handle(Request::Import(path)).unwrap() {
            Response::Loaded { header, num_frames } => {
                assert_eq!(header.sample_rate, SAMPLE_RATE);
                assert_eq!(num_frames, 44100);
            }
            other => panic!("unexpected response: {other:?}"),
        }
        assert_eq!(editor.arrangement().len(), 1);

        assert_eq!(
            editor.handle(Request::FindOnsets).unwrap(),
            Response::Detected {
                frames: vec![11025, 22050, 33075]
            }
        );
        assert_eq!(
            editor.arrangement().slice_point_frames(),
            vec![11025, 22050, 33075]
        );
        assert_eq!(editor.history().len(), 1);

        // Nothing new the second time round.
        assert_eq!(
            editor.handle(Request::FindOnsets).unwrap(),
            Response::Detected { frames: vec![] }
        );
        assert_eq!(editor.history().len(), 1);

        assert_eq!(
            editor.handle(Request::Undo).unwrap(),
            Response::History(Some("Add Slice Points".to_string()))
        );
        assert!(editor.arrangement().slice_points().is_empty());
        editor.handle(Request::Redo).unwrap();
        assert_eq!(editor.arrangement().slice_point_frames().len(), 3);

        assert_eq!(editor.handle(Request::CreateSlices).unwrap(), Response::Edited);
        assert_eq!(
            editor.arrangement().sample_ranges(),
            vec![
                SampleRange::new(0, 11025),
                SampleRange::new(11025, 11025),
                SampleRange::new(22050, 11025),
                SampleRange::new(33075, 11025),
            ]
        );
        assert!(editor.arrangement().slice_points().is_empty());

        editor.handle(Request::Undo).unwrap();
        assert_eq!(editor.arrangement().len(), 1);
        assert_eq!(editor.arrangement().slice_point_frames().len(), 3);
    }

    #[test]
    fn test_create_slices_drops_points_near_edges() {
        let dir = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[], 0.0));
        editor.handle(Request::Import(path)).unwrap();
        for frame in [100, 22050, 22100, 44000] {
            editor.handle(Request::AddSlicePoint { frame }).unwrap();
        }
        editor.handle(Request::CreateSlices).unwrap();
        assert_eq!(
            editor.arrangement().sample_ranges(),
            vec![SampleRange::new(0, 22050), SampleRange::new(22050, 22050)]
        );
    }

    #[test]
    fn test_calc_bpm() {
        let dir = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[10000, 20000], 120.0));
        editor.handle(Request::Import(path)).unwrap();
        assert_eq!(editor.handle(Request::CalcBpm).unwrap(), Response::Bpm(120));
    }

    #[test]
    fn test_structural_edits_remap_sampler() {
        let dir = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[], 0.0));
        let (mut sampler, handle) = Sampler::with_handle(4, SAMPLE_RATE, 16);
        editor.attach_sampler(handle).unwrap();
        editor.handle(Request::Import(path)).unwrap();

        for frame in [11025, 22050, 33075] {
            assert!(matches!(
                editor.handle(Request::AddSlicePoint { frame }).unwrap(),
                Response::SlicePointAdded(_)
            ));
        }
        editor.handle(Request::CreateSlices).unwrap();
        render(&mut sampler);
        assert_eq!(sampler.sounds().len(), 4);
        assert_eq!(sampler.sounds()[1].range(), SampleRange::new(11025, 11025));

        editor
            .handle(Request::MoveSegments {
                positions: vec![3],
                delta: -3,
            })
            .unwrap();
        assert_eq!(
            editor.arrangement().sample_ranges()[0],
            SampleRange::new(33075, 11025)
        );
        editor.handle(Request::PlaySlice { order_pos: 0 }).unwrap();
        render(&mut sampler);
        assert_eq!(sampler.sounds()[0].range(), SampleRange::new(33075, 11025));
        assert_eq!(sampler.active_voice_count(), 1);
        let voice = sampler.voices().iter().find(|v| v.is_active()).unwrap();
        assert_eq!(voice.note(), 36);

        assert!(matches!(
            editor.handle(Request::PlaySlice { order_pos: 9 }),
            Err(EditorError::Arrangement(ArrangementError::NoSuchPosition(9)))
        ));

        // The first two segments are no longer next to each other in the source.
        let before = editor.history().len();
        assert!(matches!(
            editor.handle(Request::Join {
                positions: vec![0, 1]
            }),
            Err(EditorError::Arrangement(_))
        ));
        assert_eq!(editor.history().len(), before);

        editor
            .handle(Request::Join {
                positions: vec![1, 2],
            })
            .unwrap();
        assert_eq!(editor.arrangement().len(), 3);
        editor.handle(Request::Split { order_pos: 1 }).unwrap();
        assert_eq!(editor.arrangement().len(), 4);

        assert_eq!(editor.handle(Request::StopPlayback).unwrap(), Response::Stopped);
    }

    #[test]
    fn test_buffer_edits() {
        let dir = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[], 0.0));
        let edit = |range, edit| Request::EditBuffer { range, edit };
        assert!(matches!(
            editor.handle(edit(None, BufferEdit::Normalise)),
            Err(EditorError::NoSample)
        ));

        let (mut sampler, handle) = Sampler::with_handle(2, SAMPLE_RATE, 16);
        editor.attach_sampler(handle).unwrap();
        editor.handle(Request::Import(path)).unwrap();
        editor.handle(Request::AddSlicePoint { frame: 22050 }).unwrap();
        let original = editor.buffer().unwrap().clone();

        assert_eq!(
            editor.handle(edit(None, BufferEdit::Normalise)).unwrap(),
            Response::Edited
        );
        let peak = editor
            .buffer()
            .unwrap()
            .channel(0)
            .iter()
            .fold(0.0f32, |peak, s| peak.max(s.abs()));
        assert!((peak - 1.0).abs() < 1e-6);
        assert!((editor.buffer().unwrap().channel(0)[10] - original.channel(0)[10] * 2.0).abs() < 1e-3);
        let normalised = editor.buffer().unwrap().clone();

        editor
            .handle(edit(Some(SampleRange::new(0, 100)), BufferEdit::Reverse))
            .unwrap();
        editor
            .handle(edit(Some(SampleRange::new(100, 100)), BufferEdit::Gain(0.0)))
            .unwrap();
        let edited = editor.buffer().unwrap();
        assert_eq!(edited.channel(0)[0], normalised.channel(0)[99]);
        assert_eq!(edited.channel(0)[99], normalised.channel(0)[0]);
        assert_eq!(edited.channel(0)[300], normalised.channel(0)[300]);
        assert!(edited.channel(0)[100..200].iter().all(|&s| s == 0.0));

        editor
            .handle(edit(
                Some(SampleRange::new(200, 3)),
                BufferEdit::GainRamp {
                    start_gain: 0.0,
                    end_gain: 0.0,
                },
            ))
            .unwrap();
        assert!(editor.buffer().unwrap().channel(0)[200..203].iter().all(|&s| s == 0.0));

        let before = editor.buffer().unwrap().clone();
        assert!(matches!(
            editor.handle(edit(Some(SampleRange::new(44000, 200)), BufferEdit::Reverse)),
            Err(EditorError::Audio(AudioFileError::RangeOutOfBounds { .. }))
        ));
        assert_eq!(editor.buffer().unwrap(), &before);

        // The slice point survives and the sampler plays the edited audio.
        assert_eq!(editor.arrangement().slice_points().len(), 1);
        render(&mut sampler);
        assert_eq!(sampler.sounds()[0].buffer(), &before);
    }

    #[test]
    fn test_play_range() {
        let dir = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[], 0.0));
        editor.handle(Request::Import(path)).unwrap();
        assert!(matches!(
            editor.handle(Request::PlayRange(SampleRange::new(0, 100))),
            Err(EditorError::NoSampler)
        ));

        let (mut sampler, handle) = Sampler::with_handle(2, SAMPLE_RATE, 16);
        editor.attach_sampler(handle).unwrap();
        assert!(matches!(
            editor.handle(Request::PlayRange(SampleRange::new(44000, 200))),
            Err(EditorError::Sampler(SamplerError::RangeOutOfBounds { .. }))
        ));
        assert_eq!(
            editor
                .handle(Request::PlayRange(SampleRange::new(1000, 4000)))
                .unwrap(),
            Response::Playing
        );
        render(&mut sampler);
        assert_eq!(sampler.active_voice_count(), 1);
        // The override doesn't stick to the sound.
        assert_eq!(sampler.sounds()[0].range(), SampleRange::new(0, 44100));
    }

    #[test]
    fn test_export_slices() {
        let dir = tempfile::tempdir().unwrap();
        let out = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[22050], 0.0));
        editor.handle(Request::Import(path)).unwrap();
        assert!(matches!(
            editor.handle(Request::ExportSlices {
                directory: None,
                format: None
            }),
            Err(EditorError::NoExportDirectory)
        ));

        editor.handle(Request::FindOnsets).unwrap();
        editor.handle(Request::CreateSlices).unwrap();
        let paths = match editor
            .handle(Request::ExportSlices {
                directory: Some(out.path().to_path_buf()),
                format: None,
            })
            .unwrap()
        {
            Response::Exported(paths) => paths,
            other => panic!("unexpected response: {other:?}"),
        };
        assert_eq!(
            paths,
            vec![out.path().join("loop_001.wav"), out.path().join("loop_002.wav")]
        );

        let (second, header) = audio::load_sample(&paths[1]).unwrap();
        assert_eq!(second.num_frames(), 22050);
        assert_eq!(header.sample_rate, SAMPLE_RATE);

        assert!(matches!(
            editor.handle(Request::ExportSlices {
                directory: Some(out.path().to_path_buf()),
                format: Some(SaveFormat::Flac),
            }),
            Err(EditorError::Audio(AudioFileError::UnsupportedSaveFormat(
                SaveFormat::Flac
            )))
        ));
    }

    #[test]
    fn test_drain_and_loop_markers() {
        let dir = tempfile::tempdir().unwrap();
        let (mut editor, path) = editor_with(dir.path(), detections(&[], 0.0));
        let mut queue = VecDeque::from(vec![
            Request::Import(path),
            Request::ShowLoopMarkers,
            Request::DragLoopMarker {
                side: MarkerSide::Right,
                x: 2000.0,
            },
            Request::Split { order_pos: 5 },
            Request::Close,
        ]);

        let results = editor.drain(&mut queue);
        assert!(queue.is_empty());
        assert_eq!(results.len(), 5);
        assert!(matches!(results[0], Ok(Response::Loaded { .. })));
        match &results[1] {
            Ok(Response::LoopMarkers(Some(markers))) => {
                assert!(markers.is_visible());
                assert_eq!(markers.left().frame(), 0);
                assert_eq!(markers.right().frame(), 44099);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(
            results[2].as_ref().unwrap(),
            &Response::LoopMarkerMoved { frame: 44099 }
        );
        assert!(results[3].is_err());
        assert_eq!(results[4].as_ref().unwrap(), &Response::Closed);
        assert!(!editor.is_loaded());
        assert!(editor.arrangement().is_empty());
    }
}
