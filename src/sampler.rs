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
//! Polyphonic, pitched playback of sample ranges.
//!
//! A [`Sampler`] owns a fixed pool of [`SamplerVoice`]s and a set of
//! [`SamplerSound`]s. It is driven from the audio thread through
//! [`Sampler::render_next_block`], which drains control messages sent from a
//! [`SamplerHandle`] and then mixes every active voice into the output. The
//! render path neither allocates nor logs.
use std::fmt;
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use midly::live::LiveEvent;
use midly::MidiMessage;
use tracing::{debug, warn};

use crate::audio::SampleRange;

mod handle;
mod sound;
mod voice;

pub use handle::{SamplerHandle, SamplerMessage};
pub use sound::{ms_to_samples, slice_sounds, NoteMask, SamplerSound};
pub use voice::{SamplerVoice, VoiceState};

/// MIDI controller number for "all notes off".
const ALL_NOTES_OFF_CONTROLLER: u8 = 123;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum SamplerError {
    #[error("Range {range} is outside a sample of {num_frames} frames")]
    RangeOutOfBounds { range: SampleRange, num_frames: usize },

    #[error("Sample of {0} frames is too long to play")]
    TooLong(usize),

    #[error("MIDI note {0} is out of range")]
    InvalidNote(u8),

    #[error("Invalid MIDI event: {0}")]
    Midi(String),

    #[error("Sampler message queue is full")]
    QueueFull,

    #[error("Sampler is no longer running")]
    Disconnected,
}

/// The audio-thread side of the sampler.
pub struct Sampler {
    sounds: Vec<Arc<SamplerSound>>,
    voices: Vec<SamplerVoice>,
    output_sample_rate: u32,
    /// Counts note-ons, so voices can be ordered by age.
    note_ons: u64,
    voices_stolen: u64,
    /// Raw MIDI messages from the handle that failed to parse.
    midi_errors: u64,
    /// Retired sound sets freed here because the retired channel stayed full.
    retired_dropped: u64,
    receiver: Option<Receiver<SamplerMessage>>,
    retired: Option<Sender<Vec<Arc<SamplerSound>>>>,
    /// A retired set waiting for room in the retired channel.
    unsent_retired: Option<Vec<Arc<SamplerSound>>>,
}

impl Sampler {
    /// Creates a sampler with a fixed number of voices.
    pub fn new(max_voices: usize, output_sample_rate: u32) -> Self {
        Self {
            sounds: Vec::new(),
            voices: (0..max_voices).map(|_| SamplerVoice::default()).collect(),
            output_sample_rate,
            note_ons: 0,
            voices_stolen: 0,
            midi_errors: 0,
            retired_dropped: 0,
            receiver: None,
            retired: None,
            unsent_retired: None,
        }
    }

    /// Creates a sampler and the handle used to control it from another thread.
    pub fn with_handle(
        max_voices: usize,
        output_sample_rate: u32,
        queue_size: usize,
    ) -> (Self, SamplerHandle) {
        let (sender, receiver) = crossbeam_channel::bounded(queue_size);
        let (retired_sender, retired_receiver) = crossbeam_channel::bounded(queue_size);
        let mut sampler = Self::new(max_voices, output_sample_rate);
        sampler.receiver = Some(receiver);
        sampler.retired = Some(retired_sender);
        (sampler, SamplerHandle::new(sender, retired_receiver))
    }

    pub fn output_sample_rate(&self) -> u32 {
        self.output_sample_rate
    }

    pub fn max_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn sounds(&self) -> &[Arc<SamplerSound>] {
        &self.sounds
    }

    /// Replaces every sound, silencing all voices. Returns the previous sounds.
    pub fn set_sounds(&mut self, sounds: Vec<Arc<SamplerSound>>) -> Vec<Arc<SamplerSound>> {
        self.all_notes_off(false);
        std::mem::replace(&mut self.sounds, sounds)
    }

    /// Starts the sound mapped to `note`. Velocity is a gain between 0 and 1.
    pub fn note_on(&mut self, note: u8, velocity: f32) {
        if self.start_note(note, velocity, None) {
            warn!(
                max_voices = self.voices.len(),
                note, "Voice limit reached, stealing oldest"
            );
        }
    }

    /// Plays `range` with the sound mapped to `note`, leaving the sound's own range
    /// untouched.
    pub fn note_on_range(&mut self, note: u8, velocity: f32, range: SampleRange) {
        if self.start_note(note, velocity, Some(range)) {
            warn!(
                max_voices = self.voices.len(),
                note, "Voice limit reached, stealing oldest"
            );
        }
    }

    pub fn note_off(&mut self, note: u8, allow_tail: bool) {
        for voice in self.voices.iter_mut().filter(|v| v.is_active() && v.note() == note) {
            voice.stop(allow_tail);
        }
    }

    pub fn all_notes_off(&mut self, allow_tail: bool) {
        for voice in self.voices.iter_mut() {
            voice.stop(allow_tail);
        }
    }

    /// Handles a raw MIDI message. Note on with velocity 0 is a note off.
    pub fn process_midi_event(&mut self, raw_event: &[u8]) {
        if let Err(e) = self.handle_midi(raw_event) {
            debug!(error = ?e, "Failed to parse MIDI event");
        }
    }

    /// Mixes every active voice into `output[..][start..start + num_samples]`.
    /// One output channel gets a mono mix, two or more get left and right.
    pub fn render_next_block(&mut self, output: &mut [&mut [f32]], start: usize, num_samples: usize) {
        self.drain_messages();
        if output.is_empty() {
            return;
        }
        for voice in self.voices.iter_mut().filter(|v| v.is_active()) {
            voice.render(output, start, num_samples);
        }
    }

    pub fn active_voice_count(&self) -> usize {
        self.voices.iter().filter(|v| v.is_active()).count()
    }

    /// Number of voices cut short to make room for new notes.
    pub fn voices_stolen(&self) -> u64 {
        self.voices_stolen
    }

    /// Number of queued MIDI messages that could not be parsed.
    pub fn midi_errors(&self) -> u64 {
        self.midi_errors
    }

    /// Number of retired sound sets that had to be freed on the audio thread because
    /// the control thread was not collecting them.
    pub fn retired_dropped(&self) -> u64 {
        self.retired_dropped
    }

    pub fn voices(&self) -> &[SamplerVoice] {
        &self.voices
    }

    /// Starts a voice, returning true if one had to be stolen.
    fn start_note(&mut self, note: u8, velocity: f32, range: Option<SampleRange>) -> bool {
        let Some(sound) = self.sounds.iter().find(|s| s.applies_to_note(note)).cloned() else {
            return false;
        };
        if self.voices.is_empty() {
            return false;
        }
        if range.is_some_and(|range| !range.fits_within(sound.buffer().num_frames())) {
            return false;
        }

        for voice in self.voices.iter_mut().filter(|v| v.is_playing(&sound, note)) {
            voice.stop(true);
        }

        let mut stolen = false;
        let index = match self.voices.iter().position(|v| !v.is_active()) {
            Some(index) => index,
            None => {
                stolen = true;
                self.voices_stolen += 1;
                self.voices
                    .iter()
                    .enumerate()
                    .min_by_key(|(_, v)| v.started())
                    .map(|(i, _)| i)
                    .unwrap_or(0)
            }
        };

        self.note_ons += 1;
        self.voices[index].stop(false);

        // Old voices are stopped first so their end does not undo a newly promoted range.
        let (range, temp) = match range {
            Some(range) => (range, false),
            None => match sound.take_temp_range() {
                Some(range) => (range, true),
                None => (sound.range(), false),
            },
        };
        if temp {
            for voice in self.voices.iter_mut().filter(|v| v.plays_sound(&sound)) {
                voice.release_temp_range();
            }
        }

        let voice = &mut self.voices[index];
        voice.start(
            sound,
            note,
            velocity.clamp(0.0, 1.0),
            range,
            self.output_sample_rate,
            self.note_ons,
        );
        if temp {
            voice.hold_temp_range();
        }
        stolen
    }

    fn handle_midi(&mut self, raw_event: &[u8]) -> Result<(), midly::Error> {
        if let LiveEvent::Midi { message, .. } = LiveEvent::parse(raw_event)? {
            match message {
                MidiMessage::NoteOn { key, vel } if u8::from(vel) == 0 => {
                    self.note_off(u8::from(key), true);
                }
                MidiMessage::NoteOn { key, vel } => {
                    self.start_note(u8::from(key), u8::from(vel) as f32 / 127.0, None);
                }
                MidiMessage::NoteOff { key, .. } => {
                    self.note_off(u8::from(key), true);
                }
                MidiMessage::Controller { controller, .. }
                    if u8::from(controller) == ALL_NOTES_OFF_CONTROLLER =>
                {
                    self.all_notes_off(true);
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn drain_messages(&mut self) {
        let Some(receiver) = self.receiver.take() else {
            return;
        };
        if let Some(old) = self.unsent_retired.take() {
            self.retire(old);
        }
        while let Ok(message) = receiver.try_recv() {
            match message {
                SamplerMessage::NoteOn {
                    note,
                    velocity,
                    range,
                } => {
                    self.start_note(note, velocity, range);
                }
                SamplerMessage::NoteOff { note, allow_tail } => self.note_off(note, allow_tail),
                SamplerMessage::AllNotesOff { allow_tail } => self.all_notes_off(allow_tail),
                SamplerMessage::Midi { bytes, len } => {
                    if self.handle_midi(&bytes[..len.min(3)]).is_err() {
                        self.midi_errors += 1;
                    }
                }
                SamplerMessage::SetSounds(sounds) => {
                    let old = self.set_sounds(sounds);
                    self.retire(old);
                }
            }
        }
        self.receiver = Some(receiver);
    }

    /// Hands a replaced sound set back to the control thread. A full channel keeps
    /// one set for the next block; only a second one is freed here.
    fn retire(&mut self, old: Vec<Arc<SamplerSound>>) {
        let Some(retired) = self.retired.as_ref() else {
            return;
        };
        match retired.try_send(old) {
            Ok(()) => {}
            Err(TrySendError::Full(old)) => {
                if self.unsent_retired.replace(old).is_some() {
                    self.retired_dropped += 1;
                }
            }
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

impl fmt::Debug for Sampler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sampler")
            .field("sounds", &self.sounds.len())
            .field("max_voices", &self.voices.len())
            .field("active_voices", &self.active_voice_count())
            .field("voices_stolen", &self.voices_stolen)
            .field("midi_errors", &self.midi_errors)
            .field("retired_dropped", &self.retired_dropped)
            .field("output_sample_rate", &self.output_sample_rate)
            .finish()
    }
}
