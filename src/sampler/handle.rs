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
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::debug;

use crate::audio::SampleRange;

use super::{SamplerError, SamplerSound};

/// Control messages for a [`super::Sampler`] running on the audio thread.
#[derive(Debug)]
pub enum SamplerMessage {
    /// Starts a note. An explicit range overrides the sound's range for this note
    /// only.
    NoteOn {
        note: u8,
        velocity: f32,
        range: Option<SampleRange>,
    },
    NoteOff {
        note: u8,
        allow_tail: bool,
    },
    AllNotesOff {
        allow_tail: bool,
    },
    /// A raw MIDI message of up to three bytes.
    Midi { bytes: [u8; 3], len: usize },
    /// Replaces every sound. The old sounds are handed back through the retired
    /// channel so they are not freed on the audio thread.
    SetSounds(Vec<Arc<SamplerSound>>),
}

/// The control-thread side of a sampler.
#[derive(Debug, Clone)]
pub struct SamplerHandle {
    sender: Sender<SamplerMessage>,
    retired: Receiver<Vec<Arc<SamplerSound>>>,
}

impl SamplerHandle {
    pub(crate) fn new(
        sender: Sender<SamplerMessage>,
        retired: Receiver<Vec<Arc<SamplerSound>>>,
    ) -> Self {
        Self { sender, retired }
    }

    pub fn note_on(&self, note: u8, velocity: f32) -> Result<(), SamplerError> {
        self.send(SamplerMessage::NoteOn {
            note,
            velocity,
            range: None,
        })
    }

    /// Plays an arbitrary range with the sound mapped to `note`.
    pub fn play_range(&self, note: u8, velocity: f32, range: SampleRange) -> Result<(), SamplerError> {
        self.send(SamplerMessage::NoteOn {
            note,
            velocity,
            range: Some(range),
        })
    }

    pub fn note_off(&self, note: u8, allow_tail: bool) -> Result<(), SamplerError> {
        self.send(SamplerMessage::NoteOff { note, allow_tail })
    }

    pub fn all_notes_off(&self, allow_tail: bool) -> Result<(), SamplerError> {
        self.send(SamplerMessage::AllNotesOff { allow_tail })
    }

    /// Forwards a raw MIDI message (note on/off, all notes off).
    pub fn midi(&self, raw_event: &[u8]) -> Result<(), SamplerError> {
        if raw_event.is_empty() || raw_event.len() > 3 {
            return Err(SamplerError::Midi(format!(
                "expected 1 to 3 bytes, got {}",
                raw_event.len()
            )));
        }
        let mut bytes = [0u8; 3];
        bytes[..raw_event.len()].copy_from_slice(raw_event);
        self.send(SamplerMessage::Midi {
            bytes,
            len: raw_event.len(),
        })
    }

    pub fn set_sounds(&self, sounds: Vec<Arc<SamplerSound>>) -> Result<(), SamplerError> {
        self.send(SamplerMessage::SetSounds(sounds))
    }

    /// Drops sound sets the audio thread has finished with. Returns how many were
    /// collected.
    pub fn collect_retired(&self) -> usize {
        let collected = self.retired.try_iter().count();
        if collected > 0 {
            debug!(collected, "Released retired sampler sounds");
        }
        collected
    }

    fn send(&self, message: SamplerMessage) -> Result<(), SamplerError> {
        self.sender.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SamplerError::QueueFull,
            TrySendError::Disconnected(_) => SamplerError::Disconnected,
        })
    }
}
