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

use crate::audio::SampleRange;

use super::SamplerSound;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Attack,
    Sustain,
    Release,
}

/// One playing note: a pitched, enveloped walk through a sound's range.
#[derive(Debug)]
pub struct SamplerVoice {
    state: VoiceState,
    sound: Option<Arc<SamplerSound>>,
    note: u8,
    /// Source frames advanced per output sample.
    pitch_ratio: f64,
    /// Fractional source frame.
    position: f64,
    /// Inclusive last frame of the range being played.
    end_frame: usize,
    left_gain: f32,
    right_gain: f32,
    envelope: f32,
    attack_delta: f32,
    release_delta: f32,
    /// Note-on counter value at start, used to find the oldest voice.
    started: u64,
    /// Set when this voice consumed the sound's temporary range and must put the
    /// original back when it ends.
    holds_temp_range: bool,
}

impl Default for SamplerVoice {
    fn default() -> Self {
        Self {
            state: VoiceState::Idle,
            sound: None,
            note: 0,
            pitch_ratio: 1.0,
            position: 0.0,
            end_frame: 0,
            left_gain: 0.0,
            right_gain: 0.0,
            envelope: 0.0,
            attack_delta: 0.0,
            release_delta: 0.0,
            started: 0,
            holds_temp_range: false,
        }
    }
}

impl SamplerVoice {
    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_active(&self) -> bool {
        self.state != VoiceState::Idle
    }

    pub fn note(&self) -> u8 {
        self.note
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }

    pub fn envelope(&self) -> f32 {
        self.envelope
    }

    pub(crate) fn started(&self) -> u64 {
        self.started
    }

    pub(crate) fn is_playing(&self, sound: &Arc<SamplerSound>, note: u8) -> bool {
        self.note == note && self.plays_sound(sound)
    }

    pub(crate) fn plays_sound(&self, sound: &Arc<SamplerSound>) -> bool {
        self.is_active() && self.sound.as_ref().is_some_and(|s| Arc::ptr_eq(s, sound))
    }

    /// Starts playing `range` of the sound.
    pub(crate) fn start(
        &mut self,
        sound: Arc<SamplerSound>,
        note: u8,
        velocity: f32,
        range: SampleRange,
        output_sample_rate: u32,
        started: u64,
    ) {
        let semitones = note as f64 - sound.root_note() as f64;
        self.pitch_ratio = 2f64.powf(semitones / 12.0) * sound.source_sample_rate() as f64
            / output_sample_rate as f64;
        self.position = range.start_frame as f64;
        self.end_frame = range.last_frame();
        self.note = note;
        self.left_gain = velocity;
        self.right_gain = velocity;
        self.started = started;
        self.holds_temp_range = false;

        let attack_samples = sound.attack_samples();
        if attack_samples > 0 {
            self.envelope = 0.0;
            self.attack_delta = (self.pitch_ratio / attack_samples as f64) as f32;
            self.state = VoiceState::Attack;
        } else {
            self.envelope = 1.0;
            self.attack_delta = 0.0;
            self.state = VoiceState::Sustain;
        }
        let release_samples = sound.release_samples();
        self.release_delta = if release_samples > 0 {
            (-self.pitch_ratio / release_samples as f64) as f32
        } else {
            0.0
        };
        self.sound = Some(sound);
    }

    /// Marks this voice as playing the sound's temporary range.
    pub(crate) fn hold_temp_range(&mut self) {
        self.holds_temp_range = true;
    }

    /// Hands the temporary range over to a newer voice of the same sound.
    pub(crate) fn release_temp_range(&mut self) {
        self.holds_temp_range = false;
    }

    pub fn holds_temp_range(&self) -> bool {
        self.holds_temp_range
    }

    /// Releases the note. Without a tail, or with no release time, the voice stops
    /// at once.
    pub(crate) fn stop(&mut self, allow_tail: bool) {
        if !self.is_active() {
            return;
        }
        if allow_tail && self.release_delta < 0.0 {
            self.state = VoiceState::Release;
        } else {
            self.finish();
        }
    }

    /// Adds this voice's output to `output[..][start..start + num_samples]`.
    /// Mono output receives the average of both channels. Never allocates.
    pub(crate) fn render(&mut self, output: &mut [&mut [f32]], start: usize, num_samples: usize) {
        let Some(sound) = self.sound.take() else {
            return;
        };
        let buffer = sound.buffer();
        let left_in = buffer.channel(0);
        let right_in = (buffer.num_channels() > 1).then(|| buffer.channel(1));
        let last_frame = left_in.len().saturating_sub(1);
        let end = output
            .iter()
            .map(|channel| channel.len())
            .min()
            .unwrap_or(0)
            .min(start + num_samples);
        let stereo_out = output.len() > 1;

        for i in start..end {
            let pos = self.position as usize;
            let alpha = (self.position - pos as f64) as f32;
            let inv_alpha = 1.0 - alpha;
            let next = (pos + 1).min(last_frame);
            let pos = pos.min(last_frame);

            let mut l = left_in[pos] * inv_alpha + left_in[next] * alpha;
            let mut r = match right_in {
                Some(right_in) => right_in[pos] * inv_alpha + right_in[next] * alpha,
                None => l,
            };
            l *= self.left_gain * self.envelope;
            r *= self.right_gain * self.envelope;

            match self.state {
                VoiceState::Attack => {
                    self.envelope += self.attack_delta;
                    if self.envelope >= 1.0 {
                        self.envelope = 1.0;
                        self.state = VoiceState::Sustain;
                    }
                }
                VoiceState::Release => {
                    self.envelope += self.release_delta;
                    if self.envelope <= 0.0 {
                        self.sound = Some(sound);
                        self.finish();
                        return;
                    }
                }
                VoiceState::Sustain | VoiceState::Idle => {}
            }

            if stereo_out {
                output[0][i] += l;
                output[1][i] += r;
            } else {
                output[0][i] += (l + r) * 0.5;
            }

            self.position += self.pitch_ratio;
            if self.position > self.end_frame as f64 {
                self.sound = Some(sound);
                self.finish();
                return;
            }
        }
        self.sound = Some(sound);
    }

    fn finish(&mut self) {
        if let Some(sound) = self.sound.take() {
            if self.holds_temp_range {
                sound.restore_range();
            }
        }
        self.holds_temp_range = false;
        self.state = VoiceState::Idle;
        self.envelope = 0.0;
    }
}
