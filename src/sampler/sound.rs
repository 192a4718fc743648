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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::warn;

use crate::audio::{SampleBuffer, SampleRange, SharedSampleBuffer};

use super::SamplerError;

/// The set of MIDI notes a sound responds to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoteMask(u128);

impl NoteMask {
    pub fn single(note: u8) -> Self {
        Self::range(note, note)
    }

    /// Every note from `low` to `high` inclusive.
    pub fn range(low: u8, high: u8) -> Self {
        let mut mask = 0u128;
        for note in low.min(127)..=high.min(127) {
            mask |= 1 << note;
        }
        Self(mask)
    }

    pub fn all() -> Self {
        Self(u128::MAX)
    }

    pub fn contains(&self, note: u8) -> bool {
        note < 128 && self.0 & (1 << note) != 0
    }
}

/// A playable range of a shared sample buffer, mapped to MIDI notes.
///
/// The active range is read by voices on the audio thread and may be changed
/// from the control thread, so the start/end pair is packed into one atomic.
pub struct SamplerSound {
    buffer: SharedSampleBuffer,
    source_sample_rate: u32,
    original_range: SampleRange,
    /// Start frame in the high half, inclusive end frame in the low half.
    active_range: AtomicU64,
    temp_range: Mutex<Option<SampleRange>>,
    notes: NoteMask,
    root_note: u8,
    attack_samples: usize,
    release_samples: usize,
}

impl SamplerSound {
    pub fn new(
        buffer: SharedSampleBuffer,
        source_sample_rate: u32,
        range: SampleRange,
        notes: NoteMask,
        root_note: u8,
        attack_samples: usize,
        release_samples: usize,
    ) -> Result<Self, SamplerError> {
        check_range(&buffer, range)?;
        if root_note > 127 {
            return Err(SamplerError::InvalidNote(root_note));
        }
        Ok(Self {
            buffer,
            source_sample_rate,
            original_range: range,
            active_range: AtomicU64::new(pack(range)),
            temp_range: Mutex::new(None),
            notes,
            root_note,
            attack_samples,
            release_samples,
        })
    }

    pub fn applies_to_note(&self, note: u8) -> bool {
        self.notes.contains(note)
    }

    pub fn buffer(&self) -> &SampleBuffer {
        &self.buffer
    }

    pub fn source_sample_rate(&self) -> u32 {
        self.source_sample_rate
    }

    pub fn root_note(&self) -> u8 {
        self.root_note
    }

    pub fn attack_samples(&self) -> usize {
        self.attack_samples
    }

    pub fn release_samples(&self) -> usize {
        self.release_samples
    }

    /// The range the next note will play unless overridden.
    pub fn range(&self) -> SampleRange {
        unpack(self.active_range.load(Ordering::Acquire))
    }

    pub fn original_range(&self) -> SampleRange {
        self.original_range
    }

    /// Overrides the range for exactly the next note-on of this sound.
    pub fn set_temp_range(&self, range: SampleRange) -> Result<(), SamplerError> {
        check_range(&self.buffer, range)?;
        *self.temp_range.lock() = Some(range);
        Ok(())
    }

    pub fn has_temp_range(&self) -> bool {
        self.temp_range.lock().is_some()
    }

    /// Consumes a pending override, promoting it to the active range.
    pub(crate) fn take_temp_range(&self) -> Option<SampleRange> {
        let range = self.temp_range.lock().take()?;
        self.active_range.store(pack(range), Ordering::Release);
        Some(range)
    }

    pub(crate) fn restore_range(&self) {
        self.active_range
            .store(pack(self.original_range), Ordering::Release);
    }
}

impl fmt::Debug for SamplerSound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplerSound")
            .field("range", &self.range())
            .field("original_range", &self.original_range)
            .field("root_note", &self.root_note)
            .field("source_sample_rate", &self.source_sample_rate)
            .field("attack_samples", &self.attack_samples)
            .field("release_samples", &self.release_samples)
            .finish()
    }
}

/// Converts an envelope time to output samples.
pub fn ms_to_samples(ms: f64, sample_rate: u32) -> usize {
    (ms.max(0.0) * sample_rate as f64 / 1000.0).round() as usize
}

/// One sound per slice, on consecutive notes from `first_note`. Slices beyond the
/// MIDI note range get no sound.
pub fn slice_sounds(
    buffer: SharedSampleBuffer,
    source_sample_rate: u32,
    ranges: &[SampleRange],
    first_note: u8,
    attack_samples: usize,
    release_samples: usize,
) -> Result<Vec<Arc<SamplerSound>>, SamplerError> {
    let mut sounds = Vec::with_capacity(ranges.len());
    for (i, range) in ranges.iter().enumerate() {
        let note = first_note as usize + i;
        if note > 127 {
            warn!(
                slices = ranges.len(),
                first_note, "More slices than MIDI notes, ignoring the rest"
            );
            break;
        }
        let note = note as u8;
        sounds.push(Arc::new(SamplerSound::new(
            buffer.clone(),
            source_sample_rate,
            *range,
            NoteMask::single(note),
            note,
            attack_samples,
            release_samples,
        )?));
    }
    Ok(sounds)
}

fn check_range(buffer: &SampleBuffer, range: SampleRange) -> Result<(), SamplerError> {
    if buffer.num_frames() > u32::MAX as usize {
        return Err(SamplerError::TooLong(buffer.num_frames()));
    }
    if !range.fits_within(buffer.num_frames()) {
        return Err(SamplerError::RangeOutOfBounds {
            range,
            num_frames: buffer.num_frames(),
        });
    }
    Ok(())
}

fn pack(range: SampleRange) -> u64 {
    ((range.start_frame as u64) << 32) | (range.last_frame() as u64 & 0xffff_ffff)
}

fn unpack(packed: u64) -> SampleRange {
    let start = (packed >> 32) as usize;
    let last = (packed & 0xffff_ffff) as usize;
    SampleRange::new(start, last - start + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn buffer(frames: usize) -> SharedSampleBuffer {
        Arc::new(SampleBuffer::from_planar(vec![vec![0.0; frames]]).expect("buffer"))
    }

    #[test]
    fn test_note_masks() {
        let mask = NoteMask::range(36, 40);
        assert!(mask.contains(36));
        assert!(mask.contains(40));
        assert!(!mask.contains(41));
        assert!(NoteMask::single(127).contains(127));
        assert!(!NoteMask::all().contains(128));
        assert!(!NoteMask::default().contains(0));
    }

    #[test]
    fn test_temp_range_is_consumed_once() {
        let sound = SamplerSound::new(
            buffer(100),
            44100,
            SampleRange::new(0, 100),
            NoteMask::all(),
            60,
            0,
            0,
        )
        .expect("sound");
        sound.set_temp_range(SampleRange::new(20, 10)).expect("temp");
        assert!(sound.has_temp_range());

        assert_eq!(Some(SampleRange::new(20, 10)), sound.take_temp_range());
        assert_eq!(SampleRange::new(20, 10), sound.range());
        assert!(!sound.has_temp_range());
        assert_eq!(None, sound.take_temp_range());

        sound.restore_range();
        assert_eq!(SampleRange::new(0, 100), sound.range());
    }

    #[test]
    fn test_ranges_must_fit() {
        let result = SamplerSound::new(
            buffer(10),
            44100,
            SampleRange::new(5, 10),
            NoteMask::all(),
            60,
            0,
            0,
        );
        assert!(matches!(result, Err(SamplerError::RangeOutOfBounds { .. })));
        assert!(matches!(
            SamplerSound::new(buffer(10), 44100, SampleRange::new(0, 10), NoteMask::all(), 200, 0, 0),
            Err(SamplerError::InvalidNote(200))
        ));
    }

    #[test]
    fn test_slices_get_consecutive_notes() {
        let ranges = [SampleRange::new(0, 5), SampleRange::new(5, 5), SampleRange::new(10, 5)];
        let sounds = slice_sounds(buffer(15), 44100, &ranges, 126, 0, 0).expect("sounds");
        assert_eq!(2, sounds.len());
        assert!(sounds[0].applies_to_note(126));
        assert!(sounds[1].applies_to_note(127));
        assert_eq!(127, sounds[1].root_note());
        assert_eq!(SampleRange::new(5, 5), sounds[1].range());
    }

    #[test]
    fn test_envelope_times() {
        assert_eq!(441, ms_to_samples(10.0, 44100));
        assert_eq!(0, ms_to_samples(-5.0, 44100));
    }
}
