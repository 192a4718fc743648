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

//! In-memory audio storage.
//!
//! Sample data is stored planar (one `Vec<f32>` per channel) so that slices,
//! mono mixdowns and the sampler's interpolating reader can index a channel
//! directly without de-interleaving.

use std::fmt;
use std::sync::Arc;

use super::error::AudioFileError;

/// A sample buffer shared between the arrangement, the detector and the sampler.
pub type SharedSampleBuffer = Arc<SampleBuffer>;

/// Maximum number of channels a sample buffer can hold.
pub const MAX_CHANNELS: usize = 2;

/// A contiguous interval of frames: `[start_frame, start_frame + num_frames)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SampleRange {
    pub start_frame: usize,
    pub num_frames: usize,
}

impl SampleRange {
    /// Creates a new sample range.
    pub fn new(start_frame: usize, num_frames: usize) -> Self {
        Self {
            start_frame,
            num_frames,
        }
    }

    /// The first frame past the end of the range.
    pub fn end_frame(&self) -> usize {
        self.start_frame + self.num_frames
    }

    /// The last frame inside the range (inclusive). Empty ranges return the start frame.
    pub fn last_frame(&self) -> usize {
        self.end_frame().saturating_sub(1).max(self.start_frame)
    }

    /// Returns true if the frame lies inside the range.
    pub fn contains(&self, frame: usize) -> bool {
        frame >= self.start_frame && frame < self.end_frame()
    }

    /// Returns true if the range fits inside a buffer of `total_frames` frames.
    pub fn fits_within(&self, total_frames: usize) -> bool {
        self.num_frames > 0 && self.end_frame() <= total_frames
    }
}

impl fmt::Display for SampleRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.start_frame, self.num_frames)
    }
}

/// Provenance of a sample buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampleHeader {
    pub sample_rate: u32,
    pub num_channels: u16,
    pub bits_per_sample: u16,
    /// Human readable container name, e.g. "WAV".
    pub format: String,
}

/// Planar multi-channel audio. The length is fixed once constructed.
#[derive(Clone, PartialEq)]
pub struct SampleBuffer {
    channels: Vec<Vec<f32>>,
}

impl SampleBuffer {
    /// Allocates a silent buffer, reporting an allocation failure instead of aborting.
    pub fn try_new(num_channels: usize, num_frames: usize) -> Result<Self, AudioFileError> {
        if num_channels == 0 || num_channels > MAX_CHANNELS {
            return Err(AudioFileError::UnsupportedChannels(num_channels as u16));
        }

        let mut channels = Vec::with_capacity(num_channels);
        for _ in 0..num_channels {
            let mut data: Vec<f32> = Vec::new();
            data.try_reserve_exact(num_frames)
                .map_err(|_| AudioFileError::Allocation {
                    frames: num_frames,
                    channels: num_channels,
                })?;
            data.resize(num_frames, 0.0);
            channels.push(data);
        }

        Ok(Self { channels })
    }

    /// Builds a buffer from planar channel data. All channels must have equal length.
    pub fn from_planar(channels: Vec<Vec<f32>>) -> Result<Self, AudioFileError> {
        if channels.is_empty() || channels.len() > MAX_CHANNELS {
            return Err(AudioFileError::UnsupportedChannels(channels.len() as u16));
        }
        let num_frames = channels[0].len();
        if channels.iter().any(|c| c.len() != num_frames) {
            return Err(AudioFileError::FileFormat {
                path: String::new(),
                detail: "channels have mismatched lengths".to_string(),
            });
        }
        Ok(Self { channels })
    }

    /// Builds a buffer from interleaved samples.
    pub fn from_interleaved(samples: &[f32], num_channels: usize) -> Result<Self, AudioFileError> {
        if num_channels == 0 || num_channels > MAX_CHANNELS {
            return Err(AudioFileError::UnsupportedChannels(num_channels as u16));
        }
        let num_frames = samples.len() / num_channels;
        let mut buffer = Self::try_new(num_channels, num_frames)?;
        for (frame, chunk) in samples.chunks_exact(num_channels).enumerate() {
            for (ch, sample) in chunk.iter().enumerate() {
                buffer.channels[ch][frame] = *sample;
            }
        }
        Ok(buffer)
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub fn num_frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    /// The range covering the whole buffer.
    pub fn full_range(&self) -> SampleRange {
        SampleRange::new(0, self.num_frames())
    }

    /// Read access to one channel.
    pub fn channel(&self, channel: usize) -> &[f32] {
        &self.channels[channel]
    }

    /// Write access to one channel.
    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        &mut self.channels[channel]
    }

    /// Copies `num_frames` frames from a channel of another buffer into this one.
    pub fn copy_from(
        &mut self,
        dest_channel: usize,
        dest_start: usize,
        source: &SampleBuffer,
        source_channel: usize,
        source_start: usize,
        num_frames: usize,
    ) {
        let src = &source.channels[source_channel][source_start..source_start + num_frames];
        self.channels[dest_channel][dest_start..dest_start + num_frames].copy_from_slice(src);
    }

    /// Creates a new buffer holding a copy of the given range.
    pub fn copy_range(&self, range: SampleRange) -> Result<SampleBuffer, AudioFileError> {
        self.check_range(range)?;
        let mut buffer = Self::try_new(self.num_channels(), range.num_frames)?;
        for ch in 0..self.num_channels() {
            buffer.copy_from(ch, 0, self, ch, range.start_frame, range.num_frames);
        }
        Ok(buffer)
    }

    /// Mixes the frames starting at `start_frame` down to mono by averaging channels.
    /// Frames past the end of the buffer are written as silence.
    pub fn mix_to_mono(&self, start_frame: usize, output: &mut [f32]) {
        output.fill(0.0);
        let num_frames = self.num_frames();
        if start_frame >= num_frames {
            return;
        }
        let available = (num_frames - start_frame).min(output.len());
        let multiplier = 1.0 / self.num_channels() as f32;
        for channel in &self.channels {
            for (out, sample) in output[..available]
                .iter_mut()
                .zip(&channel[start_frame..start_frame + available])
            {
                *out += sample * multiplier;
            }
        }
    }

    /// Scales a range by a constant gain.
    pub fn apply_gain(&mut self, range: SampleRange, gain: f32) -> Result<(), AudioFileError> {
        self.apply_gain_ramp(range, gain, gain)
    }

    /// Scales a range by a gain that moves linearly from `start_gain` to `end_gain`.
    pub fn apply_gain_ramp(
        &mut self,
        range: SampleRange,
        start_gain: f32,
        end_gain: f32,
    ) -> Result<(), AudioFileError> {
        self.check_range(range)?;
        let steps = range.num_frames.saturating_sub(1).max(1) as f32;
        let increment = (end_gain - start_gain) / steps;
        for channel in &mut self.channels {
            let mut gain = start_gain;
            for sample in &mut channel[range.start_frame..range.end_frame()] {
                *sample *= gain;
                gain += increment;
            }
        }
        Ok(())
    }

    /// Scales a range so that its loudest sample reaches full scale.
    /// Silent ranges are left untouched.
    pub fn normalise(&mut self, range: SampleRange) -> Result<(), AudioFileError> {
        self.check_range(range)?;
        let peak = self
            .channels
            .iter()
            .flat_map(|c| c[range.start_frame..range.end_frame()].iter())
            .fold(0.0f32, |peak, s| peak.max(s.abs()));
        if peak > 0.0 {
            self.apply_gain(range, 1.0 / peak)?;
        }
        Ok(())
    }

    /// Reverses a range in place.
    pub fn reverse(&mut self, range: SampleRange) -> Result<(), AudioFileError> {
        self.check_range(range)?;
        for channel in &mut self.channels {
            channel[range.start_frame..range.end_frame()].reverse();
        }
        Ok(())
    }

    /// Returns interleaved samples for a range, used when encoding.
    pub(crate) fn interleave_into(&self, range: SampleRange, output: &mut Vec<f32>) {
        output.clear();
        for frame in range.start_frame..range.end_frame() {
            for channel in &self.channels {
                output.push(channel[frame]);
            }
        }
    }

    /// Memory used by the sample data in bytes.
    pub fn memory_size(&self) -> usize {
        self.num_channels() * self.num_frames() * std::mem::size_of::<f32>()
    }

    fn check_range(&self, range: SampleRange) -> Result<(), AudioFileError> {
        if range.fits_within(self.num_frames()) {
            Ok(())
        } else {
            Err(AudioFileError::RangeOutOfBounds {
                range,
                num_frames: self.num_frames(),
            })
        }
    }
}

impl fmt::Debug for SampleBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleBuffer")
            .field("channels", &self.num_channels())
            .field("frames", &self.num_frames())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(num_frames: usize) -> Vec<f32> {
        (0..num_frames).map(|i| i as f32).collect()
    }

    #[test]
    fn test_rejects_unsupported_channel_counts() {
        assert!(matches!(
            SampleBuffer::try_new(0, 10),
            Err(AudioFileError::UnsupportedChannels(0))
        ));
        assert!(matches!(
            SampleBuffer::try_new(3, 10),
            Err(AudioFileError::UnsupportedChannels(3))
        ));
    }

    #[test]
    fn test_from_interleaved() {
        let buffer = SampleBuffer::from_interleaved(&[1.0, -1.0, 2.0, -2.0, 3.0, -3.0], 2).unwrap();
        assert_eq!(buffer.num_frames(), 3);
        assert_eq!(buffer.channel(0), &[1.0, 2.0, 3.0]);
        assert_eq!(buffer.channel(1), &[-1.0, -2.0, -3.0]);
    }

    #[test]
    fn test_copy_range() {
        let buffer = SampleBuffer::from_planar(vec![ramp(100)]).unwrap();
        let copy = buffer.copy_range(SampleRange::new(10, 5)).unwrap();
        assert_eq!(copy.channel(0), &[10.0, 11.0, 12.0, 13.0, 14.0]);

        assert!(buffer.copy_range(SampleRange::new(98, 5)).is_err());
        assert!(buffer.copy_range(SampleRange::new(0, 0)).is_err());
    }

    #[test]
    fn test_mix_to_mono_pads_with_silence() {
        let buffer =
            SampleBuffer::from_planar(vec![vec![1.0, 1.0, 1.0], vec![0.0, 0.5, 1.0]]).unwrap();
        let mut output = vec![9.0; 4];
        buffer.mix_to_mono(1, &mut output);
        assert_eq!(output, vec![0.75, 1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_gain_ramp_and_normalise() {
        let mut buffer = SampleBuffer::from_planar(vec![vec![0.5; 5]]).unwrap();
        buffer
            .apply_gain_ramp(buffer.full_range(), 0.0, 1.0)
            .unwrap();
        assert_eq!(buffer.channel(0)[0], 0.0);
        assert!((buffer.channel(0)[4] - 0.5).abs() < 1e-6);

        buffer.normalise(buffer.full_range()).unwrap();
        assert!((buffer.channel(0)[4] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_reverse() {
        let mut buffer = SampleBuffer::from_planar(vec![ramp(6)]).unwrap();
        buffer.reverse(SampleRange::new(1, 3)).unwrap();
        assert_eq!(buffer.channel(0), &[0.0, 3.0, 2.0, 1.0, 4.0, 5.0]);
    }

    #[test]
    fn test_range_helpers() {
        let range = SampleRange::new(10, 5);
        assert_eq!(range.end_frame(), 15);
        assert_eq!(range.last_frame(), 14);
        assert!(range.contains(14));
        assert!(!range.contains(15));
        assert!(range.fits_within(15));
        assert!(!range.fits_within(14));
    }
}
