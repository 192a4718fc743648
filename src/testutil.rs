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
//! Fixtures shared by the unit tests.
use std::{error::Error, f32::consts::PI, fs::File, path::PathBuf, sync::Arc};

use hound::{Sample, SampleFormat, WavSpec, WavWriter};
use parking_lot::Mutex;

use crate::audio::SampleBuffer;
use crate::detection::{DetectionMode, DetectionSettings, Detector, DetectorFactory, DetectorOutput};

/// Writes planar samples to a 32 bit WAV file. `S` picks float or integer
/// encoding.
pub fn write_wav<S: Sample + Copy + 'static>(
    path: PathBuf,
    samples: Vec<Vec<S>>,
    sample_rate: u32,
) -> Result<(), Box<dyn Error>> {
    let sample_format = if std::any::TypeId::of::<S>() == std::any::TypeId::of::<f32>() {
        SampleFormat::Float
    } else if std::any::TypeId::of::<S>() == std::any::TypeId::of::<i32>() {
        SampleFormat::Int
    } else {
        return Err("Unsupported sample format".into());
    };

    let mut writer = WavWriter::new(
        File::create(path)?,
        WavSpec {
            channels: samples.len() as u16,
            sample_rate,
            bits_per_sample: 32,
            sample_format,
        },
    )?;

    let num_frames = samples.iter().map(Vec::len).max().unwrap_or(0);
    for frame in 0..num_frames {
        for channel in &samples {
            writer.write_sample(channel[frame])?;
        }
    }
    writer.finalize()?;
    Ok(())
}

/// A mono sine wave.
pub fn sine(frequency: f32, amplitude: f32, sample_rate: u32, num_frames: usize) -> Vec<f32> {
    (0..num_frames)
        .map(|i| amplitude * (2.0 * PI * frequency * i as f32 / sample_rate as f32).sin())
        .collect()
}

/// A mono buffer of silence with a short broadband click every `period` frames,
/// starting at `period`.
pub fn click_train(period: usize, num_frames: usize) -> SampleBuffer {
    let mut samples = vec![0.0f32; num_frames];
    let mut start = period;
    while start < num_frames {
        for (i, sample) in samples[start..].iter_mut().take(64).enumerate() {
            let sign = if i % 2 == 0 { 1.0 } else { -1.0 };
            *sample = 0.9 * sign * (1.0 - i as f32 / 64.0);
        }
        start += period;
    }
    SampleBuffer::from_planar(vec![samples]).expect("click train")
}

/// A detector factory that replays fixed outputs, one per hop, and then reports
/// nothing.
#[derive(Debug, Clone)]
pub struct ScriptedDetectorFactory {
    outputs: Arc<Vec<DetectorOutput>>,
    hops_fed: Arc<Mutex<usize>>,
}

impl ScriptedDetectorFactory {
    pub fn new(outputs: Vec<DetectorOutput>) -> Self {
        Self {
            outputs: Arc::new(outputs),
            hops_fed: Arc::new(Mutex::new(0)),
        }
    }

    /// Hops fed to the most recently created detector.
    pub fn hops_fed(&self) -> usize {
        *self.hops_fed.lock()
    }
}

impl DetectorFactory for ScriptedDetectorFactory {
    fn create(&self, _mode: DetectionMode, _settings: &DetectionSettings) -> Box<dyn Detector> {
        *self.hops_fed.lock() = 0;
        Box::new(ScriptedDetector {
            outputs: self.outputs.clone(),
            hops_fed: self.hops_fed.clone(),
        })
    }
}

struct ScriptedDetector {
    outputs: Arc<Vec<DetectorOutput>>,
    hops_fed: Arc<Mutex<usize>>,
}

impl Detector for ScriptedDetector {
    fn feed(&mut self, _hop: &[f32]) -> DetectorOutput {
        let mut hops_fed = self.hops_fed.lock();
        let output = self.outputs.get(*hops_fed).copied().unwrap_or_default();
        *hops_fed += 1;
        output
    }
}
