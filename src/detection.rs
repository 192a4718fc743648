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
//! Onset and beat detection over a sample buffer.
//!
//! The numerical work is done by a [`Detector`], created per call by a
//! [`DetectorFactory`] and fed the sample one mono hop at a time. This module
//! only drives the detector and applies the spacing rules between slice points.
use serde::Deserialize;
use tracing::{debug, info};

use crate::audio::SampleBuffer;

mod spectral;

pub use spectral::{SpectralDetector, SpectralDetectorFactory};

/// Minimum distance between two slice points, in seconds.
pub const MIN_INTER_ONSET_SECS: f64 = 0.07;

/// The window sizes offered for detection.
pub const WINDOW_SIZES: [usize; 7] = [128, 256, 512, 1024, 2048, 4096, 8192];

/// Hop sizes offered for detection, as a percentage of the window size.
pub const HOP_OVERLAP_PERCENTAGES: [f64; 5] = [100.0, 50.0, 25.0, 12.5, 6.25];

/// Onset detection function.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DetectionMethod {
    /// Local energy.
    Energy,
    /// High frequency content.
    Hfc,
    /// Complex domain.
    Complex,
    /// Phase deviation.
    Phase,
    /// Spectral difference.
    #[value(name = "specdiff")]
    SpecDiff,
    /// Kullback-Liebler.
    Kl,
    /// Modified Kullback-Liebler.
    Mkl,
    /// Spectral flux.
    #[default]
    #[value(name = "specflux")]
    SpecFlux,
}

impl DetectionMethod {
    pub const ALL: [DetectionMethod; 8] = [
        DetectionMethod::Energy,
        DetectionMethod::Hfc,
        DetectionMethod::Complex,
        DetectionMethod::Phase,
        DetectionMethod::SpecDiff,
        DetectionMethod::Kl,
        DetectionMethod::Mkl,
        DetectionMethod::SpecFlux,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            DetectionMethod::Energy => "energy",
            DetectionMethod::Hfc => "hfc",
            DetectionMethod::Complex => "complex",
            DetectionMethod::Phase => "phase",
            DetectionMethod::SpecDiff => "specdiff",
            DetectionMethod::Kl => "kl",
            DetectionMethod::Mkl => "mkl",
            DetectionMethod::SpecFlux => "specflux",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectionMode {
    /// Every transient.
    Onset,
    /// Rhythmic events, spaced at least [`MIN_INTER_ONSET_SECS`] apart.
    Beat,
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum DetectionError {
    #[error("Window size {0} is not a power of two between 2 and 65536")]
    InvalidWindowSize(usize),

    #[error("Hop size {hop_size} must be between 1 and the window size {window_size}")]
    InvalidHopSize { hop_size: usize, window_size: usize },

    #[error("Hop overlap {0}% must be greater than 0 and at most 100")]
    InvalidOverlap(f64),

    #[error("Sample rate must be greater than zero")]
    InvalidSampleRate,
}

/// Parameters for one detection run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectionSettings {
    pub method: DetectionMethod,
    /// Peak picking threshold. Lower values detect more.
    pub threshold: f32,
    pub window_size: usize,
    pub hop_size: usize,
    pub sample_rate: u32,
}

impl DetectionSettings {
    pub fn new(
        method: DetectionMethod,
        threshold: f32,
        window_size: usize,
        hop_size: usize,
        sample_rate: u32,
    ) -> Result<Self, DetectionError> {
        if !window_size.is_power_of_two() || !(2..=65536).contains(&window_size) {
            return Err(DetectionError::InvalidWindowSize(window_size));
        }
        if hop_size == 0 || hop_size > window_size {
            return Err(DetectionError::InvalidHopSize {
                hop_size,
                window_size,
            });
        }
        if sample_rate == 0 {
            return Err(DetectionError::InvalidSampleRate);
        }
        Ok(Self {
            method,
            threshold,
            window_size,
            hop_size,
            sample_rate,
        })
    }

    /// Derives the hop size as a percentage of the window size.
    pub fn from_overlap(
        method: DetectionMethod,
        threshold: f32,
        window_size: usize,
        overlap_percent: f64,
        sample_rate: u32,
    ) -> Result<Self, DetectionError> {
        if !(overlap_percent > 0.0 && overlap_percent <= 100.0) {
            return Err(DetectionError::InvalidOverlap(overlap_percent));
        }
        let hop_size = (window_size as f64 * (overlap_percent / 100.0)) as usize;
        Self::new(method, threshold, window_size, hop_size, sample_rate)
    }

    /// Minimum slice point spacing in frames at this sample rate.
    pub fn min_gap_frames(&self) -> usize {
        min_gap_frames(self.sample_rate)
    }
}

/// What a detector reports after each hop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DetectorOutput {
    /// Whether an onset or beat was found in this hop.
    pub detected: bool,
    /// Frame of the most recent detection, counted from the first hop.
    pub last_frame: usize,
    /// Current tempo estimate, or 0 when there is none.
    pub bpm: f32,
}

/// A stateful onset/beat detector fed consecutive mono hops.
pub trait Detector {
    fn feed(&mut self, hop: &[f32]) -> DetectorOutput;
}

/// Creates a fresh detector per detection run.
pub trait DetectorFactory {
    fn create(&self, mode: DetectionMode, settings: &DetectionSettings) -> Box<dyn Detector>;
}

/// Minimum slice point spacing in frames.
pub fn min_gap_frames(sample_rate: u32) -> usize {
    (sample_rate as f64 * MIN_INTER_ONSET_SECS).floor() as usize
}

/// Runs a detector over the whole buffer and returns the detected frames.
pub fn detect_slice_points(
    buffer: &SampleBuffer,
    settings: &DetectionSettings,
    mode: DetectionMode,
    factory: &dyn DetectorFactory,
) -> Vec<usize> {
    let min_spacing = settings.sample_rate as f64 * MIN_INTER_ONSET_SECS;
    let mut points: Vec<usize> = Vec::new();

    feed_hops(buffer, settings, mode, factory, |output| {
        if !output.detected {
            return;
        }
        match (mode, points.last()) {
            (DetectionMode::Beat, Some(&last)) => {
                if output.last_frame as f64 >= last as f64 + min_spacing {
                    points.push(output.last_frame);
                }
            }
            _ => points.push(output.last_frame),
        }
    });

    info!(
        method = settings.method.name(),
        ?mode,
        detections = points.len(),
        "Detection finished"
    );
    points
}

/// Averages the detector's tempo estimates over the buffer, rounded to the
/// nearest whole BPM. Returns 0 when nothing was detected.
pub fn calc_bpm(
    buffer: &SampleBuffer,
    settings: &DetectionSettings,
    factory: &dyn DetectorFactory,
) -> u32 {
    let mut sum = 0.0f64;
    let mut count = 0usize;
    feed_hops(buffer, settings, DetectionMode::Beat, factory, |output| {
        if output.detected && output.bpm > 0.0 {
            sum += output.bpm as f64;
            count += 1;
        }
    });

    if count == 0 {
        return 0;
    }
    let bpm = (sum / count as f64 + 0.5).floor() as u32;
    info!(bpm, estimates = count, "Tempo calculated");
    bpm
}

/// Drops slice points too close to the sample edges or to the previously kept
/// point. Run over detector results before slicing.
pub fn filter_slice_points(frames: &[usize], total_frames: usize, sample_rate: u32) -> Vec<usize> {
    let min_gap = min_gap_frames(sample_rate);
    let mut sorted = frames.to_vec();
    sorted.sort_unstable();

    let mut kept = Vec::with_capacity(sorted.len());
    let mut prev = 0;
    for frame in sorted {
        if frame > min_gap && frame + min_gap < total_frames && frame > prev + min_gap {
            kept.push(frame);
            prev = frame;
        }
    }
    if kept.len() != frames.len() {
        debug!(
            dropped = frames.len() - kept.len(),
            min_gap, "Filtered slice points"
        );
    }
    kept
}

fn feed_hops(
    buffer: &SampleBuffer,
    settings: &DetectionSettings,
    mode: DetectionMode,
    factory: &dyn DetectorFactory,
    mut on_output: impl FnMut(DetectorOutput),
) {
    let mut detector = factory.create(mode, settings);
    let mut hop = vec![0.0f32; settings.hop_size];
    for start in (0..buffer.num_frames()).step_by(settings.hop_size) {
        buffer.mix_to_mono(start, &mut hop);
        on_output(detector.feed(&hop));
    }
}
