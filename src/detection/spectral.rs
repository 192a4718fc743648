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
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::fmt;
use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};

use super::{
    DetectionMethod, DetectionMode, DetectionSettings, Detector, DetectorFactory, DetectorOutput,
    MIN_INTER_ONSET_SECS,
};

/// Number of detection function values the adaptive threshold looks at.
const PEAK_HISTORY: usize = 8;

/// Tempo estimates are folded into this range.
const MIN_BPM: f32 = 60.0;
const MAX_BPM: f32 = 200.0;

const EPSILON: f32 = 1e-6;

/// Creates [`SpectralDetector`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct SpectralDetectorFactory;

impl DetectorFactory for SpectralDetectorFactory {
    fn create(&self, mode: DetectionMode, settings: &DetectionSettings) -> Box<dyn Detector> {
        Box::new(SpectralDetector::new(mode, settings))
    }
}

/// An FFT based onset detector with adaptive peak picking.
///
/// Each hop is appended to a sliding window which is Hann windowed and
/// transformed. The chosen onset detection function reduces the spectrum to one
/// value per hop, and a hop is an onset when its value is a local maximum above
/// the moving median plus `threshold` times the moving mean. In beat mode the
/// tempo is estimated from the median interval between onsets.
pub struct SpectralDetector {
    method: DetectionMethod,
    mode: DetectionMode,
    threshold: f32,
    hop_size: usize,
    sample_rate: u32,
    min_ioi_frames: usize,
    fft: Arc<dyn Fft<f32>>,
    window: Vec<f32>,
    input: Vec<f32>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    magnitudes: Vec<f32>,
    phases: Vec<f32>,
    prev_magnitudes: Vec<f32>,
    prev_phases: Vec<f32>,
    prev_prev_phases: Vec<f32>,
    odf: VecDeque<f32>,
    sorted: Vec<f32>,
    hops: usize,
    onsets: Vec<usize>,
    bpm: f32,
}

impl SpectralDetector {
    pub fn new(mode: DetectionMode, settings: &DetectionSettings) -> Self {
        let window_size = settings.window_size;
        let bins = window_size / 2 + 1;
        let fft = FftPlanner::new().plan_fft_forward(window_size);
        let scratch = vec![Complex::new(0.0, 0.0); fft.get_inplace_scratch_len()];
        let window = (0..window_size)
            .map(|i| 0.5 - 0.5 * (2.0 * PI * i as f32 / window_size as f32).cos())
            .collect();

        Self {
            method: settings.method,
            mode,
            threshold: settings.threshold,
            hop_size: settings.hop_size,
            sample_rate: settings.sample_rate,
            min_ioi_frames: (settings.sample_rate as f64 * MIN_INTER_ONSET_SECS) as usize,
            fft,
            window,
            input: vec![0.0; window_size],
            spectrum: vec![Complex::new(0.0, 0.0); window_size],
            scratch,
            magnitudes: vec![0.0; bins],
            phases: vec![0.0; bins],
            prev_magnitudes: vec![0.0; bins],
            prev_phases: vec![0.0; bins],
            prev_prev_phases: vec![0.0; bins],
            odf: VecDeque::with_capacity(PEAK_HISTORY + 1),
            sorted: Vec::with_capacity(PEAK_HISTORY + 1),
            hops: 0,
            onsets: Vec::new(),
            bpm: 0.0,
        }
    }

    fn analyse(&mut self, hop: &[f32]) {
        let window_size = self.input.len();
        let n = hop.len().min(window_size);
        self.input.copy_within(n.., 0);
        self.input[window_size - n..].copy_from_slice(&hop[hop.len() - n..]);

        for ((bin, sample), weight) in self
            .spectrum
            .iter_mut()
            .zip(self.input.iter())
            .zip(self.window.iter())
        {
            *bin = Complex::new(sample * weight, 0.0);
        }
        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        std::mem::swap(&mut self.prev_prev_phases, &mut self.prev_phases);
        std::mem::swap(&mut self.prev_phases, &mut self.phases);
        std::mem::swap(&mut self.prev_magnitudes, &mut self.magnitudes);
        for (k, bin) in self.spectrum.iter().take(self.magnitudes.len()).enumerate() {
            self.magnitudes[k] = bin.norm();
            self.phases[k] = bin.arg();
        }
    }

    /// Reduces the current spectrum to a single onset detection value.
    fn detection_function(&self) -> f32 {
        let bins = self.magnitudes.len();
        let current = self.magnitudes.iter().zip(self.prev_magnitudes.iter());
        match self.method {
            DetectionMethod::Energy => self.magnitudes.iter().map(|m| m * m).sum(),
            DetectionMethod::Hfc => self
                .magnitudes
                .iter()
                .enumerate()
                .map(|(k, m)| k as f32 * m)
                .sum(),
            DetectionMethod::Complex => (0..bins)
                .map(|k| {
                    let target = Complex::from_polar(
                        self.prev_magnitudes[k],
                        2.0 * self.prev_phases[k] - self.prev_prev_phases[k],
                    );
                    (Complex::from_polar(self.magnitudes[k], self.phases[k]) - target).norm()
                })
                .sum(),
            DetectionMethod::Phase => {
                let deviation: f32 = (0..bins)
                    .map(|k| {
                        princarg(self.phases[k] - 2.0 * self.prev_phases[k] + self.prev_prev_phases[k])
                            .abs()
                    })
                    .sum();
                deviation / bins as f32
            }
            DetectionMethod::SpecDiff => current.map(|(m, p)| (m * m - p * p).abs().sqrt()).sum(),
            DetectionMethod::Kl => current.map(|(m, p)| m * (1.0 + m / (p + EPSILON)).ln()).sum(),
            DetectionMethod::Mkl => current.map(|(m, p)| (1.0 + m / (p + EPSILON)).ln()).sum(),
            DetectionMethod::SpecFlux => current.map(|(m, p)| (m - p).max(0.0)).sum(),
        }
    }

    /// Checks whether the second newest detection value is a peak.
    fn is_peak(&mut self) -> bool {
        let len = self.odf.len();
        if len < 3 {
            return false;
        }
        let candidate = self.odf[len - 2];
        if candidate <= self.odf[len - 3] || candidate < self.odf[len - 1] {
            return false;
        }

        self.sorted.clear();
        self.sorted.extend(self.odf.iter().copied());
        self.sorted.sort_unstable_by(f32::total_cmp);
        let median = self.sorted[self.sorted.len() / 2];
        let mean = self.sorted.iter().sum::<f32>() / self.sorted.len() as f32;
        candidate > median + self.threshold * mean
    }

    fn update_tempo(&mut self) {
        if self.onsets.len() < 2 {
            return;
        }
        let mut intervals: Vec<usize> = self.onsets.windows(2).map(|w| w[1] - w[0]).collect();
        intervals.sort_unstable();
        let median = intervals[intervals.len() / 2];
        if median == 0 {
            return;
        }
        let mut bpm = 60.0 * self.sample_rate as f32 / median as f32;
        while bpm < MIN_BPM {
            bpm *= 2.0;
        }
        while bpm > MAX_BPM {
            bpm /= 2.0;
        }
        self.bpm = bpm;
    }
}

impl Detector for SpectralDetector {
    fn feed(&mut self, hop: &[f32]) -> DetectorOutput {
        self.analyse(hop);
        let value = self.detection_function();
        self.odf.push_back(if value.is_finite() { value } else { 0.0 });
        if self.odf.len() > PEAK_HISTORY {
            self.odf.pop_front();
        }

        let hop_index = self.hops;
        self.hops += 1;

        let mut detected = false;
        if hop_index > 0 && self.is_peak() {
            let frame = (hop_index - 1) * self.hop_size;
            let spaced = self
                .onsets
                .last()
                .map_or(true, |&last| frame >= last + self.min_ioi_frames);
            if spaced {
                self.onsets.push(frame);
                detected = true;
                if self.mode == DetectionMode::Beat {
                    self.update_tempo();
                }
            }
        }

        DetectorOutput {
            detected,
            last_frame: self.onsets.last().copied().unwrap_or(0),
            bpm: self.bpm,
        }
    }
}

impl fmt::Debug for SpectralDetector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpectralDetector")
            .field("method", &self.method)
            .field("mode", &self.mode)
            .field("threshold", &self.threshold)
            .field("window_size", &self.input.len())
            .field("hop_size", &self.hop_size)
            .field("hops", &self.hops)
            .field("onsets", &self.onsets.len())
            .finish()
    }
}

/// Wraps a phase into (-pi, pi].
fn princarg(phase: f32) -> f32 {
    phase - 2.0 * PI * (phase / (2.0 * PI)).round()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector(method: DetectionMethod, mode: DetectionMode) -> SpectralDetector {
        let settings =
            DetectionSettings::new(method, 0.3, 256, 128, 8000).expect("settings");
        SpectralDetector::new(mode, &settings)
    }

    #[test]
    fn test_princarg_wraps() {
        assert!((princarg(3.0 * PI) - PI).abs() < 1e-4 || (princarg(3.0 * PI) + PI).abs() < 1e-4);
        assert!((princarg(0.5) - 0.5).abs() < 1e-6);
        assert!((princarg(-2.0 * PI + 0.25) - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_single_burst_is_one_onset() {
        for method in DetectionMethod::ALL {
            let mut detector = detector(method, DetectionMode::Onset);
            let silence = vec![0.0; 128];
            let burst: Vec<f32> = (0..128)
                .map(|i| if i < 32 { 0.8 * if i % 2 == 0 { 1.0 } else { -1.0 } } else { 0.0 })
                .collect();

            let mut detections = Vec::new();
            for hop in 0..12 {
                let output = if hop == 5 {
                    detector.feed(&burst)
                } else {
                    detector.feed(&silence)
                };
                if output.detected {
                    detections.push(output.last_frame);
                }
            }
            assert!(
                !detections.is_empty() && detections.len() <= 2,
                "{}: {detections:?}",
                method.name()
            );
            assert!(
                detections.iter().all(|&f| (512..=1024).contains(&f)),
                "{}: {detections:?}",
                method.name()
            );
        }
    }

    #[test]
    fn test_tempo_is_folded_into_range() {
        let mut detector = detector(DetectionMethod::SpecFlux, DetectionMode::Beat);
        // 0.25s apart at 8kHz is 240 BPM, folded to 120.
        detector.onsets = vec![0, 2000, 4000, 6000];
        detector.update_tempo();
        assert_eq!(120.0, detector.bpm);

        detector.onsets = vec![0, 16000, 32000];
        detector.update_tempo();
        assert_eq!(60.0, detector.bpm);
    }
}
