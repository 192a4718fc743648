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
//! YAML settings for detection, playback, display and export.

use std::path::Path;

use config::{Config, File, FileFormat};
use serde::Deserialize;
use tracing::info;

mod detection;
mod display;
mod error;
mod export;
mod sampler;

pub use detection::DetectionConfig;
pub use display::DisplayConfig;
pub use error::ConfigError;
pub use export::ExportConfig;
pub use sampler::SamplerConfig;

/// All settings. Every section and field is optional in the file.
#[derive(Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Settings {
    #[serde(default)]
    detection: DetectionConfig,

    #[serde(default)]
    sampler: SamplerConfig,

    #[serde(default)]
    display: DisplayConfig,

    #[serde(default)]
    export: ExportConfig,
}

impl Settings {
    /// Loads and validates settings from a YAML file.
    pub fn load(path: &Path) -> Result<Settings, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from(path))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        info!(path = ?path, "Settings loaded");
        Ok(settings)
    }

    /// Loads settings from the given file, or the defaults when there is none.
    pub fn load_or_default(path: Option<&Path>) -> Result<Settings, ConfigError> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Settings::default()),
        }
    }

    /// Parses and validates settings from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Settings, ConfigError> {
        let settings: Settings = Config::builder()
            .add_source(File::from_str(yaml, FileFormat::Yaml))
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Rejects settings the engine can't run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Any positive rate will do to check the window and hop.
        self.detection.settings(44100)?;

        let sampler = &self.sampler;
        if sampler.max_voices() == 0 {
            return Err(ConfigError::invalid(
                "sampler.max_voices",
                "at least one voice is required",
            ));
        }
        if sampler.first_note() > 127 {
            return Err(ConfigError::invalid(
                "sampler.first_note",
                format!("{} is not a MIDI note", sampler.first_note()),
            ));
        }
        if !(1..=2).contains(&sampler.output_channels()) {
            return Err(ConfigError::invalid(
                "sampler.output_channels",
                format!("{} channels, expected 1 or 2", sampler.output_channels()),
            ));
        }
        if sampler.output_sample_rate() == 0 {
            return Err(ConfigError::invalid(
                "sampler.output_sample_rate",
                "must be greater than zero",
            ));
        }
        if sampler.block_size() == 0 || sampler.queue_size() == 0 {
            return Err(ConfigError::invalid(
                "sampler.block_size",
                "block and queue sizes must be greater than zero",
            ));
        }
        if !(sampler.attack_ms() >= 0.0 && sampler.release_ms() >= 0.0) {
            return Err(ConfigError::invalid(
                "sampler.attack_ms",
                "envelope times can't be negative",
            ));
        }
        if !(self.display.width() > 0.0) {
            return Err(ConfigError::invalid(
                "display.width",
                format!("{} is not a usable width", self.display.width()),
            ));
        }
        Ok(())
    }

    pub fn detection(&self) -> &DetectionConfig {
        &self.detection
    }

    pub fn detection_mut(&mut self) -> &mut DetectionConfig {
        &mut self.detection
    }

    pub fn sampler(&self) -> &SamplerConfig {
        &self.sampler
    }

    pub fn display(&self) -> &DisplayConfig {
        &self.display
    }

    pub fn export(&self) -> &ExportConfig {
        &self.export
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::arrangement::SnapMode;
    use crate::audio::SaveFormat;
    use crate::detection::{DetectionError, DetectionMethod};

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.detection().method(), DetectionMethod::SpecFlux);
        assert_eq!(settings.sampler().first_note(), 36);
        assert_eq!(settings.sampler().max_voices(), 16);
        assert_eq!(settings.display().snap_mode(), SnapMode::Off);
        assert_eq!(settings.export().format(), SaveFormat::Wav);

        let detection = settings.detection().settings(44100).unwrap();
        assert_eq!(detection.window_size, 1024);
        assert_eq!(detection.hop_size, 512);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = r#"
            detection:
              method: hfc
              window_size: 2048
              hop_overlap_percent: 25
            display:
              snap_mode: slices_to_markers
            export:
              format: au
              directory: /tmp/slices
        "#;
        let settings = Settings::from_yaml(yaml).unwrap();
        assert_eq!(settings.detection().method(), DetectionMethod::Hfc);
        assert_eq!(settings.detection().threshold(), 0.3);

        let detection = settings.detection().settings(48000).unwrap();
        assert_eq!(detection.window_size, 2048);
        assert_eq!(detection.hop_size, 512);
        assert_eq!(detection.sample_rate, 48000);

        assert_eq!(settings.display().snap_mode(), SnapMode::SlicesToMarkers);
        assert_eq!(settings.display().width(), 1024.0);
        assert_eq!(settings.export().format(), SaveFormat::Au);
        assert_eq!(
            settings.export().directory(),
            Some(Path::new("/tmp/slices"))
        );
        assert_eq!(settings.sampler(), &SamplerConfig::default());
    }

    #[test]
    fn test_rejects_bad_window() {
        let yaml = r#"
            detection:
              window_size: 1000
        "#;
        match Settings::from_yaml(yaml) {
            Err(ConfigError::Detection(DetectionError::InvalidWindowSize(1000))) => {}
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn test_rejects_bad_sampler() {
        let yaml = r#"
            sampler:
              max_voices: 0
        "#;
        assert!(matches!(
            Settings::from_yaml(yaml),
            Err(ConfigError::Invalid {
                field: "sampler.max_voices",
                ..
            })
        ));

        let yaml = r#"
            sampler:
              output_channels: 6
        "#;
        assert!(matches!(
            Settings::from_yaml(yaml),
            Err(ConfigError::Invalid {
                field: "sampler.output_channels",
                ..
            })
        ));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("beatslicer.yaml");
        fs::write(
            &path,
            "sampler:\n  first_note: 48\n  release_ms: 10\n",
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.sampler().first_note(), 48);
        assert_eq!(settings.sampler().release_ms(), 10.0);

        assert!(matches!(
            Settings::load(&dir.path().join("missing.yaml")),
            Err(ConfigError::Load(_))
        ));
        assert_eq!(Settings::load_or_default(None).unwrap(), Settings::default());
    }
}
