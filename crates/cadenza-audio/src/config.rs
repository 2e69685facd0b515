use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use cadenza_dsp::Quality;

use crate::volume::MAX_VOLUME_LEVEL;

/// Tunables of a [`crate::StreamDeviceManager`].
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Directory holding the PCM device nodes.
    pub device_dir: PathBuf,
    /// Where per-policy volume and mute state is persisted.
    pub metadata_path: PathBuf,
    pub max_input_cards: usize,
    pub max_output_cards: usize,
    pub max_devices_per_card: usize,
    /// Xrun recoveries attempted before a transfer gives up.
    pub retry_count: u32,
    pub period_size: usize,
    pub period_count: usize,
    /// Resampler quality, 0 ..= 10.
    pub resampler_quality: u8,
    /// Gain applied to the ducked stream while two streams mix.
    pub ducking_ratio: f32,
    /// How long a speech event wait may block, in milliseconds.
    pub process_timeout_ms: u64,
    /// Volume level used when no output card reports one.
    pub default_volume: u8,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            device_dir: PathBuf::from("/dev/audio"),
            metadata_path: PathBuf::from("/mnt/audio_metadata.json"),
            max_input_cards: 2,
            max_output_cards: 2,
            max_devices_per_card: 3,
            retry_count: 2,
            period_size: 1024,
            period_count: 4,
            resampler_quality: Quality::DEFAULT.level(),
            ducking_ratio: 0.3,
            process_timeout_ms: 150,
            default_volume: 9,
        }
    }
}

impl ManagerConfig {
    /// Read a JSON config; absent keys keep their defaults.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("reading audio config {}", path.display()))?;
        let mut config: ManagerConfig = serde_json::from_str(&contents)
            .with_context(|| format!("parsing audio config {}", path.display()))?;
        config.sanitize();
        Ok(config)
    }

    /// `<config dir>/Cadenza/audio.json`, if the platform has a config dir.
    pub fn default_location() -> Option<PathBuf> {
        let mut base = dirs::config_dir()?;
        base.push("Cadenza");
        base.push("audio.json");
        Some(base)
    }

    /// Load from [`ManagerConfig::default_location`], falling back to
    /// defaults when the file is missing or broken.
    pub fn load_or_default() -> Self {
        let Some(path) = Self::default_location() else {
            return Self::default();
        };
        if !path.exists() {
            return Self::default();
        }
        match Self::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::warn!(?err, "using default audio config");
                Self::default()
            }
        }
    }

    pub fn quality(&self) -> Quality {
        Quality::new(self.resampler_quality)
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_millis(self.process_timeout_ms)
    }

    fn sanitize(&mut self) {
        self.period_size = self.period_size.max(1);
        self.period_count = self.period_count.max(1);
        self.max_devices_per_card = self.max_devices_per_card.max(1);
        self.ducking_ratio = if self.ducking_ratio.is_finite() {
            self.ducking_ratio.clamp(0.0, 1.0)
        } else {
            Self::default().ducking_ratio
        };
        self.default_volume = self.default_volume.min(MAX_VOLUME_LEVEL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_files_keep_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.json");
        fs::write(&path, r#"{ "retry_count": 5, "ducking_ratio": 4.0 }"#).unwrap();
        let config = ManagerConfig::load(&path).unwrap();
        assert_eq!(config.retry_count, 5);
        assert_eq!(config.ducking_ratio, 1.0);
        assert_eq!(config.period_size, 1024);
        assert_eq!(config.device_dir, PathBuf::from("/dev/audio"));
    }

    #[test]
    fn broken_files_report_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audio.json");
        fs::write(&path, "{ not json").unwrap();
        let err = ManagerConfig::load(&path).unwrap_err();
        assert!(format!("{err:#}").contains("audio.json"));
    }

    #[test]
    fn defaults_survive_serialisation() {
        let config = ManagerConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: ManagerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
        assert_eq!(config.process_timeout(), Duration::from_millis(150));
    }
}
