//! Engine configuration, stored as JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::dsp::renderer::DEFAULT_BLOCK_SIZE;
use crate::dsp::wav::ChannelLayout;
use crate::error::{Result, ToneError};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ToneConfig {
    /// Asset rendered into the harmony clip.
    pub asset_path: String,
    /// Initial pitch offset for both the harmony render and the live graph.
    pub pitch_offset: f32,
    /// Render quantum in frames.
    pub block_size: usize,
    /// Pitch shifter window length (10-100 ms).
    pub window_ms: f32,
    /// Channel order written to the WAV data chunk.
    pub wav_layout: ChannelLayout,
    pub live_channels: usize,
    pub live_sample_rate: u32,
    /// Keep fetched assets in the per-user cache directory.
    pub cache_assets: bool,
}

impl Default for ToneConfig {
    fn default() -> Self {
        ToneConfig {
            asset_path: "/audio/anthem.mp3".to_string(),
            pitch_offset: 0.0,
            block_size: DEFAULT_BLOCK_SIZE,
            window_ms: 50.0,
            wav_layout: ChannelLayout::Planar,
            live_channels: 1,
            live_sample_rate: 48000,
            cache_assets: true,
        }
    }
}

impl ToneConfig {
    pub fn from_json(json: &str) -> Result<Self> {
        let config: ToneConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| ToneError::Config(format!("{}: {e}", path.display())))?;
        let config = Self::from_json(&json)?;
        log::debug!("loaded config from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Per-user config file location.
    #[cfg(feature = "assets")]
    pub fn default_path() -> Option<std::path::PathBuf> {
        directories::ProjectDirs::from("net", "tonedeaf", "tonedeaf")
            .map(|dirs| dirs.config_dir().join("config.json"))
    }

    /// Load from [`ToneConfig::default_path`], falling back to defaults when
    /// the file does not exist yet.
    #[cfg(feature = "assets")]
    pub fn load_or_default() -> Result<Self> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 {
            return Err(ToneError::Config("blockSize must be positive".into()));
        }
        if self.live_channels == 0 {
            return Err(ToneError::Config("liveChannels must be positive".into()));
        }
        if self.live_sample_rate == 0 {
            return Err(ToneError::Config("liveSampleRate must be positive".into()));
        }
        if !self.pitch_offset.is_finite() {
            return Err(ToneError::Config("pitchOffset must be finite".into()));
        }
        Ok(())
    }

    /// Window length actually used by the shifter.
    pub fn effective_window_ms(&self) -> f32 {
        self.window_ms.clamp(10.0, 100.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = ToneConfig::default();
        assert_eq!(config.block_size, 128);
        assert_eq!(config.wav_layout, ChannelLayout::Planar);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = ToneConfig::from_json(r#"{ "pitchOffset": 0.5, "wavLayout": "interleaved" }"#).unwrap();
        assert_eq!(config.pitch_offset, 0.5);
        assert_eq!(config.wav_layout, ChannelLayout::Interleaved);
        assert_eq!(config.asset_path, "/audio/anthem.mp3");
        assert_eq!(config.live_sample_rate, 48000);
    }

    #[test]
    fn rejects_zero_block_size() {
        let err = ToneConfig::from_json(r#"{ "blockSize": 0 }"#).unwrap_err();
        assert!(matches!(err, ToneError::Config(_)));
    }

    #[test]
    fn rejects_unknown_layout() {
        assert!(ToneConfig::from_json(r#"{ "wavLayout": "diagonal" }"#).is_err());
    }

    #[test]
    fn window_is_clamped() {
        let config = ToneConfig {
            window_ms: 500.0,
            ..ToneConfig::default()
        };
        assert_eq!(config.effective_window_ms(), 100.0);
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sub/config.json");
        let config = ToneConfig {
            pitch_offset: -0.25,
            live_channels: 2,
            ..ToneConfig::default()
        };
        config.save(&path).unwrap();
        assert_eq!(ToneConfig::load(&path).unwrap(), config);
    }

    #[test]
    fn missing_file_is_config_error() {
        let err = ToneConfig::load("/definitely/not/here.json").unwrap_err();
        assert!(matches!(err, ToneError::Config(_)));
    }
}
