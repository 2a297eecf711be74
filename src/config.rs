// SPDX-License-Identifier: GPL-3.0-only

//! User configuration
//!
//! Stored as JSON in `{config_dir}/camera-pipeline/config.json`. Fields
//! missing from the file take their default values.

use crate::constants::{BitratePreset, app_info, defaults};
use crate::errors::{PipelineError, PipelineResult};
use crate::media::options::OptionValue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Configuration file name inside the application directory
pub const CONFIG_FILE: &str = "config.json";

/// Bitrates above this are rejected
const MAX_BITRATE: u32 = 100_000_000;

/// Key frame intervals above this are rejected, in milliseconds
const MAX_GOP_MS: u32 = 60_000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where recordings are written
    pub video_directory: PathBuf,
    /// Container format, by file extension
    pub video_format: String,
    pub video_codec: String,
    pub audio_codec: String,
    /// Video bitrate in bits per second
    pub video_bitrate: u32,
    /// Audio bitrate in bits per second
    pub audio_bitrate: u32,
    /// Key frame interval in milliseconds
    pub video_gop: u32,
    pub record_audio: bool,
    /// Capture device, empty for the default input
    pub audio_device: String,
    pub muxer_options: BTreeMap<String, OptionValue>,
    pub video_codec_options: BTreeMap<String, OptionValue>,
    pub audio_codec_options: BTreeMap<String, OptionValue>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            video_directory: default_video_directory(),
            video_format: "webm".to_string(),
            video_codec: "av1".to_string(),
            audio_codec: "opus".to_string(),
            video_bitrate: defaults::VIDEO_BITRATE,
            audio_bitrate: defaults::AUDIO_BITRATE,
            video_gop: defaults::GOP_MS,
            record_audio: true,
            audio_device: String::new(),
            muxer_options: BTreeMap::new(),
            video_codec_options: BTreeMap::new(),
            audio_codec_options: BTreeMap::new(),
        }
    }
}

/// `{videos}/Camera`, falling back to the home directory
pub fn default_video_directory() -> PathBuf {
    dirs::video_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_default()
        .join("Camera")
}

/// Default location of the configuration file
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(app_info::APP_NAME).join(CONFIG_FILE))
}

impl Config {
    /// Load from the default location
    pub fn load() -> PipelineResult<Self> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => {
                debug!("No configuration directory, using defaults");
                Ok(Self::default())
            }
        }
    }

    /// Load from `path`; a missing file gives the defaults
    pub fn load_from(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let text = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text).map_err(|e| {
            PipelineError::Config(format!("{}: {}", path.display(), e))
        })?;

        config.validate()?;
        debug!(path = %path.display(), "Configuration loaded");

        Ok(config)
    }

    /// Save to the default location
    pub fn save(&self) -> PipelineResult<()> {
        let path = config_path()
            .ok_or_else(|| PipelineError::Config("No configuration directory".to_string()))?;

        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> PipelineResult<()> {
        self.validate()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let text = serde_json::to_string_pretty(self)?;
        fs::write(path, text)?;
        info!(path = %path.display(), "Configuration saved");

        Ok(())
    }

    /// Reject values no encoder or muxer accepts
    pub fn validate(&self) -> PipelineResult<()> {
        let invalid = |msg: String| Err(PipelineError::Config(msg));

        if self.video_format.is_empty() {
            return invalid("video format is empty".to_string());
        }

        if self.video_codec.is_empty() {
            return invalid("video codec is empty".to_string());
        }

        if self.record_audio && self.audio_codec.is_empty() {
            return invalid("audio codec is empty".to_string());
        }

        if self.video_bitrate == 0 || self.video_bitrate > MAX_BITRATE {
            return invalid(format!("video bitrate {} out of range", self.video_bitrate));
        }

        if self.audio_bitrate == 0 || self.audio_bitrate > MAX_BITRATE {
            return invalid(format!("audio bitrate {} out of range", self.audio_bitrate));
        }

        if self.video_gop == 0 || self.video_gop > MAX_GOP_MS {
            return invalid(format!("gop {} ms out of range", self.video_gop));
        }

        Ok(())
    }

    /// Replace both bitrates with a preset for frames `width` pixels wide
    pub fn apply_preset(&mut self, preset: BitratePreset, width: u32) {
        self.video_bitrate = preset.video_bitrate(width);
        self.audio_bitrate = preset.audio_bitrate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.video_format, "webm");
        assert!(config.video_directory.ends_with("Camera"));
    }

    #[test]
    fn test_validate_ranges() {
        let mut config = Config::default();
        config.video_bitrate = 0;
        assert!(matches!(config.validate(), Err(PipelineError::Config(_))));

        let mut config = Config::default();
        config.video_gop = MAX_GOP_MS + 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.record_audio = false;
        config.audio_codec.clear();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_apply_preset() {
        let mut config = Config::default();
        config.apply_preset(BitratePreset::High, 1920);
        assert_eq!(config.video_bitrate, 8 * defaults::VIDEO_BITRATE);
        assert_eq!(config.audio_bitrate, 192_000);
    }
}
