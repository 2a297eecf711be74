// SPDX-License-Identifier: GPL-3.0-only

//! Application-wide constants

use serde::{Deserialize, Serialize};

/// Encoder bitrate presets
///
/// The medium preset matches the encoder defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BitratePreset {
    /// Smaller files, reduced quality
    Low,
    /// Encoder defaults
    #[default]
    Medium,
    /// Larger files, better quality
    High,
}

impl BitratePreset {
    pub const ALL: [BitratePreset; 3] = [
        BitratePreset::Low,
        BitratePreset::Medium,
        BitratePreset::High,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            BitratePreset::Low => "Low",
            BitratePreset::Medium => "Medium",
            BitratePreset::High => "High",
        }
    }

    /// Audio bitrate in bits per second
    pub fn audio_bitrate(&self) -> u32 {
        match self {
            BitratePreset::Low => 64_000,
            BitratePreset::Medium => defaults::AUDIO_BITRATE,
            BitratePreset::High => 192_000,
        }
    }

    /// Video bitrate in bits per second for a frame width
    ///
    /// Medium gives the encoder default at SD and scales with resolution.
    pub fn video_bitrate(&self, width: u32) -> u32 {
        let base = match width {
            w if w >= 3840 => 8 * defaults::VIDEO_BITRATE,
            w if w >= 1920 => 4 * defaults::VIDEO_BITRATE,
            w if w >= 1280 => 2 * defaults::VIDEO_BITRATE,
            _ => defaults::VIDEO_BITRATE,
        };

        match self {
            BitratePreset::Low => base / 2,
            BitratePreset::Medium => base,
            BitratePreset::High => base * 2,
        }
    }
}

/// Format bitrate for display (e.g., "1.5 Mbps" or "128 kbps")
pub fn format_bitrate(bps: u32) -> String {
    if bps >= 1_000_000 {
        let mbps = bps as f64 / 1_000_000.0;
        if mbps == mbps.floor() {
            format!("{} Mbps", mbps as u32)
        } else {
            format!("{:.1} Mbps", mbps)
        }
    } else {
        format!("{} kbps", bps / 1000)
    }
}

/// Encoder defaults
pub mod defaults {
    /// Audio bitrate in bits per second
    pub const AUDIO_BITRATE: u32 = 128_000;

    /// Video bitrate in bits per second
    pub const VIDEO_BITRATE: u32 = 1_500_000;

    /// Key frame interval in milliseconds
    pub const GOP_MS: u32 = 1000;

    /// Frame rate used when the input does not declare one
    pub const FPS: i64 = 30;

    /// Matroska timecode scale in nanoseconds per tick
    pub const TIMECODE_SCALE: u64 = 100_000;
}

/// Blocking wait limits
pub mod timeouts {
    /// Device buffer read/write wait
    pub const DEVICE_WAIT_MS: u64 = 1000;

    /// Packet synchronizer idle wait
    pub const SYNC_WAIT_MS: u64 = 3000;

    /// How long a GStreamer pipeline may take to reach a state
    pub const STATE_CHANGE_SECS: u64 = 5;
}

/// Sample rate tables
pub mod audio {
    /// Rates the AAC encoder accepts, ascending
    pub const AAC_SAMPLE_RATES: &[u32] = &[
        8000, 11025, 12000, 16000, 22050, 24000, 32000, 44100, 48000, 64000, 88200, 96000,
    ];

    /// MPEG-4 sampling frequency index order
    pub const AAC_SAMPLE_RATE_INDEX: &[u32] = &[
        96000, 88200, 64000, 48000, 44100, 32000, 24000, 22050, 16000, 12000, 11025, 8000, 7350,
    ];

    /// Rates the Opus encoder accepts, ascending
    pub const OPUS_SAMPLE_RATES: &[u32] = &[8000, 12000, 16000, 24000, 48000];

    /// Opus decoder pre-skip in 48 kHz samples
    pub const OPUS_PRE_SKIP: u16 = 312;
}

/// File format constants
pub mod file_formats {
    /// Container extensions the recorder can write
    pub const VIDEO_EXTENSIONS: &[&str] = &["webm"];

    /// Check if an extension is a recordable container
    pub fn is_video_extension(ext: &str) -> bool {
        VIDEO_EXTENSIONS.contains(&ext.to_lowercase().as_str())
    }

    /// Prefix of recorded file names
    pub const RECORDING_PREFIX: &str = "Video";

    /// chrono format of the timestamp in recorded file names
    pub const RECORDING_TIMESTAMP: &str = "%Y-%m-%d %H-%M-%S";
}

/// Application information
pub mod app_info {
    /// Version string from git describe or the build environment
    pub fn version() -> &'static str {
        env!("GIT_VERSION")
    }

    pub const APP_NAME: &str = "camera-pipeline";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_medium_matches_defaults() {
        assert_eq!(BitratePreset::Medium.audio_bitrate(), defaults::AUDIO_BITRATE);
        assert_eq!(BitratePreset::Medium.video_bitrate(640), defaults::VIDEO_BITRATE);
        assert!(BitratePreset::High.video_bitrate(1920) > BitratePreset::Low.video_bitrate(1920));
    }

    #[test]
    fn test_format_bitrate() {
        assert_eq!(format_bitrate(1_500_000), "1.5 Mbps");
        assert_eq!(format_bitrate(2_000_000), "2 Mbps");
        assert_eq!(format_bitrate(128_000), "128 kbps");
    }

    #[test]
    fn test_video_extension() {
        assert!(file_formats::is_video_extension("WEBM"));
        assert!(!file_formats::is_video_extension("mp4"));
    }
}
