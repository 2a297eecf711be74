// SPDX-License-Identifier: GPL-3.0-only

//! Codec identities and compressed stream caps

use super::audio::AudioCaps;
use super::video::VideoCaps;
use std::fmt;

/// Pack four bytes big-endian, e.g. `fourcc(b"OPUS")`
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    (code[0] as u32) << 24 | (code[1] as u32) << 16 | (code[2] as u32) << 8 | code[3] as u32
}

/// Audio codecs, valued by FourCC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum AudioCodecId {
    #[default]
    Unknown = 0,
    Aac = fourcc(b"AAC\0"),
    Ac3 = fourcc(b"AC3\0"),
    /// AMR narrow band
    AmrNb = fourcc(b"AMRN"),
    Flac = fourcc(b"FLAC"),
    /// MPEG-1 layer I
    Mpeg1 = fourcc(b"MP1\0"),
    /// MPEG-1 layer II
    Mpeg2 = fourcc(b"MP2\0"),
    Mp3 = fourcc(b"MP3\0"),
    Opus = fourcc(b"OPUS"),
    Speex = fourcc(b"SPEX"),
    Vorbis = fourcc(b"VORB"),
}

impl AudioCodecId {
    const ALL: [Self; 10] = [
        Self::Aac,
        Self::Ac3,
        Self::AmrNb,
        Self::Flac,
        Self::Mpeg1,
        Self::Mpeg2,
        Self::Mp3,
        Self::Opus,
        Self::Speex,
        Self::Vorbis,
    ];

    pub fn fourcc(&self) -> u32 {
        *self as u32
    }

    pub fn from_fourcc(value: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|codec| codec.fourcc() == value)
            .unwrap_or(Self::Unknown)
    }

    /// Parse a lowercase codec name as used in config files
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "aac" => Self::Aac,
            "ac3" => Self::Ac3,
            "amrnb" => Self::AmrNb,
            "flac" => Self::Flac,
            "mpeg1" | "mp1" => Self::Mpeg1,
            "mpeg2" | "mp2" => Self::Mpeg2,
            "mp3" => Self::Mp3,
            "opus" => Self::Opus,
            "speex" => Self::Speex,
            "vorbis" => Self::Vorbis,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for AudioCodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Aac => "aac",
            Self::Ac3 => "ac3",
            Self::AmrNb => "amrnb",
            Self::Flac => "flac",
            Self::Mpeg1 => "mpeg1",
            Self::Mpeg2 => "mpeg2",
            Self::Mp3 => "mp3",
            Self::Opus => "opus",
            Self::Speex => "speex",
            Self::Vorbis => "vorbis",
        };
        write!(f, "{}", name)
    }
}

/// Video codecs, valued by FourCC
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum VideoCodecId {
    #[default]
    Unknown = 0,
    Av1 = fourcc(b"AV1\0"),
    /// H.264/AVC
    H264 = fourcc(b"AVC\0"),
    /// H.265/HEVC
    Hevc = fourcc(b"HEVC"),
    Jpeg = fourcc(b"JPG\0"),
    /// Motion JPEG
    Mjpeg = fourcc(b"MJPG"),
    Mpeg1 = fourcc(b"MPG1"),
    Mpeg2 = fourcc(b"MPG2"),
    Mpeg4 = fourcc(b"MPG4"),
    Theora = fourcc(b"THEO"),
    Vp8 = fourcc(b"VP8\0"),
    Vp9 = fourcc(b"VP9\0"),
}

impl VideoCodecId {
    const ALL: [Self; 11] = [
        Self::Av1,
        Self::H264,
        Self::Hevc,
        Self::Jpeg,
        Self::Mjpeg,
        Self::Mpeg1,
        Self::Mpeg2,
        Self::Mpeg4,
        Self::Theora,
        Self::Vp8,
        Self::Vp9,
    ];

    pub fn fourcc(&self) -> u32 {
        *self as u32
    }

    pub fn from_fourcc(value: u32) -> Self {
        Self::ALL
            .into_iter()
            .find(|codec| codec.fourcc() == value)
            .unwrap_or(Self::Unknown)
    }

    /// Parse a lowercase codec name as used in config files
    pub fn from_name(name: &str) -> Self {
        match name.to_lowercase().as_str() {
            "av1" => Self::Av1,
            "h264" | "avc" => Self::H264,
            "hevc" | "h265" => Self::Hevc,
            "jpeg" => Self::Jpeg,
            "mjpeg" | "mjpg" => Self::Mjpeg,
            "mpeg1" => Self::Mpeg1,
            "mpeg2" => Self::Mpeg2,
            "mpeg4" => Self::Mpeg4,
            "theora" => Self::Theora,
            "vp8" => Self::Vp8,
            "vp9" => Self::Vp9,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for VideoCodecId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Av1 => "av1",
            Self::H264 => "h264",
            Self::Hevc => "hevc",
            Self::Jpeg => "jpeg",
            Self::Mjpeg => "mjpeg",
            Self::Mpeg1 => "mpeg1",
            Self::Mpeg2 => "mpeg2",
            Self::Mpeg4 => "mpeg4",
            Self::Theora => "theora",
            Self::Vp8 => "vp8",
            Self::Vp9 => "vp9",
        };
        write!(f, "{}", name)
    }
}

/// Encoded audio stream description
#[derive(Debug, Clone, Copy, Default, Eq, Hash)]
pub struct CompressedAudioCaps {
    pub codec: AudioCodecId,
    /// Format the encoder consumes
    pub raw: AudioCaps,
    pub bitrate: u32,
}

impl CompressedAudioCaps {
    pub fn new(codec: AudioCodecId, raw: AudioCaps, bitrate: u32) -> Self {
        Self {
            codec,
            raw,
            bitrate,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.codec != AudioCodecId::Unknown && self.raw.is_valid()
    }
}

impl PartialEq for CompressedAudioCaps {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => true,
            (true, true) => {
                self.codec == other.codec && self.raw == other.raw && self.bitrate == other.bitrate
            }
            _ => false,
        }
    }
}

impl fmt::Display for CompressedAudioCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} bps)", self.codec, self.raw, self.bitrate)
    }
}

/// Encoded video stream description
#[derive(Debug, Clone, Copy, Default, Eq, Hash)]
pub struct CompressedVideoCaps {
    pub codec: VideoCodecId,
    /// Format the encoder consumes
    pub raw: VideoCaps,
    pub bitrate: u32,
}

impl CompressedVideoCaps {
    pub fn new(codec: VideoCodecId, raw: VideoCaps, bitrate: u32) -> Self {
        Self {
            codec,
            raw,
            bitrate,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.codec != VideoCodecId::Unknown && self.raw.is_valid()
    }
}

impl PartialEq for CompressedVideoCaps {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => true,
            (true, true) => {
                self.codec == other.codec && self.raw == other.raw && self.bitrate == other.bitrate
            }
            _ => false,
        }
    }
}

impl fmt::Display for CompressedVideoCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {} bps)", self.codec, self.raw, self.bitrate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::caps::audio::SampleFormat;

    #[test]
    fn test_fourcc_packing() {
        assert_eq!(fourcc(b"OPUS"), 0x4f50_5553);
        assert_eq!(AudioCodecId::Aac.fourcc(), 0x4141_4300);
        assert_eq!(VideoCodecId::Vp8.fourcc(), 0x5650_3800);
    }

    #[test]
    fn test_from_fourcc() {
        assert_eq!(AudioCodecId::from_fourcc(fourcc(b"VORB")), AudioCodecId::Vorbis);
        assert_eq!(VideoCodecId::from_fourcc(fourcc(b"AV1\0")), VideoCodecId::Av1);
        assert_eq!(VideoCodecId::from_fourcc(0xdead_beef), VideoCodecId::Unknown);
        assert_eq!(AudioCodecId::from_fourcc(0), AudioCodecId::Unknown);
    }

    #[test]
    fn test_compressed_validity() {
        let raw = AudioCaps::interleaved(SampleFormat::S16, 2, 48000);
        assert!(CompressedAudioCaps::new(AudioCodecId::Opus, raw, 0).is_valid());
        assert!(!CompressedAudioCaps::new(AudioCodecId::Unknown, raw, 0).is_valid());
        assert_eq!(
            CompressedAudioCaps::new(AudioCodecId::Opus, AudioCaps::default(), 128000),
            CompressedAudioCaps::default()
        );
    }
}
