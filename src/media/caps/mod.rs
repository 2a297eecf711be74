// SPDX-License-Identifier: GPL-3.0-only

//! Media format descriptions
//!
//! A [`Caps`] value says what a packet or stream contains. Every caps type
//! has a validity rule; invalid values all compare equal to the default and
//! are treated as "no format" by elements.

pub mod audio;
pub mod compressed;
pub mod video;

pub use audio::{AudioCaps, ChannelLayout, SampleFormat};
pub use compressed::{AudioCodecId, CompressedAudioCaps, CompressedVideoCaps, VideoCodecId};
pub use video::{ChromaSampling, PixelFormat, VideoCaps};

use std::fmt;

/// Broad stream category, used to key per-stream muxer settings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CapsType {
    #[default]
    Unknown,
    Audio,
    Video,
}

impl fmt::Display for CapsType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CapsType::Unknown => write!(f, "unknown"),
            CapsType::Audio => write!(f, "audio"),
            CapsType::Video => write!(f, "video"),
        }
    }
}

/// Any media format
#[derive(Debug, Clone, Copy, Default, Eq, Hash)]
pub enum Caps {
    #[default]
    Unknown,
    RawAudio(AudioCaps),
    RawVideo(VideoCaps),
    CompressedAudio(CompressedAudioCaps),
    CompressedVideo(CompressedVideoCaps),
}

impl Caps {
    pub fn is_valid(&self) -> bool {
        match self {
            Caps::Unknown => false,
            Caps::RawAudio(caps) => caps.is_valid(),
            Caps::RawVideo(caps) => caps.is_valid(),
            Caps::CompressedAudio(caps) => caps.is_valid(),
            Caps::CompressedVideo(caps) => caps.is_valid(),
        }
    }

    pub fn caps_type(&self) -> CapsType {
        match self {
            Caps::Unknown => CapsType::Unknown,
            Caps::RawAudio(_) | Caps::CompressedAudio(_) => CapsType::Audio,
            Caps::RawVideo(_) | Caps::CompressedVideo(_) => CapsType::Video,
        }
    }

    pub fn is_compressed(&self) -> bool {
        matches!(self, Caps::CompressedAudio(_) | Caps::CompressedVideo(_))
    }

    pub fn as_audio(&self) -> Option<&AudioCaps> {
        match self {
            Caps::RawAudio(caps) => Some(caps),
            _ => None,
        }
    }

    pub fn as_video(&self) -> Option<&VideoCaps> {
        match self {
            Caps::RawVideo(caps) => Some(caps),
            _ => None,
        }
    }

    pub fn as_compressed_audio(&self) -> Option<&CompressedAudioCaps> {
        match self {
            Caps::CompressedAudio(caps) => Some(caps),
            _ => None,
        }
    }

    pub fn as_compressed_video(&self) -> Option<&CompressedVideoCaps> {
        match self {
            Caps::CompressedVideo(caps) => Some(caps),
            _ => None,
        }
    }
}

impl PartialEq for Caps {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => true,
            (true, true) => match (self, other) {
                (Caps::RawAudio(a), Caps::RawAudio(b)) => a == b,
                (Caps::RawVideo(a), Caps::RawVideo(b)) => a == b,
                (Caps::CompressedAudio(a), Caps::CompressedAudio(b)) => a == b,
                (Caps::CompressedVideo(a), Caps::CompressedVideo(b)) => a == b,
                _ => false,
            },
            _ => false,
        }
    }
}

impl From<AudioCaps> for Caps {
    fn from(caps: AudioCaps) -> Self {
        Caps::RawAudio(caps)
    }
}

impl From<VideoCaps> for Caps {
    fn from(caps: VideoCaps) -> Self {
        Caps::RawVideo(caps)
    }
}

impl From<CompressedAudioCaps> for Caps {
    fn from(caps: CompressedAudioCaps) -> Self {
        Caps::CompressedAudio(caps)
    }
}

impl From<CompressedVideoCaps> for Caps {
    fn from(caps: CompressedVideoCaps) -> Self {
        Caps::CompressedVideo(caps)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Caps::Unknown => write!(f, "unknown"),
            Caps::RawAudio(caps) => write!(f, "{}", caps),
            Caps::RawVideo(caps) => write!(f, "{}", caps),
            Caps::CompressedAudio(caps) => write!(f, "{}", caps),
            Caps::CompressedVideo(caps) => write!(f, "{}", caps),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::fraction::Fraction;

    #[test]
    fn test_invalid_variants_equal_unknown() {
        let bad_audio = Caps::RawAudio(AudioCaps::default());
        let bad_video = Caps::RawVideo(VideoCaps::default());
        assert_eq!(bad_audio, Caps::Unknown);
        assert_eq!(bad_audio, bad_video);
        assert!(!bad_audio.is_valid());
    }

    #[test]
    fn test_caps_type() {
        let video = Caps::from(VideoCaps::new(
            PixelFormat::Yuv420p,
            320,
            240,
            Fraction::from_int(30),
        ));
        assert_eq!(video.caps_type(), CapsType::Video);
        assert!(video.as_video().is_some());
        assert!(!video.is_compressed());
    }

    #[test]
    fn test_different_valid_variants_differ() {
        let raw = AudioCaps::interleaved(SampleFormat::S16, 1, 8000);
        let compressed = CompressedAudioCaps::new(AudioCodecId::Aac, raw, 64000);
        assert_ne!(Caps::from(raw), Caps::from(compressed));
    }
}
