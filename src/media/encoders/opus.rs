// SPDX-License-Identifier: GPL-3.0-only

//! Opus codec profile and `OpusHead`

use super::aac::nearest_sample_rate_in;
use super::audio::AudioCodecProfile;
use super::native::CodecParams;
use crate::constants::audio::{OPUS_PRE_SKIP, OPUS_SAMPLE_RATES};
use crate::media::caps::{AudioCaps, AudioCodecId, SampleFormat};
use crate::media::options::{MenuOption, PropertyOption};

/// Opus identification header, stored as Matroska CodecPrivate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpusHead {
    pub channels: u8,
    pub pre_skip: u16,
    pub input_rate: u32,
}

impl OpusHead {
    pub const MAGIC: &'static [u8; 8] = b"OpusHead";
    pub const SIZE: usize = 19;

    pub fn new(channels: u32, input_rate: u32) -> Self {
        Self {
            channels: channels.min(255) as u8,
            pre_skip: OPUS_PRE_SKIP,
            input_rate,
        }
    }

    /// Version 1, zero output gain, mapping family 0
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = Vec::with_capacity(Self::SIZE);
        head.extend_from_slice(Self::MAGIC);
        head.push(1);
        head.push(self.channels);
        head.extend_from_slice(&self.pre_skip.to_le_bytes());
        head.extend_from_slice(&self.input_rate.to_le_bytes());
        head.extend_from_slice(&0i16.to_le_bytes());
        head.push(0);
        head
    }

    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::SIZE || &data[..8] != Self::MAGIC {
            return None;
        }

        Some(Self {
            channels: data[9],
            pre_skip: u16::from_le_bytes([data[10], data[11]]),
            input_rate: u32::from_le_bytes([data[12], data[13], data[14], data[15]]),
        })
    }
}

/// Opus through libopus-based encoders
pub struct OpusCodec;

impl AudioCodecProfile for OpusCodec {
    const ELEMENT_NAME: &'static str = "AudioEncoderOpus";

    fn codecs() -> &'static [&'static str] {
        &["opus"]
    }

    fn codec_id(codec: &str) -> AudioCodecId {
        if codec == "opus" {
            AudioCodecId::Opus
        } else {
            AudioCodecId::Unknown
        }
    }

    fn codec_description(codec: &str) -> &'static str {
        if codec == "opus" { "Opus" } else { "" }
    }

    fn options() -> Vec<PropertyOption> {
        vec![
            PropertyOption::string_menu(
                "application",
                "Application",
                "audio",
                vec![
                    MenuOption::new("voip", "VoIP", "voip"),
                    MenuOption::new("audio", "Audio", "audio"),
                    MenuOption::new("lowdelay", "Low delay", "lowdelay"),
                ],
            ),
            PropertyOption::number_menu(
                "frameDuration",
                "Frame duration (ms)",
                20.0,
                [
                    ("2.5", 2.5),
                    ("5", 5.0),
                    ("10", 10.0),
                    ("20", 20.0),
                    ("40", 40.0),
                    ("60", 60.0),
                ]
                .into_iter()
                .map(|(name, ms)| MenuOption::new(name, name, ms))
                .collect(),
            )
            .with_help("Longer frames compress better at the cost of latency"),
        ]
    }

    fn negotiate(input: &AudioCaps) -> AudioCaps {
        let channels = input.channels().clamp(1, 2);
        let rate = nearest_sample_rate_in(OPUS_SAMPLE_RATES, input.rate);

        AudioCaps::interleaved(SampleFormat::S16, channels, rate)
    }

    fn headers(caps: &AudioCaps, _params: &CodecParams) -> Vec<u8> {
        OpusHead::new(caps.channels(), caps.rate).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_layout() {
        let head = OpusHead::new(2, 48000).to_bytes();

        assert_eq!(head.len(), OpusHead::SIZE);
        assert_eq!(&head[..8], b"OpusHead");
        assert_eq!(head[8], 1);
        assert_eq!(head[9], 2);
        assert_eq!(&head[10..12], &312u16.to_le_bytes());
        assert_eq!(&head[12..16], &48000u32.to_le_bytes());
        assert_eq!(&head[16..], &[0, 0, 0]);
    }

    #[test]
    fn test_head_parse() {
        let head = OpusHead::parse(&OpusHead::new(1, 16000).to_bytes()).unwrap();
        assert_eq!(head.channels, 1);
        assert_eq!(head.input_rate, 16000);
        assert!(OpusHead::parse(b"OpusTags").is_none());
    }

    #[test]
    fn test_negotiation() {
        let output = OpusCodec::negotiate(&AudioCaps::interleaved(SampleFormat::F32, 2, 44100));

        assert_eq!(output.format, SampleFormat::S16);
        assert_eq!(output.rate, 48000);
        assert_eq!(output.channels(), 2);
    }
}
