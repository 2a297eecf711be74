// SPDX-License-Identifier: GPL-3.0-only

//! AAC codec profile and AudioSpecificConfig handling
//!
//! The AudioSpecificConfig is the MPEG-4 decoder configuration record that
//! Matroska stores as CodecPrivate. It is built here from the negotiated
//! format rather than taken from the encoder, so every native backend
//! produces the same header for the same stream.

use super::audio::AudioCodecProfile;
use super::native::CodecParams;
use crate::constants::audio::{AAC_SAMPLE_RATE_INDEX, AAC_SAMPLE_RATES};
use crate::media::caps::{AudioCaps, AudioCodecId, SampleFormat};
use crate::media::options::{MenuOption, PropertyOption};

/// MPEG-4 audio object type for AAC-LC
pub const AAC_OBJECT_TYPE_LOW: u8 = 2;

/// Sample rate index meaning "explicit 24-bit rate follows"
pub const EXPLICIT_RATE_INDEX: u8 = 15;

/// Size the serialized config is padded to
pub const AUDIO_SPECIFIC_CONFIG_SIZE: usize = 32;

/// Table entry closest to `rate`
///
/// Ties go to the entry that comes first in the table.
pub fn nearest_sample_rate_in(table: &[u32], rate: u32) -> u32 {
    let mut nearest = table.first().copied().unwrap_or(rate);
    let mut min_diff = u32::MAX;

    for &candidate in table {
        let diff = candidate.abs_diff(rate);

        if diff < min_diff {
            nearest = candidate;
            min_diff = diff;
        }
    }

    nearest
}

/// AAC encoder rate closest to `rate`
pub fn nearest_sample_rate(rate: u32) -> u32 {
    nearest_sample_rate_in(AAC_SAMPLE_RATES, rate)
}

/// MPEG-4 sampling frequency index, or 15 for rates outside the table
pub fn sample_rate_index(rate: u32) -> u8 {
    AAC_SAMPLE_RATE_INDEX
        .iter()
        .position(|&r| r == rate)
        .map(|i| i as u8)
        .unwrap_or(EXPLICIT_RATE_INDEX)
}

/// MSB-first bit writer
#[derive(Debug, Default)]
struct BitWriter {
    bytes: Vec<u8>,
    bits: usize,
}

impl BitWriter {
    fn put(&mut self, count: usize, value: u32) {
        for i in (0..count).rev() {
            if self.bits % 8 == 0 {
                self.bytes.push(0);
            }

            if (value >> i) & 1 == 1 {
                let last = self.bytes.len() - 1;
                self.bytes[last] |= 0x80 >> (self.bits % 8);
            }

            self.bits += 1;
        }
    }

    fn into_bytes(mut self, size: usize) -> Vec<u8> {
        self.bytes.resize(size.max(self.bytes.len()), 0);
        self.bytes
    }
}

/// MSB-first bit reader
struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn get(&mut self, count: usize) -> Option<u32> {
        let mut value = 0u32;

        for _ in 0..count {
            let byte = *self.data.get(self.pos / 8)?;
            let bit = (byte >> (7 - self.pos % 8)) & 1;
            value = (value << 1) | u32::from(bit);
            self.pos += 1;
        }

        Some(value)
    }
}

/// The fields of an AudioSpecificConfig this crate writes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioSpecificConfig {
    pub object_type: u8,
    pub sample_rate_index: u8,
    /// Set only when the index is 15
    pub explicit_rate: Option<u32>,
    pub channels: u8,
}

impl AudioSpecificConfig {
    /// AAC-LC config for a stream
    pub fn new(rate: u32, channels: u32) -> Self {
        let sample_rate_index = sample_rate_index(rate);

        Self {
            object_type: AAC_OBJECT_TYPE_LOW,
            sample_rate_index,
            explicit_rate: (sample_rate_index == EXPLICIT_RATE_INDEX).then_some(rate),
            channels: channels.min(15) as u8,
        }
    }

    /// Sample rate in Hz
    pub fn rate(&self) -> u32 {
        match self.explicit_rate {
            Some(rate) => rate,
            None => AAC_SAMPLE_RATE_INDEX
                .get(usize::from(self.sample_rate_index))
                .copied()
                .unwrap_or(0),
        }
    }

    /// Serialize with a plain GASpecificConfig and explicit SBR-off signalling
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut bits = BitWriter::default();
        bits.put(5, u32::from(self.object_type));
        bits.put(4, u32::from(self.sample_rate_index));

        if self.sample_rate_index == EXPLICIT_RATE_INDEX {
            bits.put(24, self.explicit_rate.unwrap_or(0));
        }

        bits.put(4, u32::from(self.channels));

        // GASpecificConfig: 1024-sample frames, no core coder, no extension
        bits.put(1, 0);
        bits.put(1, 0);
        bits.put(1, 0);

        // Sync extension: SBR disabled
        bits.put(11, 0x2b7);
        bits.put(5, 5);
        bits.put(1, 0);

        bits.into_bytes(AUDIO_SPECIFIC_CONFIG_SIZE)
    }

    /// Read the leading fields back from a serialized config
    pub fn parse(data: &[u8]) -> Option<Self> {
        let mut bits = BitReader::new(data);
        let object_type = bits.get(5)? as u8;
        let sample_rate_index = bits.get(4)? as u8;
        let explicit_rate = if sample_rate_index == EXPLICIT_RATE_INDEX {
            Some(bits.get(24)?)
        } else {
            None
        };
        let channels = bits.get(4)? as u8;

        Some(Self {
            object_type,
            sample_rate_index,
            explicit_rate,
            channels,
        })
    }
}

/// AAC through faac-compatible encoders
pub struct AacCodec;

impl AudioCodecProfile for AacCodec {
    const ELEMENT_NAME: &'static str = "AudioEncoderFaac";

    fn codecs() -> &'static [&'static str] {
        &["faac"]
    }

    fn codec_id(codec: &str) -> AudioCodecId {
        if codec == "faac" {
            AudioCodecId::Aac
        } else {
            AudioCodecId::Unknown
        }
    }

    fn codec_description(codec: &str) -> &'static str {
        if codec == "faac" { "AAC (faac)" } else { "" }
    }

    fn options() -> Vec<PropertyOption> {
        vec![
            PropertyOption::number_menu(
                "mpegVersion",
                "MPEG version",
                0.0,
                vec![
                    MenuOption::new("mpeg4", "MPEG-4", 0.0),
                    MenuOption::new("mpeg2", "MPEG-2", 1.0),
                ],
            ),
            PropertyOption::number_menu(
                "outputFormat",
                "Output format",
                0.0,
                vec![
                    MenuOption::new("raw", "Raw", 0.0),
                    MenuOption::new("adts", "ADTS", 1.0),
                ],
            ),
        ]
    }

    fn negotiate(input: &AudioCaps) -> AudioCaps {
        let format = if input.format == SampleFormat::S16 || input.format == SampleFormat::S32 {
            input.format
        } else {
            SampleFormat::S16
        };
        let channels = input.channels().clamp(1, 2);

        AudioCaps::interleaved(format, channels, nearest_sample_rate(input.rate))
    }

    fn headers(caps: &AudioCaps, _params: &CodecParams) -> Vec<u8> {
        AudioSpecificConfig::new(caps.rate, caps.channels()).to_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nearest_sample_rate() {
        assert_eq!(nearest_sample_rate(44100), 44100);
        assert_eq!(nearest_sample_rate(45000), 44100);
        assert_eq!(nearest_sample_rate(1), 8000);
        assert_eq!(nearest_sample_rate(200_000), 96000);
        // Equidistant from both entries
        assert_eq!(nearest_sample_rate_in(&[8000, 12000], 10000), 8000);
    }

    #[test]
    fn test_sample_rate_index() {
        assert_eq!(sample_rate_index(96000), 0);
        assert_eq!(sample_rate_index(44100), 4);
        assert_eq!(sample_rate_index(7350), 12);
        assert_eq!(sample_rate_index(50000), 15);
    }

    #[test]
    fn test_config_bits_for_cd_audio() {
        let bytes = AudioSpecificConfig::new(44100, 2).to_bytes();

        assert_eq!(bytes.len(), AUDIO_SPECIFIC_CONFIG_SIZE);
        // 00010 0100 0010 000 -> 0x12 0x10
        assert_eq!(&bytes[..2], &[0x12, 0x10]);
        // 0x2b7 sync extension, then object type 5 and SBR off
        assert_eq!(&bytes[2..5], &[0x56, 0xe5, 0x00]);
        assert!(bytes[5..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_parse_recovers_fields() {
        let config = AudioSpecificConfig::parse(&AudioSpecificConfig::new(44100, 2).to_bytes())
            .unwrap();

        assert_eq!(config.object_type, 2);
        assert_eq!(config.sample_rate_index, 4);
        assert_eq!(config.channels, 2);
        assert_eq!(config.rate(), 44100);
    }

    #[test]
    fn test_explicit_rate() {
        let config = AudioSpecificConfig::new(50000, 1);
        assert_eq!(config.explicit_rate, Some(50000));

        let parsed = AudioSpecificConfig::parse(&config.to_bytes()).unwrap();
        assert_eq!(parsed.sample_rate_index, EXPLICIT_RATE_INDEX);
        assert_eq!(parsed.rate(), 50000);
        assert_eq!(parsed.channels, 1);
    }

    #[test]
    fn test_negotiation() {
        let input = AudioCaps::interleaved(SampleFormat::F32, 6, 45000);
        let output = AacCodec::negotiate(&input);

        assert_eq!(output.format, SampleFormat::S16);
        assert_eq!(output.channels(), 2);
        assert_eq!(output.rate, 44100);
        assert!(!output.planar);

        let input = AudioCaps::interleaved(SampleFormat::S32, 1, 48000);
        assert_eq!(AacCodec::negotiate(&input).format, SampleFormat::S32);
    }
}
