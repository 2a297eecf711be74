// SPDX-License-Identifier: GPL-3.0-only

//! Raw audio format description

use std::fmt;

/// PCM sample encodings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum SampleFormat {
    #[default]
    None,
    S8,
    U8,
    S16Le,
    S16Be,
    U16Le,
    U16Be,
    S32Le,
    S32Be,
    U32Le,
    U32Be,
    F32Le,
    F32Be,
    F64Le,
    F64Be,
}

impl SampleFormat {
    /// Native-endian 16-bit signed
    #[cfg(target_endian = "little")]
    pub const S16: Self = Self::S16Le;
    #[cfg(target_endian = "big")]
    pub const S16: Self = Self::S16Be;

    /// Native-endian 32-bit signed
    #[cfg(target_endian = "little")]
    pub const S32: Self = Self::S32Le;
    #[cfg(target_endian = "big")]
    pub const S32: Self = Self::S32Be;

    /// Native-endian 32-bit float
    #[cfg(target_endian = "little")]
    pub const F32: Self = Self::F32Le;
    #[cfg(target_endian = "big")]
    pub const F32: Self = Self::F32Be;

    pub fn bits(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::S8 | Self::U8 => 8,
            Self::S16Le | Self::S16Be | Self::U16Le | Self::U16Be => 16,
            Self::S32Le | Self::S32Be | Self::U32Le | Self::U32Be => 32,
            Self::F32Le | Self::F32Be => 32,
            Self::F64Le | Self::F64Be => 64,
        }
    }

    pub fn bytes(&self) -> usize {
        self.bits() as usize / 8
    }

    pub fn is_float(&self) -> bool {
        matches!(
            self,
            Self::F32Le | Self::F32Be | Self::F64Le | Self::F64Be
        )
    }

    /// GStreamer `format` field value
    pub fn gst_name(&self) -> Option<&'static str> {
        let name = match self {
            Self::None => return None,
            Self::S8 => "S8",
            Self::U8 => "U8",
            Self::S16Le => "S16LE",
            Self::S16Be => "S16BE",
            Self::U16Le => "U16LE",
            Self::U16Be => "U16BE",
            Self::S32Le => "S32LE",
            Self::S32Be => "S32BE",
            Self::U32Le => "U32LE",
            Self::U32Be => "U32BE",
            Self::F32Le => "F32LE",
            Self::F32Be => "F32BE",
            Self::F64Le => "F64LE",
            Self::F64Be => "F64BE",
        };
        Some(name)
    }

    pub fn from_gst_name(name: &str) -> Self {
        match name.to_uppercase().as_str() {
            "S8" => Self::S8,
            "U8" => Self::U8,
            "S16LE" => Self::S16Le,
            "S16BE" => Self::S16Be,
            "U16LE" => Self::U16Le,
            "U16BE" => Self::U16Be,
            "S32LE" => Self::S32Le,
            "S32BE" => Self::S32Be,
            "U32LE" => Self::U32Le,
            "U32BE" => Self::U32Be,
            "F32LE" => Self::F32Le,
            "F32BE" => Self::F32Be,
            "F64LE" => Self::F64Le,
            "F64BE" => Self::F64Be,
            _ => Self::None,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.gst_name() {
            Some(name) => write!(f, "{}", name.to_lowercase()),
            None => write!(f, "none"),
        }
    }
}

/// Speaker arrangement
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ChannelLayout {
    #[default]
    None,
    Mono,
    Stereo,
    /// Any other channel count, in default order
    Channels(u8),
}

impl ChannelLayout {
    pub fn channels(&self) -> u32 {
        match self {
            Self::None => 0,
            Self::Mono => 1,
            Self::Stereo => 2,
            Self::Channels(n) => u32::from(*n),
        }
    }

    /// Default layout for a channel count
    pub fn default_for(channels: u32) -> Self {
        match channels {
            0 => Self::None,
            1 => Self::Mono,
            2 => Self::Stereo,
            n => Self::Channels(n.min(u32::from(u8::MAX)) as u8),
        }
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Mono => write!(f, "mono"),
            Self::Stereo => write!(f, "stereo"),
            Self::Channels(n) => write!(f, "{}ch", n),
        }
    }
}

/// Raw audio caps
#[derive(Debug, Clone, Copy, Default, Eq, Hash)]
pub struct AudioCaps {
    pub format: SampleFormat,
    pub layout: ChannelLayout,
    /// One plane per channel instead of interleaved samples
    pub planar: bool,
    pub rate: u32,
}

impl AudioCaps {
    pub fn new(format: SampleFormat, layout: ChannelLayout, planar: bool, rate: u32) -> Self {
        Self {
            format,
            layout,
            planar,
            rate,
        }
    }

    /// Interleaved caps with the default layout for `channels`
    pub fn interleaved(format: SampleFormat, channels: u32, rate: u32) -> Self {
        Self::new(format, ChannelLayout::default_for(channels), false, rate)
    }

    pub fn is_valid(&self) -> bool {
        self.format != SampleFormat::None && self.layout.channels() > 0 && self.rate > 0
    }

    pub fn channels(&self) -> u32 {
        self.layout.channels()
    }

    /// Bits per sample
    pub fn bps(&self) -> u32 {
        self.format.bits()
    }

    /// Bytes taken by one sample across all channels
    pub fn frame_bytes(&self) -> usize {
        self.format.bytes() * self.channels() as usize
    }

    /// Number of samples per channel held in `bytes`
    pub fn samples_in(&self, bytes: usize) -> usize {
        match self.frame_bytes() {
            0 => 0,
            frame => bytes / frame,
        }
    }

    /// GStreamer caps string for this format
    pub fn to_gst_caps_string(&self) -> String {
        format!(
            "audio/x-raw,format={},rate={},channels={},layout={}",
            self.format.gst_name().unwrap_or("S16LE"),
            self.rate,
            self.channels(),
            if self.planar {
                "non-interleaved"
            } else {
                "interleaved"
            }
        )
    }
}

impl PartialEq for AudioCaps {
    fn eq(&self, other: &Self) -> bool {
        match (self.is_valid(), other.is_valid()) {
            (false, false) => true,
            (true, true) => {
                self.format == other.format
                    && self.layout == other.layout
                    && self.planar == other.planar
                    && self.rate == other.rate
            }
            _ => false,
        }
    }
}

impl fmt::Display for AudioCaps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_valid() {
            return write!(f, "audio/x-raw (invalid)");
        }

        write!(f, "{} {} {}Hz", self.format, self.layout, self.rate)
    }
}
