// SPDX-License-Identifier: GPL-3.0-only

//! Timestamped media buffers passed between elements

use super::caps::{AudioCaps, Caps};
use super::fraction::Fraction;
use std::ops::{BitOr, BitOrAssign};
use std::sync::Arc;

/// What a packet carries, derived from its caps
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PacketKind {
    #[default]
    Unknown,
    Audio,
    Video,
    AudioCompressed,
    VideoCompressed,
}

impl PacketKind {
    pub fn is_audio(&self) -> bool {
        matches!(self, Self::Audio | Self::AudioCompressed)
    }

    pub fn is_video(&self) -> bool {
        matches!(self, Self::Video | Self::VideoCompressed)
    }
}

/// Packet flag bits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PacketFlags(u32);

impl PacketFlags {
    pub const NONE: Self = Self(0);
    /// Decodable without earlier frames
    pub const KEY_FRAME: Self = Self(1);

    pub fn contains(&self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl BitOr for PacketFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for PacketFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// A unit of media data with timing
///
/// `pts`, `dts` and `duration` are in ticks of `time_base` seconds. Compare
/// packets from different streams with [`Packet::pts_seconds`], never by raw
/// ticks. Cloning a packet shares its data buffer.
#[derive(Debug, Clone, Default)]
pub struct Packet {
    data: Arc<[u8]>,
    pub caps: Caps,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub time_base: Fraction,
    /// Logical source identity; a change marks a discontinuity
    pub id: i64,
    /// Stream index, 0 is the primary stream
    pub index: i32,
    pub flags: PacketFlags,
}

impl Packet {
    pub fn new(data: impl Into<Arc<[u8]>>, caps: impl Into<Caps>) -> Self {
        Self {
            data: data.into(),
            caps: caps.into(),
            ..Self::default()
        }
    }

    /// A zeroed buffer of `size` bytes
    pub fn zeroed(size: usize, caps: impl Into<Caps>) -> Self {
        Self::new(vec![0u8; size], caps)
    }

    pub fn kind(&self) -> PacketKind {
        match self.caps {
            Caps::Unknown => PacketKind::Unknown,
            Caps::RawAudio(_) => PacketKind::Audio,
            Caps::RawVideo(_) => PacketKind::Video,
            Caps::CompressedAudio(_) => PacketKind::AudioCompressed,
            Caps::CompressedVideo(_) => PacketKind::VideoCompressed,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Mutable access to the data, copying it first if it is shared
    pub fn data_mut(&mut self) -> &mut [u8] {
        if Arc::get_mut(&mut self.data).is_none() {
            self.data = Arc::from(&self.data[..]);
        }

        // The buffer was made unique above
        Arc::get_mut(&mut self.data).unwrap_or(&mut [])
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Same as `!is_empty()`; empty packets carry no media
    pub fn is_valid(&self) -> bool {
        !self.data.is_empty()
    }

    pub fn is_key_frame(&self) -> bool {
        self.flags.contains(PacketFlags::KEY_FRAME)
    }

    pub fn pts_seconds(&self) -> f64 {
        self.pts as f64 * self.time_base.value()
    }

    pub fn duration_seconds(&self) -> f64 {
        self.duration as f64 * self.time_base.value()
    }

    pub fn audio_caps(&self) -> Option<&AudioCaps> {
        self.caps.as_audio()
    }

    /// Samples per channel in a raw audio packet, 0 for anything else
    pub fn samples(&self) -> usize {
        self.audio_caps()
            .map(|caps| caps.samples_in(self.data.len()))
            .unwrap_or(0)
    }

    /// Copy timing and identity from `other`
    pub fn copy_metadata(&mut self, other: &Packet) {
        self.pts = other.pts;
        self.dts = other.dts;
        self.duration = other.duration;
        self.time_base = other.time_base;
        self.id = other.id;
        self.index = other.index;
    }
}
