// SPDX-License-Identifier: GPL-3.0-only

//! Audio devices
//!
//! An [`AudioDev`] lists capture (input) and playback (output) devices,
//! reports their formats and opens one stream at a time. Device list and
//! default changes are published as [`AudioDevEvent`]s on a broadcast
//! channel.
//!
//! - [`pipewire`]: device registry fed by the PipeWire monitor
//! - [`monitor`]: `pw-dump --monitor` parsing
//! - [`stream`]: GStreamer capture and playback streams
//! - [`buffer`]: the bounded buffer between a stream and its user

pub mod buffer;
pub mod monitor;
pub mod pipewire;
pub mod stream;

pub use pipewire::PipeWireAudioDev;

use crate::errors::DeviceError;
use crate::media::caps::{AudioCaps, ChannelLayout, SampleFormat};
use crate::media::packet::Packet;
use std::fmt;
use tokio::sync::broadcast;

/// Default stream latency in milliseconds
pub const DEFAULT_LATENCY_MS: u32 = 25;

/// Sample rates offered for every device
pub const COMMON_SAMPLE_RATES: &[u32] = &[8000, 11025, 16000, 22050, 32000, 44100, 48000, 96000];

/// Capacity of the event channel
pub const EVENT_CAPACITY: usize = 64;

/// Capture or playback side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Input,
    Output,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// Device list notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AudioDevEvent {
    InputsChanged(Vec<String>),
    OutputsChanged(Vec<String>),
    DefaultInputChanged(String),
    DefaultOutputChanged(String),
}

/// A family of audio devices and the stream currently open on one of them
pub trait AudioDev: Send + Sync {
    /// Backend name for logs
    fn name(&self) -> &str;

    /// Default capture device, or the first one known
    fn default_input(&self) -> String;

    /// Default playback device, or the first one known
    fn default_output(&self) -> String;

    fn inputs(&self) -> Vec<String>;

    fn outputs(&self) -> Vec<String>;

    /// Human readable name, empty for unknown devices
    fn description(&self, device: &str) -> String;

    fn preferred_format(&self, device: &str) -> AudioCaps;

    fn supported_formats(&self, device: &str) -> Vec<SampleFormat>;

    fn supported_layouts(&self, device: &str) -> Vec<ChannelLayout>;

    fn supported_sample_rates(&self, device: &str) -> Vec<u32>;

    /// Stream latency in milliseconds
    fn latency(&self) -> u32;

    fn set_latency(&self, latency: u32);

    /// Open a capture stream for inputs or a playback stream for outputs
    fn init(&self, device: &str, caps: &AudioCaps) -> Result<(), DeviceError>;

    /// Captured audio, empty if nothing arrived in time
    fn read(&self) -> Packet;

    /// Queue audio for playback
    fn write(&self, packet: &Packet) -> Result<(), DeviceError>;

    /// Close the stream; a no-op when nothing is open
    fn uninit(&self);

    fn subscribe(&self) -> broadcast::Receiver<AudioDevEvent>;
}
