// SPDX-License-Identifier: GPL-3.0-only

//! Native codec seam
//!
//! Encoder elements never talk to a codec library directly. They open a
//! session through one of these traits, which the GStreamer backend in
//! [`super::gst`] implements and tests replace with in-process fakes.

use crate::errors::EncoderError;
use crate::media::caps::{AudioCaps, AudioCodecId, VideoCaps, VideoCodecId};
use crate::media::fraction::Fraction;
use crate::media::options::OptionValue;
use std::collections::BTreeMap;

/// Resolved option values handed to a native session
pub type CodecParams = BTreeMap<String, OptionValue>;

/// Everything needed to open an audio encoding session
#[derive(Debug, Clone, PartialEq)]
pub struct AudioCodecConfig {
    pub codec: AudioCodecId,
    /// Raw format the session consumes
    pub caps: AudioCaps,
    /// Bits per second for the whole stream
    pub bitrate: u32,
    pub params: CodecParams,
}

impl AudioCodecConfig {
    pub fn param(&self, name: &str) -> Option<&OptionValue> {
        self.params.get(name)
    }
}

/// Opens audio encoding sessions
pub trait AudioCodecLibrary: Send + Sync {
    /// Implementation name for logs
    fn name(&self) -> &str;

    fn open(&self, config: &AudioCodecConfig) -> Result<Box<dyn AudioCodecSession>, EncoderError>;
}

/// One open audio encoder
pub trait AudioCodecSession: Send {
    /// Samples per channel the session wants per call
    fn input_samples(&self) -> usize;

    /// Encode interleaved samples, returning any finished chunks
    ///
    /// A session may buffer internally, so a call can return nothing and a
    /// later one several chunks.
    fn encode(&mut self, data: &[u8], samples: usize) -> Result<Vec<Vec<u8>>, EncoderError>;

    /// Drain everything still buffered
    fn flush(&mut self) -> Result<Vec<Vec<u8>>, EncoderError>;
}

/// Result of a send or receive call on a video session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderStatus {
    Success,
    /// The session is full; drain packets and send the frame again
    EnoughData,
    /// A frame was consumed without producing a packet yet
    Encoded,
    /// Nothing more to receive until another frame is sent
    NeedMoreData,
    /// End of stream reached after a flush
    LimitReached,
    Failure,
}

/// Everything needed to open a video encoding session
#[derive(Debug, Clone, PartialEq)]
pub struct VideoCodecConfig {
    pub codec: VideoCodecId,
    /// Raw format the session consumes
    pub caps: VideoCaps,
    /// Seconds per frame
    pub time_base: Fraction,
    pub bitrate: u32,
    /// Maximum frames between key frames
    pub key_frame_interval: u32,
    pub params: CodecParams,
}

impl VideoCodecConfig {
    pub fn param(&self, name: &str) -> Option<&OptionValue> {
        self.params.get(name)
    }
}

/// One compressed video unit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedVideoPacket {
    pub data: Vec<u8>,
    pub key_frame: bool,
    /// Timestamp of the frame it was encoded from, in time base ticks
    pub pts: i64,
}

/// Opens video encoding sessions
pub trait VideoCodecLibrary: Send + Sync {
    fn name(&self) -> &str;

    fn open(&self, config: &VideoCodecConfig) -> Result<Box<dyn VideoCodecSession>, EncoderError>;
}

/// One open video encoder
pub trait VideoCodecSession: Send {
    /// Codec configuration record, empty until the library knows it
    fn sequence_header(&self) -> Vec<u8>;

    /// Submit a frame, or `None` to signal end of stream
    fn send_frame(&mut self, frame: Option<&[u8]>, pts: i64) -> EncoderStatus;

    /// Fetch the next compressed packet if one is ready
    fn receive_packet(&mut self) -> (EncoderStatus, Option<EncodedVideoPacket>);
}
