// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the media pipeline
//!
//! Every fallible operation in the crate reports one of these. Element state
//! transitions return them directly and also log them, so a host can either
//! check the result or just watch the log.

use crate::element::ElementState;
use crate::media::caps::{AudioCodecId, VideoCodecId};
use std::fmt;

/// Result type alias using PipelineError
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result of an element state transition
pub type ElementResult<T> = Result<T, PipelineError>;

/// Main pipeline error type
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineError {
    /// The element refused to move between these states
    UnsupportedTransition {
        element: String,
        from: ElementState,
        to: ElementState,
    },
    /// Encoder errors
    Encoder(EncoderError),
    /// Muxer errors
    Muxer(MuxerError),
    /// Audio device errors
    Device(DeviceError),
    /// Element registry errors
    Registry(String),
    /// Configuration errors
    Config(String),
    /// Filesystem errors
    Io(String),
}

/// Encoder-specific errors
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderError {
    /// Input caps are missing or invalid
    InvalidInputCaps,
    /// The selected codec name maps to no codec id
    UnknownCodec(String),
    /// No native implementation could be found
    Unavailable(String),
    /// The native library refused to open a session
    OpenFailed(String),
    /// A configuration value was rejected
    Configure(String),
    /// The native library failed on a frame
    EncodeFailed(String),
    /// A zero-length frame was submitted
    EmptyInput,
}

/// Muxer-specific errors
#[derive(Debug, Clone, PartialEq)]
pub enum MuxerError {
    /// Video caps are missing or invalid
    NoVideoFormat,
    /// Video codec cannot be stored in this container
    UnsupportedVideoCodec(VideoCodecId),
    /// Audio codec cannot be stored in this container
    UnsupportedAudioCodec(AudioCodecId),
    /// The packet synchronizer could not be created
    NoPacketSync,
    /// Output could not be opened
    OpenFailed { location: String, reason: String },
    /// Segment header could not be written
    SegmentInit(String),
    /// Track could not be added
    AddTrack(String),
    /// Frame could not be written
    AddFrame(String),
    /// Segment could not be finalized
    Finalize(String),
    /// Cues could not be moved before the clusters
    CueRelocation(String),
    /// Container data could not be parsed
    Parse(String),
}

/// Audio device errors
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The device id is not known to the registry
    UnknownDevice(String),
    /// A zero-length packet was written
    EmptyPacket,
    /// The device was used before `init`
    NotInitialized,
    /// The stream could not be created or failed while running
    StreamFailed(String),
    /// The registry monitor failed
    Monitor(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::UnsupportedTransition { element, from, to } => {
                write!(f, "{}: unsupported transition {} -> {}", element, from, to)
            }
            PipelineError::Encoder(e) => write!(f, "Encoder error: {}", e),
            PipelineError::Muxer(e) => write!(f, "Muxer error: {}", e),
            PipelineError::Device(e) => write!(f, "Audio device error: {}", e),
            PipelineError::Registry(msg) => write!(f, "Registry error: {}", msg),
            PipelineError::Config(msg) => write!(f, "Configuration error: {}", msg),
            PipelineError::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl fmt::Display for EncoderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncoderError::InvalidInputCaps => write!(f, "Invalid input format"),
            EncoderError::UnknownCodec(codec) => write!(f, "Unknown codec: {}", codec),
            EncoderError::Unavailable(msg) => write!(f, "Encoder not available: {}", msg),
            EncoderError::OpenFailed(msg) => write!(f, "Failed opening the encoder: {}", msg),
            EncoderError::Configure(msg) => write!(f, "Error setting configs: {}", msg),
            EncoderError::EncodeFailed(msg) => write!(f, "Failed encoding the frame: {}", msg),
            EncoderError::EmptyInput => write!(f, "Empty input frame"),
        }
    }
}

impl fmt::Display for MuxerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxerError::NoVideoFormat => write!(f, "No valid video format set"),
            MuxerError::UnsupportedVideoCodec(codec) => {
                write!(f, "Video codec not supported by this muxer: {}", codec)
            }
            MuxerError::UnsupportedAudioCodec(codec) => {
                write!(f, "Audio codec not supported by this muxer: {}", codec)
            }
            MuxerError::NoPacketSync => write!(f, "Packet synchronizer not available"),
            MuxerError::OpenFailed { location, reason } => {
                write!(f, "Failed to open file for writing {}: {}", location, reason)
            }
            MuxerError::SegmentInit(msg) => {
                write!(f, "Failed to initialize the muxer segment: {}", msg)
            }
            MuxerError::AddTrack(msg) => write!(f, "Could not add track: {}", msg),
            MuxerError::AddFrame(msg) => write!(f, "Failed to write the frame: {}", msg),
            MuxerError::Finalize(msg) => write!(f, "Finalization of segment failed: {}", msg),
            MuxerError::CueRelocation(msg) => {
                write!(f, "Unable to copy and move cues before clusters: {}", msg)
            }
            MuxerError::Parse(msg) => write!(f, "Malformed container: {}", msg),
        }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeviceError::UnknownDevice(id) => write!(f, "Unknown device: {}", id),
            DeviceError::EmptyPacket => write!(f, "Refusing to write an empty packet"),
            DeviceError::NotInitialized => write!(f, "Device stream not initialized"),
            DeviceError::StreamFailed(msg) => write!(f, "Stream failed: {}", msg),
            DeviceError::Monitor(msg) => write!(f, "Registry monitor failed: {}", msg),
        }
    }
}

impl std::error::Error for PipelineError {}
impl std::error::Error for EncoderError {}
impl std::error::Error for MuxerError {}
impl std::error::Error for DeviceError {}

impl From<EncoderError> for PipelineError {
    fn from(err: EncoderError) -> Self {
        PipelineError::Encoder(err)
    }
}

impl From<MuxerError> for PipelineError {
    fn from(err: MuxerError) -> Self {
        PipelineError::Muxer(err)
    }
}

impl From<DeviceError> for PipelineError {
    fn from(err: DeviceError) -> Self {
        PipelineError::Device(err)
    }
}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Config(err.to_string())
    }
}

impl From<std::io::Error> for MuxerError {
    fn from(err: std::io::Error) -> Self {
        MuxerError::Parse(err.to_string())
    }
}
