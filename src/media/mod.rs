// SPDX-License-Identifier: GPL-3.0-only

//! Media types and elements
//!
//! # Data
//!
//! - [`caps`]: raw and compressed stream formats
//! - [`packet`]: a block of media with its timing
//! - [`fraction`]: rational rates and time bases
//! - [`options`]: descriptors for element options
//!
//! # Elements
//!
//! - [`filters`]: audio framing and frame rate control
//! - [`encoders`]: AAC, Opus and AV1
//! - [`sync`]: interleaves encoded audio and video by time
//! - [`muxers`]: the WebM writer and its EBML layer

pub mod caps;
pub mod encoders;
pub mod filters;
pub mod fraction;
pub mod muxers;
pub mod options;
pub mod packet;
pub mod sync;

// Re-export commonly used types
pub use caps::{AudioCaps, Caps, CapsType, VideoCaps};
pub use fraction::Fraction;
pub use packet::{Packet, PacketFlags, PacketKind};
