// SPDX-License-Identifier: GPL-3.0-only

//! Camera Pipeline - media elements for recording audio and video
//!
//! This library provides the recording side of a camera application:
//! encoders, a WebM muxer, audio devices and the host that ties them
//! together.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`element`]: the element state machine, signals and the registry
//! - [`media`]: caps, packets, filters, encoders and muxers
//! - [`backends`]: PipeWire audio devices
//! - [`pipelines`]: the recording host
//! - [`config`]: user configuration handling
//!
//! # Example
//!
//! ```ignore
//! let config = Config::load()?;
//! let recording = Recording::from_config(&config, video_caps, audio_caps)?;
//! recording.set_state(ElementState::Playing)?;
//! ```

pub mod backends;
pub mod config;
pub mod constants;
pub mod element;
pub mod errors;
pub mod media;
pub mod pipelines;

// Re-export commonly used types
pub use config::Config;
pub use constants::BitratePreset;
pub use element::{Element, ElementState};
pub use errors::{PipelineError, PipelineResult};
pub use pipelines::{Recording, RecordingSettings};
