// SPDX-License-Identifier: GPL-3.0-only

//! Pipelines built from elements
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Raw packets  │ ──▶ │  Recording        │ ──▶ │  WebM file   │
//! │ audio/video  │     │  - encoders       │     │              │
//! │              │     │  - PacketSync     │     │              │
//! │              │     │  - muxer          │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```

pub mod recording;

pub use recording::{Recording, RecordingSettings};
