// SPDX-License-Identifier: GPL-3.0-only

//! Device backends
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │              Recording host              │
//! └────────────────────┬─────────────────────┘
//!                      │ raw audio packets
//! ┌────────────────────┴─────────────────────┐
//! │  AudioDev (PipeWire)                     │
//! │  ┌──────────────┐   ┌─────────────────┐  │
//! │  │ pw-dump      │   │ GStreamer       │  │
//! │  │ monitor      │   │ capture/playback│  │
//! │  └──────────────┘   └─────────────────┘  │
//! └──────────────────────────────────────────┘
//! ```
//!
//! - [`audio`]: device registry, format queries and stream I/O

pub mod audio;
