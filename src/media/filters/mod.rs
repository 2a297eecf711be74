// SPDX-License-Identifier: GPL-3.0-only

//! Helper elements that adapt raw streams for encoders
//!
//! - [`FillAudioGaps`]: converts audio to the encoder format and cuts it
//!   into fixed-size frames, optionally padding timestamp gaps with silence
//! - [`FpsControl`]: maps video onto a constant output frame rate
//! - [`VideoConverter`]: converts frames to the format an encoder consumes

pub mod audio_convert;
pub mod audio_gaps;
pub mod fps_control;
pub mod video_convert;

pub use audio_convert::AudioConverter;
pub use audio_gaps::{FILL_AUDIO_GAPS_KEY, FillAudioGaps};
pub use fps_control::{FPS_CONTROL_KEY, FpsControl};
pub use video_convert::VideoConverter;
