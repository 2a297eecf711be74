// SPDX-License-Identifier: GPL-3.0-only

//! Encoder elements
//!
//! Encoders take raw packets, negotiate the nearest format their native
//! library accepts and emit compressed packets plus a codec configuration
//! record (`headers`) for the muxer.
//!
//! - [`AacEncoder`]: AAC-LC with an in-crate AudioSpecificConfig
//! - [`OpusEncoder`]: Opus with an in-crate `OpusHead`
//! - [`Av1Encoder`]: AV1 with frame rate normalization
//!
//! Native libraries sit behind the [`native`] traits; [`gst`] implements
//! them with GStreamer encoder plugins.

pub mod aac;
pub mod audio;
pub mod av1;
pub mod gst;
pub mod native;
pub mod opus;

pub use aac::{AacCodec, AudioSpecificConfig, nearest_sample_rate, sample_rate_index};
pub use audio::{AudioCodecProfile, AudioEncoderElement};
pub use av1::Av1Encoder;
pub use opus::{OpusCodec, OpusHead};

use crate::constants::defaults;
use crate::element::notify::{Property, Signal};
use crate::element::Element;
use crate::media::caps::{
    AudioCaps, AudioCodecId, CompressedAudioCaps, CompressedVideoCaps, VideoCaps, VideoCodecId,
};
use crate::media::options::{OptionStore, OptionValue, PropertyOption};
use native::CodecParams;

/// Registry key of the AAC encoder
pub const AAC_ENCODER_KEY: &str = "AudioEncoder/faac";

/// Registry key of the Opus encoder
pub const OPUS_ENCODER_KEY: &str = "AudioEncoder/opus";

/// Registry key of the AV1 encoder
pub const AV1_ENCODER_KEY: &str = "VideoEncoder/rav1e";

pub type AacEncoder = AudioEncoderElement<AacCodec>;
pub type OpusEncoder = AudioEncoderElement<OpusCodec>;

/// State shared by every audio encoder
pub struct AudioEncoderBase {
    codec: Property<String>,
    input_caps: Property<AudioCaps>,
    output_caps: Property<CompressedAudioCaps>,
    bitrate: Property<u32>,
    fill_gaps: Property<bool>,
    headers: Property<Vec<u8>>,
    encoded_time_pts: Property<i64>,
    options: OptionStore,
}

impl AudioEncoderBase {
    pub fn new(codec: &str, options: Vec<PropertyOption>) -> Self {
        Self {
            codec: Property::new(codec.to_string()),
            input_caps: Property::default(),
            output_caps: Property::default(),
            bitrate: Property::new(defaults::AUDIO_BITRATE),
            fill_gaps: Property::new(false),
            headers: Property::default(),
            encoded_time_pts: Property::new(0),
            options: OptionStore::new(options),
        }
    }

    pub(crate) fn set_output_caps(&self, caps: CompressedAudioCaps) -> bool {
        self.output_caps.set(caps)
    }

    pub(crate) fn set_headers(&self, headers: Vec<u8>) -> bool {
        self.headers.set(headers)
    }

    pub(crate) fn set_encoded_time_pts(&self, pts: i64) {
        self.encoded_time_pts.set(pts);
    }

    pub(crate) fn add_encoded_time(&self, samples: i64) {
        self.encoded_time_pts
            .set(self.encoded_time_pts.get() + samples);
    }

    pub(crate) fn params(&self) -> CodecParams {
        self.options.resolved()
    }
}

/// Public surface of an audio encoder element
///
/// Implementors supply the codec tables and the negotiation step; the rest
/// is provided on top of [`AudioEncoderBase`].
pub trait AudioEncoder: Element {
    fn base(&self) -> &AudioEncoderBase;

    /// Codec names this element can produce
    fn codecs(&self) -> Vec<String>;

    fn codec_id(&self, codec: &str) -> AudioCodecId;

    fn codec_description(&self, codec: &str) -> String;

    /// Recompute the output caps from the input caps and codec
    fn update_output_caps(&self);

    fn codec(&self) -> String {
        self.base().codec.get()
    }

    fn set_codec(&self, codec: &str) {
        if self.base().codec.set(codec.to_string()) {
            self.update_output_caps();
        }
    }

    fn reset_codec(&self) {
        let first = self.codecs().into_iter().next().unwrap_or_default();
        self.set_codec(&first);
    }

    fn codec_changed(&self) -> &Signal<String> {
        self.base().codec.changed()
    }

    fn input_caps(&self) -> AudioCaps {
        self.base().input_caps.get()
    }

    fn set_input_caps(&self, caps: AudioCaps) {
        if self.base().input_caps.set(caps) {
            self.update_output_caps();
        }
    }

    fn reset_input_caps(&self) {
        self.set_input_caps(AudioCaps::default());
    }

    fn input_caps_changed(&self) -> &Signal<AudioCaps> {
        self.base().input_caps.changed()
    }

    fn output_caps(&self) -> CompressedAudioCaps {
        self.base().output_caps.get()
    }

    fn output_caps_changed(&self) -> &Signal<CompressedAudioCaps> {
        self.base().output_caps.changed()
    }

    /// Target bits per second
    fn bitrate(&self) -> u32 {
        self.base().bitrate.get()
    }

    fn set_bitrate(&self, bitrate: u32) {
        if self.base().bitrate.set(bitrate) {
            self.update_output_caps();
        }
    }

    fn reset_bitrate(&self) {
        self.set_bitrate(defaults::AUDIO_BITRATE);
    }

    fn bitrate_changed(&self) -> &Signal<u32> {
        self.base().bitrate.changed()
    }

    /// Whether timestamp gaps are padded with silence
    fn fill_gaps(&self) -> bool {
        self.base().fill_gaps.get()
    }

    fn set_fill_gaps(&self, fill: bool) {
        self.base().fill_gaps.set(fill);
    }

    fn reset_fill_gaps(&self) {
        self.set_fill_gaps(false);
    }

    fn fill_gaps_changed(&self) -> &Signal<bool> {
        self.base().fill_gaps.changed()
    }

    /// Codec configuration record, empty before init
    fn headers(&self) -> Vec<u8> {
        self.base().headers.get()
    }

    fn headers_changed(&self) -> &Signal<Vec<u8>> {
        self.base().headers.changed()
    }

    /// Samples encoded since init
    fn encoded_time_pts(&self) -> i64 {
        self.base().encoded_time_pts.get()
    }

    fn encoded_time_pts_changed(&self) -> &Signal<i64> {
        self.base().encoded_time_pts.changed()
    }

    fn options(&self) -> &[PropertyOption] {
        self.base().options.options()
    }

    fn option_value(&self, name: &str) -> Option<OptionValue> {
        self.base().options.value(name)
    }

    fn set_option_value(&self, name: &str, value: OptionValue) -> bool {
        self.base().options.set(name, value)
    }

    fn option_value_changed(&self) -> &Signal<(String, OptionValue)> {
        self.base().options.changed()
    }

    /// Restore the default bitrate and every option
    fn reset_options(&self) {
        self.reset_bitrate();
        self.base().options.reset();
    }
}

/// State shared by every video encoder
pub struct VideoEncoderBase {
    codec: Property<String>,
    input_caps: Property<VideoCaps>,
    output_caps: Property<CompressedVideoCaps>,
    bitrate: Property<u32>,
    gop: Property<u32>,
    fill_gaps: Property<bool>,
    headers: Property<Vec<u8>>,
    encoded_time_pts: Property<i64>,
    options: OptionStore,
}

impl VideoEncoderBase {
    pub fn new(codec: &str, options: Vec<PropertyOption>) -> Self {
        Self {
            codec: Property::new(codec.to_string()),
            input_caps: Property::default(),
            output_caps: Property::default(),
            bitrate: Property::new(defaults::VIDEO_BITRATE),
            gop: Property::new(defaults::GOP_MS),
            fill_gaps: Property::new(false),
            headers: Property::default(),
            encoded_time_pts: Property::new(0),
            options: OptionStore::new(options),
        }
    }

    pub(crate) fn set_output_caps(&self, caps: CompressedVideoCaps) -> bool {
        self.output_caps.set(caps)
    }

    pub(crate) fn set_headers(&self, headers: Vec<u8>) -> bool {
        self.headers.set(headers)
    }

    pub(crate) fn set_encoded_time_pts(&self, pts: i64) {
        self.encoded_time_pts.set(pts);
    }

    pub(crate) fn params(&self) -> CodecParams {
        self.options.resolved()
    }
}

/// Public surface of a video encoder element
pub trait VideoEncoder: Element {
    fn base(&self) -> &VideoEncoderBase;

    fn codecs(&self) -> Vec<String>;

    fn codec_id(&self, codec: &str) -> VideoCodecId;

    fn codec_description(&self, codec: &str) -> String;

    /// Recompute the output caps from the input caps and codec
    fn update_output_caps(&self);

    fn codec(&self) -> String {
        self.base().codec.get()
    }

    fn set_codec(&self, codec: &str) {
        if self.base().codec.set(codec.to_string()) {
            self.update_output_caps();
        }
    }

    fn reset_codec(&self) {
        let first = self.codecs().into_iter().next().unwrap_or_default();
        self.set_codec(&first);
    }

    fn codec_changed(&self) -> &Signal<String> {
        self.base().codec.changed()
    }

    fn input_caps(&self) -> VideoCaps {
        self.base().input_caps.get()
    }

    fn set_input_caps(&self, caps: VideoCaps) {
        if self.base().input_caps.set(caps) {
            self.update_output_caps();
        }
    }

    fn reset_input_caps(&self) {
        self.set_input_caps(VideoCaps::default());
    }

    fn input_caps_changed(&self) -> &Signal<VideoCaps> {
        self.base().input_caps.changed()
    }

    fn output_caps(&self) -> CompressedVideoCaps {
        self.base().output_caps.get()
    }

    fn output_caps_changed(&self) -> &Signal<CompressedVideoCaps> {
        self.base().output_caps.changed()
    }

    fn bitrate(&self) -> u32 {
        self.base().bitrate.get()
    }

    fn set_bitrate(&self, bitrate: u32) {
        if self.base().bitrate.set(bitrate) {
            self.update_output_caps();
        }
    }

    fn reset_bitrate(&self) {
        self.set_bitrate(defaults::VIDEO_BITRATE);
    }

    fn bitrate_changed(&self) -> &Signal<u32> {
        self.base().bitrate.changed()
    }

    /// Key frame interval in milliseconds
    fn gop(&self) -> u32 {
        self.base().gop.get()
    }

    fn set_gop(&self, gop: u32) {
        self.base().gop.set(gop);
    }

    fn reset_gop(&self) {
        self.set_gop(defaults::GOP_MS);
    }

    fn gop_changed(&self) -> &Signal<u32> {
        self.base().gop.changed()
    }

    /// Whether skipped frame slots are filled by repeating frames
    fn fill_gaps(&self) -> bool {
        self.base().fill_gaps.get()
    }

    fn set_fill_gaps(&self, fill: bool) {
        self.base().fill_gaps.set(fill);
    }

    fn reset_fill_gaps(&self) {
        self.set_fill_gaps(false);
    }

    fn fill_gaps_changed(&self) -> &Signal<bool> {
        self.base().fill_gaps.changed()
    }

    fn headers(&self) -> Vec<u8> {
        self.base().headers.get()
    }

    fn headers_changed(&self) -> &Signal<Vec<u8>> {
        self.base().headers.changed()
    }

    /// End of the last encoded frame, in frames
    fn encoded_time_pts(&self) -> i64 {
        self.base().encoded_time_pts.get()
    }

    fn encoded_time_pts_changed(&self) -> &Signal<i64> {
        self.base().encoded_time_pts.changed()
    }

    fn options(&self) -> &[PropertyOption] {
        self.base().options.options()
    }

    fn option_value(&self, name: &str) -> Option<OptionValue> {
        self.base().options.value(name)
    }

    fn set_option_value(&self, name: &str, value: OptionValue) -> bool {
        self.base().options.set(name, value)
    }

    fn option_value_changed(&self) -> &Signal<(String, OptionValue)> {
        self.base().options.changed()
    }

    /// Restore the default bitrate, GOP and every option
    fn reset_options(&self) {
        self.reset_bitrate();
        self.reset_gop();
        self.base().options.reset();
    }
}
