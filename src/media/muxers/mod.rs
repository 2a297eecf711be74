// SPDX-License-Identifier: GPL-3.0-only

//! Muxer elements
//!
//! A muxer consumes compressed audio and video packets and writes them into
//! a container file. Stream formats, codec headers and expected durations
//! are configured per [`CapsType`] before the element leaves Null.
//!
//! - [`WebmMuxer`]: WebM over the in-crate Matroska writer in [`segment`]
//! - [`cues`]: cue encoding and the cues-before-clusters rewrite
//! - [`probe`]: reads a written file back for inspection

pub mod cues;
pub mod ebml;
pub mod probe;
pub mod segment;
pub mod webm;

pub use probe::{ContainerInfo, probe_file};
pub use webm::{WEBM_MUXER_KEY, WebmMuxer};

use crate::element::Element;
use crate::element::notify::{Property, Signal};
use crate::media::caps::{AudioCodecId, Caps, CapsType, VideoCodecId};
use crate::media::options::{OptionStore, OptionValue, PropertyOption};
use std::fmt;

/// Container formats a muxer can produce
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum FormatId {
    #[default]
    Unknown,
    Webm,
}

impl fmt::Display for FormatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatId::Unknown => write!(f, "unknown"),
            FormatId::Webm => write!(f, "webm"),
        }
    }
}

/// A codec a muxer accepts, tagged with its stream type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MuxerCodec {
    Audio(AudioCodecId),
    Video(VideoCodecId),
}

impl MuxerCodec {
    pub fn caps_type(&self) -> CapsType {
        match self {
            MuxerCodec::Audio(_) => CapsType::Audio,
            MuxerCodec::Video(_) => CapsType::Video,
        }
    }

    pub fn fourcc(&self) -> u32 {
        match self {
            MuxerCodec::Audio(codec) => codec.fourcc(),
            MuxerCodec::Video(codec) => codec.fourcc(),
        }
    }
}

impl fmt::Display for MuxerCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MuxerCodec::Audio(codec) => write!(f, "{}", codec),
            MuxerCodec::Video(codec) => write!(f, "{}", codec),
        }
    }
}

/// Settings of one muxed stream
#[derive(Debug, Default)]
pub struct StreamSettings {
    caps: Property<Caps>,
    headers: Property<Vec<u8>>,
    bitrate: Property<u32>,
    /// Expected duration in stream units (samples or frames), 0 when unknown
    duration: Property<i64>,
}

impl StreamSettings {
    pub fn caps(&self) -> Caps {
        self.caps.get()
    }

    pub fn caps_changed(&self) -> &Signal<Caps> {
        self.caps.changed()
    }

    pub fn headers(&self) -> Vec<u8> {
        self.headers.get()
    }

    pub fn headers_changed(&self) -> &Signal<Vec<u8>> {
        self.headers.changed()
    }

    pub fn bitrate(&self) -> u32 {
        self.bitrate.get()
    }

    pub fn bitrate_changed(&self) -> &Signal<u32> {
        self.bitrate.changed()
    }

    pub fn duration(&self) -> i64 {
        self.duration.get()
    }

    pub fn duration_changed(&self) -> &Signal<i64> {
        self.duration.changed()
    }
}

/// State shared by every muxer
pub struct VideoMuxerBase {
    location: Property<String>,
    audio: StreamSettings,
    video: StreamSettings,
    options: OptionStore,
}

impl VideoMuxerBase {
    pub fn new(options: Vec<PropertyOption>) -> Self {
        Self {
            location: Property::default(),
            audio: StreamSettings::default(),
            video: StreamSettings::default(),
            options: OptionStore::new(options),
        }
    }

    /// Settings of the audio or video stream
    pub fn stream(&self, caps_type: CapsType) -> Option<&StreamSettings> {
        match caps_type {
            CapsType::Audio => Some(&self.audio),
            CapsType::Video => Some(&self.video),
            CapsType::Unknown => None,
        }
    }

    pub(crate) fn option_store(&self) -> &OptionStore {
        &self.options
    }
}

/// Public surface of a muxer element
pub trait VideoMuxer: Element {
    fn base(&self) -> &VideoMuxerBase;

    fn format_id(&self) -> FormatId;

    /// File extension without the dot
    fn extension(&self) -> String;

    fn description(&self) -> String;

    /// Codecs accepted for `caps_type`; both kinds for `Unknown`
    fn supported_codecs(&self, caps_type: CapsType) -> Vec<MuxerCodec>;

    /// Whether the container tolerates timestamp gaps on this stream
    fn gaps_allowed(&self, caps_type: CapsType) -> bool {
        caps_type != CapsType::Audio
    }

    fn default_codec(&self, caps_type: CapsType) -> Option<MuxerCodec> {
        self.supported_codecs(caps_type).into_iter().next()
    }

    /// Output file path
    fn location(&self) -> String {
        self.base().location.get()
    }

    fn set_location(&self, location: &str) {
        self.base().location.set(location.to_string());
    }

    fn reset_location(&self) {
        self.set_location("");
    }

    fn location_changed(&self) -> &Signal<String> {
        self.base().location.changed()
    }

    fn stream_caps(&self, caps_type: CapsType) -> Caps {
        self.base()
            .stream(caps_type)
            .map(StreamSettings::caps)
            .unwrap_or_default()
    }

    /// Store `caps` on the stream matching its type
    fn set_stream_caps(&self, caps: Caps) -> bool {
        match self.base().stream(caps.caps_type()) {
            Some(stream) => stream.caps.set(caps),
            None => false,
        }
    }

    fn reset_stream_caps(&self, caps_type: CapsType) {
        if let Some(stream) = self.base().stream(caps_type) {
            stream.caps.set(Caps::default());
        }
    }

    /// Codec configuration record written as CodecPrivate
    fn stream_headers(&self, caps_type: CapsType) -> Vec<u8> {
        self.base()
            .stream(caps_type)
            .map(StreamSettings::headers)
            .unwrap_or_default()
    }

    fn set_stream_headers(&self, caps_type: CapsType, headers: Vec<u8>) -> bool {
        match self.base().stream(caps_type) {
            Some(stream) => stream.headers.set(headers),
            None => false,
        }
    }

    fn stream_bitrate(&self, caps_type: CapsType) -> u32 {
        self.base()
            .stream(caps_type)
            .map(StreamSettings::bitrate)
            .unwrap_or_default()
    }

    fn set_stream_bitrate(&self, caps_type: CapsType, bitrate: u32) -> bool {
        match self.base().stream(caps_type) {
            Some(stream) => stream.bitrate.set(bitrate),
            None => false,
        }
    }

    fn stream_duration(&self, caps_type: CapsType) -> i64 {
        self.base()
            .stream(caps_type)
            .map(StreamSettings::duration)
            .unwrap_or_default()
    }

    fn set_stream_duration(&self, caps_type: CapsType, duration: i64) -> bool {
        match self.base().stream(caps_type) {
            Some(stream) => stream.duration.set(duration),
            None => false,
        }
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

    fn reset_options(&self) {
        self.base().options.reset();
    }
}
