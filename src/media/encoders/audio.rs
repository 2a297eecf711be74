// SPDX-License-Identifier: GPL-3.0-only

//! Frame-based audio encoder element
//!
//! AAC and Opus share one flow: raw input is handed to a [`FillAudioGaps`]
//! configured with the negotiated format and the session frame size, and
//! every fixed-size frame it emits goes through the native session. The
//! codec-specific parts live in an [`AudioCodecProfile`].

use super::native::{AudioCodecConfig, AudioCodecLibrary, AudioCodecSession, CodecParams};
use super::{AudioEncoder, AudioEncoderBase};
use crate::element::notify::Signal;
use crate::element::registry;
use crate::element::{Element, ElementState, Lifecycle, StateCell, lock};
use crate::errors::{ElementResult, EncoderError};
use crate::media::caps::{AudioCaps, AudioCodecId, CompressedAudioCaps};
use crate::media::filters::{FILL_AUDIO_GAPS_KEY, FillAudioGaps};
use crate::media::fraction::Fraction;
use crate::media::options::PropertyOption;
use crate::media::packet::Packet;
use std::any::Any;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// Codec tables and format rules for one audio codec
pub trait AudioCodecProfile: Send + Sync + 'static {
    /// Element name used in logs
    const ELEMENT_NAME: &'static str;

    fn codecs() -> &'static [&'static str];

    fn codec_id(codec: &str) -> AudioCodecId;

    fn codec_description(codec: &str) -> &'static str;

    fn options() -> Vec<PropertyOption>;

    /// Nearest raw format the codec accepts for `input`
    fn negotiate(input: &AudioCaps) -> AudioCaps;

    /// Codec configuration record for a stream in `caps`
    fn headers(caps: &AudioCaps, params: &CodecParams) -> Vec<u8>;
}

#[derive(Default)]
struct AudioSession {
    initialized: bool,
    native: Option<Box<dyn AudioCodecSession>>,
    output_caps: CompressedAudioCaps,
    /// Running output timestamp in samples
    pts: i64,
}

impl AudioSession {
    fn packet(&mut self, data: Vec<u8>, samples: i64, src: Option<&Packet>) -> Packet {
        let rate = i64::from(self.output_caps.raw.rate);
        let mut packet = Packet::new(data, self.output_caps);
        packet.pts = self.pts;
        packet.dts = self.pts;
        packet.duration = samples;
        packet.time_base = Fraction::new(1, rate);

        if let Some(src) = src {
            packet.id = src.id;
            packet.index = src.index;
        }

        self.pts += samples;
        packet
    }
}

/// Audio encoder element parameterized by its codec profile
pub struct AudioEncoderElement<C: AudioCodecProfile> {
    state: StateCell,
    base: AudioEncoderBase,
    library: Arc<dyn AudioCodecLibrary>,
    fill_audio_gaps: Arc<FillAudioGaps>,
    session: Mutex<AudioSession>,
    output: Signal<Packet>,
    _codec: PhantomData<fn() -> C>,
}

impl<C: AudioCodecProfile> AudioEncoderElement<C> {
    /// Create an encoder over `library`
    pub fn new(library: Arc<dyn AudioCodecLibrary>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &std::sync::Weak<Self>| {
            let fill_audio_gaps = registry::global()
                .create_as::<FillAudioGaps>(FILL_AUDIO_GAPS_KEY)
                .unwrap_or_else(|| Arc::new(FillAudioGaps::new()));

            let weak = weak.clone();
            fill_audio_gaps.output().connect(move |frame| {
                if let Some(encoder) = weak.upgrade() {
                    encoder.encode_frame(frame);
                }
            });

            let codec = C::codecs().first().copied().unwrap_or_default();

            Self {
                state: StateCell::new(),
                base: AudioEncoderBase::new(codec, C::options()),
                library,
                fill_audio_gaps,
                session: Mutex::new(AudioSession::default()),
                output: Signal::new(),
                _codec: PhantomData,
            }
        })
    }

    /// Create an encoder over the GStreamer plugins
    pub fn with_default_library() -> Arc<Self> {
        Self::new(Arc::new(super::gst::GstAudioLibrary::new()))
    }

    /// Name of the native library in use
    pub fn library_name(&self) -> &str {
        self.library.name()
    }

    fn encode_frame(&self, frame: &Packet) {
        if frame.is_empty() {
            return;
        }

        let samples = frame.samples() as i64;

        let packets = {
            let mut session = lock(&self.session);
            let Some(native) = session.native.as_mut() else {
                return;
            };

            let chunks = match native.encode(frame.data(), frame.samples()) {
                Ok(chunks) => chunks,
                Err(e) => {
                    error!(encoder = C::ELEMENT_NAME, error = %e, "Failed to encode the frame");
                    Vec::new()
                }
            };

            chunks
                .into_iter()
                .filter(|chunk| !chunk.is_empty())
                .map(|chunk| session.packet(chunk, samples, Some(frame)))
                .collect::<Vec<_>>()
        };

        for packet in &packets {
            self.output.emit(packet);
        }

        self.base.add_encoded_time(samples);
    }
}

impl<C: AudioCodecProfile> Lifecycle for AudioEncoderElement<C> {
    fn init(&self) -> ElementResult<()> {
        self.uninit();

        let input_caps = self.base.input_caps.get();

        if !input_caps.is_valid() {
            error!(encoder = C::ELEMENT_NAME, "Invalid input format");
            return Err(EncoderError::InvalidInputCaps.into());
        }

        let codec = self.codec();
        let codec_id = C::codec_id(&codec);
        let output_caps = self.output_caps();

        if codec_id == AudioCodecId::Unknown || !output_caps.is_valid() {
            error!(encoder = C::ELEMENT_NAME, codec = %codec, "Unknown codec");
            return Err(EncoderError::UnknownCodec(codec).into());
        }

        let config = AudioCodecConfig {
            codec: codec_id,
            caps: output_caps.raw,
            bitrate: self.bitrate(),
            params: self.base.params(),
        };

        let native = self.library.open(&config).inspect_err(|e| {
            error!(encoder = C::ELEMENT_NAME, library = self.library.name(), error = %e, "Failed to open the encoder");
        })?;

        let input_samples = native.input_samples();
        self.base
            .set_headers(C::headers(&config.caps, &config.params));

        self.fill_audio_gaps.set_fill_gaps(self.fill_gaps());
        self.fill_audio_gaps.set_output_samples(input_samples);
        self.fill_audio_gaps.set_output_caps(config.caps);
        self.fill_audio_gaps.set_state(ElementState::Playing)?;

        *lock(&self.session) = AudioSession {
            initialized: true,
            native: Some(native),
            output_caps,
            pts: 0,
        };
        self.base.set_encoded_time_pts(0);

        info!(
            encoder = C::ELEMENT_NAME,
            library = self.library.name(),
            caps = %config.caps,
            bitrate = config.bitrate,
            input_samples,
            "Audio encoder started"
        );

        Ok(())
    }

    fn uninit(&self) {
        {
            let mut session = lock(&self.session);

            if !session.initialized {
                return;
            }

            session.initialized = false;
        }

        // Emits the last partial frame through encode_frame
        if let Err(e) = self.fill_audio_gaps.set_state(ElementState::Null) {
            warn!(encoder = C::ELEMENT_NAME, error = %e, "Failed to stop gap filler");
        }

        let packets = {
            let mut session = lock(&self.session);
            let mut packets = Vec::new();

            if let Some(mut native) = session.native.take() {
                let samples = native.input_samples() as i64;

                match native.flush() {
                    Ok(chunks) => {
                        for chunk in chunks.into_iter().filter(|chunk| !chunk.is_empty()) {
                            packets.push(session.packet(chunk, samples, None));
                        }
                    }
                    Err(e) => {
                        error!(encoder = C::ELEMENT_NAME, error = %e, "Failed to flush the encoder")
                    }
                }
            }

            packets
        };

        for packet in &packets {
            self.output.emit(packet);
        }

        debug!(encoder = C::ELEMENT_NAME, flushed = packets.len(), "Audio encoder stopped");
    }
}

impl<C: AudioCodecProfile> Element for AudioEncoderElement<C> {
    fn name(&self) -> &str {
        C::ELEMENT_NAME
    }

    fn state_cell(&self) -> &StateCell {
        &self.state
    }

    fn set_state(&self, state: ElementState) -> ElementResult<()> {
        self.state.drive(self.name(), state, self)
    }

    fn push(&self, packet: &Packet) {
        if self.state.is_paused() || !lock(&self.session).initialized {
            return;
        }

        self.fill_audio_gaps.push(packet);
    }

    fn output(&self) -> &Signal<Packet> {
        &self.output
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl<C: AudioCodecProfile> AudioEncoder for AudioEncoderElement<C> {
    fn base(&self) -> &AudioEncoderBase {
        &self.base
    }

    fn codecs(&self) -> Vec<String> {
        C::codecs().iter().map(|codec| codec.to_string()).collect()
    }

    fn codec_id(&self, codec: &str) -> AudioCodecId {
        C::codec_id(codec)
    }

    fn codec_description(&self, codec: &str) -> String {
        C::codec_description(codec).to_string()
    }

    fn update_output_caps(&self) {
        let input_caps = self.input_caps();
        let codec_id = C::codec_id(&self.codec());

        let caps = if !input_caps.is_valid() || codec_id == AudioCodecId::Unknown {
            CompressedAudioCaps::default()
        } else {
            CompressedAudioCaps::new(codec_id, C::negotiate(&input_caps), self.bitrate())
        };

        if self.base.set_output_caps(caps) {
            debug!(encoder = C::ELEMENT_NAME, caps = %caps, "Output format changed");
        }
    }
}

impl<C: AudioCodecProfile> Drop for AudioEncoderElement<C> {
    fn drop(&mut self) {
        self.uninit();
    }
}
