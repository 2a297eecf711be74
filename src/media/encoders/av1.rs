// SPDX-License-Identifier: GPL-3.0-only

//! AV1 encoder element
//!
//! Raw frames are converted to the output format, mapped onto a constant
//! frame rate by an [`FpsControl`], then sent to the native session. Each send drains every
//! packet the session has ready, so output follows input closely.

use super::native::{EncoderStatus, VideoCodecConfig, VideoCodecLibrary, VideoCodecSession};
use super::{VideoEncoder, VideoEncoderBase};
use crate::constants::defaults;
use crate::element::notify::Signal;
use crate::element::registry;
use crate::element::{Element, ElementState, Lifecycle, StateCell, lock};
use crate::errors::{ElementResult, EncoderError};
use crate::media::caps::{
    ChromaSampling, CompressedVideoCaps, PixelFormat, VideoCaps, VideoCodecId,
};
use crate::media::filters::{FPS_CONTROL_KEY, FpsControl, VideoConverter};
use crate::media::fraction::Fraction;
use crate::media::options::{MenuOption, OptionValue, PropertyOption};
use crate::media::packet::{Packet, PacketFlags};
use std::any::Any;
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

/// Highest speed preset the native encoders accept
const MAX_SPEED: i64 = 10;

/// AV1 `seq_level_idx` for "no level constraints"
const LEVEL_UNCONSTRAINED: u8 = 31;

/// Output pixel format for an input format
///
/// Formats AV1 can carry directly are kept, anything else becomes 4:2:0.
pub fn output_pixel_format(format: PixelFormat) -> PixelFormat {
    if format.chroma_sampling().is_some() {
        format
    } else {
        PixelFormat::Yuv420p
    }
}

/// Minimal `av1C` record derived from the raw format
///
/// Used until the native session reports its own record, which then also
/// carries the sequence header OBU.
pub fn codec_configuration_record(caps: &VideoCaps) -> Vec<u8> {
    let sampling = caps.format.chroma_sampling().unwrap_or(ChromaSampling::Cs420);
    let depth = caps.format.depth();

    let profile: u8 = match sampling {
        _ if depth == 12 => 2,
        ChromaSampling::Cs422 => 2,
        ChromaSampling::Cs444 => 1,
        ChromaSampling::Cs400 | ChromaSampling::Cs420 => 0,
    };
    let (subsampling_x, subsampling_y) = match sampling {
        ChromaSampling::Cs400 | ChromaSampling::Cs420 => (1, 1),
        ChromaSampling::Cs422 => (1, 0),
        ChromaSampling::Cs444 => (0, 0),
    };
    let monochrome = u8::from(sampling == ChromaSampling::Cs400);

    vec![
        0x81,
        (profile << 5) | LEVEL_UNCONSTRAINED,
        (u8::from(depth > 8) << 6)
            | (u8::from(depth == 12) << 5)
            | (monochrome << 4)
            | (subsampling_x << 3)
            | (subsampling_y << 2),
        0,
    ]
}

fn options() -> Vec<PropertyOption> {
    vec![
        PropertyOption::number("speed", "Speed", 0.0, 11.0, 1.0, 11.0)
            .with_help("Higher values encode faster at lower quality"),
        PropertyOption::boolean("lowLatency", "Low latency", true),
        PropertyOption::string_menu(
            "tuneContent",
            "Tune content",
            "psnr",
            vec![
                MenuOption::new("psnr", "PSNR", "psnr"),
                MenuOption::new("psychovisual", "Psychovisual", "psychovisual"),
            ],
        ),
    ]
}

#[derive(Default)]
struct VideoSession {
    initialized: bool,
    native: Option<Box<dyn VideoCodecSession>>,
    converter: VideoConverter,
    output_caps: CompressedVideoCaps,
    time_base: Fraction,
    id: i64,
    index: i32,
}

impl VideoSession {
    /// Collect every packet the session has ready
    fn drain(&mut self) -> Vec<Packet> {
        let mut packets = Vec::new();

        let Some(native) = self.native.as_mut() else {
            return packets;
        };

        loop {
            match native.receive_packet() {
                (EncoderStatus::Success, Some(encoded)) => {
                    let mut packet = Packet::new(encoded.data, self.output_caps);
                    packet.pts = encoded.pts;
                    packet.dts = encoded.pts;
                    packet.duration = 1;
                    packet.time_base = self.time_base;
                    packet.id = self.id;
                    packet.index = self.index;

                    if encoded.key_frame {
                        packet.flags |= PacketFlags::KEY_FRAME;
                    }

                    packets.push(packet);
                }
                (EncoderStatus::Encoded, _) => continue,
                (EncoderStatus::Success, None)
                | (EncoderStatus::NeedMoreData, _)
                | (EncoderStatus::LimitReached, _) => break,
                (status, _) => {
                    error!(?status, "Failed to receive packet");
                    break;
                }
            }
        }

        packets
    }
}

/// AV1 encoder element
pub struct Av1Encoder {
    state: StateCell,
    base: VideoEncoderBase,
    library: Arc<dyn VideoCodecLibrary>,
    fps_control: Arc<FpsControl>,
    session: Mutex<VideoSession>,
    output: Signal<Packet>,
}

impl Av1Encoder {
    pub const CODEC: &'static str = "rav1e";

    pub fn new(library: Arc<dyn VideoCodecLibrary>) -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let fps_control = registry::global()
                .create_as::<FpsControl>(FPS_CONTROL_KEY)
                .unwrap_or_else(|| Arc::new(FpsControl::new()));

            let weak = weak.clone();
            fps_control.output().connect(move |frame| {
                if let Some(encoder) = weak.upgrade() {
                    encoder.encode_frame(frame);
                }
            });

            Self {
                state: StateCell::new(),
                base: VideoEncoderBase::new(Self::CODEC, options()),
                library,
                fps_control,
                session: Mutex::new(VideoSession::default()),
                output: Signal::new(),
            }
        })
    }

    /// Create an encoder over the GStreamer plugins
    pub fn with_default_library() -> Arc<Self> {
        Self::new(Arc::new(super::gst::GstVideoLibrary::new()))
    }

    pub fn library_name(&self) -> &str {
        self.library.name()
    }

    fn publish(&self, packets: Vec<Packet>, header: Vec<u8>) {
        if !header.is_empty() && self.base.set_headers(header) {
            debug!("AV1 sequence header updated");
        }

        for packet in &packets {
            self.output.emit(packet);
        }
    }

    fn encode_frame(&self, src: &Packet) {
        if src.is_empty() {
            return;
        }

        let (packets, header, sent) = {
            let mut session = lock(&self.session);

            if session.native.is_none() {
                return;
            }

            session.id = src.id;
            session.index = src.index;

            let mut packets = Vec::new();
            let mut sent = false;

            loop {
                let status = match session.native.as_mut() {
                    Some(native) => native.send_frame(Some(src.data()), src.pts),
                    None => break,
                };

                let drained = session.drain();
                let progressed = !drained.is_empty();
                packets.extend(drained);

                match status {
                    EncoderStatus::Success => {
                        sent = true;
                        break;
                    }
                    EncoderStatus::EnoughData if progressed => continue,
                    EncoderStatus::EnoughData => {
                        error!("Encoder is full and produced no packets, dropping frame");
                        break;
                    }
                    status => {
                        error!(?status, "Failed to send frame");
                        break;
                    }
                }
            }

            let header = session
                .native
                .as_ref()
                .map(|native| native.sequence_header())
                .unwrap_or_default();

            (packets, header, sent)
        };

        self.publish(packets, header);

        if sent {
            self.base.set_encoded_time_pts(src.pts + src.duration);
        }
    }
}

impl Lifecycle for Av1Encoder {
    fn init(&self) -> ElementResult<()> {
        self.uninit();

        let input_caps = self.input_caps();

        if !input_caps.is_valid() {
            error!("Invalid input format");
            return Err(EncoderError::InvalidInputCaps.into());
        }

        let codec = self.codec();
        let codec_id = self.codec_id(&codec);
        let output_caps = self.output_caps();

        if codec_id == VideoCodecId::Unknown || !output_caps.is_valid() {
            error!(codec = %codec, "Unknown codec");
            return Err(EncoderError::UnknownCodec(codec).into());
        }

        let fps = output_caps.raw.fps;
        let time_base = fps.invert();
        let mut params = self.base.params();

        let speed = params
            .get("speed")
            .and_then(OptionValue::as_i64)
            .unwrap_or(MAX_SPEED)
            .clamp(0, MAX_SPEED);
        params.insert("speed".into(), OptionValue::Number(speed as f64));

        let key_frame_interval =
            ((f64::from(self.gop()) * fps.value() / 1000.0).round() as u32).max(1);

        let config = VideoCodecConfig {
            codec: codec_id,
            caps: output_caps.raw,
            time_base,
            bitrate: self.bitrate(),
            key_frame_interval,
            params,
        };

        let native = self.library.open(&config).inspect_err(|e| {
            error!(library = self.library.name(), error = %e, "Failed to open the encoder");
        })?;

        let mut header = native.sequence_header();

        if header.is_empty() {
            header = codec_configuration_record(&config.caps);
        }

        self.base.set_headers(header);

        self.fps_control.set_fps(fps);
        self.fps_control.set_fill_gaps(self.fill_gaps());
        self.fps_control.restart();
        self.fps_control.set_state(ElementState::Playing)?;

        *lock(&self.session) = VideoSession {
            initialized: true,
            native: Some(native),
            converter: VideoConverter::new(output_caps.raw),
            output_caps,
            time_base,
            id: -1,
            index: 0,
        };
        self.base.set_encoded_time_pts(0);

        info!(
            library = self.library.name(),
            caps = %config.caps,
            bitrate = config.bitrate,
            key_frame_interval,
            speed,
            "Video encoder started"
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

        if let Err(e) = self.fps_control.set_state(ElementState::Null) {
            warn!(error = %e, "Failed to stop frame rate control");
        }

        let (packets, header) = {
            let mut session = lock(&self.session);

            let header = match session.native.as_mut() {
                Some(native) => {
                    let status = native.send_frame(None, 0);

                    if status != EncoderStatus::Success {
                        warn!(?status, "Failed to flush the encoder");
                    }

                    native.sequence_header()
                }
                None => Vec::new(),
            };

            let packets = session.drain();
            session.native = None;
            (packets, header)
        };

        debug!(flushed = packets.len(), "Video encoder stopped");
        self.publish(packets, header);
        self.fps_control.restart();
    }
}

impl Element for Av1Encoder {
    fn name(&self) -> &str {
        "VideoEncoderRav1e"
    }

    fn state_cell(&self) -> &StateCell {
        &self.state
    }

    fn set_state(&self, state: ElementState) -> ElementResult<()> {
        self.state.drive(self.name(), state, self)
    }

    fn push(&self, packet: &Packet) {
        if self.state.is_paused() || packet.is_empty() {
            return;
        }

        let converter = {
            let session = lock(&self.session);

            if !session.initialized {
                return;
            }

            session.converter
        };

        if self.fps_control.discard(packet) {
            return;
        }

        if let Some(frame) = converter.convert(packet) {
            self.fps_control.push(&frame);
        }
    }

    fn output(&self) -> &Signal<Packet> {
        &self.output
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl VideoEncoder for Av1Encoder {
    fn base(&self) -> &VideoEncoderBase {
        &self.base
    }

    fn codecs(&self) -> Vec<String> {
        vec![Self::CODEC.to_string()]
    }

    fn codec_id(&self, codec: &str) -> VideoCodecId {
        if codec == Self::CODEC {
            VideoCodecId::Av1
        } else {
            VideoCodecId::Unknown
        }
    }

    fn codec_description(&self, codec: &str) -> String {
        if codec == Self::CODEC {
            "AV1 (rav1e)".to_string()
        } else {
            String::new()
        }
    }

    fn update_output_caps(&self) {
        let input = self.input_caps();
        let codec_id = self.codec_id(&self.codec());

        let caps = if !input.is_valid() || codec_id == VideoCodecId::Unknown {
            CompressedVideoCaps::default()
        } else {
            let fps = if input.fps.is_valid() && !input.fps.is_zero() {
                input.fps
            } else {
                Fraction::from_int(defaults::FPS)
            };
            let raw = VideoCaps::new(
                output_pixel_format(input.format),
                input.width,
                input.height,
                fps,
            );

            CompressedVideoCaps::new(codec_id, raw, self.bitrate())
        };

        if self.base.set_output_caps(caps) {
            debug!(caps = %caps, "Output format changed");
        }
    }
}

impl Drop for Av1Encoder {
    fn drop(&mut self) {
        self.uninit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pixel_table() {
        assert_eq!(output_pixel_format(PixelFormat::Y10), PixelFormat::Y10);
        assert_eq!(output_pixel_format(PixelFormat::Yuv444p12), PixelFormat::Yuv444p12);
        assert_eq!(output_pixel_format(PixelFormat::Nv12), PixelFormat::Yuv420p);
        assert_eq!(output_pixel_format(PixelFormat::Rgba), PixelFormat::Yuv420p);
    }

    #[test]
    fn test_configuration_record() {
        let caps = VideoCaps::new(PixelFormat::Yuv420p, 640, 480, Fraction::from_int(30));
        assert_eq!(codec_configuration_record(&caps), vec![0x81, 0x1f, 0x0c, 0x00]);

        let caps = VideoCaps::new(PixelFormat::Yuv444p10, 640, 480, Fraction::from_int(30));
        assert_eq!(codec_configuration_record(&caps), vec![0x81, 0x3f, 0x40, 0x00]);
    }

    #[test]
    fn test_zero_fps_defaults_to_thirty() {
        let encoder = Av1Encoder::new(Arc::new(super::super::gst::GstVideoLibrary::new()));
        encoder.set_input_caps(VideoCaps::new(PixelFormat::Nv12, 320, 240, Fraction::new(0, 1)));

        let output = encoder.output_caps();
        assert_eq!(output.codec, VideoCodecId::Av1);
        assert_eq!(output.raw.format, PixelFormat::Yuv420p);
        assert_eq!(output.raw.fps, Fraction::from_int(30));
    }
}
