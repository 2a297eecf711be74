// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer-backed codec sessions
//!
//! Each session is a small `appsrc ! <encoder> ! appsink` pipeline. The
//! encoder plugin is picked from a priority list at open time, so whichever
//! of the candidates is installed gets used:
//!
//! - AAC: `faac`, `avenc_aac`, `voaacenc`
//! - Opus: `opusenc`
//! - AV1: `rav1enc`, `svtav1enc`, `av1enc`
//!
//! Encoding runs on the pipeline's streaming thread. `encode`/`send_frame`
//! push input and collect whatever output is already available; flushing
//! sends end-of-stream and waits for the rest.

use super::native::{
    AudioCodecConfig, AudioCodecLibrary, AudioCodecSession, EncodedVideoPacket, EncoderStatus,
    VideoCodecConfig, VideoCodecLibrary, VideoCodecSession,
};
use crate::constants::timeouts;
use crate::errors::EncoderError;
use crate::media::caps::{AudioCodecId, VideoCodecId};
use crate::media::fraction::Fraction;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use tracing::{debug, info, warn};

/// AAC frame length in samples per channel
const AAC_FRAME_SAMPLES: usize = 1024;

/// Plugin candidates per audio codec, in priority order
fn audio_candidates(codec: AudioCodecId) -> &'static [&'static str] {
    match codec {
        AudioCodecId::Aac => &["faac", "avenc_aac", "voaacenc"],
        AudioCodecId::Opus => &["opusenc"],
        _ => &[],
    }
}

/// Plugin candidates per video codec, in priority order
fn video_candidates(codec: VideoCodecId) -> &'static [&'static str] {
    match codec {
        VideoCodecId::Av1 => &["rav1enc", "svtav1enc", "av1enc"],
        _ => &[],
    }
}

/// Set a property from its string form if the element has it
fn set_if_present(element: &gst::Element, name: &str, value: &str) {
    if element.find_property(name).is_some() {
        element.set_property_from_str(name, value);
        debug!(element = %element.name(), property = name, value, "Set encoder property");
    }
}

fn init_gstreamer() -> Result<(), EncoderError> {
    gst::init().map_err(|e| EncoderError::Unavailable(format!("GStreamer init failed: {}", e)))
}

/// `appsrc ! encoder [! parser] ! appsink` with helpers to feed and drain it
struct AppPipeline {
    pipeline: gst::Pipeline,
    appsrc: gst_app::AppSrc,
    appsink: gst_app::AppSink,
    eos_sent: bool,
}

impl AppPipeline {
    /// Build the pipeline around `encoder`; `configure` runs before start
    fn launch(
        input_caps: &str,
        encoder: &str,
        output_caps: &str,
        configure: impl FnOnce(&gst::Element),
    ) -> Result<Self, EncoderError> {
        let description = format!(
            "appsrc name=src format=time ! {} name=enc ! {} ! appsink name=sink sync=false",
            encoder, output_caps
        );

        let pipeline = gst::parse::launch(&description)
            .map_err(|e| EncoderError::Unavailable(format!("{}: {}", encoder, e)))?
            .downcast::<gst::Pipeline>()
            .map_err(|_| EncoderError::OpenFailed("Failed to downcast to Pipeline".into()))?;

        let appsrc = pipeline
            .by_name("src")
            .ok_or_else(|| EncoderError::OpenFailed("Failed to find appsrc".into()))?
            .downcast::<gst_app::AppSrc>()
            .map_err(|_| EncoderError::OpenFailed("Failed to downcast to AppSrc".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .ok_or_else(|| EncoderError::OpenFailed("Failed to find appsink".into()))?
            .downcast::<gst_app::AppSink>()
            .map_err(|_| EncoderError::OpenFailed("Failed to downcast to AppSink".into()))?;

        let caps = input_caps
            .parse::<gst::Caps>()
            .map_err(|e| EncoderError::Configure(format!("Bad input caps {}: {}", input_caps, e)))?;
        appsrc.set_caps(Some(&caps));
        appsrc.set_format(gst::Format::Time);

        if let Some(element) = pipeline.by_name("enc") {
            configure(&element);
        }

        pipeline.set_state(gst::State::Playing).map_err(|e| {
            let _ = pipeline.set_state(gst::State::Null);
            EncoderError::OpenFailed(format!("{}: {:?}", encoder, e))
        })?;

        Ok(Self {
            pipeline,
            appsrc,
            appsink,
            eos_sent: false,
        })
    }

    /// Open the first candidate that builds and starts
    fn launch_first(
        candidates: &[&str],
        input_caps: &str,
        output_caps: &str,
        configure: impl Fn(&str, &gst::Element),
    ) -> Result<(Self, String), EncoderError> {
        init_gstreamer()?;

        let mut last_error = EncoderError::Unavailable("No encoder candidates".into());

        for &candidate in candidates {
            if gst::ElementFactory::find(candidate).is_none() {
                debug!(encoder = candidate, "Encoder plugin not installed");
                continue;
            }

            match Self::launch(input_caps, candidate, output_caps, |e| configure(candidate, e)) {
                Ok(pipeline) => return Ok((pipeline, candidate.to_string())),
                Err(e) => {
                    warn!(encoder = candidate, error = %e, "Encoder plugin failed to start");
                    last_error = e;
                }
            }
        }

        Err(last_error)
    }

    /// Surface an error posted on the bus since the last check
    fn check_bus(&self) -> Result<(), EncoderError> {
        let Some(bus) = self.pipeline.bus() else {
            return Ok(());
        };

        if let Some(msg) = bus.pop_filtered(&[gst::MessageType::Error]) {
            if let gst::MessageView::Error(err) = msg.view() {
                return Err(EncoderError::EncodeFailed(err.error().to_string()));
            }
        }

        Ok(())
    }

    fn push(&self, data: &[u8], pts_ns: u64, duration_ns: u64) -> Result<(), EncoderError> {
        let mut buffer = gst::Buffer::from_slice(data.to_vec());
        {
            let buffer = buffer.make_mut();
            buffer.set_pts(gst::ClockTime::from_nseconds(pts_ns));
            buffer.set_duration(gst::ClockTime::from_nseconds(duration_ns));
        }

        self.appsrc
            .push_buffer(buffer)
            .map_err(|e| EncoderError::EncodeFailed(format!("push_buffer: {:?}", e)))?;

        self.check_bus()
    }

    /// Next sample, waiting up to `timeout`
    fn pull(&self, timeout: gst::ClockTime) -> Option<gst::Sample> {
        if self.appsink.is_eos() {
            return None;
        }

        self.appsink.try_pull_sample(timeout)
    }

    fn end_of_stream(&mut self) {
        if !self.eos_sent {
            self.eos_sent = true;
            let _ = self.appsrc.end_of_stream();
        }
    }

    fn drain_timeout(&self) -> gst::ClockTime {
        if self.eos_sent {
            gst::ClockTime::from_seconds(timeouts::STATE_CHANGE_SECS)
        } else {
            gst::ClockTime::ZERO
        }
    }
}

impl Drop for AppPipeline {
    fn drop(&mut self) {
        let _ = self.pipeline.set_state(gst::State::Null);
    }
}

fn sample_bytes(sample: &gst::Sample) -> Option<(Vec<u8>, Option<gst::ClockTime>, bool)> {
    let buffer = sample.buffer()?;
    let map = buffer.map_readable().ok()?;
    let key_frame = !buffer.flags().contains(gst::BufferFlags::DELTA_UNIT);

    Some((map.as_slice().to_vec(), buffer.pts(), key_frame))
}

fn codec_data(sample: &gst::Sample) -> Option<Vec<u8>> {
    let caps = sample.caps()?;
    let structure = caps.structure(0)?;
    let buffer = structure.get::<gst::Buffer>("codec_data").ok()?;
    let map = buffer.map_readable().ok()?;

    Some(map.as_slice().to_vec())
}

/// Audio codecs through GStreamer encoder plugins
#[derive(Debug, Default)]
pub struct GstAudioLibrary;

impl GstAudioLibrary {
    pub fn new() -> Self {
        Self
    }
}

fn configure_audio(plugin: &str, element: &gst::Element, config: &AudioCodecConfig) {
    set_if_present(element, "bitrate", &config.bitrate.to_string());

    if plugin == "opusenc" {
        let audio_type = match config.param("application").and_then(|v| v.as_str()) {
            Some("voip") => "voice",
            Some("lowdelay") => "restricted-lowdelay",
            _ => "generic",
        };
        set_if_present(element, "audio-type", audio_type);

        if let Some(ms) = config.param("frameDuration").and_then(|v| v.as_f64()) {
            set_if_present(element, "frame-size", &ms.to_string());
        }
    }
}

fn aac_output_caps(config: &AudioCodecConfig) -> String {
    let mpeg_version = match config.param("mpegVersion").and_then(|v| v.as_i64()) {
        Some(1) => 2,
        _ => 4,
    };
    let stream_format = match config.param("outputFormat").and_then(|v| v.as_i64()) {
        Some(1) => "adts",
        _ => "raw",
    };

    format!(
        "audio/mpeg,mpegversion={},stream-format={}",
        mpeg_version, stream_format
    )
}

impl AudioCodecLibrary for GstAudioLibrary {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn open(&self, config: &AudioCodecConfig) -> Result<Box<dyn AudioCodecSession>, EncoderError> {
        if !config.caps.is_valid() {
            return Err(EncoderError::InvalidInputCaps);
        }

        let (output_caps, input_samples) = match config.codec {
            AudioCodecId::Aac => (aac_output_caps(config), AAC_FRAME_SAMPLES),
            AudioCodecId::Opus => {
                let ms = config
                    .param("frameDuration")
                    .and_then(|v| v.as_f64())
                    .unwrap_or(20.0);
                let samples = (ms * f64::from(config.caps.rate) / 1000.0).round() as usize;
                ("audio/x-opus".to_string(), samples.max(1))
            }
            other => return Err(EncoderError::Unavailable(format!("No plugin for {}", other))),
        };

        let (pipeline, plugin) = AppPipeline::launch_first(
            audio_candidates(config.codec),
            &config.caps.to_gst_caps_string(),
            &output_caps,
            |plugin, element| configure_audio(plugin, element, config),
        )?;

        info!(plugin = %plugin, codec = %config.codec, "Opened GStreamer audio encoder");

        Ok(Box::new(GstAudioSession {
            pipeline,
            rate: u64::from(config.caps.rate),
            input_samples,
            sent_samples: 0,
        }))
    }
}

struct GstAudioSession {
    pipeline: AppPipeline,
    rate: u64,
    input_samples: usize,
    sent_samples: u64,
}

impl GstAudioSession {
    fn samples_to_ns(&self, samples: u64) -> u64 {
        samples * 1_000_000_000 / self.rate.max(1)
    }

    fn collect(&self) -> Vec<Vec<u8>> {
        let timeout = self.pipeline.drain_timeout();
        let mut chunks = Vec::new();

        while let Some(sample) = self.pipeline.pull(timeout) {
            if let Some((data, _, _)) = sample_bytes(&sample) {
                chunks.push(data);
            }
        }

        chunks
    }
}

impl AudioCodecSession for GstAudioSession {
    fn input_samples(&self) -> usize {
        self.input_samples
    }

    fn encode(&mut self, data: &[u8], samples: usize) -> Result<Vec<Vec<u8>>, EncoderError> {
        if data.is_empty() {
            return Err(EncoderError::EmptyInput);
        }

        let pts = self.samples_to_ns(self.sent_samples);
        let duration = self.samples_to_ns(samples as u64);
        self.pipeline.push(data, pts, duration)?;
        self.sent_samples += samples as u64;

        Ok(self.collect())
    }

    fn flush(&mut self) -> Result<Vec<Vec<u8>>, EncoderError> {
        self.pipeline.end_of_stream();
        let chunks = self.collect();
        self.pipeline.check_bus()?;

        Ok(chunks)
    }
}

/// Video codecs through GStreamer encoder plugins
#[derive(Debug, Default)]
pub struct GstVideoLibrary;

impl GstVideoLibrary {
    pub fn new() -> Self {
        Self
    }
}

fn configure_video(plugin: &str, element: &gst::Element, config: &VideoCodecConfig) {
    let speed = config
        .param("speed")
        .and_then(|v| v.as_i64())
        .unwrap_or(10)
        .clamp(0, 10);
    let low_latency = config
        .param("lowLatency")
        .and_then(|v| v.as_bool())
        .unwrap_or(true);
    let kbps = (config.bitrate / 1000).max(1).to_string();
    let interval = config.key_frame_interval.to_string();

    match plugin {
        "rav1enc" => {
            set_if_present(element, "speed-preset", &speed.to_string());
            set_if_present(element, "low-latency", &low_latency.to_string());
            set_if_present(element, "bitrate", &config.bitrate.to_string());
            set_if_present(element, "max-key-frame-interval", &interval);

            if let Some(tune) = config.param("tuneContent").and_then(|v| v.as_str()) {
                set_if_present(element, "tune", tune);
            }
        }
        "svtav1enc" => {
            // SVT presets run 0..13, faster upwards like rav1e speeds
            set_if_present(element, "preset", &(speed + 3).min(13).to_string());
            set_if_present(element, "target-bitrate", &kbps);
            set_if_present(element, "intra-period-length", &interval);
        }
        _ => {
            set_if_present(element, "cpu-used", &(speed.min(8)).to_string());
            set_if_present(element, "target-bitrate", &kbps);
            set_if_present(element, "keyframe-max-dist", &interval);

            if low_latency {
                set_if_present(element, "lag-in-frames", "0");
            }
        }
    }
}

impl VideoCodecLibrary for GstVideoLibrary {
    fn name(&self) -> &str {
        "gstreamer"
    }

    fn open(&self, config: &VideoCodecConfig) -> Result<Box<dyn VideoCodecSession>, EncoderError> {
        if !config.caps.is_valid() {
            return Err(EncoderError::InvalidInputCaps);
        }

        let candidates = video_candidates(config.codec);

        if candidates.is_empty() {
            return Err(EncoderError::Unavailable(format!(
                "No plugin for {}",
                config.codec
            )));
        }

        let (pipeline, plugin) = AppPipeline::launch_first(
            candidates,
            &config.caps.to_gst_caps_string(),
            "video/x-av1,stream-format=obu-stream,alignment=tu",
            |plugin, element| configure_video(plugin, element, config),
        )?;

        info!(plugin = %plugin, codec = %config.codec, "Opened GStreamer video encoder");

        Ok(Box::new(GstVideoSession {
            pipeline,
            time_base: config.time_base,
            sequence_header: Vec::new(),
        }))
    }
}

struct GstVideoSession {
    pipeline: AppPipeline,
    time_base: Fraction,
    sequence_header: Vec<u8>,
}

impl GstVideoSession {
    fn ticks_to_ns(&self, ticks: i64) -> u64 {
        (ticks.max(0) as f64 * self.time_base.value() * 1e9).round() as u64
    }

    fn ns_to_ticks(&self, ns: u64) -> i64 {
        let tick = self.time_base.value();

        if tick <= 0.0 {
            return 0;
        }

        (ns as f64 / 1e9 / tick).round() as i64
    }
}

impl VideoCodecSession for GstVideoSession {
    fn sequence_header(&self) -> Vec<u8> {
        self.sequence_header.clone()
    }

    fn send_frame(&mut self, frame: Option<&[u8]>, pts: i64) -> EncoderStatus {
        let Some(frame) = frame else {
            self.pipeline.end_of_stream();
            return EncoderStatus::Success;
        };

        if frame.is_empty() {
            return EncoderStatus::Failure;
        }

        match self
            .pipeline
            .push(frame, self.ticks_to_ns(pts), self.ticks_to_ns(1))
        {
            Ok(()) => EncoderStatus::Success,
            Err(e) => {
                warn!(error = %e, "Video encoder rejected the frame");
                EncoderStatus::Failure
            }
        }
    }

    fn receive_packet(&mut self) -> (EncoderStatus, Option<EncodedVideoPacket>) {
        let Some(sample) = self.pipeline.pull(self.pipeline.drain_timeout()) else {
            let status = if self.pipeline.eos_sent {
                EncoderStatus::LimitReached
            } else {
                EncoderStatus::NeedMoreData
            };
            return (status, None);
        };

        if let Some(header) = codec_data(&sample) {
            self.sequence_header = header;
        }

        match sample_bytes(&sample) {
            Some((data, pts, key_frame)) => {
                let pts = pts.map(|t| self.ns_to_ticks(t.nseconds())).unwrap_or(0);
                (
                    EncoderStatus::Success,
                    Some(EncodedVideoPacket {
                        data,
                        key_frame,
                        pts,
                    }),
                )
            }
            None => (EncoderStatus::Encoded, None),
        }
    }
}
