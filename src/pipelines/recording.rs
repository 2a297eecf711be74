// SPDX-License-Identifier: GPL-3.0-only

//! Recording host
//!
//! Wires raw audio and video into their encoders and the encoders into a
//! muxer. Raw packets are accepted only while a recording is running.
//!
//! ```text
//!   raw video ──> VideoEncoder ──┐
//!                                ├──> VideoMuxer ──> {dir}/Video {time}.webm
//!   raw audio ──> AudioEncoder ──┘
//! ```
//!
//! Leaving Null for Paused only marks the host paused; a recording starts
//! on Null → Playing and is finalized on the way back to Null.

use crate::config::Config;
use crate::constants::{defaults, file_formats};
use crate::element::notify::{HandlerId, Signal};
use crate::element::{Element, ElementState, Lifecycle, StateCell, Transition, lock, registry};
use crate::errors::{ElementResult, PipelineError};
use crate::media::caps::{AudioCaps, Caps, CapsType, VideoCaps};
use crate::media::encoders::{
    AAC_ENCODER_KEY, AV1_ENCODER_KEY, AacEncoder, AudioEncoder, Av1Encoder, OPUS_ENCODER_KEY,
    OpusEncoder, VideoEncoder,
};
use crate::media::muxers::{MuxerCodec, VideoMuxer, WEBM_MUXER_KEY, WebmMuxer};
use crate::media::options::OptionValue;
use crate::media::packet::{Packet, PacketKind};
use std::any::Any;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, error, info, warn};

/// What to record and how
#[derive(Debug, Clone, PartialEq)]
pub struct RecordingSettings {
    pub video_directory: PathBuf,
    pub video_caps: VideoCaps,
    /// Invalid caps disable audio
    pub audio_caps: AudioCaps,
    pub record_audio: bool,
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    /// Key frame interval in milliseconds
    pub video_gop: u32,
    pub muxer_options: BTreeMap<String, OptionValue>,
    pub video_codec_options: BTreeMap<String, OptionValue>,
    pub audio_codec_options: BTreeMap<String, OptionValue>,
}

impl Default for RecordingSettings {
    fn default() -> Self {
        Self {
            video_directory: PathBuf::new(),
            video_caps: VideoCaps::default(),
            audio_caps: AudioCaps::default(),
            record_audio: false,
            video_bitrate: defaults::VIDEO_BITRATE,
            audio_bitrate: defaults::AUDIO_BITRATE,
            video_gop: defaults::GOP_MS,
            muxer_options: BTreeMap::new(),
            video_codec_options: BTreeMap::new(),
            audio_codec_options: BTreeMap::new(),
        }
    }
}

impl RecordingSettings {
    /// Settings from the user configuration and the source formats
    pub fn from_config(config: &Config, video_caps: VideoCaps, audio_caps: AudioCaps) -> Self {
        Self {
            video_directory: config.video_directory.clone(),
            video_caps,
            audio_caps,
            record_audio: config.record_audio,
            video_bitrate: config.video_bitrate,
            audio_bitrate: config.audio_bitrate,
            video_gop: config.video_gop,
            muxer_options: config.muxer_options.clone(),
            video_codec_options: config.video_codec_options.clone(),
            audio_codec_options: config.audio_codec_options.clone(),
        }
    }
}

/// Registry key of the encoder for a codec name
pub fn encoder_key(codec: &str) -> Option<&'static str> {
    match codec {
        "av1" | "rav1e" => Some(AV1_ENCODER_KEY),
        "aac" | "faac" => Some(AAC_ENCODER_KEY),
        "opus" => Some(OPUS_ENCODER_KEY),
        _ => None,
    }
}

/// Registry key of the muxer for a container format
pub fn muxer_key(format: &str) -> Option<&'static str> {
    match format {
        "webm" => Some(WEBM_MUXER_KEY),
        _ => None,
    }
}

pub fn create_video_encoder(key: &str) -> Option<Arc<dyn VideoEncoder>> {
    match key {
        AV1_ENCODER_KEY => registry::global()
            .create_as::<Av1Encoder>(key)
            .map(|encoder| encoder as Arc<dyn VideoEncoder>),
        _ => None,
    }
}

pub fn create_audio_encoder(key: &str) -> Option<Arc<dyn AudioEncoder>> {
    match key {
        AAC_ENCODER_KEY => registry::global()
            .create_as::<AacEncoder>(key)
            .map(|encoder| encoder as Arc<dyn AudioEncoder>),
        OPUS_ENCODER_KEY => registry::global()
            .create_as::<OpusEncoder>(key)
            .map(|encoder| encoder as Arc<dyn AudioEncoder>),
        _ => None,
    }
}

pub fn create_muxer(key: &str) -> Option<Arc<dyn VideoMuxer>> {
    match key {
        WEBM_MUXER_KEY => registry::global()
            .create_as::<WebmMuxer>(key)
            .map(|muxer| muxer as Arc<dyn VideoMuxer>),
        _ => None,
    }
}

/// Signal handlers installed for one recording
#[derive(Debug, Default)]
struct Connections {
    video_output: Option<HandlerId>,
    video_headers: Option<HandlerId>,
    audio_output: Option<HandlerId>,
    audio_headers: Option<HandlerId>,
}

#[derive(Debug, Default)]
struct RecordingSession {
    recording: bool,
    /// Whether this recording includes the audio encoder
    with_audio: bool,
    connections: Connections,
    location: Option<PathBuf>,
}

/// Drives one muxer and its encoders
pub struct Recording {
    state: StateCell,
    settings: Mutex<RecordingSettings>,
    muxer: Arc<dyn VideoMuxer>,
    video_encoder: Arc<dyn VideoEncoder>,
    audio_encoder: Option<Arc<dyn AudioEncoder>>,
    session: Mutex<RecordingSession>,
    output: Signal<Packet>,
}

impl Recording {
    /// A host over explicit elements
    pub fn with_elements(
        settings: RecordingSettings,
        muxer: Arc<dyn VideoMuxer>,
        video_encoder: Arc<dyn VideoEncoder>,
        audio_encoder: Option<Arc<dyn AudioEncoder>>,
    ) -> Self {
        Self {
            state: StateCell::new(),
            settings: Mutex::new(settings),
            muxer,
            video_encoder,
            audio_encoder,
            session: Mutex::new(RecordingSession::default()),
            output: Signal::new(),
        }
    }

    /// A host over the registry elements named in `config`
    pub fn from_config(
        config: &Config,
        video_caps: VideoCaps,
        audio_caps: AudioCaps,
    ) -> Result<Self, PipelineError> {
        let unknown = |what: &str, name: &str| {
            PipelineError::Registry(format!("No {} available for {}", what, name))
        };

        let muxer = muxer_key(&config.video_format)
            .and_then(create_muxer)
            .ok_or_else(|| unknown("muxer", &config.video_format))?;
        let video_encoder = encoder_key(&config.video_codec)
            .and_then(create_video_encoder)
            .ok_or_else(|| unknown("video encoder", &config.video_codec))?;

        let audio_encoder = if config.record_audio {
            let encoder = encoder_key(&config.audio_codec).and_then(create_audio_encoder);

            if encoder.is_none() {
                warn!(codec = %config.audio_codec, "No audio encoder available, recording video only");
            }

            encoder
        } else {
            None
        };

        let settings = RecordingSettings::from_config(config, video_caps, audio_caps);

        Ok(Self::with_elements(settings, muxer, video_encoder, audio_encoder))
    }

    pub fn settings(&self) -> RecordingSettings {
        lock(&self.settings).clone()
    }

    /// New settings apply to the next recording
    pub fn set_settings(&self, settings: RecordingSettings) {
        *lock(&self.settings) = settings;
    }

    pub fn muxer(&self) -> &Arc<dyn VideoMuxer> {
        &self.muxer
    }

    pub fn is_recording(&self) -> bool {
        lock(&self.session).recording
    }

    /// Path of the current or last recording
    pub fn location(&self) -> Option<PathBuf> {
        lock(&self.session).location.clone()
    }

    /// `{dir}/Video {yyyy-MM-dd hh-mm-ss}.{ext}`
    pub fn recording_path(directory: &Path, extension: &str) -> PathBuf {
        let timestamp = chrono::Local::now().format(file_formats::RECORDING_TIMESTAMP);

        directory.join(format!(
            "{} {}.{}",
            file_formats::RECORDING_PREFIX,
            timestamp,
            extension
        ))
    }

    /// The audio encoder if this recording can carry its codec
    fn usable_audio_encoder(&self, settings: &RecordingSettings) -> Option<&Arc<dyn AudioEncoder>> {
        if !settings.record_audio || !settings.audio_caps.is_valid() {
            return None;
        }

        let encoder = self.audio_encoder.as_ref()?;
        let codec = encoder.codec_id(&encoder.codec());
        let supported = self
            .muxer
            .supported_codecs(CapsType::Audio)
            .contains(&MuxerCodec::Audio(codec));

        if !supported {
            warn!(
                codec = %codec,
                muxer = self.muxer.name(),
                "Audio codec not supported by the muxer, recording video only"
            );
            return None;
        }

        Some(encoder)
    }

    fn configure(&self, settings: &RecordingSettings, audio: Option<&Arc<dyn AudioEncoder>>) -> Connections {
        let muxer = &self.muxer;
        let mut connections = Connections::default();

        muxer.reset_options();
        for (name, value) in &settings.muxer_options {
            muxer.set_option_value(name, value.clone());
        }

        for caps_type in [CapsType::Audio, CapsType::Video] {
            muxer.reset_stream_caps(caps_type);
            muxer.set_stream_headers(caps_type, Vec::new());
            muxer.set_stream_duration(caps_type, 0);
        }

        let video = &self.video_encoder;
        video.reset_options();
        for (name, value) in &settings.video_codec_options {
            video.set_option_value(name, value.clone());
        }

        video.set_input_caps(settings.video_caps);
        video.set_bitrate(settings.video_bitrate);
        video.set_gop(settings.video_gop);
        video.set_fill_gaps(!muxer.gaps_allowed(CapsType::Video));
        muxer.set_stream_caps(Caps::CompressedVideo(video.output_caps()));
        muxer.set_stream_bitrate(CapsType::Video, video.bitrate());

        let sink = Arc::clone(muxer);
        connections.video_output = Some(video.output().connect(move |packet| sink.push(packet)));
        let sink = Arc::clone(muxer);
        connections.video_headers = Some(video.headers_changed().connect(move |headers| {
            sink.set_stream_headers(CapsType::Video, headers.clone());
        }));

        if let Some(audio) = audio {
            audio.reset_options();
            for (name, value) in &settings.audio_codec_options {
                audio.set_option_value(name, value.clone());
            }

            audio.set_input_caps(settings.audio_caps);
            audio.set_bitrate(settings.audio_bitrate);
            audio.set_fill_gaps(!muxer.gaps_allowed(CapsType::Audio));
            muxer.set_stream_caps(Caps::CompressedAudio(audio.output_caps()));
            muxer.set_stream_bitrate(CapsType::Audio, audio.bitrate());

            let sink = Arc::clone(muxer);
            connections.audio_output = Some(audio.output().connect(move |packet| sink.push(packet)));
            let sink = Arc::clone(muxer);
            connections.audio_headers = Some(audio.headers_changed().connect(move |headers| {
                sink.set_stream_headers(CapsType::Audio, headers.clone());
            }));
        }

        connections
    }

    fn disconnect(&self, connections: &Connections) {
        if let Some(id) = connections.video_output {
            self.video_encoder.output().disconnect(id);
        }

        if let Some(id) = connections.video_headers {
            self.video_encoder.headers_changed().disconnect(id);
        }

        if let Some(audio) = &self.audio_encoder {
            if let Some(id) = connections.audio_output {
                audio.output().disconnect(id);
            }

            if let Some(id) = connections.audio_headers {
                audio.headers_changed().disconnect(id);
            }
        }
    }

    /// Bring every element back to Null after a failed start
    fn abort(&self, connections: &Connections, audio: Option<&Arc<dyn AudioEncoder>>) {
        if let Some(audio) = audio {
            let _ = audio.set_state(ElementState::Null);
        }

        let _ = self.video_encoder.set_state(ElementState::Null);
        let _ = self.muxer.set_state(ElementState::Null);
        self.disconnect(connections);
    }

    fn start_elements(&self, audio: Option<&Arc<dyn AudioEncoder>>) -> ElementResult<()> {
        if let Some(audio) = audio {
            audio.set_state(ElementState::Paused)?;
            self.muxer
                .set_stream_headers(CapsType::Audio, audio.headers());
        }

        self.video_encoder.set_state(ElementState::Paused)?;
        self.muxer
            .set_stream_headers(CapsType::Video, self.video_encoder.headers());

        self.muxer.set_state(ElementState::Playing)?;

        if let Some(audio) = audio {
            audio.set_state(ElementState::Playing)?;
        }

        self.video_encoder.set_state(ElementState::Playing)
    }
}

impl Lifecycle for Recording {
    fn init(&self) -> ElementResult<()> {
        self.uninit();

        let settings = self.settings();
        info!(
            video = %settings.video_caps,
            audio = %settings.audio_caps,
            record_audio = settings.record_audio,
            video_bitrate = settings.video_bitrate,
            audio_bitrate = settings.audio_bitrate,
            gop = settings.video_gop,
            "Starting recording"
        );

        fs::create_dir_all(&settings.video_directory).map_err(|e| {
            error!(directory = %settings.video_directory.display(), error = %e, "Failed to create the directory");
            PipelineError::Io(format!(
                "Failed to create {}: {}",
                settings.video_directory.display(),
                e
            ))
        })?;

        let location = Self::recording_path(&settings.video_directory, &self.muxer.extension());
        self.muxer.set_location(&location.to_string_lossy());

        let audio = self.usable_audio_encoder(&settings);
        let connections = self.configure(&settings, audio);

        if let Err(e) = self.start_elements(audio) {
            error!(error = %e, "Failed to start recording");
            self.abort(&connections, audio);

            return Err(e);
        }

        *lock(&self.session) = RecordingSession {
            recording: true,
            with_audio: audio.is_some(),
            connections,
            location: Some(location.clone()),
        };

        info!(location = %location.display(), "Recording started");

        Ok(())
    }

    fn uninit(&self) {
        let (connections, with_audio) = {
            let mut session = lock(&self.session);

            if !session.recording {
                return;
            }

            session.recording = false;
            (std::mem::take(&mut session.connections), session.with_audio)
        };

        info!("Stopping recording");

        if let Err(e) = self.video_encoder.set_state(ElementState::Null) {
            warn!(error = %e, "Failed to stop the video encoder");
        }

        let video_duration = self.video_encoder.encoded_time_pts();
        let fps = self.video_encoder.output_caps().raw.fps.value();
        let video_time = if fps > 0.0 {
            video_duration as f64 / fps
        } else {
            0.0
        };

        let mut audio_duration = 0;
        let mut audio_time = 0.0;

        if let Some(audio) = self.audio_encoder.as_ref().filter(|_| with_audio) {
            if let Err(e) = audio.set_state(ElementState::Null) {
                warn!(error = %e, "Failed to stop the audio encoder");
            }

            audio_duration = audio.encoded_time_pts();
            let rate = audio.output_caps().raw.rate;

            if rate > 0 {
                audio_time = audio_duration as f64 / f64::from(rate);
            }
        }

        if audio_duration > 0 {
            self.muxer.set_stream_duration(CapsType::Audio, audio_duration);
        }

        if video_duration > 0 {
            self.muxer.set_stream_duration(CapsType::Video, video_duration);
        }

        if let Err(e) = self.muxer.set_state(ElementState::Null) {
            warn!(error = %e, "Failed to stop the muxer");
        }

        self.disconnect(&connections);

        info!(
            duration = audio_time.max(video_time),
            audio = audio_time,
            video = video_time,
            "Recording stopped"
        );
    }

    fn plan(&self, from: ElementState, to: ElementState) -> Transition {
        match (from, to) {
            // Only marks the host paused; nothing is recorded
            (ElementState::Null, ElementState::Paused) => Transition::Pause,
            _ => crate::element::plan(from, to),
        }
    }
}

impl Element for Recording {
    fn name(&self) -> &str {
        "Recording"
    }

    fn state_cell(&self) -> &StateCell {
        &self.state
    }

    fn set_state(&self, state: ElementState) -> ElementResult<()> {
        self.state.drive(self.name(), state, self)
    }

    fn push(&self, packet: &Packet) {
        if self.state.is_paused() {
            return;
        }

        let with_audio = {
            let session = lock(&self.session);

            if !session.recording {
                return;
            }

            session.with_audio
        };

        match packet.kind() {
            PacketKind::Audio if with_audio => {
                if let Some(audio) = &self.audio_encoder {
                    audio.push(packet);
                }
            }
            PacketKind::Video => self.video_encoder.push(packet),
            kind => debug!(?kind, "Recording ignores packet"),
        }
    }

    /// The host produces no packets of its own
    fn output(&self) -> &Signal<Packet> {
        &self.output
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Drop for Recording {
    fn drop(&mut self) {
        self.uninit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::caps::{
        AudioCodecId, CompressedAudioCaps, CompressedVideoCaps, PixelFormat, SampleFormat,
        VideoCodecId,
    };
    use crate::media::encoders::{AudioEncoderBase, VideoEncoderBase};
    use crate::media::fraction::Fraction;
    use crate::media::muxers::probe_file;
    use crate::media::packet::PacketFlags;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Emits one 32-byte frame per input frame, a key frame every 30
    struct FakeVideoEncoder {
        state: StateCell,
        base: VideoEncoderBase,
        output: Signal<Packet>,
        pushed: AtomicUsize,
    }

    impl FakeVideoEncoder {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                state: StateCell::new(),
                base: VideoEncoderBase::new("av1", Vec::new()),
                output: Signal::new(),
                pushed: AtomicUsize::new(0),
            })
        }
    }

    impl Lifecycle for FakeVideoEncoder {
        fn init(&self) -> ElementResult<()> {
            self.base.set_headers(vec![0x81, 0x00, 0x0C, 0x00]);
            self.base.set_encoded_time_pts(0);
            Ok(())
        }

        fn uninit(&self) {}
    }

    impl Element for FakeVideoEncoder {
        fn name(&self) -> &str {
            "FakeVideoEncoder"
        }

        fn state_cell(&self) -> &StateCell {
            &self.state
        }

        fn set_state(&self, state: ElementState) -> ElementResult<()> {
            self.state.drive(self.name(), state, self)
        }

        fn push(&self, packet: &Packet) {
            if self.state.is_paused() {
                return;
            }

            self.pushed.fetch_add(1, Ordering::SeqCst);

            let mut out = Packet::new(vec![0u8; 32], Caps::CompressedVideo(self.output_caps()));
            out.pts = packet.pts;
            out.dts = packet.pts;
            out.duration = 1;
            out.time_base = packet.time_base;
            out.id = 1;
            if packet.pts % 30 == 0 {
                out.flags = PacketFlags::KEY_FRAME;
            }

            self.base.set_encoded_time_pts(packet.pts + 1);
            self.output.emit(&out);
        }

        fn output(&self) -> &Signal<Packet> {
            &self.output
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    impl VideoEncoder for FakeVideoEncoder {
        fn base(&self) -> &VideoEncoderBase {
            &self.base
        }

        fn codecs(&self) -> Vec<String> {
            vec!["av1".to_string()]
        }

        fn codec_id(&self, _codec: &str) -> VideoCodecId {
            VideoCodecId::Av1
        }

        fn codec_description(&self, _codec: &str) -> String {
            "AV1".to_string()
        }

        fn update_output_caps(&self) {
            self.base.set_output_caps(CompressedVideoCaps::new(
                VideoCodecId::Av1,
                self.input_caps(),
                self.bitrate(),
            ));
        }
    }

    /// Counts packets and emits nothing
    struct FakeAudioEncoder {
        state: StateCell,
        base: AudioEncoderBase,
        codec: AudioCodecId,
        output: Signal<Packet>,
        pushed: AtomicUsize,
    }

    impl FakeAudioEncoder {
        fn new(codec: AudioCodecId) -> Arc<Self> {
            Arc::new(Self {
                state: StateCell::new(),
                base: AudioEncoderBase::new("fake", Vec::new()),
                codec,
                output: Signal::new(),
                pushed: AtomicUsize::new(0),
            })
        }
    }

    impl Lifecycle for FakeAudioEncoder {
        fn init(&self) -> ElementResult<()> {
            Ok(())
        }

        fn uninit(&self) {}
    }

    impl Element for FakeAudioEncoder {
        fn name(&self) -> &str {
            "FakeAudioEncoder"
        }

        fn state_cell(&self) -> &StateCell {
            &self.state
        }

        fn set_state(&self, state: ElementState) -> ElementResult<()> {
            self.state.drive(self.name(), state, self)
        }

        fn push(&self, _packet: &Packet) {
            self.pushed.fetch_add(1, Ordering::SeqCst);
        }

        fn output(&self) -> &Signal<Packet> {
            &self.output
        }

        fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    impl AudioEncoder for FakeAudioEncoder {
        fn base(&self) -> &AudioEncoderBase {
            &self.base
        }

        fn codecs(&self) -> Vec<String> {
            vec!["fake".to_string()]
        }

        fn codec_id(&self, _codec: &str) -> AudioCodecId {
            self.codec
        }

        fn codec_description(&self, _codec: &str) -> String {
            "Fake".to_string()
        }

        fn update_output_caps(&self) {
            self.base.set_output_caps(CompressedAudioCaps::new(
                self.codec,
                self.input_caps(),
                self.bitrate(),
            ));
        }
    }

    fn settings(dir: &Path, record_audio: bool) -> RecordingSettings {
        RecordingSettings {
            video_directory: dir.to_path_buf(),
            video_caps: VideoCaps::new(PixelFormat::Yuv420p, 64, 48, Fraction::new(30, 1)),
            audio_caps: AudioCaps::interleaved(SampleFormat::S16, 2, 48000),
            record_audio,
            ..RecordingSettings::default()
        }
    }

    fn raw_video(caps: VideoCaps, pts: i64) -> Packet {
        let mut packet = Packet::new(vec![0u8; caps.frame_size()], caps);
        packet.pts = pts;
        packet.duration = 1;
        packet.time_base = Fraction::new(1, 30);
        packet.id = pts;
        packet
    }

    fn raw_audio(caps: AudioCaps) -> Packet {
        let mut packet = Packet::new(vec![0u8; 1600 * caps.frame_bytes()], caps);
        packet.duration = 1600;
        packet.time_base = Fraction::new(1, i64::from(caps.rate));
        packet
    }

    #[test]
    fn test_keys() {
        assert_eq!(encoder_key("opus"), Some(OPUS_ENCODER_KEY));
        assert_eq!(encoder_key("av1"), Some(AV1_ENCODER_KEY));
        assert_eq!(encoder_key("h264"), None);
        assert_eq!(muxer_key("webm"), Some(WEBM_MUXER_KEY));
        assert_eq!(muxer_key("mp4"), None);
    }

    #[test]
    fn test_video_only_recording() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(&dir.path().join("videos"), false);
        let caps = settings.video_caps;
        let video = FakeVideoEncoder::new();
        let recording =
            Recording::with_elements(settings, WebmMuxer::new(), video.clone(), None);

        recording.set_state(ElementState::Playing).unwrap();
        assert!(recording.is_recording());

        for pts in 0..30 {
            recording.push(&raw_video(caps, pts));
        }

        let location = recording.location().unwrap();
        recording.set_state(ElementState::Null).unwrap();

        assert!(!recording.is_recording());
        assert_eq!(video.pushed.load(Ordering::SeqCst), 30);
        assert_eq!(video.output().handler_count(), 0);

        let info = probe_file(&location).unwrap();
        assert_eq!(info.tracks.len(), 1);
        assert!(info.tracks[0].is_video());
        assert_eq!(info.tracks[0].codec_private, vec![0x81, 0x00, 0x0C, 0x00]);
        assert_eq!(info.blocks.len(), 30);
        assert!((info.duration_seconds() - 1.0).abs() < 0.05);
    }

    #[test]
    fn test_unsupported_audio_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), true);
        let caps = settings.audio_caps;
        let video = FakeVideoEncoder::new();
        let audio = FakeAudioEncoder::new(AudioCodecId::Aac);
        let recording = Recording::with_elements(
            settings,
            WebmMuxer::new(),
            video.clone(),
            Some(audio.clone()),
        );

        recording.set_state(ElementState::Playing).unwrap();
        recording.push(&raw_audio(caps));
        recording.push(&raw_video(recording.settings().video_caps, 0));
        recording.set_state(ElementState::Null).unwrap();

        assert_eq!(audio.pushed.load(Ordering::SeqCst), 0);
        assert_eq!(audio.state(), ElementState::Null);
        assert_eq!(video.pushed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_supported_audio_is_routed() {
        let dir = tempfile::tempdir().unwrap();
        let settings = settings(dir.path(), true);
        let caps = settings.audio_caps;
        let audio = FakeAudioEncoder::new(AudioCodecId::Opus);
        let recording = Recording::with_elements(
            settings,
            WebmMuxer::new(),
            FakeVideoEncoder::new(),
            Some(audio.clone()),
        );

        recording.set_state(ElementState::Playing).unwrap();
        assert_eq!(audio.state(), ElementState::Playing);
        assert!(audio.fill_gaps());

        recording.push(&raw_audio(caps));
        recording.push(&raw_audio(caps));
        recording.set_state(ElementState::Null).unwrap();

        assert_eq!(audio.pushed.load(Ordering::SeqCst), 2);
        assert_eq!(audio.output().handler_count(), 0);
    }

    #[test]
    fn test_null_to_paused_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let directory = dir.path().join("never");
        let video = FakeVideoEncoder::new();
        let recording = Recording::with_elements(
            settings(&directory, false),
            WebmMuxer::new(),
            video.clone(),
            None,
        );

        recording.set_state(ElementState::Paused).unwrap();
        assert_eq!(recording.state(), ElementState::Paused);
        assert!(!recording.is_recording());

        recording.set_state(ElementState::Playing).unwrap();
        recording.push(&raw_video(recording.settings().video_caps, 0));
        recording.set_state(ElementState::Null).unwrap();

        assert_eq!(video.pushed.load(Ordering::SeqCst), 0);
        assert!(!directory.exists());
    }


    #[test]
    fn test_recording_path() {
        let path = Recording::recording_path(Path::new("/tmp/videos"), "webm");
        let name = path.file_name().unwrap().to_string_lossy().into_owned();

        assert!(name.starts_with("Video "));
        assert!(name.ends_with(".webm"));
        // "Video " + "yyyy-MM-dd hh-mm-ss" + ".webm"
        assert_eq!(name.len(), 6 + 19 + 5);
    }
}
