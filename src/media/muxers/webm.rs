// SPDX-License-Identifier: GPL-3.0-only

//! WebM muxer element
//!
//! Interleaves audio and video through a [`PacketSync`] child and writes the
//! result with [`MkvSegment`]. Every setting is read when the element leaves
//! Null; changing it afterwards only affects the next recording.

use super::cues;
use super::segment::{
    AudioTrack, ClusterPolicy, ContainerWriter, MkvSegment, SegmentMode, VideoTrack,
};
use super::{FormatId, MuxerCodec, VideoMuxer, VideoMuxerBase};
use crate::constants::{app_info, defaults};
use crate::element::notify::Signal;
use crate::element::{Element, ElementState, Lifecycle, StateCell, lock, registry};
use crate::errors::{ElementResult, MuxerError};
use crate::media::caps::{AudioCodecId, CapsType, VideoCodecId};
use crate::media::options::{OptionValue, PropertyOption};
use crate::media::packet::{Packet, PacketKind};
use crate::media::sync::{PACKET_SYNC_KEY, PacketSync};
use std::any::Any;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, Weak};
use tracing::{debug, error, info, warn};

/// Registry key of the WebM muxer
pub const WEBM_MUXER_KEY: &str = "VideoMuxer/webm";

const ELEMENT_NAME: &str = "VideoMuxerWebm";

const AUDIO_CODECS: &[(AudioCodecId, &str)] = &[
    (AudioCodecId::Vorbis, "A_VORBIS"),
    (AudioCodecId::Opus, "A_OPUS"),
];

const VIDEO_CODECS: &[(VideoCodecId, &str)] = &[
    (VideoCodecId::Vp8, "V_VP8"),
    (VideoCodecId::Vp9, "V_VP9"),
    (VideoCodecId::Av1, "V_AV1"),
];

/// Matroska codec id of an audio codec, if WebM can carry it
pub fn audio_codec_id(codec: AudioCodecId) -> Option<&'static str> {
    AUDIO_CODECS
        .iter()
        .find(|(id, _)| *id == codec)
        .map(|(_, name)| *name)
}

/// Matroska codec id of a video codec, if WebM can carry it
pub fn video_codec_id(codec: VideoCodecId) -> Option<&'static str> {
    VIDEO_CODECS
        .iter()
        .find(|(id, _)| *id == codec)
        .map(|(_, name)| *name)
}

/// Option descriptors of the WebM muxer
pub fn options() -> Vec<PropertyOption> {
    vec![
        PropertyOption::boolean(
            "accurateClusterDuration",
            "Accurate cluster duration",
            false,
        )
        .with_help("Hold each frame until the next one to store its exact duration"),
        PropertyOption::boolean(
            "fixedSizeClusterTimecode",
            "Fixed size cluster timecode",
            false,
        )
        .with_help("Always write cluster timecodes with 8 bytes"),
        PropertyOption::boolean("liveMode", "Live mode", true)
            .with_help("Stream clusters with an unknown size"),
        PropertyOption::boolean("outputCues", "Output cues", true),
        PropertyOption::number(
            "maxClusterSize",
            "Maximum cluster size",
            0.0,
            f64::from(u32::MAX),
            1.0,
            0.0,
        )
        .with_help("Bytes, 0 for unlimited"),
        PropertyOption::boolean("outputCuesBlockNumber", "Output cues block number", true),
        PropertyOption::boolean("cuesBeforeClusters", "Cues before clusters", false)
            .with_help("Rewrite the file after closing so seeking works before it is fully read"),
        PropertyOption::number(
            "maxClusterDuration",
            "Maximum cluster duration",
            0.0,
            f64::from(u32::MAX),
            1.0,
            0.0,
        )
        .with_help("Nanoseconds, 0 for unlimited"),
        PropertyOption::number(
            "timeCodeScale",
            "Timecode scale",
            1.0,
            1e9,
            1.0,
            defaults::TIMECODE_SCALE as f64,
        )
        .with_help("Nanoseconds per timecode tick"),
    ]
}

/// Muxer settings taken from the resolved options
#[derive(Debug, Clone, PartialEq)]
struct WebmSettings {
    policy: ClusterPolicy,
    cues_before_clusters: bool,
    timecode_scale: u64,
}

impl WebmSettings {
    fn from_options(values: &BTreeMap<String, OptionValue>) -> Self {
        let flag = |name: &str, default: bool| {
            values
                .get(name)
                .and_then(OptionValue::as_bool)
                .unwrap_or(default)
        };
        let number = |name: &str, default: u64| {
            values
                .get(name)
                .and_then(OptionValue::as_f64)
                .map(|value| value.max(0.0) as u64)
                .unwrap_or(default)
        };

        let mode = if flag("liveMode", true) {
            SegmentMode::Live
        } else {
            SegmentMode::File
        };

        Self {
            policy: ClusterPolicy {
                mode,
                output_cues: flag("outputCues", true),
                cues_block_number: flag("outputCuesBlockNumber", true),
                accurate_cluster_duration: flag("accurateClusterDuration", false),
                fixed_size_cluster_timecode: flag("fixedSizeClusterTimecode", false),
                max_cluster_size: number("maxClusterSize", 0),
                max_cluster_duration: number("maxClusterDuration", 0),
            },
            cues_before_clusters: flag("cuesBeforeClusters", false),
            timecode_scale: number("timeCodeScale", defaults::TIMECODE_SCALE).max(1),
        }
    }
}

struct OpenSegment {
    segment: MkvSegment<BufWriter<File>>,
    video_track: u64,
    audio_track: Option<u64>,
    settings: WebmSettings,
}

#[derive(Default)]
struct MuxSession {
    initialized: bool,
    segment: Option<MkvSegment<BufWriter<File>>>,
    location: PathBuf,
    audio_track: Option<u64>,
    video_track: u64,
    /// Seconds, end of the last written packet
    audio_duration: f64,
    video_duration: f64,
    cues_before_clusters: bool,
}

impl MuxSession {
    fn write(&mut self, packet: &Packet) {
        let is_audio = packet.kind().is_audio();
        let track = if is_audio {
            self.audio_track
        } else {
            Some(self.video_track)
        };

        let (Some(segment), Some(track)) = (self.segment.as_mut(), track) else {
            return;
        };

        let key = match packet.kind() {
            PacketKind::VideoCompressed => packet.is_key_frame(),
            _ => true,
        };
        let timestamp_ns = (packet.pts_seconds() * 1e9).round().max(0.0) as u64;

        if let Err(e) = segment.add_frame(packet.data(), track, timestamp_ns, key) {
            error!(track, pts = packet.pts, error = %e, "Failed to write the frame");
        }

        let end = (packet.pts + packet.duration) as f64 * packet.time_base.value();

        if is_audio {
            self.audio_duration = end;
        } else {
            self.video_duration = end;
        }
    }
}

/// Writes compressed audio and video into a WebM file
pub struct WebmMuxer {
    state: StateCell,
    base: VideoMuxerBase,
    packet_sync: Arc<PacketSync>,
    session: Mutex<MuxSession>,
    output: Signal<Packet>,
}

impl WebmMuxer {
    pub fn new() -> Arc<Self> {
        Arc::new_cyclic(|weak: &Weak<Self>| {
            let packet_sync = registry::global()
                .create_as::<PacketSync>(PACKET_SYNC_KEY)
                .unwrap_or_else(|| Arc::new(PacketSync::new()));

            let weak = weak.clone();
            packet_sync.output().connect(move |packet| {
                if let Some(muxer) = weak.upgrade() {
                    muxer.packet_ready(packet);
                }
            });

            Self {
                state: StateCell::new(),
                base: VideoMuxerBase::new(options()),
                packet_sync,
                session: Mutex::new(MuxSession::default()),
                output: Signal::new(),
            }
        })
    }

    fn packet_ready(&self, packet: &Packet) {
        lock(&self.session).write(packet);
    }

    /// Open the output and add the tracks
    fn open_segment(&self, location: &Path) -> Result<OpenSegment, MuxerError> {
        let video_caps = self
            .stream_caps(CapsType::Video)
            .as_compressed_video()
            .copied()
            .filter(|caps| caps.is_valid())
            .ok_or(MuxerError::NoVideoFormat)?;
        let video_codec = video_codec_id(video_caps.codec)
            .ok_or(MuxerError::UnsupportedVideoCodec(video_caps.codec))?;

        let audio = match self
            .stream_caps(CapsType::Audio)
            .as_compressed_audio()
            .copied()
            .filter(|caps| caps.is_valid())
        {
            Some(caps) => {
                let codec = audio_codec_id(caps.codec)
                    .ok_or(MuxerError::UnsupportedAudioCodec(caps.codec))?;
                Some((caps, codec))
            }
            None => None,
        };

        if location.as_os_str().is_empty() {
            return Err(MuxerError::OpenFailed {
                location: String::new(),
                reason: "no output location set".to_string(),
            });
        }

        let file = File::create(location).map_err(|e| MuxerError::OpenFailed {
            location: location.display().to_string(),
            reason: e.to_string(),
        })?;

        let mut segment = MkvSegment::new(BufWriter::new(file));
        let settings = WebmSettings::from_options(&self.base.option_store().resolved());

        let mut build = || -> Result<(u64, Option<u64>), MuxerError> {
            segment.init()?;
            segment.set_policy(settings.policy.clone());
            segment.set_timecode_scale(settings.timecode_scale);
            segment.set_writing_app(app_info::APP_NAME);

            let video_track = segment.add_video_track(VideoTrack {
                name: "Video".to_string(),
                language: "und".to_string(),
                codec_id: video_codec.to_string(),
                width: video_caps.raw.width,
                height: video_caps.raw.height,
                frame_rate: video_caps.raw.fps.value(),
            })?;

            let headers = self.stream_headers(CapsType::Video);

            if !headers.is_empty() {
                segment.set_codec_private(video_track, &headers)?;
            }

            let audio_track = match audio {
                Some((caps, codec)) => {
                    let track = segment.add_audio_track(AudioTrack {
                        name: "Audio".to_string(),
                        language: "und".to_string(),
                        codec_id: codec.to_string(),
                        bit_depth: caps.raw.bps(),
                        channels: caps.raw.channels(),
                        sample_rate: f64::from(caps.raw.rate),
                    })?;

                    let headers = self.stream_headers(CapsType::Audio);

                    if !headers.is_empty() {
                        segment.set_codec_private(track, &headers)?;
                    }

                    Some(track)
                }
                None => None,
            };

            Ok((video_track, audio_track))
        };

        match build() {
            Ok((video_track, audio_track)) => Ok(OpenSegment {
                segment,
                video_track,
                audio_track,
                settings,
            }),
            Err(e) => {
                drop(segment);

                if let Err(remove) = fs::remove_file(location) {
                    warn!(location = %location.display(), error = %remove, "Failed to remove the partial file");
                }

                Err(e)
            }
        }
    }

    /// Overall duration in seconds
    fn total_duration(&self, session: &MuxSession) -> f64 {
        let audio = match self.stream_caps(CapsType::Audio).as_compressed_audio() {
            Some(caps) if self.stream_duration(CapsType::Audio) > 0 && caps.raw.rate > 0 => {
                self.stream_duration(CapsType::Audio) as f64 / f64::from(caps.raw.rate)
            }
            _ => session.audio_duration,
        };

        let video = match self.stream_caps(CapsType::Video).as_compressed_video() {
            Some(caps) if self.stream_duration(CapsType::Video) > 0 && caps.raw.fps.value() > 0.0 => {
                self.stream_duration(CapsType::Video) as f64 / caps.raw.fps.value()
            }
            _ => session.video_duration,
        };

        if session.audio_track.is_some() {
            audio.max(video)
        } else {
            video
        }
    }
}

impl Lifecycle for WebmMuxer {
    fn init(&self) -> ElementResult<()> {
        self.uninit();

        let location = PathBuf::from(self.location());
        let OpenSegment {
            segment,
            video_track,
            audio_track,
            settings,
        } = self
            .open_segment(&location)
            .inspect_err(|e| error!(muxer = ELEMENT_NAME, error = %e, "Failed to start muxing"))?;

        *lock(&self.session) = MuxSession {
            initialized: true,
            segment: Some(segment),
            location: location.clone(),
            audio_track,
            video_track,
            audio_duration: 0.0,
            video_duration: 0.0,
            cues_before_clusters: settings.cues_before_clusters,
        };

        self.packet_sync.set_audio_enabled(audio_track.is_some());
        self.packet_sync.set_discard_last(false);

        if let Err(e) = self.packet_sync.set_state(ElementState::Playing) {
            drop(std::mem::take(&mut *lock(&self.session)));
            let _ = fs::remove_file(&location);
            error!(muxer = ELEMENT_NAME, error = %e, "Failed to start the packet synchronizer");

            return Err(MuxerError::NoPacketSync.into());
        }

        info!(
            muxer = ELEMENT_NAME,
            location = %location.display(),
            audio = audio_track.is_some(),
            timecode_scale = settings.timecode_scale,
            "Starting WebM muxing"
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

        // Flushes the queued packets through packet_ready
        if let Err(e) = self.packet_sync.set_state(ElementState::Null) {
            warn!(muxer = ELEMENT_NAME, error = %e, "Failed to stop the packet synchronizer");
        }

        let mut session = std::mem::take(&mut *lock(&self.session));
        let duration = self.total_duration(&session);

        let Some(mut segment) = session.segment.take() else {
            return;
        };

        let ticks = (duration * 1e9 / segment.timecode_scale() as f64).round();
        segment.set_duration(ticks);

        match segment.finalize() {
            Ok(()) => debug!(muxer = ELEMENT_NAME, duration, "Segment finalized"),
            Err(e) => error!(muxer = ELEMENT_NAME, error = %e, "Finalization of segment failed"),
        }

        drop(segment.into_inner());

        if session.cues_before_clusters {
            match cues::move_cues_before_clusters(&session.location) {
                Ok(true) => debug!(muxer = ELEMENT_NAME, "Cues moved before clusters"),
                Ok(false) => {}
                Err(e) => error!(muxer = ELEMENT_NAME, error = %e, "Failed to move the cues"),
            }
        }

        info!(
            muxer = ELEMENT_NAME,
            location = %session.location.display(),
            duration,
            "WebM muxing stopped"
        );
    }
}

impl Element for WebmMuxer {
    fn name(&self) -> &str {
        ELEMENT_NAME
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

        self.packet_sync.push(packet);
    }

    /// Muxers are sinks; nothing is emitted here
    fn output(&self) -> &Signal<Packet> {
        &self.output
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl VideoMuxer for WebmMuxer {
    fn base(&self) -> &VideoMuxerBase {
        &self.base
    }

    fn format_id(&self) -> FormatId {
        FormatId::Webm
    }

    fn extension(&self) -> String {
        "webm".to_string()
    }

    fn description(&self) -> String {
        "Webm (libwebm)".to_string()
    }

    fn supported_codecs(&self, caps_type: CapsType) -> Vec<MuxerCodec> {
        let audio = AUDIO_CODECS.iter().map(|(id, _)| MuxerCodec::Audio(*id));
        let video = VIDEO_CODECS.iter().map(|(id, _)| MuxerCodec::Video(*id));

        match caps_type {
            CapsType::Audio => audio.collect(),
            CapsType::Video => video.collect(),
            CapsType::Unknown => audio.chain(video).collect(),
        }
    }
}

impl Drop for WebmMuxer {
    fn drop(&mut self) {
        self.uninit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::caps::{
        AudioCaps, Caps, CompressedAudioCaps, CompressedVideoCaps, PixelFormat, SampleFormat,
        VideoCaps,
    };
    use crate::media::fraction::Fraction;
    use crate::media::muxers::probe;
    use crate::media::packet::PacketFlags;

    fn video_caps(codec: VideoCodecId) -> CompressedVideoCaps {
        CompressedVideoCaps::new(
            codec,
            VideoCaps::new(PixelFormat::Yuv420p, 320, 240, Fraction::new(30, 1)),
            0,
        )
    }

    fn video_packet(caps: CompressedVideoCaps, pts: i64, key: bool) -> Packet {
        let mut packet = Packet::new(vec![0u8; 64], Caps::CompressedVideo(caps));
        packet.pts = pts;
        packet.duration = 1;
        packet.time_base = Fraction::new(1, 30);
        packet.id = 7;
        if key {
            packet.flags = PacketFlags::KEY_FRAME;
        }
        packet
    }

    #[test]
    fn test_codec_tables() {
        let muxer = WebmMuxer::new();

        assert_eq!(video_codec_id(VideoCodecId::Av1), Some("V_AV1"));
        assert_eq!(audio_codec_id(AudioCodecId::Aac), None);
        assert_eq!(muxer.supported_codecs(CapsType::Unknown).len(), 5);
        assert_eq!(
            muxer.default_codec(CapsType::Audio),
            Some(MuxerCodec::Audio(AudioCodecId::Vorbis))
        );
        assert!(!muxer.gaps_allowed(CapsType::Audio));
        assert!(muxer.gaps_allowed(CapsType::Video));
        assert_eq!(muxer.extension(), "webm");
    }

    #[test]
    fn test_settings_from_defaults() {
        let muxer = WebmMuxer::new();
        let settings = WebmSettings::from_options(&muxer.base().option_store().resolved());

        assert_eq!(settings.policy, ClusterPolicy::default());
        assert_eq!(settings.timecode_scale, 100_000);
        assert!(!settings.cues_before_clusters);

        muxer.set_option_value("liveMode", false.into());
        let settings = WebmSettings::from_options(&muxer.base().option_store().resolved());
        assert_eq!(settings.policy.mode, SegmentMode::File);
    }

    #[test]
    fn test_init_requires_video() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.webm");
        let muxer = WebmMuxer::new();
        muxer.set_location(path.to_str().unwrap());

        let err = muxer.set_state(ElementState::Playing).unwrap_err();
        assert!(err.to_string().contains("No valid video format set"));
        assert_eq!(muxer.state(), ElementState::Null);
        assert!(!path.exists());
    }

    #[test]
    fn test_unsupported_audio_codec() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.webm");
        let muxer = WebmMuxer::new();
        muxer.set_location(path.to_str().unwrap());
        muxer.set_stream_caps(Caps::CompressedVideo(video_caps(VideoCodecId::Av1)));
        muxer.set_stream_caps(Caps::CompressedAudio(CompressedAudioCaps::new(
            AudioCodecId::Aac,
            AudioCaps::interleaved(SampleFormat::S16, 2, 48000),
            128_000,
        )));

        assert!(muxer.set_state(ElementState::Paused).is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_video_only_recording() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video.webm");
        let caps = video_caps(VideoCodecId::Av1);

        let muxer = WebmMuxer::new();
        muxer.set_location(path.to_str().unwrap());
        muxer.set_stream_caps(Caps::CompressedVideo(caps));
        muxer.set_stream_headers(CapsType::Video, vec![0x81, 0x00, 0x0C, 0x00]);
        muxer.set_state(ElementState::Playing).unwrap();

        for pts in 0..60 {
            muxer.push(&video_packet(caps, pts, pts % 30 == 0));
        }

        muxer.set_state(ElementState::Null).unwrap();

        let info = probe::probe_file(&path).unwrap();
        assert_eq!(info.doc_type, "webm");
        assert_eq!(info.tracks.len(), 1);
        assert_eq!(info.tracks[0].codec_id, "V_AV1");
        assert_eq!(info.tracks[0].codec_private, vec![0x81, 0x00, 0x0C, 0x00]);
        assert_eq!(info.blocks.len(), 60);
        assert_eq!(info.cues.len(), 2);
        assert!(info.cue_positions_resolve());
        assert!((info.duration_seconds() - 2.0).abs() < 0.01);
    }

    #[test]
    fn test_paused_drops_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("paused.webm");
        let caps = video_caps(VideoCodecId::Vp9);

        let muxer = WebmMuxer::new();
        muxer.set_location(path.to_str().unwrap());
        muxer.set_stream_caps(Caps::CompressedVideo(caps));
        muxer.set_state(ElementState::Paused).unwrap();

        muxer.push(&video_packet(caps, 0, true));
        muxer.set_state(ElementState::Null).unwrap();

        let info = probe::probe_file(&path).unwrap();
        assert!(info.blocks.is_empty());
    }

    #[test]
    fn test_uninit_without_init() {
        let muxer = WebmMuxer::new();
        muxer.uninit();
        assert_eq!(muxer.state(), ElementState::Null);
    }
}
