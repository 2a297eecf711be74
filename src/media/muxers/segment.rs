// SPDX-License-Identifier: GPL-3.0-only

//! Matroska segment writer
//!
//! [`MkvSegment`] writes a WebM file front to back over any seekable sink.
//! The EBML header, the Segment header and a reserved SeekHead slot are
//! written by [`MkvSegment::init`]; Info and Tracks follow with the first
//! frame so codec private data can still change until then. Everything
//! whose value is only known at the end (segment size, duration, SeekHead)
//! is patched in place by [`ContainerWriter::finalize`].

use super::cues::{self, CuePoint};
use super::ebml::{self, ids};
use crate::constants::app_info;
use crate::errors::MuxerError;
use std::collections::BTreeMap;
use std::io::{self, Seek, SeekFrom, Write};
use tracing::{debug, warn};

/// Bytes kept free after the Segment header for the SeekHead
const SEEK_HEAD_RESERVED: u64 = 96;

/// Width of every size field patched after the fact
const PATCHED_SIZE_WIDTH: usize = 8;

/// Seek pre-roll Opus decoders need, in nanoseconds
const OPUS_SEEK_PRE_ROLL_NS: u64 = 80_000_000;

const TRACK_TYPE_VIDEO: u64 = 1;
const TRACK_TYPE_AUDIO: u64 = 2;

#[derive(Debug, Clone, PartialEq)]
pub struct VideoTrack {
    pub name: String,
    pub language: String,
    pub codec_id: String,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub name: String,
    pub language: String,
    pub codec_id: String,
    pub bit_depth: u32,
    pub channels: u32,
    pub sample_rate: f64,
}

/// How clusters are written
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SegmentMode {
    /// Clusters are streamed with an unknown size and patched on close
    #[default]
    Live,
    /// Clusters are buffered and written with their final size
    File,
}

/// Cluster and cue policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterPolicy {
    pub mode: SegmentMode,
    pub output_cues: bool,
    pub cues_block_number: bool,
    /// Hold each frame until the next one on its track to record its duration
    pub accurate_cluster_duration: bool,
    /// Write cluster timecodes as 8-byte integers
    pub fixed_size_cluster_timecode: bool,
    /// Bytes, 0 for unlimited
    pub max_cluster_size: u64,
    /// Nanoseconds, 0 for unlimited
    pub max_cluster_duration: u64,
}

impl Default for ClusterPolicy {
    fn default() -> Self {
        Self {
            mode: SegmentMode::Live,
            output_cues: true,
            cues_block_number: true,
            accurate_cluster_duration: false,
            fixed_size_cluster_timecode: false,
            max_cluster_size: 0,
            max_cluster_duration: 0,
        }
    }
}

/// Sink for muxed tracks
pub trait ContainerWriter {
    /// Returns the new track number
    fn add_video_track(&mut self, track: VideoTrack) -> Result<u64, MuxerError>;

    /// Returns the new track number
    fn add_audio_track(&mut self, track: AudioTrack) -> Result<u64, MuxerError>;

    fn set_codec_private(&mut self, track: u64, data: &[u8]) -> Result<(), MuxerError>;

    fn add_frame(
        &mut self,
        data: &[u8],
        track: u64,
        timestamp_ns: u64,
        key: bool,
    ) -> Result<(), MuxerError>;

    /// Segment duration in timecode ticks
    fn set_duration(&mut self, duration: f64);

    fn finalize(&mut self) -> Result<(), MuxerError>;
}

#[derive(Debug, Clone, PartialEq)]
enum TrackKind {
    Video(VideoTrack),
    Audio(AudioTrack),
}

#[derive(Debug, Clone)]
struct TrackEntry {
    number: u64,
    kind: TrackKind,
    codec_private: Vec<u8>,
}

impl TrackEntry {
    fn is_video(&self) -> bool {
        matches!(self.kind, TrackKind::Video(_))
    }

    fn encode(&self) -> io::Result<Vec<u8>> {
        let mut entry = Vec::new();
        ebml::write_uint(&mut entry, ids::TRACK_NUMBER, self.number)?;
        ebml::write_uint(&mut entry, ids::TRACK_UID, self.number)?;
        ebml::write_uint(&mut entry, ids::FLAG_LACING, 0)?;

        match &self.kind {
            TrackKind::Video(video) => {
                ebml::write_uint(&mut entry, ids::TRACK_TYPE, TRACK_TYPE_VIDEO)?;
                ebml::write_string(&mut entry, ids::NAME, &video.name)?;
                ebml::write_string(&mut entry, ids::LANGUAGE, &video.language)?;
                ebml::write_string(&mut entry, ids::CODEC_ID, &video.codec_id)?;
                self.write_codec_private(&mut entry)?;

                if video.frame_rate > 0.0 {
                    let frame_ns = (1e9 / video.frame_rate).round() as u64;
                    ebml::write_uint(&mut entry, ids::DEFAULT_DURATION, frame_ns)?;
                }

                let mut settings = Vec::new();
                ebml::write_uint(&mut settings, ids::PIXEL_WIDTH, u64::from(video.width))?;
                ebml::write_uint(&mut settings, ids::PIXEL_HEIGHT, u64::from(video.height))?;

                if video.frame_rate > 0.0 {
                    ebml::write_float(&mut settings, ids::FRAME_RATE, video.frame_rate)?;
                }

                ebml::write_element(&mut entry, ids::VIDEO, &settings)?;
            }
            TrackKind::Audio(audio) => {
                ebml::write_uint(&mut entry, ids::TRACK_TYPE, TRACK_TYPE_AUDIO)?;
                ebml::write_string(&mut entry, ids::NAME, &audio.name)?;
                ebml::write_string(&mut entry, ids::LANGUAGE, &audio.language)?;
                ebml::write_string(&mut entry, ids::CODEC_ID, &audio.codec_id)?;
                self.write_codec_private(&mut entry)?;

                if audio.codec_id == "A_OPUS" {
                    ebml::write_uint(&mut entry, ids::SEEK_PRE_ROLL, OPUS_SEEK_PRE_ROLL_NS)?;
                }

                let mut settings = Vec::new();
                ebml::write_float(&mut settings, ids::SAMPLING_FREQUENCY, audio.sample_rate)?;
                ebml::write_uint(&mut settings, ids::CHANNELS, u64::from(audio.channels))?;

                if audio.bit_depth > 0 {
                    ebml::write_uint(&mut settings, ids::BIT_DEPTH, u64::from(audio.bit_depth))?;
                }

                ebml::write_element(&mut entry, ids::AUDIO, &settings)?;
            }
        }

        Ok(entry)
    }

    fn write_codec_private(&self, entry: &mut Vec<u8>) -> io::Result<()> {
        if !self.codec_private.is_empty() {
            ebml::write_element(entry, ids::CODEC_PRIVATE, &self.codec_private)?;
        }

        Ok(())
    }
}

#[derive(Debug)]
struct Frame {
    data: Vec<u8>,
    track: u64,
    /// Ticks of the timecode scale
    timecode: u64,
    key: bool,
    duration: Option<u64>,
}

#[derive(Debug)]
struct Cluster {
    /// Absolute offset of the Cluster ID
    position: u64,
    timecode: u64,
    blocks: u64,
    payload_size: u64,
    /// Payload held back in file mode
    buffer: Vec<u8>,
}

/// WebM segment over a seekable sink
pub struct MkvSegment<W: Write + Seek> {
    writer: W,
    policy: ClusterPolicy,
    timecode_scale: u64,
    writing_app: String,
    tracks: Vec<TrackEntry>,
    initialized: bool,
    headers_written: bool,
    finalized: bool,
    segment_size_pos: u64,
    segment_data_start: u64,
    seek_head_pos: u64,
    info_pos: u64,
    tracks_pos: u64,
    duration_pos: u64,
    duration: Option<f64>,
    last_timecode: u64,
    cluster: Option<Cluster>,
    pending: BTreeMap<u64, Frame>,
    cues: Vec<CuePoint>,
}

impl<W: Write + Seek> MkvSegment<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer,
            policy: ClusterPolicy::default(),
            timecode_scale: crate::constants::defaults::TIMECODE_SCALE,
            writing_app: app_info::APP_NAME.to_string(),
            tracks: Vec::new(),
            initialized: false,
            headers_written: false,
            finalized: false,
            segment_size_pos: 0,
            segment_data_start: 0,
            seek_head_pos: 0,
            info_pos: 0,
            tracks_pos: 0,
            duration_pos: 0,
            duration: None,
            last_timecode: 0,
            cluster: None,
            pending: BTreeMap::new(),
            cues: Vec::new(),
        }
    }

    /// Write the EBML header, the Segment header and the SeekHead slot
    pub fn init(&mut self) -> Result<(), MuxerError> {
        self.write_preamble()
            .map_err(|e| MuxerError::SegmentInit(e.to_string()))?;
        self.initialized = true;

        Ok(())
    }

    /// Takes effect for clusters opened after the call
    pub fn set_policy(&mut self, policy: ClusterPolicy) {
        self.policy = policy;
    }

    pub fn timecode_scale(&self) -> u64 {
        self.timecode_scale
    }

    /// Nanoseconds per tick; ignored once the headers are out
    pub fn set_timecode_scale(&mut self, scale: u64) {
        if self.headers_written {
            warn!("Timecode scale changed after the segment info was written");
            return;
        }

        self.timecode_scale = scale.max(1);
    }

    pub fn set_writing_app(&mut self, app: &str) {
        self.writing_app = app.to_string();
    }

    pub fn cues(&self) -> &[CuePoint] {
        &self.cues
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    pub fn into_inner(self) -> W {
        self.writer
    }

    fn position(&mut self) -> io::Result<u64> {
        self.writer.stream_position()
    }

    fn has_video(&self) -> bool {
        self.tracks.iter().any(TrackEntry::is_video)
    }

    fn track(&self, number: u64) -> Option<&TrackEntry> {
        self.tracks.iter().find(|track| track.number == number)
    }

    fn write_preamble(&mut self) -> io::Result<()> {
        let mut header = Vec::new();
        ebml::write_uint(&mut header, ids::EBML_VERSION, 1)?;
        ebml::write_uint(&mut header, ids::EBML_READ_VERSION, 1)?;
        ebml::write_uint(&mut header, ids::EBML_MAX_ID_LENGTH, 4)?;
        ebml::write_uint(&mut header, ids::EBML_MAX_SIZE_LENGTH, 8)?;
        ebml::write_string(&mut header, ids::DOC_TYPE, "webm")?;
        ebml::write_uint(&mut header, ids::DOC_TYPE_VERSION, 4)?;
        ebml::write_uint(&mut header, ids::DOC_TYPE_READ_VERSION, 2)?;
        ebml::write_element(&mut self.writer, ids::EBML, &header)?;

        ebml::write_id(&mut self.writer, ids::SEGMENT)?;
        self.segment_size_pos = self.position()?;
        ebml::write_unknown_size(&mut self.writer, PATCHED_SIZE_WIDTH)?;
        self.segment_data_start = self.position()?;

        self.seek_head_pos = self.segment_data_start;
        ebml::write_void(&mut self.writer, SEEK_HEAD_RESERVED)?;

        Ok(())
    }

    /// Info and Tracks, once
    fn ensure_headers(&mut self) -> io::Result<()> {
        if self.headers_written {
            return Ok(());
        }

        let mut info = Vec::new();
        ebml::write_uint(&mut info, ids::TIMECODE_SCALE, self.timecode_scale)?;
        ebml::write_string(&mut info, ids::MUXING_APP, app_info::APP_NAME)?;
        ebml::write_string(&mut info, ids::WRITING_APP, &self.writing_app)?;
        let duration_offset = info.len() as u64;
        ebml::write_float(&mut info, ids::DURATION, 0.0)?;

        self.info_pos = self.position()?;
        let header_size = ebml::id_length(ids::INFO) + ebml::vint_length(info.len() as u64);
        ebml::write_element(&mut self.writer, ids::INFO, &info)?;
        // Duration ID (2 bytes) and size (1 byte) precede the float
        self.duration_pos = self.info_pos + header_size as u64 + duration_offset + 3;

        let mut tracks = Vec::new();

        for track in &self.tracks {
            ebml::write_element(&mut tracks, ids::TRACK_ENTRY, &track.encode()?)?;
        }

        self.tracks_pos = self.position()?;
        ebml::write_element(&mut self.writer, ids::TRACKS, &tracks)?;
        self.headers_written = true;

        debug!(
            tracks = self.tracks.len(),
            timecode_scale = self.timecode_scale,
            "Segment headers written"
        );

        Ok(())
    }

    fn open_cluster(&mut self, timecode: u64) -> io::Result<()> {
        let position = self.position()?;
        let mut timecode_element = Vec::new();

        if self.policy.fixed_size_cluster_timecode {
            ebml::write_fixed_uint(&mut timecode_element, ids::TIMECODE, timecode)?;
        } else {
            ebml::write_uint(&mut timecode_element, ids::TIMECODE, timecode)?;
        }

        let mut cluster = Cluster {
            position,
            timecode,
            blocks: 0,
            payload_size: timecode_element.len() as u64,
            buffer: Vec::new(),
        };

        match self.policy.mode {
            SegmentMode::Live => {
                ebml::write_id(&mut self.writer, ids::CLUSTER)?;
                ebml::write_unknown_size(&mut self.writer, PATCHED_SIZE_WIDTH)?;
                self.writer.write_all(&timecode_element)?;
            }
            SegmentMode::File => cluster.buffer = timecode_element,
        }

        self.cluster = Some(cluster);
        Ok(())
    }

    fn close_cluster(&mut self) -> io::Result<()> {
        let Some(cluster) = self.cluster.take() else {
            return Ok(());
        };

        if cluster.buffer.is_empty() {
            // Streamed: patch the unknown size
            let end = self.position()?;
            self.writer.seek(SeekFrom::Start(
                cluster.position + ebml::id_length(ids::CLUSTER) as u64,
            ))?;
            self.writer
                .write_all(&ebml::encode_vint(cluster.payload_size, PATCHED_SIZE_WIDTH)?)?;
            self.writer.seek(SeekFrom::Start(end))?;
        } else {
            ebml::write_element(&mut self.writer, ids::CLUSTER, &cluster.buffer)?;
        }

        Ok(())
    }

    fn needs_new_cluster(&self, frame: &Frame, is_video: bool) -> bool {
        let Some(cluster) = &self.cluster else {
            return true;
        };

        let relative = frame.timecode as i64 - cluster.timecode as i64;

        if relative > i64::from(i16::MAX) || relative < i64::from(i16::MIN) {
            return true;
        }

        if is_video && frame.key && cluster.blocks > 0 {
            return true;
        }

        let max_duration = self.policy.max_cluster_duration;

        if max_duration > 0
            && frame.timecode.saturating_sub(cluster.timecode) * self.timecode_scale
                >= max_duration
        {
            return true;
        }

        let max_size = self.policy.max_cluster_size;

        max_size > 0
            && cluster.blocks > 0
            && cluster.payload_size + frame.data.len() as u64 > max_size
    }

    fn write_frame(&mut self, frame: Frame) -> io::Result<()> {
        let is_video = self.track(frame.track).is_some_and(TrackEntry::is_video);

        if self.needs_new_cluster(&frame, is_video) {
            self.close_cluster()?;
            self.open_cluster(frame.timecode)?;
        }

        let has_video = self.has_video();
        let segment_data_start = self.segment_data_start;
        let output_cues = self.policy.output_cues;
        let cues_block_number = self.policy.cues_block_number;

        let Some(cluster) = self.cluster.as_mut() else {
            return Ok(());
        };

        let relative = (frame.timecode as i64 - cluster.timecode as i64) as i16;
        let mut block = Vec::with_capacity(frame.data.len() + 4);
        ebml::write_vint(&mut block, frame.track)?;
        block.extend_from_slice(&relative.to_be_bytes());

        let element = match frame.duration {
            Some(duration) => {
                block.push(0);
                block.extend_from_slice(&frame.data);

                let mut group = Vec::new();
                ebml::write_element(&mut group, ids::BLOCK, &block)?;
                ebml::write_uint(&mut group, ids::BLOCK_DURATION, duration)?;

                let mut element = Vec::new();
                ebml::write_element(&mut element, ids::BLOCK_GROUP, &group)?;
                element
            }
            None => {
                block.push(if frame.key { 0x80 } else { 0 });
                block.extend_from_slice(&frame.data);

                let mut element = Vec::new();
                ebml::write_element(&mut element, ids::SIMPLE_BLOCK, &block)?;
                element
            }
        };

        cluster.blocks += 1;
        cluster.payload_size += element.len() as u64;

        let cue_wanted = if has_video {
            is_video && frame.key
        } else {
            true
        };

        if output_cues && cue_wanted {
            self.cues.push(CuePoint {
                time: frame.timecode,
                track: frame.track,
                cluster_position: cluster.position - segment_data_start,
                block_number: cues_block_number.then_some(cluster.blocks),
            });
        }

        match self.policy.mode {
            SegmentMode::File if !cluster.buffer.is_empty() => {
                cluster.buffer.extend_from_slice(&element)
            }
            _ => self.writer.write_all(&element)?,
        }

        Ok(())
    }

    fn flush_pending(&mut self) -> io::Result<()> {
        let mut pending: Vec<Frame> = std::mem::take(&mut self.pending).into_values().collect();
        pending.sort_by_key(|frame| frame.timecode);

        for frame in pending {
            self.write_frame(frame)?;
        }

        Ok(())
    }

    fn write_seek_head(&mut self, cues_pos: Option<u64>) -> io::Result<()> {
        let mut entries = vec![(ids::INFO, self.info_pos), (ids::TRACKS, self.tracks_pos)];

        if let Some(cues_pos) = cues_pos {
            entries.push((ids::CUES, cues_pos));
        }

        let mut seek_head = Vec::new();

        for (id, position) in entries {
            let mut seek = Vec::new();
            ebml::write_element(&mut seek, ids::SEEK_ID, &id.to_be_bytes())?;
            ebml::write_fixed_uint(
                &mut seek,
                ids::SEEK_POSITION,
                position - self.segment_data_start,
            )?;
            ebml::write_element(&mut seek_head, ids::SEEK, &seek)?;
        }

        let mut element = Vec::new();
        ebml::write_element(&mut element, ids::SEEK_HEAD, &seek_head)?;

        let remaining = SEEK_HEAD_RESERVED
            .checked_sub(element.len() as u64)
            .filter(|&remaining| remaining == 0 || remaining >= 2)
            .ok_or_else(|| io::Error::other("seek head does not fit its reserved space"))?;

        self.writer.seek(SeekFrom::Start(self.seek_head_pos))?;
        self.writer.write_all(&element)?;

        if remaining > 0 {
            ebml::write_void(&mut self.writer, remaining)?;
        }

        Ok(())
    }

    fn finish(&mut self) -> io::Result<()> {
        self.ensure_headers()?;
        self.flush_pending()?;
        self.close_cluster()?;

        let cues_pos = if self.policy.output_cues && !self.cues.is_empty() {
            let position = self.position()?;
            ebml::write_element(&mut self.writer, ids::CUES, &cues::encode(&self.cues)?)?;
            Some(position)
        } else {
            None
        };

        let end = self.position()?;
        self.write_seek_head(cues_pos)?;

        let duration = self.duration.unwrap_or(self.last_timecode as f64);
        self.writer.seek(SeekFrom::Start(self.duration_pos))?;
        self.writer.write_all(&duration.to_bits().to_be_bytes())?;

        self.writer.seek(SeekFrom::Start(self.segment_size_pos))?;
        self.writer.write_all(&ebml::encode_vint(
            end - self.segment_data_start,
            PATCHED_SIZE_WIDTH,
        )?)?;

        self.writer.seek(SeekFrom::Start(end))?;
        self.writer.flush()
    }
}

impl<W: Write + Seek> ContainerWriter for MkvSegment<W> {
    fn add_video_track(&mut self, track: VideoTrack) -> Result<u64, MuxerError> {
        if self.headers_written {
            return Err(MuxerError::AddTrack(
                "tracks are already written".to_string(),
            ));
        }

        let number = self.tracks.len() as u64 + 1;
        self.tracks.push(TrackEntry {
            number,
            kind: TrackKind::Video(track),
            codec_private: Vec::new(),
        });

        Ok(number)
    }

    fn add_audio_track(&mut self, track: AudioTrack) -> Result<u64, MuxerError> {
        if self.headers_written {
            return Err(MuxerError::AddTrack(
                "tracks are already written".to_string(),
            ));
        }

        let number = self.tracks.len() as u64 + 1;
        self.tracks.push(TrackEntry {
            number,
            kind: TrackKind::Audio(track),
            codec_private: Vec::new(),
        });

        Ok(number)
    }

    fn set_codec_private(&mut self, track: u64, data: &[u8]) -> Result<(), MuxerError> {
        if self.headers_written {
            return Err(MuxerError::AddTrack(
                "codec private data arrived after the tracks were written".to_string(),
            ));
        }

        let entry = self
            .tracks
            .iter_mut()
            .find(|entry| entry.number == track)
            .ok_or_else(|| MuxerError::AddTrack(format!("no track {}", track)))?;
        entry.codec_private = data.to_vec();

        Ok(())
    }

    fn add_frame(
        &mut self,
        data: &[u8],
        track: u64,
        timestamp_ns: u64,
        key: bool,
    ) -> Result<(), MuxerError> {
        if !self.initialized || self.finalized {
            return Err(MuxerError::AddFrame("segment is not open".to_string()));
        }

        if self.track(track).is_none() {
            return Err(MuxerError::AddFrame(format!("no track {}", track)));
        }

        let frame = Frame {
            data: data.to_vec(),
            track,
            timecode: timestamp_ns / self.timecode_scale,
            key,
            duration: None,
        };
        self.last_timecode = self.last_timecode.max(frame.timecode);

        let result = self.ensure_headers().and_then(|_| {
            if !self.policy.accurate_cluster_duration {
                return self.write_frame(frame);
            }

            let timecode = frame.timecode;

            match self.pending.insert(track, frame) {
                Some(mut previous) => {
                    previous.duration = Some(timecode.saturating_sub(previous.timecode));
                    self.write_frame(previous)
                }
                None => Ok(()),
            }
        });

        result.map_err(|e| MuxerError::AddFrame(e.to_string()))
    }

    fn set_duration(&mut self, duration: f64) {
        self.duration = Some(duration);
    }

    fn finalize(&mut self) -> Result<(), MuxerError> {
        if self.finalized {
            return Ok(());
        }

        if !self.initialized {
            return Err(MuxerError::Finalize("segment was never initialized".to_string()));
        }

        self.finish()
            .map_err(|e| MuxerError::Finalize(e.to_string()))?;
        self.finalized = true;

        debug!(cues = self.cues.len(), "Segment finalized");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::muxers::probe;
    use std::io::Cursor;

    fn video_track() -> VideoTrack {
        VideoTrack {
            name: "Video".into(),
            language: "und".into(),
            codec_id: "V_AV1".into(),
            width: 320,
            height: 240,
            frame_rate: 30.0,
        }
    }

    fn audio_track() -> AudioTrack {
        AudioTrack {
            name: "Audio".into(),
            language: "und".into(),
            codec_id: "A_OPUS".into(),
            bit_depth: 16,
            channels: 2,
            sample_rate: 48000.0,
        }
    }

    fn segment(policy: ClusterPolicy) -> MkvSegment<Cursor<Vec<u8>>> {
        let mut segment = MkvSegment::new(Cursor::new(Vec::new()));
        segment.init().unwrap();
        segment.set_policy(policy);
        segment
    }

    #[test]
    fn test_tracks_read_back() {
        let mut segment = segment(ClusterPolicy::default());
        let video = segment.add_video_track(video_track()).unwrap();
        let audio = segment.add_audio_track(audio_track()).unwrap();
        segment.set_codec_private(audio, b"OpusHead").unwrap();

        segment.add_frame(&[1, 2, 3], video, 0, true).unwrap();
        segment.add_frame(&[4, 5], audio, 0, true).unwrap();
        segment.finalize().unwrap();

        let info = probe::probe(Cursor::new(segment.into_inner().into_inner())).unwrap();
        assert_eq!(info.doc_type, "webm");
        assert_eq!(info.tracks.len(), 2);
        assert_eq!(info.tracks[0].codec_id, "V_AV1");
        assert_eq!(info.tracks[0].width, 320);
        assert_eq!(info.tracks[1].codec_id, "A_OPUS");
        assert_eq!(info.tracks[1].channels, 2);
        assert_eq!(info.tracks[1].sample_rate, 48000.0);
        assert_eq!(info.tracks[1].codec_private, b"OpusHead");
    }

    #[test]
    fn test_codec_private_locked_after_first_frame() {
        let mut segment = segment(ClusterPolicy::default());
        let video = segment.add_video_track(video_track()).unwrap();
        segment.add_frame(&[1], video, 0, true).unwrap();

        assert!(segment.set_codec_private(video, &[1]).is_err());
        assert!(segment.add_audio_track(audio_track()).is_err());
    }

    #[test]
    fn test_key_frames_open_clusters() {
        for mode in [SegmentMode::Live, SegmentMode::File] {
            let mut segment = segment(ClusterPolicy {
                mode,
                ..ClusterPolicy::default()
            });
            let video = segment.add_video_track(video_track()).unwrap();

            for i in 0..6u64 {
                segment
                    .add_frame(&[i as u8; 10], video, i * 33_000_000, i % 3 == 0)
                    .unwrap();
            }

            segment.set_duration(1980.0);
            segment.finalize().unwrap();
            assert_eq!(segment.cues().len(), 2);

            let info = probe::probe(Cursor::new(segment.into_inner().into_inner())).unwrap();
            assert_eq!(info.clusters.len(), 2, "{:?}", mode);
            assert_eq!(info.blocks.len(), 6);
            assert_eq!(info.duration, 1980.0);
            assert!(info.cue_positions_resolve());
        }
    }

    #[test]
    fn test_audio_only_cues_every_frame() {
        let mut segment = segment(ClusterPolicy::default());
        let audio = segment.add_audio_track(audio_track()).unwrap();

        for i in 0..4u64 {
            segment.add_frame(&[0; 4], audio, i * 20_000_000, true).unwrap();
        }

        segment.finalize().unwrap();
        assert_eq!(segment.cues().len(), 4);
        assert_eq!(segment.cues()[3].block_number, Some(4));
    }

    #[test]
    fn test_relative_timecode_overflow_splits() {
        let mut segment = segment(ClusterPolicy::default());
        let audio = segment.add_audio_track(audio_track()).unwrap();

        // 100 µs ticks: 4 s is past the i16 range
        segment.add_frame(&[0], audio, 0, true).unwrap();
        segment.add_frame(&[0], audio, 4_000_000_000, true).unwrap();
        segment.finalize().unwrap();

        let info = probe::probe(Cursor::new(segment.into_inner().into_inner())).unwrap();
        assert_eq!(info.clusters.len(), 2);
    }

    #[test]
    fn test_accurate_duration_uses_block_groups() {
        let mut segment = segment(ClusterPolicy {
            accurate_cluster_duration: true,
            ..ClusterPolicy::default()
        });
        let video = segment.add_video_track(video_track()).unwrap();

        segment.add_frame(&[1], video, 0, true).unwrap();
        segment.add_frame(&[2], video, 40_000_000, false).unwrap();
        segment.finalize().unwrap();

        let info = probe::probe(Cursor::new(segment.into_inner().into_inner())).unwrap();
        assert_eq!(info.blocks.len(), 2);
        assert_eq!(info.blocks[0].duration, Some(400));
        assert_eq!(info.blocks[1].duration, None);
    }

    #[test]
    fn test_frames_rejected_before_init() {
        let mut segment = MkvSegment::new(Cursor::new(Vec::new()));
        let video = segment.add_video_track(video_track()).unwrap();
        assert!(segment.add_frame(&[1], video, 0, true).is_err());
        assert!(segment.finalize().is_err());
    }

    #[test]
    fn test_finalize_closes_segment() {
        let mut segment = segment(ClusterPolicy::default());
        let video = segment.add_video_track(video_track()).unwrap();
        segment.add_frame(&[1], video, 0, true).unwrap();
        assert!(!segment.is_finalized());

        segment.finalize().unwrap();
        assert!(segment.is_finalized());

        // A second finalize is a no-op and the segment takes no more frames
        segment.finalize().unwrap();
        assert!(segment.add_frame(&[2], video, 1_000_000, true).is_err());

        let info = probe::probe(Cursor::new(segment.into_inner().into_inner())).unwrap();
        assert_eq!(info.blocks.len(), 1);
    }
}
