// SPDX-License-Identifier: GPL-3.0-only

//! WebM structure reader
//!
//! Walks a Matroska file and reports its tracks, clusters, blocks and cue
//! layout. Used by `inspect` and by the muxer tests to check what was
//! written. Unknown-size clusters (an unfinished live recording) are read up
//! to the next top-level element.

use super::cues::{self, CuePoint};
use super::ebml::{self, ElementHeader, Reader, ids};
use crate::errors::MuxerError;
use std::fs::File;
use std::io::{self, BufReader, Read, Seek};
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackInfo {
    pub number: u64,
    /// 1 video, 2 audio
    pub track_type: u64,
    pub name: String,
    pub language: String,
    pub codec_id: String,
    pub codec_private: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub channels: u32,
    pub sample_rate: f64,
    pub bit_depth: u32,
}

impl TrackInfo {
    pub fn is_video(&self) -> bool {
        self.track_type == 1
    }

    pub fn is_audio(&self) -> bool {
        self.track_type == 2
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClusterInfo {
    /// Offset from the start of the Segment payload
    pub position: u64,
    pub timecode: u64,
    pub blocks: usize,
    /// Whether the size field still holds the unknown marker
    pub unknown_size: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    pub track: u64,
    /// Absolute timecode in ticks
    pub timecode: i64,
    pub key: bool,
    pub duration: Option<u64>,
    pub size: usize,
}

/// Everything [`probe`] found
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ContainerInfo {
    pub doc_type: String,
    pub timecode_scale: u64,
    /// Ticks of the timecode scale
    pub duration: f64,
    pub muxing_app: String,
    pub writing_app: String,
    pub tracks: Vec<TrackInfo>,
    pub clusters: Vec<ClusterInfo>,
    pub blocks: Vec<BlockInfo>,
    pub cues: Vec<CuePoint>,
    /// Offset of the Cues from the start of the Segment payload
    pub cues_position: Option<u64>,
    pub seek_entries: Vec<(u32, u64)>,
}

impl ContainerInfo {
    pub fn duration_seconds(&self) -> f64 {
        self.duration * self.timecode_scale as f64 / 1e9
    }

    pub fn first_cluster_position(&self) -> Option<u64> {
        self.clusters.first().map(|cluster| cluster.position)
    }

    /// True when the Cues precede every Cluster
    pub fn cues_before_clusters(&self) -> bool {
        match (self.cues_position, self.first_cluster_position()) {
            (Some(cues), Some(cluster)) => cues < cluster,
            _ => false,
        }
    }

    /// True when every cue points at the start of a Cluster
    pub fn cue_positions_resolve(&self) -> bool {
        self.cues.iter().all(|cue| {
            self.clusters
                .iter()
                .any(|cluster| cluster.position == cue.cluster_position)
        })
    }

    pub fn track(&self, number: u64) -> Option<&TrackInfo> {
        self.tracks.iter().find(|track| track.number == number)
    }

    /// Blocks of one track in file order
    pub fn track_blocks(&self, number: u64) -> impl Iterator<Item = &BlockInfo> {
        self.blocks.iter().filter(move |block| block.track == number)
    }
}

fn parse_error(e: io::Error) -> MuxerError {
    MuxerError::Parse(e.to_string())
}

fn parse_track(payload: &[u8]) -> io::Result<TrackInfo> {
    let mut track = TrackInfo::default();

    for (id, value) in ebml::children(payload)? {
        match id {
            ids::TRACK_NUMBER => track.number = ebml::read_uint(value),
            ids::TRACK_TYPE => track.track_type = ebml::read_uint(value),
            ids::NAME => track.name = ebml::read_string(value),
            ids::LANGUAGE => track.language = ebml::read_string(value),
            ids::CODEC_ID => track.codec_id = ebml::read_string(value),
            ids::CODEC_PRIVATE => track.codec_private = value.to_vec(),
            ids::VIDEO => {
                for (id, value) in ebml::children(value)? {
                    match id {
                        ids::PIXEL_WIDTH => track.width = ebml::read_uint(value) as u32,
                        ids::PIXEL_HEIGHT => track.height = ebml::read_uint(value) as u32,
                        ids::FRAME_RATE => track.frame_rate = ebml::read_float(value),
                        _ => {}
                    }
                }
            }
            ids::AUDIO => {
                for (id, value) in ebml::children(value)? {
                    match id {
                        ids::SAMPLING_FREQUENCY => track.sample_rate = ebml::read_float(value),
                        ids::CHANNELS => track.channels = ebml::read_uint(value) as u32,
                        ids::BIT_DEPTH => track.bit_depth = ebml::read_uint(value) as u32,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(track)
}

/// Track, relative timecode and flags of a Block or SimpleBlock payload
fn parse_block(data: &[u8]) -> io::Result<(u64, i16, u8, usize)> {
    let first = *data
        .first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "empty block"))?;
    let len = first.leading_zeros() as usize + 1;

    if first == 0 || data.len() < len + 3 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "truncated block"));
    }

    let track = data[1..len]
        .iter()
        .fold(u64::from(first & (0xFF >> len)), |value, &byte| {
            (value << 8) | u64::from(byte)
        });
    let relative = i16::from_be_bytes([data[len], data[len + 1]]);

    Ok((track, relative, data[len + 2], data.len() - len - 3))
}

struct Probe<R> {
    reader: Reader<R>,
    info: ContainerInfo,
    data_start: u64,
}

impl<R: Read + Seek> Probe<R> {
    fn read_cluster(&mut self, header: &ElementHeader) -> io::Result<()> {
        let mut cluster = ClusterInfo {
            position: header.offset - self.data_start,
            timecode: 0,
            blocks: 0,
            unknown_size: header.size.is_none(),
        };

        let end = header.end();

        loop {
            let position = self.reader.position()?;

            if end.is_some_and(|end| position >= end) {
                break;
            }

            let Some(child) = self.reader.next_header()? else {
                break;
            };

            if end.is_none() && ids::LEVEL_1.contains(&child.id) {
                self.reader.seek(child.offset)?;
                break;
            }

            match child.id {
                ids::TIMECODE => {
                    cluster.timecode = ebml::read_uint(&self.reader.read_payload(&child)?);
                }
                ids::SIMPLE_BLOCK => {
                    let data = self.reader.read_payload(&child)?;
                    let (track, relative, flags, size) = parse_block(&data)?;
                    cluster.blocks += 1;

                    self.info.blocks.push(BlockInfo {
                        track,
                        timecode: cluster.timecode as i64 + i64::from(relative),
                        key: flags & 0x80 != 0,
                        duration: None,
                        size,
                    });
                }
                ids::BLOCK_GROUP => {
                    let group = self.reader.read_payload(&child)?;
                    let block = ebml::child(&group, ids::BLOCK)?.ok_or_else(|| {
                        io::Error::new(io::ErrorKind::InvalidData, "block group without block")
                    })?;
                    let (track, relative, _, size) = parse_block(block)?;
                    cluster.blocks += 1;

                    self.info.blocks.push(BlockInfo {
                        track,
                        timecode: cluster.timecode as i64 + i64::from(relative),
                        key: false,
                        duration: ebml::child(&group, ids::BLOCK_DURATION)?.map(ebml::read_uint),
                        size,
                    });
                }
                _ => self.reader.skip(&child)?,
            }
        }

        self.info.clusters.push(cluster);
        Ok(())
    }

    fn read_segment(&mut self, segment: &ElementHeader) -> io::Result<()> {
        self.data_start = segment.data_offset();
        let end = segment.end();

        loop {
            let position = self.reader.position()?;

            if end.is_some_and(|end| position >= end) {
                break;
            }

            let Some(header) = self.reader.next_header()? else {
                break;
            };

            match header.id {
                ids::INFO => {
                    let payload = self.reader.read_payload(&header)?;

                    for (id, value) in ebml::children(&payload)? {
                        match id {
                            ids::TIMECODE_SCALE => self.info.timecode_scale = ebml::read_uint(value),
                            ids::DURATION => self.info.duration = ebml::read_float(value),
                            ids::MUXING_APP => self.info.muxing_app = ebml::read_string(value),
                            ids::WRITING_APP => self.info.writing_app = ebml::read_string(value),
                            _ => {}
                        }
                    }
                }
                ids::TRACKS => {
                    let payload = self.reader.read_payload(&header)?;

                    for (id, entry) in ebml::children(&payload)? {
                        if id == ids::TRACK_ENTRY {
                            self.info.tracks.push(parse_track(entry)?);
                        }
                    }
                }
                ids::SEEK_HEAD => {
                    let payload = self.reader.read_payload(&header)?;

                    for (id, seek) in ebml::children(&payload)? {
                        if id != ids::SEEK {
                            continue;
                        }

                        let seek_id = ebml::child(seek, ids::SEEK_ID)?.map(ebml::read_uint);
                        let position = ebml::child(seek, ids::SEEK_POSITION)?.map(ebml::read_uint);

                        if let (Some(seek_id), Some(position)) = (seek_id, position) {
                            self.info.seek_entries.push((seek_id as u32, position));
                        }
                    }
                }
                ids::CUES => {
                    self.info.cues_position = Some(header.offset - self.data_start);
                    let payload = self.reader.read_payload(&header)?;
                    self.info.cues = cues::parse(&payload)?;
                }
                ids::CLUSTER => self.read_cluster(&header)?,
                _ => match header.end() {
                    Some(_) => self.reader.skip(&header)?,
                    None => break,
                },
            }
        }

        Ok(())
    }
}

/// Read the structure of a WebM stream
pub fn probe<R: Read + Seek>(input: R) -> Result<ContainerInfo, MuxerError> {
    let mut reader = Reader::new(input);

    let header = reader
        .next_header()
        .map_err(parse_error)?
        .filter(|header| header.id == ids::EBML)
        .ok_or_else(|| MuxerError::Parse("not an EBML file".to_string()))?;
    let payload = reader.read_payload(&header).map_err(parse_error)?;

    let mut info = ContainerInfo {
        timecode_scale: 1_000_000,
        ..ContainerInfo::default()
    };

    info.doc_type = ebml::child(&payload, ids::DOC_TYPE)
        .map_err(parse_error)?
        .map(ebml::read_string)
        .unwrap_or_default();

    let segment = reader
        .next_header()
        .map_err(parse_error)?
        .filter(|header| header.id == ids::SEGMENT)
        .ok_or_else(|| MuxerError::Parse("missing Segment".to_string()))?;

    let mut probe = Probe {
        reader,
        info,
        data_start: 0,
    };
    probe.read_segment(&segment).map_err(parse_error)?;

    Ok(probe.info)
}

pub fn probe_file(path: &Path) -> Result<ContainerInfo, MuxerError> {
    let file = File::open(path).map_err(|e| MuxerError::OpenFailed {
        location: path.display().to_string(),
        reason: e.to_string(),
    })?;

    probe(BufReader::new(file))
}
