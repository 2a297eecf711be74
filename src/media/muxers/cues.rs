// SPDX-License-Identifier: GPL-3.0-only

//! Cue index encoding and relocation
//!
//! A live segment can only write its Cues after the last Cluster. Players
//! that fetch over HTTP prefer the index up front, so [`relocate`] copies a
//! finalized file with the Cues moved right before the first Cluster and
//! every stored offset (cue cluster positions, SeekHead entries, the
//! Segment size) adjusted to the new layout.

use super::ebml::{self, Reader, ids};
use crate::errors::MuxerError;
use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Encoding the new Cues changes their size, which moves the clusters they
/// point to; this bounds the fixed-point iteration
const MAX_LAYOUT_PASSES: usize = 8;

/// One seek point
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CuePoint {
    /// Timecode ticks
    pub time: u64,
    pub track: u64,
    /// Cluster offset from the start of the Segment payload
    pub cluster_position: u64,
    /// 1-based block index inside the cluster
    pub block_number: Option<u64>,
}

/// Cues payload for `cues`
pub fn encode(cues: &[CuePoint]) -> io::Result<Vec<u8>> {
    let mut payload = Vec::new();

    for cue in cues {
        let mut positions = Vec::new();
        ebml::write_uint(&mut positions, ids::CUE_TRACK, cue.track)?;
        ebml::write_uint(&mut positions, ids::CUE_CLUSTER_POSITION, cue.cluster_position)?;

        if let Some(block) = cue.block_number {
            ebml::write_uint(&mut positions, ids::CUE_BLOCK_NUMBER, block)?;
        }

        let mut point = Vec::new();
        ebml::write_uint(&mut point, ids::CUE_TIME, cue.time)?;
        ebml::write_element(&mut point, ids::CUE_TRACK_POSITIONS, &positions)?;
        ebml::write_element(&mut payload, ids::CUE_POINT, &point)?;
    }

    Ok(payload)
}

/// Cue points of a Cues payload, one per track position
pub fn parse(payload: &[u8]) -> io::Result<Vec<CuePoint>> {
    let mut cues = Vec::new();

    for (id, point) in ebml::children(payload)? {
        if id != ids::CUE_POINT {
            continue;
        }

        let time = ebml::child(point, ids::CUE_TIME)?
            .map(ebml::read_uint)
            .unwrap_or(0);

        for (id, positions) in ebml::children(point)? {
            if id != ids::CUE_TRACK_POSITIONS {
                continue;
            }

            let mut cue = CuePoint {
                time,
                track: 0,
                cluster_position: 0,
                block_number: None,
            };

            for (id, value) in ebml::children(positions)? {
                match id {
                    ids::CUE_TRACK => cue.track = ebml::read_uint(value),
                    ids::CUE_CLUSTER_POSITION => cue.cluster_position = ebml::read_uint(value),
                    ids::CUE_BLOCK_NUMBER => cue.block_number = Some(ebml::read_uint(value)),
                    _ => {}
                }
            }

            cues.push(cue);
        }
    }

    Ok(cues)
}

#[derive(Debug, Clone, Copy)]
struct Child {
    id: u32,
    offset: u64,
    total: u64,
}

/// Where everything moves once the Cues sit before the first Cluster
#[derive(Debug, Clone, Copy)]
struct Layout {
    first_cluster: u64,
    old_cues: u64,
    old_cues_size: u64,
    new_cues_size: u64,
}

impl Layout {
    /// New position of a Segment-relative offset
    fn shift(&self, position: u64) -> u64 {
        if position < self.first_cluster {
            position
        } else if position == self.old_cues {
            self.first_cluster
        } else if position < self.old_cues {
            position + self.new_cues_size
        } else {
            position + self.new_cues_size - self.old_cues_size
        }
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

fn copy_range<R: Read + Seek, W: Write>(
    input: &mut R,
    output: &mut W,
    start: u64,
    end: u64,
) -> io::Result<()> {
    input.seek(SeekFrom::Start(start))?;
    let copied = io::copy(&mut input.by_ref().take(end - start), output)?;

    if copied != end - start {
        return Err(invalid("input ended early"));
    }

    Ok(())
}

/// Rewrite SeekPosition values in place, keeping their width
fn patch_seek_head(payload: &mut [u8], layout: &Layout) -> io::Result<()> {
    for (id, seek) in ebml::child_ranges(payload)? {
        if id != ids::SEEK {
            continue;
        }

        for (id, value) in ebml::child_ranges(&payload[seek.clone()])? {
            if id != ids::SEEK_POSITION {
                continue;
            }

            let range = seek.start + value.start..seek.start + value.end;
            let width = range.len();
            let position = layout.shift(ebml::read_uint(&payload[range.clone()]));
            let bytes = position.to_be_bytes();

            if width == 0 || width > 8 || bytes[..8 - width].iter().any(|&b| b != 0) {
                return Err(invalid("seek position does not fit its field"));
            }

            payload[range].copy_from_slice(&bytes[8 - width..]);
        }
    }

    Ok(())
}

/// Copy a finalized segment from `input` to `output` with the Cues moved in
/// front of the first Cluster
///
/// Returns `Ok(false)` without writing anything when there is nothing to
/// move: no Cues, no Clusters, or Cues already first.
pub fn relocate<R: Read + Seek, W: Write>(mut input: R, output: &mut W) -> Result<bool, MuxerError> {
    relocate_io(&mut input, output).map_err(|e| MuxerError::CueRelocation(e.to_string()))
}

fn relocate_io<R: Read + Seek, W: Write>(input: &mut R, output: &mut W) -> io::Result<bool> {
    let mut reader = Reader::new(&mut *input);

    let ebml_header = reader
        .next_header()?
        .filter(|header| header.id == ids::EBML)
        .ok_or_else(|| invalid("missing EBML header"))?;
    reader.skip(&ebml_header)?;

    let segment = reader
        .next_header()?
        .filter(|header| header.id == ids::SEGMENT)
        .ok_or_else(|| invalid("missing Segment"))?;
    let segment_end = segment
        .end()
        .ok_or_else(|| invalid("segment size was never written"))?;
    let data_start = segment.data_offset();

    let mut children = Vec::new();

    while reader.position()? < segment_end {
        let Some(header) = reader.next_header()? else {
            break;
        };
        let total = header
            .total_size()
            .ok_or_else(|| invalid(format!("element {:#x} has unknown size", header.id)))?;

        children.push(Child {
            id: header.id,
            offset: header.offset,
            total,
        });
        reader.skip(&header)?;
    }

    let first_cluster = children.iter().find(|child| child.id == ids::CLUSTER).copied();
    let cues = children.iter().find(|child| child.id == ids::CUES).copied();

    let (Some(first_cluster), Some(cues)) = (first_cluster, cues) else {
        return Ok(false);
    };

    if cues.offset < first_cluster.offset {
        return Ok(false);
    }

    reader.seek(cues.offset)?;
    let cues_header = reader
        .next_header()?
        .ok_or_else(|| invalid("cues vanished"))?;
    let points = parse(&reader.read_payload(&cues_header)?)?;

    let mut layout = Layout {
        first_cluster: first_cluster.offset - data_start,
        old_cues: cues.offset - data_start,
        old_cues_size: cues.total,
        new_cues_size: cues.total,
    };

    let mut new_cues = Vec::new();
    let mut settled = false;

    for _ in 0..MAX_LAYOUT_PASSES {
        let moved: Vec<CuePoint> = points
            .iter()
            .map(|cue| CuePoint {
                cluster_position: layout.shift(cue.cluster_position),
                ..*cue
            })
            .collect();

        new_cues.clear();
        ebml::write_element(&mut new_cues, ids::CUES, &encode(&moved)?)?;

        if new_cues.len() as u64 == layout.new_cues_size {
            settled = true;
            break;
        }

        layout.new_cues_size = new_cues.len() as u64;
    }

    if !settled {
        return Err(invalid("cue layout did not settle"));
    }

    let segment_size = segment_end - data_start - layout.old_cues_size + layout.new_cues_size;
    let size_width = (segment.header_size as usize) - ebml::id_length(ids::SEGMENT);
    let size_field = ebml::encode_vint(segment_size, size_width)?;

    drop(reader);

    copy_range(input, output, 0, segment.offset)?;
    ebml::write_id(output, ids::SEGMENT)?;
    output.write_all(&size_field)?;

    for child in children.iter().filter(|child| child.offset < first_cluster.offset) {
        if child.id == ids::SEEK_HEAD {
            let mut element = vec![0u8; child.total as usize];
            input.seek(SeekFrom::Start(child.offset))?;
            input.read_exact(&mut element)?;

            let header = Reader::new(io::Cursor::new(&element))
                .next_header()?
                .ok_or_else(|| invalid("empty seek head"))?;
            patch_seek_head(&mut element[header.header_size as usize..], &layout)?;
            output.write_all(&element)?;
        } else {
            copy_range(input, output, child.offset, child.offset + child.total)?;
        }
    }

    output.write_all(&new_cues)?;
    copy_range(input, output, first_cluster.offset, cues.offset)?;
    copy_range(input, output, cues.offset + cues.total, segment_end)?;

    let file_end = input.seek(SeekFrom::End(0))?;

    if file_end > segment_end {
        copy_range(input, output, segment_end, file_end)?;
    }

    output.flush()?;

    debug!(
        cues = points.len(),
        old_size = layout.old_cues_size,
        new_size = layout.new_cues_size,
        "Cues moved before clusters"
    );

    Ok(true)
}

/// Rewrite the file at `path` so its Cues come before the Clusters
///
/// The copy is staged next to the original and renamed over it once it is
/// complete, so the original is either replaced whole or left untouched.
/// A failed or unneeded rewrite removes the staged copy.
pub fn move_cues_before_clusters(path: &Path) -> Result<bool, MuxerError> {
    let fail = |e: io::Error| MuxerError::CueRelocation(e.to_string());

    let input = BufReader::new(File::open(path).map_err(fail)?);
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let stem = path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());

    let staged = tempfile::Builder::new()
        .prefix(&format!(".{}_", stem))
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(fail)?;

    let mut output = BufWriter::new(staged);

    if !relocate(input, &mut output)? {
        return Ok(false);
    }

    let staged = output.into_inner().map_err(|e| fail(e.into_error()))?;
    staged.as_file().sync_all().map_err(fail)?;

    replace(staged, path)?;

    info!(path = %path.display(), "Cues moved before clusters");

    Ok(true)
}

/// Atomically rename `staged` over `path`
fn replace(staged: NamedTempFile, path: &Path) -> Result<(), MuxerError> {
    staged
        .persist(path)
        .map(|_| ())
        .map_err(|e| MuxerError::CueRelocation(e.error.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_parse() {
        let cues = vec![
            CuePoint {
                time: 0,
                track: 1,
                cluster_position: 150,
                block_number: Some(1),
            },
            CuePoint {
                time: 30000,
                track: 1,
                cluster_position: 70_000,
                block_number: None,
            },
        ];

        assert_eq!(parse(&encode(&cues).unwrap()).unwrap(), cues);
    }

    #[test]
    fn test_layout_shift() {
        let layout = Layout {
            first_cluster: 100,
            old_cues: 1000,
            old_cues_size: 40,
            new_cues_size: 42,
        };

        assert_eq!(layout.shift(50), 50);
        assert_eq!(layout.shift(100), 142);
        assert_eq!(layout.shift(999), 1041);
        assert_eq!(layout.shift(1000), 100);
        assert_eq!(layout.shift(1040), 1042);
    }

    #[test]
    fn test_nothing_to_move_without_cues() {
        let mut data = Vec::new();
        ebml::write_element(&mut data, ids::EBML, &[]).unwrap();
        let mut segment = Vec::new();
        ebml::write_element(&mut segment, ids::CLUSTER, &[0xE7, 0x81, 0x00]).unwrap();
        ebml::write_element(&mut data, ids::SEGMENT, &segment).unwrap();

        let mut output = Vec::new();
        assert!(!relocate(io::Cursor::new(data), &mut output).unwrap());
        assert!(output.is_empty());
    }

    #[test]
    fn test_failed_replace_keeps_original() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("recording.webm");
        std::fs::write(&path, b"original bytes").unwrap();

        let staged = NamedTempFile::new_in(dir.path()).unwrap();
        std::fs::remove_file(staged.path()).unwrap();

        assert!(matches!(
            replace(staged, &path),
            Err(MuxerError::CueRelocation(_))
        ));
        assert_eq!(std::fs::read(&path).unwrap(), b"original bytes");
    }

    #[test]
    fn test_unreadable_file_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.webm");
        let bytes = [0x1A, 0x45, 0xDF, 0xA3, 0x84, 0x42, 0x86, 0x81, 0x01, 0x18, 0x53, 0x80];
        std::fs::write(&path, bytes).unwrap();

        assert!(!matches!(move_cues_before_clusters(&path), Ok(true)));
        assert_eq!(std::fs::read(&path).unwrap(), bytes);

        // No staged copy is left next to the original
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
