// SPDX-License-Identifier: GPL-3.0-only

//! EBML primitives
//!
//! Matroska is a tree of EBML elements: an ID, a variable-length size and a
//! payload. Element IDs keep their length marker bits; sizes do not. An
//! all-ones size means "unknown", which live output uses for elements whose
//! length is only known once they are closed.

use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::ops::Range;

/// Element IDs used by the writer and the reader
pub mod ids {
    pub const EBML: u32 = 0x1A45_DFA3;
    pub const EBML_VERSION: u32 = 0x4286;
    pub const EBML_READ_VERSION: u32 = 0x42F7;
    pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
    pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
    pub const DOC_TYPE: u32 = 0x4282;
    pub const DOC_TYPE_VERSION: u32 = 0x4287;
    pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;
    pub const VOID: u32 = 0xEC;

    pub const SEGMENT: u32 = 0x1853_8067;
    pub const SEEK_HEAD: u32 = 0x114D_9B74;
    pub const SEEK: u32 = 0x4DBB;
    pub const SEEK_ID: u32 = 0x53AB;
    pub const SEEK_POSITION: u32 = 0x53AC;

    pub const INFO: u32 = 0x1549_A966;
    pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
    pub const DURATION: u32 = 0x4489;
    pub const MUXING_APP: u32 = 0x4D80;
    pub const WRITING_APP: u32 = 0x5741;

    pub const TRACKS: u32 = 0x1654_AE6B;
    pub const TRACK_ENTRY: u32 = 0xAE;
    pub const TRACK_NUMBER: u32 = 0xD7;
    pub const TRACK_UID: u32 = 0x73C5;
    pub const TRACK_TYPE: u32 = 0x83;
    pub const FLAG_LACING: u32 = 0x9C;
    pub const DEFAULT_DURATION: u32 = 0x23_E383;
    pub const NAME: u32 = 0x536E;
    pub const LANGUAGE: u32 = 0x22_B59C;
    pub const CODEC_ID: u32 = 0x86;
    pub const CODEC_PRIVATE: u32 = 0x63A2;
    pub const SEEK_PRE_ROLL: u32 = 0x56BB;
    pub const VIDEO: u32 = 0xE0;
    pub const PIXEL_WIDTH: u32 = 0xB0;
    pub const PIXEL_HEIGHT: u32 = 0xBA;
    pub const FRAME_RATE: u32 = 0x23_83E3;
    pub const AUDIO: u32 = 0xE1;
    pub const SAMPLING_FREQUENCY: u32 = 0xB5;
    pub const CHANNELS: u32 = 0x9F;
    pub const BIT_DEPTH: u32 = 0x6264;

    pub const CLUSTER: u32 = 0x1F43_B675;
    pub const TIMECODE: u32 = 0xE7;
    pub const SIMPLE_BLOCK: u32 = 0xA3;
    pub const BLOCK_GROUP: u32 = 0xA0;
    pub const BLOCK: u32 = 0xA1;
    pub const BLOCK_DURATION: u32 = 0x9B;

    pub const CUES: u32 = 0x1C53_BB6B;
    pub const CUE_POINT: u32 = 0xBB;
    pub const CUE_TIME: u32 = 0xB3;
    pub const CUE_TRACK_POSITIONS: u32 = 0xB7;
    pub const CUE_TRACK: u32 = 0xF7;
    pub const CUE_CLUSTER_POSITION: u32 = 0xF1;
    pub const CUE_BLOCK_NUMBER: u32 = 0x5378;

    /// Children of the Segment, which end an unknown-size sibling
    pub const LEVEL_1: &[u32] = &[SEEK_HEAD, INFO, TRACKS, CLUSTER, CUES, VOID];
}

/// Widest size field EBML allows
pub const MAX_VINT_LENGTH: usize = 8;

/// Bytes a size field needs to hold `value`
///
/// The all-ones pattern of each width is reserved for "unknown".
pub fn vint_length(value: u64) -> usize {
    (1..MAX_VINT_LENGTH)
        .find(|&width| value < (1u64 << (7 * width)) - 1)
        .unwrap_or(MAX_VINT_LENGTH)
}

/// Encode `value` as a size field exactly `width` bytes wide
pub fn encode_vint(value: u64, width: usize) -> io::Result<Vec<u8>> {
    let width = width.clamp(1, MAX_VINT_LENGTH);

    if width < MAX_VINT_LENGTH && value >= (1u64 << (7 * width)) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} does not fit a {}-byte size", value, width),
        ));
    }

    let marked = value | (1u64 << (7 * width));
    Ok(marked.to_be_bytes()[MAX_VINT_LENGTH - width..].to_vec())
}

/// Write a minimal size field
pub fn write_vint<W: Write>(writer: &mut W, value: u64) -> io::Result<usize> {
    let bytes = encode_vint(value, vint_length(value))?;
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

/// Write the "unknown" size marker of a given width
pub fn write_unknown_size<W: Write>(writer: &mut W, width: usize) -> io::Result<usize> {
    let width = width.clamp(1, MAX_VINT_LENGTH);
    let bytes = encode_vint((1u64 << (7 * width)) - 1, width)?;
    writer.write_all(&bytes)?;
    Ok(bytes.len())
}

pub fn id_length(id: u32) -> usize {
    match id {
        0..=0xFF => 1,
        0x100..=0xFFFF => 2,
        0x1_0000..=0xFF_FFFF => 3,
        _ => 4,
    }
}

pub fn write_id<W: Write>(writer: &mut W, id: u32) -> io::Result<usize> {
    let len = id_length(id);
    writer.write_all(&id.to_be_bytes()[4 - len..])?;
    Ok(len)
}

/// Unsigned integer in as few bytes as possible, at least one
pub fn uint_bytes(value: u64) -> Vec<u8> {
    let bytes = value.to_be_bytes();
    let start = bytes.iter().position(|&b| b != 0).unwrap_or(7);
    bytes[start..].to_vec()
}

/// Write a complete element
pub fn write_element<W: Write>(writer: &mut W, id: u32, payload: &[u8]) -> io::Result<usize> {
    let mut written = write_id(writer, id)?;
    written += write_vint(writer, payload.len() as u64)?;
    writer.write_all(payload)?;
    Ok(written + payload.len())
}

pub fn write_uint<W: Write>(writer: &mut W, id: u32, value: u64) -> io::Result<usize> {
    write_element(writer, id, &uint_bytes(value))
}

/// Unsigned integer padded to 8 bytes, so it can be rewritten in place
pub fn write_fixed_uint<W: Write>(writer: &mut W, id: u32, value: u64) -> io::Result<usize> {
    write_element(writer, id, &value.to_be_bytes())
}

/// 64-bit float
pub fn write_float<W: Write>(writer: &mut W, id: u32, value: f64) -> io::Result<usize> {
    write_element(writer, id, &value.to_bits().to_be_bytes())
}

pub fn write_string<W: Write>(writer: &mut W, id: u32, value: &str) -> io::Result<usize> {
    write_element(writer, id, value.as_bytes())
}

/// Void element occupying exactly `total` bytes
pub fn write_void<W: Write>(writer: &mut W, total: u64) -> io::Result<()> {
    if total < 2 {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "a void element needs at least two bytes",
        ));
    }

    let width = if total <= 9 { 1 } else { MAX_VINT_LENGTH };
    write_id(writer, ids::VOID)?;
    writer.write_all(&encode_vint(total - 1 - width as u64, width)?)?;
    io::copy(&mut io::repeat(0).take(total - 1 - width as u64), writer)?;
    Ok(())
}

pub fn read_uint(data: &[u8]) -> u64 {
    data.iter()
        .take(8)
        .fold(0u64, |value, &byte| (value << 8) | u64::from(byte))
}

/// 4 or 8 byte float; anything else reads as 0
pub fn read_float(data: &[u8]) -> f64 {
    match data.len() {
        4 => f64::from(f32::from_bits(read_uint(data) as u32)),
        8 => f64::from_bits(read_uint(data)),
        _ => 0.0,
    }
}

/// String up to the first NUL
pub fn read_string(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Position and extent of one element
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ElementHeader {
    pub id: u32,
    /// Payload size, `None` when unknown
    pub size: Option<u64>,
    /// Offset of the ID
    pub offset: u64,
    /// Bytes taken by the ID and size fields
    pub header_size: u64,
}

impl ElementHeader {
    pub fn data_offset(&self) -> u64 {
        self.offset + self.header_size
    }

    /// Offset one past the payload, if the size is known
    pub fn end(&self) -> Option<u64> {
        self.size.map(|size| self.data_offset() + size)
    }

    pub fn total_size(&self) -> Option<u64> {
        self.size.map(|size| self.header_size + size)
    }
}

fn invalid(message: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.into())
}

/// Sequential element reader over a seekable source
pub struct Reader<R> {
    inner: R,
}

impl<R: Read + Seek> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    pub fn position(&mut self) -> io::Result<u64> {
        self.inner.stream_position()
    }

    pub fn seek(&mut self, offset: u64) -> io::Result<()> {
        self.inner.seek(SeekFrom::Start(offset)).map(|_| ())
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];

        match self.inner.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Header at the current position, `None` at end of input
    pub fn next_header(&mut self) -> io::Result<Option<ElementHeader>> {
        let offset = self.position()?;

        let Some(first) = self.read_byte()? else {
            return Ok(None);
        };

        let id_len = first.leading_zeros() as usize + 1;

        if first == 0 || id_len > 4 {
            return Err(invalid(format!("invalid element id at {}", offset)));
        }

        let mut id = u32::from(first);
        let mut rest = [0u8; 3];
        self.inner.read_exact(&mut rest[..id_len - 1])?;

        for &byte in &rest[..id_len - 1] {
            id = (id << 8) | u32::from(byte);
        }

        let first = self
            .read_byte()?
            .ok_or_else(|| invalid(format!("truncated element at {}", offset)))?;
        let size_len = first.leading_zeros() as usize + 1;

        if first == 0 || size_len > MAX_VINT_LENGTH {
            return Err(invalid(format!("invalid element size at {}", offset)));
        }

        let mut size = u64::from(first & (0xFF >> size_len));
        let mut rest = [0u8; 7];
        self.inner.read_exact(&mut rest[..size_len - 1])?;

        for &byte in &rest[..size_len - 1] {
            size = (size << 8) | u64::from(byte);
        }

        let unknown = (1u64 << (7 * size_len)) - 1;

        Ok(Some(ElementHeader {
            id,
            size: (size != unknown).then_some(size),
            offset,
            header_size: (id_len + size_len) as u64,
        }))
    }

    /// Payload of an element whose header was just read
    pub fn read_payload(&mut self, header: &ElementHeader) -> io::Result<Vec<u8>> {
        let size = header
            .size
            .ok_or_else(|| invalid(format!("element {:#x} has unknown size", header.id)))?;
        let mut payload = Vec::new();
        (&mut self.inner).take(size).read_to_end(&mut payload)?;

        if payload.len() as u64 != size {
            return Err(invalid(format!("element {:#x} is truncated", header.id)));
        }

        Ok(payload)
    }

    /// Move past an element with a known size
    pub fn skip(&mut self, header: &ElementHeader) -> io::Result<()> {
        let end = header
            .end()
            .ok_or_else(|| invalid(format!("element {:#x} has unknown size", header.id)))?;
        self.seek(end)
    }
}

/// IDs and payload ranges of the direct children of a master payload
pub fn child_ranges(payload: &[u8]) -> io::Result<Vec<(u32, Range<usize>)>> {
    let mut reader = Reader::new(Cursor::new(payload));
    let mut ranges = Vec::new();

    while let Some(header) = reader.next_header()? {
        let end = header
            .end()
            .map(|end| end as usize)
            .unwrap_or(payload.len())
            .min(payload.len());
        let start = (header.data_offset() as usize).min(end);

        ranges.push((header.id, start..end));
        reader.seek(end as u64)?;
    }

    Ok(ranges)
}

/// Direct children of an in-memory master element payload
pub fn children(payload: &[u8]) -> io::Result<Vec<(u32, &[u8])>> {
    Ok(child_ranges(payload)?
        .into_iter()
        .map(|(id, range)| (id, &payload[range]))
        .collect())
}

/// First child with `id`
pub fn child(payload: &[u8], id: u32) -> io::Result<Option<&[u8]>> {
    Ok(children(payload)?
        .into_iter()
        .find(|(child_id, _)| *child_id == id)
        .map(|(_, data)| data))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vint_widths() {
        assert_eq!(vint_length(0), 1);
        assert_eq!(vint_length(126), 1);
        // 127 is the one-byte unknown marker
        assert_eq!(vint_length(127), 2);
        assert_eq!(vint_length(16382), 2);
        assert_eq!(vint_length(16383), 3);
    }

    #[test]
    fn test_encode_vint() {
        assert_eq!(encode_vint(1, 1).unwrap(), vec![0x81]);
        assert_eq!(encode_vint(129, 2).unwrap(), vec![0x40, 0x81]);
        assert_eq!(encode_vint(5, 8).unwrap(), vec![0x01, 0, 0, 0, 0, 0, 0, 5]);
        assert!(encode_vint(200, 1).is_err());
    }

    #[test]
    fn test_unknown_size_reads_as_none() {
        let mut data = Vec::new();
        write_id(&mut data, ids::CLUSTER).unwrap();
        write_unknown_size(&mut data, 8).unwrap();

        let mut reader = Reader::new(Cursor::new(data));
        let header = reader.next_header().unwrap().unwrap();
        assert_eq!(header.id, ids::CLUSTER);
        assert_eq!(header.size, None);
        assert_eq!(header.header_size, 12);
    }

    #[test]
    fn test_void_fills_exact_space() {
        for total in [2u64, 5, 9, 10, 100] {
            let mut data = Vec::new();
            write_void(&mut data, total).unwrap();
            assert_eq!(data.len() as u64, total);

            let header = Reader::new(Cursor::new(&data)).next_header().unwrap().unwrap();
            assert_eq!(header.id, ids::VOID);
            assert_eq!(header.total_size(), Some(total));
        }
    }

    #[test]
    fn test_master_children() {
        let mut payload = Vec::new();
        write_uint(&mut payload, ids::TRACK_NUMBER, 2).unwrap();
        write_string(&mut payload, ids::CODEC_ID, "A_OPUS").unwrap();
        write_float(&mut payload, ids::SAMPLING_FREQUENCY, 48000.0).unwrap();

        let children = children(&payload).unwrap();
        assert_eq!(children.len(), 3);
        assert_eq!(read_uint(children[0].1), 2);
        assert_eq!(read_string(children[1].1), "A_OPUS");
        assert_eq!(read_float(children[2].1), 48000.0);
        assert_eq!(
            child(&payload, ids::CODEC_ID).unwrap().map(read_string),
            Some("A_OPUS".to_string())
        );
    }

    #[test]
    fn test_uint_bytes_minimal() {
        assert_eq!(uint_bytes(0), vec![0]);
        assert_eq!(uint_bytes(255), vec![255]);
        assert_eq!(uint_bytes(256), vec![1, 0]);
    }
}
