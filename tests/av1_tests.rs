// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the AV1 encoder over an in-process codec library

use camera_pipeline::errors::EncoderError;
use camera_pipeline::media::caps::{PixelFormat, VideoCaps, VideoCodecId};
use camera_pipeline::media::encoders::native::{
    EncodedVideoPacket, EncoderStatus, VideoCodecConfig, VideoCodecLibrary, VideoCodecSession,
};
use camera_pipeline::media::encoders::{Av1Encoder, VideoEncoder};
use camera_pipeline::media::{Fraction, Packet};
use camera_pipeline::{Element, ElementState};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct SessionLog {
    /// (data size, pts) of every send_frame call, including rejected ones
    sends: Vec<(usize, i64)>,
    flushed: bool,
}

/// Holds one frame back like a lookahead encoder
///
/// Sending `stall_at` the first time reports a full session and releases
/// everything held, so the element has to drain and send again.
struct FakeSession {
    log: Arc<Mutex<SessionLog>>,
    pending: VecDeque<i64>,
    stall_at: Option<i64>,
    full: bool,
    flushing: bool,
}

impl VideoCodecSession for FakeSession {
    fn sequence_header(&self) -> Vec<u8> {
        Vec::new()
    }

    fn send_frame(&mut self, frame: Option<&[u8]>, pts: i64) -> EncoderStatus {
        let Some(frame) = frame else {
            self.flushing = true;
            self.log.lock().unwrap().flushed = true;
            return EncoderStatus::Success;
        };

        self.log.lock().unwrap().sends.push((frame.len(), pts));

        if self.stall_at == Some(pts) {
            self.stall_at = None;
            self.full = true;
            return EncoderStatus::EnoughData;
        }

        self.pending.push_back(pts);
        EncoderStatus::Success
    }

    fn receive_packet(&mut self) -> (EncoderStatus, Option<EncodedVideoPacket>) {
        if !(self.full || self.flushing || self.pending.len() > 1) {
            return (EncoderStatus::NeedMoreData, None);
        }

        match self.pending.pop_front() {
            Some(pts) => {
                let packet = EncodedVideoPacket {
                    data: vec![pts as u8; 4],
                    key_frame: pts % 2 == 0,
                    pts,
                };
                (EncoderStatus::Success, Some(packet))
            }
            None if self.flushing => (EncoderStatus::LimitReached, None),
            None => {
                self.full = false;
                (EncoderStatus::NeedMoreData, None)
            }
        }
    }
}

#[derive(Default)]
struct FakeLibrary {
    opened: Mutex<Vec<VideoCodecConfig>>,
    log: Arc<Mutex<SessionLog>>,
    stall_at: Option<i64>,
}

impl VideoCodecLibrary for FakeLibrary {
    fn name(&self) -> &str {
        "fake"
    }

    fn open(&self, config: &VideoCodecConfig) -> Result<Box<dyn VideoCodecSession>, EncoderError> {
        self.opened.lock().unwrap().push(config.clone());
        Ok(Box::new(FakeSession {
            log: Arc::clone(&self.log),
            pending: VecDeque::new(),
            stall_at: self.stall_at,
            full: false,
            flushing: false,
        }))
    }
}

fn frame(caps: VideoCaps, pts: i64) -> Packet {
    let mut packet = Packet::new(vec![16u8; caps.frame_size()], caps);
    packet.pts = pts;
    packet.dts = pts;
    packet.duration = 1;
    packet.time_base = Fraction::new(1, 30);
    packet
}

fn start(library: &Arc<FakeLibrary>, caps: VideoCaps) -> (Arc<Av1Encoder>, Arc<Mutex<Vec<Packet>>>) {
    let encoder = Av1Encoder::new(library.clone());
    encoder.set_input_caps(caps);
    encoder.set_state(ElementState::Playing).unwrap();

    let packets = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&packets);
    encoder
        .output()
        .connect(move |packet: &Packet| sink.lock().unwrap().push(packet.clone()));

    (encoder, packets)
}

#[test]
fn test_nv12_frames_are_converted() {
    let library = Arc::new(FakeLibrary::default());
    let caps = VideoCaps::new(PixelFormat::Nv12, 64, 48, Fraction::new(30, 1));
    let (encoder, _packets) = start(&library, caps);

    for pts in 0..10 {
        encoder.push(&frame(caps, pts));
    }
    encoder.set_state(ElementState::Null).unwrap();

    let opened = library.opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].codec, VideoCodecId::Av1);
    assert_eq!(opened[0].caps.format, PixelFormat::Yuv420p);

    let log = library.log.lock().unwrap();
    let i420_size = PixelFormat::Yuv420p.frame_size(64, 48);
    assert_eq!(log.sends.len(), 10);
    assert!(log.sends.iter().all(|&(size, _)| size == i420_size));
}

#[test]
fn test_rgba_frames_are_converted() {
    let library = Arc::new(FakeLibrary::default());
    let caps = VideoCaps::new(PixelFormat::Rgba, 32, 16, Fraction::new(30, 1));
    let (encoder, packets) = start(&library, caps);

    for pts in 0..3 {
        encoder.push(&frame(caps, pts));
    }
    encoder.set_state(ElementState::Null).unwrap();

    assert_eq!(library.log.lock().unwrap().sends.len(), 3);
    assert_eq!(packets.lock().unwrap().len(), 3);
}

#[test]
fn test_key_frames_and_timing() {
    let library = Arc::new(FakeLibrary::default());
    let caps = VideoCaps::new(PixelFormat::Yuv420p, 64, 48, Fraction::new(30, 1));
    let (encoder, packets) = start(&library, caps);

    // Default av1C record for 8-bit 4:2:0
    assert_eq!(encoder.headers(), vec![0x81, 0x1f, 0x0c, 0x00]);

    for pts in 0..4 {
        encoder.push(&frame(caps, pts));
    }

    {
        // One frame is still held by the session
        let packets = packets.lock().unwrap();
        assert_eq!(packets.len(), 3);
        let pts: Vec<i64> = packets.iter().map(|p| p.pts).collect();
        assert_eq!(pts, vec![0, 1, 2]);

        let keys: Vec<bool> = packets.iter().map(Packet::is_key_frame).collect();
        assert_eq!(keys, vec![true, false, true]);

        assert!(packets.iter().all(|p| p.time_base == Fraction::new(1, 30)));
        assert!(packets.iter().all(|p| p.duration == 1));
        assert!(packets.iter().all(|p| p.caps.as_compressed_video().is_some()));
    }

    assert_eq!(encoder.encoded_time_pts(), 4);
    encoder.set_state(ElementState::Null).unwrap();
}

#[test]
fn test_full_session_resends_frame() {
    let library = Arc::new(FakeLibrary {
        stall_at: Some(2),
        ..FakeLibrary::default()
    });
    let caps = VideoCaps::new(PixelFormat::Yuv420p, 64, 48, Fraction::new(30, 1));
    let (encoder, packets) = start(&library, caps);

    for pts in 0..4 {
        encoder.push(&frame(caps, pts));
    }
    encoder.set_state(ElementState::Null).unwrap();

    let sends: Vec<i64> = library.log.lock().unwrap().sends.iter().map(|&(_, pts)| pts).collect();
    assert_eq!(sends, vec![0, 1, 2, 2, 3]);

    let pts: Vec<i64> = packets.lock().unwrap().iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 1, 2, 3]);
}

#[test]
fn test_uninit_flushes_pending() {
    let library = Arc::new(FakeLibrary::default());
    let caps = VideoCaps::new(PixelFormat::Yuv420p, 64, 48, Fraction::new(30, 1));
    let (encoder, packets) = start(&library, caps);

    encoder.push(&frame(caps, 0));
    assert!(packets.lock().unwrap().is_empty());

    encoder.set_state(ElementState::Null).unwrap();

    assert!(library.log.lock().unwrap().flushed);
    let packets = packets.lock().unwrap();
    assert_eq!(packets.len(), 1);
    assert_eq!(packets[0].data(), &[0, 0, 0, 0]);
    assert!(packets[0].is_key_frame());
}

#[test]
fn test_short_frame_is_dropped() {
    let library = Arc::new(FakeLibrary::default());
    let caps = VideoCaps::new(PixelFormat::Nv12, 64, 48, Fraction::new(30, 1));
    let (encoder, _packets) = start(&library, caps);

    encoder.push(&Packet::new(vec![0u8; 10], caps));
    encoder.set_state(ElementState::Null).unwrap();

    assert!(library.log.lock().unwrap().sends.is_empty());
}
