// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the AAC encoder over an in-process codec library

use camera_pipeline::errors::EncoderError;
use camera_pipeline::media::caps::{AudioCaps, AudioCodecId, SampleFormat};
use camera_pipeline::media::encoders::native::{
    AudioCodecConfig, AudioCodecLibrary, AudioCodecSession,
};
use camera_pipeline::media::encoders::{AacEncoder, AudioEncoder, AudioSpecificConfig, nearest_sample_rate};
use camera_pipeline::media::{Fraction, Packet};
use camera_pipeline::{Element, ElementState};
use std::sync::{Arc, Mutex};

const FRAME_SAMPLES: usize = 1024;

/// Returns one 8-byte chunk per input call
struct FakeSession {
    calls: Arc<Mutex<Vec<usize>>>,
}

impl AudioCodecSession for FakeSession {
    fn input_samples(&self) -> usize {
        FRAME_SAMPLES
    }

    fn encode(&mut self, data: &[u8], samples: usize) -> Result<Vec<Vec<u8>>, EncoderError> {
        if data.is_empty() {
            return Err(EncoderError::EmptyInput);
        }

        self.calls.lock().unwrap().push(samples);
        Ok(vec![vec![0xAA; 8]])
    }

    fn flush(&mut self) -> Result<Vec<Vec<u8>>, EncoderError> {
        Ok(Vec::new())
    }
}

#[derive(Default)]
struct FakeLibrary {
    opened: Mutex<Vec<AudioCodecConfig>>,
    calls: Arc<Mutex<Vec<usize>>>,
}

impl AudioCodecLibrary for FakeLibrary {
    fn name(&self) -> &str {
        "fake"
    }

    fn open(&self, config: &AudioCodecConfig) -> Result<Box<dyn AudioCodecSession>, EncoderError> {
        self.opened.lock().unwrap().push(config.clone());
        Ok(Box::new(FakeSession {
            calls: Arc::clone(&self.calls),
        }))
    }
}

fn raw(caps: AudioCaps, samples: usize, pts: i64) -> Packet {
    let mut packet = Packet::new(vec![0u8; samples * caps.frame_bytes()], caps);
    packet.pts = pts;
    packet.duration = samples as i64;
    packet.time_base = Fraction::new(1, i64::from(caps.rate));
    packet
}

#[test]
fn test_cd_audio_headers() {
    let library = Arc::new(FakeLibrary::default());
    let encoder = AacEncoder::new(library.clone());
    encoder.set_input_caps(AudioCaps::interleaved(SampleFormat::S16, 2, 44100));
    encoder.set_state(ElementState::Playing).unwrap();

    let config = AudioSpecificConfig::parse(&encoder.headers()).unwrap();
    assert_eq!(config.object_type, 2);
    assert_eq!(config.sample_rate_index, 4);
    assert_eq!(config.channels, 2);

    let opened = library.opened.lock().unwrap();
    assert_eq!(opened.len(), 1);
    assert_eq!(opened[0].codec, AudioCodecId::Aac);
    assert_eq!(opened[0].caps.rate, 44100);

    drop(opened);
    encoder.set_state(ElementState::Null).unwrap();
}

#[test]
fn test_frames_are_fixed_size() {
    let library = Arc::new(FakeLibrary::default());
    let encoder = AacEncoder::new(library.clone());
    let caps = AudioCaps::interleaved(SampleFormat::S16, 2, 48000);
    encoder.set_input_caps(caps);
    encoder.set_state(ElementState::Playing).unwrap();

    let packets = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&packets);
    encoder
        .output()
        .connect(move |packet: &Packet| sink.lock().unwrap().push(packet.clone()));

    encoder.push(&raw(caps, 1500, 0));
    encoder.push(&raw(caps, 1500, 1500));
    encoder.set_state(ElementState::Null).unwrap();

    let calls = library.calls.lock().unwrap().clone();
    // Two full frames, then the remainder on stop
    assert_eq!(calls, vec![FRAME_SAMPLES, FRAME_SAMPLES, 3000 - 2 * FRAME_SAMPLES]);

    let packets = packets.lock().unwrap();
    assert_eq!(packets.len(), 3);
    let pts: Vec<i64> = packets.iter().map(|p| p.pts).collect();
    assert_eq!(pts, vec![0, 1024, 2048]);
    assert!(packets.iter().all(|p| p.time_base == Fraction::new(1, 48000)));
    assert_eq!(encoder.encoded_time_pts(), 3000);
}

#[test]
fn test_invalid_input_caps_rejected() {
    let library = Arc::new(FakeLibrary::default());
    let encoder = AacEncoder::new(library.clone());

    assert!(encoder.set_state(ElementState::Playing).is_err());
    assert_eq!(encoder.state(), ElementState::Null);
    assert!(library.opened.lock().unwrap().is_empty());
}

#[test]
fn test_empty_packet_never_reaches_library() {
    let library = Arc::new(FakeLibrary::default());
    let encoder = AacEncoder::new(library.clone());
    let caps = AudioCaps::interleaved(SampleFormat::S16, 1, 16000);
    encoder.set_input_caps(caps);
    encoder.set_state(ElementState::Playing).unwrap();

    encoder.push(&Packet::new(Vec::new(), caps));
    encoder.set_state(ElementState::Null).unwrap();

    assert!(library.calls.lock().unwrap().is_empty());
}

#[test]
fn test_nearest_rate_is_from_table() {
    assert_eq!(nearest_sample_rate(44000), 44100);
    assert_eq!(nearest_sample_rate(47000), 48000);
    assert_eq!(nearest_sample_rate(10000), 11025);
}
