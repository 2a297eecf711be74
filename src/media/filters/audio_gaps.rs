// SPDX-License-Identifier: GPL-3.0-only

//! Fixed-size audio framing with gap filling
//!
//! Audio encoders consume fixed-size frames, while capture delivers whatever
//! the device produced. [`FillAudioGaps`] converts each input to the encoder
//! format, optionally inserts silence where timestamps jump, and re-emits the
//! audio in `output_samples` chunks with continuous timestamps.

use super::audio_convert::AudioConverter;
use crate::element::notify::{Property, Signal};
use crate::element::{Element, ElementState, Lifecycle, StateCell, lock};
use crate::errors::ElementResult;
use crate::media::caps::{AudioCaps, SampleFormat};
use crate::media::fraction::Fraction;
use crate::media::packet::Packet;
use std::any::Any;
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Registry key
pub const FILL_AUDIO_GAPS_KEY: &str = "AudioFilter/FillAudioGaps";

#[derive(Debug, Default)]
struct GapsState {
    initialized: bool,
    converter: AudioConverter,
    buffer: Vec<u8>,
    buffer_caps: AudioCaps,
    /// Timestamp of the first buffered sample, in samples
    buffer_pts: i64,
    buffer_id: i64,
    buffer_index: i32,
    /// Rewritten timestamp when not filling gaps
    pts: i64,
    id: i64,
    prev_pts: i64,
    prev_duration: i64,
}

impl GapsState {
    fn reset(&mut self, output_caps: AudioCaps) {
        self.converter.set_output_caps(output_caps);
        self.buffer.clear();
        self.buffer_caps = output_caps;
        self.buffer_pts = 0;
        self.buffer_id = -1;
        self.buffer_index = 0;
        self.pts = -1;
        self.id = -1;
        self.prev_pts = -1;
        self.prev_duration = -1;
    }

    fn buffered_samples(&self) -> usize {
        self.buffer_caps.samples_in(self.buffer.len())
    }

    /// Remove up to `samples` samples from the front of the buffer
    fn pop(&mut self, samples: usize) -> Option<Packet> {
        let bytes = (samples * self.buffer_caps.frame_bytes()).min(self.buffer.len());

        if bytes == 0 {
            return None;
        }

        let data: Vec<u8> = self.buffer.drain(..bytes).collect();
        let mut packet = Packet::new(data, self.buffer_caps);
        let popped = packet.samples() as i64;
        packet.pts = self.buffer_pts;
        packet.dts = self.buffer_pts;
        packet.duration = popped;
        packet.time_base = Fraction::new(1, i64::from(self.buffer_caps.rate));
        packet.id = self.buffer_id;
        packet.index = self.buffer_index;
        self.buffer_pts += popped;

        Some(packet)
    }

    fn pop_all(&mut self) -> Option<Packet> {
        let samples = self.buffered_samples();
        self.pop(samples)
    }
}

/// Converts, gap-fills and re-frames raw audio
pub struct FillAudioGaps {
    state: StateCell,
    output_caps: Property<AudioCaps>,
    output_samples: Property<usize>,
    fill_gaps: Property<bool>,
    inner: Mutex<GapsState>,
    output: Signal<Packet>,
}

impl FillAudioGaps {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            output_caps: Property::default(),
            output_samples: Property::new(0),
            fill_gaps: Property::new(false),
            inner: Mutex::new(GapsState::default()),
            output: Signal::new(),
        }
    }

    pub fn output_caps(&self) -> AudioCaps {
        self.output_caps.get()
    }

    pub fn set_output_caps(&self, caps: AudioCaps) {
        if self.output_caps.get() == caps {
            return;
        }

        lock(&self.inner).converter.set_output_caps(caps);
        self.output_caps.set(caps);
    }

    pub fn output_caps_changed(&self) -> &Signal<AudioCaps> {
        self.output_caps.changed()
    }

    /// Chunk size in samples; 0 emits everything at once
    pub fn output_samples(&self) -> usize {
        self.output_samples.get()
    }

    pub fn set_output_samples(&self, samples: usize) {
        self.output_samples.set(samples);
    }

    pub fn output_samples_changed(&self) -> &Signal<usize> {
        self.output_samples.changed()
    }

    pub fn fill_gaps(&self) -> bool {
        self.fill_gaps.get()
    }

    pub fn set_fill_gaps(&self, fill: bool) {
        self.fill_gaps.set(fill);
    }

    pub fn fill_gaps_changed(&self) -> &Signal<bool> {
        self.fill_gaps.changed()
    }

    pub fn reset_output_caps(&self) {
        self.set_output_caps(AudioCaps::default());
    }

    pub fn reset_output_samples(&self) {
        self.set_output_samples(0);
    }

    pub fn reset_fill_gaps(&self) {
        self.set_fill_gaps(false);
    }

    fn process(&self, inner: &mut GapsState, src: Packet) -> Vec<Packet> {
        let Some(caps) = src.audio_caps().copied() else {
            return Vec::new();
        };

        let mut out = Vec::new();
        let fill_gaps = self.fill_gaps.get();
        let rate = f64::from(caps.rate);

        // A format change ends the current run
        if caps != inner.buffer_caps {
            out.extend(inner.pop_all());
            inner.buffer_caps = caps;
        }

        if fill_gaps {
            let gap = if inner.id == src.id {
                (src.pts - inner.prev_pts - inner.prev_duration).max(0)
            } else {
                0
            };
            let silence = (gap as f64 * src.time_base.value() * rate).round() as usize;

            if silence > 0 {
                debug!(samples = silence, "Filling audio gap");
                let fill = if caps.format == SampleFormat::U8 { 0x80 } else { 0 };
                let bytes = silence * caps.frame_bytes();
                inner.buffer.resize(inner.buffer.len() + bytes, fill);
            }
        } else {
            if inner.pts < 0 {
                inner.pts = 0;
            } else if src.id == inner.id {
                inner.pts += src.pts - inner.prev_pts;
            } else {
                inner.pts += inner.prev_duration;
            }

            if inner.buffer.is_empty() {
                inner.buffer_pts = (inner.pts as f64 * src.time_base.value() * rate).round() as i64;
            }
        }

        inner.buffer.extend_from_slice(src.data());
        inner.buffer_id = src.id;
        inner.buffer_index = src.index;

        let output_samples = self.output_samples.get();

        if output_samples > 0 {
            while inner.buffered_samples() >= output_samples {
                out.extend(inner.pop(output_samples));
            }
        } else {
            out.extend(inner.pop_all());
        }

        inner.id = src.id;
        inner.prev_pts = src.pts;
        inner.prev_duration = src.duration;

        out
    }
}

impl Default for FillAudioGaps {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for FillAudioGaps {
    fn init(&self) -> ElementResult<()> {
        let mut inner = lock(&self.inner);
        inner.reset(self.output_caps.get());
        inner.initialized = true;

        Ok(())
    }

    fn uninit(&self) {
        let remainder = {
            let mut inner = lock(&self.inner);

            if !inner.initialized {
                return;
            }

            inner.initialized = false;
            let remainder = inner.pop_all();
            inner.buffer.clear();
            remainder
        };

        if let Some(packet) = remainder {
            self.output.emit(&packet);
        }
    }
}

impl Element for FillAudioGaps {
    fn name(&self) -> &str {
        "FillAudioGaps"
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

        let chunks = {
            let mut inner = lock(&self.inner);

            if !inner.initialized {
                return;
            }

            let Some(src) = inner.converter.convert(packet) else {
                warn!(caps = %packet.caps, "Dropping audio packet that cannot be converted");
                return;
            };

            if src.is_empty() {
                return;
            }

            self.process(&mut inner, src)
        };

        for chunk in chunks {
            self.output.emit(&chunk);
        }
    }

    fn output(&self) -> &Signal<Packet> {
        &self.output
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_s16() -> AudioCaps {
        AudioCaps::interleaved(SampleFormat::S16, 1, 8000)
    }

    fn packet(samples: usize, pts: i64, id: i64) -> Packet {
        let mut packet = Packet::new(vec![1u8; samples * 2], mono_s16());
        packet.pts = pts;
        packet.duration = samples as i64;
        packet.time_base = Fraction::new(1, 8000);
        packet.id = id;
        packet
    }

    fn collect(element: &FillAudioGaps) -> Arc<Mutex<Vec<Packet>>> {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let sink_clone = Arc::clone(&sink);
        element.output().connect(move |p| sink_clone.lock().unwrap().push(p.clone()));
        sink
    }

    #[test]
    fn test_chunks_to_output_samples() {
        let element = FillAudioGaps::new();
        element.set_output_caps(mono_s16());
        element.set_output_samples(100);
        let sink = collect(&element);
        element.set_state(ElementState::Playing).unwrap();

        element.push(&packet(250, 0, 1));
        {
            let out = sink.lock().unwrap();
            assert_eq!(out.len(), 2);
            assert_eq!(out[0].pts, 0);
            assert_eq!(out[1].pts, 100);
            assert_eq!(out[1].duration, 100);
        }

        element.set_state(ElementState::Null).unwrap();
        let out = sink.lock().unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out[2].samples(), 50);
    }

    #[test]
    fn test_fills_gap_with_silence() {
        let element = FillAudioGaps::new();
        element.set_output_caps(mono_s16());
        element.set_fill_gaps(true);
        let sink = collect(&element);
        element.set_state(ElementState::Playing).unwrap();

        element.push(&packet(100, 0, 1));
        element.push(&packet(100, 150, 1));

        let out = sink.lock().unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].pts, 100);
        assert_eq!(out[1].samples(), 150);
        assert!(out[1].data()[..100].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_paused_discards_input() {
        let element = FillAudioGaps::new();
        let sink = collect(&element);
        element.set_state(ElementState::Paused).unwrap();
        element.push(&packet(10, 0, 1));
        assert!(sink.lock().unwrap().is_empty());
    }

    #[test]
    fn test_uninit_when_never_started() {
        let element = FillAudioGaps::new();
        element.set_state(ElementState::Null).unwrap();
        assert_eq!(element.state(), ElementState::Null);
    }
}
