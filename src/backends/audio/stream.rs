// SPDX-License-Identifier: GPL-3.0-only

//! GStreamer audio streams on PipeWire nodes
//!
//! Capture: `pipewiresrc ! audioconvert ! audioresample ! caps ! appsink`,
//! with the appsink callback filling an [`AudioBuffer`].
//!
//! Playback: `appsrc ! audioconvert ! audioresample ! pipewiresink`, fed by
//! a worker that drains the buffer one latency period at a time.

use super::Direction;
use super::buffer::AudioBuffer;
use crate::constants::timeouts;
use crate::element::worker::{LoopAction, Worker};
use crate::errors::DeviceError;
use crate::media::caps::AudioCaps;
use crate::media::fraction::Fraction;
use crate::media::packet::Packet;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How long the pusher waits for staged data before re-checking its stop flag
const PUSH_WAIT: Duration = Duration::from_millis(100);

/// Bytes in one latency period of `caps`
pub fn period_bytes(caps: &AudioCaps, latency_ms: u32) -> usize {
    let bytes = caps.frame_bytes() as u64 * u64::from(caps.rate) * u64::from(latency_ms) / 1000;
    let frame = caps.frame_bytes().max(1) as u64;

    // Whole frames only
    (bytes / frame * frame) as usize
}

/// Buffer capacity for a stream: two latency periods
pub fn max_buffer_size(caps: &AudioCaps, latency_ms: u32) -> usize {
    2 * period_bytes(caps, latency_ms)
}

fn stream_error(e: impl std::fmt::Display) -> DeviceError {
    DeviceError::StreamFailed(e.to_string())
}

/// Point a PipeWire element at `device` with whichever property it has
fn set_target(element: &gst::Element, device: &str) {
    for property in ["target-object", "path"] {
        if element.find_property(property).is_some() {
            element.set_property_from_str(property, device);
            debug!(element = %element.name(), property, device, "Set stream target");
            return;
        }
    }

    warn!(element = %element.name(), "PipeWire element has no target property");
}

/// One open capture or playback stream
pub struct AudioStream {
    direction: Direction,
    caps: AudioCaps,
    pipeline: gst::Pipeline,
    buffer: Arc<AudioBuffer>,
    pusher: Option<Worker>,
    period_bytes: usize,
    /// Samples handed out by `read`, used as the next packet's pts
    read_pts: AtomicI64,
}

impl AudioStream {
    pub fn open(
        device: &str,
        direction: Direction,
        caps: AudioCaps,
        latency_ms: u32,
    ) -> Result<Self, DeviceError> {
        gst::init().map_err(stream_error)?;

        let caps_string = caps.to_gst_caps_string();
        let description = match direction {
            Direction::Input => format!(
                "pipewiresrc name=pw ! audioconvert ! audioresample ! {} ! appsink name=sink sync=false",
                caps_string
            ),
            Direction::Output => {
                "appsrc name=src format=time is-live=true do-timestamp=true ! audioconvert ! audioresample ! pipewiresink name=pw"
                    .to_string()
            }
        };

        let pipeline = gst::parse::launch(&description)
            .map_err(stream_error)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| stream_error("Failed to downcast to Pipeline"))?;

        if let Some(element) = pipeline.by_name("pw") {
            set_target(&element, device);
        }

        let period_bytes = period_bytes(&caps, latency_ms);
        let buffer = Arc::new(AudioBuffer::new(max_buffer_size(&caps, latency_ms)));
        let mut pusher = None;

        match direction {
            Direction::Input => {
                let appsink = pipeline
                    .by_name("sink")
                    .and_then(|element| element.downcast::<gst_app::AppSink>().ok())
                    .ok_or_else(|| stream_error("Failed to find appsink"))?;

                let captured = Arc::clone(&buffer);
                appsink.set_callbacks(
                    gst_app::AppSinkCallbacks::builder()
                        .new_sample(move |appsink| {
                            let sample = appsink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                            let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                            let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                            captured.push_captured(map.as_slice());

                            Ok(gst::FlowSuccess::Ok)
                        })
                        .build(),
                );
            }
            Direction::Output => {
                let appsrc = pipeline
                    .by_name("src")
                    .and_then(|element| element.downcast::<gst_app::AppSrc>().ok())
                    .ok_or_else(|| stream_error("Failed to find appsrc"))?;

                let gst_caps = caps_string.parse::<gst::Caps>().map_err(stream_error)?;
                appsrc.set_caps(Some(&gst_caps));

                let staged = Arc::clone(&buffer);
                pusher = Some(Worker::start("audio-playback", move || {
                    let data = staged.read(period_bytes, PUSH_WAIT);

                    if staged.is_closed() {
                        return LoopAction::Stop;
                    }

                    if data.is_empty() {
                        return LoopAction::Continue;
                    }

                    match appsrc.push_buffer(gst::Buffer::from_slice(data)) {
                        Ok(_) => LoopAction::Continue,
                        Err(e) => {
                            warn!(error = ?e, "Playback stream refused data");
                            LoopAction::Stop
                        }
                    }
                }));
            }
        }

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let _ = pipeline.set_state(gst::State::Null);
            buffer.close();

            return Err(stream_error(format!("{}: {:?}", device, e)));
        }

        info!(device, direction = %direction, caps = %caps, latency_ms, "Audio stream started");

        Ok(Self {
            direction,
            caps,
            pipeline,
            buffer,
            pusher,
            period_bytes,
            read_pts: AtomicI64::new(0),
        })
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn caps(&self) -> AudioCaps {
        self.caps
    }

    /// Up to one latency period of captured audio
    pub fn read(&self) -> Packet {
        let data = self.buffer.read(
            self.period_bytes,
            Duration::from_millis(timeouts::DEVICE_WAIT_MS),
        );

        if data.is_empty() {
            return Packet::default();
        }

        let mut packet = Packet::new(data, self.caps);
        let samples = packet.samples() as i64;
        packet.pts = self.read_pts.fetch_add(samples, Ordering::SeqCst);
        packet.duration = samples;
        packet.time_base = Fraction::new(1, i64::from(self.caps.rate));

        packet
    }

    /// Stage a packet for playback
    pub fn write(&self, packet: &Packet) -> Result<(), DeviceError> {
        if packet.is_empty() {
            return Err(DeviceError::EmptyPacket);
        }

        let staged = self.buffer.write(
            packet.data(),
            Duration::from_millis(timeouts::DEVICE_WAIT_MS),
        );

        if staged {
            Ok(())
        } else {
            Err(stream_error("Timed out waiting for buffer space"))
        }
    }

    /// Wake waiters, stop the pipeline and join the pusher
    pub fn close(&mut self) {
        self.buffer.close();

        if let Some(mut pusher) = self.pusher.take() {
            pusher.stop();
        }

        if let Err(e) = self.pipeline.set_state(gst::State::Null) {
            warn!(error = ?e, "Failed to stop audio stream");
        }

        debug!(direction = %self.direction, "Audio stream stopped");
    }
}

impl Drop for AudioStream {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::caps::SampleFormat;

    #[test]
    fn test_period_size() {
        let caps = AudioCaps::interleaved(SampleFormat::S16, 2, 48000);
        assert_eq!(period_bytes(&caps, 25), 4800);
        assert_eq!(max_buffer_size(&caps, 25), 9600);

        let mono = AudioCaps::interleaved(SampleFormat::S16, 1, 44100);
        assert_eq!(period_bytes(&mono, 10) % 2, 0);
    }
}
