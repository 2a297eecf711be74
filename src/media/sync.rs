// SPDX-License-Identifier: GPL-3.0-only

//! Audio/video packet synchronizer
//!
//! Encoders emit audio and video at their own pace. The muxer needs one
//! stream in ascending time order, so [`PacketSync`] retimes both streams
//! onto continuous clocks and a worker thread releases whichever head packet
//! is earlier.
//!
//! Video is held until a second frame arrives, because a frame's duration
//! is only known once the next one is seen.

use crate::constants::timeouts::SYNC_WAIT_MS;
use crate::element::notify::{Property, Signal};
use crate::element::worker::{LoopAction, Worker};
use crate::element::{Element, ElementState, Lifecycle, StateCell, lock};
use crate::errors::ElementResult;
use crate::media::packet::Packet;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info};

/// Registry key
pub const PACKET_SYNC_KEY: &str = "Utils/PacketSync";

#[derive(Debug, Default)]
struct SyncQueues {
    initialized: bool,
    run: bool,
    audio_clock: i64,
    video_clock: i64,
    last_video_pts: i64,
    video_id: i64,
    audio: VecDeque<Packet>,
    video: VecDeque<Packet>,
}

impl SyncQueues {
    fn reset(&mut self) {
        self.audio_clock = 0;
        self.video_clock = 0;
        self.last_video_pts = 0;
        self.video_id = -1;
        self.audio.clear();
        self.video.clear();
    }

    fn ready(&self, audio_enabled: bool) -> bool {
        self.video.len() >= 2 && (!audio_enabled || !self.audio.is_empty())
    }

    /// Head packet to release while running
    fn take_next(&mut self, audio_enabled: bool) -> Option<Packet> {
        if !audio_enabled {
            return self.video.pop_front();
        }

        let audio_s = self.audio.front()?.pts_seconds();
        let video_s = self.video.front()?.pts_seconds();

        if video_s <= audio_s {
            self.video.pop_front()
        } else {
            self.audio.pop_front()
        }
    }

    /// Head packet to release while flushing; audio wins ties
    fn take_flush(&mut self, audio_enabled: bool) -> Option<Packet> {
        let audio_s = self.audio.front().map(Packet::pts_seconds);
        let video_s = self.video.front().map(Packet::pts_seconds);

        match (audio_s, video_s) {
            (None, None) => None,
            (Some(_), None) => self.audio.pop_front(),
            (None, Some(_)) => self.video.pop_front(),
            (Some(a), Some(v)) => {
                if audio_enabled && a <= v {
                    self.audio.pop_front()
                } else {
                    self.video.pop_front()
                }
            }
        }
    }
}

struct SyncShared {
    queues: Mutex<SyncQueues>,
    packet_available: Condvar,
    audio_enabled: Property<bool>,
    discard_last: Property<bool>,
    output: Signal<Packet>,
}

impl SyncShared {
    /// One worker iteration: wait for a releasable packet and emit it
    fn step(&self) -> LoopAction {
        let audio_enabled = self.audio_enabled.get();
        let mut queues = lock(&self.queues);

        if !queues.run {
            return LoopAction::Stop;
        }

        if !queues.ready(audio_enabled) {
            queues = self
                .packet_available
                .wait_timeout(queues, Duration::from_millis(SYNC_WAIT_MS))
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| PoisonError::into_inner(e).0);

            if !queues.run {
                return LoopAction::Stop;
            }

            if !queues.ready(audio_enabled) {
                return LoopAction::Continue;
            }
        }

        let packet = queues.take_next(audio_enabled);
        drop(queues);

        if let Some(packet) = packet {
            self.output.emit(&packet);
        }

        LoopAction::Continue
    }

    /// Emit whatever is still queued, in time order
    fn flush(&self) {
        let audio_enabled = self.audio_enabled.get();
        let discard_last = self.discard_last.get();
        let mut flushed = 0usize;

        loop {
            let (packet, either_empty) = {
                let mut queues = lock(&self.queues);
                let packet = queues.take_flush(audio_enabled);
                (packet, queues.audio.is_empty() || queues.video.is_empty())
            };

            let Some(packet) = packet else {
                break;
            };

            self.output.emit(&packet);
            flushed += 1;

            if discard_last && either_empty {
                break;
            }
        }

        let mut queues = lock(&self.queues);
        let discarded = queues.audio.len() + queues.video.len();
        queues.audio.clear();
        queues.video.clear();

        debug!(flushed, discarded, "Packet synchronizer flushed");
    }
}

/// Interleaves audio and video into one time-ordered stream
pub struct PacketSync {
    state: StateCell,
    shared: Arc<SyncShared>,
    worker: Mutex<Option<Worker>>,
}

impl PacketSync {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            shared: Arc::new(SyncShared {
                queues: Mutex::new(SyncQueues::default()),
                packet_available: Condvar::new(),
                audio_enabled: Property::new(true),
                discard_last: Property::new(false),
                output: Signal::new(),
            }),
            worker: Mutex::new(None),
        }
    }

    /// Whether video waits for an audio counterpart
    pub fn audio_enabled(&self) -> bool {
        self.shared.audio_enabled.get()
    }

    pub fn set_audio_enabled(&self, enabled: bool) {
        if self.shared.audio_enabled.set(enabled) {
            self.shared.packet_available.notify_all();
        }
    }

    pub fn reset_audio_enabled(&self) {
        self.set_audio_enabled(true);
    }

    pub fn audio_enabled_changed(&self) -> &Signal<bool> {
        self.shared.audio_enabled.changed()
    }

    /// Whether the flush stops once either stream runs dry
    pub fn discard_last(&self) -> bool {
        self.shared.discard_last.get()
    }

    pub fn set_discard_last(&self, discard: bool) {
        self.shared.discard_last.set(discard);
    }

    pub fn reset_discard_last(&self) {
        self.set_discard_last(false);
    }

    pub fn discard_last_changed(&self) -> &Signal<bool> {
        self.shared.discard_last.changed()
    }

    /// Number of queued (audio, video) packets
    pub fn queued(&self) -> (usize, usize) {
        let queues = lock(&self.shared.queues);
        (queues.audio.len(), queues.video.len())
    }

    fn enqueue_audio(queues: &mut SyncQueues, packet: &Packet) {
        let mut pkt = packet.clone();
        pkt.pts = queues.audio_clock;
        queues.audio_clock += packet.duration;
        queues.audio.push_back(pkt);
    }

    fn enqueue_video(queues: &mut SyncQueues, packet: &Packet) {
        let mut pkt = packet.clone();

        match queues.video.back_mut() {
            None => {
                queues.video_clock = 0;
            }
            Some(last) if queues.video_id == packet.id => {
                let duration = packet.pts - queues.last_video_pts;
                last.duration = duration;
                queues.video_clock += duration;
            }
            Some(last) => {
                queues.video_clock += last.duration;
            }
        }

        pkt.pts = queues.video_clock;
        queues.last_video_pts = packet.pts;
        queues.video_id = packet.id;
        queues.video.push_back(pkt);
    }
}

impl Default for PacketSync {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for PacketSync {
    fn init(&self) -> ElementResult<()> {
        {
            let mut queues = lock(&self.shared.queues);
            queues.reset();
            queues.run = true;
            queues.initialized = true;
        }

        let shared = Arc::clone(&self.shared);
        let worker = Worker::start("packet-sync", move || shared.step());
        *lock(&self.worker) = Some(worker);

        info!(
            audio_enabled = self.audio_enabled(),
            discard_last = self.discard_last(),
            "Packet synchronizer started"
        );

        Ok(())
    }

    fn uninit(&self) {
        {
            let mut queues = lock(&self.shared.queues);

            if !queues.initialized {
                return;
            }

            queues.initialized = false;
            queues.run = false;
            self.shared.packet_available.notify_all();
        }

        if let Some(mut worker) = lock(&self.worker).take() {
            worker.stop();
        }

        self.shared.flush();
    }
}

impl Element for PacketSync {
    fn name(&self) -> &str {
        "PacketSync"
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

        let mut queues = lock(&self.shared.queues);

        if !queues.initialized {
            return;
        }

        let kind = packet.kind();

        if kind.is_audio() {
            if !self.audio_enabled() {
                return;
            }

            Self::enqueue_audio(&mut queues, packet);
        } else if kind.is_video() {
            Self::enqueue_video(&mut queues, packet);
        } else {
            return;
        }

        self.shared.packet_available.notify_all();
    }

    fn output(&self) -> &Signal<Packet> {
        &self.shared.output
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl Drop for PacketSync {
    fn drop(&mut self) {
        self.uninit();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::caps::{
        AudioCaps, AudioCodecId, CompressedAudioCaps, CompressedVideoCaps, PixelFormat,
        SampleFormat, VideoCaps, VideoCodecId,
    };
    use crate::media::fraction::Fraction;

    fn video(pts: i64, id: i64) -> Packet {
        let raw = VideoCaps::new(PixelFormat::Yuv420p, 16, 16, Fraction::from_int(30));
        let mut packet = Packet::new(vec![1u8], CompressedVideoCaps::new(VideoCodecId::Vp8, raw, 0));
        packet.pts = pts;
        packet.duration = 1;
        packet.time_base = Fraction::new(1, 30);
        packet.id = id;
        packet
    }

    fn audio(duration: i64) -> Packet {
        let raw = AudioCaps::interleaved(SampleFormat::S16, 1, 8000);
        let mut packet = Packet::new(vec![1u8], CompressedAudioCaps::new(AudioCodecId::Opus, raw, 0));
        packet.duration = duration;
        packet.time_base = Fraction::new(1, 8000);
        packet
    }

    #[test]
    fn test_video_retiming() {
        let mut queues = SyncQueues::default();
        queues.reset();

        PacketSync::enqueue_video(&mut queues, &video(100, 7));
        PacketSync::enqueue_video(&mut queues, &video(103, 7));
        PacketSync::enqueue_video(&mut queues, &video(50, 8));

        let pts: Vec<i64> = queues.video.iter().map(|p| p.pts).collect();
        assert_eq!(pts, vec![0, 3, 4]);
        assert_eq!(queues.video[0].duration, 3);
    }

    #[test]
    fn test_audio_retiming() {
        let mut queues = SyncQueues::default();
        queues.reset();

        PacketSync::enqueue_audio(&mut queues, &audio(160));
        PacketSync::enqueue_audio(&mut queues, &audio(160));

        assert_eq!(queues.audio[1].pts, 160);
        assert_eq!(queues.audio_clock, 320);
    }

    #[test]
    fn test_flush_prefers_audio_on_ties() {
        let mut queues = SyncQueues::default();
        queues.audio.push_back(audio(160));
        queues.video.push_back(video(0, 1));

        assert!(queues.take_flush(true).unwrap().kind().is_audio());
        assert!(queues.take_flush(true).unwrap().kind().is_video());
        assert!(queues.take_flush(true).is_none());
    }

    #[test]
    fn test_uninit_without_init_is_noop() {
        let sync = PacketSync::new();
        sync.set_state(ElementState::Null).unwrap();
        assert_eq!(sync.state(), ElementState::Null);
        assert_eq!(sync.queued(), (0, 0));
    }

    #[test]
    fn test_property_notifies_on_change_only() {
        let sync = PacketSync::new();
        let hits = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hits_clone = Arc::clone(&hits);
        sync.audio_enabled_changed().connect(move |_| {
            hits_clone.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

        sync.set_audio_enabled(true);
        sync.set_audio_enabled(false);
        sync.set_audio_enabled(false);

        assert_eq!(hits.load(std::sync::atomic::Ordering::SeqCst), 1);
    }
}
