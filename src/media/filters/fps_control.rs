// SPDX-License-Identifier: GPL-3.0-only

//! Frame rate normalization
//!
//! Maps incoming video frames onto the slots of a fixed output frame rate.
//! Frames landing in an already used slot are dropped; with `fill_gaps` the
//! previous frame is repeated for every skipped slot. Output frames are
//! retimed to a frame counter with a `1/fps` time base.

use crate::constants::defaults;
use crate::element::notify::{Property, Signal};
use crate::element::{Element, ElementState, Lifecycle, StateCell, lock};
use crate::errors::ElementResult;
use crate::media::fraction::Fraction;
use crate::media::packet::Packet;
use std::any::Any;
use std::sync::{Arc, Mutex};

/// Registry key
pub const FPS_CONTROL_KEY: &str = "VideoFilter/FpsControl";

#[derive(Debug)]
struct FpsState {
    initialized: bool,
    /// Next output frame number
    next_pts: i64,
    /// Output slot of the previous input frame, -1 before the first one
    prev_slot: i64,
    id: i64,
    prev_packet: Option<Packet>,
}

impl Default for FpsState {
    fn default() -> Self {
        Self {
            initialized: false,
            next_pts: 0,
            prev_slot: -1,
            id: -1,
            prev_packet: None,
        }
    }
}

/// Retimes video to a constant frame rate
pub struct FpsControl {
    state: StateCell,
    fps: Property<Fraction>,
    fill_gaps: Property<bool>,
    inner: Mutex<FpsState>,
    output: Signal<Packet>,
}

impl FpsControl {
    pub fn new() -> Self {
        Self {
            state: StateCell::new(),
            fps: Property::new(Fraction::from_int(defaults::FPS)),
            fill_gaps: Property::new(false),
            inner: Mutex::new(FpsState::default()),
            output: Signal::new(),
        }
    }

    pub fn fps(&self) -> Fraction {
        self.fps.get()
    }

    pub fn set_fps(&self, fps: Fraction) {
        self.fps.set(fps);
    }

    pub fn reset_fps(&self) {
        self.set_fps(Fraction::from_int(defaults::FPS));
    }

    pub fn fps_changed(&self) -> &Signal<Fraction> {
        self.fps.changed()
    }

    pub fn fill_gaps(&self) -> bool {
        self.fill_gaps.get()
    }

    pub fn set_fill_gaps(&self, fill: bool) {
        self.fill_gaps.set(fill);
    }

    pub fn reset_fill_gaps(&self) {
        self.set_fill_gaps(false);
    }

    pub fn fill_gaps_changed(&self) -> &Signal<bool> {
        self.fill_gaps.changed()
    }

    fn slot(&self, packet: &Packet) -> i64 {
        (packet.pts as f64 * packet.time_base.value() * self.fps.get().value()) as i64
    }

    /// Whether `packet` would be dropped by [`Element::push`]
    ///
    /// Lets callers skip expensive conversion for frames that fall into an
    /// already emitted slot.
    pub fn discard(&self, packet: &Packet) -> bool {
        if packet.is_empty() {
            return true;
        }

        let slot = self.slot(packet);
        let inner = lock(&self.inner);

        inner.prev_slot >= 0 && inner.id == packet.id && slot == inner.prev_slot
    }

    /// Start counting output frames from zero again
    pub fn restart(&self) {
        let mut inner = lock(&self.inner);
        inner.next_pts = 0;
        inner.prev_slot = -1;
        inner.id = -1;
        inner.prev_packet = None;
    }

    fn retime(&self, packet: &Packet, pts: i64) -> Packet {
        let mut out = packet.clone();
        out.pts = pts;
        out.dts = pts;
        out.duration = 1;
        out.time_base = self.fps.get().invert();
        out
    }
}

impl Default for FpsControl {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle for FpsControl {
    fn init(&self) -> ElementResult<()> {
        self.restart();
        lock(&self.inner).initialized = true;
        Ok(())
    }

    fn uninit(&self) {
        let mut inner = lock(&self.inner);
        inner.initialized = false;
        inner.prev_packet = None;
    }
}

impl Element for FpsControl {
    fn name(&self) -> &str {
        "FpsControl"
    }

    fn state_cell(&self) -> &StateCell {
        &self.state
    }

    fn set_state(&self, state: ElementState) -> ElementResult<()> {
        self.state.drive(self.name(), state, self)
    }

    fn push(&self, packet: &Packet) {
        if packet.is_empty() || self.state.is_paused() {
            return;
        }

        let slot = self.slot(packet);
        let fill_gaps = self.fill_gaps.get();
        let mut out = Vec::new();

        {
            let mut inner = lock(&self.inner);

            if !inner.initialized {
                return;
            }

            let first = inner.prev_slot < 0;
            let same_id = inner.id == packet.id;

            if !first && same_id && slot == inner.prev_slot {
                return;
            }

            let frames_diff = if first || slot <= inner.prev_slot || !same_id {
                1
            } else {
                slot - inner.prev_slot
            };

            let pts = if fill_gaps {
                if let Some(prev) = inner.prev_packet.clone() {
                    for _ in 1..frames_diff {
                        out.push(self.retime(&prev, inner.next_pts));
                        inner.next_pts += 1;
                    }
                }

                inner.next_pts
            } else if first {
                inner.next_pts
            } else {
                inner.next_pts - 1 + frames_diff
            };

            let frame = self.retime(packet, pts);
            inner.next_pts = pts + 1;
            inner.prev_packet = Some(frame.clone());
            inner.id = packet.id;
            inner.prev_slot = slot;
            out.push(frame);
        }

        for frame in out {
            self.output.emit(&frame);
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
    use crate::media::caps::{PixelFormat, VideoCaps};

    fn frame(pts: i64, id: i64) -> Packet {
        let caps = VideoCaps::new(PixelFormat::Yuv420p, 2, 2, Fraction::from_int(60));
        let mut packet = Packet::zeroed(caps.frame_size(), caps);
        packet.pts = pts;
        packet.time_base = Fraction::new(1, 60);
        packet.id = id;
        packet
    }

    fn started(fill_gaps: bool) -> (FpsControl, Arc<Mutex<Vec<i64>>>) {
        let control = FpsControl::new();
        control.set_fill_gaps(fill_gaps);
        let pts = Arc::new(Mutex::new(Vec::new()));
        let pts_clone = Arc::clone(&pts);
        control
            .output()
            .connect(move |p| pts_clone.lock().unwrap().push(p.pts));
        control.set_state(ElementState::Playing).unwrap();
        (control, pts)
    }

    #[test]
    fn test_drops_frames_in_same_slot() {
        let (control, pts) = started(false);

        control.push(&frame(0, 1));
        assert!(control.discard(&frame(1, 1)));
        control.push(&frame(1, 1));
        control.push(&frame(2, 1));

        assert_eq!(*pts.lock().unwrap(), vec![0, 1]);
    }

    #[test]
    fn test_skipped_slots_advance_counter() {
        let (control, pts) = started(false);

        control.push(&frame(0, 1));
        control.push(&frame(6, 1));

        assert_eq!(*pts.lock().unwrap(), vec![0, 3]);
    }

    #[test]
    fn test_fill_gaps_repeats_previous() {
        let (control, pts) = started(true);

        control.push(&frame(0, 1));
        control.push(&frame(6, 1));

        assert_eq!(*pts.lock().unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_id_change_is_continuous() {
        let (control, pts) = started(false);

        control.push(&frame(30, 1));
        control.push(&frame(0, 2));
        control.restart();
        control.push(&frame(90, 2));

        assert_eq!(*pts.lock().unwrap(), vec![0, 1, 0]);
    }
}
