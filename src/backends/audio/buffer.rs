// SPDX-License-Identifier: GPL-3.0-only

//! Bounded byte buffer between a device stream and its user
//!
//! Capture streams overwrite the oldest bytes when the buffer is full;
//! playback writers wait for room instead. Both sides wait with a timeout
//! and give up once the buffer is closed.

use crate::element::lock;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
struct BufferState {
    data: Vec<u8>,
    capacity: usize,
    closed: bool,
}

/// Byte queue with "not empty" and "not full" wake-ups
#[derive(Debug, Default)]
pub struct AudioBuffer {
    state: Mutex<BufferState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl AudioBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            state: Mutex::new(BufferState {
                data: Vec::with_capacity(capacity),
                capacity,
                closed: false,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        lock(&self.state).capacity
    }

    pub fn set_capacity(&self, capacity: usize) {
        lock(&self.state).capacity = capacity;
        self.not_full.notify_all();
    }

    pub fn len(&self) -> usize {
        lock(&self.state).data.len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.state).data.is_empty()
    }

    /// Append captured bytes, keeping only the newest `capacity` bytes
    pub fn push_captured(&self, bytes: &[u8]) {
        let mut state = lock(&self.state);
        let capacity = state.capacity;

        if capacity > 0 && bytes.len() >= capacity {
            state.data.clear();
            state.data.extend_from_slice(&bytes[bytes.len() - capacity..]);
        } else {
            state.data.extend_from_slice(bytes);

            if capacity > 0 && state.data.len() > capacity {
                let excess = state.data.len() - capacity;
                state.data.drain(..excess);
            }
        }

        self.not_empty.notify_all();
    }

    /// Append bytes for playback, waiting up to `timeout` while full
    ///
    /// Returns false on timeout or when the buffer is closed.
    pub fn write(&self, bytes: &[u8], timeout: Duration) -> bool {
        let state = lock(&self.state);

        let (mut state, result) = self
            .not_full
            .wait_timeout_while(state, timeout, |state| {
                !state.closed && state.capacity > 0 && state.data.len() >= state.capacity
            })
            .unwrap_or_else(|e| e.into_inner());

        if state.closed || result.timed_out() {
            return false;
        }

        state.data.extend_from_slice(bytes);
        self.not_empty.notify_all();

        true
    }

    /// Take up to `max` bytes from the front, waiting up to `timeout` for
    /// data. Returns an empty vector on timeout or when closed.
    pub fn read(&self, max: usize, timeout: Duration) -> Vec<u8> {
        let state = lock(&self.state);

        let (mut state, _) = self
            .not_empty
            .wait_timeout_while(state, timeout, |state| !state.closed && state.data.is_empty())
            .unwrap_or_else(|e| e.into_inner());

        if state.closed || state.data.is_empty() {
            return Vec::new();
        }

        let count = if max == 0 {
            state.data.len()
        } else {
            max.min(state.data.len())
        };
        let bytes: Vec<u8> = state.data.drain(..count).collect();

        if state.data.len() < state.capacity || state.capacity == 0 {
            self.not_full.notify_all();
        }

        bytes
    }

    /// Drop the contents and wake every waiter; later calls fail fast
    pub fn close(&self) {
        let mut state = lock(&self.state);
        state.closed = true;
        state.data.clear();
        drop(state);

        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    const SHORT: Duration = Duration::from_millis(20);

    #[test]
    fn test_capture_keeps_newest_bytes() {
        let buffer = AudioBuffer::new(4);
        buffer.push_captured(&[1, 2, 3]);
        buffer.push_captured(&[4, 5]);

        assert_eq!(buffer.read(0, SHORT), vec![2, 3, 4, 5]);

        buffer.push_captured(&[9, 8, 7, 6, 5, 4]);
        assert_eq!(buffer.read(2, SHORT), vec![7, 6]);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_read_times_out_when_empty() {
        let buffer = AudioBuffer::new(8);
        assert!(buffer.read(4, SHORT).is_empty());
    }

    #[test]
    fn test_write_waits_for_room() {
        let buffer = Arc::new(AudioBuffer::new(4));
        assert!(buffer.write(&[0; 4], SHORT));
        assert!(!buffer.write(&[1], SHORT));

        let reader = Arc::clone(&buffer);
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            reader.read(2, SHORT)
        });

        assert!(buffer.write(&[1], Duration::from_millis(1000)));
        assert_eq!(handle.join().unwrap().len(), 2);
        assert_eq!(buffer.len(), 3);
    }

    #[test]
    fn test_close_wakes_reader() {
        let buffer = Arc::new(AudioBuffer::new(4));
        let reader = Arc::clone(&buffer);
        let handle = thread::spawn(move || reader.read(4, Duration::from_secs(5)));

        thread::sleep(Duration::from_millis(10));
        buffer.close();

        assert!(handle.join().unwrap().is_empty());
        assert!(!buffer.write(&[1], SHORT));
    }
}
