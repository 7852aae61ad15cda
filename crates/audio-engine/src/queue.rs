//! Bounded queue of interleaved `f32` samples shared between the audio sink's stages.
//!
//! Stages inside `autoaudiosink`:
//! - streaming thread (`chain`) → input queue
//! - resampler thread → output queue
//! - cpal callback drains the output queue without blocking
//!
//! `close()` is the shutdown signal: blocked producers return, consumers drain what is left.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

pub struct SampleQueue {
    channels: usize,
    capacity: usize,
    inner: Mutex<QueueInner>,
    cv: Condvar,
}

struct QueueInner {
    samples: VecDeque<f32>,
    closed: bool,
}

/// How [`SampleQueue::pop`] waits for data.
#[derive(Debug, Clone, Copy)]
pub enum PopStrategy {
    /// Block until exactly `frames` are available; `None` if closed first.
    BlockingExact { frames: usize },
    /// Block until at least one frame is available, then return up to `max_frames`.
    BlockingUpTo { max_frames: usize },
    /// Return up to `max_frames` immediately, or `None` if empty.
    NonBlocking { max_frames: usize },
}

/// Queue capacity in samples for `seconds` of audio; non-positive or non-finite falls back to 2s.
pub fn calc_max_buffered_samples(rate_hz: u32, channels: usize, seconds: f32) -> usize {
    let secs = if seconds.is_finite() && seconds > 0.0 {
        seconds
    } else {
        2.0
    };
    let frames = (rate_hz as f32 * secs).ceil() as usize;
    frames.saturating_mul(channels)
}

impl SampleQueue {
    pub fn new(channels: usize, capacity_samples: usize) -> Self {
        let channels = channels.max(1);
        Self {
            channels,
            capacity: capacity_samples.max(channels),
            inner: Mutex::new(QueueInner {
                samples: VecDeque::new(),
                closed: false,
            }),
            cv: Condvar::new(),
        }
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn capacity_frames(&self) -> usize {
        self.capacity / self.channels
    }

    pub fn len_frames(&self) -> usize {
        self.inner.lock().unwrap().samples.len() / self.channels
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().unwrap().closed
    }

    /// Stop accepting samples and wake every waiter. Idempotent.
    pub fn close(&self) {
        self.inner.lock().unwrap().closed = true;
        self.cv.notify_all();
    }

    /// Close and drop anything still buffered.
    pub fn flush(&self) {
        let mut g = self.inner.lock().unwrap();
        g.closed = true;
        g.samples.clear();
        drop(g);
        self.cv.notify_all();
    }

    /// Append samples, waiting for room when full.
    ///
    /// Returns `false` if the queue was closed before everything was accepted.
    pub fn push_blocking(&self, samples: &[f32]) -> bool {
        let mut offset = 0;
        while offset < samples.len() {
            let mut g = self.inner.lock().unwrap();
            while g.samples.len() >= self.capacity && !g.closed {
                g = self.cv.wait(g).unwrap();
            }
            if g.closed {
                return false;
            }
            let room = self.capacity - g.samples.len();
            let take = room.min(samples.len() - offset);
            g.samples.extend(&samples[offset..offset + take]);
            offset += take;
            drop(g);
            self.cv.notify_all();
        }
        true
    }

    pub fn pop(&self, strategy: PopStrategy) -> Option<Vec<f32>> {
        let mut g = self.inner.lock().unwrap();
        let take_frames = match strategy {
            PopStrategy::BlockingExact { frames } => {
                let want = frames * self.channels;
                while g.samples.len() < want && !g.closed {
                    g = self.cv.wait(g).unwrap();
                }
                if g.samples.len() < want {
                    return None;
                }
                frames
            }
            PopStrategy::BlockingUpTo { max_frames } => {
                while g.samples.len() < self.channels && !g.closed {
                    g = self.cv.wait(g).unwrap();
                }
                (g.samples.len() / self.channels).min(max_frames)
            }
            PopStrategy::NonBlocking { max_frames } => {
                (g.samples.len() / self.channels).min(max_frames)
            }
        };
        if take_frames == 0 {
            return None;
        }
        let out: Vec<f32> = g.samples.drain(..take_frames * self.channels).collect();
        drop(g);
        self.cv.notify_all();
        Some(out)
    }

    /// Block until the queue is closed and empty, or `cancel` is set.
    ///
    /// Returns `true` when drained normally.
    pub fn wait_drained_or_cancel(&self, cancel: &AtomicBool) -> bool {
        let mut g = self.inner.lock().unwrap();
        loop {
            if cancel.load(Ordering::Relaxed) {
                return false;
            }
            if g.closed && g.samples.len() < self.channels {
                return true;
            }
            let (next, _timeout) = self
                .cv
                .wait_timeout(g, Duration::from_millis(50))
                .unwrap();
            g = next;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn calc_max_buffered_samples_fallbacks() {
        assert_eq!(calc_max_buffered_samples(48_000, 2, 2.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, -1.0), 192_000);
        assert_eq!(calc_max_buffered_samples(48_000, 2, f32::NAN), 192_000);
        assert_eq!(calc_max_buffered_samples(8_000, 1, 0.5), 4_000);
    }

    #[test]
    fn pop_nonblocking_empty() {
        let q = SampleQueue::new(2, 16);
        assert!(q.pop(PopStrategy::NonBlocking { max_frames: 4 }).is_none());
    }

    #[test]
    fn pop_nonblocking_returns_whole_frames() {
        let q = SampleQueue::new(2, 64);
        assert!(q.push_blocking(&[1.0, 2.0, 3.0, 4.0, 5.0]));
        let out = q.pop(PopStrategy::NonBlocking { max_frames: 8 }).unwrap();
        assert_eq!(out, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn blocking_exact_waits_for_producer() {
        let q = Arc::new(SampleQueue::new(2, 64));
        let q_pop = q.clone();
        let handle = thread::spawn(move || q_pop.pop(PopStrategy::BlockingExact { frames: 3 }));

        q.push_blocking(&[0.1, 0.2, 0.3, 0.4]);
        q.push_blocking(&[0.5, 0.6]);
        assert_eq!(handle.join().unwrap().map(|v| v.len()), Some(6));
    }

    #[test]
    fn blocking_up_to_drains_tail_then_sees_close() {
        let q = SampleQueue::new(2, 64);
        q.push_blocking(&[1.0, 2.0, 3.0, 4.0]);
        q.close();
        let out = q.pop(PopStrategy::BlockingUpTo { max_frames: 8 }).unwrap();
        assert_eq!(out.len(), 4);
        assert!(q.pop(PopStrategy::BlockingUpTo { max_frames: 8 }).is_none());
    }

    #[test]
    fn push_blocks_when_full_until_popped() {
        let q = Arc::new(SampleQueue::new(1, 2));
        let q_push = q.clone();
        let handle = thread::spawn(move || q_push.push_blocking(&[1.0, 2.0, 3.0]));

        let first = q.pop(PopStrategy::BlockingExact { frames: 2 }).unwrap();
        assert_eq!(first, vec![1.0, 2.0]);
        assert!(handle.join().unwrap());
        assert_eq!(q.len_frames(), 1);
    }

    #[test]
    fn close_releases_blocked_producer() {
        let q = Arc::new(SampleQueue::new(1, 1));
        q.push_blocking(&[1.0]);
        let q_push = q.clone();
        let handle = thread::spawn(move || q_push.push_blocking(&[2.0]));
        thread::sleep(Duration::from_millis(20));
        q.close();
        assert!(!handle.join().unwrap());
    }

    #[test]
    fn wait_drained_or_cancel() {
        let q = SampleQueue::new(2, 64);
        let cancel = AtomicBool::new(false);
        q.close();
        assert!(q.wait_drained_or_cancel(&cancel));

        let q = SampleQueue::new(2, 64);
        cancel.store(true, Ordering::Relaxed);
        assert!(!q.wait_drained_or_cancel(&cancel));
    }

    #[test]
    fn flush_discards_buffered_samples() {
        let q = SampleQueue::new(1, 8);
        q.push_blocking(&[1.0, 2.0]);
        q.flush();
        assert_eq!(q.len_frames(), 0);
        assert!(q.is_closed());
    }
}
