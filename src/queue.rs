//! Bounded frame queue
//!
//! A FIFO of [`Frame`]s shared between exactly one producer and one
//! consumer. Sending never blocks: on overflow the queue either evicts its
//! oldest frame or abandons the new one, depending on
//! [`QueueConfig::drop_oldest`]. Receiving waits on a condition variable for
//! at most the requested timeout.

use crate::config::QueueConfig;
use crate::error::Result;
use crate::types::Frame;

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// What happened to a frame handed to [`FrameQueue::enqueue`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    /// Appended without loss
    Inserted,
    /// Appended after evicting the oldest queued frame
    DroppedOldest,
    /// Queue was full and drop-oldest is off; the new frame was discarded
    Abandoned,
}

impl EnqueueOutcome {
    /// True if the frame handed in is now queued
    pub fn is_queued(&self) -> bool {
        !matches!(self, EnqueueOutcome::Abandoned)
    }
}

/// Counters for one queue
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueStats {
    /// Frames accepted (including those that evicted an older frame)
    pub enqueued: u64,
    /// Frames handed to the consumer
    pub dequeued: u64,
    /// Frames evicted from the head by the drop-oldest policy
    pub dropped: u64,
    /// New frames discarded because the queue was full
    pub abandoned: u64,
}

impl QueueStats {
    /// Frames lost to either overflow policy
    pub fn lost(&self) -> u64 {
        self.dropped + self.abandoned
    }
}

#[derive(Default)]
struct Counters {
    enqueued: AtomicU64,
    dequeued: AtomicU64,
    dropped: AtomicU64,
    abandoned: AtomicU64,
}

/// Bounded, thread-safe frame queue
pub struct FrameQueue {
    frames: Mutex<VecDeque<Frame>>,
    available: Condvar,
    config: QueueConfig,
    counters: Counters,
}

impl FrameQueue {
    /// Create a queue, rejecting an unusable configuration
    pub fn new(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::from_validated(config))
    }

    pub(crate) fn from_validated(config: QueueConfig) -> Self {
        let frames = VecDeque::with_capacity(config.effective_initial_capacity());
        Self {
            frames: Mutex::new(frames),
            available: Condvar::new(),
            config,
            counters: Counters::default(),
        }
    }

    /// Create a queue with the given cap and default everything else
    pub fn with_max_size(max_size: usize) -> Result<Self> {
        Self::new(QueueConfig::default().with_max_size(max_size))
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Receive timeout this queue was configured with
    pub fn recv_timeout(&self) -> Duration {
        self.config.recv_timeout()
    }

    /// Append a frame without ever blocking the caller
    pub fn enqueue(&self, frame: Frame) -> EnqueueOutcome {
        let mut frames = self.frames.lock();

        let outcome = if frames.len() >= self.config.max_size {
            if !self.config.drop_oldest {
                drop(frames);
                self.counters.abandoned.fetch_add(1, Ordering::Relaxed);
                tracing::trace!(
                    timestamp_ms = frame.timestamp_ms,
                    max_size = self.config.max_size,
                    "Queue full, abandoning frame"
                );
                return EnqueueOutcome::Abandoned;
            }
            frames.push_back(frame);
            let mut evicted = 0;
            while frames.len() > self.config.max_size {
                frames.pop_front();
                evicted += 1;
            }
            self.counters.dropped.fetch_add(evicted, Ordering::Relaxed);
            tracing::trace!(evicted, "Queue outgrown, dropped oldest frame");
            EnqueueOutcome::DroppedOldest
        } else {
            frames.push_back(frame);
            EnqueueOutcome::Inserted
        };

        self.counters.enqueued.fetch_add(1, Ordering::Relaxed);
        drop(frames);
        self.available.notify_one();
        outcome
    }

    /// Take the oldest frame, waiting at most `timeout` for one to arrive
    pub fn dequeue(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now().checked_add(timeout);
        let mut frames = self.frames.lock();

        while frames.is_empty() {
            match deadline {
                Some(deadline) => {
                    if self.available.wait_until(&mut frames, deadline).timed_out() {
                        break;
                    }
                }
                // Too far out to represent; wait for a frame
                None => self.available.wait(&mut frames),
            }
        }

        let frame = frames.pop_front();
        if frame.is_some() {
            self.counters.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// Take the oldest frame if one is queued
    pub fn try_dequeue(&self) -> Option<Frame> {
        let frame = self.frames.lock().pop_front();
        if frame.is_some() {
            self.counters.dequeued.fetch_add(1, Ordering::Relaxed);
        }
        frame
    }

    /// True when occupancy exceeds the cap
    pub fn is_outgrown(&self) -> bool {
        self.frames.lock().len() > self.config.max_size
    }

    /// True when the next enqueue would drop or abandon a frame
    pub fn is_full(&self) -> bool {
        self.frames.lock().len() >= self.config.max_size
    }

    /// Discard every queued frame, returning how many were discarded
    pub fn drain(&self) -> usize {
        let mut frames = self.frames.lock();
        let count = frames.len();
        frames.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.frames.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.lock().is_empty()
    }

    /// Timestamps currently queued, oldest first
    pub fn timestamps(&self) -> Vec<i64> {
        self.frames.lock().iter().map(|f| f.timestamp_ms).collect()
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            enqueued: self.counters.enqueued.load(Ordering::Relaxed),
            dequeued: self.counters.dequeued.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
            abandoned: self.counters.abandoned.load(Ordering::Relaxed),
        }
    }
}

impl Default for FrameQueue {
    fn default() -> Self {
        Self::from_validated(QueueConfig::default())
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("len", &self.len())
            .field("config", &self.config)
            .finish()
    }
}
