//! Subscriber side of the pipeline
//!
//! Viewers, trackers and recorders implement [`FrameSink`]. A [`Consumer`]
//! thread drains one hub output queue into one sink at the sink's own pace.
//!
//! Provided sinks:
//! - [`NullSink`]: discards frames
//! - [`CountingSink`]: counts frames and checks timestamp order
//! - [`SlowSink`]: adds a fixed per-frame delay to another sink

mod consumer;

pub use consumer::Consumer;

use crate::error::Result;
use crate::types::Frame;

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Trait for frame subscribers
pub trait FrameSink: Send {
    /// Handle one frame
    fn on_frame(&mut self, frame: Frame) -> Result<()>;

    /// Called once after the consumer loop exits
    fn on_stop(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<S: FrameSink + ?Sized> FrameSink for Box<S> {
    fn on_frame(&mut self, frame: Frame) -> Result<()> {
        (**self).on_frame(frame)
    }

    fn on_stop(&mut self) -> Result<()> {
        (**self).on_stop()
    }
}

/// Null sink (discards all frames)
#[derive(Debug, Default)]
pub struct NullSink {
    frames: u64,
}

impl NullSink {
    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl FrameSink for NullSink {
    fn on_frame(&mut self, _frame: Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }
}

/// Snapshot of a [`CountingSink`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkReport {
    /// Frames received
    pub frames: u64,
    /// Timestamp of the most recent frame
    pub last_timestamp_ms: Option<i64>,
    /// Frames whose timestamp was older than their predecessor's
    pub out_of_order: u64,
}

#[derive(Debug)]
struct SinkCounters {
    frames: AtomicU64,
    last_timestamp_ms: AtomicI64,
    out_of_order: AtomicU64,
}

impl Default for SinkCounters {
    fn default() -> Self {
        Self {
            frames: AtomicU64::new(0),
            last_timestamp_ms: AtomicI64::new(i64::MIN),
            out_of_order: AtomicU64::new(0),
        }
    }
}

/// Counts frames; readable from other threads through [`CountingSink::handle`]
#[derive(Debug, Clone, Default)]
pub struct CountingSink {
    counters: Arc<SinkCounters>,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle sharing this sink's counters
    pub fn handle(&self) -> CountingSink {
        self.clone()
    }

    pub fn report(&self) -> SinkReport {
        let last = self.counters.last_timestamp_ms.load(Ordering::Acquire);
        SinkReport {
            frames: self.counters.frames.load(Ordering::Acquire),
            last_timestamp_ms: (last != i64::MIN).then_some(last),
            out_of_order: self.counters.out_of_order.load(Ordering::Acquire),
        }
    }
}

impl FrameSink for CountingSink {
    fn on_frame(&mut self, frame: Frame) -> Result<()> {
        let previous = self
            .counters
            .last_timestamp_ms
            .swap(frame.timestamp_ms, Ordering::AcqRel);
        if frame.timestamp_ms < previous {
            self.counters.out_of_order.fetch_add(1, Ordering::AcqRel);
        }
        self.counters.frames.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

/// Wraps a sink with simulated per-frame processing time
#[derive(Debug)]
pub struct SlowSink<S> {
    inner: S,
    delay: Duration,
}

impl<S: FrameSink> SlowSink<S> {
    pub fn new(inner: S, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: FrameSink> FrameSink for SlowSink<S> {
    fn on_frame(&mut self, frame: Frame) -> Result<()> {
        if !self.delay.is_zero() {
            std::thread::sleep(self.delay);
        }
        self.inner.on_frame(frame)
    }

    fn on_stop(&mut self) -> Result<()> {
        self.inner.on_stop()
    }
}
