//! Capture side of the pipeline
//!
//! The real camera driver lives outside this crate. It plugs in through the
//! [`FrameSource`] trait; a [`Producer`] thread pulls frames from a source
//! and pushes them into the hub's input queue at the source's own pace.

mod pattern;

pub use pattern::TestPatternSource;

use crate::error::{Error, Result};
use crate::queue::{EnqueueOutcome, FrameQueue};
use crate::types::{Frame, Framerate, Resolution};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Trait for capture sources
pub trait FrameSource: Send {
    /// Block until the next frame is captured
    ///
    /// Returns [`Error::CaptureEnded`] once the source is exhausted.
    fn next_frame(&mut self) -> Result<Frame>;

    /// Check if the source can still produce frames
    fn is_active(&self) -> bool;

    /// Get current resolution
    fn resolution(&self) -> Option<Resolution>;

    /// Get current framerate
    fn framerate(&self) -> Option<Framerate>;
}

/// Counters shared between a producer thread and its handle
#[derive(Debug, Default)]
struct ProducerCounters {
    captured: AtomicU64,
    lost: AtomicU64,
}

/// Thread feeding one source into one queue
pub struct Producer {
    running: Arc<AtomicBool>,
    counters: Arc<ProducerCounters>,
    thread: Option<JoinHandle<Result<()>>>,
}

impl Producer {
    /// Start pulling from `source` into `queue` on a new thread
    pub fn spawn<S>(source: S, queue: Arc<FrameQueue>) -> Result<Self>
    where
        S: FrameSource + 'static,
    {
        let running = Arc::new(AtomicBool::new(true));
        let counters = Arc::new(ProducerCounters::default());

        let thread = {
            let running = running.clone();
            let counters = counters.clone();
            std::thread::Builder::new()
                .name("framehub-capture".into())
                .spawn(move || run_capture(source, queue, running, counters))?
        };

        Ok(Self {
            running,
            counters,
            thread: Some(thread),
        })
    }

    /// Request the capture loop to stop after the current frame
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// False once the loop has exited, either stopped or source exhausted
    pub fn is_running(&self) -> bool {
        self.thread
            .as_ref()
            .map(|t| !t.is_finished())
            .unwrap_or(false)
    }

    /// Frames pulled from the source
    pub fn frames_captured(&self) -> u64 {
        self.counters.captured.load(Ordering::Relaxed)
    }

    /// Frames the input queue could not admit
    pub fn frames_lost(&self) -> u64 {
        self.counters.lost.load(Ordering::Relaxed)
    }

    /// Stop and wait for the thread, surfacing a fatal capture error
    pub fn join(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Internal("capture thread panicked".into()))?,
            None => Ok(()),
        }
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            tracing::debug!("Producer teardown: {}", e);
        }
    }
}

fn run_capture<S: FrameSource>(
    mut source: S,
    queue: Arc<FrameQueue>,
    running: Arc<AtomicBool>,
    counters: Arc<ProducerCounters>,
) -> Result<()> {
    tracing::info!(
        resolution = ?source.resolution(),
        framerate = ?source.framerate(),
        "Capture started"
    );

    while running.load(Ordering::SeqCst) {
        match source.next_frame() {
            Ok(frame) => {
                counters.captured.fetch_add(1, Ordering::Relaxed);
                if queue.enqueue(frame) == EnqueueOutcome::Abandoned {
                    counters.lost.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(Error::CaptureEnded) => {
                tracing::info!("Capture source exhausted");
                break;
            }
            Err(e) if e.is_recoverable() => {
                tracing::warn!("Capture error: {}", e);
            }
            Err(e) => {
                tracing::error!("Capture failed: {}", e);
                running.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }
    }

    running.store(false, Ordering::SeqCst);
    tracing::info!(
        frames = counters.captured.load(Ordering::Relaxed),
        "Capture stopped"
    );
    Ok(())
}
