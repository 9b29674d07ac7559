//! Consumer thread draining one output queue

use super::FrameSink;
use crate::error::{Error, Result};
use crate::queue::FrameQueue;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

/// Handle to a running consumer thread
pub struct Consumer {
    name: String,
    queue: Arc<FrameQueue>,
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
    thread: Option<JoinHandle<()>>,
}

impl Consumer {
    /// Start draining `queue` into `sink` on a thread named after `name`
    pub fn spawn<S>(name: impl Into<String>, queue: Arc<FrameQueue>, sink: S) -> Result<Self>
    where
        S: FrameSink + 'static,
    {
        let name = name.into();
        let running = Arc::new(AtomicBool::new(true));
        let processed = Arc::new(AtomicU64::new(0));
        let errors = Arc::new(AtomicU64::new(0));

        let thread = {
            let name = name.clone();
            let queue = queue.clone();
            let running = running.clone();
            let processed = processed.clone();
            let errors = errors.clone();
            std::thread::Builder::new()
                .name(format!("framehub-{}", name))
                .spawn(move || run_consumer(&name, queue, sink, running, processed, errors))?
        };

        tracing::debug!(consumer = %name, "Consumer started");
        Ok(Self {
            name,
            queue,
            running,
            processed,
            errors,
            thread: Some(thread),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The queue this consumer drains
    pub fn queue(&self) -> &Arc<FrameQueue> {
        &self.queue
    }

    /// Frames handed to the sink
    pub fn frames_processed(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Frames the sink failed to handle
    pub fn sink_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    /// Request the loop to stop; observed within one receive timeout
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
    }

    /// Stop and wait for the thread
    pub fn join(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        self.stop();
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| Error::Internal(format!("consumer {} panicked", self.name))),
            None => Ok(()),
        }
    }
}

impl Drop for Consumer {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            tracing::debug!("Consumer teardown: {}", e);
        }
    }
}

fn run_consumer<S: FrameSink>(
    name: &str,
    queue: Arc<FrameQueue>,
    mut sink: S,
    running: Arc<AtomicBool>,
    processed: Arc<AtomicU64>,
    errors: Arc<AtomicU64>,
) {
    let timeout = queue.recv_timeout();

    while running.load(Ordering::SeqCst) {
        let Some(frame) = queue.dequeue(timeout) else {
            continue;
        };
        match sink.on_frame(frame) {
            Ok(()) => {
                processed.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                errors.fetch_add(1, Ordering::Relaxed);
                tracing::warn!(consumer = %name, "Sink error: {}", e);
            }
        }
    }

    if let Err(e) = sink.on_stop() {
        tracing::warn!(consumer = %name, "Sink failed to stop cleanly: {}", e);
    }

    let discarded = queue.drain();
    tracing::debug!(
        consumer = %name,
        processed = processed.load(Ordering::Relaxed),
        discarded,
        "Consumer stopped"
    );
}
