//! Frame fan-out
//!
//! A [`Distributor`] drains one input [`FrameQueue`] and enqueues a clone of
//! every frame into each registered output queue. Clones share pixel
//! storage, so fan-out cost is one reference-count bump per output.
//!
//! The output list is guarded by a single mutex which is held both while
//! registering a queue and for the whole of one fan-out pass, so a new
//! subscriber sees either all of a frame's pass or none of it.

use crate::error::{Error, Result};
use crate::queue::{EnqueueOutcome, FrameQueue};
use crate::types::Frame;

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Lifecycle of a distributor worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DistributorState {
    /// Created, worker not started
    Idle = 0,
    /// Worker loop active
    Running = 1,
    /// Stop requested, waiting for the current dequeue to return
    Stopping = 2,
    /// Worker finished; absorbing
    Terminated = 3,
}

impl DistributorState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => DistributorState::Idle,
            1 => DistributorState::Running,
            2 => DistributorState::Stopping,
            _ => DistributorState::Terminated,
        }
    }
}

/// Fans frames from one input queue out to many output queues
pub struct Distributor {
    input: Option<Arc<FrameQueue>>,
    outputs: Mutex<Vec<Arc<FrameQueue>>>,
    state: AtomicU8,
    distributed: AtomicU64,
    done_tx: Sender<()>,
    done_rx: Receiver<()>,
}

impl Distributor {
    /// Create a distributor bound to an input queue
    pub fn new(input: Arc<FrameQueue>) -> Self {
        Self::with_input(Some(input))
    }

    /// Create a distributor with no input; [`run`](Self::run) fails immediately
    pub fn unbound() -> Self {
        Self::with_input(None)
    }

    fn with_input(input: Option<Arc<FrameQueue>>) -> Self {
        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        Self {
            input,
            outputs: Mutex::new(Vec::new()),
            state: AtomicU8::new(DistributorState::Idle as u8),
            distributed: AtomicU64::new(0),
            done_tx,
            done_rx,
        }
    }

    pub fn input(&self) -> Option<&Arc<FrameQueue>> {
        self.input.as_ref()
    }

    /// Register an output queue
    ///
    /// The queue receives every frame drained after this call returns and
    /// none drained before it.
    pub fn add_output_queue(&self, queue: Arc<FrameQueue>) {
        let mut outputs = self.outputs.lock();
        outputs.push(queue);
        tracing::debug!(outputs = outputs.len(), "Output queue registered");
    }

    /// Drop outputs whose subscriber has released its handle
    pub fn remove_closed_outputs(&self) -> usize {
        let mut outputs = self.outputs.lock();
        let before = outputs.len();
        outputs.retain(|queue| Arc::strong_count(queue) > 1);
        let removed = before - outputs.len();
        if removed > 0 {
            tracing::debug!(removed, "Removed abandoned output queues");
        }
        removed
    }

    pub fn output_count(&self) -> usize {
        self.outputs.lock().len()
    }

    pub fn state(&self) -> DistributorState {
        DistributorState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub fn is_running(&self) -> bool {
        self.state() == DistributorState::Running
    }

    /// Frames drained from the input and fanned out so far
    pub fn frames_distributed(&self) -> u64 {
        self.distributed.load(Ordering::Relaxed)
    }

    /// Worker body; returns once stopped
    ///
    /// Each iteration waits on the input for at most its receive timeout, so
    /// a stop request is observed within one timeout interval.
    pub fn run(&self) -> Result<()> {
        match self.claim() {
            Ok(()) => self.run_claimed(),
            // Stopped before it ever started
            Err(DistributorState::Terminated) => Ok(()),
            Err(other) => Err(Error::Internal(format!(
                "distributor cannot start from state {:?}",
                other
            ))),
        }
    }

    /// Move `Idle -> Running`; the caller becomes the only worker
    pub(crate) fn claim(&self) -> std::result::Result<(), DistributorState> {
        self.transition(DistributorState::Idle, DistributorState::Running)
    }

    /// Worker loop for a distributor already claimed with [`claim`](Self::claim)
    pub(crate) fn run_claimed(&self) -> Result<()> {
        let Some(input) = self.input.clone() else {
            tracing::error!("Distributor started without an input queue");
            self.finish();
            return Err(Error::NoInputQueue);
        };

        let timeout = input.recv_timeout();
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "Distributor started");

        while self.is_running() {
            if let Some(frame) = input.dequeue(timeout) {
                if !self.is_running() {
                    break;
                }
                self.fan_out(frame);
            }
        }

        self.finish();
        tracing::info!(
            frames = self.frames_distributed(),
            "Distributor stopped"
        );
        Ok(())
    }

    /// Request the worker to stop
    ///
    /// Does not interrupt a dequeue in progress.
    pub fn stop(&self) {
        loop {
            let from = self.state();
            let next = match from {
                DistributorState::Idle => DistributorState::Terminated,
                DistributorState::Running => DistributorState::Stopping,
                DistributorState::Stopping | DistributorState::Terminated => return,
            };
            if self.transition(from, next).is_ok() {
                tracing::debug!("Distributor stop requested ({:?} -> {:?})", from, next);
                if next == DistributorState::Terminated {
                    let _ = self.done_tx.try_send(());
                }
                return;
            }
        }
    }

    /// Wait until the worker has terminated
    pub fn wait_terminated(&self, timeout: Duration) -> bool {
        if self.state() == DistributorState::Terminated {
            return true;
        }
        match self.done_rx.recv_timeout(timeout) {
            Ok(()) => true,
            Err(_) => self.state() == DistributorState::Terminated,
        }
    }

    fn fan_out(&self, frame: Frame) {
        let outputs = self.outputs.lock();
        for output in outputs.iter() {
            if output.enqueue(frame.clone()) == EnqueueOutcome::Abandoned {
                tracing::trace!(
                    timestamp_ms = frame.timestamp_ms,
                    "Saturated output skipped frame"
                );
            }
        }
        self.distributed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn finish(&self) {
        self.state
            .store(DistributorState::Terminated as u8, Ordering::SeqCst);
        let _ = self.done_tx.try_send(());
    }

    fn transition(
        &self,
        from: DistributorState,
        to: DistributorState,
    ) -> std::result::Result<(), DistributorState> {
        self.state
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .map(|_| ())
            .map_err(DistributorState::from_u8)
    }
}

impl std::fmt::Debug for Distributor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Distributor")
            .field("state", &self.state())
            .field("outputs", &self.output_count())
            .field("distributed", &self.frames_distributed())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueueConfig;
    use crate::types::{Image, PixelFormat};
    use std::time::Instant;

    const TIMEOUT: Duration = Duration::from_millis(20);

    fn frame(ts: i64) -> Frame {
        Frame::new(Image::new(4, 4, PixelFormat::Gray8).unwrap(), ts)
    }

    fn queue(max_size: usize) -> Arc<FrameQueue> {
        Arc::new(
            FrameQueue::new(
                QueueConfig::default()
                    .with_max_size(max_size)
                    .with_recv_timeout(TIMEOUT),
            )
            .unwrap(),
        )
    }

    fn spawn(distributor: &Arc<Distributor>) -> std::thread::JoinHandle<Result<()>> {
        let distributor = distributor.clone();
        std::thread::spawn(move || distributor.run())
    }

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        false
    }

    #[test]
    fn test_unbound_terminates_immediately() {
        let distributor = Distributor::unbound();
        let err = distributor.run().unwrap_err();
        assert!(matches!(err, Error::NoInputQueue));
        assert_eq!(distributor.state(), DistributorState::Terminated);
        assert!(distributor.wait_terminated(Duration::ZERO));
    }

    #[test]
    fn test_stop_before_start() {
        let distributor = Distributor::new(queue(4));
        distributor.stop();
        assert_eq!(distributor.state(), DistributorState::Terminated);
        assert!(distributor.run().is_ok());
        assert_eq!(distributor.state(), DistributorState::Terminated);
    }

    #[test]
    fn test_fan_out_completeness() {
        let input = queue(100);
        let distributor = Arc::new(Distributor::new(input.clone()));
        let outputs: Vec<_> = (0..3).map(|_| queue(100)).collect();
        for output in &outputs {
            distributor.add_output_queue(output.clone());
        }

        let worker = spawn(&distributor);
        for ts in 1..=5 {
            input.enqueue(frame(ts));
        }
        assert!(wait_for(|| distributor.frames_distributed() == 5));

        let first: Vec<Frame> = std::iter::from_fn(|| outputs[0].try_dequeue()).collect();
        assert_eq!(
            first.iter().map(|f| f.timestamp_ms).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        for output in &outputs[1..] {
            for expected in &first {
                let got = output.try_dequeue().unwrap();
                assert_eq!(got.timestamp_ms, expected.timestamp_ms);
                assert!(got.shares_image(expected));
            }
            assert!(output.is_empty());
        }

        distributor.stop();
        worker.join().unwrap().unwrap();
        assert_eq!(distributor.state(), DistributorState::Terminated);
    }

    #[test]
    fn test_late_subscriber_isolation() {
        let input = queue(100);
        let distributor = Arc::new(Distributor::new(input.clone()));
        let early = queue(100);
        distributor.add_output_queue(early.clone());

        let worker = spawn(&distributor);
        input.enqueue(frame(1));
        assert!(wait_for(|| distributor.frames_distributed() == 1));

        let late = queue(100);
        distributor.add_output_queue(late.clone());
        input.enqueue(frame(2));
        assert!(wait_for(|| distributor.frames_distributed() == 2));

        assert_eq!(early.timestamps(), vec![1, 2]);
        assert_eq!(late.timestamps(), vec![2]);

        distributor.stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_concurrent_registration_sees_contiguous_suffix() {
        let input = queue(1_000_000);
        let distributor = Arc::new(Distributor::new(input.clone()));
        let worker = spawn(&distributor);

        let registrar = {
            let distributor = distributor.clone();
            std::thread::spawn(move || {
                (0..50)
                    .map(|_| {
                        let late = queue(1_000_000);
                        distributor.add_output_queue(late.clone());
                        std::thread::sleep(Duration::from_micros(100));
                        late
                    })
                    .collect::<Vec<_>>()
            })
        };

        let mut next_ts = 0;
        while !registrar.is_finished() || next_ts < 500 {
            input.enqueue(frame(next_ts));
            next_ts += 1;
            std::thread::sleep(Duration::from_micros(20));
        }
        // Tail sent after every registration has returned
        for _ in 0..10 {
            input.enqueue(frame(next_ts));
            next_ts += 1;
        }
        let late_queues = registrar.join().unwrap();
        let last = next_ts - 1;
        assert!(wait_for(|| distributor.frames_distributed() == next_ts as u64));

        let mut previous_len = usize::MAX;
        for late in &late_queues {
            let timestamps = late.timestamps();
            assert_eq!(timestamps.last(), Some(&last));
            assert!(timestamps.windows(2).all(|w| w[1] == w[0] + 1));
            // Registered later means a suffix of what earlier queues got
            assert!(timestamps.len() <= previous_len);
            previous_len = timestamps.len();
        }

        distributor.stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_slow_consumer_scenario() {
        let input = queue(100);
        let distributor = Arc::new(Distributor::new(input.clone()));
        let a = queue(2);
        let b = queue(5);
        distributor.add_output_queue(a.clone());
        distributor.add_output_queue(b.clone());

        let worker = spawn(&distributor);
        for ts in 1..=4 {
            input.enqueue(frame(ts));
        }
        assert!(wait_for(|| distributor.frames_distributed() == 4));

        assert_eq!(a.timestamps(), vec![3, 4]);
        assert_eq!(b.timestamps(), vec![1, 2, 3, 4]);
        assert_eq!(a.stats().dropped, 2);

        distributor.stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_saturated_output_does_not_stall_others() {
        let input = queue(1000);
        let distributor = Arc::new(Distributor::new(input.clone()));
        let stuck = Arc::new(
            FrameQueue::new(
                QueueConfig::default()
                    .with_max_size(1)
                    .with_drop_oldest(false)
                    .with_recv_timeout(TIMEOUT),
            )
            .unwrap(),
        );
        let healthy = queue(1000);
        distributor.add_output_queue(stuck.clone());
        distributor.add_output_queue(healthy.clone());

        let worker = spawn(&distributor);
        for ts in 0..50 {
            input.enqueue(frame(ts));
        }
        assert!(wait_for(|| distributor.frames_distributed() == 50));

        assert_eq!(stuck.timestamps(), vec![0]);
        assert_eq!(stuck.stats().abandoned, 49);
        assert_eq!(healthy.len(), 50);

        distributor.stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_shutdown_convergence() {
        let input = queue(100);
        let distributor = Arc::new(Distributor::new(input.clone()));
        let output = queue(100);
        distributor.add_output_queue(output.clone());

        let worker = spawn(&distributor);
        assert!(wait_for(|| distributor.is_running()));

        let start = Instant::now();
        distributor.stop();
        assert!(distributor.wait_terminated(Duration::from_secs(2)));
        assert!(start.elapsed() < TIMEOUT * 10);
        worker.join().unwrap().unwrap();

        input.enqueue(frame(1));
        std::thread::sleep(TIMEOUT * 2);
        assert!(output.is_empty());
        assert_eq!(distributor.frames_distributed(), 0);
    }

    #[test]
    fn test_second_run_rejected() {
        let input = queue(10);
        let distributor = Arc::new(Distributor::new(input));
        let worker = spawn(&distributor);
        assert!(wait_for(|| distributor.is_running()));

        assert!(matches!(distributor.run(), Err(Error::Internal(_))));

        distributor.stop();
        worker.join().unwrap().unwrap();
    }

    #[test]
    fn test_remove_closed_outputs() {
        let distributor = Distributor::new(queue(4));
        let kept = queue(4);
        distributor.add_output_queue(kept.clone());
        distributor.add_output_queue(queue(4));
        assert_eq!(distributor.output_count(), 2);

        assert_eq!(distributor.remove_closed_outputs(), 1);
        assert_eq!(distributor.output_count(), 1);
    }
}
