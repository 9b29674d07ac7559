//! Queue hub
//!
//! Owns a [`Distributor`] and the dedicated OS thread running it. Subscribers
//! ask the hub for a fresh output queue; dropping the hub stops the worker
//! and joins its thread.

use crate::config::QueueConfig;
use crate::distributor::Distributor;
use crate::error::{Error, Result};
use crate::queue::FrameQueue;

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Lifecycle owner for one distributor worker
pub struct QueueHub {
    distributor: Arc<Distributor>,
    output_config: QueueConfig,
    worker: Option<JoinHandle<Result<()>>>,
}

impl QueueHub {
    /// Start a hub fanning out `input`; the worker thread is spawned before this returns
    pub fn new(input: Arc<FrameQueue>) -> Result<Self> {
        Self::with_output_config(input, QueueConfig::default())
    }

    /// Start a hub whose minted queues use `output_config`
    pub fn with_output_config(input: Arc<FrameQueue>, output_config: QueueConfig) -> Result<Self> {
        output_config.validate()?;
        Self::spawn(Arc::new(Distributor::new(input)), output_config)
    }

    /// Start a hub around an existing distributor
    ///
    /// The distributor must still be idle; one that has been started or
    /// stopped elsewhere is rejected and left untouched.
    pub fn from_distributor(distributor: Arc<Distributor>) -> Result<Self> {
        Self::spawn(distributor, QueueConfig::default())
    }

    fn spawn(distributor: Arc<Distributor>, output_config: QueueConfig) -> Result<Self> {
        if let Err(state) = distributor.claim() {
            return Err(Error::Internal(format!(
                "distributor already owned (state {:?})",
                state
            )));
        }

        let spawned = {
            let distributor = distributor.clone();
            std::thread::Builder::new()
                .name("framehub-distributor".into())
                .spawn(move || {
                    let result = distributor.run_claimed();
                    if let Err(e) = &result {
                        tracing::error!("Distributor worker exited: {}", e);
                    }
                    result
                })
        };
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                distributor.finish();
                return Err(e.into());
            }
        };

        tracing::info!("Queue hub started");
        Ok(Self {
            distributor,
            output_config,
            worker: Some(worker),
        })
    }

    /// Mint and register a new subscriber queue with the hub defaults
    pub fn add_output_queue(&self) -> Arc<FrameQueue> {
        let queue = Arc::new(FrameQueue::from_validated(self.output_config.clone()));
        self.register(queue)
    }

    /// Mint and register a new subscriber queue with its own configuration
    pub fn add_output_queue_with(&self, config: QueueConfig) -> Result<Arc<FrameQueue>> {
        let queue = Arc::new(FrameQueue::new(config)?);
        Ok(self.register(queue))
    }

    fn register(&self, queue: Arc<FrameQueue>) -> Arc<FrameQueue> {
        self.distributor.remove_closed_outputs();
        self.distributor.add_output_queue(queue.clone());
        queue
    }

    /// Queue the capture source should feed
    pub fn input(&self) -> Option<&Arc<FrameQueue>> {
        self.distributor.input()
    }

    pub fn distributor(&self) -> &Arc<Distributor> {
        &self.distributor
    }

    pub fn output_config(&self) -> &QueueConfig {
        &self.output_config
    }

    /// Stop the worker and join its thread
    pub fn shutdown(mut self) -> Result<()> {
        self.stop_and_join()
    }

    fn stop_and_join(&mut self) -> Result<()> {
        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        self.distributor.stop();

        // Bounded by one receive timeout once the worker observes the flag
        let grace = self
            .distributor
            .input()
            .map(|q| q.recv_timeout())
            .unwrap_or_default()
            + Duration::from_secs(1);
        if !self.distributor.wait_terminated(grace) {
            tracing::warn!("Distributor slow to terminate, joining anyway");
        }

        let result = worker
            .join()
            .map_err(|_| Error::Internal("distributor thread panicked".into()))?;
        tracing::info!("Queue hub stopped");
        result
    }
}

impl Drop for QueueHub {
    fn drop(&mut self) {
        if let Err(e) = self.stop_and_join() {
            tracing::debug!("Queue hub teardown: {}", e);
        }
    }
}

impl std::fmt::Debug for QueueHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueHub")
            .field("distributor", &self.distributor)
            .field("output_config", &self.output_config)
            .finish()
    }
}
