//! Frame distribution pipeline
//!
//! Connects capture → input queue → hub → per-subscriber queues → consumers.
//! Every stage runs on its own OS thread; none of them waits on another
//! except through a bounded-timeout dequeue.

use crate::capture::{FrameSource, Producer, TestPatternSource};
use crate::config::{ConsumerConfig, PipelineConfig, QueueConfig, SourceConfig};
use crate::error::{Error, Result};
use crate::hub::QueueHub;
use crate::output::{Consumer, CountingSink, FrameSink, SlowSink};
use crate::queue::{FrameQueue, QueueStats};

use std::sync::Arc;
use std::time::Duration;

/// Per-consumer statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    pub name: String,
    /// Frames handed to the sink
    pub processed: u64,
    /// Frames waiting in the consumer's queue
    pub queued: usize,
    pub queue: QueueStats,
}

/// Statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames pulled from the source
    pub frames_captured: u64,
    /// Frames fanned out by the distributor
    pub frames_distributed: u64,
    /// Current number of subscriber queues
    pub subscribers: usize,
    pub input: QueueStats,
    pub consumers: Vec<ConsumerStats>,
}

impl PipelineStats {
    /// Frames lost across every subscriber queue
    pub fn frames_dropped(&self) -> u64 {
        self.consumers.iter().map(|c| c.queue.lost()).sum()
    }
}

/// Frame distribution pipeline
pub struct Pipeline {
    config: PipelineConfig,
    input: Arc<FrameQueue>,
    hub: Option<QueueHub>,
    producer: Option<Producer>,
    consumers: Vec<Consumer>,
}

impl Pipeline {
    /// Create a pipeline; nothing runs until [`start`](Self::start)
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        let input = Arc::new(FrameQueue::new(config.queue.clone())?);
        Ok(Self {
            config,
            input,
            hub: None,
            producer: None,
            consumers: Vec::new(),
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Queue the source feeds
    pub fn input(&self) -> &Arc<FrameQueue> {
        &self.input
    }

    /// Start with the configured test-pattern source
    pub fn start(&mut self) -> Result<()> {
        let source = TestPatternSource::new(&self.config.source);
        self.start_with_source(source)
    }

    /// Start with an external capture source
    ///
    /// Configured consumers are registered before the first frame is
    /// captured, so each of them sees the whole stream.
    pub fn start_with_source<S>(&mut self, source: S) -> Result<()>
    where
        S: FrameSource + 'static,
    {
        if self.is_running() {
            return Err(Error::PipelineAlreadyRunning);
        }
        // Source exhausted on a previous run; tear that run down first
        if self.hub.is_some() {
            self.stop()?;
        }

        tracing::info!(
            consumers = self.config.consumers.len(),
            max_size = self.config.queue.max_size,
            drop_oldest = self.config.queue.drop_oldest,
            "Pipeline starting"
        );

        self.input.drain();
        let hub = QueueHub::with_output_config(self.input.clone(), self.config.queue.clone())?;
        self.hub = Some(hub);

        for consumer in self.config.consumers.clone() {
            self.spawn_configured(&consumer)?;
        }

        self.producer = Some(Producer::spawn(source, self.input.clone())?);
        Ok(())
    }

    fn spawn_configured(&mut self, consumer: &ConsumerConfig) -> Result<()> {
        let queue = self.subscribe_with(consumer.queue.clone())?;
        let sink = SlowSink::new(CountingSink::new(), Duration::from_millis(consumer.delay_ms));
        self.consumers
            .push(Consumer::spawn(consumer.name.clone(), queue, sink)?);
        Ok(())
    }

    /// Mint a subscriber queue on the running hub
    pub fn subscribe(&self) -> Result<Arc<FrameQueue>> {
        self.subscribe_with(None)
    }

    fn subscribe_with(&self, config: Option<QueueConfig>) -> Result<Arc<FrameQueue>> {
        let hub = self.hub.as_ref().ok_or(Error::PipelineNotStarted)?;
        match config {
            Some(config) => hub.add_output_queue_with(config),
            None => Ok(hub.add_output_queue()),
        }
    }

    /// Attach a new consumer to the running pipeline
    ///
    /// It receives frames distributed from now on.
    pub fn add_consumer<S>(&mut self, name: impl Into<String>, sink: S) -> Result<()>
    where
        S: FrameSink + 'static,
    {
        let queue = self.subscribe()?;
        self.consumers.push(Consumer::spawn(name, queue, sink)?);
        Ok(())
    }

    /// True while the capture thread is alive
    pub fn is_running(&self) -> bool {
        self.producer.as_ref().map(|p| p.is_running()).unwrap_or(false)
    }

    /// Stop capture, then distribution, then consumers
    pub fn stop(&mut self) -> Result<()> {
        if self.hub.is_none() {
            return Ok(());
        }
        tracing::info!("Pipeline stop requested");

        let mut first_error = None;

        if let Some(producer) = self.producer.take() {
            if let Err(e) = producer.join() {
                tracing::error!("Capture ended with error: {}", e);
                first_error.get_or_insert(e);
            }
        }

        if let Some(hub) = self.hub.take() {
            if let Err(e) = hub.shutdown() {
                first_error.get_or_insert(e);
            }
        }

        for consumer in self.consumers.drain(..) {
            if let Err(e) = consumer.join() {
                first_error.get_or_insert(e);
            }
        }

        tracing::info!("Pipeline stopped");
        first_error.map_or(Ok(()), Err)
    }

    /// Get current statistics
    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            frames_captured: self
                .producer
                .as_ref()
                .map(|p| p.frames_captured())
                .unwrap_or(0),
            frames_distributed: self
                .hub
                .as_ref()
                .map(|h| h.distributor().frames_distributed())
                .unwrap_or(0),
            subscribers: self
                .hub
                .as_ref()
                .map(|h| h.distributor().output_count())
                .unwrap_or(0),
            input: self.input.stats(),
            consumers: self
                .consumers
                .iter()
                .map(|c| ConsumerStats {
                    name: c.name().to_string(),
                    processed: c.frames_processed(),
                    queued: c.queue().len(),
                    queue: c.queue().stats(),
                })
                .collect(),
        }
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::debug!("Pipeline teardown: {}", e);
        }
    }
}

/// Builder for pipeline configuration
pub struct PipelineBuilder {
    config: PipelineConfig,
}

impl PipelineBuilder {
    /// Start from defaults with no consumers
    pub fn new() -> Self {
        Self {
            config: PipelineConfig {
                consumers: Vec::new(),
                ..PipelineConfig::default()
            },
        }
    }

    pub fn from_config(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn queue(mut self, config: QueueConfig) -> Self {
        self.config.queue = config;
        self
    }

    pub fn source(mut self, config: SourceConfig) -> Self {
        self.config.source = config;
        self
    }

    pub fn max_size(mut self, max_size: usize) -> Self {
        self.config.queue.max_size = max_size;
        self
    }

    pub fn drop_oldest(mut self, drop_oldest: bool) -> Self {
        self.config.queue.drop_oldest = drop_oldest;
        self
    }

    pub fn recv_timeout(mut self, timeout: Duration) -> Self {
        self.config.queue = self.config.queue.with_recv_timeout(timeout);
        self
    }

    pub fn fps(mut self, fps: u32) -> Self {
        self.config.source = self.config.source.with_fps(fps);
        self
    }

    pub fn resolution(mut self, width: u32, height: u32) -> Self {
        self.config.source = self.config.source.with_resolution(width, height);
        self
    }

    pub fn frame_limit(mut self, limit: u64) -> Self {
        self.config.source = self.config.source.with_frame_limit(limit);
        self
    }

    /// Add a simulated consumer
    pub fn consumer(mut self, consumer: ConsumerConfig) -> Self {
        self.config.consumers.push(consumer);
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        Pipeline::new(self.config)
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn wait_for(mut condition: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if condition() {
                return true;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
            .resolution(16, 16)
            .fps(500)
            .recv_timeout(Duration::from_millis(20))
    }

    #[test]
    fn test_every_consumer_sees_whole_stream() {
        let mut pipeline = builder()
            .frame_limit(40)
            .consumer(ConsumerConfig::new("viewer"))
            .consumer(ConsumerConfig::new("recorder"))
            .build()
            .unwrap();

        pipeline.start().unwrap();
        assert!(wait_for(|| pipeline
            .stats()
            .consumers
            .iter()
            .all(|c| c.processed == 40)));

        let stats = pipeline.stats();
        assert_eq!(stats.frames_captured, 40);
        assert_eq!(stats.frames_distributed, 40);
        assert_eq!(stats.subscribers, 2);
        assert_eq!(stats.frames_dropped(), 0);

        pipeline.stop().unwrap();
        assert!(!pipeline.is_running());
    }

    #[test]
    fn test_slow_consumer_only_loses_its_own_frames() {
        let mut pipeline = builder()
            .frame_limit(60)
            .consumer(ConsumerConfig::new("viewer"))
            .consumer(
                ConsumerConfig::new("tracker")
                    .with_delay_ms(50)
                    .with_queue(QueueConfig::default().with_max_size(2)),
            )
            .build()
            .unwrap();

        pipeline.start().unwrap();
        assert!(wait_for(|| pipeline.stats().frames_distributed == 60));
        assert!(wait_for(|| pipeline.stats().consumers[0].processed == 60));

        let stats = pipeline.stats();
        let tracker = &stats.consumers[1];
        assert!(tracker.queue.dropped > 0);
        assert!(tracker.queued <= 2);
        assert_eq!(stats.consumers[0].queue.lost(), 0);

        pipeline.stop().unwrap();
    }

    #[test]
    fn test_late_consumer_and_subscribe_require_start() {
        let mut pipeline = builder().build().unwrap();
        assert!(matches!(pipeline.subscribe(), Err(Error::PipelineNotStarted)));
        assert!(matches!(
            pipeline.add_consumer("late", CountingSink::new()),
            Err(Error::PipelineNotStarted)
        ));

        pipeline.start().unwrap();
        let sink = CountingSink::new();
        pipeline.add_consumer("late", sink.handle()).unwrap();
        assert!(wait_for(|| sink.report().frames > 0));
        assert_eq!(pipeline.stats().subscribers, 1);

        pipeline.stop().unwrap();
        assert_eq!(sink.report().out_of_order, 0);
    }

    #[test]
    fn test_double_start_rejected() {
        let mut pipeline = builder().build().unwrap();
        pipeline.start().unwrap();
        assert!(matches!(pipeline.start(), Err(Error::PipelineAlreadyRunning)));
        pipeline.stop().unwrap();
    }

    #[test]
    fn test_invalid_config_rejected() {
        assert!(builder().max_size(0).build().is_err());
    }

    #[test]
    fn test_stop_without_start_is_noop() {
        let mut pipeline = builder().build().unwrap();
        assert!(pipeline.stop().is_ok());
        assert_eq!(pipeline.stats(), PipelineStats::default());
    }
}
