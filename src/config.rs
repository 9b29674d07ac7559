//! Configuration types for framehub

use crate::error::{Error, Result};
use crate::types::{Framerate, PixelFormat, Resolution};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default number of frames reserved up front
pub const DEFAULT_INITIAL_CAPACITY: usize = 300;
/// Default occupancy cap
pub const DEFAULT_MAX_SIZE: usize = 1500;
/// Default bounded wait for a receive
pub const DEFAULT_RECV_TIMEOUT_MS: u64 = 250;

/// Frame queue configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Frames reserved at construction
    pub initial_capacity: usize,
    /// Maximum occupancy
    pub max_size: usize,
    /// Evict the oldest frame on overflow instead of abandoning the new one
    pub drop_oldest: bool,
    /// Receive timeout in milliseconds
    pub recv_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            max_size: DEFAULT_MAX_SIZE,
            drop_oldest: true,
            recv_timeout_ms: DEFAULT_RECV_TIMEOUT_MS,
        }
    }
}

impl QueueConfig {
    pub fn with_max_size(mut self, max_size: usize) -> Self {
        self.max_size = max_size;
        self
    }

    pub fn with_initial_capacity(mut self, capacity: usize) -> Self {
        self.initial_capacity = capacity;
        self
    }

    pub fn with_drop_oldest(mut self, drop_oldest: bool) -> Self {
        self.drop_oldest = drop_oldest;
        self
    }

    /// Set the receive timeout, rounding any sub-millisecond remainder up
    pub fn with_recv_timeout(mut self, timeout: Duration) -> Self {
        let mut millis = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        if timeout > Duration::from_millis(millis) {
            millis = millis.saturating_add(1);
        }
        self.recv_timeout_ms = millis;
        self
    }

    /// Receive timeout as a duration
    pub fn recv_timeout(&self) -> Duration {
        Duration::from_millis(self.recv_timeout_ms)
    }

    /// Reservation actually made; never more than the cap
    pub fn effective_initial_capacity(&self) -> usize {
        self.initial_capacity.min(self.max_size)
    }

    /// Reject configurations that would make the queue unusable
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(Error::InvalidQueueConfig("max_size must be > 0".into()));
        }
        if self.recv_timeout_ms == 0 {
            return Err(Error::InvalidQueueConfig(
                "recv_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }
}

/// Synthetic capture source configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub format: PixelFormat,
    /// Stop after this many frames (None = unbounded)
    pub frame_limit: Option<u64>,
    pub resolution: Resolution,
    pub framerate: Framerate,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            format: PixelFormat::Gray8,
            frame_limit: None,
            resolution: Resolution::VGA,
            framerate: Framerate::FPS_30,
        }
    }
}

impl SourceConfig {
    pub fn with_fps(mut self, fps: u32) -> Self {
        self.framerate = Framerate::new(fps, 1);
        self
    }

    pub fn with_resolution(mut self, width: u32, height: u32) -> Self {
        self.resolution = Resolution::new(width, height);
        self
    }

    pub fn with_frame_limit(mut self, limit: u64) -> Self {
        self.frame_limit = Some(limit);
        self
    }
}

/// One simulated subscriber
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsumerConfig {
    /// Name used for the thread and in logs
    pub name: String,
    /// Simulated processing time per frame in milliseconds
    #[serde(default)]
    pub delay_ms: u64,
    /// Queue overrides for this subscriber (hub defaults otherwise)
    #[serde(default)]
    pub queue: Option<QueueConfig>,
}

impl ConsumerConfig {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            delay_ms: 0,
            queue: None,
        }
    }

    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn with_queue(mut self, queue: QueueConfig) -> Self {
        self.queue = Some(queue);
        self
    }
}

/// Whole pipeline configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Defaults for the input queue and every subscriber queue
    pub queue: QueueConfig,
    pub source: SourceConfig,
    pub consumers: Vec<ConsumerConfig>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            source: SourceConfig::default(),
            consumers: vec![
                ConsumerConfig::new("viewer"),
                ConsumerConfig::new("tracker").with_delay_ms(20),
                ConsumerConfig::new("recorder").with_delay_ms(5),
            ],
        }
    }
}

impl PipelineConfig {
    /// Parse from a TOML document
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Self::from_toml_str(&contents)
    }

    /// Serialize to a TOML document
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        for consumer in &self.consumers {
            if consumer.name.is_empty() {
                return Err(Error::Config("consumer name must not be empty".into()));
            }
            if let Some(queue) = &consumer.queue {
                queue.validate()?;
            }
        }
        Ok(())
    }
}
