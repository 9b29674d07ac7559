//! framehub — Frame distribution for camera pipelines
//!
//! Lets one capture producer feed any number of independently paced
//! consumers (live viewer, tracker, recorder, ...) without the producer
//! knowing how many there are or how fast they run.
//!
//! # Components
//!
//! - **Queue**: bounded [`FrameQueue`] with drop-oldest overflow and a
//!   bounded-wait receive
//! - **Distribution**: [`Distributor`] fans each input frame out to every
//!   registered output queue; [`QueueHub`] runs it on a dedicated thread and
//!   mints subscriber queues
//! - **Edges**: [`FrameSource`] / [`Producer`] on the capture side,
//!   [`FrameSink`] / [`Consumer`] on the subscriber side
//!
//! # Example
//!
//! ```rust,no_run
//! use framehub::{Frame, FrameQueue, Image, PixelFormat, QueueHub};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! fn main() -> framehub::Result<()> {
//!     let input = Arc::new(FrameQueue::default());
//!     let hub = QueueHub::new(input.clone())?;
//!
//!     let viewer = hub.add_output_queue();
//!     let tracker = hub.add_output_queue();
//!
//!     input.enqueue(Frame::new(Image::new(640, 480, PixelFormat::Gray8)?, 0));
//!
//!     let a = viewer.dequeue(Duration::from_millis(250));
//!     let b = tracker.dequeue(Duration::from_millis(250));
//!     assert!(a.unwrap().shares_image(&b.unwrap()));
//!
//!     hub.shutdown()
//! }
//! ```

pub mod capture;
pub mod config;
pub mod distributor;
pub mod error;
pub mod hub;
pub mod output;
pub mod pipeline;
pub mod queue;
pub mod types;

// Re-exports for convenience
pub use capture::{FrameSource, Producer, TestPatternSource};
pub use config::{ConsumerConfig, PipelineConfig, QueueConfig, SourceConfig};
pub use distributor::{Distributor, DistributorState};
pub use error::{Error, Result};
pub use hub::QueueHub;
pub use output::{Consumer, CountingSink, FrameSink, NullSink, SinkReport, SlowSink};
pub use pipeline::{ConsumerStats, Pipeline, PipelineBuilder, PipelineStats};
pub use queue::{EnqueueOutcome, FrameQueue, QueueStats};
pub use types::{Frame, Framerate, Image, PixelFormat, Resolution};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
