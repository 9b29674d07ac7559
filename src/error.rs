//! Error types for framehub

use thiserror::Error;

/// Result type alias for framehub operations
pub type Result<T> = std::result::Result<T, Error>;

/// framehub error type
#[derive(Error, Debug)]
pub enum Error {
    // Distribution errors
    #[error("Distributor has no input queue")]
    NoInputQueue,

    #[error("Invalid queue configuration: {0}")]
    InvalidQueueConfig(String),

    #[error("Invalid image dimensions: {0}")]
    InvalidImage(String),

    // Capture errors
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Capture ended")]
    CaptureEnded,

    // Pipeline errors
    #[error("Pipeline not started")]
    PipelineNotStarted,

    #[error("Pipeline already running")]
    PipelineAlreadyRunning,

    // General errors
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Check if this error is recoverable
    ///
    /// A recoverable error leaves the pipeline usable; the caller may retry
    /// or skip the affected frame.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Capture(_))
    }

    /// Check if this is a configuration problem
    pub fn is_config_issue(&self) -> bool {
        matches!(
            self,
            Error::Config(_) | Error::InvalidQueueConfig(_) | Error::Toml(_)
        )
    }
}
