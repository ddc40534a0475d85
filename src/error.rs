//! Error types for the request buffer.
//!
//! Empty pops and unknown-key unblocks are not errors; they return `None`.

use thiserror::Error;

/// Errors raised by the shared timeout ticker.
#[derive(Debug, Error)]
pub enum TickerError {
    #[error("Timeout ticker is shut down")]
    Shutdown,

    #[error("Registration {0} is not known to the timeout ticker")]
    UnknownRegistration(u64),

    #[error("Failed to spawn ticker thread: {0}")]
    Spawn(String),
}

/// Errors raised by [`crate::buffer::AsyncRequestBuffer`].
#[derive(Debug, Error)]
pub enum BufferError {
    #[error("Invalid buffer config: {0}")]
    InvalidConfig(String),

    #[error("Failed to register buffer timeout: {0}")]
    Register(#[source] TickerError),

    #[error("Failed to cancel buffer timeout: {0}")]
    Close(#[source] TickerError),
}

impl BufferError {
    /// Returns true if the shared ticker is gone rather than this buffer misconfigured.
    pub fn is_ticker_shutdown(&self) -> bool {
        matches!(
            self,
            Self::Register(TickerError::Shutdown) | Self::Close(TickerError::Shutdown)
        )
    }
}

/// Errors raised while loading configuration files.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid config value: {0}")]
    Invalid(String),
}
