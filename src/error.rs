//! Error types for the minimap engine

use thiserror::Error;

/// Result type alias for minimap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a minimap
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration (bad selector, unparseable width, ...)
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The rasterizer failed to produce an encoded image
    #[error("Snapshot capture failed: {0}")]
    Capture(String),

    /// The captured image could not be decoded
    #[error("Snapshot decode failed: {0}")]
    Decode(String),

    /// Operation not valid in the current lifecycle state
    #[error("Invalid lifecycle transition: {0}")]
    Lifecycle(String),

    /// The mutation source rejected the observation request
    #[error("Mutation observation failed: {0}")]
    Observe(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Capture(err.to_string())
    }
}
