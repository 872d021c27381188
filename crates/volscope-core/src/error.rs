//! Error types for volscope.

use thiserror::Error;

/// The main error type for volscope core operations.
#[derive(Error, Debug)]
pub enum VolscopeError {
    /// Voxel data does not match the declared grid shape.
    #[error("data size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    /// A volume dimension was zero or non-finite.
    #[error("invalid volume dimensions: {0:?}")]
    InvalidDimensions([f32; 3]),

    /// A channel index was out of range.
    #[error("channel {index} out of range (volume has {count} channels)")]
    ChannelOutOfRange { index: usize, count: usize },

    /// Camera projection that the volume renderers cannot build rays for.
    #[error("unsupported camera projection: {0}")]
    UnsupportedCamera(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

/// A specialized Result type for volscope core operations.
pub type Result<T> = std::result::Result<T, VolscopeError>;
