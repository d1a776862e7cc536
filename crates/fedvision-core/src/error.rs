//! Error types for the fedvision workspace.

use thiserror::Error;

/// Main error type shared by the library crates.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image decoding or processing error
    #[error("Image processing error: {0}")]
    Image(String),

    /// Dataset error
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// Requested partition does not exist
    #[error("Partition {id} out of range: dataset has {num_partitions} partitions")]
    PartitionOutOfRange { id: usize, num_partitions: usize },

    /// Model hub does not know the entrypoint
    #[error("Unknown entrypoint '{0}'")]
    UnknownEntrypoint(String),

    /// Model error
    #[error("Model error: {0}")]
    Model(String),

    /// Model record (weights file) could not be read or written
    #[error("Record error: {0}")]
    Record(String),

    /// Parameter list does not match the model it is applied to
    #[error("Parameter mismatch: {0}")]
    ParameterMismatch(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Device error
    #[error("Device error: {0}")]
    Device(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid argument error
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Image(err.to_string())
    }
}

/// Specialized Result type for fedvision operations.
pub type Result<T> = std::result::Result<T, Error>;
