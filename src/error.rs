//! Error types for Chameleon

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for Chameleon operations
pub type Result<T> = std::result::Result<T, ChameleonError>;

/// Errors that can occur in Chameleon
#[derive(Debug, Error)]
pub enum ChameleonError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Request body could not be read while computing the fingerprint
    #[error("failed to generate hash: {0}")]
    HashFailure(#[source] io::Error),

    /// No record stored under this fingerprint
    #[error("no cached response found for request (hash: {0})")]
    RecordingNotFound(String),

    /// Stored record exists but cannot be decoded
    #[error("failed to load cached response {}: {reason}", path.display())]
    CorruptRecord {
        /// Record file that failed to decode
        path: PathBuf,
        /// Decoder message
        reason: String,
    },

    /// Record could not be written to the store
    #[error("failed to write cached response {}: {source}", path.display())]
    StorageWrite {
        /// Target record file
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: io::Error,
    },

    /// Backend could not be reached or failed mid-response
    #[error("upstream error: {0}")]
    Upstream(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Request carries more headers than allowed
    #[error("Too many headers: {0}")]
    TooManyHeaders(usize),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}
