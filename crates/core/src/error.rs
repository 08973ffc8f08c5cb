//! Error types for sm-core
//!
//! Provides a unified error type for key handling, remote queries, and
//! transfer operations.

use thiserror::Error;

/// Result type alias for sm-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for sm-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration file error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or unbuildable key
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error
    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    /// TOML serialization error
    #[error("TOML serialization error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// URL parsing error
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Remote key has no listing entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// Network error (retryable)
    #[error("Network error: {0}")]
    Network(String),

    /// Key classifies as both file and folder
    #[error("Ambiguous key (file/folder collision): {0}")]
    AmbiguousKey(String),

    /// Completed object size disagrees with the local source
    #[error("Transfer integrity mismatch for {key}: expected {expected} bytes, got {actual}")]
    TransferIntegrity {
        key: String,
        expected: u64,
        actual: u64,
    },

    /// Open multipart upload cannot be resumed
    #[error("Multipart resume failed: {0}")]
    MultipartResume(String),

    /// No codec registered for a file suffix
    #[error("No codec registered for suffix: {0}")]
    UnknownSuffix(String),

    /// General error
    #[error("{0}")]
    General(String),
}
