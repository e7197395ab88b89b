//! Error types for vcp-core
//!
//! Every failure in the mapper and the transfer engine is returned as one of
//! these variants. Nothing in this crate terminates the host process.

use thiserror::Error;

/// Result type alias for vcp-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for vcp-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Container or blob absent in the backend
    #[error("Not found: {0}")]
    NotFound(String),

    /// Address could not be parsed, or its trailing delimiter contradicts the
    /// requested resolution mode
    #[error("Malformed address: {0}")]
    MalformedAddress(String),

    /// Connectivity or authentication failure reported by a backend
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Read stream or block staging failed part way through a transfer
    #[error("Partial transfer: {0}")]
    PartialTransfer(String),

    /// Local cache read or write failure
    #[error("Cache I/O error: {0}")]
    CacheIo(String),

    /// Cancellation was observed before the transfer completed
    #[error("Transfer cancelled")]
    Cancelled,

    /// Upload requested for a blob that holds no downloaded content
    #[error("Blob has no cached content: {0}")]
    NotCached(String),

    /// Invalid transfer configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// General error
    #[error("{0}")]
    General(String),
}

impl Error {
    /// Get the appropriate exit code for this error
    pub const fn exit_code(&self) -> i32 {
        match self {
            Error::MalformedAddress(_) | Error::Config(_) => 2, // UsageError
            Error::BackendUnavailable(_) => 3,                  // NetworkError
            Error::NotFound(_) => 5,                            // NotFound
            Error::PartialTransfer(_) => 8,                     // TransferError
            Error::CacheIo(_) | Error::NotCached(_) => 9,       // CacheError
            Error::Cancelled => 130,                            // Interrupted
            Error::General(_) => 1,                             // GeneralError
        }
    }

    /// Whether a caller-layered retry policy may reasonably retry this error
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Error::BackendUnavailable(_))
    }

    pub(crate) fn cache_io(context: impl std::fmt::Display, err: std::io::Error) -> Self {
        Error::CacheIo(format!("{context}: {err}"))
    }
}
