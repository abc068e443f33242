//! Error types for slack-export-enrich
//!
//! Every fallible operation in the library returns [`Result`]. Per-record
//! problems (missing id, missing profile, unusable picture URL) are not errors
//! and never reach this type; they are logged and the record is left as-is.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for slack-export-enrich operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for slack-export-enrich
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "api_token")
        key: Option<String>,
    },

    /// I/O error while opening, creating or finalizing a file
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Archive container could not be read or written
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Archive file could not be opened or created
    #[error("cannot {operation} archive {}: {reason}", path.display())]
    ArchiveFile {
        /// What was being attempted ("open", "create", "finalize")
        operation: &'static str,
        /// Path of the archive on disk
        path: PathBuf,
        /// Underlying failure
        reason: String,
    },

    /// The user directory entry is not a well-formed list of records
    #[error("malformed {entry}: {reason}")]
    MalformedInput {
        /// Name of the archive entry being decoded
        entry: String,
        /// What was wrong with it
        reason: String,
    },

    /// The remote API rejected the access token
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The remote API answered with something other than a usable page
    #[error("API protocol error: {0}")]
    ApiProtocol(String),

    /// Transport-level failure (connection reset, timeout, truncated body)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// HTTP 429 from the remote API
    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited {
        /// Delay requested by the server, if it sent a parseable one
        retry_after: Option<Duration>,
    },

    /// HTTP 5xx from the remote API
    #[error("server error: HTTP {status}")]
    ServerError {
        /// HTTP status code
        status: u16,
    },

    /// JSON encoding error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Process exit status for this error at the command-line boundary
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Config { .. } => 2,
            _ => 1,
        }
    }
}
