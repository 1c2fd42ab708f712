//! Error types for feedsnap
//!
//! Errors are split by how far they reach:
//! - [`FetchError`] and [`FeedError`] abort a single source's pipeline and end up
//!   as a [`PendingError`](crate::types::PendingError) in the snapshot
//! - [`StagingError`] and the I/O / serialization variants of [`Error`] abort the
//!   whole run, since there is no safe partial state to publish
//!
//! Every per-source error exposes a machine-readable code via `error_code()`.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for feedsnap operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for feedsnap
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "aggregation.chunk_size")
        key: Option<String>,
    },

    /// Output directory lifecycle failed
    #[error("staging error: {0}")]
    Staging(#[from] StagingError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error outside of feed fetching (HTTP client setup, cover downloads)
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The run was interrupted by a shutdown signal and the previous output restored
    #[error("run interrupted by shutdown signal")]
    Interrupted,

    /// Other error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key
    pub fn config(message: impl Into<String>, key: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.into()),
        }
    }
}

/// Errors from a single conditional fetch attempt
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection or transport failure
    #[error("network error fetching {url}: {reason}")]
    Network {
        /// URL being requested when the failure happened
        url: String,
        /// Transport error description
        reason: String,
    },

    /// The wall-clock timeout fired before the response completed
    #[error("request to {url} timed out after {timeout:?}")]
    Timeout {
        /// URL originally requested
        url: String,
        /// Timeout that expired
        timeout: Duration,
    },

    /// The redirect chain was longer than allowed
    #[error("too many redirects (more than {max}) fetching {url}")]
    TooManyRedirects {
        /// URL originally requested
        url: String,
        /// Maximum number of redirects that are followed
        max: u32,
    },

    /// Terminal response status (not a followed redirect and not 304)
    #[error("{url} returned HTTP status {status}")]
    BadStatus {
        /// URL that answered with the status
        url: String,
        /// HTTP status code
        status: u16,
    },

    /// Source URL or redirect location could not be parsed
    #[error("invalid URL {url}: {reason}")]
    InvalidUrl {
        /// The offending URL or location value
        url: String,
        /// Parse error description
        reason: String,
    },
}

impl FetchError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Network { .. } => "network_error",
            FetchError::Timeout { .. } => "timeout",
            FetchError::TooManyRedirects { .. } => "too_many_redirects",
            FetchError::BadStatus { .. } => "bad_status",
            FetchError::InvalidUrl { .. } => "invalid_url",
        }
    }
}

/// Errors turning a payload into a feed document
#[derive(Debug, Error)]
pub enum FeedError {
    /// Malformed payload
    #[error("malformed feed: {0}")]
    Parse(String),

    /// Well-formed document without an `<rss>` root element
    #[error("document has no <rss> root element")]
    MissingRoot,
}

impl FeedError {
    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            FeedError::Parse(_) => "parse_error",
            FeedError::MissingRoot => "missing_root",
        }
    }
}

/// Per-source pipeline failure
///
/// Converted by the batch scheduler into a
/// [`PendingError`](crate::types::PendingError); never fatal to the run.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Download failed after the retry
    #[error(transparent)]
    Fetch(#[from] FetchError),

    /// Payload was downloaded but is not a usable feed
    #[error(transparent)]
    Feed(#[from] FeedError),

    /// Server answered 304 but no previous record exists to reuse
    #[error("feed reported unchanged but no previous record exists")]
    NoPriorRecord,
}

impl SourceError {
    /// Phase label recorded alongside the error
    pub fn label(&self) -> &'static str {
        match self {
            SourceError::Fetch(_) => "fetch",
            SourceError::Feed(FeedError::Parse(_)) => "parse",
            SourceError::Feed(FeedError::MissingRoot) => "bad_rss",
            SourceError::NoPriorRecord => "not_modified",
        }
    }

    /// Machine-readable error code
    pub fn error_code(&self) -> &'static str {
        match self {
            SourceError::Fetch(e) => e.error_code(),
            SourceError::Feed(e) => e.error_code(),
            SourceError::NoPriorRecord => "not_modified_without_record",
        }
    }
}

/// Output directory lifecycle errors
///
/// Any of these aborts the run.
#[derive(Debug, Error)]
pub enum StagingError {
    /// Moving the published output aside failed
    #[error("failed to back up {from} to {to}: {source}")]
    Backup {
        /// Published output directory
        from: PathBuf,
        /// Backup destination
        to: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Creating or clearing the working directories failed
    #[error("failed to prepare {path}: {source}")]
    Prepare {
        /// Directory being prepared
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Moving the backup back into place failed
    #[error("failed to restore {backup} into {to}: {source}")]
    Restore {
        /// Backup directory
        backup: PathBuf,
        /// Published output directory
        to: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Removing a directory during commit or discard failed
    #[error("failed to remove {path}: {source}")]
    Cleanup {
        /// Directory being removed
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },
}
