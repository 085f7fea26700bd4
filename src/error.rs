//! Error types for tea-dl
//!
//! Errors are grouped by how the orchestrator reacts to them:
//! - [`ValidationError`] - caller-fixable input problems, never retried
//! - [`FetchError`] - failures reported by the external fetch tool, tagged transient or permanent
//! - [`PersistenceError`] - history ledger I/O, surfaced but never fatal to a running batch
//! - [`TimestampError`] - clip boundary parsing and validation
//! - [`ProcessingError`] - failures reported by the external media-processing tool

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for tea-dl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for tea-dl
#[derive(Debug, Error)]
pub enum Error {
    /// Caller input was rejected before any work started
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// The external fetch capability failed
    #[error("fetch error: {0}")]
    Fetch(#[from] FetchError),

    /// History ledger could not be read or written
    #[error("persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Clip boundaries could not be parsed or validated
    #[error("timestamp error: {0}")]
    Timestamp(#[from] TimestampError),

    /// The external media-processing capability failed
    #[error("processing error: {0}")]
    Processing(#[from] ProcessingError),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// External tool could not be executed at all (yt-dlp, ffmpeg)
    #[error("external tool error: {0}")]
    ExternalTool(String),

    /// Operation not supported (missing binary, etc.)
    #[error("not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Map this error onto the coarse taxonomy used in batch reports
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) | Error::Timestamp(_) => ErrorKind::Validation,
            Error::Fetch(e) => e.kind.into(),
            Error::Persistence(_) => ErrorKind::Persistence,
            Error::Processing(_) => ErrorKind::Processing,
            Error::Io(e) => {
                if crate::retry::is_transient_io(e.kind()) {
                    ErrorKind::Transient
                } else {
                    ErrorKind::Permanent
                }
            }
            Error::Serialization(_) => ErrorKind::Permanent,
            Error::ExternalTool(_) | Error::NotSupported(_) => ErrorKind::Permanent,
        }
    }
}

/// Coarse error classification carried in every failed job outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Bad URL, bad timestamp, bad concurrency value, bad quality key
    Validation,
    /// Network, timeout or rate-limit failure
    Transient,
    /// Content unavailable, permission denied, unsupported
    Permanent,
    /// Ledger or configuration I/O failure
    Persistence,
    /// Clip processing failure
    Processing,
    /// Job was never attempted (or stopped retrying) because the batch was cancelled
    Cancelled,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorKind::Validation => "validation",
            ErrorKind::Transient => "transient",
            ErrorKind::Permanent => "permanent",
            ErrorKind::Persistence => "persistence",
            ErrorKind::Processing => "processing",
            ErrorKind::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

/// Input validation errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// URL is empty or cannot be parsed
    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected input
        url: String,
        /// Why it was rejected
        reason: String,
    },

    /// URL is well-formed but points at a host we do not fetch from
    #[error("unsupported host '{host}'")]
    UnsupportedHost {
        /// The rejected host
        host: String,
    },

    /// Concurrency outside 1..=5
    #[error("concurrency must be between {min} and {max}, got {value}")]
    Concurrency {
        /// The rejected value
        value: usize,
        /// Smallest allowed value
        min: usize,
        /// Largest allowed value
        max: usize,
    },

    /// Quality key not present in the preset table
    #[error("unknown quality preset '{key}'")]
    UnknownQuality {
        /// The rejected key
        key: String,
    },

    /// Splitting was requested for a job that does not resolve to a single item
    #[error("splitting is only supported for single items, not {category}")]
    SplitNotAllowed {
        /// Category of the rejected job
        category: crate::types::Category,
    },

    /// Category could not be determined and best-effort fetching is disabled
    #[error("unrecognized URL '{url}' and best-effort fetching is disabled")]
    UnrecognizedUrl {
        /// The rejected URL
        url: String,
    },

    /// Clip input failed its pre-flight check
    #[error("invalid clip input: {0}")]
    ClipInput(String),

    /// Configuration value out of range
    #[error("invalid configuration value for '{key}': {message}")]
    Config {
        /// Configuration key (camelCase, as persisted)
        key: String,
        /// Human-readable explanation
        message: String,
    },

    /// Batch contained no URLs
    #[error("batch contains no URLs")]
    EmptyBatch,
}

/// Transient/permanent tag attached by the fetch capability
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchErrorKind {
    /// Worth retrying: network, timeout, rate limit
    Transient,
    /// Never retried: removed, private, forbidden, unsupported
    Permanent,
}

impl From<FetchErrorKind> for ErrorKind {
    fn from(kind: FetchErrorKind) -> Self {
        match kind {
            FetchErrorKind::Transient => ErrorKind::Transient,
            FetchErrorKind::Permanent => ErrorKind::Permanent,
        }
    }
}

/// Failure reported by the external fetch capability
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct FetchError {
    /// Whether the failure is worth retrying
    pub kind: FetchErrorKind,
    /// Tool output or description
    pub message: String,
}

// Lowercased substrings; permanent patterns are checked first.
const PERMANENT_PATTERNS: &[&str] = &[
    "private video",
    "video unavailable",
    "this video is unavailable",
    "has been removed",
    "account associated with this video has been terminated",
    "copyright",
    "sign in to confirm your age",
    "members-only",
    "http error 403",
    "http error 404",
    "403: forbidden",
    "404: not found",
    "permission denied",
    "unsupported url",
    "is not a valid url",
    "does not exist",
];

const TRANSIENT_PATTERNS: &[&str] = &[
    "timed out",
    "timeout",
    "connection reset",
    "connection refused",
    "connection aborted",
    "temporary failure",
    "temporarily",
    "network is unreachable",
    "http error 429",
    "too many requests",
    "rate limit",
    "http error 500",
    "http error 502",
    "http error 503",
    "http error 504",
    "incomplete read",
    "remote end closed",
];

impl FetchError {
    /// Create a retryable fetch error
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Transient,
            message: message.into(),
        }
    }

    /// Create a non-retryable fetch error
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            kind: FetchErrorKind::Permanent,
            message: message.into(),
        }
    }

    /// Classify raw tool output into a tagged error
    ///
    /// Unrecognized output is treated as transient.
    pub fn classify(output: &str) -> Self {
        let lower = output.to_lowercase();
        let message = output.trim().to_string();

        if PERMANENT_PATTERNS.iter().any(|p| lower.contains(p)) {
            return Self::permanent(message);
        }
        if TRANSIENT_PATTERNS.iter().any(|p| lower.contains(p)) {
            return Self::transient(message);
        }
        Self::transient(message)
    }

    /// Whether this error may be retried
    pub fn is_transient(&self) -> bool {
        self.kind == FetchErrorKind::Transient
    }
}

/// History ledger I/O errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Ledger file could not be read
    #[error("failed to read history from {path}: {source}")]
    Read {
        /// Ledger file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Ledger file could not be written
    #[error("failed to write history to {path}: {source}")]
    Write {
        /// Ledger file path
        path: PathBuf,
        /// Underlying I/O error
        source: std::io::Error,
    },

    /// Ledger could not be encoded
    #[error("failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),

    /// The single-writer task is gone
    #[error("history writer is no longer running")]
    WriterClosed,
}

/// Clip boundary parsing and validation errors
///
/// Clip indices are 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimestampError {
    /// Offset is not `M:SS` or `H:MM:SS`
    #[error("invalid time offset '{value}' (expected M:SS or H:MM:SS)")]
    InvalidOffset {
        /// The rejected text
        value: String,
    },

    /// A clip in a structured file is missing a required field
    #[error("clip {index} is missing required field '{field}'")]
    MissingField {
        /// Clip position
        index: usize,
        /// Missing field name
        field: &'static str,
    },

    /// Clip end is not after its start
    #[error("clip {index} ends at or before its start")]
    EmptyRange {
        /// Clip position
        index: usize,
    },

    /// Clip starts before the previous clip ends
    #[error("clip {index} overlaps the previous clip")]
    Overlap {
        /// Clip position
        index: usize,
    },

    /// Clip extends past the end of the source media
    #[error("clip {index} extends beyond the media duration")]
    BeyondDuration {
        /// Clip position
        index: usize,
    },

    /// Input produced no clips at all
    #[error("no clips could be parsed from the input")]
    NoClips,

    /// Structured document could not be decoded
    #[error("malformed clip document: {0}")]
    Malformed(String),
}

/// Media-processing (clip cutting) errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProcessingError {
    /// The processing tool ran and reported failure
    #[error("processing failed for {output}: {reason}")]
    Failed {
        /// Output file that was not produced
        output: PathBuf,
        /// Tool output (truncated)
        reason: String,
    },

    /// The processing tool could not be started
    #[error("failed to run media processor: {0}")]
    Spawn(String),

    /// Output directory could not be prepared
    #[error("cannot prepare output directory {path}: {reason}")]
    OutputDir {
        /// Directory path
        path: PathBuf,
        /// Why it failed
        reason: String,
    },
}
