//! Error taxonomy for the synthesis pipeline.
//!
//! Three layers:
//!
//! | Type               | Raised by                       | Retried?                   |
//! |--------------------|---------------------------------|----------------------------|
//! | [`TtsError`]       | a [`TtsClient`] call            | rate limits, 5xx, timeouts |
//! | [`StorageError`]   | a [`FileStorage`] call          | never                      |
//! | [`SynthesisError`] | [`Synthesizer`], [`wav::merge`] | terminal, one per request  |
//!
//! [`TtsClient`]: crate::client::TtsClient
//! [`FileStorage`]: crate::storage::FileStorage
//! [`Synthesizer`]: crate::synthesis::Synthesizer
//! [`wav::merge`]: crate::wav::merge

use std::{fmt, io, path::PathBuf, time::Duration};

use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// TTS client failures
// ─────────────────────────────────────────────────────────────────────────────

/// Failure of a single TTS request.
#[derive(Debug, Error)]
pub enum TtsError {
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("server error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    ServerError { status: Option<u16>, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The provider answered 2xx but the body could not be decoded.
    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl TtsError {
    /// Whether the orchestrator may retry the request after a backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited(_) | Self::ServerError { .. } | Self::Timeout(_))
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unauthorized(_) => ErrorKind::Unauthorized,
            Self::RateLimited(_) => ErrorKind::RateLimited,
            Self::ServerError { .. } => ErrorKind::ServerError,
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::InvalidInput(_) => ErrorKind::InvalidArgument,
            Self::MalformedResponse(_) => ErrorKind::MalformedAudio,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Storage failures
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("disk full while writing {}", .path.display())]
    DiskFull { path: PathBuf },

    #[error("invalid storage path {0:?}")]
    InvalidPath(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    /// Classify an I/O error raised while touching `path`.
    pub fn from_io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::StorageFull {
            Self::DiskFull { path }
        } else {
            Self::Io { path, source }
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DiskFull { .. } => ErrorKind::DiskFull,
            Self::InvalidPath(_) => ErrorKind::InvalidArgument,
            Self::Io { .. } => ErrorKind::Io,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Terminal synthesis failure
// ─────────────────────────────────────────────────────────────────────────────

/// The single terminal error of a synthesis request.
///
/// Chunk indices are 1-based, matching progress reporting.
#[derive(Debug, Error)]
pub enum SynthesisError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("chunk {index}/{total} failed after {attempts} attempt(s): {source}")]
    Chunk {
        index: usize,
        total: usize,
        attempts: u32,
        #[source]
        source: TtsError,
    },

    #[error("chunk {index}/{total} returned malformed audio ({len} bytes)")]
    MalformedAudio { index: usize, total: usize, len: usize },

    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl SynthesisError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_) => ErrorKind::InvalidArgument,
            Self::Chunk { source, .. } => source.kind(),
            Self::MalformedAudio { .. } => ErrorKind::MalformedAudio,
            Self::Storage(e) => e.kind(),
        }
    }
}

/// Flat classification used for user-facing messages and progress reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    Unauthorized,
    RateLimited,
    ServerError,
    Timeout,
    MalformedAudio,
    DiskFull,
    Io,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InvalidArgument => "invalid argument",
            Self::Unauthorized => "unauthorized",
            Self::RateLimited => "rate limited",
            Self::ServerError => "server error",
            Self::Timeout => "timeout",
            Self::MalformedAudio => "malformed audio",
            Self::DiskFull => "disk full",
            Self::Io => "I/O error",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classes() {
        assert!(TtsError::RateLimited("slow down".into()).is_retryable());
        assert!(TtsError::ServerError { status: Some(503), message: String::new() }.is_retryable());
        assert!(TtsError::Timeout(Duration::from_secs(60)).is_retryable());
        assert!(!TtsError::Unauthorized("bad key".into()).is_retryable());
        assert!(!TtsError::InvalidInput("too long".into()).is_retryable());
        assert!(!TtsError::MalformedResponse("not base64".into()).is_retryable());
    }

    #[test]
    fn test_chunk_error_carries_context() {
        let err = SynthesisError::Chunk {
            index: 2,
            total: 3,
            attempts: 4,
            source: TtsError::ServerError { status: Some(502), message: "bad gateway".into() },
        };
        assert_eq!(err.kind(), ErrorKind::ServerError);
        let msg = err.to_string();
        assert!(msg.contains("2/3"), "got: {msg}");
        assert!(msg.contains("4 attempt"), "got: {msg}");
        assert!(msg.contains("(502)"), "got: {msg}");
    }

    #[test]
    fn test_storage_full_maps_to_disk_full() {
        let e = StorageError::from_io("/tmp/x.wav", io::Error::from(io::ErrorKind::StorageFull));
        assert_eq!(e.kind(), ErrorKind::DiskFull);
        let e =
            StorageError::from_io("/tmp/x.wav", io::Error::from(io::ErrorKind::PermissionDenied));
        assert_eq!(e.kind(), ErrorKind::Io);
    }
}
