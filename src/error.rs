use std::path::PathBuf;
use thiserror::Error;

/// Engine error taxonomy. Per-file failures are recoverable; store failures
/// abort the whole invocation because every worker depends on the store.
#[derive(Debug, Error)]
pub enum SnifferError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed {format} in {path}: {detail}")]
    Format {
        format: String,
        path: PathBuf,
        detail: String,
    },

    #[error("File too large: {path} is {size} bytes, ceiling is {limit}")]
    SizeExceeded { path: PathBuf, size: u64, limit: u64 },

    #[error("Analysis of {path} timed out after {seconds}s")]
    Timeout { path: PathBuf, seconds: u64 },

    #[error("Signature store error: {detail}")]
    Store { detail: String },

    #[error("Signature validation failed: {detail}")]
    Validation { detail: String },
}

pub type Result<T> = std::result::Result<T, SnifferError>;

/// Stable error-kind tags surfaced in analysis results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    IoError,
    FormatError,
    ResourceExceeded,
    Timeout,
    StoreError,
    ValidationError,
}

impl SnifferError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    pub fn format(
        format: impl Into<String>,
        path: impl Into<PathBuf>,
        detail: impl Into<String>,
    ) -> Self {
        Self::Format {
            format: format.into(),
            path: path.into(),
            detail: detail.into(),
        }
    }

    pub fn store(detail: impl Into<String>) -> Self {
        Self::Store { detail: detail.into() }
    }

    pub fn validation(detail: impl Into<String>) -> Self {
        Self::Validation { detail: detail.into() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io { .. } => ErrorKind::IoError,
            Self::Format { .. } => ErrorKind::FormatError,
            Self::SizeExceeded { .. } => ErrorKind::ResourceExceeded,
            Self::Timeout { .. } => ErrorKind::Timeout,
            Self::Store { .. } => ErrorKind::StoreError,
            Self::Validation { .. } => ErrorKind::ValidationError,
        }
    }

    /// True if a batch can continue past this error.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Store { .. })
    }
}

impl From<rusqlite::Error> for SnifferError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Store { detail: e.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_are_fatal() {
        assert!(!SnifferError::store("schema mismatch").is_recoverable());
        assert!(SnifferError::format("elf", "/tmp/x", "truncated header").is_recoverable());
    }

    #[test]
    fn kinds_serialize_stably() {
        let k = serde_json::to_string(&ErrorKind::IoError).unwrap();
        assert_eq!(k, "\"IoError\"");
    }
}
