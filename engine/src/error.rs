//! Error types for the mirror engine.
//!
//! The primary error type is `EngineError`. Job-level variants (source missing,
//! destination unwritable, bad pattern) abort the affected job. Per-entry
//! variants (`TransferFailed`, `DeleteFailed`) are converted into
//! `EntryFailure` records on `SyncStats` and never stop a job.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// Source directory does not exist (or is not a directory)
    #[error("Source directory not found: {}", .path.display())]
    SourceNotFound { path: PathBuf },

    /// Source directory exists but its metadata cannot be read
    #[error("Source directory access denied: {}", .path.display())]
    SourceAccessDenied { path: PathBuf, source: io::Error },

    /// Destination cannot be created or is not a directory
    #[error("Destination directory is not writable: {}", .path.display())]
    DestUnwritable { path: PathBuf, source: io::Error },

    /// An include or exclude rule failed to compile
    #[error("Invalid pattern '{pattern}'")]
    InvalidPattern { pattern: String, source: globset::Error },

    /// Failed to enumerate a directory
    #[error("Failed to enumerate directory: {}", .path.display())]
    EnumerationFailed { path: PathBuf, source: io::Error },

    /// Copying a single file failed
    #[error("Failed to transfer file: {}", .path.display())]
    TransferFailed { path: PathBuf, source: io::Error },

    /// Removing a single destination entry failed
    #[error("Failed to delete: {}", .path.display())]
    DeleteFailed { path: PathBuf, source: io::Error },

    /// Config file could not be read or parsed
    #[error("Invalid configuration in {}: {message}", .path.display())]
    Config { path: PathBuf, message: String },
}

impl EngineError {
    /// Extract the OS error code from this error, if available.
    pub fn raw_os_error(&self) -> Option<u32> {
        match self {
            Self::SourceAccessDenied { source, .. }
            | Self::DestUnwritable { source, .. }
            | Self::EnumerationFailed { source, .. }
            | Self::TransferFailed { source, .. }
            | Self::DeleteFailed { source, .. } => source.raw_os_error().map(|e| e as u32),
            _ => None,
        }
    }

    /// Human readable message including the underlying cause.
    pub fn detailed_message(&self) -> String {
        let mut message = self.to_string();
        let mut cause = std::error::Error::source(self);
        while let Some(err) = cause {
            message.push_str(": ");
            message.push_str(&err.to_string());
            cause = err.source();
        }
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detailed_message_includes_cause() {
        let err = EngineError::TransferFailed {
            path: PathBuf::from("a/b.py"),
            source: io::Error::new(io::ErrorKind::PermissionDenied, "nope"),
        };
        let message = err.detailed_message();
        assert!(message.starts_with("Failed to transfer file: a/b.py"));
        assert!(message.ends_with(": nope"));
    }

    #[test]
    fn test_raw_os_error_absent_for_missing_source() {
        let err = EngineError::SourceNotFound { path: PathBuf::from("/nope") };
        assert_eq!(err.raw_os_error(), None);
    }
}
