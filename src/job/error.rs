//! Classified failure taxonomy recorded on jobs.
//!
//! Failures never cross the engine boundary as `Err` values; they are
//! recorded on the job (`last_error`, status `error`) and surfaced through
//! the update channels. The host decides how to present them.

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Failure categories produced by stderr classification and finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The downloader binary could not be launched (missing, not executable).
    SpawnFailure,
    /// The remote host refused access (HTTP 403, forbidden).
    AccessDenied,
    /// The requested media does not exist (HTTP 404, dead link).
    NotFound,
    /// The media exists but cannot be served (removed, private, geo-blocked).
    MediaUnavailable,
    /// The extractor demands a signed-in session or cookies.
    AuthRequired,
    /// The requested format expression matched nothing.
    FormatUnavailable,
    /// An `ERROR:` line that matched no known phrase.
    GenericExtractorError,
    /// The process exited non-zero without emitting a classified error line.
    NonZeroExit,
    /// Output directory or file access failed.
    FilesystemError,
}

impl ErrorKind {
    /// Returns the wire/string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SpawnFailure => "spawn_failure",
            Self::AccessDenied => "access_denied",
            Self::NotFound => "not_found",
            Self::MediaUnavailable => "media_unavailable",
            Self::AuthRequired => "auth_required",
            Self::FormatUnavailable => "format_unavailable",
            Self::GenericExtractorError => "generic_extractor_error",
            Self::NonZeroExit => "non_zero_exit",
            Self::FilesystemError => "filesystem_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A failure recorded on a job: taxonomy kind plus a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// Which taxonomy category this failure belongs to.
    pub kind: ErrorKind,
    /// Human-readable detail, usually the raw extractor message.
    pub message: String,
}

impl ClassifiedError {
    /// Creates a classified error from a kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates a spawn-failure error for an unlaunchable binary.
    pub fn spawn_failure(binary: &Path, source: &std::io::Error) -> Self {
        Self {
            kind: ErrorKind::SpawnFailure,
            message: format!("failed to launch {}: {source}", binary.display()),
        }
    }

    /// Creates the generic error for a non-zero exit with no classified line.
    ///
    /// `code` is `None` when the process was terminated by a signal.
    #[must_use]
    pub fn non_zero_exit(code: Option<i32>) -> Self {
        let message = match code {
            Some(code) => format!("downloader exited with code {code}"),
            None => "downloader terminated by signal".to_string(),
        };
        Self {
            kind: ErrorKind::NonZeroExit,
            message,
        }
    }

    /// Creates a filesystem error for an inaccessible path.
    pub fn filesystem(path: &Path, source: &std::io::Error) -> Self {
        Self {
            kind: ErrorKind::FilesystemError,
            message: format!("{}: {source}", path.display()),
        }
    }
}

// From<std::io::Error> is intentionally not implemented: every filesystem
// failure needs the path it happened on, which the io::Error alone does not
// carry. The helper constructors are the supported way in.

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_error_kind_as_str() {
        assert_eq!(ErrorKind::SpawnFailure.as_str(), "spawn_failure");
        assert_eq!(ErrorKind::AuthRequired.as_str(), "auth_required");
        assert_eq!(
            ErrorKind::GenericExtractorError.as_str(),
            "generic_extractor_error"
        );
        assert_eq!(ErrorKind::NonZeroExit.as_str(), "non_zero_exit");
    }

    #[test]
    fn test_error_kind_serde_uses_snake_case() {
        let json = serde_json::to_string(&ErrorKind::MediaUnavailable).unwrap();
        assert_eq!(json, "\"media_unavailable\"");
        let parsed: ErrorKind = serde_json::from_str("\"format_unavailable\"").unwrap();
        assert_eq!(parsed, ErrorKind::FormatUnavailable);
    }

    #[test]
    fn test_classified_error_display_includes_kind_and_message() {
        let error = ClassifiedError::new(ErrorKind::NotFound, "HTTP Error 404");
        let msg = error.to_string();
        assert!(msg.contains("not_found"), "Expected kind in: {msg}");
        assert!(msg.contains("HTTP Error 404"), "Expected message in: {msg}");
    }

    #[test]
    fn test_spawn_failure_names_the_binary() {
        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let error = ClassifiedError::spawn_failure(&PathBuf::from("/opt/bin/yt-dlp"), &io_error);
        assert_eq!(error.kind, ErrorKind::SpawnFailure);
        assert!(error.message.contains("/opt/bin/yt-dlp"));
        assert!(error.message.contains("no such file"));
    }

    #[test]
    fn test_non_zero_exit_with_code() {
        let error = ClassifiedError::non_zero_exit(Some(101));
        assert_eq!(error.kind, ErrorKind::NonZeroExit);
        assert!(error.message.contains("101"));
    }

    #[test]
    fn test_non_zero_exit_signal_termination() {
        let error = ClassifiedError::non_zero_exit(None);
        assert!(error.message.contains("signal"));
    }

    #[test]
    fn test_filesystem_error_names_the_path() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = ClassifiedError::filesystem(&PathBuf::from("/srv/media"), &io_error);
        assert_eq!(error.kind, ErrorKind::FilesystemError);
        assert!(error.message.contains("/srv/media"));
        assert!(error.message.contains("access denied"));
    }

    #[test]
    fn test_classified_error_serde_roundtrip() {
        let error = ClassifiedError::new(ErrorKind::AuthRequired, "Sign in to confirm your age");
        let json = serde_json::to_string(&error).unwrap();
        let parsed: ClassifiedError = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, error);
    }
}
