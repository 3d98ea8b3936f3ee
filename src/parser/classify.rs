//! Maps raw downloader error text onto the stable error taxonomy.
//!
//! The downloader reports failures as free-form prose. Consumers need a
//! small closed set of categories to decide on retries and messaging, so
//! classification walks an ordered phrase table and takes the first hit.
//! Specific categories sit above broad ones: "Requested format is not
//! available" must classify as a format problem even though it also
//! contains "not available".

use crate::job::{ClassifiedError, ErrorKind};

/// Hard error marker emitted by the downloader. Case-sensitive.
pub(crate) const ERROR_MARKER: &str = "ERROR:";

/// Warning marker. Warnings are logged and never fail a job.
pub(crate) const WARNING_MARKER: &str = "WARNING:";

/// Ordered classification table; earlier rows win.
const PHRASE_TABLE: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::AuthRequired,
        &[
            "sign in",
            "log in",
            "login",
            "cookies",
            "age-restricted",
            "age restricted",
            "captcha",
            "confirm you're not a bot",
            "authentication",
        ],
    ),
    (
        ErrorKind::FormatUnavailable,
        &[
            "requested format is not available",
            "requested format not available",
            "no video formats",
            "format is not available",
        ],
    ),
    (
        ErrorKind::AccessDenied,
        &["403", "forbidden", "access denied"],
    ),
    (
        ErrorKind::NotFound,
        &["404", "not found", "does not exist"],
    ),
    (
        ErrorKind::MediaUnavailable,
        &[
            "unavailable",
            "not available",
            "removed",
            "private video",
            "geo restriction",
            "geo-restricted",
            "blocked",
            "country",
        ],
    ),
];

/// Classifies a downloader error message into a [`ClassifiedError`].
///
/// Matching is case-insensitive over the whole message. Anything the table
/// does not recognize falls back to [`ErrorKind::GenericExtractorError`],
/// keeping the raw message for display.
#[must_use]
pub fn classify_error(message: &str) -> ClassifiedError {
    let message = message
        .trim()
        .strip_prefix(ERROR_MARKER)
        .map_or_else(|| message.trim(), str::trim);
    let lowered = message.to_lowercase();

    for (kind, phrases) in PHRASE_TABLE {
        if phrases.iter().any(|phrase| lowered.contains(phrase)) {
            return ClassifiedError::new(*kind, message.to_string());
        }
    }
    ClassifiedError::new(ErrorKind::GenericExtractorError, message.to_string())
}
