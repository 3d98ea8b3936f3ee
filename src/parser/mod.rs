//! Line-oriented parsing of external downloader output.
//!
//! The downloader child process writes progress, filenames, and diagnostics
//! as plain text lines on stdout and stderr. This module turns one raw line
//! into a [`LineUpdate`]: a partial, side-effect-free description of what
//! the line said. Applying an update to a job is the job's own business
//! (`Job::apply_update`), which keeps the matching logic testable on bare
//! strings.
//!
//! # Rule Order
//!
//! Lines are matched against a fixed rule list; the first matching rule
//! consumes the line:
//!
//! 1. Progress (percent, speed, ETA, byte counts)
//! 2. Merge/post-process marker (optionally naming the output file in quotes)
//! 3. `Destination:` announcement
//! 4. "has already been downloaded"
//! 5. Bare filename token with a known media extension
//! 6. `ERROR:` marker (case-sensitive)
//! 7. `WARNING:` marker
//!
//! # Example
//!
//! ```
//! use mediafetch_core::job::JobStatus;
//! use mediafetch_core::parser::parse_line;
//!
//! let update = parse_line("[ 50.0%]  2.00MiB/s ETA 00:10 downloaded 50.00MiB of 100.00MiB");
//! assert_eq!(update.progress_percent, Some(50));
//! assert_eq!(update.speed_bytes_per_sec, Some(2_097_152));
//! assert_eq!(update.eta_seconds, Some(Some(10)));
//! assert_eq!(update.status, Some(JobStatus::Downloading));
//! ```

mod classify;
mod rules;
mod units;

pub use classify::classify_error;
pub use units::{format_size, parse_eta, parse_size, parse_speed};

use std::path::Path;

use tracing::trace;

use crate::job::JobStatus;

/// Extensions the downloader produces for video-bearing output.
pub(crate) const VIDEO_EXTENSIONS: &[&str] =
    &["mp4", "mkv", "webm", "mov", "avi", "flv", "m4v", "ts"];

/// Extensions the downloader produces for audio-only output.
pub(crate) const AUDIO_EXTENSIONS: &[&str] =
    &["mp3", "m4a", "opus", "ogg", "oga", "flac", "wav", "aac"];

/// Whether `name` ends in a known media extension (either set).
pub(crate) fn has_media_extension(name: &str) -> bool {
    let Some(ext) = Path::new(name).extension().and_then(|e| e.to_str()) else {
        return false;
    };
    let ext = ext.to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&ext.as_str()) || AUDIO_EXTENSIONS.contains(&ext.as_str())
}

/// A filename observation plus its confidence level.
///
/// Merge lines name the true final file and may replace anything seen
/// earlier; every other source only fills the name in if it is still unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilenameUpdate {
    pub name: String,
    /// `true` when this observation may replace an existing filename.
    pub overwrite: bool,
}

impl FilenameUpdate {
    #[must_use]
    pub fn overwrite(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overwrite: true,
        }
    }

    #[must_use]
    pub fn keep_existing(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            overwrite: false,
        }
    }
}

/// Everything a single output line had to say about a job.
///
/// All fields are optional; an unmatched line produces the default value.
/// `eta_seconds` is doubly optional: the outer `Option` is "did the line
/// carry an ETA clause at all", the inner one is "was it a known value"
/// (the downloader prints `--:--` while the ETA is still unknown, which
/// must clear a previously shown estimate rather than freeze it).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineUpdate {
    pub progress_percent: Option<u8>,
    pub speed_bytes_per_sec: Option<u64>,
    pub eta_seconds: Option<Option<u64>>,
    pub downloaded_bytes: Option<u64>,
    pub total_bytes: Option<u64>,
    pub filename: Option<FilenameUpdate>,
    pub status: Option<JobStatus>,
    pub error: Option<String>,
    pub warning: Option<String>,
}

impl LineUpdate {
    /// `true` when the line matched no rule and carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

type Rule = fn(&str) -> Option<LineUpdate>;

/// Fixed evaluation order; the first matching rule consumes the line.
const RULES: &[(&str, Rule)] = &[
    ("progress", rules::progress),
    ("post_process", rules::post_process),
    ("destination", rules::destination),
    ("already_downloaded", rules::already_downloaded),
    ("bare_filename", rules::bare_filename),
    ("error", rules::error_marker),
    ("warning", rules::warning_marker),
];

/// Parses one raw output line into a [`LineUpdate`].
///
/// Never fails: a line no rule recognizes yields an empty update, which
/// callers are expected to drop.
#[must_use]
pub fn parse_line(line: &str) -> LineUpdate {
    for (name, rule) in RULES {
        if let Some(update) = rule(line) {
            trace!(rule = name, "Line matched");
            return update;
        }
    }
    LineUpdate::default()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    // ==================== Rule Order Tests ====================

    #[test]
    fn test_parse_line_progress_template() {
        let update = parse_line("[ 50.0%]  2.00MiB/s ETA 00:10 downloaded 50.00MiB of 100.00MiB");
        assert_eq!(update.progress_percent, Some(50));
        assert_eq!(update.speed_bytes_per_sec, Some(2_097_152));
        assert_eq!(update.eta_seconds, Some(Some(10)));
        assert_eq!(update.downloaded_bytes, Some(52_428_800));
        assert_eq!(update.total_bytes, Some(104_857_600));
        assert_eq!(update.status, Some(JobStatus::Downloading));
    }

    #[test]
    fn test_parse_line_post_process_consumes_destination_text() {
        // Rule 2 outranks rule 3: the line is claimed by the post-process
        // marker, so the unquoted destination name is not captured.
        let update = parse_line("[ExtractAudio] Destination: song.mp3");
        assert_eq!(update.status, Some(JobStatus::Processing));
        assert!(update.filename.is_none());
    }

    #[test]
    fn test_parse_line_destination_sets_low_confidence_name() {
        let update = parse_line("[download] Destination: video.mp4");
        let filename = update.filename.unwrap();
        assert_eq!(filename.name, "video.mp4");
        assert!(!filename.overwrite);
        assert!(update.status.is_none());
    }

    #[test]
    fn test_parse_line_merge_sets_overwriting_name() {
        let update = parse_line(r#"[Merger] Merging formats into "video.mp4""#);
        let filename = update.filename.unwrap();
        assert_eq!(filename.name, "video.mp4");
        assert!(filename.overwrite);
        assert_eq!(update.status, Some(JobStatus::Processing));
    }

    #[test]
    fn test_parse_line_error_outranks_bare_filename_by_shape() {
        // Prose around the token keeps rule 5 out; the marker claims it.
        let update = parse_line("ERROR: unable to rename file clip.mp4");
        assert_eq!(update.error.as_deref(), Some("unable to rename file clip.mp4"));
        assert!(update.filename.is_none());
    }

    #[test]
    fn test_parse_line_warning_is_informational() {
        let update = parse_line("WARNING: unable to extract uploader id");
        assert_eq!(update.warning.as_deref(), Some("unable to extract uploader id"));
        assert!(update.status.is_none());
        assert!(update.error.is_none());
    }

    #[test]
    fn test_parse_line_unmatched_is_empty() {
        assert!(parse_line("[youtube] dQw4w9WgXcQ: Downloading webpage").is_empty());
        assert!(parse_line("").is_empty());
        assert!(parse_line("   ").is_empty());
    }

    // ==================== Media Extension Tests ====================

    #[test]
    fn test_has_media_extension_accepts_video_and_audio() {
        assert!(has_media_extension("clip.mp4"));
        assert!(has_media_extension("clip.MKV"));
        assert!(has_media_extension("song.mp3"));
        assert!(has_media_extension("song.opus"));
    }

    #[test]
    fn test_has_media_extension_rejects_other_files() {
        assert!(!has_media_extension("notes.txt"));
        assert!(!has_media_extension("archive.part"));
        assert!(!has_media_extension("no_extension"));
    }
}
