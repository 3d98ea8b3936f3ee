//! The ordered line-matching rules.
//!
//! Each rule inspects one raw output line and either claims it (returning a
//! partial update) or passes. [`super::parse_line`] walks the rules in
//! priority order and stops at the first claim, so a line never produces a
//! blend of two rules.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

use super::classify::{ERROR_MARKER, WARNING_MARKER};
use super::units::{parse_eta, parse_size, parse_speed};
use super::{FilenameUpdate, LineUpdate, has_media_extension};
use crate::job::JobStatus;

/// Percentage-in-brackets token of the engine's progress template,
/// e.g. `[ 50.0%]`.
#[allow(clippy::expect_used)]
static PERCENT_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[\s*(\d+(?:\.\d+)?)%\s*\]").expect("percent regex is valid") // Static pattern, safe to panic
});

/// Default downloader progress line, kept as a fallback for runs where the
/// progress template was overridden by custom arguments:
/// `[download]  50.5% of ~100.00MiB at 1.50MiB/s ETA 00:30`.
#[allow(clippy::expect_used)]
static DEFAULT_PROGRESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[download\]\s+(\d+(?:\.\d+)?)%(?:\s+of\s+(\S+))?(?:\s+at\s+(\S+))?(?:\s+ETA\s+(\S+))?")
        .expect("default progress regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static SPEED_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(~?\d+(?:\.\d+)?\s*(?:B|KB|KiB|MB|MiB|GB|GiB))/s")
        .expect("speed regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ETA_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"ETA\s+(\S+)").expect("ETA regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DOWNLOADED_OF_CLAUSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"downloaded\s+(\S+)\s+of\s+(\S+)")
        .expect("downloaded-of regex is valid") // Static pattern, safe to panic
});

/// Post-processing markers: merge, remux, audio extraction.
#[allow(clippy::expect_used)]
static POST_PROCESS_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[Merger\]|\[ExtractAudio\]|\[VideoRemuxer\]|\[VideoConvertor\]|\[ffmpeg\]|Merging formats")
        .expect("post-process regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static QUOTED_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""([^"]+)""#).expect("quoted-name regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static DESTINATION_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\[download\]\s+)?Destination:\s+(.+)$")
        .expect("destination regex is valid") // Static pattern, safe to panic
});

#[allow(clippy::expect_used)]
static ALREADY_DOWNLOADED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\[download\]\s+)?(.+?) has already been downloaded")
        .expect("already-downloaded regex is valid") // Static pattern, safe to panic
});

/// Reduces a path-like capture to its final component.
///
/// Destination and merge lines echo whatever path template the downloader
/// was given; the job only tracks the filename inside its output directory.
fn basename(raw: &str) -> String {
    let trimmed = raw.trim();
    Path::new(trimmed)
        .file_name()
        .map_or_else(|| trimmed.to_string(), |n| n.to_string_lossy().into_owned())
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_percent(raw: &str) -> Option<u8> {
    let value: f64 = raw.parse().ok()?;
    Some(value.round().clamp(0.0, 100.0) as u8)
}

/// Rule 1: structured progress line.
pub(super) fn progress(line: &str) -> Option<LineUpdate> {
    let mut update = LineUpdate::default();

    if let Some(caps) = PERCENT_PATTERN.captures(line) {
        update.progress_percent = round_percent(caps.get(1)?.as_str());
        if let Some(speed) = SPEED_CLAUSE.captures(line) {
            update.speed_bytes_per_sec = parse_speed(speed.get(1)?.as_str());
        }
        if let Some(eta) = ETA_CLAUSE.captures(line) {
            update.eta_seconds = Some(parse_eta(eta.get(1)?.as_str()));
        }
        if let Some(bytes) = DOWNLOADED_OF_CLAUSE.captures(line) {
            update.downloaded_bytes = parse_size(bytes.get(1)?.as_str());
            update.total_bytes = parse_size(bytes.get(2)?.as_str());
        }
    } else if let Some(caps) = DEFAULT_PROGRESS_PATTERN.captures(line) {
        update.progress_percent = round_percent(caps.get(1)?.as_str());
        update.total_bytes = caps.get(2).and_then(|m| parse_size(m.as_str()));
        update.speed_bytes_per_sec = caps.get(3).and_then(|m| parse_speed(m.as_str()));
        if let Some(eta) = caps.get(4) {
            update.eta_seconds = Some(parse_eta(eta.as_str()));
        }
    } else {
        return None;
    }

    update.status = Some(JobStatus::Downloading);
    Some(update)
}

/// Rule 2: merge/post-process marker, optionally naming the final file in
/// quotes (highest-confidence filename source).
pub(super) fn post_process(line: &str) -> Option<LineUpdate> {
    if !POST_PROCESS_PATTERN.is_match(line) {
        return None;
    }

    let mut update = LineUpdate {
        status: Some(JobStatus::Processing),
        ..LineUpdate::default()
    };
    if let Some(caps) = QUOTED_NAME.captures(line) {
        if let Some(name) = caps.get(1) {
            update.filename = Some(FilenameUpdate::overwrite(basename(name.as_str())));
        }
    }
    Some(update)
}

/// Rule 3: destination announcement.
pub(super) fn destination(line: &str) -> Option<LineUpdate> {
    let caps = DESTINATION_PATTERN.captures(line)?;
    let name = basename(caps.get(1)?.as_str());
    Some(LineUpdate {
        filename: Some(FilenameUpdate::keep_existing(name)),
        ..LineUpdate::default()
    })
}

/// Rule 4: the downloader found the file already on disk.
pub(super) fn already_downloaded(line: &str) -> Option<LineUpdate> {
    let caps = ALREADY_DOWNLOADED_PATTERN.captures(line)?;
    let name = basename(caps.get(1)?.as_str());
    Some(LineUpdate {
        filename: Some(FilenameUpdate::keep_existing(name)),
        ..LineUpdate::default()
    })
}

/// Rule 5: a line that is nothing but a filename with a known media
/// extension (optionally quoted). Lowest-confidence filename source.
pub(super) fn bare_filename(line: &str) -> Option<LineUpdate> {
    let trimmed = line.trim();
    let (token, quoted) = match trimmed.strip_prefix('"').and_then(|s| s.strip_suffix('"')) {
        Some(inner) => (inner, true),
        None => (trimmed, false),
    };

    if token.is_empty() {
        return None;
    }
    // Unquoted tokens must be a single word; anything with spaces is prose.
    if !quoted && token.contains(char::is_whitespace) {
        return None;
    }
    if !has_media_extension(token) {
        return None;
    }

    Some(LineUpdate {
        filename: Some(FilenameUpdate::keep_existing(basename(token))),
        ..LineUpdate::default()
    })
}

/// Rule 6: hard error marker (case-sensitive `ERROR:`).
pub(super) fn error_marker(line: &str) -> Option<LineUpdate> {
    let idx = line.find(ERROR_MARKER)?;
    let message = line[idx + ERROR_MARKER.len()..].trim();
    let message = if message.is_empty() { line.trim() } else { message };
    Some(LineUpdate {
        error: Some(message.to_string()),
        ..LineUpdate::default()
    })
}

/// Rule 7: warning marker; logged by the caller, never a status change.
pub(super) fn warning_marker(line: &str) -> Option<LineUpdate> {
    let idx = line.find(WARNING_MARKER)?;
    let message = line[idx + WARNING_MARKER.len()..].trim();
    Some(LineUpdate {
        warning: Some(message.to_string()),
        ..LineUpdate::default()
    })
}
