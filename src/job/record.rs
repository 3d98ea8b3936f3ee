//! The per-job record: fields, timestamps, and partial-update application.
//!
//! A [`Job`] is owned by the engine's job table and mutated only on the
//! engine task. Status changes go through [`Job::try_transition`], which
//! enforces the legal transition table; parsed-line updates go through
//! [`Job::apply_update`], which enforces the filename precedence policy and
//! the monotonic-progress guard.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::error::ClassifiedError;
use super::status::JobStatus;
use crate::parser::LineUpdate;

/// Opaque unique job identifier, assigned at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(u64);

impl JobId {
    pub(crate) fn new(raw: u64) -> Self {
        Self(raw)
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Optional media metadata attached at submission (title, uploader, playlist
/// children for batch expansion).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobMetadata {
    /// Media title, used for reconciliation name synthesis.
    pub title: Option<String>,
    /// Duration in seconds when known.
    pub duration_seconds: Option<u64>,
    /// Uploader/channel name.
    pub uploader: Option<String>,
    /// Thumbnail URL.
    pub thumbnail_url: Option<String>,
    /// Child entries when this submission expanded from a playlist.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entries: Vec<PlaylistEntry>,
}

/// One child of an expanded playlist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaylistEntry {
    /// The child media URL.
    pub url: String,
    /// The child title when the expansion provided one.
    pub title: Option<String>,
}

/// Per-submission options supplied by the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOptions {
    /// Quality selector: `"best"`, `"audio"`, `"<N>p"`, or a raw format string.
    pub quality: String,
    /// Absolute directory the downloader writes into.
    pub output_directory: PathBuf,
    /// Optional metadata known at submission time.
    #[serde(default)]
    pub metadata: Option<JobMetadata>,
}

impl SubmitOptions {
    /// Creates options with the given quality and output directory.
    pub fn new(quality: impl Into<String>, output_directory: impl Into<PathBuf>) -> Self {
        Self {
            quality: quality.into(),
            output_directory: output_directory.into(),
            metadata: None,
        }
    }
}

/// One entry of a batch submission (playlist expansion).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchEntry {
    /// The media URL.
    pub url: String,
    /// Title carried over from the playlist listing, if any.
    pub title: Option<String>,
}

/// What a partial-update application changed, for event emission.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Any field changed; a progress update should be emitted.
    pub changed: bool,
    /// The status changed; a status update should be emitted as well.
    pub status_changed: bool,
}

/// One requested download, from submission to terminal state.
///
/// Cloned freely: boundary reads hand out snapshots by cloning, and update
/// events carry clones. The live process handle is never part of this record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Unique identifier.
    pub id: JobId,
    /// The media URL, immutable after creation.
    pub url: String,
    /// Current lifecycle status; mutated only through guarded transitions.
    status: JobStatus,
    /// Quality selector, immutable.
    pub quality: String,
    /// Output directory, immutable.
    pub output_directory: PathBuf,
    /// Download progress, 0–100, non-decreasing within a run.
    pub progress_percent: u8,
    /// Last observed transfer speed.
    pub speed_bytes_per_sec: Option<u64>,
    /// Last observed ETA; `None` when unknown.
    pub eta_seconds: Option<u64>,
    /// Best-effort bytes downloaded; authoritative only after reconciliation.
    pub downloaded_bytes: Option<u64>,
    /// Best-effort total size; authoritative only after reconciliation.
    pub total_bytes: Option<u64>,
    /// Output filename once known; see the parser precedence rules.
    pub resolved_filename: Option<String>,
    /// Optional media metadata.
    pub metadata: Option<JobMetadata>,
    /// Classified failure recorded on the last error transition.
    pub last_error: Option<ClassifiedError>,
    /// Number of explicit retries performed.
    pub retry_count: u32,
    /// Submission timestamp (epoch milliseconds).
    pub added_at: u64,
    /// Admission timestamp; cleared by retry.
    pub started_at: Option<u64>,
    /// Completion timestamp; cleared by retry.
    pub completed_at: Option<u64>,
}

/// Current time as epoch milliseconds.
fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
}

impl Job {
    /// Creates a new pending job.
    pub(crate) fn new(id: JobId, url: impl Into<String>, options: SubmitOptions) -> Self {
        Self {
            id,
            url: url.into(),
            status: JobStatus::Pending,
            quality: options.quality,
            output_directory: options.output_directory,
            progress_percent: 0,
            speed_bytes_per_sec: None,
            eta_seconds: None,
            downloaded_bytes: None,
            total_bytes: None,
            resolved_filename: None,
            metadata: options.metadata,
            last_error: None,
            retry_count: 0,
            added_at: now_ms(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Returns the current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Attempts a guarded status transition.
    ///
    /// Returns true when the status changed. Same-status re-application is a
    /// silent no-op; an edge missing from the transition table is logged and
    /// ignored.
    pub fn try_transition(&mut self, next: JobStatus) -> bool {
        if self.status == next {
            return false;
        }
        if !self.status.can_transition_to(next) {
            debug!(
                job_id = %self.id,
                from = %self.status,
                to = %next,
                "ignoring illegal status transition"
            );
            return false;
        }
        debug!(job_id = %self.id, from = %self.status, to = %next, "status transition");
        self.status = next;
        true
    }

    /// Admission: enters the running path and stamps `started_at`.
    ///
    /// Returns false if the job is not `pending`.
    pub(crate) fn begin(&mut self) -> bool {
        if self.try_transition(JobStatus::Initializing) {
            self.started_at = Some(now_ms());
            true
        } else {
            false
        }
    }

    /// Marks a successful exit: terminal `completed` plus `completed_at`.
    pub(crate) fn complete(&mut self) -> bool {
        if self.try_transition(JobStatus::Completed) {
            self.completed_at = Some(now_ms());
            true
        } else {
            false
        }
    }

    /// Records a classified failure and transitions to `error`.
    ///
    /// Returns false (and records nothing) when the current status does not
    /// allow the transition, e.g. the job already completed.
    pub(crate) fn fail(&mut self, error: ClassifiedError) -> bool {
        if self.try_transition(JobStatus::Error) {
            self.last_error = Some(error);
            true
        } else {
            false
        }
    }

    /// Explicit retry from `error`: clears the failure, bumps `retry_count`,
    /// re-enters `pending`. Progress fields keep their last observed values.
    pub(crate) fn retry(&mut self) -> bool {
        if self.status != JobStatus::Error {
            return false;
        }
        if self.try_transition(JobStatus::Pending) {
            self.last_error = None;
            self.retry_count += 1;
            self.started_at = None;
            self.completed_at = None;
            true
        } else {
            false
        }
    }

    /// Applies a parsed-line partial update.
    ///
    /// Field semantics:
    /// - progress is non-decreasing within a run; a progress line that also
    ///   enters `downloading` (first line of a fresh run, e.g. after retry)
    ///   resets the baseline instead,
    /// - speed/ETA/bytes overwrite when present in the line,
    /// - absent `downloaded_bytes` is derived from percent × total,
    /// - filename updates overwrite only when flagged (merge markers); all
    ///   other sources set it once and never replace it.
    pub(crate) fn apply_update(&mut self, update: &LineUpdate) -> ApplyOutcome {
        let mut outcome = ApplyOutcome::default();

        let entering_download =
            update.status == Some(JobStatus::Downloading) && self.status != JobStatus::Downloading;

        if let Some(next) = update.status {
            if self.try_transition(next) {
                outcome.status_changed = true;
                outcome.changed = true;
            }
        }

        if let Some(percent) = update.progress_percent {
            let next = if entering_download {
                percent
            } else {
                self.progress_percent.max(percent)
            };
            if next != self.progress_percent {
                self.progress_percent = next;
                outcome.changed = true;
            }
        }

        if let Some(speed) = update.speed_bytes_per_sec {
            if self.speed_bytes_per_sec != Some(speed) {
                self.speed_bytes_per_sec = Some(speed);
                outcome.changed = true;
            }
        }

        if let Some(eta) = update.eta_seconds {
            if self.eta_seconds != eta {
                self.eta_seconds = eta;
                outcome.changed = true;
            }
        }

        if let Some(total) = update.total_bytes {
            if self.total_bytes != Some(total) {
                self.total_bytes = Some(total);
                outcome.changed = true;
            }
        }

        if let Some(downloaded) = update.downloaded_bytes {
            if self.downloaded_bytes != Some(downloaded) {
                self.downloaded_bytes = Some(downloaded);
                outcome.changed = true;
            }
        } else if update.progress_percent.is_some() && self.progress_percent > 0 {
            if let Some(total) = self.total_bytes {
                if total > 0 {
                    let derived =
                        (f64::from(self.progress_percent) / 100.0 * total as f64).round() as u64;
                    if self.downloaded_bytes != Some(derived) {
                        self.downloaded_bytes = Some(derived);
                        outcome.changed = true;
                    }
                }
            }
        }

        if let Some(filename) = &update.filename {
            if filename.overwrite || self.resolved_filename.is_none() {
                if self.resolved_filename.as_deref() != Some(filename.name.as_str()) {
                    self.resolved_filename = Some(filename.name.clone());
                    outcome.changed = true;
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::job::error::ErrorKind;
    use crate::parser::FilenameUpdate;

    fn test_job() -> Job {
        Job::new(
            JobId::new(1),
            "https://example.com/watch?v=abc",
            SubmitOptions::new("best", "/tmp/media"),
        )
    }

    fn progress_update(percent: u8) -> LineUpdate {
        LineUpdate {
            progress_percent: Some(percent),
            status: Some(JobStatus::Downloading),
            ..LineUpdate::default()
        }
    }

    // ==================== Lifecycle Tests ====================

    #[test]
    fn test_new_job_is_pending_with_added_at() {
        let job = test_job();
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.added_at > 0);
        assert!(job.started_at.is_none());
        assert_eq!(job.progress_percent, 0);
    }

    #[test]
    fn test_begin_stamps_started_at() {
        let mut job = test_job();
        assert!(job.begin());
        assert_eq!(job.status(), JobStatus::Initializing);
        assert!(job.started_at.is_some());
    }

    #[test]
    fn test_begin_fails_from_non_pending() {
        let mut job = test_job();
        job.begin();
        assert!(!job.begin(), "begin from initializing must be rejected");
    }

    #[test]
    fn test_complete_stamps_completed_at() {
        let mut job = test_job();
        job.begin();
        job.try_transition(JobStatus::Connecting);
        job.try_transition(JobStatus::Downloading);
        assert!(job.complete());
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.completed_at.is_some());
    }

    #[test]
    fn test_fail_records_classified_error() {
        let mut job = test_job();
        job.begin();
        let error = ClassifiedError::new(ErrorKind::NotFound, "HTTP Error 404");
        assert!(job.fail(error.clone()));
        assert_eq!(job.status(), JobStatus::Error);
        assert_eq!(job.last_error, Some(error));
    }

    #[test]
    fn test_fail_after_completion_is_ignored() {
        let mut job = test_job();
        job.begin();
        job.try_transition(JobStatus::Connecting);
        job.complete();
        assert!(!job.fail(ClassifiedError::non_zero_exit(Some(1))));
        assert_eq!(job.status(), JobStatus::Completed);
        assert!(job.last_error.is_none());
    }

    #[test]
    fn test_illegal_transition_is_ignored() {
        let mut job = test_job();
        assert!(!job.try_transition(JobStatus::Completed));
        assert_eq!(job.status(), JobStatus::Pending);
    }

    // ==================== Retry Tests ====================

    #[test]
    fn test_retry_clears_error_and_increments_count() {
        let mut job = test_job();
        let added_at = job.added_at;
        job.begin();
        job.fail(ClassifiedError::non_zero_exit(Some(1)));

        assert!(job.retry());
        assert_eq!(job.status(), JobStatus::Pending);
        assert!(job.last_error.is_none());
        assert_eq!(job.retry_count, 1);
        assert_eq!(job.added_at, added_at, "added_at must survive retry");
        assert!(job.started_at.is_none());
        assert!(job.completed_at.is_none());
    }

    #[test]
    fn test_retry_preserves_progress_fields() {
        let mut job = test_job();
        job.begin();
        job.try_transition(JobStatus::Connecting);
        job.apply_update(&LineUpdate {
            progress_percent: Some(40),
            total_bytes: Some(1000),
            status: Some(JobStatus::Downloading),
            ..LineUpdate::default()
        });
        job.fail(ClassifiedError::non_zero_exit(Some(1)));

        job.retry();
        assert_eq!(job.progress_percent, 40);
        assert_eq!(job.total_bytes, Some(1000));
    }

    #[test]
    fn test_retry_rejected_unless_errored() {
        let mut job = test_job();
        assert!(!job.retry(), "retry from pending must be rejected");
        job.begin();
        assert!(!job.retry(), "retry from initializing must be rejected");
        assert_eq!(job.retry_count, 0);
    }

    // ==================== Update Application Tests ====================

    fn running_job() -> Job {
        let mut job = test_job();
        job.begin();
        job.try_transition(JobStatus::Connecting);
        job
    }

    #[test]
    fn test_apply_progress_sets_fields_and_status() {
        let mut job = running_job();
        let outcome = job.apply_update(&LineUpdate {
            progress_percent: Some(50),
            speed_bytes_per_sec: Some(2_097_152),
            eta_seconds: Some(Some(10)),
            downloaded_bytes: Some(52_428_800),
            total_bytes: Some(104_857_600),
            status: Some(JobStatus::Downloading),
            ..LineUpdate::default()
        });

        assert!(outcome.changed);
        assert!(outcome.status_changed);
        assert_eq!(job.status(), JobStatus::Downloading);
        assert_eq!(job.progress_percent, 50);
        assert_eq!(job.speed_bytes_per_sec, Some(2_097_152));
        assert_eq!(job.eta_seconds, Some(10));
        assert_eq!(job.downloaded_bytes, Some(52_428_800));
        assert_eq!(job.total_bytes, Some(104_857_600));
    }

    #[test]
    fn test_progress_is_monotonic_within_a_run() {
        let mut job = running_job();
        job.apply_update(&progress_update(60));
        let outcome = job.apply_update(&progress_update(45));
        assert!(!outcome.changed, "lower percent must be ignored");
        assert_eq!(job.progress_percent, 60);
    }

    #[test]
    fn test_progress_baseline_resets_when_entering_downloading() {
        let mut job = running_job();
        job.apply_update(&progress_update(80));
        job.fail(ClassifiedError::non_zero_exit(Some(1)));
        job.retry();

        // Fresh run: admission and spawn handshake, then a lower first line.
        job.begin();
        job.try_transition(JobStatus::Connecting);
        let outcome = job.apply_update(&progress_update(5));
        assert!(outcome.changed);
        assert_eq!(job.progress_percent, 5);
    }

    #[test]
    fn test_downloaded_bytes_derived_from_percent_and_total() {
        let mut job = running_job();
        job.apply_update(&LineUpdate {
            total_bytes: Some(104_857_600),
            status: Some(JobStatus::Downloading),
            ..LineUpdate::default()
        });
        job.apply_update(&LineUpdate {
            progress_percent: Some(25),
            ..LineUpdate::default()
        });
        assert_eq!(job.downloaded_bytes, Some(26_214_400));
    }

    #[test]
    fn test_downloaded_bytes_not_derived_without_total() {
        let mut job = running_job();
        job.apply_update(&progress_update(25));
        assert!(job.downloaded_bytes.is_none());
    }

    #[test]
    fn test_eta_unknown_overwrites_stale_value() {
        let mut job = running_job();
        job.apply_update(&LineUpdate {
            eta_seconds: Some(Some(90)),
            ..LineUpdate::default()
        });
        assert_eq!(job.eta_seconds, Some(90));

        job.apply_update(&LineUpdate {
            eta_seconds: Some(None),
            ..LineUpdate::default()
        });
        assert!(job.eta_seconds.is_none());
    }

    #[test]
    fn test_filename_set_once_unless_overwrite() {
        let mut job = running_job();
        job.apply_update(&LineUpdate {
            filename: Some(FilenameUpdate::keep_existing("a.mp4")),
            ..LineUpdate::default()
        });
        assert_eq!(job.resolved_filename.as_deref(), Some("a.mp4"));

        // A second low-confidence source must not replace it.
        let outcome = job.apply_update(&LineUpdate {
            filename: Some(FilenameUpdate::keep_existing("other.mp4")),
            ..LineUpdate::default()
        });
        assert!(!outcome.changed);
        assert_eq!(job.resolved_filename.as_deref(), Some("a.mp4"));

        // A merge marker always wins.
        job.apply_update(&LineUpdate {
            filename: Some(FilenameUpdate::overwrite("b.mp4")),
            ..LineUpdate::default()
        });
        assert_eq!(job.resolved_filename.as_deref(), Some("b.mp4"));
    }

    #[test]
    fn test_progress_line_during_processing_keeps_status() {
        let mut job = running_job();
        job.apply_update(&progress_update(100));
        job.try_transition(JobStatus::Processing);

        let outcome = job.apply_update(&progress_update(100));
        assert!(!outcome.status_changed, "processing must not regress");
        assert_eq!(job.status(), JobStatus::Processing);
    }

    #[test]
    fn test_job_snapshot_serializes_with_status_string() {
        let job = test_job();
        let json = serde_json::to_string(&job).unwrap();
        assert!(json.contains("\"status\":\"pending\""), "json: {json}");
        assert!(json.contains("\"progress_percent\":0"));
    }
}
