//! Job status definitions and the legal transition table.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a download job.
///
/// The normal path is `pending → initializing → connecting → downloading →
/// processing → completed`. A job can fail (`error`) at any point after
/// admission, be paused from most non-terminal states, and re-enter `pending`
/// via resume (from `paused`) or retry (from `error`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Queued, waiting for admission by the scheduler.
    Pending,
    /// Admitted; the downloader process is being spawned.
    Initializing,
    /// Process spawned, no progress output observed yet.
    Connecting,
    /// Progress output is being received.
    Downloading,
    /// Post-processing (merge, remux, audio extraction) in progress.
    Processing,
    /// Stopped by an external command; resumable.
    Paused,
    /// Finished successfully (terminal).
    Completed,
    /// Failed with a classified error (terminal except for retry).
    Error,
}

impl JobStatus {
    /// Returns the wire/string representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Initializing => "initializing",
            Self::Connecting => "connecting",
            Self::Downloading => "downloading",
            Self::Processing => "processing",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    /// Returns true for statuses that occupy a concurrency slot.
    ///
    /// `pending` and `paused` jobs do not count against the scheduler's
    /// concurrency limit; everything between admission and a terminal
    /// transition does.
    #[must_use]
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            Self::Initializing | Self::Connecting | Self::Downloading | Self::Processing
        )
    }

    /// Returns true for terminal statuses.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }

    /// Returns whether a transition from `self` to `next` is legal.
    ///
    /// Self-transitions are not in the table; callers treat them as silent
    /// no-ops before consulting it. Removal is not a transition (it deletes
    /// the record) and is deliberately absent.
    #[must_use]
    pub fn can_transition_to(self, next: JobStatus) -> bool {
        use JobStatus::{
            Completed, Connecting, Downloading, Error, Initializing, Paused, Pending, Processing,
        };

        matches!(
            (self, next),
            // Admission and the spawn handshake.
            (Pending, Initializing)
                | (Initializing, Connecting)
                // Parsed-line phase changes.
                | (Connecting, Downloading)
                | (Connecting, Processing)
                | (Downloading, Processing)
                // Successful exit.
                | (Connecting, Completed)
                | (Downloading, Completed)
                | (Processing, Completed)
                // Failure at any point after admission.
                | (Initializing, Error)
                | (Connecting, Error)
                | (Downloading, Error)
                | (Processing, Error)
                // External pause (a job mid-spawn cannot be paused).
                | (Pending, Paused)
                | (Connecting, Paused)
                | (Downloading, Paused)
                | (Processing, Paused)
                // Resume and retry both re-enter the queue.
                | (Paused, Pending)
                | (Error, Pending)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "initializing" => Ok(Self::Initializing),
            "connecting" => Ok(Self::Connecting),
            "downloading" => Ok(Self::Downloading),
            "processing" => Ok(Self::Processing),
            "paused" => Ok(Self::Paused),
            "completed" => Ok(Self::Completed),
            "error" => Ok(Self::Error),
            _ => Err(format!("invalid job status: {s}")),
        }
    }
}
