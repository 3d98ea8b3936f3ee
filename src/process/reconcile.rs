//! Post-completion filename and size reconciliation.
//!
//! Streamed byte counts are estimates and the parsed filename can be missing
//! or stale after post-processing, so on every successful exit the engine
//! runs one reconciliation pass against the output directory. Candidates are
//! tried in confidence order:
//!
//! (a) the parsed `resolved_filename`, re-stat-ed for its true size;
//! (b) the most-recently-modified file whose mtime is not older than the
//!     run's start (catches renames the parser missed);
//! (c) a name synthesized from the metadata title plus the extension set of
//!     the quality class (catches already-downloaded runs, where nothing's
//!     mtime moved);
//! (d) the most-recently-modified file with a video extension, regardless
//!     of mtime.
//!
//! Whichever candidate wins, its stat size replaces both byte counters.
//! Failure to find anything is non-fatal: the job stays completed with its
//! streamed estimates.

use std::path::Path;
use std::time::UNIX_EPOCH;

use tokio::fs;
use tracing::{debug, instrument};

use crate::job::Job;
use crate::parser::{AUDIO_EXTENSIONS, VIDEO_EXTENSIONS};

/// The winning candidate of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOutcome {
    /// Filename inside the job's output directory.
    pub filename: String,
    /// Authoritative on-disk size in bytes.
    pub size: u64,
}

/// Finds the job's output file and its true size, best effort.
#[instrument(skip(job), fields(job_id = %job.id, dir = %job.output_directory.display()))]
pub async fn reconcile(job: &Job) -> Option<ReconcileOutcome> {
    let dir = &job.output_directory;

    if let Some(name) = &job.resolved_filename {
        let path = dir.join(name);
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                return Some(ReconcileOutcome {
                    filename: name.clone(),
                    size: meta.len(),
                });
            }
            Ok(_) => debug!(path = %path.display(), "resolved filename is not a file"),
            Err(e) => debug!(path = %path.display(), error = %e, "failed to stat resolved filename"),
        }
    }

    if let Some(found) = newest_entry(dir, job.started_at, |_| true).await {
        return Some(found);
    }

    let audio = job.quality == "audio";
    if let Some(title) = job.metadata.as_ref().and_then(|m| m.title.as_deref()) {
        let extensions = if audio {
            AUDIO_EXTENSIONS
        } else {
            VIDEO_EXTENSIONS
        };
        for ext in extensions {
            let candidate = format!("{title}.{ext}");
            if let Ok(meta) = fs::metadata(dir.join(&candidate)).await
                && meta.is_file()
            {
                return Some(ReconcileOutcome {
                    filename: candidate,
                    size: meta.len(),
                });
            }
        }
    }

    newest_entry(dir, None, has_video_extension).await
}

fn has_video_extension(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

/// The most-recently-modified regular file in `dir` passing `filter`,
/// optionally restricted to mtimes at or after `min_mtime_ms`.
async fn newest_entry(
    dir: &Path,
    min_mtime_ms: Option<u64>,
    filter: impl Fn(&str) -> bool,
) -> Option<ReconcileOutcome> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            debug!(dir = %dir.display(), error = %e, "failed to list output directory");
            return None;
        }
    };

    let mut best: Option<(ReconcileOutcome, std::time::SystemTime)> = None;
    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(meta) = entry.metadata().await else {
            continue;
        };
        if !meta.is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if !filter(&name) {
            continue;
        }
        let Ok(modified) = meta.modified() else {
            continue;
        };
        if let Some(min) = min_mtime_ms {
            let mtime_ms = modified
                .duration_since(UNIX_EPOCH)
                .map_or(0, |d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX));
            if mtime_ms < min {
                continue;
            }
        }
        if best.as_ref().is_none_or(|(_, t)| modified > *t) {
            best = Some((
                ReconcileOutcome {
                    filename: name,
                    size: meta.len(),
                },
                modified,
            ));
        }
    }
    best.map(|(outcome, _)| outcome)
}
