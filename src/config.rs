//! Engine configuration: downloader binary, concurrency, and feature flags.
//!
//! The host constructs an [`EngineConfig`] (typically from CLI flags) and
//! hands it to the engine at startup. Everything here is plain data; range
//! validation happens when the engine is created.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::events::BatcherConfig;

/// Minimum allowed concurrency value.
pub(crate) const MIN_CONCURRENCY: usize = 1;

/// Maximum allowed concurrency value.
pub(crate) const MAX_CONCURRENCY: usize = 100;

/// Default number of concurrently running downloads.
pub const DEFAULT_CONCURRENCY: usize = 3;

/// Default downloader binary, resolved through `PATH`.
pub const DEFAULT_BINARY: &str = "yt-dlp";

/// Default delay between an admission and the next scheduler tick.
pub const DEFAULT_SCHEDULE_DELAY: Duration = Duration::from_millis(250);

/// Default backoff when the concurrency limit is saturated.
pub const DEFAULT_SCHEDULE_BACKOFF: Duration = Duration::from_millis(1500);

/// Per-run feature flags forwarded to the downloader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FeatureFlags {
    /// Write subtitle files next to the media.
    pub subtitles: bool,
    /// Write the thumbnail image.
    pub thumbnail: bool,
    /// Write the media description.
    pub description: bool,
    /// Write the raw metadata sidecar.
    pub info_json: bool,
    /// Keep intermediate files after post-processing.
    pub keep_intermediate: bool,
    /// Bandwidth cap in downloader notation (for example `"4.2M"`).
    pub rate_limit: Option<String>,
}

/// Engine construction parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Downloader binary path or bare name.
    pub binary: PathBuf,
    /// Maximum number of jobs in an active substate at once.
    pub concurrency: usize,
    /// Free-form downloader arguments; when set, replaces the derived
    /// format flags. May contain a `${quality}` placeholder.
    pub custom_args: Option<String>,
    /// Downloader feature flags.
    pub features: FeatureFlags,
    /// Update batching knobs.
    pub batching: BatcherConfig,
    /// Delay between an admission and the next scheduler tick.
    pub schedule_delay: Duration,
    /// Backoff between ticks while the concurrency limit is saturated.
    pub schedule_backoff: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            binary: PathBuf::from(DEFAULT_BINARY),
            concurrency: DEFAULT_CONCURRENCY,
            custom_args: None,
            features: FeatureFlags::default(),
            batching: BatcherConfig::default(),
            schedule_delay: DEFAULT_SCHEDULE_DELAY,
            schedule_backoff: DEFAULT_SCHEDULE_BACKOFF,
        }
    }
}
