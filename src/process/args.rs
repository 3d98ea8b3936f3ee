//! Argument vector construction for the external downloader.
//!
//! The engine never interprets media itself; it drives a `yt-dlp`-compatible
//! binary and owns only the argument conventions: a quality selector resolved
//! into a format expression, feature flags, and a stable progress template the
//! parser can recognize.

use crate::config::EngineConfig;
use crate::job::Job;

/// Progress template handed to the downloader so progress lines have a
/// machine-recognizable shape regardless of downloader version.
pub(crate) const PROGRESS_TEMPLATE: &str = "[ %(progress._percent_str)s] %(progress._speed_str)s ETA %(progress._eta_str)s downloaded %(progress._downloaded_bytes_str)s of %(progress._total_bytes_str)s";

/// Output naming template, joined under the job's output directory.
const OUTPUT_TEMPLATE: &str = "%(title)s.%(ext)s";

/// Container for audio-only downloads.
const AUDIO_FORMAT: &str = "mp3";

/// Placeholder custom argument strings may use for the resolved format.
const QUALITY_PLACEHOLDER: &str = "${quality}";

/// Resolves a quality selector into a downloader format expression.
///
/// - `"audio"` resolves to `bestaudio` (the extraction flags are added
///   separately by [`build_args`])
/// - `"best"` and the empty string resolve to `None`: no format constraint
/// - `"<N>p"` resolves to a height-capped video+audio expression with a
///   same-height fallback
/// - anything else passes through as a raw format expression
#[must_use]
pub fn resolve_format(quality: &str) -> Option<String> {
    match quality {
        "audio" => Some("bestaudio".to_string()),
        "best" | "" => None,
        other => {
            let height = other
                .strip_suffix('p')
                .filter(|h| !h.is_empty() && h.chars().all(|c| c.is_ascii_digit()));
            match height {
                Some(h) => Some(format!("bestvideo[height<={h}]+bestaudio/best[height<={h}]")),
                None => Some(other.to_string()),
            }
        }
    }
}

/// Builds the full argument vector for one job.
///
/// A non-empty `custom_args` string in the configuration replaces the derived
/// format flags entirely (presets override ad-hoc quality selection); the
/// `${quality}` placeholder inside it is substituted with the resolved format
/// expression before whitespace tokenization. The URL is always last.
#[must_use]
pub fn build_args(job: &Job, config: &EngineConfig) -> Vec<String> {
    let mut args = vec![
        "--newline".to_string(),
        "--progress-template".to_string(),
        PROGRESS_TEMPLATE.to_string(),
        "-o".to_string(),
        job.output_directory
            .join(OUTPUT_TEMPLATE)
            .to_string_lossy()
            .into_owned(),
    ];

    let format = resolve_format(&job.quality);

    if let Some(custom) = config
        .custom_args
        .as_deref()
        .filter(|s| !s.trim().is_empty())
    {
        let resolved = format.as_deref().unwrap_or("best");
        let substituted = custom.replace(QUALITY_PLACEHOLDER, resolved);
        args.extend(substituted.split_whitespace().map(str::to_string));
    } else if job.quality == "audio" {
        args.push("-f".to_string());
        args.push("bestaudio".to_string());
        args.push("--extract-audio".to_string());
        args.push("--audio-format".to_string());
        args.push(AUDIO_FORMAT.to_string());
    } else if let Some(expr) = format {
        args.push("-f".to_string());
        args.push(expr);
    }

    let features = &config.features;
    if features.subtitles {
        args.push("--write-subs".to_string());
    }
    if features.thumbnail {
        args.push("--write-thumbnail".to_string());
    }
    if features.description {
        args.push("--write-description".to_string());
    }
    if features.info_json {
        args.push("--write-info-json".to_string());
    }
    if features.keep_intermediate {
        args.push("-k".to_string());
    }
    if let Some(rate) = &features.rate_limit {
        args.push("--limit-rate".to_string());
        args.push(rate.clone());
    }

    args.push(job.url.clone());
    args
}
