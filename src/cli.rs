//! CLI argument definitions using clap derive macros.

use std::path::PathBuf;

use clap::Parser;

use mediafetch_core::DEFAULT_CONCURRENCY;

/// Queue and download media URLs through an external downloader.
///
/// Mediafetch drives a `yt-dlp`-compatible binary: URLs enter a queue, run
/// under a concurrency cap, and report live parsed progress until every job
/// settles as completed or failed.
#[derive(Parser, Debug)]
#[command(name = "mediafetch")]
#[command(author, version, about)]
pub struct Args {
    /// Media URLs to download (reads stdin when omitted)
    pub urls: Vec<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,

    /// Quality selector: "best", "audio", "<N>p", or a raw format expression
    #[arg(long, default_value = "best")]
    pub quality: String,

    /// Directory downloads are written into
    #[arg(short, long, default_value = ".")]
    pub output_dir: PathBuf,

    /// Maximum concurrent downloads (1-100)
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY as u8, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub concurrency: u8,

    /// Downloader binary path or name (resolved through PATH)
    #[arg(long)]
    pub binary: Option<PathBuf>,

    /// Custom downloader arguments, replacing derived format flags;
    /// ${quality} is substituted with the resolved format expression
    #[arg(long)]
    pub custom_args: Option<String>,

    /// Write subtitle files next to the media
    #[arg(long)]
    pub subtitles: bool,

    /// Write the thumbnail image
    #[arg(long)]
    pub thumbnail: bool,

    /// Write the media description
    #[arg(long)]
    pub description: bool,

    /// Write the raw metadata sidecar
    #[arg(long)]
    pub info_json: bool,

    /// Keep intermediate files after post-processing
    #[arg(short = 'k', long)]
    pub keep_intermediate: bool,

    /// Bandwidth cap in downloader notation (for example 4.2M)
    #[arg(short = 'l', long)]
    pub limit_rate: Option<String>,

    /// Print the final job snapshots as JSON
    #[arg(long)]
    pub json: bool,
}
