//! CLI entry point for the mediafetch tool.

use std::collections::HashMap;
use std::io::{self, IsTerminal, Read};
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use mediafetch_core::{
    DownloadEngine, EngineConfig, FeatureFlags, Job, JobId, JobStatus, JobUpdate, SubmitOptions,
    UpdateKind, UpdateMessage, format_size,
};
use tracing::{debug, info, warn};
use url::Url;

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (info)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    // Read input: from positional args or stdin
    let input_text = if args.urls.is_empty() {
        if io::stdin().is_terminal() {
            info!("No input provided. Pipe URLs via stdin or pass as arguments.");
            info!("Example: echo 'https://example.com/watch?v=abc' | mediafetch");
            return Ok(());
        }
        let mut buffer = String::new();
        io::stdin().read_to_string(&mut buffer)?;
        buffer
    } else {
        args.urls.join("\n")
    };

    // Keep only parseable URLs; everything else is reported and skipped.
    let mut urls = Vec::new();
    for candidate in input_text.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match Url::parse(candidate) {
            Ok(_) => urls.push(candidate.to_string()),
            Err(e) => warn!(input = %candidate, error = %e, "Skipped unrecognized input"),
        }
    }

    if urls.is_empty() {
        info!("No valid URLs found in input");
        return Ok(());
    }

    info!(urls = urls.len(), quality = %args.quality, "Mediafetch starting");

    let config = EngineConfig {
        binary: args.binary.clone().unwrap_or_else(|| {
            std::path::PathBuf::from(mediafetch_core::DEFAULT_BINARY)
        }),
        concurrency: usize::from(args.concurrency),
        custom_args: args.custom_args.clone(),
        features: FeatureFlags {
            subtitles: args.subtitles,
            thumbnail: args.thumbnail,
            description: args.description,
            info_json: args.info_json,
            keep_intermediate: args.keep_intermediate,
            rate_limit: args.limit_rate.clone(),
        },
        ..EngineConfig::default()
    };

    let engine = DownloadEngine::new(config)?;
    let updates = engine.subscribe(UpdateKind::Progress).await?;

    // Jobs carry an absolute output directory so reconciliation does not
    // depend on the working directory. Canonicalize when the directory
    // already exists; otherwise anchor the relative path to the current one
    // (the engine creates the directory on admission).
    let output_dir = match args.output_dir.canonicalize() {
        Ok(dir) => dir,
        Err(_) => std::env::current_dir()?.join(&args.output_dir),
    };

    let options = SubmitOptions::new(args.quality.clone(), output_dir);
    for url in &urls {
        let job = engine.submit(url.clone(), options.clone()).await?;
        debug!(job_id = %job.id, url = %url, "Enqueued URL");
    }

    let bars = if args.quiet {
        None
    } else {
        Some(spawn_progress_ui(updates))
    };

    // Wait for every job to settle.
    let jobs = loop {
        let jobs = engine.list_jobs().await?;
        if jobs.iter().all(|job| job.status().is_terminal()) {
            break jobs;
        }
        tokio::time::sleep(Duration::from_millis(300)).await;
    };

    engine.shutdown().await?;
    if let Some(handle) = bars {
        handle.await?;
    }

    let completed = jobs
        .iter()
        .filter(|j| j.status() == JobStatus::Completed)
        .count();
    let failed = jobs.len() - completed;
    for job in jobs.iter().filter(|j| j.status() == JobStatus::Error) {
        warn!(job_id = %job.id, url = %job.url, error = ?job.last_error, "Download failed");
    }
    info!(completed, failed, total = jobs.len(), "Download complete");

    if args.json {
        println!("{}", serde_json::to_string_pretty(&jobs)?);
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} downloads failed", jobs.len());
    }
    Ok(())
}

/// Drives one progress bar per job from the `progress` update channel.
/// Finishes when the engine shuts down and the channel closes.
fn spawn_progress_ui(
    mut updates: tokio::sync::mpsc::UnboundedReceiver<UpdateMessage>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let multi = MultiProgress::new();
        let style = ProgressStyle::with_template("{prefix:>4} [{bar:30}] {percent:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar());
        let mut bars: HashMap<JobId, ProgressBar> = HashMap::new();

        while let Some(message) = updates.recv().await {
            let items = match message {
                UpdateMessage::Single(update) => vec![update],
                UpdateMessage::Batch(updates) => updates,
            };
            for update in items {
                if let JobUpdate::Progress { job } = update {
                    render(&multi, &style, &mut bars, &job);
                }
            }
        }

        for bar in bars.values() {
            bar.finish();
        }
    })
}

fn render(
    multi: &MultiProgress,
    style: &ProgressStyle,
    bars: &mut HashMap<JobId, ProgressBar>,
    job: &Job,
) {
    let bar = bars.entry(job.id).or_insert_with(|| {
        let bar = multi.add(ProgressBar::new(100));
        bar.set_style(style.clone());
        bar.set_prefix(format!("#{}", job.id));
        bar
    });
    bar.set_position(u64::from(job.progress_percent));

    let mut message = job
        .resolved_filename
        .clone()
        .unwrap_or_else(|| job.url.clone());
    if let Some(speed) = job.speed_bytes_per_sec {
        message.push_str(&format!("  {}/s", format_size(speed)));
    }
    if let Some(eta) = job.eta_seconds {
        message.push_str(&format!("  ETA {:02}:{:02}", eta / 60, eta % 60));
    }
    bar.set_message(message);
    if job.status().is_terminal() {
        bar.finish();
    }
}
