//! Command-line entry point of the Flickr mirror.
//!
//! # Usage
//!
//! ```bash
//! export FLICKR_API_KEY=... FLICKR_OAUTH_TOKEN=... FLICKR_USER_NSID=...
//!
//! # Mirror into ~/flickr, print statistics at the end
//! flickr-mirror -s ~/flickr
//!
//! # Remove local files that are no longer on Flickr
//! flickr-mirror --delete-unknown ~/flickr
//! ```
//!
//! Ctrl+C stops the run at the next safe point; statistics are printed and
//! the process exits non-zero.

use anyhow::{Context, Result};
use bridge_desktop::ReqwestHttpClient;
use clap::{Parser, ValueEnum};
use core_runtime::logging::{init_logging, redact_if_sensitive, LogFormat, LoggingConfig};
use core_runtime::{MirrorConfig, RateLimitConfig, Verbosity};
use core_sync::{Reconciler, RunReport, SyncError};
use provider_flickr::{ApiKeyAuthorizer, FlickrConnector};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "flickr-mirror")]
#[command(about = "Create a local mirror of your Flickr data")]
#[command(version)]
struct Args {
    /// Path to the destination directory
    destdir: PathBuf,

    /// Print verbose messages while running
    #[arg(short, long, conflicts_with = "quiet")]
    verbose: bool,

    /// Only print errors and warnings
    #[arg(short, long)]
    quiet: bool,

    /// Print transfer statistics at the end of the run
    #[arg(short, long)]
    statistics: bool,

    /// Do not include views-counter in metadata
    #[arg(long)]
    ignore_views: bool,

    /// Do not mirror photos
    #[arg(long)]
    ignore_photos: bool,

    /// Do not mirror videos
    #[arg(long)]
    ignore_videos: bool,

    /// Delete local files that are not on Flickr
    #[arg(long)]
    delete_unknown: bool,

    /// Items requested per listing page
    #[arg(long, default_value_t = core_runtime::config::MAX_PAGE_SIZE)]
    page_size: u32,

    /// Outbound calls allowed per rate-limit period
    #[arg(long, default_value_t = 1)]
    max_calls: u32,

    /// Length of the rate-limit period in seconds
    #[arg(long, default_value_t = 1)]
    period_secs: u64,

    /// Downloads in flight during the photostream pass
    #[arg(short, long, default_value_t = 1)]
    jobs: usize,

    /// Console log format
    #[arg(long, value_enum, default_value_t = Format::Compact)]
    log_format: Format,

    /// Flickr API key
    #[arg(long, env = "FLICKR_API_KEY", hide_env_values = true)]
    api_key: String,

    /// OAuth access token of the mirrored account
    #[arg(long, env = "FLICKR_OAUTH_TOKEN", hide_env_values = true)]
    oauth_token: Option<String>,

    /// NSID of the mirrored account
    #[arg(long, env = "FLICKR_USER_NSID")]
    user_nsid: String,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Format {
    Pretty,
    Compact,
    Json,
}

impl From<Format> for LogFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Pretty => LogFormat::Pretty,
            Format::Compact => LogFormat::Compact,
            Format::Json => LogFormat::Json,
        }
    }
}

impl Args {
    fn verbosity(&self) -> Verbosity {
        if self.verbose {
            Verbosity::Verbose
        } else if self.quiet {
            Verbosity::Quiet
        } else {
            Verbosity::Progress
        }
    }

    fn mirror_config(&self) -> Result<MirrorConfig> {
        let config = MirrorConfig::builder()
            .dest_dir(&self.destdir)
            .include_views(!self.ignore_views)
            .ignore_photos(self.ignore_photos)
            .ignore_videos(self.ignore_videos)
            .delete_unknown(self.delete_unknown)
            .print_statistics(self.statistics)
            .verbosity(self.verbosity())
            .page_size(self.page_size)
            .rate_limit(RateLimitConfig {
                max_calls: self.max_calls,
                period: Duration::from_secs(self.period_secs),
                ..RateLimitConfig::default()
            })
            .download_concurrency(self.jobs)
            .build()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    let config = args.mirror_config()?;

    init_logging(
        LoggingConfig::default()
            .with_format(args.log_format.into())
            .with_level(config.verbosity.log_level()),
    )?;

    info!(
        user = %args.user_nsid,
        api_key = %redact_if_sensitive("api_key", &args.api_key),
        dest = %config.dest_dir.display(),
        "Starting mirror"
    );

    let http = Arc::new(ReqwestHttpClient::new().context("Failed to build HTTP client")?);
    let mut authorizer = ApiKeyAuthorizer::new(args.api_key.clone());
    if let Some(token) = &args.oauth_token {
        authorizer = authorizer.with_token(token.clone());
    }
    let provider = Arc::new(FlickrConnector::new(
        http.clone(),
        Arc::new(authorizer),
        args.user_nsid.clone(),
    ));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping at the next safe point");
            on_signal.cancel();
        }
    });

    let print_statistics = config.print_statistics;
    let reconciler = Reconciler::new(config, provider, http).with_cancellation(cancel);
    let photostream_dir = reconciler.store().photostream_dir();

    let mut report = RunReport::new();
    let result = reconciler.run(&mut report).await;

    let cancelled = matches!(result, Err(SyncError::Cancelled));
    if print_statistics || cancelled {
        println!("{}", report.stats);
    }
    if let Some(guidance) = report.manual_download_guidance(&photostream_dir) {
        eprintln!("{}", guidance);
    }

    match result {
        Ok(()) if report.has_deferred_errors() => Ok(ExitCode::FAILURE),
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(SyncError::Cancelled) => {
            info!("Mirror cancelled");
            Ok(ExitCode::FAILURE)
        }
        Err(e) => {
            error!(error = %e, "Mirror failed");
            Err(e).context("Mirror run failed")
        }
    }
}
