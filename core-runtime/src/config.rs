//! # Mirror Configuration
//!
//! Run-wide settings for a mirror run, built once and then passed by
//! reference into the engine. There is no global state: everything the
//! reconciler needs to know about the run lives in [`MirrorConfig`].
//!
//! ## Usage
//!
//! ```
//! use core_runtime::config::MirrorConfig;
//!
//! let config = MirrorConfig::builder()
//!     .dest_dir("/srv/flickr")
//!     .delete_unknown(true)
//!     .build()
//!     .expect("valid config");
//! assert!(config.delete_unknown);
//! ```
//!
//! ## Error Handling
//!
//! The builder fails fast with an actionable message when the run could not
//! do anything useful:
//!
//! ```should_panic
//! use core_runtime::config::MirrorConfig;
//!
//! let config = MirrorConfig::builder()
//!     .dest_dir("/srv/flickr")
//!     .ignore_photos(true)
//!     .ignore_videos(true)
//!     .build()
//!     .expect("Should fail - nothing to mirror");
//! ```

use crate::error::{Error, Result};
use bridge_traits::time::LogLevel;
use std::path::PathBuf;
use std::time::Duration;

/// Largest page the remote listing calls accept.
pub const MAX_PAGE_SIZE: u32 = 500;

/// How chatty a run is on the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    /// Print nothing if the mirror succeeds
    Quiet,
    /// Print progress (updated items, albums, deletions)
    #[default]
    Progress,
    /// Print every decision, including skipped items
    Verbose,
}

impl Verbosity {
    /// Log level that surfaces exactly the messages of this verbosity.
    pub fn log_level(&self) -> LogLevel {
        match self {
            Verbosity::Quiet => LogLevel::Warn,
            Verbosity::Progress => LogLevel::Info,
            Verbosity::Verbose => LogLevel::Debug,
        }
    }
}

/// Outbound call budget shared by metadata calls and media transfers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitConfig {
    /// Calls allowed per window
    pub max_calls: u32,
    /// Window length
    pub period: Duration,
    /// How many rate-limit rejections of one call are absorbed before the
    /// run is aborted
    pub max_retries: u32,
    /// Delay used when a rejection carries no `Retry-After`
    pub backoff: Duration,
}

impl Default for RateLimitConfig {
    // Flickr asks for no more than 3600 requests an hour.
    fn default() -> Self {
        Self {
            max_calls: 1,
            period: Duration::from_secs(1),
            max_retries: 5,
            backoff: Duration::from_secs(10),
        }
    }
}

/// Configuration for one mirror run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorConfig {
    /// Root of the local mirror
    pub dest_dir: PathBuf,

    /// Request and persist view counters
    pub include_views: bool,

    /// Skip items whose media kind is photo
    pub ignore_photos: bool,

    /// Skip items whose media kind is video
    pub ignore_videos: bool,

    /// Delete local entries that no longer correspond to remote state
    pub delete_unknown: bool,

    /// Print new/deleted/modified counts at the end of the run
    pub print_statistics: bool,

    /// Console verbosity
    pub verbosity: Verbosity,

    /// Items requested per listing page
    pub page_size: u32,

    /// Outbound call budget
    pub rate_limit: RateLimitConfig,

    /// Content transfers allowed in flight during the photostream pass
    pub download_concurrency: usize,
}

impl MirrorConfig {
    /// Creates a new builder for constructing a `MirrorConfig`.
    pub fn builder() -> MirrorConfigBuilder {
        MirrorConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.dest_dir.as_os_str().is_empty() {
            return Err(Error::Config(
                "Destination directory cannot be empty".to_string(),
            ));
        }

        if self.ignore_photos && self.ignore_videos {
            return Err(Error::Config(
                "There is nothing to do because photos and videos are ignored. \
                 Please choose to mirror at least photos or videos."
                    .to_string(),
            ));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {} (got {})",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.rate_limit.max_calls == 0 {
            return Err(Error::Config(
                "Rate limit must allow at least one call per period".to_string(),
            ));
        }

        if self.rate_limit.period.is_zero() {
            return Err(Error::Config(
                "Rate limit period must be greater than zero".to_string(),
            ));
        }

        if self.download_concurrency == 0 {
            return Err(Error::Config(
                "Download concurrency must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Whether items of this media kind name are mirrored. Unknown kinds are
    /// passed through so the engine can reject them explicitly.
    pub fn wants_media(&self, media: &str) -> bool {
        match media {
            "photo" => !self.ignore_photos,
            "video" => !self.ignore_videos,
            _ => true,
        }
    }
}

/// Builder for constructing [`MirrorConfig`] instances.
#[derive(Debug, Default)]
pub struct MirrorConfigBuilder {
    dest_dir: Option<PathBuf>,
    include_views: Option<bool>,
    ignore_photos: bool,
    ignore_videos: bool,
    delete_unknown: bool,
    print_statistics: bool,
    verbosity: Verbosity,
    page_size: Option<u32>,
    rate_limit: Option<RateLimitConfig>,
    download_concurrency: Option<usize>,
}

impl MirrorConfigBuilder {
    /// Sets the root directory of the mirror (required).
    pub fn dest_dir<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.dest_dir = Some(path.into());
        self
    }

    /// Whether view counters are requested and persisted. Default: true.
    pub fn include_views(mut self, include: bool) -> Self {
        self.include_views = Some(include);
        self
    }

    pub fn ignore_photos(mut self, ignore: bool) -> Self {
        self.ignore_photos = ignore;
        self
    }

    pub fn ignore_videos(mut self, ignore: bool) -> Self {
        self.ignore_videos = ignore;
        self
    }

    /// Enables orphan pruning. Ignored media kinds are pruned too.
    pub fn delete_unknown(mut self, delete: bool) -> Self {
        self.delete_unknown = delete;
        self
    }

    pub fn print_statistics(mut self, print: bool) -> Self {
        self.print_statistics = print;
        self
    }

    pub fn verbosity(mut self, verbosity: Verbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    /// Items per listing page. Default: 500.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = Some(page_size);
        self
    }

    pub fn rate_limit(mut self, rate_limit: RateLimitConfig) -> Self {
        self.rate_limit = Some(rate_limit);
        self
    }

    /// Content transfers in flight during the photostream pass. Default: 1.
    pub fn download_concurrency(mut self, concurrency: usize) -> Self {
        self.download_concurrency = Some(concurrency);
        self
    }

    /// Builds the final configuration.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the destination is missing or any value
    /// fails [`MirrorConfig::validate`].
    pub fn build(self) -> Result<MirrorConfig> {
        let dest_dir = self.dest_dir.ok_or_else(|| {
            Error::Config("Destination directory is required".to_string())
        })?;

        let config = MirrorConfig {
            dest_dir,
            include_views: self.include_views.unwrap_or(true),
            ignore_photos: self.ignore_photos,
            ignore_videos: self.ignore_videos,
            delete_unknown: self.delete_unknown,
            print_statistics: self.print_statistics,
            verbosity: self.verbosity,
            page_size: self.page_size.unwrap_or(MAX_PAGE_SIZE),
            rate_limit: self.rate_limit.unwrap_or_default(),
            download_concurrency: self.download_concurrency.unwrap_or(1),
        };

        config.validate()?;
        Ok(config)
    }
}
