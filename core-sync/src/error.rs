use bridge_traits::error::BridgeError;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that abort a mirror run.
///
/// Anything that reaches the caller as a `SyncError` is fatal: the run stops
/// and the mirror keeps whatever fully applied changes it had at that point.
/// Per-video transfer failures are not errors in this sense; they are
/// collected as [`VideoDownload`] records instead.
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Provider error: {0}")]
    Provider(#[source] BridgeError),

    #[error(
        "Expected {expected} items for page {page} of {pages} but the listing returned {actual}"
    )]
    PaginationMismatch {
        page: u32,
        pages: u32,
        expected: u64,
        actual: u64,
    },

    #[error(
        "The remote listing is empty; refusing to touch local copies in case this is an anomaly"
    )]
    EmptyListing,

    #[error("{} exists but is not a {expected}", path.display())]
    UnexpectedEntryType {
        path: PathBuf,
        expected: &'static str,
    },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to fetch {url}: {reason}")]
    PhotoDownload { url: String, reason: String },

    #[error("Rate limit still in effect after {retries} retries")]
    RateLimitExhausted { retries: u32 },

    #[error("Unsupported media type '{media}' for item {id}")]
    UnsupportedMedia { id: String, media: String },

    #[error("Malformed metadata: {0}")]
    Metadata(String),

    #[error("Mirror cancelled")]
    Cancelled,
}

impl SyncError {
    pub(crate) fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        SyncError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;

/// A video whose original could not be fetched through the API.
///
/// The run carries on; these are reported together once it finishes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoDownload {
    pub media_id: String,
    /// Browser URL the user can fetch the original from.
    pub manual_url: String,
    pub reason: String,
}

impl fmt::Display for VideoDownload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.reason, self.manual_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_mismatch_display() {
        let err = SyncError::PaginationMismatch {
            page: 2,
            pages: 3,
            expected: 500,
            actual: 498,
        };
        assert_eq!(
            err.to_string(),
            "Expected 500 items for page 2 of 3 but the listing returned 498"
        );
    }

    #[test]
    fn test_unexpected_entry_display() {
        let err = SyncError::UnexpectedEntryType {
            path: PathBuf::from("/m/photostream/1.jpg"),
            expected: "file",
        };
        assert_eq!(err.to_string(), "/m/photostream/1.jpg exists but is not a file");
    }

    #[test]
    fn test_video_download_display() {
        let deferred = VideoDownload {
            media_id: "42".to_string(),
            manual_url: "https://www.flickr.com/video_download.gne?id=42".to_string(),
            reason: "Manual download required".to_string(),
        };
        assert_eq!(
            deferred.to_string(),
            "Manual download required: https://www.flickr.com/video_download.gne?id=42"
        );
    }
}
