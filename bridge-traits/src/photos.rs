//! Remote Photo Provider Abstraction
//!
//! Contract for the remote metadata service a mirror is built from. Records
//! are handed over as opaque JSON documents: the engine persists them verbatim
//! as sidecars and compares them structurally, so providers must not
//! normalise or reorder what the service returned.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

/// Pagination request for a listing call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageQuery {
    /// 1-based page index
    pub page: u32,
    /// Requested page size
    pub per_page: u32,
    /// Extra metadata fields to request for each item
    pub extras: Vec<String>,
}

impl PageQuery {
    pub fn new(page: u32, per_page: u32) -> Self {
        Self {
            page,
            per_page,
            extras: Vec::new(),
        }
    }

    pub fn with_extras<I, S>(mut self, extras: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extras = extras.into_iter().map(Into::into).collect();
        self
    }
}

/// One page of a media listing.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaPage {
    /// 1-based index of this page
    pub page: u32,
    /// Total number of pages the service reports
    pub pages: u32,
    /// Page size the service applied
    pub per_page: u32,
    /// Total number of items across all pages
    pub total: u64,
    /// Raw item records
    pub items: Vec<Value>,
}

impl MediaPage {
    /// Number of items a complete page with this index must hold, derived
    /// from `total` and `per_page`. The last page carries the remainder.
    pub fn expected_len(&self) -> u64 {
        let per_page = u64::from(self.per_page.max(1));
        let before = u64::from(self.page.saturating_sub(1)) * per_page;
        self.total.saturating_sub(before).min(per_page)
    }

    pub fn is_last(&self) -> bool {
        self.page >= self.pages
    }
}

/// Remote metadata provider
///
/// Every method is a single outbound call; callers wrap each one in their
/// rate gate.
#[async_trait]
pub trait PhotoProvider: Send + Sync {
    /// List one page of every media item the user owns.
    async fn list_photos(&self, query: &PageQuery) -> Result<MediaPage>;

    /// List all albums. Each record carries at least `id` and `title`.
    async fn list_albums(&self) -> Result<Vec<Value>>;

    /// List one page of an album's members, in display order.
    async fn list_album_photos(&self, album_id: &str, query: &PageQuery) -> Result<MediaPage>;

    /// List one page of items that belong to no album.
    async fn list_not_in_album(&self, query: &PageQuery) -> Result<MediaPage>;

    /// Fetch the complete, nested collection tree (top-level nodes).
    async fn collection_tree(&self) -> Result<Vec<Value>>;

    /// URL the original content of `record` can be downloaded from.
    fn content_url(&self, record: &Value) -> Result<String>;

    /// URL a user can open in a browser to fetch an item by hand.
    fn manual_download_url(&self, media_id: &str) -> String;
}
