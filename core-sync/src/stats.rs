//! Run statistics and the end-of-run report.

use std::fmt;
use std::path::Path;

use crate::error::VideoDownload;

/// How a content file came to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    New,
    Modified,
}

/// Counters accumulated over one run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunStats {
    pub new_media: u64,
    pub modified_media: u64,
    /// Photostream entries pruned, counting content and sidecar as one.
    pub deleted_media: u64,
    pub modified_albums: u64,
    pub modified_collections: u64,
}

impl RunStats {
    pub fn record_fetch(&mut self, kind: FetchKind) {
        match kind {
            FetchKind::New => self.new_media += 1,
            FetchKind::Modified => self.modified_media += 1,
        }
    }

    pub fn total_changes(&self) -> u64 {
        self.new_media
            + self.modified_media
            + self.deleted_media
            + self.modified_albums
            + self.modified_collections
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "New photos / videos: {}", self.new_media)?;
        writeln!(f, "Deleted photos / videos: {}", self.deleted_media)?;
        writeln!(f, "Modified photos / videos: {}", self.modified_media)?;
        writeln!(f, "Modified albums: {}", self.modified_albums)?;
        write!(f, "Modified collections: {}", self.modified_collections)
    }
}

/// Everything a run leaves for its caller, whether it finished or not.
#[derive(Debug, Default)]
pub struct RunReport {
    pub stats: RunStats,
    /// Videos the user has to fetch by hand.
    pub deferred_errors: Vec<VideoDownload>,
}

impl RunReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_deferred_errors(&self) -> bool {
        !self.deferred_errors.is_empty()
    }

    /// Instructions for the videos that could not be fetched, if any.
    pub fn manual_download_guidance(&self, photostream_dir: &Path) -> Option<String> {
        if self.deferred_errors.is_empty() {
            return None;
        }

        let mut text = format!(
            "The Flickr API does not allow downloading original video files.\n\
             Please save the files listed below to the {} directory.\n\
             Note: You must be logged into your Flickr account in order to download \
             your full resolution videos!\n",
            photostream_dir.display()
        );
        for error in &self.deferred_errors {
            text.push_str(&format!("  {}\n", error));
        }
        Some(text)
    }
}
