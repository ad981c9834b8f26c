//! # Photostream Materializer
//!
//! Brings one media item's content file and sidecar in line with its
//! remote record. Content is only transferred when it is missing or the
//! record's `lastupdate` moved; the sidecar only when the record changed.

use bridge_traits::http::HttpClient;
use bridge_traits::photos::PhotoProvider;
use chrono::{Local, NaiveDateTime, TimeZone};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError, VideoDownload};
use crate::model::{MediaItem, MediaKind};
use crate::naming::{basename_from_url, photo_basename, sidecar_name};
use crate::rate_gate::RateGate;
use crate::sidecar;
use crate::stats::FetchKind;
use crate::store::MirrorStore;

/// A successfully materialized item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Materialized {
    pub content_name: String,
    pub sidecar_name: String,
    /// Names among the two above that were created or touched.
    pub changed: BTreeSet<String>,
    /// Set when content was transferred.
    pub fetched: Option<FetchKind>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Materialized(Materialized),
    /// The video could not be transferred. `content_name` is set when a
    /// local copy exists already and must be kept.
    Deferred {
        error: VideoDownload,
        content_name: Option<String>,
    },
}

pub struct Materializer<'a> {
    provider: &'a dyn PhotoProvider,
    http: &'a dyn HttpClient,
    gate: &'a RateGate,
    store: &'a MirrorStore,
    /// Upper bound for dates parsed out of titles.
    now: NaiveDateTime,
}

impl<'a> Materializer<'a> {
    pub fn new(
        provider: &'a dyn PhotoProvider,
        http: &'a dyn HttpClient,
        gate: &'a RateGate,
        store: &'a MirrorStore,
        now: NaiveDateTime,
    ) -> Self {
        Self {
            provider,
            http,
            gate,
            store,
            now,
        }
    }

    fn content_url(&self, item: &MediaItem) -> Result<String> {
        self.provider
            .content_url(&item.record)
            .map_err(SyncError::Provider)
    }

    fn defer(&self, item: &MediaItem, reason: &str, content_name: Option<String>) -> Outcome {
        Outcome::Deferred {
            error: VideoDownload {
                media_id: item.id.clone(),
                manual_url: self.provider.manual_download_url(&item.id),
                reason: reason.to_string(),
            },
            content_name,
        }
    }

    /// Local file name of a video: an existing download if there is one,
    /// otherwise the name at the end of the download URL's redirect chain.
    async fn video_name(&self, item: &MediaItem, dir: &Path) -> Result<Option<String>> {
        if let Some(existing) = self.store.find_content(dir, &item.id).await? {
            return Ok(Some(existing));
        }

        let url = self.content_url(item)?;
        let resolved = self
            .gate
            .try_call(|| self.http.resolve_final_url(url.clone()))
            .await?;
        match resolved {
            Ok(final_url) => Ok(basename_from_url(&final_url)),
            Err(e) => {
                debug!(id = %item.id, error = %e, "Could not resolve video file name");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, item), fields(id = %item.id, media = item.kind.as_str()))]
    pub async fn materialize(&self, item: &MediaItem) -> Result<Outcome> {
        let dir = self.store.photostream_dir();

        let content_name = match item.kind {
            MediaKind::Photo => {
                let format = item.original_format().ok_or_else(|| {
                    SyncError::Metadata(format!("photo {} has no originalformat", item.id))
                })?;
                photo_basename(&item.id, &format)
            }
            MediaKind::Video => match self.video_name(item, &dir).await? {
                Some(name) => name,
                None => return Ok(self.defer(item, "Manual download required", None)),
            },
        };
        let sidecar_name = sidecar_name(&content_name);
        let content_path = dir.join(&content_name);
        let sidecar_path = dir.join(&sidecar_name);

        self.store.ensure_file_or_absent(&content_path).await?;
        self.store.ensure_file_or_absent(&sidecar_path).await?;

        let content_exists = self.store.exists(&content_path).await?;
        let stored = sidecar::read(&sidecar_path).await?;
        let lastupdate_moved = stored
            .as_ref()
            .map(|s| s.get("lastupdate") != item.last_update())
            .unwrap_or(false);
        if content_exists && stored.is_none() {
            // No sidecar to compare against: the content is kept as is.
            debug!(file = %content_name, "Content present without a readable sidecar");
        }

        let mut changed = BTreeSet::new();
        let mut fetched = None;

        if !content_exists || lastupdate_moved {
            let url = self.content_url(item)?;
            if let Err(reason) = self.transfer(&url, &content_path).await? {
                return match item.kind {
                    MediaKind::Photo => Err(SyncError::PhotoDownload { url, reason }),
                    MediaKind::Video => Ok(self.defer(
                        item,
                        "Manual download required (video may have changed)",
                        content_exists.then(|| content_name.clone()),
                    )),
                };
            }
            info!(file = %content_name, "Fetched content");
            fetched = Some(if content_exists {
                FetchKind::Modified
            } else {
                FetchKind::New
            });
            changed.insert(content_name.clone());
        } else {
            debug!(file = %content_name, "Skipping content because we already have it");
        }

        if stored.as_ref() != Some(&item.record) {
            sidecar::write(self.store, &sidecar_path, &item.record).await?;
            info!(file = %content_name, "Updated metadata");
            changed.insert(sidecar_name.clone());
        } else {
            debug!(file = %content_name, "Skipping metadata because we already have it");
        }

        match item.captured_at(self.now).and_then(local_system_time) {
            Some(when) => {
                for (name, path) in [(&content_name, &content_path), (&sidecar_name, &sidecar_path)] {
                    if self.store.set_timestamp_if_different(path, when).await? {
                        changed.insert(name.clone());
                    }
                }
            }
            None => warn!(file = %content_name, "No usable capture time, leaving timestamps"),
        }

        Ok(Outcome::Materialized(Materialized {
            content_name,
            sidecar_name,
            changed,
            fetched,
        }))
    }

    /// Download `url` into `dest`. The inner error describes a transport
    /// failure; local failures are fatal and come back as the outer one.
    async fn transfer(&self, url: &str, dest: &Path) -> Result<std::result::Result<u64, String>> {
        let stream = self
            .gate
            .try_call(|| self.http.download_stream(url.to_string()))
            .await?;
        let reader = match stream {
            Ok(reader) => reader,
            Err(e) => return Ok(Err(e.to_string())),
        };
        Ok(self
            .store
            .stream_to_file(dest, reader)
            .await?
            .map_err(|e| e.to_string()))
    }
}

/// Interpret a naive capture time in the local zone, as file times are.
fn local_system_time(naive: NaiveDateTime) -> Option<SystemTime> {
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(SystemTime::from)
}
