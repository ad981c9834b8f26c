//! # Reconciler
//!
//! Drives one mirror run, pass by pass:
//!
//! 1. photostream: list every item (verifying each page), materialize them;
//! 2. albums: rebuild every album whose record changed, prune `Albums`;
//! 3. "Not in any album": rebuilt from scratch on every run;
//!    the photostream is pruned once these three passes are done, so album
//!    members missing from the photostream listing are kept;
//! 4. collections: rebuild changed nodes of the collection tree, prune
//!    `Collections`.
//!
//! Directory rebuilds always delete and recreate, so a rebuilt directory
//! holds exactly what the remote side lists. The cancellation token is
//! checked between items, albums, pages and collection nodes.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use core_sync::{Reconciler, RunReport};
//!
//! let reconciler = Reconciler::new(config, provider, http_client)
//!     .with_cancellation(token.clone());
//! let mut report = RunReport::new();
//! let result = reconciler.run(&mut report).await;
//! println!("{}", report.stats);
//! result?;
//! ```

use bridge_traits::http::HttpClient;
use bridge_traits::photos::{PageQuery, PhotoProvider};
use bridge_traits::time::{Clock, SystemClock};
use chrono::Local;
use core_runtime::config::MirrorConfig;
use futures::stream::{self, StreamExt};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::error::{Result, SyncError};
use crate::model::{
    album_record, collection_albums, collection_children, metadata_extras, record_id,
    record_title, MediaItem,
};
use crate::naming::{album_dirname, collection_dirname, position_width, positional_name, sidecar_name};
use crate::photostream::{Materializer, Outcome};
use crate::pruner::Pruner;
use crate::rate_gate::RateGate;
use crate::sidecar;
use crate::stats::RunReport;
use crate::store::{LinkTarget, MirrorStore, DIR_SIDECAR};

/// Bookkeeping shared by the passes of one run.
#[derive(Debug, Default)]
struct RunState {
    /// Local content name of every item handled this run, by id.
    content_names: HashMap<String, String>,
    /// Ids whose transfer was deferred this run.
    deferred: HashSet<String>,
}

enum CollectionStep {
    /// Rebuild a node below `parent` if its record changed.
    Visit { record: Value, parent: PathBuf },
    /// Persist a node's sidecar once its subtree is in place.
    Seal { dir: PathBuf, record: Value },
}

pub struct Reconciler {
    config: MirrorConfig,
    provider: Arc<dyn PhotoProvider>,
    http: Arc<dyn HttpClient>,
    clock: Arc<dyn Clock>,
    gate: RateGate,
    store: MirrorStore,
    cancel: CancellationToken,
    extras: Vec<String>,
}

impl Reconciler {
    pub fn new(
        config: MirrorConfig,
        provider: Arc<dyn PhotoProvider>,
        http: Arc<dyn HttpClient>,
    ) -> Self {
        Self {
            gate: RateGate::new(&config.rate_limit),
            store: MirrorStore::new(config.dest_dir.clone()),
            extras: metadata_extras(config.include_views),
            config,
            provider,
            http,
            clock: Arc::new(SystemClock),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn store(&self) -> &MirrorStore {
        &self.store
    }

    /// Run every pass. Statistics and deferred video errors are accumulated
    /// into `report` as the run goes, so they are valid on failure too.
    #[instrument(skip_all, fields(dest = %self.config.dest_dir.display()))]
    pub async fn run(&self, report: &mut RunReport) -> Result<()> {
        debug!(
            "Photos will be {}",
            if self.config.ignore_photos { "ignored" } else { "mirrored" }
        );
        debug!(
            "Videos will be {}",
            if self.config.ignore_videos { "ignored" } else { "mirrored" }
        );
        debug!(
            "Unknown files in {} will{} be deleted",
            self.config.dest_dir.display(),
            if self.config.delete_unknown { "" } else { " not" }
        );

        let stale = self.store.prepare().await?;
        if stale > 0 {
            debug!(count = stale, "Removed temp files of an interrupted run");
        }

        let now = self.clock.now().with_timezone(&Local).naive_local();
        let materializer = Materializer::new(
            self.provider.as_ref(),
            self.http.as_ref(),
            &self.gate,
            &self.store,
            now,
        );
        let mut state = RunState::default();

        self.mirror_photostream(&materializer, &mut state, report).await?;
        self.mirror_albums(&materializer, &mut state, report).await?;
        self.mirror_uncategorized(&materializer, &mut state, report)
            .await?;
        self.prune_photostream(&state, report).await?;
        self.mirror_collections(report).await?;

        info!(changes = report.stats.total_changes(), "Mirror complete");
        Ok(())
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }

    fn page_query(&self, page: u32) -> PageQuery {
        PageQuery::new(page, self.config.page_size).with_extras(self.extras.iter().cloned())
    }

    fn wanted(&self, record: &Value) -> bool {
        let media = record.get("media").and_then(Value::as_str).unwrap_or_default();
        self.config.wants_media(media)
    }

    fn pruner(&self) -> Pruner<'_> {
        Pruner::new(&self.store, self.config.delete_unknown)
    }

    /// Fold one materialization result into the run; returns the item's
    /// local content name when it has one.
    fn record_outcome(
        state: &mut RunState,
        report: &mut RunReport,
        id: &str,
        outcome: Outcome,
    ) -> Option<String> {
        match outcome {
            Outcome::Materialized(done) => {
                if let Some(kind) = done.fetched {
                    report.stats.record_fetch(kind);
                }
                state
                    .content_names
                    .insert(id.to_string(), done.content_name.clone());
                Some(done.content_name)
            }
            Outcome::Deferred {
                error,
                content_name,
            } => {
                warn!(id, "{}", error);
                if state.deferred.insert(id.to_string()) {
                    report.deferred_errors.push(error);
                }
                if let Some(name) = &content_name {
                    state.content_names.insert(id.to_string(), name.clone());
                }
                content_name
            }
        }
    }

    /// Materialize `item` unless this run already did.
    async fn ensure_materialized(
        &self,
        materializer: &Materializer<'_>,
        state: &mut RunState,
        report: &mut RunReport,
        item: &MediaItem,
    ) -> Result<Option<String>> {
        if let Some(name) = state.content_names.get(&item.id) {
            return Ok(Some(name.clone()));
        }
        if state.deferred.contains(&item.id) {
            return Ok(None);
        }

        let outcome = materializer.materialize(item).await?;
        if let Outcome::Materialized(done) = &outcome {
            if !done.changed.is_empty() {
                debug!(
                    id = %item.id,
                    files = ?done.changed,
                    "Updated an item missing from the photostream listing"
                );
            }
        }
        Ok(Self::record_outcome(state, report, &item.id, outcome))
    }

    /// Every photostream record, with each page's size checked against the
    /// listing's totals. Nothing local is touched before this succeeds.
    async fn fetch_photostream(&self) -> Result<Vec<Value>> {
        let mut records = Vec::new();
        let mut page = 1;

        loop {
            self.check_cancelled()?;
            let query = self.page_query(page);
            let listing = self
                .gate
                .call(|| self.provider.list_photos(&query))
                .await?;

            if page == 1 {
                info!(total = listing.total, "Requested page 1");
                if listing.total == 0 {
                    return Err(SyncError::EmptyListing);
                }
            } else {
                info!("Requested page {} / {}", page, listing.pages);
            }

            let expected = listing.expected_len();
            let actual = listing.items.len() as u64;
            if actual != expected {
                return Err(SyncError::PaginationMismatch {
                    page,
                    pages: listing.pages,
                    expected,
                    actual,
                });
            }
            debug!(count = actual, "Fetched photo metadata");

            let last = listing.is_last();
            records.extend(listing.items);
            if last {
                return Ok(records);
            }
            page += 1;
        }
    }

    #[instrument(skip_all)]
    async fn mirror_photostream(
        &self,
        materializer: &Materializer<'_>,
        state: &mut RunState,
        report: &mut RunReport,
    ) -> Result<()> {
        info!("Mirroring all photos and videos in photostream");

        let items = self
            .fetch_photostream()
            .await?
            .into_iter()
            .filter(|record| self.wanted(record))
            .map(MediaItem::from_record)
            .collect::<Result<Vec<_>>>()?;
        let total = items.len();

        let mut results = stream::iter(items.iter())
            .map(|item| async move {
                self.check_cancelled()?;
                let outcome = materializer.materialize(item).await?;
                Ok::<_, SyncError>((item, outcome))
            })
            .buffer_unordered(self.config.download_concurrency.max(1));

        let mut done = 0;
        while let Some(result) = results.next().await {
            let (item, outcome) = result?;
            done += 1;
            debug!("Processed item {} ({}/{})", item.id, done, total);
            Self::record_outcome(state, report, &item.id, outcome);
        }
        Ok(())
    }

    /// Prune the photostream against every item any pass materialized, so
    /// items reachable only through an album survive.
    async fn prune_photostream(&self, state: &RunState, report: &mut RunReport) -> Result<()> {
        let known: HashSet<String> = state
            .content_names
            .values()
            .flat_map(|name| [sidecar_name(name), name.clone()])
            .collect();

        let removed = self
            .pruner()
            .prune(&self.store.photostream_dir(), &known, "file")
            .await?;
        report.stats.deleted_media += removed as u64 / 2;
        Ok(())
    }

    #[instrument(skip_all)]
    async fn mirror_albums(
        &self,
        materializer: &Materializer<'_>,
        state: &mut RunState,
        report: &mut RunReport,
    ) -> Result<()> {
        info!("Mirroring albums");

        let albums = self.gate.call(|| self.provider.list_albums()).await?;
        let mut known = HashSet::new();
        for album in albums {
            self.check_cancelled()?;
            known.insert(self.mirror_album(materializer, state, report, album).await?);
        }

        self.pruner()
            .prune(&self.store.albums_dir(), &known, "album")
            .await?;
        Ok(())
    }

    /// Bring one album directory up to date; returns its directory name.
    async fn mirror_album(
        &self,
        materializer: &Materializer<'_>,
        state: &mut RunState,
        report: &mut RunReport,
        album: Value,
    ) -> Result<String> {
        let id = record_id(&album)?;
        let title = record_title(&album);
        let dirname = album_dirname(&id, &title);
        let album_dir = self.store.albums_dir().join(&dirname);

        let mut members: Vec<(String, Option<String>)> = Vec::new();
        let mut page = 1;
        loop {
            let query = self.page_query(page);
            let listing = self
                .gate
                .call(|| self.provider.list_album_photos(&id, &query))
                .await?;
            let last = listing.is_last() || listing.items.is_empty();

            for record in listing.items {
                if !self.wanted(&record) {
                    continue;
                }
                let item = MediaItem::from_record(record)?;
                let name = self
                    .ensure_materialized(materializer, state, report, &item)
                    .await?;
                members.push((item.id, name));
            }

            if last {
                break;
            }
            page += 1;
        }

        let member_ids: Vec<String> = members.iter().map(|(id, _)| id.clone()).collect();
        let record = album_record(album, &member_ids, self.config.include_views)?;
        let sidecar_path = album_dir.join(DIR_SIDECAR);

        if self.store.is_dir(&album_dir).await?
            && !sidecar::needs_update(&sidecar_path, &record).await?
        {
            debug!("Album {} is up-to-date", title);
            return Ok(dirname);
        }

        info!("Updating album {}", title);
        report.stats.modified_albums += 1;
        self.store.recreate_dir(&album_dir).await?;

        let photostream = self.store.photostream_dir();
        let width = position_width(members.len());
        let mut unlinked = 0;
        for (index, (member_id, name)) in members.iter().enumerate() {
            match name {
                Some(name) => {
                    let link = album_dir.join(positional_name(index, width, name));
                    self.store
                        .symlink_relative(&photostream.join(name), &link, LinkTarget::File)
                        .await?;
                }
                None => {
                    warn!(album = %title, id = %member_id, "No local copy, member not linked");
                    unlinked += 1;
                }
            }
        }

        // Without a sidecar the album is rebuilt next run, once the missing
        // members may have a local copy.
        if unlinked > 0 {
            warn!(album = %title, unlinked, "Album left incomplete, not recording its metadata");
        } else {
            sidecar::write(&self.store, &sidecar_path, &record).await?;
        }
        Ok(dirname)
    }

    #[instrument(skip_all)]
    async fn mirror_uncategorized(
        &self,
        materializer: &Materializer<'_>,
        state: &mut RunState,
        report: &mut RunReport,
    ) -> Result<()> {
        info!("Creating local directory for photos not in any album");

        let dir = self.store.uncategorized_dir();
        self.store.recreate_dir(&dir).await?;
        let photostream = self.store.photostream_dir();

        let mut linked = HashSet::new();
        let mut page = 1;
        loop {
            self.check_cancelled()?;
            let query = self.page_query(page);
            let listing = self
                .gate
                .call(|| self.provider.list_not_in_album(&query))
                .await?;
            if listing.items.is_empty() {
                break;
            }
            let last = listing.is_last();

            for record in listing.items {
                if !self.wanted(&record) {
                    continue;
                }
                let item = MediaItem::from_record(record)?;
                let Some(name) = self
                    .ensure_materialized(materializer, state, report, &item)
                    .await?
                else {
                    continue;
                };
                if linked.insert(name.clone()) {
                    self.store
                        .symlink_relative(&photostream.join(&name), &dir.join(&name), LinkTarget::File)
                        .await?;
                }
            }

            if last {
                break;
            }
            page += 1;
        }
        Ok(())
    }

    #[instrument(skip_all)]
    async fn mirror_collections(&self, report: &mut RunReport) -> Result<()> {
        info!("Mirroring collections");

        let tree = self.gate.call(|| self.provider.collection_tree()).await?;
        let root = self.store.collections_dir();
        let albums_dir = self.store.albums_dir();

        let mut known = HashSet::new();
        for node in &tree {
            known.insert(collection_dirname(&record_id(node)?, &record_title(node)));
        }

        let mut work: Vec<CollectionStep> = tree
            .into_iter()
            .rev()
            .map(|record| CollectionStep::Visit {
                record,
                parent: root.clone(),
            })
            .collect();

        while let Some(step) = work.pop() {
            self.check_cancelled()?;
            match step {
                CollectionStep::Visit { record, parent } => {
                    let id = record_id(&record)?;
                    let title = record_title(&record);
                    let dir = parent.join(collection_dirname(&id, &title));

                    if self.store.is_dir(&dir).await?
                        && !sidecar::needs_update(&dir.join(DIR_SIDECAR), &record).await?
                    {
                        debug!("Collection {} is up-to-date", title);
                        continue;
                    }

                    info!("Updating collection {}", title);
                    report.stats.modified_collections += 1;
                    self.store.recreate_dir(&dir).await?;

                    for album in collection_albums(&record) {
                        let name = album_dirname(&record_id(album)?, &record_title(album));
                        self.store
                            .symlink_relative(&albums_dir.join(&name), &dir.join(&name), LinkTarget::Dir)
                            .await?;
                    }

                    let children = collection_children(&record).to_vec();
                    work.push(CollectionStep::Seal {
                        dir: dir.clone(),
                        record,
                    });
                    for child in children.into_iter().rev() {
                        work.push(CollectionStep::Visit {
                            record: child,
                            parent: dir.clone(),
                        });
                    }
                }
                CollectionStep::Seal { dir, record } => {
                    sidecar::write(&self.store, &dir.join(DIR_SIDECAR), &record).await?;
                }
            }
        }

        self.pruner()
            .prune(&root, &known, "collection")
            .await?;
        Ok(())
    }
}
