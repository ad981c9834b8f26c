//! # Mirror Reconciliation Engine
//!
//! Keeps a local directory tree in step with a remote photo account.
//!
//! ## Overview
//!
//! The engine is one-directional (remote to local) and idempotent: a run
//! against an unchanged account writes nothing. Every multi-step change is
//! either staged and renamed into place or done as delete-then-recreate,
//! so an interrupted run never leaves a half-written file behind.
//!
//! ## Components
//!
//! - **Rate Gate** (`rate_gate`): Paces every outbound call and retries rate-limited ones
//! - **Model** (`model`): Media items, album and collection record helpers
//! - **Naming** (`naming`): Path-safe local names for remote entities
//! - **Change Detector** (`sidecar`): Structural comparison against persisted records
//! - **Mirror Store** (`store`): Directory layout, atomic writes, relative symlinks
//! - **Materializer** (`photostream`): Per-item content and sidecar reconciliation
//! - **Reconciler** (`reconciler`): Photostream, album, uncategorized and collection passes
//! - **Orphan Pruner** (`pruner`): Opt-in removal of entries the remote side no longer has
//! - **Statistics** (`stats`): Run counters and the end-of-run report

pub mod error;
pub mod model;
pub mod naming;
pub mod photostream;
pub mod pruner;
pub mod rate_gate;
pub mod reconciler;
pub mod sidecar;
pub mod stats;
pub mod store;

pub use error::{Result, SyncError, VideoDownload};
pub use model::{MediaItem, MediaKind};
pub use photostream::{Materialized, Materializer, Outcome};
pub use pruner::Pruner;
pub use rate_gate::RateGate;
pub use reconciler::Reconciler;
pub use stats::{FetchKind, RunReport, RunStats};
pub use store::MirrorStore;
