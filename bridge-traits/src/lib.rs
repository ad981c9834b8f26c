//! # Host Bridge Traits
//!
//! Contracts between the mirror engine and the collaborators it does not own.
//!
//! ## Traits
//!
//! - [`HttpClient`](http::HttpClient) - Media transport: streaming GET and
//!   redirect resolution
//! - [`PhotoProvider`](photos::PhotoProvider) - Remote metadata listings
//!   (photostream, albums, uncategorized items, collection tree)
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! must report throttling as `BridgeError::RateLimited` so callers can pace
//! and retry instead of failing.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single implementation can be
//! shared across async tasks.

pub mod error;
pub mod http;
pub mod photos;
pub mod time;

pub use error::BridgeError;

pub use http::{ByteStream, HttpClient, HttpMethod, HttpRequest, HttpResponse, RetryPolicy};
pub use photos::{MediaPage, PageQuery, PhotoProvider};
pub use time::{Clock, LogLevel, SystemClock};
