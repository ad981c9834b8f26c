//! # Flickr Provider
//!
//! Implements `PhotoProvider` over the Flickr REST API (JSON format).
//!
//! ## Overview
//!
//! This module provides:
//! - Paginated photostream, album and "not in any album" listings
//! - Album list and the nested collection tree
//! - Original-content URLs for photos and videos
//! - Pluggable request authorisation via [`RequestAuthorizer`]
//!
//! Records are passed through as the raw JSON objects Flickr returned, so
//! the mirror can persist them verbatim.

pub mod auth;
pub mod connector;
pub mod error;
pub mod types;

pub use auth::{ApiKeyAuthorizer, RequestAuthorizer};
pub use connector::FlickrConnector;
pub use error::{FlickrError, Result};
