//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the mirror crates:
//! - Logging and tracing initialisation
//! - Run configuration with fail-fast validation

pub mod config;
pub mod error;
pub mod logging;

pub use config::{MirrorConfig, MirrorConfigBuilder, RateLimitConfig, Verbosity};
pub use error::{Error, Result};
