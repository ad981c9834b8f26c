use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    /// The remote side asked us to slow down. Callers behind a rate gate
    /// sleep and retry the same call instead of propagating this.
    #[error("Rate limited by remote service")]
    RateLimited { retry_after: Option<Duration> },

    /// The remote API answered, but reported a failure in its payload.
    #[error("API request failed: error {code}: {message}")]
    Api { code: i64, message: String },

    #[error("HTTP {status} for {url}")]
    Http { status: u16, url: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BridgeError {
    /// Whether this error is a rate-limit signal rather than a failure.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, BridgeError::RateLimited { .. })
    }

    /// Server-suggested delay before retrying, if any.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            BridgeError::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
