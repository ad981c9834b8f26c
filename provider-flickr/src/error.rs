//! Error types for the Flickr provider

use bridge_traits::error::BridgeError;
use thiserror::Error;

/// Flickr provider errors
#[derive(Error, Debug)]
pub enum FlickrError {
    /// The API answered with `stat != "ok"`
    #[error("Flickr API error {code}: {message}")]
    Api { code: i64, message: String },

    /// Failed to parse API response
    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    /// A record lacks a field needed to build a URL
    #[error("Record {id} is missing field '{field}'")]
    MissingField { id: String, field: String },

    /// Media kind other than photo or video
    #[error("Unsupported media type '{0}'")]
    UnsupportedMedia(String),

    /// Bridge error
    #[error(transparent)]
    BridgeError(#[from] BridgeError),
}

/// Result type for Flickr operations
pub type Result<T> = std::result::Result<T, FlickrError>;

impl From<FlickrError> for BridgeError {
    fn from(error: FlickrError) -> Self {
        match error {
            FlickrError::Api { code, message } => BridgeError::Api { code, message },
            FlickrError::ParseError(msg) => {
                BridgeError::OperationFailed(format!("Parse error: {}", msg))
            }
            FlickrError::MissingField { id, field } => BridgeError::OperationFailed(format!(
                "Record {} is missing field '{}'",
                id, field
            )),
            FlickrError::UnsupportedMedia(media) => {
                BridgeError::OperationFailed(format!("Unsupported media type '{}'", media))
            }
            FlickrError::BridgeError(e) => e,
        }
    }
}
