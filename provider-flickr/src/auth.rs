//! Request authorisation
//!
//! Token acquisition happens outside this crate. An authorizer only decorates
//! outgoing REST calls with whatever credentials it was handed.

use bridge_traits::http::HttpRequest;

/// Adds credentials to a Flickr REST request.
pub trait RequestAuthorizer: Send + Sync {
    fn authorize(&self, request: HttpRequest) -> HttpRequest;
}

/// Authorises calls with an API key and, when available, an access token.
#[derive(Clone)]
pub struct ApiKeyAuthorizer {
    api_key: String,
    oauth_token: Option<String>,
}

impl ApiKeyAuthorizer {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            oauth_token: None,
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.oauth_token = Some(token.into());
        self
    }
}

impl std::fmt::Debug for ApiKeyAuthorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiKeyAuthorizer")
            .field("api_key", &"[REDACTED]")
            .field("oauth_token", &self.oauth_token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

impl RequestAuthorizer for ApiKeyAuthorizer {
    fn authorize(&self, request: HttpRequest) -> HttpRequest {
        let request = request.query("api_key", self.api_key.clone());
        match &self.oauth_token {
            Some(token) => request.query("oauth_token", token.clone()),
            None => request,
        }
    }
}
