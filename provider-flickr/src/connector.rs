//! Flickr REST connector
//!
//! Implements the `PhotoProvider` trait for the Flickr REST API.

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use bridge_traits::photos::{MediaPage, PageQuery, PhotoProvider};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::auth::RequestAuthorizer;
use crate::error::FlickrError;
use crate::types::{
    CollectionTreeResponse, PhotoListing, PhotosResponse, PhotosetListResponse,
    PhotosetPhotosResponse, Status,
};

/// Flickr REST endpoint
const REST_ENDPOINT: &str = "https://api.flickr.com/services/rest/";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Flickr API connector
///
/// # Example
///
/// ```ignore
/// use provider_flickr::{ApiKeyAuthorizer, FlickrConnector};
///
/// let authorizer = Arc::new(ApiKeyAuthorizer::new(api_key).with_token(token));
/// let connector = FlickrConnector::new(http_client, authorizer, user_nsid);
/// let page = connector.list_photos(&PageQuery::new(1, 500)).await?;
/// ```
pub struct FlickrConnector {
    http_client: Arc<dyn HttpClient>,
    authorizer: Arc<dyn RequestAuthorizer>,
    /// Owner of the mirrored account; video URLs are built from it.
    user_nsid: String,
    endpoint: String,
}

impl FlickrConnector {
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        authorizer: Arc<dyn RequestAuthorizer>,
        user_nsid: impl Into<String>,
    ) -> Self {
        Self {
            http_client,
            authorizer,
            user_nsid: user_nsid.into(),
            endpoint: REST_ENDPOINT.to_string(),
        }
    }

    /// Point the connector at a different REST endpoint.
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    fn build_request(&self, method: &str, params: &[(&str, String)]) -> HttpRequest {
        let mut request = HttpRequest::new(HttpMethod::Get, self.endpoint.clone())
            .query("method", method)
            .query("format", "json")
            .query("nojsoncallback", "1")
            .timeout(REQUEST_TIMEOUT);
        for (key, value) in params {
            request = request.query(*key, value.clone());
        }
        self.authorizer.authorize(request)
    }

    /// Issue one REST call and decode its payload.
    ///
    /// No retry happens here: a 429 is surfaced as `RateLimited` for the
    /// caller's rate gate.
    #[instrument(skip(self, params))]
    async fn call<T: DeserializeOwned>(&self, method: &str, params: &[(&str, String)]) -> Result<T> {
        let request = self.build_request(method, params);
        let response = self.http_client.execute(request).await?;
        Self::decode(method, &response, &self.endpoint)
    }

    fn decode<T: DeserializeOwned>(method: &str, response: &HttpResponse, url: &str) -> Result<T> {
        if response.status == 429 {
            warn!(method, "Flickr rate limit hit");
            return Err(BridgeError::RateLimited {
                retry_after: response.retry_after(),
            });
        }
        if !response.is_success() {
            return Err(BridgeError::Http {
                status: response.status,
                url: url.to_string(),
            });
        }

        let status: Status = response
            .json()
            .map_err(|e| FlickrError::ParseError(e.to_string()))?;
        if status.stat != "ok" {
            return Err(FlickrError::Api {
                code: status.code.unwrap_or_default(),
                message: status.message.unwrap_or_default(),
            }
            .into());
        }

        let payload: T = serde_json::from_slice(&response.body)
            .map_err(|e| FlickrError::ParseError(format!("{}: {}", method, e)))?;
        debug!(method, "Flickr call succeeded");
        Ok(payload)
    }

    fn page_params(query: &PageQuery) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("page", query.page.to_string()),
            ("per_page", query.per_page.to_string()),
        ];
        if !query.extras.is_empty() {
            params.push(("extras", query.extras.join(",")));
        }
        params
    }

    fn into_page(listing: PhotoListing, query: &PageQuery) -> MediaPage {
        let to_u32 = |n: u64| u32::try_from(n).unwrap_or(u32::MAX);
        MediaPage {
            page: to_u32(listing.page),
            pages: to_u32(listing.pages),
            per_page: listing.perpage.map(to_u32).unwrap_or(query.per_page),
            total: listing.total,
            items: listing.photo,
        }
    }

    /// String value of a record field; Flickr mixes numbers and strings.
    fn field(record: &Value, name: &str) -> std::result::Result<String, FlickrError> {
        match record.get(name) {
            Some(Value::String(s)) => Ok(s.clone()),
            Some(Value::Number(n)) => Ok(n.to_string()),
            _ => Err(FlickrError::MissingField {
                id: record
                    .get("id")
                    .and_then(Value::as_str)
                    .unwrap_or("?")
                    .to_string(),
                field: name.to_string(),
            }),
        }
    }

    fn media_url(&self, record: &Value) -> std::result::Result<String, FlickrError> {
        let media = record.get("media").and_then(Value::as_str).unwrap_or("");
        let id = Self::field(record, "id")?;

        match media {
            "photo" => Ok(format!(
                "https://farm{}.staticflickr.com/{}/{}_{}_o.{}",
                Self::field(record, "farm")?,
                Self::field(record, "server")?,
                id,
                Self::field(record, "originalsecret")?,
                Self::field(record, "originalformat")?,
            )),
            "video" => Ok(format!(
                "http://www.flickr.com/photos/{}/{}/play/orig/{}/",
                self.user_nsid,
                id,
                Self::field(record, "originalsecret")?,
            )),
            other => Err(FlickrError::UnsupportedMedia(other.to_string())),
        }
    }
}

#[async_trait]
impl PhotoProvider for FlickrConnector {
    async fn list_photos(&self, query: &PageQuery) -> Result<MediaPage> {
        let mut params = vec![("user_id", "me".to_string())];
        params.extend(Self::page_params(query));

        let rsp: PhotosResponse = self.call("flickr.people.getPhotos", &params).await?;
        Ok(Self::into_page(rsp.photos, query))
    }

    async fn list_albums(&self) -> Result<Vec<Value>> {
        let rsp: PhotosetListResponse = self.call("flickr.photosets.getList", &[]).await?;
        Ok(rsp.photosets.map(|list| list.photoset).unwrap_or_default())
    }

    async fn list_album_photos(&self, album_id: &str, query: &PageQuery) -> Result<MediaPage> {
        let mut params = vec![("photoset_id", album_id.to_string())];
        params.extend(Self::page_params(query));

        let rsp: PhotosetPhotosResponse = self.call("flickr.photosets.getPhotos", &params).await?;
        Ok(Self::into_page(rsp.photoset, query))
    }

    async fn list_not_in_album(&self, query: &PageQuery) -> Result<MediaPage> {
        let params = Self::page_params(query);
        let rsp: PhotosResponse = self.call("flickr.photos.getNotInSet", &params).await?;
        Ok(Self::into_page(rsp.photos, query))
    }

    async fn collection_tree(&self) -> Result<Vec<Value>> {
        let rsp: CollectionTreeResponse = self.call("flickr.collections.getTree", &[]).await?;
        Ok(rsp.collections.map(|list| list.collection).unwrap_or_default())
    }

    fn content_url(&self, record: &Value) -> Result<String> {
        Ok(self.media_url(record)?)
    }

    fn manual_download_url(&self, media_id: &str) -> String {
        format!("https://www.flickr.com/video_download.gne?id={}", media_id)
    }
}
