//! Flickr API response types
//!
//! Envelopes for the REST JSON responses. Item records stay as raw
//! `serde_json::Value` so they can be persisted unchanged.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Outer `{"stat": ..., "code": ..., "message": ...}` of every response.
#[derive(Debug, Deserialize)]
pub struct Status {
    pub stat: String,
    #[serde(default)]
    pub code: Option<i64>,
    #[serde(default)]
    pub message: Option<String>,
}

/// A paginated listing of photo records.
///
/// Flickr serialises the counters as numbers in some methods and as strings
/// in others, so they are read leniently.
#[derive(Debug, Deserialize)]
pub struct PhotoListing {
    #[serde(deserialize_with = "lenient_u64")]
    pub page: u64,
    #[serde(deserialize_with = "lenient_u64")]
    pub pages: u64,
    #[serde(default, deserialize_with = "lenient_opt_u64")]
    pub perpage: Option<u64>,
    #[serde(deserialize_with = "lenient_u64")]
    pub total: u64,
    #[serde(default)]
    pub photo: Vec<Value>,
}

/// `flickr.people.getPhotos` / `flickr.photos.getNotInSet`
#[derive(Debug, Deserialize)]
pub struct PhotosResponse {
    pub photos: PhotoListing,
}

/// `flickr.photosets.getPhotos`
#[derive(Debug, Deserialize)]
pub struct PhotosetPhotosResponse {
    pub photoset: PhotoListing,
}

/// `flickr.photosets.getList`
#[derive(Debug, Deserialize)]
pub struct PhotosetListResponse {
    #[serde(default)]
    pub photosets: Option<PhotosetList>,
}

#[derive(Debug, Deserialize)]
pub struct PhotosetList {
    #[serde(default)]
    pub photoset: Vec<Value>,
}

/// `flickr.collections.getTree`
#[derive(Debug, Deserialize)]
pub struct CollectionTreeResponse {
    #[serde(default)]
    pub collections: Option<CollectionList>,
}

#[derive(Debug, Deserialize)]
pub struct CollectionList {
    #[serde(default)]
    pub collection: Vec<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    Text(String),
}

impl NumberOrString {
    fn into_u64<E: serde::de::Error>(self) -> Result<u64, E> {
        match self {
            NumberOrString::Number(n) => Ok(n),
            NumberOrString::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("expected a count, got '{}'", s))),
        }
    }
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    NumberOrString::deserialize(deserializer)?.into_u64()
}

fn lenient_opt_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_u64)
        .transpose()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_photo_listing_string_counters() {
        let json = r#"{
            "page": 1, "pages": "3", "perpage": 500, "total": "1203",
            "photo": [{"id": "1"}]
        }"#;

        let listing: PhotoListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.pages, 3);
        assert_eq!(listing.total, 1203);
        assert_eq!(listing.perpage, Some(500));
        assert_eq!(listing.photo.len(), 1);
    }

    #[test]
    fn test_photoset_listing_without_perpage() {
        let json = r#"{"page": "2", "pages": 2, "per_page": 10, "total": 15, "photo": []}"#;
        let listing: PhotoListing = serde_json::from_str(json).unwrap();
        assert_eq!(listing.page, 2);
        assert_eq!(listing.perpage, None);
    }

    #[test]
    fn test_bad_counter_rejected() {
        let json = r#"{"page": 1, "pages": 1, "total": "many", "photo": []}"#;
        assert!(serde_json::from_str::<PhotoListing>(json).is_err());
    }

    #[test]
    fn test_empty_collection_tree() {
        let rsp: CollectionTreeResponse = serde_json::from_str(r#"{"collections": {}}"#).unwrap();
        assert!(rsp.collections.unwrap().collection.is_empty());
    }
}
