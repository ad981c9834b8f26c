//! Remote entities as the engine sees them.
//!
//! Records stay raw JSON; the helpers here only pull out the few fields the
//! engine acts on. Everything else is persisted verbatim in sidecars.

use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde_json::{Map, Value};

use crate::error::{Result, SyncError};

/// Per-item metadata fields requested from every media listing.
pub const METADATA_EXTRAS: &[&str] = &[
    "description",
    "license",
    "date_upload",
    "date_taken",
    "owner_name",
    "icon_server",
    "original_format",
    "last_update",
    "geo",
    "tags",
    "machine_tags",
    "o_dims",
    "media",
];

/// Stamped into album sidecars; bumping it forces every album to rebuild.
pub const ALBUM_METADATA_VERSION: u64 = 2;

const ALBUM_VERSION_KEY: &str = "flickrmirrorer_album_metadata_version";

/// Extras list for listing calls, with view counts when they are wanted.
pub fn metadata_extras(include_views: bool) -> Vec<String> {
    let mut extras: Vec<String> = METADATA_EXTRAS.iter().map(|s| s.to_string()).collect();
    if include_views {
        extras.push("views".to_string());
    }
    extras
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Photo,
    Video,
}

impl MediaKind {
    pub fn parse(media: &str) -> Option<Self> {
        match media {
            "photo" => Some(MediaKind::Photo),
            "video" => Some(MediaKind::Video),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Photo => "photo",
            MediaKind::Video => "video",
        }
    }
}

/// String form of a record field. Ids arrive as strings or numbers.
pub fn field_str(record: &Value, name: &str) -> Option<String> {
    match record.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Remote identifier of any record.
pub fn record_id(record: &Value) -> Result<String> {
    field_str(record, "id").ok_or_else(|| SyncError::Metadata(format!("record has no id: {}", record)))
}

/// Title of an album or collection.
///
/// Album listings wrap it as `{"_content": ...}`; the collection tree uses a
/// plain string.
pub fn record_title(record: &Value) -> String {
    match record.get("title") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(obj)) => obj
            .get("_content")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
        _ => String::new(),
    }
}

/// One remote photo or video.
#[derive(Debug, Clone)]
pub struct MediaItem {
    pub id: String,
    pub kind: MediaKind,
    /// The record exactly as the provider returned it.
    pub record: Value,
}

impl MediaItem {
    pub fn from_record(record: Value) -> Result<Self> {
        let id = record_id(&record)?;
        let media = record
            .get("media")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let kind = MediaKind::parse(media).ok_or_else(|| SyncError::UnsupportedMedia {
            id: id.clone(),
            media: media.to_string(),
        })?;

        Ok(Self { id, kind, record })
    }

    pub fn original_format(&self) -> Option<String> {
        field_str(&self.record, "originalformat")
    }

    /// The change-detection signal for content.
    pub fn last_update(&self) -> Option<&Value> {
        self.record.get("lastupdate")
    }

    /// When the item was captured, see [`resolve_captured_at`].
    pub fn captured_at(&self, now: NaiveDateTime) -> Option<NaiveDateTime> {
        resolve_captured_at(&self.record, now)
    }
}

/// Resolve the capture time of a media record.
///
/// 1. `datetaken` when `datetakenunknown` says it is known;
/// 2. a `YYYYMMDD_HHMMSS` title, if it is after 2000 and before `now`;
/// 3. `datetaken` anyway, since the service always fills it in.
pub fn resolve_captured_at(record: &Value, now: NaiveDateTime) -> Option<NaiveDateTime> {
    let taken = record
        .get("datetaken")
        .and_then(Value::as_str)
        .and_then(parse_date_taken);

    let known = matches!(field_str(record, "datetakenunknown").as_deref(), Some("0"));
    if known {
        if let Some(taken) = taken {
            return Some(taken);
        }
    }

    if let Some(title) = record.get("title").and_then(Value::as_str) {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(title, "%Y%m%d_%H%M%S") {
            if parsed.year() > 2000 && parsed < now {
                return Some(parsed);
            }
        }
    }

    taken
}

fn parse_date_taken(value: &str) -> Option<NaiveDateTime> {
    let value = value.trim();
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S"))
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.naive_local())
        })
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}

/// Turn an album record into the form persisted as its sidecar.
///
/// The member list replaces the service's photo count so membership and
/// order changes show up as a record difference.
pub fn album_record(record: Value, member_ids: &[String], include_views: bool) -> Result<Value> {
    let mut obj: Map<String, Value> = match record {
        Value::Object(obj) => obj,
        other => {
            return Err(SyncError::Metadata(format!(
                "album record is not an object: {}",
                other
            )))
        }
    };

    obj.insert(
        "photos".to_string(),
        Value::Array(member_ids.iter().cloned().map(Value::String).collect()),
    );
    if !include_views {
        obj.remove("count_views");
    }
    obj.insert(ALBUM_VERSION_KEY.to_string(), Value::from(ALBUM_METADATA_VERSION));

    Ok(Value::Object(obj))
}

/// Album references of a collection node, in display order.
pub fn collection_albums(record: &Value) -> &[Value] {
    record
        .get("set")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}

/// Child collections of a collection node, in display order.
pub fn collection_children(record: &Value) -> &[Value] {
    record
        .get("collection")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default()
}
