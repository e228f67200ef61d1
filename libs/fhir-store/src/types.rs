//! Repository data types

use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use uuid::Uuid;

/// A persisted resource: the FHIR JSON body with server-owned `meta`, plus
/// the row bookkeeping the repository maintains.
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub resource_type: String,
    pub id: Uuid,
    pub version_id: Uuid,
    pub last_updated: DateTime<Utc>,
    pub deleted: bool,
    /// `__version` row marker: 1 for live rows, -1 after soft delete
    pub version: i32,
    /// Full FHIR JSON with `id` and `meta` populated
    pub content: Value,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CreateOptions {
    /// Client-assigned id; creates are UPSERT-semantic on collision
    pub assigned_id: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateOptions {
    /// Expected current versionId (`If-Match`)
    pub if_match: Option<Uuid>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HistoryOptions {
    pub count: Option<usize>,
    pub since: Option<DateTime<Utc>>,
}

/// One immutable history row. `content` is empty for delete tombstones.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub version_id: Uuid,
    pub last_updated: DateTime<Utc>,
    pub content: String,
}

impl HistoryEntry {
    pub fn is_tombstone(&self) -> bool {
        self.content.is_empty()
    }
}

/// Resource type of a FHIR JSON body.
pub(crate) fn resource_type_of(content: &Value) -> Result<String> {
    content
        .get("resourceType")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .ok_or_else(|| Error::InvalidResource("missing resourceType".to_string()))
}

/// Overwrite `id` and `meta.{versionId,lastUpdated}` with server-owned
/// values; whatever the client supplied is discarded.
pub(crate) fn populate_meta(
    content: &mut Value,
    id: Uuid,
    version_id: Uuid,
    last_updated: DateTime<Utc>,
) {
    if let Value::Object(obj) = content {
        obj.insert("id".to_string(), Value::String(id.to_string()));
        let meta = obj
            .entry("meta".to_string())
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(meta_obj) = meta {
            meta_obj.insert(
                "versionId".to_string(),
                Value::String(version_id.to_string()),
            );
            meta_obj.insert(
                "lastUpdated".to_string(),
                Value::String(last_updated.to_rfc3339_opts(SecondsFormat::Millis, true)),
            );
        }
    }
}

/// Reconstruct a [`Resource`] from a stored content string.
pub(crate) fn resource_from_content(
    resource_type: &str,
    id: Uuid,
    version_id: Uuid,
    last_updated: DateTime<Utc>,
    content: &str,
) -> Result<Resource> {
    let value: Value = serde_json::from_str(content)
        .map_err(|e| Error::InvalidResource(format!("stored content is not JSON: {}", e)))?;
    Ok(Resource {
        resource_type: resource_type.to_string(),
        id,
        version_id,
        last_updated,
        deleted: false,
        version: 1,
        content: value,
    })
}
