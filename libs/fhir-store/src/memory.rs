//! In-memory resource store
//!
//! Tables live behind a single `tokio::sync::Mutex`, so every write (main
//! row + history row + index data) is atomic and `If-Match` checks are
//! race-free. Observable semantics match the Postgres backend.

use crate::compartments::compute_compartments;
use crate::error::{Error, Result};
use crate::extract::{extract_search_values, ColumnValue, ExtractedValues, LookupRow, ReferenceRow};
use crate::traits::ResourceStore;
use crate::types::{
    populate_meta, resource_from_content, resource_type_of, CreateOptions, HistoryEntry,
    HistoryOptions, Resource, UpdateOptions,
};
use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use siderite_search::SearchParameterRegistry;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone)]
struct StoredRow {
    version_id: Uuid,
    last_updated: chrono::DateTime<Utc>,
    deleted: bool,
    version: i32,
    content: String,
    compartments: Vec<Uuid>,
    columns: HashMap<String, ColumnValue>,
    lookup_rows: Vec<LookupRow>,
    references: Vec<ReferenceRow>,
}

#[derive(Debug, Default)]
struct TypeTables {
    rows: HashMap<Uuid, StoredRow>,
    history: HashMap<Uuid, Vec<HistoryEntry>>,
}

/// In-memory [`ResourceStore`] backend.
#[derive(Debug, Default)]
pub struct MemoryResourceStore {
    tables: Mutex<HashMap<String, TypeTables>>,
    registry: Option<Arc<SearchParameterRegistry>>,
}

impl MemoryResourceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index search columns and lookup rows from the given registry on
    /// every write.
    pub fn with_registry(registry: Arc<SearchParameterRegistry>) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            registry: Some(registry),
        }
    }

    fn index(&self, resource_type: &str, content: &Value) -> ExtractedValues {
        match &self.registry {
            Some(registry) => extract_search_values(registry, resource_type, content),
            None => ExtractedValues::default(),
        }
    }

    /// Search column values for a row (test and diagnostics hook).
    pub async fn search_columns(
        &self,
        resource_type: &str,
        id: Uuid,
    ) -> Option<HashMap<String, ColumnValue>> {
        let tables = self.tables.lock().await;
        tables
            .get(resource_type)
            .and_then(|t| t.rows.get(&id))
            .map(|row| row.columns.clone())
    }

    /// Lookup-table rows for a row (test and diagnostics hook).
    pub async fn lookup_rows(&self, resource_type: &str, id: Uuid) -> Vec<LookupRow> {
        let tables = self.tables.lock().await;
        tables
            .get(resource_type)
            .and_then(|t| t.rows.get(&id))
            .map(|row| row.lookup_rows.clone())
            .unwrap_or_default()
    }

    /// Compartment ids for a row (test and diagnostics hook).
    pub async fn compartments(&self, resource_type: &str, id: Uuid) -> Vec<Uuid> {
        let tables = self.tables.lock().await;
        tables
            .get(resource_type)
            .and_then(|t| t.rows.get(&id))
            .map(|row| row.compartments.clone())
            .unwrap_or_default()
    }

    /// Reference rows for a row (test and diagnostics hook).
    pub async fn references(&self, resource_type: &str, id: Uuid) -> Vec<ReferenceRow> {
        let tables = self.tables.lock().await;
        tables
            .get(resource_type)
            .and_then(|t| t.rows.get(&id))
            .map(|row| row.references.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ResourceStore for MemoryResourceStore {
    async fn create(&self, mut resource: Value, options: CreateOptions) -> Result<Resource> {
        let resource_type = resource_type_of(&resource)?;
        let id = options.assigned_id.unwrap_or_else(Uuid::new_v4);
        let version_id = Uuid::new_v4();
        let now = Utc::now();
        populate_meta(&mut resource, id, version_id, now);

        let content = serde_json::to_string(&resource)
            .map_err(|e| Error::InvalidResource(e.to_string()))?;
        let compartments = compute_compartments(&resource_type, id, &resource);
        let extracted = self.index(&resource_type, &resource);

        let mut tables = self.tables.lock().await;
        let table = tables.entry(resource_type.clone()).or_default();
        // Assigned-id creates are UPSERT: a colliding row is replaced and
        // one more history row appended.
        table.rows.insert(
            id,
            StoredRow {
                version_id,
                last_updated: now,
                deleted: false,
                version: 1,
                content: content.clone(),
                compartments,
                columns: extracted.columns,
                lookup_rows: extracted.lookup_rows,
                references: extracted.references,
            },
        );
        table.history.entry(id).or_default().push(HistoryEntry {
            id,
            version_id,
            last_updated: now,
            content,
        });

        Ok(Resource {
            resource_type,
            id,
            version_id,
            last_updated: now,
            deleted: false,
            version: 1,
            content: resource,
        })
    }

    async fn read(&self, resource_type: &str, id: Uuid) -> Result<Resource> {
        let tables = self.tables.lock().await;
        let row = tables
            .get(resource_type)
            .and_then(|t| t.rows.get(&id))
            .ok_or_else(|| Error::not_found(resource_type, id))?;
        if row.deleted {
            return Err(Error::gone(resource_type, id));
        }
        let mut resource =
            resource_from_content(resource_type, id, row.version_id, row.last_updated, &row.content)?;
        resource.version = row.version;
        Ok(resource)
    }

    async fn read_version(
        &self,
        resource_type: &str,
        id: Uuid,
        version_id: Uuid,
    ) -> Result<Resource> {
        let tables = self.tables.lock().await;
        let entry = tables
            .get(resource_type)
            .and_then(|t| t.history.get(&id))
            .and_then(|entries| entries.iter().find(|e| e.version_id == version_id))
            .ok_or_else(|| Error::not_found(resource_type, id))?;
        if entry.is_tombstone() {
            return Err(Error::gone(resource_type, id));
        }
        resource_from_content(resource_type, id, entry.version_id, entry.last_updated, &entry.content)
    }

    async fn update(&self, mut resource: Value, options: UpdateOptions) -> Result<Resource> {
        let resource_type = resource_type_of(&resource)?;
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| Error::InvalidResource("update requires a resource id".to_string()))?;

        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(&resource_type)
            .ok_or_else(|| Error::not_found(&resource_type, id))?;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(&resource_type, id))?;
        if row.deleted {
            return Err(Error::gone(&resource_type, id));
        }
        if let Some(expected) = options.if_match {
            if expected != row.version_id {
                return Err(Error::conflict(&resource_type, id));
            }
        }

        let version_id = Uuid::new_v4();
        let now = Utc::now();
        populate_meta(&mut resource, id, version_id, now);
        let content = serde_json::to_string(&resource)
            .map_err(|e| Error::InvalidResource(e.to_string()))?;
        let extracted = match &self.registry {
            Some(registry) => extract_search_values(registry, &resource_type, &resource),
            None => ExtractedValues::default(),
        };

        row.version_id = version_id;
        row.last_updated = now;
        row.version = 1;
        row.content = content.clone();
        row.compartments = compute_compartments(&resource_type, id, &resource);
        row.columns = extracted.columns;
        row.lookup_rows = extracted.lookup_rows;
        row.references = extracted.references;

        table.history.entry(id).or_default().push(HistoryEntry {
            id,
            version_id,
            last_updated: now,
            content,
        });

        Ok(Resource {
            resource_type,
            id,
            version_id,
            last_updated: now,
            deleted: false,
            version: 1,
            content: resource,
        })
    }

    async fn delete(&self, resource_type: &str, id: Uuid) -> Result<()> {
        let mut tables = self.tables.lock().await;
        let table = tables
            .get_mut(resource_type)
            .ok_or_else(|| Error::not_found(resource_type, id))?;
        let row = table
            .rows
            .get_mut(&id)
            .ok_or_else(|| Error::not_found(resource_type, id))?;
        if row.deleted {
            return Err(Error::gone(resource_type, id));
        }

        let version_id = Uuid::new_v4();
        let now = Utc::now();
        row.deleted = true;
        row.content = String::new();
        row.version = -1;
        row.version_id = version_id;
        row.last_updated = now;
        row.columns.clear();
        row.lookup_rows.clear();
        row.references.clear();

        table.history.entry(id).or_default().push(HistoryEntry {
            id,
            version_id,
            last_updated: now,
            content: String::new(),
        });
        Ok(())
    }

    async fn history(
        &self,
        resource_type: &str,
        id: Uuid,
        options: HistoryOptions,
    ) -> Result<Vec<HistoryEntry>> {
        let tables = self.tables.lock().await;
        let entries = tables
            .get(resource_type)
            .and_then(|t| t.history.get(&id))
            .ok_or_else(|| Error::not_found(resource_type, id))?;

        let mut out: Vec<HistoryEntry> = entries
            .iter()
            .rev()
            .filter(|e| options.since.map(|since| e.last_updated > since).unwrap_or(true))
            .cloned()
            .collect();
        if let Some(count) = options.count {
            out.truncate(count);
        }
        Ok(out)
    }
}
