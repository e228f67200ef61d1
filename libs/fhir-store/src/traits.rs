//! Core trait for FHIR resource storage backends
//!
//! All methods are version-aware and handle soft deletes. Any backend
//! (PostgreSQL, in-memory, a proxy) can implement this trait; both shipped
//! backends satisfy the same invariants: every write is atomic across the
//! main row and its history row, versionIds are never reused, and deletes
//! are soft (tombstoned).

use crate::error::Result;
use crate::types::{CreateOptions, HistoryEntry, HistoryOptions, Resource, UpdateOptions};
use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

#[async_trait]
pub trait ResourceStore: Send + Sync {
    /// Create a resource. A fresh id is allocated unless
    /// `options.assigned_id` is given, in which case the create is
    /// UPSERT-semantic on collision. Mints a fresh versionId, stamps
    /// `meta`, writes the main row and one history row atomically.
    async fn create(&self, resource: Value, options: CreateOptions) -> Result<Resource>;

    /// Read the current version.
    ///
    /// # Errors
    /// `ResourceNotFound` if the row is absent, `ResourceGone` if deleted.
    async fn read(&self, resource_type: &str, id: Uuid) -> Result<Resource>;

    /// Read a specific version from history.
    ///
    /// # Errors
    /// `ResourceNotFound` if no such version, `ResourceGone` when the
    /// history row is the delete tombstone.
    async fn read_version(
        &self,
        resource_type: &str,
        id: Uuid,
        version_id: Uuid,
    ) -> Result<Resource>;

    /// Update an existing resource, minting a new versionId and appending
    /// one history row.
    ///
    /// # Errors
    /// `ResourceNotFound` if absent, `ResourceGone` if deleted,
    /// `VersionConflict` when `options.if_match` differs from the current
    /// versionId (checked atomically with the write).
    async fn update(&self, resource: Value, options: UpdateOptions) -> Result<Resource>;

    /// Soft delete: marks the row deleted, clears its content, and appends
    /// an empty-content history row.
    ///
    /// # Errors
    /// `ResourceNotFound` if absent, `ResourceGone` if already deleted.
    async fn delete(&self, resource_type: &str, id: Uuid) -> Result<()>;

    /// Version history, newest first, optionally limited and filtered to
    /// entries after `since`.
    async fn history(
        &self,
        resource_type: &str,
        id: Uuid,
        options: HistoryOptions,
    ) -> Result<Vec<HistoryEntry>>;
}
