//! PostgreSQL resource store
//!
//! Every write runs in a single transaction spanning the main row, the
//! history row, and the derived index rows (references and lookup tables),
//! so partial failure leaves none of them. Optimistic concurrency locks
//! the current row (`FOR UPDATE`) before checking `If-Match`.

use crate::compartments::compute_compartments;
use crate::config::StoreConfig;
use crate::error::{Error, Result};
use crate::extract::{extract_search_values, ColumnValue, ExtractedValues};
use crate::traits::ResourceStore;
use crate::types::{
    populate_meta, resource_from_content, resource_type_of, CreateOptions, HistoryEntry,
    HistoryOptions, Resource, UpdateOptions,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use siderite_search::{SchemaBuilder, SearchParameterRegistry};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions};
use sqlx::{Postgres, Row, Transaction};
use std::sync::Arc;
use uuid::Uuid;

/// PostgreSQL-backed [`ResourceStore`].
#[derive(Debug, Clone)]
pub struct PgResourceStore {
    pool: PgPool,
    registry: Arc<SearchParameterRegistry>,
    project_id: Option<Uuid>,
}

/// Identifiers are interpolated into SQL (table and column names are
/// dynamic per resource type), so they must be plain words.
fn validate_ident(ident: &str) -> Result<()> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(c) => {
            (c.is_ascii_alphabetic() || c == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };
    if valid {
        Ok(())
    } else {
        Err(Error::InvalidResource(format!(
            "invalid identifier \"{}\"",
            ident
        )))
    }
}

fn bind_column_value<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    value: &ColumnValue,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match value {
        ColumnValue::Text(s) => query.bind(s.clone()),
        ColumnValue::TextArray(v) => query.bind(v.clone()),
        ColumnValue::Uuid(u) => query.bind(*u),
        ColumnValue::UuidArray(v) => query.bind(v.clone()),
        ColumnValue::Timestamp(t) => query.bind(*t),
        ColumnValue::Number(n) => query.bind(*n),
    }
}

/// Surface database constraint failures as typed violations.
fn map_db_error(err: sqlx::Error) -> Error {
    match &err {
        sqlx::Error::Database(db) if db.constraint().is_some() => {
            Error::ConstraintViolation(db.message().to_string())
        }
        _ => Error::Database(err),
    }
}

/// versionId recorded in a stored content string.
fn version_id_of_content(content: &str) -> Option<Uuid> {
    let value: Value = serde_json::from_str(content).ok()?;
    let version = value.get("meta")?.get("versionId")?.as_str()?;
    Uuid::parse_str(version).ok()
}

impl PgResourceStore {
    pub async fn connect(
        config: &StoreConfig,
        registry: Arc<SearchParameterRegistry>,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;
        Ok(Self {
            pool,
            registry,
            project_id: config.project_id,
        })
    }

    pub fn with_pool(pool: PgPool, registry: Arc<SearchParameterRegistry>) -> Self {
        Self {
            pool,
            registry,
            project_id: None,
        }
    }

    /// Apply the projected schema (idempotent DDL) for the given types.
    pub async fn ensure_schema(&self, resource_types: &[&str]) -> Result<()> {
        for resource_type in resource_types {
            validate_ident(resource_type)?;
        }
        let ddl = SchemaBuilder::new(&self.registry).build_ddl(resource_types);
        for statement in &ddl {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Write the main row (UPSERT), history row, reference rows, and lookup
    /// rows inside `tx`.
    async fn write_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_type: &str,
        id: Uuid,
        version_id: Uuid,
        now: DateTime<Utc>,
        content: &str,
        resource: &Value,
    ) -> Result<()> {
        validate_ident(resource_type)?;
        let compartments = compute_compartments(resource_type, id, resource);
        let ExtractedValues {
            columns,
            lookup_rows,
            references,
        } = extract_search_values(&self.registry, resource_type, resource);

        let mut column_names = vec![
            "id",
            "content",
            "lastUpdated",
            "deleted",
            "projectId",
            "__version",
            "compartments",
        ]
        .into_iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>();
        let search_columns: Vec<(&String, &ColumnValue)> = columns.iter().collect();
        for (name, _) in &search_columns {
            validate_ident(name)?;
            column_names.push((*name).clone());
        }

        let quoted: Vec<String> = column_names.iter().map(|c| format!("\"{}\"", c)).collect();
        let placeholders: Vec<String> =
            (1..=column_names.len()).map(|i| format!("${}", i)).collect();
        let updates: Vec<String> = column_names
            .iter()
            .skip(1)
            .map(|c| format!("\"{0}\" = EXCLUDED.\"{0}\"", c))
            .collect();
        let sql = format!(
            "INSERT INTO \"{}\" ({}) VALUES ({}) ON CONFLICT (\"id\") DO UPDATE SET {}",
            resource_type,
            quoted.join(", "),
            placeholders.join(", "),
            updates.join(", ")
        );

        let mut query = sqlx::query(&sql)
            .bind(id)
            .bind(content)
            .bind(now)
            .bind(false)
            .bind(self.project_id)
            .bind(1_i32)
            .bind(compartments.clone());
        for (_, value) in &search_columns {
            query = bind_column_value(query, value);
        }
        query.execute(&mut **tx).await.map_err(map_db_error)?;

        let history_sql = format!(
            "INSERT INTO \"{}_History\" (\"id\", \"versionId\", \"lastUpdated\", \"content\") VALUES ($1, $2, $3, $4)",
            resource_type
        );
        sqlx::query(&history_sql)
            .bind(id)
            .bind(version_id)
            .bind(now)
            .bind(content)
            .execute(&mut **tx)
            .await?;

        let delete_refs = format!(
            "DELETE FROM \"{}_References\" WHERE \"resourceId\" = $1",
            resource_type
        );
        sqlx::query(&delete_refs).bind(id).execute(&mut **tx).await?;
        let insert_ref = format!(
            "INSERT INTO \"{}_References\" (\"resourceId\", \"targetId\", \"code\", \"targetType\") VALUES ($1, $2, $3, $4) ON CONFLICT DO NOTHING",
            resource_type
        );
        for reference in &references {
            sqlx::query(&insert_ref)
                .bind(id)
                .bind(reference.target_id)
                .bind(&reference.code)
                .bind(&reference.target_type)
                .execute(&mut **tx)
                .await?;
        }

        for table in ["HumanName", "Address", "ContactPoint", "Identifier"] {
            let delete_lookup =
                format!("DELETE FROM \"{}\" WHERE \"resourceId\" = $1 AND \"resourceType\" = $2", table);
            sqlx::query(&delete_lookup)
                .bind(id)
                .bind(resource_type)
                .execute(&mut **tx)
                .await?;
        }
        for row in &lookup_rows {
            let mut names = vec!["resourceId".to_string(), "resourceType".to_string()];
            for name in row.columns.keys() {
                validate_ident(name)?;
                names.push(name.clone());
            }
            let quoted: Vec<String> = names.iter().map(|c| format!("\"{}\"", c)).collect();
            let placeholders: Vec<String> =
                (1..=names.len()).map(|i| format!("${}", i)).collect();
            let sql = format!(
                "INSERT INTO \"{}\" ({}) VALUES ({})",
                row.table.table_name(),
                quoted.join(", "),
                placeholders.join(", ")
            );
            let mut query = sqlx::query(&sql).bind(id).bind(resource_type);
            for value in row.columns.values() {
                query = query.bind(value.clone());
            }
            query.execute(&mut **tx).await?;
        }

        Ok(())
    }

    /// Lock and return the current row state inside a transaction.
    async fn lock_row(
        &self,
        tx: &mut Transaction<'_, Postgres>,
        resource_type: &str,
        id: Uuid,
    ) -> Result<Option<(bool, String)>> {
        validate_ident(resource_type)?;
        let sql = format!(
            "SELECT \"deleted\", \"content\" FROM \"{}\" WHERE \"id\" = $1 FOR UPDATE",
            resource_type
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await?;
        Ok(row.map(|r| (r.get("deleted"), r.get("content"))))
    }
}

#[async_trait]
impl ResourceStore for PgResourceStore {
    async fn create(&self, mut resource: Value, options: CreateOptions) -> Result<Resource> {
        let resource_type = resource_type_of(&resource)?;
        let id = options.assigned_id.unwrap_or_else(Uuid::new_v4);
        let version_id = Uuid::new_v4();
        let now = Utc::now();
        populate_meta(&mut resource, id, version_id, now);
        let content = serde_json::to_string(&resource)
            .map_err(|e| Error::InvalidResource(e.to_string()))?;

        let mut tx = self.pool.begin().await?;
        self.write_row(&mut tx, &resource_type, id, version_id, now, &content, &resource)
            .await?;
        tx.commit().await?;

        tracing::debug!(resource_type = %resource_type, %id, "created resource");
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
        validate_ident(resource_type)?;
        let sql = format!(
            "SELECT \"deleted\", \"content\", \"lastUpdated\", \"__version\" FROM \"{}\" WHERE \"id\" = $1",
            resource_type
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(resource_type, id))?;

        let deleted: bool = row.get("deleted");
        if deleted {
            return Err(Error::gone(resource_type, id));
        }
        let content: String = row.get("content");
        let last_updated: DateTime<Utc> = row.get("lastUpdated");
        let version: i32 = row.get("__version");
        let version_id = version_id_of_content(&content)
            .ok_or_else(|| Error::InvalidResource("stored row without versionId".to_string()))?;
        let mut resource =
            resource_from_content(resource_type, id, version_id, last_updated, &content)?;
        resource.version = version;
        Ok(resource)
    }

    async fn read_version(
        &self,
        resource_type: &str,
        id: Uuid,
        version_id: Uuid,
    ) -> Result<Resource> {
        validate_ident(resource_type)?;
        let sql = format!(
            "SELECT \"lastUpdated\", \"content\" FROM \"{}_History\" WHERE \"id\" = $1 AND \"versionId\" = $2",
            resource_type
        );
        let row = sqlx::query(&sql)
            .bind(id)
            .bind(version_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(resource_type, id))?;

        let content: String = row.get("content");
        if content.is_empty() {
            return Err(Error::gone(resource_type, id));
        }
        let last_updated: DateTime<Utc> = row.get("lastUpdated");
        resource_from_content(resource_type, id, version_id, last_updated, &content)
    }

    async fn update(&self, mut resource: Value, options: UpdateOptions) -> Result<Resource> {
        let resource_type = resource_type_of(&resource)?;
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .and_then(|s| Uuid::parse_str(s).ok())
            .ok_or_else(|| Error::InvalidResource("update requires a resource id".to_string()))?;

        let mut tx = self.pool.begin().await?;
        let current = self
            .lock_row(&mut tx, &resource_type, id)
            .await?
            .ok_or_else(|| Error::not_found(&resource_type, id))?;
        let (deleted, current_content) = current;
        if deleted {
            return Err(Error::gone(&resource_type, id));
        }
        if let Some(expected) = options.if_match {
            let current_version = version_id_of_content(&current_content);
            if current_version != Some(expected) {
                return Err(Error::conflict(&resource_type, id));
            }
        }

        let version_id = Uuid::new_v4();
        let now = Utc::now();
        populate_meta(&mut resource, id, version_id, now);
        let content = serde_json::to_string(&resource)
            .map_err(|e| Error::InvalidResource(e.to_string()))?;

        self.write_row(&mut tx, &resource_type, id, version_id, now, &content, &resource)
            .await?;
        tx.commit().await?;

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
        validate_ident(resource_type)?;
        let mut tx = self.pool.begin().await?;
        let current = self
            .lock_row(&mut tx, resource_type, id)
            .await?
            .ok_or_else(|| Error::not_found(resource_type, id))?;
        if current.0 {
            return Err(Error::gone(resource_type, id));
        }

        let version_id = Uuid::new_v4();
        let now = Utc::now();
        let sql = format!(
            "UPDATE \"{}\" SET \"deleted\" = TRUE, \"content\" = '', \"__version\" = -1, \"lastUpdated\" = $2 WHERE \"id\" = $1",
            resource_type
        );
        sqlx::query(&sql).bind(id).bind(now).execute(&mut *tx).await?;

        let history_sql = format!(
            "INSERT INTO \"{}_History\" (\"id\", \"versionId\", \"lastUpdated\", \"content\") VALUES ($1, $2, $3, '')",
            resource_type
        );
        sqlx::query(&history_sql)
            .bind(id)
            .bind(version_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn history(
        &self,
        resource_type: &str,
        id: Uuid,
        options: HistoryOptions,
    ) -> Result<Vec<HistoryEntry>> {
        validate_ident(resource_type)?;
        let mut sql = format!(
            "SELECT \"versionId\", \"lastUpdated\", \"content\" FROM \"{}_History\" WHERE \"id\" = $1",
            resource_type
        );
        if options.since.is_some() {
            sql.push_str(" AND \"lastUpdated\" > $2");
        }
        sql.push_str(" ORDER BY \"lastUpdated\" DESC");
        if let Some(count) = options.count {
            sql.push_str(&format!(" LIMIT {}", count));
        }

        let mut query = sqlx::query(&sql).bind(id);
        if let Some(since) = options.since {
            query = query.bind(since);
        }
        let rows = query.fetch_all(&self.pool).await?;
        if rows.is_empty() {
            return Err(Error::not_found(resource_type, id));
        }
        Ok(rows
            .into_iter()
            .map(|row| HistoryEntry {
                id,
                version_id: row.get("versionId"),
                last_updated: row.get("lastUpdated"),
                content: row.get("content"),
            })
            .collect())
    }
}
