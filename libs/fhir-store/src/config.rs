//! Store configuration

use uuid::Uuid;

/// Connection and tenancy settings for the Postgres store.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub database_url: String,
    pub max_connections: u32,
    /// Stamped into every row's `projectId` column when set.
    pub project_id: Option<Uuid>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            database_url: "postgres://localhost/fhir".to_string(),
            max_connections: 10,
            project_id: None,
        }
    }
}
