//! Versioned FHIR resource repository
//!
//! CRUD with version history, soft delete, optimistic concurrency
//! (`If-Match`), compartment assignment, and search-column indexing driven
//! by the `siderite-search` registry. The [`ResourceStore`] trait has two
//! backends with identical observable semantics:
//!
//! - [`PgResourceStore`]: PostgreSQL via sqlx; every write spans main,
//!   history, references, and lookup rows in a single transaction.
//! - [`MemoryResourceStore`]: in-process tables behind one async mutex,
//!   for tests and embedded use.
//!
//! The server owns `meta.versionId` and `meta.lastUpdated`; client-supplied
//! values are discarded on every write.

pub mod compartments;
pub mod config;
pub mod error;
pub mod extract;
pub mod memory;
pub mod postgres;
pub mod traits;
pub mod types;

pub use compartments::compute_compartments;
pub use config::StoreConfig;
pub use error::{Error, Result};
pub use extract::{extract_search_values, ColumnValue, ExtractedValues, LookupRow, ReferenceRow};
pub use memory::MemoryResourceStore;
pub use postgres::PgResourceStore;
pub use traits::ResourceStore;
pub use types::{CreateOptions, HistoryEntry, HistoryOptions, Resource, UpdateOptions};
