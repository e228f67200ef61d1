//! FHIR search planning over a relational schema
//!
//! Three layers, used together by the resource repository:
//! - [`registry`]: indexes a FHIR SearchParameter bundle into per-resource
//!   [`SearchParameterImpl`]s, choosing a column, token-column, or
//!   lookup-table indexing strategy for each.
//! - [`schema`]: projects the registry into PostgreSQL DDL (main, history,
//!   references, and lookup tables plus indexes), idempotent throughout.
//! - [`compiler`]: compiles parsed search parameters into a SQL WHERE
//!   fragment with `$n` parameter binding, including chained search.

mod bind;
pub mod clauses;
pub mod compiler;
pub mod error;
pub mod params;
pub mod registry;
pub mod schema;

pub use bind::BindValue;
pub use compiler::{compile_where, CompiledWhere};
pub use error::{Error, Result};
pub use params::{parse_parameter, ChainedParam, ParsedParam, SearchModifier, SearchPrefix, SearchValue};
pub use registry::{
    expression_path, ColumnType, IndexStrategy, LookupTable, SearchParamType,
    SearchParameterImpl, SearchParameterRegistry,
};
pub use schema::SchemaBuilder;
