//! Schema builder / DDL emitter
//!
//! Projects the search-parameter registry into PostgreSQL DDL: per resource
//! type a main table with fixed and search columns, an append-only history
//! table, and a references table; plus the four shared lookup tables. All
//! statements are idempotent (`IF NOT EXISTS`); tables are emitted before
//! indexes and no table or index name is emitted twice.

use crate::registry::{IndexStrategy, LookupTable, SearchParameterRegistry};
use std::collections::HashSet;

/// Emits DDL for a set of resource types against a registry.
pub struct SchemaBuilder<'a> {
    registry: &'a SearchParameterRegistry,
}

impl<'a> SchemaBuilder<'a> {
    pub fn new(registry: &'a SearchParameterRegistry) -> Self {
        Self { registry }
    }

    /// All DDL statements for the given resource types, tables first.
    pub fn build_ddl(&self, resource_types: &[&str]) -> Vec<String> {
        let mut tables = Vec::new();
        let mut indexes = Vec::new();
        let mut seen_tables = HashSet::new();
        let mut seen_indexes = HashSet::new();

        for resource_type in resource_types {
            self.resource_tables(resource_type, &mut tables, &mut seen_tables);
            self.resource_indexes(resource_type, &mut indexes, &mut seen_indexes);
        }
        for lookup in [
            LookupTable::HumanName,
            LookupTable::Address,
            LookupTable::ContactPoint,
            LookupTable::Identifier,
        ] {
            lookup_table_ddl(lookup, &mut tables, &mut seen_tables);
            lookup_table_indexes(lookup, &mut indexes, &mut seen_indexes);
        }

        tables.extend(indexes);
        tables
    }

    fn resource_tables(
        &self,
        resource_type: &str,
        out: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) {
        if !seen.insert(resource_type.to_string()) {
            return;
        }
        seen.insert(format!("{}_History", resource_type));
        seen.insert(format!("{}_References", resource_type));

        let mut columns: Vec<String> = vec![
            "\"id\" UUID PRIMARY KEY".to_string(),
            "\"content\" TEXT NOT NULL".to_string(),
            "\"lastUpdated\" TIMESTAMPTZ NOT NULL".to_string(),
            "\"deleted\" BOOLEAN NOT NULL DEFAULT FALSE".to_string(),
            "\"projectId\" UUID".to_string(),
            "\"__version\" INTEGER".to_string(),
        ];
        // Binary resources have no compartment membership
        if resource_type != "Binary" {
            columns.push("\"compartments\" UUID[]".to_string());
        }
        columns.push("\"___tagText\" TEXT[]".to_string());
        columns.push("\"___securityText\" TEXT[]".to_string());
        columns.push("\"_profile\" TEXT[]".to_string());
        columns.push("\"_source\" TEXT".to_string());

        let mut seen_columns: HashSet<String> = HashSet::new();
        for impl_ in self.registry.iterate(resource_type) {
            match impl_.strategy {
                IndexStrategy::Column => {
                    if seen_columns.insert(impl_.column_name.clone()) {
                        columns.push(format!(
                            "\"{}\" {}",
                            impl_.column_name,
                            impl_.column_type.sql()
                        ));
                    }
                }
                IndexStrategy::TokenColumn => {
                    if seen_columns.insert(impl_.column_name.clone()) {
                        columns.push(format!("\"{}\" UUID[]", impl_.token_column()));
                        columns.push(format!("\"{}\" TEXT[]", impl_.token_text_column()));
                        columns.push(format!("\"{}\" TEXT", impl_.token_sort_column()));
                    }
                }
                IndexStrategy::LookupTable => {}
            }
        }

        out.push(format!(
            "CREATE TABLE IF NOT EXISTS \"{}\" ({})",
            resource_type,
            columns.join(", ")
        ));
        out.push(format!(
            "CREATE TABLE IF NOT EXISTS \"{}_History\" (\"id\" UUID NOT NULL, \"versionId\" UUID NOT NULL, \"lastUpdated\" TIMESTAMPTZ NOT NULL, \"content\" TEXT NOT NULL)",
            resource_type
        ));
        out.push(format!(
            "CREATE TABLE IF NOT EXISTS \"{}_References\" (\"resourceId\" UUID NOT NULL, \"targetId\" UUID NOT NULL, \"code\" TEXT NOT NULL, \"targetType\" TEXT, PRIMARY KEY (\"resourceId\", \"targetId\", \"code\"))",
            resource_type
        ));
    }

    fn resource_indexes(
        &self,
        resource_type: &str,
        out: &mut Vec<String>,
        seen: &mut HashSet<String>,
    ) {
        let mut push = |name: String, sql: String| {
            if seen.insert(name) {
                out.push(sql);
            }
        };

        let btree = |column: &str| {
            (
                format!("{}_{}_idx", resource_type, column),
                format!(
                    "CREATE INDEX IF NOT EXISTS \"{0}_{1}_idx\" ON \"{0}\" (\"{1}\")",
                    resource_type, column
                ),
            )
        };
        for column in ["id", "deleted", "lastUpdated", "projectId"] {
            let (name, sql) = btree(column);
            push(name, sql);
        }
        if resource_type != "Binary" {
            push(
                format!("{}_compartments_idx", resource_type),
                format!(
                    "CREATE INDEX IF NOT EXISTS \"{0}_compartments_idx\" ON \"{0}\" USING GIN (\"compartments\")",
                    resource_type
                ),
            );
        }
        push(
            format!("{}_History_id_idx", resource_type),
            format!(
                "CREATE INDEX IF NOT EXISTS \"{0}_History_id_idx\" ON \"{0}_History\" (\"id\")",
                resource_type
            ),
        );
        push(
            format!("{}_History_lastUpdated_idx", resource_type),
            format!(
                "CREATE INDEX IF NOT EXISTS \"{0}_History_lastUpdated_idx\" ON \"{0}_History\" (\"lastUpdated\")",
                resource_type
            ),
        );
        push(
            format!("{}_References_targetId_idx", resource_type),
            format!(
                "CREATE INDEX IF NOT EXISTS \"{0}_References_targetId_idx\" ON \"{0}_References\" (\"targetId\")",
                resource_type
            ),
        );

        for impl_ in self.registry.iterate(resource_type) {
            match impl_.strategy {
                IndexStrategy::Column => {
                    let (name, sql) = if impl_.array {
                        (
                            format!("{}_{}_idx", resource_type, impl_.column_name),
                            format!(
                                "CREATE INDEX IF NOT EXISTS \"{0}_{1}_idx\" ON \"{0}\" USING GIN (\"{1}\")",
                                resource_type, impl_.column_name
                            ),
                        )
                    } else {
                        btree(&impl_.column_name)
                    };
                    push(name, sql);
                }
                IndexStrategy::TokenColumn => {
                    let column = impl_.token_text_column();
                    push(
                        format!("{}_{}_idx", resource_type, column),
                        format!(
                            "CREATE INDEX IF NOT EXISTS \"{0}_{1}_idx\" ON \"{0}\" USING GIN (\"{1}\")",
                            resource_type, column
                        ),
                    );
                }
                IndexStrategy::LookupTable => {}
            }
        }
    }
}

fn lookup_table_ddl(table: LookupTable, out: &mut Vec<String>, seen: &mut HashSet<String>) {
    if !seen.insert(table.table_name().to_string()) {
        return;
    }
    let value_columns = match table {
        LookupTable::HumanName => "\"name\" TEXT, \"given\" TEXT, \"family\" TEXT",
        LookupTable::Address => {
            "\"address\" TEXT, \"city\" TEXT, \"country\" TEXT, \"postalCode\" TEXT, \"state\" TEXT, \"use\" TEXT"
        }
        LookupTable::ContactPoint => "\"system\" TEXT, \"value\" TEXT",
        LookupTable::Identifier => "\"system\" TEXT, \"value\" TEXT",
    };
    out.push(format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" (\"resourceId\" UUID NOT NULL, \"resourceType\" TEXT NOT NULL, {})",
        table.table_name(),
        value_columns
    ));
}

fn lookup_table_indexes(table: LookupTable, out: &mut Vec<String>, seen: &mut HashSet<String>) {
    let name = format!("{}_resourceId_idx", table.table_name());
    if seen.insert(name) {
        out.push(format!(
            "CREATE INDEX IF NOT EXISTS \"{0}_resourceId_idx\" ON \"{0}\" (\"resourceId\")",
            table.table_name()
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::SearchParameterRegistry;
    use serde_json::json;

    fn registry() -> SearchParameterRegistry {
        SearchParameterRegistry::from_bundle(&json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "SearchParameter", "code": "birthdate",
                    "type": "date", "expression": "Patient.birthDate", "base": ["Patient"]}},
                {"resource": {"resourceType": "SearchParameter", "code": "gender",
                    "type": "token", "expression": "Patient.gender", "base": ["Patient"]}},
                {"resource": {"resourceType": "SearchParameter", "code": "name",
                    "type": "string", "expression": "Patient.name", "base": ["Patient"]}}
            ]
        }))
        .unwrap()
    }

    #[test]
    fn all_statements_are_idempotent() {
        let registry = registry();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient"]);
        assert!(!ddl.is_empty());
        for stmt in &ddl {
            assert!(stmt.contains("IF NOT EXISTS"), "not idempotent: {}", stmt);
        }
    }

    #[test]
    fn tables_come_before_indexes() {
        let registry = registry();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient", "Observation"]);
        let first_index = ddl.iter().position(|s| s.starts_with("CREATE INDEX")).unwrap();
        assert!(ddl[..first_index].iter().all(|s| s.starts_with("CREATE TABLE")));
        assert!(ddl[first_index..].iter().all(|s| s.starts_with("CREATE INDEX")));
    }

    #[test]
    fn main_table_has_fixed_and_search_columns() {
        let registry = registry();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient"]);
        let main = ddl.iter().find(|s| s.starts_with("CREATE TABLE IF NOT EXISTS \"Patient\" ")).unwrap();
        for column in [
            "\"id\" UUID PRIMARY KEY",
            "\"content\" TEXT NOT NULL",
            "\"lastUpdated\" TIMESTAMPTZ NOT NULL",
            "\"deleted\" BOOLEAN",
            "\"projectId\" UUID",
            "\"__version\" INTEGER",
            "\"compartments\" UUID[]",
            "\"___tagText\" TEXT[]",
            "\"___securityText\" TEXT[]",
            "\"_profile\" TEXT[]",
            "\"_source\" TEXT",
            "\"birthdate\" TIMESTAMPTZ",
            "\"__gender\" UUID[]",
            "\"__genderText\" TEXT[]",
            "\"__genderSort\" TEXT",
        ] {
            assert!(main.contains(column), "missing column {} in {}", column, main);
        }
        // The lookup-table name parameter adds no column
        assert!(!main.contains("\"name\" TEXT"));
    }

    #[test]
    fn binary_has_no_compartments() {
        let registry = SearchParameterRegistry::new();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Binary"]);
        let main = ddl.iter().find(|s| s.contains("\"Binary\" (")).unwrap();
        assert!(!main.contains("compartments"));
    }

    #[test]
    fn history_table_has_exactly_four_columns() {
        let registry = SearchParameterRegistry::new();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient"]);
        let history = ddl.iter().find(|s| s.contains("\"Patient_History\"")).unwrap();
        assert_eq!(history.matches("UUID").count(), 2);
        assert!(history.contains("\"id\" UUID"));
        assert!(history.contains("\"versionId\" UUID"));
        assert!(history.contains("\"lastUpdated\" TIMESTAMPTZ"));
        assert!(history.contains("\"content\" TEXT"));
        assert!(!history.contains("PRIMARY KEY"));
    }

    #[test]
    fn references_table_has_composite_primary_key() {
        let registry = SearchParameterRegistry::new();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient"]);
        let refs = ddl.iter().find(|s| s.contains("\"Patient_References\"")).unwrap();
        assert!(refs.contains("PRIMARY KEY (\"resourceId\", \"targetId\", \"code\")"));
    }

    #[test]
    fn no_duplicate_table_or_index_names() {
        let registry = registry();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient", "Patient", "Observation"]);
        let mut names = HashSet::new();
        for stmt in &ddl {
            let name = stmt
                .split('"')
                .nth(1)
                .unwrap_or_default()
                .to_string();
            assert!(names.insert(format!("{}:{}", stmt.starts_with("CREATE TABLE"), name)),
                "duplicate statement for {}", name);
        }
    }

    #[test]
    fn lookup_tables_are_emitted_once_with_resource_keys() {
        let registry = registry();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient", "Practitioner"]);
        let human_names: Vec<&String> = ddl
            .iter()
            .filter(|s| s.starts_with("CREATE TABLE IF NOT EXISTS \"HumanName\""))
            .collect();
        assert_eq!(human_names.len(), 1);
        assert!(human_names[0].contains("\"resourceId\" UUID NOT NULL"));
        assert!(human_names[0].contains("\"resourceType\" TEXT NOT NULL"));
        assert!(human_names[0].contains("\"family\" TEXT"));
    }

    #[test]
    fn fixed_index_count_meets_minimum() {
        let registry = SearchParameterRegistry::new();
        let ddl = SchemaBuilder::new(&registry).build_ddl(&["Patient"]);
        let patient_indexes = ddl
            .iter()
            .filter(|s| s.starts_with("CREATE INDEX") && s.contains("Patient"))
            .count();
        assert!(patient_indexes >= 7, "expected >= 7 indexes, got {}", patient_indexes);
    }
}
