//! Search-parameter registry
//!
//! Indexes a FHIR SearchParameter bundle. Each (resource type, code) pair
//! maps to a [`SearchParameterImpl`] describing how the parameter is
//! materialized: a typed column, the dual UUID/text token arrays, or a row
//! in one of the shared lookup tables for repeating complex types.

use crate::error::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// Search parameter type (FHIR SearchParameter.type)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchParamType {
    String,
    Number,
    Date,
    Token,
    Reference,
    Quantity,
    Uri,
    Composite,
    Special,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseSearchParamTypeError;

impl FromStr for SearchParamType {
    type Err = ParseSearchParamTypeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "date" => Ok(Self::Date),
            "token" => Ok(Self::Token),
            "reference" => Ok(Self::Reference),
            "quantity" => Ok(Self::Quantity),
            "uri" => Ok(Self::Uri),
            "composite" => Ok(Self::Composite),
            "special" => Ok(Self::Special),
            _ => Err(ParseSearchParamTypeError),
        }
    }
}

/// SQL column type for a materialized parameter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Uuid,
    UuidArray,
    Text,
    TextArray,
    TimestampTz,
    DoublePrecision,
}

impl ColumnType {
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Uuid => "UUID",
            Self::UuidArray => "UUID[]",
            Self::Text => "TEXT",
            Self::TextArray => "TEXT[]",
            Self::TimestampTz => "TIMESTAMPTZ",
            Self::DoublePrecision => "DOUBLE PRECISION",
        }
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Self::UuidArray | Self::TextArray)
    }
}

/// How a parameter is materialized in the schema
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexStrategy {
    /// A typed scalar or array column on the resource table
    Column,
    /// Dual arrays `__<code>` UUID[] / `__<code>Text` TEXT[] plus
    /// `__<code>Sort` TEXT on the resource table
    TokenColumn,
    /// Rows in a shared lookup table keyed by `resourceId`
    LookupTable,
}

/// Shared lookup tables for repeating complex types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupTable {
    HumanName,
    Address,
    ContactPoint,
    Identifier,
}

impl LookupTable {
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::HumanName => "HumanName",
            Self::Address => "Address",
            Self::ContactPoint => "ContactPoint",
            Self::Identifier => "Identifier",
        }
    }

    /// Column searched when the parameter targets the repeating element
    /// itself rather than one of its parts.
    pub fn default_column(&self) -> &'static str {
        match self {
            Self::HumanName => "name",
            Self::Address => "address",
            Self::ContactPoint => "value",
            Self::Identifier => "value",
        }
    }

    fn for_property(property: &str) -> Option<Self> {
        match property {
            "name" => Some(Self::HumanName),
            "address" => Some(Self::Address),
            "telecom" => Some(Self::ContactPoint),
            "identifier" => Some(Self::Identifier),
            _ => None,
        }
    }
}

/// A search parameter materialized for one or more resource types.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchParameterImpl {
    pub resource_types: Vec<String>,
    pub code: String,
    pub param_type: SearchParamType,
    pub expression: String,
    pub strategy: IndexStrategy,
    pub column_name: String,
    pub column_type: ColumnType,
    pub array: bool,
    pub lookup_table: Option<LookupTable>,
}

impl SearchParameterImpl {
    /// Token twin-array / sort column names (`__<code>`, `__<code>Text`,
    /// `__<code>Sort`).
    pub fn token_column(&self) -> String {
        format!("__{}", self.column_name)
    }

    pub fn token_text_column(&self) -> String {
        format!("__{}Text", self.column_name)
    }

    pub fn token_sort_column(&self) -> String {
        format!("__{}Sort", self.column_name)
    }
}

/// Registry of search parameters plus the always-available metadata
/// parameters (`_id`, `_lastUpdated`, `_tag`, `_security`, `_profile`,
/// `_source`).
#[derive(Debug, Default)]
pub struct SearchParameterRegistry {
    by_resource: HashMap<String, Vec<SearchParameterImpl>>,
    metadata: HashMap<String, SearchParameterImpl>,
}

/// `address-city` -> `addressCity`
fn column_name_for_code(code: &str) -> String {
    let mut out = String::with_capacity(code.len());
    let mut upper_next = false;
    for c in code.chars() {
        if c == '-' || c == '_' {
            upper_next = true;
        } else if upper_next {
            out.push(c.to_ascii_uppercase());
            upper_next = false;
        } else {
            out.push(c);
        }
    }
    out
}

/// Reduce one FHIRPath expression alternative to its dotted property
/// segments, dropping the resource-type head and any function tail
/// (`.where(...)`, `.as(...)`, `.exists()`).
fn expression_segments(resource_type: &str, alternative: &str) -> Option<Vec<String>> {
    let trimmed = alternative.trim().trim_start_matches('(').trim_end_matches(')');
    let rest = trimmed.strip_prefix(resource_type)?;
    let rest = rest.strip_prefix('.')?;

    let mut segments = Vec::new();
    for part in rest.split('.') {
        // Stop at function invocations
        if part.contains('(') {
            break;
        }
        // `value as Quantity` style choice accessors keep the stem
        let clean = part.trim();
        if let Some((head, _)) = clean.split_once(' ') {
            if !head.is_empty() {
                segments.push(head.to_string());
            }
            break;
        }
        if clean.is_empty() {
            break;
        }
        segments.push(clean.to_string());
    }
    if segments.is_empty() {
        None
    } else {
        Some(segments)
    }
}

/// First dotted property path of `expression` that applies to
/// `resource_type` (used for both strategy selection and value extraction).
pub fn expression_path(resource_type: &str, expression: &str) -> Option<Vec<String>> {
    applicable_alternatives(resource_type, expression).into_iter().next()
}

/// The alternatives of a union expression that apply to `resource_type`.
fn applicable_alternatives(resource_type: &str, expression: &str) -> Vec<Vec<String>> {
    expression
        .split('|')
        .filter_map(|alt| expression_segments(resource_type, alt))
        .collect()
}

fn build_impl(
    resource_types: Vec<String>,
    resource_type: &str,
    code: &str,
    param_type: SearchParamType,
    expression: &str,
) -> Option<SearchParameterImpl> {
    let alternatives = applicable_alternatives(resource_type, expression);
    if alternatives.is_empty() {
        tracing::warn!(
            code,
            resource_type,
            expression,
            "skipping search parameter with unresolvable expression"
        );
        return None;
    }

    let segments = &alternatives[0];
    let lookup = segments.iter().find_map(|s| LookupTable::for_property(s));

    let (strategy, column_name, column_type, array, lookup_table) = match lookup {
        Some(table) => {
            let terminal = segments.last().map(String::as_str).unwrap_or_default();
            let column = if LookupTable::for_property(terminal).is_some() {
                table.default_column().to_string()
            } else {
                terminal.to_string()
            };
            (
                IndexStrategy::LookupTable,
                column,
                ColumnType::Text,
                false,
                Some(table),
            )
        }
        None if param_type == SearchParamType::Token => (
            IndexStrategy::TokenColumn,
            column_name_for_code(code),
            ColumnType::UuidArray,
            true,
            None,
        ),
        None => {
            let column_type = match param_type {
                SearchParamType::Date => ColumnType::TimestampTz,
                SearchParamType::Number | SearchParamType::Quantity => ColumnType::DoublePrecision,
                _ => {
                    if alternatives.len() > 1 {
                        ColumnType::TextArray
                    } else {
                        ColumnType::Text
                    }
                }
            };
            (
                IndexStrategy::Column,
                column_name_for_code(code),
                column_type,
                column_type.is_array(),
                None,
            )
        }
    };

    Some(SearchParameterImpl {
        resource_types,
        code: code.to_string(),
        param_type,
        expression: expression.to_string(),
        strategy,
        column_name,
        column_type,
        array,
        lookup_table,
    })
}

fn metadata_params() -> HashMap<String, SearchParameterImpl> {
    let mut out = HashMap::new();
    let mut insert = |code: &str,
                      param_type: SearchParamType,
                      strategy: IndexStrategy,
                      column_name: &str,
                      column_type: ColumnType| {
        out.insert(
            code.to_string(),
            SearchParameterImpl {
                resource_types: Vec::new(),
                code: code.to_string(),
                param_type,
                expression: String::new(),
                strategy,
                column_name: column_name.to_string(),
                column_type,
                array: column_type.is_array(),
                lookup_table: None,
            },
        );
    };

    insert("_id", SearchParamType::Token, IndexStrategy::Column, "id", ColumnType::Uuid);
    insert(
        "_lastUpdated",
        SearchParamType::Date,
        IndexStrategy::Column,
        "lastUpdated",
        ColumnType::TimestampTz,
    );
    insert(
        "_tag",
        SearchParamType::Token,
        IndexStrategy::TokenColumn,
        "_tag",
        ColumnType::UuidArray,
    );
    insert(
        "_security",
        SearchParamType::Token,
        IndexStrategy::TokenColumn,
        "_security",
        ColumnType::UuidArray,
    );
    insert(
        "_profile",
        SearchParamType::Uri,
        IndexStrategy::Column,
        "_profile",
        ColumnType::TextArray,
    );
    insert(
        "_source",
        SearchParamType::Uri,
        IndexStrategy::Column,
        "_source",
        ColumnType::Text,
    );
    out
}

impl SearchParameterRegistry {
    pub fn new() -> Self {
        Self {
            by_resource: HashMap::new(),
            metadata: metadata_params(),
        }
    }

    /// Index a FHIR Bundle of SearchParameter resources.
    pub fn from_bundle(bundle: &Value) -> Result<Self> {
        let entries = bundle
            .get("entry")
            .and_then(Value::as_array)
            .ok_or_else(|| Error::InvalidBundle("missing entry array".to_string()))?;

        let mut registry = Self::new();
        for entry in entries {
            let Some(resource) = entry.get("resource") else {
                continue;
            };
            if resource.get("resourceType").and_then(Value::as_str) != Some("SearchParameter") {
                continue;
            }
            registry.index_search_parameter(resource)?;
        }
        Ok(registry)
    }

    fn index_search_parameter(&mut self, resource: &Value) -> Result<()> {
        let code = resource
            .get("code")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidBundle("SearchParameter without code".to_string()))?;
        let type_str = resource
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::InvalidBundle(format!("SearchParameter {} without type", code)))?;
        let Ok(param_type) = SearchParamType::from_str(type_str) else {
            return Err(Error::InvalidBundle(format!(
                "SearchParameter {} has unknown type {}",
                code, type_str
            )));
        };
        let Some(expression) = resource.get("expression").and_then(Value::as_str) else {
            // Parameters without expressions (e.g. special) cannot be indexed
            tracing::warn!(code, "skipping SearchParameter without expression");
            return Ok(());
        };
        let bases: Vec<String> = resource
            .get("base")
            .and_then(Value::as_array)
            .map(|arr| {
                arr.iter()
                    .filter_map(Value::as_str)
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default();

        for base in &bases {
            if let Some(impl_) = build_impl(bases.clone(), base, code, param_type, expression) {
                self.by_resource.entry(base.clone()).or_default().push(impl_);
            }
        }
        Ok(())
    }

    /// Look up a parameter for a resource type; metadata parameters resolve
    /// for every type without bundle entries.
    pub fn lookup(&self, resource_type: &str, code: &str) -> Option<&SearchParameterImpl> {
        self.by_resource
            .get(resource_type)
            .and_then(|params| params.iter().find(|p| p.code == code))
            .or_else(|| self.metadata.get(code))
    }

    /// All bundle-defined parameters for a resource type.
    pub fn iterate(&self, resource_type: &str) -> impl Iterator<Item = &SearchParameterImpl> {
        self.by_resource
            .get(resource_type)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
            .iter()
    }
}
