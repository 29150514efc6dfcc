//! Named queries loaded from a JSON configuration.
//!
//! A configuration declares tables, indexes and the queries callers may run.
//! Everything is validated when the registry is prepared, so a bad query
//! definition never surfaces as a query-time failure.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::query::JoinSpec;
use crate::schema::{Catalog, IndexDef, TableDef};

/// Default per-query result cap.
pub const DEFAULT_MAX_RESULTS: u32 = 100;

/// Schema plus query definitions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// Table definitions.
    #[serde(default)]
    pub tables: Vec<TableDef>,
    /// Index definitions.
    #[serde(default)]
    pub indexes: Vec<IndexDef>,
    /// Query definitions.
    #[serde(default)]
    pub queries: Vec<QueryDef>,
}

impl QueryConfig {
    /// Parse a configuration from JSON text.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(json)?)
    }

    /// Read and parse a configuration file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Error> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }
}

fn default_true() -> bool {
    true
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

/// A named range query over one index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryDef {
    /// Query name callers use.
    pub name: String,
    /// Index the query walks.
    pub index: String,
    /// Clamp the snapshot to the database head block.
    #[serde(default = "default_true")]
    pub limit_block_index: bool,
    /// Upper bound on rows per page, whatever the caller asks for.
    #[serde(default = "default_max_results")]
    pub max_results: u32,
    /// Optional join against another table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub join: Option<JoinDef>,
}

impl QueryDef {
    /// Create a query with default settings.
    pub fn new(name: impl Into<String>, index: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index: index.into(),
            limit_block_index: true,
            max_results: DEFAULT_MAX_RESULTS,
            join: None,
        }
    }

    /// Set the result cap.
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Set whether the snapshot is clamped to the head block.
    pub fn with_limit_block_index(mut self, limit: bool) -> Self {
        self.limit_block_index = limit;
        self
    }

    /// Attach a join.
    pub fn with_join(mut self, join: JoinDef) -> Self {
        self.join = Some(join);
        self
    }
}

/// Join configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinDef {
    /// Secondary table.
    pub table: String,
    /// Primary fields forming the secondary identity key, in key order.
    pub key_values: Vec<String>,
    /// Secondary fields to splice in.
    #[serde(default)]
    pub fields: Vec<JoinField>,
}

impl JoinDef {
    /// Create a join with no selected fields.
    pub fn new(table: impl Into<String>, key_values: Vec<String>) -> Self {
        Self {
            table: table.into(),
            key_values,
            fields: vec![],
        }
    }

    /// Select a field, optionally renamed.
    pub fn with_field(mut self, name: impl Into<String>, new_name: Option<&str>) -> Self {
        self.fields.push(JoinField {
            name: name.into(),
            new_name: new_name.map(str::to_string),
        });
        self
    }
}

/// A secondary field selected by a join.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JoinField {
    /// Field in the secondary table.
    pub name: String,
    /// Output label; defaults to `name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_name: Option<String>,
}

/// A validated query, ready to run.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedQuery {
    /// Query definition.
    pub def: QueryDef,
    /// Primary table.
    pub table: String,
    /// Output columns: table fields in declaration order, then join labels.
    pub columns: Vec<String>,
    /// Validated join.
    pub join: Option<JoinSpec>,
}

/// Prepared queries by name.
#[derive(Debug, Clone, Default)]
pub struct QueryRegistry {
    queries: HashMap<String, PreparedQuery>,
}

impl QueryRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate query definitions against a catalog.
    pub fn prepare(catalog: &Catalog, queries: &[QueryDef]) -> Result<Self, Error> {
        let mut registry = Self::new();
        for def in queries {
            let prepared = prepare_query(catalog, def)?;
            if registry.queries.contains_key(&def.name) {
                return Err(Error::Config(format!("duplicate query {}", def.name)));
            }
            registry.queries.insert(def.name.clone(), prepared);
        }
        Ok(registry)
    }

    /// Look up a prepared query.
    pub fn get(&self, name: &str) -> Result<&PreparedQuery, Error> {
        self.queries
            .get(name)
            .ok_or_else(|| Error::UnknownQuery(name.to_string()))
    }

    /// Registered query names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.queries.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of registered queries.
    pub fn len(&self) -> usize {
        self.queries.len()
    }

    /// Check if no query is registered.
    pub fn is_empty(&self) -> bool {
        self.queries.is_empty()
    }
}

fn prepare_query(catalog: &Catalog, def: &QueryDef) -> Result<PreparedQuery, Error> {
    let index = catalog
        .index(&def.index)
        .map_err(|_| Error::Config(format!("query {}: unknown index {}", def.name, def.index)))?;
    let table = catalog.table(&index.table)?;

    let join = match &def.join {
        Some(join) => {
            let secondary = catalog.table(&join.table).map_err(|_| {
                Error::Config(format!("query {}: unknown join table {}", def.name, join.table))
            })?;
            let fields: Vec<(String, Option<String>)> = join
                .fields
                .iter()
                .map(|f| (f.name.clone(), f.new_name.clone()))
                .collect();
            Some(JoinSpec::new(table, secondary, &join.key_values, &fields)?)
        }
        None => None,
    };

    let mut columns = table.field_names();
    if let Some(join) = &join {
        columns.extend(join.labels().map(str::to_string));
    }
    let mut seen = HashSet::new();
    for column in &columns {
        if !seen.insert(column.as_str()) {
            return Err(Error::Config(format!(
                "query {}: duplicate output column {}",
                def.name, column
            )));
        }
    }

    Ok(PreparedQuery {
        def: def.clone(),
        table: table.name.clone(),
        columns,
        join,
    })
}
