//! JSON-lines fact ingestion.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use histdb_core::schema::TableDef;
use histdb_core::storage::{AppendOutcome, Fact, FactStore};
use histdb_core::Database;
use serde::Deserialize;
use tracing::debug;

use crate::error::CliError;

/// One input line.
#[derive(Debug, Deserialize)]
pub struct FactRecord {
    /// Target table.
    pub table: String,
    /// Block of this version.
    pub block_index: u64,
    /// False for a tombstone.
    #[serde(default = "default_present")]
    pub present: bool,
    /// Field values by name. Tombstones need only the identity fields.
    #[serde(default)]
    pub fields: serde_json::Map<String, serde_json::Value>,
}

fn default_present() -> bool {
    true
}

/// Counts from one ingest run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Non-empty lines read.
    pub lines: usize,
    /// Versions stored.
    pub appended: usize,
    /// Exact replays of stored versions.
    pub unchanged: usize,
}

/// Convert one record to a fact using the table schema.
pub fn to_fact(table: &TableDef, record: FactRecord) -> Result<Fact, CliError> {
    let (identity, payload) = table.values_from_json(&record.fields)?;
    Ok(if record.present {
        Fact::live(identity, record.block_index, payload)
    } else {
        Fact::tombstone(identity, record.block_index)
    })
}

/// Append every record in a reader. Stops at the first failing line.
pub fn ingest(db: &Database, reader: impl BufRead) -> Result<IngestStats, CliError> {
    let mut stats = IngestStats::default();
    let mut stores = HashMap::new();

    for (i, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        stats.lines += 1;

        let outcome = ingest_line(db, &mut stores, line).map_err(|e| CliError::Line {
            line: i + 1,
            source: Box::new(e),
        })?;
        match outcome {
            AppendOutcome::Appended => stats.appended += 1,
            AppendOutcome::Unchanged => stats.unchanged += 1,
        }
    }

    Ok(stats)
}

fn ingest_line(
    db: &Database,
    stores: &mut HashMap<String, Arc<FactStore>>,
    line: &str,
) -> Result<AppendOutcome, CliError> {
    let record: FactRecord = serde_json::from_str(line)?;
    let store = match stores.get(&record.table) {
        Some(store) => Arc::clone(store),
        None => {
            let store = db.store(&record.table)?;
            stores.insert(record.table.clone(), Arc::clone(&store));
            store
        }
    };
    let table = record.table.clone();
    let fact = to_fact(store.table(), record)?;
    debug!(table = %table, block_index = fact.block_index, "ingesting fact");
    Ok(db.append(&table, fact)?)
}

/// Append every record in a file.
pub fn ingest_file(db: &Database, path: &Path) -> Result<IngestStats, CliError> {
    let file = File::open(path)?;
    ingest(db, BufReader::new(file))
}
