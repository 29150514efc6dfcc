//! Benchmark harness helpers.

use histdb_core::storage::StorageConfig;
use histdb_core::{Database, Error};
use histdb_proto::{QueryRequest, Value};

use crate::fixtures::{contract_row_config, generate_history, Scale};

/// A database in a temporary directory, loaded with the benchmark schema.
pub struct TestContext {
    pub db: Database,
    _dir: tempfile::TempDir,
}

impl TestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(StorageConfig::new(dir.path())).unwrap();
        db.load_config(&contract_row_config()).unwrap();
        Self { db, _dir: dir }
    }

    /// Create a context populated with a generated history.
    pub fn with_scale(scale: Scale) -> Self {
        let ctx = Self::new();
        ctx.populate(scale, 7).unwrap();
        ctx
    }

    /// Append a generated history. Duplicate-key collisions inside a block
    /// are skipped.
    pub fn populate(&self, scale: Scale, seed: u64) -> Result<usize, Error> {
        let mut appended = 0;
        for event in generate_history(scale, seed) {
            match self.db.append(event.table, event.fact) {
                Ok(_) => appended += 1,
                Err(Error::StoreInvariant(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(appended)
    }

    /// A request over the whole `eosio.token/accounts` range of a query.
    pub fn full_range(&self, query: &str, max_block_index: u64, max_results: u32) -> QueryRequest {
        QueryRequest::new(query)
            .at_block(max_block_index)
            .with_range(bound(query, "", 0), bound(query, "~", u64::MAX))
            .with_max_results(max_results)
    }
}

/// A bound shaped for `by_pk` or `by_scope`.
pub fn bound(query: &str, scope: &str, primary_key: u64) -> Vec<Value> {
    let mut values = vec![Value::from("eosio.token"), Value::from("accounts")];
    if query == "by_pk" {
        values.extend([Value::UInt64(primary_key), Value::from(scope)]);
    } else {
        values.extend([Value::from(scope), Value::UInt64(primary_key)]);
    }
    values
}

impl Default for TestContext {
    fn default() -> Self {
        Self::new()
    }
}
