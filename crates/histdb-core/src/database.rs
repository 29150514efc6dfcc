//! Database facade: tables, indexes, head block and named queries.

use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::RwLock;
use sled::{Db, Tree};
use tracing::{debug, info};

use crate::error::Error;
use crate::query::{JoinResolver, QueryExecutor};
use crate::registry::{QueryConfig, QueryRegistry};
use crate::schema::{Catalog, IndexDef, TableDef};
use crate::storage::{AppendOutcome, Fact, FactStore, IndexHandle, StorageConfig};
use histdb_proto::{QueryRequest, QueryResponse, Row, Value};

/// Meta tree holding database-wide values.
const META_TREE: &str = "meta";

/// Meta key of the head block.
const HEAD_BLOCK_KEY: &[u8] = b"head_block";

/// A block-versioned fact database.
pub struct Database {
    db: Db,
    meta: Tree,
    catalog: RwLock<Catalog>,
    stores: DashMap<String, Arc<FactStore>>,
    registry: RwLock<Arc<QueryRegistry>>,
}

impl Database {
    /// Open a database with the given storage configuration.
    pub fn open(config: StorageConfig) -> Result<Self, Error> {
        let db = config.to_sled_config().open()?;
        let meta = db.open_tree(META_TREE)?;
        let database = Self {
            db,
            meta,
            catalog: RwLock::new(Catalog::new()),
            stores: DashMap::new(),
            registry: RwLock::new(Arc::new(QueryRegistry::new())),
        };

        let head_block = database.head_block()?;
        info!(
            path = %config.path.display(),
            temporary = config.temporary,
            head_block,
            "opened database"
        );
        Ok(database)
    }

    /// Register a table, opening its fact store.
    pub fn register_table(&self, table: TableDef) -> Result<Arc<FactStore>, Error> {
        self.catalog.write().add_table(table.clone())?;
        if let Some(store) = self.stores.get(&table.name) {
            return Ok(store.value().clone());
        }
        let name = table.name.clone();
        let store = Arc::new(FactStore::open(&self.db, table)?);
        Ok(self.stores.entry(name).or_insert(store).value().clone())
    }

    /// Register an index on a registered table.
    pub fn register_index(&self, index: IndexDef) -> Result<IndexHandle, Error> {
        self.catalog.write().add_index(index.clone())?;
        self.store(&index.table)?.register_index(&self.db, &index)
    }

    /// Fact store of a table.
    pub fn store(&self, table: &str) -> Result<Arc<FactStore>, Error> {
        self.stores
            .get(table)
            .map(|s| s.value().clone())
            .ok_or_else(|| Error::UnknownTable(table.to_string()))
    }

    /// Snapshot of the catalog.
    pub fn catalog(&self) -> Catalog {
        self.catalog.read().clone()
    }

    /// Register the schema of a configuration and install its queries.
    ///
    /// Queries are validated before any of them becomes visible; on error the
    /// previous query set stays installed.
    pub fn load_config(&self, config: &QueryConfig) -> Result<(), Error> {
        for table in &config.tables {
            self.register_table(table.clone())?;
        }
        for index in &config.indexes {
            self.register_index(index.clone())?;
        }

        let registry = QueryRegistry::prepare(&self.catalog.read(), &config.queries)?;
        info!(
            tables = config.tables.len(),
            indexes = config.indexes.len(),
            queries = registry.len(),
            "loaded query config"
        );
        *self.registry.write() = Arc::new(registry);
        Ok(())
    }

    /// Currently installed queries.
    pub fn registry(&self) -> Arc<QueryRegistry> {
        self.registry.read().clone()
    }

    /// Append a fact and advance the head block past it.
    pub fn append(&self, table: &str, fact: Fact) -> Result<AppendOutcome, Error> {
        let block_index = fact.block_index;
        let outcome = self.store(table)?.append(fact)?;
        self.advance_head_block(block_index)?;
        Ok(outcome)
    }

    /// Highest block seen by ingestion, or 0.
    pub fn head_block(&self) -> Result<u64, Error> {
        match self.meta.get(HEAD_BLOCK_KEY)? {
            Some(bytes) => decode_block(&bytes),
            None => Ok(0),
        }
    }

    /// Overwrite the head block.
    pub fn set_head_block(&self, block_index: u64) -> Result<(), Error> {
        self.meta
            .insert(HEAD_BLOCK_KEY, block_index.to_be_bytes().to_vec())?;
        Ok(())
    }

    fn advance_head_block(&self, block_index: u64) -> Result<(), Error> {
        self.meta.fetch_and_update(HEAD_BLOCK_KEY, |old| {
            let current = old.and_then(|b| decode_block(b).ok()).unwrap_or(0);
            Some(current.max(block_index).to_be_bytes().to_vec())
        })?;
        Ok(())
    }

    /// Run a named query.
    pub fn query(&self, request: &QueryRequest) -> Result<QueryResponse, Error> {
        let registry = self.registry();
        let prepared = registry.get(&request.query)?;
        let store = self.store(&prepared.table)?;
        let index = store.index(&prepared.def.index)?;

        let max_block_index = if prepared.def.limit_block_index {
            request.max_block_index.min(self.head_block()?)
        } else {
            u64::MAX
        };
        let max_results = request.max_results.min(prepared.def.max_results);

        let secondary = match &prepared.join {
            Some(join) => Some(self.store(join.table())?),
            None => None,
        };
        let mut executor = QueryExecutor::new(&store, index);
        if let (Some(join), Some(secondary)) = (&prepared.join, &secondary) {
            executor = executor.with_join(JoinResolver::new(join, secondary));
        }

        let page = executor.execute(&request.first, &request.last, max_block_index, max_results)?;
        debug!(
            query = %request.query,
            max_block_index,
            max_results,
            rows = page.rows.len(),
            "query complete"
        );

        let rows = page
            .rows
            .into_iter()
            .map(|r| Row::new(r.block_index, r.present, r.values))
            .collect();
        Ok(QueryResponse::new(prepared.columns.clone(), rows, page.more))
    }

    /// Convert a JSON array into a bound for a named query.
    ///
    /// Elements are read with the types of the query index's sort keys.
    pub fn bound_from_json(
        &self,
        query: &str,
        json: &serde_json::Value,
    ) -> Result<Vec<Value>, Error> {
        let registry = self.registry();
        let prepared = registry.get(query)?;
        let catalog = self.catalog.read();
        let index = catalog.index(&prepared.def.index)?;
        let table = catalog.table(&index.table)?;

        let elements = json.as_array().ok_or_else(|| {
            Error::ContractViolation(format!("query {}: bound must be a JSON array", query))
        })?;
        if elements.len() != index.sort_keys.len() {
            return Err(Error::ContractViolation(format!(
                "query {}: bound has {} values, expected {}",
                query,
                elements.len(),
                index.sort_keys.len()
            )));
        }

        index
            .sort_keys
            .iter()
            .zip(elements)
            .map(|(key, element)| {
                let field = table.field(&key.field).ok_or_else(|| {
                    Error::Config(format!("table {}: unknown field {}", table.name, key.field))
                })?;
                field.field_type.value_from_json(element)
            })
            .collect()
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), Error> {
        for store in self.stores.iter() {
            store.flush()?;
        }
        self.db.flush()?;
        Ok(())
    }
}

fn decode_block(bytes: &[u8]) -> Result<u64, Error> {
    let array: [u8; 8] = bytes
        .try_into()
        .map_err(|_| Error::Deserialization("head block".into()))?;
    Ok(u64::from_be_bytes(array))
}
