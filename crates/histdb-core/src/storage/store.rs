//! Append-only fact store for one table.

use std::ops::Bound;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use sled::{Db, Tree};
use tracing::{debug, info, warn};

use super::key::{self, decode_version, encode_identity, fact_key, identity_end, snapshot_start};
use super::record::{IndexEntry, StoredFact};
use super::{Fact, FactVersion};
use crate::error::Error;
use crate::schema::{IndexDef, IndexLayout, TableDef};
use histdb_proto::Value;

/// Tree name prefix for fact versions.
const FACT_TREE_PREFIX: &str = "facts:";

/// Tree name prefix for index orderings.
const INDEX_TREE_PREFIX: &str = "index:";

/// Result of an append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new version was stored.
    Appended,
    /// The exact version was already stored; nothing changed.
    Unchanged,
}

/// A registered index: its layout and the tree holding its positions.
///
/// Tree key: encoded projected sort-key tuple. Tree value: [`IndexEntry`].
#[derive(Clone)]
pub struct IndexHandle {
    layout: Arc<IndexLayout>,
    tree: Tree,
}

impl IndexHandle {
    /// Compiled layout of this index.
    pub fn layout(&self) -> &IndexLayout {
        &self.layout
    }

    /// Number of distinct identity keys indexed.
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Check if the index holds no keys.
    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }
}

/// An index position and the identity key stored there.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexedKey {
    /// Encoded index position.
    pub position: Vec<u8>,
    /// Identity key at that position.
    pub identity: Vec<Value>,
}

/// Versioned facts of one table, plus the indexes ordering its keys.
///
/// Facts are keyed by `[identity][version suffix]` (see [`key`]), so all
/// versions of an identity are contiguous and newest first. Facts are never
/// overwritten or removed.
pub struct FactStore {
    table: Arc<TableDef>,
    facts: Tree,
    indexes: DashMap<String, IndexHandle>,
    /// Serializes appends so the monotonicity check and the write are atomic.
    write_lock: Mutex<()>,
}

impl FactStore {
    /// Open (or create) the store for a table.
    pub fn open(db: &Db, table: TableDef) -> Result<Self, Error> {
        table.validate()?;
        let facts = db.open_tree(format!("{}{}", FACT_TREE_PREFIX, table.name))?;
        Ok(Self {
            table: Arc::new(table),
            facts,
            indexes: DashMap::new(),
            write_lock: Mutex::new(()),
        })
    }

    /// Table definition.
    pub fn table(&self) -> &TableDef {
        &self.table
    }

    /// Register an index, building it from existing facts if its tree is empty.
    pub fn register_index(&self, db: &Db, def: &IndexDef) -> Result<IndexHandle, Error> {
        let layout = Arc::new(def.compile(&self.table)?);
        let tree = db.open_tree(format!(
            "{}{}:{}",
            INDEX_TREE_PREFIX, self.table.name, def.name
        ))?;
        let handle = IndexHandle { layout, tree };

        // Hold the writer lock so no append slips between build and registration.
        let _guard = self.write_lock.lock();
        if handle.tree.is_empty() && !self.facts.is_empty() {
            let count = self.build_index(&handle)?;
            info!(table = %self.table.name, index = %def.name, keys = count, "built index");
        }
        self.indexes.insert(def.name.clone(), handle.clone());
        Ok(handle)
    }

    /// Look up a registered index.
    pub fn index(&self, name: &str) -> Result<IndexHandle, Error> {
        self.indexes
            .get(name)
            .map(|h| h.value().clone())
            .ok_or_else(|| Error::UnknownIndex(name.to_string()))
    }

    /// Drop and rebuild an index from the fact tree.
    pub fn rebuild_index(&self, name: &str) -> Result<usize, Error> {
        let handle = self.index(name)?;
        let _guard = self.write_lock.lock();
        handle.tree.clear()?;
        self.build_index(&handle)
    }

    fn build_index(&self, handle: &IndexHandle) -> Result<usize, Error> {
        let mut count = 0;
        let mut last_identity: Option<Vec<u8>> = None;

        for item in self.facts.iter() {
            let (key_bytes, value) = item?;
            let identity_bytes =
                &key_bytes[..key_bytes.len().saturating_sub(key::VERSION_SUFFIX_SIZE)];
            if last_identity.as_deref() == Some(identity_bytes) {
                continue;
            }
            last_identity = Some(identity_bytes.to_vec());

            let stored = StoredFact::from_bytes(&value)?;
            let position = handle.layout.position_of_identity(&stored.identity)?;
            handle
                .tree
                .insert(position, IndexEntry::new(stored.identity).to_bytes()?)?;
            count += 1;
        }

        Ok(count)
    }

    /// Append a new version of a fact.
    ///
    /// Fails with [`Error::StoreInvariant`] if the block is older than the
    /// latest stored version of the same identity, or if the block is already
    /// taken by a different version. Re-appending the latest version exactly
    /// is a no-op.
    pub fn append(&self, fact: Fact) -> Result<AppendOutcome, Error> {
        self.table.check_identity(&fact.identity)?;
        let payload = if fact.present {
            self.table.check_payload(&fact.payload)?;
            fact.payload
        } else {
            Vec::new()
        };

        let identity_bytes = encode_identity(&fact.identity);
        let _guard = self.write_lock.lock();

        if let Some((block_index, present, stored)) = self.latest_raw(&identity_bytes)? {
            if fact.block_index < block_index {
                warn!(
                    table = %self.table.name,
                    block_index = fact.block_index,
                    latest = block_index,
                    "rejected out-of-order append"
                );
                return Err(Error::StoreInvariant(format!(
                    "table {}: block {} precedes latest version at block {}",
                    self.table.name, fact.block_index, block_index
                )));
            }
            if fact.block_index == block_index {
                if present == fact.present && stored.payload == payload {
                    return Ok(AppendOutcome::Unchanged);
                }
                warn!(
                    table = %self.table.name,
                    block_index,
                    "rejected conflicting append"
                );
                return Err(Error::StoreInvariant(format!(
                    "table {}: block {} already holds a different version",
                    self.table.name, block_index
                )));
            }
        }

        // Index positions go in first: a reader may find the key before its
        // version lands, which the scanner treats as not yet visible.
        for handle in self.indexes.iter() {
            let position = handle.layout.position_of_identity(&fact.identity)?;
            if !handle.tree.contains_key(&position)? {
                handle
                    .tree
                    .insert(position, IndexEntry::new(fact.identity.clone()).to_bytes()?)?;
            }
        }

        let key = fact_key(&identity_bytes, fact.block_index, fact.present);
        let record = StoredFact::new(fact.identity, payload);
        self.facts.insert(key, record.to_bytes()?)?;

        debug!(
            table = %self.table.name,
            block_index = fact.block_index,
            present = fact.present,
            "appended fact"
        );
        Ok(AppendOutcome::Appended)
    }

    /// All versions of an identity key, newest first.
    pub fn versions_of(
        &self,
        identity: &[Value],
    ) -> Result<impl Iterator<Item = Result<FactVersion, Error>> + '_, Error> {
        self.table.check_identity(identity)?;
        let identity_bytes = encode_identity(identity);
        let end = identity_end(&identity_bytes);

        Ok(self
            .facts
            .range(identity_bytes..end)
            .map(|item| {
                let (key_bytes, value) = item?;
                decode_fact_version(&key_bytes, &value)
            }))
    }

    /// The newest version with `block_index <= max_block_index`, if any.
    ///
    /// A single seek into the identity's contiguous version run.
    pub fn version_at(
        &self,
        identity: &[Value],
        max_block_index: u64,
    ) -> Result<Option<FactVersion>, Error> {
        self.table.check_identity(identity)?;
        let identity_bytes = encode_identity(identity);
        let start = snapshot_start(&identity_bytes, max_block_index);
        let end = identity_end(&identity_bytes);

        match self.facts.range(start..end).next() {
            Some(item) => {
                let (key_bytes, value) = item?;
                decode_fact_version(&key_bytes, &value).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Index entries at or after `from` (after, if not `inclusive`), up to
    /// and including `to`, in index order.
    pub fn scan<'a>(
        &self,
        index: &'a IndexHandle,
        from: &[u8],
        inclusive: bool,
        to: &[u8],
    ) -> impl Iterator<Item = Result<IndexedKey, Error>> + 'a {
        let lower = if inclusive {
            Bound::Included(from.to_vec())
        } else {
            Bound::Excluded(from.to_vec())
        };
        let upper = Bound::Included(to.to_vec());

        index.tree.range((lower, upper)).map(|item| {
            let (position, value) = item?;
            let entry = IndexEntry::from_bytes(&value)?;
            Ok(IndexedKey {
                position: position.to_vec(),
                identity: entry.identity,
            })
        })
    }

    /// Total number of stored versions.
    pub fn fact_count(&self) -> usize {
        self.facts.len()
    }

    /// Flush pending writes of this store.
    pub fn flush(&self) -> Result<(), Error> {
        self.facts.flush()?;
        for handle in self.indexes.iter() {
            handle.tree.flush()?;
        }
        Ok(())
    }

    fn latest_raw(&self, identity_bytes: &[u8]) -> Result<Option<(u64, bool, StoredFact)>, Error> {
        let end = identity_end(identity_bytes);
        match self.facts.range(identity_bytes.to_vec()..end).next() {
            Some(item) => {
                let (key_bytes, value) = item?;
                let (block_index, present) =
                    decode_version(&key_bytes).ok_or(Error::Deserialization("fact key".into()))?;
                Ok(Some((block_index, present, StoredFact::from_bytes(&value)?)))
            }
            None => Ok(None),
        }
    }
}

fn decode_fact_version(key_bytes: &[u8], value: &[u8]) -> Result<FactVersion, Error> {
    let (block_index, present) =
        decode_version(key_bytes).ok_or(Error::Deserialization("fact key".into()))?;
    let stored = StoredFact::from_bytes(value)?;
    Ok(FactVersion {
        block_index,
        present,
        payload: stored.payload,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ScalarType, SortKey};

    struct TestStore {
        store: FactStore,
        db: Db,
    }

    fn accounts() -> TableDef {
        TableDef::new("account")
            .with_key("owner", ScalarType::String)
            .with_key("symbol", ScalarType::String)
            .with_field("balance", ScalarType::Uint64)
    }

    fn test_store() -> TestStore {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let store = FactStore::open(&db, accounts()).unwrap();
        TestStore { store, db }
    }

    fn id(owner: &str) -> Vec<Value> {
        vec![Value::from(owner), Value::from("EOS")]
    }

    fn by_owner() -> IndexDef {
        IndexDef::new("by_owner", "account")
            .with_sort_key(SortKey::asc("owner"))
            .with_sort_key(SortKey::asc("symbol"))
    }

    #[test]
    fn test_versions_of_newest_first() {
        let t = test_store();
        for block in [3, 5, 9] {
            t.store
                .append(Fact::live(id("alice"), block, vec![Value::UInt64(block)]))
                .unwrap();
        }
        t.store.append(Fact::tombstone(id("alice"), 12)).unwrap();

        let versions: Vec<_> = t
            .store
            .versions_of(&id("alice"))
            .unwrap()
            .collect::<Result<Vec<_>, _>>()
            .unwrap();

        let blocks: Vec<_> = versions.iter().map(|v| (v.block_index, v.present)).collect();
        assert_eq!(blocks, vec![(12, false), (9, true), (5, true), (3, true)]);
        assert!(versions[0].payload.is_empty());
    }

    #[test]
    fn test_version_at() {
        let t = test_store();
        t.store
            .append(Fact::live(id("alice"), 5, vec![Value::UInt64(10)]))
            .unwrap();
        t.store.append(Fact::tombstone(id("alice"), 9)).unwrap();

        assert_eq!(t.store.version_at(&id("alice"), 3).unwrap(), None);
        let at7 = t.store.version_at(&id("alice"), 7).unwrap().unwrap();
        assert_eq!((at7.block_index, at7.present), (5, true));
        assert_eq!(at7.payload, vec![Value::UInt64(10)]);
        let at9 = t.store.version_at(&id("alice"), 9).unwrap().unwrap();
        assert_eq!((at9.block_index, at9.present), (9, false));

        // Other identities never leak into the seek.
        assert_eq!(t.store.version_at(&id("alic"), u64::MAX).unwrap(), None);
        assert_eq!(t.store.version_at(&id("alicea"), u64::MAX).unwrap(), None);
    }

    #[test]
    fn test_append_rejects_out_of_order() {
        let t = test_store();
        t.store
            .append(Fact::live(id("bob"), 10, vec![Value::UInt64(1)]))
            .unwrap();

        let err = t
            .store
            .append(Fact::live(id("bob"), 4, vec![Value::UInt64(2)]))
            .unwrap_err();
        assert!(matches!(err, Error::StoreInvariant(_)));

        let err = t.store.append(Fact::tombstone(id("bob"), 10)).unwrap_err();
        assert!(matches!(err, Error::StoreInvariant(_)));

        let err = t
            .store
            .append(Fact::live(id("bob"), 10, vec![Value::UInt64(2)]))
            .unwrap_err();
        assert!(matches!(err, Error::StoreInvariant(_)));

        assert_eq!(
            t.store
                .append(Fact::live(id("bob"), 10, vec![Value::UInt64(1)]))
                .unwrap(),
            AppendOutcome::Unchanged
        );
        assert_eq!(t.store.fact_count(), 1);
    }

    #[test]
    fn test_append_rejects_malformed() {
        let t = test_store();
        let err = t
            .store
            .append(Fact::live(vec![Value::from("x")], 1, vec![Value::UInt64(1)]))
            .unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)));

        let err = t
            .store
            .append(Fact::live(id("x"), 1, vec![Value::Int64(1)]))
            .unwrap_err();
        assert!(matches!(err, Error::ContractViolation(_)));
    }

    #[test]
    fn test_index_tracks_distinct_keys() {
        let t = test_store();
        let index = t.store.register_index(&t.db, &by_owner()).unwrap();

        t.store
            .append(Fact::live(id("carol"), 1, vec![Value::UInt64(1)]))
            .unwrap();
        t.store
            .append(Fact::live(id("carol"), 2, vec![Value::UInt64(2)]))
            .unwrap();
        t.store
            .append(Fact::live(id("alice"), 3, vec![Value::UInt64(3)]))
            .unwrap();
        assert_eq!(index.len(), 2);

        let from = index.layout().position_of_bound(&id("a")).unwrap();
        let to = index.layout().position_of_bound(&id("z")).unwrap();
        let owners: Vec<_> = t
            .store
            .scan(&index, &from, true, &to)
            .map(|k| k.unwrap().identity[0].clone())
            .collect();
        assert_eq!(owners, vec![Value::from("alice"), Value::from("carol")]);

        let alice = index.layout().position_of_identity(&id("alice")).unwrap();
        let after_alice: Vec<_> = t.store.scan(&index, &alice, false, &to).collect();
        assert_eq!(after_alice.len(), 1);
    }

    #[test]
    fn test_register_index_builds_from_facts() {
        let t = test_store();
        for owner in ["dave", "bob", "erin"] {
            t.store
                .append(Fact::live(id(owner), 1, vec![Value::UInt64(0)]))
                .unwrap();
            t.store.append(Fact::tombstone(id(owner), 2)).unwrap();
        }

        let index = t.store.register_index(&t.db, &by_owner()).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(t.store.rebuild_index("by_owner").unwrap(), 3);
        assert!(matches!(
            t.store.rebuild_index("missing"),
            Err(Error::UnknownIndex(_))
        ));
    }
}
