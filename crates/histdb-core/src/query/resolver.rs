//! Snapshot resolution of a single identity key.

use crate::error::Error;
use crate::schema::TableDef;
use crate::storage::{FactStore, FactVersion};
use histdb_proto::Value;

/// What an identity key looks like at a snapshot block.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// No version at or before the snapshot. No row is emitted.
    Absent,
    /// The visible version is a tombstone written at `block_index`.
    Tombstone {
        /// Block of the tombstone.
        block_index: u64,
    },
    /// The visible version is live.
    Live(FactVersion),
}

impl Resolution {
    /// Check if the key has no visible version.
    pub fn is_absent(&self) -> bool {
        matches!(self, Resolution::Absent)
    }

    /// Build the output row for this resolution.
    ///
    /// Tombstones get every payload field set to its type default; identity
    /// fields always come from `identity`.
    pub fn into_row(self, table: &TableDef, identity: &[Value]) -> Option<ResolvedRow> {
        match self {
            Resolution::Absent => None,
            Resolution::Tombstone { block_index } => Some(ResolvedRow {
                block_index,
                present: false,
                values: table.assemble(identity, &table.default_payload()),
            }),
            Resolution::Live(version) => Some(ResolvedRow {
                block_index: version.block_index,
                present: true,
                values: table.assemble(identity, &version.payload),
            }),
        }
    }
}

/// A resolved row: all table fields in declaration order plus its version.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRow {
    /// Block of the visible version.
    pub block_index: u64,
    /// False if the visible version is a tombstone.
    pub present: bool,
    /// Field values.
    pub values: Vec<Value>,
}

/// Resolves identity keys of one store at a snapshot.
pub struct SnapshotResolver<'a> {
    store: &'a FactStore,
}

impl<'a> SnapshotResolver<'a> {
    /// Create a resolver over a store.
    pub fn new(store: &'a FactStore) -> Self {
        Self { store }
    }

    /// The store this resolver reads.
    pub fn store(&self) -> &'a FactStore {
        self.store
    }

    /// Resolve the newest version of `identity` with `block_index <= max_block_index`.
    pub fn resolve(&self, identity: &[Value], max_block_index: u64) -> Result<Resolution, Error> {
        Ok(match self.store.version_at(identity, max_block_index)? {
            None => Resolution::Absent,
            Some(version) if version.present => Resolution::Live(version),
            Some(version) => Resolution::Tombstone {
                block_index: version.block_index,
            },
        })
    }

    /// Resolve and build the output row, or `None` if absent.
    pub fn resolve_row(
        &self,
        identity: &[Value],
        max_block_index: u64,
    ) -> Result<Option<ResolvedRow>, Error> {
        Ok(self
            .resolve(identity, max_block_index)?
            .into_row(self.store.table(), identity))
    }
}
