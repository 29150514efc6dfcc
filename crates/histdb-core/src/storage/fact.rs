//! Fact and version types.

use histdb_proto::Value;

/// One observed state of an identity key, as appended by ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct Fact {
    /// Identity-key values, in the table's key order.
    pub identity: Vec<Value>,
    /// Block at which this state was observed.
    pub block_index: u64,
    /// False for a tombstone.
    pub present: bool,
    /// Payload values in declaration order. Empty for tombstones.
    pub payload: Vec<Value>,
}

impl Fact {
    /// A live version.
    pub fn live(identity: Vec<Value>, block_index: u64, payload: Vec<Value>) -> Self {
        Self {
            identity,
            block_index,
            present: true,
            payload,
        }
    }

    /// A tombstone version.
    pub fn tombstone(identity: Vec<Value>, block_index: u64) -> Self {
        Self {
            identity,
            block_index,
            present: false,
            payload: Vec::new(),
        }
    }
}

/// A stored version of some identity key.
#[derive(Debug, Clone, PartialEq)]
pub struct FactVersion {
    /// Block at which this version was written.
    pub block_index: u64,
    /// False for a tombstone.
    pub present: bool,
    /// Stored payload. Empty for tombstones.
    pub payload: Vec<Value>,
}
