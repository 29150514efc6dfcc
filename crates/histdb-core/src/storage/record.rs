//! Record types for stored values.

use crate::error::Error;
use histdb_proto::Value;
use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};

/// Value stored under a fact key.
///
/// The identity is kept alongside the payload so indexes can be rebuilt
/// from the fact tree alone.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct StoredFact {
    /// Identity-key values.
    pub identity: Vec<Value>,
    /// Payload values. Empty for tombstones.
    pub payload: Vec<Value>,
}

impl StoredFact {
    /// Create a stored fact.
    pub fn new(identity: Vec<Value>, payload: Vec<Value>) -> Self {
        Self { identity, payload }
    }

    /// Serialize the record to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a record from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned(bytes))
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// Value stored under an index position.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize)]
pub struct IndexEntry {
    /// Identity key this position belongs to.
    pub identity: Vec<Value>,
}

impl IndexEntry {
    /// Create an index entry.
    pub fn new(identity: Vec<Value>) -> Self {
        Self { identity }
    }

    /// Serialize the entry to bytes using rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize an entry from bytes using rkyv.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned(bytes))
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}

/// sled hands out buffers with no alignment guarantee; rkyv needs one.
fn aligned(bytes: &[u8]) -> AlignedVec<16> {
    let mut buf = AlignedVec::<16>::with_capacity(bytes.len());
    buf.extend_from_slice(bytes);
    buf
}
