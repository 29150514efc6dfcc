//! Range query requests.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::value::Value;

/// A request to run one page of a named range query.
///
/// `first` and `last` are inclusive bounds shaped like the index's sort keys.
/// To fetch the next page, re-issue the request with `first` replaced by the
/// previous response's `more` token (see [`QueryRequest::resume`]).
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct QueryRequest {
    /// Name of the registered query.
    pub query: String,
    /// Snapshot ceiling: versions above this block are invisible.
    pub max_block_index: u64,
    /// Inclusive lower bound, one value per sort key.
    pub first: Vec<Value>,
    /// Inclusive upper bound, one value per sort key.
    pub last: Vec<Value>,
    /// Maximum number of rows to return in this page.
    pub max_results: u32,
}

impl QueryRequest {
    /// Create a request for a query with empty bounds and no rows requested.
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            max_block_index: u64::MAX,
            first: vec![],
            last: vec![],
            max_results: 0,
        }
    }

    /// Set the snapshot block.
    pub fn at_block(mut self, max_block_index: u64) -> Self {
        self.max_block_index = max_block_index;
        self
    }

    /// Set the inclusive key range.
    pub fn with_range(mut self, first: Vec<Value>, last: Vec<Value>) -> Self {
        self.first = first;
        self.last = last;
        self
    }

    /// Set the page size.
    pub fn with_max_results(mut self, max_results: u32) -> Self {
        self.max_results = max_results;
        self
    }

    /// Build the follow-up request for a continuation token.
    pub fn resume(&self, more: Vec<Value>) -> Self {
        Self {
            first: more,
            ..self.clone()
        }
    }

    /// Serialize the request with rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a request produced by [`QueryRequest::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }
}
