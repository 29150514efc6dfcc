//! Result types for query responses.

use rkyv::util::AlignedVec;
use rkyv::{Archive, Deserialize, Serialize};
use serde::{Deserialize as SerdeDeserialize, Serialize as SerdeSerialize};

use crate::error::Error;
use crate::value::Value;

/// One emitted row: the visible version of a fact, plus joined fields.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct Row {
    /// Block at which the visible version was written.
    pub block_index: u64,
    /// False when the visible version is a tombstone.
    pub present: bool,
    /// Values parallel to [`QueryResponse::columns`].
    pub values: Vec<Value>,
}

impl Row {
    /// Create a new row.
    pub fn new(block_index: u64, present: bool, values: Vec<Value>) -> Self {
        Self {
            block_index,
            present,
            values,
        }
    }
}

/// A page of query results.
#[derive(Debug, Clone, PartialEq, Archive, Serialize, Deserialize, SerdeSerialize, SerdeDeserialize)]
pub struct QueryResponse {
    /// Column labels: table fields in declaration order, then joined fields.
    pub columns: Vec<String>,
    /// Rows in index order.
    pub rows: Vec<Row>,
    /// Continuation token, shaped like the request's `first` bound.
    /// `None` when the range is exhausted.
    pub more: Option<Vec<Value>>,
}

impl QueryResponse {
    /// Create a response.
    pub fn new(columns: Vec<String>, rows: Vec<Row>, more: Option<Vec<Value>>) -> Self {
        Self {
            columns,
            rows,
            more,
        }
    }

    /// Number of rows in this page.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if this page is empty.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Check if there are no further pages.
    pub fn is_complete(&self) -> bool {
        self.more.is_none()
    }

    /// Position of a column by label.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    /// Get the value at a specific row and column.
    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.values.get(idx))
    }

    /// Serialize the response with rkyv.
    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        rkyv::to_bytes::<rkyv::rancor::Error>(self)
            .map(|v| v.to_vec())
            .map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize a response produced by [`QueryResponse::to_bytes`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let mut aligned = AlignedVec::<16>::with_capacity(bytes.len());
        aligned.extend_from_slice(bytes);
        rkyv::from_bytes::<Self, rkyv::rancor::Error>(&aligned)
            .map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Decode a continuation token that was passed around as JSON text.
    pub fn token_from_json(text: &str) -> Result<Vec<Value>, Error> {
        serde_json::from_str(text).map_err(|e| Error::InvalidToken(e.to_string()))
    }
}
