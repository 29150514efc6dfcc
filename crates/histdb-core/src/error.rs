//! Core error types.

use thiserror::Error;

/// Core database errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Protocol error.
    #[error("protocol error: {0}")]
    Protocol(#[from] histdb_proto::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// The caller passed a malformed argument (bound shape, field types).
    /// Raised before any scan work starts.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    /// An append would break the per-key version ordering.
    #[error("store invariant violation: {0}")]
    StoreInvariant(String),

    /// Invalid schema or query configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// No query registered under this name.
    #[error("unknown query: {0}")]
    UnknownQuery(String),

    /// No table registered under this name.
    #[error("unknown table: {0}")]
    UnknownTable(String),

    /// No index registered under this name.
    #[error("unknown index: {0}")]
    UnknownIndex(String),

    /// JSON parsing error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
