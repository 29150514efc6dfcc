//! histdb protocol types.
//!
//! This crate defines the request/response surface of the histdb query
//! engine, using rkyv for zero-copy serialization and serde for JSON.
//!
//! # Modules
//!
//! - [`value`] - Typed runtime values with a total order
//! - [`request`] - Range query requests
//! - [`response`] - Rows and continuation tokens
//! - [`error`] - Protocol error types

pub mod error;
pub mod request;
pub mod response;
pub mod value;

pub use error::Error;

pub use request::QueryRequest;
pub use response::{QueryResponse, Row};
pub use value::Value;

/// Protocol version for wire compatibility.
pub const PROTOCOL_VERSION: u32 = 1;
