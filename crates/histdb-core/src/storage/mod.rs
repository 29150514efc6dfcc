//! Storage layer for histdb.
//!
//! This module provides a sled-backed, append-only fact store. Every version
//! of every fact is kept; tombstones mark retraction.

mod config;
mod fact;
mod record;
mod store;

pub mod key;

pub use config::StorageConfig;
pub use fact::{Fact, FactVersion};
pub use record::{IndexEntry, StoredFact};
pub use store::{AppendOutcome, FactStore, IndexHandle, IndexedKey};
