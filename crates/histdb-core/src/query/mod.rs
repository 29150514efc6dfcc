//! Query engine for histdb.
//!
//! A query walks one index in sort-key order between two inclusive bounds,
//! resolves each candidate identity key at a snapshot block, optionally
//! splices in fields from a second table, and stops once a page is full.

mod comparator;
mod executor;
mod join;
mod resolver;
mod scanner;

pub use comparator::TupleComparator;
pub use executor::{Page, QueryExecutor};
pub use join::{JoinResolver, JoinSpec, JoinedField};
pub use resolver::{Resolution, ResolvedRow, SnapshotResolver};
pub use scanner::{KeysetScanner, ScanState};
