//! histdb core - block-versioned fact store and paged snapshot queries.
//!
//! Every observed version of every fact is kept, tagged with the block that
//! wrote or retracted it. Queries walk an index between two bounds and
//! reconstruct each key's state as of a snapshot block, one resumable page
//! at a time.

#[cfg(feature = "mimalloc")]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

pub mod database;
pub mod error;
pub mod query;
pub mod registry;
pub mod schema;
pub mod storage;

pub use database::Database;
pub use error::Error;
pub use query::{
    JoinResolver, JoinSpec, KeysetScanner, Page, QueryExecutor, Resolution, ResolvedRow,
    SnapshotResolver, TupleComparator,
};
pub use registry::{JoinDef, JoinField, PreparedQuery, QueryConfig, QueryDef, QueryRegistry};
pub use schema::{
    Catalog, Direction, FieldDef, IndexDef, IndexLayout, KeyExpression, ScalarType, SortKey,
    TableDef,
};
pub use storage::{AppendOutcome, Fact, FactStore, FactVersion, IndexHandle, StorageConfig};

/// Re-export protocol types.
pub use histdb_proto as proto;
