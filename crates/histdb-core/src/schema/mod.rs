//! Table and index definitions.
//!
//! Tables declare typed fields and which of them form the identity key.
//! Indexes declare the sort-key ordering the keyset scanner walks.

mod catalog;
mod index;
mod table;
mod types;

pub use catalog::Catalog;
pub use index::{Direction, IndexDef, IndexLayout, KeyExpression, SortKey};
pub use table::{FieldDef, TableDef};
pub use types::ScalarType;
