//! histdb benchmark suite
//!
//! Criterion benchmarks for the append path and the paged snapshot query
//! path. Fixtures are generated from a fixed seed so runs are comparable.

pub mod fixtures;
pub mod harness;

pub use fixtures::{contract_row_config, generate_history, HistoryEvent, Scale};
pub use harness::TestContext;
