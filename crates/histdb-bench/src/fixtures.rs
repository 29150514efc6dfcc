//! Test data generation for benchmarks.

use histdb_core::registry::QueryConfig;
use histdb_core::storage::Fact;
use histdb_proto::Value;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Scale factor for benchmark data generation.
#[derive(Clone, Copy, Debug, Default)]
pub enum Scale {
    /// ~100 identity keys.
    Small,
    /// ~2,000 identity keys.
    #[default]
    Medium,
    /// ~50,000 identity keys.
    Large,
}

impl Scale {
    /// Number of distinct identity keys.
    pub fn keys(&self) -> usize {
        match self {
            Scale::Small => 100,
            Scale::Medium => 2_000,
            Scale::Large => 50_000,
        }
    }

    /// Average versions written per key.
    pub fn versions_per_key(&self) -> usize {
        match self {
            Scale::Small => 4,
            Scale::Medium => 8,
            Scale::Large => 8,
        }
    }
}

/// Table, indexes and queries used by every benchmark.
pub fn contract_row_config() -> QueryConfig {
    let json = r#"{
        "tables": [{
            "name": "contract_row",
            "fields": [
                {"name": "code", "type": "string"},
                {"name": "table", "type": "string"},
                {"name": "scope", "type": "string"},
                {"name": "primary_key", "type": "uint64"},
                {"name": "payer", "type": "string"},
                {"name": "value", "type": "bytes"}
            ],
            "keys": ["code", "table", "scope", "primary_key"]
        }],
        "indexes": [
            {
                "name": "contract_row_by_pk",
                "table": "contract_row",
                "sort_keys": [
                    {"name": "code"}, {"name": "table"},
                    {"name": "primary_key"}, {"name": "scope"}
                ]
            },
            {
                "name": "contract_row_by_scope",
                "table": "contract_row",
                "sort_keys": [
                    {"name": "code"}, {"name": "table"},
                    {"name": "scope"}, {"name": "primary_key"}
                ]
            }
        ],
        "queries": [
            {"name": "by_pk", "index": "contract_row_by_pk", "max_results": 1000},
            {"name": "by_scope", "index": "contract_row_by_scope", "max_results": 1000}
        ]
    }"#;
    QueryConfig::from_json_str(json).unwrap()
}

/// One generated append.
#[derive(Debug, Clone)]
pub struct HistoryEvent {
    /// Target table.
    pub table: &'static str,
    /// Fact to append.
    pub fact: Fact,
}

/// Identity key of the `n`-th generated row.
pub fn row_identity(n: usize) -> Vec<Value> {
    vec![
        Value::from("eosio.token"),
        Value::from("accounts"),
        Value::from(format!("scope{:05}", n % 97)),
        Value::UInt64(n as u64),
    ]
}

/// Generate a block-ordered history: every key gets a random number of
/// versions, about one in five of them tombstones.
pub fn generate_history(scale: Scale, seed: u64) -> Vec<HistoryEvent> {
    let mut rng = StdRng::seed_from_u64(seed);
    let keys = scale.keys();
    let total = keys * scale.versions_per_key();

    let mut events = Vec::with_capacity(total);
    let mut block = 1u64;
    for i in 0..total {
        // 16 appends per block. A key drawn twice in one block is rejected
        // by the store and skipped by the harness.
        if i % 16 == 0 {
            block += 1;
        }
        let n = if i < keys { i } else { rng.gen_range(0..keys) };
        let identity = row_identity(n);
        let fact = if i >= keys && rng.gen_ratio(1, 5) {
            Fact::tombstone(identity, block)
        } else {
            let len = rng.gen_range(8..64);
            let value: Vec<u8> = (0..len).map(|_| rng.gen()).collect();
            Fact::live(identity, block, vec![Value::from("eosio"), Value::Bytes(value)])
        };
        events.push(HistoryEvent {
            table: "contract_row",
            fact,
        });
    }
    events
}
