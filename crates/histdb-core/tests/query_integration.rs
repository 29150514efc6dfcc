//! Integration tests for paged snapshot queries.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use histdb_core::registry::QueryConfig;
use histdb_core::schema::{IndexDef, ScalarType, SortKey, TableDef};
use histdb_core::storage::{Fact, StorageConfig};
use histdb_core::{Database, Error, QueryExecutor};
use histdb_proto::{QueryRequest, QueryResponse, Value};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};

struct TestContext {
    db: Database,
    _dir: tempfile::TempDir,
}

impl TestContext {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(StorageConfig::new(dir.path())).unwrap();
        Self { db, _dir: dir }
    }

    fn with_config(json: &str) -> Self {
        let ctx = Self::new();
        ctx.db
            .load_config(&QueryConfig::from_json_str(json).unwrap())
            .unwrap();
        ctx
    }

    fn query(&self, request: &QueryRequest) -> QueryResponse {
        self.db.query(request).unwrap()
    }

    /// Follow `more` tokens to the end of the range.
    fn query_all(&self, request: &QueryRequest) -> Vec<QueryResponse> {
        let mut pages = vec![];
        let mut request = request.clone();
        loop {
            let page = self.query(&request);
            let more = page.more.clone();
            pages.push(page);
            match more {
                Some(token) => request = request.resume(token),
                None => return pages,
            }
        }
    }
}

const BALANCES: &str = r#"{
    "tables": [{
        "name": "balance",
        "fields": [
            {"name": "account", "type": "string"},
            {"name": "val", "type": "int64"}
        ],
        "keys": ["account"]
    }],
    "indexes": [{
        "name": "balance_by_account",
        "table": "balance",
        "sort_keys": [{"name": "account"}]
    }],
    "queries": [{"name": "balances", "index": "balance_by_account", "max_results": 1000}]
}"#;

fn account(name: &str) -> Vec<Value> {
    vec![Value::from(name)]
}

fn balances(first: &str, last: &str, block: u64, max_results: u32) -> QueryRequest {
    QueryRequest::new("balances")
        .at_block(block)
        .with_range(account(first), account(last))
        .with_max_results(max_results)
}

#[test]
fn test_tombstone_and_absence_scenario() {
    let ctx = TestContext::with_config(BALANCES);
    ctx.db
        .append("balance", Fact::live(account("k1"), 5, vec![Value::Int64(10)]))
        .unwrap();
    ctx.db
        .append("balance", Fact::tombstone(account("k1"), 9))
        .unwrap();
    ctx.db.set_head_block(20).unwrap();

    let at7 = ctx.query(&balances("", "z", 7, 10));
    assert_eq!(at7.len(), 1);
    assert_eq!(at7.rows[0].block_index, 5);
    assert!(at7.rows[0].present);
    assert_eq!(at7.get(0, "val"), Some(&Value::Int64(10)));

    let at12 = ctx.query(&balances("", "z", 12, 10));
    assert_eq!(at12.len(), 1);
    assert_eq!(at12.rows[0].block_index, 9);
    assert!(!at12.rows[0].present);
    assert_eq!(at12.get(0, "account"), Some(&Value::from("k1")));
    assert_eq!(at12.get(0, "val"), Some(&Value::Int64(0)));

    let at3 = ctx.query(&balances("", "z", 3, 10));
    assert!(at3.is_empty());
    assert!(at3.is_complete());
}

#[test]
fn test_two_key_continuation_scenario() {
    let ctx = TestContext::with_config(BALANCES);
    for (name, val) in [("k1", 1), ("k2", 2)] {
        ctx.db
            .append("balance", Fact::live(account(name), 1, vec![Value::Int64(val)]))
            .unwrap();
    }

    let first = ctx.query(&balances("k1", "k2", 10, 1));
    assert_eq!(first.len(), 1);
    assert_eq!(first.get(0, "account"), Some(&Value::from("k1")));
    let token = first.more.clone().unwrap();

    // The token survives a JSON round trip through a client.
    let text = serde_json::to_string(&token).unwrap();
    let token = QueryResponse::token_from_json(&text).unwrap();

    let second = ctx.query(&balances("k1", "k2", 10, 1).resume(token));
    assert_eq!(second.len(), 1);
    assert_eq!(second.get(0, "account"), Some(&Value::from("k2")));
    assert!(second.is_complete());
}

#[test]
fn test_boundary_requests() {
    let ctx = TestContext::with_config(BALANCES);
    ctx.db
        .append("balance", Fact::live(account("a"), 1, vec![Value::Int64(1)]))
        .unwrap();

    let none = ctx.query(&balances("a", "z", 10, 0));
    assert!(none.is_empty());
    assert_eq!(none.more, Some(account("a")));

    let inverted = ctx.query(&balances("z", "a", 10, 10));
    assert!(inverted.is_empty());
    assert!(inverted.is_complete());

    let bad_shape = QueryRequest::new("balances")
        .with_range(vec![Value::UInt64(1)], account("z"))
        .with_max_results(10);
    assert!(matches!(
        ctx.db.query(&bad_shape),
        Err(Error::ContractViolation(_))
    ));
}

#[test]
fn test_snapshot_clamped_to_head_and_result_cap() {
    let ctx = TestContext::with_config(
        &BALANCES.replace(r#""max_results": 1000"#, r#""max_results": 2"#),
    );
    for (i, name) in ["a", "b", "c", "d"].iter().enumerate() {
        ctx.db
            .append(
                "balance",
                Fact::live(account(name), i as u64 + 1, vec![Value::Int64(i as i64)]),
            )
            .unwrap();
    }
    assert_eq!(ctx.db.head_block().unwrap(), 4);

    // The query caps pages at two rows whatever the caller asks for.
    let page = ctx.query(&balances("", "z", u64::MAX, 100));
    assert_eq!(page.len(), 2);
    assert_eq!(page.more, Some(account("c")));

    // Pretend ingestion has only confirmed block 2: later versions stay hidden.
    ctx.db.set_head_block(2).unwrap();
    let pages = ctx.query_all(&balances("", "z", u64::MAX, 100));
    let rows: Vec<_> = pages.iter().flat_map(|p| p.rows.iter()).collect();
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.block_index <= 2));
}

#[test]
fn test_unlimited_query_ignores_snapshot() {
    let ctx = TestContext::with_config(
        &BALANCES.replace(
            r#""max_results": 1000"#,
            r#""max_results": 1000, "limit_block_index": false"#,
        ),
    );
    ctx.db
        .append("balance", Fact::live(account("a"), 30, vec![Value::Int64(3)]))
        .unwrap();

    let page = ctx.query(&balances("", "z", 1, 10));
    assert_eq!(page.len(), 1);
    assert_eq!(page.rows[0].block_index, 30);
}

#[test]
fn test_writes_above_snapshot_do_not_change_pages() {
    let ctx = TestContext::with_config(BALANCES);
    ctx.db
        .append("balance", Fact::live(account("a"), 1, vec![Value::Int64(1)]))
        .unwrap();

    let before = ctx.query(&balances("a", "z", 10, 1));
    assert!(before.is_complete());

    ctx.db
        .append("balance", Fact::live(account("b"), 100, vec![Value::Int64(2)]))
        .unwrap();
    let after = ctx.query(&balances("a", "z", 10, 1));
    assert_eq!(before, after);
}

const TRANSFERS: &str = r#"{
    "tables": [
        {
            "name": "transfer",
            "fields": [
                {"name": "id", "type": "uint64"},
                {"name": "to", "type": "string"},
                {"name": "amount", "type": "int64"}
            ],
            "keys": ["id"]
        },
        {
            "name": "account",
            "fields": [
                {"name": "name", "type": "string"},
                {"name": "creator", "type": "string"},
                {"name": "created", "type": "timestamp"}
            ],
            "keys": ["name"]
        }
    ],
    "indexes": [{
        "name": "transfer_by_id",
        "table": "transfer",
        "sort_keys": [{"name": "id"}]
    }],
    "queries": [{
        "name": "transfers",
        "index": "transfer_by_id",
        "join": {
            "table": "account",
            "key_values": ["to"],
            "fields": [
                {"name": "creator", "new_name": "to_creator"},
                {"name": "created"}
            ]
        }
    }]
}"#;

#[test]
fn test_join_defaults_never_suppress_rows() {
    let ctx = TestContext::with_config(TRANSFERS);
    let transfer = |id: u64, to: &str, block: u64| {
        ctx.db
            .append(
                "transfer",
                Fact::live(
                    vec![Value::UInt64(id)],
                    block,
                    vec![Value::from(to), Value::Int64(id as i64 * 10)],
                ),
            )
            .unwrap();
    };
    transfer(1, "alice", 2);
    transfer(2, "bob", 3);
    transfer(3, "nobody", 3);
    ctx.db
        .append(
            "account",
            Fact::live(
                account("alice"),
                1,
                vec![Value::from("eosio"), Value::Timestamp(1_000)],
            ),
        )
        .unwrap();
    ctx.db
        .append(
            "account",
            Fact::live(
                account("bob"),
                6,
                vec![Value::from("alice"), Value::Timestamp(2_000)],
            ),
        )
        .unwrap();
    ctx.db
        .append("transfer", Fact::tombstone(vec![Value::UInt64(1)], 8))
        .unwrap();

    let request = QueryRequest::new("transfers")
        .with_range(vec![Value::UInt64(0)], vec![Value::UInt64(100)])
        .with_max_results(10);

    let at5 = ctx.query(&request.clone().at_block(5));
    assert_eq!(
        at5.columns,
        vec!["id", "to", "amount", "to_creator", "created"]
    );
    assert_eq!(at5.len(), 3);
    assert_eq!(at5.get(0, "to_creator"), Some(&Value::from("eosio")));
    assert_eq!(at5.get(0, "created"), Some(&Value::Timestamp(1_000)));
    // bob's account appears at block 6.
    assert_eq!(at5.get(1, "to_creator"), Some(&Value::from("")));
    assert_eq!(at5.get(2, "to_creator"), Some(&Value::from("")));
    assert_eq!(at5.get(2, "created"), Some(&Value::Timestamp(0)));

    let at8 = ctx.query(&request.at_block(8));
    assert_eq!(at8.len(), 3);
    assert!(!at8.rows[0].present);
    assert_eq!(at8.get(0, "to"), Some(&Value::from("")));
    assert_eq!(at8.get(0, "to_creator"), Some(&Value::from("")));
    assert_eq!(at8.get(1, "to_creator"), Some(&Value::from("alice")));
}

const BALANCE_CREATORS: &str = r#"{
    "tables": [
        {
            "name": "balance",
            "fields": [
                {"name": "acct", "type": "string"},
                {"name": "val", "type": "int64"}
            ],
            "keys": ["acct"]
        },
        {
            "name": "account",
            "fields": [
                {"name": "name", "type": "string"},
                {"name": "creator", "type": "string"}
            ],
            "keys": ["name"]
        }
    ],
    "indexes": [{
        "name": "balance_by_acct",
        "table": "balance",
        "sort_keys": [{"name": "acct"}]
    }],
    "queries": [{
        "name": "balances",
        "index": "balance_by_acct",
        "join": {
            "table": "account",
            "key_values": ["acct"],
            "fields": [{"name": "creator"}]
        }
    }]
}"#;

#[test]
fn test_retracted_primary_still_joins_on_identity() {
    let ctx = TestContext::with_config(BALANCE_CREATORS);
    ctx.db
        .append("balance", Fact::live(account("alice"), 1, vec![Value::Int64(7)]))
        .unwrap();
    ctx.db
        .append("balance", Fact::tombstone(account("alice"), 2))
        .unwrap();
    ctx.db
        .append("account", Fact::live(account("alice"), 1, vec![Value::from("eosio")]))
        .unwrap();

    let page = ctx.query(&balances("", "z", 10, 10));
    assert_eq!(page.len(), 1);
    assert!(!page.rows[0].present);
    assert_eq!(page.get(0, "val"), Some(&Value::Int64(0)));
    assert_eq!(page.get(0, "creator"), Some(&Value::from("eosio")));
}

#[test]
fn test_expression_index_paginates_in_raw_space() {
    let ctx = TestContext::new();
    ctx.db
        .register_table(
            TableDef::new("user")
                .with_key("name", ScalarType::String)
                .with_field("age", ScalarType::Uint32),
        )
        .unwrap();
    let index = ctx
        .db
        .register_index(
            IndexDef::new("user_by_folded_name", "user")
                .with_sort_key(
                    SortKey::asc("name")
                        .with_expression(histdb_core::KeyExpression::Lowercase),
                )
                .with_sort_key(SortKey::asc("name")),
        )
        .unwrap();

    for (i, name) in ["bob", "Alice", "alice", "Carol", "BOB", "dave"].iter().enumerate() {
        ctx.db
            .append(
                "user",
                Fact::live(account(name), 1, vec![Value::UInt32(i as u32)]),
            )
            .unwrap();
    }

    let store = ctx.db.store("user").unwrap();
    let exec = QueryExecutor::new(&store, index);
    let first = vec![Value::from("A"), Value::from("")];
    let last = vec![Value::from("D"), Value::from("")];

    let all = exec.execute(&first, &last, 10, u32::MAX).unwrap();
    let names: Vec<_> = all.rows.iter().map(|r| r.values[0].clone()).collect();
    assert_eq!(
        names,
        vec![
            Value::from("Alice"),
            Value::from("alice"),
            Value::from("BOB"),
            Value::from("bob"),
            Value::from("Carol"),
        ]
    );

    let page = exec.execute(&first, &last, 10, 2).unwrap();
    assert_eq!(page.more, Some(vec![Value::from("BOB"), Value::from("BOB")]));
    let paged = exec.execute_all(&first, &last, 10, 2).unwrap();
    assert_eq!(paged, all.rows);
}

#[test]
fn test_reopen_keeps_facts_head_and_indexes() {
    let dir = tempfile::tempdir().unwrap();
    let config = QueryConfig::from_json_str(BALANCES).unwrap();
    {
        let db = Database::open(StorageConfig::new(dir.path())).unwrap();
        db.load_config(&config).unwrap();
        db.append("balance", Fact::live(account("x"), 4, vec![Value::Int64(4)]))
            .unwrap();
        db.flush().unwrap();
    }

    let db = Database::open(StorageConfig::new(dir.path())).unwrap();
    assert_eq!(db.head_block().unwrap(), 4);
    db.load_config(&config).unwrap();
    let page = db.query(&balances("", "z", 10, 10)).unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page.get(0, "val"), Some(&Value::Int64(4)));
}

#[test]
fn test_rejected_appends_leave_store_untouched() {
    let ctx = TestContext::with_config(BALANCES);
    ctx.db
        .append("balance", Fact::live(account("a"), 5, vec![Value::Int64(1)]))
        .unwrap();

    let older = ctx
        .db
        .append("balance", Fact::live(account("a"), 4, vec![Value::Int64(2)]));
    assert!(matches!(older, Err(Error::StoreInvariant(_))));
    let flipped = ctx.db.append("balance", Fact::tombstone(account("a"), 5));
    assert!(matches!(flipped, Err(Error::StoreInvariant(_))));

    let page = ctx.query(&balances("", "z", 10, 10));
    assert_eq!(page.len(), 1);
    assert_eq!(page.get(0, "val"), Some(&Value::Int64(1)));
    assert_eq!(ctx.db.store("balance").unwrap().fact_count(), 1);
}

// Randomized history checked against a brute-force model.

const ROWS: &str = r#"{
    "tables": [{
        "name": "row",
        "fields": [
            {"name": "scope", "type": "string"},
            {"name": "id", "type": "uint64"},
            {"name": "amount", "type": "int64"},
            {"name": "memo", "type": "string"}
        ],
        "keys": ["scope", "id"]
    }],
    "indexes": [
        {
            "name": "row_by_scope",
            "table": "row",
            "sort_keys": [{"name": "scope"}, {"name": "id", "direction": "desc"}]
        },
        {
            "name": "row_by_id",
            "table": "row",
            "sort_keys": [{"name": "id"}, {"name": "scope"}]
        }
    ],
    "queries": [
        {"name": "by_scope", "index": "row_by_scope", "max_results": 100000},
        {"name": "by_id", "index": "row_by_id", "max_results": 100000}
    ]
}"#;

const SCOPES: [&str; 5] = ["alice", "bob", "carol", "dave", "eve"];

/// Every version appended, by identity key.
type Model = BTreeMap<(String, u64), Vec<(u64, bool, i64, String)>>;

fn populate(ctx: &TestContext, rng: &mut StdRng) -> Model {
    let mut model = Model::new();
    let mut keys: Vec<(String, u64)> = SCOPES
        .iter()
        .flat_map(|s| (0..8u64).map(move |id| (s.to_string(), id)))
        .collect();

    for block in 1..=60u64 {
        keys.shuffle(rng);
        let touched = rng.gen_range(0..6);
        for (scope, id) in keys.iter().take(touched) {
            let identity = vec![Value::from(scope.as_str()), Value::UInt64(*id)];
            let fact = if rng.gen_bool(0.25) {
                model
                    .entry((scope.clone(), *id))
                    .or_default()
                    .push((block, false, 0, String::new()));
                Fact::tombstone(identity, block)
            } else {
                let amount = rng.gen_range(-500..500);
                let memo = format!("m{}", rng.gen_range(0..100));
                model
                    .entry((scope.clone(), *id))
                    .or_default()
                    .push((block, true, amount, memo.clone()));
                Fact::live(identity, block, vec![Value::Int64(amount), Value::from(memo)])
            };
            ctx.db.append("row", fact).unwrap();
        }
    }
    model
}

/// Expected rows of `by_scope` for `[first, last]` at a snapshot.
fn expected_by_scope(
    model: &Model,
    first: &(String, u64),
    last: &(String, u64),
    snapshot: u64,
) -> Vec<(u64, bool, Vec<Value>)> {
    let index_cmp =
        |a: &(String, u64), b: &(String, u64)| a.0.cmp(&b.0).then(b.1.cmp(&a.1));
    let mut keys: Vec<&(String, u64)> = model.keys().collect();
    keys.sort_by(|a, b| index_cmp(*a, *b));

    keys.into_iter()
        .filter(|k| {
            index_cmp(*k, first) != Ordering::Less && index_cmp(*k, last) != Ordering::Greater
        })
        .filter_map(|k| {
            let visible = model[k].iter().rev().find(|v| v.0 <= snapshot)?;
            let (amount, memo) = if visible.1 {
                (visible.2, visible.3.clone())
            } else {
                (0, String::new())
            };
            Some((
                visible.0,
                visible.1,
                vec![
                    Value::from(k.0.as_str()),
                    Value::UInt64(k.1),
                    Value::Int64(amount),
                    Value::from(memo),
                ],
            ))
        })
        .collect()
}

fn scope_request(first: &(String, u64), last: &(String, u64), block: u64, n: u32) -> QueryRequest {
    QueryRequest::new("by_scope")
        .at_block(block)
        .with_range(
            vec![Value::from(first.0.as_str()), Value::UInt64(first.1)],
            vec![Value::from(last.0.as_str()), Value::UInt64(last.1)],
        )
        .with_max_results(n)
}

#[test]
fn test_random_history_matches_model() {
    let ctx = TestContext::with_config(ROWS);
    let mut rng = StdRng::seed_from_u64(0x5eed);
    let model = populate(&ctx, &mut rng);

    for _ in 0..40 {
        let snapshot = rng.gen_range(0..70);
        let mut bounds = [
            (SCOPES[rng.gen_range(0..5)].to_string(), rng.gen_range(0..9u64)),
            (SCOPES[rng.gen_range(0..5)].to_string(), rng.gen_range(0..9u64)),
        ];
        bounds.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        let [first, last] = bounds;

        let expected = expected_by_scope(&model, &first, &last, snapshot);
        let single = ctx.query(&scope_request(&first, &last, snapshot, u32::MAX));
        let actual: Vec<_> = single
            .rows
            .iter()
            .map(|r| (r.block_index, r.present, r.values.clone()))
            .collect();
        assert_eq!(actual, expected, "range {:?}..={:?} at {}", first, last, snapshot);
        assert!(single.is_complete());

        // Paging in any size reproduces the single call, with no repeats.
        let page_size = rng.gen_range(1..5);
        let pages = ctx.query_all(&scope_request(&first, &last, snapshot, page_size));
        let paged: Vec<_> = pages.iter().flat_map(|p| p.rows.clone()).collect();
        assert_eq!(paged, single.rows);
        assert!(pages.iter().all(|p| p.len() <= page_size as usize));

        let mut seen = BTreeSet::new();
        for row in &paged {
            assert!(seen.insert((row.values[0].clone(), row.values[1].clone())));
        }

        // Same snapshot, same answer.
        let again = ctx.query(&scope_request(&first, &last, snapshot, page_size));
        assert_eq!(again, pages[0]);
    }
}

#[test]
fn test_random_history_second_index_and_laws() {
    let ctx = TestContext::with_config(ROWS);
    let mut rng = StdRng::seed_from_u64(42);
    let model = populate(&ctx, &mut rng);

    for snapshot in [0u64, 1, 7, 20, 33, 59, 60, 1_000] {
        let request = QueryRequest::new("by_id")
            .at_block(snapshot)
            .with_range(
                vec![Value::UInt64(0), Value::from("")],
                vec![Value::UInt64(u64::MAX), Value::from("zzz")],
            )
            .with_max_results(3);
        let rows: Vec<_> = ctx
            .query_all(&request)
            .into_iter()
            .flat_map(|p| p.rows)
            .collect();

        // Strictly ascending by (id, scope).
        for pair in rows.windows(2) {
            let a = (&pair[0].values[1], &pair[0].values[0]);
            let b = (&pair[1].values[1], &pair[1].values[0]);
            assert_eq!(a.cmp(&b), Ordering::Less);
        }

        for row in &rows {
            assert!(row.block_index <= snapshot);
            if !row.present {
                // Tombstone law.
                assert_eq!(row.values[2], Value::Int64(0));
                assert_eq!(row.values[3], Value::from(""));
            }
        }

        // Absence law: a key appears iff it has a version at or before the snapshot.
        let visible = model
            .values()
            .filter(|versions| versions[0].0 <= snapshot)
            .count();
        assert_eq!(rows.len(), visible);
    }
}
