//! Resumable forward scan over an index.

use tracing::trace;

use crate::error::Error;
use crate::storage::{FactStore, IndexHandle, IndexedKey};

/// Scanner state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// More candidate keys may lie within the range.
    Scanning,
    /// The range is consumed. Terminal.
    Exhausted,
}

/// Walks the distinct identity keys of an index between two positions.
///
/// The scanner keeps only the last position it handed out. Every step
/// re-seeks the index from that position, so a scan can be suspended and
/// resumed from a position alone and tolerates appends between steps.
pub struct KeysetScanner<'a> {
    store: &'a FactStore,
    index: IndexHandle,
    cursor: Vec<u8>,
    inclusive: bool,
    last: Vec<u8>,
    state: ScanState,
}

impl<'a> KeysetScanner<'a> {
    /// Scan `[first, last]`, both encoded index positions.
    pub fn new(store: &'a FactStore, index: IndexHandle, first: Vec<u8>, last: Vec<u8>) -> Self {
        let state = if first > last {
            ScanState::Exhausted
        } else {
            ScanState::Scanning
        };
        Self {
            store,
            index,
            cursor: first,
            inclusive: true,
            last,
            state,
        }
    }

    /// Current state.
    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Position of the last key handed out, or the start bound before the first.
    pub fn cursor(&self) -> &[u8] {
        &self.cursor
    }

    /// Advance to the next key within range.
    pub fn next_candidate(&mut self) -> Result<Option<IndexedKey>, Error> {
        match self.peek()? {
            Some(key) => {
                self.cursor.clone_from(&key.position);
                self.inclusive = false;
                Ok(Some(key))
            }
            None => {
                trace!(index = %self.index.layout().name(), "scan exhausted");
                self.state = ScanState::Exhausted;
                Ok(None)
            }
        }
    }

    /// The key `next_candidate` would return, without advancing.
    pub fn peek(&self) -> Result<Option<IndexedKey>, Error> {
        if self.state == ScanState::Exhausted {
            return Ok(None);
        }
        self.store
            .scan(&self.index, &self.cursor, self.inclusive, &self.last)
            .next()
            .transpose()
    }
}

impl Iterator for KeysetScanner<'_> {
    type Item = Result<IndexedKey, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.next_candidate() {
            Ok(Some(key)) => Some(Ok(key)),
            Ok(None) => None,
            Err(e) => {
                self.state = ScanState::Exhausted;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{IndexDef, ScalarType, SortKey, TableDef};
    use crate::storage::Fact;
    use histdb_proto::Value;

    fn setup() -> (sled::Db, FactStore, IndexHandle) {
        let db = sled::Config::new().temporary(true).open().unwrap();
        let table = TableDef::new("row")
            .with_key("scope", ScalarType::String)
            .with_key("id", ScalarType::Uint64)
            .with_field("v", ScalarType::Bool);
        let store = FactStore::open(&db, table).unwrap();
        let index = store
            .register_index(
                &db,
                &IndexDef::new("by_scope", "row")
                    .with_sort_key(SortKey::asc("scope"))
                    .with_sort_key(SortKey::desc("id")),
            )
            .unwrap();

        for (scope, id) in [("a", 1), ("a", 2), ("b", 1), ("c", 5), ("c", 3)] {
            store
                .append(Fact::live(
                    vec![Value::from(scope), Value::UInt64(id)],
                    1,
                    vec![Value::Bool(true)],
                ))
                .unwrap();
        }
        (db, store, index)
    }

    fn bound(scope: &str, id: u64) -> Vec<Value> {
        vec![Value::from(scope), Value::UInt64(id)]
    }

    fn position(index: &IndexHandle, scope: &str, id: u64) -> Vec<u8> {
        index.layout().position_of_bound(&bound(scope, id)).unwrap()
    }

    #[test]
    fn test_scan_order_and_bounds() {
        let (_db, store, index) = setup();
        let scanner = KeysetScanner::new(
            &store,
            index.clone(),
            position(&index, "a", u64::MAX),
            position(&index, "c", 4),
        );
        let keys: Vec<_> = scanner
            .map(|k| index.layout().bound_of(&k.unwrap().identity))
            .collect();
        assert_eq!(
            keys,
            vec![bound("a", 2), bound("a", 1), bound("b", 1), bound("c", 5)]
        );
    }

    #[test]
    fn test_first_step_inclusive_then_exclusive() {
        let (_db, store, index) = setup();
        let mut scanner = KeysetScanner::new(
            &store,
            index.clone(),
            position(&index, "b", 1),
            position(&index, "z", 0),
        );

        let peeked = scanner.peek().unwrap().unwrap();
        let first = scanner.next_candidate().unwrap().unwrap();
        assert_eq!(peeked, first);
        assert_eq!(first.identity, bound("b", 1));
        assert_eq!(scanner.cursor(), first.position.as_slice());

        assert_eq!(scanner.next_candidate().unwrap().unwrap().identity, bound("c", 5));
        assert_eq!(scanner.next_candidate().unwrap().unwrap().identity, bound("c", 3));
        assert_eq!(scanner.state(), ScanState::Scanning);
        assert!(scanner.next_candidate().unwrap().is_none());
        assert_eq!(scanner.state(), ScanState::Exhausted);
        assert!(scanner.peek().unwrap().is_none());
    }

    #[test]
    fn test_inverted_range_is_exhausted() {
        let (_db, store, index) = setup();
        let mut scanner = KeysetScanner::new(
            &store,
            index.clone(),
            position(&index, "c", 0),
            position(&index, "a", 0),
        );
        assert_eq!(scanner.state(), ScanState::Exhausted);
        assert!(scanner.next_candidate().unwrap().is_none());
    }

    #[test]
    fn test_sees_keys_appended_mid_scan() {
        let (_db, store, index) = setup();
        let mut scanner = KeysetScanner::new(
            &store,
            index.clone(),
            position(&index, "a", u64::MAX),
            position(&index, "b", 0),
        );
        assert_eq!(scanner.next_candidate().unwrap().unwrap().identity, bound("a", 2));

        store
            .append(Fact::live(bound("a", 0), 2, vec![Value::Bool(false)]))
            .unwrap();

        let rest: Vec<_> = scanner.map(|k| k.unwrap().identity).collect();
        assert_eq!(rest, vec![bound("a", 1), bound("a", 0), bound("b", 1)]);
    }
}
