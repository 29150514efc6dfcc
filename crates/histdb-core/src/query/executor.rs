//! Query executor for paged range queries.
//!
//! One call produces one page: the scanner yields candidate keys in index
//! order, each is resolved at the snapshot block, and keys with no visible
//! version are skipped without counting against `max_results`. When the page
//! fills, the raw sort-key tuple of the next key visible at the snapshot is
//! returned as the continuation, so keys written above the snapshot never
//! change the response.

use std::cmp::Ordering;

use tracing::{debug, trace};

use crate::error::Error;
use crate::storage::{FactStore, IndexHandle};
use histdb_proto::Value;

use super::join::JoinResolver;
use super::resolver::{ResolvedRow, SnapshotResolver};
use super::scanner::KeysetScanner;

/// One page of results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Page {
    /// Rows in index order. Joined fields follow the table fields.
    pub rows: Vec<ResolvedRow>,
    /// Bound to pass as `first` on the next call, if the page was cut short.
    pub more: Option<Vec<Value>>,
    /// Candidate keys skipped because nothing was visible at the snapshot.
    pub skipped: usize,
}

impl Page {
    fn empty(more: Option<Vec<Value>>) -> Self {
        Self {
            rows: Vec::new(),
            more,
            skipped: 0,
        }
    }

    /// Check if no further page exists.
    pub fn is_complete(&self) -> bool {
        self.more.is_none()
    }
}

/// Runs range queries over one index of a store.
pub struct QueryExecutor<'a> {
    store: &'a FactStore,
    index: IndexHandle,
    join: Option<JoinResolver<'a>>,
}

impl<'a> QueryExecutor<'a> {
    /// Create an executor over `index` of `store`.
    pub fn new(store: &'a FactStore, index: IndexHandle) -> Self {
        Self {
            store,
            index,
            join: None,
        }
    }

    /// Splice joined fields into every row.
    pub fn with_join(mut self, join: JoinResolver<'a>) -> Self {
        self.join = Some(join);
        self
    }

    /// Execute one page of the query `[first, last]` at `max_block_index`.
    ///
    /// Bounds are raw sort-key tuples shaped like the index. A malformed
    /// bound fails with [`Error::ContractViolation`] before any scan.
    pub fn execute(
        &self,
        first: &[Value],
        last: &[Value],
        max_block_index: u64,
        max_results: u32,
    ) -> Result<Page, Error> {
        let layout = self.index.layout();
        layout.check_bound(first)?;
        layout.check_bound(last)?;

        if max_results == 0 {
            return Ok(Page::empty(Some(first.to_vec())));
        }

        let first_projected = layout.project(first)?;
        let last_projected = layout.project(last)?;
        if layout.comparator().compare(&first_projected, &last_projected) == Ordering::Greater {
            debug!(index = %layout.name(), "empty range");
            return Ok(Page::empty(None));
        }

        let mut scanner = KeysetScanner::new(
            self.store,
            self.index.clone(),
            layout.encode(&first_projected),
            layout.encode(&last_projected),
        );
        let resolver = SnapshotResolver::new(self.store);
        let limit = max_results as usize;
        let mut page = Page::default();

        while page.rows.len() < limit {
            let Some(candidate) = scanner.next_candidate()? else {
                break;
            };

            let Some(mut row) = resolver.resolve_row(&candidate.identity, max_block_index)? else {
                trace!(index = %layout.name(), key = ?candidate.identity, "skipped invisible key");
                page.skipped += 1;
                continue;
            };

            if let Some(join) = &self.join {
                let joined = join.resolve_join(&row, max_block_index)?;
                row.values.extend(joined);
            }
            page.rows.push(row);
        }

        if page.rows.len() == limit {
            page.more =
                self.next_visible(&mut scanner, &resolver, max_block_index, &mut page.skipped)?;
        }

        debug!(
            index = %layout.name(),
            max_block_index,
            rows = page.rows.len(),
            skipped = page.skipped,
            more = page.more.is_some(),
            "executed page"
        );
        Ok(page)
    }

    /// Raw sort key of the next candidate with a version visible at the
    /// snapshot. Keys only visible above the snapshot never produce a token.
    fn next_visible(
        &self,
        scanner: &mut KeysetScanner<'_>,
        resolver: &SnapshotResolver<'_>,
        max_block_index: u64,
        skipped: &mut usize,
    ) -> Result<Option<Vec<Value>>, Error> {
        while let Some(candidate) = scanner.next_candidate()? {
            if resolver.resolve(&candidate.identity, max_block_index)?.is_absent() {
                *skipped += 1;
                continue;
            }
            return Ok(Some(self.index.layout().bound_of(&candidate.identity)));
        }
        Ok(None)
    }

    /// Follow continuations until the range is exhausted.
    pub fn execute_all(
        &self,
        first: &[Value],
        last: &[Value],
        max_block_index: u64,
        page_size: u32,
    ) -> Result<Vec<ResolvedRow>, Error> {
        if page_size == 0 {
            return Err(Error::ContractViolation(
                "page size must be positive to make progress".into(),
            ));
        }

        let mut rows = Vec::new();
        let mut cursor = first.to_vec();
        loop {
            let page = self.execute(&cursor, last, max_block_index, page_size)?;
            rows.extend(page.rows);
            match page.more {
                Some(next) => cursor = next,
                None => return Ok(rows),
            }
        }
    }
}
