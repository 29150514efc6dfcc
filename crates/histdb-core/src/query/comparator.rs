//! Composite key comparison.

use std::cmp::Ordering;

use crate::schema::Direction;

/// Lexicographic order over fixed-shape tuples, one direction per field.
///
/// The comparator is generic over the element type; callers that compare
/// computed sort keys supply a projection per field through
/// [`compare_by`](Self::compare_by).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TupleComparator {
    directions: Vec<Direction>,
}

impl TupleComparator {
    /// Create a comparator with the given per-field directions.
    pub fn new(directions: Vec<Direction>) -> Self {
        Self { directions }
    }

    /// Number of fields compared.
    pub fn arity(&self) -> usize {
        self.directions.len()
    }

    /// Per-field directions.
    pub fn directions(&self) -> &[Direction] {
        &self.directions
    }

    /// Compare two tuples field by field.
    pub fn compare<T: Ord>(&self, a: &[T], b: &[T]) -> Ordering {
        self.compare_fields(a, b, |_, x, y| x.cmp(y))
    }

    /// Compare two tuples after projecting each field.
    ///
    /// `project` receives the field position and the stored element.
    pub fn compare_by<T, K, F>(&self, a: &[T], b: &[T], mut project: F) -> Ordering
    where
        K: Ord,
        F: FnMut(usize, &T) -> K,
    {
        self.compare_fields(a, b, |pos, x, y| project(pos, x).cmp(&project(pos, y)))
    }

    fn compare_fields<T, F>(&self, a: &[T], b: &[T], mut field_cmp: F) -> Ordering
    where
        F: FnMut(usize, &T, &T) -> Ordering,
    {
        for (pos, (x, y)) in a.iter().zip(b).enumerate() {
            let ord = field_cmp(pos, x, y);
            let ord = match self.directions.get(pos) {
                Some(Direction::Desc) => ord.reverse(),
                _ => ord,
            };
            if ord != Ordering::Equal {
                return ord;
            }
        }
        a.len().cmp(&b.len())
    }

    /// Check that a tuple sequence is strictly increasing.
    pub fn is_strictly_ascending<T: Ord>(&self, tuples: &[Vec<T>]) -> bool {
        tuples
            .windows(2)
            .all(|w| self.compare(&w[0], &w[1]) == Ordering::Less)
    }
}
