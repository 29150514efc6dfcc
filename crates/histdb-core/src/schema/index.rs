//! Index definitions and their compiled layouts.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::table::TableDef;
use super::types::ScalarType;
use crate::error::Error;
use crate::query::TupleComparator;
use crate::storage::key::encode_tuple;
use histdb_proto::Value;

/// Sort direction of one sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Smallest value first.
    #[default]
    Asc,
    /// Largest value first.
    Desc,
}

/// A projection applied to a field before it is ordered on.
///
/// The same expression is applied to stored identity fields (to place a key
/// in the index) and to caller bounds (to place the bound), so a bound and a
/// stored key compare in the same projected space.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyExpression {
    /// Lowercase a string.
    Lowercase,
    /// Keep the first `n` characters of a string or bytes of a byte string.
    Truncate(usize),
    /// Integer division by `n`, rounding toward negative infinity.
    Bucket(u64),
}

impl KeyExpression {
    /// Type produced when applied to a field of `input` type.
    pub fn output_type(&self, input: ScalarType) -> Result<ScalarType, Error> {
        let ok = match self {
            KeyExpression::Lowercase => input == ScalarType::String,
            KeyExpression::Truncate(_) => {
                matches!(input, ScalarType::String | ScalarType::Bytes)
            }
            KeyExpression::Bucket(n) => *n > 0 && input.is_integer(),
        };
        if ok {
            Ok(input)
        } else {
            Err(Error::Config(format!(
                "expression {:?} cannot be applied to {}",
                self,
                input.name()
            )))
        }
    }

    /// Apply the projection.
    pub fn apply(&self, value: &Value) -> Result<Value, Error> {
        let projected = match (self, value) {
            (KeyExpression::Lowercase, Value::String(s)) => Value::String(s.to_lowercase()),
            (KeyExpression::Truncate(n), Value::String(s)) => {
                Value::String(s.chars().take(*n).collect())
            }
            (KeyExpression::Truncate(n), Value::Bytes(b)) => {
                Value::Bytes(b[..b.len().min(*n)].to_vec())
            }
            (KeyExpression::Bucket(n), Value::UInt64(v)) => Value::UInt64(v / n),
            (KeyExpression::Bucket(n), Value::UInt32(v)) => {
                Value::UInt32((*v as u64 / n) as u32)
            }
            (KeyExpression::Bucket(n), Value::Int64(v)) => Value::Int64(bucket_signed(*v, *n)),
            (KeyExpression::Bucket(n), Value::Timestamp(v)) => {
                Value::Timestamp(bucket_signed(*v, *n))
            }
            (KeyExpression::Bucket(n), Value::Int32(v)) => {
                Value::Int32(bucket_signed(*v as i64, *n) as i32)
            }
            _ => {
                return Err(Error::ContractViolation(format!(
                    "expression {:?} cannot be applied to {}",
                    self,
                    value.type_name()
                )))
            }
        };
        Ok(projected)
    }
}

fn bucket_signed(value: i64, n: u64) -> i64 {
    match i64::try_from(n) {
        Ok(n) => value.div_euclid(n),
        // Divisor exceeds every i64: only two buckets remain.
        Err(_) => {
            if value < 0 {
                -1
            } else {
                0
            }
        }
    }
}

/// One component of an index's ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    /// Identity-key field this component reads.
    #[serde(rename = "name")]
    pub field: String,
    /// Ordering of this component.
    #[serde(default)]
    pub direction: Direction,
    /// Optional projection of the field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expression: Option<KeyExpression>,
}

impl SortKey {
    /// Ascending sort on a raw field.
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Asc,
            expression: None,
        }
    }

    /// Descending sort on a raw field.
    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            direction: Direction::Desc,
            expression: None,
        }
    }

    /// Set a projection for this component.
    pub fn with_expression(mut self, expression: KeyExpression) -> Self {
        self.expression = Some(expression);
        self
    }
}

/// A named ordering over a table's identity keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDef {
    /// Index name.
    pub name: String,
    /// Table the index orders.
    pub table: String,
    /// Sort keys, most significant first.
    pub sort_keys: Vec<SortKey>,
}

impl IndexDef {
    /// Create an index with no sort keys.
    pub fn new(name: impl Into<String>, table: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            sort_keys: vec![],
        }
    }

    /// Append a sort key.
    pub fn with_sort_key(mut self, key: SortKey) -> Self {
        self.sort_keys.push(key);
        self
    }

    /// Validate against the table and resolve field positions.
    ///
    /// Every identity field must appear at least once as a raw sort key, so
    /// a sort-key tuple names exactly one identity key.
    pub fn compile(&self, table: &TableDef) -> Result<IndexLayout, Error> {
        if self.table != table.name {
            return Err(Error::Config(format!(
                "index {} is defined on {}, not {}",
                self.name, self.table, table.name
            )));
        }
        if self.sort_keys.is_empty() {
            return Err(Error::Config(format!("index {}: no sort keys", self.name)));
        }

        let mut keys = Vec::with_capacity(self.sort_keys.len());
        let mut raw_covered = HashSet::new();
        for sort_key in &self.sort_keys {
            let identity_pos = table.key_index(&sort_key.field).ok_or_else(|| {
                Error::Config(format!(
                    "index {}: {} is not an identity field of {}",
                    self.name, sort_key.field, table.name
                ))
            })?;
            let field_type = table
                .field(&sort_key.field)
                .map(|f| f.field_type)
                .ok_or_else(|| Error::Config(format!("index {}: unknown field", self.name)))?;

            match &sort_key.expression {
                Some(expression) => {
                    expression.output_type(field_type)?;
                }
                None => {
                    raw_covered.insert(identity_pos);
                }
            }

            keys.push(LayoutKey {
                field: sort_key.field.clone(),
                identity_pos,
                field_type,
                expression: sort_key.expression.clone(),
                direction: sort_key.direction,
            });
        }

        if let Some(missing) = table
            .keys
            .iter()
            .enumerate()
            .find(|(pos, _)| !raw_covered.contains(pos))
        {
            return Err(Error::Config(format!(
                "index {}: identity field {} must appear as a plain sort key",
                self.name, missing.1
            )));
        }

        let comparator = TupleComparator::new(keys.iter().map(|k| k.direction).collect());
        Ok(IndexLayout {
            name: self.name.clone(),
            table: self.table.clone(),
            keys,
            comparator,
        })
    }
}

#[derive(Debug, Clone)]
struct LayoutKey {
    field: String,
    identity_pos: usize,
    field_type: ScalarType,
    expression: Option<KeyExpression>,
    direction: Direction,
}

impl LayoutKey {
    fn project(&self, value: &Value) -> Result<Value, Error> {
        match &self.expression {
            Some(expression) => expression.apply(value),
            None => Ok(value.clone()),
        }
    }
}

/// A compiled index: field positions, projections and the tuple comparator.
#[derive(Debug, Clone)]
pub struct IndexLayout {
    name: String,
    table: String,
    keys: Vec<LayoutKey>,
    comparator: TupleComparator,
}

impl IndexLayout {
    /// Index name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Number of sort keys.
    pub fn arity(&self) -> usize {
        self.keys.len()
    }

    /// Sort-key field names (the shape of bound tuples).
    pub fn field_names(&self) -> Vec<&str> {
        self.keys.iter().map(|k| k.field.as_str()).collect()
    }

    /// Comparator over projected sort-key tuples.
    pub fn comparator(&self) -> &TupleComparator {
        &self.comparator
    }

    /// Reject a bound tuple of the wrong shape or types.
    pub fn check_bound(&self, bound: &[Value]) -> Result<(), Error> {
        if bound.len() != self.keys.len() {
            return Err(Error::ContractViolation(format!(
                "index {}: bound has {} values, expected {} ({})",
                self.name,
                bound.len(),
                self.keys.len(),
                self.field_names().join(", ")
            )));
        }
        for (key, value) in self.keys.iter().zip(bound) {
            if !key.field_type.matches(value) {
                return Err(Error::ContractViolation(format!(
                    "index {}: bound field {} is {}, expected {}",
                    self.name,
                    key.field,
                    value.type_name(),
                    key.field_type.name()
                )));
            }
        }
        Ok(())
    }

    /// Apply each key's projection to a raw tuple shaped like a bound.
    pub fn project(&self, raw: &[Value]) -> Result<Vec<Value>, Error> {
        self.keys
            .iter()
            .zip(raw)
            .map(|(key, value)| key.project(value))
            .collect()
    }

    /// The raw sort-key values of an identity key, shaped like a bound.
    ///
    /// This is what continuation tokens carry.
    pub fn bound_of(&self, identity: &[Value]) -> Vec<Value> {
        self.keys
            .iter()
            .map(|k| identity[k.identity_pos].clone())
            .collect()
    }

    /// Encode a projected tuple into its physical index position.
    pub fn encode(&self, projected: &[Value]) -> Vec<u8> {
        let directions: Vec<Direction> = self.keys.iter().map(|k| k.direction).collect();
        encode_tuple(projected, &directions)
    }

    /// Validate, project and encode a caller bound.
    pub fn position_of_bound(&self, bound: &[Value]) -> Result<Vec<u8>, Error> {
        self.check_bound(bound)?;
        Ok(self.encode(&self.project(bound)?))
    }

    /// Physical index position of an identity key.
    pub fn position_of_identity(&self, identity: &[Value]) -> Result<Vec<u8>, Error> {
        let raw = self.bound_of(identity);
        Ok(self.encode(&self.project(&raw)?))
    }
}
