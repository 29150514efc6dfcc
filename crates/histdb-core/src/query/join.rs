//! Denormalizing join against a second versioned table.
//!
//! The secondary identity key is read off the resolved primary row, then
//! resolved at the same snapshot. A missing or retracted secondary fact
//! never suppresses the primary row: the joined fields fall back to their
//! type defaults.

use crate::error::Error;
use crate::schema::{ScalarType, TableDef};
use crate::storage::FactStore;
use histdb_proto::Value;

use super::resolver::{ResolvedRow, SnapshotResolver};

/// One secondary field spliced into the output.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinedField {
    /// Position of the field in the secondary table's declaration order.
    pub position: usize,
    /// Output column label.
    pub label: String,
    /// Field type, for defaults.
    pub field_type: ScalarType,
}

/// A validated join: how to derive the secondary key and what to select.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    table: String,
    key_positions: Vec<usize>,
    /// Some key field comes from the primary payload, which tombstones default.
    key_reads_payload: bool,
    fields: Vec<JoinedField>,
}

impl JoinSpec {
    /// Validate a join from `primary` to `secondary`.
    ///
    /// `key_fields` name primary fields, one per secondary identity field
    /// and of the same type. `fields` are `(secondary field, output label)`
    /// pairs; a missing label keeps the field name.
    pub fn new(
        primary: &TableDef,
        secondary: &TableDef,
        key_fields: &[String],
        fields: &[(String, Option<String>)],
    ) -> Result<Self, Error> {
        if key_fields.len() != secondary.keys.len() {
            return Err(Error::Config(format!(
                "join {} -> {}: {} key values for {} identity fields",
                primary.name,
                secondary.name,
                key_fields.len(),
                secondary.keys.len()
            )));
        }

        let secondary_types = secondary.key_types();
        let mut key_positions = Vec::with_capacity(key_fields.len());
        for (name, expected) in key_fields.iter().zip(&secondary_types) {
            let position = primary.field_index(name).ok_or_else(|| {
                Error::Config(format!(
                    "join {} -> {}: unknown key field {}",
                    primary.name, secondary.name, name
                ))
            })?;
            let actual = primary.fields[position].field_type;
            if actual != *expected {
                return Err(Error::Config(format!(
                    "join {} -> {}: key field {} is {}, expected {}",
                    primary.name,
                    secondary.name,
                    name,
                    actual.name(),
                    expected.name()
                )));
            }
            key_positions.push(position);
        }

        let mut selected = Vec::with_capacity(fields.len());
        for (name, new_name) in fields {
            let position = secondary.field_index(name).ok_or_else(|| {
                Error::Config(format!(
                    "join {} -> {}: unknown field {}",
                    primary.name, secondary.name, name
                ))
            })?;
            selected.push(JoinedField {
                position,
                label: new_name.clone().unwrap_or_else(|| name.clone()),
                field_type: secondary.fields[position].field_type,
            });
        }

        Ok(Self {
            table: secondary.name.clone(),
            key_positions,
            key_reads_payload: key_fields.iter().any(|name| !primary.is_key(name)),
            fields: selected,
        })
    }

    /// Secondary table name.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Selected fields, in output order.
    pub fn fields(&self) -> &[JoinedField] {
        &self.fields
    }

    /// Output labels of the joined fields.
    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.label.as_str())
    }

    /// Secondary identity key derived from a primary row.
    pub fn derive_key(&self, primary: &ResolvedRow) -> Vec<Value> {
        self.key_positions
            .iter()
            .map(|&pos| primary.values[pos].clone())
            .collect()
    }

    /// Default value of every joined field.
    pub fn defaults(&self) -> Vec<Value> {
        self.fields
            .iter()
            .map(|f| f.field_type.default_value())
            .collect()
    }
}

/// Resolves a [`JoinSpec`] against the secondary store.
pub struct JoinResolver<'a> {
    spec: &'a JoinSpec,
    resolver: SnapshotResolver<'a>,
}

impl<'a> JoinResolver<'a> {
    /// Create a join resolver. `secondary` must be the store of `spec.table()`.
    pub fn new(spec: &'a JoinSpec, secondary: &'a FactStore) -> Self {
        Self {
            spec,
            resolver: SnapshotResolver::new(secondary),
        }
    }

    /// The join being resolved.
    pub fn spec(&self) -> &JoinSpec {
        self.spec
    }

    /// Joined field values for a primary row at the snapshot.
    pub fn resolve_join(
        &self,
        primary: &ResolvedRow,
        max_block_index: u64,
    ) -> Result<Vec<Value>, Error> {
        // A primary tombstone carries default payload; only identity keys survive it.
        if !primary.present && self.spec.key_reads_payload {
            return Ok(self.spec.defaults());
        }

        let key = self.spec.derive_key(primary);
        match self.resolver.resolve_row(&key, max_block_index)? {
            Some(row) => Ok(self
                .spec
                .fields
                .iter()
                .map(|f| row.values[f.position].clone())
                .collect()),
            None => Ok(self.spec.defaults()),
        }
    }
}
