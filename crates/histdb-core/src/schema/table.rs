//! Table definitions.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::types::ScalarType;
use crate::error::Error;
use histdb_proto::Value;

/// A typed field of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDef {
    /// Field name.
    pub name: String,
    /// Field data type.
    #[serde(rename = "type")]
    pub field_type: ScalarType,
}

impl FieldDef {
    /// Create a new field.
    pub fn new(name: impl Into<String>, field_type: ScalarType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// A versioned fact table.
///
/// `keys` lists the identity-key fields in identity order. All other fields
/// are payload and are replaced by their type defaults in tombstone rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableDef {
    /// Table name.
    pub name: String,
    /// All fields in declaration order.
    pub fields: Vec<FieldDef>,
    /// Identity-key field names.
    pub keys: Vec<String>,
}

impl TableDef {
    /// Create a table with no fields.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: vec![],
            keys: vec![],
        }
    }

    /// Add a payload field.
    pub fn with_field(mut self, name: impl Into<String>, field_type: ScalarType) -> Self {
        self.fields.push(FieldDef::new(name, field_type));
        self
    }

    /// Add an identity-key field.
    pub fn with_key(mut self, name: impl Into<String>, field_type: ScalarType) -> Self {
        let name = name.into();
        self.keys.push(name.clone());
        self.fields.push(FieldDef::new(name, field_type));
        self
    }

    /// Check field names and key references.
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.is_empty() {
            return Err(Error::Config("table name is empty".into()));
        }
        let mut seen = HashSet::new();
        for field in &self.fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Config(format!(
                    "table {}: duplicate field {}",
                    self.name, field.name
                )));
            }
        }
        if self.keys.is_empty() {
            return Err(Error::Config(format!("table {}: no identity keys", self.name)));
        }
        let mut seen_keys = HashSet::new();
        for key in &self.keys {
            if !seen.contains(key.as_str()) {
                return Err(Error::Config(format!(
                    "table {}: key {} is not a field",
                    self.name, key
                )));
            }
            if !seen_keys.insert(key.as_str()) {
                return Err(Error::Config(format!(
                    "table {}: key {} listed twice",
                    self.name, key
                )));
            }
        }
        Ok(())
    }

    /// Look up a field by name.
    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Position of a field in declaration order.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Position of a field within the identity tuple.
    pub fn key_index(&self, name: &str) -> Option<usize> {
        self.keys.iter().position(|k| k == name)
    }

    /// Check if a field belongs to the identity key.
    pub fn is_key(&self, name: &str) -> bool {
        self.key_index(name).is_some()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Identity-key field types, in identity order.
    pub fn key_types(&self) -> Vec<ScalarType> {
        self.keys
            .iter()
            .filter_map(|k| self.field(k).map(|f| f.field_type))
            .collect()
    }

    /// Payload fields, in declaration order.
    pub fn payload_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| !self.is_key(&f.name))
    }

    /// Default payload used for tombstones.
    pub fn default_payload(&self) -> Vec<Value> {
        self.payload_fields()
            .map(|f| f.field_type.default_value())
            .collect()
    }

    /// Check an identity tuple against the key types.
    pub fn check_identity(&self, identity: &[Value]) -> Result<(), Error> {
        check_values(&self.name, "identity", &self.key_types(), identity)
    }

    /// Check a payload tuple against the payload types.
    pub fn check_payload(&self, payload: &[Value]) -> Result<(), Error> {
        let types: Vec<ScalarType> = self.payload_fields().map(|f| f.field_type).collect();
        check_values(&self.name, "payload", &types, payload)
    }

    /// Interleave identity and payload tuples back into declaration order.
    pub fn assemble(&self, identity: &[Value], payload: &[Value]) -> Vec<Value> {
        let mut payload = payload.iter();
        self.fields
            .iter()
            .map(|f| match self.key_index(&f.name) {
                Some(pos) => identity[pos].clone(),
                None => payload.next().cloned().unwrap_or_else(|| f.field_type.default_value()),
            })
            .collect()
    }

    /// Split a JSON object into identity and payload tuples.
    ///
    /// Identity fields are required. Missing payload fields take their type
    /// default, which is how tombstones are usually written.
    pub fn values_from_json(
        &self,
        object: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<(Vec<Value>, Vec<Value>), Error> {
        let mut identity = Vec::with_capacity(self.keys.len());
        for key in &self.keys {
            let field = self
                .field(key)
                .ok_or_else(|| Error::Config(format!("table {}: unknown key {}", self.name, key)))?;
            let json = object.get(key).ok_or_else(|| {
                Error::ContractViolation(format!("table {}: missing key field {}", self.name, key))
            })?;
            identity.push(field.field_type.value_from_json(json)?);
        }

        let mut payload = Vec::new();
        for field in self.payload_fields() {
            let value = match object.get(&field.name) {
                Some(json) => field.field_type.value_from_json(json)?,
                None => field.field_type.default_value(),
            };
            payload.push(value);
        }

        for name in object.keys() {
            if self.field(name).is_none() {
                return Err(Error::ContractViolation(format!(
                    "table {}: unknown field {}",
                    self.name, name
                )));
            }
        }

        Ok((identity, payload))
    }
}

fn check_values(
    table: &str,
    what: &str,
    types: &[ScalarType],
    values: &[Value],
) -> Result<(), Error> {
    if types.len() != values.len() {
        return Err(Error::ContractViolation(format!(
            "table {}: {} has {} values, expected {}",
            table,
            what,
            values.len(),
            types.len()
        )));
    }
    for (i, (ty, value)) in types.iter().zip(values).enumerate() {
        if !ty.matches(value) {
            return Err(Error::ContractViolation(format!(
                "table {}: {} value {} is {}, expected {}",
                table,
                what,
                i,
                value.type_name(),
                ty.name()
            )));
        }
    }
    Ok(())
}
