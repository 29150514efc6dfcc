//! Scalar types and their default values.

use serde::{Deserialize, Serialize};

use crate::error::Error;
use histdb_proto::Value;

/// Scalar data types a fact field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarType {
    /// Boolean value.
    Bool,
    /// 32-bit signed integer.
    Int32,
    /// 64-bit signed integer.
    Int64,
    /// 32-bit unsigned integer.
    Uint32,
    /// 64-bit unsigned integer.
    Uint64,
    /// 64-bit floating point.
    Float64,
    /// UTF-8 string.
    String,
    /// Binary data.
    Bytes,
    /// 256-bit identifier.
    Checksum256,
    /// Timestamp (microseconds since Unix epoch).
    Timestamp,
}

impl ScalarType {
    /// The store-declared empty value for this type.
    ///
    /// Tombstone rows and absent joins carry this value in every field that
    /// is not part of the requested identity key.
    pub fn default_value(&self) -> Value {
        match self {
            ScalarType::Bool => Value::Bool(false),
            ScalarType::Int32 => Value::Int32(0),
            ScalarType::Int64 => Value::Int64(0),
            ScalarType::Uint32 => Value::UInt32(0),
            ScalarType::Uint64 => Value::UInt64(0),
            ScalarType::Float64 => Value::Float64(0.0),
            ScalarType::String => Value::String(String::new()),
            ScalarType::Bytes => Value::Bytes(Vec::new()),
            ScalarType::Checksum256 => Value::Checksum256([0u8; 32]),
            ScalarType::Timestamp => Value::Timestamp(0),
        }
    }

    /// Check whether a value has this type.
    pub fn matches(&self, value: &Value) -> bool {
        matches!(
            (self, value),
            (ScalarType::Bool, Value::Bool(_))
                | (ScalarType::Int32, Value::Int32(_))
                | (ScalarType::Int64, Value::Int64(_))
                | (ScalarType::Uint32, Value::UInt32(_))
                | (ScalarType::Uint64, Value::UInt64(_))
                | (ScalarType::Float64, Value::Float64(_))
                | (ScalarType::String, Value::String(_))
                | (ScalarType::Bytes, Value::Bytes(_))
                | (ScalarType::Checksum256, Value::Checksum256(_))
                | (ScalarType::Timestamp, Value::Timestamp(_))
        )
    }

    /// Check if this type is an integer type.
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ScalarType::Int32
                | ScalarType::Int64
                | ScalarType::Uint32
                | ScalarType::Uint64
                | ScalarType::Timestamp
        )
    }

    /// Type name as written in configuration files.
    pub fn name(&self) -> &'static str {
        match self {
            ScalarType::Bool => "bool",
            ScalarType::Int32 => "int32",
            ScalarType::Int64 => "int64",
            ScalarType::Uint32 => "uint32",
            ScalarType::Uint64 => "uint64",
            ScalarType::Float64 => "float64",
            ScalarType::String => "string",
            ScalarType::Bytes => "bytes",
            ScalarType::Checksum256 => "checksum256",
            ScalarType::Timestamp => "timestamp",
        }
    }

    /// Convert a JSON literal to a typed value.
    ///
    /// 64-bit integers may be given as decimal strings, binary types as hex.
    pub fn value_from_json(&self, json: &serde_json::Value) -> Result<Value, Error> {
        let mismatch = || {
            Error::ContractViolation(format!("expected {} value, got {}", self.name(), json))
        };

        let value = match self {
            ScalarType::Bool => Value::Bool(json.as_bool().ok_or_else(mismatch)?),
            ScalarType::Int32 => {
                let n = json_i64(json).ok_or_else(mismatch)?;
                Value::Int32(i32::try_from(n).map_err(|_| mismatch())?)
            }
            ScalarType::Int64 => Value::Int64(json_i64(json).ok_or_else(mismatch)?),
            ScalarType::Uint32 => {
                let n = json_u64(json).ok_or_else(mismatch)?;
                Value::UInt32(u32::try_from(n).map_err(|_| mismatch())?)
            }
            ScalarType::Uint64 => Value::UInt64(json_u64(json).ok_or_else(mismatch)?),
            ScalarType::Float64 => Value::Float64(json.as_f64().ok_or_else(mismatch)?),
            ScalarType::String => Value::String(json.as_str().ok_or_else(mismatch)?.to_string()),
            ScalarType::Bytes => {
                let text = json.as_str().ok_or_else(mismatch)?;
                Value::Bytes(hex::decode(text).map_err(|_| mismatch())?)
            }
            ScalarType::Checksum256 => {
                let text = json.as_str().ok_or_else(mismatch)?;
                let bytes = hex::decode(text).map_err(|_| mismatch())?;
                let digest: [u8; 32] = bytes.try_into().map_err(|_| mismatch())?;
                Value::Checksum256(digest)
            }
            ScalarType::Timestamp => Value::Timestamp(json_i64(json).ok_or_else(mismatch)?),
        };

        Ok(value)
    }
}

fn json_i64(json: &serde_json::Value) -> Option<i64> {
    match json {
        serde_json::Value::Number(n) => n.as_i64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn json_u64(json: &serde_json::Value) -> Option<u64> {
    match json {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
