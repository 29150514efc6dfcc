//! Order-preserving key encoding.
//!
//! Tuples of values are encoded so that comparing the encodings bytewise
//! gives the same order as comparing the tuples field by field. Every field
//! encoding is prefix-free, which makes tuple concatenation safe and lets a
//! descending field be produced by inverting its bytes.
//!
//! Fact keys append a version suffix to the identity encoding:
//! `[identity][!block_index (8 bytes, big-endian)][present ? 0x00 : 0x01]`
//! so a forward scan over one identity yields versions newest first, with a
//! live version ahead of a tombstone at the same block.

use crate::schema::Direction;
use histdb_proto::Value;

/// Size of the version suffix on fact keys.
pub const VERSION_SUFFIX_SIZE: usize = 9;

/// Terminator for escaped variable-length fields.
const TERMINATOR: [u8; 2] = [0x00, 0x01];

/// Escape sequence for a literal zero byte.
const ESCAPED_ZERO: [u8; 2] = [0x00, 0xFF];

/// Encode a single value, ascending, into the buffer.
///
/// Format per type (one tag byte, then the body):
/// - Integers: big-endian with the sign bit flipped for signed types
/// - Floats: IEEE 754 bits arranged for total ordering
/// - Strings and bytes: zero bytes escaped, then a two-byte terminator
/// - Checksums: the raw 32 bytes
pub fn encode_value_into(value: &Value, buf: &mut Vec<u8>) {
    match value {
        Value::Bool(b) => {
            buf.push(0x01);
            buf.push(u8::from(*b));
        }
        Value::Int32(n) => {
            buf.push(0x02);
            buf.extend_from_slice(&((*n as u32) ^ 0x8000_0000).to_be_bytes());
        }
        Value::Int64(n) => {
            buf.push(0x03);
            buf.extend_from_slice(&((*n as u64) ^ 0x8000_0000_0000_0000).to_be_bytes());
        }
        Value::UInt32(n) => {
            buf.push(0x04);
            buf.extend_from_slice(&n.to_be_bytes());
        }
        Value::UInt64(n) => {
            buf.push(0x05);
            buf.extend_from_slice(&n.to_be_bytes());
        }
        Value::Float64(f) => {
            buf.push(0x06);
            let bits = f.to_bits();
            let sortable = if bits & 0x8000_0000_0000_0000 != 0 {
                !bits // Negative: flip all bits
            } else {
                bits ^ 0x8000_0000_0000_0000 // Positive: flip sign bit
            };
            buf.extend_from_slice(&sortable.to_be_bytes());
        }
        Value::String(s) => {
            buf.push(0x07);
            encode_escaped(s.as_bytes(), buf);
        }
        Value::Bytes(b) => {
            buf.push(0x08);
            encode_escaped(b, buf);
        }
        Value::Checksum256(c) => {
            buf.push(0x09);
            buf.extend_from_slice(c);
        }
        Value::Timestamp(t) => {
            buf.push(0x0A);
            buf.extend_from_slice(&((*t as u64) ^ 0x8000_0000_0000_0000).to_be_bytes());
        }
    }
}

fn encode_escaped(bytes: &[u8], buf: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            buf.extend_from_slice(&ESCAPED_ZERO);
        } else {
            buf.push(b);
        }
    }
    buf.extend_from_slice(&TERMINATOR);
}

/// Encode a tuple with a direction per field.
///
/// Missing directions default to ascending.
pub fn encode_tuple(values: &[Value], directions: &[Direction]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(values.len() * 9);
    for (i, value) in values.iter().enumerate() {
        let start = buf.len();
        encode_value_into(value, &mut buf);
        if directions.get(i) == Some(&Direction::Desc) {
            for b in &mut buf[start..] {
                *b = !*b;
            }
        }
    }
    buf
}

/// Encode an identity tuple (all fields ascending).
pub fn encode_identity(identity: &[Value]) -> Vec<u8> {
    encode_tuple(identity, &[])
}

/// Version suffix for a fact key.
pub fn version_suffix(block_index: u64, present: bool) -> [u8; VERSION_SUFFIX_SIZE] {
    let mut suffix = [0u8; VERSION_SUFFIX_SIZE];
    suffix[..8].copy_from_slice(&(!block_index).to_be_bytes());
    suffix[8] = if present { 0x00 } else { 0x01 };
    suffix
}

/// Full fact key for an encoded identity and a version.
pub fn fact_key(identity: &[u8], block_index: u64, present: bool) -> Vec<u8> {
    let mut key = Vec::with_capacity(identity.len() + VERSION_SUFFIX_SIZE);
    key.extend_from_slice(identity);
    key.extend_from_slice(&version_suffix(block_index, present));
    key
}

/// First fact key of an identity visible at `max_block_index`.
pub fn snapshot_start(identity: &[u8], max_block_index: u64) -> Vec<u8> {
    fact_key(identity, max_block_index, true)
}

/// Greatest possible fact key of an identity.
pub fn identity_end(identity: &[u8]) -> Vec<u8> {
    let mut key = Vec::with_capacity(identity.len() + VERSION_SUFFIX_SIZE);
    key.extend_from_slice(identity);
    key.extend_from_slice(&[0xFF; VERSION_SUFFIX_SIZE]);
    key
}

/// Decode the version suffix of a fact key.
pub fn decode_version(key: &[u8]) -> Option<(u64, bool)> {
    if key.len() < VERSION_SUFFIX_SIZE {
        return None;
    }
    let suffix = &key[key.len() - VERSION_SUFFIX_SIZE..];
    let mut block_bytes = [0u8; 8];
    block_bytes.copy_from_slice(&suffix[..8]);
    let block_index = !u64::from_be_bytes(block_bytes);
    match suffix[8] {
        0x00 => Some((block_index, true)),
        0x01 => Some((block_index, false)),
        _ => None,
    }
}
