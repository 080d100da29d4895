//! Value encoding for stored cache entries
//!
//! Application values round-trip through the store as a one-byte type
//! sigil plus payload, mirroring the RESP3 type sigils:
//!
//! - `:` integer, ASCII decimal
//! - `,` float, ASCII decimal
//! - `#` boolean, `t` or `f`
//! - `+` UTF-8 string
//! - `$` raw bytes
//!
//! Payloads with no recognized sigil decode as *legacy plain* data:
//! all-ASCII-decimal payloads become integers (this is what a counter
//! mutated by INCRBY/DECRBY looks like on the wire), valid UTF-8
//! becomes a string, anything else raw bytes. That fallback keeps
//! `get` on a counter key shaped exactly like `get` on a saved value.

use crate::error::ProtocolError;

/// An opaque application value stored under a cache key
#[derive(Debug, Clone, PartialEq)]
pub enum CacheValue {
    Integer(i64),
    Float(f64),
    Bool(bool),
    Str(String),
    Bytes(Vec<u8>),
}

impl CacheValue {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            CacheValue::Integer(n) => Some(*n),
            CacheValue::Str(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            CacheValue::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Integer(value)
    }
}

impl From<f64> for CacheValue {
    fn from(value: f64) -> Self {
        CacheValue::Float(value)
    }
}

impl From<bool> for CacheValue {
    fn from(value: bool) -> Self {
        CacheValue::Bool(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Str(value.to_string())
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Str(value)
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Bytes(value)
    }
}

/// Encode a value into its stored form
pub fn encode_value(value: &CacheValue) -> Vec<u8> {
    match value {
        CacheValue::Integer(n) => {
            let mut buf = Vec::with_capacity(21);
            buf.push(b':');
            let mut itoa_buf = itoa::Buffer::new();
            buf.extend_from_slice(itoa_buf.format(*n).as_bytes());
            buf
        }
        CacheValue::Float(f) => {
            let mut buf = vec![b','];
            buf.extend_from_slice(f.to_string().as_bytes());
            buf
        }
        CacheValue::Bool(b) => vec![b'#', if *b { b't' } else { b'f' }],
        CacheValue::Str(s) => {
            let mut buf = Vec::with_capacity(1 + s.len());
            buf.push(b'+');
            buf.extend_from_slice(s.as_bytes());
            buf
        }
        CacheValue::Bytes(data) => {
            let mut buf = Vec::with_capacity(1 + data.len());
            buf.push(b'$');
            buf.extend_from_slice(data);
            buf
        }
    }
}

/// Decode a stored payload back into a value
pub fn decode_value(data: &[u8]) -> Result<CacheValue, ProtocolError> {
    let Some((&sigil, payload)) = data.split_first() else {
        return Ok(CacheValue::Bytes(Vec::new()));
    };

    match sigil {
        b':' => std::str::from_utf8(payload)
            .ok()
            .and_then(|s| s.parse().ok())
            .map(CacheValue::Integer)
            .ok_or_else(|| ProtocolError::Parse("invalid integer payload".to_string())),
        b',' => std::str::from_utf8(payload)
            .ok()
            .and_then(|s| s.parse().ok())
            .map(CacheValue::Float)
            .ok_or_else(|| ProtocolError::Parse("invalid float payload".to_string())),
        b'#' => match payload {
            b"t" => Ok(CacheValue::Bool(true)),
            b"f" => Ok(CacheValue::Bool(false)),
            _ => Err(ProtocolError::Parse("invalid bool payload".to_string())),
        },
        b'+' => String::from_utf8(payload.to_vec())
            .map(CacheValue::Str)
            .map_err(|_| ProtocolError::Parse("invalid UTF-8 string payload".to_string())),
        b'$' => Ok(CacheValue::Bytes(payload.to_vec())),
        _ => Ok(decode_legacy_plain(data)),
    }
}

/// Interpret an unsigiled payload: counter, text, or raw bytes
fn decode_legacy_plain(data: &[u8]) -> CacheValue {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(n) = text.parse::<i64>() {
            return CacheValue::Integer(n);
        }
        return CacheValue::Str(text.to_string());
    }
    CacheValue::Bytes(data.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_string_round_trip() {
        let value = CacheValue::from("hello world");
        assert_eq!(decode_value(&encode_value(&value)).unwrap(), value);
    }

    #[test]
    fn test_integer_round_trip() {
        let value = CacheValue::Integer(-42);
        let encoded = encode_value(&value);
        assert_eq!(encoded, b":-42");
        assert_eq!(decode_value(&encoded).unwrap(), value);
    }

    #[test]
    fn test_bytes_round_trip() {
        let value = CacheValue::Bytes(vec![0xFF, 0x00, 0x7F]);
        assert_eq!(decode_value(&encode_value(&value)).unwrap(), value);
    }

    #[test]
    fn test_bool_round_trip() {
        assert_eq!(
            decode_value(&encode_value(&CacheValue::Bool(true))).unwrap(),
            CacheValue::Bool(true)
        );
    }

    #[test]
    fn test_counter_payload_decodes_as_integer() {
        // INCRBY leaves a bare ASCII number under the key
        assert_eq!(decode_value(b"11").unwrap(), CacheValue::Integer(11));
    }

    #[test]
    fn test_foreign_text_decodes_as_string() {
        assert_eq!(
            decode_value(b"written-by-another-client").unwrap(),
            CacheValue::Str("written-by-another-client".to_string())
        );
    }

    #[test]
    fn test_empty_payload() {
        assert_eq!(decode_value(b"").unwrap(), CacheValue::Bytes(Vec::new()));
    }

    #[test]
    fn test_corrupt_sigil_payload_is_an_error() {
        assert!(decode_value(b":not-a-number").is_err());
    }

    #[test]
    fn test_as_i64_reads_counters_and_numeric_strings() {
        assert_eq!(CacheValue::Integer(7).as_i64(), Some(7));
        assert_eq!(CacheValue::from("7").as_i64(), Some(7));
        assert_eq!(CacheValue::from("seven").as_i64(), None);
    }
}
