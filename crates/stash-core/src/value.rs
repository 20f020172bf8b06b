//! Cached value model.
//!
//! Values are a tagged union rather than an opaque payload so the counter
//! engine can check the stored kind without probing the contents.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A value held in the global keyspace or a request region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CacheValue {
    /// Signed 64-bit integer. The only kind counters operate on.
    Integer(i64),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Vec<u8>),
    /// Structured JSON document.
    Document(serde_json::Value),
}

/// The kind tag of a [`CacheValue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueKind {
    Integer,
    Text,
    Bytes,
    Document,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ValueKind::Integer => "integer",
            ValueKind::Text => "text",
            ValueKind::Bytes => "bytes",
            ValueKind::Document => "document",
        };
        f.write_str(name)
    }
}

impl CacheValue {
    /// Returns the kind tag of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            CacheValue::Integer(_) => ValueKind::Integer,
            CacheValue::Text(_) => ValueKind::Text,
            CacheValue::Bytes(_) => ValueKind::Bytes,
            CacheValue::Document(_) => ValueKind::Document,
        }
    }

    /// Returns the integer if this value is a counter.
    ///
    /// No coercion is attempted: `Text("42")` is not an integer.
    #[must_use]
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            CacheValue::Integer(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CacheValue::Text(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            CacheValue::Bytes(b) => Some(b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_document(&self) -> Option<&serde_json::Value> {
        match self {
            CacheValue::Document(doc) => Some(doc),
            _ => None,
        }
    }

    /// Approximate serialized size in bytes.
    ///
    /// Documents are measured by their compact JSON encoding; other kinds by
    /// their payload length. Used for observability, not accounting.
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        match self {
            CacheValue::Integer(_) => std::mem::size_of::<i64>(),
            CacheValue::Text(s) => s.len(),
            CacheValue::Bytes(b) => b.len(),
            CacheValue::Document(doc) => serde_json::to_vec(doc).map(|v| v.len()).unwrap_or(0),
        }
    }
}

impl From<i64> for CacheValue {
    fn from(value: i64) -> Self {
        CacheValue::Integer(value)
    }
}

impl From<i32> for CacheValue {
    fn from(value: i32) -> Self {
        CacheValue::Integer(i64::from(value))
    }
}

impl From<String> for CacheValue {
    fn from(value: String) -> Self {
        CacheValue::Text(value)
    }
}

impl From<&str> for CacheValue {
    fn from(value: &str) -> Self {
        CacheValue::Text(value.to_string())
    }
}

impl From<Vec<u8>> for CacheValue {
    fn from(value: Vec<u8>) -> Self {
        CacheValue::Bytes(value)
    }
}

impl From<serde_json::Value> for CacheValue {
    fn from(value: serde_json::Value) -> Self {
        CacheValue::Document(value)
    }
}
