//! Raw attribute values carried from the directory.

use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use itertools::Itertools;
use serde::{Deserialize, Serialize};

/// A directory attribute value as delivered by a connector.
///
/// JSON-shaped records deserialize directly into this type. `Bytes` is only
/// produced by binary-capable connectors (LDAP) and must be decoded before use.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum AttrValue {
    Null,
    Bool(bool),
    Long(i64),
    String(String),
    List(Vec<AttrValue>),
    Map(BTreeMap<String, AttrValue>),
    Bytes(Vec<u8>),
}

impl AttrValue {
    pub fn is_null(&self) -> bool {
        matches!(self, AttrValue::Null)
    }

    /// The value as a string slice when it is a plain string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            AttrValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Empty strings, empty lists and null all count as "no value".
    pub fn is_empty(&self) -> bool {
        match self {
            AttrValue::Null => true,
            AttrValue::String(s) => s.is_empty(),
            AttrValue::List(items) => items.is_empty(),
            AttrValue::Map(entries) => entries.is_empty(),
            AttrValue::Bytes(bytes) => bytes.is_empty(),
            AttrValue::Bool(_) | AttrValue::Long(_) => false,
        }
    }
}

impl From<&str> for AttrValue {
    fn from(value: &str) -> Self {
        AttrValue::String(value.to_string())
    }
}

impl From<String> for AttrValue {
    fn from(value: String) -> Self {
        AttrValue::String(value)
    }
}

impl<T: Into<AttrValue>> From<Option<T>> for AttrValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(AttrValue::Null, Into::into)
    }
}

impl Display for AttrValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            AttrValue::Null => write!(f, "null"),
            AttrValue::Bool(b) => write!(f, "{b}"),
            AttrValue::Long(n) => write!(f, "{n}"),
            AttrValue::String(s) => write!(f, "'{s}'"),
            AttrValue::List(items) => write!(f, "[{}]", items.iter().join(", ")),
            AttrValue::Map(entries) => write!(
                f,
                "{{{}}}",
                entries.iter().map(|(k, v)| format!("{k}: {v}")).join(", ")
            ),
            AttrValue::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
        }
    }
}
