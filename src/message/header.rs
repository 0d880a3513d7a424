//! Typed header values
//!
//! A header template may carry an explicit type tag, `(integer) 5`. The set
//! of tags is closed; anything else is rejected.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::common::{Error, Result};

/// Header value with its native type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderValue {
    String(String),
    Integer(i32),
    Long(i64),
    Short(i16),
    Byte(i8),
    Float(f32),
    Double(f64),
    Boolean(bool),
    Object(serde_json::Value),
}

impl fmt::Display for HeaderValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::String(v) => write!(f, "{v}"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Boolean(v) => write!(f, "{v}"),
            Self::Object(serde_json::Value::String(v)) => write!(f, "{v}"),
            Self::Object(v) => write!(f, "{v}"),
        }
    }
}

impl From<&str> for HeaderValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for HeaderValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i32> for HeaderValue {
    fn from(v: i32) -> Self {
        Self::Integer(v)
    }
}

impl From<i64> for HeaderValue {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for HeaderValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<f64> for HeaderValue {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

/// Supported type tags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaderType {
    String,
    Integer,
    Long,
    Short,
    Byte,
    Float,
    Double,
    Boolean,
}

impl FromStr for HeaderType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, String> {
        match s {
            "string" => Ok(Self::String),
            "integer" | "int" => Ok(Self::Integer),
            "long" => Ok(Self::Long),
            "short" => Ok(Self::Short),
            "byte" => Ok(Self::Byte),
            "float" => Ok(Self::Float),
            "double" => Ok(Self::Double),
            "boolean" | "bool" => Ok(Self::Boolean),
            other => Err(format!("unsupported header type '{other}'")),
        }
    }
}

impl HeaderType {
    /// Parse a literal into a value of this type
    pub fn parse_value(self, literal: &str) -> std::result::Result<HeaderValue, String> {
        let literal = literal.trim();
        let value = match self {
            Self::String => HeaderValue::String(literal.to_string()),
            Self::Integer => HeaderValue::Integer(literal.parse().map_err(|e| format!("{e}"))?),
            Self::Long => HeaderValue::Long(literal.parse().map_err(|e| format!("{e}"))?),
            Self::Short => HeaderValue::Short(literal.parse().map_err(|e| format!("{e}"))?),
            Self::Byte => HeaderValue::Byte(literal.parse().map_err(|e| format!("{e}"))?),
            Self::Float => HeaderValue::Float(literal.parse().map_err(|e| format!("{e}"))?),
            Self::Double => HeaderValue::Double(literal.parse().map_err(|e| format!("{e}"))?),
            Self::Boolean => match literal {
                "true" => HeaderValue::Boolean(true),
                "false" => HeaderValue::Boolean(false),
                other => return Err(format!("'{other}' is not a boolean")),
            },
        };
        Ok(value)
    }
}

/// Split a `(type) literal` header value
///
/// Returns `None` for untyped values so callers keep them as strings.
fn split_type_tag(value: &str) -> Option<(&str, &str)> {
    let rest = value.trim_start().strip_prefix('(')?;
    let close = rest.find(')')?;
    let tag = rest[..close].trim();
    if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    Some((tag, &rest[close + 1..]))
}

/// Convert a resolved header template value into its native value
pub fn parse_typed_header(value: &str) -> Result<HeaderValue> {
    let Some((tag, literal)) = split_type_tag(value) else {
        return Ok(HeaderValue::String(value.to_string()));
    };

    let invalid = |reason: String| Error::InvalidHeaderType {
        value: value.to_string(),
        reason,
    };

    let header_type: HeaderType = tag.to_ascii_lowercase().parse().map_err(invalid)?;
    header_type.parse_value(literal).map_err(invalid)
}
