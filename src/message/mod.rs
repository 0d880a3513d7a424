//! Message model
//!
//! A message is a payload plus an ordered header map. Header values keep
//! their native type so typed headers (`(integer) 5`) survive construction.

mod header;

pub use header::{parse_typed_header, HeaderType, HeaderValue};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::common::{Error, Result};

/// Content type of a message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Xml,
    Json,
    Plaintext,
    Binary,
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Xml => write!(f, "xml"),
            Self::Json => write!(f, "json"),
            Self::Plaintext => write!(f, "plaintext"),
            Self::Binary => write!(f, "binary"),
        }
    }
}

impl FromStr for MessageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "xml" => Ok(Self::Xml),
            "json" => Ok(Self::Json),
            "plaintext" | "text" => Ok(Self::Plaintext),
            "binary" => Ok(Self::Binary),
            other => Err(Error::UnsupportedMessageType(other.to_string())),
        }
    }
}

/// Message payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Payload {
    Text(String),
    Binary(Vec<u8>),
}

impl Payload {
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Binary(bytes) => bytes.is_empty(),
        }
    }

    /// Text content, if this is a text payload
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// Text content, decoding binary payloads lossily
    pub fn to_text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Binary(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        }
    }
}

impl Default for Payload {
    fn default() -> Self {
        Self::Text(String::new())
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Binary(bytes)
    }
}

/// A message exchanged with an endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    id: String,
    payload: Payload,
    headers: BTreeMap<String, HeaderValue>,
    /// Raw out-of-band header blocks (e.g. MIME or SOAP header fragments)
    header_data: Vec<String>,
}

impl Message {
    pub fn new(payload: impl Into<Payload>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            payload: payload.into(),
            headers: BTreeMap::new(),
            header_data: Vec::new(),
        }
    }

    pub fn with_headers(
        payload: impl Into<Payload>,
        headers: BTreeMap<String, HeaderValue>,
    ) -> Self {
        let mut message = Self::new(payload);
        message.headers = headers;
        message
    }

    /// Builder-style header setter
    pub fn header(mut self, name: impl Into<String>, value: impl Into<HeaderValue>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: impl Into<Payload>) {
        self.payload = payload.into();
    }

    /// Payload as text (binary decoded lossily)
    pub fn payload_text(&self) -> String {
        self.payload.to_text()
    }

    pub fn headers(&self) -> &BTreeMap<String, HeaderValue> {
        &self.headers
    }

    pub fn get_header(&self, name: &str) -> Option<&HeaderValue> {
        self.headers.get(name)
    }

    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<HeaderValue>) {
        self.headers.insert(name.into(), value.into());
    }

    pub fn header_data(&self) -> &[String] {
        &self.header_data
    }

    pub fn add_header_data(&mut self, data: impl Into<String>) {
        self.header_data.push(data.into());
    }
}
