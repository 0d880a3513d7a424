//! Data dictionary
//!
//! Ordered `path -> value` mappings rewritten into outgoing and expected
//! payloads. XML paths replace element text or attribute values, JSON paths
//! replace leaves. Values are resolved through the context first.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::message::{Message, MessageType};
use crate::validation::json::JsonPath;
use crate::validation::xml::{set_target_value, XmlDocument, XmlPath};

use super::MessageConstructionInterceptor;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataDictionary {
    name: String,
    mappings: Vec<(String, String)>,
    namespaces: BTreeMap<String, String>,
}

impl DataDictionary {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Add a mapping; mappings apply in insertion order
    pub fn mapping(mut self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.mappings.push((path.into(), value.into()));
        self
    }

    /// Namespace prefix used by XML mapping paths
    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    fn apply_xml(&self, text: &str, context: &TestContext) -> Result<String> {
        let mut doc = XmlDocument::parse(text)?;
        for (path, value) in &self.mappings {
            let value = context.resolve(value)?;
            let targets = XmlPath::parse(path)?.select(&doc, &self.namespaces)?;
            for target in &targets {
                set_target_value(&mut doc, target, &value);
            }
            tracing::trace!(dictionary = %self.name, path = %path, hits = targets.len(), "xml mapping applied");
        }
        Ok(doc.to_xml_string())
    }

    fn apply_json(&self, text: &str, context: &TestContext) -> Result<String> {
        let mut root: Value =
            serde_json::from_str(text).map_err(|e| Error::invalid_payload("json", e))?;
        for (path, value) in &self.mappings {
            let value = context.resolve(value)?;
            let locations = JsonPath::parse(path)?.select(&root);
            for location in &locations {
                if let Some(slot) = location.get_mut(&mut root) {
                    *slot = typed_like(slot, &value);
                }
            }
            tracing::trace!(dictionary = %self.name, path = %path, hits = locations.len(), "json mapping applied");
        }
        Ok(serde_json::to_string(&root)?)
    }
}

impl MessageConstructionInterceptor for DataDictionary {
    fn intercept(
        &self,
        mut message: Message,
        message_type: MessageType,
        context: &TestContext,
    ) -> Result<Message> {
        let rewritten = match message_type {
            MessageType::Xml => self.apply_xml(&message.payload_text(), context)?,
            MessageType::Json => self.apply_json(&message.payload_text(), context)?,
            MessageType::Plaintext | MessageType::Binary => return Ok(message),
        };
        message.set_payload(rewritten);
        Ok(message)
    }
}

/// Keep numbers and booleans typed when the replacement parses as one
fn typed_like(existing: &Value, value: &str) -> Value {
    match existing {
        Value::Number(_) => serde_json::from_str::<serde_json::Number>(value)
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(value.to_string())),
        Value::Bool(_) => value
            .parse::<bool>()
            .map(Value::Bool)
            .unwrap_or_else(|_| Value::String(value.to_string())),
        _ => Value::String(value.to_string()),
    }
}
