//! Message validation
//!
//! A receive action compares the actual message against an expected one.
//! Payload comparison is delegated to the first registered validator that
//! supports the message type; headers are always checked separately. Every
//! validator reports the first difference it finds.

pub mod header;
pub mod json;
pub mod matcher;
pub mod text;
pub mod xml;

pub use header::validate_headers;
pub use json::JsonMessageValidator;
pub use text::{BinaryMessageValidator, PlainTextMessageValidator};
pub use xml::XmlMessageValidator;

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::message::{Message, MessageType};

/// Payload validator for one or more message types
pub trait MessageValidator: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &str;

    fn supports(&self, message_type: MessageType) -> bool;

    /// Compare `actual` against `expected`, failing on the first difference
    fn validate(
        &self,
        actual: &Message,
        expected: &Message,
        validation: &ValidationContext,
        context: &TestContext,
    ) -> Result<()>;
}

/// Validators registered on every new context
pub fn default_validators() -> Vec<Arc<dyn MessageValidator>> {
    vec![
        Arc::new(XmlMessageValidator),
        Arc::new(JsonMessageValidator),
        Arc::new(PlainTextMessageValidator),
        Arc::new(BinaryMessageValidator),
    ]
}

/// Per-receive validation settings
///
/// `ignore` paths are excluded from the tree comparison on both sides.
/// `validate_elements` maps a path to the value the actual message must hold
/// there, taking precedence over both the expected tree and the ignore set.
/// `strict` and `ignore_whitespace` fall back to the engine configuration
/// when unset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationContext {
    pub message_type: MessageType,
    pub ignore: BTreeSet<String>,
    pub validate_elements: BTreeMap<String, String>,
    pub namespaces: BTreeMap<String, String>,
    pub strict: Option<bool>,
    pub ignore_whitespace: Option<bool>,
}

impl ValidationContext {
    pub fn new(message_type: MessageType) -> Self {
        Self {
            message_type,
            ignore: BTreeSet::new(),
            validate_elements: BTreeMap::new(),
            namespaces: BTreeMap::new(),
            strict: None,
            ignore_whitespace: None,
        }
    }

    pub fn ignore(mut self, path: impl Into<String>) -> Self {
        self.ignore.insert(path.into());
        self
    }

    pub fn validate_element(mut self, path: impl Into<String>, expected: impl Into<String>) -> Self {
        self.validate_elements.insert(path.into(), expected.into());
        self
    }

    pub fn namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        self.namespaces.insert(prefix.into(), uri.into());
        self
    }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = Some(strict);
        self
    }

    pub fn ignore_whitespace(mut self, ignore: bool) -> Self {
        self.ignore_whitespace = Some(ignore);
        self
    }

    pub fn is_strict(&self, context: &TestContext) -> bool {
        self.strict
            .unwrap_or(context.config().validation.strict)
    }

    pub fn is_ignore_whitespace(&self, context: &TestContext) -> bool {
        self.ignore_whitespace
            .unwrap_or(context.config().validation.ignore_whitespace)
    }

    /// Copy with placeholders in paths, override values and namespace URIs
    /// resolved against `context`
    pub fn resolve(&self, context: &TestContext) -> Result<Self> {
        Ok(Self {
            message_type: self.message_type,
            ignore: self
                .ignore
                .iter()
                .map(|path| context.resolve(path))
                .collect::<Result<_>>()?,
            validate_elements: self
                .validate_elements
                .iter()
                .map(|(path, value)| Ok((context.resolve(path)?, context.resolve(value)?)))
                .collect::<Result<_>>()?,
            namespaces: context.resolve_map(&self.namespaces)?,
            strict: self.strict,
            ignore_whitespace: self.ignore_whitespace,
        })
    }
}

/// Validate payload and headers of `actual` against `expected`
pub fn validate_message(
    actual: &Message,
    expected: &Message,
    validation: &ValidationContext,
    context: &TestContext,
) -> Result<()> {
    let validator = context
        .validator_for(validation.message_type)
        .ok_or_else(|| Error::UnsupportedMessageType(validation.message_type.to_string()))?;

    tracing::debug!(
        validator = validator.name(),
        ignored = validation.ignore.len(),
        overrides = validation.validate_elements.len(),
        "validating message {}",
        actual.id()
    );
    validator.validate(actual, expected, validation, context)?;
    validate_headers(actual, expected)
}

/// Value at `path` in a message payload
pub fn extract_payload_value(
    message: &Message,
    message_type: MessageType,
    path: &str,
    namespaces: &BTreeMap<String, String>,
) -> Result<String> {
    match message_type {
        MessageType::Xml => xml::extract(&message.payload_text(), path, namespaces),
        MessageType::Json => json::extract(&message.payload_text(), path),
        other => Err(Error::invalid_path(
            path,
            format!("path extraction is not supported for {other} payloads"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::Config;

    #[test]
    fn test_defaults_follow_config() {
        let mut config = Config::default();
        config.validation.strict = false;
        config.validation.ignore_whitespace = true;
        let context = TestContext::with_config(config);

        let validation = ValidationContext::new(MessageType::Xml);
        assert!(!validation.is_strict(&context));
        assert!(validation.is_ignore_whitespace(&context));
        assert!(validation.strict(true).is_strict(&context));
    }

    #[test]
    fn test_resolve_placeholders() {
        let context = TestContext::new();
        context.set_variable("element", "sub-elementA").unwrap();
        context.set_variable("value", "text-value").unwrap();

        let validation = ValidationContext::new(MessageType::Xml)
            .ignore("//${element}")
            .validate_element("//${element}", "${value}")
            .resolve(&context)
            .unwrap();
        assert!(validation.ignore.contains("//sub-elementA"));
        assert_eq!(validation.validate_elements["//sub-elementA"], "text-value");
    }

    #[test]
    fn test_validate_message_checks_payload_and_headers() {
        let context = TestContext::new();
        let actual = Message::new("<a>1</a>").header("h", "v");
        let validation = ValidationContext::new(MessageType::Xml);

        validate_message(&actual, &Message::new("<a>1</a>").header("h", "v"), &validation, &context)
            .unwrap();
        assert!(validate_message(
            &actual,
            &Message::new("<a>1</a>").header("h", "w"),
            &validation,
            &context
        )
        .is_err());
        assert!(validate_message(&actual, &Message::new("<a>2</a>"), &validation, &context).is_err());
    }

    #[test]
    fn test_extract_unsupported_type() {
        assert!(matches!(
            extract_payload_value(&Message::new("x"), MessageType::Plaintext, "x", &BTreeMap::new()),
            Err(Error::InvalidPath { .. })
        ));
    }
}
