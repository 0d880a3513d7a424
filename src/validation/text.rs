//! Plaintext and binary payload validation

use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::message::{Message, MessageType};

use super::{matcher, MessageValidator, ValidationContext};

/// Line-by-line text comparison
///
/// Line endings are normalized first. With whitespace ignored, every run of
/// whitespace collapses to one space and the text is compared as one line.
/// An expected payload that is a single matcher is evaluated against the
/// whole actual text.
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainTextMessageValidator;

impl MessageValidator for PlainTextMessageValidator {
    fn name(&self) -> &str {
        "plaintext"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Plaintext
    }

    fn validate(
        &self,
        actual: &Message,
        expected: &Message,
        validation: &ValidationContext,
        context: &TestContext,
    ) -> Result<()> {
        if expected.payload().is_empty() {
            return Ok(());
        }

        let mut expected_text = normalize_line_endings(&expected.payload_text());
        let mut actual_text = normalize_line_endings(&actual.payload_text());
        if validation.is_ignore_whitespace(context) {
            expected_text = collapse_whitespace(&expected_text);
            actual_text = collapse_whitespace(&actual_text);
        }

        if !expected_text.trim().contains('\n') && matcher::is_matcher(&expected_text) {
            return matcher::compare("payload", expected_text.trim(), &actual_text);
        }

        let expected_lines: Vec<&str> = expected_text.lines().collect();
        let actual_lines: Vec<&str> = actual_text.lines().collect();
        for (number, (expected_line, actual_line)) in
            expected_lines.iter().zip(&actual_lines).enumerate()
        {
            matcher::compare(&format!("line {}", number + 1), expected_line, actual_line)?;
        }
        if expected_lines.len() != actual_lines.len() {
            return Err(Error::count_mismatch(
                "lines",
                expected_lines.len(),
                actual_lines.len(),
            ));
        }
        Ok(())
    }
}

/// Byte-for-byte comparison
#[derive(Debug, Default, Clone, Copy)]
pub struct BinaryMessageValidator;

impl MessageValidator for BinaryMessageValidator {
    fn name(&self) -> &str {
        "binary"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Binary
    }

    fn validate(
        &self,
        actual: &Message,
        expected: &Message,
        _validation: &ValidationContext,
        _context: &TestContext,
    ) -> Result<()> {
        let expected = expected.payload().as_bytes();
        let actual = actual.payload().as_bytes();
        if expected.is_empty() {
            return Ok(());
        }

        if let Some(offset) = expected.iter().zip(actual).position(|(e, a)| e != a) {
            return Err(Error::validation_failed(
                &format!("byte {offset}"),
                &format!("0x{:02x}", expected[offset]),
                &format!("0x{:02x}", actual[offset]),
            ));
        }
        if expected.len() != actual.len() {
            return Err(Error::count_mismatch("bytes", expected.len(), actual.len()));
        }
        Ok(())
    }
}

fn normalize_line_endings(text: &str) -> String {
    text.replace("\r\n", "\n").replace('\r', "\n")
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plaintext(actual: &str, expected: &str, validation: &ValidationContext) -> Result<()> {
        PlainTextMessageValidator.validate(
            &Message::new(actual),
            &Message::new(expected),
            validation,
            &TestContext::new(),
        )
    }

    #[test]
    fn test_line_endings_are_normalized() {
        let validation = ValidationContext::new(MessageType::Plaintext);
        plaintext("a\r\nb\r\n", "a\nb", &validation).unwrap();
    }

    #[test]
    fn test_line_mismatch_reports_line_number() {
        let validation = ValidationContext::new(MessageType::Plaintext);
        let err = plaintext("hello\nworld", "hello\nthere", &validation).unwrap_err();
        assert!(matches!(err, Error::ValidationFailed { path, .. } if path == "line 2"));

        assert!(matches!(
            plaintext("hello\nworld\n!", "hello\nworld", &validation),
            Err(Error::ElementCountMismatch { .. })
        ));
    }

    #[test]
    fn test_ignore_whitespace() {
        let validation = ValidationContext::new(MessageType::Plaintext).ignore_whitespace(true);
        plaintext("Hello   \n  world ", "Hello world", &validation).unwrap();
        assert!(plaintext(
            "Hello   \n  world ",
            "Hello world",
            &ValidationContext::new(MessageType::Plaintext)
        )
        .is_err());
    }

    #[test]
    fn test_matchers() {
        let validation = ValidationContext::new(MessageType::Plaintext);
        plaintext("Hello Citrus", "@startsWith('Hello')@", &validation).unwrap();
        plaintext("id: 42\nstatus: ok", "id: @ignore@\nstatus: ok", &validation).unwrap_err();
        plaintext("id: 42\nstatus: ok", "@matches('id: [0-9]+')@\nstatus: ok", &validation).unwrap();
    }

    #[test]
    fn test_binary_comparison() {
        let validator = BinaryMessageValidator;
        let context = TestContext::new();
        let validation = ValidationContext::new(MessageType::Binary);
        let actual = Message::new(vec![1u8, 2, 3]);

        validator
            .validate(&actual, &Message::new(vec![1u8, 2, 3]), &validation, &context)
            .unwrap();
        let err = validator
            .validate(&actual, &Message::new(vec![1u8, 9, 3]), &validation, &context)
            .unwrap_err();
        assert!(matches!(err, Error::ValidationFailed { path, .. } if path == "byte 1"));
        assert!(matches!(
            validator.validate(&actual, &Message::new(vec![1u8, 2]), &validation, &context),
            Err(Error::ElementCountMismatch { .. })
        ));
    }
}
