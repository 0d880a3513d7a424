//! Header validation
//!
//! Every expected header must be present on the actual message with an equal
//! value. Values compare by their text form, so a typed expected header
//! `(integer) 5` matches an actual string header `"5"`. Extra actual
//! headers are allowed.

use crate::common::{Error, Result};
use crate::message::Message;

use super::matcher;

pub fn validate_headers(actual: &Message, expected: &Message) -> Result<()> {
    for (name, expected_value) in expected.headers() {
        let path = format!("header:{name}");
        let expected_text = expected_value.to_string();
        let actual_text = actual
            .get_header(name)
            .map(ToString::to_string)
            .ok_or_else(|| Error::validation_failed(&path, &expected_text, "<missing>"))?;
        matcher::compare(&path, &expected_text, &actual_text)?;
    }

    for block in expected.header_data() {
        let block = block.trim();
        if block.is_empty() {
            continue;
        }
        let found = actual.header_data().iter().any(|candidate| {
            let candidate = candidate.trim();
            if matcher::is_matcher(block) {
                matcher::evaluate(block, candidate).unwrap_or(false)
            } else {
                candidate == block
            }
        });
        if !found {
            return Err(Error::validation_failed(
                "header-data",
                block,
                &actual.header_data().join("\n"),
            ));
        }
    }

    tracing::trace!(headers = expected.headers().len(), "headers validated");
    Ok(())
}
