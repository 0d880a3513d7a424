//! JSON payload validation

mod path;

pub use path::{JsonPath, Location, PathElement};

use serde_json::Value;
use std::collections::BTreeSet;

use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::message::{Message, MessageType};

use super::{matcher, MessageValidator, ValidationContext};

/// Validator for JSON payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonMessageValidator;

impl MessageValidator for JsonMessageValidator {
    fn name(&self) -> &str {
        "json"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Json
    }

    fn validate(
        &self,
        actual: &Message,
        expected: &Message,
        validation: &ValidationContext,
        context: &TestContext,
    ) -> Result<()> {
        let expected_empty = expected.payload().is_empty();
        if expected_empty && validation.validate_elements.is_empty() {
            tracing::debug!("empty expected json payload, skipping comparison");
            return Ok(());
        }

        let actual_value = parse(&actual.payload_text())?;
        let paths: Vec<JsonPath> = validation
            .ignore
            .iter()
            .chain(validation.validate_elements.keys())
            .map(|p| JsonPath::parse(p))
            .collect::<Result<_>>()?;

        if !expected_empty {
            let expected_value = parse(&expected.payload_text())?;
            let comparison = JsonComparison {
                expected_excluded: excluded(&paths, &expected_value),
                actual_excluded: excluded(&paths, &actual_value),
                strict: validation.is_strict(context),
            };
            comparison.compare(
                &expected_value,
                &Location::default(),
                &actual_value,
                &Location::default(),
            )?;
        }

        for (path, expected) in &validation.validate_elements {
            let location = JsonPath::parse(path)?.select(&actual_value).into_iter().next();
            let actual = location
                .and_then(|l| l.get(&actual_value))
                .map(text_form)
                .ok_or_else(|| Error::validation_failed(path, expected, "<not found>"))?;
            matcher::compare(path, expected, &actual)?;
        }
        Ok(())
    }
}

/// Value of the first node `path` selects in a JSON payload
pub fn extract(payload: &str, path: &str) -> Result<String> {
    let value = parse(payload)?;
    JsonPath::parse(path)?
        .select(&value)
        .first()
        .and_then(|l| l.get(&value))
        .map(text_form)
        .ok_or_else(|| Error::invalid_path(path, "no value selected"))
}

fn parse(text: &str) -> Result<Value> {
    serde_json::from_str(text).map_err(|e| Error::invalid_payload("json", e))
}

fn excluded(paths: &[JsonPath], root: &Value) -> BTreeSet<Location> {
    paths.iter().flat_map(|p| p.select(root)).collect()
}

/// Strings compare by content, everything else by its JSON rendering
fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

struct JsonComparison {
    expected_excluded: BTreeSet<Location>,
    actual_excluded: BTreeSet<Location>,
    strict: bool,
}

impl JsonComparison {
    fn compare(
        &self,
        expected: &Value,
        expected_at: &Location,
        actual: &Value,
        actual_at: &Location,
    ) -> Result<()> {
        if self.expected_excluded.contains(expected_at) || self.actual_excluded.contains(actual_at) {
            return Ok(());
        }
        let path = expected_at.to_string();

        match (expected, actual) {
            (Value::String(s), _) if matcher::is_matcher(s) => {
                matcher::compare(&path, s, &text_form(actual))
            }
            (Value::Object(exp), Value::Object(act)) => {
                let exp_keys: Vec<&String> = exp
                    .keys()
                    .filter(|k| !self.expected_excluded.contains(&expected_at.child(PathElement::Key((*k).clone()))))
                    .collect();
                let act_count = act
                    .keys()
                    .filter(|k| !self.actual_excluded.contains(&actual_at.child(PathElement::Key((*k).clone()))))
                    .count();
                if self.strict && exp_keys.len() != act_count {
                    return Err(Error::count_mismatch(&path, exp_keys.len(), act_count));
                }
                for key in exp_keys {
                    let exp_child = expected_at.child(PathElement::Key(key.clone()));
                    let act_child = actual_at.child(PathElement::Key(key.clone()));
                    match act.get(key) {
                        Some(value) => self.compare(&exp[key], &exp_child, value, &act_child)?,
                        None => {
                            return Err(Error::validation_failed(
                                &exp_child.to_string(),
                                &text_form(&exp[key]),
                                "<missing>",
                            ))
                        }
                    }
                }
                Ok(())
            }
            (Value::Array(exp), Value::Array(act)) => {
                let exp_items = kept_items(exp, expected_at, &self.expected_excluded);
                let act_items = kept_items(act, actual_at, &self.actual_excluded);
                let too_few = act_items.len() < exp_items.len();
                if (self.strict && exp_items.len() != act_items.len()) || too_few {
                    return Err(Error::count_mismatch(&path, exp_items.len(), act_items.len()));
                }
                for ((exp_index, exp_item), (act_index, act_item)) in exp_items.iter().zip(&act_items) {
                    self.compare(
                        exp_item,
                        &expected_at.child(PathElement::Index(*exp_index)),
                        act_item,
                        &actual_at.child(PathElement::Index(*act_index)),
                    )?;
                }
                Ok(())
            }
            (Value::Object(_) | Value::Array(_), _) | (_, Value::Object(_) | Value::Array(_)) => {
                Err(Error::validation_failed(&path, type_name(expected), type_name(actual)))
            }
            _ if expected == actual => Ok(()),
            _ => {
                // "5" matches 5 and "true" matches true
                let expected_text = text_form(expected);
                let actual_text = text_form(actual);
                if expected.is_string() && expected_text == actual_text {
                    Ok(())
                } else {
                    Err(Error::validation_failed(&path, &expected_text, &actual_text))
                }
            }
        }
    }
}

fn kept_items<'a>(items: &'a [Value], at: &Location, excluded: &BTreeSet<Location>) -> Vec<(usize, &'a Value)> {
    items
        .iter()
        .enumerate()
        .filter(|(i, _)| !excluded.contains(&at.child(PathElement::Index(*i))))
        .collect()
}
