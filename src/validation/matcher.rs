//! Inline validation matchers
//!
//! An expected value of the form `@name(args)@` is evaluated against the
//! actual value instead of being compared literally. `@ignore@` accepts
//! anything.

use regex::Regex;

use crate::common::{Error, Result};
use crate::context::{java_date_format, split_arguments, unquote};

/// Whether `expected` is a matcher expression
pub fn is_matcher(expected: &str) -> bool {
    let expected = expected.trim();
    expected.len() > 2
        && expected.starts_with('@')
        && expected.ends_with('@')
        && expected[1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic())
}

/// Compare an actual value against an expected literal or matcher
pub fn compare(path: &str, expected: &str, actual: &str) -> Result<()> {
    if is_matcher(expected) {
        if evaluate(expected.trim(), actual)? {
            return Ok(());
        }
    } else if expected == actual {
        return Ok(());
    }
    Err(Error::validation_failed(path, expected, actual))
}

/// Evaluate a matcher expression against `actual`
pub fn evaluate(expression: &str, actual: &str) -> Result<bool> {
    let invalid = |reason: String| Error::InvalidMatcher {
        expression: expression.to_string(),
        reason,
    };

    let body = &expression[1..expression.len() - 1];
    let (name, args) = match body.find('(') {
        Some(open) => {
            let close = body
                .rfind(')')
                .filter(|close| *close > open)
                .ok_or_else(|| invalid("missing closing parenthesis".to_string()))?;
            let args: Vec<String> = split_arguments(&body[open + 1..close])
                .into_iter()
                .map(|a| unquote(a.trim()).to_string())
                .collect();
            (body[..open].trim(), args)
        }
        None => (body.trim(), Vec::new()),
    };

    let one = |args: &[String]| -> Result<String> {
        match args {
            [arg] => Ok(arg.clone()),
            _ => Err(invalid(format!("{name} expects one argument, got {}", args.len()))),
        }
    };

    let matched = match name {
        "ignore" => true,
        "equalsIgnoreCase" => actual.to_lowercase() == one(&args)?.to_lowercase(),
        "contains" => actual.contains(&one(&args)?),
        "containsIgnoreCase" => actual
            .to_lowercase()
            .contains(&one(&args)?.to_lowercase()),
        "startsWith" => actual.starts_with(&one(&args)?),
        "endsWith" => actual.ends_with(&one(&args)?),
        "matches" => {
            let pattern = one(&args)?;
            let re = Regex::new(&format!("^(?:{pattern})$"))
                .map_err(|e| invalid(format!("invalid regex: {e}")))?;
            re.is_match(actual)
        }
        "matchesDatePattern" => {
            let format = java_date_format(&one(&args)?).map_err(invalid)?;
            parses_as_date(actual.trim(), &format)
        }
        "isNumber" => actual.trim().parse::<f64>().is_ok(),
        "greaterThan" | "lowerThan" => {
            let bound: f64 = one(&args)?
                .trim()
                .parse()
                .map_err(|_| invalid("bound is not a number".to_string()))?;
            match actual.trim().parse::<f64>() {
                Ok(value) if name == "greaterThan" => value > bound,
                Ok(value) => value < bound,
                Err(_) => false,
            }
        }
        "isOneOf" => {
            if args.is_empty() {
                return Err(invalid("isOneOf expects at least one value".to_string()));
            }
            args.iter().any(|candidate| candidate == actual)
        }
        other => return Err(invalid(format!("unknown matcher '{other}'"))),
    };

    tracing::trace!(expression, actual, matched, "matcher evaluated");
    Ok(matched)
}

fn parses_as_date(value: &str, format: &str) -> bool {
    chrono::NaiveDateTime::parse_from_str(value, format).is_ok()
        || chrono::NaiveDate::parse_from_str(value, format).is_ok()
        || chrono::NaiveTime::parse_from_str(value, format).is_ok()
        || chrono::DateTime::parse_from_str(value, format).is_ok()
}
