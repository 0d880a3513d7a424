//! Iterate loop conditions
//!
//! An expression condition is a disjunction of conjunctions of comparisons:
//! `i lt= 3`, `i < ${max} and i != 2`. The index name (bare or as a
//! `${name}` placeholder) is replaced by the current index before the rest
//! of the text is resolved through the context.

use regex::Regex;
use std::sync::Arc;

use crate::common::{Error, Result};
use crate::context::TestContext;

/// Closure form of a loop condition
pub type IteratePredicate = Arc<dyn Fn(i64, &TestContext) -> bool + Send + Sync>;

#[derive(Clone)]
pub enum IterateCondition {
    Expression(String),
    Predicate(IteratePredicate),
}

impl std::fmt::Debug for IterateCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Expression(expression) => f.debug_tuple("Expression").field(expression).finish(),
            Self::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl IterateCondition {
    pub fn expression(expression: impl Into<String>) -> Self {
        Self::Expression(expression.into())
    }

    pub fn predicate<F>(predicate: F) -> Self
    where
        F: Fn(i64, &TestContext) -> bool + Send + Sync + 'static,
    {
        Self::Predicate(Arc::new(predicate))
    }

    /// Whether another pass should run for `index`
    pub fn evaluate(&self, index_name: &str, index: i64, context: &TestContext) -> Result<bool> {
        match self {
            Self::Predicate(predicate) => Ok(predicate(index, context)),
            Self::Expression(expression) => {
                let substituted = substitute_index(expression, index_name, index);
                let resolved = context.resolve(&substituted)?;
                let result = evaluate_expression(&resolved).map_err(|reason| {
                    Error::InvalidCondition {
                        expression: expression.clone(),
                        reason,
                    }
                })?;
                tracing::trace!(expression = %resolved, result, "condition evaluated");
                Ok(result)
            }
        }
    }
}

fn substitute_index(expression: &str, index_name: &str, index: i64) -> String {
    let value = index.to_string();
    let placeholder = format!("${{{index_name}}}");
    let expression = expression.replace(&placeholder, &value);
    match Regex::new(&format!(r"\b{}\b", regex::escape(index_name))) {
        Ok(word) => word.replace_all(&expression, value.as_str()).into_owned(),
        Err(_) => expression,
    }
}

fn evaluate_expression(expression: &str) -> std::result::Result<bool, String> {
    let normalized = expression.split_whitespace().collect::<Vec<_>>().join(" ");
    if normalized.is_empty() {
        return Err("empty condition".to_string());
    }
    for disjunct in normalized.split(" or ") {
        let mut all = true;
        for clause in disjunct.split(" and ") {
            if !evaluate_clause(clause)? {
                all = false;
                break;
            }
        }
        if all {
            return Ok(true);
        }
    }
    Ok(false)
}

const SYMBOL_OPERATORS: [&str; 7] = ["<=", ">=", "==", "!=", "<", ">", "="];
const WORD_OPERATORS: [&str; 5] = ["lt=", "gt=", "lt", "gt", "eq"];

/// Leftmost comparison operator in `clause`: (position, operator)
fn find_operator(clause: &str) -> Option<(usize, &'static str)> {
    for (i, c) in clause.char_indices() {
        let rest = &clause[i..];
        if let Some(op) = SYMBOL_OPERATORS.iter().find(|op| rest.starts_with(**op)) {
            return Some((i, *op));
        }
        if i == 0 || !clause[..i].ends_with(' ') || !c.is_ascii_alphabetic() {
            continue;
        }
        let word = WORD_OPERATORS.iter().find(|op| {
            rest.starts_with(**op)
                && (op.ends_with('=')
                    || rest[op.len()..]
                        .chars()
                        .next()
                        .map_or(true, |next| !next.is_alphanumeric()))
        });
        if let Some(op) = word {
            return Some((i, *op));
        }
    }
    None
}

fn evaluate_clause(clause: &str) -> std::result::Result<bool, String> {
    let clause = clause.trim();
    match clause {
        "true" => return Ok(true),
        "false" => return Ok(false),
        _ => {}
    }

    let (position, op) =
        find_operator(clause).ok_or_else(|| format!("'{clause}' is not a comparison"))?;
    let lhs = clause[..position].trim();
    let rhs = clause[position + op.len()..].trim();
    if lhs.is_empty() || rhs.is_empty() {
        return Err(format!("'{clause}' is missing an operand"));
    }

    if let (Ok(l), Ok(r)) = (lhs.parse::<f64>(), rhs.parse::<f64>()) {
        return Ok(match op {
            "<" | "lt" => l < r,
            "<=" | "lt=" => l <= r,
            ">" | "gt" => l > r,
            ">=" | "gt=" => l >= r,
            "==" | "=" | "eq" => l == r,
            _ => l != r,
        });
    }

    let (l, r) = (unquote(lhs), unquote(rhs));
    match op {
        "==" | "=" | "eq" => Ok(l == r),
        "!=" => Ok(l != r),
        _ => Err(format!("'{op}' needs numeric operands, got '{lhs}' and '{rhs}'")),
    }
}

fn unquote(text: &str) -> &str {
    crate::context::unquote(text.trim())
}
