//! Variable store and placeholder resolution
//!
//! Resolution scans left to right for `${name}` placeholders and
//! `prefix:function(args)` calls. Variable values are resolved recursively;
//! re-entering a name already on the resolution chain is a cycle.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};

use crate::common::{Error, Result};

use super::functions::FunctionLibrary;

/// Thread-safe mapping from variable name to string value
#[derive(Debug, Default)]
pub struct VariableStore {
    values: RwLock<HashMap<String, String>>,
}

impl VariableStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite a variable
    pub fn set(&self, name: &str, value: impl Into<String>) -> Result<()> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::InvalidVariableName(name.to_string()));
        }
        self.values.write().insert(name.to_string(), value.into());
        Ok(())
    }

    /// Raw (unresolved) value of a variable
    pub fn get(&self, name: &str) -> Option<String> {
        self.values.read().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.values.read().contains_key(name)
    }

    pub fn remove(&self, name: &str) -> Option<String> {
        self.values.write().remove(name)
    }

    /// Sorted copy of every variable
    pub fn snapshot(&self) -> BTreeMap<String, String> {
        self.values
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

/// Resolves placeholders against a variable store and function libraries
pub(crate) struct Resolver<'a> {
    variables: &'a VariableStore,
    libraries: &'a [FunctionLibrary],
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(variables: &'a VariableStore, libraries: &'a [FunctionLibrary]) -> Self {
        Self {
            variables,
            libraries,
        }
    }

    pub(crate) fn resolve(&self, text: &str) -> Result<String> {
        let mut chain = Vec::new();
        self.resolve_with(text, &mut chain)
    }

    /// Value of a variable with its own placeholders resolved
    pub(crate) fn variable(&self, name: &str) -> Result<String> {
        let mut chain = Vec::new();
        self.lookup(name, &mut chain)
    }

    fn resolve_with(&self, text: &str, chain: &mut Vec<String>) -> Result<String> {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        let mut prev: Option<char> = None;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix("${") {
                let end = after.find('}').ok_or_else(|| {
                    Error::InvalidVariableName(format!("unterminated placeholder in '{text}'"))
                })?;
                let value = self.lookup(after[..end].trim(), chain)?;
                out.push_str(&value);
                rest = &after[end + 1..];
                prev = Some('}');
                continue;
            }

            let at_boundary = prev.map_or(true, |c| !(c.is_alphanumeric() || c == '_'));
            if at_boundary {
                if let Some((consumed, value)) = self.try_function(rest, chain)? {
                    out.push_str(&value);
                    rest = &rest[consumed..];
                    prev = Some(')');
                    continue;
                }
            }

            let Some(c) = rest.chars().next() else { break };
            out.push(c);
            rest = &rest[c.len_utf8()..];
            prev = Some(c);
        }

        Ok(out)
    }

    fn lookup(&self, name: &str, chain: &mut Vec<String>) -> Result<String> {
        if chain.iter().any(|n| n == name) {
            let mut cycle = chain.clone();
            cycle.push(name.to_string());
            return Err(Error::CyclicResolution {
                chain: cycle.join(" -> "),
            });
        }

        let raw = self.variables.get(name).ok_or_else(|| Error::UnknownVariable {
            name: name.to_string(),
        })?;

        chain.push(name.to_string());
        let resolved = self.resolve_with(&raw, chain);
        chain.pop();
        resolved
    }

    /// Try to parse and evaluate `prefix:name(args)` at the start of `text`
    ///
    /// Returns the number of bytes consumed and the call's result, or `None`
    /// when `text` does not start with a call to a registered library.
    fn try_function(&self, text: &str, chain: &mut Vec<String>) -> Result<Option<(usize, String)>> {
        for library in self.libraries {
            let Some(after_prefix) = text
                .strip_prefix(library.prefix())
                .and_then(|t| t.strip_prefix(':'))
            else {
                continue;
            };

            let name_len = after_prefix
                .char_indices()
                .find(|(_, c)| !(c.is_ascii_alphanumeric() || *c == '_'))
                .map_or(after_prefix.len(), |(i, _)| i);
            if name_len == 0 || !after_prefix[name_len..].starts_with('(') {
                continue;
            }
            let name = &after_prefix[..name_len];

            let args_start = name_len + 1;
            let close = find_closing_paren(&after_prefix[args_start..]).ok_or_else(|| {
                Error::FunctionFailed {
                    function: format!("{}:{}", library.prefix(), name),
                    reason: "missing closing parenthesis".to_string(),
                }
            })?;
            let raw_args = &after_prefix[args_start..args_start + close];

            let function = library.get(name).ok_or_else(|| Error::UnknownFunction {
                name: format!("{}:{}", library.prefix(), name),
            })?;

            let mut args = Vec::new();
            for arg in split_arguments(raw_args) {
                args.push(self.resolve_with(unquote(arg.trim()), chain)?);
            }

            tracing::debug!(function = name, ?args, "calling function");
            let value = function(&args).map_err(|reason| Error::FunctionFailed {
                function: format!("{}:{}", library.prefix(), name),
                reason,
            })?;

            let consumed = library.prefix().len() + 1 + args_start + close + 1;
            return Ok(Some((consumed, value)));
        }

        Ok(None)
    }
}

/// Byte offset of the parenthesis closing an argument list
fn find_closing_paren(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quoted = false;
    for (i, c) in text.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => {
                if depth == 0 {
                    return Some(i);
                }
                depth -= 1;
            }
            _ => {}
        }
    }
    None
}

/// Split an argument list on top-level commas
pub(crate) fn split_arguments(raw: &str) -> Vec<&str> {
    if raw.trim().is_empty() {
        return Vec::new();
    }

    let mut args = Vec::new();
    let mut depth = 0usize;
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in raw.char_indices() {
        match c {
            '\'' => quoted = !quoted,
            '(' if !quoted => depth += 1,
            ')' if !quoted => depth = depth.saturating_sub(1),
            ',' if !quoted && depth == 0 => {
                args.push(&raw[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    args.push(&raw[start..]);
    args
}

/// Strip one pair of surrounding single quotes
pub(crate) fn unquote(arg: &str) -> &str {
    arg.strip_prefix('\'')
        .and_then(|a| a.strip_suffix('\''))
        .unwrap_or(arg)
}
