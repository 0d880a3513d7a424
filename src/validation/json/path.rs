//! JSON path expressions
//!
//! Supported subset: `$`, `.key`, `['key']`, `[n]`, `[*]`, `.*` and the
//! recursive `..key` / `..*`. A path not starting with `$` is a key
//! searched anywhere in the document (`name` is `$..name`).

use serde_json::Value;
use std::fmt;

use crate::common::{Error, Result};
use crate::context::unquote;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Key(String),
    Index(usize),
    Wildcard,
    Descendant(Option<String>),
}

/// Concrete location of a value inside a document
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PathElement {
    Key(String),
    Index(usize),
}

/// Canonical location, printed as `$.a[0].b`
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Location(pub Vec<PathElement>);

impl Location {
    pub fn child(&self, element: PathElement) -> Self {
        let mut next = self.0.clone();
        next.push(element);
        Self(next)
    }

    pub fn get<'a>(&self, root: &'a Value) -> Option<&'a Value> {
        self.0.iter().try_fold(root, |value, element| match element {
            PathElement::Key(key) => value.get(key.as_str()),
            PathElement::Index(index) => value.get(*index),
        })
    }

    pub fn get_mut<'a>(&self, root: &'a mut Value) -> Option<&'a mut Value> {
        self.0.iter().try_fold(root, |value, element| match element {
            PathElement::Key(key) => value.get_mut(key.as_str()),
            PathElement::Index(index) => value.get_mut(*index),
        })
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for element in &self.0 {
            match element {
                PathElement::Key(key) => write!(f, ".{key}")?,
                PathElement::Index(index) => write!(f, "[{index}]")?,
            }
        }
        Ok(())
    }
}

/// A parsed JSON path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonPath {
    raw: String,
    segments: Vec<Segment>,
}

impl JsonPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_path(raw, "empty path"));
        }
        let invalid = |reason: &str| Error::invalid_path(raw, reason);

        let Some(mut rest) = trimmed.strip_prefix('$') else {
            if trimmed.contains(['.', '[', ']']) {
                return Err(invalid("relative paths must be a plain key"));
            }
            return Ok(Self {
                raw: raw.to_string(),
                segments: vec![Segment::Descendant(Some(trimmed.to_string()))],
            });
        };

        let mut segments = Vec::new();
        while !rest.is_empty() {
            if let Some(r) = rest.strip_prefix("..") {
                let (name, r) = take_name(r);
                if name.is_empty() {
                    return Err(invalid("missing key after '..'"));
                }
                segments.push(Segment::Descendant((name != "*").then(|| name.to_string())));
                rest = r;
            } else if let Some(r) = rest.strip_prefix('.') {
                let (name, r) = take_name(r);
                segments.push(match name {
                    "" => return Err(invalid("missing key after '.'")),
                    "*" => Segment::Wildcard,
                    key => Segment::Key(key.to_string()),
                });
                rest = r;
            } else if let Some(r) = rest.strip_prefix('[') {
                let close = r.find(']').ok_or_else(|| invalid("unclosed bracket"))?;
                let inner = r[..close].trim();
                segments.push(if inner == "*" {
                    Segment::Wildcard
                } else if let Ok(index) = inner.parse::<usize>() {
                    Segment::Index(index)
                } else if inner.len() >= 2 && (inner.starts_with('\'') || inner.starts_with('"')) {
                    Segment::Key(unquote(inner).to_string())
                } else {
                    return Err(invalid("unsupported bracket expression"));
                });
                rest = &r[close + 1..];
            } else {
                return Err(invalid("unexpected character"));
            }
        }

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Locations of every matching value, in document order
    pub fn select(&self, root: &Value) -> Vec<Location> {
        let mut current = vec![Location::default()];
        for segment in &self.segments {
            let mut next = Vec::new();
            for location in &current {
                let Some(value) = location.get(root) else {
                    continue;
                };
                match segment {
                    Segment::Key(key) => {
                        if value.get(key.as_str()).is_some() {
                            next.push(location.child(PathElement::Key(key.clone())));
                        }
                    }
                    Segment::Index(index) => {
                        if value.as_array().is_some_and(|a| *index < a.len()) {
                            next.push(location.child(PathElement::Index(*index)));
                        }
                    }
                    Segment::Wildcard => next.extend(children(location, value)),
                    Segment::Descendant(name) => descendants(location, value, name.as_deref(), &mut next),
                }
            }
            next.dedup();
            current = next;
        }
        current
    }
}

fn take_name(text: &str) -> (&str, &str) {
    let end = text.find(['.', '[']).unwrap_or(text.len());
    (&text[..end], &text[end..])
}

fn entries(value: &Value) -> Vec<(PathElement, &Value)> {
    match value {
        Value::Object(map) => map
            .iter()
            .map(|(k, v)| (PathElement::Key(k.clone()), v))
            .collect(),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, v)| (PathElement::Index(i), v))
            .collect(),
        _ => Vec::new(),
    }
}

fn children(location: &Location, value: &Value) -> Vec<Location> {
    entries(value)
        .into_iter()
        .map(|(element, _)| location.child(element))
        .collect()
}

fn descendants(location: &Location, value: &Value, name: Option<&str>, out: &mut Vec<Location>) {
    for (element, child_value) in entries(value) {
        let matches = match (name, &element) {
            (None, _) => true,
            (Some(name), PathElement::Key(key)) => key == name,
            _ => false,
        };
        let child = location.child(element);
        if matches {
            out.push(child.clone());
        }
        descendants(&child, child_value, name, out);
    }
}
