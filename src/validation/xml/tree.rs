//! Namespace-aware XML document tree
//!
//! Parsed with quick-xml's pull reader. Element and attribute names keep
//! their prefix for display but compare by local name plus resolved
//! namespace URI. Text content of an element is the concatenation of its
//! direct text and CDATA nodes, trimmed.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::borrow::Cow;
use std::collections::HashMap;

use crate::common::{Error, Result};

/// Position of an element: child indices from the root (root is `[]`)
pub type ElementId = Vec<usize>;

type Scope = HashMap<Option<String>, String>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlAttribute {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    pub value: String,
}

impl XmlAttribute {
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct XmlElement {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
    pub attributes: Vec<XmlAttribute>,
    /// `xmlns` declarations made on this element, `None` for the default namespace
    pub declarations: Vec<(Option<String>, String)>,
    pub children: Vec<XmlElement>,
    pub text: String,
}

impl XmlElement {
    pub fn qualified_name(&self) -> String {
        qualify(self.prefix.as_deref(), &self.local)
    }

    /// Same local name and namespace URI
    pub fn same_name(&self, other: &XmlElement) -> bool {
        self.local == other.local && self.namespace == other.namespace
    }

    fn write(&self, out: &mut String) {
        let name = self.qualified_name();
        out.push('<');
        out.push_str(&name);
        for (prefix, uri) in &self.declarations {
            match prefix {
                Some(prefix) => out.push_str(&format!(" xmlns:{prefix}=\"{}\"", escape(uri))),
                None => out.push_str(&format!(" xmlns=\"{}\"", escape(uri))),
            }
        }
        for attr in &self.attributes {
            out.push_str(&format!(" {}=\"{}\"", attr.qualified_name(), escape(&attr.value)));
        }
        if self.children.is_empty() && self.text.is_empty() {
            out.push_str("/>");
            return;
        }
        out.push('>');
        out.push_str(&escape(&self.text));
        for child in &self.children {
            child.write(out);
        }
        out.push_str("</");
        out.push_str(&name);
        out.push('>');
    }
}

/// A parsed XML document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDocument {
    pub root: XmlElement,
}

impl XmlDocument {
    pub fn parse(text: &str) -> Result<Self> {
        let mut reader = Reader::from_str(text);
        let mut stack: Vec<XmlElement> = Vec::new();
        let mut scopes: Vec<Scope> = vec![Scope::new()];
        let mut root: Option<XmlElement> = None;

        loop {
            let event = reader.read_event().map_err(|e| {
                Error::invalid_payload(
                    "xml",
                    format!("error at position {}: {e}", reader.error_position()),
                )
            })?;

            match event {
                Event::Start(start) => {
                    let (element, scope) = open_element(&start, current_scope(&scopes))?;
                    scopes.push(scope);
                    stack.push(element);
                }
                Event::Empty(start) => {
                    let (element, _) = open_element(&start, current_scope(&scopes))?;
                    attach(&mut stack, &mut root, element)?;
                }
                Event::End(_) => {
                    let mut element = stack
                        .pop()
                        .ok_or_else(|| Error::invalid_payload("xml", "unexpected closing tag"))?;
                    scopes.pop();
                    element.text = element.text.trim().to_string();
                    attach(&mut stack, &mut root, element)?;
                }
                Event::Text(text) => {
                    let raw = String::from_utf8_lossy(&text.into_inner()).into_owned();
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&unescape(&raw));
                    }
                }
                Event::CData(data) => {
                    if let Some(current) = stack.last_mut() {
                        current
                            .text
                            .push_str(&String::from_utf8_lossy(&data.into_inner()));
                    }
                }
                Event::GeneralRef(reference) => {
                    let name = String::from_utf8_lossy(&reference).into_owned();
                    let resolved = resolve_entity(&name).ok_or_else(|| {
                        Error::invalid_payload("xml", format!("unknown entity &{name};"))
                    })?;
                    if let Some(current) = stack.last_mut() {
                        current.text.push_str(&resolved);
                    }
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if !stack.is_empty() {
            return Err(Error::invalid_payload("xml", "unexpected end of document"));
        }
        root.map(|root| Self { root })
            .ok_or_else(|| Error::invalid_payload("xml", "document has no root element"))
    }

    pub fn to_xml_string(&self) -> String {
        let mut out = String::new();
        self.root.write(&mut out);
        out
    }

    pub fn element(&self, id: &[usize]) -> Option<&XmlElement> {
        id.iter()
            .try_fold(&self.root, |element, index| element.children.get(*index))
    }

    pub fn element_mut(&mut self, id: &[usize]) -> Option<&mut XmlElement> {
        id.iter()
            .try_fold(&mut self.root, |element, index| element.children.get_mut(*index))
    }

    /// Every element id in document order
    pub fn element_ids(&self) -> Vec<ElementId> {
        let mut ids = Vec::new();
        collect_ids(&self.root, &mut Vec::new(), &mut ids);
        ids
    }

    /// Prefix declarations found anywhere in the document, first one wins
    pub fn declared_prefixes(&self) -> HashMap<String, String> {
        let mut prefixes = HashMap::new();
        for id in self.element_ids() {
            if let Some(element) = self.element(&id) {
                for (prefix, uri) in &element.declarations {
                    if let Some(prefix) = prefix {
                        prefixes.entry(prefix.clone()).or_insert_with(|| uri.clone());
                    }
                }
            }
        }
        prefixes
    }
}

fn collect_ids(element: &XmlElement, current: &mut ElementId, out: &mut Vec<ElementId>) {
    out.push(current.clone());
    for (index, child) in element.children.iter().enumerate() {
        current.push(index);
        collect_ids(child, current, out);
        current.pop();
    }
}

fn current_scope(scopes: &[Scope]) -> Scope {
    scopes.last().cloned().unwrap_or_default()
}

fn open_element(start: &BytesStart<'_>, parent_scope: Scope) -> Result<(XmlElement, Scope)> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let (prefix, local) = split_qname(&name);

    let mut element = XmlElement {
        prefix: prefix.clone(),
        local,
        ..Default::default()
    };
    let mut raw_attributes = Vec::new();

    for attr in start.attributes() {
        let attr = attr.map_err(|e| Error::invalid_payload("xml", e))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = unescape(&String::from_utf8_lossy(&attr.value)).into_owned();

        if key == "xmlns" {
            element.declarations.push((None, value));
        } else if let Some(declared) = key.strip_prefix("xmlns:") {
            element.declarations.push((Some(declared.to_string()), value));
        } else {
            raw_attributes.push((key, value));
        }
    }

    let mut scope = parent_scope;
    for (declared, uri) in &element.declarations {
        scope.insert(declared.clone(), uri.clone());
    }

    element.namespace = scope.get(&prefix).cloned();
    if prefix.is_some() && element.namespace.is_none() {
        return Err(Error::invalid_payload(
            "xml",
            format!("undeclared namespace prefix in <{name}>"),
        ));
    }

    for (key, value) in raw_attributes {
        let (prefix, local) = split_qname(&key);
        // Unprefixed attributes are in no namespace
        let namespace = match &prefix {
            Some(_) => scope.get(&prefix).cloned(),
            None => None,
        };
        element.attributes.push(XmlAttribute {
            prefix,
            local,
            namespace,
            value,
        });
    }

    Ok((element, scope))
}

fn attach(stack: &mut [XmlElement], root: &mut Option<XmlElement>, element: XmlElement) -> Result<()> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(element),
        None if root.is_none() => *root = Some(element),
        None => return Err(Error::invalid_payload("xml", "multiple root elements")),
    }
    Ok(())
}

fn split_qname(name: &str) -> (Option<String>, String) {
    match name.split_once(':') {
        Some((prefix, local)) => (Some(prefix.to_string()), local.to_string()),
        None => (None, name.to_string()),
    }
}

fn qualify(prefix: Option<&str>, local: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local}"),
        None => local.to_string(),
    }
}

fn unescape(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::unescape(raw).unwrap_or(Cow::Borrowed(raw))
}

fn escape(raw: &str) -> Cow<'_, str> {
    quick_xml::escape::escape(raw)
}

fn resolve_entity(name: &str) -> Option<String> {
    if let Some(reference) = name.strip_prefix('#') {
        let code = match reference.strip_prefix('x') {
            Some(hex) => u32::from_str_radix(hex, 16).ok()?,
            None => reference.parse().ok()?,
        };
        return char::from_u32(code).map(String::from);
    }
    let resolved = match name {
        "lt" => "<",
        "gt" => ">",
        "amp" => "&",
        "apos" => "'",
        "quot" => "\"",
        _ => return None,
    };
    Some(resolved.to_string())
}
