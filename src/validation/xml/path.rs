//! XML path expressions
//!
//! Supported subset:
//!
//! - absolute (`/a/b`) and descendant (`//a/b`, `a//b`) steps
//! - `*` wildcards and `@attr` / `@*` attribute targets
//! - predicates `[n]`, `[@attr]`, `[@attr='v']`, `[.='v']`, `[text()='v']`
//! - `p:name` (prefix resolved through explicit mappings, then through the
//!   document's own declarations) and `:name` (any namespace)
//!
//! A path not starting with `/` is searched anywhere in the document, so a
//! bare element name selects every element of that name.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use crate::common::{Error, Result};
use crate::context::unquote;

use super::tree::{ElementId, XmlAttribute, XmlDocument, XmlElement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NameTest {
    Any,
    /// Unprefixed name: element without a prefix in the document
    Local(String),
    /// `:name`, any namespace
    AnyNamespace(String),
    Qualified { prefix: String, local: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Predicate {
    Position(usize),
    HasAttribute(NameTest),
    AttributeEquals(NameTest, String),
    TextEquals(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NameTest,
    predicates: Vec<Predicate>,
}

/// A node selected by a path
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum XmlTarget {
    Element(ElementId),
    /// Element id plus attribute index
    Attribute(ElementId, usize),
}

/// A parsed XML path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlPath {
    raw: String,
    steps: Vec<Step>,
    attribute: Option<(Axis, NameTest)>,
}

impl XmlPath {
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::invalid_path(raw, "empty path"));
        }
        let source = if trimmed.starts_with('/') {
            trimmed.to_string()
        } else {
            format!("//{trimmed}")
        };

        let invalid = |reason: &str| Error::invalid_path(raw, reason);
        let mut steps = Vec::new();
        let mut attribute = None;
        let mut rest = source.as_str();

        while !rest.is_empty() {
            let axis = if let Some(r) = rest.strip_prefix("//") {
                rest = r;
                Axis::Descendant
            } else if let Some(r) = rest.strip_prefix('/') {
                rest = r;
                Axis::Child
            } else {
                return Err(invalid("expected '/'"));
            };

            if let Some(r) = rest.strip_prefix('@') {
                if r.contains(['/', '[']) {
                    return Err(invalid("attribute must be the last step"));
                }
                attribute = Some((axis, parse_name_test(r).ok_or_else(|| invalid("missing attribute name"))?));
                break;
            }

            let end = rest.find(['/', '[']).unwrap_or(rest.len());
            let test = parse_name_test(&rest[..end]).ok_or_else(|| invalid("empty step"))?;
            rest = &rest[end..];

            let mut predicates = Vec::new();
            while rest.starts_with('[') {
                let close = find_predicate_end(rest).ok_or_else(|| invalid("unclosed predicate"))?;
                predicates.push(parse_predicate(&rest[1..close]).ok_or_else(|| invalid("unsupported predicate"))?);
                rest = &rest[close + 1..];
            }

            steps.push(Step {
                axis,
                test,
                predicates,
            });
        }

        if steps.is_empty() && attribute.is_none() {
            return Err(invalid("path selects nothing"));
        }

        Ok(Self {
            raw: raw.to_string(),
            steps,
            attribute,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Select the matching nodes of `doc` in document order
    pub fn select(
        &self,
        doc: &XmlDocument,
        namespaces: &BTreeMap<String, String>,
    ) -> Result<Vec<XmlTarget>> {
        let resolver = PrefixResolver {
            path: &self.raw,
            explicit: namespaces,
            declared: doc.declared_prefixes(),
        };

        // None stands for the document node
        let mut context: BTreeSet<Option<ElementId>> = BTreeSet::from([None]);

        for step in &self.steps {
            let mut next = BTreeSet::new();
            for node in &context {
                for candidate in axis_candidates(doc, node.as_deref(), step.axis) {
                    if self.step_matches(doc, &candidate, step, &resolver)? {
                        next.insert(Some(candidate));
                    }
                }
            }
            context = next;
        }

        let Some((axis, test)) = &self.attribute else {
            return Ok(context.into_iter().flatten().map(XmlTarget::Element).collect());
        };

        let mut targets = BTreeSet::new();
        for node in &context {
            let owners: Vec<ElementId> = match (axis, node) {
                (Axis::Child, Some(id)) => vec![id.clone()],
                (Axis::Child, None) => Vec::new(),
                (Axis::Descendant, _) => {
                    let mut owners = axis_candidates(doc, node.as_deref(), Axis::Descendant);
                    if let Some(id) = node {
                        owners.push(id.clone());
                    }
                    owners
                }
            };
            for owner in owners {
                let Some(element) = doc.element(&owner) else {
                    continue;
                };
                for (index, attr) in element.attributes.iter().enumerate() {
                    if attribute_matches(attr, test, &resolver)? {
                        targets.insert(XmlTarget::Attribute(owner.clone(), index));
                    }
                }
            }
        }
        Ok(targets.into_iter().collect())
    }

    fn step_matches(
        &self,
        doc: &XmlDocument,
        id: &[usize],
        step: &Step,
        resolver: &PrefixResolver<'_>,
    ) -> Result<bool> {
        let Some(element) = doc.element(id) else {
            return Ok(false);
        };
        if !element_matches(element, &step.test, resolver)? {
            return Ok(false);
        }

        for predicate in &step.predicates {
            let ok = match predicate {
                Predicate::Position(n) => sibling_position(doc, id, &step.test, resolver)? == *n,
                Predicate::HasAttribute(test) => {
                    any_attribute(element, test, resolver, |_| true)?
                }
                Predicate::AttributeEquals(test, value) => {
                    any_attribute(element, test, resolver, |a| a.value == *value)?
                }
                Predicate::TextEquals(value) => element.text == *value,
            };
            if !ok {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

/// Text value of a selected node
pub fn target_value(doc: &XmlDocument, target: &XmlTarget) -> Option<String> {
    match target {
        XmlTarget::Element(id) => doc.element(id).map(|e| e.text.clone()),
        XmlTarget::Attribute(id, index) => doc
            .element(id)
            .and_then(|e| e.attributes.get(*index))
            .map(|a| a.value.clone()),
    }
}

/// Overwrite the text value of a selected node
pub fn set_target_value(doc: &mut XmlDocument, target: &XmlTarget, value: &str) -> bool {
    match target {
        XmlTarget::Element(id) => match doc.element_mut(id) {
            Some(element) => {
                element.text = value.to_string();
                true
            }
            None => false,
        },
        XmlTarget::Attribute(id, index) => {
            match doc.element_mut(id).and_then(|e| e.attributes.get_mut(*index)) {
                Some(attr) => {
                    attr.value = value.to_string();
                    true
                }
                None => false,
            }
        }
    }
}

struct PrefixResolver<'a> {
    path: &'a str,
    explicit: &'a BTreeMap<String, String>,
    declared: HashMap<String, String>,
}

impl PrefixResolver<'_> {
    fn resolve(&self, prefix: &str) -> Result<&str> {
        self.explicit
            .get(prefix)
            .or_else(|| self.declared.get(prefix))
            .map(String::as_str)
            .ok_or_else(|| {
                Error::invalid_path(self.path, format!("unresolved namespace prefix '{prefix}'"))
            })
    }
}

fn parse_name_test(text: &str) -> Option<NameTest> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if text == "*" {
        return Some(NameTest::Any);
    }
    Some(match text.split_once(':') {
        Some(("", local)) if !local.is_empty() => NameTest::AnyNamespace(local.to_string()),
        Some((prefix, local)) if !local.is_empty() => NameTest::Qualified {
            prefix: prefix.to_string(),
            local: local.to_string(),
        },
        Some(_) => return None,
        None => NameTest::Local(text.to_string()),
    })
}

fn find_predicate_end(text: &str) -> Option<usize> {
    let mut quote = None;
    for (i, c) in text.char_indices().skip(1) {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(c),
            (None, ']') => return Some(i),
            _ => {}
        }
    }
    None
}

fn parse_predicate(text: &str) -> Option<Predicate> {
    let text = text.trim();
    if let Ok(position) = text.parse::<usize>() {
        return (position > 0).then_some(Predicate::Position(position));
    }
    if let Some(attr) = text.strip_prefix('@') {
        return Some(match attr.split_once('=') {
            Some((name, value)) => {
                Predicate::AttributeEquals(parse_name_test(name)?, unquote(value.trim()).to_string())
            }
            None => Predicate::HasAttribute(parse_name_test(attr)?),
        });
    }
    let (lhs, value) = text.split_once('=')?;
    matches!(lhs.trim(), "." | "text()")
        .then(|| Predicate::TextEquals(unquote(value.trim()).to_string()))
}

fn axis_candidates(doc: &XmlDocument, node: Option<&[usize]>, axis: Axis) -> Vec<ElementId> {
    match (node, axis) {
        (None, Axis::Child) => vec![Vec::new()],
        (None, Axis::Descendant) => doc.element_ids(),
        (Some(id), Axis::Child) => doc
            .element(id)
            .map(|e| {
                (0..e.children.len())
                    .map(|i| {
                        let mut child = id.to_vec();
                        child.push(i);
                        child
                    })
                    .collect()
            })
            .unwrap_or_default(),
        (Some(id), Axis::Descendant) => doc
            .element_ids()
            .into_iter()
            .filter(|other| other.len() > id.len() && other.starts_with(id))
            .collect(),
    }
}

fn element_matches(element: &XmlElement, test: &NameTest, resolver: &PrefixResolver<'_>) -> Result<bool> {
    Ok(match test {
        NameTest::Any => true,
        NameTest::Local(local) => element.prefix.is_none() && element.local == *local,
        NameTest::AnyNamespace(local) => element.local == *local,
        NameTest::Qualified { prefix, local } => {
            let uri = resolver.resolve(prefix)?;
            element.local == *local && element.namespace.as_deref() == Some(uri)
        }
    })
}

fn attribute_matches(attr: &XmlAttribute, test: &NameTest, resolver: &PrefixResolver<'_>) -> Result<bool> {
    Ok(match test {
        NameTest::Any => true,
        NameTest::Local(local) => attr.prefix.is_none() && attr.local == *local,
        NameTest::AnyNamespace(local) => attr.local == *local,
        NameTest::Qualified { prefix, local } => {
            let uri = resolver.resolve(prefix)?;
            attr.local == *local && attr.namespace.as_deref() == Some(uri)
        }
    })
}

fn any_attribute(
    element: &XmlElement,
    test: &NameTest,
    resolver: &PrefixResolver<'_>,
    accept: impl Fn(&XmlAttribute) -> bool,
) -> Result<bool> {
    for attr in &element.attributes {
        if attribute_matches(attr, test, resolver)? && accept(attr) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// 1-based position among the siblings passing the same name test
fn sibling_position(
    doc: &XmlDocument,
    id: &[usize],
    test: &NameTest,
    resolver: &PrefixResolver<'_>,
) -> Result<usize> {
    let Some((index, parent_id)) = id.split_last() else {
        return Ok(1);
    };
    let Some(parent) = doc.element(parent_id) else {
        return Ok(0);
    };
    let mut position = 1;
    for sibling in &parent.children[..*index] {
        if element_matches(sibling, test, resolver)? {
            position += 1;
        }
    }
    Ok(position)
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = r#"<root>
        <element attributeA="attribute-value" attributeB="attribute-value">
            <sub-elementA attribute="A">text-value</sub-elementA>
            <sub-elementB attribute="B">text-value</sub-elementB>
            <sub-elementC attribute="C">text-value</sub-elementC>
        </element>
        <element><sub-elementA attribute="A2">other</sub-elementA></element>
    </root>"#;

    fn values(path: &str, doc: &str) -> Vec<String> {
        let doc = XmlDocument::parse(doc).unwrap();
        XmlPath::parse(path)
            .unwrap()
            .select(&doc, &BTreeMap::new())
            .unwrap()
            .iter()
            .filter_map(|t| target_value(&doc, t))
            .collect()
    }

    #[test]
    fn test_absolute_and_descendant_paths() {
        assert_eq!(values("/root/element/sub-elementA", DOC), ["text-value", "other"]);
        assert_eq!(values("//sub-elementB", DOC), ["text-value"]);
        assert_eq!(values("sub-elementA", DOC), ["text-value", "other"]);
        assert_eq!(values("/root/*/sub-elementC", DOC), ["text-value"]);
        assert!(values("/element", DOC).is_empty());
    }

    #[test]
    fn test_attribute_paths() {
        assert_eq!(values("//element/@attributeA", DOC), ["attribute-value"]);
        assert_eq!(values("//@attribute", DOC), ["A", "B", "C", "A2"]);
        assert_eq!(values("/root/element[1]/@*", DOC).len(), 2);
    }

    #[test]
    fn test_predicates() {
        assert_eq!(values("//element[2]/sub-elementA", DOC), ["other"]);
        assert_eq!(values("//sub-elementA[@attribute='A2']", DOC), ["other"]);
        assert_eq!(values("//*[@attribute='B']", DOC), ["text-value"]);
        assert_eq!(values("//element[@attributeB]/sub-elementA", DOC), ["text-value"]);
        assert_eq!(values("//*[.='other']/@attribute", DOC), ["A2"]);
        assert_eq!(values("//sub-elementA[text()='other']", DOC), ["other"]);
    }

    #[test]
    fn test_namespaced_paths() {
        let doc = r#"<ns1:root xmlns='http://test' xmlns:ns1='http://test'>
            <element>default</element>
            <ns1:element>prefixed</ns1:element>
        </ns1:root>"#;

        assert_eq!(values("//element", doc), ["default"]);
        assert_eq!(values("//:element", doc), ["default", "prefixed"]);
        assert_eq!(values("//ns1:element", doc), ["default", "prefixed"]);

        let parsed = XmlDocument::parse(doc).unwrap();
        let mut explicit = BTreeMap::new();
        explicit.insert("t".to_string(), "http://test".to_string());
        let hits = XmlPath::parse("/t:root/t:element")
            .unwrap()
            .select(&parsed, &explicit)
            .unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_prefix_declared_on_root_or_inline() {
        let on_root = r#"<r xmlns:p="urn:p"><p:a>1</p:a></r>"#;
        let inline = r#"<r><p:a xmlns:p="urn:p">1</p:a></r>"#;
        assert_eq!(values("//p:a", on_root), ["1"]);
        assert_eq!(values("//p:a", inline), ["1"]);
        assert_eq!(values("/r/p:a", on_root), values("/r/p:a", inline));
    }

    #[test]
    fn test_unresolved_prefix_is_invalid() {
        let doc = XmlDocument::parse(DOC).unwrap();
        let err = XmlPath::parse("//x:element")
            .unwrap()
            .select(&doc, &BTreeMap::new())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidPath { .. }));
    }

    #[test]
    fn test_malformed_paths() {
        for bad in ["", "/root/", "//a[1", "/a/@b/c", "//a[foo()]", "//a:"] {
            assert!(XmlPath::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn test_set_target_value() {
        let mut doc = XmlDocument::parse(DOC).unwrap();
        let targets = XmlPath::parse("//sub-elementB/@attribute")
            .unwrap()
            .select(&doc, &BTreeMap::new())
            .unwrap();
        assert!(set_target_value(&mut doc, &targets[0], "changed"));
        assert_eq!(target_value(&doc, &targets[0]).as_deref(), Some("changed"));
    }
}
