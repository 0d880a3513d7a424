//! XML payload validation
//!
//! Trees are compared element by element. Nodes selected by an ignore or
//! override path are removed from both trees before counting and pairing;
//! override paths are then checked against the actual message on their own.

mod path;
mod tree;

pub use path::{set_target_value, target_value, XmlPath, XmlTarget};
pub use tree::{ElementId, XmlAttribute, XmlDocument, XmlElement};

use std::collections::{BTreeMap, BTreeSet};

use crate::common::{Error, Result};
use crate::context::TestContext;
use crate::message::{Message, MessageType};

use super::{matcher, MessageValidator, ValidationContext};

/// Validator for XML payloads
#[derive(Debug, Default, Clone, Copy)]
pub struct XmlMessageValidator;

impl MessageValidator for XmlMessageValidator {
    fn name(&self) -> &str {
        "xml"
    }

    fn supports(&self, message_type: MessageType) -> bool {
        message_type == MessageType::Xml
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
            tracing::debug!("empty expected xml payload, skipping tree comparison");
            return Ok(());
        }

        let actual_doc = XmlDocument::parse(&actual.payload_text())?;
        let namespaces = path_namespaces(&actual_doc, &validation.namespaces);
        let excluded: Vec<&str> = validation
            .ignore
            .iter()
            .chain(validation.validate_elements.keys())
            .map(String::as_str)
            .collect();

        if !expected_empty {
            let expected_doc = XmlDocument::parse(&expected.payload_text())?;
            let comparison = TreeComparison {
                expected: Exclusions::select(&expected_doc, &excluded, &namespaces)?,
                actual: Exclusions::select(&actual_doc, &excluded, &namespaces)?,
                strict: validation.is_strict(context),
            };
            comparison.compare(&expected_doc, &actual_doc)?;
        }

        for (path, expected_value) in &validation.validate_elements {
            check_override(&actual_doc, path, expected_value, &namespaces)?;
        }
        Ok(())
    }
}

/// Prefixes usable in ignore and override paths
///
/// Explicit mappings win; any other prefix resolves through the received
/// document's declarations, on both trees.
fn path_namespaces(
    actual_doc: &XmlDocument,
    explicit: &BTreeMap<String, String>,
) -> BTreeMap<String, String> {
    let mut namespaces: BTreeMap<String, String> = actual_doc.declared_prefixes().into_iter().collect();
    namespaces.extend(explicit.iter().map(|(prefix, uri)| (prefix.clone(), uri.clone())));
    namespaces
}

/// Value of the first node `path` selects in an XML payload
pub fn extract(payload: &str, path: &str, namespaces: &BTreeMap<String, String>) -> Result<String> {
    let doc = XmlDocument::parse(payload)?;
    let targets = XmlPath::parse(path)?.select(&doc, namespaces)?;
    targets
        .first()
        .and_then(|target| target_value(&doc, target))
        .ok_or_else(|| Error::invalid_path(path, "no node selected"))
}

fn check_override(
    doc: &XmlDocument,
    path: &str,
    expected: &str,
    namespaces: &BTreeMap<String, String>,
) -> Result<()> {
    let targets = XmlPath::parse(path)?.select(doc, namespaces)?;
    let actual = targets
        .first()
        .and_then(|target| target_value(doc, target))
        .ok_or_else(|| Error::validation_failed(path, expected, "<not found>"))?;
    matcher::compare(path, expected, &actual)
}

/// Nodes removed from comparison
#[derive(Debug, Default)]
struct Exclusions {
    elements: BTreeSet<ElementId>,
    attributes: BTreeSet<(ElementId, usize)>,
}

impl Exclusions {
    fn select(doc: &XmlDocument, paths: &[&str], namespaces: &BTreeMap<String, String>) -> Result<Self> {
        let mut exclusions = Self::default();
        for path in paths {
            for target in XmlPath::parse(path)?.select(doc, namespaces)? {
                match target {
                    XmlTarget::Element(id) => {
                        exclusions.elements.insert(id);
                    }
                    XmlTarget::Attribute(id, index) => {
                        exclusions.attributes.insert((id, index));
                    }
                }
            }
        }
        Ok(exclusions)
    }

    fn kept_children<'a>(&self, element: &'a XmlElement, id: &[usize]) -> Vec<(ElementId, &'a XmlElement)> {
        element
            .children
            .iter()
            .enumerate()
            .map(|(i, child)| {
                let mut child_id = id.to_vec();
                child_id.push(i);
                (child_id, child)
            })
            .filter(|(child_id, _)| !self.elements.contains(child_id))
            .collect()
    }

    fn kept_attributes<'a>(&self, element: &'a XmlElement, id: &[usize]) -> Vec<&'a XmlAttribute> {
        element
            .attributes
            .iter()
            .enumerate()
            .filter(|(i, _)| !self.attributes.contains(&(id.to_vec(), *i)))
            .map(|(_, attr)| attr)
            .collect()
    }
}

struct TreeComparison {
    expected: Exclusions,
    actual: Exclusions,
    strict: bool,
}

impl TreeComparison {
    fn compare(&self, expected: &XmlDocument, actual: &XmlDocument) -> Result<()> {
        if self.expected.elements.contains(&Vec::new()) || self.actual.elements.contains(&Vec::new()) {
            return Ok(());
        }
        let path = format!("/{}", expected.root.qualified_name());
        self.compare_element(&expected.root, &[], &actual.root, &[], &path)
    }

    fn compare_element(
        &self,
        expected: &XmlElement,
        expected_id: &[usize],
        actual: &XmlElement,
        actual_id: &[usize],
        path: &str,
    ) -> Result<()> {
        if expected.local != actual.local {
            return Err(Error::validation_failed(
                path,
                &expected.qualified_name(),
                &actual.qualified_name(),
            ));
        }
        if expected.namespace != actual.namespace {
            return Err(Error::validation_failed(
                &format!("{path} namespace"),
                expected.namespace.as_deref().unwrap_or("<none>"),
                actual.namespace.as_deref().unwrap_or("<none>"),
            ));
        }

        self.compare_attributes(expected, expected_id, actual, actual_id, path)?;

        let expected_children = self.expected.kept_children(expected, expected_id);
        let actual_children = self.actual.kept_children(actual, actual_id);

        if self.strict && expected_children.len() != actual_children.len() {
            return Err(Error::count_mismatch(
                path,
                expected_children.len(),
                actual_children.len(),
            ));
        }

        let mut cursor = 0;
        for (position, (child_id, child)) in expected_children.iter().enumerate() {
            let child_path = child_path(path, &expected_children, position);
            let paired = if self.strict {
                actual_children.get(position)
            } else {
                let found = actual_children[cursor.min(actual_children.len())..]
                    .iter()
                    .position(|(_, candidate)| candidate.same_name(child))
                    .map(|offset| cursor + offset);
                found.map(|index| {
                    cursor = index + 1;
                    &actual_children[index]
                })
            };
            let Some((actual_child_id, actual_child)) = paired else {
                return Err(Error::validation_failed(&child_path, "<element>", "<missing>"));
            };
            self.compare_element(child, child_id, actual_child, actual_child_id, &child_path)?;
        }

        // Pure containers have no text of their own to compare
        if expected.children.is_empty() || !expected.text.is_empty() {
            matcher::compare(path, &expected.text, &actual.text)?;
        }
        Ok(())
    }

    fn compare_attributes(
        &self,
        expected: &XmlElement,
        expected_id: &[usize],
        actual: &XmlElement,
        actual_id: &[usize],
        path: &str,
    ) -> Result<()> {
        let expected_attrs = self.expected.kept_attributes(expected, expected_id);
        let actual_attrs = self.actual.kept_attributes(actual, actual_id);

        if self.strict && expected_attrs.len() != actual_attrs.len() {
            return Err(Error::count_mismatch(
                &format!("{path}/@*"),
                expected_attrs.len(),
                actual_attrs.len(),
            ));
        }

        for attr in expected_attrs {
            let attr_path = format!("{path}/@{}", attr.qualified_name());
            let found = actual_attrs
                .iter()
                .find(|a| a.local == attr.local && a.namespace == attr.namespace);
            match found {
                Some(actual_attr) => matcher::compare(&attr_path, &attr.value, &actual_attr.value)?,
                None => return Err(Error::validation_failed(&attr_path, &attr.value, "<missing>")),
            }
        }
        Ok(())
    }
}

/// Display path of a child, with a position suffix when the name repeats
fn child_path(parent: &str, siblings: &[(ElementId, &XmlElement)], position: usize) -> String {
    let child = siblings[position].1;
    let same_name: Vec<usize> = siblings
        .iter()
        .enumerate()
        .filter(|(_, (_, s))| s.same_name(child))
        .map(|(i, _)| i)
        .collect();
    if same_name.len() > 1 {
        let nth = same_name.iter().position(|i| *i == position).unwrap_or(0) + 1;
        format!("{parent}/{}[{nth}]", child.qualified_name())
    } else {
        format!("{parent}/{}", child.qualified_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ACTUAL: &str = r#"<root>
        <element attributeA="attribute-value" attributeB="attribute-value">
            <sub-elementA attribute="A">text-value</sub-elementA>
            <sub-elementB attribute="B">text-value</sub-elementB>
            <sub-elementC attribute="C">text-value</sub-elementC>
        </element>
    </root>"#;

    fn validate(actual: &str, expected: &str, validation: &ValidationContext) -> Result<()> {
        XmlMessageValidator.validate(
            &Message::new(actual),
            &Message::new(expected),
            validation,
            &TestContext::new(),
        )
    }

    #[test]
    fn test_identical_documents_pass() {
        validate(ACTUAL, ACTUAL, &ValidationContext::new(MessageType::Xml)).unwrap();
    }

    #[test]
    fn test_ignored_elements_and_attributes() {
        let expected = r#"<root>
            <element attributeA="wrong-value" attributeB="attribute-value">
                <sub-elementA attribute="wrong">wrong-value</sub-elementA>
                <sub-elementB attribute="B">text-value</sub-elementB>
                <sub-elementC attribute="C">wrong-value</sub-elementC>
            </element>
        </root>"#;
        let validation = ValidationContext::new(MessageType::Xml)
            .ignore("//root/element/@attributeA")
            .ignore("//sub-elementA")
            .ignore("/root/element/sub-elementC");
        validate(ACTUAL, expected, &validation).unwrap();
    }

    #[test]
    fn test_ignore_whole_subtree() {
        let expected = r#"<root><element attributeA="x"><other/></element></root>"#;
        let validation = ValidationContext::new(MessageType::Xml).ignore("/root/element");
        validate(ACTUAL, expected, &validation).unwrap();
    }

    #[test]
    fn test_ignored_element_missing_on_one_side() {
        let expected = r#"<root>
            <element attributeA="attribute-value" attributeB="attribute-value">
                <sub-elementB attribute="B">text-value</sub-elementB>
                <sub-elementC attribute="C">text-value</sub-elementC>
            </element>
        </root>"#;
        let validation = ValidationContext::new(MessageType::Xml).ignore("//sub-elementA");
        validate(ACTUAL, expected, &validation).unwrap();
    }

    #[test]
    fn test_text_mismatch_reports_path() {
        let expected = ACTUAL.replace(">text-value</sub-elementB>", ">other</sub-elementB>");
        let err = validate(ACTUAL, &expected, &ValidationContext::new(MessageType::Xml)).unwrap_err();
        match err {
            Error::ValidationFailed {
                path,
                expected,
                actual,
            } => {
                assert_eq!(path, "/root/element/sub-elementB");
                assert_eq!(expected, "other");
                assert_eq!(actual, "text-value");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_extra_element_fails_in_strict_mode() {
        let expected = r#"<root><element attributeA="attribute-value" attributeB="attribute-value">
            <sub-elementA attribute="A">text-value</sub-elementA>
        </element></root>"#;
        let strict = ValidationContext::new(MessageType::Xml);
        assert!(matches!(
            validate(ACTUAL, expected, &strict),
            Err(Error::ElementCountMismatch {
                expected: 1,
                actual: 3,
                ..
            })
        ));

        let lenient = ValidationContext::new(MessageType::Xml).strict(false);
        validate(ACTUAL, expected, &lenient).unwrap();
    }

    #[test]
    fn test_override_beats_ignore() {
        let expected = ACTUAL.to_string();
        let validation = ValidationContext::new(MessageType::Xml)
            .ignore("//root/element/sub-elementA")
            .validate_element("//root/element/sub-elementA", "wrong value");
        assert!(matches!(
            validate(ACTUAL, &expected, &validation),
            Err(Error::ValidationFailed { .. })
        ));
    }

    #[test]
    fn test_overrides_without_expected_payload() {
        let validation = ValidationContext::new(MessageType::Xml)
            .validate_element("//element/@attributeA", "attribute-value")
            .validate_element("//sub-elementC", "@startsWith('text')@")
            .validate_element("//*[@attribute='B']", "text-value");
        validate(ACTUAL, "", &validation).unwrap();

        let missing = ValidationContext::new(MessageType::Xml).validate_element("//nothing", "x");
        assert!(matches!(
            validate(ACTUAL, "", &missing),
            Err(Error::ValidationFailed { actual, .. }) if actual == "<not found>"
        ));
    }

    #[test]
    fn test_namespace_prefixes_are_equivalent() {
        let actual = r#"<ns1:root xmlns:ns1="http://test"><ns1:item>1</ns1:item></ns1:root>"#;
        let expected = r#"<a:root xmlns:a="http://test"><a:item>1</a:item></a:root>"#;
        let validation = ValidationContext::new(MessageType::Xml);
        validate(actual, expected, &validation).unwrap();

        let other_namespace = r#"<a:root xmlns:a="http://other"><a:item>1</a:item></a:root>"#;
        assert!(validate(actual, other_namespace, &validation).is_err());
    }

    #[test]
    fn test_paths_use_prefixes_of_received_message() {
        let actual = r#"<ns1:root xmlns:ns1="http://testsuite"><ns1:b>x</ns1:b></ns1:root>"#;
        let expected = r#"<root xmlns="http://testsuite"><b>y</b></root>"#;

        let ignore = ValidationContext::new(MessageType::Xml).ignore("//ns1:b");
        validate(actual, expected, &ignore).unwrap();

        let matching = ValidationContext::new(MessageType::Xml).validate_element("//ns1:b", "x");
        validate(actual, expected, &matching).unwrap();

        let differing = ValidationContext::new(MessageType::Xml).validate_element("//ns1:b", "z");
        assert!(matches!(
            validate(actual, expected, &differing),
            Err(Error::ValidationFailed { actual, .. }) if actual == "x"
        ));
    }

    #[test]
    fn test_explicit_prefix_wins_over_declared_one() {
        let actual = r#"<ns1:root xmlns:ns1="http://testsuite"><ns1:b>x</ns1:b></ns1:root>"#;
        let validation = ValidationContext::new(MessageType::Xml)
            .namespace("ns1", "http://elsewhere")
            .validate_element("//ns1:b", "x");
        assert!(matches!(
            validate(actual, "", &validation),
            Err(Error::ValidationFailed { actual, .. }) if actual == "<not found>"
        ));
    }

    #[test]
    fn test_changes_in_ignored_actual_nodes_do_not_matter() {
        let validation = ValidationContext::new(MessageType::Xml)
            .ignore("//sub-elementA")
            .ignore("//@attribute");
        validate(ACTUAL, ACTUAL, &validation).unwrap();

        let changed = ACTUAL
            .replace(">text-value</sub-elementA>", ">changed</sub-elementA>")
            .replace(r#"attribute="B""#, r#"attribute="other""#)
            .replace(r#"attribute="C""#, r#"attribute="another""#);
        validate(&changed, ACTUAL, &validation).unwrap();

        let unignored = ACTUAL.replace(">text-value</sub-elementB>", ">changed</sub-elementB>");
        assert!(validate(&unignored, ACTUAL, &validation).is_err());
    }

    #[test]
    fn test_matchers_in_expected_tree() {
        let expected = r#"<root>
            <element attributeA="@ignore@" attributeB="@contains('value')@">
                <sub-elementA attribute="A">@matches('text-.*')@</sub-elementA>
                <sub-elementB attribute="B">@ignore@</sub-elementB>
                <sub-elementC attribute="@isOneOf('C','D')@">text-value</sub-elementC>
            </element>
        </root>"#;
        validate(ACTUAL, expected, &ValidationContext::new(MessageType::Xml)).unwrap();
    }

    #[test]
    fn test_invalid_actual_payload() {
        assert!(matches!(
            validate("<root>", ACTUAL, &ValidationContext::new(MessageType::Xml)),
            Err(Error::InvalidPayload { .. })
        ));
    }

    #[test]
    fn test_extract_first_match() {
        assert_eq!(
            extract(ACTUAL, "//@attribute", &BTreeMap::new()).unwrap(),
            "A"
        );
        assert!(extract(ACTUAL, "//none", &BTreeMap::new()).is_err());
    }
}
