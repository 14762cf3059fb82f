//! CIB document parsing and resolved node snapshots.

use std::collections::BTreeMap;

use roxmltree::{Document, Node};
use serde::Serialize;

use super::errors::{CrmError, CrmResult};
use super::selector::Selector;

/// Owned snapshot of an element selected from the CIB
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrmNode {
    /// Element tag name
    pub tag: String,
    /// Element attributes
    pub attributes: BTreeMap<String, String>,
}

impl CrmNode {
    /// Build a node snapshot from a tag and attribute pairs
    pub fn new<'a>(tag: &str, attributes: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        Self {
            tag: tag.to_string(),
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn from_element(node: Node<'_, '_>) -> Self {
        Self {
            tag: node.tag_name().name().to_string(),
            attributes: node
                .attributes()
                .map(|a| (a.name().to_string(), a.value().to_string()))
                .collect(),
        }
    }

    /// Attribute value, or empty if absent
    pub fn attribute(&self, name: &str) -> &str {
        self.attributes.get(name).map(String::as_str).unwrap_or("")
    }

    /// Node name (`uname`)
    pub fn uname(&self) -> &str {
        self.attribute("uname")
    }

    /// Node id (`id`)
    pub fn id(&self) -> &str {
        self.attribute("id")
    }
}

/// Parse CIB output, check quorum and resolve each selector in order.
pub fn resolve(xml: &str, selectors: &[Selector]) -> CrmResult<Vec<Option<CrmNode>>> {
    let doc = Document::parse(xml).map_err(|e| CrmError::Parse(e.to_string()))?;

    if !has_quorum(&doc) {
        return Err(CrmError::NoQuorum);
    }

    Ok(selectors
        .iter()
        .map(|selector| selector.select(&doc).map(CrmNode::from_element))
        .collect())
}

fn has_quorum(doc: &Document<'_>) -> bool {
    let root = doc.root_element();
    root.tag_name().name() == "cib" && root.attribute("have-quorum") == Some("1")
}
