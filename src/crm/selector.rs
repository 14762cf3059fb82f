//! # CIB Selectors
//!
//! A parsed XPath subset, enough to address role-bearing elements of the CIB:
//!
//! - `/` child steps and `//` descendant steps
//! - element names, `*`, `.` and `..`
//! - predicates `[@attr='value']` and `[@attr]`
//!
//! A selector identifies zero or one element: the first match in document order.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use roxmltree::{Document, Node};

use super::errors::{CrmError, CrmResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Axis {
    Child,
    Descendant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum NodeTest {
    Name(String),
    Any,
    Parent,
    SelfNode,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Predicate {
    attribute: String,
    value: Option<String>,
}

impl Predicate {
    fn matches(&self, node: &Node<'_, '_>) -> bool {
        match (node.attribute(self.attribute.as_str()), &self.value) {
            (Some(actual), Some(expected)) => actual == expected,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Step {
    axis: Axis,
    test: NodeTest,
    predicates: Vec<Predicate>,
}

/// Parsed selector into the CIB document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    steps: Vec<Step>,
}

impl Selector {
    /// Parse a selector expression
    pub fn parse(source: &str) -> CrmResult<Self> {
        Parser::new(source).parse()
    }

    /// The expression this selector was parsed from
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// First element matching this selector, in document order
    pub fn select<'a, 'input>(&self, doc: &'a Document<'input>) -> Option<Node<'a, 'input>> {
        let mut context = vec![doc.root()];

        for step in &self.steps {
            let mut seen = HashSet::new();
            let mut next = Vec::new();

            for node in &context {
                let bases: Vec<Node<'a, 'input>> = match step.axis {
                    Axis::Child => vec![*node],
                    Axis::Descendant => node.descendants().collect(),
                };

                for base in bases {
                    let candidates: Vec<Node<'a, 'input>> = match &step.test {
                        NodeTest::Name(name) => base
                            .children()
                            .filter(|c| c.is_element() && c.tag_name().name() == name)
                            .collect(),
                        NodeTest::Any => base.children().filter(|c| c.is_element()).collect(),
                        NodeTest::Parent => base.parent().filter(|p| p.is_element()).into_iter().collect(),
                        NodeTest::SelfNode => vec![base],
                    };

                    for candidate in candidates {
                        if step.predicates.iter().all(|p| p.matches(&candidate))
                            && seen.insert(candidate.id())
                        {
                            next.push(candidate);
                        }
                    }
                }
            }

            if next.is_empty() {
                return None;
            }
            context = next;
        }

        let matched: HashSet<_> = context
            .iter()
            .filter(|n| n.is_element())
            .map(|n| n.id())
            .collect();

        doc.root().descendants().find(|n| matched.contains(&n.id()))
    }
}

impl FromStr for Selector {
    type Err = CrmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Selector::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}

struct Parser<'s> {
    source: &'s str,
    rest: &'s str,
}

impl<'s> Parser<'s> {
    fn new(source: &'s str) -> Self {
        Self {
            source,
            rest: source.trim(),
        }
    }

    fn error(&self, reason: impl Into<String>) -> CrmError {
        CrmError::InvalidSelector {
            selector: self.source.to_string(),
            reason: reason.into(),
        }
    }

    fn parse(mut self) -> CrmResult<Selector> {
        if self.rest.is_empty() {
            return Err(self.error("empty selector"));
        }

        let mut steps = Vec::new();
        let mut axis = self.separator().unwrap_or(Axis::Child);

        loop {
            steps.push(self.step(axis)?);

            if self.rest.is_empty() {
                break;
            }
            axis = self
                .separator()
                .ok_or_else(|| self.error(format!("unexpected '{}'", self.rest)))?;
        }

        Ok(Selector {
            source: self.source.to_string(),
            steps,
        })
    }

    fn separator(&mut self) -> Option<Axis> {
        if let Some(rest) = self.rest.strip_prefix("//") {
            self.rest = rest;
            Some(Axis::Descendant)
        } else if let Some(rest) = self.rest.strip_prefix('/') {
            self.rest = rest;
            Some(Axis::Child)
        } else {
            None
        }
    }

    fn step(&mut self, axis: Axis) -> CrmResult<Step> {
        let test = if let Some(rest) = self.rest.strip_prefix("..") {
            self.rest = rest;
            NodeTest::Parent
        } else if let Some(rest) = self.rest.strip_prefix('.') {
            self.rest = rest;
            NodeTest::SelfNode
        } else if let Some(rest) = self.rest.strip_prefix('*') {
            self.rest = rest;
            NodeTest::Any
        } else {
            let name = self.name();
            if name.is_empty() {
                return Err(self.error("expected element name"));
            }
            NodeTest::Name(name.to_string())
        };

        let mut predicates = Vec::new();
        while self.rest.starts_with('[') {
            predicates.push(self.predicate()?);
        }

        Ok(Step {
            axis,
            test,
            predicates,
        })
    }

    fn name(&mut self) -> &'s str {
        let end = self
            .rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | ':')))
            .unwrap_or(self.rest.len());
        let (name, rest) = self.rest.split_at(end);
        self.rest = rest;
        name
    }

    fn predicate(&mut self) -> CrmResult<Predicate> {
        self.rest = &self.rest[1..];
        self.rest = self
            .rest
            .strip_prefix('@')
            .ok_or_else(|| self.error("only attribute predicates are supported"))?;

        let attribute = self.name();
        if attribute.is_empty() {
            return Err(self.error("expected attribute name"));
        }

        let value = if let Some(rest) = self.rest.strip_prefix('=') {
            let quote = rest
                .chars()
                .next()
                .filter(|c| *c == '\'' || *c == '"')
                .ok_or_else(|| self.error("expected quoted attribute value"))?;
            let body = &rest[1..];
            let close = body
                .find(quote)
                .ok_or_else(|| self.error("unterminated attribute value"))?;
            self.rest = &body[close + 1..];
            Some(body[..close].to_string())
        } else {
            None
        };

        self.rest = self
            .rest
            .strip_prefix(']')
            .ok_or_else(|| self.error("expected ']'"))?;

        Ok(Predicate {
            attribute: attribute.to_string(),
            value,
        })
    }
}
