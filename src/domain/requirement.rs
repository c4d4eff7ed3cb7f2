use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::{
    Attributes, ReqId, SymbolKey, Variant,
    attributes::{FLOW, RATIONALE},
};

/// Identifies a certification document: the repository it lives in and its
/// path relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentKey {
    /// The repository name.
    pub repo_name: String,
    /// Path relative to the repository root.
    pub path: String,
}

impl DocumentKey {
    /// Creates a document key.
    #[must_use]
    pub fn new(repo_name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            repo_name: repo_name.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.repo_name, self.path)
    }
}

/// A requirement or assumption parsed from a certification document.
///
/// Everything except the back-references (`parents`, `children` and `tags`)
/// is fixed once parsed. `parents` and `children` are never serialized; they
/// are rebuilt from `parent_ids` by
/// [`Graph::link_back_references`](crate::Graph::link_back_references).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Requirement {
    /// The requirement identifier.
    pub id: ReqId,
    /// The parents declared in the `Parents` attribute, in declaration order.
    #[serde(default)]
    pub parent_ids: Vec<ReqId>,
    /// Resolved parents, sorted by position.
    #[serde(skip)]
    pub parents: Vec<ReqId>,
    /// Resolved children, sorted by position.
    #[serde(skip)]
    pub children: Vec<ReqId>,
    /// Code symbols that implement or test this requirement.
    #[serde(default)]
    pub tags: Vec<SymbolKey>,
    /// The title.
    pub title: String,
    /// The body text, without the attribute section.
    pub body: String,
    /// Attributes by normalized name.
    #[serde(default)]
    pub attributes: Attributes,
    /// The one-based line or table row the requirement starts on.
    pub position: usize,
    /// The document the requirement was declared in.
    pub document: DocumentKey,
}

impl Requirement {
    /// Creates a requirement with no attributes and no links.
    #[must_use]
    pub fn new(id: ReqId, document: DocumentKey, position: usize) -> Self {
        Self {
            id,
            parent_ids: Vec::new(),
            parents: Vec::new(),
            children: Vec::new(),
            tags: Vec::new(),
            title: String::new(),
            body: String::new(),
            attributes: Attributes::new(),
            position,
            document,
        }
    }

    /// Whether this is a requirement or an assumption.
    #[must_use]
    pub const fn variant(&self) -> Variant {
        self.id.variant()
    }

    /// The numeric part of the identifier.
    #[must_use]
    pub const fn id_number(&self) -> u64 {
        self.id.number()
    }

    /// A requirement is deleted when its title starts with `DELETED`.
    ///
    /// The match is case-sensitive. A deleted requirement keeps its sequence
    /// number and may still have a body.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.title.starts_with("DELETED")
    }

    /// The rationale attribute, if present.
    #[must_use]
    pub fn rationale(&self) -> Option<&str> {
        self.attributes.get(RATIONALE)
    }

    /// The flow tags listed in the `FLOW` attribute.
    pub fn flow_ids(&self) -> impl Iterator<Item = &str> {
        self.attributes
            .get(FLOW)
            .into_iter()
            .flat_map(|flow| flow.split(','))
            .map(str::trim)
    }

    /// Compares two requirements ignoring position and back-references.
    ///
    /// This is the equality used when merging graphs: the same requirement
    /// seen from two repositories must agree on everything it declares.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        self.id == other.id
            && self.parent_ids == other.parent_ids
            && self.title == other.title
            && self.body == other.body
            && self.attributes == other.attributes
            && self.document == other.document
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    fn requirement(title: &str) -> Requirement {
        let mut req = Requirement::new(
            "REQ-TEST-SYS-1".parse().unwrap(),
            DocumentKey::new("repo", "doc.md"),
            3,
        );
        title.clone_into(&mut req.title);
        req
    }

    #[test_case("DELETED", true; "bare marker")]
    #[test_case("DELETED because obsolete", true; "marker with text")]
    #[test_case("deleted", false; "lower case")]
    #[test_case("Not DELETED", false; "marker not at start")]
    fn deletion_marker(title: &str, deleted: bool) {
        assert_eq!(requirement(title).is_deleted(), deleted);
    }

    #[test]
    fn flow_ids_are_trimmed() {
        let mut req = requirement("Title");
        req.attributes
            .insert("Flow", "DF-TEST-1, CF-TEST-2 ,DF-TEST-3".to_string());

        assert_eq!(
            req.flow_ids().collect::<Vec<_>>(),
            vec!["DF-TEST-1", "CF-TEST-2", "DF-TEST-3"]
        );
    }

    #[test]
    fn same_definition_ignores_position_and_links() {
        let a = requirement("Title");
        let mut b = a.clone();
        b.position = 99;
        b.children.push("REQ-TEST-SWH-1".parse().unwrap());

        assert!(a.same_definition(&b));

        b.body = "changed".to_string();
        assert!(!a.same_definition(&b));
    }
}
