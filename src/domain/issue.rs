//! Diagnostics produced while building and resolving a graph.

use serde::{Deserialize, Serialize};

/// How serious an issue is.
///
/// The core never decides whether a run passes; callers typically fail on any
/// [`Severity::Major`] issue and treat notes as lint output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Breaks traceability.
    Major,
    /// Should be fixed.
    Minor,
    /// Informational.
    Note,
}

/// The category of an issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum IssueType {
    /// A requirement ID that does not fit the document's schema or sequence.
    InvalidRequirementId,
    /// A parent that does not exist, is deleted or violates the link rules.
    InvalidParent,
    /// A reference in a requirement body to a missing or deleted requirement.
    InvalidRequirementReference,
    /// A code comment referring to a bad requirement, or conflicting
    /// declarations of the same symbol.
    InvalidRequirementInCode,
    /// A code symbol with no requirement references.
    MissingRequirementInCode,
    /// A required attribute that is absent or empty.
    MissingAttribute,
    /// An attribute that the schema does not know.
    UnknownAttribute,
    /// An attribute whose value does not match the schema.
    InvalidAttributeValue,
    /// A requirement covered by tests but not by implementation code.
    ReqTestedButNotImplemented,
    /// A requirement with no implementation code.
    ReqNotImplemented,
    /// A requirement with no tests.
    ReqNotTested,
    /// A requirement body with no SHALL statement.
    NoShallInBody,
    /// A requirement body with more than one SHALL statement.
    ManyShallInBody,
    /// A rationale containing a SHALL statement.
    ShallInRationale,
    /// A flow tag declared more than once.
    DuplicateFlowId,
    /// A flow tag that is unknown or belongs to another project.
    InvalidFlowId,
    /// A gap in a flow tag sequence.
    MissingFlowId,
    /// A requirement referring to a flow tag of another project.
    FlowIdOfDifferentItem,
    /// A flow tag that no requirement refers to.
    FlowNotImplemented,
    /// A data flow tag with an unsupported direction.
    InvalidFlowDirection,
}

/// A single diagnostic.
///
/// The field names are part of the serialized output contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    /// The repository the issue was found in.
    pub repo_name: String,
    /// The file the issue was found in, relative to the repository root.
    pub path: String,
    /// One-based line, or zero when the issue has no single location.
    pub line: usize,
    /// Human readable description.
    pub description: String,
    /// How serious the issue is.
    pub severity: Severity,
    /// The category of the issue.
    #[serde(rename = "type")]
    pub kind: IssueType,
}

impl Issue {
    /// Creates a [`Severity::Major`] issue.
    #[must_use]
    pub fn major(kind: IssueType, description: String) -> Self {
        Self::new(kind, Severity::Major, description)
    }

    /// Creates a [`Severity::Note`] issue.
    #[must_use]
    pub fn note(kind: IssueType, description: String) -> Self {
        Self::new(kind, Severity::Note, description)
    }

    /// Creates an issue with no location.
    #[must_use]
    pub const fn new(kind: IssueType, severity: Severity, description: String) -> Self {
        Self {
            repo_name: String::new(),
            path: String::new(),
            line: 0,
            description,
            severity,
            kind,
        }
    }

    /// Sets the location of the issue.
    #[must_use]
    pub fn at(mut self, repo_name: &str, path: &str, line: usize) -> Self {
        repo_name.clone_into(&mut self.repo_name);
        path.clone_into(&mut self.path);
        self.line = line;
        self
    }
}

/// Counts of issues by severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeverityCounts {
    /// Number of [`Severity::Major`] issues.
    pub major: usize,
    /// Number of [`Severity::Minor`] issues.
    pub minor: usize,
    /// Number of [`Severity::Note`] issues.
    pub note: usize,
}

impl SeverityCounts {
    /// Tallies a list of issues.
    #[must_use]
    pub fn of(issues: &[Issue]) -> Self {
        issues.iter().fold(Self::default(), |mut counts, issue| {
            match issue.severity {
                Severity::Major => counts.major += 1,
                Severity::Minor => counts.minor += 1,
                Severity::Note => counts.note += 1,
            }
            counts
        })
    }
}
