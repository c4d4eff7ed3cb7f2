use serde::{Deserialize, Serialize};

use crate::domain::{DocumentKey, FlowId, FlowKind, ReqId};

/// The directions a data flow tag may declare.
pub const DIRECTIONS: [&str; 3] = ["In", "Out", "In/Out"];

/// A row of a control flow or data flow table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlowTag {
    /// The tag, with any `-DELETED` suffix removed.
    pub id: FlowId,
    /// The producing item.
    pub caller: String,
    /// The consuming item.
    pub callee: String,
    /// Free text description.
    pub description: String,
    /// `In`, `Out` or `In/Out` for data flow tags, empty for control flow.
    #[serde(default)]
    pub direction: String,
    /// Requirements that list this tag in their `FLOW` attribute.
    #[serde(default)]
    pub reqs: Vec<ReqId>,
    /// The one-based line of the table row.
    pub position: usize,
    /// The document the tag was declared in.
    pub document: DocumentKey,
    /// Whether the tag was declared with a `-DELETED` suffix.
    #[serde(default)]
    pub deleted: bool,
}

impl FlowTag {
    /// Whether the direction is one of [`DIRECTIONS`], ignoring surrounding
    /// backticks. Control flow tags have no direction and always pass.
    #[must_use]
    pub fn has_valid_direction(&self) -> bool {
        self.id.kind() == FlowKind::Control
            || DIRECTIONS.contains(&self.direction.trim_matches('`'))
    }

    /// Compares two tags ignoring position and linked requirements.
    #[must_use]
    pub fn same_definition(&self, other: &Self) -> bool {
        self.id == other.id
            && self.caller == other.caller
            && self.callee == other.callee
            && self.description == other.description
            && self.direction == other.direction
            && self.document == other.document
            && self.deleted == other.deleted
    }
}
