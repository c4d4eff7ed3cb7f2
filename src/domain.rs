//! Domain models for requirements traceability.
//!
//! This module contains the core domain types: requirement and flow tag
//! identifiers, requirements, flow tags, code symbols, issues, the
//! configuration describing documents and their schemas, and the graph
//! tying them together.

mod attributes;
pub use attributes::{AttributeKey, Attributes, FLOW, PARENTS, RATIONALE};

pub mod code;
pub use code::{CodeFile, CodeKind, CodeSymbol, Position, Range, ReqLink, SymbolKey};

mod config;
pub use config::{
    AttributeMatch, AttributeRule, BackReferences, Config, ConfigError, Document, Implementation,
    LinkEnd, LinkRule, Presence, RepoConfig, Schema, regex_as_string, regex_from_string,
};

mod flow;
pub use flow::{DIRECTIONS, FlowTag};

pub mod graph;
pub use graph::{Graph, MergeError};

/// Requirement and flow tag identifiers.
pub mod id;
pub use id::{Error as IdError, FlowId, FlowKind, ReqId, Variant};

pub mod issue;
pub use issue::{Issue, IssueType, Severity, SeverityCounts};

/// Requirement domain model.
pub mod requirement;
pub use requirement::{DocumentKey, Requirement};
