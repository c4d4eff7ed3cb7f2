//! Requirements traceability
//!
//! Requirements live in markdown certification documents and are referenced
//! from source code comments. This crate parses both, builds a graph linking
//! requirements to their parents, children, implementing code and flow tags,
//! and reports every inconsistency it finds as an [`Issue`].

pub mod domain;
pub use domain::{
    CodeSymbol, Config, Document, FlowTag, Graph, Issue, IssueType, ReqId, Requirement, Severity,
};

/// Parsing of certification documents and source files, and graph export.
pub mod storage;

pub mod tagger;
pub use tagger::{CodeTagger, TaggerRegistry};

mod resolve;

mod builder;
pub use builder::{BuildError, GraphBuilder};
