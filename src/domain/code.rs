//! Code symbols and the requirement references found above them.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::DocumentKey;

/// Whether a source file implements or tests requirements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CodeKind {
    /// Production code.
    Implementation,
    /// Test code.
    Test,
}

/// A source file inside a repository.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeFile {
    /// The repository the file belongs to.
    pub repo_name: String,
    /// Path relative to the repository root.
    pub path: String,
    /// Implementation or test.
    #[serde(rename = "type")]
    pub kind: CodeKind,
}

impl CodeFile {
    /// Creates a file descriptor.
    #[must_use]
    pub fn new(repo_name: impl Into<String>, path: impl Into<String>, kind: CodeKind) -> Self {
        Self {
            repo_name: repo_name.into(),
            path: path.into(),
            kind,
        }
    }
}

impl fmt::Display for CodeFile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.repo_name, self.path)
    }
}

/// A zero-based position in a text file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Position {
    /// Zero-based line index.
    pub line: usize,
    /// Zero-based byte offset within the line.
    pub character: usize,
}

/// A half-open span of text within a file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Range {
    /// First position covered.
    pub start: Position,
    /// First position not covered.
    pub end: Position,
}

/// A reference from a code comment to a requirement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReqLink {
    /// The referenced requirement ID, as written.
    pub id: String,
    /// Where the ID was written.
    pub range: Range,
}

/// A function or other symbol located in a source file by a code tagger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CodeSymbol {
    /// The file containing the symbol.
    pub file: CodeFile,
    /// Human readable name.
    pub tag: String,
    /// Identifier shared by every declaration of the same logical symbol, if
    /// the tagger can provide one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<String>,
    /// One-based line of the symbol.
    pub line: usize,
    /// Requirement references found in the comment block above the symbol.
    #[serde(default)]
    pub links: Vec<ReqLink>,
    /// Whether the symbol may have no links at all.
    #[serde(default)]
    pub optional: bool,
    /// The document whose implementation this symbol belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document: Option<DocumentKey>,
}

impl CodeSymbol {
    /// Creates a symbol with no links.
    #[must_use]
    pub fn new(file: CodeFile, tag: impl Into<String>, line: usize) -> Self {
        Self {
            file,
            tag: tag.into(),
            symbol: None,
            line,
            links: Vec::new(),
            optional: false,
            document: None,
        }
    }

    /// The identity of this symbol within a graph.
    #[must_use]
    pub fn key(&self) -> SymbolKey {
        SymbolKey {
            file: self.file.clone(),
            tag: self.tag.clone(),
            line: self.line,
        }
    }

    /// The IDs of every linked requirement, in link order.
    pub fn link_ids(&self) -> impl Iterator<Item = &str> {
        self.links.iter().map(|link| link.id.as_str())
    }
}

/// Identifies a code symbol: the file, the tag and the line it was found on.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolKey {
    /// The file containing the symbol.
    pub file: CodeFile,
    /// Human readable name.
    pub tag: String,
    /// One-based line of the symbol.
    pub line: usize,
}
