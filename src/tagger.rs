//! Discovery of symbols in source files.
//!
//! A [`CodeTagger`] lists the functions (or other symbols) defined in a set
//! of source files. Taggers are looked up by name in a [`TaggerRegistry`],
//! which is handed to the graph builder; each document names the tagger used
//! for its implementation.

use std::{collections::BTreeMap, fmt, io, path::Path, process::ExitStatus};

use crate::domain::{CodeFile, CodeSymbol};

mod ctags;
pub use ctags::{CTAGS_ENV, CtagsTagger};

mod pipe;

/// A symbol found by a tagger, before its comments have been scanned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaggedSymbol {
    /// Human readable name.
    pub tag: String,
    /// Identifier shared by every declaration of the same logical symbol.
    pub symbol: Option<String>,
    /// One-based line of the symbol.
    pub line: usize,
    /// Whether the symbol may have no links.
    pub optional: bool,
}

impl TaggedSymbol {
    /// A symbol with only a name and a line.
    #[must_use]
    pub fn new(tag: impl Into<String>, line: usize) -> Self {
        Self {
            tag: tag.into(),
            symbol: None,
            line,
            optional: false,
        }
    }

    /// Places the symbol in its file.
    #[must_use]
    pub fn into_code_symbol(self, file: CodeFile) -> CodeSymbol {
        let mut symbol = CodeSymbol::new(file, self.tag, self.line);
        symbol.symbol = self.symbol;
        symbol.optional = self.optional;
        symbol
    }
}

/// The files of one document's implementation, and how to compile them.
#[derive(Debug, Clone, Copy)]
pub struct TagRequest<'a> {
    /// Name of the repository containing the files.
    pub repo: &'a str,
    /// Root directory of the repository.
    pub root: &'a Path,
    /// The files to tag. Paths are relative to `root`.
    pub files: &'a [CodeFile],
    /// Compilation database, for taggers that compile the code.
    pub compilation_database: Option<&'a str>,
    /// Extra compiler arguments, for taggers that compile the code.
    pub compiler_arguments: &'a [String],
}

/// Lists the symbols defined in source files.
pub trait CodeTagger: Send + Sync {
    /// Tags every file of the request.
    ///
    /// Files in which nothing was found may be missing from the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the files could not be tagged.
    fn tag(
        &self,
        request: &TagRequest<'_>,
    ) -> Result<BTreeMap<CodeFile, Vec<TaggedSymbol>>, TaggerError>;
}

/// Errors that can occur when tagging code.
#[derive(Debug, thiserror::Error)]
pub enum TaggerError {
    /// The tagger program could not be started.
    #[error("failed to run {program}")]
    Unavailable {
        /// The program.
        program: String,
        /// The underlying error.
        source: io::Error,
    },

    /// The `ctags` program found is not Universal Ctags.
    #[error(
        "`{program}` is not Universal Ctags. Install Universal Ctags (not Exuberant Ctags) or point REQTRACE_CTAGS at it"
    )]
    NotUniversalCtags {
        /// The program.
        program: String,
    },

    /// The file list could not be written to the tagger.
    #[error("failed to send file list to {command}")]
    Input {
        /// The command line.
        command: String,
        /// The underlying error.
        source: io::Error,
    },

    /// The tagger output could not be read.
    #[error("failed to read output of {command}")]
    Output {
        /// The command line.
        command: String,
        /// The underlying error.
        source: io::Error,
    },

    /// The tagger exited unsuccessfully.
    #[error("command failed: {status}: {command}\n{stderr}")]
    Failed {
        /// The command line.
        command: String,
        /// The exit status.
        status: ExitStatus,
        /// Whatever the tagger wrote to stderr.
        stderr: String,
    },

    /// A line of tagger output could not be understood.
    #[error("unexpected tagger output: {line:?}")]
    Format {
        /// The offending line.
        line: String,
    },

    /// Any other failure of a custom tagger.
    #[error("{0}")]
    Other(String),
}

/// Code taggers by name.
#[derive(Default)]
pub struct TaggerRegistry {
    taggers: BTreeMap<String, Box<dyn CodeTagger>>,
}

impl fmt::Debug for TaggerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.taggers.keys()).finish()
    }
}

impl TaggerRegistry {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the built-in `ctags` tagger.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("ctags", CtagsTagger::default());
        registry
    }

    /// Registers a tagger, replacing any tagger of the same name.
    pub fn register(&mut self, name: impl Into<String>, tagger: impl CodeTagger + 'static) {
        self.taggers.insert(name.into(), Box::new(tagger));
    }

    /// Looks up a tagger.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&dyn CodeTagger> {
        self.taggers.get(name).map(AsRef::as_ref)
    }

    /// Names of all registered taggers, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.taggers.keys().map(String::as_str)
    }
}
