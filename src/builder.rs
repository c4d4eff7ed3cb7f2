//! Construction of a [`Graph`] from a configuration.
//!
//! The builder reads every configured document, tags the source files of
//! each document's implementation, scans their comments for requirement
//! references and resolves the result. Structural failures (a malformed
//! document, an unreadable file, a failing tagger) abort the build; anything
//! else is reported as an [`Issue`](crate::Issue) on the graph.

use std::{io, path::PathBuf};

use rayon::iter::{IntoParallelRefIterator, ParallelIterator};
use tracing::instrument;

use crate::{
    domain::{BackReferences, CodeKind, CodeSymbol, Config, Document, DocumentKey, Graph, RepoConfig},
    storage::{ParseError, ParsedDocument, annotate, load_document},
    tagger::{TagRequest, TaggerError, TaggerRegistry},
};

/// Errors that abort building a graph.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A document could not be parsed.
    #[error("failed to parse {document}")]
    Parse {
        /// The document.
        document: DocumentKey,
        /// The underlying error.
        source: ParseError,
    },

    /// A document names a code tagger that is not registered.
    #[error("unknown code parser `{name}` for {document}, expected one of: {available}")]
    UnknownTagger {
        /// The document.
        document: DocumentKey,
        /// The configured tagger name.
        name: String,
        /// The registered tagger names, comma separated.
        available: String,
    },

    /// Tagging the code of a document failed.
    #[error("failed to tag the code of {document}")]
    Tagger {
        /// The document.
        document: DocumentKey,
        /// The underlying error.
        source: TaggerError,
    },

    /// A tagged source file could not be read.
    #[error("failed to read {}", path.display())]
    Io {
        /// The file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },
}

/// Builds a graph from a configuration, using the taggers of a registry.
#[derive(Debug)]
pub struct GraphBuilder<'a> {
    config: Config,
    registry: &'a TaggerRegistry,
}

impl<'a> GraphBuilder<'a> {
    /// Creates a builder.
    #[must_use]
    pub const fn new(config: Config, registry: &'a TaggerRegistry) -> Self {
        Self { config, registry }
    }

    /// Builds and resolves the graph.
    ///
    /// Documents are parsed in parallel but added in configuration order, so
    /// the issues of a build are always reported in the same order. Parent
    /// and child links are filled in according to the configured
    /// [`BackReferences`] policy.
    ///
    /// # Errors
    ///
    /// Returns the first structural failure, in configuration order.
    #[instrument(skip(self))]
    pub fn build(self) -> Result<Graph, BuildError> {
        let documents: Vec<(RepoConfig, Document)> = self
            .config
            .documents()
            .map(|(repo, document)| (repo.clone(), document.clone()))
            .collect();

        let parsed: Vec<Result<ParsedDocument, BuildError>> = documents
            .par_iter()
            .map(|(repo, document)| {
                let key = DocumentKey::new(&repo.name, &document.path);
                load_document(&repo.root, &key)
                    .map_err(|source| BuildError::Parse { document: key, source })
            })
            .collect();

        let mut graph = Graph::new(self.config);
        for ((repo, document), parsed) in documents.iter().zip(parsed) {
            let key = DocumentKey::new(&repo.name, &document.path);
            graph.add_document(&key, parsed?);

            let mut added = 0;
            for symbol in code_symbols(self.registry, repo, document)? {
                if graph.add_code_symbol(symbol) {
                    added += 1;
                }
            }
            tracing::debug!("Added {added} code symbols for {key}");
        }

        graph.resolve();

        let policy = graph.config().back_references;
        match policy {
            BackReferences::Always => graph.link_back_references(),
            BackReferences::WhenClean if graph.issues().is_empty() => {
                graph.link_back_references();
            }
            BackReferences::WhenClean => {
                tracing::debug!(
                    "Not linking back references, resolution found {} issues",
                    graph.issues().len()
                );
            }
        }

        Ok(graph)
    }
}

/// Tags and annotates the implementation of a document.
fn code_symbols(
    registry: &TaggerRegistry,
    repo: &RepoConfig,
    document: &Document,
) -> Result<Vec<CodeSymbol>, BuildError> {
    let key = DocumentKey::new(&repo.name, &document.path);
    let implementation = &document.implementation;
    let files = implementation.files(&repo.name);
    if files.is_empty() {
        return Ok(Vec::new());
    }

    let tagger =
        registry
            .get(&implementation.code_parser)
            .ok_or_else(|| BuildError::UnknownTagger {
                document: key.clone(),
                name: implementation.code_parser.clone(),
                available: registry.names().collect::<Vec<_>>().join(", "),
            })?;

    let request = TagRequest {
        repo: &repo.name,
        root: &repo.root,
        files: &files,
        compilation_database: implementation.compilation_database.as_deref(),
        compiler_arguments: &implementation.compiler_arguments,
    };
    let tagged = tagger.tag(&request).map_err(|source| BuildError::Tagger {
        document: key.clone(),
        source,
    })?;

    let mut symbols = Vec::new();
    for (file, tags) in tagged {
        let path = repo.root.join(&file.path);
        // Comments may be in any encoding; only the ASCII annotations matter.
        let bytes = std::fs::read(&path).map_err(|source| BuildError::Io { path, source })?;
        let source = String::from_utf8_lossy(&bytes);

        let is_test = file.kind == CodeKind::Test;
        let mut file_symbols: Vec<CodeSymbol> = tags
            .into_iter()
            .map(|tag| tag.into_code_symbol(file.clone()))
            .collect();
        annotate(&source, &mut file_symbols, is_test);

        for mut symbol in file_symbols {
            symbol.document = Some(key.clone());
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

#[cfg(test)]
mod tests {
    use std::{collections::BTreeMap, fs, path::Path};

    use tempfile::TempDir;

    use super::*;
    use crate::{
        IssueType,
        domain::CodeFile,
        tagger::{CodeTagger, TaggedSymbol},
    };

    /// Tags every line starting with `void name(`.
    struct VoidTagger;

    impl CodeTagger for VoidTagger {
        fn tag(
            &self,
            request: &TagRequest<'_>,
        ) -> Result<BTreeMap<CodeFile, Vec<TaggedSymbol>>, TaggerError> {
            let mut tags = BTreeMap::new();
            for file in request.files {
                let bytes = fs::read(request.root.join(&file.path))
                    .map_err(|error| TaggerError::Other(error.to_string()))?;
                let source = String::from_utf8_lossy(&bytes);
                let symbols = source
                    .lines()
                    .enumerate()
                    .filter_map(|(index, line)| {
                        let name = line.strip_prefix("void ")?.split('(').next()?;
                        Some(TaggedSymbol::new(name, index + 1))
                    })
                    .collect();
                tags.insert(file.clone(), symbols);
            }
            Ok(tags)
        }
    }

    struct Broken;

    impl CodeTagger for Broken {
        fn tag(
            &self,
            _request: &TagRequest<'_>,
        ) -> Result<BTreeMap<CodeFile, Vec<TaggedSymbol>>, TaggerError> {
            Err(TaggerError::Other("compiler crashed".to_string()))
        }
    }

    fn registry() -> TaggerRegistry {
        let mut registry = TaggerRegistry::new();
        registry.register("void", VoidTagger);
        registry.register("broken", Broken);
        registry
    }

    const CONFIG: &str = r#"
_version = "1"
back_references = "when-clean"

[[repos]]
name = "project"

[[repos.documents]]
path = "SYS.md"
prefix = "TEST"
level = "SYS"

[[repos.documents]]
path = "SWL.md"
prefix = "TEST"
level = "SWL"

[[repos.documents.parents]]
prefix = "TEST"
level = "SYS"

[repos.documents.implementation]
code_parser = "void"

[repos.documents.implementation.code]
paths = ["src"]

[repos.documents.implementation.tests]
paths = ["test"]
"#;

    const SYS: &str = "\
# System requirements

## REQ-TEST-SYS-1 Start
The system shall start.

## REQ-TEST-SYS-2 Stop
The system shall stop.
";

    const SWL: &str = "\
# Software requirements

## REQ-TEST-SWL-1 Start
The software shall start the system.

### Attributes:
- Parents: REQ-TEST-SYS-1

## REQ-TEST-SWL-2 Stop
The software shall stop the system.

### Attributes:
- Parents: REQ-TEST-SYS-2
";

    const CODE: &str = "\
// @llr REQ-TEST-SWL-1
void start() {
}

// @llr REQ-TEST-SWL-2
void stop() {
}
";

    const TESTS: &str = "\
// @llr REQ-TEST-SWL-1, REQ-TEST-SWL-2
void test_start_stop() {
}

void helper() {
}
";

    fn write(root: &Path, path: &str, content: &str) {
        let path = root.join(path);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    fn repo(files: &[(&str, &str)]) -> TempDir {
        let tmp = TempDir::new().unwrap();
        for &(path, content) in [
            ("SYS.md", SYS),
            ("SWL.md", SWL),
            ("src/a.c", CODE),
            ("test/a_test.c", TESTS),
        ]
        .iter()
        .chain(files)
        {
            write(tmp.path(), path, content);
        }
        tmp
    }

    fn build(root: &Path, config: &str) -> Result<Graph, BuildError> {
        let config = Config::from_toml(config, root).unwrap();
        GraphBuilder::new(config, &registry()).build()
    }

    #[test]
    fn builds_clean_graph() {
        let tmp = repo(&[]);
        let graph = build(tmp.path(), CONFIG).unwrap();

        assert!(graph.issues().is_empty(), "{:#?}", graph.issues());
        assert_eq!(graph.requirements().len(), 4);
        assert_eq!(graph.code_symbols().len(), 4);

        let swl1 = graph.find("REQ-TEST-SWL-1").unwrap();
        let tags: Vec<(&str, usize)> = graph
            .tags_of(&swl1.id)
            .map(|symbol| (symbol.tag.as_str(), symbol.line))
            .collect();
        assert_eq!(tags, vec![("start", 2), ("test_start_stop", 2)]);

        let sys1 = graph.find("REQ-TEST-SYS-1").unwrap();
        let children: Vec<String> = graph
            .children_of(&sys1.id)
            .map(|req| req.id.to_string())
            .collect();
        assert_eq!(children, vec!["REQ-TEST-SWL-1"]);

        let helper = graph
            .code_symbols()
            .iter()
            .find(|symbol| symbol.tag == "helper")
            .unwrap();
        assert!(helper.optional);
        assert_eq!(helper.document, Some(DocumentKey::new("project", "SWL.md")));
    }

    #[test]
    fn back_references_wait_for_a_clean_graph() {
        let tmp = repo(&[("src/b.c", "void orphan() {\n}\n")]);
        let graph = build(tmp.path(), CONFIG).unwrap();

        let issues = graph.issues();
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].kind, IssueType::MissingRequirementInCode);
        assert_eq!(issues[0].path, "src/b.c");

        let sys1 = graph.find("REQ-TEST-SYS-1").unwrap();
        assert_eq!(graph.children_of(&sys1.id).count(), 0);

        let always = CONFIG.replace("when-clean", "always");
        let graph = build(tmp.path(), &always).unwrap();
        let sys1 = graph.find("REQ-TEST-SYS-1").unwrap();
        assert_eq!(graph.children_of(&sys1.id).count(), 1);
    }

    #[test]
    fn latin1_comments_do_not_abort() {
        let tmp = repo(&[]);
        fs::write(
            tmp.path().join("src/a.c"),
            b"// caf\xe9\n// @llr REQ-TEST-SWL-1\nvoid start() {\n}\n\n// @llr REQ-TEST-SWL-2\nvoid stop() {\n}\n",
        )
        .unwrap();

        let graph = build(tmp.path(), CONFIG).unwrap();

        assert!(graph.issues().is_empty(), "{:#?}", graph.issues());
        let swl1 = graph.find("REQ-TEST-SWL-1").unwrap();
        let tags: Vec<(&str, usize)> = graph
            .tags_of(&swl1.id)
            .map(|symbol| (symbol.tag.as_str(), symbol.line))
            .collect();
        assert_eq!(tags, vec![("start", 3), ("test_start_stop", 2)]);
    }

    #[test]
    fn malformed_document_aborts() {
        let tmp = repo(&[("SWL.md", "## REQ-TEST-SWL-1 Title\n")]);
        let error = build(tmp.path(), CONFIG).unwrap_err();

        match error {
            BuildError::Parse { document, source } => {
                assert_eq!(document, DocumentKey::new("project", "SWL.md"));
                assert!(matches!(source, ParseError::EmptyRequirement { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn missing_document_aborts() {
        let tmp = repo(&[]);
        fs::remove_file(tmp.path().join("SYS.md")).unwrap();

        let error = build(tmp.path(), CONFIG).unwrap_err();
        assert!(matches!(
            error,
            BuildError::Parse {
                source: ParseError::Io(_),
                ..
            }
        ));
    }

    #[test]
    fn unknown_tagger() {
        let tmp = repo(&[]);
        let config = CONFIG.replace(r#"code_parser = "void""#, r#"code_parser = "clang""#);

        let error = build(tmp.path(), &config).unwrap_err();
        assert_eq!(
            error.to_string(),
            "unknown code parser `clang` for project: SWL.md, expected one of: broken, void"
        );
    }

    #[test]
    fn failing_tagger() {
        let tmp = repo(&[]);
        let config = CONFIG.replace(r#"code_parser = "void""#, r#"code_parser = "broken""#);

        let error = build(tmp.path(), &config).unwrap_err();
        assert!(matches!(
            error,
            BuildError::Tagger {
                source: TaggerError::Other(_),
                ..
            }
        ));
    }

    #[test]
    fn rebuilding_merges_cleanly() {
        let tmp = repo(&[]);
        let mut graph = build(tmp.path(), CONFIG).unwrap();
        let again = build(tmp.path(), CONFIG).unwrap();
        let requirements = graph.requirements().len();
        let issues = graph.issues().len();

        graph.merge(again).unwrap();

        assert_eq!(graph.requirements().len(), requirements);
        assert_eq!(graph.issues().len(), issues);
        assert_eq!(graph.code_symbols().len(), 4);
    }
}
