//! Links between code symbols and requirements.

use std::collections::{HashMap, hash_map::Entry};

use crate::domain::{
    CodeKind, CodeSymbol, DocumentKey, Graph, Issue, IssueType, ReqId, Severity, SymbolKey,
};

/// What linking code to requirements found.
#[derive(Debug, Default)]
pub(super) struct Findings {
    pub(super) issues: Vec<Issue>,
    /// Symbols to record on the requirements they implement or test.
    pub(super) tags: Vec<(ReqId, SymbolKey)>,
}

/// Declarations of one logical symbol within a document, for one kind of code.
type SymbolGroup<'a> = (&'a DocumentKey, CodeKind, &'a str);

/// Resolves the requirement references of every code symbol.
///
/// Symbols the tagger could identify share the references of the first
/// declaration that has any, so a definition can inherit the references
/// written above its declaration. Declarations that disagree are reported.
pub(super) fn link(graph: &Graph) -> Findings {
    let mut findings = Findings::default();
    let canonical = canonical_links(graph, &mut findings.issues);

    for symbol in &graph.code_symbols {
        let Some(document_key) = &symbol.document else {
            tracing::trace!("{}@{} belongs to no document", symbol.tag, symbol.file);
            continue;
        };
        let Some(document) = graph.config.document(document_key) else {
            tracing::warn!("{}@{} belongs to unconfigured document {document_key}", symbol.tag, symbol.file);
            continue;
        };

        let ids: Vec<&str> = match &symbol.symbol {
            Some(name) => canonical
                .get(&(document_key, symbol.file.kind, name.as_str()))
                .map(|(_, ids)| ids.clone())
                .unwrap_or_default(),
            None => symbol.link_ids().collect(),
        };

        let at = |description: String, kind: IssueType| {
            Issue::major(kind, description).at(&symbol.file.repo_name, &symbol.file.path, symbol.line)
        };
        let function = format!("{}@{}:{}", symbol.tag, symbol.file.path, symbol.line);
        let repo = &symbol.file.repo_name;

        if ids.is_empty() && !symbol.optional {
            findings.issues.push(at(
                format!("Function {}@{}:{} has no parents.", symbol.tag, symbol.file, symbol.line),
                IssueType::MissingRequirementInCode,
            ));
        }

        for id in ids {
            if !document.schema.requirements.is_match(id) {
                findings.issues.push(at(
                    format!(
                        "Invalid reference in function {function} in repo `{repo}`, `{id}` does not match requirement format in document `{}`.",
                        document_key.path
                    ),
                    IssueType::InvalidRequirementInCode,
                ));
            }

            let Some(req) = graph.find(id) else {
                findings.issues.push(at(
                    format!("Invalid reference in function {function} in repo `{repo}`, {id} does not exist."),
                    IssueType::InvalidRequirementInCode,
                ));
                continue;
            };
            if req.is_deleted() {
                findings.issues.push(at(
                    format!("Invalid reference in function {function} in repo `{repo}`, {id} is deleted."),
                    IssueType::InvalidRequirementInCode,
                ));
            }
            findings.tags.push((req.id.clone(), symbol.key()));
        }
    }

    findings
}

/// The references of the first declaration with any, per symbol group.
///
/// Later declarations in the group must reference the same IDs, in any
/// order; the first mismatch of each declaration is reported, naming the
/// location with the smaller path (then line) first.
fn canonical_links<'a>(
    graph: &'a Graph,
    issues: &mut Vec<Issue>,
) -> HashMap<SymbolGroup<'a>, (&'a CodeSymbol, Vec<&'a str>)> {
    let mut canonical: HashMap<SymbolGroup<'a>, (&'a CodeSymbol, Vec<&'a str>)> = HashMap::new();

    for symbol in &graph.code_symbols {
        let (Some(document), Some(name)) = (&symbol.document, &symbol.symbol) else {
            continue;
        };
        if symbol.links.is_empty() {
            continue;
        }

        let ids: Vec<&str> = symbol.link_ids().collect();
        match canonical.entry((document, symbol.file.kind, name.as_str())) {
            Entry::Vacant(entry) => {
                entry.insert((symbol, ids));
            }
            Entry::Occupied(entry) => {
                let (first, first_ids) = entry.get();
                if same_ids(first_ids, &ids) {
                    continue;
                }

                let (a, b) = if (first.file.path.as_str(), first.line)
                    <= (symbol.file.path.as_str(), symbol.line)
                {
                    (*first, symbol)
                } else {
                    (symbol, *first)
                };
                issues.push(
                    Issue::major(
                        IssueType::InvalidRequirementInCode,
                        format!(
                            "LLR declarations differ in {}@{}:{} and {}@{}:{}.",
                            a.tag, a.file.path, a.line, b.tag, b.file.path, b.line
                        ),
                    )
                    .at(&symbol.file.repo_name, &symbol.file.path, symbol.line),
                );
            }
        }
    }

    canonical
}

fn same_ids(a: &[&str], b: &[&str]) -> bool {
    let mut a = a.to_vec();
    let mut b = b.to_vec();
    a.sort_unstable();
    b.sort_unstable();
    a == b
}

/// Reports live requirements of documents with an implementation that are
/// not both implemented and tested.
pub(super) fn coverage(graph: &Graph) -> Vec<Issue> {
    let mut issues = Vec::new();

    for req in graph.requirements.values() {
        if req.is_deleted() {
            continue;
        }
        let has_implementation = graph
            .config
            .document(&req.document)
            .is_some_and(|document| document.has_implementation());
        if !has_implementation {
            continue;
        }

        let implemented = req.tags.iter().any(|tag| tag.file.kind == CodeKind::Implementation);
        let tested = req.tags.iter().any(|tag| tag.file.kind == CodeKind::Test);

        let (kind, severity, description) = match (implemented, tested) {
            (true, true) => continue,
            (false, true) => (
                IssueType::ReqTestedButNotImplemented,
                Severity::Major,
                format!("Requirement {} is tested, but it is not implemented.", req.id),
            ),
            (false, false) => (
                IssueType::ReqNotImplemented,
                Severity::Note,
                format!("Requirement {} is not implemented.", req.id),
            ),
            (true, false) => (
                IssueType::ReqNotTested,
                Severity::Note,
                format!("Requirement {} is not tested.", req.id),
            ),
        };
        issues.push(Issue::new(kind, severity, description).at(
            &req.document.repo_name,
            &req.document.path,
            req.position,
        ));
    }

    issues
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::domain::{
        CodeFile, CodeKind, CodeSymbol, DocumentKey, Graph, IssueType, Range, ReqLink, Severity,
    };

    const SWL: &str = "\
## REQ-TEST-SWL-1 First
The software shall start.

## REQ-TEST-SWL-2 Second
The software shall stop.

## REQ-TEST-SWL-3 DELETED
";

    fn symbol(
        path: &str,
        kind: CodeKind,
        line: usize,
        name: Option<&str>,
        links: &[&str],
    ) -> CodeSymbol {
        let mut symbol = CodeSymbol::new(CodeFile::new(REPO, path, kind), "run", line);
        symbol.symbol = name.map(ToString::to_string);
        symbol.links = links
            .iter()
            .map(|id| ReqLink {
                id: (*id).to_string(),
                range: Range::default(),
            })
            .collect();
        symbol.document = Some(DocumentKey::new(REPO, "SWL.md"));
        symbol
    }

    fn resolved(code_files: &[&str], symbols: Vec<CodeSymbol>) -> Graph {
        let mut document = document("SWL.md", "SWL");
        document.implementation.code_files = code_files.iter().map(ToString::to_string).collect();
        let mut graph = graph(config(vec![document]), &[("SWL.md", SWL)]);
        for symbol in symbols {
            assert!(graph.add_code_symbol(symbol));
        }
        graph.resolve();
        graph
    }

    fn tag_lines(graph: &Graph, id: &str) -> Vec<(String, usize)> {
        graph
            .find(id)
            .unwrap()
            .tags
            .iter()
            .map(|tag| (tag.file.path.clone(), tag.line))
            .collect()
    }

    #[test]
    fn differing_declarations_are_one_issue() {
        let graph = resolved(
            &[],
            vec![
                symbol("src/b.c", CodeKind::Implementation, 10, Some("c:@F@run"), &["REQ-TEST-SWL-1"]),
                symbol("src/a.h", CodeKind::Implementation, 3, Some("c:@F@run"), &["REQ-TEST-SWL-2"]),
                symbol("src/c.c", CodeKind::Implementation, 7, Some("c:@F@run"), &["REQ-TEST-SWL-1"]),
            ],
        );

        let differ = of_kind(&graph, IssueType::InvalidRequirementInCode);
        assert_eq!(differ.len(), 1);
        assert_eq!(
            differ[0].description,
            "LLR declarations differ in run@src/a.h:3 and run@src/b.c:10."
        );
        assert_eq!(differ[0].path, "src/a.h");
        assert_eq!(differ[0].line, 3);

        // Every declaration takes the references of the first one.
        assert_eq!(
            tag_lines(&graph, "REQ-TEST-SWL-1"),
            vec![
                ("src/b.c".to_string(), 10),
                ("src/a.h".to_string(), 3),
                ("src/c.c".to_string(), 7),
            ]
        );
        assert!(tag_lines(&graph, "REQ-TEST-SWL-2").is_empty());
    }

    #[test]
    fn same_ids_in_any_order_agree() {
        let graph = resolved(
            &[],
            vec![
                symbol("src/a.h", CodeKind::Implementation, 3, Some("run"), &["REQ-TEST-SWL-1", "REQ-TEST-SWL-2"]),
                symbol("src/a.c", CodeKind::Implementation, 9, Some("run"), &["REQ-TEST-SWL-2", "REQ-TEST-SWL-1"]),
                // Tests are grouped apart from implementation.
                symbol("test/a.c", CodeKind::Test, 4, Some("run"), &["REQ-TEST-SWL-1"]),
            ],
        );

        assert!(graph.issues().is_empty());
        assert_eq!(tag_lines(&graph, "REQ-TEST-SWL-2").len(), 2);
    }

    #[test]
    fn symbols_without_references() {
        let mut optional = symbol("test/a.c", CodeKind::Test, 8, None, &[]);
        optional.optional = true;
        let graph = resolved(
            &[],
            vec![
                symbol("src/a.c", CodeKind::Implementation, 5, None, &[]),
                optional,
                // A definition inherits the references of its declaration.
                symbol("src/b.h", CodeKind::Implementation, 2, Some("stop"), &["REQ-TEST-SWL-2"]),
                symbol("src/b.c", CodeKind::Implementation, 20, Some("stop"), &[]),
            ],
        );

        assert_eq!(
            descriptions(&graph),
            vec!["Function run@project: src/a.c:5 has no parents."]
        );
        assert_eq!(tag_lines(&graph, "REQ-TEST-SWL-2").len(), 2);
    }

    #[test]
    fn invalid_references() {
        let graph = resolved(
            &[],
            vec![symbol(
                "src/a.c",
                CodeKind::Implementation,
                5,
                None,
                &["REQ-TEST-SWL-9", "REQ-OTHER-SWL-1", "REQ-TEST-SWL-3"],
            )],
        );

        assert_eq!(
            descriptions(&graph),
            vec![
                "Invalid reference in function run@src/a.c:5 in repo `project`, REQ-TEST-SWL-9 does not exist.",
                "Invalid reference in function run@src/a.c:5 in repo `project`, `REQ-OTHER-SWL-1` does not match requirement format in document `SWL.md`.",
                "Invalid reference in function run@src/a.c:5 in repo `project`, REQ-OTHER-SWL-1 does not exist.",
                "Invalid reference in function run@src/a.c:5 in repo `project`, REQ-TEST-SWL-3 is deleted.",
            ]
        );
        // Deleted requirements still record the reference.
        assert_eq!(tag_lines(&graph, "REQ-TEST-SWL-3").len(), 1);
    }

    #[test]
    fn coverage_of_implemented_documents() {
        let swl = "\
## REQ-TEST-SWL-1 Both
The software shall start.

## REQ-TEST-SWL-2 Code only
The software shall stop.

## REQ-TEST-SWL-3 Tests only
The software shall pause.

## REQ-TEST-SWL-4 Neither
The software shall resume.

## REQ-TEST-SWL-5 DELETED
";
        let mut document = document("SWL.md", "SWL");
        document.implementation.code_files = vec!["src/a.c".to_string()];
        let mut graph = graph(config(vec![document]), &[("SWL.md", swl)]);
        for symbol in [
            symbol("src/a.c", CodeKind::Implementation, 1, None, &["REQ-TEST-SWL-1", "REQ-TEST-SWL-2"]),
            symbol("test/a.c", CodeKind::Test, 1, None, &["REQ-TEST-SWL-1", "REQ-TEST-SWL-3"]),
        ] {
            graph.add_code_symbol(symbol);
        }
        graph.resolve();

        let issues: Vec<(IssueType, Severity, &str)> = graph
            .issues()
            .iter()
            .map(|issue| (issue.kind, issue.severity, issue.description.as_str()))
            .collect();
        assert_eq!(
            issues,
            vec![
                (
                    IssueType::ReqNotTested,
                    Severity::Note,
                    "Requirement REQ-TEST-SWL-2 is not tested."
                ),
                (
                    IssueType::ReqTestedButNotImplemented,
                    Severity::Major,
                    "Requirement REQ-TEST-SWL-3 is tested, but it is not implemented."
                ),
                (
                    IssueType::ReqNotImplemented,
                    Severity::Note,
                    "Requirement REQ-TEST-SWL-4 is not implemented."
                ),
            ]
        );
    }

    #[test]
    fn documents_without_implementation_need_no_coverage() {
        let graph = resolved(&[], Vec::new());
        assert!(graph.issues().is_empty());

        let graph = resolved(&["src/a.c"], Vec::new());
        assert_eq!(of_kind(&graph, IssueType::ReqNotImplemented).len(), 2);
    }
}
