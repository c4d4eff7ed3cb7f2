//! Requirement references in source code comments.
//!
//! A symbol implements the requirements named on `@llr` (or `\llr`) lines in
//! the comment block directly above it:
//!
//! ```c
//! // Returns the number of segments.
//! // @llr REQ-PROJ-SWL-11, REQ-PROJ-SWL-12
//! uint8_t getNumberOfSegments() { return numberOfSegments; }
//! ```

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{CodeSymbol, Position, Range, ReqLink};

static LLR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[ */]*(?:@|\\)llr +(?:REQ-[0-9A-Za-z_]+-[0-9A-Za-z_]+-[0-9]+[, ]*)+$")
        .expect("llr line regex is valid")
});

static LLR_REFERENCE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"REQ-[0-9A-Za-z_]+-[0-9A-Za-z_]+-[0-9]+").expect("llr reference regex is valid")
});

/// Fills in the links of every symbol found in `source`.
///
/// Symbols are sorted by line. For each one the lines above it are scanned
/// upwards until a blank line, the start of the file or the line of the
/// previous symbol. Links are recorded in scan order, so a block of several
/// `@llr` lines yields the lowest line's links first. Symbols sharing a line
/// share links.
///
/// Every symbol of a test file is marked optional.
pub fn annotate(source: &str, symbols: &mut [CodeSymbol], is_test: bool) {
    let lines: Vec<&str> = source.lines().collect();
    symbols.sort_by_key(|symbol| symbol.line);

    let mut previous: Option<usize> = None;
    for index in 0..symbols.len() {
        if is_test {
            symbols[index].optional = true;
        }

        let line = symbols[index].line;
        if index > 0 && previous == Some(line) {
            symbols[index].links = symbols[index - 1].links.clone();
            continue;
        }

        symbols[index].links = scan_comments(&lines, line, previous);
        previous = Some(line);
    }

    tracing::debug!(
        "Annotated {} symbols with {} links",
        symbols.len(),
        symbols.iter().map(|symbol| symbol.links.len()).sum::<usize>()
    );
}

/// Collects the links above the (one-based) `line`, stopping before the
/// (one-based) `previous` symbol line.
fn scan_comments(lines: &[&str], line: usize, previous: Option<usize>) -> Vec<ReqLink> {
    let floor = previous.unwrap_or(0);
    let ceiling = line.saturating_sub(1).min(lines.len());

    let mut links = Vec::new();
    for index in (floor..ceiling).rev() {
        let text = lines[index];
        if LLR_LINE.is_match(text) {
            links.extend(LLR_REFERENCE.find_iter(text).map(|found| ReqLink {
                id: found.as_str().to_string(),
                range: Range {
                    start: Position {
                        line: index,
                        character: found.start(),
                    },
                    end: Position {
                        line: index,
                        character: found.end(),
                    },
                },
            }));
        } else if text.trim().is_empty() {
            break;
        }
    }
    links
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;
    use crate::domain::{CodeFile, CodeKind};

    const SOURCE: &str = r#"#include "x/y"

namespace na {
namespace nb {
namespace nc {

namespace {
uint8_t numberOfSegments = 0;
PcieSegment segment;
}  // namespace

// @llr REQ-TEST-SWH-11
uint8_t System::getNumberOfSegments() { return numberOfSegments; }

// This method does stuff.
// @llr REQ-TEST-SWL-12
const PcieSegment *System::getSegment(uint8_t i) {
    if (numberOfSegments == 1) {
        return &segment;
    }
    return nullptr;
}

// This method does stuff also.
// @llr REQ-TEST-SWL-13
// @xlr R-1
void enumerateObjects() {
    auto lambda = []() { io::printf("[system] Scanning for objects\n"); };

    lambda();

    // Comment.
    numberOfSegments = 1;
}

// @llr REQ-TEST-SWL-13, REQ-TEST-SWL-14
int A::operator[](size_t) { return 0; }

}  // namespace nc
}  // namespace nb
}  // namespace na
"#;

    fn symbols(lines: &[(&str, usize)]) -> Vec<CodeSymbol> {
        let file = CodeFile::new("project", "a.cc", CodeKind::Implementation);
        lines
            .iter()
            .map(|&(tag, line)| CodeSymbol::new(file.clone(), tag, line))
            .collect()
    }

    fn link(id: &str, line: usize, start: usize) -> ReqLink {
        ReqLink {
            id: id.to_string(),
            range: Range {
                start: Position {
                    line,
                    character: start,
                },
                end: Position {
                    line,
                    character: start + id.len(),
                },
            },
        }
    }

    #[test]
    fn links_follow_comment_blocks() {
        let mut tags = symbols(&[
            ("operator[]", 37),
            ("getNumberOfSegments", 13),
            ("enumerateObjects", 27),
            ("getSegment", 17),
        ]);

        annotate(SOURCE, &mut tags, false);

        let by_name = |name: &str| tags.iter().find(|t| t.tag == name).unwrap();
        assert_eq!(
            by_name("getNumberOfSegments").links,
            vec![link("REQ-TEST-SWH-11", 11, 8)]
        );
        assert_eq!(by_name("getSegment").links, vec![link("REQ-TEST-SWL-12", 15, 8)]);
        assert_eq!(
            by_name("enumerateObjects").links,
            vec![link("REQ-TEST-SWL-13", 24, 8)]
        );
        assert_eq!(
            by_name("operator[]").links,
            vec![
                link("REQ-TEST-SWL-13", 35, 8),
                link("REQ-TEST-SWL-14", 35, 25)
            ]
        );
        assert!(tags.iter().all(|t| !t.optional));
    }

    #[test]
    fn symbols_are_sorted_by_line() {
        let mut tags = symbols(&[("b", 17), ("a", 13)]);
        annotate(SOURCE, &mut tags, false);
        assert_eq!(tags[0].tag, "a");
        assert_eq!(tags[1].tag, "b");
    }

    #[test]
    fn test_files_are_optional() {
        let mut tags = symbols(&[("getNumberOfSegments", 13), ("nothing", 9)]);
        annotate(SOURCE, &mut tags, true);
        assert!(tags.iter().all(|t| t.optional));
    }

    #[test]
    fn tagger_optional_survives() {
        let mut tags = symbols(&[("getNumberOfSegments", 13)]);
        tags[0].optional = true;
        annotate(SOURCE, &mut tags, false);
        assert!(tags[0].optional);
    }

    #[test]
    fn symbols_on_same_line_share_links() {
        let mut tags = symbols(&[("getNumberOfSegments", 13), ("numberOfSegments", 13)]);
        annotate(SOURCE, &mut tags, false);
        assert_eq!(tags[0].links, tags[1].links);
        assert_eq!(tags[1].links.len(), 1);
    }

    #[test]
    fn comments_above_previous_symbol_are_not_reused() {
        let source = "// @llr REQ-A-B-1\nvoid first();\n// @llr REQ-A-B-2\nvoid second();\n";
        let mut tags = symbols(&[("first", 2), ("second", 4)]);
        annotate(source, &mut tags, false);
        assert_eq!(tags[0].links, vec![link("REQ-A-B-1", 0, 8)]);
        assert_eq!(tags[1].links, vec![link("REQ-A-B-2", 2, 8)]);

        let mut tags = symbols(&[("first", 2), ("second", 3)]);
        annotate(source, &mut tags, false);
        assert!(tags[1].links.is_empty());
    }

    #[test]
    fn multiple_llr_lines_are_collected_bottom_up() {
        let source = "/**\n * @llr REQ-A-B-1\n * \\llr REQ-A-B-2 REQ-A-B-2\n */\nvoid f();\n";
        let mut tags = symbols(&[("f", 5)]);
        annotate(source, &mut tags, false);
        assert_eq!(
            tags[0].link_ids().collect::<Vec<_>>(),
            vec!["REQ-A-B-2", "REQ-A-B-2", "REQ-A-B-1"]
        );
    }

    #[test_case("// @llr REQ-A-B-1 see above"; "trailing text")]
    #[test_case("// @llr REQ-A-1"; "malformed id")]
    #[test_case("// llr REQ-A-B-1"; "missing marker")]
    #[test_case("x = 1; // @llr REQ-A-B-1"; "code before comment")]
    fn lines_that_do_not_link(line: &str) {
        let source = format!("{line}\nvoid f();\n");
        let mut tags = symbols(&[("f", 2)]);
        annotate(&source, &mut tags, false);
        assert!(tags[0].links.is_empty());
    }

    #[test]
    fn symbol_past_end_of_file() {
        let mut tags = symbols(&[("ghost", 500)]);
        annotate("// @llr REQ-A-B-1\n", &mut tags, false);
        assert_eq!(tags[0].link_ids().collect::<Vec<_>>(), vec!["REQ-A-B-1"]);
    }
}
