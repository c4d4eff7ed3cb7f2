//! Requirement numbering within a document.

use std::collections::HashSet;

use crate::domain::{Document, Issue, IssueType, Requirement, Variant};

/// Checks the IDs of a document's requirements and returns those that pass.
///
/// Requirements and assumptions are numbered independently. Each sequence
/// must carry the document's prefix and level, start at 1, have no gaps, no
/// duplicates and no leading zeros. The number expected next always follows
/// the last number seen, so a single gap is reported once.
pub(super) fn check(
    document: &Document,
    mut requirements: Vec<Requirement>,
    issues: &mut Vec<Issue>,
) -> Vec<Requirement> {
    // Stable, so duplicates keep document order.
    requirements.sort_by_key(Requirement::id_number);

    let mut requirement_numbers = Numbering::default();
    let mut assumption_numbers = Numbering::default();

    requirements
        .into_iter()
        .filter(|req| {
            let numbering = match req.variant() {
                Variant::Requirement => &mut requirement_numbers,
                Variant::Assumption => &mut assumption_numbers,
            };
            let found = check_id(document, req, numbering);
            let accepted = found.is_empty();
            issues.extend(found);
            accepted
        })
        .collect()
}

#[derive(Debug)]
struct Numbering {
    seen: HashSet<u64>,
    next: u64,
}

impl Default for Numbering {
    fn default() -> Self {
        Self {
            seen: HashSet::new(),
            next: 1,
        }
    }
}

fn check_id(document: &Document, req: &Requirement, numbering: &mut Numbering) -> Vec<Issue> {
    let id = &req.id;
    let mut descriptions = Vec::new();

    if id.project() != document.prefix {
        descriptions.push(format!(
            "Incorrect project abbreviation for requirement {id}. Expected {}, got {}.",
            document.prefix,
            id.project()
        ));
    }
    if id.level() != document.level {
        descriptions.push(format!(
            "Incorrect requirement type for requirement {id}. Expected {}, got {}.",
            document.level,
            id.level()
        ));
    }
    if id.has_leading_zero() {
        descriptions.push(format!(
            "Requirement number cannot begin with a 0: {id}. Got {}.",
            id.digits()
        ));
    }

    let number = id.number();
    if number < 1 {
        descriptions.push(format!(
            "Invalid requirement sequence number for {id}: first requirement has to start with 001."
        ));
    } else if !numbering.seen.insert(number) {
        descriptions.push(format!(
            "Invalid requirement sequence number for {id}, is duplicate."
        ));
    } else if number != numbering.next {
        descriptions.push(format!(
            "Invalid requirement sequence number for {id}: missing requirements in between. Expected ID Number {}.",
            numbering.next
        ));
    }
    numbering.next = number.saturating_add(1);

    descriptions
        .into_iter()
        .map(|description| {
            Issue::major(IssueType::InvalidRequirementId, description).at(
                &req.document.repo_name,
                &req.document.path,
                req.position,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentKey;

    fn document() -> Document {
        Document::new("SYS.md", "TEST", "SYS").unwrap()
    }

    fn requirements(ids: &[&str]) -> Vec<Requirement> {
        ids.iter()
            .enumerate()
            .map(|(position, id)| {
                Requirement::new(
                    id.parse().unwrap(),
                    DocumentKey::new("project", "SYS.md"),
                    position + 1,
                )
            })
            .collect()
    }

    fn run(ids: &[&str]) -> (Vec<String>, Vec<String>) {
        let mut issues = Vec::new();
        let accepted = check(&document(), requirements(ids), &mut issues);
        (
            accepted.iter().map(|req| req.id.to_string()).collect(),
            issues.into_iter().map(|issue| issue.description).collect(),
        )
    }

    #[test]
    fn in_sequence() {
        let (accepted, issues) = run(&[
            "REQ-TEST-SYS-2",
            "ASM-TEST-SYS-1",
            "REQ-TEST-SYS-1",
            "REQ-TEST-SYS-3",
        ]);
        assert!(issues.is_empty());
        assert_eq!(
            accepted,
            vec![
                "ASM-TEST-SYS-1",
                "REQ-TEST-SYS-1",
                "REQ-TEST-SYS-2",
                "REQ-TEST-SYS-3"
            ]
        );
    }

    #[test]
    fn duplicate_keeps_first() {
        let mut issues = Vec::new();
        let accepted = check(
            &document(),
            requirements(&["REQ-TEST-SYS-1", "REQ-TEST-SYS-2", "REQ-TEST-SYS-2"]),
            &mut issues,
        );

        assert_eq!(accepted.len(), 2);
        assert_eq!(accepted[1].position, 2);
        assert_eq!(issues.len(), 1);
        assert_eq!(
            issues[0].description,
            "Invalid requirement sequence number for REQ-TEST-SYS-2, is duplicate."
        );
        assert_eq!(issues[0].line, 3);
        assert_eq!(issues[0].kind, IssueType::InvalidRequirementId);
    }

    #[test]
    fn gap_is_reported_once() {
        let (accepted, issues) = run(&["REQ-TEST-SYS-1", "REQ-TEST-SYS-4", "REQ-TEST-SYS-5"]);
        assert_eq!(accepted, vec!["REQ-TEST-SYS-1", "REQ-TEST-SYS-5"]);
        assert_eq!(
            issues,
            vec![
                "Invalid requirement sequence number for REQ-TEST-SYS-4: missing requirements in between. Expected ID Number 2."
            ]
        );
    }

    #[test]
    fn wrong_prefix_and_level() {
        let (accepted, issues) = run(&["REQ-TEST-SYS-1", "REQ-OTHER-SWL-2"]);
        assert_eq!(accepted, vec!["REQ-TEST-SYS-1"]);
        assert_eq!(
            issues,
            vec![
                "Incorrect project abbreviation for requirement REQ-OTHER-SWL-2. Expected TEST, got OTHER.",
                "Incorrect requirement type for requirement REQ-OTHER-SWL-2. Expected SYS, got SWL.",
            ]
        );
    }

    #[test]
    fn leading_zero_and_zero() {
        let (accepted, issues) = run(&["REQ-TEST-SYS-0", "REQ-TEST-SYS-01"]);
        assert!(accepted.is_empty());
        assert_eq!(
            issues,
            vec![
                "Requirement number cannot begin with a 0: REQ-TEST-SYS-0. Got 0.",
                "Invalid requirement sequence number for REQ-TEST-SYS-0: first requirement has to start with 001.",
                "Requirement number cannot begin with a 0: REQ-TEST-SYS-01. Got 01.",
            ]
        );
    }
}
