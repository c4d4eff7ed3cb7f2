//! Control and data flow tags.

use std::collections::BTreeMap;

use crate::domain::{Document, FlowKind, FlowTag, Graph, Issue, IssueType};

/// Adds the flow tags of a document.
///
/// Tags already present in the graph, and tags whose project is not the
/// document's prefix, are reported and dropped.
pub(super) fn register(graph: &mut Graph, document: &Document, tags: Vec<FlowTag>) {
    for tag in tags {
        if graph.flow_tags.contains_key(&tag.id) {
            let issue = Issue::major(
                IssueType::DuplicateFlowId,
                format!("Duplicate data/control flow tag '{}'", tag.id),
            );
            graph.push_issue(located(&tag, issue));
        } else if tag.id.project() != document.prefix {
            let issue = Issue::major(
                IssueType::InvalidFlowId,
                format!("Invalid data/control flow tag prefix in '{}'", tag.id),
            );
            graph.push_issue(located(&tag, issue));
        } else {
            graph.flow_tags.insert(tag.id.clone(), tag);
        }
    }
}

/// Checks flow tags once requirements have been linked to them.
///
/// Each family (`CF-PROJECT`, `DF-PROJECT`) must be numbered from 1 with no
/// gaps, across every document. Live tags must be referenced by at least one
/// requirement, and data flow tags must have a valid direction.
pub(super) fn check(graph: &Graph) -> Vec<Issue> {
    let mut issues = Vec::new();

    let mut families: BTreeMap<String, Vec<u64>> = BTreeMap::new();
    for id in graph.flow_tags.keys() {
        families.entry(id.family()).or_default().push(id.number());
    }
    for (family, mut numbers) in families {
        numbers.sort_unstable();
        let mut expected = 1;
        for number in numbers {
            for missing in expected..number {
                issues.push(Issue::major(
                    IssueType::MissingFlowId,
                    format!("Missing flow tag '{family}-{missing}'"),
                ));
            }
            expected = number.saturating_add(1);
        }
    }

    for tag in graph.flow_tags.values() {
        if tag.reqs.is_empty() && !tag.deleted {
            let issue = Issue::note(
                IssueType::FlowNotImplemented,
                format!("Data/control flow tag '{}' has no linked requirements", tag.id),
            );
            issues.push(located(tag, issue));
        }

        if tag.id.kind() == FlowKind::Data && !tag.has_valid_direction() {
            let issue = Issue::major(
                IssueType::InvalidFlowDirection,
                format!(
                    "Invalid direction '{}' for data flow tag '{}'. Allowed values are 'In', 'Out' and 'In/Out'",
                    tag.direction, tag.id
                ),
            );
            issues.push(located(tag, issue));
        }
    }

    issues
}

fn located(tag: &FlowTag, issue: Issue) -> Issue {
    issue.at(&tag.document.repo_name, &tag.document.path, tag.position)
}

#[cfg(test)]
mod tests {
    use super::super::fixtures::*;
    use crate::domain::{AttributeKey, AttributeRule, FLOW, Graph, IssueType, Presence, Severity};

    const FLOWS: &str = "\
| Caller | Flow Tag | Callee | Description |
| --- | --- | --- | --- |
| Main | CF-TEST-1 | Worker | Starts work |
| Main | CF-TEST-4 | Worker | Stops work |
| Main | CF-OTHER-1 | Worker | Someone else's |
| Main | CF-TEST-1 | Worker | Again |

| Caller | Flow Tag | Callee | Direction | Description |
| --- | --- | --- | --- | --- |
| Sensor | DF-TEST-1 | Filter | `In` | Samples |
| Filter | DF-TEST-2-DELETED | Sink | Out | Old samples |
| Filter | DF-TEST-3 | Sink | Bad | Filtered samples |
";

    const REQS: &str = "\
## REQ-TEST-SYS-1 Flows
The system shall move data.

### Attributes:
- Flow: CF-TEST-1, CF-TEST-4, DF-TEST-1, DF-TEST-3, DF-TEST-9
";

    fn flow_graph() -> Graph {
        let mut document = document("SYS.md", "SYS");
        document.schema.attributes.insert(
            AttributeKey::new(FLOW),
            AttributeRule::new(Presence::Optional, None).unwrap(),
        );
        let text = format!("{FLOWS}\n{REQS}");
        let mut graph = graph(config(vec![document]), &[("SYS.md", text.as_str())]);
        graph.resolve();
        graph
    }

    #[test]
    fn registration_drops_bad_tags() {
        let graph = flow_graph();

        let ids: Vec<String> = graph.flow_tags().keys().map(ToString::to_string).collect();
        assert_eq!(
            ids,
            vec!["CF-TEST-1", "CF-TEST-4", "DF-TEST-1", "DF-TEST-2", "DF-TEST-3"]
        );

        let duplicates = of_kind(&graph, IssueType::DuplicateFlowId);
        assert_eq!(duplicates.len(), 1);
        assert_eq!(duplicates[0].line, 6);
        assert_eq!(
            of_kind(&graph, IssueType::InvalidFlowId)[0].description,
            "Invalid data/control flow tag prefix in 'CF-OTHER-1'"
        );
    }

    #[test]
    fn one_issue_per_missing_number() {
        let graph = flow_graph();

        let missing: Vec<&str> = of_kind(&graph, IssueType::MissingFlowId)
            .into_iter()
            .map(|issue| issue.description.as_str())
            .collect();
        assert_eq!(
            missing,
            vec!["Missing flow tag 'CF-TEST-2'", "Missing flow tag 'CF-TEST-3'"]
        );
    }

    #[test]
    fn requirements_link_to_tags() {
        let graph = flow_graph();

        let linked: Vec<usize> = graph.flow_tags().values().map(|tag| tag.reqs.len()).collect();
        assert_eq!(linked, vec![1, 1, 1, 0, 1]);

        let unknown = of_kind(&graph, IssueType::InvalidFlowId);
        assert_eq!(
            unknown[1].description,
            "Unknown data/control flow tag 'DF-TEST-9' in requirement 'REQ-TEST-SYS-1'"
        );
        // The deleted tag needs no requirements.
        assert!(of_kind(&graph, IssueType::FlowNotImplemented).is_empty());
    }

    #[test]
    fn bad_direction_is_one_major_issue() {
        let graph = flow_graph();

        let directions = of_kind(&graph, IssueType::InvalidFlowDirection);
        assert_eq!(directions.len(), 1);
        assert_eq!(
            directions[0].description,
            "Invalid direction 'Bad' for data flow tag 'DF-TEST-3'. Allowed values are 'In', 'Out' and 'In/Out'"
        );
        assert_eq!(directions[0].severity, Severity::Major);
        assert_eq!(directions[0].line, 11);
    }
}
