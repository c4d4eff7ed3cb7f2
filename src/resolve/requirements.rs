//! Checks on each requirement against its document's configuration and the
//! rest of the graph.

use std::sync::LazyLock;

use regex::Regex;

use crate::domain::{
    Document, FlowId, Graph, Issue, IssueType, Presence, ReqId, Requirement, Severity, Variant,
    id::REQ_ID_PATTERN,
};

static SHALL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bshall\b").expect("shall regex is valid"));

/// What checking the requirements found.
#[derive(Debug, Default)]
pub(super) struct Findings {
    pub(super) issues: Vec<Issue>,
    /// Flow tags listed by requirements, to be recorded on the tags.
    pub(super) flow_links: Vec<(FlowId, ReqId)>,
}

/// Checks every live requirement.
pub(super) fn check(graph: &Graph) -> Findings {
    let mut findings = Findings::default();

    for req in graph.requirements.values() {
        if req.is_deleted() {
            continue;
        }
        let Some(document) = graph.config.document(&req.document) else {
            tracing::warn!("{} belongs to unconfigured document {}", req.id, req.document);
            continue;
        };

        let mut check = Check {
            graph,
            document,
            req,
            issues: Vec::new(),
        };
        check.id_schema();
        check.attributes();
        check.shall(graph.config.shall_severity);
        check.parents();
        check.body_references();
        let flow_links = check.flow_tags();

        findings.issues.extend(check.issues);
        findings
            .flow_links
            .extend(flow_links.into_iter().map(|flow_id| (flow_id, req.id.clone())));
    }

    findings
}

struct Check<'a> {
    graph: &'a Graph,
    document: &'a Document,
    req: &'a Requirement,
    issues: Vec<Issue>,
}

impl Check<'_> {
    fn report(&mut self, kind: IssueType, severity: Severity, description: String) {
        let req = self.req;
        let document = &req.document;
        self.issues.push(
            Issue::new(kind, severity, description).at(
                &document.repo_name,
                &document.path,
                req.position,
            ),
        );
    }

    fn major(&mut self, kind: IssueType, description: String) {
        self.report(kind, Severity::Major, description);
    }

    fn id_schema(&mut self) {
        let req = self.req;
        let pattern = &self.document.schema.requirements;
        if !pattern.is_match(&req.id.to_string()) {
            let description = format!(
                "Requirement `{}` in document `{}` does not match required regexp `{pattern}`",
                req.id, req.document.path
            );
            self.major(IssueType::InvalidRequirementId, description);
        }
    }

    fn attributes(&mut self) {
        let req = self.req;
        let document = self.document;
        let id = &req.id;
        let rules = document.attribute_rules(req.variant());

        let mut any_of = Vec::new();
        let mut any_present = false;

        for (name, rule) in rules {
            if rule.presence == Presence::Any {
                any_of.push(name.as_str());
            }

            match req.attributes.get(name).filter(|value| !value.is_empty()) {
                None if rule.presence == Presence::Required => {
                    self.major(
                        IssueType::MissingAttribute,
                        format!("Requirement '{id}' is missing attribute '{name}'."),
                    );
                }
                None => {}
                Some(value) => {
                    any_present |= rule.presence == Presence::Any;
                    if !rule.value.is_match(value) {
                        self.major(
                            IssueType::InvalidAttributeValue,
                            format!(
                                "Requirement '{id}' has invalid value '{value}' in attribute '{name}'."
                            ),
                        );
                    }
                }
            }
        }

        if !any_of.is_empty() && !any_present {
            any_of.sort_unstable();
            self.major(
                IssueType::MissingAttribute,
                format!(
                    "Requirement '{id}' is missing at least one of the attributes '{}'.",
                    any_of.join(",")
                ),
            );
        }

        let unknown = req
            .attributes
            .iter()
            .filter(|(name, _)| !rules.contains_key(name.as_str()));
        for (name, _) in unknown {
            self.major(
                IssueType::UnknownAttribute,
                format!("Requirement '{id}' has unknown attribute '{name}'."),
            );
        }
    }

    fn shall(&mut self, severity: Severity) {
        let req = self.req;
        let id = &req.id;
        let path = &req.document.path;

        let in_body = SHALL.find_iter(&req.body).count();
        if in_body == 0 && req.variant() == Variant::Requirement {
            self.report(
                IssueType::NoShallInBody,
                severity,
                format!(
                    "Requirement `{id}` in document `{path}` does not contain a SHALL statement in its body"
                ),
            );
        } else if in_body > 1 {
            self.report(
                IssueType::ManyShallInBody,
                severity,
                format!(
                    "Requirement `{id}` in document `{path}` contains multiple SHALL statements in its body"
                ),
            );
        }

        if req.rationale().is_some_and(|rationale| SHALL.is_match(rationale)) {
            self.report(
                IssueType::ShallInRationale,
                severity,
                format!(
                    "Requirement `{id}` in document `{path}` contains SHALL statements in its rationale"
                ),
            );
        }
    }

    fn parents(&mut self) {
        let req = self.req;
        let graph = self.graph;
        let id = &req.id;
        for parent_id in &req.parent_ids {
            let Some(parent) = graph.requirements.get(parent_id) else {
                self.major(
                    IssueType::InvalidParent,
                    format!("Invalid parent of requirement {id}: {parent_id} does not exist."),
                );
                continue;
            };

            if parent.is_deleted() {
                self.major(
                    IssueType::InvalidParent,
                    format!("Invalid parent of requirement {id}: {parent_id} is deleted."),
                );
            }
            if req.variant() == Variant::Requirement {
                if let Some(description) = self.link_violation(parent) {
                    self.major(IssueType::InvalidParent, description);
                }
            }
        }
    }

    /// Applies the first link rule matching both ends of a parent link.
    fn link_violation(&self, parent: &Requirement) -> Option<String> {
        let child_id = self.req.id.to_string();
        let parent_id = parent.id.to_string();

        for rule in &self.document.link_rules {
            if !rule.child.id.is_match(&child_id) {
                continue;
            }
            if let Some(attribute) = &rule.child.attribute {
                let applies = self
                    .req
                    .attributes
                    .get(&attribute.key)
                    .is_some_and(|value| attribute.value.is_match(value));
                if !applies {
                    continue;
                }
            }
            if !rule.parent.id.is_match(&parent_id) {
                continue;
            }

            if let Some(attribute) = &rule.parent.attribute {
                let value = parent.attributes.get(&attribute.key);
                if !value.is_some_and(|value| attribute.value.is_match(value)) {
                    return Some(format!(
                        "Requirement '{child_id}' has invalid parent link ID '{parent_id}' with attribute value '{}'=='{}'.",
                        attribute.key,
                        value.unwrap_or_default()
                    ));
                }
            }
            return None;
        }

        Some(format!(
            "Requirement '{child_id}' has invalid parent link ID '{parent_id}'."
        ))
    }

    fn body_references(&mut self) {
        let req = self.req;
        let graph = self.graph;
        let id = &req.id;
        for reference in REQ_ID_PATTERN.find_iter(&req.body) {
            let reference = reference.as_str();
            match graph.find(reference) {
                None => self.major(
                    IssueType::InvalidRequirementReference,
                    format!(
                        "Invalid reference to non existent requirement {reference} in body of {id}."
                    ),
                ),
                Some(target) if target.is_deleted() => self.major(
                    IssueType::InvalidRequirementReference,
                    format!("Invalid reference to deleted requirement {reference} in body of {id}."),
                ),
                Some(_) => {}
            }
        }
    }

    /// Returns the flow tags the requirement may link to.
    fn flow_tags(&mut self) -> Vec<FlowId> {
        let req = self.req;
        let graph = self.graph;
        let id = &req.id;
        let mut linked = Vec::new();

        for tag in req.flow_ids() {
            let known = tag
                .parse::<FlowId>()
                .ok()
                .filter(|flow_id| graph.flow_tags.contains_key(flow_id));
            let Some(flow_id) = known else {
                self.major(
                    IssueType::InvalidFlowId,
                    format!("Unknown data/control flow tag '{tag}' in requirement '{id}'"),
                );
                continue;
            };

            if flow_id.project() != self.document.prefix {
                self.major(
                    IssueType::FlowIdOfDifferentItem,
                    format!(
                        "Link to existing flow tag '{tag}' that belongs to a different item in requirement '{id}'"
                    ),
                );
                continue;
            }
            linked.push(flow_id);
        }

        linked
    }
}
