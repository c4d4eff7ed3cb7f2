//! Ingestion of parsed documents and resolution of the links between
//! requirements, code and flow tags.
//!
//! Ingestion runs once per document, in configuration order: flow tags are
//! registered and requirement IDs are checked against the document's
//! sequence. Resolution runs once over the complete graph and only ever
//! appends issues and back-links; nothing parsed is modified.

use tracing::instrument;

use crate::{
    domain::{DocumentKey, Graph, Issue, IssueType},
    storage::ParsedDocument,
};

mod code;
mod flow;
mod requirements;
mod sequence;

impl Graph {
    /// Adds the requirements and flow tags of a parsed document.
    ///
    /// Flow tags that are duplicated or carry another project's prefix, and
    /// requirements whose ID is out of sequence or already defined elsewhere,
    /// are reported and left out of the graph. The rest of the document is
    /// still added.
    #[instrument(skip(self, parsed))]
    pub(crate) fn add_document(&mut self, key: &DocumentKey, parsed: ParsedDocument) {
        let Some(document) = self.config.document(key).cloned() else {
            tracing::warn!("Skipping unconfigured document {key}");
            return;
        };

        flow::register(self, &document, parsed.flow_tags);

        let accepted = sequence::check(&document, parsed.requirements, &mut self.issues);
        for req in accepted {
            if let Some(existing) = self.requirements.get(&req.id) {
                let issue = Issue::major(
                    IssueType::InvalidRequirementId,
                    format!(
                        "Requirement {} is already defined in {} on line {}.",
                        req.id, existing.document, existing.position
                    ),
                )
                .at(&key.repo_name, &key.path, req.position);
                self.push_issue(issue);
                continue;
            }
            self.requirements.insert(req.id.clone(), req);
        }

        tracing::debug!(
            "Added {key}: {} requirements, {} flow tags",
            self.requirements
                .values()
                .filter(|req| &req.document == key)
                .count(),
            self.flow_tags
                .values()
                .filter(|tag| &tag.document == key)
                .count()
        );
    }

    /// Validates the whole graph, appending every issue found.
    ///
    /// Requirements are checked against their document's schema and link
    /// rules, code symbols are linked to the requirements they name
    /// (filling each requirement's `tags`), coverage is checked, and flow
    /// tags are linked to the requirements listing them (filling each tag's
    /// `reqs`) and checked for gaps and bad directions.
    ///
    /// Resolution never fails. `parents` and `children` are not populated;
    /// see [`Graph::link_back_references`].
    #[instrument(skip(self))]
    pub fn resolve(&mut self) {
        let before = self.issues.len();

        let requirements::Findings { issues, flow_links } = requirements::check(self);
        self.issues.extend(issues);
        for (flow_id, req_id) in flow_links {
            if let Some(tag) = self.flow_tags.get_mut(&flow_id) {
                tag.reqs.push(req_id);
            }
        }

        let code::Findings { issues, tags } = code::link(self);
        self.issues.extend(issues);
        for (req_id, symbol) in tags {
            if let Some(req) = self.requirements.get_mut(&req_id) {
                if !req.tags.contains(&symbol) {
                    req.tags.push(symbol);
                }
            }
        }

        let coverage = code::coverage(self);
        self.issues.extend(coverage);

        let flow = flow::check(self);
        self.issues.extend(flow);

        tracing::debug!("Resolution found {} issues", self.issues.len() - before);
    }
}
