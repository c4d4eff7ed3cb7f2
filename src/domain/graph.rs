//! The in-memory traceability graph.
//!
//! The [`Graph`] is an arena: requirements are stored once, keyed by ID, and
//! every relationship (parents, children, implementing code, flow tags) is
//! recorded as keys into the arena rather than as references between
//! requirements.

use std::collections::{BTreeMap, HashMap, HashSet, btree_map::Entry};

use thiserror::Error;
use tracing::instrument;

use crate::domain::{CodeSymbol, Config, FlowId, FlowTag, Issue, ReqId, Requirement, SymbolKey};

/// Requirements, code symbols, flow tags and the issues found while building
/// and resolving them.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    pub(crate) requirements: BTreeMap<ReqId, Requirement>,
    pub(crate) code_symbols: Vec<CodeSymbol>,
    symbol_index: HashMap<SymbolKey, usize>,
    pub(crate) flow_tags: BTreeMap<FlowId, FlowTag>,
    pub(crate) issues: Vec<Issue>,
    pub(crate) config: Config,
}

/// Errors that can occur when merging graphs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MergeError {
    /// The same requirement ID has different definitions in the two graphs.
    #[error("different version of same requirement found: {0}")]
    ConflictingRequirement(ReqId),
    /// The same flow tag has different definitions in the two graphs.
    #[error("different version of same flow tag found: {0}")]
    ConflictingFlowTag(FlowId),
}

impl Graph {
    /// Creates an empty graph for a configuration.
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// The configuration the graph was built with.
    #[must_use]
    pub const fn config(&self) -> &Config {
        &self.config
    }

    /// All requirements, in ID order.
    #[must_use]
    pub const fn requirements(&self) -> &BTreeMap<ReqId, Requirement> {
        &self.requirements
    }

    /// Looks up a requirement.
    #[must_use]
    pub fn requirement(&self, id: &ReqId) -> Option<&Requirement> {
        self.requirements.get(id)
    }

    /// Looks up a requirement by its textual ID.
    ///
    /// Returns `None` if the text is not a requirement ID.
    #[must_use]
    pub fn find(&self, id: &str) -> Option<&Requirement> {
        id.parse::<ReqId>()
            .ok()
            .and_then(|id| self.requirements.get(&id))
    }

    /// All code symbols, in insertion order.
    #[must_use]
    pub fn code_symbols(&self) -> &[CodeSymbol] {
        &self.code_symbols
    }

    /// Looks up a code symbol.
    #[must_use]
    pub fn code_symbol(&self, key: &SymbolKey) -> Option<&CodeSymbol> {
        self.symbol_index
            .get(key)
            .map(|&index| &self.code_symbols[index])
    }

    /// All flow tags, in ID order.
    #[must_use]
    pub const fn flow_tags(&self) -> &BTreeMap<FlowId, FlowTag> {
        &self.flow_tags
    }

    /// Every issue found so far.
    #[must_use]
    pub fn issues(&self) -> &[Issue] {
        &self.issues
    }

    /// The resolved parents of a requirement.
    pub fn parents_of<'a>(&'a self, id: &ReqId) -> impl Iterator<Item = &'a Requirement> + 'a {
        self.lookup_all(self.requirements.get(id).map(|req| req.parents.as_slice()))
    }

    /// The resolved children of a requirement.
    pub fn children_of<'a>(&'a self, id: &ReqId) -> impl Iterator<Item = &'a Requirement> + 'a {
        self.lookup_all(self.requirements.get(id).map(|req| req.children.as_slice()))
    }

    /// The code symbols implementing or testing a requirement.
    pub fn tags_of<'a>(&'a self, id: &ReqId) -> impl Iterator<Item = &'a CodeSymbol> + 'a {
        self.requirements
            .get(id)
            .into_iter()
            .flat_map(|req| req.tags.iter())
            .filter_map(|key| self.code_symbol(key))
    }

    fn lookup_all<'a>(
        &'a self,
        ids: Option<&'a [ReqId]>,
    ) -> impl Iterator<Item = &'a Requirement> + 'a {
        ids.unwrap_or_default()
            .iter()
            .filter_map(|id| self.requirements.get(id))
    }

    /// Adds a code symbol.
    ///
    /// Symbols are identified by file, tag and line. Returns `false`, leaving
    /// the graph unchanged, if a symbol with the same identity is already
    /// present.
    pub fn add_code_symbol(&mut self, symbol: CodeSymbol) -> bool {
        let key = symbol.key();
        if self.symbol_index.contains_key(&key) {
            return false;
        }
        self.symbol_index.insert(key, self.code_symbols.len());
        self.code_symbols.push(symbol);
        true
    }

    pub(crate) fn push_issue(&mut self, issue: Issue) {
        self.issues.push(issue);
    }

    /// Populates `parents` and `children` of every requirement from the
    /// declared parent IDs.
    ///
    /// Parent IDs that do not resolve are skipped. Both lists are sorted by
    /// position, then by ID. Self references and cycles are not rejected.
    #[instrument(skip(self))]
    pub fn link_back_references(&mut self) {
        let positions: HashMap<ReqId, usize> = self
            .requirements
            .values()
            .map(|req| (req.id.clone(), req.position))
            .collect();

        let mut parents: BTreeMap<ReqId, Vec<ReqId>> = BTreeMap::new();
        let mut children: BTreeMap<ReqId, Vec<ReqId>> = BTreeMap::new();

        for req in self.requirements.values() {
            for parent in &req.parent_ids {
                if !positions.contains_key(parent) {
                    continue;
                }
                parents
                    .entry(req.id.clone())
                    .or_default()
                    .push(parent.clone());
                children
                    .entry(parent.clone())
                    .or_default()
                    .push(req.id.clone());
            }
        }

        let by_position = |a: &ReqId, b: &ReqId| (positions[a], a).cmp(&(positions[b], b));

        for req in self.requirements.values_mut() {
            req.parents = parents.remove(&req.id).unwrap_or_default();
            req.parents.sort_by(by_position);
            req.parents.dedup();

            req.children = children.remove(&req.id).unwrap_or_default();
            req.children.sort_by(by_position);
            req.children.dedup();
        }
    }

    /// Merges another graph into this one.
    ///
    /// Requirements and flow tags present in both graphs must have the same
    /// definition; their code and requirement links are combined. Code symbols
    /// and issues already present are skipped. Repository configurations from
    /// `other` replace those with the same name.
    ///
    /// Back-references are not updated; call
    /// [`link_back_references`](Self::link_back_references) once all graphs
    /// are merged.
    ///
    /// # Errors
    ///
    /// Returns an error, leaving this graph unchanged, if a requirement or flow
    /// tag is defined differently in the two graphs.
    #[instrument(skip_all)]
    pub fn merge(&mut self, other: Self) -> Result<(), MergeError> {
        for (id, req) in &other.requirements {
            if let Some(existing) = self.requirements.get(id) {
                if !existing.same_definition(req) {
                    return Err(MergeError::ConflictingRequirement(id.clone()));
                }
            }
        }
        for (id, tag) in &other.flow_tags {
            if let Some(existing) = self.flow_tags.get(id) {
                if !existing.same_definition(tag) {
                    return Err(MergeError::ConflictingFlowTag(id.clone()));
                }
            }
        }

        let Self {
            requirements,
            code_symbols,
            flow_tags,
            issues,
            config,
            ..
        } = other;

        for (id, req) in requirements {
            match self.requirements.entry(id) {
                Entry::Vacant(entry) => {
                    entry.insert(req);
                }
                Entry::Occupied(mut entry) => union(&mut entry.get_mut().tags, req.tags),
            }
        }

        for (id, tag) in flow_tags {
            match self.flow_tags.entry(id) {
                Entry::Vacant(entry) => {
                    entry.insert(tag);
                }
                Entry::Occupied(mut entry) => union(&mut entry.get_mut().reqs, tag.reqs),
            }
        }

        for symbol in code_symbols {
            if let Some(existing) = self.code_symbol(&symbol.key()) {
                if *existing != symbol {
                    tracing::warn!(
                        "Keeping first declaration of {} at {}:{}",
                        symbol.tag,
                        symbol.file,
                        symbol.line
                    );
                }
                continue;
            }
            self.add_code_symbol(symbol);
        }

        let mut seen: HashSet<Issue> = self.issues.iter().cloned().collect();
        for issue in issues {
            if seen.insert(issue.clone()) {
                self.issues.push(issue);
            }
        }

        self.config.merge(config);
        Ok(())
    }
}

fn union<T: PartialEq>(into: &mut Vec<T>, from: Vec<T>) {
    for item in from {
        if !into.contains(&item) {
            into.push(item);
        }
    }
}
