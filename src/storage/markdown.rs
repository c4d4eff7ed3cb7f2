//! Parsing of certification documents.
//!
//! A certification document is markdown. Requirements are written either as
//! ATX headings starting with the requirement ID, followed by a body and an
//! optional `Attributes:` sub-heading, or as rows of a table whose first
//! column is `ID`. Control flow and data flow tags are written as rows of
//! tables with fixed headers.
//!
//! ```markdown
//! #### REQ-TEST-SYS-1 Start up
//! The system shall start.
//!
//! ##### Attributes:
//! - Rationale: Nothing works otherwise.
//! - Parents: REQ-TEST-URS-1, REQ-TEST-URS-2
//!
//! | ID | Title | Body | Parents |
//! | --- | --- | --- | --- |
//! | REQ-TEST-SYS-2 | Shut down | The system shall stop. | REQ-TEST-URS-3 |
//!
//! | Caller | Flow Tag | Callee | Direction | Description |
//! | --- | --- | --- | --- | --- |
//! | Sensor | DF-TEST-1 | Filter | In | Raw samples |
//! ```

use std::{io, path::Path, sync::LazyLock};

use regex::{Captures, Regex};

use crate::domain::{
    AttributeKey, DocumentKey, FlowId, FlowKind, FlowTag, IdError, PARENTS, ReqId, Requirement,
    id::REQ_ID_PATTERN,
};

static ATX_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ {0,3}(#{1,6})( +(.*)( #* *)?)?$").expect("heading regex is valid")
});

static REQ_TABLE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\| *ID *\|(?:[^\|]*\|)+$").expect("table header regex is valid")
});

static CF_TABLE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\| *Caller *\| *Flow Tag *\| *Callee *\| *Description *\|$")
        .expect("control flow header regex is valid")
});

static DF_TABLE_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\| *Caller *\| *Flow Tag *\| *Callee *\| *Direction *\| *Description *\|$")
        .expect("data flow header regex is valid")
});

static TABLE_DELIMITER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|(?: *-+ *\|)+$").expect("delimiter regex is valid"));

static CF_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CF-[0-9A-Za-z_]+-[0-9]+(-DELETED)?$").expect("control flow tag regex is valid")
});

static DF_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^DF-[0-9A-Za-z_]+-[0-9]+(-DELETED)?$").expect("data flow tag regex is valid")
});

static BAD_REQ_ID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(REQ|ASM)-((\d+)|((\w+)-(\d+)))").expect("malformed ID regex is valid")
});

static ATTRIBUTES_HEADING: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^#{2,6} Attributes:$").expect("attributes heading regex is valid")
});

static ATTRIBUTE_KEY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mU)^- (.+):").expect("attribute key regex is valid"));

const DELETED_SUFFIX: &str = "-DELETED";

/// The requirements and flow tags of one document, in document order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedDocument {
    /// Requirements and assumptions.
    pub requirements: Vec<Requirement>,
    /// Control and data flow tags.
    pub flow_tags: Vec<FlowTag>,
}

/// Errors that can occur when parsing a certification document.
///
/// Every structural error aborts the whole document.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The document could not be read.
    #[error("failed to read document")]
    Io(#[from] io::Error),

    /// A heading contains more than one requirement ID.
    #[error("malformed requirement title: too many IDs on line {line}: {text:?}")]
    TooManyIds {
        /// The line of the heading.
        line: usize,
        /// The heading.
        text: String,
    },

    /// A requirement heading at a different level than the requirement before.
    #[error(
        "requirement heading on line {line} must be at same level as requirement heading on line {previous} ({level} != {expected}): {text:?}"
    )]
    RequirementLevel {
        /// The line of the heading.
        line: usize,
        /// The line of the previous requirement heading.
        previous: usize,
        /// The level of the heading.
        level: usize,
        /// The level of the previous requirement heading.
        expected: usize,
        /// The heading.
        text: String,
    },

    /// A plain heading at the level of the requirement being parsed.
    #[error(
        "non-requirement heading on line {line} at same level as requirement heading on line {previous} ({level}): {text:?}"
    )]
    MixedHeading {
        /// The line of the heading.
        line: usize,
        /// The line of the requirement heading.
        previous: usize,
        /// The shared level.
        level: usize,
        /// The heading.
        text: String,
    },

    /// A requirement heading at the level of the preceding plain heading.
    #[error(
        "requirement heading on line {line} at same level as previous heading on line {previous} ({level}): {text:?}"
    )]
    SectionLevel {
        /// The line of the heading.
        line: usize,
        /// The line of the previous heading.
        previous: usize,
        /// The shared level.
        level: usize,
        /// The heading.
        text: String,
    },

    /// Something that looks like an ID but does not have all its parts.
    #[error(
        "malformed requirement on line {line}: found only malformed ID: {text:?} (doesn't match {pattern:?})",
        pattern = REQ_ID_PATTERN.as_str()
    )]
    MalformedId {
        /// The line of the requirement.
        line: usize,
        /// The start of the requirement text.
        text: String,
    },

    /// No ID at all.
    #[error("malformed requirement on line {line}: missing ID in first 40 characters: {text:?}")]
    MissingId {
        /// The line of the requirement.
        line: usize,
        /// The start of the requirement text.
        text: String,
    },

    /// The ID is preceded by other text.
    #[error("malformed requirement on line {line}: ID must be at the start of the title: {text:?}")]
    IdNotAtStart {
        /// The line of the requirement.
        line: usize,
        /// The start of the requirement text.
        text: String,
    },

    /// The ID has the right shape but cannot be represented.
    #[error("invalid requirement ID on line {line}")]
    Id {
        /// The line of the requirement.
        line: usize,
        /// The underlying error.
        source: IdError,
    },

    /// A heading requirement with nothing but a title.
    #[error("requirement on line {line} must not be empty: {id}")]
    EmptyRequirement {
        /// The line of the requirement.
        line: usize,
        /// The requirement ID.
        id: String,
    },

    /// A heading requirement with attributes but no body.
    #[error("requirement body on line {line} must not be empty: {id}")]
    EmptyBody {
        /// The line of the requirement.
        line: usize,
        /// The requirement ID.
        id: String,
    },

    /// An `Attributes:` heading with no attributes under it.
    #[error("requirement {id} on line {line} contains an attribute section but no attributes")]
    NoAttributes {
        /// The line of the requirement.
        line: usize,
        /// The requirement ID.
        id: String,
    },

    /// The same attribute listed twice.
    #[error("requirement {id} on line {line} contains duplicate attribute: {attribute:?}")]
    DuplicateAttribute {
        /// The line of the requirement.
        line: usize,
        /// The requirement ID.
        id: String,
        /// The normalized attribute name.
        attribute: String,
    },

    /// The parents attribute contains something other than IDs.
    #[error(
        "requirement {id} on line {line} parents: unparseable as list of requirement ids: {text:?} in {parents:?}"
    )]
    Parents {
        /// The line of the requirement.
        line: usize,
        /// The requirement ID.
        id: String,
        /// The offending text.
        text: String,
        /// The whole attribute value.
        parents: String,
    },

    /// A table row with fewer cells than the header.
    #[error("too few cells on line {line} of {table} table")]
    TooFewCells {
        /// The line of the row.
        line: usize,
        /// The kind of table.
        table: &'static str,
    },

    /// A flow table row whose tag does not match the table kind.
    #[error("Invalid tag '{tag}' on line {line} of {table} table")]
    InvalidFlowTag {
        /// The line of the row.
        line: usize,
        /// The offending tag.
        tag: String,
        /// The kind of table.
        table: &'static str,
    },
}

/// Reads and parses a certification document.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is malformed.
pub fn load_document(root: &Path, document: &DocumentKey) -> Result<ParsedDocument, ParseError> {
    let text = std::fs::read_to_string(root.join(&document.path))?;
    parse_document(&text, document)
}

/// Parses the text of a certification document.
///
/// # Errors
///
/// Returns the first structural error found. Nothing is returned for a
/// malformed document.
pub fn parse_document(text: &str, document: &DocumentKey) -> Result<ParsedDocument, ParseError> {
    let mut parser = Parser::new(document);
    for (index, line) in text.lines().enumerate() {
        parser.line(index + 1, line)?;
    }
    parser.close()?;
    Ok(parser.parsed)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Fragment {
    Heading,
    RequirementTable,
    FlowTable(FlowKind),
}

struct Parser<'a> {
    document: &'a DocumentKey,
    parsed: ParsedDocument,

    /// The fragment being collected, if any.
    fragment: Option<Fragment>,
    buffer: String,
    /// Line the current fragment started on.
    fragment_line: usize,

    /// Level of the heading that started the last requirement.
    requirement_level: usize,
    /// Level and line of the last heading.
    last_heading: (usize, usize),
}

impl<'a> Parser<'a> {
    fn new(document: &'a DocumentKey) -> Self {
        Self {
            document,
            parsed: ParsedDocument::default(),
            fragment: None,
            buffer: String::new(),
            fragment_line: 0,
            requirement_level: 0,
            last_heading: (0, 0),
        }
    }

    fn line(&mut self, number: usize, line: &str) -> Result<(), ParseError> {
        let mut content = line;

        if let Some(captures) = ATX_HEADING.captures(line) {
            let level = captures[1].len();
            let title = captures.get(3).map_or("", |m| m.as_str());
            let id_count = REQ_ID_PATTERN.find_iter(title).count();
            if id_count > 1 {
                return Err(ParseError::TooManyIds {
                    line: number,
                    text: line.to_string(),
                });
            }
            let has_id = id_count == 1;

            self.check_heading_level(number, line, level, has_id)?;

            if self.fragment.is_some() && (has_id || level < self.requirement_level) {
                self.close()?;
            }

            if has_id {
                self.open(Fragment::Heading, number);
                self.requirement_level = level;
                content = title;
            }
            self.last_heading = (level, number);
        } else if REQ_TABLE_HEADER.is_match(line) {
            self.close()?;
            self.open(Fragment::RequirementTable, number);
        } else if DF_TABLE_HEADER.is_match(line) {
            self.close()?;
            self.open(Fragment::FlowTable(FlowKind::Data), number);
        } else if CF_TABLE_HEADER.is_match(line) {
            self.close()?;
            self.open(Fragment::FlowTable(FlowKind::Control), number);
        }

        if self.fragment.is_some() {
            self.buffer.push_str(content);
            self.buffer.push('\n');
        }
        Ok(())
    }

    fn check_heading_level(
        &self,
        number: usize,
        line: &str,
        level: usize,
        has_id: bool,
    ) -> Result<(), ParseError> {
        if self.fragment == Some(Fragment::Heading) {
            if has_id && level != self.requirement_level {
                return Err(ParseError::RequirementLevel {
                    line: number,
                    previous: self.fragment_line,
                    level,
                    expected: self.requirement_level,
                    text: line.to_string(),
                });
            }
            if !has_id && level == self.requirement_level {
                return Err(ParseError::MixedHeading {
                    line: number,
                    previous: self.fragment_line,
                    level,
                    text: line.to_string(),
                });
            }
        } else if has_id && level == self.last_heading.0 {
            return Err(ParseError::SectionLevel {
                line: number,
                previous: self.last_heading.1,
                level,
                text: line.to_string(),
            });
        }
        Ok(())
    }

    fn open(&mut self, fragment: Fragment, line: usize) {
        self.fragment = Some(fragment);
        self.fragment_line = line;
        self.buffer.clear();
    }

    fn close(&mut self) -> Result<(), ParseError> {
        let Some(fragment) = self.fragment.take() else {
            return Ok(());
        };
        let text = std::mem::take(&mut self.buffer);
        let line = self.fragment_line;

        match fragment {
            Fragment::Heading => {
                let requirement = parse_requirement(&text, line, self.document)?;
                self.parsed.requirements.push(requirement);
            }
            Fragment::RequirementTable => {
                parse_requirement_table(&text, line, self.document, &mut self.parsed.requirements)?;
            }
            Fragment::FlowTable(kind) => {
                parse_flow_table(&text, line, kind, self.document, &mut self.parsed.flow_tags)?;
            }
        }
        Ok(())
    }
}

/// Parses a heading requirement: the heading text without the `#` markers,
/// followed by every line up to the next requirement.
fn parse_requirement(
    text: &str,
    line: usize,
    document: &DocumentKey,
) -> Result<Requirement, ParseError> {
    let (id, id_end) = extract_id(text, line)?;
    let rest = text[id_end..].trim_start_matches(is_punct_or_space).trim();

    let mut req = Requirement::new(id, document.clone(), line);
    let (title, body_and_attributes) = match rest.split_once('\n') {
        Some((title, remainder)) => (title.trim_end(), Some(remainder)),
        None => (rest, None),
    };
    req.title = title.to_string();

    let Some(body_and_attributes) = body_and_attributes else {
        if req.is_deleted() {
            return Ok(req);
        }
        return Err(ParseError::EmptyRequirement {
            line,
            id: req.id.to_string(),
        });
    };

    let body_end = match ATTRIBUTES_HEADING.find(body_and_attributes) {
        Some(heading) => {
            parse_attributes(&body_and_attributes[heading.start()..], line, &mut req)?;
            heading.start()
        }
        None => body_and_attributes.len(),
    };

    req.body = body_and_attributes[..body_end].trim().to_string();
    if req.body.is_empty() {
        return Err(ParseError::EmptyBody {
            line,
            id: req.id.to_string(),
        });
    }

    req.parent_ids = parse_parents(&req, line)?;
    Ok(req)
}

/// Parses an attribute section. Each `- Key:` starts an attribute whose value
/// runs until the next key.
fn parse_attributes(section: &str, line: usize, req: &mut Requirement) -> Result<(), ParseError> {
    let keys: Vec<Captures> = ATTRIBUTE_KEY.captures_iter(section).collect();
    if keys.is_empty() {
        return Err(ParseError::NoAttributes {
            line,
            id: req.id.to_string(),
        });
    }

    let starts: Vec<usize> = keys
        .iter()
        .filter_map(|captures| captures.get(0))
        .map(|m| m.start())
        .chain([section.len()])
        .collect();

    for (index, captures) in keys.iter().enumerate() {
        let (Some(whole), Some(name)) = (captures.get(0), captures.get(1)) else {
            continue;
        };
        let key = AttributeKey::new(name.as_str());
        let value = section[whole.end()..starts[index + 1]].trim().to_string();
        if req.attributes.insert(key.clone(), value).is_some() {
            return Err(ParseError::DuplicateAttribute {
                line,
                id: req.id.to_string(),
                attribute: key.to_string(),
            });
        }
    }
    Ok(())
}

/// Parses the `Parents` attribute, which must be a list of IDs separated only
/// by punctuation and whitespace.
fn parse_parents(req: &Requirement, line: usize) -> Result<Vec<ReqId>, ParseError> {
    let Some(parents) = req.attributes.get(PARENTS) else {
        return Ok(Vec::new());
    };

    let unparseable = |text: &str| ParseError::Parents {
        line,
        id: req.id.to_string(),
        text: text.to_string(),
        parents: parents.to_string(),
    };

    let mut ids = Vec::new();
    let mut previous_end = 0;
    for found in REQ_ID_PATTERN.find_iter(parents) {
        let separator = &parents[previous_end..found.start()];
        if !separator.chars().all(is_punct_or_space) {
            return Err(unparseable(separator));
        }
        let id = found
            .as_str()
            .parse()
            .map_err(|source| ParseError::Id { line, source })?;
        ids.push(id);
        previous_end = found.end();
    }

    let trailing = &parents[previous_end..];
    if !trailing.chars().all(is_punct_or_space) {
        return Err(unparseable(trailing));
    }

    Ok(ids)
}

/// Finds the requirement ID a requirement's text must start with.
///
/// Returns the ID and the byte offset just past it.
fn extract_id(text: &str, line: usize) -> Result<(ReqId, usize), ParseError> {
    let head = || text.chars().take(40).collect::<String>();

    let Some(found) = REQ_ID_PATTERN.find(text) else {
        if BAD_REQ_ID.is_match(text) {
            return Err(ParseError::MalformedId { line, text: head() });
        }
        return Err(ParseError::MissingId { line, text: head() });
    };

    if found.start() > 0 {
        return Err(ParseError::IdNotAtStart { line, text: head() });
    }

    let id = found
        .as_str()
        .parse()
        .map_err(|source| ParseError::Id { line, source })?;
    Ok((id, found.end()))
}

fn parse_requirement_table(
    text: &str,
    line: usize,
    document: &DocumentKey,
    requirements: &mut Vec<Requirement>,
) -> Result<(), ParseError> {
    let mut rows = text.split('\n').enumerate();
    let Some((_, header)) = rows.next() else {
        return Ok(());
    };
    let columns: Vec<AttributeKey> = split_table_line(header)
        .into_iter()
        .map(AttributeKey::new)
        .collect();

    for (index, row) in rows {
        let row_line = line + index;
        if TABLE_DELIMITER.is_match(row) {
            continue;
        }

        let cells = split_table_line(row);
        if cells.is_empty() {
            break;
        }
        if cells.len() < columns.len() {
            return Err(ParseError::TooFewCells {
                line: row_line,
                table: "requirement",
            });
        }

        let mut req: Option<Requirement> = None;
        let mut title = "";
        let mut body = "";
        let mut attributes = Vec::new();
        for (column, &cell) in columns.iter().zip(&cells) {
            match column.as_str() {
                "ID" => {
                    let (id, _) = extract_id(cell, row_line)?;
                    req = Some(Requirement::new(id, document.clone(), row_line));
                }
                "TITLE" => title = cell,
                "BODY" => body = cell,
                _ if !cell.is_empty() => attributes.push((column.clone(), cell.to_string())),
                _ => {}
            }
        }

        let Some(mut req) = req else {
            return Err(ParseError::MissingId {
                line: row_line,
                text: row.chars().take(40).collect(),
            });
        };
        req.title = title.to_string();
        req.body = body.to_string();
        req.attributes = attributes.into_iter().collect();
        req.parent_ids = parse_parents(&req, row_line)?;
        requirements.push(req);
    }
    Ok(())
}

fn parse_flow_table(
    text: &str,
    line: usize,
    kind: FlowKind,
    document: &DocumentKey,
    flow_tags: &mut Vec<FlowTag>,
) -> Result<(), ParseError> {
    let tag_pattern = match kind {
        FlowKind::Control => &*CF_TAG,
        FlowKind::Data => &*DF_TAG,
    };
    let table = kind.describe();

    let mut rows = text.split('\n').enumerate();
    let Some((_, header)) = rows.next() else {
        return Ok(());
    };
    let columns: Vec<String> = split_table_line(header)
        .into_iter()
        .map(str::to_uppercase)
        .collect();

    for (index, row) in rows {
        let row_line = line + index;
        if TABLE_DELIMITER.is_match(row) {
            continue;
        }

        let cells = split_table_line(row);
        if cells.is_empty() {
            break;
        }
        if cells.len() < columns.len() {
            return Err(ParseError::TooFewCells {
                line: row_line,
                table,
            });
        }

        let invalid_tag = |tag: &str| ParseError::InvalidFlowTag {
            line: row_line,
            tag: tag.to_string(),
            table,
        };

        let mut id: Option<FlowId> = None;
        let mut deleted = false;
        let (mut caller, mut callee, mut description, mut direction) = ("", "", "", "");
        for (column, &cell) in columns.iter().zip(&cells) {
            match column.as_str() {
                "FLOW TAG" => {
                    if !tag_pattern.is_match(cell) {
                        return Err(invalid_tag(cell));
                    }
                    let stripped = cell.strip_suffix(DELETED_SUFFIX);
                    deleted = stripped.is_some();
                    id = Some(
                        stripped
                            .unwrap_or(cell)
                            .parse()
                            .map_err(|_| invalid_tag(cell))?,
                    );
                }
                "CALLER" => caller = cell,
                "CALLEE" => callee = cell,
                "DESCRIPTION" => description = cell,
                "DIRECTION" => direction = cell,
                _ => {}
            }
        }

        let Some(id) = id else {
            return Err(invalid_tag(""));
        };
        flow_tags.push(FlowTag {
            id,
            caller: caller.to_string(),
            callee: callee.to_string(),
            description: description.to_string(),
            direction: direction.to_string(),
            reqs: Vec::new(),
            position: row_line,
            document: document.clone(),
            deleted,
        });
    }
    Ok(())
}

/// Splits a pipe table row into trimmed cells.
///
/// Returns nothing for lines that are not table rows. Escaped pipes are not
/// supported.
fn split_table_line(line: &str) -> Vec<&str> {
    let Some(inner) = line.strip_prefix('|') else {
        return Vec::new();
    };
    let mut parts: Vec<&str> = inner.split('|').collect();
    if parts.last() == Some(&"") {
        parts.pop();
    }
    parts.into_iter().map(str::trim).collect()
}

fn is_punct_or_space(c: char) -> bool {
    c.is_whitespace() || c.is_ascii_punctuation()
}
