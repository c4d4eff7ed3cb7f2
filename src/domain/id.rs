use std::{fmt, str::FromStr, sync::LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Matches requirement IDs anywhere in a text.
///
/// Capture groups: variant, project, level, number.
pub(crate) static REQ_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(REQ|ASM)-([0-9A-Za-z_]+)-([0-9A-Za-z_]+)-([0-9]+)")
        .expect("requirement ID regex is valid")
});

/// Whether an identifier names a requirement or an assumption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Variant {
    /// A `REQ-` identifier.
    Requirement,
    /// An `ASM-` identifier.
    Assumption,
}

impl Variant {
    /// The identifier prefix for this variant.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Requirement => "REQ",
            Self::Assumption => "ASM",
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// A requirement identifier.
///
/// Format: `{VARIANT}-{PROJECT}-{LEVEL}-{NUMBER}`, where:
/// - `VARIANT` is `REQ` or `ASM`
/// - `PROJECT` and `LEVEL` are non-empty runs of ASCII letters, digits or `_`
/// - `NUMBER` is a run of ASCII digits
///
/// The digits are kept exactly as written, so `REQ-A-B-03` and `REQ-A-B-3` are
/// different identifiers. Whether the number is acceptable (non-zero, no
/// leading zero, in sequence) is a validation concern, not a parsing one.
///
/// Examples: `REQ-TEST-SYS-5`, `ASM-NAM1-SWL-12`
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ReqId {
    variant: Variant,
    project: String,
    level: String,
    number: u64,
    digits: String,
}

impl ReqId {
    /// Returns the variant component.
    #[must_use]
    pub const fn variant(&self) -> Variant {
        self.variant
    }

    /// Returns the project abbreviation component.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Returns the level component.
    #[must_use]
    pub fn level(&self) -> &str {
        &self.level
    }

    /// Returns the numeric value of the sequence number.
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// Returns the sequence number exactly as written.
    #[must_use]
    pub fn digits(&self) -> &str {
        &self.digits
    }

    /// Whether the sequence number was written with a leading zero.
    #[must_use]
    pub fn has_leading_zero(&self) -> bool {
        self.digits.starts_with('0')
    }
}

impl fmt::Display for ReqId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}-{}-{}-{}",
            self.variant, self.project, self.level, self.digits
        )
    }
}

/// The kind of a flow tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FlowKind {
    /// A `CF-` control flow tag.
    Control,
    /// A `DF-` data flow tag.
    Data,
}

impl FlowKind {
    /// The identifier prefix for this kind.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Control => "CF",
            Self::Data => "DF",
        }
    }

    /// A human readable name, as used in diagnostics.
    #[must_use]
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Control => "control flow",
            Self::Data => "data flow",
        }
    }
}

/// A data or control flow tag identifier, `{CF|DF}-{PROJECT}-{NUMBER}`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FlowId {
    kind: FlowKind,
    project: String,
    number: u64,
    digits: String,
}

impl FlowId {
    /// Returns the kind of flow this tag describes.
    #[must_use]
    pub const fn kind(&self) -> FlowKind {
        self.kind
    }

    /// Returns the project abbreviation component.
    #[must_use]
    pub fn project(&self) -> &str {
        &self.project
    }

    /// Returns the numeric value of the sequence number.
    #[must_use]
    pub const fn number(&self) -> u64 {
        self.number
    }

    /// The grouping prefix shared by every tag of a sequence, e.g. `DF-NAM1`.
    #[must_use]
    pub fn family(&self) -> String {
        format!("{}-{}", self.kind.prefix(), self.project)
    }
}

impl fmt::Display for FlowId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}-{}-{}", self.kind.prefix(), self.project, self.digits)
    }
}

/// Errors that can occur when parsing identifiers.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum Error {
    /// The string does not have the shape of an identifier.
    #[error("Invalid identifier format: {0}")]
    Syntax(String),

    /// The sequence number does not fit in 64 bits.
    #[error("Invalid sequence number in '{0}': out of range")]
    Overflow(String),
}

fn is_word(segment: &str) -> bool {
    !segment.is_empty()
        && segment
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

fn parse_number(s: &str, digits: &str) -> Result<u64, Error> {
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::Syntax(s.to_string()));
    }
    digits.parse().map_err(|_| Error::Overflow(s.to_string()))
}

impl FromStr for ReqId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        let [variant, project, level, digits] = parts.as_slice() else {
            return Err(Error::Syntax(s.to_string()));
        };

        let variant = match *variant {
            "REQ" => Variant::Requirement,
            "ASM" => Variant::Assumption,
            _ => return Err(Error::Syntax(s.to_string())),
        };

        if !is_word(project) || !is_word(level) {
            return Err(Error::Syntax(s.to_string()));
        }

        let number = parse_number(s, digits)?;

        Ok(Self {
            variant,
            project: (*project).to_string(),
            level: (*level).to_string(),
            number,
            digits: (*digits).to_string(),
        })
    }
}

impl TryFrom<String> for ReqId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ReqId> for String {
    fn from(id: ReqId) -> Self {
        id.to_string()
    }
}

impl FromStr for FlowId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('-').collect();
        let [kind, project, digits] = parts.as_slice() else {
            return Err(Error::Syntax(s.to_string()));
        };

        let kind = match *kind {
            "CF" => FlowKind::Control,
            "DF" => FlowKind::Data,
            _ => return Err(Error::Syntax(s.to_string())),
        };

        if !is_word(project) {
            return Err(Error::Syntax(s.to_string()));
        }

        let number = parse_number(s, digits)?;

        Ok(Self {
            kind,
            project: (*project).to_string(),
            number,
            digits: (*digits).to_string(),
        })
    }
}

impl TryFrom<String> for FlowId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<FlowId> for String {
    fn from(id: FlowId) -> Self {
        id.to_string()
    }
}
