use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{
    domain::{
        AttributeKey, CodeFile, CodeKind, DocumentKey, Severity, Variant,
        attributes::PARENTS,
    },
    storage::FileQuery,
};

/// Configuration for a traceability run.
///
/// Lists the repositories taking part, the certification documents in each,
/// their requirement schemas and link rules, and the source files that
/// implement and test them.
///
/// The configuration file is TOML and carries a `_version` field so the
/// format can evolve without breaking existing files. File queries are
/// expanded when the file is loaded, so a loaded [`Config`] records concrete
/// file lists and can be exported alongside a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Repositories in processing order.
    #[serde(default)]
    pub repos: Vec<RepoConfig>,

    /// Severity of the SHALL statement lints.
    #[serde(default = "default_shall_severity")]
    pub shall_severity: Severity,

    /// When parent/child back-references are populated after resolution.
    #[serde(default)]
    pub back_references: BackReferences,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            repos: Vec::new(),
            shall_severity: default_shall_severity(),
            back_references: BackReferences::default(),
        }
    }
}

/// Policy for populating `parents`/`children` after resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackReferences {
    /// Always populate, skipping parent IDs that do not resolve.
    #[default]
    Always,
    /// Only populate when resolution reported no issues at all.
    WhenClean,
}

/// The documents of one repository.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoConfig {
    /// Repository name, unique within a configuration.
    pub name: String,
    /// Directory the repository is checked out in.
    pub root: PathBuf,
    /// Certification documents in processing order.
    pub documents: Vec<Document>,
}

/// A certification document and the rules its requirements follow.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Path relative to the repository root.
    pub path: String,
    /// The project abbreviation every ID in the document must carry.
    pub prefix: String,
    /// The level every ID in the document must carry.
    pub level: String,
    /// Attribute and ID schema.
    pub schema: Schema,
    /// Allowed parent links, in priority order.
    #[serde(default)]
    pub link_rules: Vec<LinkRule>,
    /// The code implementing and testing the document.
    #[serde(default)]
    pub implementation: Implementation,
}

/// The shape requirements in a document must have.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    /// Pattern every requirement ID in the document must match.
    #[serde(
        serialize_with = "regex_as_string",
        deserialize_with = "regex_from_string"
    )]
    pub requirements: Regex,
    /// Attribute rules for requirements.
    #[serde(default)]
    pub attributes: BTreeMap<AttributeKey, AttributeRule>,
    /// Attribute rules for assumptions.
    #[serde(default)]
    pub asm_attributes: BTreeMap<AttributeKey, AttributeRule>,
}

/// Whether an attribute must be present.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Presence {
    /// The attribute must be present and non-empty.
    #[default]
    #[serde(rename = "true", alias = "")]
    Required,
    /// The attribute may be omitted.
    #[serde(rename = "false")]
    Optional,
    /// At least one of the attributes marked `any` must be present.
    #[serde(rename = "any")]
    Any,
}

/// A rule for a single attribute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeRule {
    /// Whether the attribute must be present.
    pub presence: Presence,
    /// Pattern a present value must match.
    #[serde(
        serialize_with = "regex_as_string",
        deserialize_with = "regex_from_string"
    )]
    pub value: Regex,
}

impl AttributeRule {
    /// Creates a rule. The value pattern defaults to `.*`.
    ///
    /// # Errors
    ///
    /// Returns an error if the value pattern is not a valid regular expression.
    pub fn new(presence: Presence, value: Option<&str>) -> Result<Self, ConfigError> {
        Ok(Self {
            presence,
            value: compile(value.unwrap_or(".*"))?,
        })
    }
}

/// One allowed shape of a child → parent link.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkRule {
    /// Which children the rule applies to.
    pub child: LinkEnd,
    /// Which parents the rule allows.
    pub parent: LinkEnd,
}

/// One end of a [`LinkRule`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkEnd {
    /// Pattern the requirement ID must match.
    #[serde(
        serialize_with = "regex_as_string",
        deserialize_with = "regex_from_string"
    )]
    pub id: Regex,
    /// An attribute the requirement must carry, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<AttributeMatch>,
}

/// An attribute name with a pattern its value must match.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttributeMatch {
    /// The attribute name.
    pub key: AttributeKey,
    /// Pattern the value must match.
    #[serde(
        serialize_with = "regex_as_string",
        deserialize_with = "regex_from_string"
    )]
    pub value: Regex,
}

/// The source files associated with a document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Implementation {
    /// Implementation files, relative to the repository root.
    #[serde(default)]
    pub code_files: Vec<String>,
    /// Test files, relative to the repository root.
    #[serde(default)]
    pub test_files: Vec<String>,
    /// Name of the code tagger used for these files.
    #[serde(default = "default_code_parser")]
    pub code_parser: String,
    /// Compilation database handed to the code tagger.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compilation_database: Option<String>,
    /// Extra compiler arguments handed to the code tagger.
    #[serde(default)]
    pub compiler_arguments: Vec<String>,
}

impl Default for Implementation {
    fn default() -> Self {
        Self {
            code_files: Vec::new(),
            test_files: Vec::new(),
            code_parser: default_code_parser(),
            compilation_database: None,
            compiler_arguments: Vec::new(),
        }
    }
}

impl Implementation {
    /// Implementation files followed by test files.
    #[must_use]
    pub fn files(&self, repo_name: &str) -> Vec<CodeFile> {
        let code = self
            .code_files
            .iter()
            .map(|path| CodeFile::new(repo_name, path.as_str(), CodeKind::Implementation));
        let tests = self
            .test_files
            .iter()
            .map(|path| CodeFile::new(repo_name, path.as_str(), CodeKind::Test));
        code.chain(tests).collect()
    }
}

impl Document {
    /// Creates a document with the implicit schema for its prefix and level
    /// and no link rules.
    ///
    /// # Errors
    ///
    /// Returns an error if the prefix or level produce an invalid pattern.
    pub fn new(
        path: impl Into<String>,
        prefix: impl Into<String>,
        level: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let prefix = prefix.into();
        let level = level.into();
        let requirements = compile(&format!("(REQ|ASM)-{}-(\\d+)", id_stem(&prefix, &level)))?;

        let mut asm_attributes = BTreeMap::new();
        asm_attributes.insert(
            AttributeKey::new(PARENTS),
            AttributeRule {
                presence: Presence::Required,
                value: compile(&format!("REQ-{}-(\\d+)", id_stem(&prefix, &level)))?,
            },
        );

        Ok(Self {
            path: path.into(),
            prefix,
            level,
            schema: Schema {
                requirements,
                attributes: BTreeMap::new(),
                asm_attributes,
            },
            link_rules: Vec::new(),
            implementation: Implementation::default(),
        })
    }

    /// Whether any implementation files are configured.
    #[must_use]
    pub fn has_implementation(&self) -> bool {
        !self.implementation.code_files.is_empty()
    }

    /// The attribute rules for a requirement variant.
    #[must_use]
    pub const fn attribute_rules(&self, variant: Variant) -> &BTreeMap<AttributeKey, AttributeRule> {
        match variant {
            Variant::Requirement => &self.schema.attributes,
            Variant::Assumption => &self.schema.asm_attributes,
        }
    }

    /// Adds a link rule allowing parents with the given prefix and level.
    ///
    /// The first rule added that matches a link decides whether it is valid.
    ///
    /// # Errors
    ///
    /// Returns an error if a pattern is not a valid regular expression.
    pub fn add_parent_link(
        &mut self,
        prefix: &str,
        level: &str,
        child_attribute: Option<(&str, &str)>,
        parent_attribute: Option<(&str, &str)>,
    ) -> Result<(), ConfigError> {
        let child = LinkEnd {
            id: compile(&format!("REQ-{}-(\\d+)", id_stem(&self.prefix, &self.level)))?,
            attribute: child_attribute.map(attribute_match).transpose()?,
        };
        let parent = LinkEnd {
            id: compile(&format!("REQ-{}-(\\d+)", id_stem(prefix, level)))?,
            attribute: parent_attribute.map(attribute_match).transpose()?,
        };
        self.link_rules.push(LinkRule { child, parent });

        self.schema
            .attributes
            .entry(AttributeKey::new(PARENTS))
            .or_insert(AttributeRule {
                presence: Presence::Any,
                value: compile(".*")?,
            });
        Ok(())
    }
}

fn id_stem(prefix: &str, level: &str) -> String {
    format!("{}-{}", regex::escape(prefix), regex::escape(level))
}

fn attribute_match((key, value): (&str, &str)) -> Result<AttributeMatch, ConfigError> {
    Ok(AttributeMatch {
        key: AttributeKey::new(key),
        value: compile(value)?,
    })
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    Regex::new(pattern).map_err(|source| ConfigError::Regex {
        pattern: pattern.to_string(),
        source,
    })
}

impl Config {
    /// Loads the configuration from a TOML file at the given path.
    ///
    /// Repository roots are resolved relative to the directory containing the
    /// file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not a valid
    /// configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml(&content, base)
    }

    /// Parses a TOML configuration, resolving repository roots against `base`.
    ///
    /// # Errors
    ///
    /// Returns an error if the content is not a valid configuration.
    pub fn from_toml(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let versions: Versions = toml::from_str(content)?;
        versions.resolve(base)
    }

    /// Looks up a repository by name.
    #[must_use]
    pub fn repo(&self, name: &str) -> Option<&RepoConfig> {
        self.repos.iter().find(|repo| repo.name == name)
    }

    /// Looks up a document.
    #[must_use]
    pub fn document(&self, key: &DocumentKey) -> Option<&Document> {
        self.repo(&key.repo_name)?
            .documents
            .iter()
            .find(|document| document.path == key.path)
    }

    /// Every document with the repository it belongs to, in processing order.
    pub fn documents(&self) -> impl Iterator<Item = (&RepoConfig, &Document)> {
        self.repos
            .iter()
            .flat_map(|repo| repo.documents.iter().map(move |document| (repo, document)))
    }

    /// Adds the repositories of another configuration.
    ///
    /// A repository that is already present is replaced.
    pub fn merge(&mut self, other: Self) {
        for repo in other.repos {
            if let Some(existing) = self.repos.iter_mut().find(|r| r.name == repo.name) {
                *existing = repo;
            } else {
                self.repos.push(repo);
            }
        }
    }
}

const fn default_shall_severity() -> Severity {
    Severity::Note
}

fn default_code_parser() -> String {
    "ctags".to_string()
}

/// Serialize a regular expression as its pattern.
///
/// # Errors
///
/// Returns an error if serialization fails.
pub fn regex_as_string<S>(regex: &Regex, serializer: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    serializer.serialize_str(regex.as_str())
}

/// Deserialize a regular expression from its pattern.
///
/// # Errors
///
/// Returns an error if the pattern is not a valid regular expression.
pub fn regex_from_string<'de, D>(deserializer: D) -> Result<Regex, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    Regex::new(&s).map_err(serde::de::Error::custom)
}

/// Errors that can occur when loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file {}", .path.display())]
    Read {
        /// The configuration file.
        path: PathBuf,
        /// The underlying error.
        source: io::Error,
    },

    /// The configuration is not valid TOML or does not match the schema.
    #[error("failed to parse config file")]
    Toml(#[from] toml::de::Error),

    /// A pattern is not a valid regular expression.
    #[error("invalid regular expression `{pattern}`")]
    Regex {
        /// The offending pattern.
        pattern: String,
        /// The underlying error.
        source: regex::Error,
    },

    /// A document declares the implicit `Parents` attribute.
    #[error(
        "invalid attribute Parents in document `{document}`: parents are implied by the parent links"
    )]
    ExplicitParents {
        /// The document path.
        document: String,
    },

    /// A document redefines one of the common attributes.
    #[error(
        "document `{document}` redefines attribute `{attribute}`, but it is listed as a common attribute"
    )]
    RedefinedAttribute {
        /// The document path.
        document: String,
        /// The attribute name.
        attribute: String,
    },

    /// Two repositories share a name.
    #[error("repository `{0}` is configured more than once")]
    DuplicateRepo(String),
}

/// The serialized versions of the configuration.
/// This allows for future changes to the configuration format and to the domain
/// type without breaking compatibility.
#[derive(Debug, Deserialize)]
#[serde(tag = "_version")]
enum Versions {
    #[serde(rename = "1")]
    V1 {
        #[serde(default = "default_shall_severity")]
        shall_severity: Severity,

        #[serde(default)]
        back_references: BackReferences,

        /// Attributes added to the requirement schema of every document.
        #[serde(default)]
        common_attributes: BTreeMap<String, RawAttribute>,

        #[serde(default)]
        repos: Vec<RawRepo>,
    },
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAttribute {
    #[serde(default)]
    required: Presence,
    #[serde(default)]
    value: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRepo {
    name: String,
    #[serde(default = "default_root")]
    root: PathBuf,
    #[serde(default)]
    documents: Vec<RawDocument>,
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawDocument {
    path: String,
    prefix: String,
    level: String,
    #[serde(default)]
    attributes: BTreeMap<String, RawAttribute>,
    #[serde(default)]
    asm_attributes: BTreeMap<String, RawAttribute>,
    #[serde(default)]
    parents: Vec<RawParentLink>,
    #[serde(default)]
    implementation: RawImplementation,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawParentLink {
    prefix: String,
    level: String,
    #[serde(default)]
    child_attribute: Option<RawAttributeMatch>,
    #[serde(default)]
    parent_attribute: Option<RawAttributeMatch>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawAttributeMatch {
    name: String,
    #[serde(default)]
    value: Option<String>,
}

impl RawAttributeMatch {
    fn as_pair(&self) -> (&str, &str) {
        (&self.name, self.value.as_deref().unwrap_or(".*"))
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawImplementation {
    #[serde(default)]
    code: RawFileQuery,
    #[serde(default)]
    tests: RawFileQuery,
    #[serde(default)]
    code_parser: Option<String>,
    #[serde(default)]
    compilation_database: Option<String>,
    #[serde(default)]
    compiler_arguments: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawFileQuery {
    #[serde(default)]
    paths: Vec<String>,
    #[serde(default)]
    matching_pattern: Option<String>,
    #[serde(default)]
    ignored_patterns: Vec<String>,
}

impl RawFileQuery {
    fn compile(&self) -> Result<FileQuery, ConfigError> {
        Ok(FileQuery {
            paths: self.paths.clone(),
            matching_pattern: self
                .matching_pattern
                .as_deref()
                .filter(|pattern| !pattern.is_empty())
                .map(compile)
                .transpose()?,
            ignored_patterns: self
                .ignored_patterns
                .iter()
                .map(|pattern| compile(pattern))
                .collect::<Result<_, _>>()?,
        })
    }
}

fn attribute_rules(
    document: &str,
    raw: &BTreeMap<String, RawAttribute>,
) -> Result<BTreeMap<AttributeKey, AttributeRule>, ConfigError> {
    raw.iter()
        .map(|(name, attribute)| {
            let key = AttributeKey::new(name);
            if key.as_str() == PARENTS {
                return Err(ConfigError::ExplicitParents {
                    document: document.to_string(),
                });
            }
            let rule = AttributeRule::new(attribute.required, attribute.value.as_deref())?;
            Ok((key, rule))
        })
        .collect()
}

impl RawDocument {
    fn resolve(
        self,
        root: &Path,
        common: &BTreeMap<AttributeKey, AttributeRule>,
    ) -> Result<Document, ConfigError> {
        let mut document = Document::new(self.path, self.prefix, self.level)?;

        document.schema.attributes = attribute_rules(&document.path, &self.attributes)?;
        for (key, rule) in common {
            if document.schema.attributes.contains_key(key) {
                return Err(ConfigError::RedefinedAttribute {
                    document: document.path,
                    attribute: key.to_string(),
                });
            }
            document.schema.attributes.insert(key.clone(), rule.clone());
        }

        for link in &self.parents {
            document.add_parent_link(
                &link.prefix,
                &link.level,
                link.child_attribute.as_ref().map(RawAttributeMatch::as_pair),
                link.parent_attribute.as_ref().map(RawAttributeMatch::as_pair),
            )?;
        }

        let asm_attributes = attribute_rules(&document.path, &self.asm_attributes)?;
        document.schema.asm_attributes.extend(asm_attributes);

        let implementation = self.implementation;
        document.implementation = Implementation {
            code_files: implementation.code.compile()?.find(root),
            test_files: implementation.tests.compile()?.find(root),
            code_parser: implementation
                .code_parser
                .filter(|parser| !parser.is_empty())
                .unwrap_or_else(default_code_parser),
            compilation_database: implementation.compilation_database,
            compiler_arguments: implementation.compiler_arguments,
        };

        tracing::debug!(
            "Document {} has {} code files and {} test files",
            document.path,
            document.implementation.code_files.len(),
            document.implementation.test_files.len()
        );

        Ok(document)
    }
}

impl Versions {
    fn resolve(self, base: &Path) -> Result<Config, ConfigError> {
        match self {
            Self::V1 {
                shall_severity,
                back_references,
                common_attributes,
                repos: raw_repos,
            } => {
                let common = attribute_rules("common attributes", &common_attributes)?;

                let mut repos: Vec<RepoConfig> = Vec::with_capacity(raw_repos.len());
                for raw in raw_repos {
                    if repos.iter().any(|repo| repo.name == raw.name) {
                        return Err(ConfigError::DuplicateRepo(raw.name));
                    }
                    let root = base.join(&raw.root);
                    let documents = raw
                        .documents
                        .into_iter()
                        .map(|document| document.resolve(&root, &common))
                        .collect::<Result<_, _>>()?;
                    repos.push(RepoConfig {
                        name: raw.name,
                        root,
                        documents,
                    });
                }

                Ok(Config {
                    repos,
                    shall_severity,
                    back_references,
                })
            }
        }
    }
}
