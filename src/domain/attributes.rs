use std::{borrow::Borrow, collections::BTreeMap, fmt, ops::Deref};

use serde::{Deserialize, Serialize};

/// The attribute holding a requirement's declared parents.
pub const PARENTS: &str = "PARENTS";
/// The attribute holding a requirement's rationale.
pub const RATIONALE: &str = "RATIONALE";
/// The attribute listing the flow tags a requirement covers.
pub const FLOW: &str = "FLOW";

/// A normalized attribute name.
///
/// Attribute names are case-insensitive. They are stored upper-cased, and the
/// singular `Parent` is folded into [`PARENTS`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AttributeKey(String);

impl AttributeKey {
    /// Normalizes an attribute name.
    #[must_use]
    pub fn new(name: &str) -> Self {
        let upper = name.trim().to_uppercase();
        if upper == "PARENT" {
            Self(PARENTS.to_string())
        } else {
            Self(upper)
        }
    }

    /// Returns the normalized name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for AttributeKey {
    fn from(value: String) -> Self {
        Self::new(&value)
    }
}

impl From<&str> for AttributeKey {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<AttributeKey> for String {
    fn from(key: AttributeKey) -> Self {
        key.0
    }
}

impl Deref for AttributeKey {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Borrow<str> for AttributeKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AttributeKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The attributes of a requirement, keyed by normalized name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Attributes(BTreeMap<AttributeKey, String>);

impl Attributes {
    /// Creates an empty attribute map.
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Looks up an attribute, normalizing the name first.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(AttributeKey::new(name).as_str()).map(String::as_str)
    }

    /// Whether an attribute with this name is present.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Inserts an attribute, returning the previous value if the normalized
    /// name was already present.
    pub fn insert(&mut self, name: impl Into<AttributeKey>, value: String) -> Option<String> {
        self.0.insert(name.into(), value)
    }

    /// Iterates over attributes in name order.
    pub fn iter(&self) -> impl Iterator<Item = (&AttributeKey, &str)> {
        self.0.iter().map(|(k, v)| (k, v.as_str()))
    }

    /// Number of attributes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether there are no attributes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<AttributeKey>> FromIterator<(K, String)> for Attributes {
    fn from_iter<I: IntoIterator<Item = (K, String)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}
