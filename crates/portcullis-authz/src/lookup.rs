//! Attribute sources and the alias table.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

/// Read-only view of the attributes a request is judged on.
pub trait AttributeLookup {
    /// All values of an attribute; `None` when the attribute is absent.
    fn values(&self, name: &str) -> Option<&[String]>;

    /// The authenticated principal, if any.
    fn user(&self) -> Option<&str> {
        None
    }

    /// Names of all present attributes.
    fn names(&self) -> Vec<&str>;

    /// First value of an attribute.
    fn first_value(&self, name: &str) -> Option<&str> {
        self.values(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }
}

impl AttributeLookup for BTreeMap<String, Vec<String>> {
    fn values(&self, name: &str) -> Option<&[String]> {
        self.get(name).map(Vec::as_slice)
    }

    fn names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

impl AttributeLookup for HashMap<String, Vec<String>> {
    fn values(&self, name: &str) -> Option<&[String]> {
        self.get(name).map(Vec::as_slice)
    }

    fn names(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

/// Attributes of one request: the session's attributes plus whatever the
/// caller derived from the request itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestContext {
    user: Option<String>,
    attributes: BTreeMap<String, Vec<String>>,
}

impl RequestContext {
    /// Create an empty context.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the principal.
    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    /// Set all values of an attribute.
    pub fn with_values<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.insert(name, values.into_iter().map(Into::into).collect());
        self
    }

    /// Set all values of an attribute, replacing earlier ones.
    pub fn insert(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.attributes.insert(name.into(), values);
    }

    /// Add attributes, keeping values already present for a name.
    pub fn extend<I>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        for (name, values) in attributes {
            self.attributes.entry(name).or_default().extend(values);
        }
    }
}

impl AttributeLookup for RequestContext {
    fn values(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    fn names(&self) -> Vec<&str> {
        self.attributes.keys().map(String::as_str).collect()
    }
}

/// Alternative name for a stored attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alias {
    /// Name the attribute is known by for matching and export.
    pub name: String,

    /// Whether the exported variable gets the environment prefix.
    #[serde(default = "default_prefixed")]
    pub prefixed: bool,
}

fn default_prefixed() -> bool {
    true
}

/// Renames attributes for matching and export without renaming them in
/// storage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    aliases: HashMap<String, Alias>,
}

impl AliasTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `stored` to `alias`.
    pub fn insert(&mut self, stored: impl Into<String>, alias: Alias) {
        self.aliases.insert(stored.into(), alias);
    }

    /// Builder form of [`insert`](Self::insert) with a prefixed alias.
    pub fn with_alias(mut self, stored: impl Into<String>, alias: impl Into<String>) -> Self {
        self.insert(
            stored,
            Alias {
                name: alias.into(),
                prefixed: true,
            },
        );
        self
    }

    /// The alias entry for a stored name.
    pub fn get(&self, stored: &str) -> Option<&Alias> {
        self.aliases.get(stored)
    }

    /// Name a stored attribute is known by; itself when unmapped.
    pub fn mapped_name<'a>(&'a self, stored: &'a str) -> &'a str {
        self.aliases
            .get(stored)
            .map(|a| a.name.as_str())
            .unwrap_or(stored)
    }

    /// Number of aliases.
    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

impl FromIterator<(String, Alias)> for AliasTable {
    fn from_iter<T: IntoIterator<Item = (String, Alias)>>(iter: T) -> Self {
        Self {
            aliases: iter.into_iter().collect(),
        }
    }
}
