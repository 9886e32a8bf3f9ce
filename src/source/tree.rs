use crate::error::SourceError;
use std::collections::BTreeMap;
use std::fmt;

/// Separator between segments of a [`SectionPath`].
pub const PATH_SEPARATOR: char = ':';

/// Separator used by environment-style keys (`AUTH__JWT__KEY`).
pub const ENV_SEPARATOR: &str = "__";

/// A raw configuration value: a scalar or a nested section.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
    /// String scalar. Values loaded from the environment are always strings.
    String(String),
    /// Integer scalar.
    Integer(i64),
    /// Floating point scalar.
    Float(f64),
    /// Boolean scalar.
    Bool(bool),
    /// Nested section of named values.
    Section(BTreeMap<String, ConfigValue>),
}

impl ConfigValue {
    /// Creates an empty section.
    pub fn section() -> Self {
        Self::Section(BTreeMap::new())
    }

    /// Returns the entries if this value is a section.
    pub fn as_section(&self) -> Option<&BTreeMap<String, ConfigValue>> {
        match self {
            Self::Section(entries) => Some(entries),
            _ => None,
        }
    }

    /// Short human-readable description, used in error messages.
    pub fn describe(&self) -> String {
        match self {
            Self::String(s) => format!("string {s:?}"),
            Self::Integer(i) => format!("integer {i}"),
            Self::Float(f) => format!("float {f}"),
            Self::Bool(b) => format!("boolean {b}"),
            Self::Section(_) => "section".to_owned(),
        }
    }

    /// Converts a JSON document into a configuration value.
    ///
    /// Arrays become sections keyed by element index and `null` members are dropped.
    /// Returns `None` for a bare `null`.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        use serde_json::Value;

        Some(match value {
            Value::Null => return None,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => match n.as_f64() {
                    Some(f) => Self::Float(f),
                    None => Self::String(n.to_string()),
                },
            },
            Value::String(s) => Self::String(s.clone()),
            Value::Array(items) => Self::Section(
                items
                    .iter()
                    .enumerate()
                    .filter_map(|(i, v)| Self::from_json(v).map(|v| (i.to_string(), v)))
                    .collect(),
            ),
            Value::Object(members) => Self::Section(
                members
                    .iter()
                    .filter_map(|(k, v)| Self::from_json(v).map(|v| (k.clone(), v)))
                    .collect(),
            ),
        })
    }
}

impl From<&str> for ConfigValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_owned())
    }
}

impl From<String> for ConfigValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for ConfigValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for ConfigValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for ConfigValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

/// Address of a subtree inside a [`ConfigTree`], e.g. `"Auth:Jwt"`.
///
/// Segments are matched relaxed: case-insensitive, ignoring `_` and `-`.
/// The empty path addresses the root of the tree.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct SectionPath {
    segments: Vec<String>,
}

impl SectionPath {
    /// Parses a `:`-separated path. Empty segments are ignored.
    pub fn new(path: &str) -> Self {
        Self {
            segments: path
                .split(PATH_SEPARATOR)
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
                .collect(),
        }
    }

    /// The root path.
    pub fn root() -> Self {
        Self::default()
    }

    /// Returns `true` if this path addresses the root of the tree.
    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    /// Returns the path segments.
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// Returns a new path with `segment` appended.
    #[must_use]
    pub fn child(&self, segment: &str) -> Self {
        let mut segments = self.segments.clone();
        segments.push(segment.to_owned());
        Self { segments }
    }
}

impl From<&str> for SectionPath {
    fn from(path: &str) -> Self {
        Self::new(path)
    }
}

impl From<String> for SectionPath {
    fn from(path: String) -> Self {
        Self::new(&path)
    }
}

impl fmt::Display for SectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            f.write_str(segment)?;
        }
        Ok(())
    }
}

/// Normalized form of a key used for relaxed matching.
pub(crate) fn normalize_key(key: &str) -> String {
    key.chars()
        .filter(|c| *c != '_' && *c != '-')
        .flat_map(char::to_lowercase)
        .collect()
}

pub(crate) fn keys_match(a: &str, b: &str) -> bool {
    normalize_key(a) == normalize_key(b)
}

/// Finds the entry whose key matches `key` under relaxed matching.
pub(crate) fn find_entry<'a>(
    entries: &'a BTreeMap<String, ConfigValue>,
    key: &str,
) -> Option<&'a ConfigValue> {
    entries.get(key).or_else(|| {
        entries
            .iter()
            .find(|(k, _)| keys_match(k, key))
            .map(|(_, v)| v)
    })
}

fn find_key(entries: &BTreeMap<String, ConfigValue>, key: &str) -> Option<String> {
    if entries.contains_key(key) {
        return Some(key.to_owned());
    }
    entries.keys().find(|k| keys_match(k, key)).cloned()
}

/// Raw configuration tree with a revision number.
///
/// The revision is assigned by the owning [`ConfigurationSource`](super::ConfigurationSource)
/// and increases on every change to the underlying data.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigTree {
    root: BTreeMap<String, ConfigValue>,
    revision: u64,
}

impl ConfigTree {
    /// Creates an empty tree at revision 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from a JSON document whose root is an object.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::InvalidRoot`] if the document root is not an object.
    pub fn from_json(document: &serde_json::Value) -> Result<Self, SourceError> {
        if !document.is_object() {
            return Err(SourceError::InvalidRoot);
        }
        match ConfigValue::from_json(document) {
            Some(ConfigValue::Section(root)) => Ok(Self { root, revision: 0 }),
            _ => Err(SourceError::InvalidRoot),
        }
    }

    /// Builds a tree from environment-style variables.
    ///
    /// Only variables starting with `prefix` (case-insensitive) are kept. The prefix is
    /// stripped and the remainder is split on `__` into section segments, so
    /// `APP_JWT__EXPIRYMINUTES=30` with prefix `APP_` becomes `Jwt:ExpiryMinutes = "30"`.
    pub fn from_env_vars<I, K, V>(prefix: &str, vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut tree = Self::new();
        let prefix = prefix.to_ascii_lowercase();
        for (key, value) in vars {
            let key = key.as_ref();
            if !key.to_ascii_lowercase().starts_with(&prefix) {
                continue;
            }
            let Some(rest) = key.get(prefix.len()..) else {
                continue;
            };
            let path = SectionPath {
                segments: rest
                    .split(ENV_SEPARATOR)
                    .filter(|s| !s.is_empty())
                    .map(str::to_owned)
                    .collect(),
            };
            if !path.is_root() {
                tree.set(&path, ConfigValue::String(value.into()));
            }
        }
        tree
    }

    /// Returns a copy of this tree stamped with `revision`.
    #[must_use]
    pub fn with_revision(mut self, revision: u64) -> Self {
        self.revision = revision;
        self
    }

    /// Returns the revision this tree was produced at.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Returns the top-level entries.
    pub fn entries(&self) -> &BTreeMap<String, ConfigValue> {
        &self.root
    }

    /// Looks up the value at `path`. The root path yields `None`; use [`ConfigTree::entries`].
    pub fn get(&self, path: &SectionPath) -> Option<&ConfigValue> {
        let (first, rest) = path.segments().split_first()?;
        let mut current = find_entry(&self.root, first)?;
        for segment in rest {
            current = find_entry(current.as_section()?, segment)?;
        }
        Some(current)
    }

    /// Returns the section at `path` as a value, cloning it out of the tree.
    ///
    /// The root path yields the whole tree as a section.
    pub fn section(&self, path: &SectionPath) -> Option<ConfigValue> {
        if path.is_root() {
            return Some(ConfigValue::Section(self.root.clone()));
        }
        self.get(path).cloned()
    }

    /// Sets `value` at `path`, creating intermediate sections as needed.
    ///
    /// A scalar standing where an intermediate section is required is replaced by a section.
    /// Setting the root path is a no-op unless `value` is a section, which replaces the tree.
    pub fn set(&mut self, path: &SectionPath, value: ConfigValue) {
        let Some((last, parents)) = path.segments().split_last() else {
            if let ConfigValue::Section(root) = value {
                self.root = root;
            }
            return;
        };

        let mut entries = &mut self.root;
        for segment in parents {
            let key = find_key(entries, segment).unwrap_or_else(|| segment.clone());
            let slot = entries.entry(key).or_insert_with(ConfigValue::section);
            if !matches!(slot, ConfigValue::Section(_)) {
                *slot = ConfigValue::section();
            }
            entries = match slot {
                ConfigValue::Section(inner) => inner,
                _ => return,
            };
        }

        let key = find_key(entries, last).unwrap_or_else(|| last.clone());
        entries.insert(key, value);
    }

    /// Removes the value at `path`, returning it if present.
    pub fn remove(&mut self, path: &SectionPath) -> Option<ConfigValue> {
        let (last, parents) = path.segments().split_last()?;
        let mut entries = &mut self.root;
        for segment in parents {
            let key = find_key(entries, segment)?;
            entries = match entries.get_mut(&key)? {
                ConfigValue::Section(inner) => inner,
                _ => return None,
            };
        }
        let key = find_key(entries, last)?;
        entries.remove(&key)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_section_path_parsing() {
        let path = SectionPath::new("Auth::Jwt: ");
        assert_eq!(path.segments(), ["Auth", "Jwt"]);
        assert_eq!(path.to_string(), "Auth:Jwt");
        assert!(SectionPath::new("").is_root());
        assert_eq!(path.child("Key").to_string(), "Auth:Jwt:Key");
    }

    #[test]
    fn test_relaxed_key_lookup() {
        let tree = ConfigTree::from_json(&json!({
            "Jwt": { "ExpiryMinutes": 30 }
        }))
        .unwrap();

        assert_eq!(
            tree.get(&"jwt:expiry_minutes".into()),
            Some(&ConfigValue::Integer(30))
        );
        assert_eq!(
            tree.get(&"JWT:EXPIRY-MINUTES".into()),
            Some(&ConfigValue::Integer(30))
        );
        assert!(tree.get(&"Jwt:Missing".into()).is_none());
        assert!(tree.get(&"Jwt:ExpiryMinutes:Deeper".into()).is_none());
    }

    #[test]
    fn test_from_json_rejects_non_object_root() {
        assert_eq!(
            ConfigTree::from_json(&json!([1, 2])),
            Err(SourceError::InvalidRoot)
        );
    }

    #[test]
    fn test_from_json_arrays_and_nulls() {
        let tree = ConfigTree::from_json(&json!({
            "Hosts": ["a", "b"],
            "Nothing": null,
            "Ratio": 0.5
        }))
        .unwrap();

        assert_eq!(tree.get(&"Hosts:1".into()), Some(&ConfigValue::from("b")));
        assert!(tree.get(&"Nothing".into()).is_none());
        assert_eq!(tree.get(&"Ratio".into()), Some(&ConfigValue::Float(0.5)));
    }

    #[test]
    fn test_set_reuses_existing_keys() {
        let mut tree = ConfigTree::from_json(&json!({ "Jwt": { "Key": "k1" } })).unwrap();
        tree.set(&"jwt:key".into(), "k2".into());
        tree.set(&"jwt:issuer".into(), "me".into());

        let jwt = tree.entries().get("Jwt").and_then(ConfigValue::as_section).unwrap();
        assert_eq!(jwt.get("Key"), Some(&ConfigValue::from("k2")));
        assert_eq!(jwt.get("issuer"), Some(&ConfigValue::from("me")));
        assert_eq!(jwt.len(), 2);
    }

    #[test]
    fn test_set_replaces_scalar_parent() {
        let mut tree = ConfigTree::new();
        tree.set(&"A".into(), 1i64.into());
        tree.set(&"A:B".into(), true.into());
        assert_eq!(tree.get(&"A:B".into()), Some(&ConfigValue::Bool(true)));
    }

    #[test]
    fn test_remove() {
        let mut tree = ConfigTree::from_json(&json!({ "Jwt": { "Key": "k1" } })).unwrap();
        assert_eq!(tree.remove(&"jwt:key".into()), Some("k1".into()));
        assert!(tree.remove(&"jwt:key".into()).is_none());
        assert!(tree.get(&"Jwt".into()).is_some());
    }

    #[test]
    fn test_from_env_vars() {
        let tree = ConfigTree::from_env_vars(
            "APP_",
            [
                ("APP_JWT__KEY", "secret"),
                ("app_Jwt__ExpiryMinutes", "45"),
                ("OTHER__KEY", "ignored"),
                ("APP_", "ignored"),
            ],
        );

        assert_eq!(tree.get(&"Jwt:Key".into()), Some(&ConfigValue::from("secret")));
        assert_eq!(
            tree.get(&"Jwt:ExpiryMinutes".into()),
            Some(&ConfigValue::from("45"))
        );
        assert_eq!(tree.entries().len(), 1);
    }
}
