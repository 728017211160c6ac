//! Core registry types.

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::RegistryError;

/// Namespace prefix for keys registered from a manifest app name.
pub const APPNAME_PREFIX: &str = "appname:";

/// Namespace prefix for keys registered from a descriptor route.
pub const PATH_PREFIX: &str = "path:";

/// A repository that can be scanned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub org: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(org: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            org: org.into(),
            name: name.into(),
        }
    }

    /// `{org}/{name}`, the form stored in registry entries.
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.org, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.org, self.name)
    }
}

/// The unit of resolution: an app id and the repository that implements it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegistryEntry {
    pub app_id: String,
    pub github_repo: String,
}

impl RegistryEntry {
    pub fn new(app_id: impl Into<String>, github_repo: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
            github_repo: github_repo.into(),
        }
    }
}

/// A namespaced registry key.
///
/// Two registration sources share one map, so every key carries the source
/// it came from. The string form (`appname:advisor`, `path:/insights/advisor`)
/// is what gets persisted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RegistryKey {
    /// Registered from a manifest's `insights.appname`.
    AppName(String),
    /// Registered from a descriptor module route pathname.
    Path(String),
}

impl RegistryKey {
    pub fn app_name(name: impl Into<String>) -> Self {
        RegistryKey::AppName(name.into())
    }

    pub fn path(pathname: impl Into<String>) -> Self {
        RegistryKey::Path(pathname.into())
    }

    /// The registered pathname, if this is a path key.
    pub fn as_path(&self) -> Option<&str> {
        match self {
            RegistryKey::Path(p) => Some(p),
            RegistryKey::AppName(_) => None,
        }
    }
}

impl fmt::Display for RegistryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegistryKey::AppName(name) => write!(f, "{}{}", APPNAME_PREFIX, name),
            RegistryKey::Path(path) => write!(f, "{}{}", PATH_PREFIX, path),
        }
    }
}

impl FromStr for RegistryKey {
    type Err = RegistryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(name) = s.strip_prefix(APPNAME_PREFIX) {
            Ok(RegistryKey::AppName(name.to_string()))
        } else if let Some(path) = s.strip_prefix(PATH_PREFIX) {
            Ok(RegistryKey::Path(path.to_string()))
        } else {
            Err(RegistryError::InvalidKey(s.to_string()))
        }
    }
}

impl Serialize for RegistryKey {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RegistryKey {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// A module declared in a deployment descriptor, with the pathnames it serves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRoute {
    pub module_id: String,
    pub pathnames: Vec<String>,
}

/// Keyed mapping from namespaced keys to discovered entries.
///
/// Insertion order is preserved; it is the enumeration order of the scan and
/// acts as the tie-break for equal-length prefix matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Registry {
    entries: IndexMap<RegistryKey, RegistryEntry>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert unless the key is already present. First writer wins.
    ///
    /// Returns `true` if the entry was inserted.
    pub fn register(&mut self, key: RegistryKey, entry: RegistryEntry) -> bool {
        if entry.app_id.is_empty() {
            return false;
        }
        if key.as_path().is_some_and(|p| !p.starts_with('/')) {
            return false;
        }
        if self.entries.contains_key(&key) {
            return false;
        }
        self.entries.insert(key, entry);
        true
    }

    pub fn get(&self, key: &RegistryKey) -> Option<&RegistryEntry> {
        self.entries.get(key)
    }

    pub fn contains_key(&self, key: &RegistryKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RegistryKey, &RegistryEntry)> {
        self.entries.iter()
    }

    /// Registered pathnames with their entries, in insertion order.
    pub fn paths(&self) -> impl Iterator<Item = (&str, &RegistryEntry)> {
        self.entries
            .iter()
            .filter_map(|(key, entry)| key.as_path().map(|p| (p, entry)))
    }

    /// All entries, one per app id, in first-seen order.
    ///
    /// Several keys can point at the same app, so the flat key list has
    /// duplicates that consumers listing apps don't want.
    pub fn unique_entries(&self) -> Vec<RegistryEntry> {
        let mut unique: IndexMap<&str, &RegistryEntry> = IndexMap::new();
        for entry in self.entries.values() {
            unique.entry(entry.app_id.as_str()).or_insert(entry);
        }
        unique.into_values().cloned().collect()
    }

    /// Flatten into `(key, entry)` pairs for persistence.
    pub fn to_pairs(&self) -> Vec<(RegistryKey, RegistryEntry)> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Rebuild from persisted pairs, keeping the first occurrence of each key.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (RegistryKey, RegistryEntry)>) -> Self {
        let mut registry = Self::new();
        for (key, entry) in pairs {
            registry.register(key, entry);
        }
        registry
    }
}
