//! The hierarchical configuration store.
//!
//! The tree is held as a [`serde_json::Value`] object regardless of the file
//! format on disk, so YAML and JSON documents share one access path. Key order
//! is preserved across a load/save round trip.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use folio_types::{atomic, FolioError, Result};

use crate::schema::FieldCatalog;
use crate::validation::{self, RuleSet, ValidationResult};

/// On-disk encoding of the store, chosen from the file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    Yaml,
    Json,
}

impl ConfigFormat {
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => ConfigFormat::Json,
            _ => ConfigFormat::Yaml,
        }
    }
}

/// What [`ConfigStore::load`] found on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    /// No file at the configured path; the in-memory tree was left as it was.
    Missing,
}

/// Dotted-path key-value store backed by a structured file.
///
/// A store is constructed explicitly and passed to its consumers; there is no
/// process-wide instance. Mutation requires `&mut self`, so concurrent writers
/// must be serialized by the caller.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: Option<PathBuf>,
    format: ConfigFormat,
    tree: Value,
}

impl ConfigStore {
    /// An empty store bound to `path`. Nothing is read until [`load`](Self::load).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            format: ConfigFormat::from_path(&path),
            path: Some(path),
            tree: Value::Object(Map::new()),
        }
    }

    /// Bind to `path` and load it. A missing file yields an empty store and a
    /// warning; a malformed file is an error.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let mut store = Self::new(path);
        store.load()?;
        Ok(store)
    }

    /// A store with no backing file, seeded with `tree`. Non-object trees are
    /// replaced by an empty object.
    pub fn in_memory(tree: Value) -> Self {
        Self {
            path: None,
            format: ConfigFormat::Json,
            tree: match tree {
                Value::Object(_) => tree,
                _ => Value::Object(Map::new()),
            },
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn format(&self) -> ConfigFormat {
        self.format
    }

    /// Replace the in-memory tree with the persisted one.
    ///
    /// On any failure the current tree is left untouched.
    pub fn load(&mut self) -> Result<LoadStatus> {
        let Some(path) = self.path.clone() else {
            return Err(FolioError::Other("in-memory store has no backing file".into()));
        };

        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "Config file not found, continuing with empty configuration");
                return Ok(LoadStatus::Missing);
            }
            Err(e) => return Err(FolioError::Io(e)),
        };

        let parsed: Value = match self.format {
            ConfigFormat::Yaml => serde_yaml::from_str(&raw)
                .map_err(|e| FolioError::parse(format!("config file {}", path.display()), e))?,
            ConfigFormat::Json => serde_json::from_str(&raw)
                .map_err(|e| FolioError::parse(format!("config file {}", path.display()), e))?,
        };

        self.tree = match parsed {
            Value::Object(_) => parsed,
            Value::Null => Value::Object(Map::new()),
            other => {
                return Err(FolioError::parse(
                    format!("config file {}", path.display()),
                    format!("top level must be a mapping, found {}", type_name(&other)),
                ))
            }
        };
        tracing::debug!(path = %path.display(), "Configuration loaded");
        Ok(LoadStatus::Loaded)
    }

    /// Stamp `metadata.last_updated` and write the tree atomically.
    pub fn save(&mut self) -> Result<()> {
        let Some(path) = self.path.clone() else {
            return Err(FolioError::Other("in-memory store has no backing file".into()));
        };
        self.set("metadata.last_updated", chrono::Local::now().to_rfc3339())?;

        let encoded = match self.format {
            ConfigFormat::Yaml => serde_yaml::to_string(&self.tree)
                .map_err(|e| FolioError::Other(format!("failed to encode YAML: {e}")))?,
            ConfigFormat::Json => serde_json::to_string_pretty(&self.tree)?,
        };
        atomic::write_atomic(&path, encoded.as_bytes())?;
        tracing::info!(path = %path.display(), "Configuration saved");
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Access
    // -----------------------------------------------------------------------

    /// Borrow the value at `path`, or `None` as soon as a segment is absent or
    /// an intermediate node is not a mapping.
    pub fn get(&self, path: &str) -> Option<&Value> {
        lookup(&self.tree, path)
    }

    /// The value at `path` decoded as `T`, or `default` when it is absent or of
    /// a different shape. Never fails.
    pub fn get_or<T: DeserializeOwned>(&self, path: &str, default: T) -> T {
        self.get(path)
            .and_then(|v| serde_json::from_value(v.clone()).ok())
            .unwrap_or(default)
    }

    /// The scalar at `path` rendered as text, or `default`.
    pub fn get_string(&self, path: &str, default: &str) -> String {
        self.get(path)
            .and_then(scalar_to_string)
            .unwrap_or_else(|| default.to_string())
    }

    /// Write `value` at `path`, creating missing intermediate mappings and
    /// replacing any non-mapping ancestor.
    ///
    /// The value is encoded before the tree is touched, so a value that cannot
    /// be represented leaves the store unchanged.
    pub fn set<T: Serialize>(&mut self, path: &str, value: T) -> Result<()> {
        let segments = split_path(path)?;
        let encoded = serde_json::to_value(value).map_err(|e| FolioError::Unrepresentable {
            path: path.to_string(),
            message: e.to_string(),
        })?;

        let (leaf, parents) = match segments.split_last() {
            Some(split) => split,
            None => return Err(malformed_path(path)),
        };

        if !self.tree.is_object() {
            self.tree = Value::Object(Map::new());
        }
        let mut map = match self.tree.as_object_mut() {
            Some(root) => root,
            None => return Err(malformed_path(path)),
        };
        for segment in parents {
            let child = map
                .entry(segment.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !child.is_object() {
                *child = Value::Object(Map::new());
            }
            map = match child.as_object_mut() {
                Some(next) => next,
                None => return Err(malformed_path(path)),
            };
        }
        map.insert(leaf.to_string(), encoded);
        Ok(())
    }

    /// Remove and return the value at `path`.
    pub fn remove(&mut self, path: &str) -> Option<Value> {
        let segments = split_path(path).ok()?;
        let (leaf, parents) = segments.split_last()?;
        let mut node = &mut self.tree;
        for segment in parents {
            node = node.as_object_mut()?.get_mut(*segment)?;
        }
        node.as_object_mut()?.shift_remove(*leaf)
    }

    /// The whole tree.
    pub fn tree(&self) -> &Value {
        &self.tree
    }

    /// A point-in-time copy of the tree.
    pub fn snapshot(&self) -> Value {
        self.tree.clone()
    }

    // -----------------------------------------------------------------------
    // Validation
    // -----------------------------------------------------------------------

    /// Validate against the rules in the store's own `validation` section and
    /// the standard field catalog. Rules are re-read on every call.
    pub fn validate(&self) -> ValidationResult {
        let rules = RuleSet::from_section(self.get("validation"));
        self.validate_with(&rules, &FieldCatalog::standard())
    }

    /// Validate against caller-supplied rules and catalog.
    pub fn validate_with(&self, rules: &RuleSet, catalog: &FieldCatalog) -> ValidationResult {
        validation::evaluate(self, rules, catalog)
    }
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::in_memory(Value::Object(Map::new()))
    }
}

pub(crate) fn lookup<'a>(tree: &'a Value, path: &str) -> Option<&'a Value> {
    let mut node = tree;
    for segment in path.split('.') {
        node = node.as_object()?.get(segment)?;
    }
    Some(node)
}

fn split_path(path: &str) -> Result<Vec<&str>> {
    let segments: Vec<&str> = path.split('.').collect();
    if segments.iter().any(|s| s.is_empty()) {
        return Err(FolioError::Unrepresentable {
            path: path.to_string(),
            message: "path segments must be non-empty".into(),
        });
    }
    Ok(segments)
}

fn malformed_path(path: &str) -> FolioError {
    FolioError::Unrepresentable {
        path: path.to_string(),
        message: "path does not address a mapping entry".into(),
    }
}

/// Text form of a scalar. Containers and null have none.
pub(crate) fn scalar_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "sequence",
        Value::Object(_) => "mapping",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn sample() -> ConfigStore {
        ConfigStore::in_memory(json!({
            "organization": {
                "profile": {"name": "Acme", "size": 40},
                "contact": {"digital": {"email": "info@acme.test"}}
            }
        }))
    }

    #[test]
    fn get_traverses_dotted_path() {
        let store = sample();
        assert_eq!(store.get("organization.profile.name"), Some(&json!("Acme")));
        assert_eq!(store.get_string("organization.profile.size", ""), "40");
    }

    #[test]
    fn get_returns_default_for_absent_paths() {
        let store = sample();
        for path in [
            "organization.profile.missing",
            "nothing",
            "organization.profile.name.deeper",
            "",
            "organization..profile",
        ] {
            assert_eq!(store.get_or(path, json!("fallback")), json!("fallback"), "{path}");
        }
        assert_eq!(store.get_string("a.b.c", "d"), "d");
    }

    #[test]
    fn get_or_falls_back_on_shape_mismatch() {
        let store = sample();
        let n: u32 = store.get_or("organization.profile.name", 7);
        assert_eq!(n, 7);
    }

    #[test]
    fn set_then_get_regardless_of_ancestors() {
        let mut store = sample();

        // Missing intermediates
        store.set("a.b.c", "deep").unwrap();
        assert_eq!(store.get("a.b.c"), Some(&json!("deep")));

        // Scalar ancestor is replaced by a mapping
        store.set("organization.profile.name.first", "A").unwrap();
        assert_eq!(store.get("organization.profile.name.first"), Some(&json!("A")));

        // Overwrite a subtree with a scalar
        store.set("organization.contact", false).unwrap();
        assert_eq!(store.get("organization.contact"), Some(&json!(false)));
    }

    #[test]
    fn set_rejects_empty_segments_without_mutation() {
        let mut store = sample();
        let before = store.snapshot();
        let err = store.set("organization..name", "x").unwrap_err();
        assert!(matches!(err, FolioError::Unrepresentable { .. }));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn set_rejects_unencodable_value_without_mutation() {
        let mut store = sample();
        let before = store.snapshot();
        let mut bad: HashMap<(u8, u8), &str> = HashMap::new();
        bad.insert((1, 2), "tuple keys cannot be mapping keys");

        let err = store.set("organization.profile.grid", bad).unwrap_err();
        assert!(matches!(err, FolioError::Unrepresentable { .. }));
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn remove_deletes_leaf() {
        let mut store = sample();
        assert_eq!(store.remove("organization.profile.size"), Some(json!(40)));
        assert!(store.get("organization.profile.size").is_none());
        assert!(store.remove("organization.profile.size").is_none());
    }

    #[test]
    fn missing_file_is_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("company.yaml")).unwrap();
        assert_eq!(store.tree(), &json!({}));
    }

    #[test]
    fn malformed_file_keeps_previous_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company.yaml");
        std::fs::write(&path, "organization:\n  profile:\n    name: Acme\n").unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        std::fs::write(&path, "organization: [unclosed\n").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, FolioError::Parse { .. }));
        assert_eq!(store.get_string("organization.profile.name", ""), "Acme");
    }

    #[test]
    fn yaml_round_trip_preserves_untouched_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company.yaml");
        std::fs::write(
            &path,
            "organization:\n  profile:\n    name: Acme\n    industry: Retail\ncustom:\n  keep: [1, 2]\n",
        )
        .unwrap();

        let mut store = ConfigStore::open(&path).unwrap();
        store.set("organization.profile.name", "Acme Ltd").unwrap();
        store.save().unwrap();

        let reloaded = ConfigStore::open(&path).unwrap();
        assert_eq!(reloaded.get_string("organization.profile.name", ""), "Acme Ltd");
        assert_eq!(reloaded.get_string("organization.profile.industry", ""), "Retail");
        assert_eq!(reloaded.get("custom.keep"), Some(&json!([1, 2])));
        assert!(reloaded.get("metadata.last_updated").is_some());
    }

    #[test]
    fn json_format_chosen_by_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("company.json");
        let mut store = ConfigStore::new(&path);
        assert_eq!(store.format(), ConfigFormat::Json);
        store.set("organization.profile.name", "Acme").unwrap();
        store.save().unwrap();

        let raw = std::fs::read_to_string(&path).unwrap();
        let parsed: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(parsed["organization"]["profile"]["name"], "Acme");
    }

    #[test]
    fn in_memory_store_cannot_save() {
        let mut store = sample();
        assert!(store.save().is_err());
    }
}
