//! The workspace-wide variable registry (`variables.json`).
//!
//! Every manual contributes variables during initiation. A later save of the
//! same name supersedes the earlier entry; nothing is removed automatically.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde_json::Value;

use folio_types::{atomic, marker_for, FolioError, Result, Variable, VariableOrigin};

#[derive(Debug, Clone)]
pub struct VariableStore {
    path: PathBuf,
    vars: BTreeMap<String, Variable>,
}

impl VariableStore {
    /// Load the registry; a missing file is an empty registry.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let vars = match atomic::read_json::<BTreeMap<String, Value>>(&path)? {
            None => BTreeMap::new(),
            Some(raw) => raw
                .into_iter()
                .map(|(name, value)| {
                    decode(value)
                        .map(|var| (name.clone(), var))
                        .map_err(|e| FolioError::CorruptState {
                            path: path.clone(),
                            message: format!("variable {name}: {e}"),
                        })
                })
                .collect::<Result<_>>()?,
        };
        Ok(Self { path, vars })
    }

    pub fn save(&self) -> Result<()> {
        atomic::write_json(&self.path, &self.vars)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Variable> {
        self.vars.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Variable)> {
        self.vars.iter()
    }

    /// Variables contributed by `manual`.
    pub fn for_manual<'a>(&'a self, manual: &'a str) -> impl Iterator<Item = (&'a String, &'a Variable)> {
        self.vars
            .iter()
            .filter(move |(_, v)| v.source_manual.as_deref() == Some(manual))
    }

    /// Merge variables produced for `source_manual`, stamping each with its
    /// source and the current date. A value the user set explicitly is kept.
    /// Returns the number of variables merged.
    pub fn merge<I>(&mut self, incoming: I, source_manual: &str) -> usize
    where
        I: IntoIterator<Item = (String, Variable)>,
    {
        let today = chrono::Local::now().to_rfc3339();
        let mut merged = 0;
        for (name, mut var) in incoming {
            var.source_manual = Some(source_manual.to_string());
            var.added_date = Some(today.clone());
            if let Some(existing) = self.vars.get(&name) {
                if existing.origin == VariableOrigin::User {
                    var.default_value = existing.default_value.clone();
                    var.origin = VariableOrigin::User;
                }
            }
            self.vars.insert(name, var);
            merged += 1;
        }
        tracing::debug!(source_manual, merged, total = self.vars.len(), "Variables merged");
        merged
    }

    /// Set a variable's value on the user's behalf, creating it if needed.
    pub fn set_default(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        let var = self
            .vars
            .entry(name.to_string())
            .or_insert_with(|| Variable::new(String::new(), String::new(), "user"));
        var.default_value = value;
        var.origin = VariableOrigin::User;
    }

    /// Marker dictionary for the template resolver. Each variable with a value
    /// is keyed both by its marker text (`COMPANY NAME`) and its raw name.
    /// Values that are themselves a bracketed placeholder, such as the
    /// generated default `[EFFECTIVE DATE]`, count as unset.
    pub fn markers(&self) -> BTreeMap<String, String> {
        let mut out = BTreeMap::new();
        for (name, var) in &self.vars {
            let value = var.default_value.trim();
            if value.is_empty() || (value.starts_with('[') && value.ends_with(']')) {
                continue;
            }
            let marker = marker_for(name);
            let key = marker.trim_start_matches('[').trim_end_matches(']').to_string();
            out.insert(key, var.default_value.clone());
            out.insert(name.clone(), var.default_value.clone());
        }
        out
    }
}

/// Accepts older records that flagged organogram variables with a boolean.
fn decode(mut value: Value) -> serde_json::Result<Variable> {
    if let Some(obj) = value.as_object_mut() {
        if obj.remove("from_organogram").and_then(|v| v.as_bool()) == Some(true)
            && !obj.contains_key("origin")
        {
            obj.insert("origin".into(), Value::String("organogram".into()));
        }
    }
    serde_json::from_value(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn var(value: &str) -> Variable {
        Variable::new("desc", value, "organization")
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = VariableStore::load(dir.path().join("variables.json")).unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn merge_stamps_source_and_date() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VariableStore::load(dir.path().join("variables.json")).unwrap();
        let n = store.merge([("COMPANY_NAME".to_string(), var("[COMPANY NAME]"))], "hr_manual");
        assert_eq!(n, 1);

        let v = store.get("COMPANY_NAME").unwrap();
        assert_eq!(v.source_manual.as_deref(), Some("hr_manual"));
        assert!(v.added_date.is_some());
        assert_eq!(store.for_manual("hr_manual").count(), 1);
        assert_eq!(store.for_manual("it_manual").count(), 0);
    }

    #[test]
    fn later_merge_supersedes_but_user_value_survives() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VariableStore::load(dir.path().join("variables.json")).unwrap();
        store.merge([("A".to_string(), var("first"))], "m1");
        store.merge([("A".to_string(), var("second"))], "m2");
        assert_eq!(store.get("A").unwrap().default_value, "second");

        store.set_default("A", "Acme");
        store.merge([("A".to_string(), var("third"))], "m3");
        let a = store.get("A").unwrap();
        assert_eq!(a.default_value, "Acme");
        assert_eq!(a.origin, VariableOrigin::User);
        assert_eq!(a.source_manual.as_deref(), Some("m3"));
    }

    #[test]
    fn markers_use_both_forms_and_skip_unset() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = VariableStore::load(dir.path().join("variables.json")).unwrap();
        store.merge(
            [
                ("COMPANY_NAME".to_string(), var("Acme")),
                ("EMPTY".to_string(), var("  ")),
                ("EFFECTIVE_DATE".to_string(), var("[EFFECTIVE DATE]")),
            ],
            "m",
        );
        let markers = store.markers();
        assert_eq!(markers["COMPANY NAME"], "Acme");
        assert_eq!(markers["COMPANY_NAME"], "Acme");
        assert!(!markers.contains_key("EMPTY"));
        assert!(!markers.contains_key("EFFECTIVE DATE"));
    }

    #[test]
    fn save_and_reload_with_legacy_flag() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("variables.json");
        std::fs::write(
            &path,
            r#"{"HR_MANAGER_NAME": {"description": "Name of the HR Manager",
                "default_value": "Jane Doe", "category": "responsibility",
                "from_organogram": true}}"#,
        )
        .unwrap();

        let mut store = VariableStore::load(&path).unwrap();
        assert_eq!(
            store.get("HR_MANAGER_NAME").unwrap().origin,
            VariableOrigin::Organogram
        );
        store.set_default("NEW_VAR", "x");
        store.save().unwrap();

        let reloaded = VariableStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert_eq!(reloaded.get("NEW_VAR").unwrap().category, "user");
    }

    #[test]
    fn undecodable_entry_is_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("variables.json");
        std::fs::write(&path, r#"{"A": 5}"#).unwrap();
        assert!(matches!(
            VariableStore::load(&path).unwrap_err(),
            FolioError::CorruptState { .. }
        ));
    }
}
