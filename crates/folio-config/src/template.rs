//! Placeholder resolution.
//!
//! Two placeholder families are recognised:
//!
//! - `{name}`: a snippet from the store's `templates` section, else a dotted
//!   config path holding a scalar, else a derived variable such as
//!   `{COMPANY_NAME}`.
//! - `[NAME]`: a key of the caller-supplied marker dictionary, matched
//!   exactly. Casing conventions belong to the caller.
//!
//! Anything that cannot be resolved is left in the text verbatim. Each family
//! is substituted in a single pass over a snapshot taken when the resolver was
//! built, so every occurrence of a placeholder receives the same value.

use std::collections::{BTreeMap, HashMap};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde_json::Value;

use crate::derived::derived_variables;
use crate::store::{lookup, scalar_to_string, ConfigStore};

static BRACE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{([A-Za-z0-9_][A-Za-z0-9_.\-]*)\}").expect("brace placeholder pattern")
});

/// Snippets may nest this deep inside one another.
const MAX_SNIPPET_DEPTH: usize = 8;

static MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\[([A-Za-z0-9_][A-Za-z0-9_ .\-]*)\]").expect("marker placeholder pattern")
});

/// Text after resolution, with the placeholders that stayed unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    pub text: String,
    /// Unresolved placeholders as written, first occurrence order, no repeats.
    pub unresolved: Vec<String>,
}

impl Resolution {
    pub fn is_complete(&self) -> bool {
        self.unresolved.is_empty()
    }
}

/// Resolves placeholders against a frozen view of the configuration and a
/// marker dictionary.
#[derive(Debug, Clone, Default)]
pub struct TemplateResolver {
    config: Value,
    derived: BTreeMap<String, String>,
    markers: HashMap<String, String>,
}

impl TemplateResolver {
    /// Snapshot `store`. Later edits to the store are not observed.
    pub fn from_store(store: &ConfigStore) -> Self {
        Self {
            config: store.snapshot(),
            derived: derived_variables(store),
            markers: HashMap::new(),
        }
    }

    /// Add marker values. Keys are the text between the brackets, e.g.
    /// `"COMPANY NAME"` for `[COMPANY NAME]`.
    pub fn with_markers<I, K, V>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.markers
            .extend(markers.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn resolve(&self, text: &str) -> String {
        self.resolve_detailed(text).text
    }

    pub fn resolve_detailed(&self, text: &str) -> Resolution {
        let mut unresolved: Vec<String> = Vec::new();

        let braces_done = BRACE.replace_all(text, |caps: &Captures| {
            let mut visiting = Vec::new();
            match self.lookup_brace(&caps[1], &mut visiting, &mut unresolved) {
                Some(value) => value,
                None => {
                    note(&mut unresolved, &caps[0]);
                    caps[0].to_string()
                }
            }
        });

        let markers_done = MARKER.replace_all(&braces_done, |caps: &Captures| {
            match self.markers.get(&caps[1]) {
                Some(value) => value.clone(),
                None => {
                    note(&mut unresolved, &caps[0]);
                    caps[0].to_string()
                }
            }
        });

        Resolution {
            text: markers_done.into_owned(),
            unresolved,
        }
    }

    /// Snippet first, then config path, then derived variable.
    ///
    /// `visiting` holds the snippets being expanded on the current path. A
    /// snippet that refers back to one of them, or sits deeper than
    /// [`MAX_SNIPPET_DEPTH`], is not expanded.
    fn lookup_brace(
        &self,
        name: &str,
        visiting: &mut Vec<String>,
        unresolved: &mut Vec<String>,
    ) -> Option<String> {
        let Some(snippet) = self
            .config
            .get("templates")
            .and_then(|t| t.get(name))
            .and_then(Value::as_str)
        else {
            return self.lookup_scalar(name);
        };
        if visiting.iter().any(|v| v == name) || visiting.len() >= MAX_SNIPPET_DEPTH {
            return None;
        }

        visiting.push(name.to_string());
        let expanded = BRACE
            .replace_all(snippet, |caps: &Captures| {
                match self.lookup_brace(&caps[1], visiting, unresolved) {
                    Some(value) => value,
                    None => {
                        note(unresolved, &caps[0]);
                        caps[0].to_string()
                    }
                }
            })
            .into_owned();
        visiting.pop();
        Some(expanded)
    }

    /// Config path first, then derived variable.
    fn lookup_scalar(&self, name: &str) -> Option<String> {
        lookup(&self.config, name)
            .and_then(scalar_to_string)
            .or_else(|| self.derived.get(name).cloned())
    }
}

fn note(unresolved: &mut Vec<String>, placeholder: &str) {
    if !unresolved.iter().any(|u| u == placeholder) {
        unresolved.push(placeholder.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn resolver() -> TemplateResolver {
        let store = ConfigStore::in_memory(json!({
            "organization": {
                "profile": {"name": "Acme", "legal_name": "Acme Holdings LLC", "blank": ""},
                "contact": {"digital": {"email": "info@acme.test"}}
            },
            "templates": {
                "company_header": "{organization.profile.legal_name} <{organization.contact.digital.email}>",
                "loop": "{loop}",
                "ping": "ping {pong}",
                "pong": "pong {ping}",
                "outer": "See {inner}",
                "inner": "{organization.profile.name} Ltd",
                "dangling": "Call {no.such.path}"
            }
        }));
        TemplateResolver::from_store(&store).with_markers([("COMPANY NAME", "Acme")])
    }

    #[test]
    fn dotted_path_scenario() {
        assert_eq!(
            resolver().resolve("Welcome to {organization.profile.name}"),
            "Welcome to Acme"
        );
    }

    #[test]
    fn unresolved_survives_verbatim() {
        let r = resolver();
        assert_eq!(r.resolve("{no.such.path} end"), "{no.such.path} end");
        assert_eq!(r.resolve("[NO SUCH VAR] end"), "[NO SUCH VAR] end");

        let detailed = r.resolve_detailed("{a.b} [X] {a.b}");
        assert_eq!(detailed.unresolved, vec!["{a.b}".to_string(), "[X]".to_string()]);
        assert!(!detailed.is_complete());
    }

    #[test]
    fn empty_value_is_resolved_not_unresolved() {
        let detailed = resolver().resolve_detailed("x{organization.profile.blank}y");
        assert_eq!(detailed.text, "xy");
        assert!(detailed.is_complete());
    }

    #[test]
    fn containers_are_not_scalars() {
        assert_eq!(
            resolver().resolve("{organization.profile}"),
            "{organization.profile}"
        );
    }

    #[test]
    fn resolution_is_idempotent() {
        let r = resolver();
        let text = "{company_header} / [COMPANY NAME] / {COMPANY_NAME} / {organization.profile.name}";
        let once = r.resolve(text);
        assert_eq!(once, "Acme Holdings LLC <info@acme.test> / Acme / Acme / Acme");
        assert_eq!(r.resolve(&once), once);
    }

    #[test]
    fn every_occurrence_gets_the_same_value() {
        let out = resolver().resolve("[COMPANY NAME] and [COMPANY NAME] and {organization.profile.name}");
        assert_eq!(out, "Acme and Acme and Acme");
    }

    #[test]
    fn markers_are_case_sensitive() {
        assert_eq!(resolver().resolve("[company name]"), "[company name]");
    }

    #[test]
    fn nested_snippets_resolve_in_one_pass() {
        let r = resolver();
        let once = r.resolve_detailed("{outer}");
        assert_eq!(once.text, "See Acme Ltd");
        assert!(once.is_complete());
        assert_eq!(r.resolve(&once.text), once.text);
    }

    #[test]
    fn self_referencing_snippet_is_reported() {
        let r = resolver();
        let once = r.resolve_detailed("{loop}");
        assert_eq!(once.text, "{loop}");
        assert_eq!(once.unresolved, vec!["{loop}".to_string()]);
        assert_eq!(r.resolve(&once.text), once.text);
    }

    #[test]
    fn snippet_cycle_stops_and_is_reported() {
        let r = resolver();
        let once = r.resolve_detailed("{ping}");
        assert_eq!(once.text, "ping pong {ping}");
        assert_eq!(once.unresolved, vec!["{ping}".to_string()]);
    }

    #[test]
    fn unresolved_inside_snippet_is_reported() {
        let once = resolver().resolve_detailed("{dangling}");
        assert_eq!(once.text, "Call {no.such.path}");
        assert_eq!(once.unresolved, vec!["{no.such.path}".to_string()]);
    }

    #[test]
    fn snapshot_ignores_later_edits() {
        let mut store = ConfigStore::in_memory(json!({"a": {"b": "before"}}));
        let r = TemplateResolver::from_store(&store);
        store.set("a.b", "after").unwrap();
        assert_eq!(r.resolve("{a.b}"), "before");
    }

    #[test]
    fn non_placeholder_braces_untouched() {
        let r = resolver();
        let text = r#"{"json": true} and [link](http://x) and { spaced }"#;
        assert_eq!(r.resolve(text), text);
    }
}
