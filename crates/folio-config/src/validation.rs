//! Configuration validation.
//!
//! Rules are declarative data ([`RuleSet`]) evaluated fresh on every call,
//! followed by domain checks driven by the [`FieldCatalog`]. Every check runs;
//! the result aggregates all violations found in one pass.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::Value;

use crate::schema::{FieldCatalog, FieldKind};
use crate::store::{scalar_to_string, ConfigStore};

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^@]+@[^@]+\.[^@]+$").expect("email pattern"));

const FISCAL_START: &str = "organization.operations.fiscal_year.start";
const FISCAL_END: &str = "organization.operations.fiscal_year.end";

// ---------------------------------------------------------------------------
// Rules
// ---------------------------------------------------------------------------

/// A single declarative constraint on one path.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationRule {
    /// The path must hold a non-empty value.
    Required { path: String },
    /// A present, non-empty value must match `pattern` from its start.
    Pattern { path: String, pattern: String },
    /// A present value must be one of `allowed`.
    OneOf { path: String, allowed: Vec<Value> },
}

impl ValidationRule {
    pub fn path(&self) -> &str {
        match self {
            ValidationRule::Required { path }
            | ValidationRule::Pattern { path, .. }
            | ValidationRule::OneOf { path, .. } => path,
        }
    }
}

/// An ordered collection of [`ValidationRule`]s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<ValidationRule>,
}

impl RuleSet {
    pub fn new(rules: Vec<ValidationRule>) -> Self {
        Self { rules }
    }

    /// Build rules from a `validation` section:
    ///
    /// ```yaml
    /// validation:
    ///   required_fields: [organization.profile.name]
    ///   field_patterns: {organization.contact.phone.main: '^\+\d+$'}
    ///   field_types: {organization.profile.size: [small, medium, large]}
    /// ```
    ///
    /// Malformed entries are skipped.
    pub fn from_section(section: Option<&Value>) -> Self {
        let mut rules = Vec::new();
        let Some(section) = section else {
            return Self { rules };
        };

        if let Some(required) = section.get("required_fields").and_then(Value::as_array) {
            rules.extend(
                required
                    .iter()
                    .filter_map(Value::as_str)
                    .map(|path| ValidationRule::Required { path: path.into() }),
            );
        }
        if let Some(patterns) = section.get("field_patterns").and_then(Value::as_object) {
            for (path, pattern) in patterns {
                if let Some(pattern) = pattern.as_str() {
                    rules.push(ValidationRule::Pattern {
                        path: path.clone(),
                        pattern: pattern.into(),
                    });
                }
            }
        }
        if let Some(types) = section.get("field_types").and_then(Value::as_object) {
            for (path, allowed) in types {
                if let Some(allowed) = allowed.as_array() {
                    rules.push(ValidationRule::OneOf {
                        path: path.clone(),
                        allowed: allowed.clone(),
                    });
                }
            }
        }
        Self { rules }
    }

    pub fn push(&mut self, rule: ValidationRule) {
        self.rules.push(rule);
    }

    pub fn rules(&self) -> &[ValidationRule] {
        &self.rules
    }

    pub fn is_required(&self, path: &str) -> bool {
        self.rules
            .iter()
            .any(|r| matches!(r, ValidationRule::Required { path: p } if p == path))
    }

    pub fn allowed_values(&self, path: &str) -> Option<&[Value]> {
        self.rules.iter().find_map(|r| match r {
            ValidationRule::OneOf { path: p, allowed } if p == path => Some(allowed.as_slice()),
            _ => None,
        })
    }
}

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

/// Outcome of a validation pass. Valid exactly when there are no errors;
/// warnings are advisory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    is_valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    pub fn new(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            is_valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }
}

/// Accumulates findings, remembering which paths already carry an error so
/// later layers do not report the same field twice.
#[derive(Default)]
struct Findings {
    errors: Vec<String>,
    warnings: Vec<String>,
    failed_paths: HashSet<String>,
}

impl Findings {
    fn error(&mut self, path: &str, message: String) {
        self.failed_paths.insert(path.to_string());
        self.errors.push(message);
    }

    fn warning(&mut self, message: String) {
        self.warnings.push(message);
    }

    fn has_error(&self, path: &str) -> bool {
        self.failed_paths.contains(path)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

pub(crate) fn evaluate(
    store: &ConfigStore,
    rules: &RuleSet,
    catalog: &FieldCatalog,
) -> ValidationResult {
    let mut findings = Findings::default();

    // (a) required fields
    for rule in rules.rules() {
        if let ValidationRule::Required { path } = rule {
            if is_blank(store.get(path)) {
                findings.error(path, format!("Required field missing: {path}"));
            }
        }
    }

    // (b) patterns
    for rule in rules.rules() {
        if let ValidationRule::Pattern { path, pattern } = rule {
            let Some(text) = present_text(store.get(path)) else {
                continue;
            };
            match Regex::new(&format!("^(?:{pattern})")) {
                Ok(re) if re.is_match(&text) => {}
                Ok(_) => findings.error(path, format!("Invalid format for {path}: '{text}'")),
                Err(e) => {
                    findings.error(path, format!("Invalid validation pattern for {path}: {e}"))
                }
            }
        }
    }

    // (c) enumerations, declarative first then catalog choices
    for rule in rules.rules() {
        if let ValidationRule::OneOf { path, allowed } = rule {
            check_membership(store, path, allowed, &mut findings);
        }
    }
    for field in catalog.fields() {
        if let FieldKind::Choice(options) = &field.kind {
            if rules.allowed_values(&field.path).is_some() || findings.has_error(&field.path) {
                continue;
            }
            let allowed: Vec<Value> = options.iter().map(|o| Value::String(o.clone())).collect();
            check_membership(store, &field.path, &allowed, &mut findings);
        }
    }

    // (d) domain rules
    check_domain_rules(store, catalog, &mut findings);

    let result = ValidationResult::new(findings.errors, findings.warnings);
    tracing::debug!(
        errors = result.errors().len(),
        warnings = result.warnings().len(),
        "Configuration validated"
    );
    result
}

fn check_membership(store: &ConfigStore, path: &str, allowed: &[Value], findings: &mut Findings) {
    let Some(value) = store.get(path) else {
        return;
    };
    if value.is_null() || allowed.iter().any(|a| same_value(a, value)) {
        return;
    }
    let options: Vec<String> = allowed
        .iter()
        .map(|a| scalar_to_string(a).unwrap_or_else(|| a.to_string()))
        .collect();
    let shown = scalar_to_string(value).unwrap_or_else(|| value.to_string());
    findings.error(
        path,
        format!(
            "Invalid value for {path}: '{shown}'. Must be one of: {}",
            options.join(", ")
        ),
    );
}

fn check_domain_rules(store: &ConfigStore, catalog: &FieldCatalog, findings: &mut Findings) {
    for field in catalog.fields() {
        if findings.has_error(&field.path) {
            continue;
        }
        let Some(text) = present_text(store.get(&field.path)) else {
            continue;
        };
        let path = &field.path;
        match field.kind {
            FieldKind::Email if !is_email(&text) => {
                findings.error(path, format!("Invalid email format for {path}: '{text}'"));
            }
            FieldKind::Phone if !is_phone(&text) => {
                findings.warning(format!(
                    "Phone number for {path} should include the country code (e.g. +15551234567): '{text}'"
                ));
            }
            FieldKind::Url if !(text.starts_with("http://") || text.starts_with("https://")) => {
                findings.warning(format!("Website for {path} should start with http:// or https://: '{text}'"));
            }
            _ => {}
        }
    }

    // Paired fiscal-year dates
    if findings.has_error(FISCAL_START) || findings.has_error(FISCAL_END) {
        return;
    }
    let start = present_text(store.get(FISCAL_START));
    let end = present_text(store.get(FISCAL_END));
    if start.is_none() && end.is_none() {
        return;
    }
    let both_valid = matches!((&start, &end), (Some(s), Some(e)) if is_month_day(s) && is_month_day(e));
    if !both_valid {
        findings.error(
            FISCAL_START,
            format!(
                "Invalid fiscal year date format for {FISCAL_START} / {FISCAL_END}. Use 'Month DD' format."
            ),
        );
    }
}

fn is_blank(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.trim().is_empty(),
        Some(Value::Array(a)) => a.is_empty(),
        Some(Value::Object(o)) => o.is_empty(),
        Some(Value::Bool(_)) | Some(Value::Number(_)) => false,
    }
}

fn present_text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(scalar_to_string)
        .filter(|s| !s.trim().is_empty())
}

fn same_value(allowed: &Value, actual: &Value) -> bool {
    allowed == actual
        || matches!(
            (scalar_to_string(allowed), scalar_to_string(actual)),
            (Some(a), Some(b)) if a == b
        )
}

fn is_email(text: &str) -> bool {
    EMAIL.is_match(text)
}

fn is_phone(text: &str) -> bool {
    match text.strip_prefix('+') {
        Some(digits) => (10..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit()),
        None => false,
    }
}

/// `"January 1"`, `"December 31"`. Leap days are accepted.
fn is_month_day(text: &str) -> bool {
    chrono::NaiveDate::parse_from_str(&format!("{} 2000", text.trim()), "%B %d %Y").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn store(tree: Value) -> ConfigStore {
        ConfigStore::in_memory(tree)
    }

    #[test]
    fn both_missing_required_fields_are_reported() {
        let store = store(json!({
            "validation": {
                "required_fields": ["organization.profile.name", "organization.legal.jurisdiction"]
            }
        }));
        let result = store.validate();
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 2);
        assert!(result.errors()[0].contains("organization.profile.name"));
        assert!(result.errors()[1].contains("organization.legal.jurisdiction"));
    }

    #[test]
    fn invalid_required_email_yields_exactly_one_error() {
        let store = store(json!({
            "organization": {"contact": {"digital": {"email": "not-an-email"}}},
            "validation": {"required_fields": ["organization.contact.digital.email"]}
        }));
        let result = store.validate();
        assert!(!result.is_valid());
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].contains("organization.contact.digital.email"));
    }

    #[test]
    fn pattern_failure_suppresses_domain_duplicate() {
        let store = store(json!({
            "organization": {"contact": {"digital": {"email": "bad"}}},
            "validation": {"field_patterns": {"organization.contact.digital.email": "^\\S+@\\S+$"}}
        }));
        let result = store.validate();
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].starts_with("Invalid format"));
    }

    #[test]
    fn enumeration_membership() {
        let mut store = store(json!({
            "organization": {"profile": {"size": "huge"}},
            "validation": {"field_types": {"organization.profile.size": ["small", "medium", "large"]}}
        }));
        let result = store.validate();
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].contains("small, medium, large"));

        store.set("organization.profile.size", "medium").unwrap();
        assert!(store.validate().is_valid());
    }

    #[test]
    fn phone_and_website_are_warnings_only() {
        let store = store(json!({
            "organization": {"contact": {
                "phone": {"main": "555-1234"},
                "digital": {"website": "acme.test"}
            }}
        }));
        let result = store.validate();
        assert!(result.is_valid());
        assert_eq!(result.warnings().len(), 2);
    }

    #[test]
    fn fiscal_year_pair_must_be_month_day() {
        let good = store(json!({"organization": {"operations": {"fiscal_year": {
            "start": "January 1", "end": "December 31"
        }}}}));
        assert!(good.validate().is_valid());

        let bad = store(json!({"organization": {"operations": {"fiscal_year": {
            "start": "2024-01-01", "end": "December 31"
        }}}}));
        let result = bad.validate();
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].contains("Month DD"));

        let half = store(json!({"organization": {"operations": {"fiscal_year": {"start": "July 1"}}}}));
        assert!(!half.validate().is_valid());
    }

    #[test]
    fn invalid_pattern_is_reported_not_panicked() {
        let store = store(json!({
            "organization": {"profile": {"name": "Acme"}},
            "validation": {"field_patterns": {"organization.profile.name": "([unclosed"}}
        }));
        let result = store.validate();
        assert_eq!(result.errors().len(), 1);
        assert!(result.errors()[0].contains("Invalid validation pattern"));
    }

    #[test]
    fn one_bad_field_does_not_hide_others() {
        let store = store(json!({
            "organization": {
                "contact": {"digital": {"email": "nope"}},
                "policies": {"classification": "Top Secret"}
            },
            "validation": {"required_fields": ["organization.profile.name"]}
        }));
        let result = store.validate();
        assert_eq!(result.errors().len(), 3);
    }

    #[test]
    fn rules_are_read_fresh_each_call() {
        let mut store = store(json!({}));
        assert!(store.validate().is_valid());
        store
            .set("validation.required_fields", vec!["organization.profile.name"])
            .unwrap();
        assert!(!store.validate().is_valid());
        store.set("organization.profile.name", "Acme").unwrap();
        assert!(store.validate().is_valid());
    }

    #[test]
    fn caller_supplied_rules() {
        let store = store(json!({"a": {"b": ""}}));
        let mut rules = RuleSet::default();
        rules.push(ValidationRule::Required { path: "a.b".into() });
        let result = store.validate_with(&rules, &FieldCatalog::default());
        assert_eq!(result.errors(), ["Required field missing: a.b".to_string()]);
    }

    #[test]
    fn email_shapes() {
        assert!(is_email("hr@acme.co.uk"));
        assert!(!is_email("not-an-email"));
        assert!(!is_email("a@b"));
        assert!(!is_email("@acme.test"));
        assert!(!is_email("hr@@acme.test"));
        assert!(!is_email("hr@.test"));
        assert!(is_email("first.last@mail.acme.test"));
        assert!(is_phone("+971501234567"));
        assert!(!is_phone("+12"));
    }
}
