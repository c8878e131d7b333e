//! Explicit field declarations for the company profile.
//!
//! Each known path carries its kind, description, and display category as
//! data. Field semantics are never inferred from the shape of the path name.

use serde::Serialize;
use serde_json::Value;

use crate::store::ConfigStore;
use crate::validation::RuleSet;

/// The value kind a field holds. Drives domain validation and editing hints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "options")]
pub enum FieldKind {
    Text,
    Email,
    Phone,
    Url,
    Boolean,
    /// A calendar day written as `Month DD`.
    Date,
    Choice(Vec<String>),
}

/// Declaration of one configuration path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub path: String,
    pub label: String,
    pub description: String,
    pub category: String,
    pub kind: FieldKind,
}

/// Everything an editor needs to present one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldInfo {
    pub path: String,
    pub value: Option<Value>,
    pub kind: FieldKind,
    pub description: String,
    pub is_required: bool,
    pub allowed_values: Option<Vec<Value>>,
}

/// Ordered table of declared fields.
#[derive(Debug, Clone, Default)]
pub struct FieldCatalog {
    fields: Vec<FieldSpec>,
}

const COMPANY_PROFILE: &str = "Company Profile";
const CONTACT: &str = "Contact Information";
const LEGAL: &str = "Legal & Compliance";
const OPERATIONS: &str = "Operations";
const POLICY: &str = "Policy Settings";

impl FieldCatalog {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Self { fields }
    }

    /// The company-profile fields every manual draws on.
    pub fn standard() -> Self {
        use FieldKind::*;
        let rows: &[(&str, &str, &str, &str, FieldKind)] = &[
            (COMPANY_PROFILE, "organization.profile.name", "Name", "Company display name", Text),
            (COMPANY_PROFILE, "organization.profile.legal_name", "Legal name", "Full legal company name", Text),
            (COMPANY_PROFILE, "organization.profile.short_name", "Short name", "Abbreviated company name", Text),
            (COMPANY_PROFILE, "organization.profile.industry", "Industry", "Primary industry sector", Text),
            (COMPANY_PROFILE, "organization.profile.size", "Size", "Approximate headcount band", Text),
            (CONTACT, "organization.contact.digital.email", "Email", "Primary contact email", Email),
            (CONTACT, "organization.contact.digital.website", "Website", "Public website address", Url),
            (CONTACT, "organization.contact.phone.main", "Main phone", "Main phone number with country code", Phone),
            (CONTACT, "organization.contact.phone.emergency", "Emergency phone", "Emergency contact number with country code", Phone),
            (CONTACT, "organization.contact.address.street", "Street", "Street address", Text),
            (CONTACT, "organization.contact.address.area", "Area", "District or area", Text),
            (CONTACT, "organization.contact.address.city", "City", "City", Text),
            (CONTACT, "organization.contact.address.postal_code", "Postal code", "Postal or ZIP code", Text),
            (CONTACT, "organization.contact.address.country", "Country", "Country", Text),
            (LEGAL, "organization.legal.jurisdiction", "Jurisdiction", "Legal jurisdiction (country/state)", Text),
            (LEGAL, "organization.legal.governing_law", "Governing law", "Law governing company policies", Text),
            (LEGAL, "organization.legal.regulatory_body", "Regulatory body", "Primary regulator", Text),
            (LEGAL, "organization.legal.registration_number", "Registration number", "Company registration number", Text),
            (LEGAL, "organization.legal.tax_id", "Tax ID", "Tax identification number", Text),
            (OPERATIONS, "organization.operations.business_hours.days", "Business days", "Working days (e.g., Monday to Friday)", Text),
            (OPERATIONS, "organization.operations.business_hours.weekdays", "Business hours", "Working hours (e.g., 9:00 AM - 5:00 PM)", Text),
            (OPERATIONS, "organization.operations.business_hours.timezone", "Timezone", "Timezone of business hours", Text),
            (OPERATIONS, "organization.operations.fiscal_year.start", "Fiscal year start", "First day of the fiscal year (Month DD)", Date),
            (OPERATIONS, "organization.operations.fiscal_year.end", "Fiscal year end", "Last day of the fiscal year (Month DD)", Date),
            (OPERATIONS, "organization.operations.fiscal_year.current_year", "Current fiscal year", "Label of the current fiscal year", Text),
            (POLICY, "organization.policies.classification", "Classification", "Default document classification",
                Choice(vec!["Public".into(), "Internal Use".into(), "Confidential".into(), "Restricted".into()])),
            (POLICY, "organization.policies.version_control", "Version control", "Whether manuals carry version history", Boolean),
            (POLICY, "organization.policies.review_cycle", "Review cycle", "How often policies are reviewed", Text),
            (POLICY, "organization.policies.approval_authority", "Approval authority", "Role that approves policies", Text),
        ];

        let fields = rows
            .iter()
            .map(|(category, path, label, description, kind)| FieldSpec {
                path: (*path).into(),
                label: (*label).into(),
                description: (*description).into(),
                category: (*category).into(),
                kind: kind.clone(),
            })
            .collect();
        Self { fields }
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn get(&self, path: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.path == path)
    }

    /// Fields grouped by category, categories in declaration order.
    pub fn categories(&self) -> Vec<(&str, Vec<&FieldSpec>)> {
        let mut groups: Vec<(&str, Vec<&FieldSpec>)> = Vec::new();
        for field in &self.fields {
            match groups.iter_mut().find(|(name, _)| *name == field.category) {
                Some((_, members)) => members.push(field),
                None => groups.push((field.category.as_str(), vec![field])),
            }
        }
        groups
    }

    /// Describe `path` using its declaration and the store's current rules.
    ///
    /// Undeclared paths are treated as text, labelled after their last segment.
    pub fn field_info(&self, store: &ConfigStore, path: &str) -> FieldInfo {
        let rules = RuleSet::from_section(store.get("validation"));
        let declared = self.get(path);

        let allowed_values = rules.allowed_values(path).map(<[Value]>::to_vec).or_else(|| {
            match declared.map(|f| &f.kind) {
                Some(FieldKind::Choice(options)) => {
                    Some(options.iter().map(|o| Value::String(o.clone())).collect())
                }
                _ => None,
            }
        });

        FieldInfo {
            path: path.to_string(),
            value: store.get(path).cloned(),
            kind: declared.map(|f| f.kind.clone()).unwrap_or(FieldKind::Text),
            description: declared
                .map(|f| f.description.clone())
                .unwrap_or_else(|| label_from_path(path)),
            is_required: rules.is_required(path),
            allowed_values,
        }
    }
}

/// `organization.policies.review_cycle` becomes `Review Cycle`.
fn label_from_path(path: &str) -> String {
    let last = path.rsplit('.').next().unwrap_or(path);
    last.split('_')
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
