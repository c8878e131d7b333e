//! Upper-case convenience variables computed from the company profile.

use std::collections::BTreeMap;

use crate::store::ConfigStore;

/// Variables such as `COMPANY_NAME` and `COMPANY_ADDRESS` derived from the
/// store. Entries whose value would be empty are omitted.
pub fn derived_variables(store: &ConfigStore) -> BTreeMap<String, String> {
    let get = |path: &str| store.get_string(path, "").trim().to_string();
    let mut vars = BTreeMap::new();

    let direct = [
        ("COMPANY_NAME", "organization.profile.name"),
        ("COMPANY_LEGAL_NAME", "organization.profile.legal_name"),
        ("COMPANY_SHORT_NAME", "organization.profile.short_name"),
        ("COMPANY_EMAIL", "organization.contact.digital.email"),
        ("COMPANY_WEBSITE", "organization.contact.digital.website"),
        ("COMPANY_PHONE", "organization.contact.phone.main"),
        ("JURISDICTION", "organization.legal.jurisdiction"),
    ];
    for (name, path) in direct {
        vars.insert(name.to_string(), get(path));
    }

    let emergency = get("organization.contact.phone.emergency");
    vars.insert(
        "EMERGENCY_CONTACT".into(),
        if emergency.is_empty() {
            get("organization.contact.phone.main")
        } else {
            emergency
        },
    );

    vars.insert(
        "COMPANY_ADDRESS".into(),
        join_present(
            &[
                get("organization.contact.address.street"),
                get("organization.contact.address.area"),
                get("organization.contact.address.city"),
                get("organization.contact.address.postal_code"),
                get("organization.contact.address.country"),
            ],
            ", ",
        ),
    );
    vars.insert(
        "BUSINESS_HOURS".into(),
        join_present(
            &[
                get("organization.operations.business_hours.days"),
                get("organization.operations.business_hours.weekdays"),
            ],
            ", ",
        ),
    );

    let (start, end) = (
        get("organization.operations.fiscal_year.start"),
        get("organization.operations.fiscal_year.end"),
    );
    if !start.is_empty() && !end.is_empty() {
        vars.insert("FISCAL_YEAR".into(), format!("{start} to {end}"));
    }

    let classification = get("organization.policies.classification");
    vars.insert(
        "DOCUMENT_CLASSIFICATION".into(),
        if classification.is_empty() {
            "Internal Use".into()
        } else {
            classification
        },
    );
    vars.insert(
        "SCOPE_EMPLOYEES".into(),
        "All employees, contractors, and temporary staff".into(),
    );

    vars.retain(|_, v| !v.is_empty());
    vars
}

fn join_present(parts: &[String], sep: &str) -> String {
    parts
        .iter()
        .filter(|p| !p.is_empty())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(sep)
}
