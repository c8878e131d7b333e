//! Organisational structure (`organogram.json`): who is responsible for which
//! kind of policy, and the catalogue of manuals to produce.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use folio_types::{FolioError, Result, Variable, VariableOrigin};

/// Keyword to policy type, checked in order; the first whole-word match wins.
const POLICY_KEYWORDS: &[(&str, &str)] = &[
    ("hr", "hr_policies"),
    ("human resources", "hr_policies"),
    ("employee", "hr_policies"),
    ("personnel", "hr_policies"),
    ("it", "it_security_policies"),
    ("information technology", "it_security_policies"),
    ("cyber", "it_security_policies"),
    ("security", "it_security_policies"),
    ("data protection", "it_security_policies"),
    ("financial", "financial_policies"),
    ("finance", "financial_policies"),
    ("accounting", "financial_policies"),
    ("budget", "financial_policies"),
    ("expense", "financial_policies"),
    ("operational", "operational_policies"),
    ("operations", "operational_policies"),
    ("process", "operational_policies"),
    ("procedure", "operational_policies"),
    ("safety", "safety_policies"),
    ("health", "safety_policies"),
    ("workplace safety", "safety_policies"),
    ("legal", "legal_compliance_policies"),
    ("compliance", "legal_compliance_policies"),
    ("regulatory", "legal_compliance_policies"),
    ("quality", "quality_policies"),
    ("qms", "quality_policies"),
    ("iso", "quality_policies"),
];

const DEFAULT_POLICY_TYPE: &str = "operational_policies";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Role {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Department {
    #[serde(default)]
    pub roles: BTreeMap<String, Role>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponsibilityMatrix {
    /// policy type → role type → role key
    #[serde(default)]
    pub policy_types: BTreeMap<String, BTreeMap<String, String>>,
}

/// One manual in the catalogue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManualSpec {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Organogram {
    #[serde(default)]
    pub departments: BTreeMap<String, Department>,
    #[serde(default)]
    pub responsibility_matrix: ResponsibilityMatrix,
    #[serde(default)]
    pub manuals: BTreeMap<String, ManualSpec>,
}

/// A role resolved to a person, with placeholder text for missing details.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Responsibility {
    pub role_key: String,
    pub title: String,
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// The policy type a manual falls under and who is responsible for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyAssignment {
    pub policy_type: String,
    /// role type (e.g. `owner`, `approver`) → resolved role
    pub responsibilities: BTreeMap<String, Responsibility>,
}

impl Organogram {
    /// Load `path`. A missing file is [`FolioError::NotFound`].
    pub fn load(path: &Path) -> Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(FolioError::NotFound(format!(
                    "organogram {}",
                    path.display()
                )))
            }
            Err(e) => return Err(e.into()),
        };
        serde_json::from_str(&text).map_err(|e| FolioError::parse("organogram", e))
    }

    /// Load `path`, falling back to an empty organogram with a warning when it
    /// is missing or unreadable.
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(org) => org,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Organogram unavailable; no responsibilities assigned");
                Self::default()
            }
        }
    }

    pub fn manual(&self, key: &str) -> Option<&ManualSpec> {
        self.manuals.get(key)
    }

    fn find_role(&self, role_key: &str) -> Option<&Role> {
        self.departments
            .values()
            .find_map(|dept| dept.roles.get(role_key))
    }

    /// Policy type and resolved responsibilities for a manual description.
    /// Role keys absent from every department are left out.
    pub fn assignment(&self, manual_description: &str) -> PolicyAssignment {
        let policy_type = policy_type_for(manual_description);
        let responsibilities = self
            .responsibility_matrix
            .policy_types
            .get(policy_type)
            .into_iter()
            .flatten()
            .filter_map(|(role_type, role_key)| {
                let role = self.find_role(role_key)?;
                Some((
                    role_type.clone(),
                    Responsibility {
                        role_key: role_key.clone(),
                        title: role.title.clone().unwrap_or_else(|| role_key.clone()),
                        name: role.name.clone().unwrap_or_else(|| format!("[{role_key}]")),
                        email: role
                            .email
                            .clone()
                            .unwrap_or_else(|| format!("[{role_key}_EMAIL]")),
                        phone: role
                            .phone
                            .clone()
                            .unwrap_or_else(|| format!("[{role_key}_PHONE]")),
                    },
                ))
            })
            .collect();

        PolicyAssignment {
            policy_type: policy_type.to_string(),
            responsibilities,
        }
    }
}

impl PolicyAssignment {
    /// `{ROLE_TYPE}_NAME` and `{ROLE_TYPE}_EMAIL` variables for every resolved
    /// responsibility.
    pub fn variables(&self) -> BTreeMap<String, Variable> {
        let mut vars = BTreeMap::new();
        for (role_type, r) in &self.responsibilities {
            let prefix = role_type.to_uppercase();
            vars.insert(
                format!("{prefix}_NAME"),
                Variable::new(format!("Name of the {}", r.title), r.name.clone(), "responsibility")
                    .with_origin(VariableOrigin::Organogram),
            );
            vars.insert(
                format!("{prefix}_EMAIL"),
                Variable::new(format!("Email of the {}", r.title), r.email.clone(), "responsibility")
                    .with_origin(VariableOrigin::Organogram),
            );
        }
        vars
    }
}

/// Policy type for a manual description by whole-word keyword match.
pub fn policy_type_for(description: &str) -> &'static str {
    let lowered = description.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    POLICY_KEYWORDS
        .iter()
        .find(|(keyword, _)| {
            let needle: Vec<&str> = keyword.split_whitespace().collect();
            words.windows(needle.len()).any(|w| w == needle.as_slice())
        })
        .map(|(_, policy_type)| *policy_type)
        .unwrap_or(DEFAULT_POLICY_TYPE)
}
