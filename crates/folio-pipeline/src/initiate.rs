//! Stage 1: create a project from a manual description.
//!
//! Asks the generator for an outline and a variable list, resolves who is
//! responsible for the policy from the organogram, and persists the project.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use folio_llm::{GenerationRequest, SharedGenerator};
use folio_project::{Organogram, PolicyAssignment, ProjectLayout, SectionSet, StatusUpdate, Workspace};
use folio_types::{FolioError, Result, SectionUnit, Stage, Variable};

use crate::events::{EventEmitter, ProgressEvent};
use crate::json::extract_object;
use crate::prompt;

/// Attempts at a usable outline before giving up on a manual.
pub const OUTLINE_ATTEMPTS: usize = 3;

#[derive(Debug, Deserialize)]
struct OutlineEntry {
    number: Option<serde_json::Value>,
    title: Option<String>,
    description: Option<String>,
}

/// Parse an outline reply into sections. Entries missing a number, title, or
/// description are skipped; an outline with nothing usable is a parse error.
pub fn parse_outline(reply: &str) -> Result<Vec<SectionUnit>> {
    let value = extract_object(reply, "table of contents")?;
    let entries = value
        .get("sections")
        .cloned()
        .ok_or_else(|| FolioError::parse("table of contents", "missing 'sections' key"))?;
    let entries: Vec<OutlineEntry> =
        serde_json::from_value(entries).map_err(|e| FolioError::parse("table of contents", e))?;

    let mut units: Vec<SectionUnit> = Vec::new();
    for entry in entries {
        let number = match entry.number {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => String::new(),
        };
        match (number.is_empty(), entry.title, entry.description) {
            (false, Some(title), Some(description)) => {
                if units.iter().any(|u| u.number == number) {
                    tracing::warn!(section = %number, "Skipping duplicate outline entry");
                    continue;
                }
                units.push(SectionUnit::new(number, title.trim(), description.trim()));
            }
            _ => tracing::warn!("Skipping incomplete outline entry"),
        }
    }
    if units.is_empty() {
        return Err(FolioError::parse("table of contents", "no usable sections"));
    }
    Ok(units)
}

#[derive(Debug, Deserialize)]
struct VariableEntry {
    #[serde(default)]
    description: String,
    #[serde(default)]
    default_value: serde_json::Value,
    #[serde(default)]
    category: Option<String>,
}

/// Parse a variables reply into named variables.
pub fn parse_variables(reply: &str) -> Result<BTreeMap<String, Variable>> {
    let value = extract_object(reply, "variables")?;
    let entries = value
        .get("variables")
        .cloned()
        .ok_or_else(|| FolioError::parse("variables", "missing 'variables' key"))?;
    let entries: BTreeMap<String, VariableEntry> =
        serde_json::from_value(entries).map_err(|e| FolioError::parse("variables", e))?;

    Ok(entries
        .into_iter()
        .filter(|(name, _)| !name.trim().is_empty())
        .map(|(name, e)| {
            let default_value = match e.default_value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            let category = e.category.unwrap_or_else(|| "general".into());
            (name.trim().to_string(), Variable::new(e.description, default_value, category))
        })
        .collect())
}

/// What happened to one manual.
#[derive(Debug, Clone, PartialEq)]
pub enum InitiateOutcome {
    Created {
        project: String,
        sections: usize,
        variables: usize,
        /// Set when the variable list could not be produced. The project is
        /// still created, with organogram variables only.
        variables_error: Option<String>,
    },
    /// The project already finished stage 1.
    Skipped { project: String },
}

/// Results of a batch of manuals.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub initialized: Vec<String>,
    pub skipped: Vec<String>,
    /// `(manual description, error)`
    pub failed: Vec<(String, String)>,
}

impl BatchReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs stage 1.
pub struct Initiator {
    generator: SharedGenerator,
    workspace: Workspace,
    organogram: Organogram,
    events: EventEmitter,
}

impl Initiator {
    pub fn new(generator: SharedGenerator, workspace: Workspace, organogram: Organogram) -> Self {
        Self {
            generator,
            workspace,
            organogram,
            events: EventEmitter::default(),
        }
    }

    pub fn with_events(mut self, events: EventEmitter) -> Self {
        self.events = events;
        self
    }

    /// Initiate one manual. A project that already completed stage 1 is
    /// skipped; one left in progress is started over.
    pub async fn initiate(&self, manual_description: &str) -> Result<InitiateOutcome> {
        let layout = self.workspace.project_for(manual_description)?;
        let store = layout.status_store();
        if let Some(status) = store.load()? {
            if status.is_completed(Stage::Initiate) {
                tracing::info!(project = %layout.name(), "Project already exists, skipping");
                return Ok(InitiateOutcome::Skipped {
                    project: layout.name().to_string(),
                });
            }
        }

        layout.create()?;
        store.begin(manual_description)?;
        self.events.emit(ProgressEvent::StageEntered {
            project: layout.name().to_string(),
            stage: Stage::Initiate,
        });

        let assignment = self.organogram.assignment(manual_description);
        store.save(
            StatusUpdate::new()
                .phase("generating_outline")
                .field("policy_type", assignment.policy_type.clone())
                .field(
                    "responsibilities",
                    serde_json::to_value(&assignment.responsibilities)?,
                ),
        )?;

        let units = self.generate_outline(manual_description).await?;
        let sections = SectionSet::new(units)?;
        layout.save_sections(&sections)?;

        let (variables, variables_error) = self.generate_variables(manual_description, &assignment).await;
        let variables_count = self.save_variables(&layout, variables, &assignment)?;

        store.complete(
            Stage::Initiate,
            StatusUpdate::new()
                .phase("project_initialized")
                .progress(0, sections.len())
                .field("variables_count", variables_count),
        )?;
        self.events.emit(ProgressEvent::StageCompleted {
            project: layout.name().to_string(),
            stage: Stage::Initiate,
        });
        tracing::info!(
            project = %layout.name(),
            sections = sections.len(),
            variables = variables_count,
            policy_type = %assignment.policy_type,
            "Project initialized"
        );

        Ok(InitiateOutcome::Created {
            project: layout.name().to_string(),
            sections: sections.len(),
            variables: variables_count,
            variables_error,
        })
    }

    /// Initiate each manual in turn. One manual failing does not stop the
    /// others.
    pub async fn initiate_batch<S: AsRef<str>>(&self, descriptions: &[S]) -> BatchReport {
        let mut report = BatchReport::default();
        for (i, description) in descriptions.iter().enumerate() {
            let description = description.as_ref();
            tracing::info!(index = i + 1, total = descriptions.len(), manual = %description, "Initiating manual");
            match self.initiate(description).await {
                Ok(InitiateOutcome::Created { project, .. }) => report.initialized.push(project),
                Ok(InitiateOutcome::Skipped { project }) => report.skipped.push(project),
                Err(e) => {
                    tracing::warn!(manual = %description, error = %e, "Manual failed");
                    report.failed.push((description.to_string(), e.to_string()));
                }
            }
        }
        report
    }

    /// Resolve organogram manual keys to descriptions; unknown keys become
    /// failures in the returned report.
    pub async fn initiate_catalog<S: AsRef<str>>(&self, keys: &[S]) -> BatchReport {
        let mut descriptions = Vec::new();
        let mut unknown = Vec::new();
        for key in keys {
            match self.organogram.manual(key.as_ref()) {
                Some(spec) => descriptions.push(spec.description.clone()),
                None => unknown.push((
                    key.as_ref().to_string(),
                    format!("manual key '{}' not in organogram", key.as_ref()),
                )),
            }
        }
        let mut report = self.initiate_batch(&descriptions).await;
        report.failed.extend(unknown);
        report
    }

    async fn generate_outline(&self, manual_description: &str) -> Result<Vec<SectionUnit>> {
        let request = GenerationRequest::new(prompt::outline_prompt(manual_description))
            .max_tokens(2500)
            .temperature(0.3);
        let mut last_error = None;
        for attempt in 1..=OUTLINE_ATTEMPTS {
            let result = match self.generator.generate(&request).await {
                Ok(reply) => parse_outline(&reply),
                Err(e) => Err(e),
            };
            match result {
                Ok(units) => return Ok(units),
                Err(e) => {
                    tracing::warn!(attempt, error = %e, "Outline attempt failed");
                    last_error = Some(e);
                }
            }
        }
        Err(last_error.unwrap_or_else(|| FolioError::Other("no outline attempts made".into())))
    }

    async fn generate_variables(
        &self,
        manual_description: &str,
        assignment: &PolicyAssignment,
    ) -> (BTreeMap<String, Variable>, Option<String>) {
        let request = GenerationRequest::new(prompt::variables_prompt(manual_description, assignment))
            .max_tokens(2000)
            .temperature(0.3);
        let result = match self.generator.generate(&request).await {
            Ok(reply) => parse_variables(&reply),
            Err(e) => Err(e),
        };
        match result {
            Ok(vars) => (vars, None),
            Err(e) => {
                tracing::warn!(error = %e, "Variable generation failed; continuing with organogram variables");
                (BTreeMap::new(), Some(e.to_string()))
            }
        }
    }

    fn save_variables(
        &self,
        layout: &ProjectLayout,
        mut variables: BTreeMap<String, Variable>,
        assignment: &PolicyAssignment,
    ) -> Result<usize> {
        variables.extend(assignment.variables());
        let mut store = self.workspace.variables()?;
        let merged = store.merge(variables, layout.name());
        store.save()?;
        Ok(merged)
    }
}

// ---------------------------------------------------------------------------
// Input file
// ---------------------------------------------------------------------------

/// Manual descriptions listed one per line. Blank lines and `#` comments are
/// ignored; a missing file is an empty list.
pub fn read_input_file(path: &Path) -> Result<Vec<String>> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Rewrite the input file with only the manuals still to do.
pub fn write_remaining(path: &Path, remaining: &[String]) -> Result<()> {
    let mut body = remaining.join("\n");
    if !body.is_empty() {
        body.push('\n');
    }
    folio_types::atomic::write_atomic(path, body.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outline_skips_incomplete_entries() {
        let reply = r#"{"sections": [
            {"number": "1", "title": "Introduction", "description": "Why"},
            {"number": "1.1", "title": "Scope"},
            {"number": 2, "title": "Leave", "description": "How"},
            {"number": "1", "title": "Dup", "description": "Again"}
        ]}"#;
        let units = parse_outline(reply).unwrap();
        let numbers: Vec<_> = units.iter().map(|u| u.number.as_str()).collect();
        assert_eq!(numbers, vec!["1", "2"]);
        assert!(units.iter().all(|u| u.status.is_pending()));
    }

    #[test]
    fn outline_without_usable_entries_is_parse_error() {
        let err = parse_outline(r#"{"sections": [{"title": "x"}]}"#).unwrap_err();
        assert!(matches!(err, FolioError::Parse { .. }));
        assert!(parse_outline(r#"{"chapters": []}"#).is_err());
        assert!(parse_outline("Sorry, I can't.").is_err());
    }

    #[test]
    fn variables_parse_with_defaults() {
        let reply = r#"{"variables": {
            "EFFECTIVE_DATE": {"description": "When", "default_value": "[EFFECTIVE DATE]", "category": "policy"},
            "VERSION": {"description": "Doc version", "default_value": 1.0},
            "BARE": {}
        }}"#;
        let vars = parse_variables(reply).unwrap();
        assert_eq!(vars["EFFECTIVE_DATE"].default_value, "[EFFECTIVE DATE]");
        assert_eq!(vars["VERSION"].default_value, "1.0");
        assert_eq!(vars["VERSION"].category, "general");
        assert_eq!(vars["BARE"].description, "");
    }

    #[test]
    fn input_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.txt");
        std::fs::write(&path, "# manuals\nHR policies\n\nIT security\n").unwrap();
        assert_eq!(read_input_file(&path).unwrap(), vec!["HR policies", "IT security"]);

        write_remaining(&path, &["IT security".to_string()]).unwrap();
        assert_eq!(read_input_file(&path).unwrap(), vec!["IT security"]);
        write_remaining(&path, &[]).unwrap();
        assert!(read_input_file(&path).unwrap().is_empty());
        assert!(read_input_file(&dir.path().join("absent.txt")).unwrap().is_empty());
    }
}
