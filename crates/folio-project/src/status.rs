//! Project status persistence and stage transitions.
//!
//! The status record is the authority on where a project stands. It is
//! rewritten atomically after every unit of work and at every stage boundary.
//!
//! Transition rules:
//! - a stage is entered only once its predecessor is completed
//! - `advance` accepts the current stage (a re-save) or the next one, nothing else
//! - a completed earlier stage may be re-entered for editing; later stages keep
//!   their completion flags and are listed in `stale_stages` until they run again
//! - `stage` never decreases except through an explicit [`StatusStore::reset`]

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use folio_types::{atomic, FolioError, Result, Stage};

/// Current on-disk schema. Version 1 files predate per-stage records and are
/// migrated on load.
pub const SCHEMA_VERSION: u32 = 2;

const RESERVED_KEYS: &[&str] = &[
    "schema_version",
    "project_name",
    "stage",
    "stage_name",
    "phase",
    "completed_count",
    "total_count",
    "current_unit",
    "manual_description",
    "created_date",
    "last_updated",
    "stages",
    "stale_stages",
    "revisiting",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    InProgress,
    Completed,
}

/// Progress of one stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageRecord {
    pub stage: Stage,
    pub state: StageState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entered_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
}

/// The persisted status of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatus {
    pub schema_version: u32,
    pub project_name: String,
    pub stage: Stage,
    #[serde(default)]
    pub stage_name: String,
    #[serde(default)]
    pub phase: String,
    #[serde(default, alias = "completed_sections")]
    pub completed_count: usize,
    #[serde(default, alias = "total_sections")]
    pub total_count: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_unit: Option<String>,
    #[serde(default)]
    pub manual_description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
    #[serde(default)]
    pub stages: Vec<StageRecord>,
    /// Later stages whose completed output predates a re-entry into an
    /// earlier stage.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub stale_stages: Vec<Stage>,
    /// Earlier stage currently being revisited, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revisiting: Option<Stage>,
    /// Stage-specific fields (policy type, responsibilities, review data, ...).
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ProjectStatus {
    fn fresh(project_name: &str) -> Self {
        let now = timestamp();
        Self {
            schema_version: SCHEMA_VERSION,
            project_name: project_name.to_string(),
            stage: Stage::Initiate,
            stage_name: Stage::Initiate.name().into(),
            phase: "initializing".into(),
            completed_count: 0,
            total_count: 0,
            current_unit: None,
            manual_description: String::new(),
            created_date: Some(now.clone()),
            last_updated: None,
            stages: vec![StageRecord {
                stage: Stage::Initiate,
                state: StageState::InProgress,
                entered_at: Some(now),
                completed_at: None,
            }],
            stale_stages: Vec::new(),
            revisiting: None,
            extra: Map::new(),
        }
    }

    pub fn state_of(&self, stage: Stage) -> Option<StageState> {
        self.stages.iter().find(|r| r.stage == stage).map(|r| r.state)
    }

    pub fn is_completed(&self, stage: Stage) -> bool {
        self.state_of(stage) == Some(StageState::Completed)
    }

    pub fn is_stale(&self, stage: Stage) -> bool {
        self.stale_stages.contains(&stage)
    }

    /// Stage-specific field stored alongside the typed ones.
    pub fn field(&self, key: &str) -> Option<&Value> {
        self.extra.get(key)
    }

    fn record_mut(&mut self, stage: Stage) -> &mut StageRecord {
        if let Some(i) = self.stages.iter().position(|r| r.stage == stage) {
            return &mut self.stages[i];
        }
        self.stages.push(StageRecord {
            stage,
            state: StageState::InProgress,
            entered_at: Some(timestamp()),
            completed_at: None,
        });
        self.stages.sort_by_key(|r| r.stage);
        let i = self.stages.iter().position(|r| r.stage == stage).unwrap_or(0);
        &mut self.stages[i]
    }
}

// ---------------------------------------------------------------------------
// StatusUpdate: a partial update merged into the persisted record
// ---------------------------------------------------------------------------

/// Fields to merge into the status. Unset fields keep their persisted value.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatusUpdate {
    phase: Option<String>,
    completed_count: Option<usize>,
    total_count: Option<usize>,
    current_unit: Option<Option<String>>,
    manual_description: Option<String>,
    fields: Map<String, Value>,
}

impl StatusUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(mut self, phase: impl Into<String>) -> Self {
        self.phase = Some(phase.into());
        self
    }

    pub fn completed(mut self, n: usize) -> Self {
        self.completed_count = Some(n);
        self
    }

    pub fn total(mut self, n: usize) -> Self {
        self.total_count = Some(n);
        self
    }

    pub fn progress(self, completed: usize, total: usize) -> Self {
        self.completed(completed).total(total)
    }

    pub fn current_unit(mut self, unit: Option<String>) -> Self {
        self.current_unit = Some(unit);
        self
    }

    pub fn manual_description(mut self, description: impl Into<String>) -> Self {
        self.manual_description = Some(description.into());
        self
    }

    /// Set a stage-specific field.
    pub fn field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    fn apply(self, status: &mut ProjectStatus) -> Result<()> {
        if let Some(key) = self.fields.keys().find(|k| RESERVED_KEYS.contains(&k.as_str())) {
            return Err(FolioError::Validation(format!(
                "'{key}' is a typed status field and cannot be set as an extra field"
            )));
        }
        if let Some(phase) = self.phase {
            status.phase = phase;
        }
        if let Some(n) = self.completed_count {
            status.completed_count = n;
        }
        if let Some(n) = self.total_count {
            status.total_count = n;
        }
        if let Some(unit) = self.current_unit {
            status.current_unit = unit;
        }
        if let Some(description) = self.manual_description {
            status.manual_description = description;
        }
        status.extra.extend(self.fields);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// StatusStore
// ---------------------------------------------------------------------------

/// Reads and writes one project's `status.json`.
#[derive(Debug, Clone)]
pub struct StatusStore {
    path: PathBuf,
    project_name: String,
}

impl StatusStore {
    pub fn new(path: impl Into<PathBuf>, project_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            project_name: project_name.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the status. `Ok(None)` means the project has not been started; a
    /// file that exists but cannot be decoded is [`FolioError::CorruptState`].
    pub fn load(&self) -> Result<Option<ProjectStatus>> {
        let Some(raw) = atomic::read_json::<Value>(&self.path)? else {
            return Ok(None);
        };
        let migrated = migrate(raw, &self.project_name);
        serde_json::from_value(migrated)
            .map(Some)
            .map_err(|e| FolioError::CorruptState {
                path: self.path.clone(),
                message: e.to_string(),
            })
    }

    fn load_existing(&self) -> Result<ProjectStatus> {
        self.load()?.ok_or_else(|| {
            FolioError::NotFound(format!("status for project '{}'", self.project_name))
        })
    }

    fn write(&self, status: &mut ProjectStatus) -> Result<()> {
        if status.completed_count > status.total_count {
            return Err(FolioError::Validation(format!(
                "completed count {} exceeds total count {}",
                status.completed_count, status.total_count
            )));
        }
        status.schema_version = SCHEMA_VERSION;
        status.stage_name = status.stage.name().into();
        status.last_updated = Some(timestamp());
        atomic::write_json(&self.path, status)?;
        tracing::debug!(
            path = %self.path.display(),
            stage = status.stage.ordinal(),
            phase = %status.phase,
            completed = status.completed_count,
            total = status.total_count,
            "Status saved"
        );
        Ok(())
    }

    /// Merge `update` into the persisted status and write it.
    ///
    /// Replaying the same update yields the same record apart from
    /// `last_updated`. Nothing is written if the merged record would be invalid.
    pub fn save(&self, update: StatusUpdate) -> Result<ProjectStatus> {
        let mut status = self.load_existing()?;
        update.apply(&mut status)?;
        self.write(&mut status)?;
        Ok(status)
    }

    /// Start stage 1 for a project with no status yet, or re-save stage 1 for
    /// one that is still in it.
    pub fn begin(&self, manual_description: &str) -> Result<ProjectStatus> {
        self.advance(Stage::Initiate)?;
        self.save(StatusUpdate::new().manual_description(manual_description))
    }

    /// Move to `to`, which must be the current stage or the one after it.
    pub fn advance(&self, to: Stage) -> Result<ProjectStatus> {
        let Some(mut status) = self.load()? else {
            if to != Stage::Initiate {
                return Err(FolioError::InvalidTransition {
                    from: "not started".into(),
                    to,
                    reason: format!("a new project must start at {}", Stage::Initiate),
                });
            }
            let mut status = ProjectStatus::fresh(&self.project_name);
            self.write(&mut status)?;
            tracing::info!(project = %self.project_name, "Project started");
            return Ok(status);
        };

        let current = status.stage;
        if to == current {
            // Returning to the current stage ends any revisit of an earlier one.
            if let Some(earlier) = status.revisiting.take() {
                status.phase = format!("{}_resumed", to.name());
                tracing::debug!(project = %self.project_name, from = %earlier, stage = %to, "Revisit ended");
            }
            status.record_mut(to);
            self.write(&mut status)?;
            return Ok(status);
        }

        if Some(to) != current.next() {
            let reason = if to < current {
                "stages only move forward; use re-entry to revisit a completed stage".to_string()
            } else {
                format!("{to} is not the stage after {current}")
            };
            return Err(FolioError::InvalidTransition {
                from: current.to_string(),
                to,
                reason,
            });
        }
        if !status.is_completed(current) {
            return Err(FolioError::InvalidTransition {
                from: current.to_string(),
                to,
                reason: format!("{current} is not completed"),
            });
        }

        status.stage = to;
        status.phase = format!("{}_started", to.name());
        status.current_unit = None;
        status.revisiting = None;
        status.record_mut(to);
        self.write(&mut status)?;
        tracing::info!(project = %self.project_name, stage = %to, "Stage entered");
        Ok(status)
    }

    /// Re-open a completed earlier stage for editing.
    ///
    /// Later stages keep their completion flags; every later stage that has
    /// been entered is added to `stale_stages`.
    pub fn reenter(&self, stage: Stage) -> Result<ProjectStatus> {
        let mut status = self.load_existing()?;
        let current = status.stage;
        if stage == current {
            return self.advance(stage);
        }
        if stage > current || !status.is_completed(stage) {
            return Err(FolioError::InvalidTransition {
                from: current.to_string(),
                to: stage,
                reason: format!("only a completed stage before {current} can be re-entered"),
            });
        }

        let later: Vec<Stage> = status
            .stages
            .iter()
            .filter(|r| r.stage > stage)
            .map(|r| r.stage)
            .collect();
        for s in later {
            if !status.stale_stages.contains(&s) {
                status.stale_stages.push(s);
            }
        }
        status.stale_stages.sort();
        status.revisiting = Some(stage);
        status.phase = format!("revisiting_{}", stage.name());
        self.write(&mut status)?;

        tracing::warn!(
            project = %self.project_name,
            stage = %stage,
            stale = ?status.stale_stages,
            "Re-entered completed stage; output of later stages may be out of date"
        );
        Ok(status)
    }

    /// Enter `stage` by whichever rule applies: start, re-save, advance, or
    /// re-entry.
    pub fn enter(&self, stage: Stage) -> Result<ProjectStatus> {
        match self.load()? {
            Some(status) if stage < status.stage => self.reenter(stage),
            _ => self.advance(stage),
        }
    }

    /// Mark `stage` completed and merge `update`.
    pub fn complete(&self, stage: Stage, update: StatusUpdate) -> Result<ProjectStatus> {
        let mut status = self.load_existing()?;
        if stage > status.stage || status.state_of(stage).is_none() {
            return Err(FolioError::InvalidTransition {
                from: status.stage.to_string(),
                to: stage,
                reason: format!("{stage} has not been entered"),
            });
        }
        update.apply(&mut status)?;

        let record = status.record_mut(stage);
        if record.state != StageState::Completed {
            record.state = StageState::Completed;
            record.completed_at = Some(timestamp());
        }
        status.stale_stages.retain(|s| *s != stage);
        if status.revisiting == Some(stage) {
            status.revisiting = None;
        }
        self.write(&mut status)?;
        tracing::info!(project = %self.project_name, stage = %stage, "Stage completed");
        Ok(status)
    }

    /// Explicitly return the project to the start of stage 1. The only path by
    /// which `stage` decreases.
    pub fn reset(&self) -> Result<ProjectStatus> {
        let previous = self.load_existing()?;
        let mut status = ProjectStatus::fresh(&self.project_name);
        status.manual_description = previous.manual_description;
        status.created_date = previous.created_date;
        status.extra = previous.extra;
        status.phase = "reset".into();
        self.write(&mut status)?;
        tracing::warn!(project = %self.project_name, "Project reset to stage 1");
        Ok(status)
    }
}

fn timestamp() -> String {
    chrono::Local::now().to_rfc3339()
}

// ---------------------------------------------------------------------------
// Schema migration
// ---------------------------------------------------------------------------

/// Bring a version 1 record (no `schema_version`, textual or missing stage,
/// no per-stage records) up to the current schema.
fn migrate(mut raw: Value, project_name: &str) -> Value {
    let Some(obj) = raw.as_object_mut() else {
        return raw;
    };
    let version = obj.get("schema_version").and_then(Value::as_u64).unwrap_or(1);
    if version >= u64::from(SCHEMA_VERSION) {
        return raw;
    }

    if !obj.contains_key("project_name") {
        obj.insert("project_name".into(), json!(project_name));
    }
    let phase = obj
        .get("phase")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let declared = obj
        .get("stage")
        .and_then(|v| serde_json::from_value::<Stage>(v.clone()).ok());
    let (stage, done) = legacy_progress(declared, &phase);

    obj.insert("stage".into(), json!(stage.ordinal()));
    if !obj.contains_key("stages") {
        let records: Vec<StageRecord> = Stage::ALL
            .iter()
            .filter(|s| **s <= stage)
            .map(|s| StageRecord {
                stage: *s,
                state: if *s < stage || done {
                    StageState::Completed
                } else {
                    StageState::InProgress
                },
                entered_at: None,
                completed_at: None,
            })
            .collect();
        obj.insert("stages".into(), json!(records));
    }
    obj.insert("schema_version".into(), json!(SCHEMA_VERSION));
    raw
}

fn legacy_progress(declared: Option<Stage>, phase: &str) -> (Stage, bool) {
    let from_phase = match phase {
        "project_initialized" => Some((Stage::Initiate, true)),
        "stage_2_completed" => Some((Stage::Expand, true)),
        "generating_content" => Some((Stage::Generate, false)),
        "content_generated" | "review_completed" => Some((Stage::Generate, true)),
        "documents_generated" => Some((Stage::Render, true)),
        _ => None,
    };
    match (declared, from_phase) {
        (Some(s), Some((p, done))) if p >= s => (p, done),
        (Some(s), _) => (s, false),
        (None, Some(progress)) => progress,
        (None, None) => (Stage::Initiate, false),
    }
}
