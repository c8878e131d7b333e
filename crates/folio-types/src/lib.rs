//! Shared types, errors, and persistence helpers for the Folio manual pipeline.
//!
//! This crate provides the foundational types used across all other Folio crates:
//! - `FolioError`: unified error taxonomy
//! - `Stage`: the four ordered pipeline stages
//! - `SectionUnit` / `SectionStatus`: one unit of work and its lifecycle
//! - `Variable`: a named placeholder value produced during initiation
//! - [`atomic`]: write-to-temp-then-rename file persistence

pub mod atomic;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Unified error type for all Folio subsystems.
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    // === Generation Errors ===
    #[error("Generation service at {endpoint} unreachable: {message}")]
    Connectivity {
        endpoint: String,
        message: String,
        retryable: bool,
    },

    #[error("Request to {endpoint} timed out after {timeout_ms}ms")]
    Timeout { endpoint: String, timeout_ms: u64 },

    #[error("Generation service at {endpoint} returned no content")]
    EmptyResponse { endpoint: String },

    // === Parse Errors ===
    #[error("Failed to parse {what}: {message}")]
    Parse { what: String, message: String },

    // === Store Errors ===
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Cannot store value at '{path}': {message}")]
    Unrepresentable { path: String, message: String },

    #[error("Not found: {0}")]
    NotFound(String),

    // === Persistence Errors ===
    #[error("Failed to write {}: {source}", .path.display())]
    Persistence {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Corrupt state file {}: {message}", .path.display())]
    CorruptState { path: PathBuf, message: String },

    // === Stage Errors ===
    #[error("Invalid stage transition from {from} to {to}: {reason}")]
    InvalidTransition {
        from: String,
        to: Stage,
        reason: String,
    },

    // === Generic ===
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("{0}")]
    Other(String),
}

/// Coarse classification of a [`FolioError`], used by callers to decide
/// between retrying, reporting, and aborting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Connectivity,
    Parse,
    Validation,
    Persistence,
    InvalidTransition,
    Other,
}

impl FolioError {
    /// Returns `true` if the error is transient and the operation may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FolioError::Timeout { .. } | FolioError::Connectivity { retryable: true, .. }
        )
    }

    /// Returns `true` if the error is permanent and retrying will not help.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            FolioError::Validation(_)
                | FolioError::InvalidTransition { .. }
                | FolioError::Unrepresentable { .. }
                | FolioError::CorruptState { .. }
                | FolioError::Connectivity {
                    retryable: false,
                    ..
                }
        )
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            FolioError::Connectivity { .. }
            | FolioError::Timeout { .. }
            | FolioError::EmptyResponse { .. } => ErrorKind::Connectivity,
            FolioError::Parse { .. } | FolioError::Json(_) => ErrorKind::Parse,
            FolioError::Validation(_) | FolioError::Unrepresentable { .. } => ErrorKind::Validation,
            FolioError::Persistence { .. } | FolioError::CorruptState { .. } | FolioError::Io(_) => {
                ErrorKind::Persistence
            }
            FolioError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            FolioError::NotFound(_) | FolioError::Other(_) => ErrorKind::Other,
        }
    }

    /// Shorthand for a [`FolioError::Parse`] error.
    pub fn parse(what: impl Into<String>, message: impl fmt::Display) -> Self {
        FolioError::Parse {
            what: what.into(),
            message: message.to_string(),
        }
    }
}

/// A convenience alias for `Result<T, FolioError>`.
pub type Result<T> = std::result::Result<T, FolioError>;

// ---------------------------------------------------------------------------
// Stage: the four ordered pipeline phases
// ---------------------------------------------------------------------------

/// One of the four ordered pipeline stages.
///
/// Serialized as its ordinal (`1..=4`). Older status files wrote textual stage
/// names, which are still accepted on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "StageRepr", into = "u8")]
pub enum Stage {
    Initiate = 1,
    Expand = 2,
    Generate = 3,
    Render = 4,
}

impl Stage {
    pub const ALL: [Stage; 4] = [Stage::Initiate, Stage::Expand, Stage::Generate, Stage::Render];

    pub fn ordinal(self) -> u8 {
        self as u8
    }

    pub fn from_ordinal(ordinal: u8) -> Option<Stage> {
        match ordinal {
            1 => Some(Stage::Initiate),
            2 => Some(Stage::Expand),
            3 => Some(Stage::Generate),
            4 => Some(Stage::Render),
            _ => None,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<Stage> {
        Stage::from_ordinal(self.ordinal() + 1)
    }

    /// The stage that must be completed before this one may be entered.
    pub fn predecessor(self) -> Option<Stage> {
        self.ordinal().checked_sub(1).and_then(Stage::from_ordinal)
    }

    /// Machine name written to `stage_name` in status files.
    pub fn name(self) -> &'static str {
        match self {
            Stage::Initiate => "project_initiation",
            Stage::Expand => "project_expansion",
            Stage::Generate => "content_generation",
            Stage::Render => "document_generation",
        }
    }

    fn from_name(name: &str) -> Option<Stage> {
        match name.trim().to_ascii_lowercase().as_str() {
            "1" | "initiate" | "initialization" | "project_initiation" | "project_initialized" => {
                Some(Stage::Initiate)
            }
            "2" | "expand" | "expansion" | "project_expansion" => Some(Stage::Expand),
            "3" | "generate" | "generating_content" | "content_generation" => {
                Some(Stage::Generate)
            }
            "4" | "render" | "document_generation" => Some(Stage::Render),
            _ => None,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stage {} ({})", self.ordinal(), self.name())
    }
}

impl From<Stage> for u8 {
    fn from(stage: Stage) -> u8 {
        stage.ordinal()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum StageRepr {
    Ordinal(u8),
    Name(String),
}

impl TryFrom<StageRepr> for Stage {
    type Error = String;

    fn try_from(repr: StageRepr) -> std::result::Result<Self, Self::Error> {
        match repr {
            StageRepr::Ordinal(n) => {
                Stage::from_ordinal(n).ok_or_else(|| format!("stage ordinal {n} out of range 1..=4"))
            }
            StageRepr::Name(name) => {
                Stage::from_name(&name).ok_or_else(|| format!("unknown stage name '{name}'"))
            }
        }
    }
}

// ---------------------------------------------------------------------------
// SectionUnit: one section of the manual
// ---------------------------------------------------------------------------

/// Lifecycle of a section's content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SectionStatus {
    #[default]
    Pending,
    Generated,
    Refined,
}

impl SectionStatus {
    pub fn is_pending(self) -> bool {
        self == SectionStatus::Pending
    }
}

impl fmt::Display for SectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SectionStatus::Pending => "pending",
            SectionStatus::Generated => "generated",
            SectionStatus::Refined => "refined",
        };
        f.write_str(s)
    }
}

/// One numbered section of a manual.
///
/// `number` is a dotted hierarchical string (`"2"`, `"2.1"`, `"2.1.3"`); its
/// dot-count encodes the depth. Only `number` and `title` are required when
/// loading; every other field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionUnit {
    pub number: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub status: SectionStatus,
    #[serde(default)]
    pub word_count: usize,
    #[serde(default)]
    pub review_notes: String,
    #[serde(default)]
    pub needs_revision: bool,
}

impl SectionUnit {
    pub fn new(
        number: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            number: number.into(),
            title: title.into(),
            description: description.into(),
            content: String::new(),
            status: SectionStatus::Pending,
            word_count: 0,
            review_notes: String::new(),
            needs_revision: false,
        }
    }

    /// Nesting depth: `"1"` is 1, `"1.2"` is 2.
    pub fn depth(&self) -> usize {
        self.number.matches('.').count() + 1
    }

    /// Record freshly generated content. Never moves a refined unit back.
    pub fn record_generated(&mut self, content: impl Into<String>) {
        self.set_content(content.into());
        if self.status == SectionStatus::Pending {
            self.status = SectionStatus::Generated;
        }
    }

    /// Record revised content after review. The review notes it addressed
    /// are cleared.
    pub fn record_refined(&mut self, content: impl Into<String>) {
        self.set_content(content.into());
        self.status = SectionStatus::Refined;
        self.needs_revision = false;
        self.review_notes.clear();
    }

    /// Append a reviewer suggestion unless the notes already hold it.
    pub fn add_review_note(&mut self, suggestion: &str) {
        let suggestion = suggestion.trim();
        if suggestion.is_empty() || self.review_notes.lines().any(|l| l.trim() == suggestion) {
            return;
        }
        if !self.review_notes.is_empty() {
            self.review_notes.push('\n');
        }
        self.review_notes.push_str(suggestion);
    }

    /// Replace the content on behalf of a user. This is the only path that may
    /// move a unit back to `Pending` (when the content is cleared).
    pub fn apply_user_edit(&mut self, content: impl Into<String>) {
        self.set_content(content.into());
        self.status = if self.content.trim().is_empty() {
            SectionStatus::Pending
        } else {
            SectionStatus::Generated
        };
    }

    fn set_content(&mut self, content: String) {
        self.word_count = count_words(&content);
        self.content = content;
    }
}

/// Whitespace-delimited word count.
pub fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}

// ---------------------------------------------------------------------------
// Variable: a named placeholder value
// ---------------------------------------------------------------------------

/// Where a variable's current value came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableOrigin {
    #[default]
    Generated,
    Organogram,
    User,
}

/// A named placeholder produced during initiation and consumed by later stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub default_value: String,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub origin: VariableOrigin,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_manual: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub added_date: Option<String>,
}

fn default_category() -> String {
    "general".into()
}

impl Variable {
    pub fn new(
        description: impl Into<String>,
        default_value: impl Into<String>,
        category: impl Into<String>,
    ) -> Self {
        Self {
            description: description.into(),
            default_value: default_value.into(),
            category: category.into(),
            origin: VariableOrigin::Generated,
            source_manual: None,
            added_date: None,
        }
    }

    pub fn with_origin(mut self, origin: VariableOrigin) -> Self {
        self.origin = origin;
        self
    }
}

/// The bracketed marker form a variable name takes in generated prose:
/// `COMPANY_NAME` becomes `[COMPANY NAME]`.
pub fn marker_for(name: &str) -> String {
    format!("[{}]", name.to_uppercase().replace('_', " "))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_is_retryable() {
        let err = FolioError::Connectivity {
            endpoint: "http://localhost:1234".into(),
            message: "connection refused".into(),
            retryable: true,
        };
        assert!(err.is_retryable());
        assert!(!err.is_terminal());
        assert_eq!(err.kind(), ErrorKind::Connectivity);

        let err = FolioError::Timeout {
            endpoint: "x".into(),
            timeout_ms: 120_000,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn error_is_terminal() {
        let err = FolioError::InvalidTransition {
            from: Stage::Initiate.to_string(),
            to: Stage::Generate,
            reason: "skips a stage".into(),
        };
        assert!(err.is_terminal());
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn persistence_error_displays_path() {
        let err = FolioError::Persistence {
            path: PathBuf::from("/tmp/status.json"),
            source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        };
        assert!(err.to_string().contains("/tmp/status.json"));
        assert_eq!(err.kind(), ErrorKind::Persistence);
    }

    #[test]
    fn stage_ordering_and_neighbours() {
        assert!(Stage::Initiate < Stage::Render);
        assert_eq!(Stage::Initiate.next(), Some(Stage::Expand));
        assert_eq!(Stage::Render.next(), None);
        assert_eq!(Stage::Initiate.predecessor(), None);
        assert_eq!(Stage::Generate.predecessor(), Some(Stage::Expand));
    }

    #[test]
    fn stage_serializes_as_ordinal() {
        assert_eq!(serde_json::to_string(&Stage::Generate).unwrap(), "3");
        let s: Stage = serde_json::from_str("2").unwrap();
        assert_eq!(s, Stage::Expand);
    }

    #[test]
    fn stage_accepts_legacy_names() {
        let s: Stage = serde_json::from_str("\"initialization\"").unwrap();
        assert_eq!(s, Stage::Initiate);
        let s: Stage = serde_json::from_str("\"project_expansion\"").unwrap();
        assert_eq!(s, Stage::Expand);
        assert!(serde_json::from_str::<Stage>("7").is_err());
        assert!(serde_json::from_str::<Stage>("\"bogus\"").is_err());
    }

    #[test]
    fn section_depth_from_dots() {
        assert_eq!(SectionUnit::new("1", "Intro", "").depth(), 1);
        assert_eq!(SectionUnit::new("2.1", "Scope", "").depth(), 2);
        assert_eq!(SectionUnit::new("2.1.3", "Detail", "").depth(), 3);
    }

    #[test]
    fn section_loads_with_only_required_fields() {
        let unit: SectionUnit =
            serde_json::from_str(r#"{"number": "1", "title": "Purpose"}"#).unwrap();
        assert_eq!(unit.status, SectionStatus::Pending);
        assert!(unit.content.is_empty());
        assert!(!unit.needs_revision);
    }

    #[test]
    fn status_never_regresses_on_generation() {
        let mut unit = SectionUnit::new("1", "Purpose", "");
        unit.record_generated("one two three");
        assert_eq!(unit.status, SectionStatus::Generated);
        assert_eq!(unit.word_count, 3);

        unit.record_refined("one two three four");
        assert_eq!(unit.status, SectionStatus::Refined);

        unit.record_generated("again");
        assert_eq!(unit.status, SectionStatus::Refined);
    }

    #[test]
    fn review_notes_skip_repeats_and_clear_on_refine() {
        let mut unit = SectionUnit::new("2", "Leave", "");
        unit.record_generated("draft");
        unit.add_review_note("Name the approver");
        unit.add_review_note("Name the approver ");
        unit.add_review_note("Give a deadline");
        assert_eq!(unit.review_notes, "Name the approver\nGive a deadline");

        unit.record_refined("revised");
        assert!(unit.review_notes.is_empty());
    }

    #[test]
    fn user_edit_may_reset_to_pending() {
        let mut unit = SectionUnit::new("1", "Purpose", "");
        unit.record_refined("text");
        unit.apply_user_edit("   ");
        assert_eq!(unit.status, SectionStatus::Pending);
        assert_eq!(unit.word_count, 0);
    }

    #[test]
    fn marker_uses_upper_case_with_spaces() {
        assert_eq!(marker_for("company_name"), "[COMPANY NAME]");
        assert_eq!(marker_for("HR_MANAGER_EMAIL"), "[HR MANAGER EMAIL]");
    }

    #[test]
    fn variable_defaults_on_load() {
        let v: Variable = serde_json::from_str(r#"{"default_value": "Acme"}"#).unwrap();
        assert_eq!(v.category, "general");
        assert_eq!(v.origin, VariableOrigin::Generated);
        assert!(v.source_manual.is_none());
    }
}
