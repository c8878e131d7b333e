//! Persistent project state for the Folio pipeline.
//!
//! A project is one manual in progress: a directory holding its status record,
//! its section collection, and its notes. Projects share a workspace with the
//! company configuration, the variable registry, and the organogram.
//!
//! - [`Workspace`] / [`ProjectLayout`]: where everything lives on disk
//! - [`StatusStore`]: stage transitions and progress bookkeeping
//! - [`SectionSet`]: the ordered units of work
//! - [`VariableStore`]: the shared variable registry
//! - [`Organogram`]: roles, responsibilities, and the manual catalog

pub mod layout;
pub mod notes;
pub mod organogram;
pub mod sections;
pub mod status;
pub mod variables;

pub use layout::{project_slug, ProjectLayout, ProjectSummary, Workspace};
pub use notes::Notes;
pub use organogram::{policy_type_for, ManualSpec, Organogram, PolicyAssignment, Responsibility};
pub use sections::{SectionEdit, SectionSet};
pub use status::{
    ProjectStatus, StageRecord, StageState, StatusStore, StatusUpdate, SCHEMA_VERSION,
};
pub use variables::VariableStore;
