//! Where workspace and project files live.
//!
//! ```text
//! <workspace>/
//!   company.yaml          company configuration
//!   variables.json        shared variable registry
//!   organogram.json       roles, responsibilities, manual catalogue
//!   <slug>_project/
//!     status.json
//!     sections.json
//!     notes/general_notes.txt
//!     notes/manual_specific_notes.txt
//! ```

use std::path::{Path, PathBuf};

use folio_types::{FolioError, Result, Stage};

use crate::sections::SectionSet;
use crate::status::{ProjectStatus, StatusStore};
use crate::variables::VariableStore;

const PROJECT_SUFFIX: &str = "_project";
const SLUG_MAX: usize = 30;

/// Project name derived from a manual description: alphanumerics and
/// whitespace kept, whitespace runs joined with `_`, lower case, at most 30
/// characters.
pub fn project_slug(description: &str) -> String {
    let kept: String = description
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || c.is_whitespace())
        .collect();
    kept.split_whitespace()
        .collect::<Vec<_>>()
        .join("_")
        .to_lowercase()
        .chars()
        .take(SLUG_MAX)
        .collect()
}

// ---------------------------------------------------------------------------
// Workspace
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config_path: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config_path: root.join("company.yaml"),
            root,
        }
    }

    /// Use a config file other than `<root>/company.yaml`.
    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = path.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn variables_path(&self) -> PathBuf {
        self.root.join("variables.json")
    }

    pub fn organogram_path(&self) -> PathBuf {
        self.root.join("organogram.json")
    }

    pub fn variables(&self) -> Result<VariableStore> {
        VariableStore::load(self.variables_path())
    }

    /// Layout for a project given its name (`hr_policies`) or directory name
    /// (`hr_policies_project`).
    pub fn project(&self, name: &str) -> ProjectLayout {
        let name = name.trim_end_matches('/');
        let name = name.strip_suffix(PROJECT_SUFFIX).unwrap_or(name);
        ProjectLayout {
            name: name.to_string(),
            dir: self.root.join(format!("{name}{PROJECT_SUFFIX}")),
        }
    }

    /// Layout for the project a manual description maps to.
    pub fn project_for(&self, description: &str) -> Result<ProjectLayout> {
        let slug = project_slug(description);
        if slug.is_empty() {
            return Err(FolioError::Validation(format!(
                "manual description '{description}' yields an empty project name"
            )));
        }
        Ok(self.project(&slug))
    }

    /// Projects in the workspace, sorted by name, optionally only those at
    /// `stage`. Archived projects are not listed.
    pub fn list_projects(&self, stage: Option<Stage>) -> Result<Vec<ProjectSummary>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut out = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(dir_name) = file_name.to_str() else {
                continue;
            };
            if !dir_name.ends_with(PROJECT_SUFFIX) {
                continue;
            }
            let layout = self.project(dir_name);
            let summary = match layout.status_store().load() {
                Ok(status) => ProjectSummary {
                    layout,
                    status,
                    error: None,
                },
                Err(e) => {
                    tracing::warn!(project = %layout.name(), error = %e, "Unreadable project status");
                    ProjectSummary {
                        layout,
                        status: None,
                        error: Some(e.to_string()),
                    }
                }
            };
            if stage.is_none() || summary.stage() == stage {
                out.push(summary);
            }
        }
        out.sort_by(|a, b| a.layout.name.cmp(&b.layout.name));
        Ok(out)
    }

    /// Rename a project directory to `<name>_completed_<YYYYmmdd_HHMMSS>`.
    /// Returns the new location.
    pub fn archive(&self, project: &ProjectLayout) -> Result<PathBuf> {
        if !project.dir.is_dir() {
            return Err(FolioError::NotFound(format!("project '{}'", project.name)));
        }
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let target = self.root.join(format!("{}_completed_{stamp}", project.name));
        std::fs::rename(&project.dir, &target).map_err(|source| FolioError::Persistence {
            path: target.clone(),
            source,
        })?;
        tracing::info!(project = %project.name, to = %target.display(), "Project archived");
        Ok(target)
    }
}

// ---------------------------------------------------------------------------
// ProjectLayout
// ---------------------------------------------------------------------------

/// File locations of one project.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectLayout {
    name: String,
    dir: PathBuf,
}

impl ProjectLayout {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn status_path(&self) -> PathBuf {
        self.dir.join("status.json")
    }

    pub fn sections_path(&self) -> PathBuf {
        self.dir.join("sections.json")
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.dir.join("notes")
    }

    pub fn status_store(&self) -> StatusStore {
        StatusStore::new(self.status_path(), &self.name)
    }

    pub fn load_sections(&self) -> Result<SectionSet> {
        SectionSet::load(&self.sections_path())
    }

    pub fn save_sections(&self, sections: &SectionSet) -> Result<()> {
        sections.save(&self.sections_path())
    }

    /// Create the project directory if needed.
    pub fn create(&self) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|source| FolioError::Persistence {
            path: self.dir.clone(),
            source,
        })
    }
}

/// One project as seen by [`Workspace::list_projects`].
#[derive(Debug, Clone)]
pub struct ProjectSummary {
    pub layout: ProjectLayout,
    /// `None` when the project has no status yet or it could not be read.
    pub status: Option<ProjectStatus>,
    pub error: Option<String>,
}

impl ProjectSummary {
    pub fn stage(&self) -> Option<Stage> {
        self.status.as_ref().map(|s| s.stage)
    }
}
