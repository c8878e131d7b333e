//! User notes that steer content generation.
//!
//! Two plain-text files live under `notes/`: general notes shared in spirit
//! across manuals and notes specific to this manual. Lines starting with `#`
//! are comments.

use std::path::{Path, PathBuf};

use folio_types::{atomic, FolioError, Result};

const GENERAL_FILE: &str = "general_notes.txt";
const MANUAL_FILE: &str = "manual_specific_notes.txt";

const GENERAL_TEMPLATE: &str = "\
# General notes for all manuals
# Used as context for every section generated in this project.
#
# Worth including:
# - company values and mission
# - organisational structure
# - compliance requirements common to all departments
# - executive decisions or meeting outcomes that affect every policy
#
# Lines starting with # are ignored. Write your notes below.

";

/// Notes read from a project's `notes/` directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Notes {
    pub general: String,
    pub manual: String,
}

impl Notes {
    /// Create the two note templates if they do not exist yet. Existing files
    /// are never overwritten.
    pub fn ensure_templates(notes_dir: &Path, manual_description: &str) -> Result<()> {
        std::fs::create_dir_all(notes_dir).map_err(|source| FolioError::Persistence {
            path: notes_dir.to_path_buf(),
            source,
        })?;

        let manual_template = format!(
            "\
# Notes specific to: {manual_description}
# Used only for this manual.
#
# Worth including:
# - subject matter expert input
# - department procedures and industry requirements
# - regulatory details for this policy area
#
# Lines starting with # are ignored. Write your notes below.

"
        );
        for (name, body) in [(GENERAL_FILE, GENERAL_TEMPLATE), (MANUAL_FILE, manual_template.as_str())] {
            let path = notes_dir.join(name);
            if !path.exists() {
                atomic::write_atomic(&path, body.as_bytes())?;
                tracing::info!(path = %path.display(), "Created notes template");
            }
        }
        Ok(())
    }

    /// Read both files with comment lines stripped. Missing files read as
    /// empty.
    pub fn read(notes_dir: &Path) -> Result<Self> {
        Ok(Self {
            general: read_stripped(&notes_dir.join(GENERAL_FILE))?,
            manual: read_stripped(&notes_dir.join(MANUAL_FILE))?,
        })
    }

    pub fn paths(notes_dir: &Path) -> [PathBuf; 2] {
        [notes_dir.join(GENERAL_FILE), notes_dir.join(MANUAL_FILE)]
    }

    pub fn is_empty(&self) -> bool {
        self.general.is_empty() && self.manual.is_empty()
    }

    /// Prompt block for the non-empty notes; empty when there are none.
    pub fn prompt_context(&self) -> String {
        let mut out = String::new();
        if !self.general.is_empty() {
            out.push_str("General organisational notes:\n");
            out.push_str(&self.general);
            out.push_str("\n\n");
        }
        if !self.manual.is_empty() {
            out.push_str("Notes for this manual:\n");
            out.push_str(&self.manual);
            out.push_str("\n\n");
        }
        out
    }
}

fn read_stripped(path: &Path) -> Result<String> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(String::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(text
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string())
}
