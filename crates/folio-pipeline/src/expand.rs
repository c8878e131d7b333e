//! Stage 2: the user reviews the outline, edits sections, and writes notes.

use folio_project::{Notes, ProjectLayout, ProjectStatus, SectionEdit, SectionSet, StatusUpdate};
use folio_types::{Result, SectionUnit, Stage};

/// An open stage 2 session on one project. Every edit is saved immediately.
#[derive(Debug)]
pub struct ExpandSession {
    layout: ProjectLayout,
    sections: SectionSet,
    status: ProjectStatus,
}

impl ExpandSession {
    /// Enter stage 2 (or re-enter it after a later stage started) and make sure
    /// the note templates exist.
    pub fn open(layout: ProjectLayout) -> Result<Self> {
        let status = layout.status_store().enter(Stage::Expand)?;
        Notes::ensure_templates(&layout.notes_dir(), &status.manual_description)?;
        let sections = layout.load_sections()?;
        tracing::info!(
            project = %layout.name(),
            sections = sections.len(),
            revisiting = status.revisiting.is_some(),
            "Expansion session opened"
        );
        Ok(Self {
            layout,
            sections,
            status,
        })
    }

    pub fn layout(&self) -> &ProjectLayout {
        &self.layout
    }

    pub fn sections(&self) -> &SectionSet {
        &self.sections
    }

    /// The status as of the last write.
    pub fn status(&self) -> &ProjectStatus {
        &self.status
    }

    pub fn notes(&self) -> Result<Notes> {
        Notes::read(&self.layout.notes_dir())
    }

    pub fn add(&mut self, unit: SectionUnit) -> Result<()> {
        let number = unit.number.clone();
        self.sections.add(unit)?;
        self.save()?;
        tracing::info!(section = %number, "Section added");
        Ok(())
    }

    pub fn update(&mut self, number: &str, edit: SectionEdit) -> Result<SectionUnit> {
        let unit = self.sections.update(number, edit)?.clone();
        self.save()?;
        tracing::info!(section = %number, status = ?unit.status, "Section updated");
        Ok(unit)
    }

    pub fn remove(&mut self, number: &str) -> Result<SectionUnit> {
        let unit = self.sections.remove(number)?;
        self.save()?;
        tracing::info!(section = %number, "Section removed");
        Ok(unit)
    }

    /// Mark stage 2 completed. The project is then ready for generation.
    pub fn finalize(self) -> Result<ProjectStatus> {
        let status = self.layout.status_store().complete(
            Stage::Expand,
            StatusUpdate::new()
                .phase("stage_2_completed")
                .progress(self.sections.completed_count(), self.sections.len())
                .field("ready_for_stage_3", true),
        )?;
        tracing::info!(project = %self.layout.name(), "Expansion finalized");
        Ok(status)
    }

    fn save(&mut self) -> Result<()> {
        self.layout.save_sections(&self.sections)?;
        self.status = self.layout.status_store().save(
            StatusUpdate::new().progress(self.sections.completed_count(), self.sections.len()),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use folio_project::Workspace;
    use folio_types::{FolioError, SectionStatus};

    fn initiated(dir: &std::path::Path) -> ProjectLayout {
        let layout = Workspace::new(dir).project("hr");
        layout.create().unwrap();
        let store = layout.status_store();
        store.begin("HR policies").unwrap();
        let sections = SectionSet::new(vec![
            SectionUnit::new("1", "Introduction", "Purpose"),
            SectionUnit::new("2", "Leave", "Entitlements"),
        ])
        .unwrap();
        layout.save_sections(&sections).unwrap();
        store
            .complete(Stage::Initiate, StatusUpdate::new().progress(0, 2))
            .unwrap();
        layout
    }

    #[test]
    fn open_creates_note_templates() {
        let dir = tempfile::tempdir().unwrap();
        let layout = initiated(dir.path());
        let session = ExpandSession::open(layout.clone()).unwrap();
        assert_eq!(session.status().stage, Stage::Expand);
        for path in Notes::paths(&layout.notes_dir()) {
            assert!(path.exists(), "{} missing", path.display());
        }
        assert!(session.notes().unwrap().is_empty());
    }

    #[test]
    fn edits_are_saved_immediately() {
        let dir = tempfile::tempdir().unwrap();
        let layout = initiated(dir.path());
        let mut session = ExpandSession::open(layout.clone()).unwrap();

        session.add(SectionUnit::new("1.1", "Scope", "Who")).unwrap();
        session
            .update(
                "2",
                SectionEdit {
                    title: Some("Annual leave".into()),
                    ..SectionEdit::default()
                },
            )
            .unwrap();
        session.remove("1").unwrap();

        let saved = layout.load_sections().unwrap();
        let numbers: Vec<_> = saved.units().iter().map(|u| u.number.as_str()).collect();
        assert_eq!(numbers, vec!["1.1", "2"]);
        assert_eq!(saved.get("2").unwrap().title, "Annual leave");
        assert_eq!(layout.status_store().load().unwrap().unwrap().total_count, 2);
    }

    #[test]
    fn duplicate_number_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ExpandSession::open(initiated(dir.path())).unwrap();
        let err = session.add(SectionUnit::new("2", "Again", "")).unwrap_err();
        assert!(matches!(err, FolioError::Validation(_)));
    }

    #[test]
    fn finalize_completes_stage() {
        let dir = tempfile::tempdir().unwrap();
        let layout = initiated(dir.path());
        let status = ExpandSession::open(layout).unwrap().finalize().unwrap();
        assert!(status.is_completed(Stage::Expand));
        assert_eq!(status.phase, "stage_2_completed");
        assert_eq!(status.field("ready_for_stage_3"), Some(&serde_json::json!(true)));
    }

    #[test]
    fn content_edit_marks_unit_generated() {
        let dir = tempfile::tempdir().unwrap();
        let mut session = ExpandSession::open(initiated(dir.path())).unwrap();
        let unit = session
            .update(
                "1",
                SectionEdit {
                    content: Some("Written by hand.".into()),
                    ..SectionEdit::default()
                },
            )
            .unwrap();
        assert_ne!(unit.status, SectionStatus::Pending);
        assert_eq!(session.status().completed_count, 1);
    }

    #[test]
    fn cannot_open_before_initiation_completes() {
        let dir = tempfile::tempdir().unwrap();
        let layout = Workspace::new(dir.path()).project("hr");
        layout.create().unwrap();
        layout.status_store().begin("HR").unwrap();
        let err = ExpandSession::open(layout).unwrap_err();
        assert!(matches!(err, FolioError::InvalidTransition { .. }));
    }
}
