//! The ordered section collection of a manual (`sections.json`).

use std::cmp::Ordering;
use std::collections::HashSet;
use std::path::Path;

use folio_types::{atomic, FolioError, Result, SectionUnit};

/// Fields a user may change on an existing section. `None` leaves the field
/// as it is.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionEdit {
    pub title: Option<String>,
    pub description: Option<String>,
    pub content: Option<String>,
}

/// Ordered, uniquely numbered sections.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SectionSet {
    units: Vec<SectionUnit>,
}

impl SectionSet {
    /// Build from units in document order. Numbers must be unique and
    /// non-empty.
    pub fn new(units: Vec<SectionUnit>) -> Result<Self> {
        check_numbers(&units).map_err(FolioError::Validation)?;
        Ok(Self { units })
    }

    /// Load from disk. A missing file is an empty set; duplicate numbers mean
    /// the file was damaged.
    pub fn load(path: &Path) -> Result<Self> {
        let units: Vec<SectionUnit> = atomic::read_json(path)?.unwrap_or_default();
        check_numbers(&units).map_err(|message| FolioError::CorruptState {
            path: path.to_path_buf(),
            message,
        })?;
        Ok(Self { units })
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        atomic::write_json(path, &self.units)
    }

    pub fn units(&self) -> &[SectionUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn get(&self, number: &str) -> Option<&SectionUnit> {
        self.units.iter().find(|u| u.number == number)
    }

    pub fn get_mut(&mut self, number: &str) -> Option<&mut SectionUnit> {
        self.units.iter_mut().find(|u| u.number == number)
    }

    pub fn unit_at(&self, index: usize) -> Option<&SectionUnit> {
        self.units.get(index)
    }

    pub fn unit_at_mut(&mut self, index: usize) -> Option<&mut SectionUnit> {
        self.units.get_mut(index)
    }

    /// Index of the first pending unit, or `len()` when none is pending.
    pub fn resume_index(&self) -> usize {
        self.units
            .iter()
            .position(|u| u.status.is_pending())
            .unwrap_or(self.units.len())
    }

    /// Units whose content has been produced.
    pub fn completed_count(&self) -> usize {
        self.units.iter().filter(|u| !u.status.is_pending()).count()
    }

    pub fn total_words(&self) -> usize {
        self.units.iter().map(|u| u.word_count).sum()
    }

    pub fn needing_revision(&self) -> impl Iterator<Item = &SectionUnit> {
        self.units.iter().filter(|u| u.needs_revision)
    }

    /// Insert a new unit at its position in numeric order (`2.1` lands after
    /// `2` and before `2.2`).
    pub fn add(&mut self, unit: SectionUnit) -> Result<()> {
        if unit.number.trim().is_empty() {
            return Err(FolioError::Validation("section number must not be empty".into()));
        }
        if self.get(&unit.number).is_some() {
            return Err(FolioError::Validation(format!(
                "section {} already exists",
                unit.number
            )));
        }
        let at = self
            .units
            .iter()
            .position(|u| compare_numbers(&u.number, &unit.number) == Ordering::Greater)
            .unwrap_or(self.units.len());
        self.units.insert(at, unit);
        Ok(())
    }

    /// Apply a user edit. A content edit goes through
    /// [`SectionUnit::apply_user_edit`], the one path that may send a unit
    /// back to pending.
    pub fn update(&mut self, number: &str, edit: SectionEdit) -> Result<&SectionUnit> {
        let unit = self
            .get_mut(number)
            .ok_or_else(|| FolioError::NotFound(format!("section {number}")))?;
        if let Some(title) = edit.title {
            unit.title = title;
        }
        if let Some(description) = edit.description {
            unit.description = description;
        }
        if let Some(content) = edit.content {
            unit.apply_user_edit(content);
        }
        Ok(unit)
    }

    pub fn remove(&mut self, number: &str) -> Result<SectionUnit> {
        let at = self
            .units
            .iter()
            .position(|u| u.number == number)
            .ok_or_else(|| FolioError::NotFound(format!("section {number}")))?;
        Ok(self.units.remove(at))
    }
}

fn check_numbers(units: &[SectionUnit]) -> std::result::Result<(), String> {
    let mut seen = HashSet::new();
    for unit in units {
        if unit.number.trim().is_empty() {
            return Err(format!("section '{}' has an empty number", unit.title));
        }
        if !seen.insert(unit.number.as_str()) {
            return Err(format!("duplicate section number {}", unit.number));
        }
    }
    Ok(())
}

/// Segment-wise numeric comparison of dotted numbers. Non-numeric segments
/// sort after numeric ones.
fn compare_numbers(a: &str, b: &str) -> Ordering {
    let key = |s: &str| -> Vec<u64> {
        s.split('.')
            .map(|seg| seg.trim().parse().unwrap_or(u64::MAX))
            .collect()
    };
    key(a).cmp(&key(b))
}
