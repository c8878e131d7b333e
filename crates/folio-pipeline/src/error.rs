use folio_types::FolioError;

/// A stage run that stopped on an error, with how far it got.
///
/// `units_advanced` counts units whose new state was persisted before the
/// failure. Zero means nothing changed on disk and the run can simply be
/// repeated.
#[derive(Debug, thiserror::Error)]
#[error("{source} ({units_advanced} unit(s) advanced before the failure)")]
pub struct RunError {
    pub units_advanced: usize,
    #[source]
    pub source: FolioError,
}

impl RunError {
    pub fn new(units_advanced: usize, source: FolioError) -> Self {
        Self {
            units_advanced,
            source,
        }
    }

    /// Nothing changed; safe to retry.
    pub fn is_clean(&self) -> bool {
        self.units_advanced == 0
    }
}

impl From<FolioError> for RunError {
    fn from(source: FolioError) -> Self {
        Self::new(0, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clean_versus_partial() {
        let clean: RunError = FolioError::Validation("no sections".into()).into();
        assert!(clean.is_clean());

        let partial = RunError::new(3, FolioError::Other("disk full".into()));
        assert!(!partial.is_clean());
        assert!(partial.to_string().contains("3 unit(s) advanced"));
    }
}
