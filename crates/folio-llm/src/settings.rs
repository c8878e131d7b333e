use std::time::Duration;

use folio_config::ConfigStore;

pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";
pub const DEFAULT_MODEL: &str = "local-model";

/// Connection settings for the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    /// Extra attempts after the first for retryable failures.
    pub max_retries: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            timeout: Duration::from_secs(120),
            max_retries: 2,
        }
    }
}

impl GenerationSettings {
    /// Read `generation.*` from the store. The flat `lm_studio_url` and
    /// `model_name` keys written by older setups are honoured as fallbacks.
    pub fn from_store(store: &ConfigStore) -> Self {
        let defaults = Self::default();
        let base_url = store.get_string(
            "generation.base_url",
            &store.get_string("lm_studio_url", &defaults.base_url),
        );
        let model = store.get_string(
            "generation.model",
            &store.get_string("model_name", &defaults.model),
        );
        let timeout_secs: u64 = store.get_or("generation.timeout_secs", defaults.timeout.as_secs());
        let max_retries: usize = store.get_or("generation.max_retries", defaults.max_retries);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            timeout: Duration::from_secs(timeout_secs),
            max_retries,
        }
    }

    /// Apply `FOLIO_BASE_URL` and `FOLIO_MODEL` when set.
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(url) = std::env::var("FOLIO_BASE_URL") {
            if !url.trim().is_empty() {
                self.base_url = url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Ok(model) = std::env::var("FOLIO_MODEL") {
            if !model.trim().is_empty() {
                self.model = model.trim().to_string();
            }
        }
        self
    }
}
