// src/config.rs

use crate::constants::*;
use crate::error::{Result, TutorError};
use crate::retry::RetryPolicy;
use log::{debug, info};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tunables for the progression engine. Every field falls back to the
/// values in `constants.rs` when absent from the config file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct TutorConfig {
    pub pass_threshold: f64,
    pub quiz_sample_size: usize,
    pub require_all_answers: bool,
    pub store: StoreConfig,
    pub database_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub call_timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for TutorConfig {
    fn default() -> Self {
        TutorConfig {
            pass_threshold: PASS_THRESHOLD_PERCENT,
            quiz_sample_size: QUIZ_SAMPLE_SIZE,
            require_all_answers: false,
            store: StoreConfig::default(),
            database_path: None,
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            call_timeout_ms: STORE_CALL_TIMEOUT_MS,
            max_retries: STORE_MAX_RETRIES,
            backoff_base_ms: STORE_BACKOFF_BASE_MS,
        }
    }
}

impl StoreConfig {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            call_timeout: Duration::from_millis(self.call_timeout_ms),
            max_retries: self.max_retries,
            backoff_base: Duration::from_millis(self.backoff_base_ms),
        }
    }
}

impl TutorConfig {
    pub fn from_json_str(raw: &str) -> Result<Self> {
        let config: TutorConfig = serde_json::from_str(raw)
            .map_err(|e| TutorError::Validation(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("[Config] Reading {:?}", path);
        let raw = fs::read_to_string(path)
            .map_err(|e| TutorError::NotFound(format!("config {:?}: {}", path, e)))?;
        Self::from_json_str(&raw)
    }

    /// Reads the file named by `CYBER_TUTOR_CONFIG`, or the defaults.
    pub fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV_VAR) {
            Some(path) => {
                info!("[Config] Loading config from {:?}", path);
                Self::from_file(Path::new(&path))
            }
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=MAX_PERCENT).contains(&self.pass_threshold) {
            return Err(TutorError::Validation(format!(
                "pass_threshold {} must be within 0..=100",
                self.pass_threshold
            )));
        }
        if self.store.call_timeout_ms == 0 {
            return Err(TutorError::Validation(
                "store.call_timeout_ms must be at least 1".to_string(),
            ));
        }
        if self.quiz_sample_size == 0 {
            return Err(TutorError::Validation(
                "quiz_sample_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.store.retry_policy()
    }
}
