// src/constants.rs

// --- Assessment ---
pub const PASS_THRESHOLD_PERCENT: f64 = 70.0;
pub const QUIZ_SAMPLE_SIZE: usize = 10;
pub const MAX_PERCENT: f64 = 100.0;

// --- Remote Store Calls ---
pub const STORE_CALL_TIMEOUT_MS: u64 = 5_000;
pub const STORE_MAX_RETRIES: u32 = 3;
pub const STORE_BACKOFF_BASE_MS: u64 = 100;

// --- Registration Defaults ---
pub const DEFAULT_CONTENT_PREFERENCE: &str = "text";
pub const EXPERIMENTAL_GROUP_RATIO: f64 = 0.5;

// --- Document Fields ---
pub const FIELD_COMPLETE: &str = "complete";
pub const FIELD_ATTEMPTS: &str = "attempts";
pub const FIELD_VIEWS: &str = "views";
pub const FIELD_TOPIC_ID: &str = "topicId";
pub const FIELD_LEVEL: &str = "level";
pub const FIELD_PROFICIENCY_APPLIED: &str = "proficiencyApplied";

// --- Config ---
pub const CONFIG_ENV_VAR: &str = "CYBER_TUTOR_CONFIG";
