// src/lib.rs

//! Adaptive progress and proficiency engine for the Cyber Tutor lessons.
//!
//! A learner takes chapter assessments; each attempt is scored, appended to
//! the progress ledger, and the first pass of a chapter marks it complete
//! and advances the learner's proficiency rank for the topic. Chapters
//! unlock once the rank reaches their threshold.

pub mod catalog;
pub mod config;
pub mod constants;
pub mod database;
pub mod error;
pub mod evaluator;
pub mod ledger;
pub mod locks;
pub mod models;
pub mod pedagogy;
pub mod profile;
pub mod proficiency;
pub mod repository;
pub mod retry;
pub mod store;

pub use catalog::{Catalog, ContentSource};
pub use config::TutorConfig;
pub use database::SqliteStore;
pub use error::{Result, TutorError};
pub use evaluator::{AnswerKey, Evaluation, Evaluator, Submission};
pub use ledger::ProgressLedger;
pub use models::Rank;
pub use pedagogy::{AttemptOutcome, AttemptState, Progression, QuizSession};
pub use profile::{AuthProvider, Profiles, StaticAuth};
pub use proficiency::ProficiencyStore;
pub use store::{DocPath, DocumentStore, MemoryStore};
