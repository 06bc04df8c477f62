// src/ledger.rs

use crate::constants::*;
use crate::error::{Result, TutorError};
use crate::locks::{progress_key, KeyedLocks};
use crate::models::{Attempt, ProgressRecord};
use crate::repository;
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{DocPath, DocumentStore, WriteOp, WriteResult};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Per-chapter completion flags and append-only attempt history.
#[derive(Clone)]
pub struct ProgressLedger {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
    locks: Arc<KeyedLocks>,
}

impl ProgressLedger {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy, locks: Arc<KeyedLocks>) -> Self {
        ProgressLedger {
            store,
            policy,
            locks,
        }
    }

    pub fn locks(&self) -> &Arc<KeyedLocks> {
        &self.locks
    }

    /// Appends one attempt and returns its 1-based index.
    pub async fn record_attempt(
        &self,
        user_id: &str,
        chapter_id: &str,
        score: f64,
        elapsed: Duration,
    ) -> Result<usize> {
        self.record_attempt_at(user_id, chapter_id, score, elapsed, Utc::now())
            .await
    }

    pub async fn record_attempt_at(
        &self,
        user_id: &str,
        chapter_id: &str,
        score: f64,
        elapsed: Duration,
        submitted_at: DateTime<Utc>,
    ) -> Result<usize> {
        let attempt = Attempt {
            id: new_attempt_id(),
            score,
            elapsed_secs: elapsed.as_secs(),
            submitted_at,
        };
        self.append_attempt(user_id, chapter_id, attempt).await
    }

    /// Appends `attempt` unless an attempt with the same id is already
    /// stored, and returns its 1-based index either way.
    pub async fn append_attempt(&self, user_id: &str, chapter_id: &str, attempt: Attempt) -> Result<usize> {
        let score = attempt.score;
        if !score.is_finite() || !(0.0..=MAX_PERCENT).contains(&score) {
            return Err(TutorError::Validation(format!(
                "score {} outside 0..=100",
                score
            )));
        }
        if attempt.id.is_empty() {
            return Err(TutorError::Validation("attempt id must not be empty".to_string()));
        }

        let path = DocPath::progress(user_id, chapter_id);
        let value = serde_json::to_value(&attempt)?;
        let store = self.store.as_ref();
        let (path_ref, id, value_ref) = (&path, attempt.id.as_str(), &value);

        let _guard = self.locks.lock(&progress_key(user_id, chapter_id)).await;
        // The id check is repeated on every retry so an append that landed
        // before a lost acknowledgement is not pushed twice.
        let index = with_retry(&self.policy, path.as_str(), move || {
            try_append(store, path_ref, id, value_ref)
        })
        .await?;

        info!(
            "[Ledger] User {} chapter {}: attempt #{} recorded (score {:.1}, {}s)",
            user_id, chapter_id, index, score, attempt.elapsed_secs
        );
        Ok(index)
    }

    /// Sets `complete = true`. Returns whether this call flipped the flag.
    pub async fn mark_complete(&self, user_id: &str, chapter_id: &str) -> Result<bool> {
        let _guard = self.locks.lock(&progress_key(user_id, chapter_id)).await;
        let record = self.progress(user_id, chapter_id).await?;
        if record.complete {
            debug!("[Ledger] {}/{} already complete", user_id, chapter_id);
            return Ok(false);
        }

        repository::commit(
            self.store.as_ref(),
            &self.policy,
            "mark_complete",
            vec![complete_op(user_id, chapter_id, false)],
        )
        .await?;
        info!("[Ledger] User {} completed chapter {}", user_id, chapter_id);
        Ok(true)
    }

    pub async fn progress(&self, user_id: &str, chapter_id: &str) -> Result<ProgressRecord> {
        repository::load_progress(self.store.as_ref(), &self.policy, user_id, chapter_id).await
    }

    pub async fn attempts(&self, user_id: &str, chapter_id: &str) -> Result<Vec<Attempt>> {
        Ok(self.progress(user_id, chapter_id).await?.attempts)
    }

    pub async fn is_complete(&self, user_id: &str, chapter_id: &str) -> Result<bool> {
        Ok(self.progress(user_id, chapter_id).await?.complete)
    }

    /// True iff every progress record tagged with `topic_id` is complete.
    pub async fn is_topic_complete(&self, user_id: &str, topic_id: &str) -> Result<bool> {
        let records =
            repository::list_progress(self.store.as_ref(), &self.policy, user_id).await?;
        Ok(records
            .iter()
            .filter(|(_, r)| r.topic_id == topic_id)
            .all(|(_, r)| r.complete))
    }
}

/// Fresh id for one submission.
pub fn new_attempt_id() -> String {
    format!("{:016x}", rand::random::<u64>())
}

async fn try_append(store: &dyn DocumentStore, path: &DocPath, attempt_id: &str, value: &Value) -> Result<usize> {
    let doc = store
        .get(path)
        .await?
        .ok_or_else(|| TutorError::NotFound(path.to_string()))?;
    let existing = doc
        .get(FIELD_ATTEMPTS)
        .and_then(Value::as_array)
        .and_then(|attempts| {
            attempts
                .iter()
                .position(|a| a.get("id").and_then(Value::as_str) == Some(attempt_id))
        });
    if let Some(pos) = existing {
        debug!("[Ledger] Attempt {} already stored at #{}", attempt_id, pos + 1);
        return Ok(pos + 1);
    }

    let results = store
        .apply(vec![WriteOp::Append {
            path: path.clone(),
            field: FIELD_ATTEMPTS.to_string(),
            value: value.clone(),
        }])
        .await?;
    match results.first() {
        Some(WriteResult::Length(n)) => Ok(*n),
        other => Err(TutorError::Corrupt(format!(
            "append on {} returned {:?}",
            path, other
        ))),
    }
}

/// Merge that flips `complete`, optionally recording that proficiency was
/// advanced in the same write.
pub(crate) fn complete_op(user_id: &str, chapter_id: &str, proficiency_applied: bool) -> WriteOp {
    let mut fields = Map::new();
    fields.insert(FIELD_COMPLETE.to_string(), Value::Bool(true));
    if proficiency_applied {
        fields.insert(FIELD_PROFICIENCY_APPLIED.to_string(), Value::Bool(true));
    }
    WriteOp::Merge {
        path: DocPath::progress(user_id, chapter_id),
        fields,
    }
}
