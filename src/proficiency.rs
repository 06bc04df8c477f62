// src/proficiency.rs

use crate::constants::FIELD_LEVEL;
use crate::error::Result;
use crate::models::Rank;
use crate::repository;
use crate::retry::RetryPolicy;
use crate::store::{DocPath, DocumentStore, WriteOp, WriteResult};
use log::{debug, info, warn};
use std::sync::Arc;

/// Per (user, topic) proficiency rank. Ranks only move forward.
#[derive(Clone)]
pub struct ProficiencyStore {
    store: Arc<dyn DocumentStore>,
    policy: RetryPolicy,
}

impl ProficiencyStore {
    pub fn new(store: Arc<dyn DocumentStore>, policy: RetryPolicy) -> Self {
        ProficiencyStore { store, policy }
    }

    /// Current rank, or `Rank::MIN` if nothing was ever recorded.
    pub async fn get_rank(&self, user_id: &str, topic_id: &str) -> Result<Rank> {
        let rank = repository::load_proficiency(self.store.as_ref(), &self.policy, user_id, topic_id)
            .await?
            .map(|r| r.level)
            .unwrap_or_default();
        debug!("[Proficiency] {}/{} is {}", user_id, topic_id, rank);
        Ok(rank)
    }

    /// Moves the rank up one step. At `Rank::MAX` this is a no-op.
    pub async fn advance(&self, topic_id: &str, user_id: &str) -> Result<Rank> {
        let old = self.get_rank(user_id, topic_id).await?;
        if old == Rank::MAX {
            debug!("[Proficiency] {}/{} already at {}", user_id, topic_id, old);
            return Ok(old);
        }

        let results = repository::commit(
            self.store.as_ref(),
            &self.policy,
            "advance",
            vec![advance_op(user_id, topic_id)],
        )
        .await?;

        let new = match results.first() {
            Some(WriteResult::Counter(level)) => Rank::from_level(*level).unwrap_or(Rank::MAX),
            other => {
                warn!("[Proficiency] Unexpected advance result {:?}", other);
                self.get_rank(user_id, topic_id).await?
            }
        };
        info!(
            "[Proficiency] User {} topic {}: {} -> {}",
            user_id, topic_id, old, new
        );
        Ok(new)
    }
}

/// Capped increment of the stored level, for use inside a larger batch.
pub(crate) fn advance_op(user_id: &str, topic_id: &str) -> WriteOp {
    WriteOp::Increment {
        path: DocPath::proficiency(user_id, topic_id),
        field: FIELD_LEVEL.to_string(),
        by: 1,
        max: Some(i64::from(Rank::MAX.level())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TutorError;
    use crate::store::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    async fn store_with_level(level: Option<u8>) -> ProficiencyStore {
        let store = Arc::new(MemoryStore::new());
        if let Some(level) = level {
            store
                .set(
                    &DocPath::proficiency("u1", "t1"),
                    json!({ "level": level }).as_object().cloned().unwrap(),
                )
                .await
                .unwrap();
        }
        ProficiencyStore::new(store, RetryPolicy::once(Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn unset_rank_defaults_to_lowest() {
        let prof = store_with_level(None).await;
        assert_eq!(prof.get_rank("u1", "t1").await.unwrap(), Rank::Beginner);
    }

    #[tokio::test]
    async fn advance_steps_and_stops_at_max() {
        let prof = store_with_level(Some(0)).await;
        assert_eq!(prof.advance("t1", "u1").await.unwrap(), Rank::Intermediate);
        assert_eq!(prof.advance("t1", "u1").await.unwrap(), Rank::Advanced);
        assert_eq!(prof.advance("t1", "u1").await.unwrap(), Rank::Advanced);
        assert_eq!(prof.get_rank("u1", "t1").await.unwrap(), Rank::MAX);
    }

    #[tokio::test]
    async fn advance_without_record_is_not_found() {
        let prof = store_with_level(None).await;
        let err = prof.advance("t1", "u1").await.unwrap_err();
        assert!(matches!(err, TutorError::NotFound(_)));
    }

    #[tokio::test]
    async fn legacy_string_proficiency_is_read() {
        let store = Arc::new(MemoryStore::new());
        store
            .set(
                &DocPath::proficiency("u1", "t1"),
                json!({ "level": "intermediate" }).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();
        let prof = ProficiencyStore::new(store, RetryPolicy::once(Duration::from_secs(1)));
        assert_eq!(prof.get_rank("u1", "t1").await.unwrap(), Rank::Intermediate);
    }
}
