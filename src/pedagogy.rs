// src/pedagogy.rs

use crate::catalog::ContentSource;
use crate::config::TutorConfig;
use crate::constants::*;
use crate::error::{Result, TutorError};
use crate::evaluator::{AnswerKey, Evaluation, Evaluator, Submission};
use crate::ledger::{complete_op, new_attempt_id, ProgressLedger};
use crate::locks::{progress_key, KeyedLocks};
use crate::models::{
    Attempt, ChapterId, ChapterStatus, ChapterType, ContentView, ProgressRecord, Question,
    QuizQuestion, Rank, TopicId, UserId,
};
use crate::proficiency::{advance_op, ProficiencyStore};
use crate::repository::{self, from_document};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{DocPath, DocumentStore, WriteOp};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

// --- Session State ---

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum AttemptState {
    /// Quiz shown, nothing recorded.
    InProgress,
    /// Scored but not yet durably saved.
    Scored(Evaluation),
    Passed(Evaluation),
    Failed(Evaluation),
}

/// One sitting of a chapter assessment.
#[derive(Debug, Clone)]
pub struct QuizSession {
    pub user_id: UserId,
    pub topic_id: TopicId,
    pub chapter_id: ChapterId,
    pub chapter_order: u32,
    /// Rank the questions were drawn for.
    pub rank: Rank,
    pub questions: Vec<QuizQuestion>,
    answer_key: AnswerKey,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    state: AttemptState,
    /// Stored with the attempt so a retried append can recognise it.
    attempt_id: String,
    recorded_index: Option<usize>,
    completion: Option<bool>,
}

impl QuizSession {
    pub fn state(&self) -> AttemptState {
        self.state
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Index assigned by the ledger once the attempt was saved.
    pub fn attempt_index(&self) -> Option<usize> {
        self.recorded_index
    }

    /// Time from start to submission, as recorded with the attempt.
    pub fn elapsed(&self) -> Duration {
        self.finished_at
            .and_then(|end| (end - self.started_at).to_std().ok())
            .unwrap_or(Duration::ZERO)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AttemptOutcome {
    pub attempt_index: usize,
    pub evaluation: Evaluation,
    /// This attempt flipped the chapter to complete and advanced proficiency.
    pub newly_completed: bool,
    pub rank: Rank,
    pub next_chapter: Option<ChapterId>,
    pub retry_allowed: bool,
}

// --- Question Selection ---

/// Draws up to `size` questions of the learner's rank. A short pool is
/// returned whole.
pub fn sample_questions<R: Rng + ?Sized>(
    pool: Vec<Question>,
    rank: Rank,
    size: usize,
    rng: &mut R,
) -> Vec<Question> {
    let mut matching: Vec<Question> = pool.into_iter().filter(|q| q.difficulty == rank).collect();
    matching.shuffle(rng);
    matching.truncate(size);
    matching
}

/// Renders seconds as `m:ss`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{}:{:02}", secs / 60, secs % 60)
}

async fn try_complete(
    store: &dyn DocumentStore,
    path: &DocPath,
    user_id: &str,
    topic_id: &str,
    chapter_id: &str,
) -> Result<bool> {
    let record: ProgressRecord = match store.get(path).await? {
        Some(doc) => from_document(path, doc)?,
        None => return Err(TutorError::NotFound(path.to_string())),
    };
    if record.complete {
        return Ok(false);
    }
    store
        .apply(vec![
            complete_op(user_id, chapter_id, true),
            advance_op(user_id, topic_id),
        ])
        .await?;
    Ok(true)
}

// --- Controller ---

/// Drives a learner through chapters: scores attempts, records them, and
/// advances proficiency on a first pass.
#[derive(Clone)]
pub struct Progression {
    store: Arc<dyn DocumentStore>,
    content: Arc<dyn ContentSource>,
    ledger: ProgressLedger,
    proficiency: ProficiencyStore,
    evaluator: Evaluator,
    policy: RetryPolicy,
    sample_size: usize,
    require_all_answers: bool,
}

impl Progression {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        content: Arc<dyn ContentSource>,
        config: &TutorConfig,
    ) -> Self {
        let policy = config.retry_policy();
        let locks = Arc::new(KeyedLocks::new());
        Progression {
            ledger: ProgressLedger::new(Arc::clone(&store), policy, locks),
            proficiency: ProficiencyStore::new(Arc::clone(&store), policy),
            evaluator: Evaluator::new(config.pass_threshold),
            sample_size: config.quiz_sample_size,
            require_all_answers: config.require_all_answers,
            store,
            content,
            policy,
        }
    }

    pub fn ledger(&self) -> &ProgressLedger {
        &self.ledger
    }

    pub fn proficiency(&self) -> &ProficiencyStore {
        &self.proficiency
    }

    pub fn content(&self) -> &Arc<dyn ContentSource> {
        &self.content
    }

    // --- Quiz Lifecycle ---

    pub async fn start_quiz<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        chapter_id: &str,
        rng: &mut R,
    ) -> Result<QuizSession> {
        let chapter = self.content.chapter(chapter_id).await?;
        if !chapter.is_assessment() {
            return Err(TutorError::Validation(format!(
                "chapter {} is not an assessment",
                chapter_id
            )));
        }

        let rank = self.proficiency.get_rank(user_id, &chapter.topic_id).await?;
        if !chapter.is_unlocked_for(rank) {
            return Err(TutorError::Validation(format!(
                "chapter {} requires {} but user {} is {}",
                chapter_id, chapter.threshold, user_id, rank
            )));
        }

        let pool = self.content.questions(chapter_id).await?;
        let pool_size = pool.len();
        let selected = sample_questions(pool, rank, self.sample_size, rng);
        if selected.len() < self.sample_size {
            warn!(
                "[Progression] Chapter {} has only {} {} question(s) (pool {}), wanted {}",
                chapter_id,
                selected.len(),
                rank,
                pool_size,
                self.sample_size
            );
        }

        let answer_key: AnswerKey = selected
            .iter()
            .map(|q| (q.id.clone(), q.answer.clone()))
            .collect();
        debug!(
            "[Progression] Quiz for {} on {}: {} question(s) at {}",
            user_id,
            chapter_id,
            selected.len(),
            rank
        );

        Ok(QuizSession {
            user_id: user_id.to_string(),
            topic_id: chapter.topic_id.clone(),
            chapter_id: chapter.id.clone(),
            chapter_order: chapter.order,
            rank,
            questions: selected.iter().map(QuizQuestion::from).collect(),
            answer_key,
            started_at: Utc::now(),
            finished_at: None,
            state: AttemptState::InProgress,
            attempt_id: new_attempt_id(),
            recorded_index: None,
            completion: None,
        })
    }

    pub async fn submit(&self, session: &mut QuizSession, answers: &Submission) -> Result<AttemptOutcome> {
        self.submit_at(session, answers, Utc::now()).await
    }

    /// Scores the answers, then saves the attempt. If saving fails the
    /// session stays `Scored` and `retry_save` can be called.
    pub async fn submit_at(
        &self,
        session: &mut QuizSession,
        answers: &Submission,
        finished_at: DateTime<Utc>,
    ) -> Result<AttemptOutcome> {
        if session.state != AttemptState::InProgress {
            return Err(TutorError::Validation(format!(
                "session for {} is already {:?}",
                session.chapter_id, session.state
            )));
        }

        if self.require_all_answers {
            let missing: Vec<&str> = session
                .answer_key
                .keys()
                .filter(|qid| !answers.contains_key(*qid))
                .map(|s| s.as_str())
                .collect();
            if !missing.is_empty() {
                return Err(TutorError::Validation(format!(
                    "missing answers for {:?}",
                    missing
                )));
            }
        }

        // 1. Score
        let evaluation = self.evaluator.evaluate(answers, &session.answer_key);
        session.finished_at = Some(finished_at);
        session.state = AttemptState::Scored(evaluation);
        info!(
            "[Progression] User {} scored {:.1}% ({}/{}) on {}",
            session.user_id,
            evaluation.percentage,
            evaluation.correct_count,
            evaluation.total_questions,
            session.chapter_id
        );

        // 2. Persist
        self.persist(session).await
    }

    /// Re-attempts the save of a scored session.
    pub async fn retry_save(&self, session: &mut QuizSession) -> Result<AttemptOutcome> {
        self.persist(session).await
    }

    async fn persist(&self, session: &mut QuizSession) -> Result<AttemptOutcome> {
        let evaluation = match session.state {
            AttemptState::Scored(e) => e,
            other => {
                return Err(TutorError::Validation(format!(
                    "nothing to save in state {:?}",
                    other
                )))
            }
        };

        // 1. Record the attempt once, even across save retries
        let attempt_index = match session.recorded_index {
            Some(idx) => idx,
            None => {
                let attempt = Attempt {
                    id: session.attempt_id.clone(),
                    score: evaluation.percentage,
                    elapsed_secs: session.elapsed().as_secs(),
                    submitted_at: session.finished_at.unwrap_or_else(Utc::now),
                };
                let idx = self
                    .ledger
                    .append_attempt(&session.user_id, &session.chapter_id, attempt)
                    .await?;
                session.recorded_index = Some(idx);
                idx
            }
        };

        // 2. Completion and proficiency, on a pass only
        let newly_completed = match session.completion {
            Some(done) => done,
            None => {
                let done = if evaluation.passed {
                    self.complete_and_advance(&session.user_id, &session.topic_id, &session.chapter_id)
                        .await?
                } else {
                    false
                };
                session.completion = Some(done);
                done
            }
        };

        // 3. Outcome reads; the session stays `Scored` until they succeed
        let rank = self
            .proficiency
            .get_rank(&session.user_id, &session.topic_id)
            .await?;
        let next_chapter = if evaluation.passed {
            self.next_chapter(&session.user_id, &session.topic_id, session.chapter_order)
                .await?
        } else {
            None
        };

        session.state = if evaluation.passed {
            AttemptState::Passed(evaluation)
        } else {
            AttemptState::Failed(evaluation)
        };

        Ok(AttemptOutcome {
            attempt_index,
            evaluation,
            newly_completed,
            rank,
            next_chapter,
            retry_allowed: !evaluation.passed,
        })
    }

    /// Marks the chapter complete and advances proficiency in one atomic
    /// batch. Returns false if the chapter was already complete.
    async fn complete_and_advance(&self, user_id: &str, topic_id: &str, chapter_id: &str) -> Result<bool> {
        let _guard = self.ledger.locks().lock(&progress_key(user_id, chapter_id)).await;
        let store = self.store.as_ref();
        let path = DocPath::progress(user_id, chapter_id);
        let path = &path;

        // The completion check is repeated on every retry so a batch that
        // landed before a timeout is never applied twice.
        let applied = with_retry(&self.policy, "complete_and_advance", move || {
            try_complete(store, path, user_id, topic_id, chapter_id)
        })
        .await?;

        if applied {
            info!(
                "[Progression] User {} completed {}; proficiency advanced in {}",
                user_id, chapter_id, topic_id
            );
        } else {
            debug!(
                "[Progression] {} already complete for {}, proficiency unchanged",
                chapter_id, user_id
            );
        }
        Ok(applied)
    }

    // --- Content Chapters ---

    /// Records a read/watch of a content chapter and marks it complete.
    /// Content chapters never change proficiency.
    pub async fn complete_content_chapter(
        &self,
        user_id: &str,
        chapter_id: &str,
        elapsed: Duration,
    ) -> Result<bool> {
        let chapter = self.content.chapter(chapter_id).await?;
        if chapter.chapter_type != ChapterType::Content {
            return Err(TutorError::Validation(format!(
                "chapter {} is an assessment; submit a quiz instead",
                chapter_id
            )));
        }

        let _guard = self.ledger.locks().lock(&progress_key(user_id, chapter_id)).await;
        let was_complete = self.ledger.progress(user_id, chapter_id).await?.complete;

        let view = ContentView {
            elapsed_secs: elapsed.as_secs(),
            viewed_at: Utc::now(),
        };
        repository::commit(
            self.store.as_ref(),
            &self.policy,
            "complete_content_chapter",
            vec![
                WriteOp::Append {
                    path: DocPath::progress(user_id, chapter_id),
                    field: FIELD_VIEWS.to_string(),
                    value: serde_json::to_value(&view)?,
                },
                complete_op(user_id, chapter_id, false),
            ],
        )
        .await?;

        info!(
            "[Progression] User {} read {} in {}",
            user_id,
            chapter_id,
            format_elapsed(elapsed)
        );
        Ok(!was_complete)
    }

    // --- Queries ---

    /// The chapter after `order` in the topic, if the learner's rank unlocks it.
    pub async fn next_chapter(&self, user_id: &str, topic_id: &str, order: u32) -> Result<Option<ChapterId>> {
        let topic = self.content.topic(topic_id).await?;
        let Some(next) = topic.chapter_after(order) else {
            return Ok(None);
        };
        let rank = self.proficiency.get_rank(user_id, topic_id).await?;
        if next.is_unlocked_for(rank) {
            Ok(Some(next.id.clone()))
        } else {
            debug!(
                "[Progression] Next chapter {} needs {}, user {} is {}",
                next.id, next.threshold, user_id, rank
            );
            Ok(None)
        }
    }

    pub async fn chapter_statuses(&self, user_id: &str, topic_id: &str) -> Result<Vec<ChapterStatus>> {
        let topic = self.content.topic(topic_id).await?;
        let rank = self.proficiency.get_rank(user_id, topic_id).await?;
        let progress: HashMap<ChapterId, ProgressRecord> =
            repository::list_progress(self.store.as_ref(), &self.policy, user_id)
                .await?
                .into_iter()
                .collect();

        Ok(topic
            .chapters
            .iter()
            .map(|c| ChapterStatus {
                chapter_id: c.id.clone(),
                title: c.title.clone(),
                order: c.order,
                chapter_type: c.chapter_type,
                unlocked: c.is_unlocked_for(rank),
                complete: progress.get(&c.id).map(|p| p.complete).unwrap_or(false),
            })
            .collect())
    }

    pub async fn is_topic_complete(&self, user_id: &str, topic_id: &str) -> Result<bool> {
        self.ledger.is_topic_complete(user_id, topic_id).await
    }

    /// Number of topics whose chapters are all complete.
    pub async fn topics_completed(&self, user_id: &str) -> Result<usize> {
        let topics = self.content.topics().await?;
        let records = repository::list_progress(self.store.as_ref(), &self.policy, user_id).await?;

        let count = topics
            .iter()
            .filter(|t| {
                records
                    .iter()
                    .filter(|(_, r)| r.topic_id == t.id)
                    .all(|(_, r)| r.complete)
            })
            .count();
        debug!("[Progression] User {} completed {} topic(s)", user_id, count);
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::BTreeMap;

    fn question(id: &str, difficulty: Rank) -> Question {
        Question {
            id: id.to_string(),
            chapter_id: "c1".to_string(),
            question: format!("{}?", id),
            choices: BTreeMap::from([("a".to_string(), "yes".to_string())]),
            answer: "a".to_string(),
            difficulty,
        }
    }

    #[test]
    fn undersized_pool_is_taken_whole() {
        let pool: Vec<Question> = (0..4).map(|i| question(&format!("q{}", i), Rank::Beginner)).collect();
        let picked = sample_questions(pool, Rank::Beginner, 10, &mut StdRng::seed_from_u64(7));
        assert_eq!(picked.len(), 4);
    }

    #[test]
    fn sample_is_bounded_and_filtered_by_rank() {
        let mut pool: Vec<Question> = (0..20).map(|i| question(&format!("b{}", i), Rank::Beginner)).collect();
        pool.extend((0..5).map(|i| question(&format!("i{}", i), Rank::Intermediate)));

        let picked = sample_questions(pool.clone(), Rank::Beginner, 10, &mut StdRng::seed_from_u64(1));
        assert_eq!(picked.len(), 10);
        assert!(picked.iter().all(|q| q.difficulty == Rank::Beginner));

        let picked = sample_questions(pool, Rank::Intermediate, 10, &mut StdRng::seed_from_u64(1));
        assert_eq!(picked.len(), 5);
    }

    #[test]
    fn same_seed_same_sample() {
        let pool: Vec<Question> = (0..20).map(|i| question(&format!("q{}", i), Rank::Beginner)).collect();
        let a = sample_questions(pool.clone(), Rank::Beginner, 5, &mut StdRng::seed_from_u64(42));
        let b = sample_questions(pool, Rank::Beginner, 5, &mut StdRng::seed_from_u64(42));
        let ids = |v: &[Question]| v.iter().map(|q| q.id.clone()).collect::<Vec<_>>();
        assert_eq!(ids(&a), ids(&b));
    }

    #[test]
    fn elapsed_formats_as_minutes_and_seconds() {
        assert_eq!(format_elapsed(Duration::from_secs(0)), "0:00");
        assert_eq!(format_elapsed(Duration::from_secs(75)), "1:15");
        assert_eq!(format_elapsed(Duration::from_secs(600)), "10:00");
    }
}
