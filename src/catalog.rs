// src/catalog.rs

use crate::error::{Result, TutorError};
use crate::models::{Chapter, ChapterId, Question, Rank, Topic};
use async_trait::async_trait;
use log::{debug, info};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

/// Supplies authored topics, chapters and question pools.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// All topics, ordered by their `order` field.
    async fn topics(&self) -> Result<Vec<Topic>>;
    async fn topic(&self, topic_id: &str) -> Result<Topic>;
    async fn chapter(&self, chapter_id: &str) -> Result<Chapter>;
    /// The full question pool for a chapter (possibly empty).
    async fn questions(&self, chapter_id: &str) -> Result<Vec<Question>>;
}

#[derive(Deserialize)]
struct CatalogFile {
    topics: Vec<Topic>,
    #[serde(default)]
    questions: Vec<Question>,
}

/// Immutable in-memory content, loaded once from JSON.
#[derive(Debug, Clone)]
pub struct Catalog {
    topics: Vec<Topic>,
    chapters: HashMap<ChapterId, Chapter>,
    questions: HashMap<ChapterId, Vec<Question>>,
}

impl Catalog {
    /// The lessons shipped with the binary.
    pub fn bundled() -> Result<Self> {
        Self::from_json_str(include_str!("../data/catalog.json"))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| TutorError::NotFound(format!("catalog {:?}: {}", path, e)))?;
        Self::from_json_str(&raw)
    }

    pub fn from_json_str(raw: &str) -> Result<Self> {
        let file: CatalogFile = serde_json::from_str(raw)
            .map_err(|e| TutorError::Validation(format!("invalid catalog: {}", e)))?;
        Self::build(file.topics, file.questions)
    }

    pub fn build(mut topics: Vec<Topic>, questions: Vec<Question>) -> Result<Self> {
        topics.sort_by_key(|t| t.order);

        let mut chapters = HashMap::new();
        for topic in &mut topics {
            topic.chapters.sort_by_key(|c| c.order);
            let mut assessments_before: u8 = 0;
            for chapter in &mut topic.chapters {
                // 1. Chapters inherit their parent topic when not tagged
                if chapter.topic_id.is_empty() {
                    chapter.topic_id = topic.id.clone();
                } else if chapter.topic_id != topic.id {
                    return Err(TutorError::Validation(format!(
                        "chapter {} claims topic {} but is listed under {}",
                        chapter.id, chapter.topic_id, topic.id
                    )));
                }
                if chapters.insert(chapter.id.clone(), chapter.clone()).is_some() {
                    return Err(TutorError::Validation(format!(
                        "duplicate chapter id {}",
                        chapter.id
                    )));
                }

                // Each earlier assessment can raise the rank by one step
                let reachable = Rank::from_level(i64::from(assessments_before.min(Rank::MAX.level())))
                    .unwrap_or(Rank::MAX);
                if chapter.threshold > reachable {
                    return Err(TutorError::Validation(format!(
                        "chapter {} requires {} but topic {} can only reach {} before it",
                        chapter.id, chapter.threshold, topic.id, reachable
                    )));
                }
                if chapter.is_assessment() {
                    assessments_before = assessments_before.saturating_add(1);
                }
            }
        }

        // 2. Questions need a unique id, a known chapter and a valid key
        let mut pools: HashMap<ChapterId, Vec<Question>> = HashMap::new();
        let mut question_ids = HashSet::new();
        for q in questions {
            if !question_ids.insert(q.id.clone()) {
                return Err(TutorError::Validation(format!(
                    "duplicate question id {}",
                    q.id
                )));
            }
            if !chapters.contains_key(&q.chapter_id) {
                return Err(TutorError::Validation(format!(
                    "question {} references unknown chapter {}",
                    q.id, q.chapter_id
                )));
            }
            if !q.choices.contains_key(&q.answer) {
                return Err(TutorError::Validation(format!(
                    "question {} answer '{}' is not one of its choices",
                    q.id, q.answer
                )));
            }
            pools.entry(q.chapter_id.clone()).or_default().push(q);
        }

        info!(
            "[Catalog] Loaded {} topic(s), {} chapter(s), {} question pool(s)",
            topics.len(),
            chapters.len(),
            pools.len()
        );
        Ok(Catalog {
            topics,
            chapters,
            questions: pools,
        })
    }
}

#[async_trait]
impl ContentSource for Catalog {
    async fn topics(&self) -> Result<Vec<Topic>> {
        Ok(self.topics.clone())
    }

    async fn topic(&self, topic_id: &str) -> Result<Topic> {
        self.topics
            .iter()
            .find(|t| t.id == topic_id)
            .cloned()
            .ok_or_else(|| TutorError::NotFound(format!("topic {}", topic_id)))
    }

    async fn chapter(&self, chapter_id: &str) -> Result<Chapter> {
        self.chapters
            .get(chapter_id)
            .cloned()
            .ok_or_else(|| TutorError::NotFound(format!("chapter {}", chapter_id)))
    }

    async fn questions(&self, chapter_id: &str) -> Result<Vec<Question>> {
        if !self.chapters.contains_key(chapter_id) {
            return Err(TutorError::NotFound(format!("chapter {}", chapter_id)));
        }
        let pool = self.questions.get(chapter_id).cloned().unwrap_or_default();
        debug!("[Catalog] Chapter {} pool size {}", chapter_id, pool.len());
        Ok(pool)
    }
}
