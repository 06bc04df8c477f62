// src/models.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// --- Identifiers ---

pub type UserId = String;
pub type TopicId = String;
pub type ChapterId = String;
pub type QuestionId = String;

// --- Proficiency Rank ---

/// Ordinal skill level per user per topic. Also used as a chapter's unlock
/// threshold and as a question's difficulty tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "RankRepr", into = "u8")]
pub enum Rank {
    Beginner = 0,
    Intermediate = 1,
    Advanced = 2,
}

impl Rank {
    pub const MIN: Rank = Rank::Beginner;
    pub const MAX: Rank = Rank::Advanced;

    pub fn as_str(&self) -> &'static str {
        match self {
            Rank::Beginner => "beginner",
            Rank::Intermediate => "intermediate",
            Rank::Advanced => "advanced",
        }
    }

    pub fn level(self) -> u8 {
        self as u8
    }

    pub fn from_level(level: i64) -> Option<Rank> {
        match level {
            0 => Some(Rank::Beginner),
            1 => Some(Rank::Intermediate),
            2 => Some(Rank::Advanced),
            _ => None,
        }
    }

    /// One step up the scale, saturating at `Rank::MAX`.
    pub fn next(self) -> Rank {
        match self {
            Rank::Beginner => Rank::Intermediate,
            Rank::Intermediate | Rank::Advanced => Rank::Advanced,
        }
    }
}

impl Default for Rank {
    fn default() -> Self {
        Rank::MIN
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Rank {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            // Registration historically wrote an empty proficiency string.
            "" | "beginner" => Ok(Rank::Beginner),
            "intermediate" => Ok(Rank::Intermediate),
            "advanced" => Ok(Rank::Advanced),
            other => Err(format!("unknown proficiency rank '{}'", other)),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RankRepr {
    Level(i64),
    Name(String),
}

impl TryFrom<RankRepr> for Rank {
    type Error = String;
    fn try_from(repr: RankRepr) -> Result<Self, Self::Error> {
        match repr {
            RankRepr::Level(n) => {
                Rank::from_level(n).ok_or_else(|| format!("rank level {} out of range", n))
            }
            RankRepr::Name(s) => s.parse(),
        }
    }
}

impl From<Rank> for u8 {
    fn from(rank: Rank) -> u8 {
        rank.level()
    }
}

// --- Content Models ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChapterType {
    Content,
    Assessment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chapter {
    pub id: ChapterId,
    #[serde(default)]
    pub topic_id: TopicId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub chapter_type: ChapterType,
    /// Minimum rank required to unlock the chapter.
    #[serde(rename = "proficiency", default)]
    pub threshold: Rank,
    pub order: u32,
}

impl Chapter {
    pub fn is_unlocked_for(&self, rank: Rank) -> bool {
        rank >= self.threshold
    }

    pub fn is_assessment(&self) -> bool {
        self.chapter_type == ChapterType::Assessment
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Topic {
    pub id: TopicId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub order: u32,
    pub chapters: Vec<Chapter>,
}

impl Topic {
    pub fn chapter_after(&self, order: u32) -> Option<&Chapter> {
        self.chapters.iter().find(|c| c.order == order + 1)
    }
}

/// A question as authored, including its answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: QuestionId,
    pub chapter_id: ChapterId,
    pub question: String,
    pub choices: BTreeMap<String, String>,
    pub answer: String,
    pub difficulty: Rank,
}

/// A question as shown to the learner. The answer stays in the session.
#[derive(Debug, Clone, Serialize)]
pub struct QuizQuestion {
    pub id: QuestionId,
    pub prompt: String,
    pub choices: Vec<(String, String)>,
}

impl From<&Question> for QuizQuestion {
    fn from(q: &Question) -> Self {
        QuizQuestion {
            id: q.id.clone(),
            prompt: q.question.clone(),
            choices: q
                .choices
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }
}

// --- Learner State ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attempt {
    /// Unique per submission; empty for attempts written before ids existed.
    #[serde(default)]
    pub id: String,
    pub score: f64,
    #[serde(rename = "elapsedTime")]
    pub elapsed_secs: u64,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentView {
    #[serde(rename = "elapsedTime")]
    pub elapsed_secs: u64,
    pub viewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressRecord {
    pub complete: bool,
    pub topic_id: TopicId,
    #[serde(default)]
    pub attempts: Vec<Attempt>,
    #[serde(default)]
    pub views: Vec<ContentView>,
    /// Set in the same write that advanced proficiency for this chapter.
    #[serde(default)]
    pub proficiency_applied: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ProficiencyRecord {
    #[serde(default)]
    pub level: Rank,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Group {
    Experimental,
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentPreference {
    #[default]
    Text,
    Video,
}

impl FromStr for ContentPreference {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(ContentPreference::Text),
            "video" => Ok(ContentPreference::Video),
            other => Err(format!("unknown content preference '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub name: String,
    pub group: Group,
    #[serde(default)]
    pub initial_survey_complete: bool,
    #[serde(default)]
    pub demographic_survey_complete: bool,
    #[serde(default)]
    pub content_preference: ContentPreference,
    #[serde(default)]
    pub video_completed: bool,
    #[serde(default)]
    pub last_login_date: Option<NaiveDate>,
    #[serde(default)]
    pub current_streak: u32,
    #[serde(default)]
    pub longest_streak: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Streak {
    pub current: u32,
    pub longest: u32,
}

/// Per-chapter view of a topic page.
#[derive(Debug, Clone, Serialize)]
pub struct ChapterStatus {
    pub chapter_id: ChapterId,
    pub title: String,
    pub order: u32,
    pub chapter_type: ChapterType,
    pub unlocked: bool,
    pub complete: bool,
}
