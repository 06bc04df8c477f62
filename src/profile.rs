// src/profile.rs

use crate::catalog::ContentSource;
use crate::constants::*;
use crate::error::{Result, TutorError};
use crate::locks::{user_key, KeyedLocks};
use crate::models::{ContentPreference, Group, Rank, Streak, UserId, UserProfile};
use crate::repository::{self, to_document};
use crate::retry::RetryPolicy;
use crate::store::{DocPath, Document, DocumentStore, WriteOp};
use chrono::NaiveDate;
use log::{debug, info, warn};
use rand::Rng;
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;

// --- Auth ---

/// Supplies the signed-in user's id. The engine never authenticates.
pub trait AuthProvider: Send + Sync {
    fn current_user(&self) -> Option<UserId>;
}

/// Fixed session identity, e.g. from a command-line flag.
#[derive(Debug, Clone, Default)]
pub struct StaticAuth {
    user: Option<UserId>,
}

impl StaticAuth {
    pub fn new(user: Option<UserId>) -> Self {
        StaticAuth { user }
    }
}

impl AuthProvider for StaticAuth {
    fn current_user(&self) -> Option<UserId> {
        self.user.clone()
    }
}

pub fn require_user(auth: &dyn AuthProvider) -> Result<UserId> {
    auth.current_user()
        .filter(|u| !u.trim().is_empty())
        .ok_or_else(|| TutorError::Validation("no signed-in user".to_string()))
}

// --- Streaks ---

/// Streak after a login on `today`, given the previous state.
pub fn next_streak(last_login: Option<NaiveDate>, current: u32, longest: u32, today: NaiveDate) -> Streak {
    let current = match last_login {
        Some(last) if last == today => current.max(1),
        Some(last) if last.succ_opt() == Some(today) => current + 1,
        _ => 1,
    };
    Streak {
        current,
        longest: longest.max(current),
    }
}

// --- Profiles ---

/// Registration, survey flags, preferences and login streaks.
#[derive(Clone)]
pub struct Profiles {
    store: Arc<dyn DocumentStore>,
    content: Arc<dyn ContentSource>,
    policy: RetryPolicy,
    locks: Arc<KeyedLocks>,
}

impl Profiles {
    pub fn new(store: Arc<dyn DocumentStore>, content: Arc<dyn ContentSource>, policy: RetryPolicy) -> Self {
        Profiles {
            store,
            content,
            policy,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    /// Creates the user document plus one proficiency record per topic and
    /// one progress record per chapter, in a single batch.
    pub async fn register_user<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        name: &str,
        rng: &mut R,
    ) -> Result<UserProfile> {
        if user_id.trim().is_empty() {
            return Err(TutorError::Validation("user id must not be empty".to_string()));
        }
        let group = if rng.gen_bool(EXPERIMENTAL_GROUP_RATIO) {
            Group::Experimental
        } else {
            Group::Control
        };

        let _guard = self.locks.lock(&user_key(user_id)).await;
        let user_path = DocPath::user(user_id);
        if repository::get_doc(self.store.as_ref(), &self.policy, &user_path)
            .await?
            .is_some()
        {
            return Err(TutorError::Validation(format!(
                "user {} is already registered",
                user_id
            )));
        }

        let profile = UserProfile {
            name: name.to_string(),
            group,
            initial_survey_complete: false,
            demographic_survey_complete: false,
            content_preference: DEFAULT_CONTENT_PREFERENCE
                .parse()
                .unwrap_or_default(),
            video_completed: false,
            last_login_date: None,
            current_streak: 0,
            longest_streak: 0,
        };

        let mut batch = vec![WriteOp::Set {
            path: user_path,
            doc: to_document(&profile)?,
        }];

        let topics = self.content.topics().await?;
        for topic in &topics {
            batch.push(WriteOp::Set {
                path: DocPath::proficiency(user_id, &topic.id),
                doc: object(json!({ FIELD_LEVEL: Rank::MIN.level() })),
            });
            for chapter in &topic.chapters {
                batch.push(WriteOp::Set {
                    path: DocPath::progress(user_id, &chapter.id),
                    doc: object(json!({
                        FIELD_COMPLETE: false,
                        FIELD_TOPIC_ID: topic.id,
                        FIELD_ATTEMPTS: [],
                    })),
                });
            }
        }

        let writes = batch.len();
        repository::commit(self.store.as_ref(), &self.policy, "register_user", batch).await?;
        info!(
            "[Profile] Registered {} ({:?} group) with {} topic(s), {} document(s)",
            user_id,
            group,
            topics.len(),
            writes
        );
        Ok(profile)
    }

    pub async fn profile(&self, user_id: &str) -> Result<UserProfile> {
        repository::load_profile(self.store.as_ref(), &self.policy, user_id).await
    }

    // --- Surveys ---

    pub async fn complete_initial_survey(&self, user_id: &str, responses: Value) -> Result<()> {
        let mut response_doc = Map::new();
        response_doc.insert("response".to_string(), responses);
        self.commit_user_fields(
            user_id,
            "complete_initial_survey",
            object(json!({ "initialSurveyComplete": true })),
            vec![WriteOp::Set {
                path: DocPath::survey_response(user_id, "initial"),
                doc: response_doc,
            }],
        )
        .await
    }

    pub async fn complete_demographic_survey(&self, user_id: &str) -> Result<()> {
        self.commit_user_fields(
            user_id,
            "complete_demographic_survey",
            object(json!({ "demographicSurveyComplete": true })),
            Vec::new(),
        )
        .await
    }

    // --- Preferences ---

    pub async fn set_content_preference(&self, user_id: &str, pref: ContentPreference) -> Result<()> {
        self.commit_user_fields(
            user_id,
            "set_content_preference",
            object(json!({ "contentPreference": pref })),
            Vec::new(),
        )
        .await
    }

    pub async fn mark_video_watched(&self, user_id: &str) -> Result<()> {
        self.commit_user_fields(
            user_id,
            "mark_video_watched",
            object(json!({ "videoCompleted": true })),
            Vec::new(),
        )
        .await
    }

    pub async fn is_video_watched(&self, user_id: &str) -> Result<bool> {
        Ok(self.profile(user_id).await?.video_completed)
    }

    // --- Streaks ---

    /// Updates the daily login streak for `today`.
    pub async fn record_login(&self, user_id: &str, today: NaiveDate) -> Result<Streak> {
        let _guard = self.locks.lock(&user_key(user_id)).await;
        let profile = self.profile(user_id).await?;
        if profile.last_login_date == Some(today) && profile.current_streak > 0 {
            debug!("[Profile] {} already logged in on {}", user_id, today);
            return Ok(Streak {
                current: profile.current_streak,
                longest: profile.longest_streak,
            });
        }

        let streak = next_streak(
            profile.last_login_date,
            profile.current_streak,
            profile.longest_streak,
            today,
        );
        repository::commit(
            self.store.as_ref(),
            &self.policy,
            "record_login",
            vec![WriteOp::Merge {
                path: DocPath::user(user_id),
                fields: object(json!({
                    "lastLoginDate": today,
                    "currentStreak": streak.current,
                    "longestStreak": streak.longest,
                })),
            }],
        )
        .await?;
        info!(
            "[Profile] {} streak {} (best {})",
            user_id, streak.current, streak.longest
        );
        Ok(streak)
    }

    /// Streak bookkeeping as fire-and-forget telemetry. Failures are logged;
    /// the handle can still be awaited by callers that care.
    pub fn record_login_in_background(&self, user_id: &str, today: NaiveDate) -> JoinHandle<Option<Streak>> {
        let profiles = self.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            match profiles.record_login(&user_id, today).await {
                Ok(streak) => Some(streak),
                Err(e) => {
                    warn!("[Profile] Streak update for {} failed: {}", user_id, e);
                    None
                }
            }
        })
    }

    async fn commit_user_fields(
        &self,
        user_id: &str,
        label: &str,
        fields: Document,
        mut extra: Vec<WriteOp>,
    ) -> Result<()> {
        let mut batch = vec![WriteOp::Merge {
            path: DocPath::user(user_id),
            fields,
        }];
        batch.append(&mut extra);
        repository::commit(self.store.as_ref(), &self.policy, label, batch).await?;
        debug!("[Profile] {} for {}", label, user_id);
        Ok(())
    }
}

fn object(value: Value) -> Document {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}
