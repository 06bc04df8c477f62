//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use cyber_tutor::store::{DocPath, Document, DocumentStore, MemoryStore, WriteOp, WriteResult};
use cyber_tutor::{Catalog, Profiles, Progression, Result, TutorConfig, TutorError};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

pub const CATALOG: &str = r#"{
  "topics": [
    {"id": "t1", "title": "Phishing", "order": 1, "chapters": [
      {"id": "c1", "title": "What Is Phishing?", "chapterType": "content", "proficiency": "beginner", "order": 1},
      {"id": "c2", "title": "Phishing Check", "chapterType": "assessment", "proficiency": "beginner", "order": 2},
      {"id": "c3", "title": "Spear Phishing", "chapterType": "content", "proficiency": "intermediate", "order": 3},
      {"id": "c4", "title": "Pretexting Check", "chapterType": "assessment", "proficiency": "intermediate", "order": 4}
    ]},
    {"id": "t2", "title": "Passwords", "order": 2, "chapters": [
      {"id": "c5", "title": "Password Check", "chapterType": "assessment", "proficiency": "beginner", "order": 1}
    ]}
  ],
  "questions": [
    {"id": "q1", "chapterId": "c2", "question": "Misspelled sender domain?", "choices": {"a": "phishing", "b": "fine"}, "answer": "a", "difficulty": "beginner"},
    {"id": "q2", "chapterId": "c2", "question": "Type the URL yourself?", "choices": {"a": "no", "b": "yes", "c": "maybe"}, "answer": "b", "difficulty": "beginner"},
    {"id": "q3", "chapterId": "c2", "question": "Homograph attack?", "choices": {"a": "x", "b": "y", "c": "lookalike letters"}, "answer": "c", "difficulty": "intermediate"},
    {"id": "q4", "chapterId": "c4", "question": "Fake IT call?", "choices": {"a": "pretexting", "b": "baiting"}, "answer": "a", "difficulty": "intermediate"},
    {"id": "p1", "chapterId": "c5", "question": "Longest?", "choices": {"a": "long", "b": "short"}, "answer": "a", "difficulty": "beginner"},
    {"id": "p2", "chapterId": "c5", "question": "Reuse?", "choices": {"a": "yes", "b": "no"}, "answer": "b", "difficulty": "beginner"},
    {"id": "p3", "chapterId": "c5", "question": "Manager?", "choices": {"a": "yes", "b": "no"}, "answer": "a", "difficulty": "beginner"},
    {"id": "p4", "chapterId": "c5", "question": "Sticky note?", "choices": {"a": "yes", "b": "no"}, "answer": "b", "difficulty": "beginner"}
  ]
}"#;

pub fn catalog() -> Arc<Catalog> {
    Arc::new(Catalog::from_json_str(CATALOG).unwrap())
}

pub fn test_config() -> TutorConfig {
    let mut config = TutorConfig::default();
    config.store.max_retries = 2;
    config.store.backoff_base_ms = 1;
    config.store.call_timeout_ms = 1_000;
    config
}

pub fn rng() -> StdRng {
    StdRng::seed_from_u64(2024)
}

pub fn answers(pairs: &[(&str, &str)]) -> cyber_tutor::Submission {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Registers `user_id` and returns the engine wired to `store`.
pub async fn setup_with(store: Arc<dyn DocumentStore>, user_id: &str) -> (Progression, Profiles) {
    let config = test_config();
    let content = catalog();
    let progression = Progression::new(Arc::clone(&store), content.clone(), &config);
    let profiles = Profiles::new(store, content, config.retry_policy());
    profiles
        .register_user(user_id, "Ada", &mut rng())
        .await
        .unwrap();
    (progression, profiles)
}

pub async fn setup(user_id: &str) -> (Arc<MemoryStore>, Progression, Profiles) {
    let store = Arc::new(MemoryStore::new());
    let (progression, profiles) = setup_with(store.clone(), user_id).await;
    (store, progression, profiles)
}

/// Fails batches of a given size with a transient error. In ghost mode the
/// batch is committed first, as if the acknowledgement was lost. Reads of
/// paths containing a given fragment can be failed separately.
pub struct FlakyStore {
    inner: MemoryStore,
    batch_len: usize,
    failures_left: AtomicU32,
    ghost: AtomicBool,
    read_failures_left: AtomicU32,
    read_fragment: Mutex<String>,
}

impl FlakyStore {
    pub fn new(batch_len: usize) -> Self {
        FlakyStore {
            inner: MemoryStore::new(),
            batch_len,
            failures_left: AtomicU32::new(0),
            ghost: AtomicBool::new(false),
            read_failures_left: AtomicU32::new(0),
            read_fragment: Mutex::new(String::new()),
        }
    }

    pub fn fail_next(&self, times: u32, ghost: bool) {
        self.ghost.store(ghost, Ordering::SeqCst);
        self.failures_left.store(times, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, times: u32, path_fragment: &str) {
        *self.read_fragment.lock().unwrap() = path_fragment.to_string();
        self.read_failures_left.store(times, Ordering::SeqCst);
    }

    fn take_failure(&self) -> bool {
        take(&self.failures_left)
    }

    fn take_read_failure(&self, path: &DocPath) -> bool {
        let matches = path.as_str().contains(self.read_fragment.lock().unwrap().as_str());
        matches && take(&self.read_failures_left)
    }
}

fn take(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl DocumentStore for FlakyStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        if self.take_read_failure(path) {
            return Err(TutorError::TransientIo("read down".to_string()));
        }
        self.inner.get(path).await
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>> {
        self.inner.list(collection).await
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<Vec<WriteResult>> {
        if ops.len() == self.batch_len && self.take_failure() {
            if self.ghost.load(Ordering::SeqCst) {
                self.inner.apply(ops).await?;
            }
            return Err(TutorError::TransientIo("injected failure".to_string()));
        }
        self.inner.apply(ops).await
    }
}
