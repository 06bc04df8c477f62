// src/repository.rs

use crate::error::{Result, TutorError};
use crate::models::{ChapterId, ProficiencyRecord, ProgressRecord, UserProfile};
use crate::retry::{with_retry, RetryPolicy};
use crate::store::{DocPath, Document, DocumentStore, WriteOp, WriteResult};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

// --- Document Conversion ---

pub fn to_document<T: Serialize>(value: &T) -> Result<Document> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(TutorError::Corrupt(format!(
            "expected an object, serialized to {}",
            other
        ))),
    }
}

pub fn from_document<T: DeserializeOwned>(path: &DocPath, doc: Document) -> Result<T> {
    serde_json::from_value(Value::Object(doc))
        .map_err(|e| TutorError::Corrupt(format!("{}: {}", path, e)))
}

// --- Raw Access (timeout + retry) ---

pub async fn get_doc(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    path: &DocPath,
) -> Result<Option<Document>> {
    with_retry(policy, path.as_str(), move || store.get(path)).await
}

pub async fn list_docs(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    collection: &DocPath,
) -> Result<Vec<(DocPath, Document)>> {
    with_retry(policy, collection.as_str(), move || store.list(collection)).await
}

/// Commits `ops` as one atomic batch, retrying transient failures.
pub async fn commit(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    label: &str,
    ops: Vec<WriteOp>,
) -> Result<Vec<WriteResult>> {
    debug!("[DB] Committing {} op(s) for {}", ops.len(), label);
    with_retry(policy, label, move || store.apply(ops.clone())).await
}

// --- Typed Records ---

/// Fetches the progress record for a (user, chapter) pair.
pub async fn load_progress(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    user_id: &str,
    chapter_id: &str,
) -> Result<ProgressRecord> {
    let path = DocPath::progress(user_id, chapter_id);
    let doc = get_doc(store, policy, &path)
        .await?
        .ok_or_else(|| TutorError::NotFound(path.to_string()))?;
    from_document(&path, doc)
}

/// Every progress record the user owns, keyed by chapter id.
pub async fn list_progress(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    user_id: &str,
) -> Result<Vec<(ChapterId, ProgressRecord)>> {
    list_docs(store, policy, &DocPath::progress_collection(user_id))
        .await?
        .into_iter()
        .map(|(path, doc)| -> Result<(ChapterId, ProgressRecord)> {
            let record = from_document(&path, doc)?;
            Ok((path.id().to_string(), record))
        })
        .collect()
}

/// Fetches the proficiency record, or `None` if it was never written.
pub async fn load_proficiency(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    user_id: &str,
    topic_id: &str,
) -> Result<Option<ProficiencyRecord>> {
    let path = DocPath::proficiency(user_id, topic_id);
    match get_doc(store, policy, &path).await? {
        Some(doc) => from_document(&path, doc).map(Some),
        None => Ok(None),
    }
}

pub async fn load_profile(
    store: &dyn DocumentStore,
    policy: &RetryPolicy,
    user_id: &str,
) -> Result<UserProfile> {
    let path = DocPath::user(user_id);
    let doc = get_doc(store, policy, &path)
        .await?
        .ok_or_else(|| TutorError::NotFound(path.to_string()))?;
    from_document(&path, doc)
}
