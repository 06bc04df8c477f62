// src/store.rs

use crate::error::{Result, TutorError};
use async_trait::async_trait;
use log::debug;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use tokio::sync::RwLock;

pub type Document = Map<String, Value>;

// --- Paths ---

/// Slash-separated document path, e.g. `users/u1/progress/c3`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DocPath(String);

impl DocPath {
    pub fn new(raw: impl Into<String>) -> Self {
        DocPath(raw.into())
    }

    pub fn user(user_id: &str) -> Self {
        DocPath(format!("users/{}", user_id))
    }

    pub fn progress_collection(user_id: &str) -> Self {
        DocPath(format!("users/{}/progress", user_id))
    }

    pub fn progress(user_id: &str, chapter_id: &str) -> Self {
        DocPath(format!("users/{}/progress/{}", user_id, chapter_id))
    }

    pub fn proficiency(user_id: &str, topic_id: &str) -> Self {
        DocPath(format!("users/{}/proficiency/{}", user_id, topic_id))
    }

    pub fn survey_response(user_id: &str, kind: &str) -> Self {
        DocPath(format!("users/{}/surveys/{}", user_id, kind))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The collection this document lives in; empty for top-level paths.
    pub fn parent(&self) -> &str {
        self.0.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
    }

    pub fn id(&self) -> &str {
        self.0.rsplit_once('/').map(|(_, id)| id).unwrap_or(&self.0)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Writes ---

#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Create or replace the whole document.
    Set { path: DocPath, doc: Document },
    /// Overwrite the given fields of an existing document.
    Merge { path: DocPath, fields: Document },
    /// Push onto an array field of an existing document.
    Append {
        path: DocPath,
        field: String,
        value: Value,
    },
    /// Add `by` to an integer field, clamped at `max` when given.
    Increment {
        path: DocPath,
        field: String,
        by: i64,
        max: Option<i64>,
    },
}

impl WriteOp {
    pub fn path(&self) -> &DocPath {
        match self {
            WriteOp::Set { path, .. }
            | WriteOp::Merge { path, .. }
            | WriteOp::Append { path, .. }
            | WriteOp::Increment { path, .. } => path,
        }
    }

    /// Applies the op to the current state of its document.
    pub fn apply_to(&self, current: Option<Document>) -> Result<(Document, WriteResult)> {
        let missing = || TutorError::NotFound(self.path().to_string());
        match self {
            WriteOp::Set { doc, .. } => Ok((doc.clone(), WriteResult::Written)),
            WriteOp::Merge { fields, .. } => {
                let mut doc = current.ok_or_else(missing)?;
                for (k, v) in fields {
                    doc.insert(k.clone(), v.clone());
                }
                Ok((doc, WriteResult::Written))
            }
            WriteOp::Append { field, value, .. } => {
                let mut doc = current.ok_or_else(missing)?;
                let slot = doc
                    .entry(field.clone())
                    .or_insert_with(|| Value::Array(Vec::new()));
                let arr = slot.as_array_mut().ok_or_else(|| {
                    TutorError::Corrupt(format!("{}.{} is not an array", self.path(), field))
                })?;
                arr.push(value.clone());
                let len = arr.len();
                Ok((doc, WriteResult::Length(len)))
            }
            WriteOp::Increment { field, by, max, .. } => {
                let mut doc = current.ok_or_else(missing)?;
                let old = match doc.get(field) {
                    None | Some(Value::Null) => 0,
                    Some(v) => v.as_i64().ok_or_else(|| {
                        TutorError::Corrupt(format!("{}.{} is not an integer", self.path(), field))
                    })?,
                };
                let mut new = old.saturating_add(*by);
                if let Some(cap) = max {
                    new = new.min((*cap).max(old));
                }
                doc.insert(field.clone(), Value::from(new));
                Ok((doc, WriteResult::Counter(new)))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteResult {
    Written,
    /// New length of the array after an append.
    Length(usize),
    /// New value of the counter after an increment.
    Counter(i64),
}

/// Applies `ops` in order against `docs`. Either every op succeeds and the
/// map is updated, or the map is left untouched.
pub fn apply_ops(docs: &mut BTreeMap<String, Document>, ops: &[WriteOp]) -> Result<Vec<WriteResult>> {
    let mut staged: BTreeMap<String, Document> = BTreeMap::new();
    let mut results = Vec::with_capacity(ops.len());
    for op in ops {
        let key = op.path().as_str();
        let current = staged.get(key).or_else(|| docs.get(key)).cloned();
        let (doc, result) = op.apply_to(current)?;
        staged.insert(key.to_string(), doc);
        results.push(result);
    }
    docs.extend(staged);
    Ok(results)
}

// --- Store Interface ---

/// Narrow interface to the backing document database.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>>;

    /// Direct children of `collection`, ordered by path.
    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>>;

    /// Commits every op atomically, or none of them.
    async fn apply(&self, ops: Vec<WriteOp>) -> Result<Vec<WriteResult>>;

    async fn set(&self, path: &DocPath, doc: Document) -> Result<()> {
        self.apply(vec![WriteOp::Set {
            path: path.clone(),
            doc,
        }])
        .await
        .map(|_| ())
    }

    async fn merge(&self, path: &DocPath, fields: Document) -> Result<()> {
        self.apply(vec![WriteOp::Merge {
            path: path.clone(),
            fields,
        }])
        .await
        .map(|_| ())
    }

    async fn append(&self, path: &DocPath, field: &str, value: Value) -> Result<usize> {
        let results = self
            .apply(vec![WriteOp::Append {
                path: path.clone(),
                field: field.to_string(),
                value,
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

    async fn increment(&self, path: &DocPath, field: &str, by: i64, max: Option<i64>) -> Result<i64> {
        let results = self
            .apply(vec![WriteOp::Increment {
                path: path.clone(),
                field: field.to_string(),
                by,
                max,
            }])
            .await?;
        match results.first() {
            Some(WriteResult::Counter(n)) => Ok(*n),
            other => Err(TutorError::Corrupt(format!(
                "increment on {} returned {:?}",
                path, other
            ))),
        }
    }

    async fn commit(&self, batch: Vec<WriteOp>) -> Result<()> {
        self.apply(batch).await.map(|_| ())
    }
}

// --- In-Memory Store ---

#[derive(Default)]
pub struct MemoryStore {
    docs: RwLock<BTreeMap<String, Document>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        Ok(self.docs.read().await.get(path.as_str()).cloned())
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>> {
        let docs = self.docs.read().await;
        Ok(docs
            .iter()
            .map(|(k, v)| (DocPath::new(k.clone()), v))
            .filter(|(p, _)| p.parent() == collection.as_str())
            .map(|(p, v)| (p, v.clone()))
            .collect())
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<Vec<WriteResult>> {
        let mut docs = self.docs.write().await;
        let results = apply_ops(&mut docs, &ops)?;
        debug!("[Store] Applied {} op(s) in memory", results.len());
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(v: Value) -> Document {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn paths_know_their_parent() {
        let p = DocPath::progress("u1", "c3");
        assert_eq!(p.as_str(), "users/u1/progress/c3");
        assert_eq!(p.parent(), "users/u1/progress");
        assert_eq!(p.id(), "c3");
        assert_eq!(DocPath::new("users").parent(), "");
    }

    #[test]
    fn increment_is_clamped_at_max() {
        let op = WriteOp::Increment {
            path: DocPath::new("a/b"),
            field: "level".into(),
            by: 1,
            max: Some(2),
        };
        let (d, r) = op.apply_to(Some(doc(json!({"level": 2})))).unwrap();
        assert_eq!(r, WriteResult::Counter(2));
        assert_eq!(d["level"], json!(2));
        let (_, r) = op.apply_to(Some(doc(json!({})))).unwrap();
        assert_eq!(r, WriteResult::Counter(1));
    }

    #[test]
    fn failed_batch_leaves_documents_untouched() {
        let mut docs = BTreeMap::new();
        docs.insert("a/b".to_string(), doc(json!({"n": 1})));
        let ops = vec![
            WriteOp::Merge {
                path: DocPath::new("a/b"),
                fields: doc(json!({"n": 5})),
            },
            WriteOp::Merge {
                path: DocPath::new("a/missing"),
                fields: doc(json!({"n": 5})),
            },
        ];
        let err = apply_ops(&mut docs, &ops).unwrap_err();
        assert!(matches!(err, TutorError::NotFound(_)));
        assert_eq!(docs["a/b"]["n"], json!(1));
    }

    #[tokio::test]
    async fn memory_store_append_and_list() {
        let store = MemoryStore::new();
        let path = DocPath::progress("u1", "c1");
        store
            .set(&path, doc(json!({"complete": false, "attempts": []})))
            .await
            .unwrap();
        store
            .set(&DocPath::progress("u1", "c2"), doc(json!({"complete": true})))
            .await
            .unwrap();
        store
            .set(&DocPath::proficiency("u1", "t1"), doc(json!({"level": 0})))
            .await
            .unwrap();

        assert_eq!(store.append(&path, "attempts", json!({"score": 10})).await.unwrap(), 1);
        assert_eq!(store.append(&path, "attempts", json!({"score": 90})).await.unwrap(), 2);

        let listed = store.list(&DocPath::progress_collection("u1")).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].0.id(), "c1");

        let err = store
            .append(&DocPath::progress("u1", "nope"), "attempts", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, TutorError::NotFound(_)));
    }
}
