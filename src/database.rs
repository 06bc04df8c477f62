// src/database.rs

use crate::error::{Result, TutorError};
use crate::store::{DocPath, Document, DocumentStore, WriteOp, WriteResult};
use async_trait::async_trait;
use log::{debug, info};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Creates the document table if it does not exist yet.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    debug!("[Store] init_db: Checking database schema...");

    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS documents (
            path TEXT PRIMARY KEY,
            parent TEXT NOT NULL,
            body TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_documents_parent ON documents (parent);
        ",
    )?;

    let count: i64 = conn.query_row("SELECT count(*) FROM documents", [], |row| row.get(0))?;
    debug!("[Store] init_db: {} document(s) present", count);
    Ok(())
}

/// Document store backed by a single SQLite table. Every `apply` runs in
/// one SQL transaction on a blocking thread.
#[derive(Clone)]
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        info!("[Store] Opening SQLite store at {:?}", path);
        let conn = Connection::open(path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        init_db(&conn)?;
        Ok(SqliteStore {
            db: Arc::new(Mutex::new(conn)),
        })
    }

    async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        tokio::task::spawn_blocking(move || {
            let mut conn = db
                .lock()
                .map_err(|_| TutorError::TransientIo("sqlite connection poisoned".to_string()))?;
            f(&mut *conn)
        })
        .await?
    }
}

fn load_doc(conn: &Connection, path: &str) -> Result<Option<Document>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM documents WHERE path = ?",
            [path],
            |row| row.get(0),
        )
        .optional()?;
    match body {
        Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
        None => Ok(None),
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn get(&self, path: &DocPath) -> Result<Option<Document>> {
        let path = path.as_str().to_string();
        self.with_conn(move |conn| load_doc(conn, &path)).await
    }

    async fn list(&self, collection: &DocPath) -> Result<Vec<(DocPath, Document)>> {
        let parent = collection.as_str().to_string();
        self.with_conn(move |conn| {
            let mut stmt =
                conn.prepare("SELECT path, body FROM documents WHERE parent = ? ORDER BY path")?;
            let rows = stmt
                .query_map([&parent], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            rows.into_iter()
                .map(|(path, body)| -> Result<(DocPath, Document)> {
                    Ok((DocPath::new(path), serde_json::from_str(&body)?))
                })
                .collect::<Result<Vec<_>>>()
        })
        .await
    }

    async fn apply(&self, ops: Vec<WriteOp>) -> Result<Vec<WriteResult>> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let mut staged: BTreeMap<String, (String, Document)> = BTreeMap::new();
            let mut results = Vec::with_capacity(ops.len());

            for op in &ops {
                let key = op.path().as_str();
                let current = match staged.get(key) {
                    Some((_, doc)) => Some(doc.clone()),
                    None => load_doc(&tx, key)?,
                };
                let (doc, result) = op.apply_to(current)?;
                staged.insert(key.to_string(), (op.path().parent().to_string(), doc));
                results.push(result);
            }

            {
                let mut stmt = tx.prepare(
                    "INSERT OR REPLACE INTO documents (path, parent, body) VALUES (?, ?, ?)",
                )?;
                for (path, (parent, doc)) in &staged {
                    stmt.execute(params![path, parent, serde_json::to_string(doc)?])?;
                }
            }

            // Dropping `tx` on an early return above rolls everything back.
            tx.commit()?;
            debug!("[Store] Committed {} op(s) to SQLite", results.len());
            Ok(results)
        })
        .await
    }
}
