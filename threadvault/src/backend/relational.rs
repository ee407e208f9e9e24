//! SQLite relational store, the last-resort backend for exact-id lookups
//!
//! Records are stored as JSON documents, one per row, in the `comment` and
//! `submission` tables (`json TEXT` column). The store only reads; the
//! schema is owned by whatever loads the archive.

use crate::backend::{RelationalStore, RelationalTemplate, Row};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::{json, Value};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info, warn};

const LOOKUP_LIMIT: usize = 5_000;
const COMMENT_IDS_LIMIT: usize = 50_000;

/// Bounded pool of read-only SQLite connections
pub struct SqliteStore {
    connections: Arc<Mutex<Vec<Connection>>>,
    permits: Arc<Semaphore>,
    acquire_timeout: Duration,
}

/// A checked-out connection, returned to the pool on drop
struct PooledConnection {
    conn: Option<Connection>,
    pool: Arc<Mutex<Vec<Connection>>>,
    _permit: OwnedSemaphorePermit,
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.lock().push(conn);
        }
    }
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>, pool_size: usize, acquire_timeout: Duration) -> Result<Self> {
        let path = path.as_ref();
        let mut connections = Vec::with_capacity(pool_size);
        for _ in 0..pool_size {
            let conn = Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?;
            conn.busy_timeout(acquire_timeout)?;
            connections.push(conn);
        }

        info!(
            "Opened relational store {} with {} connections",
            path.display(),
            pool_size
        );

        Ok(Self {
            connections: Arc::new(Mutex::new(connections)),
            permits: Arc::new(Semaphore::new(pool_size)),
            acquire_timeout,
        })
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    async fn acquire(&self) -> Result<PooledConnection> {
        let permit = tokio::time::timeout(self.acquire_timeout, self.permits.clone().acquire_owned())
            .await
            .map_err(|_| {
                Error::ServiceUnavailable(format!(
                    "no relational connection free within {}ms",
                    self.acquire_timeout.as_millis()
                ))
            })?
            .map_err(|_| Error::ServiceUnavailable("relational pool closed".into()))?;

        let conn = self
            .connections
            .lock()
            .pop()
            .ok_or_else(|| Error::Internal("relational pool permit without connection".into()))?;

        Ok(PooledConnection {
            conn: Some(conn),
            pool: Arc::clone(&self.connections),
            _permit: permit,
        })
    }

    /// `SELECT 1` on a pooled connection
    pub async fn ping(&self) -> bool {
        let Ok(pooled) = self.acquire().await else {
            return false;
        };
        tokio::task::spawn_blocking(move || {
            pooled
                .conn
                .as_ref()
                .map(|conn| conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok())
                .unwrap_or(false)
        })
        .await
        .unwrap_or(false)
    }
}

#[async_trait]
impl RelationalStore for SqliteStore {
    async fn query(&self, template: RelationalTemplate, params: &[u64]) -> Result<Vec<Row>> {
        let pooled = self.acquire().await?;
        let params = params.to_vec();

        let rows = tokio::task::spawn_blocking(move || match pooled.conn.as_ref() {
            Some(conn) => run_template(conn, template, &params),
            None => Err(Error::Internal("pooled connection missing".into())),
        })
        .await
        .map_err(|e| Error::Internal(format!("relational task failed: {e}")))??;

        debug!("{} returned {} rows", template.as_str(), rows.len());
        Ok(rows)
    }
}

fn run_template(conn: &Connection, template: RelationalTemplate, ids: &[u64]) -> Result<Vec<Row>> {
    match template {
        RelationalTemplate::CommentsByIds => documents_by_ids(conn, "comment", ids),
        RelationalTemplate::SubmissionsByIds => documents_by_ids(conn, "submission", ids),
        RelationalTemplate::CommentIdsBySubmission => {
            let Some(link_id) = ids.first().and_then(|id| i64::try_from(*id).ok()) else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare_cached(&format!(
                "SELECT json_extract(json, '$.id') AS id FROM comment \
                 WHERE json_extract(json, '$.link_id') = ?1 \
                 ORDER BY id ASC LIMIT {COMMENT_IDS_LIMIT}"
            ))?;
            let ids = stmt.query_map(params![link_id], |row| row.get::<_, i64>(0))?;

            let mut rows = Vec::new();
            for id in ids {
                if let Value::Object(row) = json!({ "id": id? }) {
                    rows.push(row);
                }
            }
            Ok(rows)
        }
    }
}

fn documents_by_ids(conn: &Connection, table: &str, ids: &[u64]) -> Result<Vec<Row>> {
    let id_list = Value::from(ids.to_vec()).to_string();
    let mut stmt = conn.prepare_cached(&format!(
        "SELECT json FROM {table} \
         WHERE json_extract(json, '$.id') IN (SELECT value FROM json_each(?1)) \
         ORDER BY json_extract(json, '$.id') ASC LIMIT {LOOKUP_LIMIT}"
    ))?;
    let docs = stmt.query_map(params![id_list], |row| row.get::<_, String>(0))?;

    let mut rows = Vec::new();
    for doc in docs {
        match serde_json::from_str::<Value>(&doc?)? {
            Value::Object(row) => rows.push(row),
            other => warn!("Skipping non-object {} row: {}", table, other),
        }
    }
    Ok(rows)
}
