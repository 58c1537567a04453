use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::info;

use secureorder_core::config::{AppConfig, CheckpointBackend};
use secureorder_core::error::{Result, SecureOrderError};
use secureorder_core::types::{Session, SessionId, SessionStatus, SessionSummary};

/// Durable map from session id to the latest session record.
///
/// A save replaces the whole record and is atomic with respect to loads.
pub trait CheckpointStore: Send + Sync + 'static {
    fn save(&self, session: &Session) -> Result<()>;

    fn load(&self, session_id: &SessionId) -> Result<Option<Session>>;

    /// All stored sessions, most recently updated first.
    fn list(&self) -> Result<Vec<SessionSummary>>;

    /// Remove a session. Returns whether a record existed.
    fn delete(&self, session_id: &SessionId) -> Result<bool>;
}

fn store_err(context: &str, e: impl std::fmt::Display) -> SecureOrderError {
    SecureOrderError::Checkpoint(format!("{}: {}", context, e))
}

fn lock<T>(m: &Mutex<T>) -> Result<MutexGuard<'_, T>> {
    m.lock().map_err(|e| store_err("store lock poisoned", e))
}

/// Open the checkpoint backend selected in config.
pub fn open_store(config: &AppConfig) -> Result<Arc<dyn CheckpointStore>> {
    match config.checkpoint.backend {
        CheckpointBackend::Sqlite => {
            let path = config.checkpoint_path();
            info!(path = %path.display(), "Opening SQLite checkpoint store");
            Ok(Arc::new(SqliteCheckpointStore::open(&path)?))
        }
        CheckpointBackend::Memory => {
            info!("Using in-memory checkpoint store");
            Ok(Arc::new(MemoryCheckpointStore::new()))
        }
    }
}

/// Persistent checkpoint store backed by SQLite, one row per session.
pub struct SqliteCheckpointStore {
    conn: Mutex<Connection>,
}

impl SqliteCheckpointStore {
    /// Open or create the checkpoint database.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let conn =
            Connection::open(path).map_err(|e| store_err("failed to open checkpoint store", e))?;
        Self::init(conn)
    }

    /// A private, non-persistent database. Mostly useful in tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| store_err("failed to open in-memory store", e))?;
        Self::init(conn)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA synchronous=NORMAL;

             CREATE TABLE IF NOT EXISTS checkpoints (
                 session_id TEXT PRIMARY KEY,
                 status TEXT NOT NULL,
                 pending_step TEXT,
                 next_step TEXT,
                 entry_count INTEGER NOT NULL,
                 session_json TEXT NOT NULL,
                 created_at TEXT NOT NULL,
                 updated_at TEXT NOT NULL
             );

             CREATE INDEX IF NOT EXISTS idx_cp_updated
                 ON checkpoints(updated_at DESC);",
        )
        .map_err(|e| store_err("failed to initialize checkpoint schema", e))?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CheckpointStore for SqliteCheckpointStore {
    fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        let conn = lock(&self.conn)?;
        conn.execute(
            "INSERT INTO checkpoints
                 (session_id, status, pending_step, next_step, entry_count, session_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(session_id) DO UPDATE SET
                 status = excluded.status,
                 pending_step = excluded.pending_step,
                 next_step = excluded.next_step,
                 entry_count = excluded.entry_count,
                 session_json = excluded.session_json,
                 updated_at = excluded.updated_at",
            params![
                session.session_id.as_str(),
                session.status.as_str(),
                session.pending_step.map(|s| s.as_str()),
                session.next_step.map(|s| s.as_str()),
                session.state.len() as i64,
                json,
                session.created_at.to_rfc3339(),
                session.updated_at.to_rfc3339(),
            ],
        )
        .map_err(|e| store_err("failed to save checkpoint", e))?;
        Ok(())
    }

    fn load(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let conn = lock(&self.conn)?;
        let json: Option<String> = conn
            .query_row(
                "SELECT session_json FROM checkpoints WHERE session_id = ?1",
                params![session_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(|e| store_err("failed to load checkpoint", e))?;

        match json {
            Some(json) => {
                let session = serde_json::from_str(&json)
                    .map_err(|e| store_err("corrupt checkpoint record", e))?;
                Ok(Some(session))
            }
            None => Ok(None),
        }
    }

    fn list(&self) -> Result<Vec<SessionSummary>> {
        let conn = lock(&self.conn)?;
        let mut stmt = conn
            .prepare(
                "SELECT session_id, status, entry_count, updated_at
                 FROM checkpoints
                 ORDER BY updated_at DESC",
            )
            .map_err(|e| store_err("failed to prepare query", e))?;

        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })
            .map_err(|e| store_err("failed to list checkpoints", e))?;

        let mut summaries = Vec::new();
        for row in rows {
            let (id, status, entries, updated_at) =
                row.map_err(|e| store_err("failed to read checkpoint row", e))?;
            let status: SessionStatus = status.parse()?;
            let updated_at = DateTime::parse_from_rfc3339(&updated_at)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(|e| store_err("bad timestamp", e))?;
            summaries.push(SessionSummary {
                session_id: SessionId::from(id),
                status,
                entries: entries as usize,
                updated_at,
            });
        }
        Ok(summaries)
    }

    fn delete(&self, session_id: &SessionId) -> Result<bool> {
        let conn = lock(&self.conn)?;
        let deleted = conn
            .execute(
                "DELETE FROM checkpoints WHERE session_id = ?1",
                params![session_id.as_str()],
            )
            .map_err(|e| store_err("failed to delete checkpoint", e))?;
        Ok(deleted > 0)
    }
}

/// Process-local checkpoint store. Records are kept serialized so a load
/// never aliases the engine's working copy.
#[derive(Default)]
pub struct MemoryCheckpointStore {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn save(&self, session: &Session) -> Result<()> {
        let json = serde_json::to_string(session)?;
        lock(&self.records)?.insert(session.session_id.to_string(), json);
        Ok(())
    }

    fn load(&self, session_id: &SessionId) -> Result<Option<Session>> {
        let records = lock(&self.records)?;
        records
            .get(session_id.as_str())
            .map(|json| serde_json::from_str(json).map_err(SecureOrderError::from))
            .transpose()
    }

    fn list(&self) -> Result<Vec<SessionSummary>> {
        let records = lock(&self.records)?;
        let mut summaries = records
            .values()
            .map(|json| serde_json::from_str::<Session>(json).map(|s| s.summary()))
            .collect::<std::result::Result<Vec<_>, _>>()?;
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(summaries)
    }

    fn delete(&self, session_id: &SessionId) -> Result<bool> {
        Ok(lock(&self.records)?.remove(session_id.as_str()).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secureorder_core::state::ConversationState;
    use secureorder_core::types::{Entry, StepName};

    fn suspended_session(id: &str) -> Session {
        let mut session = Session::new(SessionId::from(id));
        session.state = ConversationState::from_entries(vec![Entry::user("status of 1001?")]).unwrap();
        session.status = SessionStatus::Suspended;
        session.pending_step = Some(StepName::ToolExecution);
        session.next_step = None;
        session
    }

    fn exercise(store: &dyn CheckpointStore) {
        let id = SessionId::from("sess-1");
        assert!(store.load(&id).unwrap().is_none());

        let session = suspended_session("sess-1");
        store.save(&session).unwrap();
        assert_eq!(store.load(&id).unwrap().unwrap(), session);

        let mut updated = session.clone();
        updated.status = SessionStatus::Completed;
        updated.pending_step = None;
        updated.touch();
        store.save(&updated).unwrap();
        assert_eq!(store.load(&id).unwrap().unwrap().status, SessionStatus::Completed);

        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].entries, 1);

        assert!(store.delete(&id).unwrap());
        assert!(!store.delete(&id).unwrap());
        assert!(store.load(&id).unwrap().is_none());
    }

    #[test]
    fn sqlite_round_trip() {
        exercise(&SqliteCheckpointStore::in_memory().unwrap());
    }

    #[test]
    fn memory_round_trip() {
        exercise(&MemoryCheckpointStore::new());
    }

    #[test]
    fn sqlite_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("checkpoints.db");

        {
            let store = SqliteCheckpointStore::open(&path).unwrap();
            store.save(&suspended_session("durable")).unwrap();
        }

        let store = SqliteCheckpointStore::open(&path).unwrap();
        let loaded = store.load(&SessionId::from("durable")).unwrap().unwrap();
        assert!(loaded.is_suspended());
        assert_eq!(loaded.pending_step, Some(StepName::ToolExecution));
    }

    #[test]
    fn list_is_newest_first() {
        let store = MemoryCheckpointStore::new();
        let mut older = suspended_session("a");
        older.updated_at = Utc::now() - chrono::Duration::seconds(60);
        store.save(&older).unwrap();
        store.save(&suspended_session("b")).unwrap();

        let ids: Vec<String> = store
            .list()
            .unwrap()
            .into_iter()
            .map(|s| s.session_id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn open_store_respects_backend() {
        let mut config = AppConfig::default();
        config.checkpoint.backend = CheckpointBackend::Memory;
        let store = open_store(&config).unwrap();
        assert!(store.list().unwrap().is_empty());
    }
}
