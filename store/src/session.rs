//! Session store: per-source-key session history, backed by
//! SQLite for crash safety with an in-memory fallback
//! (`parking_lot::Mutex<HashMap<..>>`) when the durable path can't be
//! opened, per spec's explicit fallback requirement.

use std::collections::HashMap;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{OptionalExtension, params};
use sentinel_types::{Session, SessionId, Turn};

use crate::sqlite_util::open_secure_db;

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("session capacity ({0}) reached")]
    CapacityReached(usize),
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sessions (
    source_key TEXT PRIMARY KEY,
    session_json TEXT NOT NULL
);
";

enum Backend {
    Sqlite(Mutex<rusqlite::Connection>),
    InMemory(Mutex<HashMap<String, Session>>),
}

pub struct SessionStore {
    backend: Backend,
    ttl_ms: i64,
    capacity: usize,
}

impl SessionStore {
    /// Opens the durable backend at `path`; if that fails (e.g. read-only
    /// filesystem), falls back to an in-memory map and logs a warning
    /// rather than refusing to start.
    #[must_use]
    pub fn open_or_fallback(path: &Path, ttl_ms: i64, capacity: usize) -> Self {
        match open_secure_db(path).and_then(|conn| {
            conn.execute_batch(SCHEMA)?;
            Ok(conn)
        }) {
            Ok(conn) => Self {
                backend: Backend::Sqlite(Mutex::new(conn)),
                ttl_ms,
                capacity,
            },
            Err(error) => {
                tracing::warn!(%error, "session store durable backend unavailable, falling back to in-memory");
                Self {
                    backend: Backend::InMemory(Mutex::new(HashMap::new())),
                    ttl_ms,
                    capacity,
                }
            }
        }
    }

    #[must_use]
    pub fn in_memory(ttl_ms: i64, capacity: usize) -> Self {
        Self {
            backend: Backend::InMemory(Mutex::new(HashMap::new())),
            ttl_ms,
            capacity,
        }
    }

    fn load(&self, source_key: &str) -> Result<Option<Session>, SessionStoreError> {
        match &self.backend {
            Backend::Sqlite(conn) => {
                let conn = conn.lock();
                let json: Option<String> = conn
                    .query_row(
                        "SELECT session_json FROM sessions WHERE source_key = ?1",
                        params![source_key],
                        |row| row.get(0),
                    )
                    .optional()?;
                json.map(|j| serde_json::from_str(&j)).transpose().map_err(Into::into)
            }
            Backend::InMemory(map) => Ok(map.lock().get(source_key).cloned()),
        }
    }

    fn save(&self, session: &Session) -> Result<(), SessionStoreError> {
        match &self.backend {
            Backend::Sqlite(conn) => {
                let json = serde_json::to_string(session)?;
                let conn = conn.lock();
                conn.execute(
                    "INSERT OR REPLACE INTO sessions (source_key, session_json) VALUES (?1, ?2)",
                    params![session.source_key, json],
                )?;
                Ok(())
            }
            Backend::InMemory(map) => {
                map.lock().insert(session.source_key.clone(), session.clone());
                Ok(())
            }
        }
    }

    fn count(&self) -> Result<usize, SessionStoreError> {
        match &self.backend {
            Backend::Sqlite(conn) => {
                let conn = conn.lock();
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
                Ok(count as usize)
            }
            Backend::InMemory(map) => Ok(map.lock().len()),
        }
    }

    /// Returns the session for `source_key`, expiring it first if its TTL
    /// has elapsed, or creates a fresh one if none exists (or global
    /// capacity has not yet been reached).
    pub fn get_or_create(
        &self,
        source_key: &str,
        now_unix_ms: i64,
    ) -> Result<Session, SessionStoreError> {
        if let Some(mut session) = self.load(source_key)? {
            if now_unix_ms - session.last_seen_unix_ms > self.ttl_ms {
                session = Session::new(SessionId::generate(), source_key, now_unix_ms);
                self.save(&session)?;
            }
            return Ok(session);
        }

        if self.count()? >= self.capacity {
            return Err(SessionStoreError::CapacityReached(self.capacity));
        }

        let session = Session::new(SessionId::generate(), source_key, now_unix_ms);
        self.save(&session)?;
        Ok(session)
    }

    pub fn append_turn(
        &self,
        source_key: &str,
        turn: Turn,
        added_risk: f64,
        now_unix_ms: i64,
    ) -> Result<Session, SessionStoreError> {
        let mut session = self
            .load(source_key)?
            .unwrap_or_else(|| Session::new(SessionId::generate(), source_key, now_unix_ms));
        session.record_turn(turn, added_risk, now_unix_ms);
        self.save(&session)?;
        Ok(session)
    }

    /// Read-only lookup by source key, with no TTL-expiry or creation
    /// side effect (used by the debug session-state endpoint).
    pub fn get(&self, source_key: &str) -> Result<Option<Session>, SessionStoreError> {
        self.load(source_key)
    }

    pub fn mark_locked(&self, source_key: &str) -> Result<(), SessionStoreError> {
        if let Some(mut session) = self.load(source_key)? {
            session.lock();
            self.save(&session)?;
        }
        Ok(())
    }

    /// Expires a session if its TTL has elapsed, returning whether it was
    /// expired.
    pub fn expire(&self, source_key: &str, now_unix_ms: i64) -> Result<bool, SessionStoreError> {
        let Some(session) = self.load(source_key)? else {
            return Ok(false);
        };
        if now_unix_ms - session.last_seen_unix_ms > self.ttl_ms {
            let fresh = Session::new(SessionId::generate(), source_key, now_unix_ms);
            self.save(&fresh)?;
            return Ok(true);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_is_idempotent_within_ttl() {
        let store = SessionStore::in_memory(3600_000, 10);
        let first = store.get_or_create("source-a", 0).unwrap();
        let second = store.get_or_create("source-a", 1000).unwrap();
        assert_eq!(first.session_id, second.session_id);
    }

    #[test]
    fn session_resets_after_ttl_elapses() {
        let store = SessionStore::in_memory(1000, 10);
        let first = store.get_or_create("source-a", 0).unwrap();
        let second = store.get_or_create("source-a", 5000).unwrap();
        assert_ne!(first.session_id, second.session_id);
    }

    #[test]
    fn capacity_limit_is_enforced() {
        let store = SessionStore::in_memory(3600_000, 1);
        store.get_or_create("source-a", 0).unwrap();
        assert!(store.get_or_create("source-b", 0).is_err());
    }

    #[test]
    fn locking_persists() {
        let store = SessionStore::in_memory(3600_000, 10);
        store.get_or_create("source-a", 0).unwrap();
        store.mark_locked("source-a").unwrap();
        let session = store.get_or_create("source-a", 1).unwrap();
        assert!(session.locked);
    }
}
