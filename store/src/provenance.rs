//! Provenance store: persistent `DataId -> TaggedData` map plus a secondary
//! `workspace path -> writer DataId` map, with LRU eviction past a
//! configured capacity. Uses the same `parking_lot::Mutex`-guarded
//! `rusqlite::Connection` pattern the session and approval stores share.

use std::collections::VecDeque;
use std::path::Path;

use parking_lot::Mutex;
use rusqlite::{OptionalExtension, params};
use sentinel_types::{DataId, DataSource, ScanResult, TaggedData, TrustLevel};

use crate::sqlite_util::open_secure_db;

#[derive(Debug, thiserror::Error)]
pub enum ProvenanceStoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("unknown data id")]
    UnknownDataId,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tagged_data (
    id TEXT PRIMARY KEY,
    content_digest TEXT NOT NULL,
    source TEXT NOT NULL,
    trust TEXT NOT NULL,
    scan_summary_json TEXT,
    derived_from_json TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS file_writers (
    path TEXT PRIMARY KEY,
    writer_data_id TEXT NOT NULL
);
";

pub struct ProvenanceStore {
    conn: Mutex<rusqlite::Connection>,
    capacity: usize,
    insertion_order: Mutex<VecDeque<DataId>>,
}

impl ProvenanceStore {
    pub fn open(path: &Path, capacity: usize) -> Result<Self, ProvenanceStoreError> {
        let conn = open_secure_db(path).map_err(|e| {
            rusqlite::Error::InvalidPath(std::path::PathBuf::from(e.to_string()))
        })?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            capacity,
            insertion_order: Mutex::new(VecDeque::new()),
        })
    }

    #[must_use]
    pub fn open_in_memory(capacity: usize) -> Self {
        let conn = rusqlite::Connection::open_in_memory().expect("in-memory sqlite always opens");
        conn.execute_batch(SCHEMA).expect("schema is valid SQL");
        Self {
            conn: Mutex::new(conn),
            capacity,
            insertion_order: Mutex::new(VecDeque::new()),
        }
    }

    /// Create a new tagged-data record, applying the union rule: the
    /// resulting trust is `declared_trust` unioned with every parent's
    /// trust.
    pub fn create_tagged_data(
        &self,
        source: DataSource,
        declared_trust: TrustLevel,
        content_digest: impl Into<String>,
        derived_from: Vec<DataId>,
    ) -> Result<DataId, ProvenanceStoreError> {
        let mut trust = declared_trust;
        for parent in &derived_from {
            let parent_trust = self.get(*parent)?.map(|d| d.trust).unwrap_or(TrustLevel::Untrusted);
            trust = trust.union(parent_trust);
        }

        let id = DataId::generate();
        let item = TaggedData::new(id, content_digest, source, trust, derived_from);
        self.insert(&item)?;
        Ok(id)
    }

    fn insert(&self, item: &TaggedData) -> Result<(), ProvenanceStoreError> {
        let derived_from_json = serde_json::to_string(&item.derived_from)?;
        let scan_summary_json = item
            .scan_summary
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let source_str = serde_json::to_string(&item.source)?;
        let trust_str = serde_json::to_string(&item.trust)?;

        {
            let conn = self.conn.lock();
            conn.execute(
                "INSERT OR REPLACE INTO tagged_data (id, content_digest, source, trust, scan_summary_json, derived_from_json) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                params![
                    item.id.to_string(),
                    item.content_digest,
                    source_str,
                    trust_str,
                    scan_summary_json,
                    derived_from_json,
                ],
            )?;
        }
        self.track_insertion(item.id)?;
        Ok(())
    }

    fn track_insertion(&self, id: DataId) -> Result<(), ProvenanceStoreError> {
        let mut order = self.insertion_order.lock();
        order.push_back(id);
        while order.len() > self.capacity {
            if let Some(oldest) = order.pop_front() {
                let conn = self.conn.lock();
                conn.execute(
                    "DELETE FROM tagged_data WHERE id = ?1",
                    params![oldest.to_string()],
                )?;
            }
        }
        Ok(())
    }

    pub fn get(&self, id: DataId) -> Result<Option<TaggedData>, ProvenanceStoreError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT content_digest, source, trust, scan_summary_json, derived_from_json FROM tagged_data WHERE id = ?1",
                params![id.to_string()],
                |row| {
                    let content_digest: String = row.get(0)?;
                    let source: String = row.get(1)?;
                    let trust: String = row.get(2)?;
                    let scan_summary_json: Option<String> = row.get(3)?;
                    let derived_from_json: String = row.get(4)?;
                    Ok((content_digest, source, trust, scan_summary_json, derived_from_json))
                },
            )
            .optional()?;

        let Some((content_digest, source, trust, scan_summary_json, derived_from_json)) = row else {
            return Ok(None);
        };

        let source: DataSource = serde_json::from_str(&source)?;
        let trust: TrustLevel = serde_json::from_str(&trust)?;
        let scan_summary: Option<ScanResult> = scan_summary_json
            .map(|s| serde_json::from_str(&s))
            .transpose()?;
        let derived_from: Vec<DataId> = serde_json::from_str(&derived_from_json)?;

        Ok(Some(TaggedData {
            id,
            content_digest,
            source,
            trust,
            scan_summary,
            derived_from,
        }))
    }

    /// Walks the transitive derivation closure breadth-first
    /// (cycle-protected via a visited set) and returns `true` iff every
    /// ancestor — including the starting ids themselves — is `Trusted`.
    pub fn is_trust_safe_for_execution(
        &self,
        arg_data_ids: &[DataId],
    ) -> Result<bool, ProvenanceStoreError> {
        let mut visited = std::collections::HashSet::new();
        let mut queue: VecDeque<DataId> = arg_data_ids.iter().copied().collect();

        while let Some(id) = queue.pop_front() {
            if !visited.insert(id) {
                continue;
            }
            let Some(item) = self.get(id)? else {
                return Err(ProvenanceStoreError::UnknownDataId);
            };
            if !item.trust.is_trusted() {
                return Ok(false);
            }
            for parent in item.derived_from {
                if !visited.contains(&parent) {
                    queue.push_back(parent);
                }
            }
        }
        Ok(true)
    }

    pub fn record_file_write(
        &self,
        path: &str,
        writer_data_id: DataId,
    ) -> Result<(), ProvenanceStoreError> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO file_writers (path, writer_data_id) VALUES (?1, ?2)",
            params![path, writer_data_id.to_string()],
        )?;
        Ok(())
    }

    pub fn get_file_writer(&self, path: &str) -> Result<Option<DataId>, ProvenanceStoreError> {
        let conn = self.conn.lock();
        let writer: Option<String> = conn
            .query_row(
                "SELECT writer_data_id FROM file_writers WHERE path = ?1",
                params![path],
                |row| row.get(0),
            )
            .optional()?;
        writer.map(|s| s.parse().map_err(|_| ProvenanceStoreError::UnknownDataId)).transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trusted_parent_chain_is_trust_safe() {
        let store = ProvenanceStore::open_in_memory(100);
        let root = store
            .create_tagged_data(DataSource::User, TrustLevel::Trusted, "digest-a", vec![])
            .unwrap();
        let child = store
            .create_tagged_data(DataSource::Tool, TrustLevel::Trusted, "digest-b", vec![root])
            .unwrap();
        assert!(store.is_trust_safe_for_execution(&[child]).unwrap());
    }

    #[test]
    fn untrusted_ancestor_poisons_whole_chain() {
        let store = ProvenanceStore::open_in_memory(100);
        let worker_output = store
            .create_tagged_data(DataSource::Worker, TrustLevel::Untrusted, "digest-w", vec![])
            .unwrap();
        let derived = store
            .create_tagged_data(
                DataSource::Tool,
                TrustLevel::Trusted,
                "digest-d",
                vec![worker_output],
            )
            .unwrap();
        assert!(!store.is_trust_safe_for_execution(&[derived]).unwrap());

        let fetched = store.get(derived).unwrap().unwrap();
        assert!(!fetched.trust.is_trusted());
    }

    #[test]
    fn file_writer_roundtrips() {
        let store = ProvenanceStore::open_in_memory(100);
        let writer = store
            .create_tagged_data(DataSource::Worker, TrustLevel::Untrusted, "digest", vec![])
            .unwrap();
        store.record_file_write("/workspace/out.txt", writer).unwrap();
        assert_eq!(store.get_file_writer("/workspace/out.txt").unwrap(), Some(writer));
        assert_eq!(store.get_file_writer("/workspace/other.txt").unwrap(), None);
    }

    #[test]
    fn capacity_evicts_oldest_entry() {
        let store = ProvenanceStore::open_in_memory(2);
        let a = store
            .create_tagged_data(DataSource::User, TrustLevel::Trusted, "a", vec![])
            .unwrap();
        let _b = store
            .create_tagged_data(DataSource::User, TrustLevel::Trusted, "b", vec![])
            .unwrap();
        let _c = store
            .create_tagged_data(DataSource::User, TrustLevel::Trusted, "c", vec![])
            .unwrap();
        assert!(store.get(a).unwrap().is_none());
    }

    #[test]
    fn persists_to_disk_and_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("provenance.db");
        let id = {
            let store = ProvenanceStore::open(&db_path, 100).unwrap();
            store
                .create_tagged_data(DataSource::User, TrustLevel::Trusted, "digest", vec![])
                .unwrap()
        };
        let reopened = ProvenanceStore::open(&db_path, 100).unwrap();
        assert!(reopened.get(id).unwrap().is_some());
    }
}
