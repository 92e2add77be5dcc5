use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::fingerprint::Fingerprint;
use crate::models::{SeenRecord, SessionStatus};

/// SQLite-backed persistence: the fingerprint ledger plus the serialized
/// browsing session. The ledger is the only correctness-critical state in
/// the core; any failure here is fatal for the run.
pub struct Store {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS fingerprints (
    fingerprint   TEXT PRIMARY KEY,
    first_seen_at TEXT NOT NULL,
    notified_at   TEXT
);
CREATE TABLE IF NOT EXISTS session (
    id         TEXT PRIMARY KEY,
    blob       TEXT NOT NULL,
    status     TEXT NOT NULL,
    updated_at TEXT NOT NULL
);
";

const SESSION_ROW: &str = "default";

impl Store {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        if let Some(parent) = path.as_ref().parent() {
            // Ignore failure here; the open below reports a usable error.
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        info!(path = %path.as_ref().display(), "store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Record the fingerprint if it has never been seen. Returns true iff
    /// this call created the record; the INSERT OR IGNORE plus the changed
    /// row count make the check-and-insert atomic at the storage layer.
    pub fn insert_if_new(&self, fp: &Fingerprint) -> Result<bool, StorageError> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            "INSERT OR IGNORE INTO fingerprints (fingerprint, first_seen_at) VALUES (?1, ?2)",
            params![fp.as_str(), Utc::now().to_rfc3339()],
        )?;
        debug!(fingerprint = fp.as_str(), new = changed == 1, "ledger gate");
        Ok(changed == 1)
    }

    /// Stamp the delivery confirmation. Idempotent: only a NULL
    /// `notified_at` is ever written, so the first stamp sticks.
    pub fn mark_notified(&self, fp: &Fingerprint) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE fingerprints SET notified_at = ?1
             WHERE fingerprint = ?2 AND notified_at IS NULL",
            params![Utc::now().to_rfc3339(), fp.as_str()],
        )?;
        Ok(())
    }

    pub fn get_seen(&self, fp: &Fingerprint) -> Result<Option<SeenRecord>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let record = conn
            .query_row(
                "SELECT fingerprint, first_seen_at, notified_at
                 FROM fingerprints WHERE fingerprint = ?1",
                params![fp.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                    ))
                },
            )
            .optional()?;

        Ok(record.map(|(fingerprint, first_seen, notified)| SeenRecord {
            fingerprint,
            first_seen_at: parse_ts(&first_seen),
            notified_at: notified.as_deref().map(parse_ts),
        }))
    }

    pub fn seen_count(&self) -> Result<i64, StorageError> {
        let conn = self.conn.lock().unwrap();
        Ok(conn.query_row("SELECT COUNT(*) FROM fingerprints", [], |row| row.get(0))?)
    }

    /// Persisted session blob and its last recorded status, if any.
    pub fn load_session(&self) -> Result<Option<(String, SessionStatus)>, StorageError> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT blob, status FROM session WHERE id = ?1",
                params![SESSION_ROW],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        Ok(row.map(|(blob, status)| (blob, parse_status(&status))))
    }

    pub fn save_session(&self, blob: &str, status: SessionStatus) -> Result<(), StorageError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO session (id, blob, status, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(id) DO UPDATE SET
                 blob = excluded.blob,
                 status = excluded.status,
                 updated_at = excluded.updated_at",
            params![
                SESSION_ROW,
                blob,
                status.as_str(),
                Utc::now().to_rfc3339()
            ],
        )?;
        Ok(())
    }
}

fn parse_ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

fn parse_status(s: &str) -> SessionStatus {
    match s {
        "valid" => SessionStatus::Valid,
        "expired" => SessionStatus::Expired,
        "challenged" => SessionStatus::Challenged,
        "credentials_invalid" => SessionStatus::CredentialsInvalid,
        "authenticating" => SessionStatus::Authenticating,
        _ => SessionStatus::Unauthenticated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawPost;
    use chrono::Utc;
    use tempfile::TempDir;

    fn fingerprint(text: &str) -> Fingerprint {
        let post = RawPost {
            source_id: "g1".to_string(),
            post_id: "p1".to_string(),
            author_id: "a1".to_string(),
            raw_text: text.to_string(),
            posted_at: None,
            url: String::new(),
            scraped_at: Utc::now(),
        };
        Fingerprint::of(&post, 24)
    }

    #[test]
    fn insert_if_new_is_true_exactly_once() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let fp = fingerprint("3 rooms florentin");

        assert!(store.insert_if_new(&fp).unwrap());
        assert!(!store.insert_if_new(&fp).unwrap());
        assert!(!store.insert_if_new(&fp).unwrap());
        assert_eq!(store.seen_count().unwrap(), 1);
    }

    #[test]
    fn ledger_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.db");
        let fp = fingerprint("persistent listing");

        {
            let store = Store::open(&path).unwrap();
            assert!(store.insert_if_new(&fp).unwrap());
        }

        let store = Store::open(&path).unwrap();
        assert!(!store.insert_if_new(&fp).unwrap());
        assert_eq!(store.seen_count().unwrap(), 1);
    }

    #[test]
    fn mark_notified_stamps_once_and_only_once() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        let fp = fingerprint("notify me");

        store.insert_if_new(&fp).unwrap();
        store.mark_notified(&fp).unwrap();
        let first = store.get_seen(&fp).unwrap().unwrap().notified_at.unwrap();

        std::thread::sleep(std::time::Duration::from_millis(10));
        store.mark_notified(&fp).unwrap();
        let second = store.get_seen(&fp).unwrap().unwrap().notified_at.unwrap();

        assert_eq!(first, second, "notified_at must never be overwritten");
    }

    #[test]
    fn unseen_fingerprint_has_no_record() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();
        assert!(store.get_seen(&fingerprint("never seen")).unwrap().is_none());
    }

    #[test]
    fn session_blob_round_trips_with_status() {
        let dir = TempDir::new().unwrap();
        let store = Store::open(dir.path().join("test.db")).unwrap();

        assert!(store.load_session().unwrap().is_none());

        store
            .save_session(r#"{"cookies":[]}"#, SessionStatus::Valid)
            .unwrap();
        let (blob, status) = store.load_session().unwrap().unwrap();
        assert_eq!(blob, r#"{"cookies":[]}"#);
        assert_eq!(status, SessionStatus::Valid);

        store
            .save_session(r#"{"cookies":["x"]}"#, SessionStatus::Expired)
            .unwrap();
        let (blob, status) = store.load_session().unwrap().unwrap();
        assert_eq!(blob, r#"{"cookies":["x"]}"#);
        assert_eq!(status, SessionStatus::Expired);
    }
}
