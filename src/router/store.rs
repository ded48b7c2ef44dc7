//! Persistent SQLite store for user profiles, archived messages, and
//! vehicle-status rows.
//!
//! Write paths on the messaging flow (`upsert_user`, `append_message`) are
//! best-effort: a failure is logged and must never block the reply or
//! relay. Read paths return `Err` on I/O problems so callers can tell
//! "lookup failed" apart from "not found".

use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::Mutex;
use tracing::{info, warn};

/// Append-only archived inbound message. Never mutated or deleted.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedMessage {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub text: String,
    pub timestamp: String,
}

/// Current status of one tracked vehicle. Exactly one row per VIN;
/// upserts overwrite, no history is kept.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleStatusRecord {
    pub vin: String,
    pub status_text: String,
    pub reference: Option<String>,
    pub updated_at: String,
}

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the store at the given path.
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| format!("Failed to open store: {e}"))?;
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema()?;

        let (msg_count, status_count) = store.counts();
        info!("Opened store at {:?} ({} messages, {} vehicle rows)", path, msg_count, status_count);
        Ok(store)
    }

    /// In-memory store for tests.
    #[cfg(test)]
    pub fn in_memory() -> Self {
        let conn = Connection::open_in_memory().expect("Failed to create in-memory store");
        let store = Self { conn: Mutex::new(conn) };
        store.init_schema().expect("Failed to initialize schema");
        store
    }

    fn init_schema(&self) -> Result<(), String> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS users (
                user_id INTEGER PRIMARY KEY,
                username TEXT,
                first_seen TEXT NOT NULL,
                last_seen TEXT NOT NULL,
                message_count INTEGER DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                text TEXT NOT NULL,
                timestamp TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS vehicle_status (
                vin TEXT PRIMARY KEY,
                status_text TEXT NOT NULL,
                reference TEXT,
                updated_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_messages_user_id ON messages(user_id);
            CREATE INDEX IF NOT EXISTS idx_messages_timestamp ON messages(timestamp);
        "#,
        )
        .map_err(|e| format!("Failed to initialize store schema: {e}"))
    }

    fn counts(&self) -> (usize, usize) {
        let conn = self.conn.lock().expect("store lock poisoned");
        let msg_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |row| row.get(0))
            .unwrap_or(0);
        let status_count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vehicle_status", [], |row| row.get(0))
            .unwrap_or(0);
        (msg_count as usize, status_count as usize)
    }

    /// Insert-or-refresh the profile row for an identity. Best-effort:
    /// a profile-tracking failure never blocks messaging.
    pub fn upsert_user(&self, user_id: i64, username: Option<&str>, timestamp: &str) {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO users (user_id, username, first_seen, last_seen, message_count)
             VALUES (?1, ?2, ?3, ?3, 1)
             ON CONFLICT(user_id) DO UPDATE SET
                username = COALESCE(?2, username),
                last_seen = ?3,
                message_count = message_count + 1",
            params![user_id, username, timestamp],
        )
        .unwrap_or_else(|e| {
            warn!("Failed to upsert user {user_id}: {e}");
            0
        });
    }

    /// Archive an inbound message. Callers treat a failure as soft.
    pub fn append_message(
        &self,
        user_id: i64,
        username: &str,
        text: &str,
        timestamp: &str,
    ) -> Result<(), String> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO messages (user_id, username, text, timestamp) VALUES (?1, ?2, ?3, ?4)",
            params![user_id, username, text, timestamp],
        )
        .map_err(|e| format!("Failed to archive message: {e}"))?;
        Ok(())
    }

    /// Insert-or-overwrite the status row for a VIN. One statement, so
    /// concurrent updates to the same VIN are last-writer-wins, never a
    /// torn row.
    pub fn upsert_vehicle_status(
        &self,
        vin: &str,
        status_text: &str,
        reference: Option<&str>,
        timestamp: &str,
    ) -> Result<VehicleStatusRecord, String> {
        let vin = vin.to_uppercase();
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.execute(
            "INSERT INTO vehicle_status (vin, status_text, reference, updated_at)
             VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(vin) DO UPDATE SET
                status_text = ?2,
                reference = ?3,
                updated_at = ?4",
            params![vin, status_text, reference, timestamp],
        )
        .map_err(|e| format!("Failed to upsert vehicle status: {e}"))?;

        Ok(VehicleStatusRecord {
            vin,
            status_text: status_text.to_string(),
            reference: reference.map(str::to_string),
            updated_at: timestamp.to_string(),
        })
    }

    /// `Ok(None)` means no row for this VIN; `Err` means the read failed.
    pub fn get_vehicle_status(&self, vin: &str) -> Result<Option<VehicleStatusRecord>, String> {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.query_row(
            "SELECT vin, status_text, reference, updated_at FROM vehicle_status WHERE vin = ?1",
            params![vin.to_uppercase()],
            |row| {
                Ok(VehicleStatusRecord {
                    vin: row.get(0)?,
                    status_text: row.get(1)?,
                    reference: row.get(2)?,
                    updated_at: row.get(3)?,
                })
            },
        )
        .optional()
        .map_err(|e| format!("Status lookup failed: {e}"))
    }

    /// Most recent archived messages, newest first. A single snapshot read.
    pub fn recent_messages(&self, limit: usize) -> Result<Vec<ArchivedMessage>, String> {
        let conn = self.conn.lock().expect("store lock poisoned");
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, username, text, timestamp
                 FROM messages ORDER BY id DESC LIMIT ?1",
            )
            .map_err(|e| format!("Message query failed: {e}"))?;

        let rows = stmt
            .query_map(params![limit as i64], |row| {
                Ok(ArchivedMessage {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    username: row.get(2)?,
                    text: row.get(3)?,
                    timestamp: row.get(4)?,
                })
            })
            .map_err(|e| format!("Message query failed: {e}"))?;

        rows.collect::<Result<Vec<_>, _>>()
            .map_err(|e| format!("Message query failed: {e}"))
    }

    /// Total archived message count.
    #[cfg(test)]
    pub fn message_count(&self) -> usize {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.query_row("SELECT COUNT(*) FROM messages", [], |row| row.get::<_, i64>(0))
            .unwrap_or(0) as usize
    }

    /// Message count for one user, for upsert tests.
    #[cfg(test)]
    pub fn user_message_count(&self, user_id: i64) -> i64 {
        let conn = self.conn.lock().expect("store lock poisoned");
        conn.query_row(
            "SELECT message_count FROM users WHERE user_id = ?1",
            params![user_id],
            |row| row.get(0),
        )
        .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vehicle_status_round_trip() {
        let store = Store::in_memory();
        let rec = store
            .upsert_vehicle_status("WBAVA37503ABCD123", "Kyiv | Warsaw", Some("CNT99"), "2024-01-15 10:00:00")
            .unwrap();
        assert_eq!(rec.vin, "WBAVA37503ABCD123");

        let fetched = store.get_vehicle_status("WBAVA37503ABCD123").unwrap().unwrap();
        assert_eq!(fetched, rec);
    }

    #[test]
    fn test_vehicle_status_upsert_overwrites() {
        let store = Store::in_memory();
        store
            .upsert_vehicle_status("WBAVA37503ABCD123", "Odesa", None, "2024-01-15 10:00:00")
            .unwrap();
        store
            .upsert_vehicle_status("WBAVA37503ABCD123", "Kyiv | Warsaw", Some("CNT99"), "2024-01-16 09:00:00")
            .unwrap();

        let fetched = store.get_vehicle_status("WBAVA37503ABCD123").unwrap().unwrap();
        assert_eq!(fetched.status_text, "Kyiv | Warsaw");
        assert_eq!(fetched.reference.as_deref(), Some("CNT99"));
        assert_eq!(fetched.updated_at, "2024-01-16 09:00:00");

        // Exactly one row per VIN.
        let conn = store.conn.lock().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM vehicle_status", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_vin_keys_are_case_normalized() {
        let store = Store::in_memory();
        store
            .upsert_vehicle_status("wbava37503abcd123", "Odesa", None, "2024-01-15 10:00:00")
            .unwrap();

        let fetched = store.get_vehicle_status("WBAVA37503abcd123").unwrap().unwrap();
        assert_eq!(fetched.vin, "WBAVA37503ABCD123");
    }

    #[test]
    fn test_missing_vin_is_none_not_error() {
        let store = Store::in_memory();
        assert_eq!(store.get_vehicle_status("WBAVA37503ABCD123").unwrap(), None);
    }

    #[test]
    fn test_recent_messages_newest_first() {
        let store = Store::in_memory();
        for i in 1..=5 {
            store
                .append_message(100, "alice", &format!("message {i}"), "2024-01-15 10:00:00")
                .unwrap();
        }

        let recent = store.recent_messages(3).unwrap();
        assert_eq!(recent.len(), 3);
        assert_eq!(recent[0].text, "message 5");
        assert_eq!(recent[2].text, "message 3");
    }

    #[test]
    fn test_recent_messages_on_empty_store() {
        let store = Store::in_memory();
        assert!(store.recent_messages(10).unwrap().is_empty());
    }

    #[test]
    fn test_upsert_user_counts_and_refreshes_name() {
        let store = Store::in_memory();
        store.upsert_user(100, Some("alice"), "2024-01-15 10:00:00");
        store.upsert_user(100, Some("alice_new"), "2024-01-15 11:00:00");
        store.upsert_user(100, None, "2024-01-15 12:00:00");

        assert_eq!(store.user_message_count(100), 3);

        let conn = store.conn.lock().unwrap();
        let (username, last_seen): (String, String) = conn
            .query_row(
                "SELECT username, last_seen FROM users WHERE user_id = 100",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        // A None username must not erase the stored one.
        assert_eq!(username, "alice_new");
        assert_eq!(last_seen, "2024-01-15 12:00:00");
    }

    #[test]
    fn test_open_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("motorbot.db");
        {
            let store = Store::open(&path).unwrap();
            store
                .append_message(100, "alice", "hello", "2024-01-15 10:00:00")
                .unwrap();
        }
        let store = Store::open(&path).unwrap();
        assert_eq!(store.message_count(), 1);
    }
}
