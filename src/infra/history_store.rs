use crate::app::ports::HistoryStorePort;
use crate::error::Result;
use crate::types::HistoryEntry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed wash-history ledger. Writes are small and rare, so a single
/// mutex-guarded connection is plenty.
pub struct SqliteHistoryStore {
    conn: Mutex<Connection>,
}

impl SqliteHistoryStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        Self::init(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    fn init(conn: &Connection) -> Result<()> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS wash_history (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                season INTEGER,
                external_id TEXT,
                status TEXT NOT NULL,
                message TEXT NOT NULL,
                action_params TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Most recent entries, newest first.
    pub fn recent(&self, limit: usize) -> Result<Vec<HistoryEntry>> {
        let conn = self.conn.lock().expect("history connection poisoned");
        let mut stmt = conn.prepare(
            "SELECT id, name, season, external_id, status, message, action_params, created_at
             FROM wash_history ORDER BY created_at DESC LIMIT ?1",
        )?;
        let rows = stmt.query_map(params![limit as i64], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<i32>>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
                row.get::<_, String>(7)?,
            ))
        })?;

        let mut entries = Vec::new();
        for row in rows {
            let (id, name, season, external_id, status, message, action_params, created_at) = row?;
            entries.push(HistoryEntry {
                id,
                name,
                season,
                external_id,
                status,
                message,
                action_params: serde_json::from_str(&action_params).unwrap_or(serde_json::Value::Null),
                created_at: created_at
                    .parse::<DateTime<Utc>>()
                    .unwrap_or_else(|_| Utc::now()),
            });
        }
        Ok(entries)
    }
}

#[async_trait]
impl HistoryStorePort for SqliteHistoryStore {
    async fn record(&self, entry: &HistoryEntry) -> Result<()> {
        let conn = self.conn.lock().expect("history connection poisoned");
        conn.execute(
            "INSERT INTO wash_history
             (id, name, season, external_id, status, message, action_params, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.id,
                entry.name,
                entry.season,
                entry.external_id,
                entry.status,
                entry.message,
                entry.action_params.to_string(),
                entry.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }
}
