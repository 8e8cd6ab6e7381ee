//! Base locale SQLite
//!
//! Ce module conserve les ressources, les règles, les bannissements actifs,
//! les problèmes et le curseur de lecture des journaux.

mod bans;
mod resources;
mod rules;

use crate::error::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS resources (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    remote_id INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL,
    full_domain TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS rules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL,
    pattern TEXT NOT NULL,
    use_regex INTEGER NOT NULL DEFAULT 0,
    is_global INTEGER NOT NULL DEFAULT 1,
    target_resource_id INTEGER REFERENCES resources(id) ON DELETE SET NULL,
    ban_duration_mins INTEGER,
    max_priority INTEGER,
    is_active INTEGER NOT NULL DEFAULT 1
);
CREATE TABLE IF NOT EXISTS rule_exclusions (
    rule_id INTEGER NOT NULL REFERENCES rules(id) ON DELETE CASCADE,
    resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
    PRIMARY KEY (rule_id, resource_id)
);
CREATE TABLE IF NOT EXISTS banned_ips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip TEXT NOT NULL,
    resource_id INTEGER NOT NULL REFERENCES resources(id) ON DELETE CASCADE,
    reason TEXT NOT NULL DEFAULT '',
    banned_at INTEGER NOT NULL,
    expires_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_banned_ips_lookup ON banned_ips (ip, resource_id, expires_at);
CREATE INDEX IF NOT EXISTS idx_banned_ips_expiry ON banned_ips (expires_at);
CREATE TABLE IF NOT EXISTS problems (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    description TEXT NOT NULL,
    detected_at INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS whitelisted_ips (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    ip TEXT NOT NULL UNIQUE,
    name TEXT
);
CREATE TABLE IF NOT EXISTS app_state (
    key TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
";

const CURSOR_KEY: &str = "last_processed_log_id";

/// Accès partagé à la base locale
#[derive(Clone)]
pub struct Store {
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Ouvre (ou crée) la base au chemin donné
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                // L'échec éventuel remontera à l'ouverture
                let _ = std::fs::create_dir_all(parent);
            }
        }
        Self::with_connection(Connection::open(path)?)
    }

    /// Base en mémoire, utilisée par les tests
    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "foreign_keys", "ON")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        // Une tâche paniquée ne laisse pas de transaction ouverte: rusqlite
        // annule au drop
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Dernier identifiant de journal traité
    pub fn cursor(&self) -> Result<i64> {
        let conn = self.conn();
        let value = conn
            .query_row(
                "SELECT value FROM app_state WHERE key = ?1",
                params![CURSOR_KEY],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value.unwrap_or(0))
    }

    /// Avance le curseur; une valeur inférieure à la valeur stockée est ignorée
    pub fn set_cursor(&self, last_id: i64) -> Result<()> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO app_state (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = MAX(value, excluded.value)",
            params![CURSOR_KEY, last_id],
        )?;
        Ok(())
    }
}

pub(crate) fn to_timestamp(at: DateTime<Utc>) -> i64 {
    at.timestamp()
}

pub(crate) fn from_timestamp(secs: i64) -> DateTime<Utc> {
    DateTime::<Utc>::from_timestamp(secs, 0).unwrap_or_default()
}
