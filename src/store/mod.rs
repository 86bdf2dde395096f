//! Local Storage
//!
//! SQLite-backed key-value storage for the two durable client values:
//! the anonymous exchange counter and the authentication token.
//! Uses rusqlite for synchronous, single-process access.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};

/// Well-known key for the anonymous exchange counter (decimal string).
pub const ANON_COUNT_KEY: &str = "anon_message_count";

/// Well-known key for the stored authentication token.
pub const AUTH_TOKEN_KEY: &str = "auth_token";

const CREATE_TABLES: &str = "
CREATE TABLE IF NOT EXISTS kv (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
";

/// Handle over the local key-value database.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open (or create) the database at `db_path`.
    pub fn open(db_path: &str) -> Result<Self> {
        if let Some(parent) = Path::new(db_path).parent() {
            if !parent.exists() {
                fs::create_dir_all(parent).with_context(|| {
                    format!("failed to create db directory: {}", parent.display())
                })?;
            }
        }

        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open database: {db_path}"))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(CREATE_TABLES)
            .context("failed to create tables")?;

        Ok(Self { conn })
    }

    /// Open an in-memory database (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_TABLES)?;
        Ok(Self { conn })
    }

    // ── Generic key-value ────────────────────────────────────────

    pub fn get_kv(&self, key: &str) -> Option<String> {
        self.conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()
            .ok()
            .flatten()
    }

    pub fn set_kv(&self, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, datetime('now'))
                 ON CONFLICT(key) DO UPDATE SET value = ?2, updated_at = datetime('now')",
                params![key, value],
            )
            .with_context(|| format!("failed to set kv: {key}"))?;
        Ok(())
    }

    pub fn delete_kv(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv WHERE key = ?1", params![key])
            .with_context(|| format!("failed to delete kv: {key}"))?;
        Ok(())
    }

    // ── Well-known entries ───────────────────────────────────────

    /// Read the anonymous exchange counter. Missing or unparsable values
    /// default to 0.
    pub fn anon_count(&self) -> u32 {
        self.get_kv(ANON_COUNT_KEY)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(0)
    }

    /// Persist the anonymous exchange counter as a decimal string.
    pub fn set_anon_count(&self, count: u32) -> Result<()> {
        self.set_kv(ANON_COUNT_KEY, &count.to_string())
    }

    pub fn clear_anon_count(&self) -> Result<()> {
        self.delete_kv(ANON_COUNT_KEY)
    }

    pub fn auth_token(&self) -> Option<String> {
        self.get_kv(AUTH_TOKEN_KEY)
    }

    pub fn set_auth_token(&self, token: &str) -> Result<()> {
        self.set_kv(AUTH_TOKEN_KEY, token)
    }

    pub fn clear_auth_token(&self) -> Result<()> {
        self.delete_kv(AUTH_TOKEN_KEY)
    }
}
