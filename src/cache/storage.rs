//! SQLite implementation of the store backend.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use super::traits::{CachedEntry, StoreBackend};
use crate::error::{Error, Result};
use crate::http::{Request, RequestKey, Response};

/// SQLite-based store backend. One database holds every store of one origin.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the database file at `path`.
  pub fn open_at(path: &Path) -> Result<Self> {
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| Error::Storage(format!("Failed to create cache directory: {}", e)))?;
    }

    let conn = Connection::open(path).map_err(|e| {
      Error::Storage(format!(
        "Failed to open cache database at {}: {}",
        path.display(),
        e
      ))
    })?;

    Self::with_connection(conn)
  }

  /// A private database that disappears with the process.
  #[cfg(test)]
  pub fn in_memory() -> Result<Self> {
    Self::with_connection(Connection::open_in_memory()?)
  }

  fn with_connection(conn: Connection) -> Result<Self> {
    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;
    Ok(storage)
  }

  fn run_migrations(&self) -> Result<()> {
    self
      .lock()?
      .execute_batch(CACHE_SCHEMA)
      .map_err(|e| Error::Storage(format!("Failed to run cache migrations: {}", e)))
  }

  fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
    self
      .conn
      .lock()
      .map_err(|e| Error::Storage(format!("Lock poisoned: {}", e)))
  }
}

const CACHE_SCHEMA: &str = r#"
PRAGMA foreign_keys = ON;

CREATE TABLE IF NOT EXISTS stores (
    name TEXT PRIMARY KEY,
    created_seq INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS entries (
    store TEXT NOT NULL,
    request_key TEXT NOT NULL,
    method TEXT NOT NULL,
    url TEXT NOT NULL,
    status INTEGER NOT NULL,
    headers BLOB NOT NULL,
    body BLOB NOT NULL,
    seq INTEGER NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (store, request_key),
    FOREIGN KEY (store) REFERENCES stores(name) ON DELETE CASCADE
);

CREATE INDEX IF NOT EXISTS idx_entries_order ON entries(store, seq);
"#;

/// Create the store row if missing. Runs on an already-locked connection.
fn ensure_store(conn: &Connection, store: &str) -> Result<()> {
  conn.execute(
    "INSERT OR IGNORE INTO stores (name, created_seq)
     VALUES (?1, (SELECT COALESCE(MAX(created_seq), 0) + 1 FROM stores))",
    params![store],
  )?;
  Ok(())
}

fn insert_entry(conn: &Connection, store: &str, request: &Request, response: &Response) -> Result<()> {
  let key = request.key();
  let headers = serde_json::to_vec(&response.headers)?;

  // REPLACE deletes the old row first, so a re-put entry takes the newest seq
  conn.execute(
    "INSERT OR REPLACE INTO entries
       (store, request_key, method, url, status, headers, body, seq, cached_at)
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
       (SELECT COALESCE(MAX(seq), 0) + 1 FROM entries WHERE store = ?1),
       datetime('now'))",
    params![
      store,
      key.hash(),
      key.method,
      key.url,
      response.status,
      headers,
      response.body
    ],
  )?;
  Ok(())
}

impl StoreBackend for SqliteStorage {
  fn open(&self, store: &str) -> Result<()> {
    let conn = self.lock()?;
    ensure_store(&conn, store)
  }

  fn has_store(&self, store: &str) -> Result<bool> {
    let conn = self.lock()?;
    let found: Option<i64> = conn
      .query_row(
        "SELECT 1 FROM stores WHERE name = ?1",
        params![store],
        |row| row.get(0),
      )
      .optional()?;
    Ok(found.is_some())
  }

  fn list_store_names(&self) -> Result<Vec<String>> {
    let conn = self.lock()?;
    let mut stmt = conn.prepare("SELECT name FROM stores ORDER BY created_seq")?;
    let names = stmt
      .query_map([], |row| row.get(0))?
      .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(names)
  }

  fn delete_store(&self, store: &str) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn.execute("DELETE FROM stores WHERE name = ?1", params![store])?;
    Ok(removed > 0)
  }

  fn match_entry(&self, store: &str, key: &RequestKey) -> Result<Option<CachedEntry>> {
    let conn = self.lock()?;
    let row: Option<(u16, Vec<u8>, Vec<u8>, String)> = conn
      .query_row(
        "SELECT status, headers, body, cached_at FROM entries
         WHERE store = ?1 AND request_key = ?2",
        params![store, key.hash()],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
      )
      .optional()?;

    match row {
      Some((status, headers, body, cached_at)) => Ok(Some(CachedEntry {
        response: Response {
          status,
          headers: serde_json::from_slice(&headers)?,
          body,
        },
        cached_at: parse_datetime(&cached_at)?,
      })),
      None => Ok(None),
    }
  }

  fn put(&self, store: &str, request: &Request, response: &Response) -> Result<()> {
    let conn = self.lock()?;
    ensure_store(&conn, store)?;
    insert_entry(&conn, store, request, response)
  }

  fn put_batch(&self, store: &str, entries: &[(Request, Response)]) -> Result<()> {
    let mut conn = self.lock()?;
    let tx = conn.transaction()?;
    ensure_store(&tx, store)?;
    for (request, response) in entries {
      insert_entry(&tx, store, request, response)?;
    }
    tx.commit()?;
    Ok(())
  }

  fn delete(&self, store: &str, key: &RequestKey) -> Result<bool> {
    let conn = self.lock()?;
    let removed = conn.execute(
      "DELETE FROM entries WHERE store = ?1 AND request_key = ?2",
      params![store, key.hash()],
    )?;
    Ok(removed > 0)
  }

  fn keys(&self, store: &str) -> Result<Vec<RequestKey>> {
    let conn = self.lock()?;
    let mut stmt =
      conn.prepare("SELECT method, url FROM entries WHERE store = ?1 ORDER BY seq")?;
    let keys = stmt
      .query_map(params![store], |row| {
        Ok(RequestKey {
          method: row.get(0)?,
          url: row.get(1)?,
        })
      })?
      .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(keys)
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| Error::Storage(format!("Failed to parse datetime '{}': {}", s, e)))
}
