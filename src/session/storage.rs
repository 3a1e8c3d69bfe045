//! Session-scoped key/value storage for the access token.
//!
//! Values live as long as the user's login session, never longer: the SQLite
//! file sits in the per-session runtime directory, which the OS wipes on
//! logout.

use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::error::ClientError;

/// Trait for session storage backends.
pub trait SessionStorage: Send + Sync {
  fn get_item(&self, key: &str) -> Result<Option<String>, ClientError>;

  fn set_item(&self, key: &str, value: &str) -> Result<(), ClientError>;

  fn remove_item(&self, key: &str) -> Result<(), ClientError>;
}

/// Storage that only lives as long as the process.
#[derive(Debug, Default)]
pub struct MemorySessionStorage {
  items: Mutex<HashMap<String, String>>,
}

impl MemorySessionStorage {
  pub fn new() -> Self {
    Self::default()
  }

  fn items(&self) -> MutexGuard<'_, HashMap<String, String>> {
    self.items.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl SessionStorage for MemorySessionStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>, ClientError> {
    Ok(self.items().get(key).cloned())
  }

  fn set_item(&self, key: &str, value: &str) -> Result<(), ClientError> {
    self.items().insert(key.to_string(), value.to_string());
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<(), ClientError> {
    self.items().remove(key);
    Ok(())
  }
}

/// SQLite-based session storage implementation.
pub struct SqliteSessionStorage {
  conn: Mutex<Connection>,
}

impl SqliteSessionStorage {
  /// Open the session database for one API/client pairing.
  ///
  /// Different base URLs or client ids never share a token.
  pub fn open(base_url: &str, client_id: Option<&str>) -> Result<Self, ClientError> {
    let path = Self::default_path(base_url, client_id);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent).map_err(|e| {
        ClientError::Storage(format!("Failed to create session directory: {}", e))
      })?;
    }

    Self::open_at(&path)
  }

  pub fn open_at(path: &Path) -> Result<Self, ClientError> {
    let conn = Connection::open(path).map_err(|e| {
      ClientError::Storage(format!(
        "Failed to open session database at {}: {}",
        path.display(),
        e
      ))
    })?;
    Self::with_connection(conn)
  }

  pub fn open_in_memory() -> Result<Self, ClientError> {
    let conn = Connection::open_in_memory()
      .map_err(|e| ClientError::Storage(format!("Failed to open session database: {}", e)))?;
    Self::with_connection(conn)
  }

  fn with_connection(conn: Connection) -> Result<Self, ClientError> {
    conn
      .execute_batch(SESSION_SCHEMA)
      .map_err(|e| ClientError::Storage(format!("Failed to run session migrations: {}", e)))?;
    Ok(Self {
      conn: Mutex::new(conn),
    })
  }

  /// `<runtime dir>/mia/session-<hash>.db`, falling back to the temp dir.
  fn default_path(base_url: &str, client_id: Option<&str>) -> PathBuf {
    let dir = dirs::runtime_dir().unwrap_or_else(std::env::temp_dir);

    // SHA256 hash for a stable, fixed-length file name
    let mut hasher = Sha256::new();
    hasher.update(base_url.as_bytes());
    hasher.update(b"\0");
    hasher.update(client_id.unwrap_or("").as_bytes());
    let digest = hex::encode(hasher.finalize());

    dir.join("mia").join(format!("session-{}.db", &digest[..16]))
  }

  fn conn(&self) -> MutexGuard<'_, Connection> {
    self.conn.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

/// Schema for the session table.
const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS session_items (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL,
    stored_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SessionStorage for SqliteSessionStorage {
  fn get_item(&self, key: &str) -> Result<Option<String>, ClientError> {
    self
      .conn()
      .query_row(
        "SELECT value FROM session_items WHERE key = ?",
        params![key],
        |row| row.get(0),
      )
      .optional()
      .map_err(|e| ClientError::Storage(format!("Failed to read {}: {}", key, e)))
  }

  fn set_item(&self, key: &str, value: &str) -> Result<(), ClientError> {
    self
      .conn()
      .execute(
        "INSERT OR REPLACE INTO session_items (key, value, stored_at)
         VALUES (?, ?, datetime('now'))",
        params![key, value],
      )
      .map_err(|e| ClientError::Storage(format!("Failed to store {}: {}", key, e)))?;
    Ok(())
  }

  fn remove_item(&self, key: &str) -> Result<(), ClientError> {
    self
      .conn()
      .execute("DELETE FROM session_items WHERE key = ?", params![key])
      .map_err(|e| ClientError::Storage(format!("Failed to remove {}: {}", key, e)))?;
    Ok(())
  }
}
