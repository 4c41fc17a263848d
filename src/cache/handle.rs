//! Lazily opened, explicitly closed SQLite handle.
//!
//! Each persistent store owns one `StoreHandle`. The connection is opened on
//! the first call and the schema applied then. After `close()` every call
//! fails with [`StoreError::Closed`]; a closed store is never reopened.

use crate::config::StorageLocation;
use crate::error::StoreError;
use rusqlite::Connection;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info};

enum HandleState {
    Unopened,
    Open(Connection),
    Closed,
}

/// Lifecycle state, as observed from outside
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlePhase {
    Unopened,
    Open,
    Closed,
}

pub struct StoreHandle {
    /// Store name used in errors and logs
    label: &'static str,
    location: StorageLocation,
    db_name: String,
    schema: &'static str,
    state: Mutex<HandleState>,
}

/// Keep database file names portable whatever the host key prefix contains
fn file_name_for(db_name: &str) -> String {
    let safe: String = db_name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("{}.db", safe)
}

impl StoreHandle {
    pub fn new(
        label: &'static str,
        location: StorageLocation,
        db_name: String,
        schema: &'static str,
    ) -> Self {
        Self {
            label,
            location,
            db_name,
            schema,
            state: Mutex::new(HandleState::Unopened),
        }
    }

    /// Path of the database file, `None` for in-memory stores
    pub fn db_path(&self) -> Option<PathBuf> {
        match &self.location {
            StorageLocation::Directory(dir) => Some(dir.join(file_name_for(&self.db_name))),
            StorageLocation::InMemory => None,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HandleState> {
        // a panic while holding the lock leaves the state itself intact
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn open_connection(&self) -> Result<Connection, StoreError> {
        let conn = match self.db_path() {
            Some(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                        path: parent.to_path_buf(),
                        source,
                    })?;
                }
                let conn = Connection::open(&path)?;
                conn.execute_batch(
                    "PRAGMA journal_mode = WAL;
                     PRAGMA synchronous = NORMAL;",
                )?;
                info!("Opened {} at {}", self.label, path.display());
                conn
            }
            None => {
                debug!("Opened in-memory {}", self.label);
                Connection::open_in_memory()?
            }
        };
        conn.execute_batch(self.schema)?;
        Ok(conn)
    }

    /// Run `f` against the open connection, opening it on first use
    pub fn with_conn<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce(&mut Connection) -> Result<T, StoreError>,
    {
        let mut state = self.lock();
        if let HandleState::Unopened = *state {
            *state = HandleState::Open(self.open_connection()?);
        }
        match &mut *state {
            HandleState::Open(conn) => f(conn),
            HandleState::Closed => Err(StoreError::Closed(self.label)),
            HandleState::Unopened => unreachable!("handle opened above"),
        }
    }

    /// Release the connection; later calls fail
    pub fn close(&self) {
        let mut state = self.lock();
        if let HandleState::Open(conn) = std::mem::replace(&mut *state, HandleState::Closed) {
            if let Err((_, e)) = conn.close() {
                tracing::warn!("Failed to close {} cleanly: {}", self.label, e);
            }
        }
        debug!("Closed {}", self.label);
    }

    pub fn phase(&self) -> HandlePhase {
        match *self.lock() {
            HandleState::Unopened => HandlePhase::Unopened,
            HandleState::Open(_) => HandlePhase::Open,
            HandleState::Closed => HandlePhase::Closed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS t (k TEXT PRIMARY KEY, v TEXT NOT NULL);";

    #[test]
    fn test_lazy_open_then_closed_is_hard_error() {
        let handle = StoreHandle::new("test store", StorageLocation::InMemory, "t".into(), SCHEMA);
        assert_eq!(handle.phase(), HandlePhase::Unopened);

        let count: i64 = handle
            .with_conn(|conn| Ok(conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0))?))
            .unwrap();
        assert_eq!(count, 0);
        assert_eq!(handle.phase(), HandlePhase::Open);

        handle.close();
        assert_eq!(handle.phase(), HandlePhase::Closed);
        let err = handle.with_conn(|_| Ok(())).unwrap_err();
        assert!(matches!(err, StoreError::Closed("test store")));
    }

    #[test]
    fn test_close_before_open_still_closes() {
        let handle = StoreHandle::new("test store", StorageLocation::InMemory, "t".into(), SCHEMA);
        handle.close();
        assert!(matches!(handle.with_conn(|_| Ok(())), Err(StoreError::Closed(_))));
    }

    #[test]
    fn test_file_name_is_sanitized() {
        let dir = tempdir().unwrap();
        let handle = StoreHandle::new(
            "test store",
            StorageLocation::Directory(dir.path().to_path_buf()),
            "save:1/Beauty".into(),
            SCHEMA,
        );
        let path = handle.db_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "save_1_Beauty.db");

        handle.with_conn(|_| Ok(())).unwrap();
        assert!(path.exists());
    }
}
