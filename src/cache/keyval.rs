//! Small string key-value store, namespaced by database name

use super::handle::StoreHandle;
use crate::config::StorageLocation;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS keyval (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;

pub struct KeyValueStore {
    handle: StoreHandle,
}

impl KeyValueStore {
    pub fn new(location: StorageLocation, db_name: String) -> Self {
        Self {
            handle: StoreHandle::new("key-value store", location, db_name, SCHEMA),
        }
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.handle.with_conn(|conn| {
            Ok(conn
                .query_row("SELECT value FROM keyval WHERE key = ?1", params![key], |row| {
                    row.get(0)
                })
                .optional()?)
        })
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.handle.with_conn(|conn| {
            conn.execute(
                "INSERT INTO keyval (key, value) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET value = ?2",
                params![key, value],
            )?;
            Ok(())
        })
    }
}
