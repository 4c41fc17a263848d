//! Persistent cache of archive folder listings
//!
//! Keyed by `(mod name, mod version hash, type)`. A listing is written once
//! and never updated; when a mod's hash changes the old rows are deleted.

use super::handle::StoreHandle;
use super::composite_key;
use crate::config::AddonConfig;
use crate::error::StoreError;
use crate::traverse::ArchiveFileRecord;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use tracing::{debug, error, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS cached_file_list (
    hash_key TEXT PRIMARY KEY,
    mod_name TEXT NOT NULL,
    mod_hash TEXT NOT NULL,
    type_name TEXT NOT NULL,
    file_list_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_file_list_mod ON cached_file_list(mod_name);
CREATE INDEX IF NOT EXISTS idx_file_list_mod_hash_type
    ON cached_file_list(mod_name, mod_hash, type_name);
"#;

/// Folder listings remembered across sessions
pub struct CachedFileList {
    handle: StoreHandle,
}

impl CachedFileList {
    pub fn new(config: &AddonConfig) -> Self {
        Self {
            handle: StoreHandle::new(
                "file list cache",
                config.storage.clone(),
                config.file_list_db_name(),
                SCHEMA,
            ),
        }
    }

    /// Cached listing, or `None` on a miss.
    ///
    /// Rows that no longer parse or hold inconsistent records are deleted and
    /// reported as a miss.
    pub fn get(
        &self,
        mod_name: &str,
        mod_hash: &str,
        type_name: &str,
    ) -> Result<Option<Vec<ArchiveFileRecord>>, StoreError> {
        self.handle.with_conn(|conn| {
            let row: Option<(String, String)> = conn
                .query_row(
                    "SELECT hash_key, file_list_json FROM cached_file_list
                     WHERE mod_name = ?1 AND mod_hash = ?2 AND type_name = ?3",
                    params![mod_name, mod_hash, type_name],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;

            let Some((hash_key, json)) = row else {
                return Ok(None);
            };

            match serde_json::from_str::<Vec<ArchiveFileRecord>>(&json) {
                Ok(list) if list.iter().all(ArchiveFileRecord::is_consistent) => Ok(Some(list)),
                Ok(_) => {
                    error!("Cached file list for {} is inconsistent, removing", hash_key);
                    conn.execute("DELETE FROM cached_file_list WHERE hash_key = ?1", params![hash_key])?;
                    Ok(None)
                }
                Err(e) => {
                    error!("Cached file list for {} is corrupt, removing: {}", hash_key, e);
                    conn.execute("DELETE FROM cached_file_list WHERE hash_key = ?1", params![hash_key])?;
                    Ok(None)
                }
            }
        })
    }

    /// Store a listing unless one already exists for the key.
    ///
    /// Returns `false` when an earlier write won.
    pub fn write_if_absent(
        &self,
        mod_name: &str,
        mod_hash: &str,
        type_name: &str,
        file_list: &[ArchiveFileRecord],
    ) -> Result<bool, StoreError> {
        let hash_key = composite_key(mod_name, mod_hash, type_name);
        let json = serde_json::to_string(file_list)?;

        self.handle.with_conn(|conn| {
            let tx = conn.transaction()?;
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO cached_file_list
                    (hash_key, mod_name, mod_hash, type_name, file_list_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![hash_key, mod_name, mod_hash, type_name, json],
            )?;
            tx.commit()?;

            if inserted > 0 {
                info!(
                    "writeCachedFileList ok for mod [{}], type [{}], files count [{}]",
                    mod_name,
                    type_name,
                    file_list.len()
                );
            }
            Ok(inserted > 0)
        })
    }

    /// Delete listings of `mod_name` recorded under any other version hash
    pub fn remove_changed_mod(&self, mod_name: &str, mod_hash: &str) -> Result<usize, StoreError> {
        self.handle.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM cached_file_list WHERE mod_name = ?1 AND mod_hash <> ?2",
                params![mod_name, mod_hash],
            )?;
            if removed > 0 {
                debug!("Removed {} stale file lists of mod [{}]", removed, mod_name);
            }
            Ok(removed)
        })
    }

    /// Delete listings of every mod not in `live_mods`
    pub fn remove_not_exist_mods(&self, live_mods: &HashSet<String>) -> Result<usize, StoreError> {
        self.handle.with_conn(|conn| {
            let tx = conn.transaction()?;
            let stale: Vec<String> = {
                let mut stmt = tx.prepare("SELECT hash_key, mod_name FROM cached_file_list")?;
                let rows = stmt.query_map([], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })?;
                let mut stale = Vec::new();
                for row in rows {
                    let (hash_key, mod_name) = row?;
                    if !live_mods.contains(&mod_name) {
                        stale.push(hash_key);
                    }
                }
                stale
            };

            for hash_key in &stale {
                debug!("removeNotExistMod {}", hash_key);
                tx.execute("DELETE FROM cached_file_list WHERE hash_key = ?1", params![hash_key])?;
            }
            tx.commit()?;
            Ok(stale.len())
        })
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::ArchiveEntry;
    use crate::traverse::traverse_archive;

    fn listing() -> Vec<ArchiveFileRecord> {
        let entries = vec![ArchiveEntry::file("cg/a.png"), ArchiveEntry::file("cg/sub/c.png")];
        traverse_archive::<fn(&ArchiveFileRecord) -> anyhow::Result<()>>(&entries, "cg", None).unwrap()
    }

    fn cache() -> CachedFileList {
        CachedFileList::new(&AddonConfig::default())
    }

    #[test]
    fn test_write_once_then_read() {
        let cache = cache();
        assert!(cache.get("Alice", "h1", "cg").unwrap().is_none());

        assert!(cache.write_if_absent("Alice", "h1", "cg", &listing()).unwrap());
        assert!(!cache.write_if_absent("Alice", "h1", "cg", &[]).unwrap());

        let read = cache.get("Alice", "h1", "cg").unwrap().unwrap();
        assert_eq!(read, listing());
    }

    #[test]
    fn test_corrupt_row_is_deleted_on_read() {
        let cache = cache();
        cache
            .handle()
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO cached_file_list VALUES ('Alice_h1_cg', 'Alice', 'h1', 'cg', '{not json')",
                    [],
                )?;
                Ok(())
            })
            .unwrap();

        assert!(cache.get("Alice", "h1", "cg").unwrap().is_none());
        // the slot is free again
        assert!(cache.write_if_absent("Alice", "h1", "cg", &listing()).unwrap());
    }

    #[test]
    fn test_inconsistent_records_are_a_miss() {
        let cache = cache();
        let mut bad = listing();
        bad[0].is_folder = bad[0].is_file;
        cache.write_if_absent("Alice", "h1", "cg", &bad).unwrap();
        assert!(cache.get("Alice", "h1", "cg").unwrap().is_none());
    }

    #[test]
    fn test_version_change_and_removed_mods() {
        let cache = cache();
        cache.write_if_absent("Alice", "old", "cg", &listing()).unwrap();
        cache.write_if_absent("Bob", "b1", "cg", &listing()).unwrap();
        cache.write_if_absent("Carol", "c1", "cg", &listing()).unwrap();

        assert_eq!(cache.remove_changed_mod("Alice", "new").unwrap(), 1);
        assert!(cache.get("Alice", "old", "cg").unwrap().is_none());
        assert!(cache.get("Bob", "b1", "cg").unwrap().is_some());

        let live: HashSet<String> = ["Bob".to_string()].into_iter().collect();
        assert_eq!(cache.remove_not_exist_mods(&live).unwrap(), 1);
        assert!(cache.get("Carol", "c1", "cg").unwrap().is_none());
        assert!(cache.get("Bob", "b1", "cg").unwrap().is_some());
    }

    #[test]
    fn test_use_after_close_fails() {
        let cache = cache();
        cache.close();
        assert!(matches!(cache.get("Alice", "h1", "cg"), Err(StoreError::Closed(_))));
        assert!(matches!(
            cache.write_if_absent("Alice", "h1", "cg", &[]),
            Err(StoreError::Closed(_))
        ));
    }
}
