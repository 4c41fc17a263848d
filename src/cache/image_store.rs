//! Persistent image store
//!
//! Two correlated tables:
//! - `image_store`: one data URL per `(mod, hash, archive path)`; two types
//!   may share a relative image path, never an archive path
//! - `image_metadata`: the ordered image paths of one `(mod, hash, type)`
//!
//! Images of a directory type are streamed in one at a time through an
//! [`ImageStream`]; each image is its own short transaction so no single
//! transaction holds a whole folder of payloads. The metadata row is written
//! last, and its presence is what marks the type as fully stored.

use super::composite_key;
use super::handle::StoreHandle;
use crate::config::AddonConfig;
use crate::error::StoreError;
use rusqlite::{params, OptionalExtension};
use std::collections::HashSet;
use tracing::{debug, info};

const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS image_store (
    image_key TEXT PRIMARY KEY,
    mod_name TEXT NOT NULL,
    mod_hash TEXT NOT NULL,
    type_name TEXT NOT NULL,
    image_path TEXT NOT NULL,
    real_path TEXT NOT NULL,
    image_data TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_image_store_mod ON image_store(mod_name);
CREATE INDEX IF NOT EXISTS idx_image_store_mod_hash_type
    ON image_store(mod_name, mod_hash, type_name);

CREATE TABLE IF NOT EXISTS image_metadata (
    meta_key TEXT PRIMARY KEY,
    mod_name TEXT NOT NULL,
    mod_hash TEXT NOT NULL,
    type_name TEXT NOT NULL,
    image_paths_json TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_image_metadata_mod ON image_metadata(mod_name);
"#;

/// Image payloads and per-type membership, persisted across sessions
pub struct ModImageStore {
    handle: StoreHandle,
}

impl ModImageStore {
    pub fn new(config: &AddonConfig) -> Self {
        Self {
            handle: StoreHandle::new(
                "image store",
                config.storage.clone(),
                config.image_store_db_name(),
                SCHEMA,
            ),
        }
    }

    /// Whether every image of this type was stored by an earlier stream
    pub fn has_stored_images(
        &self,
        mod_name: &str,
        mod_hash: &str,
        type_name: &str,
    ) -> Result<bool, StoreError> {
        let meta_key = composite_key(mod_name, mod_hash, type_name);
        self.handle.with_conn(|conn| {
            let found: Option<i64> = conn
                .query_row(
                    "SELECT 1 FROM image_metadata WHERE meta_key = ?1",
                    params![meta_key],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(found.is_some())
        })
    }

    /// Begin streaming the images of one type.
    ///
    /// Fails with [`StoreError::AlreadyStored`] when the type's metadata
    /// already exists. The check happens once, here: two streams opened for
    /// the same key before either finalizes both proceed, and the second
    /// `finalize` is the one rejected.
    pub fn open_stream(
        &self,
        mod_name: &str,
        mod_hash: &str,
        type_name: &str,
    ) -> Result<ImageStream<'_>, StoreError> {
        if self.has_stored_images(mod_name, mod_hash, type_name)? {
            return Err(StoreError::AlreadyStored {
                mod_name: mod_name.to_string(),
                type_name: type_name.to_string(),
            });
        }

        Ok(ImageStream {
            store: self,
            mod_name: mod_name.to_string(),
            mod_hash: mod_hash.to_string(),
            type_name: type_name.to_string(),
            image_paths: Vec::new(),
            phase: StreamPhase::Opened,
        })
    }

    /// Stored data URL of one image, looked up by its path in the archive
    pub fn get_image(
        &self,
        mod_name: &str,
        mod_hash: &str,
        real_path: &str,
    ) -> Result<Option<String>, StoreError> {
        let image_key = composite_key(mod_name, mod_hash, real_path);
        self.handle.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT image_data FROM image_store WHERE image_key = ?1",
                    params![image_key],
                    |row| row.get(0),
                )
                .optional()?)
        })
    }

    /// Image paths recorded for a finalized type, in stream order
    pub fn get_image_paths(
        &self,
        mod_name: &str,
        mod_hash: &str,
        type_name: &str,
    ) -> Result<Option<Vec<String>>, StoreError> {
        let meta_key = composite_key(mod_name, mod_hash, type_name);
        let json: Option<String> = self.handle.with_conn(|conn| {
            Ok(conn
                .query_row(
                    "SELECT image_paths_json FROM image_metadata WHERE meta_key = ?1",
                    params![meta_key],
                    |row| row.get(0),
                )
                .optional()?)
        })?;

        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// Delete images and metadata of `mod_name` under any other version hash
    pub fn remove_changed_mod_images(
        &self,
        mod_name: &str,
        mod_hash: &str,
    ) -> Result<usize, StoreError> {
        self.handle.with_conn(|conn| {
            let tx = conn.transaction()?;
            let images = tx.execute(
                "DELETE FROM image_store WHERE mod_name = ?1 AND mod_hash <> ?2",
                params![mod_name, mod_hash],
            )?;
            let metadata = tx.execute(
                "DELETE FROM image_metadata WHERE mod_name = ?1 AND mod_hash <> ?2",
                params![mod_name, mod_hash],
            )?;
            tx.commit()?;

            if images + metadata > 0 {
                debug!(
                    "removeChangedModImages [{}]: {} images, {} metadata",
                    mod_name, images, metadata
                );
            }
            Ok(images + metadata)
        })
    }

    /// Delete images and metadata of every mod not in `live_mods`
    pub fn remove_not_exist_mod_images(
        &self,
        live_mods: &HashSet<String>,
    ) -> Result<usize, StoreError> {
        self.handle.with_conn(|conn| {
            let tx = conn.transaction()?;
            let mut removed = 0;
            for table in ["image_store", "image_metadata"] {
                let mod_names: Vec<String> = {
                    let mut stmt = tx.prepare(&format!("SELECT DISTINCT mod_name FROM {}", table))?;
                    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                    rows.collect::<Result<_, _>>()?
                };
                for mod_name in mod_names.iter().filter(|m| !live_mods.contains(*m)) {
                    removed += tx.execute(
                        &format!("DELETE FROM {} WHERE mod_name = ?1", table),
                        params![mod_name],
                    )?;
                    debug!("removeNotExistModImages {} [{}]", table, mod_name);
                }
            }
            tx.commit()?;
            Ok(removed)
        })
    }

    pub fn close(&self) {
        self.handle.close();
    }

    pub fn handle(&self) -> &StoreHandle {
        &self.handle
    }
}

/// Lifecycle of an [`ImageStream`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    Opened,
    Writing,
    Finalized,
}

/// Open → write N images → finalize
pub struct ImageStream<'a> {
    store: &'a ModImageStore,
    mod_name: String,
    mod_hash: String,
    type_name: String,
    image_paths: Vec<String>,
    phase: StreamPhase,
}

impl ImageStream<'_> {
    fn finalized_error(&self) -> StoreError {
        StoreError::StreamFinalized {
            mod_name: self.mod_name.clone(),
            type_name: self.type_name.clone(),
        }
    }

    /// Store one image in its own transaction
    pub fn store_image(
        &mut self,
        image_path: &str,
        real_path: &str,
        image_data: &str,
    ) -> Result<(), StoreError> {
        if self.phase == StreamPhase::Finalized {
            return Err(self.finalized_error());
        }

        let image_key = composite_key(&self.mod_name, &self.mod_hash, real_path);
        self.store.handle.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO image_store
                    (image_key, mod_name, mod_hash, type_name, image_path, real_path, image_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    image_key,
                    self.mod_name,
                    self.mod_hash,
                    self.type_name,
                    image_path,
                    real_path,
                    image_data
                ],
            )?;
            Ok(())
        })?;

        self.image_paths.push(image_path.to_string());
        self.phase = StreamPhase::Writing;
        Ok(())
    }

    /// Commit the metadata row, marking the type as stored.
    ///
    /// Returns the stored image paths.
    pub fn finalize(&mut self) -> Result<Vec<String>, StoreError> {
        if self.phase == StreamPhase::Finalized {
            return Err(self.finalized_error());
        }

        let meta_key = composite_key(&self.mod_name, &self.mod_hash, &self.type_name);
        let json = serde_json::to_string(&self.image_paths)?;
        let inserted = self.store.handle.with_conn(|conn| {
            Ok(conn.execute(
                "INSERT OR IGNORE INTO image_metadata
                    (meta_key, mod_name, mod_hash, type_name, image_paths_json)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![meta_key, self.mod_name, self.mod_hash, self.type_name, json],
            )?)
        })?;

        self.phase = StreamPhase::Finalized;
        if inserted == 0 {
            return Err(StoreError::AlreadyStored {
                mod_name: self.mod_name.clone(),
                type_name: self.type_name.clone(),
            });
        }

        info!(
            "Streamed images for mod [{}], type [{}], count [{}]",
            self.mod_name,
            self.type_name,
            self.image_paths.len()
        );
        Ok(self.image_paths.clone())
    }

    pub fn phase(&self) -> StreamPhase {
        self.phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> ModImageStore {
        ModImageStore::new(&AddonConfig::default())
    }

    #[test]
    fn test_stream_then_read_back() {
        let store = store();
        assert!(!store.has_stored_images("Alice", "h1", "cg").unwrap());

        let mut stream = store.open_stream("Alice", "h1", "cg").unwrap();
        assert_eq!(stream.phase(), StreamPhase::Opened);
        stream.store_image("a.png", "cg/a.png", "data:image/png;base64,AAA").unwrap();
        stream.store_image("sub/c.png", "cg/sub/c.png", "data:image/png;base64,CCC").unwrap();
        assert_eq!(stream.phase(), StreamPhase::Writing);

        // not visible as stored until finalized
        assert!(!store.has_stored_images("Alice", "h1", "cg").unwrap());
        let paths = stream.finalize().unwrap();
        assert_eq!(paths, vec!["a.png", "sub/c.png"]);

        assert!(store.has_stored_images("Alice", "h1", "cg").unwrap());
        assert_eq!(store.get_image_paths("Alice", "h1", "cg").unwrap(), Some(paths));
        assert_eq!(
            store.get_image("Alice", "h1", "cg/sub/c.png").unwrap().as_deref(),
            Some("data:image/png;base64,CCC")
        );
        assert!(store.get_image("Alice", "h1", "missing.png").unwrap().is_none());
    }

    #[test]
    fn test_second_stream_rejected_after_finalize() {
        let store = store();
        let mut stream = store.open_stream("Alice", "h1", "cg").unwrap();
        stream.finalize().unwrap();

        assert!(matches!(
            store.open_stream("Alice", "h1", "cg"),
            Err(StoreError::AlreadyStored { .. })
        ));
    }

    #[test]
    fn test_concurrent_streams_only_one_finalizes() {
        let store = store();
        let mut first = store.open_stream("Alice", "h1", "cg").unwrap();
        let mut second = store.open_stream("Alice", "h1", "cg").unwrap();
        first.store_image("a.png", "cg/a.png", "x").unwrap();
        second.store_image("a.png", "cg/a.png", "x").unwrap();

        assert!(first.finalize().is_ok());
        assert!(matches!(second.finalize(), Err(StoreError::AlreadyStored { .. })));
    }

    #[test]
    fn test_writes_after_finalize_rejected() {
        let store = store();
        let mut stream = store.open_stream("Alice", "h1", "cg").unwrap();
        stream.finalize().unwrap();

        assert!(matches!(
            stream.store_image("late.png", "cg/late.png", "x"),
            Err(StoreError::StreamFinalized { .. })
        ));
        assert!(matches!(stream.finalize(), Err(StoreError::StreamFinalized { .. })));
    }

    #[test]
    fn test_pruning_touches_only_target_mods() {
        let store = store();
        for (mod_name, hash) in [("Alice", "old"), ("Bob", "b1"), ("Carol", "c1")] {
            let mut stream = store.open_stream(mod_name, hash, "cg").unwrap();
            stream.store_image("a.png", "cg/a.png", "x").unwrap();
            stream.finalize().unwrap();
        }

        assert_eq!(store.remove_changed_mod_images("Alice", "new").unwrap(), 2);
        assert!(!store.has_stored_images("Alice", "old", "cg").unwrap());
        assert!(store.get_image("Alice", "old", "cg/a.png").unwrap().is_none());
        assert!(store.has_stored_images("Bob", "b1", "cg").unwrap());

        let live: HashSet<String> = ["Bob".to_string()].into_iter().collect();
        assert_eq!(store.remove_not_exist_mod_images(&live).unwrap(), 2);
        assert!(!store.has_stored_images("Carol", "c1", "cg").unwrap());
        assert!(store.get_image("Bob", "b1", "cg/a.png").unwrap().is_some());
    }

    #[test]
    fn test_types_sharing_relative_path_keep_own_images() {
        let store = store();
        for (type_name, data) in [("summer", "SUMMER"), ("winter", "WINTER")] {
            let mut stream = store.open_stream("Seasons", "h1", type_name).unwrap();
            stream
                .store_image("a.png", &format!("{}/a.png", type_name), data)
                .unwrap();
            stream.finalize().unwrap();
        }

        assert_eq!(
            store.get_image("Seasons", "h1", "summer/a.png").unwrap().as_deref(),
            Some("SUMMER")
        );
        assert_eq!(
            store.get_image("Seasons", "h1", "winter/a.png").unwrap().as_deref(),
            Some("WINTER")
        );
        assert_eq!(
            store.get_image_paths("Seasons", "h1", "summer").unwrap(),
            Some(vec!["a.png".to_string()])
        );
    }

    #[test]
    fn test_closed_store_rejects_reads() {
        let store = store();
        store.close();
        assert!(matches!(
            store.get_image("Alice", "h1", "cg/a.png"),
            Err(StoreError::Closed(_))
        ));
    }
}
