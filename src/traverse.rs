//! Folder traversal over an archive's flat entry list.
//!
//! Zip archives store a flat list of paths; folders may or may not have
//! entries of their own. The traverser rebuilds the hierarchy as a prefix
//! tree (one node per path segment) and walks it depth-first with an explicit
//! stack, so deeply nested mods cannot overflow the call stack.
//!
//! Every node becomes an [`ArchiveFileRecord`]. Records under the special
//! folder additionally carry their path relative to it, which is the public
//! path an image is looked up by.

use crate::archive::ArchiveEntry;
use crate::paths::{folder_prefix, is_image_file, to_archive_path};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One file or folder discovered in an archive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchiveFileRecord {
    /// Full path inside the archive (folders end with `/`)
    pub path_in_archive: String,
    /// Path relative to the special folder, only set inside it
    pub path_in_special_folder: Option<String>,
    pub is_file: bool,
    pub is_folder: bool,
    pub is_image: bool,
    pub in_special_folder: bool,
}

impl ArchiveFileRecord {
    /// Check the invariants a well-formed record holds.
    ///
    /// Cached listings are read back from disk, so they are re-checked
    /// before use.
    pub fn is_consistent(&self) -> bool {
        self.is_file != self.is_folder
            && self.in_special_folder == self.path_in_special_folder.is_some()
            && (!self.is_image || self.is_file)
            && !self.path_in_archive.is_empty()
    }

    /// An image the special folder contributes
    pub fn is_special_image(&self) -> bool {
        self.is_file && self.is_image && self.in_special_folder
    }
}

#[derive(Debug, Default)]
struct TreeNode {
    /// Full path of this node, empty for the root
    path: String,
    is_dir: bool,
    children: BTreeMap<String, usize>,
}

/// Prefix tree over archive paths, nodes stored in an arena
#[derive(Debug)]
struct PathTree {
    nodes: Vec<TreeNode>,
}

impl PathTree {
    fn build(entries: &[ArchiveEntry]) -> Self {
        let mut tree = PathTree {
            nodes: vec![TreeNode {
                is_dir: true,
                ..Default::default()
            }],
        };

        for entry in entries {
            let path = to_archive_path(&entry.path);
            let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
            if segments.is_empty() {
                continue;
            }

            let mut current = 0;
            let mut full = String::new();
            for (i, segment) in segments.iter().enumerate() {
                let last = i + 1 == segments.len();
                let is_dir = !last || entry.is_dir;
                full.push_str(segment);
                if is_dir {
                    full.push('/');
                }

                current = match tree.nodes[current].children.get(*segment) {
                    Some(&child) => {
                        if is_dir && !tree.nodes[child].is_dir {
                            // a file entry and a folder share a name; the folder wins
                            tree.nodes[child].is_dir = true;
                            tree.nodes[child].path = full.clone();
                        }
                        child
                    }
                    None => {
                        let child = tree.nodes.len();
                        tree.nodes.push(TreeNode {
                            path: full.clone(),
                            is_dir,
                            children: BTreeMap::new(),
                        });
                        tree.nodes[current].children.insert(segment.to_string(), child);
                        child
                    }
                };
            }
        }

        tree
    }
}

/// Walk every entry of the archive, classifying it relative to `special_folder`.
///
/// `on_image` is called for each image under the special folder as soon as it
/// is discovered, letting the caller stream image bytes instead of buffering
/// them. The returned listing always contains every file and folder.
pub fn traverse_archive<F>(
    entries: &[ArchiveEntry],
    special_folder: &str,
    mut on_image: Option<F>,
) -> Result<Vec<ArchiveFileRecord>>
where
    F: FnMut(&ArchiveFileRecord) -> Result<()>,
{
    let tree = PathTree::build(entries);
    let special = folder_prefix(special_folder);

    let mut result = Vec::new();
    let mut stack: Vec<usize> = vec![0];

    while let Some(index) = stack.pop() {
        let node = &tree.nodes[index];

        if index != 0 {
            let relative = node
                .path
                .strip_prefix(special.as_str())
                .filter(|rel| !rel.is_empty())
                .map(str::to_string);
            let is_file = !node.is_dir;
            let record = ArchiveFileRecord {
                path_in_archive: node.path.clone(),
                in_special_folder: relative.is_some(),
                path_in_special_folder: relative,
                is_file,
                is_folder: node.is_dir,
                is_image: is_file && is_image_file(&node.path),
            };

            if record.is_special_image() {
                if let Some(callback) = on_image.as_mut() {
                    callback(&record)?;
                }
            }
            result.push(record);
        }

        if node.is_dir {
            // reversed so children pop in name order
            stack.extend(node.children.values().rev().copied());
        }
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_special_images(entries: &[ArchiveEntry], special_folder: &str) -> Vec<ArchiveFileRecord> {
        traverse_archive::<fn(&ArchiveFileRecord) -> Result<()>>(entries, special_folder, None)
            .unwrap()
            .into_iter()
            .filter(ArchiveFileRecord::is_special_image)
            .collect()
    }

    fn alice_entries() -> Vec<ArchiveEntry> {
        vec![
            ArchiveEntry::file("boot.json"),
            ArchiveEntry::file("cg/a.png"),
            ArchiveEntry::file("cg/b.png"),
            ArchiveEntry::file("cg/sub/c.png"),
            ArchiveEntry::file("cg/readme.txt"),
            ArchiveEntry::file("other/d.png"),
        ]
    }

    #[test]
    fn test_special_folder_images_have_relative_paths() {
        let images = list_special_images(&alice_entries(), "cg/");
        let rel: Vec<_> = images
            .iter()
            .map(|r| r.path_in_special_folder.clone().unwrap_or_default())
            .collect();
        assert_eq!(rel, vec!["a.png", "b.png", "sub/c.png"]);
        assert_eq!(images[2].path_in_archive, "cg/sub/c.png");
    }

    #[test]
    fn test_listing_contains_files_and_implicit_folders() -> Result<()> {
        let records = traverse_archive::<fn(&ArchiveFileRecord) -> Result<()>>(&alice_entries(), "cg", None)?;

        let folders: Vec<_> = records
            .iter()
            .filter(|r| r.is_folder)
            .map(|r| r.path_in_archive.as_str())
            .collect();
        assert_eq!(folders, vec!["cg/", "cg/sub/", "other/"]);

        let files = records.iter().filter(|r| r.is_file).count();
        assert_eq!(files, 6);

        let readme = records
            .iter()
            .find(|r| r.path_in_archive == "cg/readme.txt")
            .expect("readme listed");
        assert!(readme.in_special_folder);
        assert!(!readme.is_image);

        let outside = records
            .iter()
            .find(|r| r.path_in_archive == "other/d.png")
            .expect("outside image listed");
        assert!(!outside.in_special_folder);
        assert!(outside.path_in_special_folder.is_none());

        assert!(records.iter().all(ArchiveFileRecord::is_consistent));
        Ok(())
    }

    #[test]
    fn test_callback_sees_each_special_image_once() -> Result<()> {
        let mut seen = Vec::new();
        let records = traverse_archive(
            &alice_entries(),
            "cg",
            Some(|record: &ArchiveFileRecord| {
                seen.push(record.path_in_archive.clone());
                Ok(())
            }),
        )?;

        assert_eq!(seen, vec!["cg/a.png", "cg/b.png", "cg/sub/c.png"]);
        assert_eq!(records.len(), 9);
        Ok(())
    }

    #[test]
    fn test_callback_error_stops_traversal() {
        let result = traverse_archive(
            &alice_entries(),
            "cg",
            Some(|_: &ArchiveFileRecord| anyhow::bail!("store full")),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_explicit_dir_entries_and_root_folder() {
        let entries = vec![
            ArchiveEntry::dir("img/"),
            ArchiveEntry::dir("img/cg/"),
            ArchiveEntry::file("img/cg/x.JPG"),
            ArchiveEntry::file("top.webp"),
        ];

        let images = list_special_images(&entries, "");
        let rel: Vec<_> = images
            .iter()
            .filter_map(|r| r.path_in_special_folder.as_deref())
            .collect();
        assert_eq!(rel, vec!["img/cg/x.JPG", "top.webp"]);
    }

    #[test]
    fn test_missing_special_folder_yields_no_images() {
        assert!(list_special_images(&alice_entries(), "nope/").is_empty());
    }
}
