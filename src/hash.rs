//! Mod version identifiers.
//!
//! A mod's version identifier is an xxHash64 over its archive contents,
//! encoded as base64 of the little-endian digest. Cache records are keyed by
//! it, so any change to the archive invalidates everything derived from it.

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use xxhash_rust::xxh64::Xxh64;

fn encode_digest(hash: u64) -> String {
    STANDARD.encode(hash.to_le_bytes())
}

/// Compute the version hash of an archive file on disk.
///
/// Uses streaming to handle large archives without loading into memory.
pub fn compute_file_hash(path: &Path) -> Result<String> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file for hashing: {}", path.display()))?;

    let mut reader = BufReader::with_capacity(1024 * 1024, file);
    let mut buf = vec![0u8; 1024 * 1024];
    let mut hasher = Xxh64::new(0);

    loop {
        let bytes_read = reader
            .read(&mut buf)
            .with_context(|| format!("Failed to read file for hashing: {}", path.display()))?;

        if bytes_read == 0 {
            break;
        }

        hasher.update(&buf[..bytes_read]);
    }

    Ok(encode_digest(hasher.digest()))
}

/// Compute the version hash of an archive held in memory.
///
/// Entries are hashed in path order so the result does not depend on
/// insertion order. Path and data lengths are mixed in to keep
/// `("ab", "c")` and `("a", "bc")` apart.
pub fn compute_entries_hash<'a, I>(entries: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a [u8])>,
{
    let mut sorted: Vec<(&str, &[u8])> = entries.into_iter().collect();
    sorted.sort_by(|a, b| a.0.cmp(b.0));

    let mut hasher = Xxh64::new(0);
    for (path, data) in sorted {
        hasher.update(&(path.len() as u64).to_le_bytes());
        hasher.update(path.as_bytes());
        hasher.update(&(data.len() as u64).to_le_bytes());
        hasher.update(data);
    }
    encode_digest(hasher.digest())
}
