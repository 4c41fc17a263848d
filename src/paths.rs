//! Archive path helpers
//!
//! Mod archives are authored on every platform, so paths may arrive with
//! backslashes. Everything inside this crate uses forward slashes:
//! - `\` is converted to `/` before any comparison
//! - folder paths end with a trailing `/`
//! - the archive root is the empty string

/// Image suffixes recognized when scanning a folder (compared case-insensitively)
pub const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp", "bmp", "svg"];

/// Convert Windows path separators to forward slashes
/// `img\\cg\\a.png` -> `img/cg/a.png`
pub fn to_archive_path(path: &str) -> String {
    path.replace('\\', "/")
}

/// Normalize a folder path so it can be used as a prefix.
///
/// `cg` and `cg/` both become `cg/`; the root (`""`, `"/"`, `"."`) stays empty.
pub fn folder_prefix(path: &str) -> String {
    let path = to_archive_path(path);
    let trimmed = path.trim_start_matches("./").trim_matches('/');
    if trimmed.is_empty() || trimmed == "." {
        String::new()
    } else {
        format!("{}/", trimmed)
    }
}

/// Directory part of a path, including the trailing slash.
///
/// A path that already ends in a separator is returned as-is, a bare file
/// name yields the empty string.
pub fn dir_of(path: &str) -> String {
    let path = to_archive_path(path);
    if path.ends_with('/') {
        return path;
    }
    match path.rfind('/') {
        Some(idx) => path[..=idx].to_string(),
        None => String::new(),
    }
}

/// Get the filename from a path (handles both / and \)
pub fn file_name(path: &str) -> &str {
    path.rfind(['\\', '/'])
        .map(|idx| &path[idx + 1..])
        .unwrap_or(path)
}

/// Get file extension without the dot, as written in the path
pub fn extension(path: &str) -> Option<&str> {
    let name = file_name(path);
    match name.rfind('.') {
        // dotfiles like `.hidden` have no extension
        Some(0) | None => None,
        Some(idx) => Some(&name[idx + 1..]),
    }
}

/// Check whether a path names an image this add-on can serve
pub fn is_image_file(path: &str) -> bool {
    extension(path)
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
