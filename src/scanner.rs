//! Directory scanner: list a folder's immediate children as ordered entries.
//!
//! A scan is a wholesale snapshot, not an incremental diff: the collection
//! replaces its entry list with the result. Accepted are image files (by
//! extension, case-insensitive) and directories, which stay navigable and
//! render via the placeholder policy. A folder that disappears mid-scan
//! yields an empty list, not an error.

use std::path::Path;

use walkdir::WalkDir;

use crate::entry::ImageEntry;

pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp"];

pub fn is_image_ext(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str())
}

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(is_image_ext)
        .unwrap_or(false)
}

/// Scan the immediate children of `dir`, sorted ascending by path and unique
/// by path. Re-scanning an unchanged folder yields the same order.
pub fn scan_folder(dir: &Path) -> Vec<ImageEntry> {
    let mut entries: Vec<ImageEntry> = WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_dir() || is_image_file(e.path()))
        .map(|e| ImageEntry::new(e.path().to_path_buf()))
        .collect();

    entries.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    entries.dedup();
    entries
}
