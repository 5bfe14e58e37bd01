//! Quick-folder file operations: copy/move the current file into a target
//! folder, plus deletion of the current file.
//!
//! These only touch the filesystem. The collection is never updated here —
//! the folder watcher's events drive it, so the viewer state stays
//! consistent no matter who moved the file.

use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum QuickOpError {
    #[error("current item is not a file: {0}")]
    NotAFile(PathBuf),
    #[error("target is not a folder or not writable: {0}")]
    BadTarget(PathBuf),
    #[error("target exists already: {0}")]
    TargetExists(PathBuf),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

fn checked_destination(source: &Path, target_dir: &Path) -> Result<PathBuf, QuickOpError> {
    if !source.is_file() {
        return Err(QuickOpError::NotAFile(source.to_path_buf()));
    }
    if !target_dir.is_dir() || is_readonly(target_dir) {
        return Err(QuickOpError::BadTarget(target_dir.to_path_buf()));
    }
    let name = source
        .file_name()
        .ok_or_else(|| QuickOpError::NotAFile(source.to_path_buf()))?;
    let dest = target_dir.join(name);
    if dest.exists() {
        return Err(QuickOpError::TargetExists(dest));
    }
    Ok(dest)
}

fn is_readonly(dir: &Path) -> bool {
    dir.metadata()
        .map(|m| m.permissions().readonly())
        .unwrap_or(true)
}

/// Copy `source` into `target_dir` under its own name.
pub fn quick_copy(source: &Path, target_dir: &Path) -> Result<PathBuf, QuickOpError> {
    let dest = checked_destination(source, target_dir)?;
    std::fs::copy(source, &dest)?;
    eprintln!("fileops: copied {} -> {}", source.display(), dest.display());
    Ok(dest)
}

/// Move `source` into `target_dir` under its own name.
pub fn quick_move(source: &Path, target_dir: &Path) -> Result<PathBuf, QuickOpError> {
    let dest = checked_destination(source, target_dir)?;
    match std::fs::rename(source, &dest) {
        Ok(()) => {}
        Err(_) => {
            // Cross-device move: copy then remove.
            std::fs::copy(source, &dest)?;
            std::fs::remove_file(source)?;
        }
    }
    eprintln!("fileops: moved {} -> {}", source.display(), dest.display());
    Ok(dest)
}

/// Delete the file backing the current entry. The watcher's DELETE event
/// takes care of the collection.
pub fn delete_file(path: &Path) -> Result<(), QuickOpError> {
    if !path.is_file() {
        return Err(QuickOpError::NotAFile(path.to_path_buf()));
    }
    std::fs::remove_file(path)?;
    eprintln!("fileops: deleted {}", path.display());
    Ok(())
}
