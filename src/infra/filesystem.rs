//! Filesystem operations
//!
//! Handles file and directory operations.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::FilesystemError;

/// Create a directory and all parent directories
pub fn create_dir_all(path: &Path) -> Result<(), FilesystemError> {
    std::fs::create_dir_all(path).map_err(|e| FilesystemError::CreateDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove the contents of a directory, keeping the directory itself
///
/// Files and symlinks are unlinked, subdirectories removed recursively.
pub fn clean_dir(path: &Path) -> Result<(), FilesystemError> {
    let entries = std::fs::read_dir(path).map_err(|e| FilesystemError::ReadDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| FilesystemError::ReadDir {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
        let entry_path = entry.path();
        let file_type = entry.file_type().map_err(|e| FilesystemError::ReadDir {
            path: entry_path.clone(),
            error: e.to_string(),
        })?;

        if file_type.is_dir() {
            std::fs::remove_dir_all(&entry_path).map_err(|e| FilesystemError::RemoveDir {
                path: entry_path.clone(),
                error: e.to_string(),
            })?;
        } else {
            std::fs::remove_file(&entry_path).map_err(|e| FilesystemError::RemoveFile {
                path: entry_path.clone(),
                error: e.to_string(),
            })?;
        }
    }
    Ok(())
}

/// Check whether a directory has no entries (a missing directory counts as empty)
pub fn is_empty_dir(path: &Path) -> Result<bool, FilesystemError> {
    if !path.exists() {
        return Ok(true);
    }
    let mut entries = std::fs::read_dir(path).map_err(|e| FilesystemError::ReadDir {
        path: path.to_path_buf(),
        error: e.to_string(),
    })?;
    Ok(entries.next().is_none())
}

/// Copy the tree under `src` into `dest`, recreating symlinks as symlinks
///
/// Failures are collected per entry instead of aborting the copy, so the
/// caller can report everything that went wrong at once.
pub fn copy_tree(src: &Path, dest: &Path) -> Vec<String> {
    let mut failures = Vec::new();

    for entry in WalkDir::new(src).follow_links(false).min_depth(1) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                failures.push(e.to_string());
                continue;
            }
        };

        let Ok(relative) = entry.path().strip_prefix(src) else {
            failures.push(format!("{}: outside of source tree", entry.path().display()));
            continue;
        };
        let target = dest.join(relative);
        let file_type = entry.file_type();

        let result = if file_type.is_dir() {
            std::fs::create_dir_all(&target)
        } else if file_type.is_symlink() {
            std::fs::read_link(entry.path()).and_then(|link| symlink(&link, &target))
        } else {
            std::fs::copy(entry.path(), &target).map(|_| ())
        };

        if let Err(e) = result {
            failures.push(format!("{}: {e}", entry.path().display()));
        }
    }

    failures
}

#[cfg(unix)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(original, link)
}

#[cfg(windows)]
fn symlink(original: &Path, link: &Path) -> std::io::Result<()> {
    if original.is_dir() {
        std::os::windows::fs::symlink_dir(original, link)
    } else {
        std::os::windows::fs::symlink_file(original, link)
    }
}

/// Hex sha256 over a directory tree: relative paths, file contents and link targets
///
/// Entries are visited in sorted order so the digest is stable across runs.
pub fn tree_digest(root: &Path) -> Result<String, FilesystemError> {
    let mut hasher = Sha256::new();

    for entry in WalkDir::new(root)
        .follow_links(false)
        .min_depth(1)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| FilesystemError::ReadDir {
            path: root.to_path_buf(),
            error: e.to_string(),
        })?;
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        hasher.update(relative.to_string_lossy().as_bytes());
        hasher.update([0]);

        if entry.file_type().is_symlink() {
            let link = std::fs::read_link(entry.path()).map_err(|e| FilesystemError::ReadFile {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
            hasher.update(link.to_string_lossy().as_bytes());
        } else if entry.file_type().is_file() {
            let content = std::fs::read(entry.path()).map_err(|e| FilesystemError::ReadFile {
                path: entry.path().to_path_buf(),
                error: e.to_string(),
            })?;
            hasher.update(&content);
        }
        hasher.update([0]);
    }

    Ok(hex::encode(hasher.finalize()))
}

/// Append text to a file, creating it if needed
pub fn append_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;
    file.write_all(content.as_bytes())
        .map_err(|e| FilesystemError::WriteFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        })
}

/// Write content to a file
pub fn write_file(path: &Path, content: &str) -> Result<(), FilesystemError> {
    if let Some(parent) = path.parent() {
        create_dir_all(parent)?;
    }
    std::fs::write(path, content).map_err(|e| FilesystemError::WriteFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}

/// Remove a file; a file that is already gone is fine
pub fn remove_file_if_exists(path: &Path) -> Result<(), FilesystemError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(FilesystemError::RemoveFile {
            path: path.to_path_buf(),
            error: e.to_string(),
        }),
    }
}

/// Read content from a file
pub fn read_file(path: &Path) -> Result<String, FilesystemError> {
    std::fs::read_to_string(path).map_err(|e| FilesystemError::ReadFile {
        path: path.to_path_buf(),
        error: e.to_string(),
    })
}
