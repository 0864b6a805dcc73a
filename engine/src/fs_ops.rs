//! Filesystem operations module.
//!
//! This module provides low-level operations for:
//! - Enumerating filtered source trees and whole destination trees
//! - Deciding whether a destination file is already up to date
//! - Copying files with mtime and permission preservation
//! - Creating and removing destination entries

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use filetime::FileTime;
use tracing::{debug, warn};
use walkdir::WalkDir;
use crate::checksums;
use crate::error::EngineError;
use crate::filter::{FilterDecision, PathFilter};
use crate::model::{CompareMode, Entry, EntryFailure, FailureKind};

/// Entries found under a root, plus the ones that could not be read.
#[derive(Debug, Default)]
pub struct TreeListing {
    pub entries: Vec<Entry>,
    pub unreadable: Vec<EntryFailure>,
}

fn relative<'a>(root: &Path, path: &'a Path) -> &'a Path {
    path.strip_prefix(root).unwrap_or(path)
}

fn walk_failure(root: &Path, err: &walkdir::Error, kind: FailureKind) -> EntryFailure {
    let path = err
        .path()
        .map(|p| relative(root, p).to_path_buf())
        .unwrap_or_default();
    EntryFailure {
        path,
        kind,
        error_code: err
            .io_error()
            .and_then(|e| e.raw_os_error())
            .map(|c| c as u32),
        message: err.to_string(),
    }
}

/// Enumerate the source tree, keeping only entries the filter allows.
///
/// Entries come back parents-first, siblings sorted by name. Directories the
/// filter rejects are not descended. Symlinks are not mirrored.
///
/// # Errors
/// Returns EngineError::EnumerationFailed only if the root itself cannot be
/// read; unreadable entries below it are collected in `unreadable`.
pub fn enumerate_tree(source: &Path, filter: &PathFilter) -> Result<TreeListing, EngineError> {
    let mut listing = TreeListing::default();

    let walker = WalkDir::new(source)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let rel = relative(source, e.path());
            match filter.decision(rel, e.file_type().is_dir()) {
                FilterDecision::Included => true,
                decision => {
                    debug!(path = %rel.display(), ?decision, "filtered out");
                    false
                }
            }
        });

    for item in walker {
        let dir_entry = match item {
            Ok(dir_entry) => dir_entry,
            Err(err) => {
                if err.depth() == 0 {
                    return Err(EngineError::EnumerationFailed {
                        path: source.to_path_buf(),
                        source: err.into(),
                    });
                }
                warn!(error = %err, "unreadable source entry");
                listing
                    .unreadable
                    .push(walk_failure(source, &err, FailureKind::Transfer));
                continue;
            }
        };

        let rel_path = relative(source, dir_entry.path()).to_path_buf();
        let file_type = dir_entry.file_type();
        if file_type.is_symlink() {
            debug!(path = %rel_path.display(), "skipping symlink");
            continue;
        }

        let metadata = match dir_entry.metadata() {
            Ok(metadata) => metadata,
            Err(err) => {
                warn!(path = %rel_path.display(), error = %err, "cannot read source metadata");
                listing
                    .unreadable
                    .push(walk_failure(source, &err, FailureKind::Transfer));
                continue;
            }
        };

        listing.entries.push(Entry {
            rel_path,
            is_dir: file_type.is_dir(),
            size: if file_type.is_dir() { 0 } else { metadata.len() },
            mtime: metadata.modified().ok(),
        });
    }

    Ok(listing)
}

/// Enumerate every entry under a destination root, children before parents.
///
/// Symlinks are reported as non-directories so they are removed, not followed.
pub fn enumerate_dest_tree(dest: &Path) -> Result<TreeListing, EngineError> {
    let mut listing = TreeListing::default();

    for item in WalkDir::new(dest)
        .min_depth(1)
        .follow_links(false)
        .contents_first(true)
        .sort_by_file_name()
    {
        match item {
            Ok(dir_entry) => {
                let is_dir = dir_entry.file_type().is_dir();
                let metadata = dir_entry.metadata().ok();
                listing.entries.push(Entry {
                    rel_path: relative(dest, dir_entry.path()).to_path_buf(),
                    is_dir,
                    size: metadata.as_ref().filter(|_| !is_dir).map_or(0, |m| m.len()),
                    mtime: metadata.and_then(|m| m.modified().ok()),
                });
            }
            Err(err) if err.depth() == 0 => {
                return Err(EngineError::EnumerationFailed {
                    path: dest.to_path_buf(),
                    source: err.into(),
                });
            }
            Err(err) => {
                warn!(error = %err, "unreadable destination entry");
                listing
                    .unreadable
                    .push(walk_failure(dest, &err, FailureKind::Delete));
            }
        }
    }

    Ok(listing)
}

/// Decide whether the destination already holds an identical copy of `source`.
///
/// A missing destination, a non-file in its place, or a size difference always
/// means "not up to date".
pub fn is_up_to_date(
    source: &Entry,
    src_path: &Path,
    dst_path: &Path,
    compare: CompareMode,
) -> Result<bool, EngineError> {
    let dst_metadata = match fs::symlink_metadata(dst_path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => {
            return Err(EngineError::TransferFailed {
                path: dst_path.to_path_buf(),
                source: e,
            })
        }
    };

    if !dst_metadata.is_file() || dst_metadata.len() != source.size {
        return Ok(false);
    }

    match compare {
        CompareMode::SizeAndMtime => {
            let dst_mtime = FileTime::from_last_modification_time(&dst_metadata);
            Ok(source
                .mtime
                .map(FileTime::from_system_time)
                .map_or(false, |src_mtime| mtimes_equal(src_mtime, dst_mtime)))
        }
        CompareMode::Checksum(algorithm) => checksums::files_match(src_path, dst_path, algorithm),
    }
}

/// Filesystems without sub-second timestamps report zero nanoseconds; compare
/// whole seconds in that case.
fn mtimes_equal(a: FileTime, b: FileTime) -> bool {
    if a.unix_seconds() != b.unix_seconds() {
        return false;
    }
    a.nanoseconds() == 0 || b.nanoseconds() == 0 || a.nanoseconds() == b.nanoseconds()
}

fn temp_path_for(dst: &Path) -> PathBuf {
    let name = dst
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    dst.with_file_name(format!(".{}.mirror-tmp", name))
}

/// Copy a file from source to destination with metadata preservation.
///
/// The data is written to a temporary sibling and renamed into place, so an
/// interrupted copy never leaves a truncated destination file. A directory
/// sitting at the destination path is replaced.
///
/// # Returns
/// Number of bytes copied
pub fn copy_file_with_metadata(src: &Path, dst: &Path) -> Result<u64, EngineError> {
    let write_error = |e: io::Error| EngineError::TransferFailed {
        path: dst.to_path_buf(),
        source: e,
    };

    ensure_parent_dir_exists(dst).map_err(write_error)?;

    let mut src_file = fs::File::open(src).map_err(|e| EngineError::TransferFailed {
        path: src.to_path_buf(),
        source: e,
    })?;
    let src_metadata = src_file.metadata().map_err(|e| EngineError::TransferFailed {
        path: src.to_path_buf(),
        source: e,
    })?;

    if let Ok(existing) = fs::symlink_metadata(dst) {
        if existing.is_dir() {
            fs::remove_dir_all(dst).map_err(write_error)?;
        }
    }

    let tmp = temp_path_for(dst);
    let result = (|| -> io::Result<u64> {
        let mut dst_file = fs::File::create(&tmp)?;
        let bytes_copied = io::copy(&mut src_file, &mut dst_file)?;
        drop(dst_file);

        if let Ok(mtime) = src_metadata.modified() {
            filetime::set_file_mtime(&tmp, FileTime::from_system_time(mtime))?;
        }
        fs::set_permissions(&tmp, src_metadata.permissions())?;
        fs::rename(&tmp, dst)?;
        Ok(bytes_copied)
    })();

    result.map_err(|e| {
        let _ = fs::remove_file(&tmp);
        write_error(e)
    })
}

/// Make sure `path` is a directory, replacing a non-directory in its way.
///
/// Returns true when the directory had to be created.
pub fn ensure_dir(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(metadata) if metadata.is_dir() => Ok(false),
        Ok(_) => {
            fs::remove_file(path)?;
            fs::create_dir(path)?;
            Ok(true)
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

/// Ensure the parent directory of a path exists, creating it if necessary.
pub fn ensure_parent_dir_exists(path: &Path) -> io::Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => match fs::metadata(parent) {
            Ok(metadata) if metadata.is_dir() => Ok(()),
            Ok(_) => Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "Parent path exists but is not a directory",
            )),
            Err(e) if e.kind() == io::ErrorKind::NotFound => fs::create_dir_all(parent),
            Err(e) => Err(e),
        },
        _ => Ok(()),
    }
}

/// Remove one destination entry. Directories must already be empty.
pub fn remove_entry(path: &Path, is_dir: bool) -> io::Result<()> {
    if is_dir {
        fs::remove_dir(path)
    } else {
        fs::remove_file(path)
    }
}

/// True when the directory has no entries at all.
pub fn is_dir_empty(path: &Path) -> io::Result<bool> {
    Ok(fs::read_dir(path)?.next().is_none())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_file(path: &Path, content: &[u8]) {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("Failed to create parent");
        }
        let mut file = fs::File::create(path).expect("Failed to create file");
        file.write_all(content).expect("Failed to write file");
    }

    fn rel_paths(listing: &TreeListing) -> Vec<String> {
        listing
            .entries
            .iter()
            .map(|e| e.rel_path.to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_enumerate_nested_directory_parents_first() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_file(&src.join("file1.txt"), b"data1");
        write_file(&src.join("subdir").join("file2.txt"), b"data2");

        let listing = enumerate_tree(&src, &PathFilter::default()).expect("Failed to enumerate");

        assert_eq!(rel_paths(&listing), vec!["file1.txt", "subdir", "subdir/file2.txt"]);
        let dirs: Vec<_> = listing.entries.iter().filter(|e| e.is_dir).collect();
        assert_eq!(dirs.len(), 1);
        assert_eq!(dirs[0].size, 0);
        let total_size: u64 = listing.entries.iter().map(|e| e.size).sum();
        assert_eq!(total_size, 10);
        assert!(listing.unreadable.is_empty());
    }

    #[test]
    fn test_enumerate_applies_filter() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("src");
        write_file(&src.join("a").join("b.py"), b"x");
        write_file(&src.join("a").join("b.txt"), b"x");
        write_file(&src.join("__pycache__").join("b.cpython.pyc"), b"x");
        write_file(&src.join("__pycache__").join("keep.py"), b"x");

        let filter = PathFilter::new(&["*.py"], &["__pycache__/"]).expect("Failed to build filter");
        let listing = enumerate_tree(&src, &filter).expect("Failed to enumerate");

        assert_eq!(rel_paths(&listing), vec!["a", "a/b.py"]);
    }

    #[test]
    fn test_enumerate_nonexistent_source() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = enumerate_tree(&temp_dir.path().join("nonexistent"), &PathFilter::default());
        assert!(matches!(result, Err(EngineError::EnumerationFailed { .. })));
    }

    #[test]
    fn test_enumerate_dest_tree_children_first() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let dst = temp_dir.path().join("dst");
        write_file(&dst.join("d").join("x.py"), b"x");
        write_file(&dst.join("top.py"), b"x");

        let listing = enumerate_dest_tree(&dst).expect("Failed to enumerate");
        assert_eq!(rel_paths(&listing), vec!["d/x.py", "d", "top.py"]);
    }

    #[test]
    fn test_copy_file_with_metadata() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("source.txt");
        let dst_file = temp_dir.path().join("out").join("dest.txt");
        write_file(&src_file, b"test content");
        let mtime = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_mtime(&src_file, mtime).expect("Failed to set mtime");

        let bytes = copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert_eq!(bytes, 12);

        let content = fs::read_to_string(&dst_file).expect("Failed to read dest");
        assert_eq!(content, "test content");
        let dst_meta = fs::metadata(&dst_file).expect("Failed to stat dest");
        assert_eq!(FileTime::from_last_modification_time(&dst_meta), mtime);
        assert!(!temp_path_for(&dst_file).exists(), "temporary file should be renamed away");
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_preserves_permission_bits() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("run.py");
        let dst_file = temp_dir.path().join("copy.py");
        write_file(&src_file, b"#!/usr/bin/env python");
        fs::set_permissions(&src_file, fs::Permissions::from_mode(0o750)).expect("Failed to chmod");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");

        let mode = fs::metadata(&dst_file).expect("Failed to stat").permissions().mode();
        assert_eq!(mode & 0o777, 0o750);
    }

    #[test]
    fn test_copy_replaces_directory_at_destination() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src_file = temp_dir.path().join("a.py");
        let dst_file = temp_dir.path().join("dst").join("a.py");
        write_file(&src_file, b"x = 1");
        write_file(&dst_file.join("inner.py"), b"old");

        copy_file_with_metadata(&src_file, &dst_file).expect("Failed to copy");
        assert!(dst_file.is_file());
    }

    #[test]
    fn test_is_up_to_date_by_size_and_mtime() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let src = temp_dir.path().join("a.py");
        let dst = temp_dir.path().join("b.py");
        write_file(&src, b"same");
        write_file(&dst, b"diff");
        let mtime = FileTime::from_unix_time(1_500_000_000, 0);
        filetime::set_file_mtime(&src, mtime).expect("Failed to set mtime");
        filetime::set_file_mtime(&dst, mtime).expect("Failed to set mtime");

        let entry = Entry {
            rel_path: PathBuf::from("a.py"),
            is_dir: false,
            size: 4,
            mtime: fs::metadata(&src).expect("Failed to stat").modified().ok(),
        };

        assert!(is_up_to_date(&entry, &src, &dst, CompareMode::SizeAndMtime).expect("compare"));
        assert!(!is_up_to_date(
            &entry,
            &src,
            &dst,
            CompareMode::Checksum(checksums::ChecksumAlgorithm::Blake3)
        )
        .expect("compare"));
        assert!(!is_up_to_date(&entry, &src, &temp_dir.path().join("missing"), CompareMode::SizeAndMtime)
            .expect("compare"));
    }

    #[test]
    fn test_mtimes_equal_tolerates_missing_nanoseconds() {
        let precise = FileTime::from_unix_time(100, 500);
        assert!(mtimes_equal(precise, FileTime::from_unix_time(100, 0)));
        assert!(!mtimes_equal(precise, FileTime::from_unix_time(100, 600)));
        assert!(!mtimes_equal(precise, FileTime::from_unix_time(101, 500)));
    }

    #[test]
    fn test_ensure_dir_creates_and_replaces_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("x").join("y");
        assert!(ensure_dir(&path).expect("Failed to create"));
        assert!(!ensure_dir(&path).expect("Failed to check"));

        let blocker = temp_dir.path().join("blocker");
        write_file(&blocker, b"file");
        assert!(ensure_dir(&blocker).expect("Failed to replace"));
        assert!(blocker.is_dir());
    }

    #[test]
    fn test_ensure_parent_dir_exists() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("subdir").join("file.txt");

        ensure_parent_dir_exists(&path).expect("Failed to create parent");
        assert!(path.parent().unwrap().exists());
    }

    #[test]
    fn test_is_dir_empty() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        assert!(is_dir_empty(temp_dir.path()).expect("Failed to read dir"));

        fs::create_dir(temp_dir.path().join("sub")).expect("Failed to create dir");
        assert!(!is_dir_empty(temp_dir.path()).expect("Failed to read dir"));
        assert!(is_dir_empty(&temp_dir.path().join("sub")).expect("Failed to read dir"));
    }
}
