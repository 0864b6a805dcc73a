//! Core data model for sync jobs.
//!
//! This module defines the main data structures for representing mirror operations:
//! - SyncJob: one filtered source -> destination mirror
//! - Entry: a single walked source file or directory
//! - SyncStats: counters and per-entry failures accumulated while a job runs
//! - CompareMode, EntryAction, FailureKind: enums controlling and describing behavior

use std::path::{Path, PathBuf};
use std::time::SystemTime;
use chrono::{DateTime, Utc};
use uuid::Uuid;
use crate::checksums::ChecksumAlgorithm;

/// Represents a single sync job: a one-way, filtered mirror of one directory into another.
///
/// A SyncJob is built from literal configuration (CLI flags or a config file),
/// run once, and discarded. Nothing is persisted besides the trees themselves.
#[derive(Debug, Clone)]
pub struct SyncJob {
    /// Unique identifier for this job (shows up in log spans)
    pub id: Uuid,

    /// Optional human readable label
    pub name: Option<String>,

    /// Root source directory (read only)
    pub source_path: PathBuf,

    /// Root destination directory, created if absent
    pub dest_path: PathBuf,

    /// Ordered include rules; first match marks an entry as provisionally included
    pub include_patterns: Vec<String>,

    /// Ordered exclude rules; any match vetoes an included entry
    pub exclude_patterns: Vec<String>,

    /// Don't create (and remove) directories with no transferred descendant files
    pub prune_empty_dirs: bool,

    /// Remove destination entries that have no filtered-in source counterpart
    pub delete_extraneous: bool,

    /// How source and destination files are judged identical
    pub compare: CompareMode,

    /// Report what would happen without touching the destination
    pub dry_run: bool,
}

impl SyncJob {
    /// Create a job mirroring `source` into `dest` with no filters and no deletion.
    pub fn new<S: AsRef<Path>, D: AsRef<Path>>(source: S, dest: D) -> Self {
        SyncJob {
            id: Uuid::new_v4(),
            name: None,
            source_path: source.as_ref().to_path_buf(),
            dest_path: dest.as_ref().to_path_buf(),
            include_patterns: Vec::new(),
            exclude_patterns: Vec::new(),
            prune_empty_dirs: false,
            delete_extraneous: false,
            compare: CompareMode::SizeAndMtime,
            dry_run: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn include<I, P>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.include_patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn exclude<I, P>(mut self, patterns: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.exclude_patterns.extend(patterns.into_iter().map(Into::into));
        self
    }

    pub fn delete_extraneous(mut self, enabled: bool) -> Self {
        self.delete_extraneous = enabled;
        self
    }

    pub fn prune_empty_dirs(mut self, enabled: bool) -> Self {
        self.prune_empty_dirs = enabled;
        self
    }

    pub fn compare(mut self, compare: CompareMode) -> Self {
        self.compare = compare;
        self
    }

    pub fn dry_run(mut self, enabled: bool) -> Self {
        self.dry_run = enabled;
        self
    }

    /// Label used in logs and summaries: the name if set, otherwise `source -> dest`.
    pub fn label(&self) -> String {
        match &self.name {
            Some(name) => name.clone(),
            None => format!("{} -> {}", self.source_path.display(), self.dest_path.display()),
        }
    }
}

/// How a source file is compared against an existing destination file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareMode {
    /// Identical when size and modification time match
    SizeAndMtime,
    /// Identical when size and content checksum match
    Checksum(ChecksumAlgorithm),
}

impl Default for CompareMode {
    fn default() -> Self {
        CompareMode::SizeAndMtime
    }
}

impl std::fmt::Display for CompareMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CompareMode::SizeAndMtime => write!(f, "size+mtime"),
            CompareMode::Checksum(algorithm) => write!(f, "checksum ({})", algorithm),
        }
    }
}

/// A single walked source entry.
#[derive(Debug, Clone)]
pub struct Entry {
    /// Path relative to the job's source root
    pub rel_path: PathBuf,

    /// True if this entry is a directory
    pub is_dir: bool,

    /// File size in bytes (0 for directories)
    pub size: u64,

    /// Source modification time, if the platform reports one
    pub mtime: Option<SystemTime>,
}

/// What happened to one entry during a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    /// File copied to the destination
    Copied,
    /// File already identical at the destination
    Skipped,
    /// Extraneous or pruned destination entry removed
    Deleted,
    /// Directory created at the destination
    DirCreated,
    /// Transfer or deletion failed; recorded in SyncStats::failures
    Failed,
}

impl std::fmt::Display for EntryAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryAction::Copied => write!(f, "Copied"),
            EntryAction::Skipped => write!(f, "Skipped"),
            EntryAction::Deleted => write!(f, "Deleted"),
            EntryAction::DirCreated => write!(f, "Created"),
            EntryAction::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Transfer,
    Delete,
}

/// A per-entry failure. These never abort a job.
#[derive(Debug, Clone)]
pub struct EntryFailure {
    /// Path relative to the job root
    pub path: PathBuf,

    pub kind: FailureKind,

    /// OS error code, when available
    pub error_code: Option<u32>,

    /// Human-readable error message
    pub message: String,
}

/// Counters accumulated by one job run.
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub copied: usize,
    pub skipped: usize,
    pub deleted: usize,
    pub dirs_created: usize,
    pub bytes_copied: u64,
    pub failures: Vec<EntryFailure>,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl SyncStats {
    pub fn new() -> Self {
        SyncStats {
            copied: 0,
            skipped: 0,
            deleted: 0,
            dirs_created: 0,
            bytes_copied: 0,
            failures: Vec::new(),
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Number of entries that failed to transfer or delete.
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    /// Wall time between start and finish (zero while still running).
    pub fn elapsed(&self) -> chrono::Duration {
        self.finished_at
            .map(|end| end - self.started_at)
            .unwrap_or_else(chrono::Duration::zero)
    }
}

impl Default for SyncStats {
    fn default() -> Self {
        Self::new()
    }
}
