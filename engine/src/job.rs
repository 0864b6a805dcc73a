//! Job orchestration module.
//!
//! This module provides the job lifecycle functions:
//! - Validating a job's source and preparing its destination
//! - Planning a job (walking and filtering the source tree, pruning)
//! - Running a job (copying, pruning and deleting extraneous entries)
//! - Running an ordered list of independent jobs

use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use chrono::Utc;
use tracing::{debug, error, info, info_span, warn};
use crate::error::EngineError;
use crate::filter::PathFilter;
use crate::fs_ops;
use crate::model::{Entry, EntryAction, EntryFailure, FailureKind, SyncJob, SyncStats};
use crate::progress::ProgressCallback;

/// The filtered view of a source tree that the destination should end up mirroring.
#[derive(Debug, Default)]
pub struct SyncPlan {
    /// Directories and files to mirror, parents before children
    pub entries: Vec<Entry>,

    /// Included directories left out because no file below them is transferred,
    /// deepest first
    pub pruned_dirs: Vec<PathBuf>,

    /// Source entries that could not be read during the walk
    pub unreadable: Vec<EntryFailure>,
}

impl SyncPlan {
    fn kept_paths(&self, dirs: bool) -> HashSet<&Path> {
        self.entries
            .iter()
            .filter(|e| e.is_dir == dirs)
            .map(|e| e.rel_path.as_path())
            .collect()
    }

    /// True when `rel_path` lies at or below a source entry the walk could not
    /// read. Its destination copy must survive deletion and pruning because the
    /// source side is unknown.
    pub fn shadowed_by_unreadable(&self, rel_path: &Path) -> bool {
        self.unreadable
            .iter()
            .any(|failure| rel_path.starts_with(&failure.path))
    }
}

/// Check that the job's source exists and is a directory.
pub fn validate_source(job: &SyncJob) -> Result<(), EngineError> {
    match fs::metadata(&job.source_path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(EngineError::SourceNotFound {
            path: job.source_path.clone(),
        }),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Err(EngineError::SourceNotFound {
            path: job.source_path.clone(),
        }),
        Err(e) => Err(EngineError::SourceAccessDenied {
            path: job.source_path.clone(),
            source: e,
        }),
    }
}

/// Create the destination root (and intermediate directories) if needed.
///
/// In dry-run mode nothing is created, but a non-directory in the way is
/// still reported.
pub fn prepare_destination(job: &SyncJob) -> Result<(), EngineError> {
    let unwritable = |source: io::Error| EngineError::DestUnwritable {
        path: job.dest_path.clone(),
        source,
    };

    match fs::metadata(&job.dest_path) {
        Ok(metadata) if metadata.is_dir() => Ok(()),
        Ok(_) => Err(unwritable(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "destination exists but is not a directory",
        ))),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            if job.dry_run {
                Ok(())
            } else {
                fs::create_dir_all(&job.dest_path).map_err(unwritable)
            }
        }
        Err(e) => Err(unwritable(e)),
    }
}

/// Plan a job by walking and filtering the source tree.
///
/// A directory is kept when the filter allows it and, with pruning enabled,
/// when at least one kept file lives somewhere below it.
pub fn plan_job(job: &SyncJob, filter: &PathFilter) -> Result<SyncPlan, EngineError> {
    let listing = fs_ops::enumerate_tree(&job.source_path, filter)?;

    // An unreadable entry may hide files, so its directory and every parent
    // count as populated.
    let mut populated: HashSet<PathBuf> = HashSet::new();
    let unreadable_paths = listing.unreadable.iter().map(|f| (f.path.as_path(), 0));
    let file_paths = listing
        .entries
        .iter()
        .filter(|e| !e.is_dir)
        .map(|e| (e.rel_path.as_path(), 1));
    for (path, skip) in unreadable_paths.chain(file_paths) {
        for ancestor in path.ancestors().skip(skip) {
            if ancestor.as_os_str().is_empty() || !populated.insert(ancestor.to_path_buf()) {
                break;
            }
        }
    }

    let mut plan = SyncPlan {
        unreadable: listing.unreadable,
        ..SyncPlan::default()
    };
    for entry in listing.entries {
        if entry.is_dir && job.prune_empty_dirs && !populated.contains(&entry.rel_path) {
            debug!(path = %entry.rel_path.display(), "pruning empty directory");
            plan.pruned_dirs.push(entry.rel_path);
        } else {
            plan.entries.push(entry);
        }
    }
    plan.pruned_dirs
        .sort_by_key(|p| std::cmp::Reverse(p.components().count()));

    Ok(plan)
}

/// Run one sync job.
///
/// Validation and destination errors abort the job. Individual copy or delete
/// failures are recorded in `SyncStats::failures` and do NOT stop the job.
///
/// # Errors
/// `SourceNotFound` / `SourceAccessDenied` before anything is touched,
/// `InvalidPattern` for a bad rule, `DestUnwritable` when the destination
/// root cannot be used, `EnumerationFailed` when the source root cannot be read.
pub fn run_job(
    job: &SyncJob,
    progress_callback: Option<&dyn ProgressCallback>,
) -> Result<SyncStats, EngineError> {
    let span = info_span!("job", id = %job.id, name = %job.label());
    let _enter = span.enter();

    validate_source(job)?;
    let filter = PathFilter::new(&job.include_patterns, &job.exclude_patterns)?;
    prepare_destination(job)?;
    let plan = plan_job(job, &filter)?;

    info!(
        entries = plan.entries.len(),
        compare = %job.compare,
        dry_run = job.dry_run,
        "job started"
    );
    if let Some(callback) = progress_callback {
        callback.on_job_started(job);
    }

    let mut run = JobRun {
        job,
        progress_callback,
        stats: SyncStats::new(),
        removed: HashSet::new(),
    };

    for failure in &plan.unreadable {
        run.record_failure(failure.clone());
    }

    for entry in &plan.entries {
        if entry.is_dir {
            run.sync_dir(entry);
        } else {
            run.sync_file(entry);
        }
    }

    for rel_path in &plan.pruned_dirs {
        run.remove_pruned_dir(rel_path);
    }

    if job.delete_extraneous {
        run.delete_extraneous(&plan);
    }

    let mut stats = run.stats;
    stats.finished_at = Some(Utc::now());
    info!(
        copied = stats.copied,
        skipped = stats.skipped,
        deleted = stats.deleted,
        failed = stats.failed(),
        "job finished"
    );
    if let Some(callback) = progress_callback {
        callback.on_job_completed(job, &stats);
    }

    Ok(stats)
}

/// Run jobs in order. Each job is independent: a fatal error in one does not
/// stop the next unless `stop_on_error` is set.
///
/// Returns one result per job that was attempted, in order.
pub fn run_jobs(
    jobs: &[SyncJob],
    progress_callback: Option<&dyn ProgressCallback>,
    stop_on_error: bool,
) -> Vec<Result<SyncStats, EngineError>> {
    let mut results = Vec::with_capacity(jobs.len());
    for job in jobs {
        let result = run_job(job, progress_callback);
        let failed = result.is_err();
        if let Err(e) = &result {
            error!(job = %job.label(), error = %e.detailed_message(), "job failed");
        }
        results.push(result);
        if failed && stop_on_error {
            break;
        }
    }
    results
}

/// Mutable state of one job while it runs.
struct JobRun<'a> {
    job: &'a SyncJob,
    progress_callback: Option<&'a dyn ProgressCallback>,
    stats: SyncStats,
    /// Destination paths deleted so far, or that would be in a dry run
    removed: HashSet<PathBuf>,
}

impl<'a> JobRun<'a> {
    fn notify(&self, rel_path: &Path, action: EntryAction) {
        if let Some(callback) = self.progress_callback {
            callback.on_entry_completed(self.job, rel_path, action);
        }
    }

    fn record_failure(&mut self, failure: EntryFailure) {
        warn!(path = %failure.path.display(), kind = ?failure.kind, "{}", failure.message);
        let path = failure.path.clone();
        self.stats.failures.push(failure);
        self.notify(&path, EntryAction::Failed);
    }

    fn fail(&mut self, rel_path: &Path, kind: FailureKind, err: EngineError) {
        self.record_failure(EntryFailure {
            path: rel_path.to_path_buf(),
            kind,
            error_code: err.raw_os_error(),
            message: err.detailed_message(),
        });
    }

    fn sync_dir(&mut self, entry: &Entry) {
        let dst = self.job.dest_path.join(&entry.rel_path);
        let created = if self.job.dry_run {
            Ok(!dst.is_dir())
        } else {
            fs_ops::ensure_dir(&dst)
        };

        match created {
            Ok(true) => {
                debug!(path = %entry.rel_path.display(), "directory created");
                self.stats.dirs_created += 1;
                self.notify(&entry.rel_path, EntryAction::DirCreated);
            }
            Ok(false) => {}
            Err(e) => self.fail(
                &entry.rel_path,
                FailureKind::Transfer,
                EngineError::TransferFailed { path: dst, source: e },
            ),
        }
    }

    fn sync_file(&mut self, entry: &Entry) {
        let src = self.job.source_path.join(&entry.rel_path);
        let dst = self.job.dest_path.join(&entry.rel_path);

        let up_to_date = match fs_ops::is_up_to_date(entry, &src, &dst, self.job.compare) {
            Ok(up_to_date) => up_to_date,
            Err(e) => return self.fail(&entry.rel_path, FailureKind::Transfer, e),
        };

        if up_to_date {
            debug!(path = %entry.rel_path.display(), "up to date");
            self.stats.skipped += 1;
            self.notify(&entry.rel_path, EntryAction::Skipped);
            return;
        }

        let copied = if self.job.dry_run {
            Ok(entry.size)
        } else {
            fs_ops::copy_file_with_metadata(&src, &dst)
        };

        match copied {
            Ok(bytes) => {
                debug!(path = %entry.rel_path.display(), bytes, "copied");
                self.stats.copied += 1;
                self.stats.bytes_copied += bytes;
                self.notify(&entry.rel_path, EntryAction::Copied);
            }
            Err(e) => self.fail(&entry.rel_path, FailureKind::Transfer, e),
        }
    }

    fn delete(&mut self, rel_path: &Path, is_dir: bool) {
        let path = self.job.dest_path.join(rel_path);
        let removed = if self.job.dry_run {
            Ok(())
        } else {
            fs_ops::remove_entry(&path, is_dir)
        };

        match removed {
            Ok(()) => {
                debug!(path = %rel_path.display(), "deleted");
                self.removed.insert(rel_path.to_path_buf());
                self.stats.deleted += 1;
                self.notify(rel_path, EntryAction::Deleted);
            }
            Err(e) => self.fail(
                rel_path,
                FailureKind::Delete,
                EngineError::DeleteFailed { path, source: e },
            ),
        }
    }

    /// A pruned directory left over from an earlier run is removed once empty.
    fn remove_pruned_dir(&mut self, rel_path: &Path) {
        let path = self.job.dest_path.join(rel_path);
        let is_dir = fs::symlink_metadata(&path)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return;
        }

        match self.is_emptied(rel_path, &path) {
            Ok(true) => self.delete(rel_path, true),
            Ok(false) => {
                debug!(path = %rel_path.display(), "pruned directory not empty, keeping");
            }
            Err(e) => self.fail(
                rel_path,
                FailureKind::Delete,
                EngineError::DeleteFailed { path, source: e },
            ),
        }
    }

    /// A directory counts as empty when every child has already been removed.
    /// In a dry run nothing is removed on disk, so this keeps the counts equal
    /// to a real run's.
    fn is_emptied(&self, rel_path: &Path, path: &Path) -> io::Result<bool> {
        if self.removed.is_empty() {
            return fs_ops::is_dir_empty(path);
        }
        for child in fs::read_dir(path)? {
            if !self.removed.contains(&rel_path.join(child?.file_name())) {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Remove destination entries with no counterpart in the plan, files before
    /// the directories holding them.
    ///
    /// Nothing at or below an unreadable source path is touched. The directories
    /// above one were walked, so they are already in the plan.
    fn delete_extraneous(&mut self, plan: &SyncPlan) {
        if !self.job.dest_path.is_dir() {
            return;
        }

        let listing = match fs_ops::enumerate_dest_tree(&self.job.dest_path) {
            Ok(listing) => listing,
            Err(e) => return self.fail(Path::new(""), FailureKind::Delete, e),
        };

        for failure in listing.unreadable {
            self.record_failure(failure);
        }

        if !plan.unreadable.is_empty() {
            warn!(
                unreadable = plan.unreadable.len(),
                "source only partly readable, keeping destination entries below unreadable paths"
            );
        }

        let kept_files = plan.kept_paths(false);
        let kept_dirs = plan.kept_paths(true);
        for entry in &listing.entries {
            if self.removed.contains(&entry.rel_path) {
                continue;
            }
            if plan.shadowed_by_unreadable(&entry.rel_path) {
                debug!(path = %entry.rel_path.display(), "source unreadable, keeping");
                continue;
            }
            let kept = if entry.is_dir {
                kept_dirs.contains(entry.rel_path.as_path())
            } else {
                kept_files.contains(entry.rel_path.as_path())
            };
            if !kept {
                self.delete(&entry.rel_path, entry.is_dir);
            }
        }
    }
}
