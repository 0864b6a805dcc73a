//! Progress reporting trait.
//!
//! This module defines the ProgressCallback trait, which keeps the mirror
//! engine independent of how progress is shown. The CLI implements it for
//! verbose per-entry output and per-job summaries.

use std::path::Path;
use crate::model::{EntryAction, SyncJob, SyncStats};

/// Trait for receiving progress updates from a sync job.
///
/// All methods are called synchronously on the thread running the job.
pub trait ProgressCallback: Send {
    /// Called once the job has been validated, before any entry is touched.
    fn on_job_started(&self, job: &SyncJob);

    /// Called after each destination entry is copied, skipped, created, deleted or failed.
    ///
    /// `rel_path` is relative to the job's roots.
    fn on_entry_completed(&self, job: &SyncJob, rel_path: &Path, action: EntryAction);

    /// Called when the job has processed every entry.
    fn on_job_completed(&self, job: &SyncJob, stats: &SyncStats);
}
