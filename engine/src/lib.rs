//! # Mirror Engine - Filtered Directory Mirroring Library
//!
//! A headless engine for one-way, filtered mirroring of local directory trees.
//! Designed as the foundation for the `mirror` CLI and any other front end.
//!
//! ## Overview
//!
//! Each [`SyncJob`] mirrors one source directory into one destination:
//! - Recursive walk with rsync-style include/exclude globs
//! - Copy only what changed (size + mtime, or content checksum)
//! - Modification time and permission bits preserved on every copy
//! - Optional pruning of directories with no transferred files
//! - Optional deletion of destination entries missing from the filtered source
//! - Per-entry error isolation; only validation errors abort a job
//! - Progress reporting via callbacks (decoupled from UI technology)
//!
//! ## Basic Usage
//!
//! ```no_run
//! use engine::{run_job, SyncJob};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let job = SyncJob::new("pysmartnode/utils", "firmware/modules/pysmartnode/utils")
//!     .include(["*.py"])
//!     .prune_empty_dirs(true)
//!     .delete_extraneous(true);
//!
//! let stats = run_job(&job, None)?;
//! println!(
//!     "{} copied, {} skipped, {} deleted, {} failed",
//!     stats.copied, stats.skipped, stats.deleted, stats.failed()
//! );
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - **model**: Core data structures (SyncJob, Entry, SyncStats, enums)
//! - **error**: Error types and handling
//! - **filter**: Include/exclude rule compilation and matching
//! - **fs_ops**: Low-level filesystem operations
//! - **job**: Job orchestration (validate, plan, run)
//! - **progress**: Progress callback trait
//! - **checksums**: Content checksums for checksum comparison
//! - **config**: TOML job list loading

pub mod model;
pub mod error;
pub mod filter;
pub mod fs_ops;
pub mod job;
pub mod progress;
pub mod checksums;
pub mod config;

// Re-export main types and functions
pub use model::{
    CompareMode, Entry, EntryAction, EntryFailure, FailureKind, SyncJob, SyncStats,
};
pub use error::EngineError;
pub use filter::{FilterDecision, PathFilter};
pub use job::{plan_job, run_job, run_jobs, SyncPlan};
pub use progress::ProgressCallback;
pub use checksums::{compute_file_checksum, ChecksumAlgorithm, ChecksumValue};
pub use config::load_config;
