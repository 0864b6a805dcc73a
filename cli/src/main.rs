//! mirror - Command-line front end for the mirror engine.
//!
//! Runs an ordered list of filtered one-way directory mirrors, given as
//! `--job SOURCE:DEST[:INCLUDE][:EXCLUDE]` flags and/or a TOML job file.
//! Jobs run one after another; a fatal error in one job does not stop the
//! rest unless `--strict` is given.

use anyhow::{anyhow, bail, Context};
use clap::{ArgAction, Parser};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use engine::{
    config::load_config,
    job::run_jobs,
    model::{CompareMode, EntryAction, SyncJob, SyncStats},
    progress::ProgressCallback,
    ChecksumAlgorithm, EngineError,
};

const EXIT_SOURCE_MISSING: i32 = 1;
const EXIT_DEST_UNWRITABLE: i32 = 2;
const EXIT_JOB_FAILED: i32 = 3;
const EXIT_USAGE: i32 = 64;

/// mirror - filtered one-way directory synchronization
#[derive(Parser, Debug)]
#[command(name = "mirror")]
#[command(version)]
#[command(about = "Mirror filtered directory trees, optionally deleting extraneous files")]
struct Args {
    /// Job as SOURCE:DEST[:INCLUDE,...][:EXCLUDE,...]; repeatable, run in order
    #[arg(long = "job", value_name = "SPEC")]
    jobs: Vec<String>,

    /// TOML file listing jobs (run before any --job)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Delete destination entries missing from the filtered source (--job jobs)
    #[arg(long)]
    delete: bool,

    /// Don't create directories that end up without transferred files (--job jobs)
    #[arg(long)]
    prune_empty_dirs: bool,

    /// Compare file contents instead of size and modification time (--job jobs)
    #[arg(long)]
    checksum: bool,

    /// Checksum algorithm for --checksum: md5, sha256, blake3
    #[arg(long, value_name = "ALGORITHM", default_value = "blake3", requires = "checksum")]
    hash: String,

    /// Report what would change without touching any destination (all jobs)
    #[arg(long)]
    dry_run: bool,

    /// Stop after the first job that fails fatally
    #[arg(long)]
    strict: bool,

    /// Print every entry (-v) and debug logs (-vv)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

/// CLI implementation of ProgressCallback printing to stderr
struct CliProgress {
    verbose: bool,
    quiet: bool,
}

impl CliProgress {
    fn new(verbose: u8, quiet: bool) -> Self {
        CliProgress {
            verbose: verbose > 0,
            quiet,
        }
    }

    fn format_bytes(bytes: u64) -> String {
        const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
        let mut size = bytes as f64;
        let mut unit_idx = 0;

        while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
            size /= 1024.0;
            unit_idx += 1;
        }

        format!("{:.2} {}", size, UNITS[unit_idx])
    }

    fn format_duration(elapsed: chrono::Duration) -> String {
        let millis = elapsed.num_milliseconds().max(0);
        let secs = millis / 1000;
        let mins = secs / 60;

        if mins > 0 {
            format!("{}m {}s", mins, secs % 60)
        } else if secs > 0 {
            format!("{}.{:01}s", secs, (millis % 1000) / 100)
        } else {
            format!("{}ms", millis)
        }
    }
}

impl ProgressCallback for CliProgress {
    fn on_job_started(&self, job: &SyncJob) {
        if self.quiet {
            return;
        }
        let suffix = if job.dry_run { " (dry run)" } else { "" };
        eprintln!("Syncing {}{}", job.label(), suffix);
        if self.verbose {
            eprintln!("  Source: {}", job.source_path.display());
            eprintln!("  Destination: {}", job.dest_path.display());
            eprintln!("  Compare: {}", job.compare);
            if !job.include_patterns.is_empty() {
                eprintln!("  Include: {}", job.include_patterns.join(", "));
            }
            if !job.exclude_patterns.is_empty() {
                eprintln!("  Exclude: {}", job.exclude_patterns.join(", "));
            }
        }
    }

    fn on_entry_completed(&self, _job: &SyncJob, rel_path: &Path, action: EntryAction) {
        if self.verbose && action != EntryAction::Failed {
            eprintln!("  {:>7}: {}", action, rel_path.display());
        }
    }

    fn on_job_completed(&self, _job: &SyncJob, stats: &SyncStats) {
        if !self.quiet {
            eprintln!(
                "  Summary: {} copied, {} skipped, {} deleted, {} failed ({}, {})",
                stats.copied,
                stats.skipped,
                stats.deleted,
                stats.failed(),
                Self::format_bytes(stats.bytes_copied),
                Self::format_duration(stats.elapsed())
            );
        }

        if !stats.failures.is_empty() {
            eprintln!("  Failed entries:");
            for failure in &stats.failures {
                eprintln!("    {}: {}", failure.path.display(), failure.message);
            }
        }
    }
}

fn init_logging(verbose: u8, quiet: bool) {
    let default_level = if quiet {
        "error"
    } else {
        match verbose {
            0 => "warn",
            1 => "info",
            _ => "debug",
        }
    };

    let filter = EnvFilter::try_from_env("MIRROR_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .init();
}

/// Split a job spec on `:`. On Windows a drive letter (`C:\x`, `C:/x`) stays
/// attached to its path.
fn split_job_spec(spec: &str) -> Vec<String> {
    let raw: Vec<&str> = spec.split(':').collect();
    let mut fields = Vec::with_capacity(raw.len());
    let mut i = 0;

    while i < raw.len() {
        let part = raw[i];
        let is_drive = cfg!(windows)
            && part.len() == 1
            && part.chars().all(|c| c.is_ascii_alphabetic())
            && raw
                .get(i + 1)
                .map_or(false, |next| next.starts_with('\\') || next.starts_with('/'));

        if is_drive {
            fields.push(format!("{}:{}", part, raw[i + 1]));
            i += 2;
        } else {
            fields.push(part.to_string());
            i += 1;
        }
    }

    fields
}

fn split_globs(field: Option<&String>) -> Vec<String> {
    field
        .map(|f| {
            f.split(',')
                .map(str::trim)
                .filter(|g| !g.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Build a job from a `--job` spec plus the global flags.
fn parse_job_spec(spec: &str, compare: CompareMode, args: &Args) -> anyhow::Result<SyncJob> {
    let fields = split_job_spec(spec);
    if !(2..=4).contains(&fields.len()) {
        bail!(
            "Invalid job '{}'. Expected SOURCE:DEST[:INCLUDE][:EXCLUDE]",
            spec
        );
    }
    if fields[0].is_empty() || fields[1].is_empty() {
        bail!("Invalid job '{}'. Source and destination must not be empty", spec);
    }

    Ok(SyncJob::new(&fields[0], &fields[1])
        .include(split_globs(fields.get(2)))
        .exclude(split_globs(fields.get(3)))
        .delete_extraneous(args.delete)
        .prune_empty_dirs(args.prune_empty_dirs)
        .compare(compare)
        .dry_run(args.dry_run))
}

/// Collect jobs from the config file (first) and `--job` flags (after).
fn collect_jobs(args: &Args) -> anyhow::Result<Vec<SyncJob>> {
    let compare = if args.checksum {
        let algorithm = ChecksumAlgorithm::parse(&args.hash).ok_or_else(|| {
            anyhow!(
                "Invalid hash algorithm '{}'. Must be 'md5', 'sha256', or 'blake3'",
                args.hash
            )
        })?;
        CompareMode::Checksum(algorithm)
    } else {
        CompareMode::SizeAndMtime
    };

    let mut jobs = Vec::new();
    if let Some(path) = &args.config {
        let loaded = load_config(path)
            .with_context(|| format!("Failed to load jobs from {}", path.display()))?;
        jobs.extend(loaded.into_iter().map(|job| {
            let dry_run = job.dry_run || args.dry_run;
            job.dry_run(dry_run)
        }));
    }
    for spec in &args.jobs {
        jobs.push(parse_job_spec(spec, compare, args)?);
    }

    if jobs.is_empty() {
        bail!("No jobs given. Use --job SOURCE:DEST or --config FILE");
    }
    Ok(jobs)
}

fn exit_code_for(err: &EngineError) -> i32 {
    match err {
        EngineError::SourceNotFound { .. } | EngineError::SourceAccessDenied { .. } => {
            EXIT_SOURCE_MISSING
        }
        EngineError::DestUnwritable { .. } => EXIT_DEST_UNWRITABLE,
        _ => EXIT_JOB_FAILED,
    }
}

/// Parse and validate command-line arguments, then run the jobs
fn main() {
    let args = Args::parse();
    init_logging(args.verbose, args.quiet);

    let exit_code = match run_cli(&args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            EXIT_USAGE
        }
    };

    std::process::exit(exit_code);
}

/// Main CLI logic - separated for testability.
///
/// `Err` means the command line or config was unusable and nothing ran.
/// Otherwise the exit code reflects the first job that failed fatally; per-entry
/// failures inside a job leave it at 0.
fn run_cli(args: &Args) -> anyhow::Result<i32> {
    let jobs = collect_jobs(args)?;
    tracing::info!(jobs = jobs.len(), strict = args.strict, "running jobs");
    let progress = CliProgress::new(args.verbose, args.quiet);

    let results = run_jobs(&jobs, Some(&progress), args.strict);

    let mut exit_code = 0;
    for (job, result) in jobs.iter().zip(&results) {
        if let Err(e) = result {
            eprintln!("Error: job '{}' failed: {}", job.label(), e.detailed_message());
            if exit_code == 0 {
                exit_code = exit_code_for(e);
            }
        }
    }

    if results.len() < jobs.len() {
        eprintln!(
            "Stopped after a failed job; {} job(s) not run",
            jobs.len() - results.len()
        );
    }

    Ok(exit_code)
}
