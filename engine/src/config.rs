//! TOML job list loading.
//!
//! ```toml
//! [[job]]
//! name = "utils"
//! source = "../pysmartnode/pysmartnode/utils"
//! dest = "firmware/modules/pysmartnode/utils"
//! include = ["*.py"]
//! delete = true
//! prune_empty_dirs = true
//! compare = "checksum"
//! checksum = "blake3"
//! ```
//!
//! Relative paths resolve against the directory holding the config file.

use std::fs;
use std::path::{Path, PathBuf};
use serde::Deserialize;
use crate::checksums::ChecksumAlgorithm;
use crate::error::EngineError;
use crate::model::{CompareMode, SyncJob};

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default, rename = "job")]
    jobs: Vec<JobConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct JobConfig {
    name: Option<String>,
    source: PathBuf,
    dest: PathBuf,
    #[serde(default)]
    include: Vec<String>,
    #[serde(default)]
    exclude: Vec<String>,
    #[serde(default)]
    delete: bool,
    #[serde(default)]
    prune_empty_dirs: bool,
    #[serde(default)]
    compare: CompareKind,
    checksum: Option<String>,
    #[serde(default)]
    dry_run: bool,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum CompareKind {
    #[default]
    SizeMtime,
    Checksum,
}

impl JobConfig {
    fn into_job(self, base_dir: &Path, config_path: &Path) -> Result<SyncJob, EngineError> {
        let algorithm = match &self.checksum {
            Some(name) => Some(ChecksumAlgorithm::parse(name).ok_or_else(|| EngineError::Config {
                path: config_path.to_path_buf(),
                message: format!(
                    "unknown checksum algorithm '{}' (expected md5, sha256 or blake3)",
                    name
                ),
            })?),
            None => None,
        };

        let compare = match self.compare {
            CompareKind::SizeMtime => CompareMode::SizeAndMtime,
            CompareKind::Checksum => {
                CompareMode::Checksum(algorithm.unwrap_or(ChecksumAlgorithm::Blake3))
            }
        };

        let job = SyncJob::new(base_dir.join(&self.source), base_dir.join(&self.dest))
            .include(self.include)
            .exclude(self.exclude)
            .delete_extraneous(self.delete)
            .prune_empty_dirs(self.prune_empty_dirs)
            .compare(compare)
            .dry_run(self.dry_run);
        Ok(match self.name {
            Some(name) => job.with_name(name),
            None => job,
        })
    }
}

/// Parse a job list. `config_path` is only used for error messages.
pub fn parse_config(
    text: &str,
    base_dir: &Path,
    config_path: &Path,
) -> Result<Vec<SyncJob>, EngineError> {
    let file: ConfigFile = toml::from_str(text).map_err(|e| EngineError::Config {
        path: config_path.to_path_buf(),
        message: e.to_string(),
    })?;

    file.jobs
        .into_iter()
        .map(|job| job.into_job(base_dir, config_path))
        .collect()
}

/// Read and parse a job list from disk, in file order.
pub fn load_config(path: &Path) -> Result<Vec<SyncJob>, EngineError> {
    let text = fs::read_to_string(path).map_err(|e| EngineError::Config {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new(""));
    parse_config(&text, base_dir, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
[[job]]
name = "utils"
source = "src/utils"
dest = "fw/utils"
include = ["*.py"]
delete = true
prune_empty_dirs = true

[[job]]
source = "/abs/components"
dest = "fw/components"
exclude = ["__pycache__/"]
compare = "checksum"
checksum = "sha256"
"#;

    #[test]
    fn test_parse_config_keeps_job_order() {
        let jobs = parse_config(SAMPLE, Path::new("/base"), Path::new("/base/mirror.toml"))
            .expect("Failed to parse config");
        assert_eq!(jobs.len(), 2);

        assert_eq!(jobs[0].name.as_deref(), Some("utils"));
        assert_eq!(jobs[0].source_path, Path::new("/base/src/utils"));
        assert_eq!(jobs[0].dest_path, Path::new("/base/fw/utils"));
        assert_eq!(jobs[0].include_patterns, vec!["*.py".to_string()]);
        assert!(jobs[0].delete_extraneous);
        assert!(jobs[0].prune_empty_dirs);
        assert_eq!(jobs[0].compare, CompareMode::SizeAndMtime);

        assert_eq!(jobs[1].name, None);
        assert_eq!(jobs[1].source_path, Path::new("/abs/components"));
        assert!(!jobs[1].delete_extraneous);
        assert_eq!(jobs[1].compare, CompareMode::Checksum(ChecksumAlgorithm::Sha256));
    }

    #[test]
    fn test_checksum_defaults_to_blake3() {
        let text = "[[job]]\nsource = \"a\"\ndest = \"b\"\ncompare = \"checksum\"\n";
        let jobs = parse_config(text, Path::new(""), Path::new("m.toml")).expect("Failed to parse");
        assert_eq!(jobs[0].compare, CompareMode::Checksum(ChecksumAlgorithm::Blake3));
    }

    #[test]
    fn test_unknown_field_is_rejected() {
        let text = "[[job]]\nsource = \"a\"\ndest = \"b\"\nrecursive = true\n";
        let result = parse_config(text, Path::new(""), Path::new("m.toml"));
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn test_unknown_checksum_is_rejected() {
        let text = "[[job]]\nsource = \"a\"\ndest = \"b\"\nchecksum = \"crc32\"\n";
        let result = parse_config(text, Path::new(""), Path::new("m.toml"));
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }

    #[test]
    fn test_load_config_resolves_relative_to_file() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let path = temp_dir.path().join("mirror.toml");
        fs::write(&path, "[[job]]\nsource = \"a\"\ndest = \"b\"\n").expect("Failed to write config");

        let jobs = load_config(&path).expect("Failed to load config");
        assert_eq!(jobs[0].source_path, temp_dir.path().join("a"));
    }

    #[test]
    fn test_load_missing_config() {
        let result = load_config(Path::new("/nonexistent/mirror.toml"));
        assert!(matches!(result, Err(EngineError::Config { .. })));
    }
}
