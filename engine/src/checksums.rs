//! Checksum computation for content-based comparison.
//!
//! This module provides:
//! - Multiple checksum algorithms (MD5, SHA-256, BLAKE3)
//! - File-level checksum computation
//! - Source/destination content comparison used by `CompareMode::Checksum`

use crate::error::EngineError;
use std::fmt;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChecksumAlgorithm {
    /// MD5 (deprecated, but included for compatibility)
    Md5,
    /// SHA-256 (cryptographic, 256-bit)
    Sha256,
    /// BLAKE3 (modern, fast, 256-bit)
    Blake3,
}

impl fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Md5 => write!(f, "md5"),
            Self::Sha256 => write!(f, "sha256"),
            Self::Blake3 => write!(f, "blake3"),
        }
    }
}

impl ChecksumAlgorithm {
    /// Parse algorithm from string
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "md5" => Some(Self::Md5),
            "sha256" => Some(Self::Sha256),
            "blake3" => Some(Self::Blake3),
            _ => None,
        }
    }
}

/// A computed checksum value
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChecksumValue {
    algorithm: ChecksumAlgorithm,
    hex: String,
}

impl ChecksumValue {
    pub fn new(algorithm: ChecksumAlgorithm, hex: String) -> Self {
        ChecksumValue { algorithm, hex }
    }
}

impl fmt::Display for ChecksumValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.algorithm, self.hex)
    }
}

/// Trait for computing checksums incrementally
pub trait ChecksumHasher {
    fn update(&mut self, data: &[u8]);

    fn finalize(self: Box<Self>) -> ChecksumValue;
}

struct Md5Hasher {
    context: md5::Context,
}

impl ChecksumHasher for Md5Hasher {
    fn update(&mut self, data: &[u8]) {
        self.context.consume(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.context.compute();
        ChecksumValue::new(ChecksumAlgorithm::Md5, format!("{:x}", digest))
    }
}

struct Sha256Hasher {
    hasher: sha2::Sha256,
}

impl ChecksumHasher for Sha256Hasher {
    fn update(&mut self, data: &[u8]) {
        use sha2::Digest;
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        use sha2::Digest;
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Sha256, format!("{:x}", digest))
    }
}

struct Blake3Hasher {
    hasher: blake3::Hasher,
}

impl ChecksumHasher for Blake3Hasher {
    fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
    }

    fn finalize(self: Box<Self>) -> ChecksumValue {
        let digest = self.hasher.finalize();
        ChecksumValue::new(ChecksumAlgorithm::Blake3, digest.to_hex().to_string())
    }
}

/// Create a new hasher for the given algorithm
pub fn create_hasher(algorithm: ChecksumAlgorithm) -> Box<dyn ChecksumHasher> {
    match algorithm {
        ChecksumAlgorithm::Md5 => Box::new(Md5Hasher {
            context: md5::Context::new(),
        }),
        ChecksumAlgorithm::Sha256 => Box::new(Sha256Hasher {
            hasher: sha2::Sha256::default(),
        }),
        ChecksumAlgorithm::Blake3 => Box::new(Blake3Hasher {
            hasher: blake3::Hasher::new(),
        }),
    }
}

fn hash_reader<R: Read>(mut reader: R, algorithm: ChecksumAlgorithm) -> io::Result<ChecksumValue> {
    let mut hasher = create_hasher(algorithm);
    let mut buffer = [0u8; 65536];
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => hasher.update(&buffer[..n]),
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(hasher.finalize())
}

/// Compute checksum for a file
pub fn compute_file_checksum(
    path: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<ChecksumValue, EngineError> {
    File::open(path)
        .and_then(|file| hash_reader(file, algorithm))
        .map_err(|e| EngineError::TransferFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

/// True when both files hash to the same value.
pub fn files_match(
    source: &Path,
    dest: &Path,
    algorithm: ChecksumAlgorithm,
) -> Result<bool, EngineError> {
    let source_checksum = compute_file_checksum(source, algorithm)?;
    let dest_checksum = compute_file_checksum(dest, algorithm)?;
    Ok(source_checksum == dest_checksum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn checksum_of(data: &[u8], algorithm: ChecksumAlgorithm) -> ChecksumValue {
        hash_reader(data, algorithm).expect("Failed to hash")
    }

    #[test]
    fn test_algorithm_display() {
        assert_eq!(ChecksumAlgorithm::Md5.to_string(), "md5");
        assert_eq!(ChecksumAlgorithm::Sha256.to_string(), "sha256");
        assert_eq!(ChecksumAlgorithm::Blake3.to_string(), "blake3");
    }

    #[test]
    fn test_algorithm_parse() {
        assert_eq!(ChecksumAlgorithm::parse("md5"), Some(ChecksumAlgorithm::Md5));
        assert_eq!(ChecksumAlgorithm::parse("SHA256"), Some(ChecksumAlgorithm::Sha256));
        assert_eq!(ChecksumAlgorithm::parse("blake3"), Some(ChecksumAlgorithm::Blake3));
        assert_eq!(ChecksumAlgorithm::parse("crc32"), None);
    }

    #[test]
    fn test_md5_hasher() {
        let checksum = checksum_of(b"hello", ChecksumAlgorithm::Md5);
        assert_eq!(checksum.to_string(), "md5:5d41402abc4b2a76b9719d911017c592");
    }

    #[test]
    fn test_sha256_hasher() {
        let checksum = checksum_of(b"hello", ChecksumAlgorithm::Sha256);
        assert_eq!(
            checksum.to_string(),
            "sha256:2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
        );
    }

    #[test]
    fn test_blake3_hasher_is_deterministic() {
        let a = checksum_of(b"hello", ChecksumAlgorithm::Blake3);
        let b = checksum_of(b"hello", ChecksumAlgorithm::Blake3);
        assert_eq!(a, b);
        assert_eq!(a.to_string().len(), "blake3:".len() + 64);
        assert_ne!(a, checksum_of(b"hellp", ChecksumAlgorithm::Blake3));
    }

    #[test]
    fn test_checksum_value_display() {
        let cs = ChecksumValue::new(ChecksumAlgorithm::Sha256, "abc123".to_string());
        assert_eq!(cs.to_string(), "sha256:abc123");
    }

    #[test]
    fn test_files_match() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let a = temp_dir.path().join("a.py");
        let b = temp_dir.path().join("b.py");
        let c = temp_dir.path().join("c.py");
        std::fs::write(&a, "print(1)").expect("Failed to write a");
        std::fs::write(&b, "print(1)").expect("Failed to write b");
        std::fs::write(&c, "print(2)").expect("Failed to write c");

        assert!(files_match(&a, &b, ChecksumAlgorithm::Blake3).expect("Failed to compare"));
        assert!(!files_match(&a, &c, ChecksumAlgorithm::Sha256).expect("Failed to compare"));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp dir");
        let result = compute_file_checksum(&temp_dir.path().join("missing"), ChecksumAlgorithm::Md5);
        assert!(matches!(result, Err(EngineError::TransferFailed { .. })));
    }
}
