//! Fingerprint cache.
//!
//! Artifacts are stored one file per request fingerprint
//! (`<cache_dir>/<fingerprint>.tf`). Entries never expire; an identical
//! request is served from disk without contacting the completion service.
//!
//! Writes go through a temporary file in the cache directory that is
//! renamed into place, so concurrent runs against the same fingerprint
//! resolve to last-writer-wins and readers never observe a partial file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Number of hex characters kept from the SHA-256 digest.
pub const FINGERPRINT_LEN: usize = 16;

/// Short, deterministic digest of a request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// SHA-256 over the raw request bytes, truncated to [`FINGERPRINT_LEN`].
pub fn compute_fingerprint(request: &str) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(request.as_bytes());
    let mut digest = hex::encode(hasher.finalize());
    digest.truncate(FINGERPRINT_LEN);
    Fingerprint(digest)
}

/// On-disk artifact store keyed by [`Fingerprint`].
#[derive(Debug, Clone)]
pub struct FingerprintCache {
    dir: PathBuf,
}

impl FingerprintCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, fingerprint: &Fingerprint) -> PathBuf {
        self.dir.join(format!("{}.tf", fingerprint))
    }

    /// Return the cached artifact, or `None` on a miss.
    pub fn lookup(&self, fingerprint: &Fingerprint) -> Result<Option<String>> {
        let path = self.entry_path(fingerprint);
        match std::fs::read_to_string(&path) {
            Ok(artifact) => Ok(Some(artifact)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to read cache entry: {}", path.display()))
            }
        }
    }

    /// Store `artifact` under `fingerprint`, creating the directory if needed.
    pub fn store(&self, fingerprint: &Fingerprint, artifact: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache directory: {}", self.dir.display()))?;

        let path = self.entry_path(fingerprint);
        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir).with_context(|| {
            format!("Failed to create temporary file in {}", self.dir.display())
        })?;
        tmp.write_all(artifact.as_bytes())
            .with_context(|| format!("Failed to write cache entry: {}", path.display()))?;
        tmp.persist(&path)
            .with_context(|| format!("Failed to write cache entry: {}", path.display()))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_fingerprint_deterministic() {
        let a = compute_fingerprint("Create a t2.micro instance");
        let b = compute_fingerprint("Create a t2.micro instance");
        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), FINGERPRINT_LEN);
        assert!(a.as_str().chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_fingerprint_known_value() {
        // sha256("") = e3b0c44298fc1c149afbf4c8996fb924...
        assert_eq!(compute_fingerprint("").as_str(), "e3b0c44298fc1c14");
    }

    #[test]
    fn test_fingerprint_is_case_sensitive() {
        assert_ne!(
            compute_fingerprint("create a vpc"),
            compute_fingerprint("Create a VPC")
        );
    }

    #[test]
    fn test_lookup_miss() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path().join("cache"));
        let fp = compute_fingerprint("nothing here");
        assert!(cache.lookup(&fp).unwrap().is_none());
    }

    #[test]
    fn test_store_then_lookup() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path().join("nested").join("cache"));
        let fp = compute_fingerprint("Create a VPC");
        let artifact = "resource \"aws_vpc\" \"main\" {\n}\n";

        let path = cache.store(&fp, artifact).unwrap();
        assert_eq!(path, cache.entry_path(&fp));
        assert!(path.ends_with(format!("{}.tf", fp)));
        assert_eq!(cache.lookup(&fp).unwrap().as_deref(), Some(artifact));
    }

    #[test]
    fn test_store_overwrites() {
        let tmp = TempDir::new().unwrap();
        let cache = FingerprintCache::new(tmp.path());
        let fp = compute_fingerprint("x");
        cache.store(&fp, "first").unwrap();
        cache.store(&fp, "second").unwrap();
        assert_eq!(cache.lookup(&fp).unwrap().as_deref(), Some("second"));

        let entries = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(entries, 1, "temporary files must not be left behind");
    }
}
