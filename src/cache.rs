//! Conversion cache.
//!
//! Transcoding is the only expensive step of a request. This module lets the
//! responder skip it when the same stored file has already been converted to
//! the same target. Correctness never depends on the cache: a miss, a
//! corrupted entry or an unwritable cache directory all degrade to converting
//! again.
//!
//! # Design
//!
//! ## Cache keys
//!
//! A key is the SHA-256 of the file's identity plus the target:
//!
//! - canonical path
//! - modification time (nanoseconds since the epoch, or absent)
//! - length in bytes
//! - target format tag
//!
//! Touching or rewriting the source changes its mtime or size, so stale
//! conversions are never served. Unlike a content hash this needs no extra
//! read of the file before a lookup.
//!
//! ## Entries
//!
//! Each key is one file named by the hex key inside the cache directory:
//!
//! - non-empty file → the converted bytes
//! - empty file → a recorded codec failure; the conversion is not retried
//!   and the original is served as a fallback
//!
//! Passthrough outcomes are never stored.
//!
//! ## Concurrency
//!
//! Entries are written to a uniquely named temp file and renamed into place,
//! so concurrent requests for the same key never observe a partial entry. The
//! last writer wins, and both writers produce the same bytes.

use crate::imaging::{ConversionOutcome, Disposition};
use crate::negotiate::TargetFormat;
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Name of the default cache directory under the system temp dir.
pub const DEFAULT_CACHE_DIRNAME: &str = "webp-relay";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cannot create cache directory {}: {source}", dir.display())]
    Open { dir: PathBuf, source: io::Error },
    #[error("cannot write cache entry {key}: {source}")]
    Write { key: String, source: io::Error },
}

/// A cache hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedConversion {
    Converted(Vec<u8>),
    Failed,
}

/// On-disk conversion cache.
#[derive(Debug)]
pub struct ConversionCache {
    dir: PathBuf,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ConversionCache {
    /// Open (and create if needed) a cache directory.
    pub fn open(dir: &Path) -> Result<Self, CacheError> {
        std::fs::create_dir_all(dir).map_err(|source| CacheError::Open {
            dir: dir.to_path_buf(),
            source,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Look up a key, counting the hit or miss.
    pub fn lookup(&self, key: &str) -> Option<CachedConversion> {
        let found = match std::fs::read(self.dir.join(key)) {
            Ok(bytes) if bytes.is_empty() => Some(CachedConversion::Failed),
            Ok(bytes) => Some(CachedConversion::Converted(bytes)),
            Err(_) => None,
        };
        let counter = if found.is_some() {
            &self.hits
        } else {
            &self.misses
        };
        counter.fetch_add(1, Ordering::Relaxed);
        found
    }

    /// Record the outcome of a conversion attempt.
    pub fn store(&self, key: &str, outcome: &ConversionOutcome) -> Result<(), CacheError> {
        let contents: &[u8] = match outcome.disposition {
            Disposition::Converted => &outcome.bytes,
            Disposition::Fallback(_) => &[],
            Disposition::Passthrough => return Ok(()),
        };

        let temp = self.dir.join(format!(
            ".{key}.{}.{}.tmp",
            std::process::id(),
            TEMP_COUNTER.fetch_add(1, Ordering::Relaxed)
        ));
        let written = std::fs::write(&temp, contents)
            .and_then(|()| std::fs::rename(&temp, self.dir.join(key)));
        written.map_err(|source| {
            let _ = std::fs::remove_file(&temp);
            CacheError::Write {
                key: key.to_string(),
                source,
            }
        })
    }

    /// Drop an entry, e.g. one whose contents failed verification.
    pub fn evict(&self, key: &str) {
        let _ = std::fs::remove_file(self.dir.join(key));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
        }
    }
}

/// SHA-256 cache key for converting a stored file to `target`.
pub fn cache_key(
    canonical_path: &Path,
    modified: Option<SystemTime>,
    len: u64,
    target: TargetFormat,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(canonical_path.as_os_str().as_encoded_bytes());
    hasher.update(b"\0");
    match modified.and_then(|t| t.duration_since(UNIX_EPOCH).ok()) {
        Some(since) => {
            hasher.update(b"\x01");
            hasher.update(since.as_nanos().to_le_bytes());
        }
        None => {
            hasher.update(b"\x00");
        }
    }
    hasher.update(len.to_le_bytes());
    hasher.update(target.as_str().as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Summary of cache performance.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn total(&self) -> u64 {
        self.hits + self.misses
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.hits > 0 {
            write!(
                f,
                "{} cached, {} converted ({} total)",
                self.hits,
                self.misses,
                self.total()
            )
        } else {
            write!(f, "{} converted", self.misses)
        }
    }
}
