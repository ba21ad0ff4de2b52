//! Stored resources.
//!
//! The responder reads images through the [`Storage`] trait. The production
//! implementation, [`DocumentRoot`], maps request paths onto a directory and
//! refuses anything that resolves outside it (`..` segments, symlinks pointing
//! elsewhere).
//!
//! Storage knows nothing about image formats: it hands back bytes plus the
//! file identity (canonical path, modification time, length) that the
//! conversion cache keys on.

use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use thiserror::Error;
use tracing::warn;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Outside document root: {0}")]
    Forbidden(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// A resource read from storage.
#[derive(Debug, Clone)]
pub struct StoredImage {
    pub bytes: Vec<u8>,
    pub canonical_path: PathBuf,
    pub modified: Option<SystemTime>,
    pub len: u64,
}

/// Read access to stored resources by request path.
pub trait Storage: Send + Sync {
    fn read(&self, request_path: &str) -> Result<StoredImage, StorageError>;
}

/// Files under a single directory.
#[derive(Debug, Clone)]
pub struct DocumentRoot {
    root: PathBuf,
}

impl DocumentRoot {
    /// Open `root`, which must exist. It is canonicalized once so that
    /// containment checks compare like with like.
    pub fn new(root: &Path) -> Result<Self, StorageError> {
        let root = root.canonicalize()?;
        Ok(Self { root })
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// Resolve a request path to a canonical file path inside the root.
    pub fn resolve(&self, request_path: &str) -> Result<PathBuf, StorageError> {
        let relative = request_path.trim_start_matches('/');
        if relative.is_empty() {
            return Err(StorageError::NotFound(request_path.to_string()));
        }

        // A path through a regular file, an over-long name or an embedded NUL
        // names nothing that exists. Only a permission failure is an I/O error.
        let resolved = match self.root.join(relative).canonicalize() {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::PermissionDenied => {
                return Err(StorageError::Io(e));
            }
            Err(_) => return Err(StorageError::NotFound(request_path.to_string())),
        };

        if !resolved.starts_with(&self.root) {
            return Err(StorageError::Forbidden(request_path.to_string()));
        }
        if !resolved.is_file() {
            return Err(StorageError::NotFound(request_path.to_string()));
        }
        Ok(resolved)
    }

    /// Request paths of every regular file under the root, sorted.
    ///
    /// Unreadable entries are logged and skipped. Symlinks are not followed,
    /// so the listing never leaves the root.
    pub fn request_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = WalkDir::new(&self.root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| {
                let relative = entry.path().strip_prefix(&self.root).ok()?;
                let segments: Vec<String> = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy().into_owned())
                    .collect();
                Some(format!("/{}", segments.join("/")))
            })
            .collect();
        paths.sort();
        paths
    }
}

impl Storage for DocumentRoot {
    fn read(&self, request_path: &str) -> Result<StoredImage, StorageError> {
        let canonical_path = self.resolve(request_path)?;
        let bytes = std::fs::read(&canonical_path)?;
        let metadata = std::fs::metadata(&canonical_path)?;
        Ok(StoredImage {
            len: bytes.len() as u64,
            modified: metadata.modified().ok(),
            bytes,
            canonical_path,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::*;

    #[test]
    fn reads_file_under_root() {
        let tmp = setup_document_root(&[("testing/a.jpg", b"0123456789abcdef".to_vec())]);
        let storage = DocumentRoot::new(tmp.path()).unwrap();

        let stored = storage.read("/testing/a.jpg").unwrap();
        assert_eq!(stored.bytes, b"0123456789abcdef");
        assert_eq!(stored.len, 16);
        assert!(stored.canonical_path.ends_with("testing/a.jpg"));
        assert!(stored.modified.is_some());
    }

    #[test]
    fn missing_file_is_not_found() {
        let tmp = setup_document_root(&[]);
        let storage = DocumentRoot::new(tmp.path()).unwrap();
        assert!(matches!(
            storage.read("/testing/notfound.jpg"),
            Err(StorageError::NotFound(_))
        ));
    }

    #[test]
    fn root_and_directories_are_not_found() {
        let tmp = setup_document_root(&[("dir/file.png", vec![0; 4])]);
        let storage = DocumentRoot::new(tmp.path()).unwrap();
        assert!(matches!(storage.read("/"), Err(StorageError::NotFound(_))));
        assert!(matches!(storage.read("/dir"), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn impossible_paths_are_not_found() {
        let tmp = setup_document_root(&[("testing/regular.jpg", b"0123456789abcdef".to_vec())]);
        let storage = DocumentRoot::new(tmp.path()).unwrap();
        let long_name = format!("/{}.jpg", "a".repeat(300));

        for path in [
            "/testing/regular.jpg/x.jpg",
            "/testing/regular.jpg/",
            long_name.as_str(),
            "/testing/nul\0.jpg",
        ] {
            assert!(
                matches!(storage.read(path), Err(StorageError::NotFound(_))),
                "{path:?} should be not found"
            );
        }
    }

    #[test]
    fn traversal_outside_root_is_forbidden() {
        let outer = tempfile::TempDir::new().unwrap();
        write_file(outer.path(), "secret.png", b"secret");
        write_file(outer.path(), "public/ok.png", b"ok");
        let storage = DocumentRoot::new(&outer.path().join("public")).unwrap();

        assert!(matches!(
            storage.read("/../secret.png"),
            Err(StorageError::Forbidden(_))
        ));
    }

    #[test]
    fn request_paths_lists_files_only() {
        let tmp = setup_document_root(&[
            ("b.png", vec![1]),
            ("a/nested.jpg", vec![2]),
            ("a/deeper/x.gif", vec![3]),
        ]);
        std::fs::create_dir_all(tmp.path().join("empty")).unwrap();
        let storage = DocumentRoot::new(tmp.path()).unwrap();

        assert_eq!(
            storage.request_paths(),
            vec!["/a/deeper/x.gif", "/a/nested.jpg", "/b.png"]
        );
    }

    #[test]
    fn listed_paths_resolve() {
        let tmp = setup_document_root(&[("dir/photo.jpg", vec![0; 8])]);
        let storage = DocumentRoot::new(tmp.path()).unwrap();
        for path in storage.request_paths() {
            assert!(storage.read(&path).is_ok(), "{path} should be readable");
        }
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        assert!(matches!(
            DocumentRoot::new(&tmp.path().join("nope")),
            Err(StorageError::Io(_))
        ));
    }
}
