//! Artifact persistence for fitted models and preprocessors.

use pd_registry::ArtifactRef;
use pd_types::ArtifactError;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::debug;

/// Stores artifact bytes under a logical path and returns a reference that
/// can be attached to a run.
pub trait ArtifactStore: Send + Sync {
    fn put(&self, bytes: &[u8], logical_path: &str) -> Result<ArtifactRef, ArtifactError>;
}

/// Writes artifacts below a root directory.
#[derive(Debug, Clone)]
pub struct FileArtifactStore {
    root: PathBuf,
}

impl FileArtifactStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, logical_path: &str) -> Result<PathBuf, ArtifactError> {
        let relative = Path::new(logical_path);
        let is_plain = !logical_path.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !is_plain {
            return Err(ArtifactError::InvalidPath {
                path: logical_path.to_string(),
            });
        }
        Ok(self.root.join(relative))
    }
}

impl ArtifactStore for FileArtifactStore {
    fn put(&self, bytes: &[u8], logical_path: &str) -> Result<ArtifactRef, ArtifactError> {
        let target = self.resolve(logical_path)?;
        let write_err = |source: std::io::Error| ArtifactError::Write {
            path: target.display().to_string(),
            source,
        };

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        fs::write(&target, bytes).map_err(write_err)?;

        debug!(path = %target.display(), bytes = bytes.len(), "stored artifact");
        Ok(ArtifactRef {
            logical_path: logical_path.to_string(),
            uri: target.display().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn writes_under_root() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        let artifact = store.put(b"{}", "run-1/model/model.json").unwrap();

        assert_eq!(artifact.logical_path, "run-1/model/model.json");
        let on_disk = dir.path().join("run-1/model/model.json");
        assert_eq!(fs::read(&on_disk).unwrap(), b"{}");
        assert_eq!(artifact.uri, on_disk.display().to_string());
    }

    #[test]
    fn rejects_paths_escaping_root() {
        let dir = TempDir::new().unwrap();
        let store = FileArtifactStore::new(dir.path());
        for bad in ["", "/etc/passwd", "../outside.json", "a/../../b", "./model.json"] {
            assert!(
                matches!(store.put(b"x", bad), Err(ArtifactError::InvalidPath { .. })),
                "{bad:?} should be rejected"
            );
        }
    }
}
