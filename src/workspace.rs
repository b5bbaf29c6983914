use std::path::{Path, PathBuf};

use log::{debug, info};
use tempfile::TempDir;
use thiserror::Error;

use crate::{flock::FileLock, model::manifest::PATCHES_DIR};

const LOCK_FILE: &str = ".rigup.lock";
const STAGING_PREFIX: &str = ".staging-";

/// The rigup root for the duration of one run.
///
/// Holds the run lock and a staging directory for in-flight downloads. Both
/// are released when the workspace is dropped, whichever way the run ends.
pub struct Workspace {
    root: PathBuf,
    staging: TempDir,
    _lock: FileLock,
}

#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Root location {location} is not a directory")]
    BadLocation { location: String },
    #[error("Workspace lock cannot be acquired: {0}")]
    Lock(#[from] crate::flock::Error),
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl Workspace {
    pub fn open(root: PathBuf) -> Result<Workspace, WorkspaceError> {
        if root.exists() {
            if !root.is_dir() {
                return Err(WorkspaceError::BadLocation {
                    location: root.to_str().unwrap_or("").to_string(),
                });
            }
        } else {
            std::fs::create_dir_all(&root)?;
        }

        let lock = Self::acquire_lock(&root)?;
        // Inside the root so finished downloads can be renamed into the cache.
        let staging = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(&root)?;
        debug!("Staging directory {}", staging.path().display());

        Ok(Workspace {
            root,
            staging,
            _lock: lock,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging(&self) -> &Path {
        self.staging.path()
    }

    pub fn patches_dir(&self) -> PathBuf {
        self.root.join(PATCHES_DIR)
    }

    fn acquire_lock(root: &Path) -> Result<FileLock, WorkspaceError> {
        let location = root.join(LOCK_FILE);
        debug!("Acquiring a lock on {}", location.display());
        let lock = FileLock::new(&location)?;
        info!("Acquired a lock on the rigup root {}", root.display());
        Ok(lock)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_creates_root_and_refuses_second_run() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("rigup");

        let workspace = Workspace::open(root.clone()).unwrap();
        assert!(root.is_dir());
        assert!(workspace.staging().starts_with(&root));
        assert_eq!(workspace.patches_dir(), root.join("patches"));

        assert!(matches!(
            Workspace::open(root.clone()),
            Err(WorkspaceError::Lock(crate::flock::Error::Contended(_)))
        ));
    }

    #[test]
    fn staging_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = Workspace::open(dir.path().to_path_buf()).unwrap();
        let staging = workspace.staging().to_path_buf();
        std::fs::write(staging.join("partial.diff"), "half a patch").unwrap();

        drop(workspace);
        assert!(!staging.exists());
    }

    #[test]
    fn root_must_be_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        std::fs::write(&file, "").unwrap();
        assert!(matches!(
            Workspace::open(file),
            Err(WorkspaceError::BadLocation { .. })
        ));
    }
}
