use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum WorkspaceError {
    #[error("failed to create the temporary directory under {path}: {source}")]
    Create { path: PathBuf, source: io::Error },
    #[error("failed to remove the temporary directory {path}: {source}")]
    Remove { path: PathBuf, source: io::Error },
}

/// Scratch directory owned by a single pipeline run.
///
/// Nothing is created on disk until [`TempWorkspace::path`] is first called,
/// so operations that never need scratch space leave no trace. The directory
/// name carries a random suffix, which keeps two runs sharing an output
/// directory from ever writing into the same workspace.
///
/// [`TempWorkspace::close`] removes the directory on the success path and
/// reports failures. If the workspace is dropped without being closed (an
/// error propagated out of the run), the directory is still removed and any
/// failure to do so is logged.
#[derive(Debug)]
pub struct TempWorkspace {
    parent: PathBuf,
    prefix: String,
    dir: Option<TempDir>,
}

impl TempWorkspace {
    pub fn new<P: AsRef<Path>>(parent: P, prefix: &str) -> Self {
        Self {
            parent: parent.as_ref().to_path_buf(),
            prefix: prefix.to_string(),
            dir: None,
        }
    }

    /// Returns the workspace directory, creating it on first use.
    pub fn path(&mut self) -> Result<&Path, WorkspaceError> {
        let dir = match self.dir.take() {
            Some(d) => d,
            None => {
                fs::create_dir_all(&self.parent).map_err(|source| WorkspaceError::Create {
                    path: self.parent.clone(),
                    source,
                })?;
                let d = tempfile::Builder::new()
                    .prefix(&format!("{}.", self.prefix))
                    .tempdir_in(&self.parent)
                    .map_err(|source| WorkspaceError::Create {
                        path: self.parent.clone(),
                        source,
                    })?;
                info!("created temporary directory {}", d.path().display());
                d
            }
        };
        Ok(self.dir.insert(dir).path())
    }

    pub fn is_created(&self) -> bool {
        self.dir.is_some()
    }

    /// Removes the workspace if it was ever created.
    pub fn close(mut self) -> Result<(), WorkspaceError> {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            dir.close().map_err(|source| WorkspaceError::Remove {
                path: path.clone(),
                source,
            })?;
            info!("removed temporary directory {}", path.display());
        }
        Ok(())
    }
}

impl Drop for TempWorkspace {
    fn drop(&mut self) {
        if let Some(dir) = self.dir.take() {
            let path = dir.path().to_path_buf();
            match dir.close() {
                Ok(()) => debug!(
                    "removed temporary directory {} after an early exit",
                    path.display()
                ),
                Err(e) => warn!(
                    "could not remove temporary directory {}: {}; please remove it manually",
                    path.display(),
                    e
                ),
            }
        }
    }
}
