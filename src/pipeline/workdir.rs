//! Per-run scratch directory.

use std::path::{Path, PathBuf};

use tempfile::TempDir;

use crate::error::PipelineError;

/// Directory holding every artifact of one run.
///
/// Removed when dropped unless [`WorkDir::preserve`] or a kept
/// [`WorkDir::close`] took it over.
#[derive(Debug)]
pub struct WorkDir {
    dir: Option<TempDir>,
    path: PathBuf,
    keep: bool,
}

impl WorkDir {
    /// Create `<root>/<song>-XXXXXX`, or a directory under the system temp
    /// dir when `root` is `None`.
    pub fn create(root: Option<&Path>, song: &str, keep: bool) -> Result<Self, PipelineError> {
        let prefix = format!("{song}-");
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);
        let dir = match root {
            Some(root) => {
                std::fs::create_dir_all(root)?;
                builder.tempdir_in(root)?
            }
            None => builder.tempdir()?,
        };
        let path = dir.path().canonicalize()?;
        log::debug!("Working directory: {}", path.display());
        Ok(Self {
            dir: Some(dir),
            path,
            keep,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.path.join(name)
    }

    /// Leave the directory on disk and return its path.
    pub fn preserve(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            let _ = dir.keep();
        }
        self.path.clone()
    }

    /// End of a successful run: remove the directory, or keep it when
    /// configured to. Returns the path if it was kept.
    pub fn close(mut self) -> Result<Option<PathBuf>, PipelineError> {
        if self.keep {
            let path = self.preserve();
            log::info!("Keeping working directory {}", path.display());
            return Ok(Some(path));
        }
        if let Some(dir) = self.dir.take() {
            dir.close()?;
        }
        Ok(None)
    }
}
