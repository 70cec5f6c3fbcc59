//! Per-run scratch directories.

use std::fs::Permissions;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use tempfile::TempDir;

use crate::ExecutorError;

/// An exclusively owned working directory, removed when dropped.
///
/// Dropping covers every exit path, including a cancelled run future.
/// [`ScratchDir::close`] removes it early and reports failures.
#[derive(Debug)]
pub struct ScratchDir {
    dir: TempDir,
}

impl ScratchDir {
    /// Create a fresh directory under `root`, or the system temp dir.
    ///
    /// The directory is world-readable so a sandbox running under a
    /// different uid can read the source.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ScratchUnavailable`] if it cannot be created.
    pub fn create(root: Option<&Path>) -> Result<Self, ExecutorError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("tutor-run-").permissions(Permissions::from_mode(0o755));
        let dir = match root {
            Some(root) => builder.tempdir_in(root),
            None => builder.tempdir(),
        }
        .map_err(ExecutorError::ScratchUnavailable)?;
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Write `contents` to `file_name` inside the directory.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ScratchUnavailable`] if the write fails.
    pub async fn write_source(&self, file_name: &str, contents: &str) -> Result<(), ExecutorError> {
        tokio::fs::write(self.dir.path().join(file_name), contents)
            .await
            .map_err(ExecutorError::ScratchUnavailable)
    }

    /// Remove the directory now.
    ///
    /// # Errors
    /// Returns the I/O error if removal fails.
    pub fn close(self) -> std::io::Result<()> {
        self.dir.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn drop_removes_directory() {
        let scratch = match ScratchDir::create(None) {
            Ok(s) => s,
            Err(e) => panic!("create failed: {e}"),
        };
        let path = scratch.path().to_owned();
        if let Err(e) = scratch.write_source("main.go", "package main").await {
            panic!("write failed: {e}");
        }
        assert!(path.join("main.go").exists());
        let mode = std::fs::metadata(&path).map(|m| m.permissions().mode() & 0o777).ok();
        assert_eq!(mode, Some(0o755));
        drop(scratch);
        assert!(!path.exists(), "scratch dir must be removed on drop");
    }

    #[test]
    fn missing_root_is_scratch_unavailable() {
        let result = ScratchDir::create(Some(Path::new("/nonexistent/tutor-scratch")));
        assert!(matches!(result, Err(ExecutorError::ScratchUnavailable(_))));
    }
}
