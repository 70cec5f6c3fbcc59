//! Sandbox backend abstraction trait.
//!
//! Allows swapping between Docker, a plain subprocess, or another isolation
//! mechanism without changing the runner.

use std::fmt::Debug;
use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use crate::ExecutorError;

/// Isolated runtime that executes one source file inside a scratch directory.
///
/// Implementations must be `Send + Sync` to allow use across async tasks.
/// The runner owns stdio, process-group placement and the deadline; a
/// backend only describes *what* to launch.
#[async_trait]
pub trait SandboxBackend: Send + Sync + Debug {
    /// Short name reported by health checks.
    fn name(&self) -> &'static str;

    /// File name the submitted source is written to.
    fn source_file_name(&self) -> &str;

    /// Build the command that runs the source found in `scratch`.
    fn command(&self, scratch: &Path, run_id: Uuid) -> Command;

    /// Release anything that can outlive the launched process, such as a
    /// detached container. Called after a deadline kill. Must not fail.
    async fn reap(&self, _run_id: Uuid) {}

    /// Check that the backend is available and properly configured.
    ///
    /// # Errors
    /// Returns [`ExecutorError::BinaryNotFound`] if the runtime is missing.
    async fn health_check(&self) -> Result<(), ExecutorError>;
}

/// Verify a binary exists either at the given path or in `PATH`.
pub(crate) fn which_binary(path: &Path) -> Result<(), ExecutorError> {
    if path.is_absolute() {
        if path.exists() {
            return Ok(());
        }
        return Err(ExecutorError::BinaryNotFound { path: path.to_owned() });
    }

    let found = std::env::var("PATH")
        .unwrap_or_default()
        .split(':')
        .map(|dir| Path::new(dir).join(path))
        .any(|p| p.exists());

    if found {
        Ok(())
    } else {
        Err(ExecutorError::BinaryNotFound { path: path.to_owned() })
    }
}
