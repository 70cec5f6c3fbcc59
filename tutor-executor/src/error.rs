//! Error types for the executor crate.
//!
//! Only sandbox infrastructure failures live here. Learner code that fails
//! to compile, crashes or overruns its deadline still yields a successful
//! [`RunOutput`](crate::RunOutput).

use std::path::PathBuf;

/// Errors that can occur while provisioning or driving a sandbox.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ExecutorError {
    /// The scratch directory could not be created or written.
    #[error("scratch space unavailable: {0}")]
    ScratchUnavailable(#[source] std::io::Error),

    /// Runtime binary not found at the configured path or in `PATH`.
    #[error("sandbox binary not found at {path}")]
    BinaryNotFound { path: PathBuf },

    /// The sandbox process could not be started.
    #[error("sandbox launch failed: {0}")]
    LaunchFailed(String),

    /// Underlying I/O error while supervising a run.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
