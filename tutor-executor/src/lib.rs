//! Execution sandbox for untrusted learner code.
//!
//! Provisions a scratch directory per run, launches an isolated runtime
//! (Docker, or a plain subprocess for development), captures its output
//! under a deadline and always cleans up.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod backend;
pub mod config;
pub mod docker;
pub mod error;
pub mod orchestrator;
pub mod process;
pub mod runner;
pub mod scratch;

pub use backend::SandboxBackend;
pub use config::{BackendKind, SandboxConfig, DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_TIMEOUT};
pub use docker::DockerBackend;
pub use error::ExecutorError;
pub use orchestrator::SandboxOrchestrator;
pub use process::ProcessBackend;
pub use runner::{RunOutput, SandboxRunner};
pub use scratch::ScratchDir;
