//! Sandbox configuration.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default per-run deadline.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on captured bytes per output stream (1 MiB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1024 * 1024;

/// Resource bounds and placement for sandboxed runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[non_exhaustive]
pub struct SandboxConfig {
    /// Container image holding the language toolchain.
    pub image: String,

    /// Memory ceiling in mebibytes.
    pub memory_mib: u32,

    /// CPU quota, in cores.
    pub cpus: f32,

    /// Maximum number of processes inside the sandbox.
    pub pids_limit: u32,

    /// Run with networking disabled.
    pub network_disabled: bool,

    /// Parent directory for per-run scratch directories. `None` uses the
    /// system temporary directory.
    pub scratch_root: Option<PathBuf>,

    /// Bytes captured per stream before output is discarded.
    pub max_output_bytes: usize,

    /// Deadline applied when the caller does not supply one.
    pub default_timeout: Duration,

    /// Runs allowed to execute at the same time.
    pub max_concurrent_runs: usize,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            image: "golang:1.22-alpine".to_owned(),
            memory_mib: 256,
            cpus: 1.0,
            pids_limit: 128,
            network_disabled: true,
            scratch_root: None,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            default_timeout: DEFAULT_TIMEOUT,
            max_concurrent_runs: 4,
        }
    }
}

/// Which runtime backend executes submissions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Disposable Docker container per run.
    #[default]
    Docker,
    /// Plain host subprocess. Development only: provides no isolation.
    Process,
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "docker" => Ok(Self::Docker),
            "process" => Ok(Self::Process),
            other => Err(format!("unknown sandbox backend '{other}' (expected docker or process)")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_case_insensitively() {
        assert_eq!("Docker".parse::<BackendKind>(), Ok(BackendKind::Docker));
        assert_eq!(" process ".parse::<BackendKind>(), Ok(BackendKind::Process));
        assert!("podman".parse::<BackendKind>().is_err());
    }

    #[test]
    fn default_config_disables_network() {
        let config = SandboxConfig::default();
        assert!(config.network_disabled);
        assert_eq!(config.default_timeout, DEFAULT_TIMEOUT);
        assert!(config.max_concurrent_runs > 0);
    }
}
