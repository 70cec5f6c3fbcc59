//! Docker sandbox backend.
//!
//! Each run gets a disposable container with no network, a read-only root
//! filesystem, resource limits, and the scratch directory mounted at `/work`.
//! The program never runs as root: it gets the gateway's own uid and gid, or
//! `nobody` when the gateway itself is root.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use nix::unistd::{getgid, getuid};
use tokio::process::Command;
use uuid::Uuid;

use crate::backend::{which_binary, SandboxBackend};
use crate::{ExecutorError, SandboxConfig};

/// Mount point of the scratch directory inside the container.
const WORKDIR: &str = "/work";

/// `nobody:nogroup` on common base images.
const NOBODY: &str = "65534:65534";

fn sandbox_user() -> String {
    let uid = getuid();
    if uid.is_root() {
        NOBODY.to_owned()
    } else {
        format!("{uid}:{}", getgid())
    }
}

/// Docker sandbox backend.
#[derive(Debug, Clone)]
pub struct DockerBackend {
    /// Path to the `docker` CLI.
    binary_path: PathBuf,
    image: String,
    memory_mib: u32,
    cpus: f32,
    pids_limit: u32,
    network_disabled: bool,
    /// `uid:gid` passed to `--user`.
    user: String,
}

impl DockerBackend {
    /// Create a backend driving the given `docker` binary.
    #[must_use]
    pub fn new(binary_path: PathBuf, config: &SandboxConfig) -> Self {
        Self {
            binary_path,
            image: config.image.clone(),
            memory_mib: config.memory_mib,
            cpus: config.cpus,
            pids_limit: config.pids_limit,
            network_disabled: config.network_disabled,
            user: sandbox_user(),
        }
    }

    /// Create a backend that looks for `docker` in `$PATH`.
    #[must_use]
    pub fn with_defaults(config: &SandboxConfig) -> Self {
        Self::new(PathBuf::from("docker"), config)
    }

    fn container_name(run_id: Uuid) -> String {
        format!("tutor-run-{run_id}")
    }

    /// Arguments passed to `docker`, split out for testing.
    fn run_args(&self, scratch: &Path, run_id: Uuid) -> Vec<String> {
        let mut args = vec![
            "run".to_owned(),
            "--rm".to_owned(),
            "--name".to_owned(),
            Self::container_name(run_id),
            "--user".to_owned(),
            self.user.clone(),
            "--cap-drop".to_owned(),
            "ALL".to_owned(),
            "--security-opt".to_owned(),
            "no-new-privileges".to_owned(),
        ];
        if self.network_disabled {
            args.extend(["--network".to_owned(), "none".to_owned()]);
        }
        args.extend([
            "--memory".to_owned(),
            format!("{}m", self.memory_mib),
            "--cpus".to_owned(),
            format!("{}", self.cpus),
            "--pids-limit".to_owned(),
            self.pids_limit.to_string(),
            "--read-only".to_owned(),
            "--tmpfs".to_owned(),
            "/tmp:rw,exec,size=256m".to_owned(),
            "-e".to_owned(),
            "GOCACHE=/tmp/go-cache".to_owned(),
            "-e".to_owned(),
            "GOPATH=/tmp/go".to_owned(),
            "-e".to_owned(),
            "HOME=/tmp".to_owned(),
            "-v".to_owned(),
            format!("{}:{WORKDIR}:ro", scratch.display()),
            "-w".to_owned(),
            WORKDIR.to_owned(),
            self.image.clone(),
            "go".to_owned(),
            "run".to_owned(),
            self.source_file_name().to_owned(),
        ]);
        args
    }
}

#[async_trait]
impl SandboxBackend for DockerBackend {
    fn name(&self) -> &'static str {
        "docker"
    }

    fn source_file_name(&self) -> &str {
        "main.go"
    }

    fn command(&self, scratch: &Path, run_id: Uuid) -> Command {
        let mut cmd = Command::new(&self.binary_path);
        cmd.args(self.run_args(scratch, run_id));
        cmd
    }

    async fn reap(&self, run_id: Uuid) {
        // Killing the CLI does not stop the container it started.
        let name = Self::container_name(run_id);
        let result = Command::new(&self.binary_path)
            .args(["rm", "-f", &name])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await;
        match result {
            Ok(status) if status.success() => {
                tracing::debug!(%run_id, "container removed");
            }
            Ok(status) => {
                tracing::debug!(%run_id, ?status, "container already gone");
            }
            Err(e) => {
                tracing::warn!(%run_id, error = %e, "failed to remove container");
            }
        }
    }

    async fn health_check(&self) -> Result<(), ExecutorError> {
        which_binary(&self.binary_path)?;

        let status = Command::new(&self.binary_path)
            .args(["version", "--format", "{{.Server.Version}}"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await?;
        if !status.success() {
            return Err(ExecutorError::LaunchFailed(
                "docker daemon is not reachable".to_owned(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> DockerBackend {
        DockerBackend::with_defaults(&SandboxConfig::default())
    }

    #[test]
    fn run_args_isolate_the_container() {
        let run_id = Uuid::new_v4();
        let args = backend().run_args(Path::new("/tmp/scratch-1"), run_id);
        let joined = args.join(" ");

        assert!(joined.starts_with("run --rm --name tutor-run-"));
        assert!(joined.contains("--network none"));
        assert!(joined.contains("--read-only"));
        assert!(joined.contains(&format!("--user {}", sandbox_user())));
        assert!(joined.contains("--memory 256m"));
        assert!(joined.contains("--pids-limit 128"));
        assert!(joined.contains("-v /tmp/scratch-1:/work:ro -w /work"));
        assert!(joined.ends_with("golang:1.22-alpine go run main.go"));
        assert!(joined.contains(&run_id.to_string()));
    }

    #[test]
    fn container_runs_unprivileged() {
        let args = backend().run_args(Path::new("/tmp/scratch-2"), Uuid::new_v4());
        let after = |flag: &str| {
            args.iter()
                .position(|a| a == flag)
                .and_then(|i| args.get(i + 1))
                .cloned()
        };

        let user = after("--user").unwrap_or_default();
        let uid = user.split(':').next().unwrap_or_default();
        assert!(!uid.is_empty() && uid != "0", "container user {user:?} is root");
        if !getuid().is_root() {
            assert_eq!(user, format!("{}:{}", getuid(), getgid()));
        }
        assert_eq!(after("--cap-drop").as_deref(), Some("ALL"));
        assert_eq!(after("--security-opt").as_deref(), Some("no-new-privileges"));
    }

    #[test]
    fn network_flag_omitted_when_enabled() {
        let mut config = SandboxConfig::default();
        config.network_disabled = false;
        let args = DockerBackend::with_defaults(&config).run_args(Path::new("/s"), Uuid::new_v4());
        assert!(!args.iter().any(|a| a == "--network"));
    }
}
