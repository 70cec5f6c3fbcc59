//! Sandboxed run driver.
//!
//! The runner writes the source into a fresh scratch directory, launches the
//! backend's command in its own process group, drains stdout and stderr
//! concurrently into capped buffers, and enforces the deadline by killing the
//! whole group. The group leader is only reaped after the group is killed, so
//! the group id cannot be recycled by an unrelated process in between. The
//! scratch directory and the process group are released on every exit path,
//! including cancellation of the run future.

use std::fmt::Write as _;
use std::process::Stdio;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::sys::wait::{waitid, Id, WaitPidFlag};
use nix::unistd::Pid;
use serde::Serialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Child;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::scratch::ScratchDir;
use crate::{ExecutorError, SandboxBackend, SandboxConfig};

/// How long to wait for output pipes to close after the process is gone.
const DRAIN_GRACE: Duration = Duration::from_secs(2);

const READ_CHUNK: usize = 8 * 1024;

/// Captured result of one sandboxed run.
///
/// A learner program that fails to compile, crashes or times out still
/// produces a `RunOutput`; only infrastructure failures are errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunOutput {
    pub stdout: String,
    pub stderr: String,
    /// Process exit code; `1` when the process was killed by a signal.
    pub exit_code: i32,
    /// The deadline expired and the process group was killed.
    pub timed_out: bool,
    /// At least one stream exceeded the output cap.
    pub truncated: bool,
    pub elapsed_ms: u64,
}

impl RunOutput {
    /// Whether the program ran to completion with exit code zero.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }
}

/// Runs source code through a [`SandboxBackend`].
#[derive(Debug, Clone)]
pub struct SandboxRunner {
    backend: Arc<dyn SandboxBackend>,
    config: SandboxConfig,
}

impl SandboxRunner {
    #[must_use]
    pub fn new(backend: Arc<dyn SandboxBackend>, config: SandboxConfig) -> Self {
        Self { backend, config }
    }

    #[must_use]
    pub fn backend(&self) -> &Arc<dyn SandboxBackend> {
        &self.backend
    }

    #[must_use]
    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Run `source` with a fresh run id.
    ///
    /// # Errors
    /// See [`SandboxRunner::run_with_id`].
    pub async fn run(&self, source: &str, deadline: Duration) -> Result<RunOutput, ExecutorError> {
        self.run_with_id(Uuid::new_v4(), source, deadline).await
    }

    /// Run `source` and capture its output.
    ///
    /// # Cancel Safety
    /// Cancel safe. Dropping the future kills the process group, schedules
    /// [`SandboxBackend::reap`] and removes the scratch directory.
    ///
    /// # Errors
    /// Returns [`ExecutorError::ScratchUnavailable`] if the scratch directory
    /// cannot be prepared, [`ExecutorError::LaunchFailed`] if the backend
    /// command cannot be spawned, and [`ExecutorError::Io`] if waiting on the
    /// process fails.
    pub async fn run_with_id(
        &self,
        run_id: Uuid,
        source: &str,
        deadline: Duration,
    ) -> Result<RunOutput, ExecutorError> {
        let started = Instant::now();
        let scratch = ScratchDir::create(self.config.scratch_root.as_deref())?;
        scratch.write_source(self.backend.source_file_name(), source).await?;

        tracing::info!(
            %run_id,
            backend = self.backend.name(),
            source_sha256 = %source_digest(source),
            source_bytes = source.len(),
            deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX),
            "starting sandboxed run"
        );

        let mut cmd = self.backend.command(scratch.path(), run_id);
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .process_group(0);

        let mut child = cmd.spawn().map_err(|e| {
            ExecutorError::LaunchFailed(format!("spawn {} sandbox: {e}", self.backend.name()))
        })?;
        let mut guard = RunGuard::new(child.id(), Arc::clone(&self.backend), run_id);

        let cap = self.config.max_output_bytes;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutorError::LaunchFailed("stdout not piped".to_owned()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutorError::LaunchFailed("stderr not piped".to_owned()))?;
        let stdout_buf = CaptureBuf::default();
        let stderr_buf = CaptureBuf::default();
        let stdout_task = tokio::spawn(drain(stdout, cap, stdout_buf.clone()));
        let stderr_task = tokio::spawn(drain(stderr, cap, stderr_buf.clone()));

        let leader = guard.leader();
        let timed_out = match tokio::time::timeout(deadline, leader_exit(&mut child, leader)).await {
            Ok(exited) => {
                exited?;
                false
            }
            Err(_) => {
                tracing::warn!(%run_id, "deadline exceeded, killing process group");
                true
            }
        };
        // The leader is not reaped yet, so the group id still names this run.
        // Background processes the program left behind die with it.
        guard.kill_group();
        let status = child.wait().await?;
        if timed_out {
            self.backend.reap(run_id).await;
        }
        guard.finish();

        let (stdout, stderr) = tokio::join!(
            collect(stdout_task, stdout_buf, DRAIN_GRACE, run_id),
            collect(stderr_task, stderr_buf, DRAIN_GRACE, run_id),
        );

        let scratch_path = scratch.path().to_owned();
        if let Err(e) = scratch.close() {
            tracing::warn!(
                %run_id,
                path = %scratch_path.display(),
                error = %e,
                "failed to remove scratch directory"
            );
        }

        let output = RunOutput {
            stdout: String::from_utf8_lossy(&stdout.bytes).into_owned(),
            stderr: String::from_utf8_lossy(&stderr.bytes).into_owned(),
            exit_code: exit_code(status.code(), timed_out),
            timed_out,
            truncated: stdout.truncated || stderr.truncated,
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };

        tracing::info!(
            %run_id,
            exit_code = output.exit_code,
            timed_out,
            truncated = output.truncated,
            elapsed_ms = output.elapsed_ms,
            "sandboxed run complete"
        );

        Ok(output)
    }
}

/// Map a wait status to the reported exit code.
///
/// Signal deaths have no code and report `1`. A timed-out run never reports
/// success even if the process raced the kill and exited cleanly.
fn exit_code(code: Option<i32>, timed_out: bool) -> i32 {
    match code {
        Some(0) if timed_out => 1,
        Some(code) => code,
        None => 1,
    }
}

/// Hex SHA-256 of the submitted source, safe to log.
fn source_digest(source: &str) -> String {
    Sha256::digest(source.as_bytes())
        .iter()
        .fold(String::with_capacity(64), |mut hex, b| {
            let _ = write!(hex, "{b:02x}");
            hex
        })
}

/// Wait for the group leader to exit without reaping it.
async fn leader_exit(child: &mut Child, leader: Option<Pid>) -> std::io::Result<()> {
    let Some(pid) = leader else {
        return child.wait().await.map(drop);
    };
    match tokio::task::spawn_blocking(move || wait_unreaped(pid)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "waitid failed, reaping directly");
            child.wait().await.map(drop)
        }
        Err(e) => Err(std::io::Error::other(e)),
    }
}

/// Block until `pid` exits, leaving it a zombie so its pid and group id stay
/// reserved.
fn wait_unreaped(pid: Pid) -> nix::Result<()> {
    loop {
        match waitid(Id::Pid(pid), WaitPidFlag::WEXITED | WaitPidFlag::WNOWAIT) {
            Err(Errno::EINTR) => {}
            other => return other.map(drop),
        }
    }
}

#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

/// Capture shared between a reader task and the run, so bytes already read
/// survive an abandoned reader.
#[derive(Debug, Default, Clone)]
struct CaptureBuf(Arc<Mutex<Captured>>);

impl CaptureBuf {
    fn push(&self, chunk: &[u8], cap: usize) {
        let mut captured = self.lock();
        let room = cap.saturating_sub(captured.bytes.len());
        if chunk.len() > room {
            captured.truncated = true;
        }
        captured.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    fn take(&self) -> Captured {
        std::mem::take(&mut *self.lock())
    }

    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn lock(&self) -> MutexGuard<'_, Captured> {
        self.0.lock().expect("capture buffer poisoned")
    }
}

/// Read `reader` to EOF into `sink`, keeping at most `cap` bytes.
///
/// Reading continues past the cap so the child never blocks on a full pipe.
async fn drain<R: AsyncRead + Unpin>(mut reader: R, cap: usize, sink: CaptureBuf) {
    let mut chunk = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => sink.push(&chunk[..n], cap),
            Err(e) => {
                tracing::debug!(error = %e, "output pipe read failed");
                break;
            }
        }
    }
}

/// Wait up to `grace` for the reader to hit EOF. A pipe held open by an
/// escaped process is abandoned, keeping what was read and marking the
/// stream truncated.
async fn collect(mut task: JoinHandle<()>, sink: CaptureBuf, grace: Duration, run_id: Uuid) -> Captured {
    let complete = match tokio::time::timeout(grace, &mut task).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!(%run_id, error = %e, "output reader task failed");
            false
        }
        Err(_) => {
            tracing::warn!(%run_id, "output pipe still open after exit, abandoning");
            task.abort();
            false
        }
    };
    let mut captured = sink.take();
    captured.truncated |= !complete;
    captured
}

/// Owns the launched process group until the run completes.
struct RunGuard {
    pgid: Option<Pid>,
    backend: Arc<dyn SandboxBackend>,
    run_id: Uuid,
    finished: bool,
}

impl RunGuard {
    fn new(pid: Option<u32>, backend: Arc<dyn SandboxBackend>, run_id: Uuid) -> Self {
        // process_group(0) makes the child its own group leader.
        let pgid = pid.and_then(|p| i32::try_from(p).ok()).map(Pid::from_raw);
        Self { pgid, backend, run_id, finished: false }
    }

    fn leader(&self) -> Option<Pid> {
        self.pgid
    }

    fn kill_group(&mut self) {
        let Some(pgid) = self.pgid.take() else {
            return;
        };
        match killpg(pgid, Signal::SIGKILL) {
            Ok(()) | Err(Errno::ESRCH) => {}
            Err(e) => {
                tracing::warn!(run_id = %self.run_id, error = %e, "failed to kill process group");
            }
        }
    }

    fn finish(&mut self) {
        self.finished = true;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.kill_group();
        if self.finished {
            return;
        }
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let backend = Arc::clone(&self.backend);
            let run_id = self.run_id;
            handle.spawn(async move { backend.reap(run_id).await });
        }
    }
}
