//! High-level run orchestrator wrapping a [`SandboxRunner`].
//!
//! Bounds concurrent runs with a semaphore and tracks active runs for
//! health reporting.

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::Semaphore;
use uuid::Uuid;

use crate::{ExecutorError, RunOutput, SandboxRunner};

/// Shared entry point for sandboxed runs.
///
/// Cloning is cheap; clones share the permit pool and the active registry.
#[derive(Debug, Clone)]
pub struct SandboxOrchestrator {
    runner: SandboxRunner,
    permits: Arc<Semaphore>,
    active_runs: Arc<Mutex<BTreeSet<Uuid>>>,
}

impl SandboxOrchestrator {
    /// Allow at most `runner.config().max_concurrent_runs` runs at a time.
    #[must_use]
    pub fn new(runner: SandboxRunner) -> Self {
        let limit = runner.config().max_concurrent_runs.max(1);
        Self {
            runner,
            permits: Arc::new(Semaphore::new(limit)),
            active_runs: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Run `source`, waiting for a free slot first. `None` uses the
    /// configured default deadline. Queueing time does not count against it.
    ///
    /// # Errors
    /// Propagates errors from [`SandboxRunner::run_with_id`].
    pub async fn run(
        &self,
        source: &str,
        deadline: Option<Duration>,
    ) -> Result<RunOutput, ExecutorError> {
        let _permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|_| ExecutorError::LaunchFailed("run limiter closed".to_owned()))?;

        let run_id = Uuid::new_v4();
        let _active = ActiveRun::register(&self.active_runs, run_id);
        let deadline = deadline.unwrap_or(self.runner.config().default_timeout);
        self.runner.run_with_id(run_id, source, deadline).await
    }

    /// Number of runs currently executing.
    #[must_use]
    pub fn active_count(&self) -> usize {
        lock(&self.active_runs).len()
    }

    /// Name of the configured backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.runner.backend().name()
    }

    /// Check the backend is ready.
    ///
    /// # Errors
    /// Propagates errors from the backend's health check.
    pub async fn health_check(&self) -> Result<(), ExecutorError> {
        self.runner.backend().health_check().await
    }
}

#[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
fn lock(registry: &Mutex<BTreeSet<Uuid>>) -> std::sync::MutexGuard<'_, BTreeSet<Uuid>> {
    registry.lock().expect("active run registry poisoned")
}

/// Registry entry removed on drop, so cancelled runs are unregistered too.
struct ActiveRun {
    registry: Arc<Mutex<BTreeSet<Uuid>>>,
    run_id: Uuid,
}

impl ActiveRun {
    fn register(registry: &Arc<Mutex<BTreeSet<Uuid>>>, run_id: Uuid) -> Self {
        lock(registry).insert(run_id);
        Self { registry: Arc::clone(registry), run_id }
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        lock(&self.registry).remove(&self.run_id);
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use async_trait::async_trait;
    use tokio::process::Command;

    use super::*;
    use crate::{ProcessBackend, SandboxBackend, SandboxConfig};

    #[derive(Debug)]
    struct MissingBinaryBackend;

    #[async_trait]
    impl SandboxBackend for MissingBinaryBackend {
        fn name(&self) -> &'static str {
            "missing"
        }

        fn source_file_name(&self) -> &str {
            "main.go"
        }

        fn command(&self, _scratch: &Path, _run_id: Uuid) -> Command {
            Command::new("/nonexistent/tutor-runtime")
        }

        async fn health_check(&self) -> Result<(), ExecutorError> {
            Err(ExecutorError::BinaryNotFound { path: "/nonexistent/tutor-runtime".into() })
        }
    }

    fn orchestrator(backend: Arc<dyn SandboxBackend>, max_concurrent_runs: usize) -> SandboxOrchestrator {
        let mut config = SandboxConfig::default();
        config.max_concurrent_runs = max_concurrent_runs;
        SandboxOrchestrator::new(SandboxRunner::new(backend, config))
    }

    #[tokio::test]
    async fn orchestrator_active_count_starts_at_zero() {
        let orch = orchestrator(Arc::new(ProcessBackend::shell()), 2);
        assert_eq!(orch.active_count(), 0, "new orchestrator must have zero active runs");
        assert_eq!(orch.backend_name(), "process");
    }

    #[tokio::test]
    async fn orchestrator_run_propagates_launch_failure() {
        let orch = orchestrator(Arc::new(MissingBinaryBackend), 1);
        let result = orch.run("package main", None).await;
        assert!(
            matches!(result, Err(ExecutorError::LaunchFailed(_))),
            "run must surface a launch failure as an error, got {result:?}"
        );
        assert_eq!(orch.active_count(), 0, "failed run must be unregistered");
        assert!(orch.health_check().await.is_err());
    }

    #[tokio::test]
    async fn orchestrator_unregisters_after_success() {
        let orch = orchestrator(Arc::new(ProcessBackend::shell()), 1);
        let output = match orch.run("echo ok", Some(Duration::from_secs(5))).await {
            Ok(o) => o,
            Err(e) => panic!("run failed: {e}"),
        };
        assert_eq!(output.stdout, "ok\n");
        assert_eq!(orch.active_count(), 0);
    }

    #[tokio::test]
    async fn single_permit_serialises_runs() {
        let orch = orchestrator(Arc::new(ProcessBackend::shell()), 1);
        let started = std::time::Instant::now();
        let (a, b) = tokio::join!(
            orch.run("sleep 0.3", Some(Duration::from_secs(5))),
            orch.run("sleep 0.3", Some(Duration::from_secs(5))),
        );
        assert!(a.is_ok() && b.is_ok());
        assert!(
            started.elapsed() >= Duration::from_millis(600),
            "two runs behind one permit must not overlap"
        );
    }
}
