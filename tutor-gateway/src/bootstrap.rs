//! Start-up wiring: store selection, sandbox backend and seed data.

use std::sync::Arc;

use tutor_core::sample::sample_catalog;
use tutor_executor::{
    BackendKind, DockerBackend, ProcessBackend, SandboxBackend, SandboxOrchestrator, SandboxRunner,
};
use tutor_store::{PgStore, Repositories, StoreError};

use crate::config::GatewayConfig;

const PG_MAX_CONNECTIONS: u32 = 10;

/// PostgreSQL when `DATABASE_URL` is set, otherwise an in-memory store
/// seeded with the sample catalog.
///
/// # Errors
/// Returns [`StoreError`] if the database is unreachable or migration fails.
pub async fn repositories(config: &GatewayConfig) -> Result<Repositories, StoreError> {
    if let Some(url) = &config.database_url {
        let store = PgStore::connect(url, PG_MAX_CONNECTIONS).await?;
        store.migrate().await?;
        tracing::info!("using PostgreSQL store");
        return Ok(Repositories::from_store(store));
    }
    tracing::warn!("DATABASE_URL not set; using in-memory store, data is lost on restart");
    let repos = Repositories::in_memory();
    seed_catalog(&repos).await?;
    Ok(repos)
}

/// Insert the sample lessons if the catalog is empty. Returns how many were
/// added.
///
/// # Errors
/// Propagates store failures.
pub async fn seed_catalog(repos: &Repositories) -> Result<usize, StoreError> {
    if !repos.lessons.list_ordered().await?.is_empty() {
        return Ok(0);
    }
    let catalog = sample_catalog();
    for lesson in &catalog {
        repos.lessons.insert(lesson).await?;
    }
    tracing::info!(lessons = catalog.len(), "seeded sample catalog");
    Ok(catalog.len())
}

/// Build the run orchestrator for the configured backend.
#[must_use]
pub fn sandbox(config: &GatewayConfig) -> SandboxOrchestrator {
    let backend: Arc<dyn SandboxBackend> = match config.sandbox_backend {
        BackendKind::Docker => Arc::new(DockerBackend::with_defaults(&config.sandbox)),
        BackendKind::Process => {
            tracing::warn!("process sandbox backend provides no isolation; development only");
            Arc::new(ProcessBackend::go())
        }
    };
    SandboxOrchestrator::new(SandboxRunner::new(backend, config.sandbox.clone()))
}
