//! Entry point for the `tutor-gateway` HTTP server.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;
use tutor_core::{Clock, SystemClock};
use tutor_gateway::{bootstrap, config::GatewayConfig, password::Passwords, routes::create_router, state::AppState, sweeper};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = match GatewayConfig::from_env() {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "invalid configuration");
            std::process::exit(1);
        }
    };

    let repos = match bootstrap::repositories(&config).await {
        Ok(r) => r,
        Err(e) => {
            tracing::error!(error = %e, "failed to open store");
            std::process::exit(1);
        }
    };
    let passwords = match Passwords::new() {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = %e, "failed to initialise password hasher");
            std::process::exit(1);
        }
    };

    let sandbox = bootstrap::sandbox(&config);
    if let Err(e) = sandbox.health_check().await {
        tracing::warn!(backend = sandbox.backend_name(), error = %e, "sandbox backend unavailable; runs will fail");
    }

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(repos, sandbox, passwords, clock, config.session_ttl)
        .with_secure_cookies(!config.dev_mode)
        .with_avatar_dir(config.avatar_dir.clone());
    if config.dev_mode {
        tracing::warn!("dev mode: session cookies are sent without Secure");
    }

    if let Some(email) = &config.bootstrap_admin {
        match state.auth.promote_to_admin(email).await {
            Ok(true) => info!(%email, "bootstrap admin ready"),
            Ok(false) => tracing::warn!(%email, "bootstrap admin not registered yet"),
            Err(e) => tracing::warn!(%email, error = %e, "bootstrap admin promotion failed"),
        }
    }

    let _sweeper = sweeper::spawn(state.clone(), config.sweep_interval);
    let app = create_router(state);

    let listener = match tokio::net::TcpListener::bind(config.listen_addr).await {
        Ok(l) => l,
        Err(e) => {
            tracing::error!(addr = %config.listen_addr, error = %e, "failed to bind");
            std::process::exit(1);
        }
    };

    info!(addr = %config.listen_addr, "tutor-gateway listening");

    if let Err(e) = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await {
        tracing::error!(error = %e, "server error");
        std::process::exit(1);
    }
}
