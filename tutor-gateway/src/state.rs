//! Shared handler state.

use std::path::PathBuf;
use std::sync::Arc;

use tutor_core::Clock;
use tutor_executor::SandboxOrchestrator;
use tutor_store::Repositories;

use crate::{
    auth::Authenticator, avatars::Avatars, coursework::Coursework, password::Passwords,
    rate_limit::RateLimiter,
};

/// Everything handlers need. Cloning is cheap.
#[derive(Debug, Clone)]
pub struct AppState {
    pub auth: Arc<Authenticator>,
    pub coursework: Arc<Coursework>,
    pub limiter: Arc<RateLimiter>,
    pub avatars: Arc<Avatars>,
    /// Send session cookies with the `Secure` attribute.
    pub secure_cookies: bool,
}

impl AppState {
    /// Wire the services over one set of repositories and one clock.
    /// Photos go to `tutor-avatars` under the system temp dir until
    /// [`AppState::with_avatar_dir`] says otherwise.
    #[must_use]
    pub fn new(
        repos: Repositories,
        sandbox: SandboxOrchestrator,
        passwords: Passwords,
        clock: Arc<dyn Clock>,
        session_ttl: chrono::Duration,
    ) -> Self {
        Self {
            auth: Arc::new(Authenticator::new(repos.clone(), passwords, Arc::clone(&clock), session_ttl)),
            avatars: Arc::new(Avatars::new(
                Arc::clone(&repos.accounts),
                std::env::temp_dir().join("tutor-avatars"),
            )),
            coursework: Arc::new(Coursework::new(repos, sandbox, clock)),
            limiter: Arc::new(RateLimiter::default()),
            secure_cookies: true,
        }
    }

    #[must_use]
    pub fn with_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Arc::new(limiter);
        self
    }

    #[must_use]
    pub fn with_avatar_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.avatars = Arc::new(self.avatars.relocated(dir));
        self
    }

    #[must_use]
    pub fn with_secure_cookies(mut self, secure: bool) -> Self {
        self.secure_cookies = secure;
        self
    }
}
