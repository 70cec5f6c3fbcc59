//! Persistence for the tutor platform.
//!
//! Four repository traits in [`repo`] with two implementations: [`MemoryStore`]
//! for tests and development, and [`PgStore`] for production.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repo;

use std::sync::Arc;

pub use error::StoreError;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use repo::{AccountRepository, LessonRepository, SessionRepository, SubmissionRepository};

/// Shared handles to every repository, cloned into request state.
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub submissions: Arc<dyn SubmissionRepository>,
    pub lessons: Arc<dyn LessonRepository>,
}

impl Repositories {
    /// Back every repository with the same store.
    pub fn from_store<S>(store: S) -> Self
    where
        S: AccountRepository
            + SessionRepository
            + SubmissionRepository
            + LessonRepository
            + 'static,
    {
        let store = Arc::new(store);
        Self {
            accounts: store.clone(),
            sessions: store.clone(),
            submissions: store.clone(),
            lessons: store,
        }
    }

    /// A fresh, empty in-memory bundle.
    #[must_use]
    pub fn in_memory() -> Self {
        Self::from_store(MemoryStore::new())
    }
}

impl std::fmt::Debug for Repositories {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repositories").finish_non_exhaustive()
    }
}
