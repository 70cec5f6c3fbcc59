//! Repository traits, one per entity.
//!
//! Implementations must be `Send + Sync` so a single instance can be shared
//! by every in-flight request.

use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tutor_core::{
    Account, AccountId, Lesson, LessonId, Profile, Role, Session, Submission, SubmissionUpsert,
    TokenHash,
};

use crate::StoreError;

/// Credential store.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    /// Insert a new account.
    ///
    /// # Errors
    /// Returns [`StoreError::Conflict`] if the email is already registered.
    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Look up an account by its normalised email.
    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError>;

    /// All accounts, oldest first.
    async fn list(&self) -> Result<Vec<Account>, StoreError>;

    /// Replace name and email.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for an unknown id and
    /// [`StoreError::Conflict`] if the email belongs to another account.
    async fn update_profile(&self, id: AccountId, profile: &Profile) -> Result<(), StoreError>;

    /// Replace name and role.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for an unknown id.
    async fn update_name_and_role(
        &self,
        id: AccountId,
        name: &str,
        role: Role,
    ) -> Result<(), StoreError>;

    /// Replace the stored avatar file name, returning the previous one.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for an unknown id.
    async fn set_avatar(
        &self,
        id: AccountId,
        avatar: Option<&str>,
    ) -> Result<Option<String>, StoreError>;

    /// Delete an account together with its sessions and submissions.
    /// Returns `false` if it did not exist.
    async fn delete(&self, id: AccountId) -> Result<bool, StoreError>;
}

/// Session store. Lookups return expired sessions that have not been purged
/// yet; callers must check expiry themselves.
#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn insert(&self, session: &Session) -> Result<(), StoreError>;

    async fn find_by_token_hash(&self, hash: &TokenHash) -> Result<Option<Session>, StoreError>;

    /// Returns `false` if no session had this hash.
    async fn delete_by_token_hash(&self, hash: &TokenHash) -> Result<bool, StoreError>;

    async fn delete_for_account(&self, account_id: AccountId) -> Result<u64, StoreError>;

    /// Remove every session with `expires_at <= now`.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError>;
}

/// Completion records keyed on `(account, lesson)`.
#[async_trait]
pub trait SubmissionRepository: Send + Sync {
    /// Insert or update the single submission for the upsert's key.
    ///
    /// `is_passed` is OR-ed with `mark_passed`, so concurrent upserts can
    /// never clear a pass.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the account or lesson does not exist
    /// (stores that enforce referential integrity only).
    async fn upsert(&self, upsert: SubmissionUpsert) -> Result<Submission, StoreError>;

    async fn find(
        &self,
        account_id: AccountId,
        lesson_id: LessonId,
    ) -> Result<Option<Submission>, StoreError>;

    async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Submission>, StoreError>;

    /// Lessons the account has passed at least once.
    async fn passed_lessons(&self, account_id: AccountId) -> Result<HashSet<LessonId>, StoreError>;
}

/// Curriculum store.
#[async_trait]
pub trait LessonRepository: Send + Sync {
    /// All lessons ordered by ordering key, then creation time.
    async fn list_ordered(&self) -> Result<Vec<Lesson>, StoreError>;

    async fn find(&self, id: LessonId) -> Result<Option<Lesson>, StoreError>;

    async fn insert(&self, lesson: &Lesson) -> Result<(), StoreError>;

    /// Replace every editable field of an existing lesson.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] for an unknown id.
    async fn update(&self, lesson: &Lesson) -> Result<(), StoreError>;

    /// Delete a lesson and every submission for it.
    async fn delete(&self, id: LessonId) -> Result<bool, StoreError>;
}
