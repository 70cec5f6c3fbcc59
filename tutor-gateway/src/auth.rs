//! Accounts and sessions.
//!
//! Raw session tokens only ever exist in the response that issues them and
//! in the client's cookie jar. The store sees their SHA-256 hash.

use std::sync::Arc;

use serde::Serialize;
use tutor_core::{
    account::{normalize_email, validate_name, validate_password},
    Account, AccountId, Clock, Profile, Role, Session, SessionToken,
};
use tutor_store::{Repositories, StoreError};

use crate::{avatars::avatar_url, password::Passwords, ApiError};

const INVALID_CREDENTIALS: &str = "invalid email or password";
const EMAIL_TAKEN: &str = "email already registered";

/// Public view of an account. Never carries the password hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountView {
    pub id: AccountId,
    pub name: String,
    pub email: String,
    pub role: Role,
    /// URL of the profile photo, if one was uploaded.
    pub avatar: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            id: account.id,
            name: account.name.clone(),
            email: account.email.clone(),
            role: account.role,
            avatar: account.avatar.as_deref().map(avatar_url),
            created_at: account.created_at,
        }
    }
}

/// Registration, login and session validation.
#[derive(Debug, Clone)]
pub struct Authenticator {
    repos: Repositories,
    passwords: Arc<Passwords>,
    clock: Arc<dyn Clock>,
    session_ttl: chrono::Duration,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        repos: Repositories,
        passwords: Passwords,
        clock: Arc<dyn Clock>,
        session_ttl: chrono::Duration,
    ) -> Self {
        Self { repos, passwords: Arc::new(passwords), clock, session_ttl }
    }

    #[must_use]
    pub fn session_ttl(&self) -> chrono::Duration {
        self.session_ttl
    }

    /// Create a `user` account and sign it in.
    ///
    /// # Errors
    /// [`ApiError::BadRequest`] for invalid input, [`ApiError::Conflict`] if
    /// the normalised email is taken.
    pub async fn register(
        &self,
        name: &str,
        email: &str,
        password: &str,
    ) -> Result<(Account, SessionToken), ApiError> {
        let profile = Profile::parse(name, email)?;
        validate_password(password)?;

        let hash = self.hash_password(password).await?;
        let account = Account::new(profile, hash, self.clock.now());
        match self.repos.accounts.insert(&account).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(ApiError::Conflict(EMAIL_TAKEN.to_owned())),
            Err(e) => return Err(e.into()),
        }
        tracing::info!(account_id = %account.id, "account registered");

        let token = self.open_session(account.id).await?;
        Ok((account, token))
    }

    /// Verify credentials and issue a fresh session.
    ///
    /// Unknown email and wrong password fail identically, and both pay for a
    /// full hash verification.
    ///
    /// # Errors
    /// [`ApiError::Unauthorized`] on any credential mismatch.
    pub async fn login(&self, email: &str, password: &str) -> Result<(Account, SessionToken), ApiError> {
        let Ok(email) = normalize_email(email) else {
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        };
        let account = self.repos.accounts.find_by_email(&email).await?;

        let passwords = Arc::clone(&self.passwords);
        let password = password.to_owned();
        let verified = match account {
            Some(account) => {
                let hash = account.password_hash.clone();
                let matches = blocking(move || passwords.verify(&password, &hash)).await?;
                matches.then_some(account)
            }
            None => {
                blocking(move || passwords.verify_dummy(&password)).await?;
                None
            }
        };

        let Some(account) = verified else {
            tracing::info!("login rejected");
            return Err(ApiError::Unauthorized(INVALID_CREDENTIALS));
        };
        let token = self.open_session(account.id).await?;
        tracing::info!(account_id = %account.id, "login succeeded");
        Ok((account, token))
    }

    /// Drop the session behind `token`. Missing or unknown tokens are fine.
    ///
    /// # Errors
    /// [`ApiError::Internal`] on store failure.
    pub async fn logout(&self, token: Option<&SessionToken>) -> Result<(), ApiError> {
        if let Some(token) = token {
            self.repos.sessions.delete_by_token_hash(&token.hash()).await?;
        }
        Ok(())
    }

    /// Resolve a presented token to its account.
    ///
    /// The session must exist, be unexpired by the injected clock, and
    /// reference an account that still exists.
    ///
    /// # Errors
    /// [`ApiError::Unauthorized`] otherwise.
    pub async fn authenticate(&self, token: Option<&SessionToken>) -> Result<Account, ApiError> {
        let token = token.ok_or_else(ApiError::unauthorized)?;
        let session = self
            .repos
            .sessions
            .find_by_token_hash(&token.hash())
            .await?
            .ok_or_else(ApiError::unauthorized)?;
        if !session.is_valid_at(self.clock.now()) {
            return Err(ApiError::unauthorized());
        }
        self.repos
            .accounts
            .find_by_id(session.account_id)
            .await?
            .ok_or_else(ApiError::unauthorized)
    }

    /// # Errors
    /// [`ApiError::Forbidden`] unless `account` is an admin.
    pub fn require_admin(account: &Account) -> Result<(), ApiError> {
        if account.is_admin() {
            Ok(())
        } else {
            Err(ApiError::Forbidden("admin access required"))
        }
    }

    /// Change the caller's own name and email.
    ///
    /// # Errors
    /// [`ApiError::BadRequest`] for invalid input, [`ApiError::Conflict`] if
    /// the new email belongs to someone else.
    pub async fn update_profile(
        &self,
        account: &Account,
        name: &str,
        email: &str,
    ) -> Result<Account, ApiError> {
        let profile = Profile::parse(name, email)?;
        match self.repos.accounts.update_profile(account.id, &profile).await {
            Ok(()) => {}
            Err(StoreError::Conflict(_)) => return Err(ApiError::Conflict(EMAIL_TAKEN.to_owned())),
            Err(e) => return Err(e.into()),
        }
        Ok(Account { name: profile.name, email: profile.email, ..account.clone() })
    }

    /// Delete the caller's account. Sessions and submissions go with it.
    ///
    /// # Errors
    /// [`ApiError::Internal`] on store failure.
    pub async fn delete_account(&self, account: &Account) -> Result<(), ApiError> {
        self.repos.accounts.delete(account.id).await?;
        tracing::info!(account_id = %account.id, "account deleted");
        Ok(())
    }

    /// # Errors
    /// [`ApiError::Forbidden`] for non-admins.
    pub async fn list_accounts(&self, acting: &Account) -> Result<Vec<Account>, ApiError> {
        Self::require_admin(acting)?;
        Ok(self.repos.accounts.list().await?)
    }

    /// Rename an account and set its role.
    ///
    /// # Errors
    /// [`ApiError::Forbidden`] for non-admins, [`ApiError::BadRequest`] for
    /// an invalid name, [`ApiError::NotFound`] for an unknown account.
    pub async fn admin_update_account(
        &self,
        acting: &Account,
        id: AccountId,
        name: &str,
        role: Role,
    ) -> Result<(), ApiError> {
        Self::require_admin(acting)?;
        let name = validate_name(name)?;
        self.repos.accounts.update_name_and_role(id, &name, role).await?;
        tracing::info!(admin = %acting.id, account_id = %id, %role, "account updated by admin");
        Ok(())
    }

    /// # Errors
    /// [`ApiError::Forbidden`] for non-admins, [`ApiError::NotFound`] for an
    /// unknown account.
    pub async fn admin_delete_account(&self, acting: &Account, id: AccountId) -> Result<(), ApiError> {
        Self::require_admin(acting)?;
        if !self.repos.accounts.delete(id).await? {
            return Err(ApiError::NotFound("account not found".to_owned()));
        }
        tracing::info!(admin = %acting.id, account_id = %id, "account deleted by admin");
        Ok(())
    }

    /// Promote the account registered under `email` to admin. Returns
    /// `false` when no such account exists yet.
    ///
    /// # Errors
    /// [`ApiError::BadRequest`] for a malformed email.
    pub async fn promote_to_admin(&self, email: &str) -> Result<bool, ApiError> {
        let email = normalize_email(email)?;
        let Some(account) = self.repos.accounts.find_by_email(&email).await? else {
            return Ok(false);
        };
        if !account.is_admin() {
            self.repos.accounts.update_name_and_role(account.id, &account.name, Role::Admin).await?;
            tracing::info!(account_id = %account.id, "account promoted to admin");
        }
        Ok(true)
    }

    /// Delete every session expired by now.
    ///
    /// # Errors
    /// [`ApiError::Internal`] on store failure.
    pub async fn purge_expired_sessions(&self) -> Result<u64, ApiError> {
        Ok(self.repos.sessions.purge_expired(self.clock.now()).await?)
    }

    async fn open_session(&self, account_id: AccountId) -> Result<SessionToken, ApiError> {
        let (token, session) = Session::issue(account_id, self.clock.now(), self.session_ttl);
        self.repos.sessions.insert(&session).await?;
        Ok(token)
    }

    async fn hash_password(&self, password: &str) -> Result<String, ApiError> {
        let passwords = Arc::clone(&self.passwords);
        let password = password.to_owned();
        blocking(move || passwords.hash(&password)).await?
    }
}

/// Argon2 work runs off the async executor.
async fn blocking<T, F>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ApiError::Internal(format!("password task failed: {e}")))
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use tutor_core::ManualClock;

    use super::*;

    fn setup() -> (Authenticator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).single().unwrap_or_default()));
        let passwords = match Passwords::insecure_fast() {
            Ok(p) => p,
            Err(e) => panic!("hasher setup failed: {e}"),
        };
        let auth = Authenticator::new(
            Repositories::in_memory(),
            passwords,
            Arc::clone(&clock) as Arc<dyn Clock>,
            chrono::Duration::hours(1),
        );
        (auth, clock)
    }

    async fn register(auth: &Authenticator, email: &str) -> (Account, SessionToken) {
        match auth.register("Ada", email, "secret-pw").await {
            Ok(pair) => pair,
            Err(e) => panic!("register failed: {e}"),
        }
    }

    #[tokio::test]
    async fn register_then_authenticate() {
        let (auth, _) = setup();
        let (account, token) = register(&auth, "ada@example.com").await;
        assert_eq!(account.role, Role::User);
        let found = match auth.authenticate(Some(&token)).await {
            Ok(a) => a,
            Err(e) => panic!("authenticate failed: {e}"),
        };
        assert_eq!(found.id, account.id);
    }

    #[tokio::test]
    async fn duplicate_email_conflicts_case_insensitively() {
        let (auth, _) = setup();
        register(&auth, "ada@example.com").await;
        let err = auth.register("Other", " ADA@Example.com ", "secret-pw").await;
        assert!(matches!(err, Err(ApiError::Conflict(_))), "got {err:?}");
    }

    #[tokio::test]
    async fn invalid_registration_input_is_rejected() {
        let (auth, _) = setup();
        assert!(matches!(auth.register("", "a@b.co", "secret-pw").await, Err(ApiError::BadRequest(_))));
        assert!(matches!(auth.register("Ada", "nope", "secret-pw").await, Err(ApiError::BadRequest(_))));
        assert!(matches!(auth.register("Ada", "a@b.co", "123").await, Err(ApiError::BadRequest(_))));
    }

    #[tokio::test]
    async fn login_failures_are_indistinguishable() {
        let (auth, _) = setup();
        register(&auth, "ada@example.com").await;
        let wrong_pw = auth.login("ada@example.com", "wrong-pw").await;
        let unknown = auth.login("nobody@example.com", "secret-pw").await;
        match (wrong_pw, unknown) {
            (Err(a), Err(b)) => assert_eq!(a.to_string(), b.to_string()),
            other => panic!("both logins must fail: {other:?}"),
        }
    }

    #[tokio::test]
    async fn login_issues_a_new_session() {
        let (auth, _) = setup();
        let (_, first) = register(&auth, "ada@example.com").await;
        let (_, second) = match auth.login("Ada@Example.com", "secret-pw").await {
            Ok(pair) => pair,
            Err(e) => panic!("login failed: {e}"),
        };
        assert_ne!(first.as_str(), second.as_str());
        assert!(auth.authenticate(Some(&first)).await.is_ok());
        assert!(auth.authenticate(Some(&second)).await.is_ok());
    }

    #[tokio::test]
    async fn session_expires_on_the_injected_clock() {
        let (auth, clock) = setup();
        let (_, token) = register(&auth, "ada@example.com").await;
        clock.advance(chrono::Duration::minutes(59));
        assert!(auth.authenticate(Some(&token)).await.is_ok());
        clock.advance(chrono::Duration::minutes(1));
        assert!(matches!(auth.authenticate(Some(&token)).await, Err(ApiError::Unauthorized(_))));
        assert_eq!(auth.purge_expired_sessions().await.ok(), Some(1));
    }

    #[tokio::test]
    async fn logout_is_idempotent() {
        let (auth, _) = setup();
        let (_, token) = register(&auth, "ada@example.com").await;
        assert!(auth.logout(Some(&token)).await.is_ok());
        assert!(auth.logout(Some(&token)).await.is_ok());
        assert!(auth.logout(None).await.is_ok());
        assert!(auth.authenticate(Some(&token)).await.is_err());
    }

    #[tokio::test]
    async fn deleted_account_invalidates_session() {
        let (auth, _) = setup();
        let (account, token) = register(&auth, "ada@example.com").await;
        assert!(auth.delete_account(&account).await.is_ok());
        assert!(matches!(auth.authenticate(Some(&token)).await, Err(ApiError::Unauthorized(_))));
    }

    #[tokio::test]
    async fn admin_operations_require_admin_role() {
        let (auth, _) = setup();
        let (user, _) = register(&auth, "ada@example.com").await;
        assert!(matches!(auth.list_accounts(&user).await, Err(ApiError::Forbidden(_))));

        assert_eq!(auth.promote_to_admin("ADA@example.com").await.ok(), Some(true));
        assert_eq!(auth.promote_to_admin("ghost@example.com").await.ok(), Some(false));
        let admin = Account { role: Role::Admin, ..user };
        let listed = match auth.list_accounts(&admin).await {
            Ok(l) => l,
            Err(e) => panic!("list failed: {e}"),
        };
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].role, Role::Admin);
    }

    #[tokio::test]
    async fn update_profile_rejects_taken_email() {
        let (auth, _) = setup();
        let (ada, _) = register(&auth, "ada@example.com").await;
        register(&auth, "bob@example.com").await;
        let err = auth.update_profile(&ada, "Ada", "bob@example.com").await;
        assert!(matches!(err, Err(ApiError::Conflict(_))));
        let updated = match auth.update_profile(&ada, "Ada L.", "ada.l@example.com").await {
            Ok(a) => a,
            Err(e) => panic!("update failed: {e}"),
        };
        assert_eq!(updated.email, "ada.l@example.com");
    }

    #[test]
    fn account_view_omits_password_hash() {
        let account = Account::new(
            Profile { name: "Ada".to_owned(), email: "ada@example.com".to_owned() },
            "$argon2id$secret".to_owned(),
            Utc::now(),
        );
        let json = serde_json::to_string(&AccountView::from(&account)).unwrap_or_default();
        assert!(!json.contains("argon2id"));
        assert!(json.contains("\"createdAt\""));
    }
}
