//! In-memory store for tests and single-process development.
//!
//! All four repositories share one lock so cascading deletes are atomic.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use tutor_core::{
    Account, AccountId, Lesson, LessonId, Profile, Role, Session, Submission, SubmissionUpsert,
    TokenHash,
};

use crate::repo::{AccountRepository, LessonRepository, SessionRepository, SubmissionRepository};
use crate::StoreError;

#[derive(Debug, Default)]
struct Tables {
    accounts: HashMap<AccountId, Account>,
    sessions: HashMap<TokenHash, Session>,
    submissions: HashMap<(AccountId, LessonId), Submission>,
    lessons: HashMap<LessonId, Lesson>,
}

/// Thread-safe in-memory implementation of every repository trait.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored submission rows.
    #[must_use]
    pub fn submission_count(&self) -> usize {
        self.read().submissions.len()
    }

    /// Number of stored session rows, expired or not.
    #[must_use]
    pub fn session_count(&self) -> usize {
        self.read().sessions.len()
    }

    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn read(&self) -> RwLockReadGuard<'_, Tables> {
        self.tables.read().expect("memory store read lock poisoned")
    }

    #[expect(clippy::expect_used, reason = "lock poisoning is unrecoverable")]
    fn write(&self) -> RwLockWriteGuard<'_, Tables> {
        self.tables.write().expect("memory store write lock poisoned")
    }
}

fn email_taken(tables: &Tables, email: &str, except: Option<AccountId>) -> bool {
    tables
        .accounts
        .values()
        .any(|a| a.email == email && Some(a.id) != except)
}

#[async_trait]
impl AccountRepository for MemoryStore {
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut t = self.write();
        if email_taken(&t, &account.email, None) {
            return Err(StoreError::Conflict("email already registered".to_owned()));
        }
        t.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.read().accounts.get(&id).cloned())
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        Ok(self.read().accounts.values().find(|a| a.email == email).cloned())
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let mut all: Vec<Account> = self.read().accounts.values().cloned().collect();
        all.sort_by_key(|a| a.created_at);
        Ok(all)
    }

    async fn update_profile(&self, id: AccountId, profile: &Profile) -> Result<(), StoreError> {
        let mut t = self.write();
        if email_taken(&t, &profile.email, Some(id)) {
            return Err(StoreError::Conflict("email already registered".to_owned()));
        }
        let account = t
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        account.name.clone_from(&profile.name);
        account.email.clone_from(&profile.email);
        Ok(())
    }

    async fn update_name_and_role(
        &self,
        id: AccountId,
        name: &str,
        role: Role,
    ) -> Result<(), StoreError> {
        let mut t = self.write();
        let account = t
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        name.clone_into(&mut account.name);
        account.role = role;
        Ok(())
    }

    async fn set_avatar(
        &self,
        id: AccountId,
        avatar: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        let mut t = self.write();
        let account = t
            .accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound(format!("account {id}")))?;
        Ok(std::mem::replace(&mut account.avatar, avatar.map(str::to_owned)))
    }

    async fn delete(&self, id: AccountId) -> Result<bool, StoreError> {
        let mut t = self.write();
        let existed = t.accounts.remove(&id).is_some();
        t.sessions.retain(|_, s| s.account_id != id);
        t.submissions.retain(|(account_id, _), _| *account_id != id);
        Ok(existed)
    }
}

#[async_trait]
impl SessionRepository for MemoryStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        let mut t = self.write();
        if t.sessions.contains_key(&session.token_hash) {
            return Err(StoreError::Conflict("duplicate session token".to_owned()));
        }
        t.sessions.insert(session.token_hash, session.clone());
        Ok(())
    }

    async fn find_by_token_hash(&self, hash: &TokenHash) -> Result<Option<Session>, StoreError> {
        Ok(self.read().sessions.get(hash).cloned())
    }

    async fn delete_by_token_hash(&self, hash: &TokenHash) -> Result<bool, StoreError> {
        Ok(self.write().sessions.remove(hash).is_some())
    }

    async fn delete_for_account(&self, account_id: AccountId) -> Result<u64, StoreError> {
        let mut t = self.write();
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.account_id != account_id);
        Ok((before - t.sessions.len()) as u64)
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let mut t = self.write();
        let before = t.sessions.len();
        t.sessions.retain(|_, s| s.is_valid_at(now));
        Ok((before - t.sessions.len()) as u64)
    }
}

#[async_trait]
impl SubmissionRepository for MemoryStore {
    async fn upsert(&self, upsert: SubmissionUpsert) -> Result<Submission, StoreError> {
        let mut t = self.write();
        let key = (upsert.account_id, upsert.lesson_id);
        let merged = upsert.apply(t.submissions.remove(&key));
        t.submissions.insert(key, merged.clone());
        Ok(merged)
    }

    async fn find(
        &self,
        account_id: AccountId,
        lesson_id: LessonId,
    ) -> Result<Option<Submission>, StoreError> {
        Ok(self.read().submissions.get(&(account_id, lesson_id)).cloned())
    }

    async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Submission>, StoreError> {
        let mut subs: Vec<Submission> = self
            .read()
            .submissions
            .values()
            .filter(|s| s.account_id == account_id)
            .cloned()
            .collect();
        subs.sort_by_key(|s| s.updated_at);
        Ok(subs)
    }

    async fn passed_lessons(&self, account_id: AccountId) -> Result<HashSet<LessonId>, StoreError> {
        Ok(self
            .read()
            .submissions
            .values()
            .filter(|s| s.account_id == account_id && s.is_passed)
            .map(|s| s.lesson_id)
            .collect())
    }
}

#[async_trait]
impl LessonRepository for MemoryStore {
    async fn list_ordered(&self) -> Result<Vec<Lesson>, StoreError> {
        let mut lessons: Vec<Lesson> = self.read().lessons.values().cloned().collect();
        lessons.sort_by(|a, b| {
            a.order
                .cmp(&b.order)
                .then(a.created_at.cmp(&b.created_at))
                .then(a.id.cmp(&b.id))
        });
        Ok(lessons)
    }

    async fn find(&self, id: LessonId) -> Result<Option<Lesson>, StoreError> {
        Ok(self.read().lessons.get(&id).cloned())
    }

    async fn insert(&self, lesson: &Lesson) -> Result<(), StoreError> {
        let mut t = self.write();
        if t.lessons.contains_key(&lesson.id) {
            return Err(StoreError::Conflict(format!("lesson {}", lesson.id)));
        }
        t.lessons.insert(lesson.id, lesson.clone());
        Ok(())
    }

    async fn update(&self, lesson: &Lesson) -> Result<(), StoreError> {
        let mut t = self.write();
        let existing = t
            .lessons
            .get_mut(&lesson.id)
            .ok_or_else(|| StoreError::NotFound(format!("lesson {}", lesson.id)))?;
        let created_at = existing.created_at;
        *existing = Lesson { created_at, ..lesson.clone() };
        Ok(())
    }

    async fn delete(&self, id: LessonId) -> Result<bool, StoreError> {
        let mut t = self.write();
        let existed = t.lessons.remove(&id).is_some();
        t.submissions.retain(|(_, lesson_id), _| *lesson_id != id);
        Ok(existed)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use tutor_core::{LessonDraft, Profile};

    use super::*;

    fn account(email: &str) -> Account {
        let profile = match Profile::parse("Learner", email) {
            Ok(p) => p,
            Err(e) => panic!("invalid test profile: {e}"),
        };
        Account::new(profile, "hash".to_owned(), Utc::now())
    }

    fn upsert(account: &Account, lesson: LessonId, code: &str, pass: bool) -> SubmissionUpsert {
        SubmissionUpsert {
            account_id: account.id,
            lesson_id: lesson,
            code: code.to_owned(),
            mark_passed: pass,
            at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn duplicate_email_is_a_conflict() {
        let store = MemoryStore::new();
        AccountRepository::insert(&store, &account("ada@example.com"))
            .await
            .unwrap_or_else(|e| panic!("first insert failed: {e}"));
        let second = AccountRepository::insert(&store, &account("ada@example.com")).await;
        assert!(matches!(second, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn set_avatar_returns_the_replaced_name() {
        let store = MemoryStore::new();
        let ada = account("ada@example.com");
        AccountRepository::insert(&store, &ada)
            .await
            .unwrap_or_else(|e| panic!("insert failed: {e}"));

        assert_eq!(store.set_avatar(ada.id, Some("first.png")).await.ok(), Some(None));
        assert_eq!(
            store.set_avatar(ada.id, Some("second.jpg")).await.ok(),
            Some(Some("first.png".to_owned()))
        );
        let stored = store.find_by_id(ada.id).await.ok().flatten().and_then(|a| a.avatar);
        assert_eq!(stored.as_deref(), Some("second.jpg"));

        let missing = store.set_avatar(AccountId::new(), Some("x.png")).await;
        assert!(matches!(missing, Err(StoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn update_profile_rejects_email_of_other_account() {
        let store = MemoryStore::new();
        let ada = account("ada@example.com");
        let bob = account("bob@example.com");
        for a in [&ada, &bob] {
            AccountRepository::insert(&store, a)
                .await
                .unwrap_or_else(|e| panic!("insert failed: {e}"));
        }
        let clash = Profile { name: "Bob".to_owned(), email: "ada@example.com".to_owned() };
        assert!(matches!(
            store.update_profile(bob.id, &clash).await,
            Err(StoreError::Conflict(_))
        ));
        // Keeping one's own email is not a conflict.
        let same = Profile { name: "Ada L".to_owned(), email: "ada@example.com".to_owned() };
        assert!(store.update_profile(ada.id, &same).await.is_ok());
    }

    #[tokio::test]
    async fn repeated_upserts_keep_a_single_row() {
        let store = MemoryStore::new();
        let ada = account("ada@example.com");
        let lesson = LessonId::new();

        let first = store
            .upsert(upsert(&ada, lesson, "same", false))
            .await
            .unwrap_or_else(|e| panic!("upsert failed: {e}"));
        let second = store
            .upsert(upsert(&ada, lesson, "same", false))
            .await
            .unwrap_or_else(|e| panic!("upsert failed: {e}"));

        assert_eq!(store.submission_count(), 1);
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn pass_survives_failing_resubmission() {
        let store = MemoryStore::new();
        let ada = account("ada@example.com");
        let lesson = LessonId::new();

        let _ = store.upsert(upsert(&ada, lesson, "good", true)).await;
        let _ = store.upsert(upsert(&ada, lesson, "bad", false)).await;

        let sub = match SubmissionRepository::find(&store, ada.id, lesson).await {
            Ok(Some(s)) => s,
            other => panic!("expected a submission, got {other:?}"),
        };
        assert!(sub.is_passed);
        assert_eq!(sub.code, "bad");
        let passed = store.passed_lessons(ada.id).await.unwrap_or_default();
        assert!(passed.contains(&lesson));
    }

    #[tokio::test]
    async fn expired_sessions_are_visible_until_purged() {
        let store = MemoryStore::new();
        let now = Utc::now();
        let (token, session) = Session::issue(AccountId::new(), now, Duration::seconds(1));
        SessionRepository::insert(&store, &session)
            .await
            .unwrap_or_else(|e| panic!("insert failed: {e}"));

        let later = now + Duration::seconds(5);
        let found = store.find_by_token_hash(&token.hash()).await.ok().flatten();
        assert!(found.is_some(), "passive expiry must not hide unpurged rows");

        assert_eq!(store.purge_expired(later).await.ok(), Some(1));
        assert_eq!(store.session_count(), 0);
    }

    #[tokio::test]
    async fn deleting_account_cascades() {
        let store = MemoryStore::new();
        let ada = account("ada@example.com");
        AccountRepository::insert(&store, &ada)
            .await
            .unwrap_or_else(|e| panic!("insert failed: {e}"));
        let (_, session) = Session::issue(ada.id, Utc::now(), Duration::hours(1));
        let _ = SessionRepository::insert(&store, &session).await;
        let _ = store.upsert(upsert(&ada, LessonId::new(), "code", true)).await;

        assert_eq!(AccountRepository::delete(&store, ada.id).await.ok(), Some(true));
        assert_eq!(store.session_count(), 0);
        assert_eq!(store.submission_count(), 0);
        assert_eq!(AccountRepository::delete(&store, ada.id).await.ok(), Some(false));
    }

    #[tokio::test]
    async fn lessons_list_in_order_and_update_keeps_created_at() {
        let store = MemoryStore::new();
        let draft = |title: &str, order| LessonDraft {
            title: title.to_owned(),
            order,
            ..LessonDraft::default()
        };
        let second = draft("second", 2).into_lesson(Utc::now());
        let first = draft("first", 1).into_lesson(Utc::now());
        for l in [&second, &first] {
            LessonRepository::insert(&store, l)
                .await
                .unwrap_or_else(|e| panic!("insert failed: {e}"));
        }
        let titles: Vec<String> = store
            .list_ordered()
            .await
            .unwrap_or_default()
            .into_iter()
            .map(|l| l.title)
            .collect();
        assert_eq!(titles, ["first", "second"]);

        let edited = draft("renamed", 9).into_lesson_with_id(first.id, Utc::now() + Duration::days(1));
        assert!(store.update(&edited).await.is_ok());
        let stored = LessonRepository::find(&store, first.id).await.ok().flatten();
        assert_eq!(stored.map(|l| (l.title, l.created_at)), Some(("renamed".to_owned(), first.created_at)));
    }
}
