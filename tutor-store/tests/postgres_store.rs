//! PostgreSQL store tests.
//!
//! Run with `DATABASE_URL` pointing at a disposable database:
//! `cargo test -p tutor-store -- --ignored`. Every test uses fresh ids and
//! emails, so they can share one database.

use chrono::{Duration, Utc};
use tutor_core::{
    Account, AccountId, LessonDraft, LessonId, Profile, Session, SubmissionUpsert,
};
use tutor_store::{
    AccountRepository, LessonRepository, PgStore, SessionRepository, StoreError,
    SubmissionRepository,
};
use uuid::Uuid;

async fn store() -> PgStore {
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(e) => panic!("DATABASE_URL must be set: {e}"),
    };
    let store = match PgStore::connect(&url, 2).await {
        Ok(s) => s,
        Err(e) => panic!("connect failed: {e}"),
    };
    if let Err(e) = store.migrate().await {
        panic!("migrate failed: {e}");
    }
    store
}

async fn new_account(store: &PgStore) -> Account {
    let email = format!("learner-{}@example.com", Uuid::new_v4());
    let profile = match Profile::parse("Learner", &email) {
        Ok(p) => p,
        Err(e) => panic!("invalid test profile: {e}"),
    };
    let account = Account::new(profile, "hash".to_owned(), Utc::now());
    if let Err(e) = AccountRepository::insert(store, &account).await {
        panic!("account insert failed: {e}");
    }
    account
}

async fn new_lesson(store: &PgStore) -> LessonId {
    let lesson = LessonDraft {
        title: format!("lesson {}", Uuid::new_v4()),
        expected_output: "hi".to_owned(),
        ..LessonDraft::default()
    }
    .into_lesson(Utc::now());
    if let Err(e) = LessonRepository::insert(store, &lesson).await {
        panic!("lesson insert failed: {e}");
    }
    lesson.id
}

fn upsert(account: AccountId, lesson: LessonId, code: &str, pass: bool) -> SubmissionUpsert {
    SubmissionUpsert {
        account_id: account,
        lesson_id: lesson,
        code: code.to_owned(),
        mark_passed: pass,
        at: Utc::now(),
    }
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn failing_resubmission_keeps_the_pass() {
    let store = store().await;
    let account = new_account(&store).await;
    let lesson = new_lesson(&store).await;

    let first = store.upsert(upsert(account.id, lesson, "good", true)).await;
    assert!(first.is_ok_and(|s| s.is_passed));

    let second = match store.upsert(upsert(account.id, lesson, "bad", false)).await {
        Ok(s) => s,
        Err(e) => panic!("second upsert failed: {e}"),
    };
    assert!(second.is_passed);
    assert_eq!(second.code, "bad");

    let passed = store.passed_lessons(account.id).await.unwrap_or_default();
    assert!(passed.contains(&lesson));
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn repeated_upserts_keep_a_single_row() {
    let store = store().await;
    let account = new_account(&store).await;
    let lesson = new_lesson(&store).await;

    for code in ["one", "two", "three"] {
        if let Err(e) = store.upsert(upsert(account.id, lesson, code, false)).await {
            panic!("upsert failed: {e}");
        }
    }
    let rows = store.list_for_account(account.id).await.unwrap_or_default();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].code, "three");
    assert!(!rows[0].is_passed);
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn duplicate_email_is_a_conflict() {
    let store = store().await;
    let existing = new_account(&store).await;
    let profile = match Profile::parse("Twin", &existing.email) {
        Ok(p) => p,
        Err(e) => panic!("invalid test profile: {e}"),
    };
    let twin = Account::new(profile, "hash".to_owned(), Utc::now());
    let result = AccountRepository::insert(&store, &twin).await;
    assert!(matches!(result, Err(StoreError::Conflict(_))), "{result:?}");
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn purge_removes_only_expired_sessions() {
    let store = store().await;
    let account = new_account(&store).await;
    let now = Utc::now();
    let (stale, stale_session) = Session::issue(account.id, now - Duration::hours(2), Duration::hours(1));
    let (fresh, fresh_session) = Session::issue(account.id, now, Duration::hours(1));
    for session in [&stale_session, &fresh_session] {
        if let Err(e) = SessionRepository::insert(&store, session).await {
            panic!("session insert failed: {e}");
        }
    }

    let purged = store.purge_expired(now).await.unwrap_or_default();
    assert!(purged >= 1);
    assert!(store.find_by_token_hash(&stale.hash()).await.ok().flatten().is_none());
    assert!(store.find_by_token_hash(&fresh.hash()).await.ok().flatten().is_some());
}

#[tokio::test]
#[ignore = "requires a PostgreSQL database in DATABASE_URL"]
async fn set_avatar_returns_the_replaced_name() {
    let store = store().await;
    let account = new_account(&store).await;

    assert_eq!(store.set_avatar(account.id, Some("a.png")).await.ok(), Some(None));
    assert_eq!(
        store.set_avatar(account.id, Some("b.jpg")).await.ok(),
        Some(Some("a.png".to_owned()))
    );
    let missing = store.set_avatar(AccountId::new(), None).await;
    assert!(matches!(missing, Err(StoreError::NotFound(_))));
}
