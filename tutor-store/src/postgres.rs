//! PostgreSQL-backed store.

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPoolOptions;
use sqlx::{Executor, PgPool};
use uuid::Uuid;

use tutor_core::{
    Account, AccountId, Lesson, LessonId, Profile, Role, Session, Submission, SubmissionUpsert,
    TokenHash,
};

use crate::repo::{AccountRepository, LessonRepository, SessionRepository, SubmissionRepository};
use crate::StoreError;

const SCHEMA: &str = include_str!("../migrations/0001_init.sql");

/// Upper bound on one repository call, pool checkout included.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5);

/// Implements every repository trait on a shared connection pool.
#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PgStore {
    /// Open a pool against `url` with [`DEFAULT_QUERY_TIMEOUT`].
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the database is unreachable.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        Self::connect_with_timeout(url, max_connections, DEFAULT_QUERY_TIMEOUT).await
    }

    /// Open a pool against `url`. Pool checkout and every statement are
    /// bounded by `query_timeout`, server-side as well as client-side.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if the database is unreachable.
    pub async fn connect_with_timeout(
        url: &str,
        max_connections: u32,
        query_timeout: Duration,
    ) -> Result<Self, StoreError> {
        let statement_timeout = format!("SET statement_timeout = {}", query_timeout.as_millis());
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(query_timeout)
            .after_connect(move |conn, _meta| {
                let statement_timeout = statement_timeout.clone();
                Box::pin(async move {
                    conn.execute(statement_timeout.as_str()).await?;
                    Ok(())
                })
            })
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(format!("connect: {e}")))?;
        Ok(Self { pool, query_timeout })
    }

    /// Wrap an existing pool.
    #[must_use]
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool, query_timeout: DEFAULT_QUERY_TIMEOUT }
    }

    /// Create tables and indexes if they do not exist yet.
    ///
    /// # Errors
    /// Returns [`StoreError::Backend`] if any statement fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await.map_err(map_db_error)?;
        tracing::info!("database schema ready");
        Ok(())
    }

    async fn bounded<T, F>(&self, query: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        within(self.query_timeout, query).await
    }
}

/// Run `query` under `limit`; an overrun is a backend failure.
async fn within<T, F>(limit: Duration, query: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, sqlx::Error>>,
{
    match tokio::time::timeout(limit, query).await {
        Ok(result) => result.map_err(map_db_error),
        Err(_) => {
            tracing::warn!(limit_ms = limit.as_millis(), "store call timed out");
            Err(StoreError::Backend(format!("timed out after {}ms", limit.as_millis())))
        }
    }
}

fn map_db_error(err: sqlx::Error) -> StoreError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StoreError::Conflict(db_err.constraint().unwrap_or("unique").to_owned());
        }
        if db_err.is_foreign_key_violation() {
            return StoreError::NotFound(db_err.constraint().unwrap_or("reference").to_owned());
        }
    }
    StoreError::Backend(err.to_string())
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: Uuid,
    name: String,
    email: String,
    password_hash: String,
    role: String,
    avatar: Option<String>,
    created_at: DateTime<Utc>,
}

impl TryFrom<AccountRow> for Account {
    type Error = StoreError;

    fn try_from(row: AccountRow) -> Result<Self, Self::Error> {
        let role = row
            .role
            .parse::<Role>()
            .map_err(|e| StoreError::Corrupt(format!("account {}: {e}", row.id)))?;
        Ok(Self {
            id: AccountId(row.id),
            name: row.name,
            email: row.email,
            password_hash: row.password_hash,
            role,
            avatar: row.avatar,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct SessionRow {
    token_hash: Vec<u8>,
    account_id: Uuid,
    expires_at: DateTime<Utc>,
    created_at: DateTime<Utc>,
}

impl TryFrom<SessionRow> for Session {
    type Error = StoreError;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        let token_hash = TokenHash::try_from(row.token_hash.as_slice())
            .map_err(|e| StoreError::Corrupt(format!("session hash: {e}")))?;
        Ok(Self {
            token_hash,
            account_id: AccountId(row.account_id),
            expires_at: row.expires_at,
            created_at: row.created_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct LessonRow {
    id: Uuid,
    title: String,
    tag: String,
    description: String,
    starter_code: String,
    sort_order: i64,
    expected_output: String,
    created_at: DateTime<Utc>,
}

impl From<LessonRow> for Lesson {
    fn from(row: LessonRow) -> Self {
        Self {
            id: LessonId(row.id),
            title: row.title,
            tag: row.tag,
            description: row.description,
            starter_code: row.starter_code,
            order: row.sort_order,
            expected_output: row.expected_output,
            created_at: row.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SubmissionRow {
    account_id: Uuid,
    lesson_id: Uuid,
    code: String,
    is_passed: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl From<SubmissionRow> for Submission {
    fn from(row: SubmissionRow) -> Self {
        Self {
            account_id: AccountId(row.account_id),
            lesson_id: LessonId(row.lesson_id),
            code: row.code,
            is_passed: row.is_passed,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

const ACCOUNT_COLUMNS: &str = "id, name, email, password_hash, role, avatar, created_at";
const LESSON_COLUMNS: &str =
    "id, title, tag, description, starter_code, sort_order, expected_output, created_at";
const SUBMISSION_COLUMNS: &str = "account_id, lesson_id, code, is_passed, created_at, updated_at";

#[async_trait]
impl AccountRepository for PgStore {
    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        self.bounded(sqlx::query(
            "INSERT INTO accounts (id, name, email, password_hash, role, avatar, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(account.id.as_uuid())
        .bind(&account.name)
        .bind(&account.email)
        .bind(&account.password_hash)
        .bind(account.role.as_str())
        .bind(&account.avatar)
        .bind(account.created_at)
        .execute(&self.pool))
        .await?;
        Ok(())
    }

    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        let row = self.bounded(sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool))
        .await?;
        row.map(Account::try_from).transpose()
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<Account>, StoreError> {
        let row = self.bounded(sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(&self.pool))
        .await?;
        row.map(Account::try_from).transpose()
    }

    async fn list(&self) -> Result<Vec<Account>, StoreError> {
        let rows = self.bounded(sqlx::query_as::<_, AccountRow>(&format!(
            "SELECT {ACCOUNT_COLUMNS} FROM accounts ORDER BY created_at"
        ))
        .fetch_all(&self.pool))
        .await?;
        rows.into_iter().map(Account::try_from).collect()
    }

    async fn update_profile(&self, id: AccountId, profile: &Profile) -> Result<(), StoreError> {
        let done = self.bounded(sqlx::query("UPDATE accounts SET name = $1, email = $2 WHERE id = $3")
            .bind(&profile.name)
            .bind(&profile.email)
            .bind(id.as_uuid())
            .execute(&self.pool))
        .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    async fn update_name_and_role(
        &self,
        id: AccountId,
        name: &str,
        role: Role,
    ) -> Result<(), StoreError> {
        let done = self.bounded(sqlx::query("UPDATE accounts SET name = $1, role = $2 WHERE id = $3")
            .bind(name)
            .bind(role.as_str())
            .bind(id.as_uuid())
            .execute(&self.pool))
        .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("account {id}")));
        }
        Ok(())
    }

    async fn set_avatar(
        &self,
        id: AccountId,
        avatar: Option<&str>,
    ) -> Result<Option<String>, StoreError> {
        // The self-join reads the old value before the update applies.
        let previous: Option<Option<String>> = self.bounded(sqlx::query_scalar(
            "UPDATE accounts AS a SET avatar = $1 FROM accounts AS old \
             WHERE a.id = $2 AND old.id = a.id RETURNING old.avatar",
        )
        .bind(avatar)
        .bind(id.as_uuid())
        .fetch_optional(&self.pool))
        .await?;
        previous.ok_or_else(|| StoreError::NotFound(format!("account {id}")))
    }

    async fn delete(&self, id: AccountId) -> Result<bool, StoreError> {
        // Sessions and submissions go with it via ON DELETE CASCADE.
        let done = self.bounded(sqlx::query("DELETE FROM accounts WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool))
        .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[async_trait]
impl SessionRepository for PgStore {
    async fn insert(&self, session: &Session) -> Result<(), StoreError> {
        self.bounded(sqlx::query(
            "INSERT INTO sessions (token_hash, account_id, expires_at, created_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(&session.token_hash.as_bytes()[..])
        .bind(session.account_id.as_uuid())
        .bind(session.expires_at)
        .bind(session.created_at)
        .execute(&self.pool))
        .await?;
        Ok(())
    }

    async fn find_by_token_hash(&self, hash: &TokenHash) -> Result<Option<Session>, StoreError> {
        let row = self.bounded(sqlx::query_as::<_, SessionRow>(
            "SELECT token_hash, account_id, expires_at, created_at \
             FROM sessions WHERE token_hash = $1",
        )
        .bind(&hash.as_bytes()[..])
        .fetch_optional(&self.pool))
        .await?;
        row.map(Session::try_from).transpose()
    }

    async fn delete_by_token_hash(&self, hash: &TokenHash) -> Result<bool, StoreError> {
        let done = self.bounded(sqlx::query("DELETE FROM sessions WHERE token_hash = $1")
            .bind(&hash.as_bytes()[..])
            .execute(&self.pool))
        .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn delete_for_account(&self, account_id: AccountId) -> Result<u64, StoreError> {
        let done = self.bounded(sqlx::query("DELETE FROM sessions WHERE account_id = $1")
            .bind(account_id.as_uuid())
            .execute(&self.pool))
        .await?;
        Ok(done.rows_affected())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, StoreError> {
        let done = self.bounded(sqlx::query("DELETE FROM sessions WHERE expires_at <= $1")
            .bind(now)
            .execute(&self.pool))
        .await?;
        Ok(done.rows_affected())
    }
}

#[async_trait]
impl SubmissionRepository for PgStore {
    async fn upsert(&self, upsert: SubmissionUpsert) -> Result<Submission, StoreError> {
        // The OR keeps a pass sticky even under concurrent writers.
        let row = self.bounded(sqlx::query_as::<_, SubmissionRow>(&format!(
            "INSERT INTO submissions (account_id, lesson_id, code, is_passed, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $5) \
             ON CONFLICT (account_id, lesson_id) DO UPDATE SET \
                 code = EXCLUDED.code, \
                 is_passed = submissions.is_passed OR EXCLUDED.is_passed, \
                 updated_at = EXCLUDED.updated_at \
             RETURNING {SUBMISSION_COLUMNS}"
        ))
        .bind(upsert.account_id.as_uuid())
        .bind(upsert.lesson_id.as_uuid())
        .bind(&upsert.code)
        .bind(upsert.mark_passed)
        .bind(upsert.at)
        .fetch_one(&self.pool))
        .await?;
        Ok(row.into())
    }

    async fn find(
        &self,
        account_id: AccountId,
        lesson_id: LessonId,
    ) -> Result<Option<Submission>, StoreError> {
        let row = self.bounded(sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE account_id = $1 AND lesson_id = $2"
        ))
        .bind(account_id.as_uuid())
        .bind(lesson_id.as_uuid())
        .fetch_optional(&self.pool))
        .await?;
        Ok(row.map(Submission::from))
    }

    async fn list_for_account(&self, account_id: AccountId) -> Result<Vec<Submission>, StoreError> {
        let rows = self.bounded(sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE account_id = $1 ORDER BY updated_at"
        ))
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool))
        .await?;
        Ok(rows.into_iter().map(Submission::from).collect())
    }

    async fn passed_lessons(&self, account_id: AccountId) -> Result<HashSet<LessonId>, StoreError> {
        let ids: Vec<Uuid> = self.bounded(sqlx::query_scalar(
            "SELECT lesson_id FROM submissions WHERE account_id = $1 AND is_passed",
        )
        .bind(account_id.as_uuid())
        .fetch_all(&self.pool))
        .await?;
        Ok(ids.into_iter().map(LessonId).collect())
    }
}

#[async_trait]
impl LessonRepository for PgStore {
    async fn list_ordered(&self) -> Result<Vec<Lesson>, StoreError> {
        let rows = self.bounded(sqlx::query_as::<_, LessonRow>(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons ORDER BY sort_order, created_at, id"
        ))
        .fetch_all(&self.pool))
        .await?;
        Ok(rows.into_iter().map(Lesson::from).collect())
    }

    async fn find(&self, id: LessonId) -> Result<Option<Lesson>, StoreError> {
        let row = self.bounded(sqlx::query_as::<_, LessonRow>(&format!(
            "SELECT {LESSON_COLUMNS} FROM lessons WHERE id = $1"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool))
        .await?;
        Ok(row.map(Lesson::from))
    }

    async fn insert(&self, lesson: &Lesson) -> Result<(), StoreError> {
        self.bounded(sqlx::query(&format!(
            "INSERT INTO lessons ({LESSON_COLUMNS}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)"
        ))
        .bind(lesson.id.as_uuid())
        .bind(&lesson.title)
        .bind(&lesson.tag)
        .bind(&lesson.description)
        .bind(&lesson.starter_code)
        .bind(lesson.order)
        .bind(&lesson.expected_output)
        .bind(lesson.created_at)
        .execute(&self.pool))
        .await?;
        Ok(())
    }

    async fn update(&self, lesson: &Lesson) -> Result<(), StoreError> {
        let done = self.bounded(sqlx::query(
            "UPDATE lessons SET title = $1, tag = $2, description = $3, starter_code = $4, \
             sort_order = $5, expected_output = $6 WHERE id = $7",
        )
        .bind(&lesson.title)
        .bind(&lesson.tag)
        .bind(&lesson.description)
        .bind(&lesson.starter_code)
        .bind(lesson.order)
        .bind(&lesson.expected_output)
        .bind(lesson.id.as_uuid())
        .execute(&self.pool))
        .await?;
        if done.rows_affected() == 0 {
            return Err(StoreError::NotFound(format!("lesson {}", lesson.id)));
        }
        Ok(())
    }

    async fn delete(&self, id: LessonId) -> Result<bool, StoreError> {
        let done = self.bounded(sqlx::query("DELETE FROM lessons WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool))
        .await?;
        Ok(done.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stalled_call_becomes_a_backend_error() {
        let stalled = std::future::pending::<Result<(), sqlx::Error>>();
        let result = within(Duration::from_millis(20), stalled).await;
        match result {
            Err(StoreError::Backend(msg)) => assert!(msg.contains("timed out"), "{msg}"),
            other => panic!("expected a backend timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finished_call_keeps_its_outcome() {
        let ok = within(DEFAULT_QUERY_TIMEOUT, async { Ok::<_, sqlx::Error>(7) }).await;
        assert_eq!(ok.ok(), Some(7));

        let failed = within(DEFAULT_QUERY_TIMEOUT, async { Err::<(), _>(sqlx::Error::PoolTimedOut) }).await;
        assert!(matches!(failed, Err(StoreError::Backend(_))));
    }
}
