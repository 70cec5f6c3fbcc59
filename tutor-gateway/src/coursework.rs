//! Lessons, saved code and graded runs.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tutor_core::{
    gate, gate_for_guest, grade, Account, Clock, Lesson, LessonDraft, LessonId, LessonProgress,
    SubmissionUpsert,
};
use tutor_executor::{RunOutput, SandboxOrchestrator};
use tutor_store::Repositories;

use crate::{auth::Authenticator, ApiError};

/// Largest accepted source submission, in bytes.
pub const MAX_SOURCE_BYTES: usize = 64 * 1024;

/// A lesson as a given viewer sees it.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonView {
    #[serde(flatten)]
    pub lesson: Lesson,
    pub is_completed: bool,
    pub is_locked: bool,
}

/// Result of `run-code`: the raw run plus the verdict when a lesson was
/// named.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    #[serde(flatten)]
    pub output: RunOutput,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub passed: Option<bool>,
}

/// Orchestrates the sandbox, the grader and the progress gate.
#[derive(Debug, Clone)]
pub struct Coursework {
    repos: Repositories,
    sandbox: SandboxOrchestrator,
    clock: Arc<dyn Clock>,
}

impl Coursework {
    #[must_use]
    pub fn new(repos: Repositories, sandbox: SandboxOrchestrator, clock: Arc<dyn Clock>) -> Self {
        Self { repos, sandbox, clock }
    }

    #[must_use]
    pub fn sandbox(&self) -> &SandboxOrchestrator {
        &self.sandbox
    }

    /// The ordered catalog with completion and lock state for `viewer`.
    /// Guests see only the first lesson of each branch unlocked.
    ///
    /// # Errors
    /// [`ApiError::Internal`] on store failure.
    pub async fn lessons(&self, viewer: Option<&Account>) -> Result<Vec<LessonView>, ApiError> {
        let catalog = self.repos.lessons.list_ordered().await?;
        let progress = match viewer {
            Some(account) => {
                let passed = self.repos.submissions.passed_lessons(account.id).await?;
                gate(&catalog, &passed)
            }
            None => gate_for_guest(&catalog),
        };
        let mut by_id: HashMap<LessonId, LessonProgress> =
            progress.into_iter().map(|p| (p.lesson_id, p)).collect();

        Ok(catalog
            .into_iter()
            .map(|lesson| {
                let (is_completed, is_locked) =
                    by_id.remove(&lesson.id).map_or((false, true), |p| (p.is_completed, p.is_locked));
                LessonView { lesson, is_completed, is_locked }
            })
            .collect())
    }

    /// Store `code` as the learner's draft without touching pass state.
    ///
    /// # Errors
    /// [`ApiError::BadRequest`] for oversized code, [`ApiError::NotFound`]
    /// for an unknown lesson.
    pub async fn save_code(&self, account: &Account, lesson_id: LessonId, code: String) -> Result<(), ApiError> {
        check_source(&code)?;
        self.require_lesson(lesson_id).await?;
        self.repos
            .submissions
            .upsert(SubmissionUpsert {
                account_id: account.id,
                lesson_id,
                code,
                mark_passed: false,
                at: self.clock.now(),
            })
            .await?;
        Ok(())
    }

    /// The learner's stored code for a lesson, or an empty string.
    ///
    /// # Errors
    /// [`ApiError::Internal`] on store failure.
    pub async fn saved_code(&self, account: &Account, lesson_id: LessonId) -> Result<String, ApiError> {
        Ok(self
            .repos
            .submissions
            .find(account.id, lesson_id)
            .await?
            .map(|s| s.code)
            .unwrap_or_default())
    }

    /// Execute `code` in the sandbox. With a lesson, grade stdout against
    /// its expected output and record the submission; a pass is permanent.
    ///
    /// # Errors
    /// [`ApiError::BadRequest`] for empty or oversized code,
    /// [`ApiError::NotFound`] for an unknown lesson, [`ApiError::Internal`]
    /// when the sandbox itself fails.
    pub async fn run_code(
        &self,
        account: &Account,
        lesson_id: Option<LessonId>,
        code: String,
    ) -> Result<RunReport, ApiError> {
        check_source(&code)?;
        if code.trim().is_empty() {
            return Err(ApiError::BadRequest("code is required".to_owned()));
        }
        let lesson = match lesson_id {
            Some(id) => Some(self.require_lesson(id).await?),
            None => None,
        };

        let output = self.sandbox.run(&code, None).await?;

        let Some(lesson) = lesson else {
            return Ok(RunReport { output, passed: None });
        };
        let passed = grade(&output.stdout, &lesson.expected_output).is_pass();
        let stored = self
            .repos
            .submissions
            .upsert(SubmissionUpsert {
                account_id: account.id,
                lesson_id: lesson.id,
                code,
                mark_passed: passed,
                at: self.clock.now(),
            })
            .await?;
        tracing::info!(
            account_id = %account.id,
            lesson_id = %lesson.id,
            passed,
            completed = stored.is_passed,
            timed_out = output.timed_out,
            "submission graded"
        );
        Ok(RunReport { output, passed: Some(passed) })
    }

    /// # Errors
    /// [`ApiError::Forbidden`] for non-admins, [`ApiError::BadRequest`] for
    /// an invalid draft.
    pub async fn create_lesson(&self, acting: &Account, draft: LessonDraft) -> Result<Lesson, ApiError> {
        Authenticator::require_admin(acting)?;
        let lesson = draft.normalize()?.into_lesson(self.clock.now());
        self.repos.lessons.insert(&lesson).await?;
        tracing::info!(admin = %acting.id, lesson_id = %lesson.id, "lesson created");
        Ok(lesson)
    }

    /// Replace a lesson's content. Its id and creation time are kept.
    ///
    /// # Errors
    /// [`ApiError::Forbidden`] for non-admins, [`ApiError::BadRequest`] for
    /// an invalid draft, [`ApiError::NotFound`] for an unknown lesson.
    pub async fn update_lesson(
        &self,
        acting: &Account,
        id: LessonId,
        draft: LessonDraft,
    ) -> Result<Lesson, ApiError> {
        Authenticator::require_admin(acting)?;
        let draft = draft.normalize()?;
        let existing = self.require_lesson(id).await?;
        let lesson = draft.into_lesson_with_id(id, existing.created_at);
        self.repos.lessons.update(&lesson).await?;
        tracing::info!(admin = %acting.id, lesson_id = %id, "lesson updated");
        Ok(lesson)
    }

    /// Delete a lesson and every submission for it.
    ///
    /// # Errors
    /// [`ApiError::Forbidden`] for non-admins, [`ApiError::NotFound`] for an
    /// unknown lesson.
    pub async fn delete_lesson(&self, acting: &Account, id: LessonId) -> Result<(), ApiError> {
        Authenticator::require_admin(acting)?;
        if !self.repos.lessons.delete(id).await? {
            return Err(lesson_not_found());
        }
        tracing::info!(admin = %acting.id, lesson_id = %id, "lesson deleted");
        Ok(())
    }

    async fn require_lesson(&self, id: LessonId) -> Result<Lesson, ApiError> {
        self.repos.lessons.find(id).await?.ok_or_else(lesson_not_found)
    }
}

fn lesson_not_found() -> ApiError {
    ApiError::NotFound("lesson not found".to_owned())
}

fn check_source(code: &str) -> Result<(), ApiError> {
    if code.len() > MAX_SOURCE_BYTES {
        return Err(ApiError::BadRequest(format!("code exceeds {MAX_SOURCE_BYTES} bytes")));
    }
    Ok(())
}
