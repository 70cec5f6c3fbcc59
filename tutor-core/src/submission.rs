use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::id::{AccountId, LessonId};

/// A learner's latest code for one lesson and whether it ever passed.
///
/// There is at most one submission per `(account_id, lesson_id)` pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub account_id: AccountId,
    pub lesson_id: LessonId,
    /// Most recently submitted code (last write wins).
    pub code: String,
    /// Monotone: once `true` it is never reset.
    pub is_passed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An idempotent upsert keyed on `(account_id, lesson_id)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionUpsert {
    pub account_id: AccountId,
    pub lesson_id: LessonId,
    pub code: String,
    /// When `true` the submission is marked passed. `false` leaves the
    /// stored flag untouched; it never clears it.
    pub mark_passed: bool,
    pub at: DateTime<Utc>,
}

impl SubmissionUpsert {
    /// Applies the upsert on top of the stored record, if any.
    ///
    /// `code` and `updated_at` are overwritten, `created_at` is only set on
    /// insert, and `is_passed` can only go from `false` to `true`.
    #[must_use]
    pub fn apply(self, existing: Option<Submission>) -> Submission {
        match existing {
            Some(prev) => Submission {
                account_id: prev.account_id,
                lesson_id: prev.lesson_id,
                code: self.code,
                is_passed: prev.is_passed || self.mark_passed,
                created_at: prev.created_at,
                updated_at: self.at,
            },
            None => Submission {
                account_id: self.account_id,
                lesson_id: self.lesson_id,
                code: self.code,
                is_passed: self.mark_passed,
                created_at: self.at,
                updated_at: self.at,
            },
        }
    }
}
