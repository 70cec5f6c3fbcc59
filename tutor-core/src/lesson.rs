use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::LessonId;

/// Branch tag assigned to lessons that do not name one.
pub const DEFAULT_BRANCH: &str = "General";

/// A lesson (task) in the curriculum.
///
/// `expected_output` is the grading oracle: a run passes when its trimmed
/// stdout equals the trimmed expected output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lesson {
    /// Unique identifier.
    pub id: LessonId,
    /// Short human-readable title.
    pub title: String,
    /// Branch tag controlling sequential unlock order.
    pub tag: String,
    /// Lesson body shown to the learner.
    pub description: String,
    /// Code pre-filled in the editor.
    pub starter_code: String,
    /// Ordering key; lower values come first.
    pub order: i64,
    /// Exact-match grading oracle.
    pub expected_output: String,
    /// When the lesson was created.
    pub created_at: DateTime<Utc>,
}

/// Administrator input for creating or replacing a lesson.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LessonDraft {
    pub title: String,
    pub tag: Option<String>,
    pub description: String,
    pub starter_code: String,
    pub order: i64,
    pub expected_output: String,
}

impl LessonDraft {
    /// Validates the draft and fills in the default branch tag.
    ///
    /// # Errors
    /// Returns [`CoreError::LessonValidation`] if the title is blank.
    pub fn normalize(mut self) -> Result<Self, CoreError> {
        self.title = self.title.trim().to_owned();
        if self.title.is_empty() {
            return Err(CoreError::LessonValidation {
                field: "title",
                reason: "must not be empty".to_owned(),
            });
        }
        self.tag = Some(branch_or_default(self.tag.as_deref()).to_owned());
        Ok(self)
    }

    /// Builds a lesson with a fresh identifier.
    #[must_use]
    pub fn into_lesson(self, created_at: DateTime<Utc>) -> Lesson {
        self.into_lesson_with_id(LessonId::new(), created_at)
    }

    /// Builds a lesson keeping an existing identifier and creation time.
    #[must_use]
    pub fn into_lesson_with_id(self, id: LessonId, created_at: DateTime<Utc>) -> Lesson {
        Lesson {
            id,
            title: self.title,
            tag: branch_or_default(self.tag.as_deref()).to_owned(),
            description: self.description,
            starter_code: self.starter_code,
            order: self.order,
            expected_output: self.expected_output,
            created_at,
        }
    }
}

/// Returns the trimmed tag, or [`DEFAULT_BRANCH`] when it is absent or blank.
#[must_use]
pub fn branch_or_default(tag: Option<&str>) -> &str {
    match tag.map(str::trim) {
        Some(t) if !t.is_empty() => t,
        _ => DEFAULT_BRANCH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_blank_tag_falls_back_to_general() {
        assert_eq!(branch_or_default(None), DEFAULT_BRANCH);
        assert_eq!(branch_or_default(Some("  ")), DEFAULT_BRANCH);
        assert_eq!(branch_or_default(Some(" Loops ")), "Loops");
    }

    #[test]
    fn normalize_rejects_blank_title() {
        let draft = LessonDraft { title: "   ".to_owned(), ..LessonDraft::default() };
        assert!(matches!(
            draft.normalize(),
            Err(CoreError::LessonValidation { field: "title", .. })
        ));
    }

    #[test]
    fn draft_deserializes_from_camel_case_with_defaults() {
        let json = r#"{"title":"Hello","expectedOutput":"Hello, world!","order":3}"#;
        let draft: LessonDraft = match serde_json::from_str(json) {
            Ok(d) => d,
            Err(e) => panic!("invalid draft JSON: {e}"),
        };
        let lesson = draft.into_lesson(Utc::now());
        assert_eq!(lesson.tag, DEFAULT_BRANCH);
        assert_eq!(lesson.order, 3);
        assert_eq!(lesson.expected_output, "Hello, world!");
        assert!(lesson.starter_code.is_empty());
    }
}
