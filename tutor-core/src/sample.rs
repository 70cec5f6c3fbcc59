//! Starter curriculum used to seed development stores.
//!
//! Two branches: `Basics` (three sequential lessons) and `Loops` (two).

use chrono::Utc;

use crate::lesson::{Lesson, LessonDraft};

fn draft(tag: &str, order: i64, title: &str, starter: &str, expected: &str) -> LessonDraft {
    LessonDraft {
        title: title.to_owned(),
        tag: Some(tag.to_owned()),
        description: format!("Print exactly:\n\n{expected}"),
        starter_code: starter.to_owned(),
        order,
        expected_output: expected.to_owned(),
    }
}

const MAIN_TEMPLATE: &str = "package main\n\nimport \"fmt\"\n\nfunc main() {\n\tfmt.Println(\"\")\n}\n";

/// Returns the sample lessons in catalog order.
#[must_use]
pub fn sample_catalog() -> Vec<Lesson> {
    let now = Utc::now();
    [
        draft("Basics", 1, "Hello, world", MAIN_TEMPLATE, "Hello, world!"),
        draft("Basics", 2, "Arithmetic", MAIN_TEMPLATE, "42"),
        draft("Basics", 3, "Strings", MAIN_TEMPLATE, "GOPHER"),
        draft("Loops", 4, "Count to three", MAIN_TEMPLATE, "1\n2\n3"),
        draft("Loops", 5, "Sum a slice", MAIN_TEMPLATE, "15"),
    ]
    .into_iter()
    .map(|d| d.into_lesson(now))
    .collect()
}
