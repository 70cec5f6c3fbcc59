//! Progress gate: derives completion and lock state for the whole catalog.
//!
//! Lessons sharing a branch tag unlock one at a time in `order`; distinct
//! tags progress independently. A lesson is open when it is the first of its
//! branch or the lesson directly before it in the branch is completed. A
//! completed lesson behind an incomplete one is still reported locked; it
//! keeps `is_completed`.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::id::LessonId;
use crate::lesson::Lesson;

/// Completion and lock state of one lesson for one viewer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LessonProgress {
    pub lesson_id: LessonId,
    pub is_completed: bool,
    pub is_locked: bool,
}

/// Computes progress for every lesson in `catalog`.
///
/// The result is ordered by the lessons' ordering key ascending; lessons with
/// equal keys keep their relative catalog order.
///
/// # Complexity
/// O(n log n) for the stable sort, then a single pass.
#[must_use]
pub fn gate(catalog: &[Lesson], passed: &HashSet<LessonId>) -> Vec<LessonProgress> {
    let mut ordered: Vec<&Lesson> = catalog.iter().collect();
    ordered.sort_by_key(|lesson| lesson.order);

    let mut branch_unlocked: HashMap<&str, bool> = HashMap::new();
    let mut out = Vec::with_capacity(ordered.len());

    for lesson in ordered {
        let unlocked = branch_unlocked.entry(lesson.tag.as_str()).or_insert(true);
        let is_completed = passed.contains(&lesson.id);
        out.push(LessonProgress {
            lesson_id: lesson.id,
            is_completed,
            is_locked: !*unlocked,
        });
        *unlocked = is_completed;
    }

    out
}

/// Progress as seen by an unauthenticated visitor: nothing is completed, so
/// only the first lesson of each branch is unlocked.
#[must_use]
pub fn gate_for_guest(catalog: &[Lesson]) -> Vec<LessonProgress> {
    gate(catalog, &HashSet::new())
}
