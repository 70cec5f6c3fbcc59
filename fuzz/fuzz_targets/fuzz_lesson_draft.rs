//! Fuzz target: admin lesson drafts.
//!
//! A draft that normalises always has a non-empty title and branch tag.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tutor_core::LessonDraft;

fuzz_target!(|data: &[u8]| {
    let Ok(draft) = serde_json::from_slice::<LessonDraft>(data) else {
        return;
    };
    if let Ok(draft) = draft.normalize() {
        assert!(!draft.title.is_empty());
        assert!(draft.tag.as_deref().is_some_and(|t| !t.trim().is_empty()));
    }
});
