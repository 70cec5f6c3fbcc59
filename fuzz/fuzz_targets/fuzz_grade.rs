//! Fuzz target: output grading.
//!
//! The first byte picks a split point; the halves are stdout and expected
//! output. Grading must never panic, an empty expected output never passes,
//! and a pass always means the trimmed strings are equal.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tutor_core::grade;

fuzz_target!(|data: &[u8]| {
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let split = usize::from(split).min(rest.len());
    let (stdout, expected) = rest.split_at(split);
    let stdout = String::from_utf8_lossy(stdout);
    let expected = String::from_utf8_lossy(expected);

    let passed = grade(&stdout, &expected).is_pass();
    if expected.trim().is_empty() {
        assert!(!passed, "an empty expected output must never pass");
    }
    if passed {
        assert_eq!(stdout.trim(), expected.trim());
    }
});
