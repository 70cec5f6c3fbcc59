//! Output grading oracle.
//!
//! Comparison trims leading and trailing whitespace only. Internal
//! whitespace and line endings are compared verbatim; lesson authors rely on
//! that.

use serde::Serialize;

/// Outcome of comparing a run's stdout against a lesson's expected output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Passed,
    Failed,
}

impl Verdict {
    #[must_use]
    pub fn is_pass(self) -> bool {
        self == Self::Passed
    }
}

/// Grades captured stdout against the expected output.
///
/// An empty expected output never passes, so an unconfigured lesson cannot
/// be completed by printing nothing.
#[must_use]
pub fn grade(stdout: &str, expected_output: &str) -> Verdict {
    let expected = expected_output.trim();
    let actual = stdout.trim();
    if !expected.is_empty() && actual == expected {
        Verdict::Passed
    } else {
        Verdict::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(grade("Hello, world!\n", "  Hello, world!"), Verdict::Passed);
        assert_eq!(grade("\r\n42\r\n", "42"), Verdict::Passed);
    }

    #[test]
    fn internal_whitespace_is_significant() {
        assert_eq!(grade("a  b", "a b"), Verdict::Failed);
        assert_eq!(grade("1\r\n2", "1\n2"), Verdict::Failed);
    }

    #[test]
    fn empty_expected_never_passes() {
        assert_eq!(grade("", ""), Verdict::Failed);
        assert_eq!(grade("   \n", "\t"), Verdict::Failed);
        assert_eq!(grade("anything", ""), Verdict::Failed);
    }

    proptest::proptest! {
        #[test]
        fn proptest_empty_expected_is_always_failed(stdout in ".*") {
            proptest::prop_assert_eq!(grade(&stdout, ""), Verdict::Failed);
        }

        #[test]
        fn proptest_padding_does_not_change_verdict(
            body in "[a-zA-Z0-9][a-zA-Z0-9 ,.!]{0,40}[a-zA-Z0-9!]",
            left in "[ \t\n\r]{0,4}",
            right in "[ \t\n\r]{0,4}",
        ) {
            let padded = format!("{left}{body}{right}");
            proptest::prop_assert_eq!(grade(&padded, &body), Verdict::Passed);
            proptest::prop_assert_eq!(grade(&body, &padded), Verdict::Passed);
        }
    }
}
