//! Core types for the tutor learning platform backend.
//!
//! Defines accounts, sessions, lessons and submissions, plus the two pure
//! decision procedures the rest of the system builds on: the output
//! [`grading`] oracle and the branch-sequential [`progress`] gate.

#![warn(clippy::pedantic)]
#![deny(clippy::unwrap_used)]

pub mod account;
pub mod avatar;
pub mod clock;
pub mod error;
pub mod grading;
pub mod id;
pub mod lesson;
pub mod progress;
pub mod sample;
pub mod session;
pub mod submission;

pub use account::{Account, Profile, Role};
pub use avatar::{AvatarFormat, MAX_AVATAR_BYTES};
pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CoreError;
pub use grading::{grade, Verdict};
pub use id::{AccountId, LessonId, TokenHash};
pub use lesson::{Lesson, LessonDraft, DEFAULT_BRANCH};
pub use progress::{gate, gate_for_guest, LessonProgress};
pub use session::{Session, SessionToken};
pub use submission::{Submission, SubmissionUpsert};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sample::sample_catalog;

    #[test]
    fn token_hash_display_shows_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xde;
        bytes[1] = 0xad;
        bytes[31] = 0xff;
        let hash = TokenHash(bytes);
        let s = hash.to_string();
        assert!(s.starts_with("dead"), "expected hex starting with 'dead', got {s}");
        assert!(s.ends_with("ff"), "expected hex ending with 'ff', got {s}");
        assert_eq!(s.len(), 64, "SHA-256 hex must be 64 chars");
    }

    #[test]
    fn token_hash_of_empty_is_sha256_of_empty() {
        assert_eq!(
            TokenHash::of("").to_string(),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn token_hash_try_from_rejects_wrong_length() {
        assert!(TokenHash::try_from(&[0u8; 31][..]).is_err());
        assert!(TokenHash::try_from(&[0u8; 32][..]).is_ok());
    }

    #[test]
    fn lesson_id_parses_from_string() {
        let id = LessonId::new();
        assert_eq!(id.to_string().parse::<LessonId>(), Ok(id));
        assert!("not-a-uuid".parse::<LessonId>().is_err());
    }

    #[test]
    fn sample_catalog_is_ordered_and_gated() {
        let catalog = sample_catalog();
        assert_eq!(catalog.len(), 5);
        assert!(catalog.windows(2).all(|w| w[0].order < w[1].order));
        assert!(catalog.iter().all(|l| !l.expected_output.is_empty()));

        let locks: Vec<bool> = gate_for_guest(&catalog).iter().map(|p| p.is_locked).collect();
        assert_eq!(locks, [false, true, true, false, true]);
    }
}
