//! Fuzz target: registration body parsing and profile validation.
//!
//! Errors are expected; panics are not. An accepted email is already in
//! normal form.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tutor_core::{account::normalize_email, Profile};
use tutor_gateway::routes::RegisterBody;

fuzz_target!(|data: &[u8]| {
    let Ok(body) = serde_json::from_slice::<RegisterBody>(data) else {
        return;
    };
    if let Ok(profile) = Profile::parse(&body.name, &body.email) {
        assert_eq!(normalize_email(&profile.email).as_deref(), Ok(profile.email.as_str()));
        assert!(!profile.name.is_empty());
    }
});
