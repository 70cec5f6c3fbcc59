//! Fuzz target: session token hashing.
//!
//! Any presented cookie value, however malformed, must hash to a 64-char
//! hex digest without panicking.

#![no_main]

use libfuzzer_sys::fuzz_target;
use tutor_core::SessionToken;

fuzz_target!(|data: &[u8]| {
    let raw = String::from_utf8_lossy(data);
    let hex = SessionToken::from_raw(raw.as_ref()).hash().to_string();
    assert_eq!(hex.len(), 64, "SHA-256 hex must always be 64 chars");
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit()));
});
