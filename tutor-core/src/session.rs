//! Opaque session tokens and the persisted session record.
//!
//! The raw token is handed to the client exactly once; the server keeps only
//! its [`TokenHash`].

use std::fmt;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use chrono::{DateTime, Duration, Utc};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::id::{AccountId, TokenHash};

/// Number of random bytes in a token (256 bits of entropy).
pub const TOKEN_BYTES: usize = 32;

/// A raw session token as presented by a client.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    /// Draws a new token from the operating system CSPRNG.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self(URL_SAFE_NO_PAD.encode(bytes))
    }

    /// Wraps a token received from a client. No validation is done here:
    /// an unknown token simply has no matching hash.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the encoded token.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// One-way hash used for storage and lookup.
    #[must_use]
    pub fn hash(&self) -> TokenHash {
        TokenHash::of(&self.0)
    }
}

impl fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// A persisted login session. Sessions are never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Hash of the token the client holds.
    pub token_hash: TokenHash,
    /// Owner of the session.
    pub account_id: AccountId,
    /// Absolute expiry instant.
    pub expires_at: DateTime<Utc>,
    /// When the session was issued.
    pub created_at: DateTime<Utc>,
}

impl Session {
    /// Issues a new session for `account_id` that expires `ttl` after `now`.
    ///
    /// Returns the raw token alongside the record to persist.
    #[must_use]
    pub fn issue(account_id: AccountId, now: DateTime<Utc>, ttl: Duration) -> (SessionToken, Self) {
        let token = SessionToken::generate();
        let session = Self {
            token_hash: token.hash(),
            account_id,
            expires_at: now + ttl,
            created_at: now,
        };
        (token, session)
    }

    /// A session is valid strictly before its expiry instant.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}
