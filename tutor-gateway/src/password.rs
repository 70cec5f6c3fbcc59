//! Argon2id password hashing.
//!
//! Hashes are PHC strings, so verification always uses the parameters a
//! hash was created with, whatever the current configuration is.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};

use crate::ApiError;

/// Password hasher with a pre-computed dummy hash for timing equalisation.
#[derive(Clone)]
pub struct Passwords {
    argon: Argon2<'static>,
    dummy_hash: String,
}

impl std::fmt::Debug for Passwords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Passwords").finish_non_exhaustive()
    }
}

impl Passwords {
    /// Hasher with the `argon2` crate's default Argon2id parameters.
    ///
    /// # Errors
    /// Returns [`ApiError::Internal`] if the dummy hash cannot be computed.
    pub fn new() -> Result<Self, ApiError> {
        Self::with_params(Params::default())
    }

    /// Cheap parameters for tests. Never use in production.
    ///
    /// # Errors
    /// Returns [`ApiError::Internal`] if the parameters are rejected.
    pub fn insecure_fast() -> Result<Self, ApiError> {
        let params = Params::new(1024, 1, 1, None)
            .map_err(|e| ApiError::Internal(format!("argon2 params: {e}")))?;
        Self::with_params(params)
    }

    fn with_params(params: Params) -> Result<Self, ApiError> {
        let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        let salt = SaltString::generate(&mut OsRng);
        let dummy_hash = argon
            .hash_password(b"tutor-dummy-password", &salt)
            .map_err(|e| ApiError::Internal(format!("argon2 hash: {e}")))?
            .to_string();
        Ok(Self { argon, dummy_hash })
    }

    /// Hash `password` with a fresh random salt.
    ///
    /// # Errors
    /// Returns [`ApiError::Internal`] if hashing fails.
    pub fn hash(&self, password: &str) -> Result<String, ApiError> {
        let salt = SaltString::generate(&mut OsRng);
        self.argon
            .hash_password(password.as_bytes(), &salt)
            .map(|h| h.to_string())
            .map_err(|e| ApiError::Internal(format!("argon2 hash: {e}")))
    }

    /// Whether `password` matches `hash`. A malformed stored hash never
    /// matches.
    #[must_use]
    pub fn verify(&self, password: &str, hash: &str) -> bool {
        match PasswordHash::new(hash) {
            Ok(parsed) => self.argon.verify_password(password.as_bytes(), &parsed).is_ok(),
            Err(e) => {
                tracing::warn!(error = %e, "stored password hash is malformed");
                false
            }
        }
    }

    /// Burn the same work as a real verification. Used when the account is
    /// unknown so response time does not reveal whether it exists.
    pub fn verify_dummy(&self, password: &str) {
        let _ = self.verify(password, &self.dummy_hash);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn passwords() -> Passwords {
        match Passwords::insecure_fast() {
            Ok(p) => p,
            Err(e) => panic!("hasher setup failed: {e}"),
        }
    }

    #[test]
    fn hash_then_verify() {
        let pw = passwords();
        let hash = match pw.hash("correct horse") {
            Ok(h) => h,
            Err(e) => panic!("hash failed: {e}"),
        };
        assert!(hash.starts_with("$argon2id$"));
        assert!(pw.verify("correct horse", &hash));
        assert!(!pw.verify("wrong horse", &hash));
    }

    #[test]
    fn salts_differ_per_hash() {
        let pw = passwords();
        assert_ne!(pw.hash("same").ok(), pw.hash("same").ok());
    }

    #[test]
    fn malformed_hash_never_matches() {
        assert!(!passwords().verify("anything", "not-a-phc-string"));
    }
}
