use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::id::AccountId;

/// Longest accepted display name, in characters.
pub const MAX_NAME_LEN: usize = 80;

/// Longest accepted email address, in bytes.
pub const MAX_EMAIL_LEN: usize = 254;

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

/// Authorisation role attached to an account.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// A learner. Every new account starts here.
    #[default]
    User,
    /// A curriculum administrator.
    Admin,
}

impl Role {
    /// Returns the lowercase wire name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "user" => Ok(Self::User),
            "admin" => Ok(Self::Admin),
            other => Err(CoreError::UnknownRole(other.to_owned())),
        }
    }
}

/// A registered account.
///
/// `email` is always stored in its normalised (trimmed, lowercased) form and
/// is unique across all accounts.
#[derive(Clone, PartialEq, Eq)]
pub struct Account {
    /// Unique identifier.
    pub id: AccountId,
    /// Display name.
    pub name: String,
    /// Normalised email address.
    pub email: String,
    /// PHC-format password hash.
    pub password_hash: String,
    /// Authorisation role.
    pub role: Role,
    /// Avatar file reference, if one was uploaded.
    pub avatar: Option<String>,
    /// When the account was registered.
    pub created_at: DateTime<Utc>,
}

impl Account {
    /// Builds a fresh `user`-role account from already validated fields.
    #[must_use]
    pub fn new(profile: Profile, password_hash: String, created_at: DateTime<Utc>) -> Self {
        Self {
            id: AccountId::new(),
            name: profile.name,
            email: profile.email,
            password_hash,
            role: Role::User,
            avatar: None,
            created_at,
        }
    }

    /// Whether the account may use administrative operations.
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("email", &self.email)
            .field("role", &self.role)
            .field("avatar", &self.avatar)
            .field("created_at", &self.created_at)
            .finish_non_exhaustive()
    }
}

/// A validated `(name, email)` pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Profile {
    /// Trimmed display name.
    pub name: String,
    /// Normalised email address.
    pub email: String,
}

impl Profile {
    /// Validates and normalises raw profile input.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidName`] or [`CoreError::InvalidEmail`].
    pub fn parse(name: &str, email: &str) -> Result<Self, CoreError> {
        Ok(Self { name: validate_name(name)?, email: normalize_email(email)? })
    }
}

/// Trims a display name and checks its length.
///
/// # Errors
/// Returns [`CoreError::InvalidName`] if the trimmed name is empty or longer
/// than [`MAX_NAME_LEN`] characters.
pub fn validate_name(raw: &str) -> Result<String, CoreError> {
    let name = raw.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(CoreError::InvalidName { max: MAX_NAME_LEN });
    }
    Ok(name.to_owned())
}

/// Case-folds and shape-checks an email address.
///
/// Accepts `local@domain` where neither part contains whitespace or a second
/// `@`, and the domain contains a dot that is neither its first nor its last
/// character.
///
/// # Errors
/// Returns [`CoreError::InvalidEmail`] if the address does not match.
pub fn normalize_email(raw: &str) -> Result<String, CoreError> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() || email.len() > MAX_EMAIL_LEN || email.chars().any(char::is_whitespace) {
        return Err(CoreError::InvalidEmail);
    }
    let (local, domain) = email.split_once('@').ok_or(CoreError::InvalidEmail)?;
    if local.is_empty() || domain.contains('@') {
        return Err(CoreError::InvalidEmail);
    }
    let has_inner_dot = domain
        .char_indices()
        .any(|(i, c)| c == '.' && i > 0 && i + 1 < domain.len());
    if !has_inner_dot {
        return Err(CoreError::InvalidEmail);
    }
    Ok(email)
}

/// Checks the minimum password length.
///
/// # Errors
/// Returns [`CoreError::PasswordTooShort`].
pub fn validate_password(password: &str) -> Result<(), CoreError> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}
