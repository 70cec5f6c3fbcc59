/// Errors produced by the `tutor-core` crate.
///
/// Every variant is a local validation failure: nothing has been persisted
/// or executed when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum CoreError {
    /// A display name was empty or too long after trimming.
    #[error("invalid name: must be between 1 and {max} characters")]
    InvalidName { max: usize },

    /// An email address did not have the `local@domain.tld` shape.
    #[error("invalid email")]
    InvalidEmail,

    /// A password was shorter than the minimum length.
    #[error("password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    /// An identifier could not be parsed.
    #[error("invalid {kind} id: {reason}")]
    InvalidId { kind: &'static str, reason: String },

    /// A role string was not one of the known roles.
    #[error("unknown role '{0}'")]
    UnknownRole(String),

    /// A lesson field failed validation.
    #[error("lesson validation failed for field '{field}': {reason}")]
    LessonValidation { field: &'static str, reason: String },

    /// A profile photo was rejected.
    #[error("invalid photo: {0}")]
    InvalidAvatar(&'static str),
}
