//! Error types for the store crate.

/// Errors returned by repository operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum StoreError {
    /// A uniqueness constraint was violated (e.g. duplicate email).
    #[error("conflict: {0}")]
    Conflict(String),

    /// The record to update or reference does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A stored row could not be mapped back to a domain type.
    #[error("corrupt record: {0}")]
    Corrupt(String),

    /// The backing store failed (connection, timeout, query error).
    #[error("store backend error: {0}")]
    Backend(String),
}
