//! Domain-specific error types following panic-free policy.

use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Room names must be a single non-empty word
    #[error("Invalid room name: {name:?}")]
    InvalidRoomName { name: String },

    /// Usernames must be a single non-empty word
    #[error("Invalid username: {name:?}")]
    InvalidUsername { name: String },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
