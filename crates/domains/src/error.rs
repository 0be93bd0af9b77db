//! # DomainError
//!
//! Centralized error handling for the Agora core.
//! Every engine operation fails with one of these kinds; the API surface maps
//! them to transport statuses.

use thiserror::Error;
use uuid::Uuid;

/// The primary error type for all core operations.
#[derive(Error, Debug)]
pub enum DomainError {
    /// Malformed or missing input (e.g., non-UUID topic id, empty content)
    #[error("validation error: {0}")]
    Validation(String),

    /// Referenced entity absent (e.g., Debate, Participant, Comment)
    #[error("{entity} not found with ID {id}")]
    NotFound { entity: &'static str, id: String },

    /// Caller's role or participation state does not satisfy the gate
    #[error("permission denied: {0}")]
    Permission(String),

    /// The user already holds a participant row in this debate
    #[error("user {user_id} already participates in debate {debate_id}")]
    AlreadyParticipant { user_id: Uuid, debate_id: Uuid },

    /// Write attempted on a closed debate
    #[error("debate {0} is closed")]
    DebateClosed(Uuid),

    /// Role change to an unrecognized or forbidden value
    #[error("invalid role: {0}")]
    InvalidRole(String),

    /// Resource already exists (e.g., duplicate username or email)
    #[error("conflict: {0}")]
    Conflict(String),

    /// Infrastructure failure (e.g., DB down); driver details are not leaked
    #[error("internal service error: {0}")]
    Internal(String),
}

impl DomainError {
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        DomainError::NotFound { entity, id: id.to_string() }
    }
}

/// A specialized Result type for Agora logic.
pub type Result<T> = std::result::Result<T, DomainError>;

/// Failures reported by repository ports.
///
/// `Conflict` must be raised by the storage layer's uniqueness constraints so
/// callers can translate it into the matching domain error.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("unique constraint violated: {0}")]
    Conflict(String),

    #[error("{entity} {id} no longer exists")]
    NotFound { entity: &'static str, id: Uuid },

    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

pub type StorageResult<T> = std::result::Result<T, StorageError>;
