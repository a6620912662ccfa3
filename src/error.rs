//! Error types for quiesce.
//!
//! All errors are strongly typed using thiserror. This enables pattern
//! matching on specific error conditions and provides clear error messages.

use thiserror::Error;

use crate::mux::GroupId;

/// Validation errors raised before any registry state is touched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The debounce timeout was zero.
    #[error("Debounce timeout must be greater than zero")]
    ZeroTimeout,

    /// The event name was empty or whitespace-only.
    #[error("Event name cannot be empty")]
    EmptyEventName,
}

/// Top-level error type for quiesce.
///
/// This enum encompasses all possible errors that can occur when
/// attaching to or detaching from a debounce group.
#[derive(Debug, Error)]
pub enum QuiesceError {
    /// No live group exists with the given id. Raised by joins targeting an
    /// unknown key and by detaches of absent (including already-detached) ids.
    #[error("Event group not registered: {id}")]
    UnknownGroup {
        /// The offending id.
        id: GroupId,
    },

    /// Input validation failed.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Internal error.
    #[error("Internal error: {message}")]
    Internal {
        /// Description of the failure.
        message: String,
    },
}

impl QuiesceError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns true if this is an unknown-group error.
    #[must_use]
    pub const fn is_unknown_group(&self) -> bool {
        matches!(self, Self::UnknownGroup { .. })
    }

    /// Returns true if this is a validation error.
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Returns true if this is an internal error.
    #[must_use]
    pub const fn is_internal(&self) -> bool {
        matches!(self, Self::Internal { .. })
    }
}

/// Result type alias for quiesce operations.
pub type QuiesceResult<T> = Result<T, QuiesceError>;
