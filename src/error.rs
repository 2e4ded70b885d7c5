//! Error types for catalog operations.
//!
//! Business-rule violations are returned to the caller as typed results.
//! Dispatch errors (`QueueFull`, `QueueClosed`) are only ever logged by the
//! facade, since the mutation that produced the event has already committed.

use thiserror::Error;

/// Errors that can occur during catalog operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// No book with the given id.
    #[error("book not found: {0}")]
    BookNotFound(u64),

    /// No author with the given id.
    #[error("author not found: {0}")]
    AuthorNotFound(u64),

    /// No reservation with the given id.
    #[error("reservation not found: {0}")]
    ReservationNotFound(u64),

    /// Malformed update request (no fields set, negative year).
    #[error("invalid request: {0}")]
    Invalid(String),

    /// Book is held by an active reservation.
    #[error("book {0} is not available")]
    Unavailable(u64),

    /// Book was returned while already on the shelf.
    #[error("book {0} is already available")]
    AlreadyAvailable(u64),

    /// User already holds the maximum number of active reservations.
    #[error("user {user} reached the limit of {limit} active reservations")]
    LimitExceeded { user: String, limit: usize },

    /// Worker queue at capacity; the job was dropped.
    #[error("{0} queue is full")]
    QueueFull(&'static str),

    /// Worker queue already shut down; the job was dropped.
    #[error("{0} queue is closed")]
    QueueClosed(&'static str),

    /// Shared resources could not be acquired while building the library.
    #[error("startup failed: {0}")]
    Startup(String),
}

/// Result type alias for catalog operations.
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Returns true if a referenced book, author or reservation is unknown.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            CatalogError::BookNotFound(_)
                | CatalogError::AuthorNotFound(_)
                | CatalogError::ReservationNotFound(_)
        )
    }

    /// Returns true if this error came from a worker queue rather than a
    /// business rule.
    pub fn is_dispatch(&self) -> bool {
        matches!(
            self,
            CatalogError::QueueFull(_) | CatalogError::QueueClosed(_)
        )
    }
}
