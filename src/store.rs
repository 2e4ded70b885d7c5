//! Catalog data model: books, authors, reservations and partial updates.
//!
//! Books reference authors by id, and reservations reference books by id.
//! No structural pointers exist between entities, so deleting a book leaves
//! any reservation that names it dangling (the engine tolerates that).

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, CatalogResult};

/// Default cap on simultaneous active reservations per user.
pub const MAX_ACTIVE_RESERVATIONS: usize = 3;

/// A catalog book.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Sequential id, starting at 1.
    pub id: u64,
    pub title: String,
    /// Id of the author in the same catalog.
    pub author_id: u64,
    pub year: i32,
    /// False exactly while an active reservation holds the book.
    pub is_available: bool,
}

/// A book author.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: u64,
    pub name: String,
    pub email: String,
    pub biography: String,
}

/// Lifecycle state of a reservation.
///
/// `Active` is the only non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationStatus {
    Active,
    Expired,
    Cancelled,
    Completed,
}

impl ReservationStatus {
    /// Returns true once the reservation can no longer change state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Active)
    }
}

/// A time-bounded hold on a book by a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub id: u64,
    pub book_id: u64,
    /// Free-form user identifier; not validated as a mailbox.
    pub user_email: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub status: ReservationStatus,
}

impl Reservation {
    /// Build an active reservation spanning `days` from `now`.
    ///
    /// A horizon beyond the representable range saturates at the latest
    /// representable instant.
    pub fn active(
        id: u64,
        book_id: u64,
        user_email: impl Into<String>,
        days: u32,
        now: DateTime<Utc>,
    ) -> Self {
        let end = now
            .checked_add_signed(Duration::days(i64::from(days)))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self {
            id,
            book_id,
            user_email: user_email.into(),
            start: now,
            end,
            status: ReservationStatus::Active,
        }
    }

    /// Returns true if the reservation currently holds its book.
    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// Returns true if the reservation is active and its end lies strictly
    /// before `now`.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        self.is_active() && self.end < now
    }
}

/// Partial update of a book. Unset fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookUpdate {
    pub title: Option<String>,
    pub author_id: Option<u64>,
    pub year: Option<i32>,
}

impl BookUpdate {
    /// Update only the title.
    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    /// Update only the author.
    pub fn author(author_id: u64) -> Self {
        Self {
            author_id: Some(author_id),
            ..Self::default()
        }
    }

    /// Update only the publication year.
    pub fn year(year: i32) -> Self {
        Self {
            year: Some(year),
            ..Self::default()
        }
    }

    /// Returns true if no field is set.
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.author_id.is_none() && self.year.is_none()
    }
}

/// Validate the shape of an update before touching the catalog.
///
/// Author existence is checked later, under the write lock.
pub fn validate_update(update: &BookUpdate) -> CatalogResult<()> {
    if update.is_empty() {
        return Err(CatalogError::Invalid(
            "no fields set for update".to_string(),
        ));
    }
    if let Some(year) = update.year {
        if year < 0 {
            return Err(CatalogError::Invalid(format!(
                "year cannot be negative: {}",
                year
            )));
        }
    }
    Ok(())
}
