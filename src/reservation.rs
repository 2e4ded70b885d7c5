//! Reservation engine: business rules and the reservation state machine.
//!
//! ```text
//! Active --cancel--> Cancelled
//!   |  \--return--> Completed
//!    \---sweep----> Expired
//! ```
//!
//! Every function takes `&mut Catalog`, so one write guard held by the caller
//! spans the checks and the mutation. A book's availability flag is false
//! exactly while an active reservation references it; each transition below
//! flips the flag and the status together.

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use crate::error::{CatalogError, CatalogResult};
use crate::memory::Catalog;
use crate::store::{Book, Reservation, ReservationStatus};

/// Result of a successful return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnOutcome {
    /// The book after it was put back on the shelf.
    pub book: Book,
    /// The active reservation that held the book, now `Completed`.
    pub completed: Option<Reservation>,
}

/// Number of active reservations held by a user.
pub fn active_count(catalog: &Catalog, user_email: &str) -> usize {
    catalog
        .reservations()
        .iter()
        .filter(|r| r.is_active() && r.user_email == user_email)
        .count()
}

/// Reserve an available book for `days` days starting at `now`.
///
/// Checks run in order: book exists, book available, user below `limit`.
pub fn reserve(
    catalog: &mut Catalog,
    book_id: u64,
    user_email: &str,
    days: u32,
    limit: usize,
    now: DateTime<Utc>,
) -> CatalogResult<Reservation> {
    let book = catalog
        .book(book_id)
        .ok_or(CatalogError::BookNotFound(book_id))?;
    if !book.is_available {
        return Err(CatalogError::Unavailable(book_id));
    }
    if active_count(catalog, user_email) >= limit {
        return Err(CatalogError::LimitExceeded {
            user: user_email.to_string(),
            limit,
        });
    }

    let reservation = Reservation::active(
        catalog.next_reservation_id(),
        book_id,
        user_email,
        days,
        now,
    );
    catalog.push_reservation(reservation.clone());
    if let Some(book) = catalog.book_mut(book_id) {
        book.is_available = false;
    }

    info!(
        reservation_id = reservation.id,
        book_id,
        user = %user_email,
        days,
        "Book reserved"
    );
    Ok(reservation)
}

/// Cancel a reservation by id and remove it from the catalog.
///
/// No status precondition is enforced. The book is freed only when the
/// removed reservation was the active one holding it; a terminal record
/// does not own its book anymore.
pub fn cancel(catalog: &mut Catalog, reservation_id: u64) -> CatalogResult<Reservation> {
    let reservations = catalog.reservations_mut();
    let pos = reservations
        .iter()
        .position(|r| r.id == reservation_id)
        .ok_or(CatalogError::ReservationNotFound(reservation_id))?;
    let mut removed = reservations.remove(pos);

    if removed.is_active() {
        match catalog.book_mut(removed.book_id) {
            Some(book) => book.is_available = true,
            None => debug!(
                reservation_id,
                book_id = removed.book_id,
                "Cancelled reservation for a deleted book"
            ),
        }
        removed.status = ReservationStatus::Cancelled;
    } else {
        warn!(
            reservation_id,
            status = ?removed.status,
            "Removed reservation that was no longer active"
        );
    }

    info!(reservation_id, book_id = removed.book_id, "Reservation cancelled");
    Ok(removed)
}

/// Put a reserved book back on the shelf.
///
/// The active reservation holding the book, if any, moves to `Completed`.
pub fn return_book(
    catalog: &mut Catalog,
    book_id: u64,
    user_email: &str,
) -> CatalogResult<ReturnOutcome> {
    let book = catalog
        .book_mut(book_id)
        .ok_or(CatalogError::BookNotFound(book_id))?;
    if book.is_available {
        return Err(CatalogError::AlreadyAvailable(book_id));
    }
    book.is_available = true;
    let book = book.clone();

    let completed = catalog
        .reservations_mut()
        .iter_mut()
        .find(|r| r.is_active() && r.book_id == book_id)
        .map(|r| {
            r.status = ReservationStatus::Completed;
            r.clone()
        });

    if let Some(reservation) = &completed {
        if reservation.user_email != user_email {
            warn!(
                book_id,
                holder = %reservation.user_email,
                returned_by = %user_email,
                "Book returned by a different user than the holder"
            );
        }
    }

    info!(book_id, user = %user_email, "Book returned");
    Ok(ReturnOutcome { book, completed })
}

/// Expire every active reservation whose end lies strictly before `now`.
///
/// Returns copies of the reservations that changed, in insertion order.
/// Running it again with the same `now` changes nothing.
pub fn expire_due(catalog: &mut Catalog, now: DateTime<Utc>) -> Vec<Reservation> {
    let mut expired = Vec::new();
    for reservation in catalog.reservations_mut().iter_mut() {
        if reservation.is_overdue(now) {
            reservation.status = ReservationStatus::Expired;
            expired.push(reservation.clone());
        }
    }

    for reservation in &expired {
        info!(
            reservation_id = reservation.id,
            user = %reservation.user_email,
            "Reservation expired"
        );
        if let Some(book) = catalog.book_mut(reservation.book_id) {
            book.is_available = true;
        }
    }

    expired
}
