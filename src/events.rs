//! Notification events produced by reservation-affecting transitions.
//!
//! Events are ephemeral: built after the catalog lock is released, handed to
//! the notification pool once, and never persisted or retried.

use serde::{Deserialize, Serialize};

use crate::store::Reservation;

/// Transition that produced a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A held book went back on the shelf.
    Returned,
    /// The sweeper expired a reservation.
    Expired,
}

/// An email-shaped notification for a user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailNotification {
    /// Recipient (the reservation's user identifier).
    pub to: String,
    pub subject: String,
    pub message: String,
    pub kind: NotificationKind,
}

impl EmailNotification {
    /// Notification that a book was returned to the library.
    pub fn returned(to: impl Into<String>, book_title: &str) -> Self {
        Self {
            to: to.into(),
            subject: "Book returned".to_string(),
            message: format!("Book \"{}\" was returned to the library", book_title),
            kind: NotificationKind::Returned,
        }
    }

    /// Notification that a reservation ran past its end and was released.
    pub fn expired(reservation: &Reservation) -> Self {
        Self {
            to: reservation.user_email.clone(),
            subject: "Reservation expired".to_string(),
            message: format!(
                "Your reservation #{} was cancelled automatically because it expired",
                reservation.id
            ),
            kind: NotificationKind::Expired,
        }
    }
}
