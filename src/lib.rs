//! # catalog-state
//!
//! Concurrent in-process catalog of books, authors and time-bounded
//! reservations, with asynchronous notification dispatch.
//!
//! - **Single-lock aggregate**: one reader/writer lock guards books,
//!   authors, reservations and id counters together
//! - **Reservation state machine**: `active` moves to `cancelled`,
//!   `completed` or `expired`, never back
//! - **Expiration sweeper**: periodic task that releases overdue holds
//! - **Bounded worker pools**: drop-on-full queues for notifications and
//!   reservation processing, drained on shutdown
//!
//! Callers outside the crate only ever receive copies of catalog entities.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use catalog_state::{Library, LibraryConfig};
//!
//! #[tokio::main]
//! async fn main() -> catalog_state::CatalogResult<()> {
//!     let library = Library::new(LibraryConfig::default())?;
//!
//!     let author = library.add_author("Leo Tolstoy", "leo@example.com", "Novelist");
//!     let book = library.add_book("War and Peace", author, 1869)?;
//!
//!     let reservation = library.reserve_book(book, "reader@example.com", 7)?;
//!     println!("Reserved until {}", reservation.end);
//!
//!     library.start_expiration_checker();
//!     library.cancel_reservation(reservation.id)?;
//!
//!     library.shutdown().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Errors
//!
//! ```rust,no_run
//! use catalog_state::{CatalogError, Library};
//!
//! #[tokio::main]
//! async fn main() -> catalog_state::CatalogResult<()> {
//!     let library = Library::with_defaults()?;
//!     let author = library.add_author("Anton Chekhov", "anton@example.com", "");
//!     let book = library.add_book("The Seagull", author, 1896)?;
//!
//!     library.reserve_book(book, "first@example.com", 3)?;
//!     match library.reserve_book(book, "second@example.com", 3) {
//!         Err(CatalogError::Unavailable(id)) => println!("book {} is taken", id),
//!         other => println!("unexpected: {:?}", other),
//!     }
//!
//!     library.shutdown().await;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod dispatch;
pub mod error;
pub mod events;
pub mod library;
pub mod memory;
pub mod reservation;
pub mod store;
pub mod sweeper;

// Re-export main types
pub use config::{LibraryConfig, PoolConfig};
pub use dispatch::{DispatchSnapshot, Job, WorkerPool};
pub use error::{CatalogError, CatalogResult};
pub use events::{EmailNotification, NotificationKind};
pub use library::Library;
pub use memory::{Catalog, CatalogStore};
pub use store::{Author, Book, BookUpdate, Reservation, ReservationStatus, MAX_ACTIVE_RESERVATIONS};
pub use sweeper::ExpirationSweeper;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::config::LibraryConfig;
    pub use crate::error::{CatalogError, CatalogResult};
    pub use crate::library::Library;
    pub use crate::store::{Author, Book, BookUpdate, Reservation, ReservationStatus};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_library_basic() {
        let library = Library::with_defaults().unwrap();

        let author = library.add_author("A", "a@x", "bio");
        let book = library.add_book("T", author, 2000).unwrap();
        library.reserve_book(book, "u@x", 7).unwrap();

        assert!(!library.find_book(book).unwrap().is_available);
        library.shutdown().await;
    }

    #[test]
    fn test_types_are_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}

        assert_send_sync::<Library>();
        assert_send_sync::<CatalogStore>();
        assert_send_sync::<WorkerPool<EmailNotification>>();
    }
}
