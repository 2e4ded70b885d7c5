//! Library facade: the single entry point for the transport layer.
//!
//! Every business operation follows the same shape: take the catalog lock,
//! run the engine, release the lock, then hand any side effect to a worker
//! pool without blocking. A dropped side effect never undoes the mutation.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::LibraryConfig;
use crate::dispatch::{DispatchSnapshot, WorkerPool};
use crate::error::{CatalogError, CatalogResult};
use crate::events::EmailNotification;
use crate::memory::CatalogStore;
use crate::reservation;
use crate::store::{Author, Book, BookUpdate, Reservation};
use crate::sweeper::{self, ExpirationSweeper};

/// Name of the notification-email pool.
pub const NOTIFICATION_POOL: &str = "notifications";

/// Name of the reservation-processing pool.
pub const RESERVATION_POOL: &str = "reservations";

/// The catalog service.
///
/// Safe to share across threads (`Arc<Library>`); all operations except
/// [`Library::shutdown`] are synchronous.
pub struct Library {
    config: LibraryConfig,
    store: CatalogStore,
    notifications: Arc<WorkerPool<EmailNotification>>,
    reservations: WorkerPool<Reservation>,
    sweeper: Mutex<Option<ExpirationSweeper>>,
    runtime: Handle,
}

impl Library {
    /// Build a library and start both worker pools on the current tokio
    /// runtime.
    ///
    /// Fails with [`CatalogError::Startup`] outside a runtime or when the
    /// configuration cannot produce working pools.
    pub fn new(config: LibraryConfig) -> CatalogResult<Self> {
        let runtime = Handle::try_current()
            .map_err(|e| CatalogError::Startup(format!("no tokio runtime: {}", e)))?;

        if config.sweep_interval.is_zero() {
            return Err(CatalogError::Startup(
                "sweep interval must be above zero".to_string(),
            ));
        }

        let notifications = Arc::new(WorkerPool::spawn(
            NOTIFICATION_POOL,
            &config.notifications,
            &runtime,
        )?);
        let reservations = WorkerPool::spawn(RESERVATION_POOL, &config.reservations, &runtime)?;

        info!(
            max_active_reservations = config.max_active_reservations,
            sweep_interval_secs = config.sweep_interval.as_secs(),
            "Library ready"
        );

        Ok(Self {
            config,
            store: CatalogStore::new(),
            notifications,
            reservations,
            sweeper: Mutex::new(None),
            runtime,
        })
    }

    /// Build a library with [`LibraryConfig::default`].
    pub fn with_defaults() -> CatalogResult<Self> {
        Self::new(LibraryConfig::default())
    }

    pub fn config(&self) -> &LibraryConfig {
        &self.config
    }

    // Authors and books

    pub fn add_author(&self, name: &str, email: &str, biography: &str) -> u64 {
        self.store.add_author(name, email, biography)
    }

    /// Add a book by an existing author. Returns the new book id.
    pub fn add_book(&self, title: &str, author_id: u64, year: i32) -> CatalogResult<u64> {
        self.store.add_book(title, author_id, year)
    }

    pub fn find_book(&self, id: u64) -> Option<Book> {
        self.store.find_book(id)
    }

    pub fn find_author(&self, id: u64) -> Option<Author> {
        self.store.find_author(id)
    }

    pub fn update_book(&self, id: u64, update: BookUpdate) -> CatalogResult<Book> {
        self.store.update_book(id, update)
    }

    pub fn delete_book(&self, id: u64) -> CatalogResult<Book> {
        self.store.delete_book(id)
    }

    pub fn books(&self) -> Vec<Book> {
        self.store.books()
    }

    pub fn authors(&self) -> Vec<Author> {
        self.store.authors()
    }

    pub fn books_by_author(&self, author_id: u64) -> Vec<Book> {
        self.store.books_by_author(author_id)
    }

    /// Case-sensitive title substring search.
    pub fn search_books(&self, query: &str) -> Vec<Book> {
        self.store.search_books(query)
    }

    /// Case-insensitive title substring and/or exact year.
    pub fn advanced_search_books(&self, title: Option<&str>, year: Option<i32>) -> Vec<Book> {
        self.store.advanced_search(title, year)
    }

    // Reservations

    /// Reserve an available book for `days` days.
    ///
    /// The reservation is committed before the processing job is enqueued;
    /// a full queue only drops the job.
    pub fn reserve_book(&self, book_id: u64, user_email: &str, days: u32) -> CatalogResult<Reservation> {
        let reservation = {
            let mut catalog = self.store.write();
            reservation::reserve(
                &mut catalog,
                book_id,
                user_email,
                days,
                self.config.max_active_reservations,
                Utc::now(),
            )?
        };

        if let Err(err) = self.reservations.dispatch(reservation.clone()) {
            debug!(reservation_id = reservation.id, error = %err, "Reservation job not queued");
        }
        Ok(reservation)
    }

    /// Return a reserved book and notify the user.
    pub fn return_book(&self, book_id: u64, user_email: &str) -> CatalogResult<()> {
        let outcome = {
            let mut catalog = self.store.write();
            reservation::return_book(&mut catalog, book_id, user_email)?
        };

        let notification = EmailNotification::returned(user_email, &outcome.book.title);
        if let Err(err) = self.notifications.dispatch(notification) {
            debug!(book_id, error = %err, "Return notification not queued");
        }
        Ok(())
    }

    /// Cancel a reservation by id. Returns the removed record.
    pub fn cancel_reservation(&self, reservation_id: u64) -> CatalogResult<Reservation> {
        let mut catalog = self.store.write();
        reservation::cancel(&mut catalog, reservation_id)
    }

    /// Every reservation a user holds, in any status. Empty if none.
    pub fn user_reservations(&self, user_email: &str) -> Vec<Reservation> {
        self.store.user_reservations(user_email)
    }

    pub fn reservation(&self, id: u64) -> Option<Reservation> {
        self.store.reservation(id)
    }

    /// Number of reservations a user currently holds in `active` status.
    pub fn active_reservation_count(&self, user_email: &str) -> usize {
        reservation::active_count(&self.store.read(), user_email)
    }

    // Expiration

    /// Run one sweep now. Returns the number of expired reservations.
    pub fn expire_reservations(&self) -> usize {
        self.expire_reservations_at(Utc::now())
    }

    /// Run one sweep as if the current time were `now`.
    pub fn expire_reservations_at(&self, now: DateTime<Utc>) -> usize {
        sweeper::sweep(&self.store, &self.notifications, now)
    }

    /// Start the periodic expiration checker.
    ///
    /// Returns false if it is already running or the library has been shut
    /// down.
    pub fn start_expiration_checker(&self) -> bool {
        if !self.notifications.is_open() {
            warn!("Library is shut down, expiration checker not started");
            return false;
        }

        let mut slot = self.sweeper.lock();
        if slot.is_some() {
            warn!("Expiration checker already running");
            return false;
        }

        *slot = Some(ExpirationSweeper::start(
            self.store.clone(),
            self.notifications.clone(),
            self.config.sweep_interval,
            &self.runtime,
        ));
        info!("Expiration checker started");
        true
    }

    /// Returns true while the periodic checker is running.
    pub fn is_expiration_checker_running(&self) -> bool {
        self.sweeper.lock().is_some()
    }

    /// Stop the expiration checker, then drain and join both worker pools.
    ///
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let sweeper = self.sweeper.lock().take();
        if let Some(sweeper) = sweeper {
            sweeper.stop().await;
        }

        self.notifications.shutdown().await;
        self.reservations.shutdown().await;
        info!("Library shut down");
    }

    // Observability

    pub fn notification_stats(&self) -> DispatchSnapshot {
        self.notifications.stats()
    }

    pub fn reservation_stats(&self) -> DispatchSnapshot {
        self.reservations.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PoolConfig;
    use crate::store::ReservationStatus;
    use std::sync::Barrier;
    use std::thread;
    use std::time::Duration;

    fn quick_config() -> LibraryConfig {
        let pool = PoolConfig {
            capacity: 100,
            workers: 3,
            processing_delay: Duration::from_millis(1),
        };
        LibraryConfig {
            sweep_interval: Duration::from_millis(20),
            max_active_reservations: 3,
            notifications: pool.clone(),
            reservations: pool,
        }
    }

    /// Library with one author and `books` books.
    fn library_with_books(books: usize) -> Library {
        let library = Library::new(quick_config()).unwrap();
        let author = library.add_author("A", "a@x", "bio");
        for i in 0..books {
            library
                .add_book(&format!("Book {}", i + 1), author, 2000)
                .unwrap();
        }
        library
    }

    /// Availability flag agrees with active reservations for every book.
    fn assert_invariant(library: &Library) {
        let reservations = library.store.reservations();
        for book in library.books() {
            let held = reservations
                .iter()
                .any(|r| r.is_active() && r.book_id == book.id);
            assert_eq!(book.is_available, !held, "book {}", book.id);
        }
    }

    #[test]
    fn test_new_requires_runtime() {
        let result = Library::with_defaults();
        assert!(matches!(result, Err(CatalogError::Startup(_))));
    }

    #[tokio::test]
    async fn test_new_rejects_zero_workers() {
        let mut config = LibraryConfig::default();
        config.reservations.workers = 0;
        assert!(matches!(Library::new(config), Err(CatalogError::Startup(_))));

        let mut config = LibraryConfig::default();
        config.sweep_interval = Duration::ZERO;
        assert!(matches!(Library::new(config), Err(CatalogError::Startup(_))));
    }

    #[tokio::test]
    async fn test_round_trip() {
        let library = Library::new(quick_config()).unwrap();

        let author = library.add_author("A", "a@x", "bio");
        assert_eq!(author, 1);
        assert!(library.add_book("T", 1, 2000).is_ok());
        assert!(library.find_book(1).unwrap().is_available);

        let reservation = library.reserve_book(1, "u@x", 7).unwrap();
        assert!(!library.find_book(1).unwrap().is_available);

        library.cancel_reservation(reservation.id).unwrap();
        assert!(library.find_book(1).unwrap().is_available);
        assert_invariant(&library);

        library.shutdown().await;
        assert_eq!(library.reservation_stats().processed, 1);
    }

    #[tokio::test]
    async fn test_add_book_unknown_author() {
        let library = Library::new(quick_config()).unwrap();
        assert!(library.add_book("T", 1, 2000).is_err());
        library.shutdown().await;
    }

    #[tokio::test]
    async fn test_cancel_unknown_reservation() {
        let library = library_with_books(1);
        library.reserve_book(1, "u@x", 7).unwrap();
        let before = library.user_reservations("u@x");

        let result = library.cancel_reservation(42);

        assert_eq!(result, Err(CatalogError::ReservationNotFound(42)));
        assert_eq!(library.user_reservations("u@x"), before);
        assert!(!library.find_book(1).unwrap().is_available);
        library.shutdown().await;
    }

    #[tokio::test]
    async fn test_return_notifies_and_completes() {
        let library = library_with_books(1);
        let reservation = library.reserve_book(1, "u@x", 7).unwrap();

        library.return_book(1, "u@x").unwrap();

        assert!(library.find_book(1).unwrap().is_available);
        assert_eq!(
            library.reservation(reservation.id).unwrap().status,
            ReservationStatus::Completed
        );
        assert_eq!(
            library.return_book(1, "u@x"),
            Err(CatalogError::AlreadyAvailable(1))
        );
        assert_eq!(library.notification_stats().attempted, 1);
        assert_invariant(&library);
        library.shutdown().await;
    }

    #[tokio::test]
    async fn test_user_reservations_are_copies() {
        let library = library_with_books(2);
        assert!(library.user_reservations("u@x").is_empty());

        library.reserve_book(1, "u@x", 7).unwrap();
        library.reserve_book(2, "v@x", 7).unwrap();

        let mut mine = library.user_reservations("u@x");
        assert_eq!(mine.len(), 1);
        mine[0].status = ReservationStatus::Cancelled;
        assert_eq!(
            library.user_reservations("u@x")[0].status,
            ReservationStatus::Active
        );
        library.shutdown().await;
    }

    #[tokio::test]
    async fn test_expiration_scenario() {
        let library = library_with_books(1);
        let reservation = library.reserve_book(1, "u@x", 7).unwrap();

        let expired = library.expire_reservations_at(reservation.end + chrono::Duration::seconds(1));

        assert_eq!(expired, 1);
        assert_eq!(
            library.reservation(reservation.id).unwrap().status,
            ReservationStatus::Expired
        );
        assert!(library.find_book(1).unwrap().is_available);
        assert_eq!(library.notification_stats().attempted, 1);

        // Sweep is idempotent.
        let books_before = library.books();
        assert_eq!(library.expire_reservations_at(reservation.end + chrono::Duration::days(1)), 0);
        assert_eq!(library.books(), books_before);
        assert_eq!(library.notification_stats().attempted, 1);

        library.shutdown().await;
        assert_eq!(library.notification_stats().processed, 1);
    }

    #[tokio::test]
    async fn test_expire_reservations_now() {
        let library = library_with_books(2);
        library.reserve_book(1, "u@x", 0).unwrap();
        library.reserve_book(2, "u@x", 7).unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(library.expire_reservations(), 1);
        assert!(library.find_book(1).unwrap().is_available);
        assert!(!library.find_book(2).unwrap().is_available);
        assert_eq!(library.active_reservation_count("u@x"), 1);
        library.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserve_single_winner() {
        let library = Arc::new(library_with_books(1));
        let contenders = 16;
        let barrier = Arc::new(Barrier::new(contenders));

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (0..contenders)
                .map(|n| {
                    let library = library.clone();
                    let barrier = barrier.clone();
                    scope.spawn(move || {
                        barrier.wait();
                        library.reserve_book(1, &format!("user{}@x", n), 7)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        let winners = results.iter().filter(|r| r.is_ok()).count();
        assert_eq!(winners, 1);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| *e == CatalogError::Unavailable(1)));
        assert_invariant(&library);
        library.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reserve_respects_user_cap() {
        let library = Arc::new(library_with_books(8));
        let barrier = Arc::new(Barrier::new(8));

        let results: Vec<_> = thread::scope(|scope| {
            let handles: Vec<_> = (1..=8u64)
                .map(|book_id| {
                    let library = library.clone();
                    let barrier = barrier.clone();
                    scope.spawn(move || {
                        barrier.wait();
                        library.reserve_book(book_id, "same@x", 7)
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 3);
        assert!(results
            .iter()
            .filter_map(|r| r.as_ref().err())
            .all(|e| matches!(e, CatalogError::LimitExceeded { limit: 3, .. })));
        assert_eq!(library.active_reservation_count("same@x"), 3);
        assert_invariant(&library);
        library.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_mixed_operations_keep_invariant() {
        let library = Arc::new(library_with_books(6));

        thread::scope(|scope| {
            for worker in 0..6u64 {
                let library = library.clone();
                scope.spawn(move || {
                    let user = format!("user{}@x", worker % 3);
                    for round in 0..50u64 {
                        let book_id = (worker + round) % 6 + 1;
                        match round % 4 {
                            0 | 1 => {
                                let _ = library.reserve_book(book_id, &user, 1);
                            }
                            2 => {
                                let _ = library.return_book(book_id, &user);
                            }
                            _ => {
                                if let Some(r) = library.user_reservations(&user).first() {
                                    let _ = library.cancel_reservation(r.id);
                                }
                            }
                        }
                    }
                });
            }
            let library = library.clone();
            scope.spawn(move || {
                for _ in 0..20 {
                    library.expire_reservations_at(Utc::now() + chrono::Duration::days(2));
                }
            });
        });

        assert_invariant(&library);
        library.shutdown().await;
    }

    #[tokio::test]
    async fn test_reservation_queue_full_keeps_reservation() {
        let mut config = quick_config();
        config.reservations = PoolConfig {
            capacity: 1,
            workers: 1,
            processing_delay: Duration::from_millis(500),
        };
        let library = Library::new(config).unwrap();
        let author = library.add_author("A", "a@x", "bio");
        for i in 0..5 {
            library.add_book(&format!("B{}", i), author, 2000).unwrap();
        }

        // On a current-thread runtime the worker cannot pull until we yield,
        // so only the first job fits.
        for (book_id, user) in (1..=5u64).zip(["a", "b", "c", "d", "e"]) {
            library.reserve_book(book_id, user, 7).unwrap();
        }

        let stats = library.reservation_stats();
        assert_eq!(stats.enqueued, 1);
        assert_eq!(stats.dropped, 4);
        assert!(library.books().iter().all(|b| !b.is_available));
        library.shutdown().await;
    }

    #[tokio::test]
    async fn test_expiration_checker_lifecycle() {
        let library = library_with_books(1);
        library.reserve_book(1, "u@x", 0).unwrap();

        assert!(library.start_expiration_checker());
        assert!(!library.start_expiration_checker());
        assert!(library.is_expiration_checker_running());

        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(library.find_book(1).unwrap().is_available);
        assert_eq!(library.notification_stats().attempted, 1);

        library.shutdown().await;
        assert!(!library.is_expiration_checker_running());
        assert!(!library.start_expiration_checker());

        // Shutdown twice is fine.
        library.shutdown().await;
    }

    #[tokio::test]
    async fn test_dispatch_after_shutdown_is_silent() {
        let library = library_with_books(1);
        library.shutdown().await;

        // Business operations still succeed; only the side effect is dropped.
        library.reserve_book(1, "u@x", 7).unwrap();
        library.return_book(1, "u@x").unwrap();

        assert_eq!(library.reservation_stats().dropped, 1);
        assert_eq!(library.notification_stats().dropped, 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_through_facade() {
        let library = library_with_books(2);

        let updated = library.update_book(1, BookUpdate::title("Renamed")).unwrap();
        assert_eq!(updated.title, "Renamed");
        assert_eq!(library.search_books("Renamed").len(), 1);
        assert_eq!(library.advanced_search_books(Some("renamed"), Some(2000)).len(), 1);

        library.delete_book(2).unwrap();
        assert_eq!(library.delete_book(2), Err(CatalogError::BookNotFound(2)));
        assert_eq!(library.books_by_author(1).len(), 1);
        assert_eq!(library.authors().len(), 1);
        library.shutdown().await;
    }
}
