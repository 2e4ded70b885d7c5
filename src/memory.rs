//! In-memory entity store.
//!
//! [`Catalog`] owns the collections and id counters and exposes unlocked
//! primitives. [`CatalogStore`] guards one `Catalog` with a single
//! reader/writer lock covering the whole aggregate. Everything it returns to
//! callers outside the crate is a copy.
//!
//! This implementation is NOT durable - data is lost on process exit.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::sync::Arc;
use tracing::info;

use crate::error::{CatalogError, CatalogResult};
use crate::store::{validate_update, Author, Book, BookUpdate, Reservation};

/// The catalog aggregate: books, authors, reservations and id counters.
///
/// Collections keep insertion order, which is also the evaluation order for
/// searches and sweeps.
#[derive(Debug)]
pub struct Catalog {
    books: Vec<Book>,
    authors: Vec<Author>,
    reservations: Vec<Reservation>,
    next_book_id: u64,
    next_author_id: u64,
    next_reservation_id: u64,
}

impl Catalog {
    /// Create an empty catalog with all counters at 1.
    pub fn new() -> Self {
        Self {
            books: Vec::new(),
            authors: Vec::new(),
            reservations: Vec::new(),
            next_book_id: 1,
            next_author_id: 1,
            next_reservation_id: 1,
        }
    }

    pub fn add_author(&mut self, name: &str, email: &str, biography: &str) -> u64 {
        let id = self.next_author_id;
        self.authors.push(Author {
            id,
            name: name.to_string(),
            email: email.to_string(),
            biography: biography.to_string(),
        });
        self.next_author_id += 1;
        id
    }

    /// Add an available book. Fails if the author is unknown.
    pub fn add_book(&mut self, title: &str, author_id: u64, year: i32) -> CatalogResult<u64> {
        if self.author(author_id).is_none() {
            return Err(CatalogError::AuthorNotFound(author_id));
        }

        let id = self.next_book_id;
        self.books.push(Book {
            id,
            title: title.to_string(),
            author_id,
            year,
            is_available: true,
        });
        self.next_book_id += 1;
        Ok(id)
    }

    pub fn book(&self, id: u64) -> Option<&Book> {
        self.books.iter().find(|b| b.id == id)
    }

    pub fn book_mut(&mut self, id: u64) -> Option<&mut Book> {
        self.books.iter_mut().find(|b| b.id == id)
    }

    pub fn author(&self, id: u64) -> Option<&Author> {
        self.authors.iter().find(|a| a.id == id)
    }

    /// Apply a partial update. Every check runs before the first field is
    /// written, so a rejected update leaves the book untouched.
    pub fn update_book(&mut self, id: u64, update: BookUpdate) -> CatalogResult<Book> {
        validate_update(&update)?;

        if self.book(id).is_none() {
            return Err(CatalogError::BookNotFound(id));
        }
        if let Some(author_id) = update.author_id {
            if self.author(author_id).is_none() {
                return Err(CatalogError::AuthorNotFound(author_id));
            }
        }

        let book = self.book_mut(id).ok_or(CatalogError::BookNotFound(id))?;
        if let Some(title) = update.title {
            book.title = title;
        }
        if let Some(author_id) = update.author_id {
            book.author_id = author_id;
        }
        if let Some(year) = update.year {
            book.year = year;
        }
        Ok(book.clone())
    }

    /// Remove a book. Reservations naming it are left in place.
    pub fn delete_book(&mut self, id: u64) -> CatalogResult<Book> {
        let pos = self
            .books
            .iter()
            .position(|b| b.id == id)
            .ok_or(CatalogError::BookNotFound(id))?;
        Ok(self.books.remove(pos))
    }

    pub fn books(&self) -> &[Book] {
        &self.books
    }

    pub fn authors(&self) -> &[Author] {
        &self.authors
    }

    pub fn reservations(&self) -> &[Reservation] {
        &self.reservations
    }

    pub(crate) fn reservations_mut(&mut self) -> &mut Vec<Reservation> {
        &mut self.reservations
    }

    /// Id the next reservation will receive.
    pub fn next_reservation_id(&self) -> u64 {
        self.next_reservation_id
    }

    /// Append a reservation and advance the reservation counter.
    pub(crate) fn push_reservation(&mut self, reservation: Reservation) {
        self.next_reservation_id = reservation.id + 1;
        self.reservations.push(reservation);
    }
}

impl Default for Catalog {
    fn default() -> Self {
        Self::new()
    }
}

/// Shared handle to a locked [`Catalog`].
///
/// Mutations take the write lock for their full duration; reads take the
/// read lock and return owned copies.
#[derive(Debug, Clone, Default)]
pub struct CatalogStore {
    data: Arc<RwLock<Catalog>>,
}

impl CatalogStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Catalog> {
        self.data.read()
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, Catalog> {
        self.data.write()
    }

    pub fn add_author(&self, name: &str, email: &str, biography: &str) -> u64 {
        let id = self.data.write().add_author(name, email, biography);
        info!(author_id = id, name = %name, "Added author");
        id
    }

    pub fn add_book(&self, title: &str, author_id: u64, year: i32) -> CatalogResult<u64> {
        let id = self.data.write().add_book(title, author_id, year)?;
        info!(book_id = id, author_id, title = %title, "Added book");
        Ok(id)
    }

    pub fn find_book(&self, id: u64) -> Option<Book> {
        self.data.read().book(id).cloned()
    }

    pub fn find_author(&self, id: u64) -> Option<Author> {
        self.data.read().author(id).cloned()
    }

    pub fn update_book(&self, id: u64, update: BookUpdate) -> CatalogResult<Book> {
        let book = self.data.write().update_book(id, update)?;
        info!(book_id = id, "Updated book");
        Ok(book)
    }

    pub fn delete_book(&self, id: u64) -> CatalogResult<Book> {
        let book = self.data.write().delete_book(id)?;
        info!(book_id = id, title = %book.title, "Deleted book");
        Ok(book)
    }

    pub fn books(&self) -> Vec<Book> {
        self.data.read().books().to_vec()
    }

    pub fn authors(&self) -> Vec<Author> {
        self.data.read().authors().to_vec()
    }

    pub fn books_by_author(&self, author_id: u64) -> Vec<Book> {
        self.data
            .read()
            .books()
            .iter()
            .filter(|b| b.author_id == author_id)
            .cloned()
            .collect()
    }

    /// Case-sensitive title substring search.
    pub fn search_books(&self, query: &str) -> Vec<Book> {
        self.data
            .read()
            .books()
            .iter()
            .filter(|b| b.title.contains(query))
            .cloned()
            .collect()
    }

    /// Case-insensitive title substring plus exact year. `None` or an empty
    /// title matches every book.
    pub fn advanced_search(&self, title: Option<&str>, year: Option<i32>) -> Vec<Book> {
        let needle = title
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);

        self.data
            .read()
            .books()
            .iter()
            .filter(|b| {
                needle
                    .as_deref()
                    .map_or(true, |n| b.title.to_lowercase().contains(n))
            })
            .filter(|b| year.map_or(true, |y| b.year == y))
            .cloned()
            .collect()
    }

    pub fn reservation(&self, id: u64) -> Option<Reservation> {
        self.data
            .read()
            .reservations()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    pub fn reservations(&self) -> Vec<Reservation> {
        self.data.read().reservations().to_vec()
    }

    /// All reservations held by a user, in any status.
    pub fn user_reservations(&self, user_email: &str) -> Vec<Reservation> {
        self.data
            .read()
            .reservations()
            .iter()
            .filter(|r| r.user_email == user_email)
            .cloned()
            .collect()
    }
}
