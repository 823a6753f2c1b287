//! Record Store Module
//!
//! The relational system of record for books. The trait is the seam the
//! service facade depends on; PostgreSQL is the production backend and the
//! in-memory backend serves tests and local runs.

mod memory;
mod postgres;

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{Book, BookInput};

pub use memory::MemoryBookStore;
pub use postgres::PgBookStore;

/// Durable CRUD over books.
///
/// Implementations must be safe for concurrent use; the facade shares one
/// instance across all requests.
#[async_trait]
pub trait BookStore: Send + Sync {
    /// Inserts a row and returns it with its assigned id.
    async fn insert(&self, input: BookInput) -> Result<Book, StoreError>;

    async fn get_by_id(&self, id: i64) -> Result<Book, StoreError>;

    /// Returns at most `limit` rows starting at `offset`, in insertion order.
    /// Negative arguments are treated as zero.
    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Book>, StoreError>;

    /// Overwrites the row with `id`. The stored id never changes.
    async fn update_by_id(&self, id: i64, input: BookInput) -> Result<Book, StoreError>;

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError>;
}
