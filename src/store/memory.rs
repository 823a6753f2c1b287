//! In-memory backend for the record store.
//!
//! Ids are assigned from a counter, so id order is insertion order. The
//! store can be taken offline to exercise the facade's failure paths.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::BookStore;
use crate::error::StoreError;
use crate::models::{Book, BookInput};

#[derive(Debug)]
pub struct MemoryBookStore {
    rows: RwLock<BTreeMap<i64, Book>>,
    next_id: AtomicI64,
    online: AtomicBool,
}

impl Default for MemoryBookStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBookStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(BTreeMap::new()),
            next_id: AtomicI64::new(1),
            online: AtomicBool::new(true),
        }
    }

    /// While offline every call fails with `StoreError::Unavailable`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    fn check_online(&self) -> Result<(), StoreError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StoreError::Unavailable("store is offline".to_string()))
        }
    }
}

#[async_trait]
impl BookStore for MemoryBookStore {
    async fn insert(&self, input: BookInput) -> Result<Book, StoreError> {
        self.check_online()?;
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let book = Book::from_input(id, input);
        self.rows.write().await.insert(id, book.clone());
        Ok(book)
    }

    async fn get_by_id(&self, id: i64) -> Result<Book, StoreError> {
        self.check_online()?;
        self.rows
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Book>, StoreError> {
        self.check_online()?;
        let rows = self.rows.read().await;
        Ok(rows
            .values()
            .skip(offset.max(0) as usize)
            .take(limit.max(0) as usize)
            .cloned()
            .collect())
    }

    async fn update_by_id(&self, id: i64, input: BookInput) -> Result<Book, StoreError> {
        self.check_online()?;
        let mut rows = self.rows.write().await;
        let row = rows.get_mut(&id).ok_or(StoreError::NotFound(id))?;
        *row = Book::from_input(id, input);
        Ok(row.clone())
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        self.check_online()?;
        self.rows
            .write()
            .await
            .remove(&id)
            .map(|_| ())
            .ok_or(StoreError::NotFound(id))
    }
}
