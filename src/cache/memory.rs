//! In-memory backend for the book cache.
//!
//! Holds serialized documents exactly as Redis would, so decode failures and
//! TTL expiry behave the same way. Expired entries are dropped lazily on
//! access.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{book_key, decode_document, decode_scan, BookCache, CacheEntry, KEY_PREFIX};
use crate::error::CacheError;
use crate::models::Book;

#[derive(Debug)]
pub struct MemoryBookCache {
    /// Key-document storage
    entries: RwLock<HashMap<String, CacheEntry>>,
    /// TTL in seconds applied on every write
    ttl_seconds: i64,
    online: AtomicBool,
}

impl MemoryBookCache {
    // == Constructor ==
    /// Creates an empty cache writing documents with `ttl_seconds`.
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl_seconds,
            online: AtomicBool::new(true),
        }
    }

    /// While offline every call fails with `CacheError::Unavailable`.
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Stores a raw document under `key`, bypassing serialization.
    #[cfg(test)]
    pub(crate) async fn put_raw(&self, key: impl Into<String>, document: impl Into<String>) {
        self.entries
            .write()
            .await
            .insert(key.into(), CacheEntry::new(document.into(), self.ttl_seconds));
    }

    /// Whether a live document exists for `id`.
    pub async fn contains(&self, id: i64) -> bool {
        self.entries
            .read()
            .await
            .get(&book_key(id))
            .is_some_and(|entry| !entry.is_expired())
    }

    // == Cleanup Expired ==
    /// Removes all expired entries, returning how many were dropped.
    pub async fn cleanup_expired(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired());
        before - entries.len()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    fn check_online(&self) -> Result<(), CacheError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CacheError::Unavailable("cache is offline".to_string()))
        }
    }
}

#[async_trait]
impl BookCache for MemoryBookCache {
    async fn get_one(&self, id: i64) -> Result<Option<Book>, CacheError> {
        self.check_online()?;
        let key = book_key(id);

        let document = {
            let entries = self.entries.read().await;
            match entries.get(&key) {
                Some(entry) if !entry.is_expired() => Some(entry.document.clone()),
                Some(_) => None,
                None => return Ok(None),
            }
        };

        match document {
            Some(raw) => decode_document(&raw).map(Some),
            None => {
                self.entries.write().await.remove(&key);
                Ok(None)
            }
        }
    }

    async fn get_all(&self) -> Result<Vec<Book>, CacheError> {
        self.check_online()?;
        self.cleanup_expired().await;

        let documents: Vec<(String, String)> = self
            .entries
            .read()
            .await
            .iter()
            .filter(|(key, _)| key.starts_with(KEY_PREFIX))
            .map(|(key, entry)| (key.clone(), entry.document.clone()))
            .collect();

        Ok(decode_scan(documents))
    }

    async fn put_one(&self, book: &Book) -> Result<(), CacheError> {
        self.check_online()?;
        let document = serde_json::to_string(book)?;
        self.entries
            .write()
            .await
            .insert(book_key(book.id), CacheEntry::new(document, self.ttl_seconds));
        Ok(())
    }

    async fn delete_one(&self, id: i64) -> Result<(), CacheError> {
        self.check_online()?;
        self.entries.write().await.remove(&book_key(id));
        Ok(())
    }
}
