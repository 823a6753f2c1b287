//! Book Service
//!
//! The facade every HTTP handler goes through. The store is authoritative;
//! the cache and the event bus are advisory, so their failures are logged
//! and counted but never returned to the caller.
//!
//! Write protocol: validate → store → publish → cache.
//! Single reads: cache → store → cache write-back.
//! Page reads: store → cache write-back.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::cache::{BookCache, CacheCounters};
use crate::error::{Result, ServiceError};
use crate::events::{publish_with_retry, BookEvent, EventPublisher, RetryPolicy};
use crate::models::{Book, BookInput, BookListResponse, ListParams, StatsResponse};
use crate::store::BookStore;

/// Coordinates the store, cache, and event publisher.
pub struct BookService {
    store: Arc<dyn BookStore>,
    cache: Arc<dyn BookCache>,
    publisher: Arc<dyn EventPublisher>,
    topic: String,
    retry: RetryPolicy,
    counters: CacheCounters,
    publish_failures: AtomicU64,
}

impl BookService {
    pub fn new(
        store: Arc<dyn BookStore>,
        cache: Arc<dyn BookCache>,
        publisher: Arc<dyn EventPublisher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            store,
            cache,
            publisher,
            topic: topic.into(),
            retry: RetryPolicy::default(),
            counters: CacheCounters::new(),
            publish_failures: AtomicU64::new(0),
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    // == Reads ==
    /// Looks up one book, preferring the cache.
    pub async fn read_one(&self, id: i64) -> Result<Book> {
        match self.cache.get_one(id).await {
            Ok(Some(book)) => {
                self.counters.record_hit();
                debug!(book_id = id, "Cache hit");
                return Ok(book);
            }
            Ok(None) => {
                self.counters.record_miss();
                debug!(book_id = id, "Cache miss");
            }
            Err(e) => {
                self.counters.record_miss();
                self.counters.record_error();
                warn!(book_id = id, error = %e, "Cache lookup failed, reading from store");
            }
        }

        let book = self
            .store
            .get_by_id(id)
            .await
            .map_err(|e| ServiceError::from_store("Error fetching book", e))?;

        self.cache_put(&book).await;
        Ok(book)
    }

    /// Lists one page of books from the store and writes it into the cache.
    ///
    /// The cache only ever holds the rows that happened to be read or
    /// written, so a scan of it cannot answer a page query.
    pub async fn read_many(&self, params: ListParams) -> Result<BookListResponse> {
        let books = self
            .store
            .list(params.limit, params.offset)
            .await
            .map_err(|e| ServiceError::from_store("Error fetching books", e))?;

        if let Err(e) = self.cache.put_many(&books).await {
            self.counters.record_error();
            warn!(count = books.len(), error = %e, "Failed to cache book list");
        }

        Ok(BookListResponse {
            limit: params.limit,
            offset: params.offset,
            books,
        })
    }

    // == Writes ==
    pub async fn create(&self, input: BookInput) -> Result<Book> {
        input.validate().map_err(ServiceError::Validation)?;

        let book = self
            .store
            .insert(input)
            .await
            .map_err(|e| ServiceError::from_store("Error creating book", e))?;
        info!(book_id = book.id, "Book created");

        self.notify(BookEvent::created(&book)).await;
        self.cache_put(&book).await;
        Ok(book)
    }

    /// Overwrites a book. The id always comes from the path.
    pub async fn update(&self, id: i64, input: BookInput) -> Result<Book> {
        input.validate().map_err(ServiceError::Validation)?;

        self.store
            .get_by_id(id)
            .await
            .map_err(|e| ServiceError::from_store("Error updating book", e))?;

        let book = self
            .store
            .update_by_id(id, input)
            .await
            .map_err(|e| ServiceError::from_store("Error updating book", e))?;
        info!(book_id = id, "Book updated");

        self.notify(BookEvent::updated(&book)).await;
        self.cache_put(&book).await;
        Ok(book)
    }

    pub async fn delete(&self, id: i64) -> Result<()> {
        self.store
            .get_by_id(id)
            .await
            .map_err(|e| ServiceError::from_store("Error deleting book", e))?;

        self.store
            .delete_by_id(id)
            .await
            .map_err(|e| ServiceError::from_store("Error deleting book", e))?;
        info!(book_id = id, "Book deleted");

        self.notify(BookEvent::deleted(id)).await;
        if let Err(e) = self.cache.delete_one(id).await {
            self.counters.record_error();
            warn!(book_id = id, error = %e, "Failed to evict book from cache");
        }
        Ok(())
    }

    pub fn stats(&self) -> StatsResponse {
        let snapshot = self.counters.snapshot();
        StatsResponse {
            hits: snapshot.hits,
            misses: snapshot.misses,
            cache_errors: snapshot.errors,
            publish_failures: self.publish_failures.load(Ordering::Relaxed),
            hit_rate: snapshot.hit_rate(),
        }
    }

    // == Advisory side effects ==
    async fn cache_put(&self, book: &Book) {
        if let Err(e) = self.cache.put_one(book).await {
            self.counters.record_error();
            warn!(book_id = book.id, error = %e, "Failed to cache book");
        }
    }

    async fn notify(&self, event: BookEvent) {
        let payload = event.to_string();
        match publish_with_retry(
            self.publisher.as_ref(),
            &self.topic,
            payload.as_bytes(),
            self.retry,
        )
        .await
        {
            Ok(()) => debug!(topic = %self.topic, kind = event.kind(), "Event published"),
            Err(e) => {
                self.publish_failures.fetch_add(1, Ordering::Relaxed);
                warn!(topic = %self.topic, kind = event.kind(), error = %e, "Failed to publish event");
            }
        }
    }
}
