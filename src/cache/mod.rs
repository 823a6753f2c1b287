//! Cache Module
//!
//! JSON document cache for books, keyed by `BOOKS_ID:<id>`. The cache is
//! advisory: it may be stale or empty and is never the source of truth.

mod entry;
mod memory;
mod redis_json;
mod stats;


use async_trait::async_trait;
use tracing::warn;

use crate::error::CacheError;
use crate::models::Book;

// Re-export public types
pub use entry::CacheEntry;
pub use memory::MemoryBookCache;
pub use redis_json::{CacheTimeouts, RedisBookCache};
pub use stats::{CacheCounters, CacheStats};

// == Key Schema ==
/// Prefix shared by every key the service reads or writes
pub const KEY_PREFIX: &str = "BOOKS_ID:";

/// Pattern matching the whole book namespace
pub const SCAN_PATTERN: &str = "BOOKS_ID:*";

/// Cache key for a book id.
pub fn book_key(id: i64) -> String {
    format!("{}{}", KEY_PREFIX, id)
}

/// Extracts the id from a book key, if the key belongs to the namespace.
pub fn parse_book_key(key: &str) -> Option<i64> {
    key.strip_prefix(KEY_PREFIX)?.parse().ok()
}

/// Decodes a cached JSON document.
pub fn decode_document(raw: &str) -> Result<Book, CacheError> {
    Ok(serde_json::from_str(raw)?)
}

/// Decodes the documents of a namespace scan, dropping the ones that fail
/// or whose id does not match their key.
pub(crate) fn decode_scan<I>(documents: I) -> Vec<Book>
where
    I: IntoIterator<Item = (String, String)>,
{
    documents
        .into_iter()
        .filter_map(|(key, raw)| match decode_document(&raw) {
            Ok(book) if parse_book_key(&key) == Some(book.id) => Some(book),
            Ok(book) => {
                warn!(%key, book_id = book.id, "Skipping cache document stored under another id");
                None
            }
            Err(e) => {
                warn!(%key, error = %e, "Skipping undecodable cache document");
                None
            }
        })
        .collect()
}

// == Book Cache ==
/// Read/write access to cached book documents.
#[async_trait]
pub trait BookCache: Send + Sync {
    /// Fetches one document. `Ok(None)` is a miss, distinct from an error.
    async fn get_one(&self, id: i64) -> Result<Option<Book>, CacheError>;

    /// Returns every decodable document in the namespace, in no particular order.
    async fn get_all(&self) -> Result<Vec<Book>, CacheError>;

    /// Writes the full document with the configured TTL, replacing any old value.
    async fn put_one(&self, book: &Book) -> Result<(), CacheError>;

    /// Writes each document in turn, stopping at the first failure.
    async fn put_many(&self, books: &[Book]) -> Result<(), CacheError> {
        for book in books {
            self.put_one(book).await?;
        }
        Ok(())
    }

    /// Removes the document; a missing key is not an error.
    async fn delete_one(&self, id: i64) -> Result<(), CacheError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_book_key_format() {
        assert_eq!(book_key(1), "BOOKS_ID:1");
        assert_eq!(book_key(12345), "BOOKS_ID:12345");
    }

    #[test]
    fn test_parse_book_key() {
        assert_eq!(parse_book_key("BOOKS_ID:42"), Some(42));
        assert_eq!(parse_book_key("OTHER:42"), None);
        assert_eq!(parse_book_key("BOOKS_ID:abc"), None);
    }

    #[test]
    fn test_decode_scan_skips_bad_documents() {
        let books = decode_scan(vec![
            (
                "BOOKS_ID:1".to_string(),
                r#"{"id":1,"title":"Dune","author":"Herbert","year":1965}"#.to_string(),
            ),
            ("BOOKS_ID:2".to_string(), "{not json".to_string()),
            ("BOOKS_ID:3".to_string(), r#"{"id":3}"#.to_string()),
        ]);
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].id, 1);
    }

    #[test]
    fn test_decode_scan_skips_documents_under_wrong_key() {
        let books = decode_scan(vec![(
            "BOOKS_ID:7".to_string(),
            r#"{"id":1,"title":"Dune","author":"Herbert","year":1965}"#.to_string(),
        )]);
        assert!(books.is_empty());
    }
}
