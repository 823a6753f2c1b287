//! Redis backend for the book cache.
//!
//! Documents are stored with the RedisJSON module (`JSON.SET`/`JSON.GET`/
//! `JSON.DEL` at the root path) and read back as JSON text, then decoded
//! into [`Book`]. One multiplexed connection manager is shared by all
//! requests and reconnects on its own.

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::RedisResult;
use tracing::{debug, info, warn};

use super::{book_key, decode_document, decode_scan, BookCache, SCAN_PATTERN};
use crate::config::RedisConfig;
use crate::error::CacheError;
use crate::models::Book;

/// Keys requested per SCAN round trip
const SCAN_BATCH: usize = 100;

/// Deadlines for cache operations.
#[derive(Debug, Clone, Copy)]
pub struct CacheTimeouts {
    pub dial: Duration,
    pub read: Duration,
    pub write: Duration,
}

impl Default for CacheTimeouts {
    fn default() -> Self {
        Self {
            dial: Duration::from_secs(10),
            read: Duration::from_secs(60),
            write: Duration::from_secs(120),
        }
    }
}

async fn deadline<T, F>(limit: Duration, op: &'static str, fut: F) -> Result<T, CacheError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(CacheError::from),
        Err(_) => Err(CacheError::Timeout(op)),
    }
}

#[derive(Clone)]
pub struct RedisBookCache {
    conn: ConnectionManager,
    ttl_seconds: i64,
    timeouts: CacheTimeouts,
}

impl RedisBookCache {
    /// Connects and verifies the server answers `PING`.
    pub async fn connect(config: &RedisConfig) -> Result<Self, CacheError> {
        let timeouts = CacheTimeouts::default();
        let client = redis::Client::open(config.url())?;
        let mut conn = deadline(timeouts.dial, "connect", client.get_connection_manager()).await?;

        let ping = redis::cmd("PING");
        let _: String = deadline(timeouts.dial, "connect", ping.query_async(&mut conn)).await?;
        info!(host = %config.host, port = config.port, db = config.db, "Connected to Redis");

        Ok(Self {
            conn,
            ttl_seconds: config.expiry_books,
            timeouts,
        })
    }

    async fn fetch_document(
        &self,
        conn: &mut ConnectionManager,
        key: &str,
    ) -> Result<Option<String>, CacheError> {
        let mut get = redis::cmd("JSON.GET");
        get.arg(key).arg(".");
        deadline(self.timeouts.read, "read", get.query_async(conn)).await
    }
}

#[async_trait]
impl BookCache for RedisBookCache {
    async fn get_one(&self, id: i64) -> Result<Option<Book>, CacheError> {
        let key = book_key(id);
        let mut conn = self.conn.clone();

        match self.fetch_document(&mut conn, &key).await? {
            Some(raw) => decode_document(&raw).map(Some),
            None => Ok(None),
        }
    }

    async fn get_all(&self) -> Result<Vec<Book>, CacheError> {
        let mut conn = self.conn.clone();
        let mut documents = Vec::new();
        let mut seen = std::collections::HashSet::new();
        let mut cursor: u64 = 0;

        loop {
            let mut scan = redis::cmd("SCAN");
            scan.arg(cursor)
                .arg("MATCH")
                .arg(SCAN_PATTERN)
                .arg("COUNT")
                .arg(SCAN_BATCH);
            let (next, keys): (u64, Vec<String>) =
                deadline(self.timeouts.read, "read", scan.query_async(&mut conn)).await?;

            // SCAN may return a key more than once
            for key in keys {
                if !seen.insert(key.clone()) {
                    continue;
                }
                match self.fetch_document(&mut conn, &key).await {
                    Ok(Some(raw)) => documents.push((key, raw)),
                    Ok(None) => {}
                    Err(e) => warn!(%key, error = %e, "Failed to fetch cached book, skipping"),
                }
            }

            if next == 0 {
                break;
            }
            cursor = next;
        }

        Ok(decode_scan(documents))
    }

    async fn put_one(&self, book: &Book) -> Result<(), CacheError> {
        let key = book_key(book.id);
        let document = serde_json::to_string(book)?;
        let mut conn = self.conn.clone();

        let mut pipe = redis::pipe();
        pipe.atomic()
            .cmd("JSON.SET")
            .arg(&key)
            .arg(".")
            .arg(&document)
            .ignore();
        if self.ttl_seconds > 0 {
            pipe.cmd("EXPIRE").arg(&key).arg(self.ttl_seconds).ignore();
        } else {
            pipe.cmd("PERSIST").arg(&key).ignore();
        }

        let _: () = deadline(self.timeouts.write, "write", pipe.query_async(&mut conn)).await?;
        debug!(%key, ttl = self.ttl_seconds, "Cached book");
        Ok(())
    }

    async fn delete_one(&self, id: i64) -> Result<(), CacheError> {
        let key = book_key(id);
        let mut conn = self.conn.clone();

        let mut del = redis::cmd("JSON.DEL");
        del.arg(&key).arg(".");
        let removed: i64 = deadline(self.timeouts.write, "write", del.query_async(&mut conn)).await?;
        if removed == 0 {
            debug!(%key, "Key not present in cache");
        } else {
            debug!(%key, "Evicted book from cache");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timeouts() {
        let timeouts = CacheTimeouts::default();
        assert_eq!(timeouts.dial, Duration::from_secs(10));
        assert_eq!(timeouts.read, Duration::from_secs(60));
        assert_eq!(timeouts.write, Duration::from_secs(120));
    }

    #[tokio::test]
    async fn test_deadline_reports_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            RedisResult::Ok(1)
        };
        let result = deadline(Duration::from_millis(10), "read", slow).await;
        assert!(matches!(result, Err(CacheError::Timeout("read"))));
    }

    #[tokio::test]
    async fn test_deadline_passes_value_through() {
        let fast = async { RedisResult::Ok(7) };
        assert_eq!(deadline(Duration::from_secs(1), "read", fast).await.unwrap(), 7);
    }
}
