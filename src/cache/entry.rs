//! Cache Entry Module
//!
//! A stored JSON document with its expiry deadline.

use std::time::{SystemTime, UNIX_EPOCH};

// == Cache Entry ==
/// Represents a single cached document with metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Serialized book document
    pub document: String,
    /// Expiration timestamp (Unix milliseconds), None = no expiration
    pub expires_at: Option<u64>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a new entry. A TTL of zero or less means the entry never expires.
    ///
    /// # Arguments
    /// * `document` - The serialized document
    /// * `ttl_seconds` - TTL in seconds
    pub fn new(document: String, ttl_seconds: i64) -> Self {
        let now = current_timestamp_ms();
        let expires_at = (ttl_seconds > 0)
            .then(|| now.saturating_add((ttl_seconds as u64).saturating_mul(1000)));

        Self {
            document,
            expires_at,
        }
    }

    // == Is Expired ==
    /// Checks if the entry has expired.
    ///
    /// An entry is expired once the current time reaches its expiration time.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            Some(expires) => current_timestamp_ms() >= expires,
            None => false,
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
