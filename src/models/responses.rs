//! Response DTOs for the books API
//!
//! Defines the structure of outgoing HTTP response bodies.

use serde::Serialize;

use crate::models::Book;

/// Response body for a store-backed `GET /books`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BookListResponse {
    pub limit: i64,
    pub offset: i64,
    pub books: Vec<Book>,
}

/// Response body for create and update
#[derive(Debug, Clone, Serialize)]
pub struct BookMessageResponse {
    /// Success message
    pub message: String,
    /// The row as stored
    pub book: Book,
}

impl BookMessageResponse {
    pub fn created(book: Book) -> Self {
        Self {
            message: "Book created successfully".to_string(),
            book,
        }
    }

    pub fn updated(book: Book) -> Self {
        Self {
            message: "Book updated successfully".to_string(),
            book,
        }
    }
}

/// Response body for `DELETE /books/:id`
#[derive(Debug, Clone, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn deleted() -> Self {
        Self {
            message: "Book deleted".to_string(),
        }
    }
}

/// Response body for the stats endpoint (GET /stats)
#[derive(Debug, Clone, Serialize)]
pub struct StatsResponse {
    /// Lookups answered by the cache
    pub hits: u64,
    /// Lookups that fell through to the store
    pub misses: u64,
    /// Cache calls that failed
    pub cache_errors: u64,
    /// Change notifications that could not be published
    pub publish_failures: u64,
    /// Hit rate (hits / (hits + misses))
    pub hit_rate: f64,
}

/// Response body for the health endpoint (GET /health)
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    /// Health status (e.g., "healthy")
    pub status: String,
    /// Current timestamp in ISO 8601 format
    pub timestamp: String,
}

impl HealthResponse {
    /// Creates a new HealthResponse with current timestamp
    pub fn healthy() -> Self {
        Self {
            status: "healthy".to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Error response body for all error conditions
#[derive(Debug, Clone, Serialize)]
pub struct ErrorResponse {
    /// Error message describing what went wrong
    pub error: String,
    /// Field-level messages, only present for validation failures
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub details: Vec<String>,
}

impl ErrorResponse {
    /// Creates a new ErrorResponse
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Vec::new(),
        }
    }

    pub fn with_details(error: impl Into<String>, details: Vec<String>) -> Self {
        Self {
            error: error.into(),
            details,
        }
    }
}
