//! Error types for the books service
//!
//! One thiserror enum per data plane, plus the facade error that the HTTP
//! layer turns into a response.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

use crate::models::ErrorResponse;

// == Store Error ==
/// Failure of the record store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No row with this id
    #[error("Book not found: {0}")]
    NotFound(i64),

    /// Backend could not be reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Query or constraint failure reported by the database
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

// == Cache Error ==
/// Failure of the document cache. Always advisory.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache unavailable: {0}")]
    Unavailable(String),

    /// Operation exceeded its dial/read/write deadline
    #[error("Cache {0} timed out")]
    Timeout(&'static str),

    #[error("Cache backend error: {0}")]
    Backend(#[from] redis::RedisError),

    /// Stored document is not a valid book
    #[error("Cache document error: {0}")]
    Serialization(#[from] serde_json::Error),
}

// == Publish Error ==
/// Failure to deliver a change notification.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PublishError {
    /// Worth retrying (broker down, queue full, timeout)
    #[error("Transient publish failure: {0}")]
    Transient(String),

    #[error("Publish failed: {0}")]
    Fatal(String),
}

impl PublishError {
    pub fn is_transient(&self) -> bool {
        matches!(self, PublishError::Transient(_))
    }
}

// == Consume Error ==
/// Failure inside the consumer loop.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsumeError {
    /// Subscription or fetch failed; the loop resubscribes
    #[error("Consumer transport error: {0}")]
    Transport(String),

    #[error("Event handler error: {0}")]
    Handler(String),
}

// == Service Error ==
/// Error surfaced by the book service facade.
///
/// Only validation, missing rows and store failures reach callers; cache and
/// publish failures are logged and swallowed inside the facade.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Invalid input: {}", .0.join(", "))]
    Validation(Vec<String>),

    #[error("Invalid book id: {0}")]
    InvalidId(String),

    #[error("Book not found: {0}")]
    NotFound(i64),

    /// Store failure, with the user-facing message for the operation
    #[error("{context}: {source}")]
    Store {
        context: &'static str,
        #[source]
        source: StoreError,
    },
}

impl ServiceError {
    /// Maps a store error for operation `context`, lifting `NotFound` out.
    pub fn from_store(context: &'static str, source: StoreError) -> Self {
        match source {
            StoreError::NotFound(id) => ServiceError::NotFound(id),
            source => ServiceError::Store { context, source },
        }
    }
}

// == IntoResponse Implementation ==
impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ServiceError::Validation(details) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse::with_details("Invalid input", details),
            ),
            ServiceError::InvalidId(_) => {
                (StatusCode::BAD_REQUEST, ErrorResponse::new("Invalid book id"))
            }
            ServiceError::NotFound(_) => {
                (StatusCode::NOT_FOUND, ErrorResponse::new("Book not found"))
            }
            ServiceError::Store { context, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, ErrorResponse::new(context))
            }
        };

        (status, Json(body)).into_response()
    }
}

// == Result Type Alias ==
/// Convenience Result type for facade operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
