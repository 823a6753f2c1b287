//! Book entity and request/response models for the books API
//!
//! This module defines the record type and the DTOs (Data Transfer Objects)
//! used for serializing/deserializing HTTP request and response bodies.

pub mod book;
pub mod requests;
pub mod responses;

// Re-export commonly used types
pub use book::{Book, BookInput};
pub use requests::{parse_book_body, ListParams, DEFAULT_LIMIT, DEFAULT_OFFSET};
pub use responses::{
    BookListResponse, BookMessageResponse, ErrorResponse, HealthResponse,
    MessageResponse, StatsResponse,
};
