//! API Module
//!
//! HTTP handlers and routing for the books REST API.
//!
//! # Endpoints
//! - `GET /books` - List books
//! - `POST /books` - Create a book
//! - `GET /books/:id` - Fetch a book by id
//! - `PUT /books/:id` - Update a book
//! - `DELETE /books/:id` - Delete a book
//! - `GET /stats` - Cache statistics
//! - `GET /health` - Health check endpoint

pub mod handlers;
pub mod routes;

pub use handlers::*;
pub use routes::create_router;
