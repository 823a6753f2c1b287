//! API Handlers
//!
//! HTTP request handlers for the books endpoints. Each handler parses the
//! request, calls the [`BookService`], and shapes the response.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use crate::error::{Result, ServiceError};
use crate::models::{
    parse_book_body, Book, BookListResponse, BookMessageResponse, HealthResponse, ListParams,
    MessageResponse, StatsResponse,
};
use crate::service::BookService;

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<BookService>,
}

impl AppState {
    pub fn new(service: BookService) -> Self {
        Self {
            service: Arc::new(service),
        }
    }
}

/// Parses a path id. Anything but an integer is a 400.
fn parse_id(raw: &str) -> Result<i64> {
    raw.trim()
        .parse::<i64>()
        .map_err(|_| ServiceError::InvalidId(raw.to_string()))
}

/// Handler for GET /books
pub async fn list_books_handler(
    State(state): State<AppState>,
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<BookListResponse>> {
    let params = ListParams::from_query(&query);
    let page = state.service.read_many(params).await?;
    Ok(Json(page))
}

/// Handler for GET /books/:id
pub async fn get_book_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Book>> {
    let id = parse_id(&id)?;
    let book = state.service.read_one(id).await?;
    Ok(Json(book))
}

/// Handler for POST /books
pub async fn create_book_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<(StatusCode, Json<BookMessageResponse>)> {
    let input = parse_book_body(&body).map_err(ServiceError::Validation)?;
    let book = state.service.create(input).await?;
    Ok((StatusCode::CREATED, Json(BookMessageResponse::created(book))))
}

/// Handler for PUT /books/:id
///
/// An `id` in the body is ignored.
pub async fn update_book_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Bytes,
) -> Result<Json<BookMessageResponse>> {
    let id = parse_id(&id)?;
    let input = parse_book_body(&body).map_err(ServiceError::Validation)?;
    let book = state.service.update(id, input).await?;
    Ok(Json(BookMessageResponse::updated(book)))
}

/// Handler for DELETE /books/:id
pub async fn delete_book_handler(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<MessageResponse>> {
    let id = parse_id(&id)?;
    state.service.delete(id).await?;
    Ok(Json(MessageResponse::deleted()))
}

/// Handler for GET /stats
pub async fn stats_handler(State(state): State<AppState>) -> Json<StatsResponse> {
    Json(state.service.stats())
}

/// Handler for GET /health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::healthy())
}
