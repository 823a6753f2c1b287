//! Book entity
//!
//! The single record type shared by the store, the cache and the HTTP layer.

use serde::{Deserialize, Serialize};

/// A stored book row.
///
/// The JSON form of this struct is the cache document format, so field
/// names and order must stay stable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Book {
    /// Primary key assigned by the store on insert
    pub id: i64,
    pub title: String,
    pub author: String,
    pub year: i32,
}

impl Book {
    /// Materializes a row from validated input and a store-assigned id.
    pub fn from_input(id: i64, input: BookInput) -> Self {
        Self {
            id,
            title: input.title,
            author: input.author,
            year: input.year,
        }
    }
}

/// Validated create/update payload. Carries no id: the store assigns it on
/// insert and the path supplies it on update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookInput {
    pub title: String,
    pub author: String,
    pub year: i32,
}

impl BookInput {
    pub fn new(title: impl Into<String>, author: impl Into<String>, year: i32) -> Self {
        Self {
            title: title.into(),
            author: author.into(),
            year,
        }
    }

    /// Checks the field constraints, returning one message per violation.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut details = Vec::new();
        if self.title.trim().is_empty() {
            details.push("title is required".to_string());
        }
        if self.author.trim().is_empty() {
            details.push("author is required".to_string());
        }
        if self.year <= 0 {
            details.push("year must be greater than 0".to_string());
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(details)
        }
    }
}
