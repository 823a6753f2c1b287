//! Request DTOs for the books API
//!
//! Bodies are parsed field by field from a JSON value so that missing fields
//! and type mismatches both end up as readable, per-field messages.

use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::models::BookInput;

/// Default page size for `GET /books`
pub const DEFAULT_LIMIT: i64 = 10;

/// Default page start for `GET /books`
pub const DEFAULT_OFFSET: i64 = 0;

/// Parses a create/update body into a validated [`BookInput`].
///
/// Any `id` field in the body is ignored. On failure the returned vector
/// holds one message per offending field.
pub fn parse_book_body(body: &[u8]) -> Result<BookInput, Vec<String>> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| vec![format!("request body is not valid JSON: {}", e)])?;

    let Value::Object(fields) = value else {
        return Err(vec!["request body must be a JSON object".to_string()]);
    };

    let mut details = Vec::new();
    let title = string_field(&fields, "title", &mut details);
    let author = string_field(&fields, "author", &mut details);
    let year = year_field(&fields, &mut details);

    match (title, author, year) {
        (Some(title), Some(author), Some(year)) if details.is_empty() => {
            let input = BookInput::new(title, author, year);
            input.validate()?;
            Ok(input)
        }
        _ => Err(details),
    }
}

fn string_field(fields: &Map<String, Value>, name: &str, details: &mut Vec<String>) -> Option<String> {
    match fields.get(name) {
        None | Some(Value::Null) => {
            details.push(format!("{} is required", name));
            None
        }
        Some(Value::String(s)) if s.trim().is_empty() => {
            details.push(format!("{} is required", name));
            None
        }
        Some(Value::String(s)) => Some(s.clone()),
        Some(_) => {
            details.push(format!("{} must be a string", name));
            None
        }
    }
}

fn year_field(fields: &Map<String, Value>, details: &mut Vec<String>) -> Option<i32> {
    match fields.get("year") {
        None | Some(Value::Null) => {
            details.push("year is required".to_string());
            None
        }
        Some(Value::Number(n)) => match n.as_i64().and_then(|v| i32::try_from(v).ok()) {
            Some(year) if year > 0 => Some(year),
            Some(_) => {
                details.push("year must be greater than 0".to_string());
                None
            }
            None => {
                details.push("year must be a valid number".to_string());
                None
            }
        },
        Some(_) => {
            details.push("year must be a valid number".to_string());
            None
        }
    }
}

/// Pagination parameters for `GET /books`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListParams {
    pub limit: i64,
    pub offset: i64,
}

impl Default for ListParams {
    fn default() -> Self {
        Self {
            limit: DEFAULT_LIMIT,
            offset: DEFAULT_OFFSET,
        }
    }
}

impl ListParams {
    /// Builds params with both values clamped to non-negative.
    pub fn new(limit: i64, offset: i64) -> Self {
        Self {
            limit: limit.max(0),
            offset: offset.max(0),
        }
    }

    /// Reads `limit` and `offset` from a query map. Unparsable values fall
    /// back to the defaults.
    pub fn from_query(query: &HashMap<String, String>) -> Self {
        let parse = |name: &str, default: i64| {
            query
                .get(name)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(default)
        };
        Self::new(parse("limit", DEFAULT_LIMIT), parse("offset", DEFAULT_OFFSET))
    }
}
