//! PostgreSQL backend for the record store.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use tracing::{debug, info};

use super::BookStore;
use crate::config::PostgresConfig;
use crate::error::StoreError;
use crate::models::{Book, BookInput};

const CREATE_BOOKS_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS books (
        id     BIGSERIAL PRIMARY KEY,
        title  TEXT      NOT NULL,
        author TEXT      NOT NULL,
        year   INTEGER   NOT NULL
    )
"#;

/// Book store over a shared connection pool.
#[derive(Clone)]
pub struct PgBookStore {
    pool: PgPool,
}

impl PgBookStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Opens the pool and creates the schema.
    pub async fn connect(config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.url())
            .await
            .map_err(map_sqlx_error)?;
        info!(host = %config.host, database = %config.database, "Connected to PostgreSQL");

        let store = Self::new(pool);
        store.ensure_schema().await?;
        Ok(store)
    }

    /// Creates the books table if it does not exist. Safe to run on every start.
    pub async fn ensure_schema(&self) -> Result<(), StoreError> {
        sqlx::query(CREATE_BOOKS_TABLE)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;
        debug!("books table ready");
        Ok(())
    }
}

/// Splits transport failures from query failures.
fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            StoreError::Unavailable(err.to_string())
        }
        other => StoreError::Database(other),
    }
}

#[async_trait]
impl BookStore for PgBookStore {
    async fn insert(&self, input: BookInput) -> Result<Book, StoreError> {
        sqlx::query_as::<_, Book>(
            "INSERT INTO books (title, author, year) VALUES ($1, $2, $3) \
             RETURNING id, title, author, year",
        )
        .bind(&input.title)
        .bind(&input.author)
        .bind(input.year)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn get_by_id(&self, id: i64) -> Result<Book, StoreError> {
        sqlx::query_as::<_, Book>("SELECT id, title, author, year FROM books WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?
            .ok_or(StoreError::NotFound(id))
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Book>, StoreError> {
        sqlx::query_as::<_, Book>(
            "SELECT id, title, author, year FROM books ORDER BY id LIMIT $1 OFFSET $2",
        )
        .bind(limit.max(0))
        .bind(offset.max(0))
        .fetch_all(&self.pool)
        .await
        .map_err(map_sqlx_error)
    }

    async fn update_by_id(&self, id: i64, input: BookInput) -> Result<Book, StoreError> {
        sqlx::query_as::<_, Book>(
            "UPDATE books SET title = $1, author = $2, year = $3 WHERE id = $4 \
             RETURNING id, title, author, year",
        )
        .bind(&input.title)
        .bind(&input.author)
        .bind(input.year)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?
        .ok_or(StoreError::NotFound(id))
    }

    async fn delete_by_id(&self, id: i64) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM books WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_errors_are_unavailable() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolTimedOut),
            StoreError::Unavailable(_)
        ));
        assert!(matches!(
            map_sqlx_error(sqlx::Error::PoolClosed),
            StoreError::Unavailable(_)
        ));
    }

    #[test]
    fn test_query_errors_are_database_errors() {
        assert!(matches!(
            map_sqlx_error(sqlx::Error::RowNotFound),
            StoreError::Database(_)
        ));
    }
}
