use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use thiserror::Error;
use time::OffsetDateTime;

use crate::error::is_unique_violation;

/// Store-level write failure. Uniqueness is enforced by the database
/// constraints, so a concurrent duplicate insert surfaces here even when the
/// handler's pre-check passed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unique constraint violated: {constraint}")]
    Conflict { constraint: String },

    #[error(transparent)]
    Other(#[from] sqlx::Error),
}

fn map_write_error(err: sqlx::Error) -> StoreError {
    if is_unique_violation(&err) {
        let constraint = match &err {
            sqlx::Error::Database(db) => db.constraint().unwrap_or_default().to_string(),
            _ => String::new(),
        };
        StoreError::Conflict { constraint }
    } else {
        StoreError::Other(err)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

impl User {
    pub async fn find_by_username(db: &PgPool, username: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = $1
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await
    }

    pub async fn find_by_email(db: &PgPool, email: &str) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE email = $1
            "#,
        )
        .bind(email)
        .fetch_optional(db)
        .await
    }

    /// Fresh load by id, used for per-request session resolution.
    pub async fn find_by_id(db: &PgPool, id: i64) -> sqlx::Result<Option<User>> {
        sqlx::query_as::<_, User>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(db)
        .await
    }

    /// Create a new user with an already-hashed password. A single INSERT, so
    /// the write either commits whole or not at all.
    pub async fn create(
        db: &PgPool,
        username: &str,
        email: &str,
        password_hash: &str,
    ) -> Result<User, StoreError> {
        sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (username, email, password_hash)
            VALUES ($1, $2, $3)
            RETURNING id, username, email, password_hash, created_at
            "#,
        )
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .fetch_one(db)
        .await
        .map_err(map_write_error)
    }

    /// Persist the mutable fields of an already-loaded user. Callers mutate a
    /// local copy and pass it here; nothing is tracked implicitly.
    pub async fn update(&self, db: &PgPool) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE users
            SET email = $2, password_hash = $3
            WHERE id = $1
            "#,
        )
        .bind(self.id)
        .bind(&self.email)
        .bind(&self.password_hash)
        .execute(db)
        .await
        .map_err(map_write_error)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Other(sqlx::Error::RowNotFound));
        }
        Ok(())
    }
}
