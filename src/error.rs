use thiserror::Error;

use crate::users::repo::StoreError;

/// One generic message for unknown-username and wrong-password alike, so a
/// caller cannot probe which usernames exist.
pub const BAD_CREDENTIALS: &str = "Please check your login details and try again.";

pub const DUPLICATE_USERNAME: &str = "Username already exists. Please choose a different one.";
pub const DUPLICATE_EMAIL: &str =
    "Email address already registered. Please use a different email.";

/// Per-request error taxonomy. Every variant resolves to a redirect plus a
/// flashed message; none is fatal to the process.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing, malformed, or too-short input.
    #[error("{0}")]
    Validation(String),

    /// A write would break a uniqueness invariant (username or email taken).
    #[error("{0}")]
    Conflict(String),

    /// Bad credentials, deliberately indistinct about which part was wrong.
    #[error("{BAD_CREDENTIALS}")]
    InvalidCredentials,

    /// Underlying store failure. Logged in full, surfaced only generically.
    #[error("database error: {0}")]
    Store(#[from] sqlx::Error),

    /// Hashing or token-signing failure. Same treatment as a store failure.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AuthError {
    /// The message shown to the user when no handler-specific wording applies.
    /// Store and internal details never leak here.
    pub fn user_message(&self) -> String {
        match self {
            AuthError::Validation(msg) | AuthError::Conflict(msg) => msg.clone(),
            AuthError::InvalidCredentials => BAD_CREDENTIALS.to_string(),
            AuthError::Store(_) | AuthError::Internal(_) => {
                "Something went wrong. Please try again.".to_string()
            }
        }
    }

    /// True for errors the user can do nothing about; handlers flash their own
    /// context message ("Registration failed...") for these.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AuthError::Store(_) | AuthError::Internal(_))
    }
}

impl From<StoreError> for AuthError {
    fn from(err: StoreError) -> Self {
        match err {
            // Pre-checks lost a race against a concurrent write; report the
            // same duplicate message the pre-check would have produced.
            StoreError::Conflict { constraint } if constraint.contains("username") => {
                AuthError::Conflict(DUPLICATE_USERNAME.to_string())
            }
            StoreError::Conflict { .. } => AuthError::Conflict(DUPLICATE_EMAIL.to_string()),
            StoreError::Other(e) => AuthError::Store(e),
        }
    }
}

/// Unique-constraint violation as reported by Postgres (SQLSTATE 23505).
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_credentials_message_is_generic() {
        let err = AuthError::InvalidCredentials;
        assert_eq!(err.user_message(), BAD_CREDENTIALS);
        assert!(!err.user_message().contains("username"));
        assert!(!err.user_message().contains("password"));
    }

    #[test]
    fn store_errors_never_leak_details() {
        let err = AuthError::Store(sqlx::Error::PoolTimedOut);
        assert_eq!(err.user_message(), "Something went wrong. Please try again.");
        assert!(err.is_infrastructure());
    }

    #[test]
    fn validation_and_conflict_keep_their_messages() {
        let v = AuthError::Validation("All fields are required.".into());
        assert_eq!(v.user_message(), "All fields are required.");
        let c = AuthError::Conflict(DUPLICATE_USERNAME.into());
        assert_eq!(c.user_message(), DUPLICATE_USERNAME);
        assert!(!v.is_infrastructure());
    }

    #[test]
    fn store_conflicts_map_to_the_matching_duplicate_message() {
        let username = AuthError::from(StoreError::Conflict {
            constraint: "users_username_key".into(),
        });
        assert_eq!(username.user_message(), DUPLICATE_USERNAME);

        let email = AuthError::from(StoreError::Conflict {
            constraint: "users_email_key".into(),
        });
        assert_eq!(email.user_message(), DUPLICATE_EMAIL);
    }

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }
}
