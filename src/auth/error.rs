use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Failure reported by a [`UserStore`](crate::auth::repo::UserStore) backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Insert rejected because the email is already taken.
    #[error("email already present in store")]
    Conflict,
    #[error(transparent)]
    Backend(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthErrorKind {
    Hashing,
    Comparison,
    NotFound,
    InvalidCredentials,
    DuplicateUser,
    Store,
    Validation,
}

/// Errors surfaced by the credential service and the auth routes.
///
/// `Hashing` and `Comparison` keep the primitive's error as `source` and only
/// display a generic message. Every other variant displays its own message.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Error Hashing Password")]
    Hashing {
        #[source]
        source: anyhow::Error,
    },
    #[error("Error comparing password")]
    Comparison {
        #[source]
        source: anyhow::Error,
    },
    #[error("User not found")]
    NotFound,
    #[error("Invalid password")]
    InvalidCredentials,
    #[error("User already exists")]
    DuplicateUser,
    #[error(transparent)]
    Store(anyhow::Error),
    #[error("{0}")]
    Validation(String),
}

impl AuthError {
    pub fn kind(&self) -> AuthErrorKind {
        match self {
            AuthError::Hashing { .. } => AuthErrorKind::Hashing,
            AuthError::Comparison { .. } => AuthErrorKind::Comparison,
            AuthError::NotFound => AuthErrorKind::NotFound,
            AuthError::InvalidCredentials => AuthErrorKind::InvalidCredentials,
            AuthError::DuplicateUser => AuthErrorKind::DuplicateUser,
            AuthError::Store(_) => AuthErrorKind::Store,
            AuthError::Validation(_) => AuthErrorKind::Validation,
        }
    }

    /// Message that is safe to hand to an HTTP client.
    pub fn public_message(&self) -> String {
        match self {
            AuthError::Store(_) => "Internal server error".to_string(),
            other => other.to_string(),
        }
    }

    pub fn status(&self) -> StatusCode {
        match self.kind() {
            AuthErrorKind::Validation => StatusCode::BAD_REQUEST,
            AuthErrorKind::InvalidCredentials => StatusCode::UNAUTHORIZED,
            AuthErrorKind::NotFound => StatusCode::NOT_FOUND,
            AuthErrorKind::DuplicateUser => StatusCode::CONFLICT,
            AuthErrorKind::Hashing | AuthErrorKind::Comparison | AuthErrorKind::Store => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<StoreError> for AuthError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Conflict => AuthError::DuplicateUser,
            StoreError::Backend(e) => AuthError::Store(e),
        }
    }
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, Json(json!({ "error": self.public_message() }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn masked_errors_hide_their_source() {
        let err = AuthError::Hashing {
            source: anyhow::anyhow!("out of memory while expanding key"),
        };
        assert_eq!(err.to_string(), "Error Hashing Password");
        assert_eq!(err.public_message(), "Error Hashing Password");
        let source = std::error::Error::source(&err).expect("cause is kept");
        assert!(source.to_string().contains("out of memory"));
    }

    #[test]
    fn store_errors_keep_their_message_but_not_on_the_wire() {
        let err = AuthError::from(StoreError::Backend(anyhow::anyhow!("connection refused")));
        assert_eq!(err.kind(), AuthErrorKind::Store);
        assert_eq!(err.to_string(), "connection refused");
        assert_eq!(err.public_message(), "Internal server error");
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn conflict_becomes_duplicate_user() {
        let err = AuthError::from(StoreError::Conflict);
        assert_eq!(err.kind(), AuthErrorKind::DuplicateUser);
        assert_eq!(err.to_string(), "User already exists");
        assert_eq!(err.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn status_codes() {
        assert_eq!(AuthError::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(AuthError::InvalidCredentials.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            AuthError::Validation("Invalid email".into()).status(),
            StatusCode::BAD_REQUEST
        );
    }
}
