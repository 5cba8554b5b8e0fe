use tasker_core::ServiceError;
use tasker_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Authorization token required")]
    MissingToken,

    #[error("Invalid token format")]
    MalformedHeader,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("username already exists")]
    UsernameTaken,

    #[error("{0}")]
    Validation(String),

    #[error("password hashing failed: {0}")]
    Hashing(String),

    #[error("token signing failed: {0}")]
    Signing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<AuthError> for ServiceError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::InvalidCredentials
            | AuthError::MissingToken
            | AuthError::MalformedHeader
            | AuthError::InvalidToken => ServiceError::Unauthorized(e.to_string()),
            AuthError::UsernameTaken => ServiceError::Conflict("Username already exists".into()),
            AuthError::Validation(msg) => ServiceError::Validation(msg),
            AuthError::Hashing(_) | AuthError::Signing(_) => ServiceError::Internal(e.to_string()),
            AuthError::Store(inner) => inner.into(),
        }
    }
}
