use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, instrument, warn};

use tasker_core::ids::UserId;
use tasker_core::model::User;
use tasker_store::{RevocationStore, StoreError, UserStore};

use crate::errors::AuthError;
use crate::password::CredentialHasher;
use crate::token::{token_digest, IssuedToken, TokenIssuer};

/// An authenticated request: the bound user plus the token that proved it.
#[derive(Clone, Debug)]
pub struct Session {
    pub user_id: UserId,
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Registration, login, per-request token validation and logout.
pub struct SessionGate {
    users: Arc<dyn UserStore>,
    revocations: Arc<dyn RevocationStore>,
    hasher: CredentialHasher,
    issuer: TokenIssuer,
}

impl SessionGate {
    pub fn new(
        users: Arc<dyn UserStore>,
        revocations: Arc<dyn RevocationStore>,
        hasher: CredentialHasher,
        issuer: TokenIssuer,
    ) -> Self {
        Self {
            users,
            revocations,
            hasher,
            issuer,
        }
    }

    #[instrument(skip(self, password))]
    pub fn register(&self, username: &str, password: &str) -> Result<User, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::Validation("username must not be empty".into()));
        }
        if password.is_empty() {
            return Err(AuthError::Validation("password must not be empty".into()));
        }

        let hash = self.hasher.hash(password)?;
        let user = self.users.create_user(username, &hash).map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::UsernameTaken,
            other => AuthError::Store(other),
        })?;
        info!(user_id = %user.id, "user registered");
        Ok(user)
    }

    #[instrument(skip(self, password))]
    pub fn login(&self, username: &str, password: &str) -> Result<IssuedToken, AuthError> {
        let Some(user) = self.users.find_by_username(username.trim())? else {
            self.hasher.verify_dummy(password);
            return Err(AuthError::InvalidCredentials);
        };
        if !self.hasher.verify(password, &user.password_hash)? {
            warn!(user_id = %user.id, "login rejected");
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.issuer.issue(&user.id)?;
        info!(user_id = %user.id, "login succeeded");
        Ok(issued)
    }

    /// Resolve the `Authorization` header value of a protected request.
    pub fn authenticate(&self, header: Option<&str>) -> Result<Session, AuthError> {
        let header = header.ok_or(AuthError::MissingToken)?;
        let token = parse_bearer(header)?;
        self.validate_token(token)
    }

    /// Verify signature and expiry, then consult the revocation list.
    pub fn validate_token(&self, token: &str) -> Result<Session, AuthError> {
        let claims = self.issuer.validate(token)?;
        if self.revocations.is_revoked(&token_digest(token))? {
            return Err(AuthError::InvalidToken);
        }
        Ok(Session {
            user_id: claims.user_id(),
            token: token.to_string(),
            expires_at: claims.expires_at(),
        })
    }

    /// Revoke the session's token until it would have expired anyway.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub fn logout(&self, session: &Session) -> Result<(), AuthError> {
        self.revocations
            .revoke(&token_digest(&session.token), session.expires_at)?;
        self.purge_expired()?;
        info!("logged out");
        Ok(())
    }

    pub fn purge_expired(&self) -> Result<usize, AuthError> {
        Ok(self.revocations.purge_expired(Utc::now())?)
    }

    pub fn issuer(&self) -> &TokenIssuer {
        &self.issuer
    }
}

fn parse_bearer(header: &str) -> Result<&str, AuthError> {
    let mut parts = header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(scheme), Some(token), None) if scheme.eq_ignore_ascii_case("bearer") => Ok(token),
        _ => Err(AuthError::MalformedHeader),
    }
}
