//! # tasker-auth
//!
//! Session/identity gate: Argon2id credentials, expiring HS256 bearer
//! tokens and a revocation list keyed by token digest.

pub mod errors;
pub mod gate;
pub mod password;
pub mod token;

pub use errors::AuthError;
pub use gate::{Session, SessionGate};
pub use password::{CredentialHasher, PasswordParams};
pub use token::{generate_secret, token_digest, Claims, IssuedToken, TokenIssuer};
