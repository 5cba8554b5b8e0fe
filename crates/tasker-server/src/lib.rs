//! # tasker-server
//!
//! HTTP/JSON transport for the task API: routing, bearer authentication,
//! JSON envelopes and error mapping.

pub mod error;
pub mod extract;
pub mod handlers;
pub mod server;

pub use error::ApiError;
pub use server::{build_router, start, AppState, ServerConfig, ServerHandle};
