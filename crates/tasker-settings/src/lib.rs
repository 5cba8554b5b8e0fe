//! # tasker-settings
//!
//! Layered configuration for the tasker server.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`TaskerSettings::default()`]
//! 2. **Settings file**: `tasker.json`, or the path in `TASKER_CONFIG` (deep-merged over defaults)
//! 3. **Environment variables**: `TASKER_*` overrides (highest priority)
//!
//! Settings are loaded once at startup and passed down by value; nothing
//! re-reads them afterwards.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{deep_merge, load_settings, load_settings_from_path, settings_path};
pub use types::*;
