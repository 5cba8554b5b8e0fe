//! Tracing subscriber setup for the tasker binary.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::EnvFilter;

/// Directive used when the configured level does not parse.
const FALLBACK_DIRECTIVE: &str = "info";

/// Configuration for the telemetry subsystem.
#[derive(Clone, Debug)]
pub struct TelemetryConfig {
    /// Default filter directive (`"info"`, `"tasker_store=debug,info"`). Overridden by `RUST_LOG`.
    pub level: String,
    /// JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            level: FALLBACK_DIRECTIVE.to_string(),
            json: false,
        }
    }
}

/// Install the global subscriber. Call once at startup.
///
/// Fails if a global subscriber is already set.
pub fn init_telemetry(config: &TelemetryConfig) -> Result<(), TryInitError> {
    let directive = resolve_directive(&config.level, std::env::var("RUST_LOG").ok());
    let env_filter = EnvFilter::new(directive);

    let (json_layer, text_layer) = if config.json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_span_list(true);
        (Some(layer), None)
    } else {
        (None, Some(tracing_subscriber::fmt::layer().with_target(true)))
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
}

/// Pick the filter directive: `RUST_LOG` when set and valid, else the
/// configured level, else `info`.
pub fn resolve_directive(configured: &str, rust_log: Option<String>) -> String {
    if let Some(env) = rust_log.filter(|v| is_valid(v)) {
        return env;
    }
    if is_valid(configured) {
        return configured.to_string();
    }
    FALLBACK_DIRECTIVE.to_string()
}

fn is_valid(directive: &str) -> bool {
    !directive.trim().is_empty() && EnvFilter::try_new(directive).is_ok()
}
