use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use secrecy::SecretString;

use tasker_auth::{CredentialHasher, PasswordParams, SessionGate, TokenIssuer};
use tasker_server::{AppState, ServerConfig};
use tasker_settings::TaskerSettings;
use tasker_store::{Database, RevocationRepo, TaskRepo, UserRepo};
use tasker_tasks::TaskService;
use tasker_telemetry::TelemetryConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = tasker_settings::load_settings().context("failed to load settings")?;

    tasker_telemetry::init_telemetry(&TelemetryConfig {
        level: settings.logging.level.clone(),
        json: settings.logging.json,
    })
    .context("failed to initialise logging")?;

    tracing::info!(?settings, "starting tasker");

    let db = Database::open(Path::new(&settings.database.path))
        .with_context(|| format!("failed to open database at {}", settings.database.path))?;

    let gate = build_gate(&settings, &db)?;
    match gate.purge_expired() {
        Ok(removed) => tracing::info!(removed, "purged expired revocations"),
        Err(e) => tracing::warn!(error = %e, "revocation purge failed"),
    }

    let tasks = TaskService::new(Arc::new(TaskRepo::new(db.clone())));
    let state = AppState::new(tasks, Arc::new(gate));

    let config = ServerConfig {
        host: settings.server.host.clone(),
        port: settings.server.port,
    };
    let handle = tasker_server::start(config, state)
        .await
        .context("failed to start server")?;

    tracing::info!(
        port = handle.port,
        database = %db.path().display(),
        "tasker server ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl+c")?;

    tracing::info!("shutting down");
    handle.shutdown().await;
    Ok(())
}

fn build_gate(settings: &TaskerSettings, db: &Database) -> anyhow::Result<SessionGate> {
    let auth = &settings.auth;
    let secret = match &auth.signing_secret {
        Some(secret) => SecretString::from(secret.clone()),
        None => {
            tracing::warn!("no signing secret configured; using an ephemeral key, tokens will not survive a restart");
            tasker_auth::generate_secret()
        }
    };

    let hasher = CredentialHasher::new(PasswordParams {
        memory_kib: auth.password.memory_kib,
        iterations: auth.password.iterations,
        parallelism: auth.password.parallelism,
    })
    .context("invalid password hashing parameters")?;

    Ok(SessionGate::new(
        Arc::new(UserRepo::new(db.clone())),
        Arc::new(RevocationRepo::new(db.clone())),
        hasher,
        TokenIssuer::new(&secret, auth.token_ttl_secs),
    ))
}
