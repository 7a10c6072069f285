//! ledgerd - multi-tenant double-entry ledger service
//!
//! Clients submit balanced postings against tenant-scoped accounts; the
//! service persists transactions and entries exactly once per reference,
//! maintains running balances, and serves listings and trial balances
//! under row-level-security-backed tenant isolation.

use std::net::SocketAddr;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ledgerd::api::{create_router, AppState};
use ledgerd::service::{ApiKeyService, BootstrapRequest};
use ledgerd::{db, Config};

/// Initialize tracing/logging
fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "ledgerd=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    init_tracing();

    let config = Config::from_env()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    tracing::info!("Starting ledgerd");
    tracing::info!("Connecting to database...");

    let pool = db::connect(&config).await?;

    if !db::check_schema(&pool).await? {
        tracing::error!("Database schema is not complete. Please run migrations.");
        return Err(anyhow::anyhow!("Database schema incomplete"));
    }

    let state = AppState::new(pool.clone());

    // Zero-state provisioning: a no-op once any API key exists.
    if let Some(bootstrap) = &config.bootstrap {
        run_bootstrap(&state.api_keys, bootstrap).await?;
    }

    tracing::info!("Database connected successfully");
    tracing::info!("Listening on http://{}", addr);

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.shutdown_timeout))
        .await?;

    tracing::info!("Server shutting down...");
    pool.close().await;
    tracing::info!("Database connections closed. Goodbye!");

    Ok(())
}

async fn run_bootstrap(
    api_keys: &ApiKeyService,
    bootstrap: &BootstrapRequest,
) -> anyhow::Result<()> {
    let outcome = api_keys
        .bootstrap_initial_admin(bootstrap)
        .await
        .map_err(|err| anyhow::anyhow!("bootstrap failed: {err}"))?;
    if outcome.created {
        tracing::info!(tenant_id = ?outcome.tenant_id, "bootstrapped initial admin key");
    } else {
        tracing::info!("bootstrap skipped: API keys already exist");
    }
    Ok(())
}

/// Shutdown signal handler for graceful shutdown.
///
/// After the signal fires, a watchdog gives in-flight requests the
/// configured grace period, then aborts the process.
async fn shutdown_signal(grace: Duration) {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        },
    }

    tokio::spawn(async move {
        tokio::time::sleep(grace).await;
        tracing::error!("Shutdown grace period expired, aborting");
        std::process::exit(1);
    });
}
