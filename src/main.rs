use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;

use workspace_hub::activity::AgentActivity;
use workspace_hub::api::{configured_api_key, hub_router, ApiState};
use workspace_hub::broadcast::Broadcaster;
use workspace_hub::config::Config;
use workspace_hub::db::Database;
use workspace_hub::message_log::MessageLog;
use workspace_hub::registry::ConnectionRegistry;
use workspace_hub::seen::SeenTracker;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(&config.log_level);

    let db = Database::open(&config.db_path).await?;
    let registry = Arc::new(ConnectionRegistry::new());

    let state = ApiState {
        message_log: MessageLog::new(db.pool.clone()),
        seen: SeenTracker::new(db.pool.clone()),
        activity: AgentActivity::new(db.pool),
        registry: registry.clone(),
        broadcaster: Broadcaster::new(registry),
        api_key: config.api_key.clone().or_else(configured_api_key),
    };

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, auth = state.api_key.is_some(), "workspace-hub listening");

    axum::serve(listener, hub_router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}

fn init_tracing(default_level: &str) {
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(true)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}
