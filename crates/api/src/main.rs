use anyhow::Context;
use tracing::info;
use tracing_subscriber::EnvFilter;

use vitalis_api::{build_router, state::AppState};
use vitalis_config::Settings;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let settings = Settings::load().context("Failed to load settings")?;

    let db = vitalis_db::connect(&settings.database)
        .await
        .context("Failed to connect to MongoDB")?;
    vitalis_db::indexes::ensure_indexes(&db)
        .await
        .context("Failed to ensure indexes")?;

    let addr = settings.server_addr();
    let state = AppState::new(&db, settings);
    let router = build_router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Chat service listening");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Shutdown signal received");
}
