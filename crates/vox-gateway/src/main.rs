use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

mod app;
mod http;
mod ws;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vox_gateway=info,tower_http=debug".into()),
        )
        .init();

    let config_path = std::env::var("VOX_CONFIG").ok();
    let config = vox_core::config::VoxConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        tracing::warn!("config load failed ({e}), using defaults");
        vox_core::config::VoxConfig::default()
    });

    let bind = config.gateway.bind_address.clone();
    let port = config.gateway.port;
    let state = Arc::new(app::AppState::new(config)?);
    spawn_token_ledger_flush(state.clone());
    let router = app::build_router(state);

    let addr: SocketAddr = format!("{bind}:{port}").parse()?;
    info!("voxbridge gateway listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router.into_make_service_with_connect_info::<SocketAddr>()).await?;

    Ok(())
}

/// Periodically drains `TokenLedger`'s in-memory per-conversation counters
/// into `Store` so usage survives a restart and the map doesn't grow
/// unbounded over the life of the process.
fn spawn_token_ledger_flush(state: Arc<app::AppState>) {
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(Duration::from_secs(vox_core::config::TOKEN_LEDGER_FLUSH_INTERVAL_S));
        loop {
            interval.tick().await;
            for (conversation_id, snapshot) in state.ledger.drain_all() {
                if let Err(e) =
                    state.store.add_token_usage(&conversation_id, snapshot.input_tokens, snapshot.output_tokens)
                {
                    warn!(conversation_id, error = %e, "failed to flush token ledger to store");
                }
            }
        }
    });
}
