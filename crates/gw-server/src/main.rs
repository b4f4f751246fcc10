//! `genworld` — the world-service binary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use gw_core::RuntimeConfig;
use gw_lm::HttpGateway;
use gw_store::{MemStore, SqliteStore, Store};
use gw_world::WorldRuntime;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cfg = Arc::new(RuntimeConfig::from_env()?);

    // GW_DATA_DIR selects the SQLite backend; unset runs in memory.
    let store: Arc<dyn Store> = match std::env::var("GW_DATA_DIR") {
        Ok(dir) => {
            let dir = PathBuf::from(dir);
            std::fs::create_dir_all(&dir)?;
            info!(dir = %dir.display(), "using sqlite store");
            Arc::new(SqliteStore::open(&dir)?)
        }
        Err(_) => {
            info!("using in-memory store");
            Arc::new(MemStore::new())
        }
    };

    let gateway = Arc::new(HttpGateway::new(&cfg));
    let runtime = WorldRuntime::new(store, gateway, cfg.clone());
    let app = gw_server::router(runtime);

    let addr = SocketAddr::from(([0, 0, 0, 0], cfg.listen_port));
    info!(%addr, lm = %cfg.lm_service_url, "genworld listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;
    Ok(())
}
