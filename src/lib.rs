pub mod cluster;
pub mod config;
pub mod coordinator;
pub mod http;
pub mod placement;
pub mod record;
pub mod replica_client;
pub mod store;
pub mod task_watcher;

use crate::config::ServeArgs;
use crate::coordinator::{Coordinator, Storage};
use crate::placement::detect_self_url;
use crate::store::{LocalStorage, LocalStore};
use crate::task_watcher::TaskWatcher;
use std::sync::Arc;
use std::time::Duration;

/// Run a single storage node until it receives a shutdown signal.
pub async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let store = LocalStore::open(args.directory.clone()).await?;
    let local: Arc<dyn LocalStorage> = Arc::new(store);

    let http_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .timeout(Duration::from_secs(5))
        .build()?;

    let self_url = detect_self_url(&args.cluster_urls, args.port);
    let watcher = Arc::new(TaskWatcher::spawn());
    let coordinator = Arc::new(Coordinator::new(
        local,
        http_client,
        args.cluster_urls.clone(),
        self_url,
        watcher.clone(),
    ));

    let state = Arc::new(http::AppState {
        coordinator: coordinator.clone() as Arc<dyn Storage>,
    });
    let app = http::router(state, args.access_log);

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", args.port)).await?;
    tracing::info!(port = args.port, cluster_size = args.cluster_urls.len(), "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    watcher.shutdown().await;

    if let Err(err) = coordinator.compact().await {
        tracing::warn!(error = %err, "compaction failed during shutdown");
    }
    if let Err(err) = coordinator.close().await {
        tracing::warn!(error = %err, "store close failed during shutdown");
    }
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
