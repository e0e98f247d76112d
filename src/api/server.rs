use axum::{Router, routing::get};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tracing::info;

use super::{
    services::{find, get_entries, health, list_keys, stats},
    state::AppState,
};

/// Query API routes
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(stats))
        .route("/get/{id}", get(get_entries))
        .route("/find", get(find))
        .route("/keys", get(list_keys))
        .route("/health", get(health))
        .with_state(state)
        // gzip responses for clients that send Accept-Encoding
        .layer(CompressionLayer::new())
}

/// Serve the API on `listener` until `shutdown` fires, then drain open
/// connections
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let address = listener.local_addr()?;
    info!(%address, "Query API listening");

    axum::serve(listener, router(state).into_make_service())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Query API stopped");
    Ok(())
}
