use std::sync::Arc;

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;

use docqa_backend::core::config::AppPaths;
use docqa_backend::core::logging;
use docqa_backend::server;
use docqa_backend::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let paths = Arc::new(AppPaths::from_env());
    logging::init(&paths);
    paths.log_resolved();

    let state = AppState::initialize_with_paths(paths)
        .await
        .context("Failed to initialize application state")?;

    match state.store.count().await {
        Ok(0) => tracing::warn!("Chunk store is empty; run docqa-ingest before asking questions"),
        Ok(n) => tracing::info!("Chunk store holds {} chunks", n),
        Err(e) => tracing::warn!("Failed to count stored chunks: {}", e),
    }

    let bind_addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;

    println!("DOCQA_PORT={}", addr.port());
    tracing::info!("Listening on {}", addr);

    let app: Router = server::router::router(state);

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
