use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

pub async fn start_http_server(listen: &str) -> Result<(), anyhow::Error> {
    let app = Router::new()
        .route("/health", get(|| async { "OK" }))
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(listen).await?;
    log::info!("Health endpoint listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
