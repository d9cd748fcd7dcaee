mod api;
mod state;

pub use api::{ChatRequest, HealthResponse, SpeechRequest, SpeechResponse};

use crate::builder::TourGuideService;
use crate::config::ServerSection;
use crate::error::{Result, ServeError};
use api::create_router;
use state::AppState;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// Start the HTTP server for an assembled tour guide.
///
/// Runs until the listener fails or the process receives Ctrl-C.
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use tourguide_serve::{ServiceBuilder, serve};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let builder = ServiceBuilder::from_yaml_file(Path::new("tourguide.yaml"))?;
///     let server = builder.config.server.clone();
///     serve(builder.build()?, &server).await?;
///     Ok(())
/// }
/// ```
pub async fn serve(service: TourGuideService, config: &ServerSection) -> Result<()> {
    log::info!("Initializing tour guide HTTP server");
    log::debug!("Server configuration: {:?}", config);
    log::info!(
        "Speech synthesis: {}",
        if service.speech_enabled() {
            "enabled"
        } else {
            "disabled"
        }
    );

    let state = Arc::new(AppState::new(service));
    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr = format!("{}:{}", config.host, config.port);
    log::info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await.map_err(|e| {
        log::error!("Failed to bind to {}: {}", addr, e);
        ServeError::IoError(e)
    })?;

    log::info!("Server is ready to accept connections");
    log::info!("Available endpoints:");
    log::info!("  - GET  http://{}/health", addr);
    log::info!("  - POST http://{}/api/v1/chat", addr);
    log::info!("  - POST http://{}/api/v1/speech", addr);

    if let Err(e) = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
    {
        log::error!("Server error: {}", e);
        return Err(ServeError::ServerError(e.to_string()));
    }

    log::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    log::info!("Shutdown signal received");
}
