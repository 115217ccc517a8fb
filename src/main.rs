use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use tos_guardian_api::analysis::AnalysisService;
use tos_guardian_api::config::Config;
use tos_guardian_api::handlers::{self, AppState};
use tos_guardian_api::llm_client::OpenRouterClient;

/// Main entry point for the application.
///
/// Initializes tracing, loads configuration, builds the OpenRouter client and
/// the analysis pipeline, then serves the HTTP routes until Ctrl-C.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tos_guardian_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Configuration loaded successfully");

    let invoker = OpenRouterClient::new(&config)?;
    tracing::info!(
        "✓ OpenRouter client initialized: {} ({})",
        config.openrouter_base_url,
        config.model
    );

    let analysis = AnalysisService::new(
        Arc::new(invoker),
        Duration::from_secs(config.upstream_timeout_secs),
        config.enable_structured_output,
    );

    // Build application state
    let app_state = Arc::new(AppState {
        config: config.clone(),
        analysis,
    });

    let app = handlers::router(app_state, true)?;

    // Start server
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
