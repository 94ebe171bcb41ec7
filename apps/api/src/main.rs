mod config;
mod errors;
mod llm_client;
mod models;
mod routes;
mod screening;
mod state;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::llm_client::LlmClient;
use crate::routes::build_router;
use crate::screening::evaluator::CandidateEvaluator;
use crate::screening::orchestrator::Screener;
use crate::screening::registry::TaskRegistry;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_CRATE_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting CV Screener v{}", env!("CARGO_PKG_VERSION"));

    // Initialize LLM client
    let llm = LlmClient::new(
        config.anthropic_api_key.clone(),
        config.evaluation_api_url.clone(),
        config.evaluation_timeout(),
    )?;
    info!("LLM client initialized (model: {})", llm_client::MODEL);

    let evaluator = CandidateEvaluator::new(Arc::new(llm), config.retry_policy())
        .with_max_document_chars(config.evaluation_max_document_chars);
    let screener = Screener::new(
        TaskRegistry::new(),
        evaluator,
        config.archive_limits(),
        config.evaluation_concurrency,
    );
    info!(
        "Screener ready (concurrency: {}, max attempts: {})",
        config.evaluation_concurrency, config.evaluation_max_attempts
    );

    let state = AppState {
        screener,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
