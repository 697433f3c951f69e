//! Threadline - multi-thread LLM chat server
//!
//! Serves a browser chat UI backed by durable per-thread conversation logs.

mod api;
mod chat;
mod config;
mod db;
mod llm;
mod session;

use api::{create_router, AppState, SharedModel, SharedStore};
use chat::RegistryChatModel;
use config::ServerConfig;
use db::Database;
use llm::{all_models, LlmConfig, ModelRegistry};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; real environment variables take precedence
    let dotenv = dotenvy::dotenv();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "threadline=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    if let Ok(path) = dotenv {
        tracing::info!(path = %path.display(), "Loaded environment file");
    }

    let config = ServerConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;

    // Initialize LLM registry
    let llm_config = LlmConfig::from_env();
    let llm_registry = Arc::new(ModelRegistry::new(&llm_config));

    if llm_registry.has_models() {
        tracing::info!(
            models = ?llm_registry.available_models(),
            default = %llm_registry.default_model_id(),
            "LLM registry initialized"
        );
    } else {
        let vars: BTreeSet<_> = all_models()
            .iter()
            .map(|m| m.provider.api_key_env_var())
            .collect();
        tracing::warn!(
            variables = ?vars,
            "No LLM API keys configured. Set one of these or LLM_GATEWAY."
        );
    }

    let model = RegistryChatModel::default_model(llm_registry.clone());
    let state = AppState::new(
        Arc::new(db) as SharedStore,
        Arc::new(model) as SharedModel,
        llm_registry,
        config.turn_config(),
        config.session_idle_timeout,
    );

    // Sweep a few times per idle period
    let sweep_every = (config.session_idle_timeout / 4).max(Duration::from_secs(1));
    state.sessions.clone().spawn_sweeper(sweep_every);

    // Create router
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let compression = CompressionLayer::new()
        .gzip(true)
        .br(true)
        .deflate(true)
        .zstd(true);

    let app = create_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(compression);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Threadline server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
