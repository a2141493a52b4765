mod analysis;
mod auth;
mod config;
mod db;
mod errors;
mod extraction;
mod llm_client;
mod models;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::orchestrator::Analyzer;
use crate::analysis::resolver::ModelResolver;
use crate::auth::GoogleTokenVerifier;
use crate::config::Config;
use crate::db::{create_pool, DocumentStore, PgDocumentStore};
use crate::extraction::DocumentTextExtractor;
use crate::llm_client::GeminiClient;
use crate::routes::build_router;
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

    info!("Starting FitCheck API v{}", env!("CARGO_PKG_VERSION"));
    errors::enable_diagnostics(!config.is_production());

    // Initialize Gemini client and model resolver
    let gemini = GeminiClient::new(config.gemini_api_key.clone(), &config.gemini_api_base)?;
    let resolver = ModelResolver::new(config.gemini_model.clone(), config.fallback_models.clone());
    match &config.gemini_model {
        Some(model) => info!("Gemini client initialized (model override: {model})"),
        None => info!("Gemini client initialized (model resolved on first request)"),
    }

    // Initialize PostgreSQL (optional)
    let store: Option<Arc<dyn DocumentStore>> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url).await?;
            Some(Arc::new(PgDocumentStore::new(pool)) as Arc<dyn DocumentStore>)
        }
        None => {
            info!("DATABASE_URL not set; analyses will not be saved");
            None
        }
    };

    let verifier = GoogleTokenVerifier::new(
        config.token_info_url.clone(),
        config.google_client_id.clone(),
    )?;

    std::fs::create_dir_all(&config.upload_dir)?;
    info!("Upload spool directory: {}", config.upload_dir.display());

    // Build app state
    let state = AppState {
        analyzer: Arc::new(Analyzer::new(Arc::new(gemini), resolver)),
        extractor: Arc::new(DocumentTextExtractor::new(config.upload_dir.clone())),
        store,
        verifier: Arc::new(verifier),
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client domain is fixed

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
