use std::sync::Arc;

use crate::analysis::orchestrator::Analyzer;
use crate::auth::IdentityVerifier;
use crate::config::Config;
use crate::db::DocumentStore;
use crate::extraction::TextExtractor;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// Owns the process-wide model selection.
    pub analyzer: Arc<Analyzer>,
    pub extractor: Arc<dyn TextExtractor>,
    /// `None` when no database is configured; saving is then reported as unavailable.
    pub store: Option<Arc<dyn DocumentStore>>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub config: Config,
}
