//! Shared application state handed to every axum handler.

use std::sync::Arc;

use sentinel_engine::Orchestrator;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<Orchestrator>,
    pub pin: Option<Arc<str>>,
    pub csrf_allowed_origins: Arc<Vec<String>>,
    pub injection_score_threshold: f64,
}
