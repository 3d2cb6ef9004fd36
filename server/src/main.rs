//! Composition root: wires every leaf crate into one `Orchestrator` and
//! serves it over HTTP via a small wiring function.

mod auth;
mod error;
mod routes;
mod state;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use sentinel_clients::{RemotePlannerClient, RemoteWorkerClient};
use sentinel_config::{PolicyFile, SentinelSettings};
use sentinel_core::WorkspaceRoot;
use sentinel_engine::{Orchestrator, OrchestratorConfig};
use sentinel_policy::PolicyEngine;
use sentinel_store::{ApprovalQueue, EventBus, ProvenanceStore, SessionStore};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::state::AppState;

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new("info"))
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::try_new("warn").expect("warn filter is valid"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

fn read_pin(settings: &SentinelSettings) -> anyhow::Result<Option<Arc<str>>> {
    if !settings.pin_required {
        return Ok(None);
    }
    let Some(path) = &settings.pin_file_path else {
        anyhow::bail!("SENTINEL_PIN_REQUIRED is set but SENTINEL_PIN_FILE_PATH is not");
    };
    let raw = std::fs::read_to_string(path)?;
    Ok(Some(Arc::from(raw.trim())))
}

fn build_orchestrator(settings: &SentinelSettings) -> anyhow::Result<Orchestrator> {
    std::fs::create_dir_all(&settings.workspace_root)?;
    std::fs::create_dir_all(&settings.data_dir)?;

    let workspace = WorkspaceRoot::new(&settings.workspace_root)?;
    let policy_file = PolicyFile::load(&settings.policy_file_path)?;
    let policy = PolicyEngine::new(workspace, &policy_file)?;

    let session_store = SessionStore::open_or_fallback(
        &settings.data_dir.join("sessions.sqlite3"),
        settings.session_ttl.as_millis() as i64,
        settings.session_capacity,
    );
    let approval_queue = ApprovalQueue::open(&settings.data_dir.join("approvals.sqlite3"))
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "approval queue durable backend unavailable, falling back to in-memory");
            ApprovalQueue::open_in_memory()
        });
    let provenance = ProvenanceStore::open(&settings.data_dir.join("provenance.sqlite3"), settings.provenance_capacity)
        .unwrap_or_else(|error| {
            tracing::warn!(%error, "provenance store durable backend unavailable, falling back to in-memory");
            ProvenanceStore::open_in_memory(settings.provenance_capacity)
        });
    let event_bus = EventBus::new();

    let planner = Box::new(RemotePlannerClient::new(settings.planner_url.clone(), settings.planner_timeout));
    let worker = Box::new(RemoteWorkerClient::new(settings.worker_url.clone(), settings.worker_timeout));

    let config = OrchestratorConfig {
        approval_mode: settings.approval_mode,
        required_scanners: settings.required_scanners.clone(),
        conversation_thresholds: settings.conversation_thresholds.clone(),
        injection_score_threshold: settings.injection_score_threshold,
        prompt_length_ceiling: settings.prompt_length_ceiling,
        approval_ttl: settings.approval_ttl,
    };

    Ok(Orchestrator::new(
        config,
        session_store,
        approval_queue,
        provenance,
        event_bus,
        policy,
        planner,
        worker,
    ))
}

fn build_router(state: AppState) -> Router {
    let cors = if state.csrf_allowed_origins.is_empty() {
        CorsLayer::permissive()
    } else {
        let origins: Vec<_> = state
            .csrf_allowed_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new().allow_origin(AllowOrigin::list(origins))
    };

    let protected = Router::new()
        .route("/task", post(routes::post_task))
        .route("/approval/{id}", get(routes::get_approval))
        .route("/approve/{id}", post(routes::post_approve))
        .route("/scan", post(routes::post_scan))
        .route("/session/{id}", get(routes::get_session))
        .route("/events", get(routes::get_events))
        .route_layer(middleware::from_fn_with_state(state.clone(), auth::require_pin));

    Router::new()
        .route("/health", get(routes::get_health))
        .merge(protected)
        .fallback(routes::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let settings = SentinelSettings::from_env();

    let pin = read_pin(&settings)?;
    let orchestrator = build_orchestrator(&settings)?;
    let state = AppState {
        orchestrator: Arc::new(orchestrator),
        pin,
        csrf_allowed_origins: Arc::new(settings.csrf_allowed_origins.clone()),
        injection_score_threshold: settings.injection_score_threshold,
    };

    let app = build_router(state);
    let listener = tokio::net::TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!(addr = %settings.bind_addr, "sentinel-server listening");
    axum::serve(listener, app).await?;
    Ok(())
}
