use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::warn;

use foreman_runtime::{
    AgentBrief, Coordinator, Error, IngestOutcome, KillOptions, ProcessKind, ProcessSupervisor,
};
use foreman_store::EventFilter;
use foreman_types::{BrakePayload, Resolution};

use crate::hub::WsHub;

/// Thin HTTP translation layer over the coordinator. The socket is
/// outbound-only; every command arrives here.
#[derive(Clone)]
pub struct AppState {
    pub coordinator: Coordinator,
    pub hub: Arc<WsHub>,
    pub supervisor: Arc<ProcessSupervisor>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_upgrade))
        .route("/api/events", post(ingest_event).get(query_events))
        .route("/api/state", get(get_state))
        .route(
            "/api/artifacts/{agent_id}/{artifact_id}/content",
            put(put_artifact_content).get(get_artifact_content),
        )
        .route("/api/decisions", get(list_decisions))
        .route("/api/decisions/{id}/resolve", post(resolve_decision))
        .route("/api/agents", post(spawn_agent))
        .route("/api/agents/{id}", delete(kill_agent))
        .route("/api/brake", post(engage_brake).delete(release_brake))
        .route("/api/pipelines", post(run_pipeline))
        .route("/api/quarantine", get(list_quarantine).delete(clear_quarantine))
        .route("/api/metrics", get(get_metrics))
        .with_state(state)
}

struct ApiError(Error);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::UnknownAgent(_) | Error::UnknownPlugin(_) => StatusCode::NOT_FOUND,
            Error::Conflict(_) => StatusCode::CONFLICT,
            Error::Config(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status == StatusCode::INTERNAL_SERVER_ERROR {
            warn!(error = %self.0, "request failed");
        }
        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        Self(err)
    }
}

async fn ws_upgrade(State(state): State<AppState>, ws: WebSocketUpgrade) -> Response {
    // Snapshot at upgrade time so the first frame reflects the version the
    // client will resume from
    match state.coordinator.state_message() {
        Ok(state_sync) => {
            let hub = Arc::clone(&state.hub);
            ws.on_upgrade(move |socket| hub.run_socket(socket, state_sync))
        }
        Err(err) => ApiError(err).into_response(),
    }
}

async fn ingest_event(
    State(state): State<AppState>,
    Json(payload): Json<Value>,
) -> impl IntoResponse {
    match state.coordinator.ingest(payload) {
        IngestOutcome::Published => (StatusCode::ACCEPTED, Json(json!({ "status": "published" }))),
        IngestOutcome::Deduplicated => {
            (StatusCode::OK, Json(json!({ "status": "duplicate" })))
        }
        IngestOutcome::Quarantined => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "status": "quarantined" })),
        ),
    }
}

async fn get_state(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let message = state.coordinator.state_message()?;
    Ok(Json(message))
}

#[derive(Deserialize)]
struct EventsQuery {
    agent_id: Option<String>,
    run_id: Option<String>,
    event_type: Option<String>,
    since: Option<DateTime<Utc>>,
    limit: Option<usize>,
}

async fn query_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let filter = EventFilter {
        agent_id: query.agent_id,
        run_id: query.run_id,
        event_types: query.event_type.map(|t| vec![t]),
        since: query.since,
        limit: query.limit,
    };
    let events = state
        .coordinator
        .store()
        .lock()
        .unwrap()
        .query_events(&filter)
        .map_err(Error::Store)?;
    Ok(Json(events))
}

async fn put_artifact_content(
    State(state): State<AppState>,
    Path((agent_id, artifact_id)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    state
        .coordinator
        .store()
        .lock()
        .unwrap()
        .store_artifact_content(&agent_id, &artifact_id, &body, mime_type)
        .map_err(Error::Store)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn get_artifact_content(
    State(state): State<AppState>,
    Path((agent_id, artifact_id)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let stored = state
        .coordinator
        .store()
        .lock()
        .unwrap()
        .get_artifact_content(&agent_id, &artifact_id)
        .map_err(Error::Store)?;
    match stored {
        Some(content) => {
            let mime = content
                .mime_type
                .unwrap_or_else(|| "application/octet-stream".to_string());
            Ok(([(header::CONTENT_TYPE, mime)], content.content).into_response())
        }
        None => Ok(StatusCode::NOT_FOUND.into_response()),
    }
}

#[derive(Deserialize)]
struct DecisionsQuery {
    agent_id: Option<String>,
    #[serde(default)]
    include_settled: bool,
}

async fn list_decisions(
    State(state): State<AppState>,
    Query(query): Query<DecisionsQuery>,
) -> impl IntoResponse {
    if query.include_settled {
        Json(state.coordinator.all_decisions())
    } else {
        Json(state.coordinator.pending_decisions(query.agent_id.as_deref()))
    }
}

async fn resolve_decision(
    State(state): State<AppState>,
    Path(decision_id): Path<String>,
    Json(resolution): Json<Resolution>,
) -> Result<impl IntoResponse, ApiError> {
    let settled = state
        .coordinator
        .resolve_decision(&decision_id, resolution)
        .await?;
    // A settled-or-unknown decision is a no-op, not an error
    Ok(Json(json!({ "resolved": settled.is_some() })))
}

#[derive(Deserialize)]
struct SpawnRequest {
    plugin: String,
    brief: AgentBrief,
}

async fn spawn_agent(
    State(state): State<AppState>,
    Json(request): Json<SpawnRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let handle = state
        .coordinator
        .spawn_agent(&request.plugin, request.brief)
        .await?;
    Ok((StatusCode::CREATED, Json(handle)))
}

#[derive(Deserialize)]
struct KillQuery {
    #[serde(default)]
    grace: bool,
}

async fn kill_agent(
    State(state): State<AppState>,
    Path(agent_id): Path<String>,
    Query(query): Query<KillQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let result = state
        .coordinator
        .kill_agent(
            &agent_id,
            KillOptions {
                grace: query.grace,
                grace_timeout_ms: None,
            },
        )
        .await?;
    Ok(Json(result))
}

async fn engage_brake(
    State(state): State<AppState>,
    Json(payload): Json<BrakePayload>,
) -> Result<impl IntoResponse, ApiError> {
    let braked = state.coordinator.engage_brake(payload).await?;
    Ok(Json(json!({ "braked_agents": braked })))
}

async fn release_brake(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    let released = state.coordinator.release_brake().await?;
    Ok(Json(json!({ "released_agents": released })))
}

async fn get_metrics(State(state): State<AppState>) -> impl IntoResponse {
    let bus = state.coordinator.bus();
    Json(json!({
        "bus": bus.metrics(),
        "sequence_gap_warnings": bus.sequence_gap_warnings(),
        "connected_clients": state.hub.connection_count(),
        "current_tick": state.coordinator.ticks().current_tick(),
    }))
}

#[derive(Deserialize)]
struct PipelineRequest {
    pipeline_id: String,
    program: String,
    #[serde(default)]
    args: Vec<String>,
}

async fn run_pipeline(
    State(state): State<AppState>,
    Json(request): Json<PipelineRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let pid = state.supervisor.start(
        &request.pipeline_id,
        ProcessKind::Pipeline,
        &request.program,
        &request.args,
    )?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "pid": pid }))))
}

async fn list_quarantine(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.coordinator.quarantined())
}

async fn clear_quarantine(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({ "cleared": state.coordinator.clear_quarantine() }))
}
