use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{ConnectInfo, DefaultBodyLimit, OriginalUri, Path, State},
    http::{header, HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use serde::Deserialize;
use tower_http::{services::ServeDir, trace::TraceLayer};
use uuid::Uuid;

use crate::{
    capture::{self, CaptureBody},
    db::TrapStore,
    domain::{
        CaptureResponse, CapturedRequestView, CreateTrapRequest, DeleteResponse, Trap,
        TrapRequestsResponse, CAUGHT_MESSAGE,
    },
    errors::AppError,
    views::{TrapSummary, Views},
};

const HOME_TRAP_LIMIT: u32 = 50;
const REQUEST_LIST_LIMIT: u32 = 100;
const CREATE_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn TrapStore>,
    pub views: Arc<Views>,
    pub trust_proxy: bool,
    pub max_body_size_bytes: usize,
    pub static_dir: PathBuf,
}

pub fn router(state: AppState) -> Router {
    let body_limit = state.max_body_size_bytes;
    let static_files = ServeDir::new(&state.static_dir);

    Router::new()
        .route("/", get(index))
        .route("/traps", post(create_trap))
        .route("/traps/:id", get(dashboard).delete(delete_trap))
        .route("/api/traps/:id/requests", get(list_requests))
        .route("/t/:id", any(capture))
        .route("/t/:id/", any(capture))
        .route("/t/:id/*rest", any(capture))
        .nest_service("/static", static_files)
        .fallback(not_found)
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
}

#[derive(Debug, Deserialize)]
struct TrapPath {
    id: String,
}

/// Records any method sent to `/t/{id}` or anything beneath it.
async fn capture(
    State(state): State<AppState>,
    Path(TrapPath { id }): Path<TrapPath>,
    method: Method,
    OriginalUri(uri): OriginalUri,
    headers: HeaderMap,
    peer: Option<ConnectInfo<SocketAddr>>,
    body: CaptureBody,
) -> Result<Json<CaptureResponse>, AppError> {
    if let Err(err) = state.store.get_trap(&id).await {
        if matches!(err, AppError::NotFound) {
            tracing::debug!(trap_id = %id, %method, "capture for unknown trap");
        }
        return Err(err);
    }

    let ip = capture::client_ip(&headers, peer.map(|ConnectInfo(addr)| addr), state.trust_proxy);
    let record = capture::build_record(&id, &method, &uri, &headers, &body, ip);
    tracing::debug!(trap_id = %id, %method, path = %record.path, "request captured");
    state.store.insert_request(record).await?;

    Ok(Json(CaptureResponse {
        message: CAUGHT_MESSAGE,
        trap_id: id,
        method: method.to_string(),
    }))
}

async fn index(State(state): State<AppState>) -> Result<Response, AppError> {
    let traps = state.store.list_recent_traps(HOME_TRAP_LIMIT).await?;
    let ids: Vec<String> = traps.iter().map(|trap| trap.id.clone()).collect();
    let counts = state.store.count_requests_by_trap(&ids).await?;

    let summaries: Vec<TrapSummary> = traps
        .into_iter()
        .map(|trap| {
            let count = counts.get(&trap.id).copied().unwrap_or(0);
            TrapSummary::new(trap, count)
        })
        .collect();

    Ok(state.views.index(&summaries)?.into_response())
}

async fn create_trap(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: CaptureBody,
) -> Result<Response, AppError> {
    let requested = requested_name(&headers, body);

    let mut attempts = 0;
    let id = loop {
        attempts += 1;
        let id = new_trap_id();
        let name = Trap::display_name(&id, requested.name.as_deref());
        match state.store.create_trap(&id, &name).await {
            Ok(()) => break id,
            Err(AppError::DuplicateKey(_)) if attempts < CREATE_ATTEMPTS => {
                tracing::warn!(trap_id = %id, attempts, "trap id collision, retrying");
            }
            Err(err) => return Err(err),
        }
    };

    tracing::info!(trap_id = %id, "trap created");
    Ok((
        StatusCode::FOUND,
        [(header::LOCATION, format!("/traps/{id}"))],
    )
        .into_response())
}

/// First segment of a v4 UUID: eight lowercase hex characters.
fn new_trap_id() -> String {
    let uuid = Uuid::new_v4().to_string();
    uuid.split('-').next().unwrap_or(&uuid).to_owned()
}

fn requested_name(headers: &HeaderMap, body: CaptureBody) -> CreateTrapRequest {
    let is_form = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("application/x-www-form-urlencoded"));

    match body {
        CaptureBody::Structured(value) => serde_json::from_value(value).unwrap_or_default(),
        CaptureBody::Text(form) if is_form => CreateTrapRequest {
            name: url::form_urlencoded::parse(form.as_bytes())
                .find(|(key, _)| key == "name")
                .map(|(_, value)| value.into_owned()),
        },
        _ => CreateTrapRequest::default(),
    }
}

async fn dashboard(
    State(state): State<AppState>,
    Path(id): Path<String>,
    headers: HeaderMap,
) -> Result<Response, AppError> {
    let trap = match state.store.get_trap(&id).await {
        Ok(trap) => trap,
        Err(AppError::NotFound) => {
            return Ok((StatusCode::NOT_FOUND, state.views.not_found()?).into_response())
        }
        Err(err) => return Err(err),
    };
    let requests = state
        .store
        .list_requests_by_trap(&id, REQUEST_LIST_LIMIT)
        .await?;

    let base_url = base_url(&headers, state.trust_proxy);
    Ok(state
        .views
        .dashboard(&trap, requests, &base_url)?
        .into_response())
}

fn base_url(headers: &HeaderMap, trust_proxy: bool) -> String {
    let header_str = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());

    let scheme = if trust_proxy {
        header_str("x-forwarded-proto").unwrap_or("http")
    } else {
        "http"
    };
    let host = header_str(header::HOST.as_str()).unwrap_or("localhost");
    format!("{scheme}://{host}")
}

async fn list_requests(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<TrapRequestsResponse>, AppError> {
    let trap = state.store.get_trap(&id).await?;
    let requests = state
        .store
        .list_requests_by_trap(&id, REQUEST_LIST_LIMIT)
        .await?
        .into_iter()
        .map(CapturedRequestView::from)
        .collect();

    Ok(Json(TrapRequestsResponse { trap, requests }))
}

async fn delete_trap(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteResponse>, AppError> {
    state.store.delete_trap_cascade(&id).await?;
    tracing::info!(trap_id = %id, "trap deleted");
    Ok(Json(DeleteResponse { ok: true }))
}

async fn not_found(State(state): State<AppState>) -> Result<Response, AppError> {
    Ok((StatusCode::NOT_FOUND, state.views.not_found()?).into_response())
}
