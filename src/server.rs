//! Graph editor HTTP server.
//!
//! Exposes the [`GraphEditor`] mutation API, the editor state handshake,
//! per-entity metadata, and the cached public node listing as a JSON API.
//!
//! # Endpoints
//!
//! | Method | Path | Auth | Description |
//! |--------|------|------|-------------|
//! | `POST` | `/graph-editor/save-position` | editor + CSRF | Store one node position |
//! | `POST` | `/graph-editor/save-positions` | editor + CSRF | Store many positions, per-entry report |
//! | `POST` | `/graph-editor/create-link` | editor + CSRF | Add a manual relation |
//! | `POST` | `/graph-editor/delete-link` | editor + CSRF | Remove a manual relation |
//! | `POST` | `/graph-editor/update-image` | editor + CSRF | Set the node image |
//! | `POST` | `/graph-editor/update-params` | editor + CSRF | Update several graph fields |
//! | `POST` | `/graph-editor/toggle-visibility` | editor + CSRF | Show or hide a node |
//! | `GET`  | `/graph-editor/state` | none | Caller capabilities and CSRF token |
//! | `GET`  | `/graph-editor/meta/{entityId}` | editor | All fields of one entity |
//! | `GET`  | `/graph/nodes` | none | Visible nodes (cached) |
//! | `GET`  | `/health` | none | Health check (returns version) |
//!
//! # Error Contract
//!
//! ```json
//! { "success": false, "errorKind": "NotFound", "message": "entity not found: 42", "httpStatus": 404 }
//! ```
//!
//! Validation failures add a `details` object with the failing key and
//! rule. `UpdateFailed` adds the keys that were written anyway.
//!
//! Mutating handlers read the body as raw bytes and authorize the caller
//! before parsing it, so an unauthorized request never sees a 400.
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted so the editor script can
//! call the API from the site's own pages.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{
        header::{AsHeaderName, AUTHORIZATION},
        HeaderMap, StatusCode,
    },
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tower_http::cors::{Any, CorsLayer};
use tracing::{error, info};

use archi_graph_core::{
    AttachmentId, EntityId, GraphEditor, MetaManager, Namespace, PositionUpdate, SchemaRegistry,
    Store,
};

use crate::auth::{Authenticator, User, CSRF_HEADER};
use crate::cache::{GraphCache, GraphSnapshot};
use crate::config::Config;
use crate::sqlite_store::SqliteStore;

/// Shared application state passed to all route handlers via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    editor: GraphEditor,
    cache: Arc<GraphCache>,
    auth: Arc<Authenticator>,
}

impl AppState {
    /// Wire the editor, its metadata facade, and the node cache around `store`.
    pub fn new(config: &Config, store: Arc<dyn Store>) -> Self {
        let meta = MetaManager::new(Arc::new(SchemaRegistry::builtin()), store);
        let cache = Arc::new(GraphCache::new(
            meta.clone(),
            Duration::from_secs(config.cache.ttl_secs),
        ));
        Self {
            editor: GraphEditor::new(meta, cache.clone()),
            cache,
            auth: Arc::new(Authenticator::new(&config.auth)),
        }
    }
}

/// Build the router. Separate from [`run_server`] so tests can serve it on
/// an ephemeral port.
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/graph-editor/save-position", post(handle_save_position))
        .route("/graph-editor/save-positions", post(handle_save_positions))
        .route("/graph-editor/create-link", post(handle_create_link))
        .route("/graph-editor/delete-link", post(handle_delete_link))
        .route("/graph-editor/update-image", post(handle_update_image))
        .route("/graph-editor/update-params", post(handle_update_params))
        .route("/graph-editor/toggle-visibility", post(handle_toggle_visibility))
        .route("/graph-editor/state", get(handle_editor_state))
        .route("/graph-editor/meta/{entity_id}", get(handle_entity_meta))
        .route("/graph/nodes", get(handle_graph_nodes))
        .route("/health", get(handle_health))
        .layer(cors)
        .with_state(state)
}

/// Starts the HTTP server on `[server].bind` against the SQLite database.
///
/// Run `archi-graph init` first; the server does not create tables.
pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    let store: Arc<dyn Store> = Arc::new(SqliteStore::open(config).await?);
    let app = router(AppState::new(config, store));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    info!(
        bind = %config.server.bind,
        users = config.auth.users.len(),
        "graph editor API listening"
    );
    println!("Graph editor API listening on http://{}", config.server.bind);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============ Error response ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    success: bool,
    error_kind: &'static str,
    message: String,
    http_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

/// Error type that converts into an Axum HTTP response.
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    kind: &'static str,
    message: String,
    details: Option<Value>,
}

impl AppError {
    fn forbidden() -> Self {
        archi_graph_core::Error::Forbidden.into()
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            kind: "BadRequest",
            message: message.into(),
            details: None,
        }
    }
}

impl From<archi_graph_core::Error> for AppError {
    fn from(err: archi_graph_core::Error) -> Self {
        use archi_graph_core::Error;

        let status =
            StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let details = match &err {
            Error::Validation(v) => Some(json!(v)),
            Error::UpdateFailed {
                updated, errors, ..
            } => Some(json!({ "updated": updated, "errors": errors })),
            Error::Store(e) => {
                error!(error = %e, "store failure");
                None
            }
            _ => None,
        };
        Self {
            status,
            kind: err.kind(),
            message: err.to_string(),
            details,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error_kind: self.kind,
            message: self.message,
            http_status: self.status.as_u16(),
            details: self.details,
        };
        (self.status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, AppError>;

// ============ Authorization ============

fn header<'a>(headers: &'a HeaderMap, name: impl AsHeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

impl AppState {
    fn caller(&self, headers: &HeaderMap) -> Option<&User> {
        self.auth.authenticate(header(headers, AUTHORIZATION))
    }

    /// Gate for mutating requests: a known user with the editor capability
    /// presenting their CSRF token.
    fn mutating_caller(&self, headers: &HeaderMap) -> Result<&User, AppError> {
        let user = self.caller(headers).ok_or_else(AppError::forbidden)?;
        if !user.role.can_edit_graph() {
            return Err(AppError::forbidden());
        }
        if !self.auth.verify_csrf(user.id, header(headers, CSRF_HEADER)) {
            return Err(AppError::forbidden());
        }
        Ok(user)
    }
}

fn parse_body<T: DeserializeOwned>(body: &Bytes) -> Result<T, AppError> {
    serde_json::from_slice(body)
        .map_err(|e| AppError::bad_request(format!("invalid request body: {}", e)))
}

// ============ POST /graph-editor/save-position ============

async fn handle_save_position(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = state.mutating_caller(&headers)?;
    // Same body shape as one batch entry; missing coordinates read as 0.
    let req: PositionUpdate = parse_body(&body)?;
    let position = state
        .editor
        .save_position(user, req.entity_id, &req.x, &req.y)
        .await?;
    Ok(Json(json!({
        "success": true,
        "entityId": req.entity_id,
        "position": position,
        "message": "Position saved",
    })))
}

// ============ POST /graph-editor/save-positions ============

#[derive(Deserialize)]
struct SavePositionsRequest {
    positions: Vec<PositionUpdate>,
}

/// Always 200 once authorized; each entry reports its own outcome.
async fn handle_save_positions(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = state.mutating_caller(&headers)?;
    let req: SavePositionsRequest = parse_body(&body)?;
    let report = state.editor.save_positions_batch(user, &req.positions).await?;
    let message = if report.is_complete() {
        format!("{} positions saved", report.saved())
    } else {
        format!(
            "{} positions saved, {} failed",
            report.saved(),
            report.failed()
        )
    };
    Ok(Json(json!({
        "success": report.is_complete(),
        "saved": report.saved(),
        "failed": report.failed(),
        "results": report.results,
        "message": message,
    })))
}

// ============ POST /graph-editor/create-link, delete-link ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkRequest {
    source_id: EntityId,
    target_id: EntityId,
}

async fn handle_create_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = state.mutating_caller(&headers)?;
    let req: LinkRequest = parse_body(&body)?;
    let related = state
        .editor
        .create_link(user, req.source_id, req.target_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "sourceId": req.source_id,
        "targetId": req.target_id,
        "relatedArticles": related,
        "message": "Link created",
    })))
}

async fn handle_delete_link(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = state.mutating_caller(&headers)?;
    let req: LinkRequest = parse_body(&body)?;
    let related = state
        .editor
        .delete_link(user, req.source_id, req.target_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "sourceId": req.source_id,
        "targetId": req.target_id,
        "relatedArticles": related,
        "message": "Link deleted",
    })))
}

// ============ POST /graph-editor/update-image ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateImageRequest {
    entity_id: EntityId,
    image_id: AttachmentId,
}

async fn handle_update_image(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = state.mutating_caller(&headers)?;
    let req: UpdateImageRequest = parse_body(&body)?;
    let url = state
        .editor
        .update_node_image(user, req.entity_id, req.image_id)
        .await?;
    Ok(Json(json!({
        "success": true,
        "entityId": req.entity_id,
        "imageId": req.image_id,
        "imageUrl": url,
        "message": "Image updated",
    })))
}

// ============ POST /graph-editor/update-params ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateParamsRequest {
    entity_id: EntityId,
    params: Map<String, Value>,
}

async fn handle_update_params(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = state.mutating_caller(&headers)?;
    let req: UpdateParamsRequest = parse_body(&body)?;
    let updated = state
        .editor
        .update_node_params(user, req.entity_id, &req.params)
        .await?;
    Ok(Json(json!({
        "success": true,
        "entityId": req.entity_id,
        "updated": updated,
        "message": format!("{} parameters updated", updated.len()),
    })))
}

// ============ POST /graph-editor/toggle-visibility ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ToggleVisibilityRequest {
    entity_id: EntityId,
    visible: bool,
}

async fn handle_toggle_visibility(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult {
    let user = state.mutating_caller(&headers)?;
    let req: ToggleVisibilityRequest = parse_body(&body)?;
    let visible = state
        .editor
        .toggle_visibility(user, req.entity_id, req.visible)
        .await?;
    let message = if visible {
        "Node shown in graph"
    } else {
        "Node hidden from graph"
    };
    Ok(Json(json!({
        "success": true,
        "entityId": req.entity_id,
        "visible": visible,
        "message": message,
    })))
}

// ============ GET /graph-editor/state ============

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EditorStateResponse {
    can_edit: bool,
    user_id: i64,
    user_name: String,
    is_admin: bool,
    csrf_token: Option<String>,
}

/// Anonymous callers get `canEdit: false` and no token.
async fn handle_editor_state(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Json<EditorStateResponse> {
    let response = match state.caller(&headers) {
        Some(user) => EditorStateResponse {
            can_edit: user.role.can_edit_graph(),
            user_id: user.id,
            user_name: user.name.clone(),
            is_admin: user.is_admin(),
            csrf_token: Some(state.auth.csrf_token(user.id)),
        },
        None => EditorStateResponse {
            can_edit: false,
            user_id: 0,
            user_name: String::new(),
            is_admin: false,
            csrf_token: None,
        },
    };
    Json(response)
}

// ============ GET /graph-editor/meta/{entityId} ============

#[derive(Deserialize)]
struct MetaQuery {
    namespace: Option<String>,
}

/// The id and namespace are taken as raw strings and parsed after the
/// capability check, so a non-editor gets 403 whatever the path holds.
async fn handle_entity_meta(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
    Query(query): Query<MetaQuery>,
) -> ApiResult {
    let user = state.caller(&headers).ok_or_else(AppError::forbidden)?;
    if !user.role.can_edit_graph() {
        return Err(AppError::forbidden());
    }
    let entity_id: EntityId = raw_id
        .trim()
        .parse()
        .map_err(|_| AppError::bad_request(format!("invalid entity id: '{}'", raw_id)))?;
    let namespace = query
        .namespace
        .as_deref()
        .filter(|s| !s.is_empty())
        .map(str::parse::<Namespace>)
        .transpose()
        .map_err(|e| AppError::bad_request(e.to_string()))?;

    let (entity, entries) = state.editor.entity_meta(user, entity_id, namespace).await?;
    let fields: Map<String, Value> = entries
        .into_iter()
        .map(|e| {
            (
                e.key.to_string(),
                json!({ "value": e.value, "definition": e.definition }),
            )
        })
        .collect();
    Ok(Json(json!({
        "success": true,
        "entityId": entity.id,
        "kind": entity.kind,
        "title": entity.title,
        "fields": fields,
    })))
}

// ============ GET /graph/nodes ============

async fn handle_graph_nodes(
    State(state): State<AppState>,
) -> Result<Json<GraphSnapshot>, AppError> {
    Ok(Json(state.cache.snapshot().await?))
}

// ============ GET /health ============

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    version: String,
}

async fn handle_health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
