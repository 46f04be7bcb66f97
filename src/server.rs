//! HTTP + WebSocket server.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET`  | `/health` | Health check (returns version) |
//! | `GET`  | `/api/auth/user` | The authenticated principal |
//! | `POST` | `/api/content/detect-type` | Classify a URL |
//! | `POST` | `/api/content/process` | Run the ingestion pipeline |
//! | `GET`  | `/api/content?limit=` | Caller's items, newest first |
//! | `GET`  | `/api/content/search?q=` | Substring search over caller's items |
//! | `GET`  | `/api/content/{id}` | Item with takeaways and tags |
//! | `PATCH` | `/api/content/{id}` | Update title / body |
//! | `DELETE` | `/api/content/{id}` | Delete item, its vectors and derived rows |
//! | `GET`  | `/api/search/semantic?q=&limit=` | Vector similarity search |
//! | `POST` | `/api/takeaways` | Add a takeaway to an owned item |
//! | `PUT`  | `/api/takeaways/{id}` | Edit an owned takeaway |
//! | `GET`  | `/api/chat/{contentId}/messages` | Thread messages, oldest first |
//! | `POST` | `/api/chat/{contentId}/messages` | Post a user message |
//! | `POST` | `/api/chat/{contentId}/ai-response` | Ask the assistant |
//! | `GET`  | `/ws` | WebSocket relay |
//!
//! Everything under `/api` requires `Authorization: Bearer <token>`.
//! Errors use the envelope documented in [`crate::error`].
//!
//! # CORS
//!
//! All origins, methods, and headers are permitted.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use thoughtsynth_core::models::{ChatMessage, ContentItem, ContentType, ContentUpdate, Tag, Takeaway};
use thoughtsynth_core::vector::VectorMatch;

use crate::app::AppContext;
use crate::auth::AuthUser;
use crate::broadcast::{serve_socket, Hub};
use crate::config::Config;
use crate::error::ApiError;
use crate::extract::{classify, ExtractError};
use crate::ingest::{process_content, ProcessRequest};

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub ctx: Arc<AppContext>,
    /// Per-server connection registry for `/ws`.
    pub hub: Arc<Hub>,
}

impl AppState {
    pub fn new(ctx: AppContext) -> Self {
        Self {
            ctx: Arc::new(ctx),
            hub: Arc::new(Hub::new()),
        }
    }
}

/// Build the full router.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(handle_health))
        .route("/ws", get(handle_ws))
        .route("/api/auth/user", get(handle_auth_user))
        .route("/api/content/detect-type", post(handle_detect_type))
        .route("/api/content/process", post(handle_process))
        .route("/api/content", get(handle_list_content))
        .route("/api/content/search", get(handle_search_content))
        .route(
            "/api/content/{id}",
            get(handle_get_content)
                .patch(handle_update_content)
                .delete(handle_delete_content),
        )
        .route("/api/search/semantic", get(handle_semantic_search))
        .route("/api/takeaways", post(handle_create_takeaway))
        .route("/api/takeaways/{id}", put(handle_update_takeaway))
        .route(
            "/api/chat/{content_id}/messages",
            get(handle_list_messages).post(handle_post_message),
        )
        .route("/api/chat/{content_id}/ai-response", post(handle_ai_response))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the server on `[server].bind` and run until the process exits.
pub async fn run_server(config: &Config, memory: bool) -> anyhow::Result<()> {
    let ctx = AppContext::from_config(config, memory).await?;
    let app = build_router(AppState::new(ctx));

    let listener = tokio::net::TcpListener::bind(&config.server.bind).await?;
    tracing::info!(
        addr = %listener.local_addr()?,
        memory,
        "ThoughtSynth server listening"
    );
    axum::serve(listener, app).await?;
    Ok(())
}

/// Load an item and check the caller owns it.
async fn owned_item(ctx: &AppContext, user: &AuthUser, id: i64) -> Result<ContentItem, ApiError> {
    let item = ctx
        .store
        .get_content_item(id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("content item {} not found", id)))?;
    if item.owner_id != user.id {
        return Err(ApiError::Forbidden("access denied".to_string()));
    }
    Ok(item)
}

/// Trimmed, non-empty value. Used for URLs and queries.
fn required(value: Option<String>, what: &str) -> Result<String, ApiError> {
    required_text(value, what).map(|v| v.trim().to_string())
}

/// Non-blank user text, stored exactly as sent.
fn required_text(value: Option<String>, what: &str) -> Result<String, ApiError> {
    value
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| ApiError::Validation(format!("{} is required", what)))
}

/// Query-string limits are lenient: anything that is not a positive
/// integer falls back to the configured default.
fn parse_limit<T>(raw: Option<&str>, default: T) -> T
where
    T: std::str::FromStr + PartialOrd + Default,
{
    raw.and_then(|s| s.trim().parse::<T>().ok())
        .filter(|l| *l > T::default())
        .unwrap_or(default)
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

// ============ GET /ws ============

async fn handle_ws(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    let hub = state.hub.clone();
    ws.on_upgrade(move |socket| serve_socket(socket, hub))
}

// ============ GET /api/auth/user ============

async fn handle_auth_user(user: AuthUser) -> Json<AuthUser> {
    Json(user)
}

// ============ Content ============

#[derive(Deserialize)]
struct UrlBody {
    url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DetectTypeResponse {
    content_type: ContentType,
}

async fn handle_detect_type(
    _user: AuthUser,
    Json(body): Json<UrlBody>,
) -> Result<Json<DetectTypeResponse>, ApiError> {
    let url = required(body.url, "url")?;
    let content_type = classify(&url).map_err(|e| match e {
        ExtractError::InvalidUrl { .. } => ApiError::Validation(e.to_string()),
        other => ApiError::Upstream(other.to_string()),
    })?;
    Ok(Json(DetectTypeResponse { content_type }))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProcessBody {
    url: Option<String>,
    user_takeaways: Option<String>,
}

/// Ingestion failures answer 500 with the outcome body, not the error envelope.
async fn handle_process(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<ProcessBody>,
) -> Result<Response, ApiError> {
    let url = required(body.url, "url")?;
    let outcome = process_content(
        &state.ctx,
        &ProcessRequest {
            url,
            user_takeaways: body.user_takeaways,
            owner_id: user.id,
        },
    )
    .await;
    let status = if outcome.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    Ok((status, Json(outcome)).into_response())
}

#[derive(Deserialize)]
struct ListParams {
    limit: Option<String>,
}

async fn handle_list_content(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<ContentItem>>, ApiError> {
    let limit = parse_limit(
        params.limit.as_deref(),
        state.ctx.config.content.default_list_limit,
    );
    Ok(Json(
        state.ctx.store.list_content_items(&user.id, limit).await?,
    ))
}

#[derive(Deserialize)]
struct SearchParams {
    q: Option<String>,
    limit: Option<String>,
}

async fn handle_search_content(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SearchParams>,
) -> Result<Json<Vec<ContentItem>>, ApiError> {
    let q = required(params.q, "search query")?;
    let limit = parse_limit(
        params.limit.as_deref(),
        state.ctx.config.content.default_list_limit,
    );
    Ok(Json(
        state
            .ctx
            .store
            .search_content_items(&user.id, &q, limit)
            .await?,
    ))
}

#[derive(Serialize)]
struct ContentDetail {
    #[serde(flatten)]
    item: ContentItem,
    takeaways: Vec<Takeaway>,
    tags: Vec<Tag>,
}

async fn handle_get_content(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<ContentDetail>, ApiError> {
    let item = owned_item(&state.ctx, &user, id).await?;
    let takeaways = state.ctx.store.list_takeaways(id).await?;
    let tags = state.ctx.store.list_tags(id).await?;
    Ok(Json(ContentDetail {
        item,
        takeaways,
        tags,
    }))
}

async fn handle_update_content(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(update): Json<ContentUpdate>,
) -> Result<Json<ContentItem>, ApiError> {
    if update.is_empty() {
        return Err(ApiError::Validation("nothing to update".to_string()));
    }
    owned_item(&state.ctx, &user, id).await?;
    let item = state
        .ctx
        .store
        .update_content_item(id, &update)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("content item {} not found", id)))?;
    state.ctx.indexer.index_content(&item).await;
    Ok(Json(item))
}

#[derive(Serialize)]
struct MessageResponse {
    message: String,
}

async fn handle_delete_content(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<MessageResponse>, ApiError> {
    owned_item(&state.ctx, &user, id).await?;
    state.ctx.indexer.delete_content_vectors(id).await;
    if !state.ctx.store.delete_content_item(id).await? {
        return Err(ApiError::NotFound(format!("content item {} not found", id)));
    }
    tracing::info!(content_id = id, owner = %user.id, "deleted content item");
    Ok(Json(MessageResponse {
        message: "Content deleted successfully".to_string(),
    }))
}

// ============ GET /api/search/semantic ============

#[derive(Deserialize)]
struct SemanticParams {
    q: Option<String>,
    limit: Option<String>,
}

async fn handle_semantic_search(
    State(state): State<AppState>,
    user: AuthUser,
    Query(params): Query<SemanticParams>,
) -> Result<Json<Vec<VectorMatch>>, ApiError> {
    let q = required(params.q, "search query")?;
    if !state.ctx.indexer.is_enabled() {
        return Err(ApiError::EmbeddingsDisabled(
            "semantic search requires an embedding provider and a vector index".to_string(),
        ));
    }
    let limit = parse_limit(
        params.limit.as_deref(),
        state.ctx.config.content.semantic_default_limit,
    );
    let matches = state
        .ctx
        .indexer
        .semantic_search(&user.id, &q, limit)
        .await
        .map_err(|e| ApiError::Upstream(format!("semantic search failed: {:#}", e)))?;
    Ok(Json(matches))
}

// ============ Takeaways ============

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewTakeawayBody {
    content_item_id: i64,
    #[serde(alias = "takeawayText")]
    text: Option<String>,
}

#[derive(Deserialize)]
struct TakeawayTextBody {
    #[serde(alias = "takeawayText")]
    text: Option<String>,
}

async fn handle_create_takeaway(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<NewTakeawayBody>,
) -> Result<Json<Takeaway>, ApiError> {
    let text = required_text(body.text, "text")?;
    let item = owned_item(&state.ctx, &user, body.content_item_id).await?;
    let takeaway = state
        .ctx
        .store
        .create_takeaway(item.id, &user.id, &text)
        .await?;
    state.ctx.indexer.index_takeaway(&item, &takeaway).await;
    Ok(Json(takeaway))
}

async fn handle_update_takeaway(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<i64>,
    Json(body): Json<TakeawayTextBody>,
) -> Result<Json<Takeaway>, ApiError> {
    let text = required_text(body.text, "text")?;
    let not_found = || ApiError::NotFound(format!("takeaway {} not found", id));

    let existing = state.ctx.store.get_takeaway(id).await?.ok_or_else(not_found)?;
    if existing.owner_id != user.id {
        return Err(ApiError::Forbidden("access denied".to_string()));
    }
    let takeaway = state
        .ctx
        .store
        .update_takeaway(id, &text)
        .await?
        .ok_or_else(not_found)?;
    if let Some(item) = state
        .ctx
        .store
        .get_content_item(takeaway.content_item_id)
        .await?
    {
        state.ctx.indexer.index_takeaway(&item, &takeaway).await;
    }
    Ok(Json(takeaway))
}

// ============ Chat ============

async fn handle_list_messages(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(content_id): Path<i64>,
) -> Result<Json<Vec<ChatMessage>>, ApiError> {
    Ok(Json(state.ctx.chat.list_messages(content_id).await?))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PostMessageBody {
    message_text: Option<String>,
}

async fn handle_post_message(
    State(state): State<AppState>,
    user: AuthUser,
    Path(content_id): Path<i64>,
    Json(body): Json<PostMessageBody>,
) -> Result<Json<ChatMessage>, ApiError> {
    let text = required_text(body.message_text, "messageText")?;
    let message = state
        .ctx
        .chat
        .post_user_message(content_id, &user.id, &user.name, &text)
        .await?;
    Ok(Json(message))
}

#[derive(Deserialize)]
struct AiResponseBody {
    message: Option<String>,
    context: Option<String>,
}

async fn handle_ai_response(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(content_id): Path<i64>,
    Json(body): Json<AiResponseBody>,
) -> Result<Json<ChatMessage>, ApiError> {
    let message = required_text(body.message, "message")?;
    let context = body.context.filter(|c| !c.trim().is_empty());
    let reply = state
        .ctx
        .chat
        .post_ai_message(content_id, &message, context.as_deref())
        .await?;
    Ok(Json(reply))
}
