//! HTTP API: the write path, the catch-up read, the agent poll surface and
//! the push-channel upgrade, all speaking the `{ok, data, error}` envelope.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::{middleware, routing, Json, Router};
use hubcast::types::{
    AcknowledgeRequest, AcknowledgeResponse, AgentActivityResponse, MessageBatch,
    PostMessageRequest, Sender,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::activity::AgentActivity;
use crate::broadcast::Broadcaster;
use crate::message_log::MessageLog;
use crate::registry::ConnectionRegistry;
use crate::seen::SeenTracker;

#[derive(Clone)]
pub struct ApiState {
    pub message_log: MessageLog,
    pub seen: SeenTracker,
    pub activity: AgentActivity,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Broadcaster,
    pub api_key: Option<String>,
}

impl ApiState {
    /// Shared-token precondition check. When no key is configured the hub is
    /// open (local development); identity policy itself lives upstream.
    pub fn token_allowed(&self, provided: Option<&str>) -> bool {
        match self.api_key.as_deref() {
            None => true,
            Some(expected) => provided == Some(expected),
        }
    }
}

/// API key from the environment; empty values count as unset.
pub fn configured_api_key() -> Option<String> {
    std::env::var("HUB_API_KEY")
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub fn hub_router(state: ApiState) -> Router {
    let protected = Router::new()
        .route(
            "/v1/workspaces/{workspace_id}/messages",
            routing::post(post_message).get(list_messages),
        )
        .route(
            "/v1/workspaces/{workspace_id}/messages/unseen",
            routing::get(list_unseen),
        )
        .route(
            "/v1/workspaces/{workspace_id}/messages/acknowledge",
            routing::post(acknowledge),
        )
        .route(
            "/v1/workspaces/{workspace_id}/agent-activity",
            routing::get(agent_activity),
        )
        .with_state(state.clone())
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    // The push upgrade authenticates via query token inside the handler; a
    // browser handshake cannot carry headers.
    Router::new()
        .route("/health", routing::get(health))
        .route(
            "/v1/workspaces/{workspace_id}/ws",
            routing::get(crate::push::workspace_ws),
        )
        .merge(protected)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Envelope helpers
// ---------------------------------------------------------------------------

type ApiFailure = (StatusCode, Json<Value>);

fn ok_envelope(data: impl serde::Serialize) -> Json<Value> {
    Json(json!({ "ok": true, "data": data }))
}

fn error_envelope(status: StatusCode, code: &str, message: impl Into<String>) -> ApiFailure {
    (
        status,
        Json(json!({
            "ok": false,
            "error": { "code": code, "message": message.into() }
        })),
    )
}

fn internal_error(err: anyhow::Error) -> ApiFailure {
    tracing::error!(error = %err, "request failed");
    error_envelope(
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal_error",
        err.to_string(),
    )
}

// ---------------------------------------------------------------------------
// Middleware
// ---------------------------------------------------------------------------

async fn auth_middleware(
    State(state): State<ApiState>,
    request: axum::http::Request<axum::body::Body>,
    next: middleware::Next,
) -> Result<axum::response::Response, ApiFailure> {
    if state.api_key.is_none() {
        return Ok(next.run(request).await);
    }

    // Accept token from X-API-Key header or Authorization: Bearer <token>
    let provided = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .or_else(|| {
            request
                .headers()
                .get("authorization")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
                .map(str::trim)
                .filter(|value| !value.is_empty())
        });

    if !state.token_allowed(provided) {
        return Err(error_envelope(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "Missing or invalid API key",
        ));
    }

    Ok(next.run(request).await)
}

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "workspace-hub",
        "version": env!("CARGO_PKG_VERSION"),
        "wsConnections": state.registry.connection_count(),
    }))
}

async fn post_message(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
    Json(body): Json<PostMessageRequest>,
) -> Result<Json<Value>, ApiFailure> {
    if body.content.trim().is_empty() {
        return Err(error_envelope(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "content must not be empty",
        ));
    }

    let message = state
        .message_log
        .persist(
            &workspace_id,
            &body.sender,
            &body.content,
            body.message_kind,
            body.metadata,
        )
        .await
        .map_err(internal_error)?;

    // Fan-out strictly after persist returned: no viewer observes message
    // N+1 before N within a workspace.
    state.broadcaster.fan_out(&workspace_id, &message);

    if let Sender::Agent { .. } = message.sender {
        state
            .activity
            .touch(&workspace_id, &message.sender.consumer_key())
            .await
            .map_err(internal_error)?;
    }

    Ok(ok_envelope(message))
}

#[derive(Debug, Deserialize, Default)]
struct ListQuery {
    after_id: Option<i64>,
    limit: Option<i64>,
}

async fn list_messages(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>, ApiFailure> {
    let after_id = query.after_id.unwrap_or(0);
    let limit = query.limit.filter(|l| *l > 0);

    // Fetch one past the page to learn whether more remain.
    let mut messages = state
        .message_log
        .list_since(&workspace_id, after_id, limit.map(|l| l + 1))
        .await
        .map_err(internal_error)?;

    let has_more = match limit {
        Some(limit) => {
            let has_more = messages.len() as i64 > limit;
            messages.truncate(limit as usize);
            has_more
        }
        None => false,
    };

    Ok(ok_envelope(MessageBatch { messages, has_more }))
}

#[derive(Debug, Deserialize, Default)]
struct UnseenQuery {
    consumer: Option<String>,
}

async fn list_unseen(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
    Query(query): Query<UnseenQuery>,
) -> Result<Json<Value>, ApiFailure> {
    let Some(consumer) = query.consumer.filter(|c| !c.trim().is_empty()) else {
        return Err(error_envelope(
            StatusCode::BAD_REQUEST,
            "invalid_request",
            "Missing required query parameter: consumer",
        ));
    };

    let messages = state
        .message_log
        .list_unseen_for(&workspace_id, &consumer)
        .await
        .map_err(internal_error)?;

    touch_if_agent(&state, &workspace_id, &consumer).await?;

    Ok(ok_envelope(messages))
}

async fn acknowledge(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
    Json(body): Json<AcknowledgeRequest>,
) -> Result<Json<Value>, ApiFailure> {
    let acknowledged = state
        .seen
        .mark_seen(&workspace_id, &body.message_ids, &body.consumer)
        .await
        .map_err(internal_error)?;

    touch_if_agent(&state, &workspace_id, &body.consumer).await?;

    Ok(ok_envelope(AcknowledgeResponse { acknowledged }))
}

async fn agent_activity(
    State(state): State<ApiState>,
    Path(workspace_id): Path<String>,
) -> Result<Json<Value>, ApiFailure> {
    let activity = state
        .activity
        .last_activity(&workspace_id)
        .await
        .map_err(internal_error)?;

    Ok(ok_envelope(AgentActivityResponse { activity }))
}

/// The activity record tracks the agent side; human consumers of the poll
/// surface do not move the presence dot.
async fn touch_if_agent(
    state: &ApiState,
    workspace_id: &str,
    consumer: &str,
) -> Result<(), ApiFailure> {
    if consumer.starts_with("agent:") {
        state
            .activity
            .touch(workspace_id, consumer)
            .await
            .map_err(internal_error)?;
    }
    Ok(())
}
