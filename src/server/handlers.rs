//! HTTP request handlers.
//!
//! Every session route identifies the caller through the `x-user-id` header
//! and checks ownership before touching the session. Errors are returned as
//! `(StatusCode, Json<ErrorResponse>)` via [`CoachError::into_http`].

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{rejection::JsonRejection, FromRequestParts, Path, State},
    http::{request::Parts, StatusCode},
    response::sse::{Event, Sse},
    Json,
};
use futures::stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;

use super::types::*;
use crate::error::CoachError;
use crate::session::{OwnerId, ResponseKind};
use crate::workflow::{GenerationWorkflow, RespondOutcome};

/// Header carrying the caller's numeric user id.
pub const PRINCIPAL_HEADER: &str = "x-user-id";

type ApiError = (StatusCode, Json<ErrorResponse>);

/// Application state shared across all handlers
pub struct AppState {
    /// The session workflow (and through it, the session store)
    pub workflow: GenerationWorkflow,
    /// Shutdown token for graceful server shutdown
    pub shutdown_token: CancellationToken,
}

impl AppState {
    pub fn new(workflow: GenerationWorkflow) -> (Arc<Self>, CancellationToken) {
        let shutdown_token = CancellationToken::new();
        let state = Arc::new(Self {
            workflow,
            shutdown_token: shutdown_token.clone(),
        });
        (state, shutdown_token)
    }
}

/// The authenticated caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Principal(pub OwnerId);

impl<S> FromRequestParts<S> for Principal
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(PRINCIPAL_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse::<OwnerId>().ok())
            .map(Principal)
            .ok_or_else(|| CoachError::Unauthorized.into_http())
    }
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check endpoint.
///
/// ```json
/// { "status": "ok", "version": "0.1.0", "sessions": 2 }
/// ```
pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse::healthy(state.workflow.store().count()))
}

// =============================================================================
// Session Lifecycle
// =============================================================================

/// Start a session.
///
/// The body is optional; `{"goal": "..."}` seeds the conversation.
///
/// # Response
///
/// - `201 Created`: `{"session_id": "...", "created_at": "..."}`
/// - `400 Bad Request`: Body is not valid JSON
/// - `401 Unauthorized`: Missing or invalid `x-user-id`
pub async fn create_session(
    State(state): State<Arc<AppState>>,
    Principal(owner_id): Principal,
    body: Bytes,
) -> Result<(StatusCode, Json<CreateSessionResponse>), ApiError> {
    let req = if body.iter().all(u8::is_ascii_whitespace) {
        CreateSessionRequest::default()
    } else {
        serde_json::from_slice::<CreateSessionRequest>(&body)
            .map_err(|e| CoachError::Validation(e.to_string()).into_http())?
    };

    let session = state
        .workflow
        .start(owner_id, req.goal.as_deref())
        .map_err(CoachError::into_http)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateSessionResponse {
            session_id: session.id.clone(),
            created_at: session.created_at.to_rfc3339(),
        }),
    ))
}

/// Get a snapshot of a session.
///
/// - `200 OK`: Session found
/// - `403 Forbidden`: Owned by another user
/// - `404 Not Found`: Session does not exist
pub async fn get_session(
    State(state): State<Arc<AppState>>,
    Principal(owner_id): Principal,
    Path(session_id): Path<String>,
) -> Result<Json<SessionInfo>, ApiError> {
    state
        .workflow
        .snapshot(&session_id, owner_id)
        .map(|session| Json(SessionInfo::from(&session)))
        .map_err(CoachError::into_http)
}

/// Delete a session, closing its stream if one is bound.
///
/// - `204 No Content`: Session deleted
/// - `403 Forbidden` / `404 Not Found`
pub async fn delete_session(
    State(state): State<Arc<AppState>>,
    Principal(owner_id): Principal,
    Path(session_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .workflow
        .delete(&session_id, owner_id)
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(CoachError::into_http)
}

// =============================================================================
// Streaming
// =============================================================================

/// Bind an SSE stream to the session.
///
/// Binding an idle session starts its first generation. Closing the
/// connection unbinds the stream but keeps the session.
///
/// ```text
/// data: {"type":"connected","session_id":"..."}
///
/// data: {"type":"generating","attempt":0}
///
/// data: {"type":"artifact","artifact":{"items":[...]},"regeneration_count":0}
///
/// data: {"type":"complete"}
/// ```
pub async fn stream_session(
    State(state): State<Arc<AppState>>,
    Principal(owner_id): Principal,
    Path(session_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let events = state
        .workflow
        .bind(&session_id, owner_id)
        .map_err(CoachError::into_http)?;

    let stream = events
        .filter_map(|event| async move { event.to_sse() })
        .map(Ok);
    Ok(Sse::new(stream))
}

// =============================================================================
// Respond
// =============================================================================

/// Accept or reject the presented artifact.
///
/// # Response
///
/// - `202 Accepted`: Rejected; a new generation was started
/// - `200 OK`: Accepted and committed
/// - `400 Bad Request`: Response is not "accept" or "reject"
/// - `409 Conflict`: No artifact, already committed, busy, or limit reached
/// - `502 Bad Gateway`: The commit failed (the session stays open)
pub async fn respond(
    State(state): State<Arc<AppState>>,
    Principal(owner_id): Principal,
    Path(session_id): Path<String>,
    payload: Result<Json<RespondRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RespondResponse>), ApiError> {
    let Json(req) =
        payload.map_err(|e| CoachError::Validation(e.body_text()).into_http())?;
    let response: ResponseKind = req.response.parse().map_err(CoachError::into_http)?;

    let outcome = state
        .workflow
        .respond(&session_id, owner_id, response)
        .await
        .map_err(CoachError::into_http)?;

    let status = match outcome {
        RespondOutcome::Regenerating { .. } => StatusCode::ACCEPTED,
        RespondOutcome::Committed { .. } => StatusCode::OK,
    };
    Ok((
        status,
        Json(RespondResponse {
            session_id,
            outcome,
        }),
    ))
}
