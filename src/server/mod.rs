//! HTTP/SSE surface of the coaching workflow.
//!
//! # Architecture
//!
//! ```text
//! +-----------------------------------------------+
//! |  Axum HTTP Server                             |
//! |  /health (GET)                -> health check |
//! |  /sessions (POST)             -> start        |
//! |  /sessions/{id} (GET)         -> snapshot     |
//! |  /sessions/{id} (DELETE)      -> delete       |
//! |  /sessions/{id}/stream (GET)  -> bind (SSE)   |
//! |  /sessions/{id}/respond (POST)-> accept/reject|
//! +-----------------------------------------------+
//!          |
//!          v
//! +-----------------------------------------------+
//! |  GenerationWorkflow                           |
//! |    +-- SessionStore (DashMap, idle sweep)     |
//! |    +-- ContentGenerator (template | openai)   |
//! |    +-- MemoryJournal (history + commit)       |
//! +-----------------------------------------------+
//! ```
//!
//! # Usage
//!
//! ```bash
//! repcoach-server --port 8080
//! curl -X POST -H 'x-user-id: 1' localhost:8080/sessions
//! curl -N -H 'x-user-id: 1' localhost:8080/sessions/<id>/stream
//! curl -X POST -H 'x-user-id: 1' -H 'content-type: application/json' \
//!      -d '{"response":"accept"}' localhost:8080/sessions/<id>/respond
//! ```

mod handlers;
pub mod types;

pub use handlers::{AppState, Principal, PRINCIPAL_HEADER};
pub use types::{
    CreateSessionRequest, CreateSessionResponse, ErrorResponse, HealthResponse, RespondRequest,
    RespondResponse, SessionInfo,
};

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::generator::ContentGenerator;
use crate::journal::MemoryJournal;
use crate::session::{SessionStore, StoreConfig};
use crate::settings::RepcoachSettings;
use crate::workflow::{GenerationWorkflow, WorkflowConfig};

/// Assemble the workflow from settings, backed by an in-memory journal.
pub fn build_workflow(
    settings: &RepcoachSettings,
    journal: Arc<MemoryJournal>,
) -> anyhow::Result<GenerationWorkflow> {
    let store = SessionStore::new(StoreConfig {
        idle_timeout: settings.sessions.idle_timeout(),
        sweep_interval: settings.sessions.sweep_interval(),
    });
    let generator = Arc::new(ContentGenerator::from_settings(&settings.generation)?);

    Ok(GenerationWorkflow::new(
        store,
        generator,
        journal.clone(),
        journal,
        WorkflowConfig::from_settings(settings),
    ))
}

/// Start the HTTP server.
///
/// Starts the session sweep, binds `addr` (port 0 picks a free port) and
/// serves until the returned token is cancelled.
///
/// # Returns
///
/// - The actual bound address (useful when port=0)
/// - A cancellation token to trigger graceful shutdown
///
/// # Example
///
/// ```ignore
/// let (addr, shutdown) = start_server(([127, 0, 0, 1], 8080).into(), workflow).await?;
/// println!("Server listening on {}", addr);
///
/// // Later, to shut down:
/// shutdown.cancel();
/// ```
pub async fn start_server(
    addr: SocketAddr,
    workflow: GenerationWorkflow,
) -> anyhow::Result<(SocketAddr, CancellationToken)> {
    let store = workflow.store().clone();
    let (state, shutdown_token) = AppState::new(workflow);

    let app = create_router(state);

    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("HTTP server listening on {}", actual_addr);

    store.start();
    let sweep_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        sweep_shutdown.cancelled().await;
        store.stop();
        tracing::debug!("Session store stopped");
    });

    // Run server with graceful shutdown
    let server_shutdown = shutdown_token.clone();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_token))
}

/// Create the router with all routes configured.
///
/// This is separated from `start_server` to enable easier testing.
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/sessions", post(handlers::create_session))
        .route(
            "/sessions/{session_id}",
            get(handlers::get_session).delete(handlers::delete_session),
        )
        .route("/sessions/{session_id}/stream", get(handlers::stream_session))
        .route("/sessions/{session_id}/respond", post(handlers::respond))
        .with_state(state)
}
