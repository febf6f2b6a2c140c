//! Push-stream (SSE) transport for the MCP server.
//!
//! `GET /sse` opens a stream and a session. The first event tells the client
//! where to post its messages; every response after that arrives as a
//! `message` event. Posts are answered `202 Accepted` right away and the tool
//! call runs on a tracked task, so responses may come back out of order.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{
        IntoResponse, Response, Sse,
        sse::{Event, KeepAlive},
    },
    routing::{get, post},
};
use serde::Deserialize;
use tokio::sync::{RwLock, mpsc};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use trino_mcp_engine::QueryEngine;

use crate::dispatcher::Dispatcher;
use crate::protocol::JsonRpcResponse;
use crate::session::{Session, SessionOptions};

/// Buffered responses per stream before tool tasks wait on the client.
const OUTBOX_CAPACITY: usize = 64;

struct SessionEntry {
    session: Arc<Session>,
    outbox: mpsc::Sender<JsonRpcResponse>,
}

/// Shared state of the SSE router.
pub struct SseState {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    engine: Arc<dyn QueryEngine>,
    dispatcher: Arc<Dispatcher>,
    options: SessionOptions,
    shutdown: CancellationToken,
    lifecycles: TaskTracker,
}

impl SseState {
    pub fn new(
        engine: Arc<dyn QueryEngine>,
        dispatcher: Arc<Dispatcher>,
        options: SessionOptions,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            engine,
            dispatcher,
            options,
            shutdown,
            lifecycles: TaskTracker::new(),
        }
    }

    /// Number of registered sessions.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn session(&self, session_id: &str) -> Option<Arc<Session>> {
        self.sessions
            .read()
            .await
            .get(session_id)
            .map(|entry| Arc::clone(&entry.session))
    }

    /// Wait until every session lifecycle task has finished.
    pub async fn wait_closed(&self) {
        self.lifecycles.close();
        self.lifecycles.wait().await;
    }

    async fn open_session(self: &Arc<Self>) -> (Arc<Session>, mpsc::Receiver<JsonRpcResponse>) {
        let session_id = uuid::Uuid::new_v4().to_string();
        let session = Arc::new(Session::new(
            session_id.clone(),
            Arc::clone(&self.engine),
            Arc::clone(&self.dispatcher),
            &self.options,
        ));
        let (outbox, inbox) = mpsc::channel(OUTBOX_CAPACITY);

        self.sessions.write().await.insert(
            session_id.clone(),
            SessionEntry {
                session: Arc::clone(&session),
                outbox: outbox.clone(),
            },
        );
        info!(session_id = %session_id, "SSE session opened");

        let state = Arc::clone(self);
        let lifecycle = Arc::clone(&session);
        self.lifecycles.spawn(async move {
            tokio::select! {
                _ = state.shutdown.cancelled() => {
                    debug!(session_id = %lifecycle.id(), "Server shutdown; closing session");
                }
                _ = outbox.closed() => {
                    info!(session_id = %lifecycle.id(), "SSE stream disconnected");
                }
                _ = lifecycle.close_requested() => {}
            }
            lifecycle.teardown().await;
            state.sessions.write().await.remove(lifecycle.id());
            debug!(session_id = %lifecycle.id(), "SSE session unregistered");
        });

        (session, inbox)
    }
}

/// Query string of `POST /messages`.
#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    session_id: String,
}

/// Create the SSE router.
pub fn create_router(state: Arc<SseState>) -> Router {
    Router::new()
        .route("/sse", get(handle_sse))
        .route("/messages", post(handle_message))
        .route("/health", get(handle_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Handle `GET /sse`: open a session and stream its responses.
async fn handle_sse(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    let (session, mut inbox) = state.open_session().await;
    let endpoint = format!("/messages?session_id={}", session.id());

    let stream = async_stream::stream! {
        yield Ok::<_, Infallible>(Event::default().event("endpoint").data(endpoint));
        while let Some(response) = inbox.recv().await {
            match serde_json::to_string(&response) {
                Ok(data) => yield Ok(Event::default().event("message").data(data)),
                Err(e) => warn!(error = %e, "Failed to serialize response"),
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(30))
            .text("ping"),
    )
}

/// Handle `POST /messages?session_id=...`.
async fn handle_message(
    State(state): State<Arc<SseState>>,
    Query(query): Query<MessageQuery>,
    body: String,
) -> Response {
    let entry = {
        let sessions = state.sessions.read().await;
        sessions
            .get(&query.session_id)
            .map(|entry| (Arc::clone(&entry.session), entry.outbox.clone()))
    };

    match entry {
        Some((session, outbox)) => {
            session.submit(body, outbox);
            StatusCode::ACCEPTED.into_response()
        }
        None => {
            debug!(session_id = %query.session_id, "Message for unknown session");
            (StatusCode::NOT_FOUND, "Unknown session").into_response()
        }
    }
}

async fn handle_health(State(state): State<Arc<SseState>>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "trino-mcp",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": state.session_count().await,
    }))
}
