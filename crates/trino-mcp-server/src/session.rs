//! One protocol session.
//!
//! A [`Session`] ties together the state machine, the session's
//! [`SessionContext`], and the cancellation machinery. Transports feed it raw
//! messages and deliver whatever it answers; when the peer goes away or the
//! server stops they call [`Session::teardown`], which runs exactly once no
//! matter how many triggers fire.

use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{Value, json};
use tokio::sync::{OnceCell, mpsc};
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use trino_mcp_engine::QueryEngine;

use crate::context::SessionContext;
use crate::dispatcher::Dispatcher;
use crate::error::{DispatchError, ProtocolError, engine_error_payload};
use crate::machine::{Action, SessionState, decide};
use crate::protocol::{
    CallToolParams, CallToolResponse, JsonRpcRequest, JsonRpcResponse, ListResourceTemplatesResponse,
    ListResourcesResponse, ListToolsResponse, ReadResourceParams, ReadResourceResponse, ServerInfo,
    negotiate_version, parse_message, requested_version,
};
use crate::resources;

/// Settings shared by every session of a server.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub server_info: ServerInfo,
    pub shutdown_grace: Duration,
    pub max_override_connections: usize,
    pub debug: bool,
}

/// A single client session.
pub struct Session {
    id: String,
    state: Mutex<SessionState>,
    context: tokio::sync::Mutex<SessionContext>,
    dispatcher: Arc<Dispatcher>,
    server_info: ServerInfo,
    negotiated: OnceLock<Value>,
    grace: Duration,
    /// Parent of every query's cancellation token.
    cancel: CancellationToken,
    /// Fired when the session asks its transport to close it.
    close_requested: CancellationToken,
    /// Fired once teardown has finished.
    closed: CancellationToken,
    tracker: TaskTracker,
    teardown: OnceCell<()>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        engine: Arc<dyn QueryEngine>,
        dispatcher: Arc<Dispatcher>,
        options: &SessionOptions,
    ) -> Self {
        let id = id.into();
        let context = SessionContext::new(
            id.clone(),
            engine,
            options.max_override_connections,
            options.debug,
        );
        Self {
            id,
            state: Mutex::new(SessionState::Uninitialized),
            context: tokio::sync::Mutex::new(context),
            dispatcher,
            server_info: options.server_info.clone(),
            negotiated: OnceLock::new(),
            grace: options.shutdown_grace,
            cancel: CancellationToken::new(),
            close_requested: CancellationToken::new(),
            closed: CancellationToken::new(),
            tracker: TaskTracker::new(),
            teardown: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, next: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = next;
    }

    /// Move from `from` to `to`; returns false if the session was elsewhere.
    fn transition(&self, from: SessionState, to: SessionState) -> bool {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if *state == from {
            *state = to;
            true
        } else {
            false
        }
    }

    /// Resolves when the session wants its transport to close it.
    pub fn close_requested(&self) -> WaitForCancellationFuture<'_> {
        self.close_requested.cancelled()
    }

    pub fn is_close_requested(&self) -> bool {
        self.close_requested.is_cancelled()
    }

    /// Resolves once teardown has completed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.closed.cancelled()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Number of tool calls currently tracked.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Number of engine connections the session holds open.
    pub async fn open_connections(&self) -> usize {
        self.context.lock().await.open_connections()
    }

    /// Handle one raw message.
    pub async fn handle_message(&self, text: &str) -> Option<JsonRpcResponse> {
        match parse_message(text) {
            Ok(request) => self.handle(request).await,
            Err((id, err)) => {
                warn!(session_id = %self.id, error = %err, "Rejected malformed message");
                Some(err.into_response(id))
            }
        }
    }

    /// Handle one raw message on a tracked task, so teardown waits for it.
    pub fn spawn_message(self: &Arc<Self>, text: String) -> JoinHandle<Option<JsonRpcResponse>> {
        let session = Arc::clone(self);
        self.tracker.spawn(async move { session.handle_message(&text).await })
    }

    /// Handle one raw message on a tracked task and push the answer to `outbox`.
    ///
    /// Used by transports where responses may complete out of order. A
    /// response whose recipient is gone is dropped.
    pub fn submit(self: &Arc<Self>, text: String, outbox: mpsc::Sender<JsonRpcResponse>) {
        let session = Arc::clone(self);
        self.tracker.spawn(async move {
            if let Some(response) = session.handle_message(&text).await
                && outbox.send(response).await.is_err()
            {
                debug!(session_id = %session.id, "Dropped response for a closed stream");
            }
        });
    }

    /// Handle one parsed request.
    pub async fn handle(&self, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
        let id = request.id.clone();
        let action = decide(self.state(), &request.method, request.is_notification());

        match action {
            Action::Ignore => {
                debug!(session_id = %self.id, method = %request.method, "Notification received");
                None
            }
            Action::Reject(err) => {
                debug!(session_id = %self.id, method = %request.method, error = %err, "Request rejected");
                Some(err.into_response(id))
            }
            Action::Pong => Some(JsonRpcResponse::success(id, json!({}))),
            Action::Negotiate => Some(self.initialize(id, request.params.as_ref()).await),
            Action::ReplayNegotiated => Some(self.replay_negotiated(id)),
            Action::ListTools => {
                let tools = self.dispatcher.registry().list();
                Some(respond(id, &ListToolsResponse { tools }))
            }
            Action::CallTool => Some(self.call_tool(id, request.params).await),
            Action::ListResources => Some(respond(
                id,
                &ListResourcesResponse {
                    resources: resources::list(),
                },
            )),
            Action::ListResourceTemplates => Some(respond(
                id,
                &ListResourceTemplatesResponse {
                    resource_templates: resources::templates(),
                },
            )),
            Action::ReadResource => Some(self.read_resource(id, request.params).await),
            Action::Shutdown => {
                info!(session_id = %self.id, "Shutdown requested by client");
                self.request_close();
                Some(JsonRpcResponse::success(id, Value::Null))
            }
        }
    }

    fn request_close(&self) {
        {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            if state.is_open() {
                *state = SessionState::ShuttingDown;
            }
        }
        self.close_requested.cancel();
    }

    fn replay_negotiated(&self, id: Option<Value>) -> JsonRpcResponse {
        let result = self.negotiated.get().cloned().unwrap_or_else(|| json!({}));
        JsonRpcResponse::success(id, result)
    }

    async fn initialize(&self, id: Option<Value>, params: Option<&Value>) -> JsonRpcResponse {
        // Another initialize may have won the race since `decide` ran.
        if !self.transition(SessionState::Uninitialized, SessionState::Negotiating) {
            return match self.state() {
                SessionState::Ready => self.replay_negotiated(id),
                SessionState::Negotiating => ProtocolError::InvalidRequest(
                    "initialization already in progress".to_string(),
                )
                .into_response(id),
                _ => ProtocolError::ShuttingDown.into_response(id),
            };
        }

        let requested = match requested_version(params) {
            Ok(requested) => requested,
            Err(err) => {
                warn!(session_id = %self.id, error = %err, "Handshake failed");
                self.set_state(SessionState::Closed);
                self.close_requested.cancel();
                return err.into_response(id);
            }
        };
        let version = negotiate_version(requested);

        {
            let mut ctx = self.context.lock().await;
            if let Err(e) = ctx.connect_primary().await {
                warn!(
                    session_id = %self.id,
                    error = %e,
                    "Engine unreachable during initialize; will retry on first tool call"
                );
            }
            ctx.mark_initialized();
        }

        let result = self
            .negotiated
            .get_or_init(|| {
                json!({
                    "protocolVersion": version,
                    "capabilities": {
                        "tools": { "listChanged": false },
                        "resources": { "subscribe": false, "listChanged": false },
                    },
                    "serverInfo": self.server_info,
                    "instructions": "Query Trino with execute_query; explore with list_catalogs, list_schemas, list_tables and inspect_table.",
                })
            })
            .clone();

        if !self.transition(SessionState::Negotiating, SessionState::Ready) {
            return ProtocolError::ShuttingDown.into_response(id);
        }

        let client = params
            .and_then(|p| p.get("clientInfo"))
            .and_then(|c| c.get("name"))
            .and_then(Value::as_str)
            .unwrap_or("unknown");
        info!(
            session_id = %self.id,
            requested_version = %requested,
            protocol_version = %version,
            client = %client,
            "Session initialized"
        );

        JsonRpcResponse::success(id, result)
    }

    async fn call_tool(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: CallToolParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => return ProtocolError::InvalidParams(e.to_string()).into_response(id),
            None => return ProtocolError::InvalidParams("missing params".to_string()).into_response(id),
        };

        let cancel = self.cancel.child_token();
        let started = Instant::now();
        let outcome = {
            let mut ctx = self.context.lock().await;
            if ctx.is_closed() {
                return ProtocolError::ShuttingDown.into_response(id);
            }
            if !ctx.is_initialized() {
                return ProtocolError::NotInitialized.into_response(id);
            }
            self.dispatcher
                .dispatch(&mut ctx, &params.name, params.arguments, &cancel)
                .await
        };
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let response = match outcome {
            Ok(payload) => {
                info!(session_id = %self.id, tool = %params.name, elapsed_ms, "Tool call completed");
                CallToolResponse::from_payload(payload, false)
            }
            Err(DispatchError::Engine(e)) => {
                warn!(
                    session_id = %self.id,
                    tool = %params.name,
                    category = e.category(),
                    error = %e,
                    elapsed_ms,
                    "Tool call failed"
                );
                CallToolResponse::from_payload(engine_error_payload(&e), true)
            }
            Err(e) => {
                debug!(session_id = %self.id, tool = %params.name, error = %e, "Tool call rejected");
                return e.into_protocol_error().into_response(id);
            }
        };

        respond(id, &response)
    }

    async fn read_resource(&self, id: Option<Value>, params: Option<Value>) -> JsonRpcResponse {
        let params: ReadResourceParams = match params.map(serde_json::from_value) {
            Some(Ok(params)) => params,
            Some(Err(e)) => return ProtocolError::InvalidParams(e.to_string()).into_response(id),
            None => return ProtocolError::InvalidParams("missing params".to_string()).into_response(id),
        };

        let cancel = self.cancel.child_token();
        let outcome = {
            let mut ctx = self.context.lock().await;
            if ctx.is_closed() {
                return ProtocolError::ShuttingDown.into_response(id);
            }
            resources::read(&mut ctx, &params.uri, &cancel).await
        };

        match outcome {
            Ok(contents) => {
                debug!(session_id = %self.id, uri = %params.uri, "Resource read");
                respond(id, &ReadResourceResponse { contents: vec![contents] })
            }
            Err(err) => {
                warn!(session_id = %self.id, uri = %params.uri, error = %err, "Resource read failed");
                err.into_response(id)
            }
        }
    }

    /// Tear the session down: stop accepting calls, let in-flight calls
    /// finish within the grace period, cancel what is left, and close every
    /// engine connection. Concurrent and repeated calls share one run.
    pub async fn teardown(&self) {
        self.teardown
            .get_or_init(|| async {
                self.request_close();
                info!(session_id = %self.id, in_flight = self.tracker.len(), "Tearing down session");

                self.tracker.close();
                if tokio::time::timeout(self.grace, self.tracker.wait()).await.is_err() {
                    warn!(
                        session_id = %self.id,
                        in_flight = self.tracker.len(),
                        "In-flight calls exceeded shutdown grace; cancelling"
                    );
                }
                self.cancel.cancel();
                if tokio::time::timeout(self.grace, self.tracker.wait()).await.is_err() {
                    warn!(session_id = %self.id, "Cancelled calls did not finish in time");
                }

                match tokio::time::timeout(self.grace, self.context.lock()).await {
                    Ok(mut ctx) => ctx.close_all().await,
                    Err(_) => warn!(session_id = %self.id, "Session context still busy; connections left to drop"),
                }

                self.set_state(SessionState::Closed);
                self.closed.cancel();
                info!(session_id = %self.id, "Session closed");
            })
            .await;
    }
}

/// Serialize `value` as the result of request `id`.
fn respond<T: Serialize>(id: Option<Value>, value: &T) -> JsonRpcResponse {
    match serde_json::to_value(value) {
        Ok(result) => JsonRpcResponse::success(id, result),
        Err(e) => ProtocolError::Internal(e.to_string()).into_response(id),
    }
}
