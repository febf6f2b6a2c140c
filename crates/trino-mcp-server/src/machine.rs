//! Session protocol state machine.
//!
//! ```text
//! Uninitialized --initialize--> Negotiating --ok--> Ready --shutdown/close--> ShuttingDown --> Closed
//!                                    |
//!                                    +--bad params--> Closed
//! ```
//!
//! [`decide`] is pure: given the current state and an incoming message it says
//! what the session should do. The session applies state changes itself.

use crate::error::ProtocolError;

/// Lifecycle state of one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Uninitialized,
    Negotiating,
    Ready,
    ShuttingDown,
    Closed,
}

impl SessionState {
    pub fn is_open(self) -> bool {
        !matches!(self, SessionState::ShuttingDown | SessionState::Closed)
    }
}

/// What to do with an incoming message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Run the handshake.
    Negotiate,
    /// Answer `initialize` again with the already negotiated result.
    ReplayNegotiated,
    Pong,
    ListTools,
    CallTool,
    ListResources,
    ListResourceTemplates,
    ReadResource,
    Shutdown,
    /// Notification or message that needs no answer.
    Ignore,
    Reject(ProtocolError),
}

/// Decide how a session in `state` handles `method`.
pub fn decide(state: SessionState, method: &str, is_notification: bool) -> Action {
    if is_notification {
        return Action::Ignore;
    }

    use SessionState::*;
    match (method, state) {
        (_, Closed) => Action::Reject(ProtocolError::ShuttingDown),
        ("ping", _) => Action::Pong,
        ("shutdown", _) => Action::Shutdown,
        (_, ShuttingDown) => Action::Reject(ProtocolError::ShuttingDown),

        ("initialize", Uninitialized) => Action::Negotiate,
        ("initialize", Ready) => Action::ReplayNegotiated,
        ("initialize", Negotiating) => Action::Reject(ProtocolError::InvalidRequest(
            "initialization already in progress".to_string(),
        )),

        ("tools/list", Ready) => Action::ListTools,
        ("tools/call", Ready) => Action::CallTool,
        ("resources/list", Ready) => Action::ListResources,
        ("resources/templates/list", Ready) => Action::ListResourceTemplates,
        ("resources/read", Ready) => Action::ReadResource,
        (
            "tools/list" | "tools/call" | "resources/list" | "resources/templates/list" | "resources/read",
            Uninitialized | Negotiating,
        ) => Action::Reject(ProtocolError::NotInitialized),

        (other, _) => Action::Reject(ProtocolError::MethodNotFound(other.to_string())),
    }
}
