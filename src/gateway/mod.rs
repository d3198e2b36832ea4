pub mod access;
pub mod events;
pub mod hub;
pub mod registry;
pub mod router;
pub mod session;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::response::Response;
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;
use access::Denial;
use events::{error_text, CommandError, Envelope};
use session::SessionId;

/// Everything that can go wrong on the real-time path.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("handshake rejected: {0}")]
    HandshakeAuth(String),
    #[error(transparent)]
    Authorization(#[from] Denial),
    #[error("{0}")]
    Validation(String),
    #[error("session {0} evicted, outbound queue full")]
    Capacity(SessionId),
    #[error("transport: {0}")]
    Transport(String),
    #[error("persistence: {0}")]
    Persistence(AppError),
}

impl GatewayError {
    /// The error envelope the sender sees, if any. Capacity and transport
    /// failures are never reported to the peer.
    pub fn reply(&self) -> Option<Envelope> {
        match self {
            GatewayError::Authorization(_) => Some(Envelope::error(error_text::ACCESS_DENIED)),
            GatewayError::Validation(text) => Some(Envelope::error(text.clone())),
            GatewayError::Persistence(_) => Some(Envelope::error(error_text::SEND_FAILED)),
            GatewayError::HandshakeAuth(_)
            | GatewayError::Capacity(_)
            | GatewayError::Transport(_) => None,
        }
    }
}

impl From<CommandError> for GatewayError {
    fn from(e: CommandError) -> Self {
        GatewayError::Validation(e.to_string())
    }
}

impl From<GatewayError> for AppError {
    fn from(e: GatewayError) -> Self {
        match e {
            GatewayError::HandshakeAuth(msg) => AppError::Unauthorized(msg),
            GatewayError::Authorization(Denial::CheckFailed(inner)) => inner,
            GatewayError::Authorization(Denial::NotMember) => {
                AppError::Forbidden(error_text::ACCESS_DENIED.into())
            }
            GatewayError::Validation(msg) => AppError::BadRequest(msg),
            GatewayError::Persistence(inner) => inner,
            other => AppError::Internal(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    token: Option<String>,
}

/// `GET /ws`. Authenticates before upgrading; a bad or missing credential
/// gets a plain 401 and no session.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(params): Query<ConnectParams>,
) -> Result<Response, AppError> {
    let credential = credential(&headers, params.token)?;
    let identity = state.auth.authenticate(&credential).await.map_err(|e| {
        tracing::debug!("websocket handshake refused: {e}");
        AppError::from(GatewayError::HandshakeAuth(
            "invalid or missing authentication".into(),
        ))
    })?;

    let limits = state.limits.clone();
    let hub = state.hub.clone();
    let router = state.router.clone();
    Ok(ws
        .max_message_size(limits.max_frame_bytes)
        .max_frame_size(limits.max_frame_bytes)
        .on_upgrade(move |socket| session::run(socket, identity, hub, router, limits)))
}

/// Bearer header first, then the `token` query parameter.
fn credential(headers: &HeaderMap, query_token: Option<String>) -> Result<String, GatewayError> {
    let from_header = headers
        .get("Authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|t| t.trim().to_string());

    from_header
        .or(query_token)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| GatewayError::HandshakeAuth("missing credential".into()))
}
