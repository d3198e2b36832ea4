use axum::body::Bytes;
use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::time::{timeout, Instant};
use uuid::Uuid;

use super::events::{error_text, Envelope};
use super::hub::Hub;
use super::router::CommandRouter;
use super::GatewayError;
use crate::config::GatewayLimits;

/// A serialized envelope, shared between every queue it is fanned out to.
pub type Frame = Arc<str>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Who is on the other end of a session. Fixed at handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
}

/// What the hub keeps for a live session. The hub holds the only sender, so
/// dropping the handle closes the outbound queue.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    pub id: SessionId,
    pub identity: Identity,
    pub outbound: mpsc::Sender<Frame>,
}

impl SessionHandle {
    pub fn new(identity: Identity, queue_capacity: usize) -> (Self, mpsc::Receiver<Frame>) {
        let (outbound, rx) = mpsc::channel(queue_capacity.max(1));
        let handle = Self {
            id: SessionId::new(),
            identity,
            outbound,
        };
        (handle, rx)
    }
}

/// Drive an upgraded connection until it ends, then unregister it.
pub async fn run(
    socket: WebSocket,
    identity: Identity,
    hub: Hub,
    router: Arc<CommandRouter>,
    limits: GatewayLimits,
) {
    let (handle, rx) = SessionHandle::new(identity.clone(), limits.outbound_queue);
    let session_id = handle.id;
    let (sink, mut stream) = socket.split();

    tracing::info!(
        session_id = %session_id,
        user_id = %identity.user_id,
        "session connected"
    );
    hub.register(handle).await;

    let mut writer = tokio::spawn(write_loop(sink, rx, limits.clone(), session_id));
    let mut writer_done = false;

    loop {
        let next = tokio::select! {
            result = &mut writer => {
                writer_done = true;
                match result {
                    Ok(Ok(())) => tracing::debug!(session_id = %session_id, "writer closed"),
                    Ok(Err(e)) => tracing::debug!(session_id = %session_id, "writer stopped: {e}"),
                    Err(e) => tracing::error!(session_id = %session_id, "writer task failed: {e}"),
                }
                break;
            }
            next = timeout(limits.read_timeout, stream.next()) => next,
        };

        let frame = match next {
            Err(_) => {
                let e = GatewayError::Transport("read deadline elapsed".into());
                tracing::debug!(session_id = %session_id, "{e}");
                break;
            }
            Ok(None) => break,
            Ok(Some(Err(e))) => {
                let e = GatewayError::Transport(e.to_string());
                tracing::debug!(session_id = %session_id, "{e}");
                break;
            }
            Ok(Some(Ok(frame))) => frame,
        };

        match frame {
            Message::Text(text) => match Envelope::decode(text.as_str()) {
                Ok(envelope) => router.dispatch(session_id, &identity, envelope).await,
                Err(e) => {
                    tracing::debug!(session_id = %session_id, "undecodable frame: {e}");
                    hub.deliver(session_id, Envelope::error(error_text::INVALID_FORMAT))
                        .await;
                }
            },
            Message::Binary(_) => {
                hub.deliver(session_id, Envelope::error(error_text::INVALID_FORMAT))
                    .await;
            }
            // Any frame refreshes the deadline; pings are answered by the socket.
            Message::Ping(_) | Message::Pong(_) => {}
            Message::Close(_) => break,
        }
    }

    hub.unregister(session_id).await;

    if !writer_done {
        // The writer drains what is queued, sends Close and exits once the hub
        // drops the sender.
        if timeout(limits.write_timeout, &mut writer).await.is_err() {
            writer.abort();
        }
    }

    tracing::info!(
        session_id = %session_id,
        user_id = %identity.user_id,
        "session disconnected"
    );
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Frame>,
    limits: GatewayLimits,
    session_id: SessionId,
) -> Result<(), GatewayError> {
    let mut ping = tokio::time::interval_at(
        Instant::now() + limits.ping_interval,
        limits.ping_interval,
    );

    loop {
        tokio::select! {
            frame = rx.recv() => match frame {
                Some(frame) => {
                    send(&mut sink, Message::Text(frame.as_ref().into()), &limits).await?;
                }
                None => {
                    tracing::debug!(session_id = %session_id, "outbound queue closed");
                    let _ = send(&mut sink, Message::Close(None), &limits).await;
                    return Ok(());
                }
            },
            _ = ping.tick() => {
                send(&mut sink, Message::Ping(Bytes::new()), &limits).await?;
            }
        }
    }
}

async fn send(
    sink: &mut SplitSink<WebSocket, Message>,
    message: Message,
    limits: &GatewayLimits,
) -> Result<(), GatewayError> {
    match timeout(limits.write_timeout, sink.send(message)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(GatewayError::Transport(e.to_string())),
        Err(_) => Err(GatewayError::Transport("write deadline elapsed".into())),
    }
}
