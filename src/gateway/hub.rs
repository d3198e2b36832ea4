//! The hub actor. One task owns the [`Registry`]; everything else talks to it
//! through a cloneable [`Hub`] handle, so all mutations and fan-outs happen in
//! mailbox order.

use tokio::sync::{mpsc, oneshot};

use super::events::Envelope;
use super::registry::{HubSnapshot, Registry};
use super::session::{SessionHandle, SessionId};
use crate::error::AppError;

enum HubCommand {
    Register(SessionHandle),
    Unregister(SessionId),
    JoinRoom {
        chat_id: String,
        session_id: SessionId,
    },
    LeaveRoom {
        chat_id: String,
        session_id: SessionId,
    },
    Broadcast(Envelope),
    Deliver {
        session_id: SessionId,
        envelope: Envelope,
    },
    Snapshot(oneshot::Sender<HubSnapshot>),
}

#[derive(Clone)]
pub struct Hub {
    tx: mpsc::Sender<HubCommand>,
}

impl Hub {
    /// Spawn the actor on the current runtime. It stops once every handle is
    /// dropped.
    pub fn spawn(mailbox: usize) -> Self {
        let (tx, rx) = mpsc::channel(mailbox.max(1));
        tokio::spawn(run(rx));
        Self { tx }
    }

    pub async fn register(&self, session: SessionHandle) {
        self.send(HubCommand::Register(session)).await;
    }

    pub async fn unregister(&self, session_id: SessionId) {
        self.send(HubCommand::Unregister(session_id)).await;
    }

    pub async fn join_room(&self, chat_id: &str, session_id: SessionId) {
        self.send(HubCommand::JoinRoom {
            chat_id: chat_id.to_string(),
            session_id,
        })
        .await;
    }

    pub async fn leave_room(&self, chat_id: &str, session_id: SessionId) {
        self.send(HubCommand::LeaveRoom {
            chat_id: chat_id.to_string(),
            session_id,
        })
        .await;
    }

    pub async fn broadcast(&self, envelope: Envelope) {
        self.send(HubCommand::Broadcast(envelope)).await;
    }

    pub async fn deliver(&self, session_id: SessionId, envelope: Envelope) {
        self.send(HubCommand::Deliver {
            session_id,
            envelope,
        })
        .await;
    }

    pub async fn snapshot(&self) -> Result<HubSnapshot, AppError> {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(HubCommand::Snapshot(reply)).await.is_err() {
            return Err(AppError::Internal("hub is not running".into()));
        }
        rx.await
            .map_err(|_| AppError::Internal("hub dropped snapshot request".into()))
    }

    async fn send(&self, command: HubCommand) {
        if self.tx.send(command).await.is_err() {
            tracing::error!("hub is not running, command dropped");
        }
    }
}

async fn run(mut rx: mpsc::Receiver<HubCommand>) {
    let mut registry = Registry::new();

    while let Some(command) = rx.recv().await {
        match command {
            HubCommand::Register(session) => {
                let id = session.id;
                if registry.register(session) {
                    tracing::debug!(
                        session_id = %id,
                        sessions = registry.session_count(),
                        "session registered"
                    );
                } else {
                    tracing::warn!(session_id = %id, "duplicate session id ignored");
                }
            }
            HubCommand::Unregister(id) => {
                if registry.unregister(id) {
                    tracing::debug!(
                        session_id = %id,
                        sessions = registry.session_count(),
                        rooms = registry.room_count(),
                        "session unregistered"
                    );
                }
            }
            HubCommand::JoinRoom {
                chat_id,
                session_id,
            } => {
                if !registry.join(&chat_id, session_id) {
                    tracing::debug!(
                        session_id = %session_id,
                        chat_id = %chat_id,
                        "join ignored, session is gone"
                    );
                }
            }
            HubCommand::LeaveRoom {
                chat_id,
                session_id,
            } => {
                registry.leave(&chat_id, session_id);
            }
            HubCommand::Broadcast(envelope) => {
                let delivery = registry.broadcast(&envelope);
                tracing::trace!(
                    kind = %envelope.kind,
                    chat_id = ?envelope.chat_id,
                    delivered = delivery.delivered,
                    evicted = delivery.evicted.len(),
                    "broadcast"
                );
            }
            HubCommand::Deliver {
                session_id,
                envelope,
            } => {
                registry.deliver(session_id, &envelope);
            }
            HubCommand::Snapshot(reply) => {
                let _ = reply.send(registry.snapshot());
            }
        }
    }

    tracing::debug!("hub stopped");
}
