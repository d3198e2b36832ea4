//! Global session set and room index.
//!
//! Owned exclusively by the hub task; nothing here is shared or locked. Rooms
//! store session ids only and resolve them through `sessions`, so a removed
//! session can never be reached from a stale room entry.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc::error::TrySendError;

use super::events::Envelope;
use super::session::{Frame, Identity, SessionHandle, SessionId};
use super::GatewayError;

struct Entry {
    identity: Identity,
    outbound: tokio::sync::mpsc::Sender<Frame>,
    rooms: HashSet<String>,
}

/// Outcome of a fan-out.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub evicted: Vec<SessionId>,
}

/// Point-in-time view of hub state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HubSnapshot {
    pub sessions: Vec<SessionId>,
    pub rooms: BTreeMap<String, Vec<SessionId>>,
}

impl HubSnapshot {
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_members(&self, chat_id: &str) -> Vec<SessionId> {
        self.rooms.get(chat_id).cloned().unwrap_or_default()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains(&id)
    }
}

#[derive(Default)]
pub struct Registry {
    sessions: HashMap<SessionId, Entry>,
    rooms: HashMap<String, HashSet<SessionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns false if the id is already registered.
    pub fn register(&mut self, handle: SessionHandle) -> bool {
        if self.sessions.contains_key(&handle.id) {
            return false;
        }
        self.sessions.insert(
            handle.id,
            Entry {
                identity: handle.identity,
                outbound: handle.outbound,
                rooms: HashSet::new(),
            },
        );
        true
    }

    /// Removes the session everywhere and drops its queue sender, which closes
    /// the queue once the writer has drained it. Returns false if absent.
    pub fn unregister(&mut self, id: SessionId) -> bool {
        let Some(entry) = self.sessions.remove(&id) else {
            return false;
        };
        for chat_id in &entry.rooms {
            self.remove_from_room(chat_id, id);
        }
        true
    }

    /// Returns false when the session is not (or no longer) registered.
    pub fn join(&mut self, chat_id: &str, id: SessionId) -> bool {
        let Some(entry) = self.sessions.get_mut(&id) else {
            return false;
        };
        entry.rooms.insert(chat_id.to_string());
        self.rooms.entry(chat_id.to_string()).or_default().insert(id);
        true
    }

    pub fn leave(&mut self, chat_id: &str, id: SessionId) -> bool {
        if let Some(entry) = self.sessions.get_mut(&id) {
            entry.rooms.remove(chat_id);
        }
        self.remove_from_room(chat_id, id)
    }

    /// Room broadcast when `chat_id` is set, global broadcast otherwise.
    pub fn broadcast(&mut self, envelope: &Envelope) -> Delivery {
        let targets: Vec<SessionId> = match &envelope.chat_id {
            Some(chat_id) => self
                .rooms
                .get(chat_id)
                .map(|ids| ids.iter().copied().collect())
                .unwrap_or_default(),
            None => self.sessions.keys().copied().collect(),
        };
        self.fan_out(envelope, &targets)
    }

    /// Single-recipient delivery under the same backpressure rule.
    pub fn deliver(&mut self, id: SessionId, envelope: &Envelope) -> Delivery {
        self.fan_out(envelope, &[id])
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn snapshot(&self) -> HubSnapshot {
        let mut sessions: Vec<SessionId> = self.sessions.keys().copied().collect();
        sessions.sort();
        let rooms = self
            .rooms
            .iter()
            .map(|(chat_id, ids)| {
                let mut ids: Vec<SessionId> = ids.iter().copied().collect();
                ids.sort();
                (chat_id.clone(), ids)
            })
            .collect();
        HubSnapshot { sessions, rooms }
    }

    fn fan_out(&mut self, envelope: &Envelope, targets: &[SessionId]) -> Delivery {
        let mut delivery = Delivery::default();
        if targets.is_empty() {
            return delivery;
        }

        let frame: Frame = match serde_json::to_string(envelope) {
            Ok(text) => Arc::from(text),
            Err(e) => {
                tracing::error!(kind = %envelope.kind, "failed to encode envelope: {e}");
                return delivery;
            }
        };

        for &id in targets {
            let Some(entry) = self.sessions.get(&id) else {
                continue;
            };
            match entry.outbound.try_send(Arc::clone(&frame)) {
                Ok(()) => delivery.delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        user_id = %entry.identity.user_id,
                        "{}",
                        GatewayError::Capacity(id)
                    );
                    delivery.evicted.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::debug!(session_id = %id, "outbound queue closed, evicting");
                    delivery.evicted.push(id);
                }
            }
        }

        for &id in &delivery.evicted {
            self.unregister(id);
        }
        delivery
    }

    fn remove_from_room(&mut self, chat_id: &str, id: SessionId) -> bool {
        let Some(ids) = self.rooms.get_mut(chat_id) else {
            return false;
        };
        let removed = ids.remove(&id);
        if ids.is_empty() {
            self.rooms.remove(chat_id);
        }
        removed
    }

    #[cfg(test)]
    fn assert_rooms_subset_of_sessions(&self) {
        for (chat_id, ids) in &self.rooms {
            assert!(!ids.is_empty(), "room {chat_id} kept after emptying");
            for id in ids {
                let entry = self
                    .sessions
                    .get(id)
                    .unwrap_or_else(|| panic!("room {chat_id} references unknown {id}"));
                assert!(entry.rooms.contains(chat_id));
            }
        }
    }
}
