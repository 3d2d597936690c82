pub mod actor;
pub mod broadcast;
pub mod handler;
pub mod protocol;

use dashmap::{DashMap, Entry};

use tokio::sync::mpsc;

/// Type alias for the sender half of a WebSocket connection's channel.
/// Other parts of the system can clone this to push messages to a specific client.
pub type ConnectionSender = mpsc::UnboundedSender<axum::extract::ws::Message>;

/// Connection registry: tracks all active WebSocket connections per user.
/// A user can have multiple concurrent connections (multiple devices/tabs).
///
/// The map itself is never exposed; callers get snapshots and the
/// register/unregister transitions. Invariant: a user id is a key if and
/// only if its connection list is non-empty. The internal lock is held
/// only for list mutation — sends go through the unbounded channels, so
/// fan-out never blocks a registry operation.
#[derive(Default)]
pub struct ConnectionRegistry {
    connections: DashMap<String, Vec<ConnectionSender>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a connection to the user's set, creating it if absent.
    /// Returns true if this was the user's first connection (the caller
    /// broadcasts the online transition). Registering a sender that is
    /// already present is a no-op and reports no transition.
    pub fn register(&self, user_id: &str, tx: ConnectionSender) -> bool {
        let mut entry = self.connections.entry(user_id.to_string()).or_default();
        let first = entry.is_empty();
        if !entry.iter().any(|existing| existing.same_channel(&tx)) {
            entry.push(tx);
        }
        first
    }

    /// Remove a specific connection from the user's set, along with any
    /// senders whose channel has already closed. Returns true if the set
    /// became empty (the caller broadcasts the offline transition).
    /// Unknown users and absent senders are harmless no-ops.
    ///
    /// The sweep and the key removal happen under one entry lock, so no
    /// snapshot can observe a key with an empty set and a concurrent
    /// register cannot land in between.
    pub fn unregister(&self, user_id: &str, tx: &ConnectionSender) -> bool {
        match self.connections.entry(user_id.to_string()) {
            Entry::Occupied(mut entry) => {
                entry
                    .get_mut()
                    .retain(|existing| !existing.same_channel(tx) && !existing.is_closed());
                if entry.get().is_empty() {
                    entry.remove();
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(_) => false,
        }
    }

    /// Snapshot of the user's live connections. May be stale the instant
    /// it returns; callers tolerate sends to closed channels.
    pub fn connections_for(&self, user_id: &str) -> Vec<ConnectionSender> {
        self.connections
            .get(user_id)
            .map(|entry| entry.value().clone())
            .unwrap_or_default()
    }

    /// Snapshot of all currently-online user ids.
    pub fn online_users(&self) -> Vec<String> {
        self.connections
            .iter()
            .map(|entry| entry.key().clone())
            .collect()
    }
}
