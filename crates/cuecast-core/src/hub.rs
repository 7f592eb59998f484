//! Outbound queues for live connections.
//!
//! Every connection owns an unbounded queue. Pushing into it never blocks,
//! so deliveries are queued while the registry lock is still held and
//! reach each outbox in commit order. Socket writes happen later, in the
//! task that owns the connection.

use crate::connection::ConnectionId;
use crate::delivery::Delivery;
use cuecast_protocol::ServerEvent;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, trace};

/// Receiving end of a connection's outbound queue.
pub type Outbox = mpsc::UnboundedReceiver<ServerEvent>;

/// Live connections indexed by ID.
#[derive(Debug, Default)]
pub struct Hub {
    peers: DashMap<ConnectionId, mpsc::UnboundedSender<ServerEvent>>,
}

impl Hub {
    /// Create an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection and return its outbox.
    ///
    /// Registering an ID again replaces the previous queue.
    pub fn register(&self, connection_id: ConnectionId) -> Outbox {
        let (tx, rx) = mpsc::unbounded_channel();
        debug!(connection = %connection_id, "Connection registered");
        self.peers.insert(connection_id, tx);
        rx
    }

    /// Remove a connection.
    ///
    /// Returns `true` if it was registered.
    pub fn unregister(&self, connection_id: &ConnectionId) -> bool {
        let removed = self.peers.remove(connection_id).is_some();
        if removed {
            debug!(connection = %connection_id, "Connection unregistered");
        }
        removed
    }

    /// Check if a connection is registered.
    #[must_use]
    pub fn is_connected(&self, connection_id: &ConnectionId) -> bool {
        self.peers.contains_key(connection_id)
    }

    /// Get the number of live connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.peers.len()
    }

    /// Check if no connection is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }

    /// Queue one event for a connection.
    ///
    /// Returns `false` if the connection is gone.
    pub fn send(&self, target: &ConnectionId, event: ServerEvent) -> bool {
        match self.peers.get(target) {
            Some(tx) => tx.send(event).is_ok(),
            None => {
                trace!(connection = %target, "Dropping event for unknown connection");
                false
            }
        }
    }

    /// Queue a batch of deliveries.
    ///
    /// Returns the number actually queued.
    pub fn deliver(&self, deliveries: &[Delivery]) -> usize {
        deliveries
            .iter()
            .filter(|d| self.send(&d.target, d.event.clone()))
            .count()
    }
}
