//! Room abstraction for cuecast.
//!
//! A room pairs at most one controller with any number of receivers.

use crate::code::RoomCode;
use crate::connection::ConnectionId;
use std::collections::BTreeSet;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

/// Milliseconds since the Unix epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A controller and its receivers.
#[derive(Debug, Clone)]
pub struct Room {
    /// Room code.
    code: RoomCode,
    /// When the room was created (ms since epoch).
    created_at: u64,
    /// Attached controller, unset until its `controller_join`.
    controller: Option<ConnectionId>,
    /// Receiver entries. A connection that joins twice appears twice.
    receivers: Vec<ConnectionId>,
}

impl Room {
    /// Create an empty room with no controller.
    #[must_use]
    pub fn new(code: RoomCode) -> Self {
        Self {
            code,
            created_at: now_millis(),
            controller: None,
            receivers: Vec::new(),
        }
    }

    /// Get the room code.
    #[must_use]
    pub fn code(&self) -> &RoomCode {
        &self.code
    }

    /// Get the creation timestamp (ms since epoch).
    #[must_use]
    pub fn created_at(&self) -> u64 {
        self.created_at
    }

    /// Get the attached controller, if any.
    #[must_use]
    pub fn controller(&self) -> Option<&ConnectionId> {
        self.controller.as_ref()
    }

    /// Check if a connection is this room's controller.
    #[must_use]
    pub fn is_controller(&self, connection_id: &ConnectionId) -> bool {
        self.controller.as_ref() == Some(connection_id)
    }

    /// Attach a controller, returning the one it replaced.
    pub fn set_controller(&mut self, connection_id: ConnectionId) -> Option<ConnectionId> {
        debug!(room = %self.code, connection = %connection_id, "Controller attached");
        self.controller.replace(connection_id)
    }

    /// Detach the controller if it is `connection_id`.
    ///
    /// Returns `true` if the controller was detached.
    pub fn clear_controller(&mut self, connection_id: &ConnectionId) -> bool {
        if self.is_controller(connection_id) {
            self.controller = None;
            debug!(room = %self.code, connection = %connection_id, "Controller detached");
            true
        } else {
            false
        }
    }

    /// Get the number of receiver entries.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.receivers.len()
    }

    /// Check if a connection is a receiver here.
    #[must_use]
    pub fn has_receiver(&self, connection_id: &ConnectionId) -> bool {
        self.receivers.contains(connection_id)
    }

    /// Append a receiver entry.
    pub fn add_receiver(&mut self, connection_id: ConnectionId) {
        debug!(room = %self.code, connection = %connection_id, "Receiver joined");
        self.receivers.push(connection_id);
    }

    /// Remove one entry for a receiver.
    ///
    /// Returns `true` if an entry was removed.
    pub fn remove_receiver(&mut self, connection_id: &ConnectionId) -> bool {
        match self.receivers.iter().position(|r| r == connection_id) {
            Some(index) => {
                self.receivers.remove(index);
                debug!(room = %self.code, connection = %connection_id, "Receiver left");
                true
            }
            None => false,
        }
    }

    /// Remove every entry for a receiver.
    ///
    /// Returns the number of entries removed.
    pub fn purge_receiver(&mut self, connection_id: &ConnectionId) -> usize {
        let before = self.receivers.len();
        self.receivers.retain(|r| r != connection_id);
        let removed = before - self.receivers.len();
        if removed > 0 {
            debug!(room = %self.code, connection = %connection_id, removed, "Receiver purged");
        }
        removed
    }

    /// Distinct receiver connections, in a stable order.
    #[must_use]
    pub fn receivers(&self) -> Vec<ConnectionId> {
        self.receivers
            .iter()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Check if the room has no receivers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.receivers.is_empty()
    }
}
