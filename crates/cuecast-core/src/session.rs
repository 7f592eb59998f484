//! Per-connection sessions and role bindings.

use crate::code::RoomCode;
use crate::connection::ConnectionId;
use crate::relay::{Dispatch, Relay};
use cuecast_protocol::ClientEvent;
use std::fmt;
use std::sync::Arc;

/// The role a connection plays in a room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Triggers playback.
    Controller,
    /// Plays on command.
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Controller => f.write_str("controller"),
            Role::Receiver => f.write_str("receiver"),
        }
    }
}

/// A connection's single role binding, as kept in the reverse index.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Binding {
    /// The bound room.
    pub room: RoomCode,
    /// The role within it.
    pub role: Role,
}

impl Binding {
    /// Bind as controller of `room`.
    #[must_use]
    pub fn controller(room: RoomCode) -> Self {
        Self {
            room,
            role: Role::Controller,
        }
    }

    /// Bind as receiver of `room`.
    #[must_use]
    pub fn receiver(room: RoomCode) -> Self {
        Self {
            room,
            role: Role::Receiver,
        }
    }
}

/// Where a connection is in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    /// Connected, not bound to any room.
    Unbound,
    /// Controller of a room.
    ControllerBound(RoomCode),
    /// Receiver in a room.
    ReceiverBound(RoomCode),
    /// Disconnected. Terminal.
    Closed,
}

impl From<Option<&Binding>> for SessionState {
    fn from(binding: Option<&Binding>) -> Self {
        match binding {
            None => SessionState::Unbound,
            Some(Binding {
                room,
                role: Role::Controller,
            }) => SessionState::ControllerBound(room.clone()),
            Some(Binding {
                room,
                role: Role::Receiver,
            }) => SessionState::ReceiverBound(room.clone()),
        }
    }
}

/// A state change caused by one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// State before the event.
    pub from: SessionState,
    /// State after the event.
    pub to: SessionState,
}

impl Transition {
    /// Check if the event changed the state.
    #[must_use]
    pub fn is_change(&self) -> bool {
        self.from != self.to
    }
}

/// A live connection's handle onto the relay.
///
/// Dropping the session disconnects it, so a transport task that exits by
/// any path still reconciles the registry.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    relay: Arc<Relay>,
    closed: bool,
}

impl Session {
    pub(crate) fn new(id: ConnectionId, relay: Arc<Relay>) -> Self {
        Self {
            id,
            relay,
            closed: false,
        }
    }

    /// Get the connection ID.
    #[must_use]
    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Get the current state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.relay.registry().session_state(&self.id)
    }

    /// Handle one inbound event from this connection.
    pub fn handle(&self, event: ClientEvent) -> Dispatch {
        self.relay.handle(&self.id, event)
    }

    /// Disconnect and reconcile.
    pub fn close(mut self) -> Dispatch {
        self.closed = true;
        self.relay.disconnect(&self.id)
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        if !self.closed {
            self.relay.disconnect(&self.id);
        }
    }
}
