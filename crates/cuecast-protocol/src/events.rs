//! Event types for the cuecast protocol.
//!
//! Every event travels as an adjacently tagged object:
//! `{"event": "<name>", "data": {...}}`. Events without a payload
//! (`play_command`, `room_closed`) carry no `data` field.

use serde::{Deserialize, Serialize};

/// Message sent with `join_error` when a receiver asks for an unknown room.
pub const INVALID_ROOM_CODE: &str = "Invalid room code";

/// Events sent by clients to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// A controller page announces itself for the room it was issued.
    ControllerJoin {
        /// Room code, matched verbatim.
        room_code: String,
    },

    /// A receiver asks to join a room.
    ReceiverJoin {
        /// Room code, matched case-insensitively.
        room_code: String,
    },

    /// A receiver leaves a room without closing its connection.
    ReceiverLeave {
        /// Room code, matched case-insensitively.
        room_code: String,
    },

    /// The controller triggers playback on every receiver.
    PlaySound {
        /// Room code, matched verbatim.
        room_code: String,
    },
}

impl ClientEvent {
    /// Create a `controller_join` event.
    #[must_use]
    pub fn controller_join(room_code: impl Into<String>) -> Self {
        ClientEvent::ControllerJoin {
            room_code: room_code.into(),
        }
    }

    /// Create a `receiver_join` event.
    #[must_use]
    pub fn receiver_join(room_code: impl Into<String>) -> Self {
        ClientEvent::ReceiverJoin {
            room_code: room_code.into(),
        }
    }

    /// Create a `receiver_leave` event.
    #[must_use]
    pub fn receiver_leave(room_code: impl Into<String>) -> Self {
        ClientEvent::ReceiverLeave {
            room_code: room_code.into(),
        }
    }

    /// Create a `play_sound` event.
    #[must_use]
    pub fn play_sound(room_code: impl Into<String>) -> Self {
        ClientEvent::PlaySound {
            room_code: room_code.into(),
        }
    }

    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ClientEvent::ControllerJoin { .. } => "controller_join",
            ClientEvent::ReceiverJoin { .. } => "receiver_join",
            ClientEvent::ReceiverLeave { .. } => "receiver_leave",
            ClientEvent::PlaySound { .. } => "play_sound",
        }
    }

    /// The room code carried by the event.
    #[must_use]
    pub fn room_code(&self) -> &str {
        match self {
            ClientEvent::ControllerJoin { room_code }
            | ClientEvent::ReceiverJoin { room_code }
            | ClientEvent::ReceiverLeave { room_code }
            | ClientEvent::PlaySound { room_code } => room_code,
        }
    }
}

/// Events sent by the server to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Current number of receivers, sent to the controller.
    ReceiverUpdate {
        /// Receiver entries in the room.
        count: usize,
    },

    /// A receiver joined successfully.
    JoinSuccess {
        /// Canonical (uppercase) room code.
        room_code: String,
    },

    /// A receiver could not join.
    JoinError {
        /// Human-readable reason.
        message: String,
    },

    /// Start playback now.
    PlayCommand,

    /// The controller left and the room no longer exists.
    RoomClosed,
}

impl ServerEvent {
    /// Create a `receiver_update` event.
    #[must_use]
    pub fn receiver_update(count: usize) -> Self {
        ServerEvent::ReceiverUpdate { count }
    }

    /// Create a `join_success` event.
    #[must_use]
    pub fn join_success(room_code: impl Into<String>) -> Self {
        ServerEvent::JoinSuccess {
            room_code: room_code.into(),
        }
    }

    /// Create a `join_error` event.
    #[must_use]
    pub fn join_error(message: impl Into<String>) -> Self {
        ServerEvent::JoinError {
            message: message.into(),
        }
    }

    /// The `join_error` sent for unknown room codes.
    #[must_use]
    pub fn invalid_room_code() -> Self {
        Self::join_error(INVALID_ROOM_CODE)
    }

    /// Wire name of the event.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::ReceiverUpdate { .. } => "receiver_update",
            ServerEvent::JoinSuccess { .. } => "join_success",
            ServerEvent::JoinError { .. } => "join_error",
            ServerEvent::PlayCommand => "play_command",
            ServerEvent::RoomClosed => "room_closed",
        }
    }
}
