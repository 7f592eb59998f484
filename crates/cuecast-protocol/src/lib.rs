//! # cuecast-protocol
//!
//! Wire protocol definitions for the cuecast play-signal relay.
//!
//! This crate defines the events exchanged between controllers, receivers
//! and the server, together with the codecs that carry them over WebSocket
//! text (JSON) and binary (length-prefixed MessagePack) frames.
//!
//! ## Events
//!
//! - `controller_join` / `receiver_join` / `receiver_leave` - Room membership
//! - `play_sound` / `play_command` - The play signal, in and out
//! - `receiver_update` / `join_success` / `join_error` / `room_closed` - Notifications
//!
//! ## Example
//!
//! ```rust
//! use cuecast_protocol::{codec, ClientEvent, ServerEvent};
//!
//! let event: ClientEvent =
//!     codec::decode_json(r#"{"event":"play_sound","data":{"room_code":"AB12C3"}}"#).unwrap();
//! assert_eq!(event, ClientEvent::play_sound("AB12C3"));
//!
//! let encoded = codec::encode(&ServerEvent::PlayCommand).unwrap();
//! let decoded: ServerEvent = codec::decode(&encoded).unwrap();
//! assert_eq!(decoded, ServerEvent::PlayCommand);
//! ```

pub mod codec;
pub mod events;

pub use codec::{decode, encode, Encoded, Encoding, ProtocolError};
pub use events::{ClientEvent, ServerEvent, INVALID_ROOM_CODE};
