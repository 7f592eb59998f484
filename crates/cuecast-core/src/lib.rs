//! # cuecast-core
//!
//! Rooms, sessions and event relay for the cuecast controller/receiver
//! server.
//!
//! - **RoomCode** - Six-character room identifiers
//! - **Registry** - Active rooms and connection bindings behind one lock
//! - **Relay** - Applies client events and fans out the results
//! - **Reconcile** - Cleans up after a disconnect
//! - **Hub** - Per-connection outbound queues
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐
//! │   Session   │────▶│    Relay    │────▶│ RoomRegistry │
//! └─────────────┘     └─────────────┘     └──────────────┘
//!        ▲                   │
//!        │                   ▼
//!        │            ┌─────────────┐
//!        └────────────│     Hub     │
//!         (Outbox)    └─────────────┘
//! ```
//!
//! ## Example
//!
//! ```
//! use cuecast_core::{Hub, Relay, RoomRegistry};
//! use cuecast_protocol::{ClientEvent, ServerEvent};
//! use std::sync::Arc;
//!
//! let relay = Arc::new(Relay::new(Arc::new(RoomRegistry::new()), Arc::new(Hub::new())));
//! let room = relay.registry().allocate();
//!
//! let (controller, _controller_rx) = relay.connect();
//! let (receiver, mut receiver_rx) = relay.connect();
//!
//! controller.handle(ClientEvent::controller_join(room.as_str()));
//! receiver.handle(ClientEvent::receiver_join(room.as_str()));
//! controller.handle(ClientEvent::play_sound(room.as_str()));
//!
//! assert_eq!(receiver_rx.try_recv().ok(), Some(ServerEvent::join_success(room.as_str())));
//! assert_eq!(receiver_rx.try_recv().ok(), Some(ServerEvent::PlayCommand));
//! ```

pub mod code;
pub mod connection;
pub mod delivery;
pub mod hub;
pub mod reconcile;
pub mod registry;
pub mod relay;
pub mod room;
pub mod session;

pub use code::RoomCode;
pub use connection::ConnectionId;
pub use delivery::Delivery;
pub use hub::{Hub, Outbox};
pub use reconcile::reconcile;
pub use registry::{RegistryError, RegistryState, RegistryStats, RoomRegistry};
pub use relay::{dispatch, Dispatch, Relay};
pub use room::Room;
pub use session::{Binding, Role, Session, SessionState, Transition};
