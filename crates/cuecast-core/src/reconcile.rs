//! Disconnect handling.
//!
//! A departing controller takes its room with it: every receiver is told
//! the room closed and the code becomes free. A departing receiver loses
//! one entry in its room and the controller gets the new count.

use crate::connection::ConnectionId;
use crate::delivery::Delivery;
use crate::registry::RegistryState;
use crate::relay::{notify_released, Dispatch};
use crate::session::{Role, SessionState, Transition};
use cuecast_protocol::ServerEvent;
use tracing::debug;

/// Undo a departed connection's membership.
///
/// The resulting transition always ends in [`SessionState::Closed`].
pub fn reconcile(state: &mut RegistryState, connection_id: &ConnectionId) -> Dispatch {
    let from = state.session_state(connection_id);
    let mut deliveries = Vec::new();

    match state.binding(connection_id).cloned() {
        Some(binding) if binding.role == Role::Controller => {
            if let Some(room) = state.remove_room(&binding.room) {
                debug!(
                    room = %binding.room,
                    connection = %connection_id,
                    receivers = room.receiver_count(),
                    "Controller left, closing room"
                );
                deliveries.extend(
                    room.receivers()
                        .into_iter()
                        .map(|receiver| Delivery::new(receiver, ServerEvent::RoomClosed)),
                );
            }
        }
        Some(binding) => {
            debug!(room = %binding.room, connection = %connection_id, "Receiver left");
            notify_released(state.depart(connection_id), &mut deliveries);
        }
        None => {}
    }

    Dispatch {
        transition: Transition {
            from,
            to: SessionState::Closed,
        },
        deliveries,
    }
}
