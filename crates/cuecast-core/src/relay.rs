//! Event relay.
//!
//! [`dispatch`] is the whole inbound state machine: it maps one client
//! event plus the registry state to a state transition and the deliveries
//! it causes. It does no I/O. [`Relay`] runs it under the registry lock and
//! queues the deliveries on the [`Hub`] before the lock is released, so
//! every outbox sees events in the order their changes were committed.
//!
//! Receiver-side lookups (`receiver_join`, `receiver_leave`) uppercase the
//! room code first; controller-side lookups (`controller_join`,
//! `play_sound`) use it verbatim.

use crate::code::RoomCode;
use crate::connection::ConnectionId;
use crate::delivery::Delivery;
use crate::hub::{Hub, Outbox};
use crate::reconcile::reconcile;
use crate::registry::{RegistryState, Released, RoomRegistry};
use crate::session::{Session, Transition};
use cuecast_protocol::{ClientEvent, ServerEvent};
use std::sync::Arc;
use tracing::debug;

/// The outcome of one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dispatch {
    /// How the sender's state changed.
    pub transition: Transition,
    /// Events to deliver, in order.
    pub deliveries: Vec<Delivery>,
}

impl Dispatch {
    /// Deliveries addressed to one connection.
    #[must_use]
    pub fn to(&self, target: &ConnectionId) -> Vec<&ServerEvent> {
        self.deliveries
            .iter()
            .filter(|d| &d.target == target)
            .map(|d| &d.event)
            .collect()
    }
}

/// Apply one client event to the registry state.
pub fn dispatch(
    state: &mut RegistryState,
    connection_id: &ConnectionId,
    event: ClientEvent,
) -> Dispatch {
    let from = state.session_state(connection_id);
    let mut deliveries = Vec::new();

    match event {
        ClientEvent::ControllerJoin { room_code } => controller_join(
            state,
            connection_id,
            RoomCode::verbatim(room_code),
            &mut deliveries,
        ),
        ClientEvent::ReceiverJoin { room_code } => receiver_join(
            state,
            connection_id,
            RoomCode::normalized(&room_code),
            &mut deliveries,
        ),
        ClientEvent::ReceiverLeave { room_code } => receiver_leave(
            state,
            connection_id,
            RoomCode::normalized(&room_code),
            &mut deliveries,
        ),
        ClientEvent::PlaySound { room_code } => play_sound(
            state,
            connection_id,
            RoomCode::verbatim(room_code),
            &mut deliveries,
        ),
    }

    Dispatch {
        transition: Transition {
            from,
            to: state.session_state(connection_id),
        },
        deliveries,
    }
}

fn controller_join(
    state: &mut RegistryState,
    connection_id: &ConnectionId,
    code: RoomCode,
    out: &mut Vec<Delivery>,
) {
    match state.attach_controller(&code, connection_id) {
        Ok(attached) => {
            notify_released(attached.released, out);
            out.push(Delivery::new(
                connection_id.clone(),
                ServerEvent::receiver_update(attached.receiver_count),
            ));
        }
        Err(e) => {
            debug!(connection = %connection_id, error = %e, "controller_join ignored");
        }
    }
}

fn receiver_join(
    state: &mut RegistryState,
    connection_id: &ConnectionId,
    code: RoomCode,
    out: &mut Vec<Delivery>,
) {
    match state.add_receiver(&code, connection_id) {
        Ok(joined) => {
            notify_released(joined.released, out);
            out.push(Delivery::new(
                connection_id.clone(),
                ServerEvent::join_success(code.as_str()),
            ));
            if let Some(controller) = joined.controller {
                out.push(Delivery::new(
                    controller,
                    ServerEvent::receiver_update(joined.receiver_count),
                ));
            }
        }
        Err(e) => {
            debug!(connection = %connection_id, error = %e, "receiver_join rejected");
            out.push(Delivery::new(
                connection_id.clone(),
                ServerEvent::invalid_room_code(),
            ));
        }
    }
}

fn receiver_leave(
    state: &mut RegistryState,
    connection_id: &ConnectionId,
    code: RoomCode,
    out: &mut Vec<Delivery>,
) {
    if !state.remove_receiver(&code, connection_id) {
        debug!(connection = %connection_id, room = %code, "receiver_leave from non-member ignored");
        return;
    }

    if let Some(controller) = state.room(&code).and_then(|room| room.controller()) {
        out.push(Delivery::new(
            controller.clone(),
            ServerEvent::receiver_update(state.receiver_count(&code)),
        ));
    }
}

fn play_sound(
    state: &RegistryState,
    connection_id: &ConnectionId,
    code: RoomCode,
    out: &mut Vec<Delivery>,
) {
    match state.room(&code) {
        Some(room) if room.is_controller(connection_id) => {
            out.extend(
                room.receivers()
                    .into_iter()
                    .filter(|receiver| receiver != connection_id)
                    .map(|receiver| Delivery::new(receiver, ServerEvent::PlayCommand)),
            );
        }
        Some(_) => {
            debug!(connection = %connection_id, room = %code, "play_sound from non-controller ignored");
        }
        None => {
            debug!(connection = %connection_id, room = %code, "play_sound for unknown room ignored");
        }
    }
}

/// Tell a released receiver's old controller about the new count.
pub(crate) fn notify_released(released: Option<Released>, out: &mut Vec<Delivery>) {
    if let Some(Released {
        notify: Some(controller),
        receiver_count,
        ..
    }) = released
    {
        out.push(Delivery::new(
            controller,
            ServerEvent::receiver_update(receiver_count),
        ));
    }
}

/// Runs dispatch and reconciliation against the shared registry and
/// delivers the results.
#[derive(Debug, Clone)]
pub struct Relay {
    registry: Arc<RoomRegistry>,
    hub: Arc<Hub>,
}

impl Relay {
    /// Create a relay over a registry and hub.
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>, hub: Arc<Hub>) -> Self {
        Self { registry, hub }
    }

    /// Get the registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Get the hub.
    #[must_use]
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Open a session for a new connection.
    pub fn connect(self: &Arc<Self>) -> (Session, Outbox) {
        self.connect_with_id(ConnectionId::generate())
    }

    /// Open a session under a caller-chosen ID.
    pub fn connect_with_id(self: &Arc<Self>, connection_id: ConnectionId) -> (Session, Outbox) {
        let outbox = self.hub.register(connection_id.clone());
        (Session::new(connection_id, Arc::clone(self)), outbox)
    }

    /// Handle one inbound event.
    pub fn handle(&self, connection_id: &ConnectionId, event: ClientEvent) -> Dispatch {
        self.registry.with(|state| {
            let result = dispatch(state, connection_id, event);
            self.hub.deliver(&result.deliveries);
            result
        })
    }

    /// Tear down a connection: unregister it, reconcile the registry and
    /// notify whoever is affected.
    pub fn disconnect(&self, connection_id: &ConnectionId) -> Dispatch {
        self.hub.unregister(connection_id);
        self.registry.with(|state| {
            let result = reconcile(state, connection_id);
            self.hub.deliver(&result.deliveries);
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;

    fn conn(id: &str) -> ConnectionId {
        ConnectionId::new(id)
    }

    fn code(s: &str) -> RoomCode {
        RoomCode::verbatim(s)
    }

    /// A registry with room AB12C3 controlled by `ctl`.
    fn controlled_room() -> RegistryState {
        let mut state = RegistryState::new();
        state.create(code("AB12C3")).unwrap();
        dispatch(&mut state, &conn("ctl"), ClientEvent::controller_join("AB12C3"));
        state
    }

    #[test]
    fn test_controller_join_reports_count() {
        let mut state = RegistryState::new();
        state.create(code("AB12C3")).unwrap();

        let result = dispatch(&mut state, &conn("ctl"), ClientEvent::controller_join("AB12C3"));
        assert_eq!(
            result.deliveries,
            vec![Delivery::new(conn("ctl"), ServerEvent::receiver_update(0))]
        );
        assert_eq!(result.transition.from, SessionState::Unbound);
        assert_eq!(
            result.transition.to,
            SessionState::ControllerBound(code("AB12C3"))
        );
        assert!(state.room(&code("AB12C3")).unwrap().is_controller(&conn("ctl")));
    }

    #[test]
    fn test_controller_join_unknown_room_is_silent() {
        let mut state = RegistryState::new();
        let result = dispatch(&mut state, &conn("ctl"), ClientEvent::controller_join("AB12C3"));
        assert!(result.deliveries.is_empty());
        assert!(!result.transition.is_change());
    }

    #[test]
    fn test_controller_join_does_not_normalize() {
        let mut state = RegistryState::new();
        state.create(code("AB12C3")).unwrap();
        let result = dispatch(&mut state, &conn("ctl"), ClientEvent::controller_join("ab12c3"));
        assert!(result.deliveries.is_empty());
        assert!(state.room(&code("AB12C3")).unwrap().controller().is_none());
    }

    #[test]
    fn test_receiver_join_lowercase_code() {
        let mut state = controlled_room();

        let result = dispatch(&mut state, &conn("rx"), ClientEvent::receiver_join("ab12c3"));
        assert_eq!(
            result.deliveries,
            vec![
                Delivery::new(conn("rx"), ServerEvent::join_success("AB12C3")),
                Delivery::new(conn("ctl"), ServerEvent::receiver_update(1)),
            ]
        );
        assert_eq!(
            result.transition.to,
            SessionState::ReceiverBound(code("AB12C3"))
        );
        assert_eq!(state.receiver_count(&code("AB12C3")), 1);
    }

    #[test]
    fn test_receiver_join_without_controller() {
        let mut state = RegistryState::new();
        state.create(code("AB12C3")).unwrap();

        let result = dispatch(&mut state, &conn("rx"), ClientEvent::receiver_join("AB12C3"));
        assert_eq!(
            result.deliveries,
            vec![Delivery::new(conn("rx"), ServerEvent::join_success("AB12C3"))]
        );

        // The controller learns the count when it attaches
        let result = dispatch(&mut state, &conn("ctl"), ClientEvent::controller_join("AB12C3"));
        assert_eq!(result.to(&conn("ctl")), vec![&ServerEvent::receiver_update(1)]);
    }

    #[test]
    fn test_receiver_join_unknown_room() {
        let mut state = controlled_room();
        let before = state.stats();

        let result = dispatch(&mut state, &conn("rx"), ClientEvent::receiver_join("ZZZZZZ"));
        assert_eq!(
            result.deliveries,
            vec![Delivery::new(conn("rx"), ServerEvent::invalid_room_code())]
        );
        assert_eq!(state.stats(), before);
        assert_eq!(result.transition.to, SessionState::Unbound);
    }

    #[test]
    fn test_receiver_leave() {
        let mut state = controlled_room();
        dispatch(&mut state, &conn("rx-1"), ClientEvent::receiver_join("AB12C3"));
        dispatch(&mut state, &conn("rx-2"), ClientEvent::receiver_join("AB12C3"));

        let result = dispatch(&mut state, &conn("rx-1"), ClientEvent::receiver_leave("ab12c3"));
        assert_eq!(
            result.deliveries,
            vec![Delivery::new(conn("ctl"), ServerEvent::receiver_update(1))]
        );
        assert_eq!(result.transition.to, SessionState::Unbound);

        // Leaving again changes nothing
        let result = dispatch(&mut state, &conn("rx-1"), ClientEvent::receiver_leave("AB12C3"));
        assert!(result.deliveries.is_empty());
        assert_eq!(state.receiver_count(&code("AB12C3")), 1);
    }

    #[test]
    fn test_play_sound_fans_out_to_receivers_only() {
        let mut state = controlled_room();
        dispatch(&mut state, &conn("rx-1"), ClientEvent::receiver_join("AB12C3"));
        dispatch(&mut state, &conn("rx-2"), ClientEvent::receiver_join("AB12C3"));

        let result = dispatch(&mut state, &conn("ctl"), ClientEvent::play_sound("AB12C3"));
        assert_eq!(result.to(&conn("rx-1")), vec![&ServerEvent::PlayCommand]);
        assert_eq!(result.to(&conn("rx-2")), vec![&ServerEvent::PlayCommand]);
        assert!(result.to(&conn("ctl")).is_empty());
        assert_eq!(result.deliveries.len(), 2);
    }

    #[test]
    fn test_play_sound_once_per_duplicate_receiver() {
        let mut state = controlled_room();
        dispatch(&mut state, &conn("rx"), ClientEvent::receiver_join("AB12C3"));
        dispatch(&mut state, &conn("rx"), ClientEvent::receiver_join("AB12C3"));
        assert_eq!(state.receiver_count(&code("AB12C3")), 2);

        let result = dispatch(&mut state, &conn("ctl"), ClientEvent::play_sound("AB12C3"));
        assert_eq!(result.to(&conn("rx")), vec![&ServerEvent::PlayCommand]);
    }

    #[test]
    fn test_play_sound_from_non_controller_ignored() {
        let mut state = controlled_room();
        dispatch(&mut state, &conn("rx-1"), ClientEvent::receiver_join("AB12C3"));
        dispatch(&mut state, &conn("rx-2"), ClientEvent::receiver_join("AB12C3"));

        let result = dispatch(&mut state, &conn("rx-1"), ClientEvent::play_sound("AB12C3"));
        assert!(result.deliveries.is_empty());

        let result = dispatch(&mut state, &conn("stranger"), ClientEvent::play_sound("AB12C3"));
        assert!(result.deliveries.is_empty());

        let result = dispatch(&mut state, &conn("ctl"), ClientEvent::play_sound("ab12c3"));
        assert!(result.deliveries.is_empty());
    }

    #[test]
    fn test_receiver_switching_rooms_updates_old_controller() {
        let mut state = controlled_room();
        state.create(code("XYZ789")).unwrap();
        dispatch(&mut state, &conn("rx"), ClientEvent::receiver_join("AB12C3"));

        let result = dispatch(&mut state, &conn("rx"), ClientEvent::receiver_join("XYZ789"));
        assert_eq!(
            result.deliveries,
            vec![
                Delivery::new(conn("ctl"), ServerEvent::receiver_update(0)),
                Delivery::new(conn("rx"), ServerEvent::join_success("XYZ789")),
            ]
        );
        assert_eq!(
            result.transition,
            Transition {
                from: SessionState::ReceiverBound(code("AB12C3")),
                to: SessionState::ReceiverBound(code("XYZ789")),
            }
        );
    }

    #[tokio::test]
    async fn test_relay_delivers_through_hub() {
        let registry = Arc::new(RoomRegistry::new());
        let relay = Arc::new(Relay::new(Arc::clone(&registry), Arc::new(Hub::new())));
        let room = registry.allocate();

        let (controller, mut controller_rx) = relay.connect();
        let (receiver, mut receiver_rx) = relay.connect();

        controller.handle(ClientEvent::controller_join(room.as_str()));
        assert_eq!(
            controller_rx.recv().await,
            Some(ServerEvent::receiver_update(0))
        );

        receiver.handle(ClientEvent::receiver_join(room.as_str().to_lowercase()));
        assert_eq!(
            receiver_rx.recv().await,
            Some(ServerEvent::join_success(room.as_str()))
        );
        assert_eq!(
            controller_rx.recv().await,
            Some(ServerEvent::receiver_update(1))
        );

        controller.handle(ClientEvent::play_sound(room.as_str()));
        assert_eq!(receiver_rx.recv().await, Some(ServerEvent::PlayCommand));
        assert!(controller_rx.try_recv().is_err());

        controller.close();
        assert_eq!(receiver_rx.recv().await, Some(ServerEvent::RoomClosed));
        assert!(!registry.contains(&room));

        let result = receiver.handle(ClientEvent::receiver_join(room.as_str()));
        assert_eq!(
            result.to(receiver.id()),
            vec![&ServerEvent::invalid_room_code()]
        );
    }

    #[test]
    fn test_concurrent_joins_reach_controller_in_order() {
        const JOINERS: usize = 4;

        for _ in 0..200 {
            let registry = Arc::new(RoomRegistry::new());
            let relay = Arc::new(Relay::new(Arc::clone(&registry), Arc::new(Hub::new())));
            let room = registry.allocate();

            let (controller, mut controller_rx) = relay.connect();
            controller.handle(ClientEvent::controller_join(room.as_str()));

            let barrier = Arc::new(std::sync::Barrier::new(JOINERS));
            let handles: Vec<_> = (0..JOINERS)
                .map(|_| {
                    let relay = Arc::clone(&relay);
                    let barrier = Arc::clone(&barrier);
                    let room = room.clone();
                    std::thread::spawn(move || {
                        let (receiver, _outbox) = relay.connect();
                        barrier.wait();
                        receiver.handle(ClientEvent::receiver_join(room.as_str()));
                        receiver
                    })
                })
                .collect();
            let receivers: Vec<Session> = handles.into_iter().map(|h| h.join().unwrap()).collect();

            let mut counts = Vec::new();
            while let Ok(event) = controller_rx.try_recv() {
                if let ServerEvent::ReceiverUpdate { count } = event {
                    counts.push(count);
                }
            }
            assert_eq!(counts, (0..=JOINERS).collect::<Vec<_>>());
            drop(receivers);
        }
    }
}
