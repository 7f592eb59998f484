//! The room registry.
//!
//! [`RegistryState`] holds every active room plus a reverse index from
//! connection to its single [`Binding`], so a disconnect is resolved
//! without scanning rooms. [`RoomRegistry`] wraps the state in one mutex;
//! compound read-modify-emit sequences run inside [`RoomRegistry::with`],
//! queueing their events before the guard is dropped so every connection
//! sees them in commit order.

use crate::code::RoomCode;
use crate::connection::ConnectionId;
use crate::room::Room;
use crate::session::{Binding, Role, SessionState};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tracing::{debug, info};

/// Registry errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// No room has this code.
    #[error("Room not found: {0}")]
    RoomNotFound(RoomCode),

    /// A room with this code already exists.
    #[error("Room already exists: {0}")]
    RoomExists(RoomCode),
}

/// A binding dropped because its connection bound somewhere else.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Released {
    /// The binding that was dropped.
    pub binding: Binding,
    /// Controller to tell about the new receiver count. Only set when a
    /// receiver binding was released from a controlled room.
    pub notify: Option<ConnectionId>,
    /// Receiver entries left in the released room.
    pub receiver_count: usize,
}

/// Result of [`RegistryState::attach_controller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attached {
    /// Receiver entries in the room.
    pub receiver_count: usize,
    /// A different controller this one replaced.
    pub displaced: Option<ConnectionId>,
    /// The connection's previous binding, if it had to be dropped.
    pub released: Option<Released>,
}

/// Result of [`RegistryState::add_receiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Joined {
    /// Receiver entries in the room, including the new one.
    pub receiver_count: usize,
    /// The room's controller, if attached.
    pub controller: Option<ConnectionId>,
    /// The connection's previous binding, if it had to be dropped.
    pub released: Option<Released>,
}

/// How many receiver entries an unbind takes out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Removal {
    OneEntry,
    AllEntries,
}

/// Rooms and the connection reverse index.
#[derive(Debug, Default)]
pub struct RegistryState {
    /// Rooms indexed by code.
    rooms: HashMap<RoomCode, Room>,
    /// Connection bindings (connection_id -> room and role).
    bindings: HashMap<ConnectionId, Binding>,
}

impl RegistryState {
    /// Create an empty registry state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw a code that no active room uses.
    #[must_use]
    pub fn generate_code(&self) -> RoomCode {
        RoomCode::generate_unused(&mut rand::thread_rng(), |code| {
            self.rooms.contains_key(code)
        })
    }

    /// Draw an unused code and create its room.
    pub fn allocate(&mut self) -> RoomCode {
        let code = self.generate_code();
        debug!(room = %code, "Room allocated");
        self.rooms.insert(code.clone(), Room::new(code.clone()));
        code
    }

    /// Create a room with no controller and no receivers.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomExists`] if the code is taken.
    pub fn create(&mut self, code: RoomCode) -> Result<&Room, RegistryError> {
        match self.rooms.entry(code) {
            Entry::Occupied(entry) => Err(RegistryError::RoomExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                let code = entry.key().clone();
                debug!(room = %code, "Room created");
                Ok(entry.insert(Room::new(code)))
            }
        }
    }

    /// Set the room's controller, replacing any previous one.
    ///
    /// A replaced controller loses its binding, so its later disconnect
    /// leaves the room alone.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomNotFound`] if no room has this code.
    pub fn attach_controller(
        &mut self,
        code: &RoomCode,
        connection_id: &ConnectionId,
    ) -> Result<Attached, RegistryError> {
        if !self.rooms.contains_key(code) {
            return Err(RegistryError::RoomNotFound(code.clone()));
        }

        let binding = Binding::controller(code.clone());
        let released = self.release_unless(connection_id, &binding);

        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RegistryError::RoomNotFound(code.clone()))?;
        let displaced = room
            .set_controller(connection_id.clone())
            .filter(|previous| previous != connection_id);
        let receiver_count = room.receiver_count();

        if let Some(previous) = &displaced {
            debug!(room = %code, previous = %previous, connection = %connection_id, "Controller replaced");
            self.unbind_if(previous, &binding);
        }
        self.bindings.insert(connection_id.clone(), binding);

        Ok(Attached {
            receiver_count,
            displaced,
            released,
        })
    }

    /// Append a receiver entry to a room.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomNotFound`] if no room has this code.
    pub fn add_receiver(
        &mut self,
        code: &RoomCode,
        connection_id: &ConnectionId,
    ) -> Result<Joined, RegistryError> {
        if !self.rooms.contains_key(code) {
            return Err(RegistryError::RoomNotFound(code.clone()));
        }

        let binding = Binding::receiver(code.clone());
        let released = self.release_unless(connection_id, &binding);

        let room = self
            .rooms
            .get_mut(code)
            .ok_or_else(|| RegistryError::RoomNotFound(code.clone()))?;
        room.add_receiver(connection_id.clone());
        let joined = Joined {
            receiver_count: room.receiver_count(),
            controller: room.controller().cloned(),
            released,
        };
        self.bindings.insert(connection_id.clone(), binding);

        Ok(joined)
    }

    /// Remove one receiver entry.
    ///
    /// No-op if the room is absent or the connection is not a receiver
    /// there. Returns `true` if an entry was removed.
    pub fn remove_receiver(&mut self, code: &RoomCode, connection_id: &ConnectionId) -> bool {
        let Some(room) = self.rooms.get_mut(code) else {
            return false;
        };
        if !room.remove_receiver(connection_id) {
            return false;
        }
        if !room.has_receiver(connection_id) {
            self.unbind_if(connection_id, &Binding::receiver(code.clone()));
        }
        true
    }

    /// Delete a room and unbind everyone bound to it.
    pub fn remove_room(&mut self, code: &RoomCode) -> Option<Room> {
        let room = self.rooms.remove(code)?;

        if let Some(controller) = room.controller() {
            self.unbind_if(controller, &Binding::controller(code.clone()));
        }
        let as_receiver = Binding::receiver(code.clone());
        for receiver in room.receivers() {
            self.unbind_if(&receiver, &as_receiver);
        }

        debug!(room = %code, receivers = room.receiver_count(), "Room removed");
        Some(room)
    }

    /// Drop a connection's binding so it can bind elsewhere.
    ///
    /// A receiver loses every entry in its room, so it no longer gets that
    /// room's play commands; a controller is detached and its room stays
    /// open.
    pub fn release(&mut self, connection_id: &ConnectionId) -> Option<Released> {
        self.unbind(connection_id, Removal::AllEntries)
    }

    /// Drop a departed connection's binding.
    ///
    /// A receiver loses exactly one entry; a controller is detached and
    /// its room stays open.
    pub fn depart(&mut self, connection_id: &ConnectionId) -> Option<Released> {
        self.unbind(connection_id, Removal::OneEntry)
    }

    fn unbind(&mut self, connection_id: &ConnectionId, removal: Removal) -> Option<Released> {
        let binding = self.bindings.remove(connection_id)?;
        let room = self.rooms.get_mut(&binding.room)?;

        let notify = match binding.role {
            Role::Controller => {
                room.clear_controller(connection_id);
                None
            }
            Role::Receiver => {
                match removal {
                    Removal::OneEntry => {
                        room.remove_receiver(connection_id);
                    }
                    Removal::AllEntries => {
                        room.purge_receiver(connection_id);
                    }
                }
                room.controller().cloned()
            }
        };

        Some(Released {
            receiver_count: room.receiver_count(),
            notify,
            binding,
        })
    }

    /// Get the number of receiver entries in a room (0 if absent).
    #[must_use]
    pub fn receiver_count(&self, code: &RoomCode) -> usize {
        self.rooms.get(code).map(Room::receiver_count).unwrap_or(0)
    }

    /// Check if a room exists.
    #[must_use]
    pub fn contains(&self, code: &RoomCode) -> bool {
        self.rooms.contains_key(code)
    }

    /// Get a room.
    #[must_use]
    pub fn room(&self, code: &RoomCode) -> Option<&Room> {
        self.rooms.get(code)
    }

    /// Get a connection's binding.
    #[must_use]
    pub fn binding(&self, connection_id: &ConnectionId) -> Option<&Binding> {
        self.bindings.get(connection_id)
    }

    /// Get a live connection's state.
    #[must_use]
    pub fn session_state(&self, connection_id: &ConnectionId) -> SessionState {
        SessionState::from(self.binding(connection_id))
    }

    /// Get all room codes, sorted.
    #[must_use]
    pub fn room_codes(&self) -> Vec<RoomCode> {
        let mut codes: Vec<_> = self.rooms.keys().cloned().collect();
        codes.sort();
        codes
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            room_count: self.rooms.len(),
            controller_count: self
                .rooms
                .values()
                .filter(|room| room.controller().is_some())
                .count(),
            receiver_count: self.rooms.values().map(Room::receiver_count).sum(),
            bound_connections: self.bindings.len(),
        }
    }

    /// Release the connection's binding unless it already is `wanted`.
    fn release_unless(
        &mut self,
        connection_id: &ConnectionId,
        wanted: &Binding,
    ) -> Option<Released> {
        match self.bindings.get(connection_id) {
            Some(current) if current != wanted => self.release(connection_id),
            _ => None,
        }
    }

    /// Remove a binding only if it is `expected`.
    fn unbind_if(&mut self, connection_id: &ConnectionId, expected: &Binding) {
        if self.bindings.get(connection_id) == Some(expected) {
            self.bindings.remove(connection_id);
        }
    }
}

/// The shared registry: [`RegistryState`] behind a single lock.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    state: Mutex<RegistryState>,
}

impl RoomRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        info!("Creating room registry");
        Self::default()
    }

    /// Lock the registry.
    ///
    /// A panic while the lock was held leaves the state usable, so a
    /// poisoned lock is recovered rather than propagated.
    pub fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with exclusive access to the registry state.
    pub fn with<T>(&self, f: impl FnOnce(&mut RegistryState) -> T) -> T {
        f(&mut self.lock())
    }

    /// Allocate a room under a fresh unused code.
    pub fn allocate(&self) -> RoomCode {
        self.with(RegistryState::allocate)
    }

    /// Create a room under a caller-chosen code.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::RoomExists`] if the code is taken.
    pub fn create(&self, code: RoomCode) -> Result<(), RegistryError> {
        self.with(|state| state.create(code).map(|_| ()))
    }

    /// Check if a room exists.
    #[must_use]
    pub fn contains(&self, code: &RoomCode) -> bool {
        self.lock().contains(code)
    }

    /// Get a snapshot of a room.
    #[must_use]
    pub fn room(&self, code: &RoomCode) -> Option<Room> {
        self.lock().room(code).cloned()
    }

    /// Get the number of receiver entries in a room (0 if absent).
    #[must_use]
    pub fn receiver_count(&self, code: &RoomCode) -> usize {
        self.lock().receiver_count(code)
    }

    /// Get a live connection's state.
    #[must_use]
    pub fn session_state(&self, connection_id: &ConnectionId) -> SessionState {
        self.lock().session_state(connection_id)
    }

    /// Get registry statistics.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        self.lock().stats()
    }
}

/// Registry statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RegistryStats {
    /// Number of active rooms.
    pub room_count: usize,
    /// Rooms with an attached controller.
    pub controller_count: usize,
    /// Receiver entries across all rooms.
    pub receiver_count: usize,
    /// Connections with a binding.
    pub bound_connections: usize,
}
