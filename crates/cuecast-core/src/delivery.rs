//! Outbound events addressed to a connection.

use crate::connection::ConnectionId;
use cuecast_protocol::ServerEvent;

/// An event ready for delivery to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Target connection.
    pub target: ConnectionId,
    /// The event to deliver.
    pub event: ServerEvent,
}

impl Delivery {
    /// Create a new delivery.
    #[must_use]
    pub fn new(target: ConnectionId, event: ServerEvent) -> Self {
        Self { target, event }
    }
}

/// Count deliveries of one event kind.
#[must_use]
pub fn count_named(deliveries: &[Delivery], name: &str) -> usize {
    deliveries.iter().filter(|d| d.event.name() == name).count()
}
