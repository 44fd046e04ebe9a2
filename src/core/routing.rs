//! Route accounting for delivered messages.
//!
//! A route is the ordered pair `sender -> receiver`. Only successful
//! deliveries are counted.

use std::collections::BTreeMap;

use crate::protocol::Message;

/// Key for a route: `"{sender_id}->{receiver_id}"`.
pub fn route_key(sender_id: &str, receiver_id: &str) -> String {
    format!("{}->{}", sender_id, receiver_id)
}

/// Delivery counters kept by the registry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RouteTable {
    total_messages: u64,
    routes: BTreeMap<String, u64>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one delivered message.
    pub fn record(&mut self, message: &Message) {
        self.total_messages += 1;
        *self
            .routes
            .entry(route_key(&message.sender_id, &message.receiver_id))
            .or_insert(0) += 1;
    }

    pub fn total_messages(&self) -> u64 {
        self.total_messages
    }

    pub fn routes(&self) -> &BTreeMap<String, u64> {
        &self.routes
    }

    /// Count for one route, zero if never used.
    pub fn count(&self, sender_id: &str, receiver_id: &str) -> u64 {
        self.routes
            .get(&route_key(sender_id, receiver_id))
            .copied()
            .unwrap_or(0)
    }
}
