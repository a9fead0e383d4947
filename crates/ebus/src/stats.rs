//! Statistics snapshot for a bus.

use crate::config::BusConfig;
use crate::context::BusState;
use serde::{Deserialize, Serialize};

/// Point-in-time counters for one bus, as returned by [`Bus::stats`](crate::Bus::stats).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusStats {
    /// Configured bus name
    pub name: String,
    /// Lifecycle state at the time of the snapshot
    pub state: BusState,
    /// Number of live addresses
    pub addresses: usize,
    /// Number of connected handlers across all addresses
    pub handlers: usize,
    /// Number of dispatch calls made since the context was created
    pub events_dispatched: u64,
    /// Number of calls waiting in the queue
    pub queued_calls: usize,
    /// Whether the queue accepts new calls
    pub queue_active: bool,
    /// Number of queued calls run so far
    pub queued_calls_executed: u64,
    /// Number of queued calls that panicked
    pub queued_calls_failed: u64,
}

impl BusStats {
    pub(crate) fn empty<C: BusConfig>(state: BusState) -> Self {
        Self {
            name: C::NAME.to_string(),
            state,
            addresses: 0,
            handlers: 0,
            events_dispatched: 0,
            queued_calls: 0,
            queue_active: C::QUEUE_ACTIVE_BY_DEFAULT,
            queued_calls_executed: 0,
            queued_calls_failed: 0,
        }
    }
}
