//! # Bus Context
//!
//! The state bundle behind a bus: its lock, its address directory and, when the
//! configuration enables one, its queue.
//!
//! A context is created on first use and destroyed by an explicit teardown. Its
//! lifecycle only moves forward: `Uninitialized -> Active -> TornDown`. Operations
//! hold an `Arc` to the context for their duration, so a teardown racing with a
//! dispatch leaves the dispatch walking an empty directory rather than freed memory.

use crate::config::BusConfig;
use crate::directory::Directory;
use crate::lock::BusLock;
use crate::queue::EventQueue;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Lifecycle of a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BusState {
    /// Nothing has used the bus yet.
    Uninitialized,
    /// A context exists.
    Active,
    /// The context was torn down. Terminal.
    TornDown,
}

pub(crate) enum ContextState<C: BusConfig> {
    Uninitialized,
    Active(Arc<Context<C>>),
    TornDown,
}

impl<C: BusConfig> ContextState<C> {
    pub(crate) fn state(&self) -> BusState {
        match self {
            ContextState::Uninitialized => BusState::Uninitialized,
            ContextState::Active(_) => BusState::Active,
            ContextState::TornDown => BusState::TornDown,
        }
    }
}

pub(crate) struct Context<C: BusConfig> {
    pub(crate) id: u64,
    pub(crate) lock: BusLock,
    pub(crate) directory: Mutex<Directory<C>>,
    pub(crate) queue: Option<EventQueue<C>>,
    dispatches: AtomicU64,
}

impl<C: BusConfig> Context<C> {
    pub(crate) fn new() -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            lock: BusLock::new(C::LOCK_POLICY),
            directory: Mutex::new(Directory::new()),
            queue: C::ENABLE_QUEUE.then(EventQueue::new),
            dispatches: AtomicU64::new(0),
        }
    }

    pub(crate) fn record_dispatch(&self) {
        self.dispatches.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn dispatches(&self) -> u64 {
        self.dispatches.load(Ordering::Relaxed)
    }
}

impl<C: BusConfig> std::fmt::Debug for Context<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("bus", &C::NAME)
            .field("id", &self.id)
            .field("lock", &self.lock)
            .field("queue", &self.queue.is_some())
            .finish()
    }
}
