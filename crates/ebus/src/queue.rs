//! # Deferred Call Queue
//!
//! FIFO store of type-erased calls waiting for [`Bus::execute_queued_events`].
//!
//! Two locks, mirroring the bus itself. The message store sits behind a
//! short-lived mutex taken only to push, count, or take the whole batch. The
//! `QUEUE_LOCK_POLICY` lock is held across an entire execution, so it decides
//! whether two executions may interleave (`NoLock`), are serialized
//! (`Exclusive`), or may nest from inside a queued call (`Reentrant`).
//!
//! Calls never run or drop while the message mutex is held, so a queued call,
//! or the `Drop` of something it captured, may queue more work. That work
//! waits for the next execution.
//!
//! Calls are boxed `FnOnce + Send + 'static` closures. The `'static` bound means a
//! queued call can only own its captured arguments: it never holds a reference
//! into the caller's stack frame, which is gone by the time the call runs.
//!
//! [`Bus::execute_queued_events`]: crate::Bus::execute_queued_events

use crate::bus::Bus;
use crate::config::BusConfig;
use crate::lock::BusLock;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, error};

/// A deferred call. Receives the bus it was queued on when executed.
pub(crate) type QueuedCall<C> = Box<dyn FnOnce(&Bus<C>) + Send + 'static>;

pub(crate) struct EventQueue<C: BusConfig> {
    execution: BusLock,
    messages: Mutex<VecDeque<QueuedCall<C>>>,
    active: AtomicBool,
    executed: AtomicU64,
    failed: AtomicU64,
}

impl<C: BusConfig> EventQueue<C> {
    pub(crate) fn new() -> Self {
        Self {
            execution: BusLock::new(C::QUEUE_LOCK_POLICY),
            messages: Mutex::new(VecDeque::new()),
            active: AtomicBool::new(C::QUEUE_ACTIVE_BY_DEFAULT),
            executed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
        }
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    pub(crate) fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Appends a call. Returns `false` and drops the call when the queue is inactive.
    pub(crate) fn enqueue(&self, call: QueuedCall<C>) -> bool {
        if !self.is_active() {
            return false;
        }
        self.messages.lock().push_back(call);
        true
    }

    /// Runs every call queued before this method was entered, in FIFO order.
    ///
    /// A panicking call is logged and counted; the remaining calls still run.
    /// With an `Exclusive` queue lock, calling this from inside a queued call
    /// deadlocks.
    pub(crate) fn execute(&self, bus: &Bus<C>) -> usize {
        let _execution = self.execution.lock();
        let batch = std::mem::take(&mut *self.messages.lock());
        if batch.is_empty() {
            return 0;
        }

        let total = batch.len();
        let mut failures = 0u64;
        for call in batch {
            if let Err(panic) = catch_unwind(AssertUnwindSafe(|| call(bus))) {
                failures += 1;
                error!(
                    "🔴 Bus '{}': queued call panicked: {}",
                    C::NAME,
                    panic_message(panic.as_ref())
                );
            }
        }

        self.executed.fetch_add(total as u64, Ordering::Relaxed);
        self.failed.fetch_add(failures, Ordering::Relaxed);
        debug!(
            "Bus '{}': executed {} queued calls ({} failed)",
            C::NAME, total, failures
        );
        total
    }

    /// Drops every queued call without running it. Returns how many were dropped.
    ///
    /// The calls are dropped after the message mutex is released.
    pub(crate) fn clear(&self) -> usize {
        let dropped = std::mem::take(&mut *self.messages.lock());
        dropped.len()
    }

    pub(crate) fn count(&self) -> usize {
        self.messages.lock().len()
    }

    pub(crate) fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    pub(crate) fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
