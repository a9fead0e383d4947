//! Lock strategies selected by [`LockPolicy`].
//!
//! All three strategies expose the same `lock()` call. The guard they return is
//! held across a whole dispatch walk or connection change; the directory data
//! itself sits behind its own short-lived mutex and is never borrowed while a
//! handler runs.

use crate::config::LockPolicy;
use parking_lot::{Mutex, MutexGuard, ReentrantMutex, ReentrantMutexGuard};

pub(crate) enum BusLock {
    NoLock,
    Exclusive(Mutex<()>),
    Reentrant(ReentrantMutex<()>),
}

/// Held for the duration of a critical section. Dropping it releases the lock.
#[must_use]
#[allow(dead_code)] // guards are only held for their drop
pub(crate) enum BusLockGuard<'a> {
    NoLock,
    Exclusive(MutexGuard<'a, ()>),
    Reentrant(ReentrantMutexGuard<'a, ()>),
}

impl BusLock {
    pub(crate) fn new(policy: LockPolicy) -> Self {
        match policy {
            LockPolicy::NoLock => BusLock::NoLock,
            LockPolicy::Exclusive => BusLock::Exclusive(Mutex::new(())),
            LockPolicy::Reentrant => BusLock::Reentrant(ReentrantMutex::new(())),
        }
    }

    pub(crate) fn lock(&self) -> BusLockGuard<'_> {
        match self {
            BusLock::NoLock => BusLockGuard::NoLock,
            BusLock::Exclusive(mutex) => BusLockGuard::Exclusive(mutex.lock()),
            BusLock::Reentrant(mutex) => BusLockGuard::Reentrant(mutex.lock()),
        }
    }

    pub(crate) fn policy(&self) -> LockPolicy {
        match self {
            BusLock::NoLock => LockPolicy::NoLock,
            BusLock::Exclusive(_) => LockPolicy::Exclusive,
            BusLock::Reentrant(_) => LockPolicy::Reentrant,
        }
    }
}

impl std::fmt::Debug for BusLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("BusLock").field(&self.policy()).finish()
    }
}
