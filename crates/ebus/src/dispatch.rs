//! # Dispatcher
//!
//! Sequential walks over a handler set, on the calling thread.
//!
//! The bus lock (per [`LockPolicy`](crate::LockPolicy)) is held for the whole walk.
//! The directory mutex is only held while the cursor advances, never while a
//! handler runs, so handlers may connect, disconnect, or dispatch again on a
//! reentrant bus.

use crate::config::BusConfig;
use crate::context::Context;
use crate::directory::{AddressRef, Scope};
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::trace;

/// The handler set a walk covers.
pub(crate) enum Target<'a, C: BusConfig> {
    /// Every address, in directory order.
    All,
    /// The address with this id.
    Id(&'a C::Id),
    /// A bound address.
    Bound(AddressRef),
}

/// Order of a walk over a handler set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Direction {
    /// Front to back.
    Forward,
    /// Back to front.
    Reverse,
}

/// Ends the walk's cursor even when a handler panics.
struct WalkGuard<'a, C: BusConfig> {
    context: &'a Context<C>,
    cursor: usize,
}

impl<C: BusConfig> Drop for WalkGuard<'_, C> {
    fn drop(&mut self) {
        self.context.directory.lock().end_walk(self.cursor);
    }
}

/// Visits each live handler of `target` until `visit` breaks.
///
/// Handlers connected after the walk starts are not visited. Handlers
/// disconnected before the cursor reaches them are not visited. Returns the
/// number of handlers visited.
pub(crate) fn walk<C, F>(context: &Context<C>, target: Target<'_, C>, direction: Direction, mut visit: F) -> usize
where
    C: BusConfig,
    F: FnMut(&Arc<C::Handler>) -> ControlFlow<()>,
{
    let _lock = context.lock.lock();

    let cursor = {
        let mut directory = context.directory.lock();
        let scope = match target {
            Target::All => Some(Scope::All),
            Target::Id(id) => directory.find_address(id).map(Scope::Address),
            Target::Bound(address) => directory.resolve(address).map(Scope::Address),
        };
        match scope.and_then(|scope| directory.begin_walk(scope, direction == Direction::Forward)) {
            Some(cursor) => cursor,
            None => return 0,
        }
    };
    let guard = WalkGuard { context, cursor };

    let mut visited = 0;
    loop {
        let next = context.directory.lock().advance(cursor);
        let Some(handler) = next else { break };
        visited += 1;
        trace!("Bus '{}': dispatching to handler #{}", C::NAME, visited);
        if visit(&handler).is_break() {
            break;
        }
    }

    drop(guard);
    visited
}
