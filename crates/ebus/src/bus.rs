//! # Bus
//!
//! [`Bus`] is the surface consumers use: connection management, immediate
//! dispatch, enumeration, and deferred dispatch through the queue. A bus is
//! `const`-constructible and is normally stored in a `static` (see
//! [`declare_bus!`](crate::declare_bus)), but nothing stops a caller from owning
//! one locally.
//!
//! ## Example
//!
//! ```rust
//! use ebus::{AddressPolicy, Bus, BusConfig};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! pub trait DamageEvents: Send + Sync {
//!     fn on_damage(&self, amount: u32);
//! }
//!
//! struct Health(AtomicU32);
//!
//! impl DamageEvents for Health {
//!     fn on_damage(&self, amount: u32) {
//!         self.0.fetch_sub(amount, Ordering::Relaxed);
//!     }
//! }
//!
//! struct DamageBus;
//!
//! impl BusConfig for DamageBus {
//!     type Handler = dyn DamageEvents;
//!     type Id = u64;
//!     type Order = ();
//!     const NAME: &'static str = "damage";
//!     const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
//! }
//!
//! static DAMAGE: Bus<DamageBus> = Bus::new();
//!
//! let health = Arc::new(Health(AtomicU32::new(100)));
//! let handler: Arc<dyn DamageEvents> = health.clone();
//! let connection = DAMAGE.connect_id(&7, &handler).unwrap();
//!
//! DAMAGE.event(&7, |h| h.on_damage(30));
//! assert_eq!(health.0.load(Ordering::Relaxed), 70);
//!
//! DAMAGE.disconnect(&connection).unwrap();
//! assert_eq!(DAMAGE.event(&7, |h| h.on_damage(30)), 0);
//! ```

use crate::config::{BusConfig, Checks};
use crate::connection::{BusAddress, BusConnection};
use crate::context::{BusState, Context, ContextState};
use crate::directory::Directory;
use crate::dispatch::{walk, Direction, Target};
use crate::error::BusError;
use crate::stats::BusStats;
use parking_lot::RwLock;
use std::marker::PhantomData;
use std::ops::ControlFlow;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A statically configured event bus.
///
/// All operations run synchronously on the calling thread. Which operations a
/// handler may call from inside its own callback depends on
/// [`BusConfig::LOCK_POLICY`]: with `Exclusive`, a handler must not connect,
/// disconnect, dispatch or enumerate on the same bus; queue operations are always
/// allowed because the queue has its own lock.
pub struct Bus<C: BusConfig> {
    state: RwLock<ContextState<C>>,
    _config: PhantomData<fn() -> C>,
}

impl<C: BusConfig> Bus<C> {
    pub const fn new() -> Self {
        Self {
            state: parking_lot::const_rwlock(ContextState::Uninitialized),
            _config: PhantomData,
        }
    }

    // ------------------------------------------------------------------
    // Context lifecycle
    // ------------------------------------------------------------------

    /// The context if one exists. Never creates one.
    fn context(&self) -> Option<Arc<Context<C>>> {
        match &*self.state.read() {
            ContextState::Active(context) => Some(context.clone()),
            _ => None,
        }
    }

    /// The context, created on first call. `None` once the bus is torn down.
    fn get_or_create_context(&self) -> Option<Arc<Context<C>>> {
        if let Some(context) = self.context() {
            return Some(context);
        }

        let mut state = self.state.write();
        match &*state {
            ContextState::Active(context) => Some(context.clone()),
            ContextState::TornDown => None,
            ContextState::Uninitialized => {
                let context = Arc::new(Context::new());
                info!("🚌 Created context {} for bus '{}'", context.id, C::NAME);
                *state = ContextState::Active(context.clone());
                Some(context)
            }
        }
    }

    pub fn state(&self) -> BusState {
        self.state.read().state()
    }

    /// Destroys the context. Terminal: the bus never creates another one.
    ///
    /// Handlers still connected are dropped from the directory and their
    /// connections become inert. That is a caller error and is logged as one.
    /// Queued calls are discarded without running.
    pub fn teardown(&self) {
        let previous = std::mem::replace(&mut *self.state.write(), ContextState::TornDown);
        let ContextState::Active(context) = previous else {
            return;
        };

        let remaining = context.directory.lock().clear();
        let discarded = context.queue.as_ref().map(|queue| queue.clear()).unwrap_or(0);
        if remaining > 0 {
            warn!(
                "⚠️ Bus '{}' torn down with {} handlers still connected",
                C::NAME, remaining
            );
        }
        info!(
            "🛑 Bus '{}' torn down ({} queued calls discarded)",
            C::NAME, discarded
        );
    }

    // ------------------------------------------------------------------
    // Connection management
    // ------------------------------------------------------------------

    /// Connects a handler to the single address of this bus.
    pub fn connect(&self, handler: &Arc<C::Handler>) -> Result<BusConnection<C>, BusError> {
        let () = Checks::<C>::UNADDRESSED;
        self.connect_with(handler, C::Order::default(), |_, directory| {
            Ok(directory.global_address())
        })
    }

    /// Connects a handler to the single address of this bus with an order key.
    pub fn connect_ordered(
        &self,
        handler: &Arc<C::Handler>,
        order: C::Order,
    ) -> Result<BusConnection<C>, BusError> {
        let () = Checks::<C>::UNADDRESSED;
        self.connect_with(handler, order, |_, directory| Ok(directory.global_address()))
    }

    /// Connects a handler to the address `id`, creating the address if needed.
    pub fn connect_id(&self, id: &C::Id, handler: &Arc<C::Handler>) -> Result<BusConnection<C>, BusError> {
        let () = Checks::<C>::ADDRESSED;
        self.connect_with(handler, C::Order::default(), |_, directory| {
            Ok(directory.address_for(id))
        })
    }

    pub fn connect_id_ordered(
        &self,
        id: &C::Id,
        handler: &Arc<C::Handler>,
        order: C::Order,
    ) -> Result<BusConnection<C>, BusError> {
        let () = Checks::<C>::ADDRESSED;
        self.connect_with(handler, order, |_, directory| Ok(directory.address_for(id)))
    }

    /// Connects a handler through a bound address, skipping the id lookup.
    pub fn connect_at(
        &self,
        address: &BusAddress<C>,
        handler: &Arc<C::Handler>,
        order: C::Order,
    ) -> Result<BusConnection<C>, BusError> {
        let () = Checks::<C>::ADDRESSED;
        self.connect_with(handler, order, |context_id, directory| {
            if context_id != address.context_id {
                return Err(BusError::StaleAddress(C::NAME));
            }
            directory
                .resolve(address.address)
                .ok_or(BusError::StaleAddress(C::NAME))
        })
    }

    fn connect_with<L>(
        &self,
        handler: &Arc<C::Handler>,
        order: C::Order,
        locate: L,
    ) -> Result<BusConnection<C>, BusError>
    where
        L: FnOnce(u64, &mut Directory<C>) -> Result<usize, BusError>,
    {
        let context = self
            .get_or_create_context()
            .ok_or(BusError::TornDown(C::NAME))?;
        let _lock = context.lock.lock();
        let mut directory = context.directory.lock();

        let slot = locate(context.id, &mut directory)?;
        match directory.connect(slot, Arc::downgrade(handler), order) {
            Ok(node) => {
                debug!(
                    "🔌 Connected handler to bus '{}' ({} at address)",
                    C::NAME,
                    directory.handler_count(slot)
                );
                Ok(BusConnection::new(context.id, node))
            }
            Err(err) => {
                warn!("⚠️ {}", err);
                Err(err)
            }
        }
    }

    /// Disconnects a handler.
    ///
    /// Returns `Ok(false)` when the connection was already disconnected, including
    /// by a teardown. Safe to call from inside any handler's callback on a
    /// `Reentrant` bus, for this or any other connection.
    pub fn disconnect(&self, connection: &BusConnection<C>) -> Result<bool, BusError> {
        let () = Checks::<C>::VALID;
        let context = match &*self.state.read() {
            ContextState::Active(context) => context.clone(),
            ContextState::TornDown => return Ok(false),
            ContextState::Uninitialized => return Err(BusError::ForeignConnection(C::NAME)),
        };
        if context.id != connection.context_id {
            return Err(BusError::ForeignConnection(C::NAME));
        }

        let _lock = context.lock.lock();
        let removed = context.directory.lock().disconnect(connection.node);
        if removed {
            debug!("🔌 Disconnected handler from bus '{}'", C::NAME);
        }
        Ok(removed)
    }

    pub fn is_connected(&self, connection: &BusConnection<C>) -> bool {
        self.context()
            .filter(|context| context.id == connection.context_id)
            .map(|context| context.directory.lock().is_connected(connection.node))
            .unwrap_or(false)
    }

    /// Resolves `id` to a reusable address handle, creating the address if needed.
    ///
    /// The address stays in the directory while it has no handlers, until teardown.
    pub fn bind(&self, id: &C::Id) -> Result<BusAddress<C>, BusError> {
        let () = Checks::<C>::ADDRESSED;
        let context = self
            .get_or_create_context()
            .ok_or(BusError::TornDown(C::NAME))?;
        let _lock = context.lock.lock();
        let mut directory = context.directory.lock();
        let slot = directory.address_for(id);
        directory.pin(slot);
        Ok(BusAddress {
            context_id: context.id,
            address: directory.address_ref(slot),
            id: id.clone(),
        })
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    fn dispatch<F>(&self, target: Target<'_, C>, direction: Direction, visit: F) -> usize
    where
        F: FnMut(&Arc<C::Handler>) -> ControlFlow<()>,
    {
        let Some(context) = self.context() else {
            return 0;
        };
        context.record_dispatch();
        walk(&context, target, direction, visit)
    }

    fn enumerate<F>(&self, target: Target<'_, C>, visit: F) -> usize
    where
        F: FnMut(&Arc<C::Handler>) -> ControlFlow<()>,
    {
        match self.context() {
            Some(context) => walk(&context, target, Direction::Forward, visit),
            None => 0,
        }
    }

    fn bound_target<'a>(&self, address: &BusAddress<C>) -> Option<Target<'a, C>> {
        let context = self.context()?;
        (context.id == address.context_id).then_some(Target::Bound(address.address))
    }

    /// Calls `event` on every handler at `id`, front to back.
    /// Returns the number of handlers called.
    pub fn event<F>(&self, id: &C::Id, mut event: F) -> usize
    where
        F: FnMut(&C::Handler),
    {
        let () = Checks::<C>::ADDRESSED;
        self.dispatch(Target::Id(id), Direction::Forward, |handler| {
            event(handler.as_ref());
            ControlFlow::Continue(())
        })
    }

    /// Calls `event` on every handler at `id`, back to front.
    pub fn event_reverse<F>(&self, id: &C::Id, mut event: F) -> usize
    where
        F: FnMut(&C::Handler),
    {
        let () = Checks::<C>::ADDRESSED;
        self.dispatch(Target::Id(id), Direction::Reverse, |handler| {
            event(handler.as_ref());
            ControlFlow::Continue(())
        })
    }

    pub fn event_at<F>(&self, address: &BusAddress<C>, mut event: F) -> usize
    where
        F: FnMut(&C::Handler),
    {
        let () = Checks::<C>::ADDRESSED;
        let Some(target) = self.bound_target(address) else {
            return 0;
        };
        self.dispatch(target, Direction::Forward, |handler| {
            event(handler.as_ref());
            ControlFlow::Continue(())
        })
    }

    pub fn event_at_reverse<F>(&self, address: &BusAddress<C>, mut event: F) -> usize
    where
        F: FnMut(&C::Handler),
    {
        let () = Checks::<C>::ADDRESSED;
        let Some(target) = self.bound_target(address) else {
            return 0;
        };
        self.dispatch(target, Direction::Reverse, |handler| {
            event(handler.as_ref());
            ControlFlow::Continue(())
        })
    }

    /// Calls `event` on every handler at `id` and returns the last result.
    ///
    /// On a `HandlerPolicy::Single` bus this is the result of the one handler.
    pub fn event_result<R, F>(&self, id: &C::Id, mut event: F) -> Option<R>
    where
        F: FnMut(&C::Handler) -> R,
    {
        let () = Checks::<C>::ADDRESSED;
        let mut result = None;
        self.dispatch(Target::Id(id), Direction::Forward, |handler| {
            result = Some(event(handler.as_ref()));
            ControlFlow::Continue(())
        });
        result
    }

    /// Reduces the handlers at `id` into `init`, front to back.
    ///
    /// ```rust,ignore
    /// let total = bus.event_fold(&id, 0, |sum, h| *sum += h.weight());
    /// ```
    pub fn event_fold<A, F>(&self, id: &C::Id, init: A, mut fold: F) -> A
    where
        F: FnMut(&mut A, &C::Handler),
    {
        let () = Checks::<C>::ADDRESSED;
        let mut acc = init;
        self.dispatch(Target::Id(id), Direction::Forward, |handler| {
            fold(&mut acc, handler.as_ref());
            ControlFlow::Continue(())
        });
        acc
    }

    /// Calls `event` on every handler at every address, front to back.
    pub fn broadcast<F>(&self, mut event: F) -> usize
    where
        F: FnMut(&C::Handler),
    {
        let () = Checks::<C>::VALID;
        self.dispatch(Target::All, Direction::Forward, |handler| {
            event(handler.as_ref());
            ControlFlow::Continue(())
        })
    }

    /// Calls `event` on every handler at every address, back to front.
    pub fn broadcast_reverse<F>(&self, mut event: F) -> usize
    where
        F: FnMut(&C::Handler),
    {
        let () = Checks::<C>::VALID;
        self.dispatch(Target::All, Direction::Reverse, |handler| {
            event(handler.as_ref());
            ControlFlow::Continue(())
        })
    }

    /// Broadcasts and returns the result of the last handler called.
    pub fn broadcast_result<R, F>(&self, mut event: F) -> Option<R>
    where
        F: FnMut(&C::Handler) -> R,
    {
        let () = Checks::<C>::VALID;
        let mut result = None;
        self.dispatch(Target::All, Direction::Forward, |handler| {
            result = Some(event(handler.as_ref()));
            ControlFlow::Continue(())
        });
        result
    }

    /// Broadcasts and reduces every handler into `init`, front to back.
    pub fn broadcast_fold<A, F>(&self, init: A, mut fold: F) -> A
    where
        F: FnMut(&mut A, &C::Handler),
    {
        let () = Checks::<C>::VALID;
        let mut acc = init;
        self.dispatch(Target::All, Direction::Forward, |handler| {
            fold(&mut acc, handler.as_ref());
            ControlFlow::Continue(())
        });
        acc
    }

    // ------------------------------------------------------------------
    // Enumeration
    // ------------------------------------------------------------------

    /// Visits every live handler until `visit` returns `false`.
    /// Returns the number of handlers visited.
    pub fn enumerate_handlers<F>(&self, mut visit: F) -> usize
    where
        F: FnMut(&Arc<C::Handler>) -> bool,
    {
        let () = Checks::<C>::VALID;
        self.enumerate(Target::All, |handler| {
            if visit(handler) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        })
    }

    /// Visits every live handler at `id` until `visit` returns `false`.
    pub fn enumerate_handlers_id<F>(&self, id: &C::Id, mut visit: F) -> usize
    where
        F: FnMut(&Arc<C::Handler>) -> bool,
    {
        let () = Checks::<C>::ADDRESSED;
        self.enumerate(Target::Id(id), |handler| {
            if visit(handler) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        })
    }

    /// Visits every live handler at a bound address until `visit` returns `false`.
    /// A handle from another bus instance visits nothing.
    pub fn enumerate_handlers_at<F>(&self, address: &BusAddress<C>, mut visit: F) -> usize
    where
        F: FnMut(&Arc<C::Handler>) -> bool,
    {
        let () = Checks::<C>::ADDRESSED;
        let Some(target) = self.bound_target(address) else {
            return 0;
        };
        self.enumerate(target, |handler| {
            if visit(handler) {
                ControlFlow::Continue(())
            } else {
                ControlFlow::Break(())
            }
        })
    }

    /// First handler in dispatch order, if any.
    ///
    /// The handler may be disconnected by another thread as soon as this returns.
    /// The returned `Arc` keeps the object alive, but not connected.
    pub fn find_first_handler(&self) -> Option<Arc<C::Handler>> {
        let () = Checks::<C>::VALID;
        let mut first = None;
        self.enumerate(Target::All, |handler| {
            first = Some(handler.clone());
            ControlFlow::Break(())
        });
        first
    }

    pub fn find_first_handler_id(&self, id: &C::Id) -> Option<Arc<C::Handler>> {
        let () = Checks::<C>::ADDRESSED;
        let mut first = None;
        self.enumerate(Target::Id(id), |handler| {
            first = Some(handler.clone());
            ControlFlow::Break(())
        });
        first
    }

    pub fn find_first_handler_at(&self, address: &BusAddress<C>) -> Option<Arc<C::Handler>> {
        let mut first = None;
        self.enumerate_handlers_at(address, |handler| {
            first = Some(handler.clone());
            false
        });
        first
    }

    /// Number of connected handlers across all addresses.
    pub fn handler_count(&self) -> usize {
        self.context()
            .map(|context| context.directory.lock().total_handlers())
            .unwrap_or(0)
    }

    /// Number of handlers connected at `id`.
    pub fn handler_count_id(&self, id: &C::Id) -> usize {
        let () = Checks::<C>::ADDRESSED;
        self.context()
            .map(|context| {
                let directory = context.directory.lock();
                directory
                    .find_address(id)
                    .map(|slot| directory.handler_count(slot))
                    .unwrap_or(0)
            })
            .unwrap_or(0)
    }

    pub fn has_handlers(&self) -> bool {
        self.handler_count() > 0
    }

    pub fn address_count(&self) -> usize {
        self.context()
            .map(|context| context.directory.lock().address_count())
            .unwrap_or(0)
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    fn enqueue<F>(&self, call: F) -> bool
    where
        F: FnOnce(&Bus<C>) + Send + 'static,
    {
        let Some(context) = self.get_or_create_context() else {
            return false;
        };
        context
            .queue
            .as_ref()
            .map(|queue| queue.enqueue(Box::new(call)))
            .unwrap_or(false)
    }

    /// Queues `event` for the handlers at `id`.
    /// Returns `false` when the queue is inactive or the bus is torn down.
    pub fn queue_event<F>(&self, id: C::Id, event: F) -> bool
    where
        F: FnMut(&C::Handler) + Send + 'static,
    {
        let () = Checks::<C>::ADDRESSED;
        let () = Checks::<C>::QUEUED;
        self.enqueue(move |bus| {
            bus.event(&id, event);
        })
    }

    pub fn queue_event_reverse<F>(&self, id: C::Id, event: F) -> bool
    where
        F: FnMut(&C::Handler) + Send + 'static,
    {
        let () = Checks::<C>::ADDRESSED;
        let () = Checks::<C>::QUEUED;
        self.enqueue(move |bus| {
            bus.event_reverse(&id, event);
        })
    }

    pub fn queue_event_at<F>(&self, address: BusAddress<C>, event: F) -> bool
    where
        F: FnMut(&C::Handler) + Send + 'static,
    {
        let () = Checks::<C>::ADDRESSED;
        let () = Checks::<C>::QUEUED;
        self.enqueue(move |bus| {
            bus.event_at(&address, event);
        })
    }

    pub fn queue_event_at_reverse<F>(&self, address: BusAddress<C>, event: F) -> bool
    where
        F: FnMut(&C::Handler) + Send + 'static,
    {
        let () = Checks::<C>::ADDRESSED;
        let () = Checks::<C>::QUEUED;
        self.enqueue(move |bus| {
            bus.event_at_reverse(&address, event);
        })
    }

    /// Queues `event` for every handler on the bus.
    pub fn queue_broadcast<F>(&self, event: F) -> bool
    where
        F: FnMut(&C::Handler) + Send + 'static,
    {
        let () = Checks::<C>::QUEUED;
        self.enqueue(move |bus| {
            bus.broadcast(event);
        })
    }

    pub fn queue_broadcast_reverse<F>(&self, event: F) -> bool
    where
        F: FnMut(&C::Handler) + Send + 'static,
    {
        let () = Checks::<C>::QUEUED;
        self.enqueue(move |bus| {
            bus.broadcast_reverse(event);
        })
    }

    /// Queues an arbitrary call, unrelated to any handler.
    ///
    /// When it runs, every call queued before it has already run, which makes it
    /// usable as a completion marker for a batch.
    pub fn queue_function<F>(&self, function: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let () = Checks::<C>::QUEUED;
        self.enqueue(move |_| function())
    }

    /// Runs the calls queued before this call, in FIFO order, on this thread.
    ///
    /// Calls queued while the batch runs wait for the next execution. A call
    /// that panics is logged and the rest of the batch still runs. Returns the
    /// number of calls run.
    pub fn execute_queued_events(&self) -> usize {
        let () = Checks::<C>::QUEUED;
        self.context()
            .and_then(|context| context.queue.as_ref().map(|queue| queue.execute(self)))
            .unwrap_or(0)
    }

    /// Drops every queued call without running it. Returns how many were dropped.
    pub fn clear_queued_events(&self) -> usize {
        let () = Checks::<C>::QUEUED;
        self.context()
            .and_then(|context| context.queue.as_ref().map(|queue| queue.clear()))
            .unwrap_or(0)
    }

    pub fn queued_event_count(&self) -> usize {
        let () = Checks::<C>::QUEUED;
        self.context()
            .and_then(|context| context.queue.as_ref().map(|queue| queue.count()))
            .unwrap_or(0)
    }

    /// Enables or disables acceptance of new queued calls. Calls already queued
    /// are unaffected.
    pub fn allow_function_queuing(&self, allowed: bool) {
        let () = Checks::<C>::QUEUED;
        if let Some(queue) = self.get_or_create_context().as_ref().and_then(|c| c.queue.as_ref()) {
            queue.set_active(allowed);
        }
    }

    pub fn is_function_queuing(&self) -> bool {
        let () = Checks::<C>::QUEUED;
        match self.context() {
            Some(context) => context.queue.as_ref().map(|queue| queue.is_active()).unwrap_or(false),
            None => C::QUEUE_ACTIVE_BY_DEFAULT,
        }
    }

    // ------------------------------------------------------------------
    // Statistics
    // ------------------------------------------------------------------

    pub fn stats(&self) -> BusStats {
        let state = self.state.read();
        let mut stats = BusStats::empty::<C>(state.state());
        if let ContextState::Active(context) = &*state {
            let directory = context.directory.lock();
            stats.addresses = directory.address_count();
            stats.handlers = directory.total_handlers();
            stats.events_dispatched = context.dispatches();
            if let Some(queue) = &context.queue {
                stats.queued_calls = queue.count();
                stats.queue_active = queue.is_active();
                stats.queued_calls_executed = queue.executed();
                stats.queued_calls_failed = queue.failed();
            }
        }
        stats
    }
}

impl<C: BusConfig> Default for Bus<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: BusConfig> std::fmt::Debug for Bus<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bus")
            .field("name", &C::NAME)
            .field("state", &self.state())
            .finish()
    }
}
