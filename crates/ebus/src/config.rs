//! # Bus Configuration
//!
//! Every bus is described by a type implementing [`BusConfig`]. The trait carries
//! no behavior of its own: it selects, at compile time, how the bus addresses its
//! handlers, how many handlers an address may hold and in which order, which
//! locking strategy guards it, and whether a deferred-call queue exists.
//!
//! Invalid combinations are rejected when the bus is instantiated, not at runtime.
//! The checks live in `Checks` and are referenced from every public bus
//! operation, so a misconfigured bus fails to build with a descriptive message.

use crate::bus::Bus;
use std::cmp::Ordering;
use std::fmt::Debug;
use std::hash::Hash;
use std::marker::PhantomData;

/// How handlers are addressed on a bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum AddressPolicy {
    /// One implicit address. Handlers connect without an id.
    Single,
    /// Handlers connect to an address identified by `BusConfig::Id`.
    ById,
    /// Like `ById`, with addresses visited in `BusConfig::compare_ids` order
    /// during broadcasts.
    ByIdAndOrdered,
}

/// How many handlers an address accepts, and in which order they are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum HandlerPolicy {
    /// At most one handler per address.
    Single,
    /// Any number of handlers, visited in connection order.
    Multiple,
    /// Any number of handlers, visited in `BusConfig::compare_handlers` order.
    /// Equal keys keep connection order.
    MultipleAndOrdered,
}

/// Synchronization strategy guarding connection changes and dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum LockPolicy {
    /// No serialization. The bus must only be used from one thread at a time.
    NoLock,
    /// One non-reentrant lock. Handlers must not connect, disconnect or dispatch
    /// on the same bus from inside a callback, or the calling thread deadlocks.
    Exclusive,
    /// A lock the dispatching thread may re-acquire, so handlers can connect,
    /// disconnect and dispatch on the same bus from inside a callback.
    Reentrant,
}

/// Compile-time description of a bus.
///
/// Associated type defaults are not available on stable Rust, so every
/// configuration names its `Id` and `Order` types explicitly; use `()` for the
/// ones the bus does not need.
///
/// # Examples
///
/// ```rust
/// use ebus::{AddressPolicy, BusConfig, HandlerPolicy};
///
/// pub trait TickListener: Send + Sync {
///     fn on_tick(&self, delta: f32);
/// }
///
/// pub struct TickBus;
///
/// impl BusConfig for TickBus {
///     type Handler = dyn TickListener;
///     type Id = ();
///     type Order = i32;
///     const NAME: &'static str = "tick";
///     const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::MultipleAndOrdered;
/// }
/// ```
pub trait BusConfig: Sized + 'static {
    /// The event interface. Usually a `dyn Trait` object type.
    type Handler: ?Sized + Send + Sync + 'static;

    /// Address key. Ignored (use `()`) when `ADDRESS_POLICY` is `Single`.
    type Id: Clone + Eq + Hash + Ord + Debug + Send + Sync + 'static;

    /// Handler order key. Only consulted for `HandlerPolicy::MultipleAndOrdered`.
    type Order: Clone + Ord + Default + Debug + Send + Sync + 'static;

    /// Name used in diagnostics and statistics.
    const NAME: &'static str;

    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::Single;
    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Multiple;
    const LOCK_POLICY: LockPolicy = LockPolicy::Reentrant;

    /// Whether the bus owns a deferred-call queue.
    const ENABLE_QUEUE: bool = false;

    /// Whether the queue accepts calls before `allow_function_queuing` is called.
    const QUEUE_ACTIVE_BY_DEFAULT: bool = Self::ENABLE_QUEUE;

    /// Lock held across each `execute_queued_events` run. `Exclusive` serializes
    /// runs; `Reentrant` also lets a queued call start a nested run.
    const QUEUE_LOCK_POLICY: LockPolicy = LockPolicy::Exclusive;

    /// Handler comparator. `Less` means `a` is visited before `b`.
    fn compare_handlers(a: &Self::Order, b: &Self::Order) -> Ordering {
        a.cmp(b)
    }

    /// Address comparator for `AddressPolicy::ByIdAndOrdered`.
    fn compare_ids(a: &Self::Id, b: &Self::Id) -> Ordering {
        a.cmp(b)
    }
}

/// A configuration with one process-wide bus instance.
///
/// Implemented by [`declare_bus!`](crate::declare_bus).
pub trait GlobalBus: BusConfig {
    fn bus() -> &'static Bus<Self>;
}

/// Compile-time configuration checks.
///
/// Each constant panics during const evaluation when the configuration is
/// invalid for the operation that references it.
pub(crate) struct Checks<C>(PhantomData<fn() -> C>);

impl<C: BusConfig> Checks<C> {
    /// Checked by every operation.
    pub(crate) const VALID: () = {
        assert!(
            C::ENABLE_QUEUE || !C::QUEUE_ACTIVE_BY_DEFAULT,
            "QUEUE_ACTIVE_BY_DEFAULT requires ENABLE_QUEUE"
        );
        assert!(
            !(C::ENABLE_QUEUE
                && !matches!(C::LOCK_POLICY, LockPolicy::NoLock)
                && matches!(C::QUEUE_LOCK_POLICY, LockPolicy::NoLock)),
            "a locked bus cannot use an unguarded queue: set QUEUE_LOCK_POLICY to Exclusive or Reentrant"
        );
    };

    /// Checked by id-based operations.
    pub(crate) const ADDRESSED: () = {
        let () = Self::VALID;
        assert!(
            !matches!(C::ADDRESS_POLICY, AddressPolicy::Single),
            "id-based operations require ADDRESS_POLICY ById or ByIdAndOrdered"
        );
    };

    /// Checked by operations that target the single implicit address.
    pub(crate) const UNADDRESSED: () = {
        let () = Self::VALID;
        assert!(
            matches!(C::ADDRESS_POLICY, AddressPolicy::Single),
            "connecting without an id requires ADDRESS_POLICY Single"
        );
    };

    /// Checked by queue operations.
    pub(crate) const QUEUED: () = {
        let () = Self::VALID;
        assert!(
            C::ENABLE_QUEUE,
            "this bus does not support queued events: set ENABLE_QUEUE"
        );
    };
}
