//! Handles returned to callers by [`Bus`](crate::Bus).
//!
//! Neither handle owns anything. Dropping a [`BusConnection`] does not
//! disconnect the handler; callers disconnect explicitly.

use crate::config::BusConfig;
use crate::directory::{AddressRef, NodeRef};
use std::fmt;
use std::marker::PhantomData;

/// Registration of one handler at one address.
pub struct BusConnection<C: BusConfig> {
    pub(crate) context_id: u64,
    pub(crate) node: NodeRef,
    _config: PhantomData<fn() -> C>,
}

impl<C: BusConfig> BusConnection<C> {
    pub(crate) fn new(context_id: u64, node: NodeRef) -> Self {
        Self { context_id, node, _config: PhantomData }
    }
}

impl<C: BusConfig> Clone for BusConnection<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C: BusConfig> Copy for BusConnection<C> {}

impl<C: BusConfig> PartialEq for BusConnection<C> {
    fn eq(&self, other: &Self) -> bool {
        self.context_id == other.context_id && self.node == other.node
    }
}

impl<C: BusConfig> Eq for BusConnection<C> {}

impl<C: BusConfig> fmt::Debug for BusConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusConnection")
            .field("bus", &C::NAME)
            .field("context", &self.context_id)
            .field("slot", &self.node.slot)
            .field("generation", &self.node.generation)
            .finish()
    }
}

/// A bound address.
///
/// Obtained from [`Bus::bind`](crate::Bus::bind). A bound address is kept in the
/// directory even while it has no handlers, so dispatching through the handle
/// skips the id lookup.
pub struct BusAddress<C: BusConfig> {
    pub(crate) context_id: u64,
    pub(crate) address: AddressRef,
    pub(crate) id: C::Id,
}

impl<C: BusConfig> BusAddress<C> {
    /// The id this handle was bound to.
    pub fn id(&self) -> &C::Id {
        &self.id
    }
}

impl<C: BusConfig> Clone for BusAddress<C> {
    fn clone(&self) -> Self {
        Self {
            context_id: self.context_id,
            address: self.address,
            id: self.id.clone(),
        }
    }
}

impl<C: BusConfig> fmt::Debug for BusAddress<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BusAddress")
            .field("bus", &C::NAME)
            .field("id", &self.id)
            .field("context", &self.context_id)
            .finish()
    }
}
