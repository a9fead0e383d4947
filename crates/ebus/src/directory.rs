//! # Address Directory
//!
//! Owns every address of a bus and the handler nodes connected to them.
//!
//! Addresses and nodes live in generation-checked arenas and are linked to each
//! other by slot index, never by reference:
//!
//! - each address holds a doubly linked list of its nodes, kept in the order the
//!   [`HandlerPolicy`] prescribes;
//! - all addresses form a second doubly linked list, in creation order or in
//!   `compare_ids` order for `ByIdAndOrdered` buses;
//! - a node stores the slot of the address holding it, so disconnecting is O(1).
//!
//! Dispatch walks register a [`Cursor`] that points at the *next* node to visit.
//! Removing a node moves every cursor aimed at it to that node's successor, so a
//! handler may disconnect itself or any other handler mid-walk. Each node carries
//! the sequence number it was connected with, and a walk ignores nodes connected
//! after it started. Empty addresses are pruned only while no walk is active.

use crate::config::{AddressPolicy, BusConfig, HandlerPolicy};
use crate::error::BusError;
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tracing::{trace, warn};

/// Generation-checked reference to a handler node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeRef {
    pub(crate) slot: usize,
    pub(crate) generation: u32,
}

/// Generation-checked reference to an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct AddressRef {
    pub(crate) slot: usize,
    pub(crate) generation: u32,
}

/// Which part of the directory a walk covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Scope {
    Address(usize),
    All,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct Cursor {
    next_node: Option<usize>,
    next_address: Option<usize>,
    forward: bool,
    seq_limit: u64,
}

struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with free-list reuse. Removing a value bumps the slot
/// generation so outstanding references to it stop resolving.
struct Arena<T> {
    slots: Vec<Slot<T>>,
    free: Vec<usize>,
    len: usize,
}

impl<T> Arena<T> {
    fn new() -> Self {
        Self { slots: Vec::new(), free: Vec::new(), len: 0 }
    }

    fn insert(&mut self, value: T) -> (usize, u32) {
        self.len += 1;
        if let Some(slot) = self.free.pop() {
            let entry = &mut self.slots[slot];
            entry.value = Some(value);
            (slot, entry.generation)
        } else {
            self.slots.push(Slot { generation: 0, value: Some(value) });
            (self.slots.len() - 1, 0)
        }
    }

    fn remove(&mut self, slot: usize) -> Option<T> {
        let entry = self.slots.get_mut(slot)?;
        let value = entry.value.take()?;
        entry.generation = entry.generation.wrapping_add(1);
        self.free.push(slot);
        self.len -= 1;
        Some(value)
    }

    fn get(&self, slot: usize) -> Option<&T> {
        self.slots.get(slot).and_then(|entry| entry.value.as_ref())
    }

    fn get_mut(&mut self, slot: usize) -> Option<&mut T> {
        self.slots.get_mut(slot).and_then(|entry| entry.value.as_mut())
    }

    fn get_checked(&self, slot: usize, generation: u32) -> Option<&T> {
        self.slots
            .get(slot)
            .filter(|entry| entry.generation == generation)
            .and_then(|entry| entry.value.as_ref())
    }

    fn generation(&self, slot: usize) -> u32 {
        self.slots.get(slot).map(|entry| entry.generation).unwrap_or(0)
    }

    fn clear(&mut self) {
        for slot in 0..self.slots.len() {
            self.remove(slot);
        }
    }
}

struct Node<C: BusConfig> {
    handler: Weak<C::Handler>,
    order: C::Order,
    seq: u64,
    address: usize,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Address<C: BusConfig> {
    /// `None` for the implicit address of a `Single` bus.
    id: Option<C::Id>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    /// Pinned addresses were bound by a caller and survive becoming empty.
    pinned: bool,
    prev: Option<usize>,
    next: Option<usize>,
}

impl<C: BusConfig> Address<C> {
    fn describe(&self) -> String {
        match &self.id {
            Some(id) => format!("{id:?}"),
            None => "(global)".to_string(),
        }
    }
}

pub(crate) struct Directory<C: BusConfig> {
    nodes: Arena<Node<C>>,
    addresses: Arena<Address<C>>,
    index: HashMap<C::Id, usize>,
    global: Option<usize>,
    first_address: Option<usize>,
    last_address: Option<usize>,
    cursors: SmallVec<[Option<Cursor>; 4]>,
    next_seq: u64,
    prune_pending: bool,
    torn_down: bool,
}

impl<C: BusConfig> Directory<C> {
    pub(crate) fn new() -> Self {
        Self {
            nodes: Arena::new(),
            addresses: Arena::new(),
            index: HashMap::new(),
            global: None,
            first_address: None,
            last_address: None,
            cursors: SmallVec::new(),
            next_seq: 0,
            prune_pending: false,
            torn_down: false,
        }
    }

    // ------------------------------------------------------------------
    // Addresses
    // ------------------------------------------------------------------

    /// Slot of the implicit address, creating it on first use.
    pub(crate) fn global_address(&mut self) -> usize {
        if let Some(slot) = self.global {
            return slot;
        }
        let slot = self.create_address(None);
        self.global = Some(slot);
        slot
    }

    /// Slot of the address for `id`, creating it on first use.
    pub(crate) fn address_for(&mut self, id: &C::Id) -> usize {
        if let Some(&slot) = self.index.get(id) {
            return slot;
        }
        let slot = self.create_address(Some(id.clone()));
        self.index.insert(id.clone(), slot);
        slot
    }

    pub(crate) fn find_address(&self, id: &C::Id) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub(crate) fn address_ref(&self, slot: usize) -> AddressRef {
        AddressRef { slot, generation: self.addresses.generation(slot) }
    }

    pub(crate) fn resolve(&self, address: AddressRef) -> Option<usize> {
        self.addresses
            .get_checked(address.slot, address.generation)
            .map(|_| address.slot)
    }

    pub(crate) fn pin(&mut self, slot: usize) {
        if let Some(address) = self.addresses.get_mut(slot) {
            address.pinned = true;
        }
    }

    pub(crate) fn handler_count(&self, slot: usize) -> usize {
        self.addresses.get(slot).map(|address| address.len).unwrap_or(0)
    }

    pub(crate) fn total_handlers(&self) -> usize {
        self.nodes.len
    }

    pub(crate) fn address_count(&self) -> usize {
        self.addresses.len
    }

    fn create_address(&mut self, id: Option<C::Id>) -> usize {
        // Find the address the new one goes after; `None` means it goes first.
        let after = match (C::ADDRESS_POLICY, id.as_ref()) {
            (AddressPolicy::ByIdAndOrdered, Some(new_id)) => {
                let mut candidate = self.last_address;
                while let Some(existing) = candidate {
                    let Some(entry) = self.addresses.get(existing) else { break };
                    let in_order = entry
                        .id
                        .as_ref()
                        .map_or(true, |existing_id| C::compare_ids(existing_id, new_id) != Ordering::Greater);
                    if in_order {
                        break;
                    }
                    candidate = entry.prev;
                }
                candidate
            }
            _ => self.last_address,
        };

        let (slot, _) = self.addresses.insert(Address {
            id,
            head: None,
            tail: None,
            len: 0,
            pinned: false,
            prev: None,
            next: None,
        });

        let next = match after {
            Some(prev) => self.addresses.get(prev).and_then(|a| a.next),
            None => self.first_address,
        };
        if let Some(address) = self.addresses.get_mut(slot) {
            address.prev = after;
            address.next = next;
        }
        match after {
            Some(prev) => {
                if let Some(address) = self.addresses.get_mut(prev) {
                    address.next = Some(slot);
                }
            }
            None => self.first_address = Some(slot),
        }
        match next {
            Some(following) => {
                if let Some(address) = self.addresses.get_mut(following) {
                    address.prev = Some(slot);
                }
            }
            None => self.last_address = Some(slot),
        }

        trace!("Created address slot {} on bus '{}'", slot, C::NAME);
        slot
    }

    fn remove_address(&mut self, slot: usize) {
        let Some(address) = self.addresses.remove(slot) else { return };
        match address.prev {
            Some(prev) => {
                if let Some(entry) = self.addresses.get_mut(prev) {
                    entry.next = address.next;
                }
            }
            None => self.first_address = address.next,
        }
        match address.next {
            Some(next) => {
                if let Some(entry) = self.addresses.get_mut(next) {
                    entry.prev = address.prev;
                }
            }
            None => self.last_address = address.prev,
        }
        match address.id {
            Some(id) => {
                self.index.remove(&id);
            }
            None => self.global = None,
        }
    }

    fn prune_empty_addresses(&mut self) {
        let mut candidate = self.first_address;
        while let Some(slot) = candidate {
            let Some(address) = self.addresses.get(slot) else { break };
            candidate = address.next;
            if address.len == 0 && !address.pinned {
                self.remove_address(slot);
            }
        }
        self.prune_pending = false;
    }

    // ------------------------------------------------------------------
    // Connections
    // ------------------------------------------------------------------

    /// Links a new node for `handler` into the address at `slot`.
    pub(crate) fn connect(
        &mut self,
        slot: usize,
        handler: Weak<C::Handler>,
        order: C::Order,
    ) -> Result<NodeRef, BusError> {
        let Some(address) = self.addresses.get(slot) else {
            return Err(BusError::StaleAddress(C::NAME));
        };

        if matches!(C::HANDLER_POLICY, HandlerPolicy::Single) && address.len > 0 {
            return Err(BusError::AddressOccupied {
                bus: C::NAME,
                address: address.describe(),
            });
        }

        let mut candidate = address.head;
        while let Some(existing) = candidate {
            let Some(node) = self.nodes.get(existing) else { break };
            if Weak::ptr_eq(&node.handler, &handler) {
                return Err(BusError::AlreadyConnected {
                    bus: C::NAME,
                    address: address.describe(),
                });
            }
            candidate = node.next;
        }

        // Stable placement: after the last node whose key does not sort after ours.
        let after = match C::HANDLER_POLICY {
            HandlerPolicy::MultipleAndOrdered => {
                let mut candidate = address.tail;
                while let Some(existing) = candidate {
                    let Some(node) = self.nodes.get(existing) else { break };
                    if C::compare_handlers(&node.order, &order) != Ordering::Greater {
                        break;
                    }
                    candidate = node.prev;
                }
                candidate
            }
            _ => address.tail,
        };
        let next = match after {
            Some(prev) => self.nodes.get(prev).and_then(|node| node.next),
            None => address.head,
        };

        let seq = self.next_seq;
        self.next_seq += 1;
        let (node_slot, generation) = self.nodes.insert(Node {
            handler,
            order,
            seq,
            address: slot,
            prev: after,
            next,
        });

        match after {
            Some(prev) => {
                if let Some(node) = self.nodes.get_mut(prev) {
                    node.next = Some(node_slot);
                }
            }
            None => {
                if let Some(address) = self.addresses.get_mut(slot) {
                    address.head = Some(node_slot);
                }
            }
        }
        match next {
            Some(following) => {
                if let Some(node) = self.nodes.get_mut(following) {
                    node.prev = Some(node_slot);
                }
            }
            None => {
                if let Some(address) = self.addresses.get_mut(slot) {
                    address.tail = Some(node_slot);
                }
            }
        }
        if let Some(address) = self.addresses.get_mut(slot) {
            address.len += 1;
        }

        Ok(NodeRef { slot: node_slot, generation })
    }

    /// Unlinks the node. Returns `false` when it was already disconnected.
    pub(crate) fn disconnect(&mut self, node_ref: NodeRef) -> bool {
        if self.nodes.get_checked(node_ref.slot, node_ref.generation).is_none() {
            return false;
        }
        let Some(node) = self.nodes.remove(node_ref.slot) else {
            return false;
        };

        match node.prev {
            Some(prev) => {
                if let Some(entry) = self.nodes.get_mut(prev) {
                    entry.next = node.next;
                }
            }
            None => {
                if let Some(address) = self.addresses.get_mut(node.address) {
                    address.head = node.next;
                }
            }
        }
        match node.next {
            Some(next) => {
                if let Some(entry) = self.nodes.get_mut(next) {
                    entry.prev = node.prev;
                }
            }
            None => {
                if let Some(address) = self.addresses.get_mut(node.address) {
                    address.tail = node.prev;
                }
            }
        }

        for cursor in self.cursors.iter_mut().flatten() {
            if cursor.next_node == Some(node_ref.slot) {
                cursor.next_node = if cursor.forward { node.next } else { node.prev };
            }
        }

        let now_empty = match self.addresses.get_mut(node.address) {
            Some(address) => {
                address.len -= 1;
                address.len == 0 && !address.pinned
            }
            None => false,
        };
        if now_empty {
            if self.is_walking() {
                self.prune_pending = true;
            } else {
                self.remove_address(node.address);
            }
        }
        true
    }

    pub(crate) fn is_connected(&self, node_ref: NodeRef) -> bool {
        self.nodes.get_checked(node_ref.slot, node_ref.generation).is_some()
    }

    // ------------------------------------------------------------------
    // Walks
    // ------------------------------------------------------------------

    pub(crate) fn is_walking(&self) -> bool {
        self.cursors.iter().any(Option::is_some)
    }

    /// Registers a cursor over `scope`. Returns `None` when there is nothing to walk.
    pub(crate) fn begin_walk(&mut self, scope: Scope, forward: bool) -> Option<usize> {
        if self.torn_down {
            return None;
        }
        let cursor = match scope {
            Scope::Address(slot) => {
                let address = self.addresses.get(slot)?;
                Cursor {
                    next_node: if forward { address.head } else { address.tail },
                    next_address: None,
                    forward,
                    seq_limit: self.next_seq,
                }
            }
            Scope::All => Cursor {
                next_node: None,
                next_address: if forward { self.first_address } else { self.last_address },
                forward,
                seq_limit: self.next_seq,
            },
        };

        if let Some(id) = self.cursors.iter().position(Option::is_none) {
            self.cursors[id] = Some(cursor);
            Some(id)
        } else {
            self.cursors.push(Some(cursor));
            Some(self.cursors.len() - 1)
        }
    }

    /// Moves the cursor to the next live handler and returns it.
    pub(crate) fn advance(&mut self, cursor_id: usize) -> Option<Arc<C::Handler>> {
        loop {
            let cursor = (*self.cursors.get(cursor_id)?)?;

            if let Some(slot) = cursor.next_node {
                let node = self.nodes.get(slot)?;
                let following = if cursor.forward { node.next } else { node.prev };
                let handler = (node.seq < cursor.seq_limit).then(|| node.handler.upgrade());
                if let Some(Some(active)) = self.cursors.get_mut(cursor_id) {
                    active.next_node = following;
                }
                match handler {
                    Some(Some(handler)) => return Some(handler),
                    Some(None) => {
                        warn!(
                            "⚠️ Bus '{}': skipping handler that was dropped without disconnecting",
                            C::NAME
                        );
                    }
                    None => {}
                }
            } else if let Some(slot) = cursor.next_address {
                let address = self.addresses.get(slot)?;
                let (following, first) = if cursor.forward {
                    (address.next, address.head)
                } else {
                    (address.prev, address.tail)
                };
                if let Some(Some(active)) = self.cursors.get_mut(cursor_id) {
                    active.next_address = following;
                    active.next_node = first;
                }
            } else {
                return None;
            }
        }
    }

    pub(crate) fn end_walk(&mut self, cursor_id: usize) {
        if let Some(entry) = self.cursors.get_mut(cursor_id) {
            *entry = None;
        }
        while matches!(self.cursors.last(), Some(None)) {
            self.cursors.pop();
        }
        if self.prune_pending && !self.is_walking() {
            self.prune_empty_addresses();
        }
    }

    /// Drops every address and node. Returns how many handlers were still connected.
    pub(crate) fn clear(&mut self) -> usize {
        let remaining = self.nodes.len;
        self.nodes.clear();
        self.addresses.clear();
        self.index.clear();
        self.global = None;
        self.first_address = None;
        self.last_address = None;
        for cursor in self.cursors.iter_mut() {
            *cursor = None;
        }
        self.prune_pending = false;
        self.torn_down = true;
        remaining
    }
}
