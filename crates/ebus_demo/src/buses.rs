//! # Demo Buses
//!
//! Three buses exercising the main configurations of `ebus`:
//!
//! | bus | addressing | handlers | queue |
//! |---|---|---|---|
//! | [`INPUT`] | single | ordered by priority, highest first | none |
//! | [`ASSETS`] | by asset id | unordered | active |
//! | [`SYMBOLS`] | single | unordered, exclusive lock | inactive until enabled |

use ebus::{declare_bus, AddressPolicy, BusConfig, HandlerPolicy, LockPolicy};
use std::cmp::Ordering;

/// Identifier of an asset on the asset bus.
pub type AssetId = u64;

/// A sampled input channel, e.g. a key or a gamepad axis.
#[derive(Debug, Clone, PartialEq)]
pub struct InputChannel {
    pub name: String,
    pub value: f32,
}

impl InputChannel {
    pub fn new(name: impl Into<String>, value: f32) -> Self {
        Self { name: name.into(), value }
    }
}

/// Receives every input channel event, highest priority first.
///
/// `consumed` is shared by all handlers of one dispatch. A handler that acts on
/// the event sets it; handlers further down see it set and usually ignore the event.
pub trait InputChannelEvents: Send + Sync {
    fn on_input_channel_event(&self, channel: &InputChannel, consumed: &mut bool);
}

pub struct InputChannelNotifications;

impl BusConfig for InputChannelNotifications {
    type Handler = dyn InputChannelEvents;
    type Id = ();
    type Order = i32;
    const NAME: &'static str = "input_channel_notifications";
    const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::MultipleAndOrdered;

    fn compare_handlers(a: &i32, b: &i32) -> Ordering {
        b.cmp(a)
    }
}

/// Notifications about one asset. Handlers connect at the asset id they track.
pub trait AssetEvents: Send + Sync {
    fn on_asset_changed(&self, asset: AssetId, revision: u64);
    fn on_asset_removed(&self, asset: AssetId);
}

pub struct AssetNotifications;

impl BusConfig for AssetNotifications {
    type Handler = dyn AssetEvents;
    type Id = AssetId;
    type Order = ();
    const NAME: &'static str = "asset_notifications";
    const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
    const ENABLE_QUEUE: bool = true;
}

/// Symbol export events. `finalize` closes a batch.
pub trait SymbolEvents: Send + Sync {
    fn log_class(&self, module: &str, class: &str);
    fn log_global_method(&self, module: &str, method: &str);
    fn finalize(&self);
}

pub struct SymbolLog;

impl BusConfig for SymbolLog {
    type Handler = dyn SymbolEvents;
    type Id = ();
    type Order = ();
    const NAME: &'static str = "symbol_log";
    const LOCK_POLICY: LockPolicy = LockPolicy::Exclusive;
    const ENABLE_QUEUE: bool = true;
    const QUEUE_ACTIVE_BY_DEFAULT: bool = false;
}

declare_bus!(
    /// Process-wide input channel bus.
    pub static INPUT: InputChannelNotifications;
);

declare_bus!(
    /// Process-wide asset notification bus.
    pub static ASSETS: AssetNotifications;
);

declare_bus!(
    /// Process-wide symbol log bus.
    pub static SYMBOLS: SymbolLog;
);

/// Sends `channel` to every input handler. Returns whether one consumed it.
pub fn dispatch_input(bus: &ebus::Bus<InputChannelNotifications>, channel: &InputChannel) -> bool {
    let mut consumed = false;
    bus.broadcast(|handler| handler.on_input_channel_event(channel, &mut consumed));
    consumed
}
