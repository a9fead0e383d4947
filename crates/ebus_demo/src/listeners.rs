//! Consumers connected to the demo buses.
//!
//! [`Listeners`] owns every handler object and every connection. The buses only
//! hold handlers weakly, so the handlers live exactly as long as this struct and
//! must be disconnected before it is dropped.

use crate::buses::{
    AssetEvents, AssetId, AssetNotifications, InputChannel, InputChannelEvents,
    InputChannelNotifications, SymbolEvents, SymbolLog,
};
use crate::config::DemoSettings;
use crate::error::DemoError;
use ebus::{Bus, BusConnection};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

/// Input handler that consumes channels whose name starts with `prefix`.
pub struct InputLayer {
    pub name: &'static str,
    prefix: &'static str,
    handled: AtomicU64,
    observed: AtomicU64,
}

impl InputLayer {
    pub fn new(name: &'static str, prefix: &'static str) -> Self {
        Self {
            name,
            prefix,
            handled: AtomicU64::new(0),
            observed: AtomicU64::new(0),
        }
    }

    /// Events this layer consumed.
    pub fn handled(&self) -> u64 {
        self.handled.load(Ordering::Relaxed)
    }

    /// Events this layer saw, consumed or not.
    pub fn observed(&self) -> u64 {
        self.observed.load(Ordering::Relaxed)
    }
}

impl InputChannelEvents for InputLayer {
    fn on_input_channel_event(&self, channel: &InputChannel, consumed: &mut bool) {
        self.observed.fetch_add(1, Ordering::Relaxed);
        if *consumed || !channel.name.starts_with(self.prefix) {
            return;
        }
        *consumed = true;
        self.handled.fetch_add(1, Ordering::Relaxed);
        trace!("{} consumed {} ({})", self.name, channel.name, channel.value);
    }
}

/// Latest known revision of every tracked asset.
#[derive(Default)]
pub struct AssetCache {
    revisions: Mutex<HashMap<AssetId, u64>>,
    updates: AtomicU64,
}

impl AssetCache {
    pub fn revision(&self, asset: AssetId) -> Option<u64> {
        self.revisions.lock().get(&asset).copied()
    }

    pub fn tracked(&self) -> usize {
        self.revisions.lock().len()
    }

    pub fn updates(&self) -> u64 {
        self.updates.load(Ordering::Relaxed)
    }
}

impl AssetEvents for AssetCache {
    fn on_asset_changed(&self, asset: AssetId, revision: u64) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        let mut revisions = self.revisions.lock();
        let current = revisions.entry(asset).or_insert(0);
        if revision > *current {
            *current = revision;
        }
    }

    fn on_asset_removed(&self, asset: AssetId) {
        self.revisions.lock().remove(&asset);
    }
}

/// Collects exported symbols until a batch is finalized.
#[derive(Default)]
pub struct SymbolCollector {
    entries: Mutex<Vec<String>>,
    batches: AtomicU64,
    finalized: AtomicBool,
}

impl SymbolCollector {
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn batches(&self) -> u64 {
        self.batches.load(Ordering::Relaxed)
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }
}

impl SymbolEvents for SymbolCollector {
    fn log_class(&self, module: &str, class: &str) {
        self.entries.lock().push(format!("{module}.{class}"));
    }

    fn log_global_method(&self, module: &str, method: &str) {
        self.entries.lock().push(format!("{module}::{method}()"));
    }

    fn finalize(&self) {
        self.batches.fetch_add(1, Ordering::Relaxed);
        self.finalized.store(true, Ordering::Release);
    }
}

/// Every handler connected by the demo, plus the connections needed to remove them.
pub struct Listeners {
    pub layers: Vec<Arc<InputLayer>>,
    pub assets: Arc<AssetCache>,
    pub symbols: Arc<SymbolCollector>,
    input_connections: Vec<BusConnection<InputChannelNotifications>>,
    asset_connections: Vec<BusConnection<AssetNotifications>>,
    symbol_connection: BusConnection<SymbolLog>,
}

impl Listeners {
    /// Creates the demo handlers and connects them to the given buses.
    pub fn connect(
        settings: &DemoSettings,
        input: &Bus<InputChannelNotifications>,
        assets: &Bus<AssetNotifications>,
        symbols: &Bus<SymbolLog>,
    ) -> Result<Self, DemoError> {
        // (name, channel prefix, priority)
        let layer_specs = [
            ("debug_console", "keyboard_key_f", 1000),
            ("ui", "mouse_", 100),
            ("gameplay", "gamepad_", 0),
            ("fallback", "", -1000),
        ];

        let mut layers = Vec::with_capacity(layer_specs.len());
        let mut input_connections = Vec::with_capacity(layer_specs.len());
        for (name, prefix, priority) in layer_specs {
            let layer = Arc::new(InputLayer::new(name, prefix));
            let handler: Arc<dyn InputChannelEvents> = layer.clone();
            input_connections.push(input.connect_ordered(&handler, priority)?);
            layers.push(layer);
        }

        let cache = Arc::new(AssetCache::default());
        let cache_handler: Arc<dyn AssetEvents> = cache.clone();
        let mut asset_connections = Vec::with_capacity(settings.tracked_assets as usize);
        for asset in 0..settings.tracked_assets {
            let address = assets.bind(&asset)?;
            asset_connections.push(assets.connect_at(&address, &cache_handler, ())?);
        }

        let collector = Arc::new(SymbolCollector::default());
        let collector_handler: Arc<dyn SymbolEvents> = collector.clone();
        let symbol_connection = symbols.connect(&collector_handler)?;

        debug!(
            "Connected {} input layers, {} asset addresses, 1 symbol collector",
            layers.len(),
            asset_connections.len()
        );

        Ok(Self {
            layers,
            assets: cache,
            symbols: collector,
            input_connections,
            asset_connections,
            symbol_connection,
        })
    }

    /// Disconnects every handler. Returns how many connections were removed.
    pub fn disconnect(
        &self,
        input: &Bus<InputChannelNotifications>,
        assets: &Bus<AssetNotifications>,
        symbols: &Bus<SymbolLog>,
    ) -> Result<usize, DemoError> {
        let mut removed = 0;
        for connection in &self.input_connections {
            removed += usize::from(input.disconnect(connection)?);
        }
        for connection in &self.asset_connections {
            removed += usize::from(assets.disconnect(connection)?);
        }
        removed += usize::from(symbols.disconnect(&self.symbol_connection)?);
        Ok(removed)
    }
}
