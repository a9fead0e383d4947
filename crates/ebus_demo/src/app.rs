//! Main application logic and lifecycle management.
//!
//! The `Application` owns the tick loop. Producer tasks queue asset and symbol
//! events from the runtime's worker threads; the tick loop dispatches one input
//! event per tick and then drains both queues on its own task, so handlers only
//! ever run from the tick loop.

use crate::buses::{dispatch_input, InputChannel, ASSETS, INPUT, SYMBOLS};
use crate::cli::CliArgs;
use crate::config::{AppConfig, DemoSettings};
use crate::error::DemoError;
use crate::listeners::Listeners;
use crate::logging::display_banner;
use crate::signals::setup_signal_handlers;
use ebus::BusStats;
use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Input channels cycled through by the tick loop.
const INPUT_CHANNELS: [&str; 5] = [
    "mouse_delta_x",
    "gamepad_thumbstick_l_x",
    "keyboard_key_f5",
    "touch_index_0",
    "mouse_button_left",
];

/// Counters reported when the tick loop stops.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed
    pub ticks: u64,
    /// Input events a layer consumed
    pub inputs_consumed: u64,
    /// Queued asset calls executed
    pub asset_calls: u64,
    /// Queued symbol calls executed
    pub symbol_calls: u64,
}

pub struct Application {
    /// Loaded application configuration
    config: AppConfig,
}

impl Application {
    /// Loads configuration, applies CLI overrides and validates the result.
    pub async fn new(args: CliArgs) -> Result<Self, DemoError> {
        info!("🔧 Loading configuration from: {}", args.config_path.display());
        let mut config = AppConfig::load_from_file(&args.config_path).await?;

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }
        if args.json_logs {
            config.logging.json_format = true;
        }
        if let Some(tick_interval_ms) = args.tick_interval_ms {
            config.demo.tick_interval_ms = tick_interval_ms;
        }
        if let Some(workers) = args.workers {
            config.demo.workers = workers;
        }
        if args.max_ticks.is_some() {
            config.demo.max_ticks = args.max_ticks;
        }

        Self::with_config(config)
    }

    /// Builds an application from an already loaded configuration.
    pub fn with_config(config: AppConfig) -> Result<Self, DemoError> {
        config.validate().map_err(DemoError::InvalidConfig)?;
        info!("✅ Configuration loaded and validated successfully");
        display_banner();
        Ok(Self { config })
    }

    /// Runs the tick loop until a shutdown signal or `max_ticks`, then drains
    /// the queues and disconnects every handler.
    pub async fn run(self) -> Result<RunSummary, DemoError> {
        self.run_until(setup_signal_handlers()).await
    }

    /// Same as [`run`](Self::run), stopping when `shutdown` resolves instead of
    /// on a process signal.
    ///
    /// Handlers are disconnected and symbol queuing is closed on every exit
    /// path, including when `shutdown` or a producer fails.
    pub async fn run_until<S>(self, shutdown: S) -> Result<RunSummary, DemoError>
    where
        S: Future<Output = Result<(), DemoError>>,
    {
        info!("🌟 Starting EBus demo");
        self.log_configuration_summary();
        let settings = &self.config.demo;

        let listeners = Listeners::connect(settings, &INPUT, &ASSETS, &SYMBOLS)?;
        SYMBOLS.allow_function_queuing(true);

        let outcome = drive(settings, &listeners, shutdown).await;

        SYMBOLS.allow_function_queuing(false);
        let disconnected = listeners.disconnect(&INPUT, &ASSETS, &SYMBOLS);

        let (summary, produced) = outcome?;
        info!("🔌 Disconnected {} handlers", disconnected?);
        log_final_statistics(&summary, produced, &listeners);
        Ok(summary)
    }

    fn log_configuration_summary(&self) {
        let demo = &self.config.demo;
        info!("📋 Configuration Summary:");
        info!("  ⏱️ Tick interval: {}ms", demo.tick_interval_ms);
        info!("  👷 Producers: {} (every {}ms)", demo.workers, demo.worker_interval_ms);
        info!("  📦 Tracked assets: {}", demo.tracked_assets);
        match demo.max_ticks {
            Some(max) => info!("  🏁 Stopping after {} ticks", max),
            None => info!("  🛑 Press Ctrl+C to stop"),
        }
    }
}

/// Tick loop, producer shutdown and final drain. Returns the run summary and
/// the number of calls the producers queued.
async fn drive<S>(
    settings: &DemoSettings,
    listeners: &Listeners,
    shutdown: S,
) -> Result<(RunSummary, u64), DemoError>
where
    S: Future<Output = Result<(), DemoError>>,
{
    // Dropping the sender on an early return stops the producers too.
    let (stop_tx, stop_rx) = watch::channel(false);
    let workers: Vec<JoinHandle<u64>> = (0..settings.workers)
        .map(|worker| tokio::spawn(produce(worker, settings.clone(), stop_rx.clone())))
        .collect();

    let mut ticker = tokio::time::interval(Duration::from_millis(settings.tick_interval_ms));
    let mut stats_ticker = tokio::time::interval(Duration::from_secs(settings.stats_interval_secs));
    stats_ticker.tick().await;

    tokio::pin!(shutdown);

    info!("✅ Tick loop running every {}ms", settings.tick_interval_ms);
    let mut summary = RunSummary::default();
    loop {
        tokio::select! {
            result = &mut shutdown => {
                result?;
                break;
            }
            _ = ticker.tick() => {
                tick(&mut summary);
                if settings.max_ticks.is_some_and(|max| summary.ticks >= max) {
                    info!("🏁 Reached {} ticks", summary.ticks);
                    break;
                }
            }
            _ = stats_ticker.tick() => {
                log_bus_stats(&[INPUT.stats(), ASSETS.stats(), SYMBOLS.stats()]);
            }
        }
    }

    info!("🛑 Stopping producers...");
    let _ = stop_tx.send(true);
    let mut produced = 0;
    for worker in workers {
        produced += worker.await?;
    }

    // Everything queued before the barrier has run once it fires.
    let symbols = listeners.symbols.clone();
    SYMBOLS.queue_broadcast(|h| h.finalize());
    SYMBOLS.queue_function(move || {
        info!("📚 Symbol batch closed with {} entries", symbols.len());
    });
    summary.asset_calls += ASSETS.execute_queued_events() as u64;
    summary.symbol_calls += SYMBOLS.execute_queued_events() as u64;

    Ok((summary, produced))
}

/// One tick: dispatch an input event, then drain the queues.
fn tick(summary: &mut RunSummary) {
    let index = (summary.ticks % INPUT_CHANNELS.len() as u64) as usize;
    let channel = InputChannel::new(INPUT_CHANNELS[index], summary.ticks as f32);
    if dispatch_input(&INPUT, &channel) {
        summary.inputs_consumed += 1;
    }

    summary.asset_calls += ASSETS.execute_queued_events() as u64;
    summary.symbol_calls += SYMBOLS.execute_queued_events() as u64;
    summary.ticks += 1;
}

/// Producer loop. Queues one asset update and one symbol per interval until
/// told to stop. Returns the number of calls it queued.
async fn produce(worker: usize, settings: DemoSettings, mut stop: watch::Receiver<bool>) -> u64 {
    let mut interval = tokio::time::interval(Duration::from_millis(settings.worker_interval_ms));
    let module = format!("worker_{worker}");
    let mut revision = 0u64;
    let mut queued = 0u64;

    loop {
        tokio::select! {
            _ = stop.changed() => break,
            _ = interval.tick() => {
                revision += 1;
                let asset = (worker as u64 + revision) % settings.tracked_assets;
                let rev = revision;
                if ASSETS.queue_event(asset, move |h| h.on_asset_changed(asset, rev)) {
                    queued += 1;
                }

                let module = module.clone();
                if SYMBOLS.queue_broadcast(move |h| h.log_global_method(&module, "tick")) {
                    queued += 1;
                }
            }
        }
    }

    if queued == 0 {
        warn!("Producer {} stopped without queueing anything", worker);
    }
    queued
}

fn log_bus_stats(stats: &[BusStats]) {
    for bus in stats {
        info!(
            "📊 {} - {} handlers at {} addresses | {} dispatches | {} queued ({} run, {} failed)",
            bus.name,
            bus.handlers,
            bus.addresses,
            bus.events_dispatched,
            bus.queued_calls,
            bus.queued_calls_executed,
            bus.queued_calls_failed
        );
    }
}

fn log_final_statistics(summary: &RunSummary, produced: u64, listeners: &Listeners) {
    info!("📊 Final Statistics:");
    info!("  - Ticks: {}", summary.ticks);
    info!("  - Inputs consumed: {}", summary.inputs_consumed);
    for layer in &listeners.layers {
        info!("    - {}: {} handled", layer.name, layer.handled());
    }
    info!("  - Calls queued by producers: {}", produced);
    info!("  - Asset calls run: {} ({} assets tracked)", summary.asset_calls, listeners.assets.tracked());
    info!("  - Symbol calls run: {} ({} symbols)", summary.symbol_calls, listeners.symbols.len());

    for stats in [INPUT.stats(), ASSETS.stats(), SYMBOLS.stats()] {
        match serde_json::to_string(&stats) {
            Ok(json) => info!("  - {}", json),
            Err(e) => warn!("Failed to serialize stats for {}: {}", stats.name, e),
        }
    }
}
