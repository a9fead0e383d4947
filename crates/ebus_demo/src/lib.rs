//! # EBus Demo - Main Entry Point
//!
//! Wires three statically configured buses into a fixed-rate tick loop:
//!
//! - an input bus whose handlers are visited by priority and share a
//!   "consumed" flag,
//! - an asset bus addressed by asset id, fed through its queue by producer
//!   tasks,
//! - a symbol bus whose queue is only opened while the loop runs and is closed
//!   with a barrier call.
//!
//! ## Quick Start
//!
//! ```bash
//! # Run with default configuration until Ctrl+C
//! ebus_demo
//!
//! # Run 200 ticks at 10ms with two producers
//! ebus_demo --ticks 200 --tick-ms 10 --workers 2
//!
//! # JSON logging, including bus diagnostics
//! RUST_LOG=ebus=debug,info ebus_demo --json-logs
//! ```
//!
//! ## Configuration
//!
//! Loaded from a TOML file (default: `ebus_demo.toml`). A default file is
//! written if it doesn't exist.

use tracing::error;

pub mod app;
pub mod buses;
pub mod cli;
pub mod config;
pub mod error;
pub mod listeners;
pub mod logging;
pub mod signals;

use app::Application;
use cli::CliArgs;
use config::AppConfig;

/// Runs the demo: CLI parsing, configuration, logging, the tick loop, and bus
/// teardown.
///
/// Called from an async context (`main` with `#[tokio::main]`).
pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Load configuration to get logging settings
    let config = AppConfig::load_from_file(&args.config_path)
        .await
        .unwrap_or_default();

    let level = args.log_level.clone().unwrap_or(config.logging.level.clone());
    let logging = config::LoggingSettings { level, ..config.logging };
    if let Err(e) = logging::setup_logging(&logging, args.json_logs) {
        eprintln!("❌ Failed to setup logging: {e}");
        std::process::exit(1);
    }

    let app = match Application::new(args).await {
        Ok(app) => app,
        Err(e) => {
            error!("❌ Failed to start application: {e}");
            std::process::exit(1);
        }
    };

    let result = app.run().await;

    buses::INPUT.teardown();
    buses::ASSETS.teardown();
    buses::SYMBOLS.teardown();

    if let Err(e) = result {
        error!("❌ Application error: {e}");
        std::process::exit(1);
    }
    Ok(())
}

pub use app::RunSummary;
pub use config::{DemoSettings, LoggingSettings};
pub use error::DemoError;
