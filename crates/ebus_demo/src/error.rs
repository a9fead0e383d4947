//! Error types for the demo application.
//!
//! Bus usage errors, configuration problems and task failures all surface as
//! [`DemoError`] and are reported once at the `main` boundary.

/// Enumeration of possible demo failures.
#[derive(Debug, thiserror::Error)]
pub enum DemoError {
    /// Configuration was loaded but failed validation
    #[error("Configuration validation failed: {0}")]
    InvalidConfig(String),

    /// Reading or writing the configuration file failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML for `AppConfig`
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// The default configuration could not be written out
    #[error("Failed to serialize configuration: {0}")]
    ConfigSerialize(#[from] toml::ser::Error),

    /// A bus rejected a connection change
    #[error("Bus error: {0}")]
    Bus(#[from] ebus::BusError),

    /// A worker task panicked or was cancelled
    #[error("Worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),

    /// Installing a signal handler failed
    #[error("Signal handling error: {0}")]
    Signal(String),
}
