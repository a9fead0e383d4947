//! # EBus
//!
//! A statically configured, in-process publish/subscribe event bus.
//!
//! Producers call methods on an event interface without knowing who listens.
//! Consumers implement that interface and connect to the bus, optionally at an
//! address id. The bus forwards each call to the connected handlers, immediately
//! or later through a FIFO queue.
//!
//! ## Core Features
//!
//! - **Static configuration**: addressing, handler ordering, locking and queueing
//!   are chosen per bus type through [`BusConfig`]. Invalid combinations do not build.
//! - **Reentrant-safe dispatch**: handlers may connect and disconnect handlers,
//!   themselves included, while a dispatch is walking them.
//! - **Deferred dispatch**: queued events and functions run in FIFO batches when
//!   the owner calls [`Bus::execute_queued_events`].
//! - **Non-owning connections**: the bus holds handlers weakly. Callers keep their
//!   handlers alive and disconnect them explicitly.
//!
//! ## Quick Start
//!
//! ```rust
//! use ebus::{declare_bus, AddressPolicy, BusConfig, GlobalBus, HandlerPolicy};
//! use std::sync::{Arc, Mutex};
//!
//! pub trait AssetEvents: Send + Sync {
//!     fn on_reloaded(&self, path: &str);
//! }
//!
//! pub struct AssetBus;
//!
//! impl BusConfig for AssetBus {
//!     type Handler = dyn AssetEvents;
//!     type Id = u32;
//!     type Order = ();
//!     const NAME: &'static str = "assets";
//!     const ADDRESS_POLICY: AddressPolicy = AddressPolicy::ById;
//!     const HANDLER_POLICY: HandlerPolicy = HandlerPolicy::Multiple;
//!     const ENABLE_QUEUE: bool = true;
//! }
//!
//! declare_bus!(static ASSETS: AssetBus;);
//!
//! #[derive(Default)]
//! struct Reloads(Mutex<Vec<String>>);
//!
//! impl AssetEvents for Reloads {
//!     fn on_reloaded(&self, path: &str) {
//!         self.0.lock().unwrap().push(path.to_string());
//!     }
//! }
//!
//! let reloads = Arc::new(Reloads::default());
//! let handler: Arc<dyn AssetEvents> = reloads.clone();
//! let connection = AssetBus::bus().connect_id(&42, &handler).unwrap();
//!
//! // Immediate dispatch to address 42
//! ASSETS.event(&42, |h| h.on_reloaded("textures/grass.png"));
//!
//! // Deferred dispatch, run on the owner's schedule
//! ASSETS.queue_event(42, |h| h.on_reloaded("meshes/tree.glb"));
//! assert_eq!(ASSETS.execute_queued_events(), 1);
//!
//! assert_eq!(reloads.0.lock().unwrap().len(), 2);
//! ASSETS.disconnect(&connection).unwrap();
//! ```

pub mod bus;
pub mod config;
pub mod connection;
pub mod context;
mod directory;
mod dispatch;
pub mod error;
mod lock;
pub mod macros;
mod queue;
pub mod stats;

#[cfg(test)]
mod tests;

pub use bus::Bus;
pub use config::{AddressPolicy, BusConfig, GlobalBus, HandlerPolicy, LockPolicy};
pub use connection::{BusAddress, BusConnection};
pub use context::BusState;
pub use error::BusError;
pub use stats::BusStats;
