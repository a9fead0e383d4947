//! # Bus Declaration Macro
//!
//! [`declare_bus!`] gives a configuration type its process-wide bus instance.

/// Declares a `static` bus for a configuration and implements [`GlobalBus`] for it.
///
/// After the declaration the bus is reachable both through the static and
/// through `Config::bus()`, which lets generic code find the bus from the
/// configuration type alone.
///
/// ```rust
/// use ebus::{declare_bus, BusConfig, GlobalBus};
/// use std::sync::Arc;
///
/// pub trait Shutdown: Send + Sync {
///     fn on_shutdown(&self);
/// }
///
/// pub struct ShutdownBus;
///
/// impl BusConfig for ShutdownBus {
///     type Handler = dyn Shutdown;
///     type Id = ();
///     type Order = ();
///     const NAME: &'static str = "shutdown";
/// }
///
/// declare_bus!(pub static SHUTDOWN: ShutdownBus;);
///
/// struct Flusher;
/// impl Shutdown for Flusher {
///     fn on_shutdown(&self) {}
/// }
///
/// let flusher: Arc<dyn Shutdown> = Arc::new(Flusher);
/// let connection = ShutdownBus::bus().connect(&flusher).unwrap();
/// assert_eq!(SHUTDOWN.broadcast(|h| h.on_shutdown()), 1);
/// SHUTDOWN.disconnect(&connection).unwrap();
/// ```
///
/// [`GlobalBus`]: crate::GlobalBus
#[macro_export]
macro_rules! declare_bus {
    ($(#[$meta:meta])* $vis:vis static $name:ident : $config:ty ;) => {
        $(#[$meta])*
        $vis static $name: $crate::Bus<$config> = $crate::Bus::new();

        impl $crate::GlobalBus for $config {
            fn bus() -> &'static $crate::Bus<Self> {
                &$name
            }
        }
    };
}
