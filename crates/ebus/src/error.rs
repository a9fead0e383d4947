//! Error types for bus usage errors.
//!
//! Only misuse is reported here. Dispatching to an empty bus, draining an empty
//! queue, or querying a bus that has no context yet are not errors.

/// Errors returned by connection management on a [`Bus`](crate::Bus).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BusError {
    /// The bus was torn down and no longer accepts connections.
    #[error("Bus '{0}' has been torn down")]
    TornDown(&'static str),

    /// A handler is already connected to an address that accepts only one.
    #[error("Bus '{bus}': address {address} already has a handler connected")]
    AddressOccupied { bus: &'static str, address: String },

    /// The same handler object is already connected to the address.
    #[error("Bus '{bus}': handler is already connected to address {address}")]
    AlreadyConnected { bus: &'static str, address: String },

    /// The handle was issued by another bus or by a context that no longer exists.
    #[error("Bus '{0}': connection handle was not issued by this bus")]
    ForeignConnection(&'static str),

    /// The address handle was issued by another bus or by a context that no longer exists.
    #[error("Bus '{0}': address handle is stale")]
    StaleAddress(&'static str),
}
