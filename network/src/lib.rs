//! Networking layer for Tempo.
//!
//! Owns everything between the transport and the core: the address book of
//! live peers, inbound message routing, iterative atom discovery, and the
//! temporal proof sampling used by momentum conflict resolution.

pub mod address_book;
pub mod discovery;
pub mod router;
pub mod sampling;

pub use address_book::{AddressBook, PeerEvent};
pub use discovery::{
    AtomDiscoveryListener, IterativeDiscoverer, IterativeDiscovererConfig, IterativeDiscoveryState,
};
pub use router::{HandlerId, MessageRouter};
pub use sampling::SamplingCoordinator;
