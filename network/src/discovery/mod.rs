//! Iterative discovery: anti-entropy gossip over per-node logical clocks.
//!
//! Each tracked peer is paged through from the last persisted cursor. While
//! a peer has more to offer the next page is requested at once; when it is
//! drained, the discoverer backs off exponentially before asking again.

mod config;
mod discoverer;
mod listener;
mod state;

pub use config::IterativeDiscovererConfig;
pub use discoverer::IterativeDiscoverer;
pub use listener::{AtomDiscoveryListener, ListenerId};
pub use state::IterativeDiscoveryState;

/// Counter names of [`IterativeDiscoverer::stats`].
pub mod stats {
    pub const REQUESTS_SENT: &str = "requests_sent";
    pub const REQUESTS_SERVED: &str = "requests_served";
    pub const RESPONSES_RECEIVED: &str = "responses_received";
    pub const ATOMS_DISCOVERED: &str = "atoms_discovered";
    pub const REQUESTS_DROPPED: &str = "requests_dropped";
    pub const SEND_FAILURES: &str = "send_failures";
    pub const TIMEOUTS: &str = "timeouts";
    pub const MALFORMED_RESPONSES: &str = "malformed_responses";

    pub(crate) const ALL: &[&str] = &[
        REQUESTS_SENT,
        REQUESTS_SERVED,
        RESPONSES_RECEIVED,
        ATOMS_DISCOVERED,
        REQUESTS_DROPPED,
        SEND_FAILURES,
        TIMEOUTS,
        MALFORMED_RESPONSES,
    ];
}
