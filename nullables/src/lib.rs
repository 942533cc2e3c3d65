//! Nullable infrastructure for deterministic testing.
//!
//! Every external dependency of the Tempo core (timers, outbound messaging,
//! storage) sits behind a trait. This crate provides test-friendly
//! implementations that:
//! - Return deterministic values
//! - Can be controlled programmatically
//! - Never touch the filesystem or network
//!
//! Usage: swap real implementations for nullables in tests.

pub mod network;
pub mod scheduler;
pub mod store;

pub use network::NullMessenger;
pub use scheduler::NullScheduler;
pub use store::{NullAtomStore, NullCommitmentStore, NullCursorStore};
