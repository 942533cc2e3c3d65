//! Tempo node: assembles the core engines into a running process.
//!
//! The node is the composition root that:
//! - Loads configuration and installs structured logging
//! - Opens LMDB storage (or takes injected stores)
//! - Feeds peer membership and inbound messages to discovery and sampling
//! - Hosts the dispatch engine with the configured conflict resolver
//! - Exports Prometheus metrics

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod node;
pub mod shutdown;
pub mod tracing_spans;

pub use config::{NodeConfig, TempoConfig};
pub use error::NodeError;
pub use logging::{init_logging, LogFormat};
pub use metrics::TempoMetrics;
pub use node::{NodeStores, TempoNode};
pub use shutdown::ShutdownController;
