//! Conflict resolution epics for Tempo.
//!
//! Two interchangeable policies:
//! - [`LocalResolverEpic`]: pick the candidate this node witnessed first.
//! - [`MomentumResolverEpic`]: sample peers for their temporal proofs and
//!   pick the candidate most of them witnessed first.

pub mod local;
pub mod momentum;
pub mod policy;
pub mod resolver;
pub mod selector;

pub use local::LocalResolverEpic;
pub use momentum::{extract_preferences, measure, select_winner, MomentumWeight, UniformWeight};
pub use policy::{build_resolver, ResolverPolicy};
pub use resolver::MomentumResolverEpic;
pub use selector::{SampleSelector, SeededRandomSelector, XorDistanceSelector};
