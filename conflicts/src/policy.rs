//! Choosing the resolution policy from configuration.

use serde::{Deserialize, Serialize};
use tempo_engine::TempoEpic;
use tempo_types::NodeId;

use crate::local::LocalResolverEpic;
use crate::resolver::MomentumResolverEpic;
use crate::selector::SeededRandomSelector;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverPolicy {
    Local,
    #[default]
    Momentum,
}

/// Build the conflict epic for `policy`.
pub fn build_resolver(policy: ResolverPolicy, local: NodeId, sample_size: usize) -> Box<dyn TempoEpic> {
    match policy {
        ResolverPolicy::Local => Box::new(LocalResolverEpic::new(local)),
        ResolverPolicy::Momentum => {
            Box::new(MomentumResolverEpic::new(SeededRandomSelector::new(sample_size)))
        }
    }
}
