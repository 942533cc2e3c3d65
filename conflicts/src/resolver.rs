//! Resolve conflicts by sampling peers' temporal proofs.

use tempo_engine::{
    ConflictResolvedAction, RequestSamplingAction, ResolveConflictAction, SamplingCompleteAction,
    StateBundle, StateKind, TempoAction, TempoEpic, TempoError,
};
use tempo_messages::Peer;

use crate::momentum::{self, MomentumWeight, UniformWeight};
use crate::selector::SampleSelector;

/// Drives a conflict from raised, through sampling, to resolved.
///
/// A tag already pending is not raised twice. Once samples arrive the
/// candidate with the highest momentum wins; without usable samples the
/// current preference stands.
pub struct MomentumResolverEpic {
    selector: Box<dyn SampleSelector>,
    weight: Box<dyn MomentumWeight>,
}

impl MomentumResolverEpic {
    pub fn new(selector: impl SampleSelector + 'static) -> Self {
        Self {
            selector: Box::new(selector),
            weight: Box::new(UniformWeight),
        }
    }

    pub fn with_weight(mut self, weight: impl MomentumWeight + 'static) -> Self {
        self.weight = Box::new(weight);
        self
    }

    fn request_sampling(
        &self,
        bundle: &StateBundle,
        resolve: &ResolveConflictAction,
    ) -> Result<Vec<TempoAction>, TempoError> {
        let live = bundle.live_peers()?;
        let peers: Vec<Peer> = self
            .selector
            .select_samples(&live.nids(), &resolve.atom)
            .iter()
            .filter_map(|nid| live.peer(nid).cloned())
            .collect();
        let aids = resolve.aids();
        tracing::info!(tag = %resolve.tag, candidates = aids.len(), samples = peers.len(), "resolving conflict, initiating sampling");
        Ok(vec![RequestSamplingAction {
            peers,
            aids,
            tag: resolve.tag,
        }
        .into()])
    }

    fn decide(
        &self,
        bundle: &StateBundle,
        complete: &SamplingCompleteAction,
    ) -> Result<Vec<TempoAction>, TempoError> {
        let tag = complete.tag;
        let conflict = bundle
            .conflicts()?
            .get(&tag)
            .ok_or(TempoError::UnknownConflict(tag))?;
        let aids = conflict.aids();

        let samples = momentum::restrict_to(&complete.samples, &aids);
        let winner = if samples.is_empty() {
            tracing::warn!(%tag, received = complete.samples.len(), "no usable samples, resolving to current preference");
            conflict.current
        } else {
            let preferences = momentum::extract_preferences(&samples);
            let momenta = momentum::measure(&preferences, self.weight.as_ref());
            let winner = momentum::select_winner(&momenta).ok_or(TempoError::MomentumUndecided(tag))?;
            tracing::info!(%tag, %winner, ?momenta, "resolved conflict by momentum");
            winner
        };

        Ok(vec![ConflictResolvedAction { winner, aids, tag }.into()])
    }
}

impl TempoEpic for MomentumResolverEpic {
    fn name(&self) -> &'static str {
        "momentum_resolver"
    }

    fn required_state(&self) -> &'static [StateKind] {
        &[StateKind::Conflicts, StateKind::LivePeers]
    }

    fn epic(
        &self,
        bundle: &StateBundle,
        action: &TempoAction,
    ) -> Result<Vec<TempoAction>, TempoError> {
        match action {
            TempoAction::RaiseConflict(raise) => {
                if bundle.conflicts()?.is_pending(&raise.tag) {
                    tracing::warn!(tag = %raise.tag, "conflict is already pending");
                    return Ok(Vec::new());
                }
                Ok(vec![ResolveConflictAction::from(raise).into()])
            }
            TempoAction::ResolveConflict(resolve) => self.request_sampling(bundle, resolve),
            TempoAction::SamplingComplete(complete) => self.decide(bundle, complete),
            _ => Ok(Vec::new()),
        }
    }
}
