//! Prometheus metrics for the Tempo node.
//!
//! Discovery and engine components count into their own
//! [`StatsCounter`](tempo_utils::StatsCounter)s; [`TempoMetrics::observe`]
//! folds those into the registry before each scrape.

use prometheus::{
    register_int_counter_with_registry, register_int_gauge_with_registry, Encoder, IntCounter,
    IntGauge, Opts, Registry, TextEncoder,
};
use tempo_engine::TempoAction;
use tempo_network::discovery::stats as discovery_stats;
use tempo_network::IterativeDiscoverer;

pub struct TempoMetrics {
    pub registry: Registry,

    // ── Discovery ───────────────────────────────────────────────────────
    pub discovery_requests_sent: IntCounter,
    pub discovery_requests_served: IntCounter,
    pub discovery_responses_received: IntCounter,
    pub atoms_discovered: IntCounter,
    /// Inbound requests dropped because the request queue was full.
    pub discovery_requests_dropped: IntCounter,

    // ── Conflicts ───────────────────────────────────────────────────────
    pub conflicts_raised: IntCounter,
    pub conflicts_resolved: IntCounter,
    /// Resolution attempts that failed and were abandoned.
    pub conflicts_aborted: IntCounter,

    // ── Gauges ──────────────────────────────────────────────────────────
    /// Peers currently being discovered from.
    pub tracked_peers: IntGauge,
}

impl TempoMetrics {
    /// Create a fresh set of metrics under a new [`Registry`].
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let discovery_requests_sent = register_int_counter_with_registry!(
            Opts::new(
                "tempo_discovery_requests_sent_total",
                "Discovery requests sent to peers"
            ),
            registry
        )?;
        let discovery_requests_served = register_int_counter_with_registry!(
            Opts::new(
                "tempo_discovery_requests_served_total",
                "Discovery requests answered for peers"
            ),
            registry
        )?;
        let discovery_responses_received = register_int_counter_with_registry!(
            Opts::new(
                "tempo_discovery_responses_received_total",
                "Discovery responses received from peers"
            ),
            registry
        )?;
        let atoms_discovered = register_int_counter_with_registry!(
            Opts::new("tempo_atoms_discovered_total", "Atom ids learned via discovery"),
            registry
        )?;
        let discovery_requests_dropped = register_int_counter_with_registry!(
            Opts::new(
                "tempo_discovery_requests_dropped_total",
                "Inbound discovery requests dropped on a full queue"
            ),
            registry
        )?;
        let conflicts_raised = register_int_counter_with_registry!(
            Opts::new("tempo_conflicts_raised_total", "Conflicts raised"),
            registry
        )?;
        let conflicts_resolved = register_int_counter_with_registry!(
            Opts::new("tempo_conflicts_resolved_total", "Conflicts resolved"),
            registry
        )?;
        let conflicts_aborted = register_int_counter_with_registry!(
            Opts::new("tempo_conflicts_aborted_total", "Conflict resolutions aborted"),
            registry
        )?;
        let tracked_peers = register_int_gauge_with_registry!(
            Opts::new("tempo_tracked_peers", "Peers under iterative discovery"),
            registry
        )?;

        Ok(Self {
            registry,
            discovery_requests_sent,
            discovery_requests_served,
            discovery_responses_received,
            atoms_discovered,
            discovery_requests_dropped,
            conflicts_raised,
            conflicts_resolved,
            conflicts_aborted,
            tracked_peers,
        })
    }

    /// Count conflict lifecycle actions.
    pub fn on_action(&self, action: &TempoAction) {
        match action {
            TempoAction::RaiseConflict(_) => self.conflicts_raised.inc(),
            TempoAction::ConflictResolved(_) => self.conflicts_resolved.inc(),
            TempoAction::ConflictAborted(_) => self.conflicts_aborted.inc(),
            _ => {}
        }
    }

    /// Bring the discovery counters up to date.
    pub fn observe(&self, discoverer: &IterativeDiscoverer) {
        let stats = discoverer.stats();
        catch_up(&self.discovery_requests_sent, stats.get(discovery_stats::REQUESTS_SENT));
        catch_up(&self.discovery_requests_served, stats.get(discovery_stats::REQUESTS_SERVED));
        catch_up(
            &self.discovery_responses_received,
            stats.get(discovery_stats::RESPONSES_RECEIVED),
        );
        catch_up(&self.atoms_discovered, stats.get(discovery_stats::ATOMS_DISCOVERED));
        catch_up(
            &self.discovery_requests_dropped,
            stats.get(discovery_stats::REQUESTS_DROPPED),
        );
        self.tracked_peers.set(discoverer.state().len() as i64);
    }

    /// Encode the registry in the Prometheus text format.
    pub fn encode(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

fn catch_up(counter: &IntCounter, total: u64) {
    let current = counter.get();
    if total > current {
        counter.inc_by(total - current);
    }
}
