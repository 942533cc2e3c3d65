use std::time::Duration;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IterativeDiscovererConfig {
    /// Maximum atom ids per response.
    pub response_limit: usize,
    /// Cap on the backoff exponent; the longest idle wait is `2^max_backoff` seconds.
    pub max_backoff: u32,
    /// Resend a request if no response arrived within this time.
    pub request_timeout: Duration,
    pub request_queue_capacity: usize,
    pub request_processor_threads: usize,
}

impl Default for IterativeDiscovererConfig {
    fn default() -> Self {
        Self {
            response_limit: 10,
            max_backoff: 4,
            request_timeout: Duration::from_secs(5),
            request_queue_capacity: 8192,
            request_processor_threads: 2,
        }
    }
}

impl IterativeDiscovererConfig {
    /// Idle wait after `backoff` consecutive empty rounds.
    pub fn backoff_delay(&self, backoff: u32) -> Duration {
        Duration::from_secs(1u64 << backoff.min(self.max_backoff))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_is_capped() {
        let config = IterativeDiscovererConfig::default();
        assert_eq!(config.backoff_delay(0), Duration::from_secs(1));
        assert_eq!(config.backoff_delay(1), Duration::from_secs(2));
        assert_eq!(config.backoff_delay(4), Duration::from_secs(16));
        assert_eq!(config.backoff_delay(30), Duration::from_secs(16));
    }
}
