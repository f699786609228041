//! Candidate clusters and the order in which they are tried.

use std::sync::Arc;

use super::provider::{AddressProvider, StaticAddressProvider};
use crate::config::{ClientConfig, Credentials};

/// One cluster the client may connect to.
#[derive(Debug, Clone)]
pub struct CandidateCluster {
    config: Arc<ClientConfig>,
    provider: Arc<dyn AddressProvider>,
}

impl CandidateCluster {
    /// Creates a candidate whose addresses come from its network configuration.
    pub fn from_config(config: ClientConfig) -> Self {
        let provider = StaticAddressProvider::from_config(config.network());
        Self::with_provider(config, Arc::new(provider))
    }

    /// Creates a candidate with a custom address provider.
    pub fn with_provider(config: ClientConfig, provider: Arc<dyn AddressProvider>) -> Self {
        Self {
            config: Arc::new(config),
            provider,
        }
    }

    /// Returns the cluster name presented during authentication.
    pub fn cluster_name(&self) -> &str {
        self.config.cluster_name()
    }

    /// Returns the address provider.
    pub fn provider(&self) -> &Arc<dyn AddressProvider> {
        &self.provider
    }

    /// Returns the credentials presented during authentication.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.config.security().credentials()
    }

    /// Returns the full configuration of this candidate.
    pub fn config(&self) -> &Arc<ClientConfig> {
        &self.config
    }
}

/// Yields candidate indices in round-robin order, each `try_count` times.
///
/// The sequence starts at the currently selected candidate, so with three
/// candidates, a try count of two and start index 1 it yields
/// `1, 2, 0, 1, 2, 0`.
#[derive(Debug, Clone)]
pub struct FailoverPlan {
    candidates: usize,
    next: usize,
    remaining: usize,
}

impl FailoverPlan {
    /// Creates a plan over `candidates` clusters.
    pub fn new(candidates: usize, try_count: u32, start: usize) -> Self {
        let remaining = candidates.saturating_mul(try_count as usize);
        Self {
            candidates,
            next: if candidates == 0 { 0 } else { start % candidates },
            remaining,
        }
    }

    /// Total number of candidate attempts the plan allows.
    pub fn len(&self) -> usize {
        self.remaining
    }

    /// Returns true if the plan allows no attempts.
    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }
}

impl Iterator for FailoverPlan {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        if self.remaining == 0 {
            return None;
        }
        let index = self.next;
        self.next = (self.next + 1) % self.candidates;
        self.remaining -= 1;
        Some(index)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_round_robin_from_start() {
        let plan: Vec<_> = FailoverPlan::new(3, 2, 1).collect();
        assert_eq!(plan, vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn test_plan_yields_each_candidate_try_count_times() {
        let plan: Vec<_> = FailoverPlan::new(2, 5, 0).collect();
        assert_eq!(plan.len(), 10);
        assert_eq!(plan.iter().filter(|i| **i == 0).count(), 5);
        assert_eq!(plan.iter().filter(|i| **i == 1).count(), 5);
    }

    #[test]
    fn test_single_candidate_single_try() {
        let plan: Vec<_> = FailoverPlan::new(1, 1, 0).collect();
        assert_eq!(plan, vec![0]);
    }

    #[test]
    fn test_empty_plan() {
        let plan = FailoverPlan::new(0, 3, 0);
        assert!(plan.is_empty());
        assert_eq!(plan.count(), 0);
    }

    #[test]
    fn test_start_index_wraps() {
        let plan: Vec<_> = FailoverPlan::new(2, 1, 5).collect();
        assert_eq!(plan, vec![1, 0]);
    }

    #[test]
    fn test_candidate_from_config() {
        let config = ClientConfig::builder()
            .cluster_name("alpha")
            .credentials("user", "pass")
            .build()
            .unwrap();
        let candidate = CandidateCluster::from_config(config);

        assert_eq!(candidate.cluster_name(), "alpha");
        assert!(matches!(
            candidate.credentials(),
            Some(Credentials::UsernamePassword { .. })
        ));
    }
}
