//! Tuning knobs for a reclamation domain.

use serde::{Deserialize, Serialize};

/// Batching configuration for a [`Domain`](super::Domain).
///
/// Larger batches mean fewer contended updates of the global generation and
/// fewer registry scans, at the price of memory sitting retired for longer.
///
/// Configs deserialize with missing fields filled from [`ReclaimConfig::default`]:
///
/// ```
/// use rcu_lfq::ReclaimConfig;
///
/// let cfg: ReclaimConfig = serde_json::from_str(r#"{ "bag_capacity": 8 }"#).unwrap();
/// assert_eq!(cfg.bag_capacity(), 8);
/// assert_eq!(cfg.reclaim_threshold(), ReclaimConfig::default().reclaim_threshold());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReclaimConfig {
    bag_capacity: usize,
    reclaim_threshold: usize,
}

impl ReclaimConfig {
    /// Retirements buffered per handle before the bag is sealed.
    pub const DEFAULT_BAG_CAPACITY: usize = 64;
    /// Pending nodes in the global retired list that trigger a reclaim pass.
    pub const DEFAULT_RECLAIM_THRESHOLD: usize = 256;

    /// Creates the default configuration.
    pub const fn new() -> Self {
        Self {
            bag_capacity: Self::DEFAULT_BAG_CAPACITY,
            reclaim_threshold: Self::DEFAULT_RECLAIM_THRESHOLD,
        }
    }

    /// Sets the per-handle bag capacity.
    #[must_use]
    pub const fn with_bag_capacity(mut self, bag_capacity: usize) -> Self {
        self.bag_capacity = bag_capacity;
        self
    }

    /// Sets the global pending threshold.
    #[must_use]
    pub const fn with_reclaim_threshold(mut self, reclaim_threshold: usize) -> Self {
        self.reclaim_threshold = reclaim_threshold;
        self
    }

    /// Per-handle bag capacity.
    pub const fn bag_capacity(&self) -> usize {
        self.bag_capacity
    }

    /// Global pending threshold.
    pub const fn reclaim_threshold(&self) -> usize {
        self.reclaim_threshold
    }

    /// Clamps zero values to 1.
    pub(crate) fn normalized(self) -> Self {
        Self {
            bag_capacity: self.bag_capacity.max(1),
            reclaim_threshold: self.reclaim_threshold.max(1),
        }
    }
}

impl Default for ReclaimConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_are_clamped() {
        let cfg = ReclaimConfig::new()
            .with_bag_capacity(0)
            .with_reclaim_threshold(0)
            .normalized();
        assert_eq!(cfg.bag_capacity(), 1);
        assert_eq!(cfg.reclaim_threshold(), 1);
    }

    #[test]
    fn builder_overrides_defaults() {
        let cfg = ReclaimConfig::default().with_reclaim_threshold(10);
        assert_eq!(cfg.bag_capacity(), ReclaimConfig::DEFAULT_BAG_CAPACITY);
        assert_eq!(cfg.reclaim_threshold(), 10);
    }
}
