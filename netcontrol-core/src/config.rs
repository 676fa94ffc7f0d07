use serde::{Deserialize, Serialize};

use crate::errors::{NetcontrolError, Result};

/// Dry-run simulator used to propose new queue placements
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RebalanceStrategy {
    /// Move the lightest queue of every busy worker onto an idle worker of the
    /// same NUMA node, until the idle worker itself crosses the threshold.
    IdleQueue,
    /// Hand out all queues, heaviest first, across workers in serpentine order.
    /// Always limited to a single dry run per batch.
    RoundRobin,
}

impl Default for RebalanceStrategy {
    fn default() -> Self {
        Self::RoundRobin
    }
}

impl std::fmt::Display for RebalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IdleQueue => write!(f, "idle_queue"),
            Self::RoundRobin => write!(f, "round_robin"),
        }
    }
}

/// Rebalancing configuration
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct RebalanceConfig {
    /// Start with rebalance mode on
    pub enabled: bool,
    /// Simulator used for dry runs
    pub strategy: RebalanceStrategy,
    /// Seconds between two counter refreshes
    pub sample_interval_secs: u64,
    /// Minimum seconds between two applied optimizations
    pub rebalance_interval_secs: u64,
    /// Maximum dry runs per batch
    pub max_dry_runs: usize,
    /// Worker load (0-100) at which a worker counts as busy
    pub load_threshold: f64,
    /// Relative variance gain (fraction of the best variance) a candidate must beat
    pub min_improvement: f64,
    /// Sampling intervals kept in every window
    pub samples: usize,
    /// Seconds to let the dataplane settle after applying a command
    pub vswitch_wait_secs: u64,
}

impl Default for RebalanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategy: RebalanceStrategy::RoundRobin,
            sample_interval_secs: 10,
            rebalance_interval_secs: 60,
            max_dry_runs: 1,
            load_threshold: 95.0,
            min_improvement: 0.25,
            samples: 6,
            vswitch_wait_secs: 10,
        }
    }
}

impl RebalanceConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_secs == 0 {
            return Err(NetcontrolError::InvalidConfig(
                "sample_interval_secs must be greater than zero".into(),
            ));
        }
        if !(0.0..=100.0).contains(&self.load_threshold) {
            return Err(NetcontrolError::InvalidConfig(format!(
                "load_threshold must be within 0..=100, got {}",
                self.load_threshold
            )));
        }
        if !(0.0..1.0).contains(&self.min_improvement) {
            return Err(NetcontrolError::InvalidConfig(format!(
                "min_improvement must be a fraction within 0..1, got {}",
                self.min_improvement
            )));
        }
        if self.max_dry_runs == 0 {
            return Err(NetcontrolError::InvalidConfig(
                "max_dry_runs must be at least 1".into(),
            ));
        }
        Ok(())
    }

    /// Dry runs per batch; round robin is deterministic on a given baseline so
    /// it never runs more than once.
    pub fn effective_dry_runs(&self) -> usize {
        match self.strategy {
            RebalanceStrategy::RoundRobin => 1,
            RebalanceStrategy::IdleQueue => self.max_dry_runs.max(1),
        }
    }

    /// Refresh ticks that must pass between two applied optimizations.
    pub fn ticks_between_applies(&self) -> u64 {
        self.rebalance_interval_secs / self.sample_interval_secs.max(1)
    }

    /// Window length, never longer than one rebalance interval.
    pub fn window_intervals(&self) -> usize {
        let per_interval = self.ticks_between_applies().max(1) as usize;
        self.samples.clamp(1, per_interval)
    }
}
