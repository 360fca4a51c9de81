use std::time::Duration;

use anyhow::ensure;
use clap::Args;

/// Per-case travel distance used when no vehicle track is available.
#[derive(Debug, Clone, PartialEq)]
pub struct DistanceModel {
    pub min_km_per_case: f64,
    pub max_km_per_case: f64,
    pub seed: Option<u64>,
}

impl Default for DistanceModel {
    fn default() -> Self {
        Self {
            min_km_per_case: 8.0,
            max_km_per_case: 14.0,
            seed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Store queries allowed in flight at once.
    pub max_concurrency: usize,
    /// Technicians per store query.
    pub batch_size: usize,
    /// Deadline for the whole fan-out.
    pub timeout: Duration,
    pub distance: DistanceModel,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            batch_size: 25,
            timeout: Duration::from_secs(20),
            distance: DistanceModel::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        ensure!(self.max_concurrency > 0, "max concurrency must be at least 1");
        ensure!(self.batch_size > 0, "batch size must be at least 1");
        ensure!(!self.timeout.is_zero(), "timeout must be positive");
        ensure!(
            self.distance.min_km_per_case.is_finite()
                && self.distance.max_km_per_case.is_finite()
                && self.distance.min_km_per_case >= 0.0
                && self.distance.min_km_per_case <= self.distance.max_km_per_case,
            "distance range {}..{} km is invalid",
            self.distance.min_km_per_case,
            self.distance.max_km_per_case
        );
        Ok(())
    }
}

#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Concurrent case store queries
    #[arg(long, global = true, default_value_t = 4)]
    pub max_concurrency: usize,
    /// Technicians per case store query
    #[arg(long, global = true, default_value_t = 25)]
    pub batch_size: usize,
    /// Seconds before outstanding store queries are abandoned
    #[arg(long, global = true, default_value_t = 20)]
    pub timeout_secs: u64,
    #[arg(long, global = true, default_value_t = 8.0)]
    pub min_km_per_case: f64,
    #[arg(long, global = true, default_value_t = 14.0)]
    pub max_km_per_case: f64,
    /// Seed for the distance estimate (random when omitted)
    #[arg(long, global = true)]
    pub distance_seed: Option<u64>,
}

impl EngineArgs {
    pub fn into_config(self) -> anyhow::Result<EngineConfig> {
        let config = EngineConfig {
            max_concurrency: self.max_concurrency,
            batch_size: self.batch_size,
            timeout: Duration::from_secs(self.timeout_secs),
            distance: DistanceModel {
                min_km_per_case: self.min_km_per_case,
                max_km_per_case: self.max_km_per_case,
                seed: self.distance_seed,
            },
        };
        config.validate()?;
        Ok(config)
    }
}
