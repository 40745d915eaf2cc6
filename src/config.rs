//! Engine configuration.
//!
//! All tunables named in spec §6's "Default configuration" table live here.
//! [`EngineConfig::default`] reproduces the documented defaults exactly;
//! [`EngineConfig::load`] layers an optional `hme.toml` and `HME_`-prefixed
//! environment variables on top, following the same defaults-then-file-then-env
//! precedence the teacher's `ConfigLoader` uses.

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// Tunable thresholds for the store, pruner, nexus manager and retriever.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory the store document and stats files live under.
    pub base_dir: PathBuf,

    /// Hard ceiling on WORKING token_sum before pruning becomes urgent.
    pub working_memory_limit: u64,
    /// Pruning triggers once WORKING.token_sum exceeds this.
    pub prune_threshold: u64,
    /// How many blocks to demote per `check_and_prune` call.
    pub prune_batch_size: usize,
    /// Minimum age (seconds) before a WORKING block is prunable.
    pub min_age_for_pruning_secs: u64,
    /// Access count below which a block counts as under-used for pruning/archiving.
    pub min_access_count: u32,
    /// SHORT_TERM -> LONG_TERM age threshold (seconds).
    pub short_to_long_age_secs: u64,
    /// LONG_TERM -> STALE age threshold (seconds).
    pub long_to_stale_age_secs: u64,

    /// Nexus admission cap.
    pub max_nexus_points: usize,
    /// Importance score at/above which a block is eligible for nexus admission.
    pub nexus_threshold: f64,
    /// Access-history window (seconds) used for the frequency sub-score.
    pub access_window_secs: u64,
    /// Most recent accesses kept per block.
    pub max_access_history: usize,

    /// Accesses within a tier before a block promotes one step up.
    pub promotion_threshold: u32,

    /// Max results returned by `search_memory`.
    pub max_results: usize,
    /// Minimum relevance to keep a candidate in search results.
    pub similarity_threshold: f64,
    /// Search result cache TTL (seconds).
    pub cache_duration_secs: u64,

    /// Ring-buffer capacity for the performance log.
    pub performance_log_size: usize,
    /// Days before daily/snapshot stats files are purged.
    pub metrics_retention_days: u32,
    /// Minimum spacing between point-in-time snapshots (seconds).
    pub snapshot_interval_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("."),
            working_memory_limit: 200_000,
            prune_threshold: 150_000,
            prune_batch_size: 5,
            min_age_for_pruning_secs: 3_600,
            min_access_count: 5,
            short_to_long_age_secs: 86_400,
            long_to_stale_age_secs: 604_800,
            max_nexus_points: 100,
            nexus_threshold: 0.5,
            access_window_secs: 3_600,
            max_access_history: 64,
            promotion_threshold: 2,
            max_results: 10,
            similarity_threshold: 0.3,
            cache_duration_secs: 300,
            performance_log_size: 1_000,
            metrics_retention_days: 30,
            snapshot_interval_secs: 3_600,
        }
    }
}

impl EngineConfig {
    /// Load config with defaults, an optional `hme.toml` under `base_dir`,
    /// and `HME_`-prefixed environment overrides, highest precedence last.
    pub fn load(base_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let base_dir = base_dir.as_ref();
        let defaults = Self {
            base_dir: base_dir.to_path_buf(),
            ..Self::default()
        };

        let config: Self = Figment::new()
            .merge(Serialized::defaults(defaults))
            .merge(Toml::file(base_dir.join("hme.toml")))
            .merge(Env::prefixed("HME_"))
            .extract()
            .map_err(|e| EngineError::storage(format!("failed to load config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> EngineResult<()> {
        if self.prune_threshold > self.working_memory_limit {
            return Err(EngineError::storage(
                "prune_threshold must not exceed working_memory_limit",
            ));
        }
        if !(0.0..=1.0).contains(&self.nexus_threshold) {
            return Err(EngineError::storage("nexus_threshold must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(EngineError::storage(
                "similarity_threshold must be in [0, 1]",
            ));
        }
        Ok(())
    }

    pub fn min_age_for_pruning(&self) -> Duration {
        Duration::from_secs(self.min_age_for_pruning_secs)
    }

    pub fn access_window(&self) -> Duration {
        Duration::from_secs(self.access_window_secs)
    }

    pub fn cache_duration(&self) -> Duration {
        Duration::from_secs(self.cache_duration_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_table() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.working_memory_limit, 200_000);
        assert_eq!(cfg.prune_threshold, 150_000);
        assert_eq!(cfg.max_nexus_points, 100);
        assert!((cfg.nexus_threshold - 0.5).abs() < f64::EPSILON);
        assert_eq!(cfg.promotion_threshold, 2);
        assert_eq!(cfg.max_results, 10);
    }

    #[test]
    fn load_without_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = EngineConfig::load(dir.path()).unwrap();
        assert_eq!(cfg.base_dir, dir.path());
        assert_eq!(cfg.prune_threshold, 150_000);
    }

    #[test]
    fn rejects_inverted_thresholds() {
        let cfg = EngineConfig {
            prune_threshold: 999_999,
            working_memory_limit: 1_000,
            ..EngineConfig::default()
        };
        assert!(cfg.validate().is_err());
    }
}
