//! Operation logging and periodic statistics snapshots (spec §4.5).
//!
//! Three artifacts live under `base_dir/statistics/`: an in-memory
//! ring-buffered performance log (never persisted — it exists for the
//! current process's introspection only), daily aggregate files
//! (`daily/<YYYY-MM-DD>.json`), and point-in-time snapshots
//! (`snapshots/snapshot_<unix_seconds>.json`).

use std::collections::VecDeque;
use std::fs;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::nexus::NexusStats;
use crate::store::StoreStats;
use crate::EngineConfig;

const DAILY_DIR: &str = "statistics/daily";
const SNAPSHOT_DIR: &str = "statistics/snapshots";

/// A single logged operation (spec §4.5 performance log entry).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct OperationRecord {
    pub at: i64,
    pub duration_ms: u64,
    pub success: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct DailyAggregate {
    date: String,
    #[serde(default)]
    operation_count: u64,
    #[serde(default)]
    success_count: u64,
    #[serde(default)]
    total_duration_ms: u64,
}

#[derive(Debug, Clone, Serialize)]
struct Snapshot<'a> {
    taken_at: i64,
    store: SnapshotStoreStats,
    nexus: &'a NexusStatsWire,
}

#[derive(Debug, Clone, Serialize)]
struct SnapshotStoreStats {
    total_blocks: usize,
    total_tokens: u64,
    working_blocks: usize,
    short_term_blocks: usize,
    long_term_blocks: usize,
    stale_blocks: usize,
}

#[derive(Debug, Clone, Serialize)]
struct NexusStatsWire {
    total_count: usize,
    high: usize,
    medium: usize,
    low: usize,
    average_importance: f64,
}

impl From<&NexusStats> for NexusStatsWire {
    fn from(s: &NexusStats) -> Self {
        Self {
            total_count: s.total_count,
            high: s.high,
            medium: s.medium,
            low: s.low,
            average_importance: s.average_importance,
        }
    }
}

impl From<&StoreStats> for SnapshotStoreStats {
    fn from(s: &StoreStats) -> Self {
        Self {
            total_blocks: s.total_blocks,
            total_tokens: s.total_tokens,
            working_blocks: s.working.block_count,
            short_term_blocks: s.short_term.block_count,
            long_term_blocks: s.long_term.block_count,
            stale_blocks: s.stale.block_count,
        }
    }
}

/// Logs per-operation timing, maintains daily rollups on disk, and takes
/// periodic point-in-time snapshots of the store/nexus state.
pub struct Stats {
    base_dir: PathBuf,
    performance_log: VecDeque<OperationRecord>,
    last_snapshot_at: Option<i64>,
}

impl Stats {
    pub fn open(base_dir: impl Into<PathBuf>) -> EngineResult<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(base_dir.join(DAILY_DIR))?;
        fs::create_dir_all(base_dir.join(SNAPSHOT_DIR))?;
        Ok(Self {
            base_dir,
            performance_log: VecDeque::new(),
            last_snapshot_at: None,
        })
    }

    /// Append an operation to the in-memory ring buffer and today's daily
    /// aggregate file.
    pub fn record_operation(
        &mut self,
        now: i64,
        duration_ms: u64,
        success: bool,
        config: &EngineConfig,
    ) -> EngineResult<()> {
        self.performance_log.push_back(OperationRecord { at: now, duration_ms, success });
        while self.performance_log.len() > config.performance_log_size {
            self.performance_log.pop_front();
        }
        self.update_daily_aggregate(now, duration_ms, success)
    }

    pub fn performance_log(&self) -> &VecDeque<OperationRecord> {
        &self.performance_log
    }

    /// Take a snapshot if `snapshot_interval_secs` has elapsed since the
    /// last one (or none has ever been taken).
    pub fn maybe_snapshot(
        &mut self,
        store_stats: &StoreStats,
        nexus_stats: &NexusStats,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<bool> {
        let due = match self.last_snapshot_at {
            None => true,
            Some(last) => now - last >= config.snapshot_interval_secs as i64,
        };
        if !due {
            return Ok(false);
        }

        let snapshot = Snapshot {
            taken_at: now,
            store: SnapshotStoreStats::from(store_stats),
            nexus: &NexusStatsWire::from(nexus_stats),
        };
        let path = self
            .base_dir
            .join(SNAPSHOT_DIR)
            .join(format!("snapshot_{now}.json"));
        fs::write(path, serde_json::to_string_pretty(&snapshot)?)?;
        self.last_snapshot_at = Some(now);
        Ok(true)
    }

    /// Delete daily/snapshot files older than `metrics_retention_days`.
    pub fn purge_expired(&self, now: i64, config: &EngineConfig) -> EngineResult<usize> {
        let retention_secs = i64::from(config.metrics_retention_days) * 86_400;
        let cutoff = now - retention_secs;
        let mut purged = 0;

        for (dir, extract_ts) in [
            (self.base_dir.join(DAILY_DIR), extract_daily_timestamp as fn(&str) -> Option<i64>),
            (self.base_dir.join(SNAPSHOT_DIR), extract_snapshot_timestamp as fn(&str) -> Option<i64>),
        ] {
            let Ok(entries) = fs::read_dir(&dir) else { continue };
            for entry in entries.flatten() {
                let name = entry.file_name();
                let Some(name) = name.to_str() else { continue };
                if extract_ts(name).is_some_and(|ts| ts < cutoff) {
                    fs::remove_file(entry.path())?;
                    purged += 1;
                }
            }
        }
        Ok(purged)
    }

    fn update_daily_aggregate(&self, now: i64, duration_ms: u64, success: bool) -> EngineResult<()> {
        let date = day_string(now);
        let path = self.base_dir.join(DAILY_DIR).join(format!("{date}.json"));

        let mut aggregate = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).unwrap_or_else(|_| DailyAggregate { date: date.clone(), ..Default::default() }),
            Err(_) => DailyAggregate { date: date.clone(), ..Default::default() },
        };
        aggregate.operation_count += 1;
        aggregate.total_duration_ms += duration_ms;
        if success {
            aggregate.success_count += 1;
        }

        let serialized = serde_json::to_string_pretty(&aggregate)?;
        let tmp_path = self.base_dir.join(DAILY_DIR).join(format!("{date}.json.tmp"));
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &path)?;
        Ok(())
    }
}

fn day_string(unix_secs: i64) -> String {
    chrono::DateTime::from_timestamp(unix_secs, 0)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

fn extract_daily_timestamp(file_name: &str) -> Option<i64> {
    let date_str = file_name.strip_suffix(".json")?;
    let naive = chrono::NaiveDate::parse_from_str(date_str, "%Y-%m-%d").ok()?;
    Some(naive.and_hms_opt(0, 0, 0)?.and_utc().timestamp())
}

fn extract_snapshot_timestamp(file_name: &str) -> Option<i64> {
    file_name
        .strip_prefix("snapshot_")
        .and_then(|s| s.strip_suffix(".json"))
        .and_then(|s| s.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryBlock, SignificanceType};
    use crate::store::Store;

    #[test]
    fn recorded_operations_fill_ring_buffer_and_evict_oldest() {
        let dir = tempfile::tempdir().unwrap();
        let mut stats = Stats::open(dir.path()).unwrap();
        let config = EngineConfig { performance_log_size: 2, ..EngineConfig::default() };

        for i in 0..5 {
            stats.record_operation(i, 10, true, &config).unwrap();
        }
        assert_eq!(stats.performance_log().len(), 2);
        assert_eq!(stats.performance_log().front().unwrap().at, 3);
    }

    #[test]
    fn daily_aggregate_accumulates_across_calls() {
        let dir = tempfile::tempdir().unwrap();
        let mut stats = Stats::open(dir.path()).unwrap();
        let config = EngineConfig::default();

        stats.record_operation(0, 10, true, &config).unwrap();
        stats.record_operation(60, 20, false, &config).unwrap();

        let path = dir.path().join(DAILY_DIR).join(format!("{}.json", day_string(0)));
        let raw = fs::read_to_string(path).unwrap();
        let agg: DailyAggregate = serde_json::from_str(&raw).unwrap();
        assert_eq!(agg.operation_count, 2);
        assert_eq!(agg.success_count, 1);
        assert_eq!(agg.total_duration_ms, 30);
    }

    #[test]
    fn snapshot_is_skipped_before_interval_elapses() {
        let dir = tempfile::tempdir().unwrap();
        let store_dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(store_dir.path()).unwrap();
        store
            .add(MemoryBlock::new("b1", "hello", 2, 0, SignificanceType::User))
            .unwrap();

        let mut stats = Stats::open(dir.path()).unwrap();
        let config = EngineConfig { snapshot_interval_secs: 3_600, ..EngineConfig::default() };
        let nexus_stats = NexusStats::default();

        assert!(stats.maybe_snapshot(&store.stats(), &nexus_stats, 0, &config).unwrap());
        assert!(!stats.maybe_snapshot(&store.stats(), &nexus_stats, 10, &config).unwrap());
        assert!(stats.maybe_snapshot(&store.stats(), &nexus_stats, 4_000, &config).unwrap());
    }

    #[test]
    fn purge_expired_removes_old_daily_files() {
        let dir = tempfile::tempdir().unwrap();
        let stats = Stats::open(dir.path()).unwrap();
        let old_path = dir.path().join(DAILY_DIR).join("2000-01-01.json");
        fs::write(&old_path, "{}").unwrap();

        let config = EngineConfig { metrics_retention_days: 1, ..EngineConfig::default() };
        let now = chrono::Utc::now().timestamp();
        let purged = stats.purge_expired(now, &config).unwrap();
        assert_eq!(purged, 1);
        assert!(!old_path.exists());
    }
}
