//! Nexus point management (spec §4.2).
//!
//! Access history and importance live outside the persisted document — they
//! are recomputed from scratch each process lifetime from the access pattern
//! observed going forward, not reconstructed from the store on load. Nexus
//! *flags* (`is_nexus`, `nexus_metadata`) are the only part of this that is
//! persisted, directly on the block record.

use std::collections::{HashMap, VecDeque};

use crate::error::EngineResult;
use crate::model::NexusMetadata;
use crate::store::Store;
use crate::EngineConfig;

/// Aggregate view over the current nexus set (spec §4.2 `get_nexus_stats`).
#[derive(Debug, Clone, Default)]
pub struct NexusStats {
    pub total_count: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub average_importance: f64,
}

/// Tracks per-block access history and importance, and drives nexus
/// admission/eviction against the store.
#[derive(Debug, Default)]
pub struct NexusManager {
    access_history: HashMap<String, VecDeque<i64>>,
    importance: HashMap<String, f64>,
}

impl NexusManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an access, recompute importance, and evaluate admission.
    pub fn register_access(
        &mut self,
        store: &mut Store,
        id: &str,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<()> {
        let deque = self.access_history.entry(id.to_string()).or_default();
        deque.push_back(now);
        while deque.len() > config.max_access_history {
            deque.pop_front();
        }
        let window_start = now - config.access_window_secs as i64;
        while deque.front().is_some_and(|t| *t < window_start) {
            deque.pop_front();
        }

        self.recompute_and_admit(store, id, now, config)
    }

    /// If `id` is currently a nexus, bump its importance by 0.1 (capped at
    /// 1.0) and rewrite its metadata. No-op otherwise.
    pub fn reinforce(&mut self, store: &mut Store, id: &str, now: i64) -> EngineResult<()> {
        let Some(mut block) = store.raw_get(id).cloned() else {
            return Ok(());
        };
        if !block.is_nexus {
            return Ok(());
        }
        let boosted = (self.importance.get(id).copied().unwrap_or(0.0) + 0.1).min(1.0);
        self.importance.insert(id.to_string(), boosted);

        let protection_level = block.significance.protection_level();
        block.nexus_metadata = Some(NexusMetadata {
            importance_score: boosted,
            protection_level,
            last_update: now,
        });
        store.update(block)
    }

    /// Maintenance sweep: clean stale timestamps, recompute importance, and
    /// re-evaluate admission for every tracked id.
    pub fn check_nexus_points(
        &mut self,
        store: &mut Store,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<()> {
        let ids: Vec<String> = self.access_history.keys().cloned().collect();
        for id in ids {
            let window_start = now - config.access_window_secs as i64;
            if let Some(deque) = self.access_history.get_mut(&id) {
                while deque.front().is_some_and(|t| *t < window_start) {
                    deque.pop_front();
                }
            }
            self.recompute_and_admit(store, &id, now, config)?;
        }
        Ok(())
    }

    /// All blocks currently flagged as nexus points, across every tier.
    pub fn get_nexus_points(&self, store: &Store) -> Vec<crate::model::MemoryBlock> {
        store.all().into_iter().filter(|b| b.is_nexus).collect()
    }

    pub fn get_nexus_stats(&self, store: &Store) -> NexusStats {
        let nexus_blocks = self.get_nexus_points(store);
        let mut stats = NexusStats {
            total_count: nexus_blocks.len(),
            ..NexusStats::default()
        };
        let mut importance_sum = 0.0;
        for block in &nexus_blocks {
            if let Some(meta) = &block.nexus_metadata {
                importance_sum += meta.importance_score;
                match meta.protection_level {
                    crate::model::ProtectionLevel::High => stats.high += 1,
                    crate::model::ProtectionLevel::Medium => stats.medium += 1,
                    crate::model::ProtectionLevel::Low => stats.low += 1,
                }
            }
        }
        stats.average_importance = if nexus_blocks.is_empty() {
            0.0
        } else {
            importance_sum / nexus_blocks.len() as f64
        };
        stats
    }

    /// The weighted importance formula from spec §4.2.
    fn compute_importance(&self, store: &Store, id: &str, now: i64, config: &EngineConfig) -> f64 {
        let Some(block) = store.raw_get(id) else {
            return 0.0;
        };

        let access_count_in_window = self
            .access_history
            .get(id)
            .map_or(0, std::collections::VecDeque::len) as f64;
        let frequency = (access_count_in_window / f64::from(config.min_access_count)).min(1.0);

        let recency = self
            .access_history
            .get(id)
            .and_then(|d| d.back())
            .map_or(0.0, |latest| {
                let age = (now - latest).max(0) as f64;
                1.0 / (1.0 + age / 3600.0)
            });

        let reference = (block.references.related_blocks.len() as f64 / 10.0).min(1.0);
        let significance_bonus = block.significance.nexus_bonus();

        0.4 * frequency + 0.3 * recency + 0.2 * reference + 0.1 * significance_bonus
    }

    fn recompute_and_admit(
        &mut self,
        store: &mut Store,
        id: &str,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<()> {
        let importance = self.compute_importance(store, id, now, config);
        self.importance.insert(id.to_string(), importance);
        self.evaluate_admission(store, id, importance, now, config)
    }

    /// Admit `id` as a nexus if eligible, evicting the weakest incumbent
    /// when the cap is already full (spec §4.2 admission rule).
    fn evaluate_admission(
        &mut self,
        store: &mut Store,
        id: &str,
        importance: f64,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<()> {
        if importance < config.nexus_threshold {
            return Ok(());
        }
        let Some(block) = store.raw_get(id).cloned() else {
            return Ok(());
        };
        if block.is_nexus {
            return Ok(());
        }

        let current_nexus = self.get_nexus_points(store);
        if current_nexus.len() < config.max_nexus_points {
            self.admit(store, id, importance, now)?;
            return Ok(());
        }

        let weakest = current_nexus.iter().min_by(|a, b| {
            let ia = a.nexus_metadata.as_ref().map_or(0.0, |m| m.importance_score);
            let ib = b.nexus_metadata.as_ref().map_or(0.0, |m| m.importance_score);
            ia.total_cmp(&ib)
        });

        if let Some(weakest) = weakest {
            let weakest_importance = weakest
                .nexus_metadata
                .as_ref()
                .map_or(0.0, |m| m.importance_score);
            if importance > weakest_importance {
                self.evict(store, &weakest.id)?;
                self.admit(store, id, importance, now)?;
            }
        }
        Ok(())
    }

    fn admit(&mut self, store: &mut Store, id: &str, importance: f64, now: i64) -> EngineResult<()> {
        let Some(mut block) = store.raw_get(id).cloned() else {
            return Ok(());
        };
        block.is_nexus = true;
        block.nexus_metadata = Some(NexusMetadata {
            importance_score: importance,
            protection_level: block.significance.protection_level(),
            last_update: now,
        });
        store.update(block)
    }

    fn evict(&mut self, store: &mut Store, id: &str) -> EngineResult<()> {
        let Some(mut block) = store.raw_get(id).cloned() else {
            return Ok(());
        };
        block.is_nexus = false;
        block.nexus_metadata = None;
        store.update(block)
    }
}
