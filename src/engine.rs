//! Top-level engine API (spec §2, §6).
//!
//! `Engine` owns the store, the nexus manager, the pruner, the retriever and
//! the stats logger, and is the only thing calling code is expected to hold.
//! Every public method times itself and feeds the result to [`Stats`].

use tracing::instrument;

use crate::config::EngineConfig;
use crate::error::EngineResult;
use crate::model::{MemoryBlock, SignificanceType};
use crate::nexus::{NexusManager, NexusStats};
use crate::pruner::Pruner;
use crate::retriever::Retriever;
use crate::stats::Stats;
use crate::store::{Store, StoreStats};
use crate::w3w::tokenize_w3w;

/// Result of a [`Engine::maintain_system`] sweep.
#[derive(Debug, Clone, Default)]
pub struct MaintenanceReport {
    pub pruned: Vec<String>,
    pub archived_to_long_term: Vec<String>,
    pub archived_to_stale: Vec<String>,
    pub snapshot_taken: bool,
    pub purged_metrics_files: usize,
}

/// The hierarchical memory engine.
pub struct Engine {
    store: Store,
    nexus: NexusManager,
    pruner: Pruner,
    retriever: Retriever,
    stats: Stats,
    config: EngineConfig,
}

impl Engine {
    /// Open (or initialize) an engine rooted at `config.base_dir`.
    pub fn open(config: EngineConfig) -> EngineResult<Self> {
        let store = Store::open(&config.base_dir)?;
        let stats = Stats::open(&config.base_dir)?;
        Ok(Self {
            store,
            nexus: NexusManager::new(),
            pruner: Pruner::new(),
            retriever: Retriever::new(),
            stats,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Insert a new WORKING-tier block. `content` must be non-empty.
    #[instrument(skip(self, id, content, keywords))]
    pub fn add_memory(
        &mut self,
        id: impl Into<String>,
        content: impl Into<String>,
        significance: SignificanceType,
        keywords: impl IntoIterator<Item = String>,
        now: i64,
    ) -> EngineResult<MemoryBlock> {
        let started = now;
        let id = id.into();
        let content = content.into();
        let result = self.try_add_memory(id, content, significance, keywords, now);
        self.log_operation(started, now, result.is_ok())?;
        result
    }

    fn try_add_memory(
        &mut self,
        id: String,
        content: String,
        significance: SignificanceType,
        keywords: impl IntoIterator<Item = String>,
        now: i64,
    ) -> EngineResult<MemoryBlock> {
        if content.trim().is_empty() {
            return Err(crate::error::EngineError::input("content must not be empty"));
        }
        let tokens = content.split_whitespace().count() as u64;
        let mut block = MemoryBlock::new(id, content, tokens, now, significance);
        block.references.keywords = keywords.into_iter().map(|k| k.to_lowercase()).collect();

        self.store.add(block.clone())?;
        self.pruner.check_and_prune(&mut self.store, now, &self.config)?;
        Ok(block)
    }

    /// Rank and return blocks matching `query`, tracking access (and
    /// possibly promoting) every returned block.
    #[instrument(skip(self, query))]
    pub fn search_memory(
        &mut self,
        query: &str,
        include_archived: bool,
        now: i64,
    ) -> EngineResult<Vec<MemoryBlock>> {
        let result = self.retriever.search(
            &mut self.store,
            &mut self.nexus,
            query,
            include_archived,
            now,
            &self.config,
        );
        self.log_operation(now, now, result.is_ok())?;
        result
    }

    /// Blocks related to `id` by shared references, keywords, or w3w tokens.
    pub fn get_related_memories(&self, id: &str) -> EngineResult<Vec<MemoryBlock>> {
        self.retriever.get_related(&self.store, id)
    }

    /// Blocks whose `w3w_reference` matches every word in `words`.
    pub fn lookup_by_w3w(&mut self, words: &[String], now: i64) -> EngineResult<Vec<MemoryBlock>> {
        self.retriever
            .lookup_by_w3w(&mut self.store, &mut self.nexus, words, now, &self.config)
    }

    /// Fetch a single block by id, content-resolved for its current tier.
    pub fn get_memory_by_id(&self, id: &str) -> Option<MemoryBlock> {
        self.store.get_by_id(id)
    }

    pub fn get_nexus_points(&self) -> Vec<MemoryBlock> {
        self.nexus.get_nexus_points(&self.store)
    }

    pub fn get_nexus_stats(&self) -> NexusStats {
        self.nexus.get_nexus_stats(&self.store)
    }

    pub fn get_memory_stats(&self) -> StoreStats {
        self.store.stats()
    }

    /// Manual w3w computation, exposed for callers that want the tokens
    /// without going through a demotion (e.g. pre-indexing new content).
    pub fn compute_w3w(&self, content: &str) -> [String; 3] {
        tokenize_w3w(content)
    }

    /// Run the full maintenance sweep (spec §4.3, §4.5): prune WORKING,
    /// cascade-archive SHORT_TERM/LONG_TERM, re-evaluate nexus admission,
    /// snapshot, and purge expired metrics files.
    #[instrument(skip(self))]
    pub fn maintain_system(&mut self, now: i64) -> EngineResult<MaintenanceReport> {
        let mut report = MaintenanceReport::default();

        report.pruned = self.pruner.check_and_prune(&mut self.store, now, &self.config)?;
        report.archived_to_long_term = self.pruner.check_and_archive_short_term(
            &mut self.store,
            now,
            self.config.short_to_long_age_secs as i64,
            &self.config,
        )?;
        report.archived_to_stale = self.pruner.check_and_archive_long_term(
            &mut self.store,
            now,
            self.config.long_to_stale_age_secs as i64,
            &self.config,
        )?;

        self.nexus.check_nexus_points(&mut self.store, now, &self.config)?;
        self.retriever.clear_cache();

        let store_stats = self.store.stats();
        let nexus_stats = self.nexus.get_nexus_stats(&self.store);
        report.snapshot_taken = self
            .stats
            .maybe_snapshot(&store_stats, &nexus_stats, now, &self.config)?;
        report.purged_metrics_files = self.stats.purge_expired(now, &self.config)?;

        self.log_operation(now, now, true)?;
        Ok(report)
    }

    fn log_operation(&mut self, started: i64, now: i64, success: bool) -> EngineResult<()> {
        let duration_ms = (now - started).max(0) as u64;
        self.stats.record_operation(now, duration_ms, success, &self.config)
    }
}
