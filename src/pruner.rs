//! Working-tier pruning and age-driven cascade demotion (spec §4.3).

use crate::error::EngineResult;
use crate::model::{placeholder_summary, MemoryBlock, References, Tier};
use crate::store::Store;
use crate::w3w::tokenize_w3w;
use crate::EngineConfig;

/// Stateless — every method takes the store and config it needs explicitly,
/// mirroring the rest of the engine's single-exclusive-lease discipline.
#[derive(Debug, Default)]
pub struct Pruner;

impl Pruner {
    pub fn new() -> Self {
        Self
    }

    /// Demote WORKING blocks until `token_sum` is back under
    /// `prune_threshold`, or `prune_batch_size` blocks have been demoted,
    /// whichever comes first. Returns the ids of blocks that were demoted.
    pub fn check_and_prune(
        &self,
        store: &mut Store,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<Vec<String>> {
        let mut demoted = Vec::new();
        if store.stats().working.token_sum <= config.prune_threshold {
            return Ok(demoted);
        }

        let min_age = config.min_age_for_pruning_secs as i64;
        let mut eligible: Vec<MemoryBlock> = store
            .get_tier(Tier::Working)
            .into_iter()
            .filter(|b| !b.is_nexus && b.age_secs(now) > min_age)
            .collect();

        eligible.sort_by(|a, b| {
            prune_priority(b, now, config).total_cmp(&prune_priority(a, now, config))
        });

        for block in eligible.into_iter().take(config.prune_batch_size) {
            self.demote(store, &block, now)?;
            demoted.push(block.id.clone());
            if store.stats().working.token_sum <= config.prune_threshold {
                break;
            }
        }

        Ok(demoted)
    }

    /// Move SHORT_TERM blocks older than `age_threshold` and under-accessed
    /// into LONG_TERM. Returns the ids moved.
    pub fn check_and_archive_short_term(
        &self,
        store: &mut Store,
        now: i64,
        age_threshold_secs: i64,
        config: &EngineConfig,
    ) -> EngineResult<Vec<String>> {
        self.cascade(store, Tier::ShortTerm, Tier::LongTerm, now, age_threshold_secs, config)
    }

    /// Move LONG_TERM blocks older than `age_threshold` and under-accessed
    /// into STALE. Returns the ids moved.
    pub fn check_and_archive_long_term(
        &self,
        store: &mut Store,
        now: i64,
        age_threshold_secs: i64,
        config: &EngineConfig,
    ) -> EngineResult<Vec<String>> {
        self.cascade(store, Tier::LongTerm, Tier::Stale, now, age_threshold_secs, config)
    }

    fn cascade(
        &self,
        store: &mut Store,
        from: Tier,
        to: Tier,
        now: i64,
        age_threshold_secs: i64,
        config: &EngineConfig,
    ) -> EngineResult<Vec<String>> {
        let candidates: Vec<String> = store
            .get_tier(from)
            .into_iter()
            .filter(|b| b.age_secs(now) > age_threshold_secs && b.access_count < config.min_access_count)
            .map(|b| b.id)
            .collect();

        for id in &candidates {
            store.move_tier(id, from, to)?;
        }
        Ok(candidates)
    }

    /// Demote a single WORKING block `S`: emit a summary stand-in block,
    /// attach `S`'s own w3w reference (spec §3: `w3w_reference` is empty
    /// only *before* a block's first demotion), then move `S` down a tier.
    fn demote(&self, store: &mut Store, source: &MemoryBlock, now: i64) -> EngineResult<()> {
        let tokens = tokenize_w3w(&source.content);
        let summary_id = format!("{}_summary", source.id);

        let mut related_blocks = vec![source.id.clone()];
        related_blocks.extend(source.references.related_blocks.iter().cloned());

        let mut summary_block = MemoryBlock::new(
            &summary_id,
            placeholder_summary(&tokens),
            tokens.len() as u64 + 2,
            now,
            source.significance,
        );
        summary_block.w3w_reference = tokens.to_vec();
        summary_block.references = References {
            keywords: source.references.keywords.clone(),
            related_blocks,
        };
        store.add(summary_block)?;

        let mut updated_source = source.clone();
        updated_source.w3w_reference = tokens.to_vec();
        store.update(updated_source)?;

        store.move_tier(&source.id, Tier::Working, Tier::ShortTerm)
    }
}

/// Prune-priority score (spec §4.3): higher evicts first.
fn prune_priority(block: &MemoryBlock, now: i64, config: &EngineConfig) -> f64 {
    let mut priority = 0.0;
    let age = block.age_secs(now);
    if age > 86_400 {
        priority += 0.6;
    } else if age > 3_600 {
        priority += 0.3;
    }
    if block.access_count < config.min_access_count {
        priority += 0.4;
    }
    priority += block.significance.prune_priority_adjustment();
    priority.clamp(0.0, 1.0)
}
