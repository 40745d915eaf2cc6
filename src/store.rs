//! Persistent tiered block store (spec §4.1).
//!
//! The whole store is one JSON document, rewritten atomically (write to a
//! temp file, then rename) on every mutation that persists. This is the
//! documented simplicity/durability trade-off (spec §3, §9): O(N) per
//! operation, never partially written.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{EngineError, EngineResult};
use crate::model::{MemoryBlock, Tier};

const STORE_FILE: &str = "memory_store.json";

fn tier_file_name(tier: Tier) -> &'static str {
    match tier {
        Tier::Working => "working.memory",
        Tier::ShortTerm => "short-term.memory",
        Tier::LongTerm => "long-term.memory",
        Tier::Stale => "stale.memory",
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct DocMetadata {
    last_update: i64,
    version: String,
    #[serde(default)]
    revision: u64,
}

impl Default for DocMetadata {
    fn default() -> Self {
        Self {
            last_update: 0,
            version: "1.0".to_string(),
            revision: 0,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreDocument {
    blocks: HashMap<String, MemoryBlock>,
    metadata: DocMetadata,
}

/// Per-tier aggregate returned by [`Store::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TierStats {
    pub block_count: usize,
    pub token_sum: u64,
}

/// Totals across all four tiers.
#[derive(Debug, Clone, Copy, Default)]
pub struct StoreStats {
    pub total_blocks: usize,
    pub total_tokens: u64,
    pub working: TierStats,
    pub short_term: TierStats,
    pub long_term: TierStats,
    pub stale: TierStats,
}

impl StoreStats {
    pub fn tier(&self, tier: Tier) -> TierStats {
        match tier {
            Tier::Working => self.working,
            Tier::ShortTerm => self.short_term,
            Tier::LongTerm => self.long_term,
            Tier::Stale => self.stale,
        }
    }
}

/// Owns the on-disk document and mediates every read/write against it.
pub struct Store {
    base_dir: PathBuf,
    doc: StoreDocument,
}

impl Store {
    /// Load the store from `base_dir`, reinitializing to an empty document
    /// if the file is missing or fails to parse (spec §7's documented
    /// `StorageError` recovery policy).
    pub fn open(base_dir: impl AsRef<Path>) -> EngineResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        fs::create_dir_all(&base_dir)?;

        let path = base_dir.join(STORE_FILE);
        let doc = match fs::read_to_string(&path) {
            Ok(raw) => match serde_json::from_str::<StoreDocument>(&raw) {
                Ok(doc) => doc,
                Err(err) => {
                    warn!(error = %err, path = %path.display(), "corrupt store document, reinitializing");
                    StoreDocument::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => StoreDocument::default(),
            Err(err) => {
                warn!(error = %err, path = %path.display(), "failed to read store document, reinitializing");
                StoreDocument::default()
            }
        };

        let mut store = Self { base_dir, doc };
        store.save()?;
        Ok(store)
    }

    /// Insert a new block. Fails if `block.id` already exists.
    pub fn add(&mut self, block: MemoryBlock) -> EngineResult<()> {
        if self.doc.blocks.contains_key(&block.id) {
            return Err(EngineError::invariant(format!(
                "block {} already exists",
                block.id
            )));
        }
        self.doc.blocks.insert(block.id.clone(), block);
        self.save()
    }

    /// Replace an existing block by id. Fails if absent.
    pub fn update(&mut self, block: MemoryBlock) -> EngineResult<()> {
        if !self.doc.blocks.contains_key(&block.id) {
            return Err(EngineError::invariant(format!(
                "block {} does not exist",
                block.id
            )));
        }
        self.doc.blocks.insert(block.id.clone(), block);
        self.save()
    }

    /// Raw lookup — returns the block exactly as stored, without resolving
    /// `content` to its display form.
    pub fn raw_get(&self, id: &str) -> Option<&MemoryBlock> {
        self.doc.blocks.get(id)
    }

    /// Lookup with `content` resolved to summary/placeholder per tier
    /// (spec §4.1 `get`/`get_memory_by_id` read semantics).
    pub fn get_by_id(&self, id: &str) -> Option<MemoryBlock> {
        self.doc.blocks.get(id).map(Self::present)
    }

    /// All blocks in `tier`, content-resolved.
    pub fn get_tier(&self, tier: Tier) -> Vec<MemoryBlock> {
        self.doc
            .blocks
            .values()
            .filter(|b| b.tier == tier)
            .map(Self::present)
            .collect()
    }

    /// All blocks across every tier, content-resolved.
    pub fn all(&self) -> Vec<MemoryBlock> {
        self.doc.blocks.values().map(Self::present).collect()
    }

    fn present(block: &MemoryBlock) -> MemoryBlock {
        let mut out = block.clone();
        out.content = block.display_content();
        out
    }

    /// Flip `id`'s tier from `from` to `to`. Verifies the block is currently
    /// in `from` (spec §5's "observed step by step" ordering guarantee relies
    /// on the caller driving each hop individually). Synthesizes a summary
    /// placeholder from `w3w_reference` when demoting out of WORKING with no
    /// summary already attached (spec §4.1).
    pub fn move_tier(&mut self, id: &str, from: Tier, to: Tier) -> EngineResult<()> {
        let block = self
            .doc
            .blocks
            .get_mut(id)
            .ok_or_else(|| EngineError::invariant(format!("block {id} does not exist")))?;

        if block.tier != from {
            return Err(EngineError::invariant(format!(
                "block {id} is in tier {:?}, not {:?}",
                block.tier, from
            )));
        }

        block.tier = to;
        if from == Tier::Working && to != Tier::Working && block.summary.is_none() {
            block.summary = Some(crate::model::placeholder_summary(&block.w3w_reference));
        }

        self.save()
    }

    /// Per-tier and total counts/token sums (spec §4.1 `stats`).
    pub fn stats(&self) -> StoreStats {
        let mut stats = StoreStats::default();
        for block in self.doc.blocks.values() {
            stats.total_blocks += 1;
            stats.total_tokens += block.tokens;
            let tier_stats = match block.tier {
                Tier::Working => &mut stats.working,
                Tier::ShortTerm => &mut stats.short_term,
                Tier::LongTerm => &mut stats.long_term,
                Tier::Stale => &mut stats.stale,
            };
            tier_stats.block_count += 1;
            tier_stats.token_sum += block.tokens;
        }
        stats
    }

    fn save(&mut self) -> EngineResult<()> {
        self.doc.metadata.revision += 1;
        self.doc.metadata.version = format!("1.{}", self.doc.metadata.revision);
        self.doc.metadata.last_update = chrono::Utc::now().timestamp();

        let serialized = serde_json::to_string_pretty(&self.doc)?;
        let path = self.base_dir.join(STORE_FILE);
        let tmp_path = self.base_dir.join(format!("{STORE_FILE}.tmp"));
        fs::write(&tmp_path, serialized)?;
        fs::rename(&tmp_path, &path)?;

        for tier in Tier::all() {
            let legacy_path = self.base_dir.join(tier_file_name(tier));
            if !legacy_path.exists() {
                fs::write(&legacy_path, "{}")?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SignificanceType;

    fn block(id: &str, tier: Tier) -> MemoryBlock {
        let mut b = MemoryBlock::new(id, "hello world", 3, 0, SignificanceType::User);
        b.tier = tier;
        b
    }

    #[test]
    fn add_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.add(block("b1", Tier::Working)).unwrap();

        let got = store.get_by_id("b1").unwrap();
        assert_eq!(got.content, "hello world");
    }

    #[test]
    fn add_duplicate_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.add(block("b1", Tier::Working)).unwrap();
        assert!(store.add(block("b1", Tier::Working)).is_err());
    }

    #[test]
    fn update_missing_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        assert!(store.update(block("ghost", Tier::Working)).is_err());
    }

    #[test]
    fn move_tier_synthesizes_placeholder_summary() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut b = block("b1", Tier::Working);
        b.w3w_reference = vec!["quick".into(), "brown".into(), "fox".into()];
        store.add(b).unwrap();

        store.move_tier("b1", Tier::Working, Tier::ShortTerm).unwrap();
        let got = store.get_by_id("b1").unwrap();
        assert_eq!(got.content, "Summary: quick • brown • fox");
    }

    #[test]
    fn move_tier_wrong_from_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.add(block("b1", Tier::Working)).unwrap();
        assert!(store.move_tier("b1", Tier::LongTerm, Tier::Stale).is_err());
    }

    #[test]
    fn stats_reflect_per_tier_counts_and_tokens() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store.add(block("b1", Tier::Working)).unwrap();
        store.add(block("b2", Tier::Working)).unwrap();
        store.add(block("b3", Tier::Stale)).unwrap();

        let stats = store.stats();
        assert_eq!(stats.total_blocks, 3);
        assert_eq!(stats.working.block_count, 2);
        assert_eq!(stats.stale.block_count, 1);
        assert_eq!(stats.working.token_sum, 6);
    }

    #[test]
    fn reopening_store_preserves_contents() {
        let dir = tempfile::tempdir().unwrap();
        {
            let mut store = Store::open(dir.path()).unwrap();
            store.add(block("b1", Tier::Working)).unwrap();
        }
        let store = Store::open(dir.path()).unwrap();
        assert!(store.get_by_id("b1").is_some());
    }

    #[test]
    fn corrupt_document_reinitializes_instead_of_failing() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(STORE_FILE), "not json").unwrap();
        let store = Store::open(dir.path()).unwrap();
        assert_eq!(store.stats().total_blocks, 0);
    }

    #[test]
    fn legacy_tier_touch_files_are_written() {
        let dir = tempfile::tempdir().unwrap();
        let _store = Store::open(dir.path()).unwrap();
        for tier in Tier::all() {
            assert!(dir.path().join(tier_file_name(tier)).exists());
        }
    }
}
