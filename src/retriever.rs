//! Lexical retrieval, result caching, and access-driven promotion (spec §4.4).

use std::collections::HashMap;

use crate::error::{EngineError, EngineResult};
use crate::model::{MemoryBlock, Tier};
use crate::nexus::NexusManager;
use crate::store::Store;
use crate::EngineConfig;

type CacheKey = (String, bool);
type CacheEntry = (i64, Vec<String>);

/// Scores and ranks blocks against free-text queries, and tracks accesses so
/// repeated retrieval of the same block can promote it toward WORKING.
#[derive(Debug, Default)]
pub struct Retriever {
    cache: HashMap<CacheKey, CacheEntry>,
    promotion_counter: HashMap<(Tier, String), u32>,
}

impl Retriever {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Rank candidates against `query`, access-tracking and (if warranted)
    /// promoting every returned block.
    pub fn search(
        &mut self,
        store: &mut Store,
        nexus: &mut NexusManager,
        query: &str,
        include_archived: bool,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<Vec<MemoryBlock>> {
        if query.trim().is_empty() {
            return Err(EngineError::input("search query must not be empty"));
        }

        let key: CacheKey = (query.to_lowercase(), include_archived);
        let ids = if let Some((cached_at, ids)) = self.cache.get(&key) {
            if now - cached_at < config.cache_duration_secs as i64 {
                ids.clone()
            } else {
                self.rank(store, query, include_archived, now, config)
            }
        } else {
            self.rank(store, query, include_archived, now, config)
        };
        self.cache.insert(key, (now, ids.clone()));

        self.track_and_collect(store, nexus, &ids, now, config)
    }

    /// All blocks whose `w3w_reference` contains every query word as a
    /// substring of at least one entry.
    pub fn lookup_by_w3w(
        &mut self,
        store: &mut Store,
        nexus: &mut NexusManager,
        words: &[String],
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<Vec<MemoryBlock>> {
        if words.is_empty() {
            return Err(EngineError::input("w3w lookup words must not be empty"));
        }
        let lower_words: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

        let ids: Vec<String> = store
            .all()
            .into_iter()
            .filter(|b| {
                lower_words
                    .iter()
                    .all(|qw| b.w3w_reference.iter().any(|entry| entry.contains(qw.as_str())))
            })
            .map(|b| b.id)
            .collect();

        self.track_and_collect(store, nexus, &ids, now, config)
    }

    /// Blocks related to `id` via shared `related_blocks`, >=2 shared
    /// keywords, or >=1 shared w3w entry. One hop only (spec §9: no
    /// transitive closure, cycles are not walked).
    pub fn get_related(&self, store: &Store, id: &str) -> EngineResult<Vec<MemoryBlock>> {
        let source = store
            .get_by_id(id)
            .ok_or_else(|| EngineError::input(format!("unknown block id: {id}")))?;

        let related = store
            .all()
            .into_iter()
            .filter(|candidate| candidate.id != source.id)
            .filter(|candidate| {
                source.references.related_blocks.contains(&candidate.id)
                    || shared_count(&source.references.keywords, &candidate.references.keywords) >= 2
                    || shared_w3w(&source.w3w_reference, &candidate.w3w_reference) >= 1
            })
            .collect();
        Ok(related)
    }

    fn rank(
        &self,
        store: &Store,
        query: &str,
        include_archived: bool,
        now: i64,
        config: &EngineConfig,
    ) -> Vec<String> {
        let mut tiers = vec![Tier::Working];
        if include_archived {
            tiers.extend(Tier::archived());
        }

        let query_words: Vec<String> = query
            .to_lowercase()
            .split_whitespace()
            .map(str::to_string)
            .collect();

        let mut scored: Vec<(f64, MemoryBlock)> = tiers
            .into_iter()
            .flat_map(|t| store.get_tier(t))
            .map(|block| (relevance(&block, query, &query_words, now), block))
            .filter(|(score, _)| *score >= config.similarity_threshold)
            .collect();

        scored.sort_by(|a, b| b.0.total_cmp(&a.0));
        scored
            .into_iter()
            .take(config.max_results)
            .map(|(_, b)| b.id)
            .collect()
    }

    fn track_and_collect(
        &mut self,
        store: &mut Store,
        nexus: &mut NexusManager,
        ids: &[String],
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<Vec<MemoryBlock>> {
        let mut results = Vec::with_capacity(ids.len());
        for id in ids {
            let Some(mut raw) = store.raw_get(id).cloned() else {
                continue;
            };
            let tier = raw.tier;
            raw.access_count += 1;
            store.update(raw)?;

            nexus.register_access(store, id, now, config)?;
            self.maybe_promote(store, tier, id, now, config)?;

            if let Some(current) = store.get_by_id(id) {
                results.push(current);
            }
        }
        Ok(results)
    }

    fn maybe_promote(
        &mut self,
        store: &mut Store,
        tier: Tier,
        id: &str,
        now: i64,
        config: &EngineConfig,
    ) -> EngineResult<()> {
        if tier == Tier::Working {
            return Ok(());
        }

        let key = (tier, id.to_string());
        let count = self.promotion_counter.entry(key.clone()).or_insert(0);
        *count += 1;

        if *count >= config.promotion_threshold {
            self.promotion_counter.remove(&key);

            let mut current = tier;
            while let Some(next) = current.promoted() {
                store.move_tier(id, current, next)?;
                current = next;
            }

            // Adopted resolution of spec §9's open question: reset the
            // persisted access_count on promotion, independent of this
            // in-memory debouncer.
            if let Some(mut block) = store.raw_get(id).cloned() {
                block.access_count = 0;
                store.update(block)?;
            }

            let _ = now; // last_update on nexus metadata is untouched by promotion itself
        }
        Ok(())
    }
}

/// Combined relevance score (spec §4.4): all six weighted terms.
fn relevance(block: &MemoryBlock, query: &str, query_words: &[String], now: i64) -> f64 {
    let content_sim = ratcliff_obershelp_ratio(&query.to_lowercase(), &block.content.to_lowercase());

    let keyword_score = if query_words.is_empty() || block.references.keywords.is_empty() {
        0.0
    } else {
        let hits = query_words
            .iter()
            .filter(|w| block.references.keywords.contains(w.as_str()))
            .count();
        hits as f64 / query_words.len() as f64
    };

    let w3w_score = if block.w3w_reference.is_empty() {
        0.0
    } else {
        let hits = block
            .w3w_reference
            .iter()
            .filter(|entry| query_words.iter().any(|qw| entry.contains(qw.as_str())))
            .count();
        hits as f64 / 3.0
    };

    let nexus_bonus = if block.is_nexus { 0.2 } else { 0.0 };

    let age_days = block.age_secs(now) as f64 / 86_400.0;
    let recency = 1.0 / (1.0 + age_days);

    let tier_bonus = match block.tier {
        Tier::Working => 0.2,
        Tier::ShortTerm => 0.1,
        Tier::LongTerm => 0.05,
        Tier::Stale => 0.0,
    };

    0.4 * content_sim
        + 0.2 * keyword_score
        + 0.1 * w3w_score
        + 0.1 * nexus_bonus
        + 0.1 * recency
        + 0.1 * tier_bonus
}

fn shared_count(a: &std::collections::HashSet<String>, b: &std::collections::HashSet<String>) -> usize {
    a.intersection(b).count()
}

fn shared_w3w(a: &[String], b: &[String]) -> usize {
    a.iter().filter(|x| b.contains(x)).count()
}

/// Ratcliff/Obershelp-style normalized similarity: `2*M / T`, where `M` is
/// the total length of recursively-found longest common substrings and `T`
/// is the combined length of both strings. Equivalent to the algorithm
/// behind Python's `difflib.SequenceMatcher.ratio()`.
fn ratcliff_obershelp_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    let matched = matching_length(&a, &b);
    2.0 * matched as f64 / total as f64
}

fn matching_length(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let (len, ai, bi) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }
    len + matching_length(&a[..ai], &b[..bi]) + matching_length(&a[ai + len..], &b[bi + len..])
}

fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut dp = vec![vec![0usize; b.len() + 1]; a.len() + 1];
    let mut best = (0, 0, 0);
    for i in 1..=a.len() {
        for j in 1..=b.len() {
            if a[i - 1] == b[j - 1] {
                dp[i][j] = dp[i - 1][j - 1] + 1;
                if dp[i][j] > best.0 {
                    best = (dp[i][j], i - dp[i][j], j - dp[i][j]);
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MemoryBlock, SignificanceType};

    #[test]
    fn ratio_of_identical_strings_is_one() {
        assert!((ratcliff_obershelp_ratio("quick fox", "quick fox") - 1.0).abs() < 1e-9);
    }

    #[test]
    fn ratio_of_disjoint_strings_is_zero() {
        assert!(ratcliff_obershelp_ratio("abc", "xyz") < 1e-9);
    }

    #[test]
    fn ratio_rewards_partial_overlap() {
        let r = ratcliff_obershelp_ratio("quick fox", "the quick brown fox jumps");
        assert!(r > 0.0 && r < 1.0);
    }

    #[test]
    fn search_rejects_empty_query() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut nexus = NexusManager::new();
        let mut retriever = Retriever::new();
        let config = EngineConfig::default();
        let err = retriever
            .search(&mut store, &mut nexus, "   ", true, 0, &config)
            .unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn search_finds_matching_block() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        store
            .add(MemoryBlock::new(
                "b1",
                "The quick brown fox jumps over the lazy dog",
                9,
                0,
                SignificanceType::User,
            ))
            .unwrap();

        let mut nexus = NexusManager::new();
        let mut retriever = Retriever::new();
        let config = EngineConfig::default();
        let results = retriever
            .search(&mut store, &mut nexus, "quick fox", true, 0, &config)
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(results[0].content.contains("quick brown fox"));
    }

    #[test]
    fn repeated_search_promotes_block_up_tiers() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut block = MemoryBlock::new(
            "long1",
            "ancient wisdom handed down through generations",
            6,
            0,
            SignificanceType::User,
        );
        block.tier = Tier::LongTerm;
        block.references.keywords.insert("ancient".to_string());
        block.references.keywords.insert("wisdom".to_string());
        store.add(block).unwrap();

        let mut nexus = NexusManager::new();
        let mut retriever = Retriever::new();
        let config = EngineConfig { promotion_threshold: 2, similarity_threshold: 0.05, ..EngineConfig::default() };

        for _ in 0..2 {
            retriever
                .search(&mut store, &mut nexus, "ancient wisdom", true, 0, &config)
                .unwrap();
        }

        assert_eq!(store.get_by_id("long1").unwrap().tier, Tier::Working);
    }

    #[test]
    fn lookup_by_w3w_matches_substring() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut block = MemoryBlock::new("b1", "x", 1, 0, SignificanceType::User);
        block.tier = Tier::ShortTerm;
        block.w3w_reference = vec!["quick".into(), "brown".into(), "fox".into()];
        store.add(block).unwrap();

        let mut nexus = NexusManager::new();
        let mut retriever = Retriever::new();
        let config = EngineConfig::default();
        let results = retriever
            .lookup_by_w3w(&mut store, &mut nexus, &["qui".to_string()], 0, &config)
            .unwrap();
        assert_eq!(results.len(), 1);
    }

    #[test]
    fn lookup_by_w3w_rejects_empty_words() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();
        let mut nexus = NexusManager::new();
        let mut retriever = Retriever::new();
        let config = EngineConfig::default();
        let err = retriever
            .lookup_by_w3w(&mut store, &mut nexus, &[], 0, &config)
            .unwrap_err();
        assert!(err.is_input());
    }

    #[test]
    fn get_related_matches_on_shared_keywords() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(dir.path()).unwrap();

        let mut first = MemoryBlock::new("b1", "one", 1, 0, SignificanceType::User);
        first.references.keywords.insert("test".to_string());
        first.references.keywords.insert("reference".to_string());
        store.add(first).unwrap();

        let mut second = MemoryBlock::new("b2", "two", 1, 0, SignificanceType::User);
        second.references.keywords.insert("test".to_string());
        second.references.keywords.insert("reference".to_string());
        store.add(second).unwrap();

        let retriever = Retriever::new();
        let related = retriever.get_related(&store, "b1").unwrap();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].id, "b2");
    }

    #[test]
    fn get_related_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path()).unwrap();
        let retriever = Retriever::new();
        assert!(retriever.get_related(&store, "ghost").is_err());
    }
}
