//! Core data model: [`MemoryBlock`] and its constituent types.
//!
//! The wire format (§6 of the spec) represents tier membership as four
//! independent booleans (`status.working`, `status.short_term`, ...). Modeling
//! that directly in memory would let the one-hot invariant be violated by
//! construction, so in-memory the tier is a single tagged [`Tier`]; the
//! boolean shape is produced only at the serde boundary via [`StatusFlags`].

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// One of the four tiers a block can occupy. Exactly one at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Working,
    ShortTerm,
    LongTerm,
    Stale,
}

impl Tier {
    /// WORKING=0, SHORT_TERM=1, LONG_TERM=2, STALE=3 — used by the
    /// "tier index never increases within a single search" law (spec §8).
    pub const fn index(self) -> u8 {
        match self {
            Self::Working => 0,
            Self::ShortTerm => 1,
            Self::LongTerm => 2,
            Self::Stale => 3,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Working => "working",
            Self::ShortTerm => "short_term",
            Self::LongTerm => "long_term",
            Self::Stale => "stale",
        }
    }

    /// The tier one step closer to WORKING, if any.
    pub const fn promoted(self) -> Option<Self> {
        match self {
            Self::Working => None,
            Self::ShortTerm => Some(Self::Working),
            Self::LongTerm => Some(Self::ShortTerm),
            Self::Stale => Some(Self::LongTerm),
        }
    }

    /// The tier one step further from WORKING, if any.
    pub const fn demoted(self) -> Option<Self> {
        match self {
            Self::Working => Some(Self::ShortTerm),
            Self::ShortTerm => Some(Self::LongTerm),
            Self::LongTerm => Some(Self::Stale),
            Self::Stale => None,
        }
    }

    pub const fn all() -> [Self; 4] {
        [Self::Working, Self::ShortTerm, Self::LongTerm, Self::Stale]
    }

    pub const fn archived() -> [Self; 3] {
        [Self::ShortTerm, Self::LongTerm, Self::Stale]
    }
}

/// Declared origin of a block, used for nexus admission bonuses and prune-priority
/// penalties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SignificanceType {
    System,
    User,
    Llm,
    Derived,
}

impl SignificanceType {
    /// The `significance_bonus` term in the nexus importance formula (spec §4.2).
    pub const fn nexus_bonus(self) -> f64 {
        match self {
            Self::System => 0.3,
            Self::User => 0.2,
            Self::Llm => 0.1,
            Self::Derived => 0.0,
        }
    }

    /// Protection level assignment (spec §4.2): significance alone decides it.
    pub const fn protection_level(self) -> ProtectionLevel {
        match self {
            Self::System | Self::User => ProtectionLevel::High,
            Self::Llm | Self::Derived => ProtectionLevel::Medium,
        }
    }

    /// Prune-priority adjustment for this significance (spec §4.3).
    pub const fn prune_priority_adjustment(self) -> f64 {
        match self {
            Self::System => -0.3,
            Self::User => -0.2,
            Self::Llm | Self::Derived => 0.0,
        }
    }
}

/// Protection tag attached to nexus metadata. `Low` is reserved — the
/// current admission rule (spec §4.2) never issues it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtectionLevel {
    High,
    Medium,
    Low,
}

/// Present only when `is_nexus` is true.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NexusMetadata {
    pub importance_score: f64,
    pub protection_level: ProtectionLevel,
    pub last_update: i64,
}

/// Outbound/inbound reference bundle for a block.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct References {
    pub keywords: HashSet<String>,
    /// Order-preserving: demotion's summary-block invariant (spec §3, invariant 4)
    /// requires `related_blocks[0]` to be the demoted source id, so this cannot be
    /// a plain unordered set despite spec §3 calling it one.
    pub related_blocks: Vec<String>,
}

impl References {
    pub fn push_related(&mut self, id: impl Into<String>) {
        let id = id.into();
        if !self.related_blocks.contains(&id) {
            self.related_blocks.push(id);
        }
    }
}

/// The sole entity in the store (spec §3).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "WireRecord", into = "WireRecord")]
pub struct MemoryBlock {
    pub id: String,
    pub content: String,
    pub tokens: u64,
    pub timestamp: i64,
    pub significance: SignificanceType,
    pub tier: Tier,
    pub is_nexus: bool,
    pub access_count: u32,
    pub w3w_reference: Vec<String>,
    pub references: References,
    pub nexus_metadata: Option<NexusMetadata>,
    /// Set on demotion; absent while the block is still WORKING with its
    /// original content.
    pub summary: Option<String>,
}

impl MemoryBlock {
    pub fn new(id: impl Into<String>, content: impl Into<String>, tokens: u64, timestamp: i64, significance: SignificanceType) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            tokens,
            timestamp,
            significance,
            tier: Tier::Working,
            is_nexus: false,
            access_count: 0,
            w3w_reference: Vec::new(),
            references: References::default(),
            nexus_metadata: None,
            summary: None,
        }
    }

    /// Content as read back through the store: the summary once demoted
    /// (spec §3, invariant 3), a synthesized placeholder if demoted but no
    /// summary was ever attached, or the original content while WORKING.
    pub fn display_content(&self) -> String {
        if self.tier == Tier::Working {
            return self.content.clone();
        }
        match &self.summary {
            Some(s) => s.clone(),
            None => placeholder_summary(&self.w3w_reference),
        }
    }

    pub fn age_secs(&self, now: i64) -> i64 {
        (now - self.timestamp).max(0)
    }
}

/// `"Summary: " + join(w3w, " • ")` — the placeholder form used both by the
/// Pruner when it first demotes a block and by the Store when a demoted
/// block somehow lacks a summary (spec §4.1, §4.3).
pub fn placeholder_summary(w3w: &[String]) -> String {
    format!("Summary: {}", w3w.join(" • "))
}

/// On-disk shape of a block (spec §6). One-hot `status` booleans are derived
/// from / collapsed into [`Tier`] at the serde boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct WireRecord {
    id: String,
    content: String,
    tokens: u64,
    timestamp: i64,
    significance_type: SignificanceType,
    status: StatusFlags,
    is_nexus: bool,
    access_count: u32,
    #[serde(default)]
    w3w_reference: Vec<String>,
    #[serde(default)]
    references: References,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    nexus_metadata: Option<NexusMetadata>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    summary: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
struct StatusFlags {
    #[serde(default)]
    working: bool,
    #[serde(default)]
    short_term: bool,
    #[serde(default)]
    long_term: bool,
    #[serde(default)]
    stale: bool,
}

impl From<Tier> for StatusFlags {
    fn from(tier: Tier) -> Self {
        let mut flags = Self::default();
        match tier {
            Tier::Working => flags.working = true,
            Tier::ShortTerm => flags.short_term = true,
            Tier::LongTerm => flags.long_term = true,
            Tier::Stale => flags.stale = true,
        }
        flags
    }
}

impl TryFrom<StatusFlags> for Tier {
    type Error = String;

    fn try_from(flags: StatusFlags) -> Result<Self, Self::Error> {
        let set: Vec<Tier> = [
            (flags.working, Tier::Working),
            (flags.short_term, Tier::ShortTerm),
            (flags.long_term, Tier::LongTerm),
            (flags.stale, Tier::Stale),
        ]
        .into_iter()
        .filter_map(|(on, t)| on.then_some(t))
        .collect();

        match set.as_slice() {
            [tier] => Ok(*tier),
            [] => Err("status has no tier flag set".to_string()),
            _ => Err("status has more than one tier flag set".to_string()),
        }
    }
}

impl From<MemoryBlock> for WireRecord {
    fn from(block: MemoryBlock) -> Self {
        Self {
            id: block.id,
            content: block.content,
            tokens: block.tokens,
            timestamp: block.timestamp,
            significance_type: block.significance,
            status: block.tier.into(),
            is_nexus: block.is_nexus,
            access_count: block.access_count,
            w3w_reference: block.w3w_reference,
            references: block.references,
            nexus_metadata: block.nexus_metadata,
            summary: block.summary,
        }
    }
}

impl TryFrom<WireRecord> for MemoryBlock {
    type Error = String;

    fn try_from(wire: WireRecord) -> Result<Self, Self::Error> {
        Ok(Self {
            id: wire.id,
            content: wire.content,
            tokens: wire.tokens,
            timestamp: wire.timestamp,
            significance: wire.significance_type,
            tier: Tier::try_from(wire.status)?,
            is_nexus: wire.is_nexus,
            access_count: wire.access_count,
            w3w_reference: wire.w3w_reference,
            references: wire.references,
            nexus_metadata: wire.nexus_metadata,
            summary: wire.summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_indices_are_monotone_by_distance_from_working() {
        assert!(Tier::Working.index() < Tier::ShortTerm.index());
        assert!(Tier::ShortTerm.index() < Tier::LongTerm.index());
        assert!(Tier::LongTerm.index() < Tier::Stale.index());
    }

    #[test]
    fn round_trips_through_one_hot_status() {
        let block = MemoryBlock::new("b1", "hello", 5, 0, SignificanceType::User);
        let json = serde_json::to_string(&block).unwrap();
        assert!(json.contains("\"working\":true"));
        assert!(json.contains("\"short_term\":false"));

        let back: MemoryBlock = serde_json::from_str(&json).unwrap();
        assert_eq!(back, block);
    }

    #[test]
    fn rejects_non_one_hot_status() {
        let bad = r#"{
            "id":"b1","content":"x","tokens":1,"timestamp":0,
            "significance_type":"USER",
            "status":{"working":true,"short_term":true,"long_term":false,"stale":false},
            "is_nexus":false,"access_count":0
        }"#;
        let result: Result<MemoryBlock, _> = serde_json::from_str(bad);
        assert!(result.is_err());
    }

    #[test]
    fn display_content_uses_summary_once_demoted() {
        let mut block = MemoryBlock::new("b1", "original", 5, 0, SignificanceType::User);
        assert_eq!(block.display_content(), "original");

        block.tier = Tier::ShortTerm;
        block.summary = Some("Summary: a • b • c".to_string());
        assert_eq!(block.display_content(), "Summary: a • b • c");
    }

    #[test]
    fn display_content_falls_back_to_placeholder() {
        let mut block = MemoryBlock::new("b1", "original", 5, 0, SignificanceType::User);
        block.tier = Tier::ShortTerm;
        block.w3w_reference = vec!["a".into(), "b".into(), "c".into()];
        assert_eq!(block.display_content(), "Summary: a • b • c");
    }

    #[test]
    fn push_related_deduplicates_while_preserving_order() {
        let mut refs = References::default();
        refs.push_related("a");
        refs.push_related("b");
        refs.push_related("a");
        assert_eq!(refs.related_blocks, vec!["a".to_string(), "b".to_string()]);
    }
}
