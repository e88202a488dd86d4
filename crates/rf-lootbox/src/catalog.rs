//! Reward entries and catalogs
//!
//! A [`RewardCatalog`] is the ordered set of candidate rewards for one
//! lootbox. Entries are only ever mutated through
//! [`ChanceAllocator`](crate::allocator::ChanceAllocator), which keeps the
//! weights summing to 100 between mutations.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Tolerance used when comparing weight sums
pub const WEIGHT_EPSILON: f64 = 1e-6;

/// Total weight of a settled catalog (weights are percentages)
pub const TOTAL_WEIGHT: f64 = 100.0;

// ═══════════════════════════════════════════════════════════════════════════════
// IDENTIFIERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Identifies whoever opens a lootbox
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequesterId(pub String);

/// Identifies a lootbox catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogId(pub String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(RequesterId);
string_id!(CatalogId);

// ═══════════════════════════════════════════════════════════════════════════════
// ENTRIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Rarity tier (display only, never affects the draw)
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum RarityTier {
    #[default]
    Common = 0,
    Uncommon = 1,
    Rare = 2,
    Epic = 3,
    Legendary = 4,
}

impl RarityTier {
    pub const ALL: [RarityTier; 5] = [
        Self::Common,
        Self::Uncommon,
        Self::Rare,
        Self::Epic,
        Self::Legendary,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Common => "Common",
            Self::Uncommon => "Uncommon",
            Self::Rare => "Rare",
            Self::Epic => "Epic",
            Self::Legendary => "Legendary",
        }
    }
}

/// What a reward grants. The engine never looks inside.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RewardPayload {
    /// A physical item handed to the requester
    Item {
        material: String,
        amount: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        display_name: Option<String>,
    },
    /// An action executed on the requester's behalf
    Command { command: String },
}

impl RewardPayload {
    /// Shorthand for a single unnamed item
    pub fn item(material: impl Into<String>, amount: u32) -> Self {
        Self::Item {
            material: material.into(),
            amount,
            display_name: None,
        }
    }

    pub fn command(command: impl Into<String>) -> Self {
        Self::Command {
            command: command.into(),
        }
    }
}

/// One candidate outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardEntry {
    /// Unique within its catalog
    pub id: String,
    /// Display tier
    #[serde(default)]
    pub rarity: RarityTier,
    /// What is granted
    pub payload: RewardPayload,
    /// Chance in percent, assigned by the allocator
    weight: f64,
    /// Pinned by an operator rather than auto-computed
    #[serde(default)]
    weight_is_manual: bool,
}

impl RewardEntry {
    /// Create an entry that has not been placed in a catalog yet.
    ///
    /// The weight stays at zero until the allocator assigns one.
    pub fn new(id: impl Into<String>, rarity: RarityTier, payload: RewardPayload) -> Self {
        Self {
            id: id.into(),
            rarity,
            payload,
            weight: 0.0,
            weight_is_manual: false,
        }
    }

    pub fn weight(&self) -> f64 {
        self.weight
    }

    pub fn is_manual(&self) -> bool {
        self.weight_is_manual
    }

    pub(crate) fn set_auto_weight(&mut self, weight: f64) {
        self.weight = weight;
        self.weight_is_manual = false;
    }

    pub(crate) fn set_manual_weight(&mut self, weight: f64) {
        self.weight = weight;
        self.weight_is_manual = true;
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CATALOG
// ═══════════════════════════════════════════════════════════════════════════════

/// The reward pool of one lootbox, in insertion order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RewardCatalog {
    id: CatalogId,
    entries: Vec<RewardEntry>,
}

impl RewardCatalog {
    /// Create an empty catalog
    pub fn new(id: impl Into<CatalogId>) -> Self {
        Self {
            id: id.into(),
            entries: Vec::new(),
        }
    }

    pub fn id(&self) -> &CatalogId {
        &self.id
    }

    /// Entries in insertion order
    pub fn entries(&self) -> &[RewardEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&RewardEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Live sum of all weights
    pub fn total_weight(&self) -> f64 {
        self.entries.iter().map(|e| e.weight).sum()
    }

    /// Sum of operator-pinned weights
    pub fn manual_weight(&self) -> f64 {
        self.entries
            .iter()
            .filter(|e| e.weight_is_manual)
            .map(|e| e.weight)
            .sum()
    }

    /// Number of entries whose weight is auto-computed
    pub fn auto_count(&self) -> usize {
        self.entries.iter().filter(|e| !e.weight_is_manual).count()
    }

    /// Weights sum to 100 within [`WEIGHT_EPSILON`]
    pub fn is_settled(&self) -> bool {
        (self.total_weight() - TOTAL_WEIGHT).abs() <= WEIGHT_EPSILON
    }

    pub(crate) fn entries_mut(&mut self) -> &mut Vec<RewardEntry> {
        &mut self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rarity_ordering() {
        assert!(RarityTier::Common < RarityTier::Rare);
        assert!(RarityTier::Epic < RarityTier::Legendary);
        assert_eq!(RarityTier::ALL.len(), 5);
    }

    #[test]
    fn test_new_entry_has_no_weight() {
        let entry = RewardEntry::new("gem", RarityTier::Rare, RewardPayload::item("DIAMOND", 1));
        assert_eq!(entry.weight(), 0.0);
        assert!(!entry.is_manual());
    }

    #[test]
    fn test_empty_catalog_not_settled() {
        let catalog = RewardCatalog::new("starter");
        assert!(catalog.is_empty());
        assert_eq!(catalog.total_weight(), 0.0);
        assert!(!catalog.is_settled());
        assert_eq!(catalog.id().as_str(), "starter");
    }

    #[test]
    fn test_payload_serde_tagged() {
        let payload = RewardPayload::command("give {player} 100");
        let json = serde_json::to_string(&payload).unwrap();
        assert!(json.contains("\"kind\":\"command\""));

        let back: RewardPayload = serde_json::from_str(&json).unwrap();
        assert_eq!(back, payload);
    }
}
