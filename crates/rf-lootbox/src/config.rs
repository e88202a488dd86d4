//! Engine configuration
//!
//! [`Capabilities`] is the capability context handed to the allocator and to
//! every session: catalog size limits, permitted layouts and the size of the
//! final winner window. [`LootConfig`] bundles it with pacing settings and
//! can be loaded from YAML or JSON.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{LootError, LootResult};
use crate::layout::RevealLayout;
use crate::scheduler::Easing;

/// Final steps that always show the winning entry
pub const DEFAULT_WINNER_WINDOW: u32 = 5;

/// Entries a free-tier catalog may hold (one display row)
pub const BASIC_MAX_ENTRIES: usize = 9;

// ═══════════════════════════════════════════════════════════════════════════════
// CAPABILITIES
// ═══════════════════════════════════════════════════════════════════════════════

/// Feature limits for one deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Capabilities {
    /// Maximum entries per catalog
    pub max_catalog_entries: usize,
    /// Layouts sessions may use
    pub allowed_layouts: Vec<RevealLayout>,
    /// Final steps reserved for the winning entry
    pub winner_window: u32,
}

impl Capabilities {
    /// Free tier: small catalogs, linear reveal only
    pub fn basic() -> Self {
        Self {
            max_catalog_entries: BASIC_MAX_ENTRIES,
            allowed_layouts: vec![RevealLayout::Linear],
            winner_window: DEFAULT_WINNER_WINDOW,
        }
    }

    /// No catalog limit, every layout
    pub fn unrestricted() -> Self {
        Self {
            max_catalog_entries: usize::MAX,
            allowed_layouts: RevealLayout::ALL.to_vec(),
            winner_window: DEFAULT_WINNER_WINDOW,
        }
    }

    pub fn allows_layout(&self, layout: RevealLayout) -> bool {
        self.allowed_layouts.contains(&layout)
    }
}

impl Default for Capabilities {
    fn default() -> Self {
        Self::unrestricted()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REVEAL PACING
// ═══════════════════════════════════════════════════════════════════════════════

/// Pacing preset applied to every layout's duration budget
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealProfile {
    #[default]
    Normal,
    /// Half duration
    Quick,
    /// One tick per step
    Instant,
}

impl RevealProfile {
    /// Duration multiplier (< 1.0 = faster)
    pub fn duration_factor(&self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Quick => 0.5,
            Self::Instant => 0.0,
        }
    }
}

/// Reveal parameters for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealConfig {
    pub layout: RevealLayout,
    pub step_count: u32,
    pub total_duration_ticks: u32,
    pub winner_window: u32,
    #[serde(default)]
    pub easing: Easing,
}

impl RevealConfig {
    /// Layout defaults at normal pacing
    pub fn for_layout(layout: RevealLayout) -> Self {
        Self::with_profile(layout, RevealProfile::Normal)
    }

    pub fn with_profile(layout: RevealLayout, profile: RevealProfile) -> Self {
        let scaled = layout.default_duration_ticks() as f64 * profile.duration_factor();
        Self {
            layout,
            step_count: layout.default_step_count(),
            total_duration_ticks: (scaled.round() as u32).max(1),
            winner_window: DEFAULT_WINNER_WINDOW,
            easing: Easing::default(),
        }
    }

    /// Explicit step count and budget
    pub fn custom(layout: RevealLayout, step_count: u32, total_duration_ticks: u32) -> Self {
        Self {
            layout,
            step_count,
            total_duration_ticks,
            winner_window: DEFAULT_WINNER_WINDOW,
            easing: Easing::default(),
        }
    }

    pub fn with_winner_window(mut self, window: u32) -> Self {
        self.winner_window = window;
        self
    }

    pub fn with_easing(mut self, easing: Easing) -> Self {
        self.easing = easing;
        self
    }

    /// Winner window clamped to the step count
    pub fn effective_winner_window(&self) -> u32 {
        self.winner_window.min(self.step_count)
    }

    /// Whether 1-based `step` falls in the final winner window
    pub fn in_winner_window(&self, step: u32) -> bool {
        step > self.step_count - self.effective_winner_window()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TOP-LEVEL CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Engine configuration file
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LootConfig {
    pub capabilities: Capabilities,
    pub profile: RevealProfile,
    pub easing: Easing,
    /// Master seed for session RNGs (random when absent)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl LootConfig {
    /// Reveal parameters for a layout under this config
    pub fn reveal_for(&self, layout: RevealLayout) -> RevealConfig {
        RevealConfig::with_profile(layout, self.profile)
            .with_winner_window(self.capabilities.winner_window)
            .with_easing(self.easing)
    }

    pub fn from_yaml_str(yaml: &str) -> LootResult<Self> {
        serde_yml::from_str(yaml).map_err(|e| LootError::Config(format!("Invalid YAML: {}", e)))
    }

    pub fn from_json_str(json: &str) -> LootResult<Self> {
        serde_json::from_str(json).map_err(|e| LootError::Config(format!("Invalid JSON: {}", e)))
    }

    /// Load from a `.json`, `.yaml` or `.yml` file
    pub fn load(path: impl AsRef<Path>) -> LootResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| LootError::Config(format!("{}: {}", path.display(), e)))?;

        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Self::from_json_str(&text),
            Some("yaml") | Some("yml") => Self::from_yaml_str(&text),
            other => Err(LootError::Config(format!(
                "Unsupported config extension: {:?}",
                other
            ))),
        }
    }

    /// Export as pretty JSON
    pub fn to_json(&self) -> LootResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| LootError::Config(e.to_string()))
    }
}
