//! Reveal slot layouts
//!
//! A layout is a pure mapping from a reveal step to the display positions the
//! shown entry occupies at that step. Every layout drives the same session
//! engine; only the positions and default pacing differ.

use serde::{Deserialize, Serialize};

/// A cell in the reveal display (row-major, 9 columns wide)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotPosition {
    pub row: u8,
    pub column: u8,
}

impl SlotPosition {
    pub const fn new(row: u8, column: u8) -> Self {
        Self { row, column }
    }
}

/// Display columns per row
pub const DISPLAY_COLUMNS: u8 = 9;

const CENTER_COLUMN: u8 = DISPLAY_COLUMNS / 2;

/// Clockwise ring around (2, 4)
const RING: [SlotPosition; 8] = [
    SlotPosition::new(1, 3),
    SlotPosition::new(1, 4),
    SlotPosition::new(1, 5),
    SlotPosition::new(2, 5),
    SlotPosition::new(3, 5),
    SlotPosition::new(3, 4),
    SlotPosition::new(3, 3),
    SlotPosition::new(2, 3),
];

/// Reveal pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealLayout {
    /// Single scrolling row, shown entry in the center slot
    #[default]
    Linear,
    /// Eight slots walked clockwise around a center
    Ring,
    /// 3×3 block filled cell by cell
    Cascade,
    /// One pinned slot
    Single,
    /// Three rows rolling in lockstep
    TripleRow,
}

impl RevealLayout {
    pub const ALL: [RevealLayout; 5] = [
        Self::Linear,
        Self::Ring,
        Self::Cascade,
        Self::Single,
        Self::TripleRow,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Linear => "Linear",
            Self::Ring => "Ring",
            Self::Cascade => "Cascade",
            Self::Single => "Single",
            Self::TripleRow => "Triple Row",
        }
    }

    /// Number of distinct positions the layout uses
    pub fn slot_count(&self) -> usize {
        match self {
            Self::Linear | Self::Single => 1,
            Self::Ring => RING.len(),
            Self::Cascade => 9,
            Self::TripleRow => 3,
        }
    }

    /// Steps per reveal at normal speed
    pub fn default_step_count(&self) -> u32 {
        match self {
            Self::Linear => 40,
            Self::Ring => 32,
            Self::Cascade => 27,
            Self::Single => 20,
            Self::TripleRow => 40,
        }
    }

    /// Duration budget at normal speed (20 ticks per second)
    pub fn default_duration_ticks(&self) -> u32 {
        match self {
            Self::Linear => 200,
            Self::Ring => 160,
            Self::Cascade => 180,
            Self::Single => 100,
            Self::TripleRow => 220,
        }
    }

    /// Positions occupied by the entry shown at `step` (1-based)
    pub fn positions(&self, step: u32) -> Vec<SlotPosition> {
        let index = step.saturating_sub(1) as usize;
        match self {
            Self::Linear => vec![SlotPosition::new(0, CENTER_COLUMN)],
            Self::Ring => vec![RING[index % RING.len()]],
            Self::Cascade => {
                let cell = (index % 9) as u8;
                vec![SlotPosition::new(cell / 3, CENTER_COLUMN - 1 + cell % 3)]
            }
            Self::Single => vec![SlotPosition::new(1, CENTER_COLUMN)],
            Self::TripleRow => (0..3)
                .map(|row| SlotPosition::new(row, CENTER_COLUMN))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_positions_stay_within_slot_count() {
        for layout in RevealLayout::ALL {
            let distinct: HashSet<SlotPosition> = (1..=100)
                .flat_map(|step| layout.positions(step))
                .collect();
            assert_eq!(distinct.len(), layout.slot_count(), "{layout:?}");
            assert!(distinct.iter().all(|p| p.column < DISPLAY_COLUMNS));
        }
    }

    #[test]
    fn test_ring_walks_clockwise() {
        let layout = RevealLayout::Ring;
        assert_eq!(layout.positions(1), vec![SlotPosition::new(1, 3)]);
        assert_eq!(layout.positions(4), vec![SlotPosition::new(2, 5)]);
        assert_eq!(layout.positions(9), layout.positions(1));
    }

    #[test]
    fn test_cascade_fills_row_major() {
        let layout = RevealLayout::Cascade;
        assert_eq!(layout.positions(1), vec![SlotPosition::new(0, 3)]);
        assert_eq!(layout.positions(5), vec![SlotPosition::new(1, 4)]);
        assert_eq!(layout.positions(9), vec![SlotPosition::new(2, 5)]);
    }

    #[test]
    fn test_triple_row_lockstep() {
        assert_eq!(RevealLayout::TripleRow.positions(7).len(), 3);
        // Step zero is treated as the first step
        assert_eq!(
            RevealLayout::Ring.positions(0),
            RevealLayout::Ring.positions(1)
        );
    }
}
