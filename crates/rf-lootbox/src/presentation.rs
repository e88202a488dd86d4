//! Reveal presentation events
//!
//! Frames are purely observational: sinks receive them after the session has
//! already moved on and nothing they do feeds back into the state machine.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::catalog::RarityTier;
use crate::layout::SlotPosition;
use crate::session::{SessionId, SessionOutcome};

/// What the display shows after one reveal step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevealFrame {
    pub session_id: SessionId,
    /// 1-based step just played
    pub step: u32,
    pub step_count: u32,
    pub shown_entry_id: String,
    pub rarity: RarityTier,
    /// Display cells the entry occupies at this step
    pub positions: Vec<SlotPosition>,
    /// Step falls inside the final winner window
    pub in_winner_window: bool,
    /// Ticks until the next step, `None` after the last one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_delay_ticks: Option<u32>,
}

impl RevealFrame {
    pub fn is_last(&self) -> bool {
        self.step >= self.step_count
    }
}

/// Receives reveal frames for rendering
pub trait PresentationSink: Send + Sync {
    fn on_frame(&self, frame: &RevealFrame);

    /// Called once when a session reaches DONE or FAILED
    fn on_finished(&self, _session: SessionId, _outcome: &SessionOutcome) {}
}

/// Discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl PresentationSink for NullSink {
    fn on_frame(&self, _frame: &RevealFrame) {}
}

/// Keeps every frame and outcome in memory
#[derive(Debug, Default)]
pub struct FrameLog {
    frames: Mutex<Vec<RevealFrame>>,
    finished: Mutex<Vec<(SessionId, SessionOutcome)>>,
}

impl FrameLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn frames(&self) -> Vec<RevealFrame> {
        self.frames.lock().clone()
    }

    /// Frames of one session in arrival order
    pub fn frames_for(&self, session: SessionId) -> Vec<RevealFrame> {
        self.frames
            .lock()
            .iter()
            .filter(|f| f.session_id == session)
            .cloned()
            .collect()
    }

    pub fn finished(&self) -> Vec<(SessionId, SessionOutcome)> {
        self.finished.lock().clone()
    }

    pub fn clear(&self) {
        self.frames.lock().clear();
        self.finished.lock().clear();
    }
}

impl PresentationSink for FrameLog {
    fn on_frame(&self, frame: &RevealFrame) {
        self.frames.lock().push(frame.clone());
    }

    fn on_finished(&self, session: SessionId, outcome: &SessionOutcome) {
        self.finished.lock().push((session, outcome.clone()));
    }
}
