//! Reveal scheduling
//!
//! Turns a step count and a duration budget (in ticks) into per-step delays.
//! The eased cumulative time curve is sampled at every step boundary and the
//! delay for a step is the rounded distance between its two boundaries, so
//! early steps flash by and the final steps linger before the reveal.

use serde::{Deserialize, Serialize};

use crate::error::{LootError, LootResult};

/// Easing curve over normalized time `t ∈ [0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Easing {
    /// Constant pace
    Linear,
    /// `t²`
    #[default]
    QuadraticIn,
    /// `t³`
    CubicIn,
}

impl Easing {
    #[inline]
    pub fn apply(&self, t: f64) -> f64 {
        let t = t.clamp(0.0, 1.0);
        match self {
            Self::Linear => t,
            Self::QuadraticIn => t * t,
            Self::CubicIn => t * t * t,
        }
    }
}

/// Produces reveal delay sequences
#[derive(Debug, Clone, Copy, Default)]
pub struct RevealScheduler {
    easing: Easing,
}

impl RevealScheduler {
    pub fn new(easing: Easing) -> Self {
        Self { easing }
    }

    pub fn easing(&self) -> Easing {
        self.easing
    }

    /// Cumulative eased time at each of the `step_count + 1` step boundaries
    pub fn cumulative(&self, step_count: u32, total_duration_ticks: u32) -> LootResult<Vec<f64>> {
        validate(step_count, total_duration_ticks)?;

        let steps = step_count as f64;
        let total = total_duration_ticks as f64;
        Ok((0..=step_count)
            .map(|i| total * self.easing.apply(i as f64 / steps))
            .collect())
    }

    /// Per-step delays in ticks, each at least 1.
    ///
    /// The sum is within `step_count` ticks of the budget.
    pub fn plan(&self, step_count: u32, total_duration_ticks: u32) -> LootResult<Vec<u32>> {
        let cumulative = self.cumulative(step_count, total_duration_ticks)?;

        Ok(cumulative
            .windows(2)
            .map(|w| ((w[1] - w[0]).round() as u32).max(1))
            .collect())
    }
}

fn validate(step_count: u32, total_duration_ticks: u32) -> LootResult<()> {
    if step_count == 0 || total_duration_ticks == 0 {
        return Err(LootError::InvalidScheduleParameters {
            step_count,
            total_duration_ticks,
        });
    }
    Ok(())
}
