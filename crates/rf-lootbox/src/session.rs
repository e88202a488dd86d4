//! Opening session state machine
//!
//! ```text
//! PENDING ──start()──▶ ARMED ──advance()──▶ REVEALING ──last step──▶ COMMITTING ──▶ DONE
//!    │                   │                      │                        │
//!    └───────────────────┴──────────────────────┴────────────────────────┴──▶ FAILED (+refund)
//! ```
//!
//! A session never owns a clock. Whoever drives it calls [`OpeningSession::advance`]
//! once per reveal step, waiting [`OpeningSession::next_delay`] ticks in
//! between. The session is `Sync`: every transition happens under one lock,
//! and the transition into COMMITTING is claimed by exactly one caller, which
//! then performs the delivery outside the lock.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogId, RequesterId, RewardCatalog, RewardEntry, RewardPayload};
use crate::collaborators::SessionContext;
use crate::config::RevealConfig;
use crate::error::{LootError, LootResult};
use crate::presentation::RevealFrame;
use crate::scheduler::RevealScheduler;
use crate::selector::RewardSelector;

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub u64);

impl SessionId {
    pub fn next() -> Self {
        Self(NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{:06}", self.0)
    }
}

/// Lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Constructed, no side effects yet
    Pending,
    /// Token taken, winner drawn, delays planned
    Armed,
    /// Stepping through the reveal
    Revealing,
    /// Delivery in flight
    Committing,
    /// Reward delivered
    Done,
    /// Terminal failure; any consumed token has been refunded
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// States from which a driver may still force FAILED
    pub fn is_abortable(&self) -> bool {
        matches!(self, Self::Pending | Self::Armed | Self::Revealing)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "PENDING",
            Self::Armed => "ARMED",
            Self::Revealing => "REVEALING",
            Self::Committing => "COMMITTING",
            Self::Done => "DONE",
            Self::Failed => "FAILED",
        };
        f.write_str(name)
    }
}

/// How a session ended
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum SessionOutcome {
    Delivered {
        entry_id: String,
        payload: RewardPayload,
    },
    Failed {
        error: String,
        /// A consumed token was given back
        refunded: bool,
    },
}

impl SessionOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

struct SessionInner {
    state: SessionState,
    snapshot: Option<Arc<RewardCatalog>>,
    winner: Option<usize>,
    delays: Vec<u32>,
    current_step: u32,
    shown: Option<usize>,
    token_held: bool,
    rng: ChaCha8Rng,
    outcome: Option<SessionOutcome>,
}

/// One in-flight reveal for one requester against one catalog
pub struct OpeningSession {
    id: SessionId,
    requester: RequesterId,
    catalog_id: CatalogId,
    reveal: RevealConfig,
    ctx: SessionContext,
    inner: Mutex<SessionInner>,
}

impl OpeningSession {
    /// Create a PENDING session. `seed` fixes the draw and decoy sequence.
    pub fn new(
        ctx: SessionContext,
        requester: RequesterId,
        catalog_id: CatalogId,
        reveal: RevealConfig,
        seed: u64,
    ) -> Self {
        Self {
            id: SessionId::next(),
            requester,
            catalog_id,
            reveal,
            ctx,
            inner: Mutex::new(SessionInner {
                state: SessionState::Pending,
                snapshot: None,
                winner: None,
                delays: Vec::new(),
                current_step: 0,
                shown: None,
                token_held: false,
                rng: ChaCha8Rng::seed_from_u64(seed),
                outcome: None,
            }),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // ACCESSORS
    // ═══════════════════════════════════════════════════════════════════════════

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn requester(&self) -> &RequesterId {
        &self.requester
    }

    pub fn catalog_id(&self) -> &CatalogId {
        &self.catalog_id
    }

    pub fn reveal(&self) -> &RevealConfig {
        &self.reveal
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    pub fn current_step(&self) -> u32 {
        self.inner.lock().current_step
    }

    pub fn step_count(&self) -> u32 {
        self.reveal.step_count
    }

    /// Per-step waits in ticks (empty until ARMED)
    pub fn delay_sequence(&self) -> Vec<u32> {
        self.inner.lock().delays.clone()
    }

    /// Ticks to wait before the next `advance()`, while one is expected
    pub fn next_delay(&self) -> Option<u32> {
        let inner = self.inner.lock();
        match inner.state {
            SessionState::Armed | SessionState::Revealing => {
                inner.delays.get(inner.current_step as usize).copied()
            }
            _ => None,
        }
    }

    /// Immutable catalog copy taken at start
    pub fn catalog_snapshot(&self) -> Option<Arc<RewardCatalog>> {
        self.inner.lock().snapshot.clone()
    }

    pub fn winning_entry(&self) -> Option<RewardEntry> {
        let inner = self.inner.lock();
        entry_at(&inner.snapshot, inner.winner)
    }

    /// Entry surfaced by the most recent step
    pub fn shown_entry(&self) -> Option<RewardEntry> {
        let inner = self.inner.lock();
        entry_at(&inner.snapshot, inner.shown)
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.inner.lock().outcome.clone()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSITIONS
    // ═══════════════════════════════════════════════════════════════════════════

    /// PENDING → ARMED.
    ///
    /// Consumes a token, snapshots the catalog, draws the winner and plans the
    /// delays, in that order. Any failure after the token is taken refunds it.
    ///
    /// A missing token leaves the ledger untouched. The session object itself
    /// still moves to FAILED so the rejection is visible through `outcome()`
    /// and the sink; a rejected session is never started again.
    pub fn start(&self) -> LootResult<()> {
        let mut inner = self.inner.lock();
        if inner.state != SessionState::Pending {
            return Err(LootError::InvalidState {
                expected: SessionState::Pending,
                found: inner.state,
            });
        }

        if let Err(err) = self.precheck() {
            debug!("{}: rejected before any side effect: {}", self.id, err);
            let outcome = self.fail(&mut inner, &err);
            drop(inner);
            self.ctx.sink.on_finished(self.id, &outcome);
            return Err(err);
        }

        if !self
            .ctx
            .ledger
            .try_consume_token(&self.requester, &self.catalog_id)
        {
            let err = LootError::TokenUnavailable {
                requester: self.requester.clone(),
                catalog: self.catalog_id.clone(),
            };
            let outcome = self.fail(&mut inner, &err);
            drop(inner);
            self.ctx.sink.on_finished(self.id, &outcome);
            return Err(err);
        }
        inner.token_held = true;

        match self.arm(&mut inner) {
            Ok(()) => {
                inner.state = SessionState::Armed;
                info!(
                    "{}: armed for {} on {} ({} steps, {} ticks)",
                    self.id,
                    self.requester,
                    self.catalog_id,
                    self.reveal.step_count,
                    inner.delays.iter().sum::<u32>()
                );
                Ok(())
            }
            Err(err) => {
                warn!("{}: start failed after token consumption: {}", self.id, err);
                let outcome = self.fail(&mut inner, &err);
                drop(inner);
                self.ctx.sink.on_finished(self.id, &outcome);
                Err(err)
            }
        }
    }

    /// Play one reveal step.
    ///
    /// The first call moves ARMED → REVEALING. The call that plays the final
    /// step claims COMMITTING and delivers the reward before returning. Calls
    /// made while committing or after a terminal state are no-ops that report
    /// the current state.
    ///
    /// Frames reach the sink while the session lock is held, so the sink sees
    /// steps in order. Sinks must not call back into the session.
    pub fn advance(&self) -> LootResult<SessionState> {
        let state = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            match inner.state {
                SessionState::Pending => {
                    return Err(LootError::InvalidState {
                        expected: SessionState::Armed,
                        found: SessionState::Pending,
                    });
                }
                SessionState::Committing | SessionState::Done | SessionState::Failed => {
                    return Ok(inner.state);
                }
                SessionState::Armed => {
                    debug!("{}: reveal started", self.id);
                    inner.state = SessionState::Revealing;
                }
                SessionState::Revealing => {}
            }

            let (Some(snapshot), Some(winner)) = (inner.snapshot.as_ref(), inner.winner) else {
                return Err(LootError::InvalidState {
                    expected: SessionState::Armed,
                    found: inner.state,
                });
            };

            inner.current_step += 1;
            let step = inner.current_step;
            let in_window = self.reveal.in_winner_window(step);
            let shown = if in_window {
                winner
            } else {
                RewardSelector::decoy_index(snapshot, winner, &mut inner.rng)
            };
            inner.shown = Some(shown);

            let entry = &snapshot.entries()[shown];
            let frame = RevealFrame {
                session_id: self.id,
                step,
                step_count: self.reveal.step_count,
                shown_entry_id: entry.id.clone(),
                rarity: entry.rarity,
                positions: self.reveal.layout.positions(step),
                in_winner_window: in_window,
                next_delay_ticks: inner.delays.get(step as usize).copied(),
            };

            if step >= self.reveal.step_count {
                inner.state = SessionState::Committing;
            }
            self.ctx.sink.on_frame(&frame);
            inner.state
        };

        if state == SessionState::Committing {
            return self.commit();
        }
        Ok(state)
    }

    /// Force FAILED from any state before COMMITTING, refunding the token.
    ///
    /// Returns false when the session is already committing or finished.
    pub fn abort(&self, reason: &str) -> bool {
        let mut inner = self.inner.lock();
        if !inner.state.is_abortable() {
            return false;
        }
        warn!("{}: aborted in {} at step {}: {}", self.id, inner.state, inner.current_step, reason);
        let outcome = self.fail(&mut inner, &LootError::Aborted(reason.to_string()));
        drop(inner);
        self.ctx.sink.on_finished(self.id, &outcome);
        true
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Checks that must pass before a token is touched
    fn precheck(&self) -> LootResult<()> {
        if !self.ctx.capabilities.allows_layout(self.reveal.layout) {
            return Err(LootError::LayoutNotAllowed(self.reveal.layout));
        }
        let catalog = self
            .ctx
            .catalogs
            .snapshot(&self.catalog_id)
            .ok_or_else(|| LootError::UnknownCatalog(self.catalog_id.clone()))?;
        if catalog.is_empty() {
            return Err(LootError::EmptyCatalog);
        }
        Ok(())
    }

    fn arm(&self, inner: &mut SessionInner) -> LootResult<()> {
        let snapshot = self
            .ctx
            .catalogs
            .snapshot(&self.catalog_id)
            .ok_or_else(|| LootError::UnknownCatalog(self.catalog_id.clone()))?;
        // Unsettled catalogs are drawn as-is: a manual-only catalog may sit
        // below 100 after a removal and the draw normalises by the live sum
        if !snapshot.is_settled() {
            warn!(
                "{}: catalog {} weights sum to {:.4}, drawing against the live sum",
                self.id,
                self.catalog_id,
                snapshot.total_weight()
            );
        }

        let winner = RewardSelector::draw_index(&snapshot, &mut inner.rng)?;
        let delays = RevealScheduler::new(self.reveal.easing)
            .plan(self.reveal.step_count, self.reveal.total_duration_ticks)?;

        debug!("{}: winner {}", self.id, snapshot.entries()[winner].id);
        inner.snapshot = Some(snapshot);
        inner.winner = Some(winner);
        inner.delays = delays;
        Ok(())
    }

    /// COMMITTING → DONE, or FAILED with refund if delivery fails
    fn commit(&self) -> LootResult<SessionState> {
        let winner = {
            let inner = self.inner.lock();
            entry_at(&inner.snapshot, inner.winner)
        };
        let Some(winner) = winner else {
            return Err(LootError::InvalidState {
                expected: SessionState::Committing,
                found: self.state(),
            });
        };

        let delivered = self.ctx.delivery.deliver(&self.requester, &winner.payload);

        let mut inner = self.inner.lock();
        match delivered {
            Ok(()) => {
                self.ctx.catalogs.record_opened(&self.catalog_id);
                inner.token_held = false;
                inner.state = SessionState::Done;
                let outcome = SessionOutcome::Delivered {
                    entry_id: winner.id.clone(),
                    payload: winner.payload,
                };
                inner.outcome = Some(outcome.clone());
                drop(inner);

                info!("{}: delivered {} to {}", self.id, winner.id, self.requester);
                self.ctx.sink.on_finished(self.id, &outcome);
                Ok(SessionState::Done)
            }
            Err(err) => {
                let err = LootError::from(err);
                warn!("{}: delivery of {} failed: {}", self.id, winner.id, err);
                let outcome = self.fail(&mut inner, &err);
                drop(inner);
                self.ctx.sink.on_finished(self.id, &outcome);
                Err(err)
            }
        }
    }

    /// Move to FAILED, refunding a held token first
    fn fail(&self, inner: &mut SessionInner, err: &LootError) -> SessionOutcome {
        let refunded = inner.token_held;
        if refunded {
            self.ctx
                .ledger
                .refund_token(&self.requester, &self.catalog_id);
            inner.token_held = false;
            info!("{}: refunded token to {} on {}", self.id, self.requester, self.catalog_id);
        }
        inner.state = SessionState::Failed;
        let outcome = SessionOutcome::Failed {
            error: err.to_string(),
            refunded,
        };
        inner.outcome = Some(outcome.clone());
        outcome
    }
}

impl fmt::Debug for OpeningSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("OpeningSession")
            .field("id", &self.id)
            .field("requester", &self.requester)
            .field("catalog", &self.catalog_id)
            .field("state", &inner.state)
            .field("step", &inner.current_step)
            .field("step_count", &self.reveal.step_count)
            .finish()
    }
}

fn entry_at(snapshot: &Option<Arc<RewardCatalog>>, index: Option<usize>) -> Option<RewardEntry> {
    let snapshot = snapshot.as_ref()?;
    snapshot.entries().get(index?).cloned()
}
