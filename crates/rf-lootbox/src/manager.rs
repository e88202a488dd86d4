//! Session manager: registry, heartbeat driver and lifecycle control
//!
//! Owns every live [`OpeningSession`], drives them from a single `heartbeat()`
//! tick, and routes stalled or shut-down sessions through FAILED so their
//! tokens are refunded.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, info, warn};
use parking_lot::Mutex;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogId, RequesterId};
use crate::collaborators::SessionContext;
use crate::config::LootConfig;
use crate::error::{LootError, LootResult};
use crate::layout::RevealLayout;
use crate::session::{OpeningSession, SessionId, SessionOutcome};

type SessionKey = (RequesterId, CatalogId);

struct ActiveSession {
    session: Arc<OpeningSession>,
    /// Ticks left before the next `advance()`
    countdown: u32,
}

#[derive(Default)]
struct Registry {
    sessions: HashMap<SessionId, ActiveSession>,
    by_key: HashMap<SessionKey, SessionId>,
}

impl Registry {
    fn remove(&mut self, id: SessionId) -> Option<Arc<OpeningSession>> {
        let active = self.sessions.remove(&id)?;
        let key = (
            active.session.requester().clone(),
            active.session.catalog_id().clone(),
        );
        if self.by_key.get(&key) == Some(&id) {
            self.by_key.remove(&key);
        }
        Some(active.session)
    }
}

/// Manager lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerStats {
    pub opened: u64,
    pub delivered: u64,
    pub failed: u64,
    /// Failures that gave a token back
    pub refunded: u64,
}

impl ManagerStats {
    fn record(&mut self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Delivered { .. } => self.delivered += 1,
            SessionOutcome::Failed { refunded, .. } => {
                self.failed += 1;
                if *refunded {
                    self.refunded += 1;
                }
            }
        }
    }
}

/// Drives opening sessions from a tick source
pub struct SessionManager {
    /// Collaborators handed to every session
    ctx: SessionContext,
    /// Engine configuration
    config: LootConfig,
    /// Live sessions
    registry: Mutex<Registry>,
    /// Derives per-session seeds
    seeder: Mutex<ChaCha8Rng>,
    /// Cleared by `shutdown()`
    accepting: AtomicBool,
    /// Lifetime counters
    stats: Mutex<ManagerStats>,
}

impl SessionManager {
    /// Create a manager. The config's capabilities replace the context's.
    pub fn new(mut ctx: SessionContext, config: LootConfig) -> Self {
        ctx.capabilities = config.capabilities.clone();
        let seeder = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_os_rng(),
        };
        Self {
            ctx,
            config,
            registry: Mutex::new(Registry::default()),
            seeder: Mutex::new(seeder),
            accepting: AtomicBool::new(true),
            stats: Mutex::new(ManagerStats::default()),
        }
    }

    pub fn config(&self) -> &LootConfig {
        &self.config
    }

    pub fn context(&self) -> &SessionContext {
        &self.ctx
    }

    pub fn stats(&self) -> ManagerStats {
        self.stats.lock().clone()
    }

    pub fn is_accepting(&self) -> bool {
        self.accepting.load(Ordering::Acquire)
    }

    pub fn active_count(&self) -> usize {
        self.registry.lock().sessions.len()
    }

    pub fn session(&self, id: SessionId) -> Option<Arc<OpeningSession>> {
        self.registry
            .lock()
            .sessions
            .get(&id)
            .map(|a| Arc::clone(&a.session))
    }

    /// Open and start a session. `layout` falls back to the default layout.
    ///
    /// At most one live session exists per requester and catalog.
    pub fn open(
        &self,
        requester: impl Into<RequesterId>,
        catalog: impl Into<CatalogId>,
        layout: Option<RevealLayout>,
    ) -> LootResult<Arc<OpeningSession>> {
        if !self.is_accepting() {
            return Err(LootError::ShuttingDown);
        }
        let requester = requester.into();
        let catalog = catalog.into();
        let key = (requester.clone(), catalog.clone());

        // Holding the registry across start() keeps the one-session rule
        // atomic; start() never calls back into the manager.
        let mut registry = self.registry.lock();
        // shutdown() flips the flag under this lock, so a session registered
        // here is always visible to it
        if !self.is_accepting() {
            return Err(LootError::ShuttingDown);
        }
        if registry.by_key.contains_key(&key) {
            return Err(LootError::SessionActive { requester, catalog });
        }

        let seed = self.seeder.lock().random::<u64>();
        let reveal = self.config.reveal_for(layout.unwrap_or_default());
        let session = Arc::new(OpeningSession::new(
            self.ctx.clone(),
            requester,
            catalog,
            reveal,
            seed,
        ));

        if let Err(err) = session.start() {
            if let Some(outcome) = session.outcome() {
                self.stats.lock().record(&outcome);
            }
            return Err(err);
        }

        let countdown = session.next_delay().unwrap_or(0);
        let id = session.id();
        registry.by_key.insert(key, id);
        registry.sessions.insert(
            id,
            ActiveSession {
                session: Arc::clone(&session),
                countdown,
            },
        );
        self.stats.lock().opened += 1;
        debug!("{} registered, first step in {} ticks", id, countdown);
        Ok(session)
    }

    /// Advance every session by one tick.
    ///
    /// Returns the outcomes of sessions that finished during this tick.
    pub fn heartbeat(&self) -> Vec<(SessionId, SessionOutcome)> {
        let due: Vec<Arc<OpeningSession>> = {
            let mut registry = self.registry.lock();
            registry
                .sessions
                .values_mut()
                .filter_map(|active| {
                    active.countdown = active.countdown.saturating_sub(1);
                    (active.countdown == 0).then(|| Arc::clone(&active.session))
                })
                .collect()
        };

        // Advance outside the registry lock: delivery and sinks may be slow
        for session in &due {
            if let Err(err) = session.advance() {
                warn!("{}: advance failed: {}", session.id(), err);
            }
        }

        let mut finished = Vec::new();
        let mut registry = self.registry.lock();
        for session in &due {
            let id = session.id();
            if session.state().is_terminal() {
                // Already gone if reaped or shut down meanwhile
                if registry.remove(id).is_none() {
                    continue;
                }
                if let Some(outcome) = session.outcome() {
                    self.stats.lock().record(&outcome);
                    finished.push((id, outcome));
                }
            } else if let Some(active) = registry.sessions.get_mut(&id) {
                active.countdown = session.next_delay().unwrap_or(0);
            }
        }
        finished
    }

    /// Force a stalled session to FAILED, refunding its token.
    ///
    /// Returns false if the session is unknown or already committing.
    pub fn reap(&self, id: SessionId) -> bool {
        let Some(session) = self.session(id) else {
            return false;
        };
        if !session.abort("reaped") {
            return false;
        }
        self.registry.lock().remove(id);
        if let Some(outcome) = session.outcome() {
            self.stats.lock().record(&outcome);
        }
        info!("{} reaped", id);
        true
    }

    /// Stop accepting opens and fail every in-flight session.
    ///
    /// Returns the number of sessions aborted. Sessions already committing
    /// finish their delivery and are left for the next heartbeat.
    pub fn shutdown(&self) -> usize {
        let sessions: Vec<Arc<OpeningSession>> = {
            let registry = self.registry.lock();
            self.accepting.store(false, Ordering::Release);
            registry
                .sessions
                .values()
                .map(|a| Arc::clone(&a.session))
                .collect()
        };

        let mut aborted = 0;
        for session in sessions {
            if session.abort("shutdown") {
                self.registry.lock().remove(session.id());
                if let Some(outcome) = session.outcome() {
                    self.stats.lock().record(&outcome);
                }
                aborted += 1;
            }
        }
        info!("shutdown: {} sessions aborted", aborted);
        aborted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{RarityTier, RewardEntry, RewardPayload};
    use crate::config::{Capabilities, RevealProfile};
    use crate::memory::{CatalogStore, DeliveryLog, InMemoryTokenLedger};
    use crate::session::SessionState;

    fn manager(tokens: u32) -> (SessionManager, Arc<InMemoryTokenLedger>, Arc<DeliveryLog>) {
        let ledger = Arc::new(InMemoryTokenLedger::new());
        let store = Arc::new(CatalogStore::default());
        let delivery = Arc::new(DeliveryLog::new());

        let id = CatalogId::from("vote");
        store.create(id.clone());
        for name in ["a", "b", "c"] {
            store
                .add_entry(
                    &id,
                    RewardEntry::new(name, RarityTier::Rare, RewardPayload::item(name, 1)),
                    None,
                )
                .unwrap();
        }
        ledger.grant(&RequesterId::from("alice"), &id, tokens);
        ledger.grant(&RequesterId::from("bob"), &id, tokens);

        let ctx = SessionContext::new(
            ledger.clone(),
            store,
            delivery.clone(),
            Capabilities::default(),
        );
        let config = LootConfig {
            profile: RevealProfile::Quick,
            seed: Some(99),
            ..LootConfig::default()
        };
        (SessionManager::new(ctx, config), ledger, delivery)
    }

    #[test]
    fn test_heartbeat_runs_to_completion() {
        let (manager, ledger, delivery) = manager(1);
        let session = manager.open("alice", "vote", None).unwrap();
        let total: u32 = session.delay_sequence().iter().sum();

        let mut finished = Vec::new();
        for _ in 0..total {
            finished.extend(manager.heartbeat());
        }

        assert_eq!(session.state(), SessionState::Done);
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].0, session.id());
        assert_eq!(manager.active_count(), 0);
        assert_eq!(delivery.count(), 1);
        assert_eq!(ledger.consumed(), 1);
        assert_eq!(manager.stats().delivered, 1);
    }

    #[test]
    fn test_one_session_per_requester_and_catalog() {
        let (manager, _, _) = manager(2);
        manager.open("alice", "vote", None).unwrap();
        assert!(matches!(
            manager.open("alice", "vote", None),
            Err(LootError::SessionActive { .. })
        ));
        manager.open("bob", "vote", None).unwrap();
        assert_eq!(manager.active_count(), 2);
    }

    #[test]
    fn test_failed_open_is_not_registered() {
        let (manager, _, _) = manager(0);
        assert!(matches!(
            manager.open("alice", "vote", None),
            Err(LootError::TokenUnavailable { .. })
        ));
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.stats().failed, 1);
    }

    #[test]
    fn test_reap_refunds() {
        let (manager, ledger, _) = manager(1);
        let session = manager.open("alice", "vote", None).unwrap();
        manager.heartbeat();

        assert!(manager.reap(session.id()));
        assert!(!manager.reap(session.id()));
        assert_eq!(session.state(), SessionState::Failed);
        assert_eq!(ledger.refunded(), 1);
        assert_eq!(ledger.balance(&RequesterId::from("alice"), &CatalogId::from("vote")), 1);

        // The pair is free again
        manager.open("alice", "vote", None).unwrap();
    }

    #[test]
    fn test_shutdown_refunds_everything() {
        let (manager, ledger, delivery) = manager(1);
        manager.open("alice", "vote", None).unwrap();
        manager.open("bob", "vote", None).unwrap();

        assert_eq!(manager.shutdown(), 2);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(ledger.refunded(), 2);
        assert_eq!(delivery.count(), 0);
        assert_eq!(manager.open("alice", "vote", None).err(), Some(LootError::ShuttingDown));
        assert_eq!(manager.stats().refunded, 2);
    }

    #[test]
    fn test_layout_override() {
        let (manager, _, _) = manager(1);
        let session = manager.open("alice", "vote", Some(RevealLayout::Ring)).unwrap();
        assert_eq!(session.reveal().layout, RevealLayout::Ring);
        assert_eq!(session.step_count(), RevealLayout::Ring.default_step_count());
    }
}
