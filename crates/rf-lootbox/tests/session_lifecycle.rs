//! Opening Session Integration Tests
//!
//! Drives complete sessions through in-memory collaborators.
//! Verifies:
//! - Seeded end-to-end opening (start → reveal → commit)
//! - Token refund on every failure path
//! - Heartbeat-driven sessions through the manager

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use rf_lootbox::{
    Capabilities, CatalogId, CatalogStore, DeliveryError, DeliveryLog, FrameLog,
    InMemoryTokenLedger, LootConfig, LootError, OpeningSession, RarityTier, RequesterId,
    RevealConfig, RevealLayout, RewardDelivery, RewardEntry, RewardPayload, SessionContext,
    SessionManager, SessionOutcome, SessionState,
};

const SEED: u64 = 0x5EED_1007;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST FIXTURES
// ═══════════════════════════════════════════════════════════════════════════════

fn alice() -> RequesterId {
    RequesterId::from("alice")
}

fn vote() -> CatalogId {
    CatalogId::from("vote")
}

fn create_store(weights: &[(&str, f64)]) -> Arc<CatalogStore> {
    let store = Arc::new(CatalogStore::default());
    store.create(vote());
    for (id, weight) in weights {
        let entry = RewardEntry::new(*id, RarityTier::Common, RewardPayload::item(*id, 1));
        store.add_entry(&vote(), entry, Some(*weight)).unwrap();
    }
    store
}

/// Delivery that refuses everything and counts attempts
#[derive(Default)]
struct OfflineDelivery {
    attempts: AtomicUsize,
}

impl RewardDelivery for OfflineDelivery {
    fn deliver(
        &self,
        requester: &RequesterId,
        _payload: &RewardPayload,
    ) -> Result<(), DeliveryError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(DeliveryError::RequesterOffline(requester.clone()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// END-TO-END
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_seeded_opening_delivers_recorded_winner() {
    let store = create_store(&[("a", 50.0), ("b", 30.0), ("c", 20.0)]);
    let ledger = Arc::new(InMemoryTokenLedger::new());
    let delivery = Arc::new(DeliveryLog::new());
    ledger.grant(&alice(), &vote(), 1);

    // Winner recorded for SEED against a/b/c 50/30/20
    let expected = "b";

    let ctx = SessionContext::new(
        ledger.clone(),
        store.clone(),
        delivery.clone(),
        Capabilities::default(),
    );
    let session = OpeningSession::new(
        ctx,
        alice(),
        vote(),
        RevealConfig::custom(RevealLayout::Linear, 10, 100),
        SEED,
    );

    session.start().unwrap();
    assert_eq!(ledger.balance(&alice(), &vote()), 0);
    assert_eq!(session.state(), SessionState::Armed);

    let mut state = session.state();
    for _ in 0..10 {
        state = session.advance().unwrap();
    }
    assert_eq!(state, SessionState::Done);

    let grants = delivery.grants();
    assert_eq!(grants.len(), 1);
    assert_eq!(grants[0].0, alice());
    assert_eq!(grants[0].1, RewardPayload::item(expected, 1));
    assert_eq!(session.winning_entry().unwrap().id, expected);
    assert_eq!(store.opened(&vote()), 1);
}

#[test]
fn test_reveal_frames_cover_every_step() {
    let store = create_store(&[("a", 50.0), ("b", 30.0), ("c", 20.0)]);
    let ledger = Arc::new(InMemoryTokenLedger::new());
    let frames = Arc::new(FrameLog::new());
    ledger.grant(&alice(), &vote(), 1);

    let delivery = Arc::new(DeliveryLog::new());
    let ctx = SessionContext::new(ledger, store, delivery, Capabilities::default())
        .with_sink(frames.clone());
    let reveal = RevealConfig::for_layout(RevealLayout::Ring);
    let session = OpeningSession::new(ctx, alice(), vote(), reveal, SEED);
    session.start().unwrap();
    while !session.state().is_terminal() {
        session.advance().unwrap();
    }

    let frames = frames.frames_for(session.id());
    assert_eq!(frames.len() as u32, RevealLayout::Ring.default_step_count());
    for (i, frame) in frames.iter().enumerate() {
        assert_eq!(frame.step, i as u32 + 1);
        assert_eq!(frame.positions, RevealLayout::Ring.positions(frame.step));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// FAILURE PATHS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_delivery_failure_refunds_and_skips_statistic() {
    let store = create_store(&[("a", 70.0), ("b", 30.0)]);
    let ledger = Arc::new(InMemoryTokenLedger::new());
    let delivery = Arc::new(OfflineDelivery::default());
    ledger.grant(&alice(), &vote(), 1);

    let ctx = SessionContext::new(
        ledger.clone(),
        store.clone(),
        delivery.clone(),
        Capabilities::default(),
    );
    let reveal = RevealConfig::custom(RevealLayout::Single, 4, 40);
    let session = OpeningSession::new(ctx, alice(), vote(), reveal, SEED);
    session.start().unwrap();

    let mut last = Ok(SessionState::Armed);
    for _ in 0..4 {
        last = session.advance();
    }
    assert!(matches!(last, Err(LootError::DeliveryFailed(_))));
    assert_eq!(session.state(), SessionState::Failed);
    assert_eq!(ledger.balance(&alice(), &vote()), 1);
    assert_eq!(store.opened(&vote()), 0);

    // No retry from FAILED
    assert_eq!(session.advance().unwrap(), SessionState::Failed);
    assert_eq!(delivery.attempts.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unknown_catalog_keeps_token() {
    let store = create_store(&[("a", 100.0)]);
    let ledger = Arc::new(InMemoryTokenLedger::new());
    let ghost = CatalogId::from("ghost");
    ledger.grant(&alice(), &ghost, 1);

    let delivery = Arc::new(DeliveryLog::new());
    let ctx = SessionContext::new(ledger.clone(), store, delivery, Capabilities::default());
    let reveal = RevealConfig::for_layout(RevealLayout::Linear);
    let session = OpeningSession::new(ctx, alice(), ghost.clone(), reveal, SEED);

    assert_eq!(session.start(), Err(LootError::UnknownCatalog(ghost.clone())));
    assert_eq!(ledger.balance(&alice(), &ghost), 1);
    assert!(matches!(session.outcome(), Some(SessionOutcome::Failed { refunded: false, .. })));
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_manager_drives_many_requesters() {
    let store = create_store(&[("a", 50.0), ("b", 50.0)]);
    let ledger = Arc::new(InMemoryTokenLedger::new());
    let delivery = Arc::new(DeliveryLog::new());
    let requesters: Vec<RequesterId> =
        (0..20).map(|i| RequesterId::new(format!("player-{}", i))).collect();
    for r in &requesters {
        ledger.grant(r, &vote(), 1);
    }

    let ctx = SessionContext::new(
        ledger.clone(),
        store.clone(),
        delivery.clone(),
        Capabilities::default(),
    );
    let config = LootConfig::from_yaml_str("profile: quick\nseed: 7\n").unwrap();
    let manager = SessionManager::new(ctx, config);

    for r in &requesters {
        manager.open(r.clone(), vote(), Some(RevealLayout::Cascade)).unwrap();
    }
    assert_eq!(manager.active_count(), 20);

    let mut finished = 0;
    for _ in 0..10_000 {
        finished += manager.heartbeat().len();
        if manager.active_count() == 0 {
            break;
        }
    }

    assert_eq!(finished, 20);
    assert_eq!(delivery.count(), 20);
    assert_eq!(store.opened(&vote()), 20);
    assert_eq!(ledger.consumed(), 20);
    assert_eq!(ledger.refunded(), 0);
    assert_eq!(manager.stats().delivered, 20);
}

#[test]
fn test_manager_shutdown_refunds_in_flight() {
    let store = create_store(&[("a", 100.0)]);
    let ledger = Arc::new(InMemoryTokenLedger::new());
    ledger.grant(&alice(), &vote(), 1);
    ledger.grant(&RequesterId::from("bob"), &vote(), 1);

    let delivery = Arc::new(DeliveryLog::new());
    let ctx = SessionContext::new(ledger.clone(), store, delivery, Capabilities::default());
    let manager = SessionManager::new(ctx, LootConfig::default());
    let a = manager.open(alice(), vote(), None).unwrap();
    manager.open("bob", vote(), None).unwrap();
    for _ in 0..5 {
        manager.heartbeat();
    }

    assert_eq!(manager.shutdown(), 2);
    assert_eq!(a.state(), SessionState::Failed);
    assert_eq!(ledger.balance(&alice(), &vote()), 1);
    assert_eq!(ledger.balance(&RequesterId::from("bob"), &vote()), 1);
    assert!(manager.heartbeat().is_empty());
}
