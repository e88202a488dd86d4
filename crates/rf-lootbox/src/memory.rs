//! In-memory collaborators
//!
//! Process-local implementations of the boundary traits, used by the batch
//! simulator and by tests. Each one guards its state with a single lock so
//! the atomicity contracts of the traits hold under concurrent sessions.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;
use parking_lot::{Mutex, RwLock};

use crate::allocator::ChanceAllocator;
use crate::catalog::{CatalogId, RequesterId, RewardCatalog, RewardEntry, RewardPayload};
use crate::collaborators::{CatalogSource, RewardDelivery, TokenLedger};
use crate::config::Capabilities;
use crate::error::{DeliveryError, LootError, LootResult};

// ═══════════════════════════════════════════════════════════════════════════════
// TOKEN LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

type TokenKey = (RequesterId, CatalogId);

/// Token balances keyed by requester and catalog
#[derive(Debug, Default)]
pub struct InMemoryTokenLedger {
    balances: Mutex<HashMap<TokenKey, u32>>,
    consumed: AtomicU64,
    refunded: AtomicU64,
}

impl InMemoryTokenLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add tokens to a requester's balance
    pub fn grant(&self, requester: &RequesterId, catalog: &CatalogId, count: u32) {
        let mut balances = self.balances.lock();
        let balance = balances
            .entry((requester.clone(), catalog.clone()))
            .or_insert(0);
        *balance = balance.saturating_add(count);
    }

    pub fn balance(&self, requester: &RequesterId, catalog: &CatalogId) -> u32 {
        self.balances
            .lock()
            .get(&(requester.clone(), catalog.clone()))
            .copied()
            .unwrap_or(0)
    }

    /// Total successful consumptions
    pub fn consumed(&self) -> u64 {
        self.consumed.load(Ordering::Relaxed)
    }

    /// Total refunds
    pub fn refunded(&self) -> u64 {
        self.refunded.load(Ordering::Relaxed)
    }
}

impl TokenLedger for InMemoryTokenLedger {
    fn try_consume_token(&self, requester: &RequesterId, catalog: &CatalogId) -> bool {
        let mut balances = self.balances.lock();
        match balances.get_mut(&(requester.clone(), catalog.clone())) {
            Some(balance) if *balance > 0 => {
                *balance -= 1;
                self.consumed.fetch_add(1, Ordering::Relaxed);
                true
            }
            _ => false,
        }
    }

    fn refund_token(&self, requester: &RequesterId, catalog: &CatalogId) {
        self.grant(requester, catalog, 1);
        self.refunded.fetch_add(1, Ordering::Relaxed);
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CATALOG STORE
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug)]
struct StoredCatalog {
    catalog: Arc<RewardCatalog>,
    opened: u64,
}

/// Owns catalogs and routes every mutation through the allocator.
///
/// Snapshots are shared `Arc`s; a mutation while sessions hold a snapshot
/// copies the catalog first, so running sessions never see the change.
#[derive(Debug)]
pub struct CatalogStore {
    allocator: ChanceAllocator,
    catalogs: RwLock<HashMap<CatalogId, StoredCatalog>>,
}

impl CatalogStore {
    pub fn new(capabilities: &Capabilities) -> Self {
        Self {
            allocator: ChanceAllocator::new(capabilities),
            catalogs: RwLock::new(HashMap::new()),
        }
    }

    /// Register an empty catalog. Returns false if it already exists.
    pub fn create(&self, id: impl Into<CatalogId>) -> bool {
        let id = id.into();
        let mut catalogs = self.catalogs.write();
        if catalogs.contains_key(&id) {
            return false;
        }
        debug!("catalog {} created", id);
        catalogs.insert(
            id.clone(),
            StoredCatalog {
                catalog: Arc::new(RewardCatalog::new(id)),
                opened: 0,
            },
        );
        true
    }

    /// Drop a catalog and its statistics
    pub fn delete(&self, id: &CatalogId) -> bool {
        self.catalogs.write().remove(id).is_some()
    }

    pub fn ids(&self) -> Vec<CatalogId> {
        let mut ids: Vec<CatalogId> = self.catalogs.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn add_entry(
        &self,
        id: &CatalogId,
        entry: RewardEntry,
        requested_weight: Option<f64>,
    ) -> LootResult<()> {
        self.mutate(id, |allocator, catalog| {
            allocator.add_entry(catalog, entry, requested_weight)
        })
    }

    pub fn remove_entry(&self, id: &CatalogId, entry_id: &str) -> LootResult<RewardEntry> {
        self.mutate(id, |allocator, catalog| allocator.remove_entry(catalog, entry_id))
    }

    pub fn set_weight(
        &self,
        id: &CatalogId,
        entry_id: &str,
        requested_weight: Option<f64>,
    ) -> LootResult<()> {
        self.mutate(id, |allocator, catalog| {
            allocator.set_weight(catalog, entry_id, requested_weight)
        })
    }

    /// Successful openings recorded for a catalog
    pub fn opened(&self, id: &CatalogId) -> u64 {
        self.catalogs.read().get(id).map(|c| c.opened).unwrap_or(0)
    }

    fn mutate<T>(
        &self,
        id: &CatalogId,
        op: impl FnOnce(&ChanceAllocator, &mut RewardCatalog) -> LootResult<T>,
    ) -> LootResult<T> {
        let mut catalogs = self.catalogs.write();
        let stored = catalogs
            .get_mut(id)
            .ok_or_else(|| LootError::UnknownCatalog(id.clone()))?;

        // Work on a private copy so outstanding snapshots stay frozen and a
        // failed op leaves the stored catalog as it was
        let mut staged = RewardCatalog::clone(&stored.catalog);
        let result = op(&self.allocator, &mut staged)?;
        stored.catalog = Arc::new(staged);
        Ok(result)
    }
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new(&Capabilities::default())
    }
}

impl CatalogSource for CatalogStore {
    fn snapshot(&self, catalog: &CatalogId) -> Option<Arc<RewardCatalog>> {
        self.catalogs.read().get(catalog).map(|c| Arc::clone(&c.catalog))
    }

    fn record_opened(&self, catalog: &CatalogId) {
        if let Some(stored) = self.catalogs.write().get_mut(catalog) {
            stored.opened += 1;
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DELIVERY
// ═══════════════════════════════════════════════════════════════════════════════

/// Records every grant and always succeeds
#[derive(Debug, Default)]
pub struct DeliveryLog {
    grants: Mutex<Vec<(RequesterId, RewardPayload)>>,
}

impl DeliveryLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grants(&self) -> Vec<(RequesterId, RewardPayload)> {
        self.grants.lock().clone()
    }

    pub fn count(&self) -> usize {
        self.grants.lock().len()
    }

    pub fn grants_for(&self, requester: &RequesterId) -> Vec<RewardPayload> {
        self.grants
            .lock()
            .iter()
            .filter(|(r, _)| r == requester)
            .map(|(_, p)| p.clone())
            .collect()
    }
}

impl RewardDelivery for DeliveryLog {
    fn deliver(
        &self,
        requester: &RequesterId,
        payload: &RewardPayload,
    ) -> Result<(), DeliveryError> {
        self.grants.lock().push((requester.clone(), payload.clone()));
        Ok(())
    }
}
