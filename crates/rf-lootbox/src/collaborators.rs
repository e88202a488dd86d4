//! Boundary contracts
//!
//! The engine owns no storage, clock or delivery mechanism. Everything it
//! touches outside its own state goes through these traits, bundled per
//! deployment in a [`SessionContext`].

use std::sync::Arc;

use crate::catalog::{CatalogId, RequesterId, RewardCatalog, RewardPayload};
use crate::config::Capabilities;
use crate::error::DeliveryError;
use crate::presentation::{NullSink, PresentationSink};

/// Per requester/catalog access tokens ("keys")
pub trait TokenLedger: Send + Sync {
    /// Take one token if the requester holds any.
    ///
    /// The check and the decrement must be a single atomic step with respect
    /// to concurrent calls for the same pair.
    fn try_consume_token(&self, requester: &RequesterId, catalog: &CatalogId) -> bool;

    /// Give back a token taken by [`Self::try_consume_token`]
    fn refund_token(&self, requester: &RequesterId, catalog: &CatalogId);
}

/// Supplies immutable catalog snapshots
pub trait CatalogSource: Send + Sync {
    fn snapshot(&self, catalog: &CatalogId) -> Option<Arc<RewardCatalog>>;

    /// Bump the catalog's open counter after a successful delivery
    fn record_opened(&self, catalog: &CatalogId);
}

/// Hands rewards to requesters. Must tolerate retries.
pub trait RewardDelivery: Send + Sync {
    fn deliver(
        &self,
        requester: &RequesterId,
        payload: &RewardPayload,
    ) -> Result<(), DeliveryError>;
}

/// Collaborators and capability context shared by every session
#[derive(Clone)]
pub struct SessionContext {
    pub ledger: Arc<dyn TokenLedger>,
    pub catalogs: Arc<dyn CatalogSource>,
    pub delivery: Arc<dyn RewardDelivery>,
    pub sink: Arc<dyn PresentationSink>,
    pub capabilities: Capabilities,
}

impl SessionContext {
    /// Context with a no-op presentation sink
    pub fn new(
        ledger: Arc<dyn TokenLedger>,
        catalogs: Arc<dyn CatalogSource>,
        delivery: Arc<dyn RewardDelivery>,
        capabilities: Capabilities,
    ) -> Self {
        Self {
            ledger,
            catalogs,
            delivery,
            sink: Arc::new(NullSink),
            capabilities,
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn PresentationSink>) -> Self {
        self.sink = sink;
        self
    }
}
