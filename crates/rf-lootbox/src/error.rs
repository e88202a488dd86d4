//! Error types for rf-lootbox

use thiserror::Error;

use crate::catalog::{CatalogId, RequesterId};
use crate::layout::RevealLayout;
use crate::session::SessionState;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LootError {
    /// Weight mutation rejected; the catalog is left unchanged.
    #[error("Capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("Catalog has no entries")]
    EmptyCatalog,

    /// Reveal plan requested with a zero step count or zero duration.
    #[error(
        "Invalid schedule parameters: steps={step_count}, duration={total_duration_ticks} ticks"
    )]
    InvalidScheduleParameters {
        step_count: u32,
        total_duration_ticks: u32,
    },

    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    #[error("No token available for {requester} on catalog {catalog}")]
    TokenUnavailable {
        requester: RequesterId,
        catalog: CatalogId,
    },

    #[error("Duplicate entry id: {0}")]
    DuplicateEntry(String),

    #[error("Unknown entry id: {0}")]
    UnknownEntry(String),

    #[error("Invalid weight: {0} (expected 0 < weight <= 100)")]
    InvalidWeight(f64),

    #[error("Unknown catalog: {0}")]
    UnknownCatalog(CatalogId),

    #[error("Reveal layout not permitted: {0:?}")]
    LayoutNotAllowed(RevealLayout),

    #[error("Invalid session state: expected {expected}, found {found}")]
    InvalidState {
        expected: SessionState,
        found: SessionState,
    },

    #[error("Session already active for {requester} on catalog {catalog}")]
    SessionActive {
        requester: RequesterId,
        catalog: CatalogId,
    },

    #[error("Session manager is shutting down")]
    ShuttingDown,

    /// Session forced to fail by its driver (reaped or shut down)
    #[error("Session aborted: {0}")]
    Aborted(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl LootError {
    /// Whether the requester (or operator) can reasonably retry.
    ///
    /// `InvalidScheduleParameters` and `InvalidState` indicate a defect in the
    /// caller and are never recoverable.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::InvalidScheduleParameters { .. } | Self::InvalidState { .. }
        )
    }
}

/// Result type alias
pub type LootResult<T> = Result<T, LootError>;

/// Failure reported by a reward delivery collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("Requester offline: {0}")]
    RequesterOffline(RequesterId),

    #[error("Inventory full for {0}")]
    InventoryFull(RequesterId),

    #[error("Rejected: {0}")]
    Rejected(String),
}

impl From<DeliveryError> for LootError {
    fn from(err: DeliveryError) -> Self {
        Self::DeliveryFailed(err.to_string())
    }
}
