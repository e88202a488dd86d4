//! Chance allocation
//!
//! Keeps catalog weights summing to 100 while respecting operator-pinned
//! ("manual") weights. Every operation stages its result on a copy of the
//! entries and only swaps it in when the whole mutation succeeds, so a
//! rejected mutation leaves the catalog untouched.

use log::debug;

use crate::catalog::{RewardCatalog, RewardEntry, TOTAL_WEIGHT, WEIGHT_EPSILON};
use crate::config::Capabilities;
use crate::error::{LootError, LootResult};

/// Weight normaliser for catalog mutations
#[derive(Debug, Clone)]
pub struct ChanceAllocator {
    max_entries: usize,
}

impl ChanceAllocator {
    /// Create an allocator bounded by the given capabilities
    pub fn new(capabilities: &Capabilities) -> Self {
        Self {
            max_entries: capabilities.max_catalog_entries,
        }
    }

    /// Maximum number of entries a catalog may hold
    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// Add an entry.
    ///
    /// `None` places it in the automatic pool, `Some(weight)` pins it.
    pub fn add_entry(
        &self,
        catalog: &mut RewardCatalog,
        mut entry: RewardEntry,
        requested_weight: Option<f64>,
    ) -> LootResult<()> {
        if catalog.contains(&entry.id) {
            return Err(LootError::DuplicateEntry(entry.id));
        }
        if catalog.len() >= self.max_entries {
            return Err(LootError::CapacityExceeded(format!(
                "catalog {} already holds the maximum of {} entries",
                catalog.id(),
                self.max_entries
            )));
        }

        match requested_weight {
            Some(weight) => {
                validate_weight(weight)?;
                entry.set_manual_weight(weight);
            }
            None => entry.set_auto_weight(0.0),
        }

        let mut staged = catalog.entries().to_vec();
        staged.push(entry);
        rebalance(&mut staged)?;

        debug!(
            "catalog {}: added entry {} ({} entries, {} automatic)",
            catalog.id(),
            staged.last().map(|e| e.id.as_str()).unwrap_or_default(),
            staged.len(),
            staged.iter().filter(|e| !e.is_manual()).count()
        );
        *catalog.entries_mut() = staged;
        Ok(())
    }

    /// Remove an entry and return it.
    ///
    /// Removing an automatic entry rebalances the remaining automatic
    /// entries. Removing a manual entry touches nothing else, so the sum may
    /// drop below 100 until the next mutation.
    pub fn remove_entry(&self, catalog: &mut RewardCatalog, id: &str) -> LootResult<RewardEntry> {
        let index = catalog
            .position(id)
            .ok_or_else(|| LootError::UnknownEntry(id.to_string()))?;

        let mut staged = catalog.entries().to_vec();
        let removed = staged.remove(index);
        if !removed.is_manual() {
            rebalance(&mut staged)?;
        }

        debug!(
            "catalog {}: removed {} entry {}",
            catalog.id(),
            if removed.is_manual() { "manual" } else { "automatic" },
            removed.id
        );
        *catalog.entries_mut() = staged;
        Ok(removed)
    }

    /// Pin an existing entry to `Some(weight)` or return it to the automatic
    /// pool with `None`. Fails under the same rules as [`Self::add_entry`].
    pub fn set_weight(
        &self,
        catalog: &mut RewardCatalog,
        id: &str,
        requested_weight: Option<f64>,
    ) -> LootResult<()> {
        let index = catalog
            .position(id)
            .ok_or_else(|| LootError::UnknownEntry(id.to_string()))?;

        let mut staged = catalog.entries().to_vec();
        match requested_weight {
            Some(weight) => {
                validate_weight(weight)?;
                staged[index].set_manual_weight(weight);
            }
            None => staged[index].set_auto_weight(0.0),
        }
        rebalance(&mut staged)?;

        *catalog.entries_mut() = staged;
        Ok(())
    }
}

impl Default for ChanceAllocator {
    fn default() -> Self {
        Self::new(&Capabilities::default())
    }
}

fn validate_weight(weight: f64) -> LootResult<()> {
    if weight.is_finite() && weight > 0.0 && weight <= TOTAL_WEIGHT {
        Ok(())
    } else {
        Err(LootError::InvalidWeight(weight))
    }
}

/// Share whatever the manual entries leave equally among automatic entries
fn rebalance(entries: &mut [RewardEntry]) -> LootResult<()> {
    let manual: f64 = entries
        .iter()
        .filter(|e| e.is_manual())
        .map(|e| e.weight())
        .sum();
    if manual > TOTAL_WEIGHT + WEIGHT_EPSILON {
        return Err(LootError::CapacityExceeded(format!(
            "manual weights would sum to {manual:.4}, above {TOTAL_WEIGHT}"
        )));
    }

    let auto_count = entries.iter().filter(|e| !e.is_manual()).count();
    if auto_count == 0 {
        return Ok(());
    }

    let remaining = TOTAL_WEIGHT - manual;
    if remaining <= WEIGHT_EPSILON {
        return Err(LootError::CapacityExceeded(format!(
            "manual weights sum to {manual:.4}, leaving no share for {auto_count} automatic entries"
        )));
    }

    let share = remaining / auto_count as f64;
    for entry in entries.iter_mut().filter(|e| !e.is_manual()) {
        entry.set_auto_weight(share);
    }
    Ok(())
}
