//! Weighted reward selection

use rand::Rng;

use crate::catalog::{RewardCatalog, RewardEntry};
use crate::error::{LootError, LootResult};

/// Draws entries with probability proportional to weight
pub struct RewardSelector;

impl RewardSelector {
    /// Draw the winning entry
    pub fn draw<'a, R: Rng + ?Sized>(
        catalog: &'a RewardCatalog,
        rng: &mut R,
    ) -> LootResult<&'a RewardEntry> {
        let index = Self::draw_index(catalog, rng)?;
        Ok(&catalog.entries()[index])
    }

    /// Draw the index of the winning entry
    pub fn draw_index<R: Rng + ?Sized>(catalog: &RewardCatalog, rng: &mut R) -> LootResult<usize> {
        if catalog.is_empty() {
            return Err(LootError::EmptyCatalog);
        }
        // Live sum rather than 100: tolerates unsettled catalogs
        let roll = rng.random::<f64>() * catalog.total_weight();
        Self::pick(catalog, roll)
    }

    /// Walk entries in insertion order and return the first whose cumulative
    /// weight reaches `roll`. Falls back to the last entry if rounding drift
    /// leaves `roll` past the final boundary.
    pub fn pick(catalog: &RewardCatalog, roll: f64) -> LootResult<usize> {
        let entries = catalog.entries();
        if entries.is_empty() {
            return Err(LootError::EmptyCatalog);
        }

        let mut cumulative = 0.0;
        for (index, entry) in entries.iter().enumerate() {
            cumulative += entry.weight();
            if cumulative >= roll {
                return Ok(index);
            }
        }
        Ok(entries.len() - 1)
    }

    /// Uniformly pick any entry other than `winner` (the winner itself when it
    /// is the only entry)
    pub fn decoy_index<R: Rng + ?Sized>(
        catalog: &RewardCatalog,
        winner: usize,
        rng: &mut R,
    ) -> usize {
        let len = catalog.len();
        if len <= 1 {
            return winner;
        }
        let index = rng.random_range(0..len - 1);
        if index >= winner { index + 1 } else { index }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::allocator::ChanceAllocator;
    use crate::catalog::{RarityTier, RewardPayload};
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn catalog(weights: &[(&str, f64)]) -> RewardCatalog {
        let allocator = ChanceAllocator::default();
        let mut catalog = RewardCatalog::new("test");
        for (id, weight) in weights {
            allocator
                .add_entry(
                    &mut catalog,
                    RewardEntry::new(*id, RarityTier::Common, RewardPayload::item("STONE", 1)),
                    Some(*weight),
                )
                .unwrap();
        }
        catalog
    }

    #[test]
    fn test_pick_boundaries() {
        let catalog = catalog(&[("a", 50.0), ("b", 30.0), ("c", 20.0)]);
        assert_eq!(RewardSelector::pick(&catalog, 0.0).unwrap(), 0);
        assert_eq!(RewardSelector::pick(&catalog, 50.0).unwrap(), 0);
        assert_eq!(RewardSelector::pick(&catalog, 50.0001).unwrap(), 1);
        assert_eq!(RewardSelector::pick(&catalog, 80.0).unwrap(), 1);
        assert_eq!(RewardSelector::pick(&catalog, 99.99).unwrap(), 2);
    }

    #[test]
    fn test_pick_drift_falls_back_to_last() {
        let catalog = catalog(&[("a", 50.0), ("b", 30.0), ("c", 20.0)]);
        assert_eq!(RewardSelector::pick(&catalog, 100.5).unwrap(), 2);
    }

    #[test]
    fn test_empty_catalog() {
        let empty = RewardCatalog::new("empty");
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(
            RewardSelector::draw(&empty, &mut rng).unwrap_err(),
            LootError::EmptyCatalog
        );
        assert!(RewardSelector::pick(&empty, 0.0).is_err());
    }

    #[test]
    fn test_draw_reproducible() {
        let catalog = catalog(&[("a", 10.0), ("b", 10.0), ("c", 80.0)]);
        let run = |seed| {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            (0..50)
                .map(|_| RewardSelector::draw(&catalog, &mut rng).unwrap().id.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(run(42), run(42));
    }

    #[test]
    fn test_every_entry_reachable() {
        let catalog = catalog(&[("a", 1.0), ("b", 1.0), ("c", 98.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let mut seen = [false; 3];
        for _ in 0..20_000 {
            seen[RewardSelector::draw_index(&catalog, &mut rng).unwrap()] = true;
        }
        assert_eq!(seen, [true; 3]);
    }

    #[test]
    fn test_decoy_never_winner() {
        let catalog = catalog(&[("a", 25.0), ("b", 25.0), ("c", 25.0), ("d", 25.0)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for winner in 0..4 {
            for _ in 0..200 {
                let decoy = RewardSelector::decoy_index(&catalog, winner, &mut rng);
                assert_ne!(decoy, winner);
                assert!(decoy < 4);
            }
        }

        let single = catalog_single();
        assert_eq!(RewardSelector::decoy_index(&single, 0, &mut rng), 0);
    }

    fn catalog_single() -> RewardCatalog {
        let allocator = ChanceAllocator::default();
        let mut catalog = RewardCatalog::new("single");
        allocator
            .add_entry(
                &mut catalog,
                RewardEntry::new("only", RarityTier::Epic, RewardPayload::command("noop")),
                None,
            )
            .unwrap();
        catalog
    }
}
