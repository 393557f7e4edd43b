//! Weighted random item selection.
//!
//! Struggling items are drawn more often: each enabled item weighs
//! `(1 - automaticity)`, floored so fluent items still come up for
//! review. The immediately-previous item is excluded from the table
//! whenever another choice exists, which makes the anti-repeat guarantee
//! unconditional.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::config::SelectionParams;
use crate::types::ItemStat;

pub struct ItemSelector {
    params: SelectionParams,
    rng: ChaCha8Rng,
}

impl ItemSelector {
    pub fn new(params: SelectionParams) -> Self {
        Self {
            params,
            rng: ChaCha8Rng::from_entropy(),
        }
    }

    /// Seeded variant for reproducible selection sequences.
    pub fn with_seed(params: SelectionParams, seed: u64) -> Self {
        Self {
            params,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Draw the next item from `candidates`. Returns `None` only when the
    /// candidate set is empty.
    pub fn pick(
        &mut self,
        candidates: &[(String, ItemStat)],
        previous: Option<&str>,
    ) -> Option<String> {
        if candidates.is_empty() {
            return None;
        }

        let eligible: Vec<&(String, ItemStat)> = if candidates.len() > 1 {
            candidates
                .iter()
                .filter(|(id, _)| previous != Some(id.as_str()))
                .collect()
        } else {
            candidates.iter().collect()
        };

        let weights: Vec<f64> = eligible
            .iter()
            .map(|(_, stat)| (1.0 - stat.automaticity).max(self.params.min_weight))
            .collect();
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            // Every weight floored to zero by configuration.
            return eligible
                .iter()
                .min_by_key(|(_, stat)| stat.last_seen)
                .map(|(id, _)| id.clone());
        }

        let mut target = self.rng.gen_range(0.0..total);
        for (entry, weight) in eligible.iter().zip(&weights) {
            if target < *weight {
                return Some(entry.0.clone());
            }
            target -= weight;
        }

        // Floating-point tail: fall back to the least recently seen item.
        eligible
            .iter()
            .min_by_key(|(_, stat)| stat.last_seen)
            .map(|(id, _)| id.clone())
    }
}

impl Default for ItemSelector {
    fn default() -> Self {
        Self::new(SelectionParams::default())
    }
}
