//! Per-item learner statistics and the automaticity update.
//!
//! Each trial moves the item's score by `a <- a + alpha(n) * (q - a)`:
//!
//! - `q = correctness_weight + speed_weight * relative_speed` when the
//!   answer is correct, `0.0` otherwise
//! - `relative_speed = clamp(baseline_ms / latency_ms, 0, 1)`, or the
//!   configured neutral value while no baseline exists
//! - `alpha(n) = alpha_min + (alpha_max - alpha_min) * k / (k + n)` with
//!   `n` the trial count before the update
//!
//! The score converges quickly for fresh items and stabilizes as the
//! trial count grows. `record_trial` is the only mutator; there is no
//! reset short of an explicit [`LearnerModel::clear`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::AutomaticityParams;
use crate::error::{TrainerError, TrainerResult};
use crate::storage::{stats_key, KeyValueStore};
use crate::types::{AggregateStats, Fluency, ItemStat, MotorBaseline, TrialUpdate};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct StatsEnvelope {
    stats: HashMap<String, ItemStat>,
    updated_at: String,
}

/// Persisted per-item statistics for one mode's item universe.
///
/// Exclusively owned by that mode's quiz engine; every mutation persists
/// synchronously before returning, so the model survives process restart
/// with no recovery step.
pub struct LearnerModel {
    mode_id: String,
    universe: HashSet<String>,
    params: AutomaticityParams,
    stats: HashMap<String, ItemStat>,
    store: Arc<dyn KeyValueStore>,
}

impl LearnerModel {
    /// Restore the model for `mode_id`, dropping persisted entries that no
    /// longer belong to the universe.
    pub fn load(
        mode_id: &str,
        universe: Vec<String>,
        params: AutomaticityParams,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let universe: HashSet<String> = universe.into_iter().collect();
        let stats = match store.read(&stats_key(mode_id)) {
            Ok(Some(raw)) => match serde_json::from_str::<StatsEnvelope>(&raw) {
                Ok(envelope) => envelope
                    .stats
                    .into_iter()
                    .filter(|(id, _)| universe.contains(id))
                    .collect(),
                Err(e) => {
                    tracing::warn!(error = %e, mode = %mode_id, "discarding unreadable stat map");
                    HashMap::new()
                }
            },
            Ok(None) => HashMap::new(),
            Err(e) => {
                tracing::warn!(error = %e, mode = %mode_id, "failed to read stat map");
                HashMap::new()
            }
        };

        Self {
            mode_id: mode_id.to_string(),
            universe,
            params,
            stats,
            store,
        }
    }

    /// Record one trial outcome. The sole mutator of [`ItemStat`].
    ///
    /// Fails with `InvalidItem` for identifiers outside the universe.
    /// Negative latencies are clamped to zero. A failed store write is
    /// reported through [`TrialUpdate::persisted`]; the in-memory update
    /// is applied regardless and never rolled back.
    pub fn record_trial(
        &mut self,
        item_id: &str,
        correct: bool,
        latency_ms: i64,
        baseline: Option<&MotorBaseline>,
        now_ms: i64,
    ) -> TrainerResult<TrialUpdate> {
        if !self.universe.contains(item_id) {
            return Err(TrainerError::InvalidItem(item_id.to_string()));
        }
        let latency_ms = latency_ms.max(0);

        let relative_speed = match baseline {
            Some(b) if latency_ms > 0 => (b.baseline_ms / latency_ms as f64).clamp(0.0, 1.0),
            Some(_) => 1.0,
            None => self.params.neutral_speed,
        };
        let quality = if correct {
            self.params.correctness_weight + self.params.speed_weight * relative_speed
        } else {
            0.0
        };

        let threshold = self.params.fluency_threshold;
        let alpha = learning_rate(&self.params, self.stat(item_id).trial_count);

        let entry = self.stats.entry(item_id.to_string()).or_default();
        let was_fluent = entry.automaticity >= threshold;
        entry.automaticity = (entry.automaticity + alpha * (quality - entry.automaticity))
            .clamp(0.0, 1.0);
        entry.trial_count += 1;
        entry.last_seen = now_ms;
        let stat = entry.clone();

        let fluency = classify_stat(&stat, threshold);
        let persisted = match self.persist() {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, mode = %self.mode_id, item_id = %item_id,
                    "trial recorded in memory only; store write failed");
                false
            }
        };

        Ok(TrialUpdate {
            item_id: item_id.to_string(),
            stat,
            fluency,
            became_fluent: !was_fluent && fluency == Fluency::Fluent,
            relative_speed,
            persisted,
        })
    }

    /// Snapshot of one item's statistics; a zero-trial default for items
    /// never attempted.
    pub fn stat(&self, item_id: &str) -> ItemStat {
        self.stats.get(item_id).cloned().unwrap_or_default()
    }

    pub fn classify(&self, item_id: &str) -> Fluency {
        classify_stat(&self.stat(item_id), self.params.fluency_threshold)
    }

    /// Overview of the given identifier set. `total_count` is the size of
    /// the set, so summaries scope to enabled items or the whole universe
    /// interchangeably.
    pub fn aggregate<'a, I>(&self, ids: I) -> AggregateStats
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut fluent_count = 0;
        let mut total_count = 0;
        let mut sum = 0.0;
        for id in ids {
            let stat = self.stat(id);
            if stat.automaticity >= self.params.fluency_threshold {
                fluent_count += 1;
            }
            sum += stat.automaticity;
            total_count += 1;
        }
        AggregateStats {
            fluent_count,
            total_count,
            average_automaticity: if total_count > 0 {
                sum / total_count as f64
            } else {
                0.0
            },
        }
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.universe.contains(item_id)
    }

    /// Explicit data clear; the only way automaticity resets.
    pub fn clear(&mut self) -> TrainerResult<()> {
        self.stats.clear();
        self.store
            .delete(&stats_key(&self.mode_id))
            .map_err(TrainerError::from)
    }

    fn persist(&self) -> TrainerResult<()> {
        let envelope = StatsEnvelope {
            stats: self.stats.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| TrainerError::PersistenceUnavailable(e.into()))?;
        self.store
            .write(&stats_key(&self.mode_id), &raw)
            .map_err(TrainerError::from)
    }
}

fn learning_rate(params: &AutomaticityParams, trial_count: u32) -> f64 {
    let k = params.convergence_trials;
    let span = params.alpha_max - params.alpha_min;
    params.alpha_min + span * k / (k + trial_count as f64)
}

fn classify_stat(stat: &ItemStat, threshold: f64) -> Fluency {
    if stat.automaticity >= threshold {
        Fluency::Fluent
    } else if stat.trial_count > 0 {
        Fluency::Practicing
    } else {
        Fluency::New
    }
}
