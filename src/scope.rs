//! The enabled subset of the item universe.
//!
//! Scope changes come only from explicit user action or from applying a
//! recommendation; the scheduler reads the scope but never mutates it.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{TrainerError, TrainerResult};
use crate::mode::PracticeGroup;
use crate::storage::{scope_key, KeyValueStore};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ScopeEnvelope {
    enabled: BTreeSet<String>,
    updated_at: String,
}

/// Persisted set of currently-enabled item identifiers. Ordered so
/// iteration, persistence, and selection candidate order are
/// deterministic.
pub struct ScopeState {
    mode_id: String,
    enabled: BTreeSet<String>,
    store: Arc<dyn KeyValueStore>,
}

impl ScopeState {
    pub fn load(mode_id: &str, store: Arc<dyn KeyValueStore>) -> Self {
        let enabled = match store.read(&scope_key(mode_id)) {
            Ok(Some(raw)) => match serde_json::from_str::<ScopeEnvelope>(&raw) {
                Ok(envelope) => envelope.enabled,
                Err(e) => {
                    tracing::warn!(error = %e, mode = %mode_id, "discarding unreadable scope");
                    BTreeSet::new()
                }
            },
            Ok(None) => BTreeSet::new(),
            Err(e) => {
                tracing::warn!(error = %e, mode = %mode_id, "failed to read scope");
                BTreeSet::new()
            }
        };

        Self {
            mode_id: mode_id.to_string(),
            enabled,
            store,
        }
    }

    pub fn enabled(&self) -> &BTreeSet<String> {
        &self.enabled
    }

    pub fn is_empty(&self) -> bool {
        self.enabled.is_empty()
    }

    pub fn len(&self) -> usize {
        self.enabled.len()
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.enabled.contains(item_id)
    }

    /// Replace the enabled set. The in-memory scope is applied even when
    /// the persist fails; the error is surfaced for the caller to report.
    pub fn replace(&mut self, enabled: BTreeSet<String>) -> TrainerResult<()> {
        self.enabled = enabled;
        self.persist()
    }

    /// Enable exactly the items of the groups at `indices`.
    pub fn replace_with_groups(
        &mut self,
        indices: &[usize],
        groups: &[PracticeGroup],
    ) -> TrainerResult<()> {
        let enabled = groups
            .iter()
            .filter(|g| indices.contains(&g.index))
            .flat_map(|g| g.items.iter().cloned())
            .collect();
        self.replace(enabled)
    }

    fn persist(&self) -> TrainerResult<()> {
        let envelope = ScopeEnvelope {
            enabled: self.enabled.clone(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        };
        let raw = serde_json::to_string(&envelope)
            .map_err(|e| TrainerError::PersistenceUnavailable(e.into()))?;
        self.store
            .write(&scope_key(&self.mode_id), &raw)
            .map_err(TrainerError::from)
    }
}
