//! Practice-scope advisory.
//!
//! A pure function over learner statistics and static grouping metadata:
//! once the enabled groups are fluent enough, the next disabled group (by
//! ascending index, groups are difficulty-ordered) is proposed.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::config::RecommendationParams;
use crate::mode::PracticeGroup;
use crate::model::LearnerModel;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupSuggestion {
    pub index: usize,
    pub label: String,
    pub justification: String,
}

/// Recomputed on demand; carries no persisted identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Fluency ratio over the currently-enabled groups' items.
    pub fluency_ratio: f64,
    /// Proposed enlarged enabled set; absent when no change is suggested.
    pub enabled: Option<BTreeSet<String>>,
    pub suggestion: Option<GroupSuggestion>,
}

/// Evaluate the enabled groups and propose an expansion when their
/// aggregate fluency ratio reaches `expansion_threshold`.
pub fn compute_recommendation(
    model: &LearnerModel,
    groups: &[PracticeGroup],
    enabled: &BTreeSet<String>,
    params: &RecommendationParams,
) -> Recommendation {
    let mut enabled_items: Vec<&str> = Vec::new();
    let mut disabled_groups: Vec<&PracticeGroup> = Vec::new();
    for group in groups {
        let mut any_enabled = false;
        for id in &group.items {
            if enabled.contains(id) {
                enabled_items.push(id.as_str());
                any_enabled = true;
            }
        }
        if !any_enabled {
            disabled_groups.push(group);
        }
    }

    let agg = model.aggregate(enabled_items.iter().copied());
    let fluency_ratio = if agg.total_count > 0 {
        agg.fluent_count as f64 / agg.total_count as f64
    } else {
        0.0
    };

    if agg.total_count > 0 && fluency_ratio >= params.expansion_threshold {
        if let Some(next) = disabled_groups.iter().min_by_key(|g| g.index) {
            let mut enlarged = enabled.clone();
            enlarged.extend(next.items.iter().cloned());
            let justification = format!(
                "{:.0}% of enabled items are fluent; ready to add \"{}\"",
                fluency_ratio * 100.0,
                next.label
            );
            return Recommendation {
                fluency_ratio,
                enabled: Some(enlarged),
                suggestion: Some(GroupSuggestion {
                    index: next.index,
                    label: next.label.clone(),
                    justification,
                }),
            };
        }
    }

    Recommendation {
        fluency_ratio,
        enabled: None,
        suggestion: None,
    }
}

/// The `limit` lowest-automaticity items of `ids`. Equal scores fall to
/// the caller-supplied ordering so output is deterministic.
pub fn weakest_items<F>(
    model: &LearnerModel,
    ids: &[String],
    limit: usize,
    tie_break: F,
) -> Vec<String>
where
    F: Fn(&str, &str) -> Ordering,
{
    let mut ranked: Vec<(&str, f64)> = ids
        .iter()
        .map(|id| (id.as_str(), model.stat(id).automaticity))
        .collect();
    ranked.sort_by(|a, b| {
        a.1.partial_cmp(&b.1)
            .unwrap_or(Ordering::Equal)
            .then_with(|| tie_break(a.0, b.0))
    });
    ranked
        .into_iter()
        .take(limit)
        .map(|(id, _)| id.to_string())
        .collect()
}
