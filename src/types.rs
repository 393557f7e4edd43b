use serde::{Deserialize, Serialize};

/// Derived fluency classification for one item. Never stored; always
/// recomputed from the latest [`ItemStat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Fluency {
    #[default]
    New,
    Practicing,
    Fluent,
}

impl Fluency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Practicing => "practicing",
            Self::Fluent => "fluent",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "fluent" => Self::Fluent,
            "practicing" => Self::Practicing,
            _ => Self::New,
        }
    }
}

/// Per-item recall statistics. Mutated only by
/// [`LearnerModel::record_trial`](crate::model::LearnerModel::record_trial).
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ItemStat {
    pub trial_count: u32,
    /// Recall speed and accuracy confidence in `[0.0, 1.0]`.
    pub automaticity: f64,
    /// Unix millis of the most recent trial; 0 when never attempted.
    pub last_seen: i64,
}

/// Calibrated minimum plausible reaction time for one mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MotorBaseline {
    pub baseline_ms: f64,
    pub sample_count: usize,
    pub updated_at: String,
}

/// Result of recording one trial.
#[derive(Debug, Clone)]
pub struct TrialUpdate {
    pub item_id: String,
    pub stat: ItemStat,
    pub fluency: Fluency,
    /// The trial pushed the item across the fluency threshold.
    pub became_fluent: bool,
    pub relative_speed: f64,
    /// False when the synchronous store write failed; the in-memory
    /// model is still updated.
    pub persisted: bool,
}

/// Scoped overview of a set of items.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    pub fluent_count: usize,
    /// Size of the identifier set the aggregate was computed over, not
    /// the whole universe.
    pub total_count: usize,
    pub average_automaticity: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[derive(Default)]
pub enum Phase {
    #[default]
    Idle,
    Calibrating,
    Active,
    RoundComplete,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Calibrating => "calibrating",
            Self::Active => "active",
            Self::RoundComplete => "roundcomplete",
        }
    }
}

/// Outcome of the most recently answered question.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Feedback {
    pub item_id: String,
    pub correct: bool,
    pub latency_ms: i64,
    pub became_fluent: bool,
}

/// Recoverable condition surfaced to the presentation layer through the
/// engine snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Condition {
    EmptyScope,
    CalibrationIncomplete { valid: usize, required: usize },
    PersistenceUnavailable,
}

/// End-of-round summary built from the ephemeral round tally.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundSummary {
    pub answered: u32,
    pub correct: u32,
    pub incorrect: u32,
    pub accuracy: f64,
    pub median_latency_ms: i64,
    pub best_streak: u32,
    /// Items that crossed the fluency threshold during the round.
    pub newly_fluent: Vec<String>,
}

/// Read-only state snapshot for presentation layers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineSnapshot {
    pub phase: Phase,
    pub time_remaining_ms: i64,
    pub current_item_id: Option<String>,
    pub mastered_count: usize,
    pub total_enabled_count: usize,
    pub last_feedback: Option<Feedback>,
    pub condition: Option<Condition>,
}
