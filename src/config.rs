use serde::{Deserialize, Serialize};

/// Constants of the automaticity update.
///
/// After each trial the per-item score moves by
/// `a <- a + alpha(n) * (q - a)` where `q` blends correctness and
/// normalized response speed, and `alpha(n)` shrinks with the item's
/// trial count `n`:
///
/// alpha(n) = alpha_min + (alpha_max - alpha_min) * k / (k + n)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomaticityParams {
    pub alpha_min: f64,
    pub alpha_max: f64,
    /// `k` in the learning-rate schedule; trial count at which the rate
    /// has decayed halfway from `alpha_max` toward `alpha_min`.
    pub convergence_trials: f64,
    pub correctness_weight: f64,
    pub speed_weight: f64,
    /// Relative speed assumed when no motor baseline exists yet.
    pub neutral_speed: f64,
    pub fluency_threshold: f64,
}

impl Default for AutomaticityParams {
    fn default() -> Self {
        Self {
            alpha_min: 0.1,
            alpha_max: 0.5,
            convergence_trials: 4.0,
            correctness_weight: 0.5,
            speed_weight: 0.5,
            neutral_speed: 0.5,
            fluency_threshold: 0.8,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionParams {
    /// Weight floor so fluent items still come up for review.
    pub min_weight: f64,
}

impl Default for SelectionParams {
    fn default() -> Self {
        Self { min_weight: 0.1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoundParams {
    pub duration_ms: i64,
}

impl Default for RoundParams {
    fn default() -> Self {
        Self {
            duration_ms: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationParams {
    /// Taps collected before the session is evaluated.
    pub trial_count: usize,
    /// Valid taps required for a usable baseline.
    pub min_valid_trials: usize,
    /// Taps faster than this are anticipatory and discarded.
    pub min_latency_ms: i64,
    /// Taps slower than this are distracted and discarded.
    pub max_latency_ms: i64,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            trial_count: 5,
            min_valid_trials: 3,
            min_latency_ms: 80,
            max_latency_ms: 2000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationParams {
    /// Fluency ratio over enabled groups at which the next group is
    /// suggested.
    pub expansion_threshold: f64,
}

impl Default for RecommendationParams {
    fn default() -> Self {
        Self {
            expansion_threshold: 0.7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct TrainerConfig {
    pub automaticity: AutomaticityParams,
    pub selection: SelectionParams,
    pub round: RoundParams,
    pub calibration: CalibrationParams,
    pub recommendation: RecommendationParams,
}
