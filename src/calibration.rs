//! Motor-baseline calibration.
//!
//! A short run of trivial stimulus-response trials measures the learner's
//! raw reaction time. The baseline is the median of the valid samples;
//! taps outside the configured window are discarded as anticipatory or
//! distracted. A fresh calibration fully replaces any previous baseline.

use crate::config::CalibrationParams;
use crate::error::TrainerError;
use crate::types::MotorBaseline;

pub struct CalibrationSession {
    params: CalibrationParams,
    recorded: usize,
    valid: Vec<i64>,
}

impl CalibrationSession {
    pub fn new(params: CalibrationParams) -> Self {
        Self {
            params,
            recorded: 0,
            valid: Vec::new(),
        }
    }

    /// Record one stimulus-response latency. Out-of-window samples still
    /// count toward the trial budget but not toward the baseline.
    pub fn record_latency(&mut self, latency_ms: i64) {
        self.recorded += 1;
        if latency_ms >= self.params.min_latency_ms && latency_ms <= self.params.max_latency_ms {
            self.valid.push(latency_ms);
        } else {
            tracing::debug!(latency_ms, "discarding out-of-window calibration tap");
        }
    }

    pub fn is_complete(&self) -> bool {
        self.recorded >= self.params.trial_count
    }

    pub fn recorded(&self) -> usize {
        self.recorded
    }

    /// Derive the baseline from the valid samples. At least one valid
    /// sample is always required, whatever the configured minimum.
    pub fn finish(&self) -> Result<MotorBaseline, TrainerError> {
        if self.valid.is_empty() || self.valid.len() < self.params.min_valid_trials {
            return Err(TrainerError::CalibrationIncomplete {
                valid: self.valid.len(),
                required: self.params.min_valid_trials,
            });
        }
        Ok(MotorBaseline {
            baseline_ms: median(&self.valid),
            sample_count: self.valid.len(),
            updated_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

impl Default for CalibrationSession {
    fn default() -> Self {
        Self::new(CalibrationParams::default())
    }
}

fn median(samples: &[i64]) -> f64 {
    let mut sorted = samples.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) as f64 / 2.0
    } else {
        sorted[mid] as f64
    }
}
