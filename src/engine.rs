//! Round-driven practice session state machine.
//!
//! Phases: idle -> calibrating -> active -> roundcomplete -> idle, with a
//! direct drop to idle on manual stop from any non-idle phase. The engine
//! advances only in response to discrete external events; the round timer
//! is caller-scheduled and funnels through [`QuizEngine::tick`]. Expiry is
//! evaluated both at tick and at answer submission, and both agree on
//! `now >= deadline`, so an answer landing exactly on the deadline is
//! scored before the round closes.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::calibration::CalibrationSession;
use crate::config::{CalibrationParams, TrainerConfig};
use crate::error::{TrainerError, TrainerResult};
use crate::mode::PracticeMode;
use crate::model::LearnerModel;
use crate::recommend::{self, Recommendation};
use crate::scope::ScopeState;
use crate::select::ItemSelector;
use crate::storage::{baseline_key, KeyValueStore};
use crate::types::{
    Condition, EngineSnapshot, Feedback, ItemStat, MotorBaseline, Phase, RoundSummary,
};

struct PresentedItem {
    item_id: String,
    presented_at_ms: i64,
}

#[derive(Default)]
struct RoundTally {
    correct: u32,
    incorrect: u32,
    latencies: Vec<i64>,
    streak: u32,
    best_streak: u32,
    newly_fluent: Vec<String>,
}

struct RoundState {
    deadline_ms: i64,
    current: Option<PresentedItem>,
    tally: RoundTally,
}

struct CalibrationRun {
    session: CalibrationSession,
    stimulus_shown_at: Option<i64>,
}

impl CalibrationRun {
    fn new(params: CalibrationParams) -> Self {
        Self {
            session: CalibrationSession::new(params),
            stimulus_shown_at: None,
        }
    }
}

/// One quiz engine per mode instance. The engine exclusively owns the
/// mode's learner model and scope; everything it persists is scoped under
/// the mode id.
pub struct QuizEngine<M: PracticeMode> {
    mode: M,
    config: TrainerConfig,
    store: Arc<dyn KeyValueStore>,
    model: LearnerModel,
    scope: ScopeState,
    baseline: Option<MotorBaseline>,
    selector: ItemSelector,
    phase: Phase,
    round: Option<RoundState>,
    calibration: Option<CalibrationRun>,
    last_feedback: Option<Feedback>,
    last_summary: Option<RoundSummary>,
    condition: Option<Condition>,
}

impl<M: PracticeMode> QuizEngine<M> {
    pub fn new(mode: M, config: TrainerConfig, store: Arc<dyn KeyValueStore>) -> Self {
        let selector = ItemSelector::new(config.selection.clone());
        Self::build(mode, config, store, selector)
    }

    /// Seeded variant for reproducible selection sequences in tests.
    pub fn with_seed(
        mode: M,
        config: TrainerConfig,
        store: Arc<dyn KeyValueStore>,
        seed: u64,
    ) -> Self {
        let selector = ItemSelector::with_seed(config.selection.clone(), seed);
        Self::build(mode, config, store, selector)
    }

    fn build(
        mode: M,
        config: TrainerConfig,
        store: Arc<dyn KeyValueStore>,
        selector: ItemSelector,
    ) -> Self {
        let mode_id = mode.mode_id().to_string();
        let model = LearnerModel::load(
            &mode_id,
            mode.universe(),
            config.automaticity.clone(),
            Arc::clone(&store),
        );
        let scope = ScopeState::load(&mode_id, Arc::clone(&store));
        let baseline = match store.read(&baseline_key(&mode_id)) {
            Ok(Some(raw)) => match serde_json::from_str(&raw) {
                Ok(baseline) => Some(baseline),
                Err(e) => {
                    tracing::warn!(error = %e, mode = %mode_id, "discarding unreadable baseline");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(error = %e, mode = %mode_id, "failed to read baseline");
                None
            }
        };

        Self {
            mode,
            config,
            store,
            model,
            scope,
            baseline,
            selector,
            phase: Phase::Idle,
            round: None,
            calibration: None,
            last_feedback: None,
            last_summary: None,
            condition: None,
        }
    }

    // ---- session control ----

    /// Begin practice. Enters calibration first when no motor baseline
    /// exists for the mode.
    pub fn start(&mut self, now_ms: i64) -> TrainerResult<Phase> {
        if self.phase != Phase::Idle {
            return Ok(self.phase);
        }
        self.condition = None;
        if self.scope.is_empty() {
            tracing::warn!(mode = %self.mode.mode_id(), "start refused: no enabled items");
            self.condition = Some(Condition::EmptyScope);
            return Err(TrainerError::EmptyScope);
        }
        if self.baseline.is_none() {
            self.calibration = Some(CalibrationRun::new(self.config.calibration.clone()));
            self.phase = Phase::Calibrating;
            tracing::info!(mode = %self.mode.mode_id(), "no motor baseline; calibrating first");
            return Ok(self.phase);
        }
        self.begin_round(now_ms)?;
        Ok(self.phase)
    }

    /// Force a fresh calibration even though a baseline already exists.
    /// The new baseline fully replaces the old one.
    pub fn recalibrate(&mut self) -> TrainerResult<Phase> {
        if self.phase != Phase::Idle {
            return Ok(self.phase);
        }
        self.condition = None;
        self.calibration = Some(CalibrationRun::new(self.config.calibration.clone()));
        self.phase = Phase::Calibrating;
        Ok(self.phase)
    }

    /// Stop from any non-idle phase. Round tallies are discarded; trials
    /// already recorded in the learner model are never rolled back. Round
    /// and calibration state are cleared synchronously, so a stale timer
    /// callback firing afterwards finds idle and does nothing.
    pub fn stop(&mut self) {
        if self.phase == Phase::Idle {
            return;
        }
        self.force_idle();
        tracing::info!(mode = %self.mode.mode_id(), "stopped");
    }

    /// Start the next round from the round-complete phase, without
    /// recalibrating.
    pub fn continue_quiz(&mut self, now_ms: i64) -> TrainerResult<Phase> {
        if self.phase != Phase::RoundComplete {
            return Ok(self.phase);
        }
        self.condition = None;
        self.begin_round(now_ms)?;
        Ok(self.phase)
    }

    /// Timer callback. Closes the round on expiry; a no-op in every other
    /// phase.
    pub fn tick(&mut self, now_ms: i64) {
        if self.phase != Phase::Active {
            return;
        }
        let expired = self
            .round
            .as_ref()
            .map(|r| now_ms >= r.deadline_ms)
            .unwrap_or(false);
        if expired {
            self.close_round();
        }
    }

    /// Score the learner's input against the current item, record the
    /// trial, and present the next item unless the round just expired.
    /// Returns `Ok(None)` outside the active phase.
    pub fn submit_answer(&mut self, input: &str, now_ms: i64) -> TrainerResult<Option<Feedback>> {
        if self.phase != Phase::Active {
            return Ok(None);
        }
        let presented = match self.round.as_mut().and_then(|r| r.current.take()) {
            Some(presented) => presented,
            None => return Ok(None),
        };
        let latency_ms = (now_ms - presented.presented_at_ms).max(0);
        let correct = self.mode.check_answer(&presented.item_id, input);

        let update = match self.model.record_trial(
            &presented.item_id,
            correct,
            latency_ms,
            self.baseline.as_ref(),
            now_ms,
        ) {
            Ok(update) => update,
            Err(e) => {
                tracing::warn!(error = %e, item_id = %presented.item_id,
                    "trial recording failed; stopping round");
                self.force_idle();
                return Err(e);
            }
        };
        if !update.persisted {
            self.condition = Some(Condition::PersistenceUnavailable);
        }

        let feedback = Feedback {
            item_id: presented.item_id.clone(),
            correct,
            latency_ms,
            became_fluent: update.became_fluent,
        };
        self.last_feedback = Some(feedback.clone());

        let deadline_ms = match self.round.as_mut() {
            Some(round) => {
                round.tally.latencies.push(latency_ms);
                if correct {
                    round.tally.correct += 1;
                    round.tally.streak += 1;
                    round.tally.best_streak = round.tally.best_streak.max(round.tally.streak);
                } else {
                    round.tally.incorrect += 1;
                    round.tally.streak = 0;
                }
                if update.became_fluent {
                    round.tally.newly_fluent.push(presented.item_id.clone());
                }
                round.deadline_ms
            }
            None => return Ok(Some(feedback)),
        };

        if now_ms >= deadline_ms {
            // The deadline answer was scored above; now the round closes.
            self.close_round();
            return Ok(Some(feedback));
        }

        match self.select_next(Some(&presented.item_id)) {
            Ok(next) => {
                if let Some(round) = self.round.as_mut() {
                    round.current = Some(PresentedItem {
                        item_id: next,
                        presented_at_ms: now_ms,
                    });
                }
            }
            Err(TrainerError::EmptyScope) => {
                tracing::warn!(mode = %self.mode.mode_id(), "scope emptied mid-round; stopping");
                self.condition = Some(Condition::EmptyScope);
                self.force_idle();
            }
            Err(e) => return Err(e),
        }
        Ok(Some(feedback))
    }

    // ---- calibration trials ----

    /// The caller presented a calibration stimulus at `now_ms`.
    pub fn begin_calibration_trial(&mut self, now_ms: i64) {
        if self.phase != Phase::Calibrating {
            return;
        }
        if let Some(run) = self.calibration.as_mut() {
            run.stimulus_shown_at = Some(now_ms);
        }
    }

    /// The learner responded to the pending calibration stimulus. When the
    /// trial budget is spent this either persists the new baseline and
    /// starts a round, or returns to idle with a retryable
    /// `CalibrationIncomplete`.
    pub fn complete_calibration_trial(&mut self, now_ms: i64) -> TrainerResult<Phase> {
        if self.phase != Phase::Calibrating {
            return Ok(self.phase);
        }
        let finished = match self.calibration.as_mut() {
            Some(run) => {
                if let Some(shown_at) = run.stimulus_shown_at.take() {
                    run.session.record_latency((now_ms - shown_at).max(0));
                }
                run.session.is_complete()
            }
            None => return Ok(self.phase),
        };
        if !finished {
            return Ok(self.phase);
        }

        match self.calibration.take().map(|run| run.session.finish()) {
            Some(Ok(baseline)) => {
                self.persist_baseline(&baseline);
                tracing::info!(mode = %self.mode.mode_id(),
                    baseline_ms = baseline.baseline_ms, "calibration complete");
                self.baseline = Some(baseline);
                self.begin_round(now_ms)?;
                Ok(self.phase)
            }
            Some(Err(e)) => {
                self.phase = Phase::Idle;
                if let TrainerError::CalibrationIncomplete { valid, required } = e {
                    self.condition = Some(Condition::CalibrationIncomplete { valid, required });
                }
                tracing::warn!(mode = %self.mode.mode_id(), error = %e,
                    "calibration failed; returning to idle");
                Err(e)
            }
            None => Ok(self.phase),
        }
    }

    // ---- scope ----

    /// Enable exactly the given item identifiers; ids outside the universe
    /// are dropped. Emptying the scope during an active round stops the
    /// round with an `EmptyScope` condition.
    pub fn set_enabled_items<I>(&mut self, ids: I) -> TrainerResult<()>
    where
        I: IntoIterator<Item = String>,
    {
        let mut filtered = BTreeSet::new();
        for id in ids {
            if self.model.contains(&id) {
                filtered.insert(id);
            } else {
                tracing::warn!(item_id = %id, mode = %self.mode.mode_id(),
                    "ignoring id outside the universe");
            }
        }
        self.apply_scope(filtered)
    }

    /// Enable exactly the items of the groups at `indices`.
    pub fn set_enabled_groups(&mut self, indices: &[usize]) -> TrainerResult<()> {
        let enabled = self
            .mode
            .groups()
            .iter()
            .filter(|g| indices.contains(&g.index))
            .flat_map(|g| g.items.iter().cloned())
            .collect();
        self.apply_scope(enabled)
    }

    fn apply_scope(&mut self, enabled: BTreeSet<String>) -> TrainerResult<()> {
        let result = self.scope.replace(enabled);
        if let Err(ref e) = result {
            tracing::warn!(error = %e, mode = %self.mode.mode_id(), "scope kept in memory only");
            self.condition = Some(Condition::PersistenceUnavailable);
        }
        if self.phase == Phase::Active && self.scope.is_empty() {
            tracing::warn!(mode = %self.mode.mode_id(), "scope emptied during a round; stopping");
            self.condition = Some(Condition::EmptyScope);
            self.force_idle();
            return Err(TrainerError::EmptyScope);
        }
        result
    }

    // ---- advisory ----

    pub fn compute_recommendation(&self) -> Recommendation {
        recommend::compute_recommendation(
            &self.model,
            &self.mode.groups(),
            self.scope.enabled(),
            &self.config.recommendation,
        )
    }

    /// Apply a recommendation's enlarged enabled set, if it carries one.
    pub fn apply_recommendation(&mut self, recommendation: &Recommendation) -> TrainerResult<bool> {
        match &recommendation.enabled {
            Some(enabled) => {
                self.apply_scope(enabled.clone())?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    // ---- snapshots ----

    pub fn snapshot(&self, now_ms: i64) -> EngineSnapshot {
        let time_remaining_ms = match (self.phase, self.round.as_ref()) {
            (Phase::Active, Some(round)) => (round.deadline_ms - now_ms).max(0),
            _ => 0,
        };
        let enabled = self.scope.enabled();
        let aggregate = self.model.aggregate(enabled.iter().map(|s| s.as_str()));
        EngineSnapshot {
            phase: self.phase,
            time_remaining_ms,
            current_item_id: self
                .round
                .as_ref()
                .and_then(|r| r.current.as_ref())
                .map(|p| p.item_id.clone()),
            mastered_count: aggregate.fluent_count,
            total_enabled_count: enabled.len(),
            last_feedback: self.last_feedback.clone(),
            condition: self.condition.clone(),
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn baseline(&self) -> Option<&MotorBaseline> {
        self.baseline.as_ref()
    }

    /// Prompt text for the currently presented item.
    pub fn current_question(&self) -> Option<String> {
        let current = self.round.as_ref()?.current.as_ref()?;
        self.mode.question(&current.item_id)
    }

    pub fn last_summary(&self) -> Option<&RoundSummary> {
        self.last_summary.as_ref()
    }

    /// Read access to the learner model for overview displays.
    pub fn model(&self) -> &LearnerModel {
        &self.model
    }

    pub fn enabled_items(&self) -> &BTreeSet<String> {
        self.scope.enabled()
    }

    /// Explicit data clear for the mode's trial history. Stops any running
    /// round first.
    pub fn clear_history(&mut self) -> TrainerResult<()> {
        self.stop();
        self.model.clear()
    }

    // ---- internals ----

    fn begin_round(&mut self, now_ms: i64) -> TrainerResult<()> {
        if self.scope.is_empty() {
            self.condition = Some(Condition::EmptyScope);
            self.phase = Phase::Idle;
            return Err(TrainerError::EmptyScope);
        }
        let first = self.select_next(None)?;
        self.round = Some(RoundState {
            deadline_ms: now_ms + self.config.round.duration_ms,
            current: Some(PresentedItem {
                item_id: first,
                presented_at_ms: now_ms,
            }),
            tally: RoundTally::default(),
        });
        self.phase = Phase::Active;
        tracing::info!(mode = %self.mode.mode_id(),
            duration_ms = self.config.round.duration_ms, "round started");
        Ok(())
    }

    fn select_next(&mut self, previous: Option<&str>) -> TrainerResult<String> {
        let candidates: Vec<(String, ItemStat)> = self
            .scope
            .enabled()
            .iter()
            .map(|id| (id.clone(), self.model.stat(id)))
            .collect();
        self.selector
            .pick(&candidates, previous)
            .ok_or(TrainerError::EmptyScope)
    }

    fn close_round(&mut self) {
        let round = match self.round.take() {
            Some(round) => round,
            None => return,
        };
        let tally = round.tally;
        let answered = tally.correct + tally.incorrect;
        let summary = RoundSummary {
            answered,
            correct: tally.correct,
            incorrect: tally.incorrect,
            accuracy: if answered > 0 {
                tally.correct as f64 / answered as f64
            } else {
                0.0
            },
            median_latency_ms: median_latency(&tally.latencies),
            best_streak: tally.best_streak,
            newly_fluent: tally.newly_fluent,
        };
        tracing::info!(mode = %self.mode.mode_id(), answered,
            correct = summary.correct, newly_fluent = summary.newly_fluent.len(),
            "round complete");
        self.last_summary = Some(summary);
        self.phase = Phase::RoundComplete;
    }

    fn force_idle(&mut self) {
        self.round = None;
        self.calibration = None;
        self.phase = Phase::Idle;
    }

    fn persist_baseline(&mut self, baseline: &MotorBaseline) {
        let raw = match serde_json::to_string(baseline) {
            Ok(raw) => raw,
            Err(e) => {
                tracing::warn!(error = %e, "baseline kept in memory only");
                self.condition = Some(Condition::PersistenceUnavailable);
                return;
            }
        };
        if let Err(e) = self
            .store
            .write(&baseline_key(self.mode.mode_id()), &raw)
        {
            tracing::warn!(error = %e, "baseline kept in memory only");
            self.condition = Some(Condition::PersistenceUnavailable);
        }
    }
}

fn median_latency(latencies: &[i64]) -> i64 {
    if latencies.is_empty() {
        return 0;
    }
    let mut sorted = latencies.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2
    } else {
        sorted[mid]
    }
}
