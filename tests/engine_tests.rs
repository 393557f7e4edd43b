//! Integration tests for the quiz engine state machine.
//!
//! Every timed behavior is driven through explicit `now_ms` events, so
//! the scenarios are fully deterministic.

use std::sync::Arc;

use theoria::error::StorageResult;
use theoria::types::{Condition, Feedback, Fluency, MotorBaseline, Phase};
use theoria::{
    KeyValueStore, MemoryStore, PracticeGroup, PracticeMode, QuizEngine, StorageError,
    TrainerConfig, TrainerError,
};

const FIXED_TIMESTAMP: i64 = 1_700_000_000_000;
const ROUND_MS: i64 = 60_000;

struct NoteMode;

impl PracticeMode for NoteMode {
    fn mode_id(&self) -> &str {
        "notes"
    }

    fn universe(&self) -> Vec<String> {
        ["C:fwd", "D:fwd", "E:fwd", "F:fwd", "G:fwd"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn groups(&self) -> Vec<PracticeGroup> {
        vec![
            PracticeGroup {
                index: 0,
                label: "line notes".to_string(),
                items: vec!["C:fwd".to_string(), "D:fwd".to_string()],
            },
            PracticeGroup {
                index: 1,
                label: "space notes".to_string(),
                items: vec!["E:fwd".to_string(), "F:fwd".to_string()],
            },
            PracticeGroup {
                index: 2,
                label: "ledger notes".to_string(),
                items: vec!["G:fwd".to_string()],
            },
        ]
    }

    fn question(&self, item_id: &str) -> Option<String> {
        Some(format!("name the note {item_id}"))
    }

    fn check_answer(&self, item_id: &str, input: &str) -> bool {
        input == item_id
    }
}

fn memory_store() -> Arc<dyn KeyValueStore> {
    Arc::new(MemoryStore::new())
}

fn seeded_engine(store: Arc<dyn KeyValueStore>) -> QuizEngine<NoteMode> {
    QuizEngine::with_seed(NoteMode, TrainerConfig::default(), store, 42)
}

fn write_baseline(store: &dyn KeyValueStore, baseline_ms: f64) {
    let baseline = MotorBaseline {
        baseline_ms,
        sample_count: 5,
        updated_at: "2026-01-01T00:00:00Z".to_string(),
    };
    store
        .write("notes:baseline", &serde_json::to_string(&baseline).unwrap())
        .unwrap();
}

/// Answer the currently presented item correctly at `now_ms`.
fn answer_current(engine: &mut QuizEngine<NoteMode>, now_ms: i64) -> Feedback {
    let current = engine
        .snapshot(now_ms)
        .current_item_id
        .expect("an item should be presented");
    engine
        .submit_answer(&current, now_ms)
        .unwrap()
        .expect("active round should yield feedback")
}

/// Run a full calibration pass with a constant tap latency. Returns the
/// outcome of the final trial.
fn run_calibration(
    engine: &mut QuizEngine<NoteMode>,
    start_ms: i64,
    latency_ms: i64,
) -> Result<Phase, TrainerError> {
    let mut now = start_ms;
    let mut outcome = Ok(Phase::Calibrating);
    for _ in 0..5 {
        engine.begin_calibration_trial(now);
        outcome = engine.complete_calibration_trial(now + latency_ms);
        now += latency_ms + 1_000;
    }
    outcome
}

// ----------------------------------------------------------------------------
// Round start and scope guard
// ----------------------------------------------------------------------------

#[test]
fn start_with_empty_scope_stays_idle() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);

    let err = engine.start(FIXED_TIMESTAMP).unwrap_err();
    assert!(matches!(err, TrainerError::EmptyScope));
    assert_eq!(engine.phase(), Phase::Idle);

    let snapshot = engine.snapshot(FIXED_TIMESTAMP);
    assert_eq!(snapshot.phase, Phase::Idle);
    assert_eq!(snapshot.condition, Some(Condition::EmptyScope));
}

#[test]
fn start_with_baseline_goes_straight_to_active() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();

    assert_eq!(engine.start(FIXED_TIMESTAMP).unwrap(), Phase::Active);
    let snapshot = engine.snapshot(FIXED_TIMESTAMP);
    assert_eq!(snapshot.time_remaining_ms, ROUND_MS);
    assert!(snapshot.current_item_id.is_some());
    assert_eq!(snapshot.total_enabled_count, 2);
    assert!(engine.current_question().is_some());
}

// ----------------------------------------------------------------------------
// Calibration
// ----------------------------------------------------------------------------

#[test]
fn start_without_baseline_calibrates_then_runs() {
    let store = memory_store();
    let mut engine = seeded_engine(Arc::clone(&store));
    engine.set_enabled_groups(&[0]).unwrap();

    assert_eq!(engine.start(FIXED_TIMESTAMP).unwrap(), Phase::Calibrating);
    let phase = run_calibration(&mut engine, FIXED_TIMESTAMP, 450).unwrap();
    assert_eq!(phase, Phase::Active);

    let baseline = engine.baseline().expect("baseline should be set");
    assert!((baseline.baseline_ms - 450.0).abs() < f64::EPSILON);
    assert!(
        store.read("notes:baseline").unwrap().is_some(),
        "baseline should be persisted"
    );
}

#[test]
fn failed_calibration_returns_idle_and_is_retryable() {
    let store = memory_store();
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    // Every tap is anticipatory, far below the validity window.
    let err = run_calibration(&mut engine, FIXED_TIMESTAMP, 10).unwrap_err();
    assert!(matches!(
        err,
        TrainerError::CalibrationIncomplete { valid: 0, required: 3 }
    ));
    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(
        engine.snapshot(FIXED_TIMESTAMP).condition,
        Some(Condition::CalibrationIncomplete {
            valid: 0,
            required: 3
        })
    );

    // Retry succeeds with plausible taps.
    assert_eq!(engine.start(FIXED_TIMESTAMP).unwrap(), Phase::Calibrating);
    let phase = run_calibration(&mut engine, FIXED_TIMESTAMP, 400).unwrap();
    assert_eq!(phase, Phase::Active);
}

#[test]
fn recalibration_replaces_the_old_baseline() {
    let store = memory_store();
    write_baseline(store.as_ref(), 900.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();

    assert_eq!(engine.recalibrate().unwrap(), Phase::Calibrating);
    run_calibration(&mut engine, FIXED_TIMESTAMP, 400).unwrap();
    let baseline = engine.baseline().unwrap();
    assert!((baseline.baseline_ms - 400.0).abs() < f64::EPSILON);
}

// ----------------------------------------------------------------------------
// Answer flow and round timing
// ----------------------------------------------------------------------------

#[test]
fn selection_never_repeats_the_previous_item() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0, 1]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    let mut now = FIXED_TIMESTAMP;
    let mut previous = engine.snapshot(now).current_item_id.unwrap();
    for _ in 0..200 {
        now += 100;
        engine.submit_answer(&previous, now).unwrap();
        let current = engine
            .snapshot(now)
            .current_item_id
            .expect("round should still be active");
        assert_ne!(current, previous, "previous item was re-selected");
        previous = current;
    }
}

#[test]
fn answer_before_the_deadline_keeps_the_round_active() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    answer_current(&mut engine, FIXED_TIMESTAMP + 1_000);
    assert_eq!(engine.phase(), Phase::Active);
}

#[test]
fn answer_at_the_deadline_is_scored_then_closes_the_round() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    let feedback = answer_current(&mut engine, FIXED_TIMESTAMP + ROUND_MS);
    assert!(feedback.correct);
    assert_eq!(engine.phase(), Phase::RoundComplete);

    let summary = engine.last_summary().expect("summary should exist");
    assert_eq!(summary.answered, 1);
    assert_eq!(summary.correct, 1);

    // The round closed exactly once; further submissions are ignored.
    assert!(engine
        .submit_answer("C:fwd", FIXED_TIMESTAMP + ROUND_MS + 1)
        .unwrap()
        .is_none());
    assert_eq!(engine.last_summary().unwrap().answered, 1);
}

#[test]
fn tick_closes_an_expired_round() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    engine.tick(FIXED_TIMESTAMP + ROUND_MS - 1);
    assert_eq!(engine.phase(), Phase::Active);

    engine.tick(FIXED_TIMESTAMP + ROUND_MS);
    assert_eq!(engine.phase(), Phase::RoundComplete);

    // A stale tick after completion changes nothing.
    engine.tick(FIXED_TIMESTAMP + ROUND_MS + 5_000);
    assert_eq!(engine.phase(), Phase::RoundComplete);
}

#[test]
fn continue_quiz_starts_a_fresh_round_without_recalibration() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();
    engine.tick(FIXED_TIMESTAMP + ROUND_MS);
    assert_eq!(engine.phase(), Phase::RoundComplete);

    let resume = FIXED_TIMESTAMP + ROUND_MS + 2_000;
    assert_eq!(engine.continue_quiz(resume).unwrap(), Phase::Active);
    assert_eq!(engine.snapshot(resume).time_remaining_ms, ROUND_MS);
}

#[test]
fn stop_discards_tallies_but_keeps_recorded_trials() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(Arc::clone(&store));
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    let mut now = FIXED_TIMESTAMP;
    for _ in 0..3 {
        now += 400;
        answer_current(&mut engine, now);
    }
    engine.stop();
    assert_eq!(engine.phase(), Phase::Idle);
    assert!(engine.last_summary().is_none());

    // The model survives a process restart on the same store.
    let reloaded = seeded_engine(store);
    let total: u32 = ["C:fwd", "D:fwd"]
        .iter()
        .map(|id| reloaded.model().stat(id).trial_count)
        .sum();
    assert_eq!(total, 3);
}

#[test]
fn clear_history_is_the_only_reset() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(Arc::clone(&store));
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();
    answer_current(&mut engine, FIXED_TIMESTAMP + 400);

    engine.clear_history().unwrap();
    assert_eq!(engine.phase(), Phase::Idle);

    let reloaded = seeded_engine(store);
    assert_eq!(reloaded.model().stat("C:fwd").trial_count, 0);
    assert_eq!(reloaded.model().stat("D:fwd").trial_count, 0);
}

#[test]
fn emptying_the_scope_mid_round_fails_safe() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();
    answer_current(&mut engine, FIXED_TIMESTAMP + 500);

    let err = engine.set_enabled_items(Vec::new()).unwrap_err();
    assert!(matches!(err, TrainerError::EmptyScope));
    assert_eq!(engine.phase(), Phase::Idle);
    assert_eq!(
        engine.snapshot(FIXED_TIMESTAMP + 500).condition,
        Some(Condition::EmptyScope)
    );
}

// ----------------------------------------------------------------------------
// Learning end-to-end
// ----------------------------------------------------------------------------

#[test]
fn five_fast_correct_answers_reach_fluency() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine
        .set_enabled_items(vec!["C:fwd".to_string()])
        .unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    let mut now = FIXED_TIMESTAMP;
    for _ in 0..5 {
        now += 400;
        let feedback = answer_current(&mut engine, now);
        assert_eq!(feedback.item_id, "C:fwd");
        assert!(feedback.correct);
        assert_eq!(feedback.latency_ms, 400);
    }
    assert_eq!(engine.model().classify("C:fwd"), Fluency::Fluent);

    let snapshot = engine.snapshot(now);
    assert_eq!(snapshot.mastered_count, 1);
    assert_eq!(snapshot.total_enabled_count, 1);
}

#[test]
fn round_summary_reports_counts_median_and_newly_fluent() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine
        .set_enabled_items(vec!["C:fwd".to_string()])
        .unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    let mut now = FIXED_TIMESTAMP;
    for _ in 0..5 {
        now += 400;
        answer_current(&mut engine, now);
    }
    now += 400;
    engine.submit_answer("wrong", now).unwrap();
    engine.tick(FIXED_TIMESTAMP + ROUND_MS);

    let summary = engine.last_summary().expect("summary should exist");
    assert_eq!(summary.answered, 6);
    assert_eq!(summary.correct, 5);
    assert_eq!(summary.incorrect, 1);
    assert_eq!(summary.best_streak, 5);
    assert_eq!(summary.median_latency_ms, 400);
    assert_eq!(summary.newly_fluent, vec!["C:fwd".to_string()]);
}

// ----------------------------------------------------------------------------
// Recommendation
// ----------------------------------------------------------------------------

#[test]
fn fluent_group_recommends_the_next_one() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();
    engine.start(FIXED_TIMESTAMP).unwrap();

    // Anti-repeat alternates between the two enabled items; ten fast
    // correct answers train both past the threshold.
    let mut now = FIXED_TIMESTAMP;
    for _ in 0..10 {
        now += 400;
        answer_current(&mut engine, now);
    }
    engine.stop();

    let recommendation = engine.compute_recommendation();
    assert!((recommendation.fluency_ratio - 1.0).abs() < f64::EPSILON);
    let suggestion = recommendation.suggestion.as_ref().expect("expansion expected");
    assert_eq!(suggestion.index, 1);
    assert_eq!(suggestion.label, "space notes");
    assert!(!suggestion.justification.is_empty());

    assert!(engine.apply_recommendation(&recommendation).unwrap());
    assert!(engine.enabled_items().contains("E:fwd"));
    assert!(engine.enabled_items().contains("F:fwd"));
}

#[test]
fn weak_group_recommends_nothing() {
    let store = memory_store();
    write_baseline(store.as_ref(), 500.0);
    let mut engine = seeded_engine(store);
    engine.set_enabled_groups(&[0]).unwrap();

    let recommendation = engine.compute_recommendation();
    assert!(recommendation.fluency_ratio < 0.7);
    assert!(recommendation.suggestion.is_none());
    assert!(!engine.apply_recommendation(&recommendation).unwrap());
}

// ----------------------------------------------------------------------------
// Persistence behavior
// ----------------------------------------------------------------------------

struct FailingStore;

impl KeyValueStore for FailingStore {
    fn read(&self, _key: &str) -> StorageResult<Option<String>> {
        Ok(None)
    }

    fn write(&self, _key: &str, _value: &str) -> StorageResult<()> {
        Err(StorageError::Lock("store down".to_string()))
    }

    fn delete(&self, _key: &str) -> StorageResult<()> {
        Err(StorageError::Lock("store down".to_string()))
    }
}

#[test]
fn failed_writes_leave_the_memory_model_authoritative() {
    let mut engine = QuizEngine::with_seed(
        NoteMode,
        TrainerConfig::default(),
        Arc::new(FailingStore),
        42,
    );
    // Scope write fails, yet the in-memory scope applies.
    assert!(engine.set_enabled_groups(&[0]).is_err());
    assert_eq!(engine.enabled_items().len(), 2);

    engine.start(FIXED_TIMESTAMP).unwrap();
    let phase = run_calibration(&mut engine, FIXED_TIMESTAMP, 450).unwrap();
    assert_eq!(phase, Phase::Active, "engine keeps running without durability");

    let feedback = answer_current(&mut engine, FIXED_TIMESTAMP + 10_000);
    assert!(feedback.correct);
    assert_eq!(
        engine.snapshot(FIXED_TIMESTAMP + 10_000).condition,
        Some(Condition::PersistenceUnavailable)
    );
    assert_eq!(engine.model().stat(&feedback.item_id).trial_count, 1);
}

#[test]
fn file_backed_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("trainer.json");

    {
        let store: Arc<dyn KeyValueStore> =
            Arc::new(theoria::JsonFileStore::open(&path).unwrap());
        write_baseline(store.as_ref(), 500.0);
        let mut engine = seeded_engine(store);
        engine.set_enabled_groups(&[0]).unwrap();
        engine.start(FIXED_TIMESTAMP).unwrap();
        let mut now = FIXED_TIMESTAMP;
        for _ in 0..4 {
            now += 400;
            answer_current(&mut engine, now);
        }
    }

    let store: Arc<dyn KeyValueStore> = Arc::new(theoria::JsonFileStore::open(&path).unwrap());
    let engine = seeded_engine(store);
    assert!(engine.baseline().is_some());
    assert_eq!(engine.enabled_items().len(), 2);
    let total: u32 = ["C:fwd", "D:fwd"]
        .iter()
        .map(|id| engine.model().stat(id).trial_count)
        .sum();
    assert_eq!(total, 4);
}
