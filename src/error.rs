use thiserror::Error;

/// Storage-layer error type
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("lock acquisition failed: {0}")]
    Lock(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Recoverable error taxonomy of the adaptive core.
///
/// Every variant is recoverable at the quiz-engine boundary: the engine
/// catches it, surfaces it through the state snapshot, and settles in the
/// idle phase at worst.
#[derive(Error, Debug)]
pub enum TrainerError {
    /// An identifier outside the mode's item universe was passed to the
    /// learner model. Fatal to the call, not to the process.
    #[error("unknown item id: {0}")]
    InvalidItem(String),

    /// No enabled items remain in scope at round start or mid-round.
    #[error("no enabled items in scope")]
    EmptyScope,

    /// Too few valid calibration trials completed; retryable.
    #[error("calibration incomplete: {valid} valid of {required} required trials")]
    CalibrationIncomplete { valid: usize, required: usize },

    /// A storage write failed. The in-memory model remains authoritative
    /// for the rest of the process; durability resumes on the next
    /// successful write.
    #[error("persistence unavailable: {0}")]
    PersistenceUnavailable(#[from] StorageError),
}

pub type TrainerResult<T> = Result<T, TrainerError>;
