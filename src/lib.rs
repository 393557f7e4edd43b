//! # theoria - adaptive drill core for music-theory recall training
//!
//! This crate owns the adaptive behavior of a timed skill-drilling
//! trainer: which item to ask next, how each answer moves the per-item
//! automaticity model, and when the learner is ready for more material.
//! Question content, answer formats, and rendering live behind the
//! [`PracticeMode`] trait; persistence lives behind [`KeyValueStore`].
//!
//! ## Modules
//!
//! - [`model`] - per-item trial statistics and the automaticity update
//! - [`engine`] - the round state machine (idle / calibrating / active /
//!   round-complete)
//! - [`calibration`] - motor-baseline measurement
//! - [`recommend`] - practice-scope expansion advisory
//! - [`select`] - weighted random item selection with anti-repeat
//! - [`scope`] - the enabled subset of the item universe
//! - [`storage`] - opaque key/value persistence
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use theoria::{MemoryStore, PracticeGroup, PracticeMode, QuizEngine, TrainerConfig};
//!
//! struct Naturals;
//!
//! impl PracticeMode for Naturals {
//!     fn mode_id(&self) -> &str {
//!         "naturals"
//!     }
//!     fn universe(&self) -> Vec<String> {
//!         vec!["C".into(), "D".into(), "E".into()]
//!     }
//!     fn groups(&self) -> Vec<PracticeGroup> {
//!         vec![PracticeGroup {
//!             index: 0,
//!             label: "naturals".into(),
//!             items: self.universe(),
//!         }]
//!     }
//!     fn question(&self, item_id: &str) -> Option<String> {
//!         Some(format!("name the note {item_id}"))
//!     }
//!     fn check_answer(&self, item_id: &str, input: &str) -> bool {
//!         input.eq_ignore_ascii_case(item_id)
//!     }
//! }
//!
//! let mut engine = QuizEngine::new(Naturals, TrainerConfig::default(), Arc::new(MemoryStore::new()));
//! engine.set_enabled_groups(&[0]).unwrap();
//! engine.start(0).unwrap();
//! ```

pub mod calibration;
pub mod config;
pub mod engine;
pub mod error;
pub mod mode;
pub mod model;
pub mod recommend;
pub mod scope;
pub mod select;
pub mod storage;
pub mod types;

pub use config::TrainerConfig;
pub use engine::QuizEngine;
pub use error::{StorageError, StorageResult, TrainerError, TrainerResult};
pub use mode::{PracticeGroup, PracticeMode};
pub use model::LearnerModel;
pub use recommend::{compute_recommendation, weakest_items, GroupSuggestion, Recommendation};
pub use scope::ScopeState;
pub use select::ItemSelector;
pub use storage::{JsonFileStore, KeyValueStore, MemoryStore};
pub use types::*;
