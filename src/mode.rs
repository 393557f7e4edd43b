//! The seam between the adaptive core and mode-specific content.
//!
//! Question text, answer checking, and the static item universe all live
//! behind [`PracticeMode`]; the engine never reaches into mode internals.

use serde::{Deserialize, Serialize};

/// One difficulty-ordered subset of a mode's universe. Groups are
/// disjoint and carry a stable ascending index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PracticeGroup {
    pub index: usize,
    pub label: String,
    pub items: Vec<String>,
}

/// Capabilities a practice mode supplies to the core.
pub trait PracticeMode {
    /// Stable identifier; scopes the mode's persisted keys.
    fn mode_id(&self) -> &str;

    /// The full item universe, each item addressable by a stable string
    /// key unique within the mode.
    fn universe(&self) -> Vec<String>;

    /// Static grouping metadata over the universe.
    fn groups(&self) -> Vec<PracticeGroup>;

    /// Prompt for an item. Presentation is the caller's concern.
    fn question(&self, item_id: &str) -> Option<String>;

    /// Check raw learner input against the item's expected answer.
    fn check_answer(&self, item_id: &str, input: &str) -> bool;
}
