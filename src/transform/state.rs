use serde::{Deserialize, Serialize};

/// Lifecycle of a transform run
///
/// `Idle -> Reading -> Merging -> Validating -> Writing -> Done`, with
/// `Failed` and `Cancelled` reachable from any non-terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransformState {
    /// Configured, not started
    Idle,
    /// Sources streaming; nodes merging, edges spooling
    Reading,
    /// Spooled edges merging; store sealed at the end
    Merging,
    /// Filtering and validating records and dispatching them to sinks
    Validating,
    /// Sinks draining, flushing and closing
    Writing,
    Done,
    Failed,
    Cancelled,
}

impl TransformState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    /// Whether `next` may follow `self`
    pub fn can_advance_to(self, next: TransformState) -> bool {
        use TransformState::*;
        match (self, next) {
            (from, Failed | Cancelled) => !from.is_terminal(),
            (Idle, Reading)
            | (Reading, Merging)
            | (Merging, Validating)
            | (Validating, Writing)
            | (Writing, Done) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for TransformState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(self, f)
    }
}
