/// Run phase definitions for a single harvest invocation
///
/// A run moves `Start → Paging → Publishing → Done`; `Failed` is reachable
/// from `Paging` and `Publishing`.
use std::fmt;

/// Represents the current phase of a harvest run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunPhase {
    // ===== Active Phases =====
    /// Checkpoint is being loaded
    Start,

    /// Search pages are being fetched and records resolved
    Paging,

    /// The accumulated batch is being published and the checkpoint saved
    Publishing,

    // ===== Terminal Phases =====
    /// Batch published (or nothing to publish) and checkpoint saved
    Done,

    /// Run aborted; checkpoint untouched, nothing published
    Failed,
}

impl RunPhase {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }

    /// Returns true if the run ended successfully
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Done)
    }

    /// Returns true if moving from this phase to `next` is allowed
    pub fn can_transition_to(&self, next: RunPhase) -> bool {
        matches!(
            (self, next),
            (Self::Start, Self::Paging)
                | (Self::Paging, Self::Publishing)
                | (Self::Paging, Self::Failed)
                | (Self::Publishing, Self::Done)
                | (Self::Publishing, Self::Failed)
        )
    }

    /// Converts the phase to its ledger string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Start => "start",
            Self::Paging => "paging",
            Self::Publishing => "publishing",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    /// Parses a phase from its ledger string representation
    ///
    /// Returns None if the string doesn't match any known phase.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "start" => Some(Self::Start),
            "paging" => Some(Self::Paging),
            "publishing" => Some(Self::Publishing),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }

    /// Returns all phases
    pub fn all_phases() -> Vec<Self> {
        vec![
            Self::Start,
            Self::Paging,
            Self::Publishing,
            Self::Done,
            Self::Failed,
        ]
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_db_string())
    }
}
