/// Frontier entry state definitions
///
/// Every canonical URL the Frontier has ever seen is in exactly one of these
/// states. Transitions only move forward.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Represents the crawl state of a frontier entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    // ===== Active States =====
    /// Accepted by the Frontier, task not yet published (possibly deferred)
    Pending,

    /// Task published to the task queue, no terminal result yet
    Dispatched,

    // ===== Terminal States =====
    /// Page was fetched and its result ingested
    Done,

    /// Permanent fetch failure or redelivery exhausted
    Failed,

    /// Excluded by domain policy, robots.txt or the URL budget
    Excluded,
}

impl EntryState {
    /// Returns true if no further transition is possible
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Excluded)
    }

    /// Returns true while the entry occupies a slot in the crawl pipeline
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Pending | Self::Dispatched)
    }

    /// Checks whether `self -> next` is a legal transition
    ///
    /// Legal transitions are `pending -> dispatched`, `pending -> excluded`,
    /// `pending -> failed` and `dispatched -> {done, failed, excluded}`.
    pub fn can_transition_to(&self, next: EntryState) -> bool {
        match (self, next) {
            (Self::Pending, Self::Dispatched | Self::Excluded | Self::Failed) => true,
            (Self::Dispatched, Self::Done | Self::Failed | Self::Excluded) => true,
            _ => false,
        }
    }

    /// Converts the state to its wire/log string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Dispatched => "dispatched",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Excluded => "excluded",
        }
    }

    /// Parses a state from its string representation
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "dispatched" => Some(Self::Dispatched),
            "done" => Some(Self::Done),
            "failed" => Some(Self::Failed),
            "excluded" => Some(Self::Excluded),
            _ => None,
        }
    }

    /// Returns all possible entry states
    pub fn all_states() -> [Self; 5] {
        [
            Self::Pending,
            Self::Dispatched,
            Self::Done,
            Self::Failed,
            Self::Excluded,
        ]
    }
}

impl fmt::Display for EntryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
