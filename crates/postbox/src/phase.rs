//! Phases of an event's lifecycle.
//!
//! Every post walks the same fixed sequence: an optional cancellation vote,
//! then the three functional phases. Handlers pick their phase through
//! [`Subscribe::phase`](crate::subscribe::Subscribe).

use serde::{Deserialize, Serialize};

/// A phase of an event's lifecycle.
///
/// Phases always execute in declaration order: `Cancellation` (only for
/// events that can be canceled), then `Pre`, `Default`, `Post`.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EventPhase {
    /// Decides whether the event is canceled before any functional phase runs.
    ///
    /// Handlers in this phase receive the current cancellation flag as their
    /// previous-result argument and must return the new flag. No other state
    /// should change here.
    Cancellation,
    /// First functional phase, mainly for setting up state ahead of `Default`.
    Pre,
    /// The main functional phase and the subscription default.
    #[default]
    Default,
    /// Last functional phase, mainly for resetting state altered in `Pre`.
    Post,
}

impl EventPhase {
    /// All phases in execution order.
    pub const ALL: [EventPhase; 4] = [
        EventPhase::Cancellation,
        EventPhase::Pre,
        EventPhase::Default,
        EventPhase::Post,
    ];

    /// The functional phases, in execution order.
    pub const FUNCTIONAL: [EventPhase; 3] = [EventPhase::Pre, EventPhase::Default, EventPhase::Post];

    /// Whether this phase is one of the functional phases.
    pub fn is_functional(self) -> bool {
        !matches!(self, EventPhase::Cancellation)
    }

    /// Position of this phase in the execution order.
    pub(crate) fn index(self) -> usize {
        match self {
            EventPhase::Cancellation => 0,
            EventPhase::Pre => 1,
            EventPhase::Default => 2,
            EventPhase::Post => 3,
        }
    }
}

impl std::fmt::Display for EventPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cancellation => write!(f, "cancellation"),
            Self::Pre => write!(f, "pre"),
            Self::Default => write!(f, "default"),
            Self::Post => write!(f, "post"),
        }
    }
}
