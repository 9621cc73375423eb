//! Error types for registration and dispatch.

use crate::phase::EventPhase;
use thiserror::Error;

/// Errors raised by handler registration and event dispatch.
///
/// All failures are local and synchronous: they surface at the call that
/// triggered them and nothing is retried. A failing handler aborts the
/// remaining handlers of its phase and propagates to the poster.
#[derive(Error, Debug)]
pub enum EventError {
    /// A handler declaration does not fit the registration target
    /// (static handler registered with an instance, or the reverse).
    #[error("handler `{handler}` on `{listener}` is a {declared} handler and cannot be registered with {target} target")]
    MismatchedHandlerKind {
        /// Listener type that owns the declaration.
        listener: &'static str,
        /// Declaration key of the offending handler.
        handler: &'static str,
        /// Kind the handler was declared as.
        declared: &'static str,
        /// Kind of the registration target.
        target: &'static str,
    },

    /// A handler declaration is structurally invalid.
    #[error("malformed handler `{handler}`: {reason}")]
    MalformedHandler {
        /// Declaration key of the offending handler.
        handler: String,
        /// What is wrong with it.
        reason: String,
    },

    /// Registration state was mutated while the bus is locked.
    #[error("event bus `{bus}` is locked")]
    LockedBus {
        /// Name of the bus.
        bus: String,
    },

    /// A manually driven phase was fired a second time.
    #[error("phase `{phase}` has already fired")]
    PhaseAlreadyFired {
        /// The phase that was re-fired.
        phase: EventPhase,
    },

    /// A manually driven phase was fired after a later phase.
    #[error("phase `{phase}` cannot fire after `{later}`")]
    PhaseOutOfOrder {
        /// The phase that was fired too late.
        phase: EventPhase,
        /// The later phase that already fired.
        later: EventPhase,
    },

    /// An unpack binding names a property the event does not declare.
    #[error("event `{event}` declares no property `{property}`")]
    MissingProperty {
        /// Event type the property was looked up on.
        event: &'static str,
        /// The missing property name.
        property: &'static str,
    },

    /// A property getter was applied to an event of a different type.
    #[error("property `{property}` cannot be read from `{event}`")]
    ForeignProperty {
        /// The property name.
        property: &'static str,
        /// Runtime type of the event it was applied to.
        event: &'static str,
    },

    /// A generic event was posted before its type arguments were known.
    #[error("generic event `{event}` was posted without established type arguments")]
    UnresolvedGenericArguments {
        /// The event type.
        event: &'static str,
    },

    /// A handler argument could not be downcast to the requested type.
    #[error("handler `{handler}` argument {index} is not a `{expected}`")]
    ArgumentType {
        /// Declaration key of the handler.
        handler: &'static str,
        /// Zero-based argument position.
        index: usize,
        /// The type the handler asked for.
        expected: &'static str,
    },

    /// A handler returned a value of the wrong type for its phase.
    #[error("handler `{handler}` must return a `{expected}`")]
    ResultType {
        /// Declaration key of the handler.
        handler: &'static str,
        /// The type the phase requires.
        expected: &'static str,
    },

    /// The chained result no longer matches the event's declared result
    /// type.
    #[error("result of `{event}` is not a `{expected}`")]
    ResultChainType {
        /// The event type.
        event: &'static str,
        /// The declared result type.
        expected: &'static str,
    },

    /// A handler body failed.
    #[error("handler `{handler}` failed")]
    HandlerFailed {
        /// Declaration key of the handler.
        handler: &'static str,
        /// The underlying failure.
        #[source]
        source: anyhow::Error,
    },
}

impl EventError {
    /// Create a malformed-handler error.
    pub fn malformed(handler: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedHandler {
            handler: handler.into(),
            reason: reason.into(),
        }
    }

    /// Create a locked-bus error.
    pub fn locked(bus: impl Into<String>) -> Self {
        Self::LockedBus { bus: bus.into() }
    }

    /// Create a handler-failure error.
    pub fn handler_failed(handler: &'static str, source: anyhow::Error) -> Self {
        Self::HandlerFailed { handler, source }
    }
}

/// Result alias used throughout the crate.
pub type EventResult<T> = Result<T, EventError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EventError::locked("game");
        assert_eq!(err.to_string(), "event bus `game` is locked");

        let err = EventError::PhaseOutOfOrder {
            phase: EventPhase::Pre,
            later: EventPhase::Post,
        };
        assert_eq!(err.to_string(), "phase `pre` cannot fire after `post`");
    }

    #[test]
    fn test_handler_failure_source() {
        let err = EventError::handler_failed("on_load", anyhow::anyhow!("boom"));
        let source = std::error::Error::source(&err).expect("source");
        assert_eq!(source.to_string(), "boom");
    }
}
