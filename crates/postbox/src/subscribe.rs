//! The subscription vocabulary: options, argument bindings, and generic
//! slot expectations attached to handler declarations.

use crate::phase::EventPhase;
use serde::{Deserialize, Serialize};
use std::any::TypeId;

/// Subscription options for a handler declaration.
///
/// A declaration that carries no options inherits them from the declaration
/// it overrides (see [`HandlerTable`](crate::table::HandlerTable)); absence
/// anywhere in the base tables yields these defaults.
///
/// ```
/// use postbox::{EventPhase, Subscribe};
///
/// let options = Subscribe::new()
///     .phase(EventPhase::Pre)
///     .receive_canceled(true);
/// assert_eq!(options.phase, EventPhase::Pre);
/// assert!(!options.deferred);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "snake_case")]
pub struct Subscribe {
    /// Phase the handler receives the event in.
    pub phase: EventPhase,
    /// Whether the handler still runs once the event is canceled.
    pub receive_canceled: bool,
    /// Whether the handler is inactive unless a derived table overrides it.
    pub deferred: bool,
}

impl Subscribe {
    /// Options with all defaults: `Default` phase, skip canceled events,
    /// not deferred.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the phase the handler receives the event in.
    pub fn phase(mut self, phase: EventPhase) -> Self {
        self.phase = phase;
        self
    }

    /// Set whether the handler still runs once the event is canceled.
    pub fn receive_canceled(mut self, receive_canceled: bool) -> Self {
        self.receive_canceled = receive_canceled;
        self
    }

    /// Set whether the handler is inactive unless overridden.
    pub fn deferred(mut self, deferred: bool) -> Self {
        self.deferred = deferred;
        self
    }
}

/// An extra-argument binding on a handler declaration.
///
/// Bindings are positional: the dispatch engine materializes one argument
/// per binding, in declaration order, and hands them to the handler as a
/// [`HandlerArgs`](crate::dispatch::HandlerArgs).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Binding {
    /// The named event property.
    Unpack(&'static str),
    /// The previous handler's result (or the default / cancellation flag).
    PreviousResult,
    /// Resolve the binding at this position from the overridden declaration.
    Inherited,
}

/// A handler's expectation for one generic argument slot.
#[derive(Debug, Clone)]
pub enum GenericArg {
    /// Accept any bound argument in this slot.
    Wildcard,
    /// Accept a bound argument that is `ty` or declares it as a supertype.
    Is {
        /// The expected type.
        id: TypeId,
        /// Name of the expected type.
        name: &'static str,
    },
}

impl GenericArg {
    /// Expect the slot to match `T`.
    pub fn of<T: 'static>() -> Self {
        Self::Is {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Accept anything in the slot.
    pub fn wildcard() -> Self {
        Self::Wildcard
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscribe_defaults() {
        let options = Subscribe::new();
        assert_eq!(options.phase, EventPhase::Default);
        assert!(!options.receive_canceled);
        assert!(!options.deferred);
    }

    #[test]
    fn test_subscribe_builders() {
        let options = Subscribe::new()
            .phase(EventPhase::Cancellation)
            .receive_canceled(true)
            .deferred(true);
        assert_eq!(options.phase, EventPhase::Cancellation);
        assert!(options.receive_canceled);
        assert!(options.deferred);
    }

    #[test]
    fn test_generic_arg_of() {
        struct Marker;
        match GenericArg::of::<Marker>() {
            GenericArg::Is { id, .. } => assert_eq!(id, TypeId::of::<Marker>()),
            GenericArg::Wildcard => panic!("expected a typed slot"),
        }
    }
}
