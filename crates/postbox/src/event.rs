//! The event model: the [`Event`] trait and its optional facets.
//!
//! An event is an opaque payload identified by its runtime type. Behavior
//! beyond plain delivery is opt-in through facets, each surfaced by a
//! capability accessor on [`Event`]:
//!
//! - [`Cancelable`]: the event gets a cancellation phase before its
//!   functional phases.
//! - [`Generic`]: the event carries runtime type arguments; handlers are
//!   filtered per argument slot.
//! - [`SideAware`]: the event exposes a [`Side`] that handlers can filter
//!   on statically.
//! - [`WithResult`]: handlers thread a result value through the post.
//!
//! The accessors default to `None`, so implementing `Event` alone yields a
//! plain broadcast payload:
//!
//! ```
//! use postbox::Event;
//! use std::any::Any;
//!
//! struct BlockPlaced {
//!     x: i32,
//!     y: i32,
//! }
//!
//! impl Event for BlockPlaced {
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//! ```

use crate::property::PropertyDef;
use crate::side::Side;
use bitflags::bitflags;
use std::any::{Any, TypeId};
use std::sync::Arc;

/// A type-erased value threaded through handlers as the chained result.
pub type ResultValue = Arc<dyn Any + Send + Sync>;

bitflags! {
    /// Capability summary of an event, derived from its facet accessors.
    ///
    /// Used for logging and quick checks; the accessors remain the source
    /// of truth.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Facets: u8 {
        /// The event has a cancellation phase.
        const CANCELABLE = 1 << 0;
        /// The event carries runtime type arguments.
        const GENERIC = 1 << 1;
        /// The event exposes a side.
        const SIDE_AWARE = 1 << 2;
        /// The event threads a result through its handlers.
        const WITH_RESULT = 1 << 3;
    }
}

/// An object representing an action elsewhere in the host.
///
/// Events are delivered to every handler registered for their runtime type
/// or for any type named by [`Event::ancestors`]. Facets are detected
/// structurally through the `as_*` accessors rather than through a shared
/// base with mandatory overrides.
pub trait Event: Any + Send + Sync {
    /// The event as [`Any`], for downcasting in typed handlers.
    fn as_any(&self) -> &dyn Any;

    /// Event types this event is also delivered as.
    ///
    /// Return the full transitive set; handlers registered for any of these
    /// types receive this event alongside handlers for the concrete type.
    /// Pair this with [`Event::as_ancestor`] so typed handlers for an
    /// ancestor type can borrow its representation, or subscribe to
    /// ancestors through the erased handler constructors.
    fn ancestors() -> Vec<TypeId>
    where
        Self: Sized,
    {
        Vec::new()
    }

    /// Borrow this event's representation as the given ancestor type.
    ///
    /// Events that list [`ancestors`](Event::ancestors) usually embed the
    /// ancestor value and return it here; typed handlers declared for the
    /// ancestor type receive that projection.
    fn as_ancestor(&self, _ancestor: TypeId) -> Option<&dyn Any> {
        None
    }

    /// Named properties handlers can unpack as extra arguments.
    ///
    /// Immutable properties are computed at most once per post; mutable
    /// ones are re-read on every access.
    fn properties(&self) -> Vec<PropertyDef> {
        Vec::new()
    }

    /// The event as [`Cancelable`], if it supports cancellation.
    fn as_cancelable(&self) -> Option<&dyn Cancelable> {
        None
    }

    /// The event as [`SideAware`], if it exposes a side.
    fn as_side_aware(&self) -> Option<&dyn SideAware> {
        None
    }

    /// The event as [`Generic`], if it carries type arguments.
    fn as_generic(&self) -> Option<&dyn Generic> {
        None
    }

    /// The event as an erased result provider, if handlers produce a result.
    fn as_with_result(&self) -> Option<&dyn ProvidesResult> {
        None
    }

    /// Capability summary for this event.
    fn facets(&self) -> Facets {
        let mut facets = Facets::empty();
        if self.as_cancelable().is_some() {
            facets |= Facets::CANCELABLE;
        }
        if self.as_generic().is_some() {
            facets |= Facets::GENERIC;
        }
        if self.as_side_aware().is_some() {
            facets |= Facets::SIDE_AWARE;
        }
        if self.as_with_result().is_some() {
            facets |= Facets::WITH_RESULT;
        }
        facets
    }
}

/// Marker for events that get a cancellation phase.
///
/// Cancellation handlers receive the current flag as their previous-result
/// argument and return the new flag; the final value after the phase is the
/// event's cancellation state for the rest of the post.
pub trait Cancelable: Event {}

/// Events that fire on a specific [`Side`].
pub trait SideAware: Event {
    /// The side this event fires on, read once per post.
    fn event_side(&self) -> Side;
}

/// Events that carry runtime type arguments.
///
/// The arguments are established the first time an instance of the concrete
/// event type is posted and are fixed for the lifetime of the bus from then
/// on. Handlers only receive the event if every one of their declared slots
/// matches; a wildcard slot accepts anything.
pub trait Generic: Event {
    /// The type arguments this instance binds.
    ///
    /// Return an empty vector if the instance cannot supply them; posting
    /// such an instance before the arguments are established fails with
    /// [`EventError::UnresolvedGenericArguments`](crate::EventError::UnresolvedGenericArguments).
    fn type_arguments(&self) -> Vec<TypeArg>;

    /// Whether the bound argument at `index` satisfies a handler slot
    /// expecting `ty`.
    ///
    /// True iff `ty` is the bound argument type itself or one of its
    /// declared supertypes. Wildcard handler slots never reach this check.
    fn matches_generic_type(&self, bound: &[TypeArg], index: usize, ty: TypeId) -> bool {
        bound.get(index).is_some_and(|arg| arg.matches(ty))
    }
}

/// Typed access to an event's chained result.
///
/// Providing a result from a handler is optional; a handler that returns
/// nothing leaves the previous value in place.
pub trait WithResult: Event {
    /// The result type threaded through handlers.
    type Output: Clone + Send + Sync + 'static;

    /// The value handed to the first handler of the post.
    fn default_result(&self) -> Self::Output;
}

/// Object-safe companion of [`WithResult`] used by the dispatch engine.
///
/// Implemented for every [`WithResult`] event; surface it from
/// [`Event::as_with_result`].
pub trait ProvidesResult {
    /// The default result as a type-erased value.
    fn default_result_value(&self) -> ResultValue;
}

impl<E: WithResult> ProvidesResult for E {
    fn default_result_value(&self) -> ResultValue {
        Arc::new(self.default_result())
    }
}

/// A runtime type argument bound by a [`Generic`] event.
///
/// Carries the concrete type plus the supertypes a handler slot may match
/// it through:
///
/// ```
/// use postbox::TypeArg;
///
/// struct Machine;
/// struct Furnace;
///
/// let arg = TypeArg::of::<Furnace>().extending::<Machine>();
/// assert!(arg.matches(std::any::TypeId::of::<Machine>()));
/// ```
#[derive(Debug, Clone)]
pub struct TypeArg {
    id: TypeId,
    name: &'static str,
    supertypes: Vec<TypeId>,
}

impl TypeArg {
    /// A type argument bound to `T` with no declared supertypes.
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
            supertypes: Vec::new(),
        }
    }

    /// Declare `S` as a supertype handler slots may match through.
    pub fn extending<S: 'static>(mut self) -> Self {
        self.supertypes.push(TypeId::of::<S>());
        self
    }

    /// The concrete bound type.
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Name of the concrete bound type.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `ty` is the bound type or one of its declared supertypes.
    pub fn matches(&self, ty: TypeId) -> bool {
        self.id == ty || self.supertypes.contains(&ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base;
    struct Derived;

    struct Plain;

    impl Event for Plain {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct Votable;

    impl Event for Votable {
        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_cancelable(&self) -> Option<&dyn Cancelable> {
            Some(self)
        }
    }

    impl Cancelable for Votable {}

    #[test]
    fn test_plain_event_has_no_facets() {
        assert_eq!(Plain.facets(), Facets::empty());
        assert!(Plain.as_cancelable().is_none());
        assert!(Plain.properties().is_empty());
    }

    #[test]
    fn test_facets_follow_accessors() {
        assert_eq!(Votable.facets(), Facets::CANCELABLE);
    }

    #[test]
    fn test_type_arg_matches_self_and_supertypes() {
        let arg = TypeArg::of::<Derived>().extending::<Base>();
        assert!(arg.matches(TypeId::of::<Derived>()));
        assert!(arg.matches(TypeId::of::<Base>()));
        assert!(!arg.matches(TypeId::of::<Plain>()));
    }
}
