//! Declarative handler tables and their resolution.
//!
//! Listener types describe their handlers in a [`HandlerTable`]: one
//! [`HandlerDecl`] per handler, plus the tables of any base types the
//! listener derives from. Registration resolves a table once per listener
//! type into a flat handler list:
//!
//! - entries in a derived table shadow same-key entries in its bases;
//! - an entry without [`Subscribe`] options inherits them from the
//!   overridden declaration, searched breadth-first through the base
//!   tables, first match wins;
//! - [`Binding::Inherited`] slots resolve the binding at the same position
//!   the same way;
//! - an entry whose own options mark it deferred stays inactive until a
//!   derived table overrides it.
//!
//! The resolved list is cached per listener type by the bus, so the walk
//! runs once no matter how many instances register.

use crate::dispatch::HandlerArgs;
use crate::error::{EventError, EventResult};
use crate::event::{Event, ResultValue};
use crate::side::Side;
use crate::subscribe::{Binding, GenericArg, Subscribe};
use std::any::{Any, TypeId};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

/// Whether a handler runs against a registered instance or a plain type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerKind {
    /// The handler needs no owner; register the listener type itself.
    Static,
    /// The handler runs against a registered instance of the listener.
    Instance,
}

impl HandlerKind {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Static => "static",
            Self::Instance => "instance",
        }
    }
}

impl std::fmt::Display for HandlerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Type-erased handler callable.
///
/// Receives the owner (for instance handlers), the event, and the
/// materialized extra arguments; returns the value it provides to the
/// result chain, if any.
pub type HandlerFn = Arc<
    dyn Fn(Option<&dyn Listener>, &dyn Event, &HandlerArgs) -> EventResult<Option<ResultValue>>
        + Send
        + Sync,
>;

/// A type whose handlers can be attached to an event bus.
///
/// Implementors describe their handlers once in [`Listener::table`];
/// the bus resolves and indexes the table on first registration.
pub trait Listener: Any + Send + Sync {
    /// The handler table for this type.
    fn table() -> HandlerTable
    where
        Self: Sized;

    /// The listener as [`Any`], for downcasting in typed handlers.
    fn as_any(&self) -> &dyn Any;

    /// Borrow this listener's representation as the given base type.
    ///
    /// Listeners that [`inherit`](HandlerTable::inherit) a base table
    /// without overriding its instance handlers embed the base value and
    /// return it here, so those handlers run against it.
    fn as_base(&self, _base: TypeId) -> Option<&dyn Any> {
        None
    }
}

/// One handler declaration inside a [`HandlerTable`].
///
/// The key is the handler's identity across a table hierarchy: a derived
/// table redeclaring the same key overrides the base declaration, the way
/// an overriding method replaces the one it overrides.
pub struct HandlerDecl {
    key: &'static str,
    event_type: TypeId,
    event_name: &'static str,
    kind: HandlerKind,
    subscribe: Option<Subscribe>,
    side: Option<Side>,
    generic_args: Option<Vec<GenericArg>>,
    bindings: Vec<Binding>,
    invoke: HandlerFn,
}

impl HandlerDecl {
    /// Declare an instance handler for events of type `E`.
    ///
    /// The closure receives the registered owner, the event, and the
    /// arguments materialized from the declared bindings. Return
    /// `Ok(None)` to leave the result chain untouched or
    /// `Ok(Some(value))` to replace it; an `Err` aborts the remaining
    /// handlers of the phase and propagates to the poster.
    pub fn instance<L, E, F>(key: &'static str, handler: F) -> Self
    where
        L: Listener,
        E: Event,
        F: Fn(&L, &E, &HandlerArgs) -> anyhow::Result<Option<ResultValue>> + Send + Sync + 'static,
    {
        let invoke: HandlerFn = Arc::new(move |owner, event, args| {
            let owner = owner_as::<L>(owner, key)?;
            let event = view_as::<E>(event, key)?;
            handler(owner, event, args).map_err(|source| EventError::handler_failed(key, source))
        });
        Self::new::<E>(key, HandlerKind::Instance, invoke)
    }

    /// Declare a static handler for events of type `E`.
    pub fn static_fn<E, F>(key: &'static str, handler: F) -> Self
    where
        E: Event,
        F: Fn(&E, &HandlerArgs) -> anyhow::Result<Option<ResultValue>> + Send + Sync + 'static,
    {
        let invoke: HandlerFn = Arc::new(move |_owner, event, args| {
            let event = view_as::<E>(event, key)?;
            handler(event, args).map_err(|source| EventError::handler_failed(key, source))
        });
        Self::new::<E>(key, HandlerKind::Static, invoke)
    }

    /// Declare an instance handler for events of type `E` that receives the
    /// event type-erased.
    ///
    /// Subtypes of `E` reach this handler even when they do not project an
    /// `E` representation, so this is the shape for catch-all handlers over
    /// an event family.
    pub fn erased_instance<L, E, F>(key: &'static str, handler: F) -> Self
    where
        L: Listener,
        E: Event,
        F: Fn(&L, &dyn Event, &HandlerArgs) -> anyhow::Result<Option<ResultValue>>
            + Send
            + Sync
            + 'static,
    {
        let invoke: HandlerFn = Arc::new(move |owner, event, args| {
            let owner = owner_as::<L>(owner, key)?;
            handler(owner, event, args).map_err(|source| EventError::handler_failed(key, source))
        });
        Self::new::<E>(key, HandlerKind::Instance, invoke)
    }

    /// Declare a static handler for events of type `E` that receives the
    /// event type-erased.
    pub fn erased_static<E, F>(key: &'static str, handler: F) -> Self
    where
        E: Event,
        F: Fn(&dyn Event, &HandlerArgs) -> anyhow::Result<Option<ResultValue>> + Send + Sync + 'static,
    {
        let invoke: HandlerFn = Arc::new(move |_owner, event, args| {
            handler(event, args).map_err(|source| EventError::handler_failed(key, source))
        });
        Self::new::<E>(key, HandlerKind::Static, invoke)
    }

    fn new<E: Event>(key: &'static str, kind: HandlerKind, invoke: HandlerFn) -> Self {
        Self {
            key,
            event_type: TypeId::of::<E>(),
            event_name: std::any::type_name::<E>(),
            kind,
            subscribe: None,
            side: None,
            generic_args: None,
            bindings: Vec::new(),
            invoke,
        }
    }

    /// Attach subscription options; omit to inherit them from an overridden
    /// declaration (defaults if nothing is inherited).
    pub fn subscribe(mut self, options: Subscribe) -> Self {
        self.subscribe = Some(options);
        self
    }

    /// Only deliver side-aware events firing on the client side.
    pub fn client_only(mut self) -> Self {
        self.side = Some(Side::Client);
        self
    }

    /// Only deliver side-aware events firing on the server side.
    pub fn server_only(mut self) -> Self {
        self.side = Some(Side::Server);
        self
    }

    /// Declare per-slot expectations for a generic event's type arguments.
    pub fn generic_args(mut self, args: Vec<GenericArg>) -> Self {
        self.generic_args = Some(args);
        self
    }

    /// Append an argument bound to the named event property.
    pub fn unpack(mut self, property: &'static str) -> Self {
        self.bindings.push(Binding::Unpack(property));
        self
    }

    /// Append an argument bound to the previous handler's result.
    pub fn previous_result(mut self) -> Self {
        self.bindings.push(Binding::PreviousResult);
        self
    }

    /// Append an argument whose binding is inherited by position from the
    /// overridden declaration.
    pub fn inherited_param(mut self) -> Self {
        self.bindings.push(Binding::Inherited);
        self
    }
}

impl std::fmt::Debug for HandlerDecl {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerDecl")
            .field("key", &self.key)
            .field("event", &self.event_name)
            .field("kind", &self.kind)
            .field("subscribe", &self.subscribe)
            .field("bindings", &self.bindings)
            .finish()
    }
}

/// The handler declarations of one listener type, plus its base tables.
#[derive(Debug)]
pub struct HandlerTable {
    listener: TypeId,
    listener_name: &'static str,
    entries: Vec<HandlerDecl>,
    bases: Vec<HandlerTable>,
}

impl HandlerTable {
    /// An empty table for listener type `L`.
    pub fn of<L: Any>() -> Self {
        Self {
            listener: TypeId::of::<L>(),
            listener_name: std::any::type_name::<L>(),
            entries: Vec::new(),
            bases: Vec::new(),
        }
    }

    /// Add a handler declaration.
    pub fn with(mut self, decl: HandlerDecl) -> Self {
        self.entries.push(decl);
        self
    }

    /// Add a base table this listener derives from.
    ///
    /// Bases are searched in the order they are added, breadth-first
    /// across levels.
    pub fn inherit(mut self, base: HandlerTable) -> Self {
        self.bases.push(base);
        self
    }

    /// The listener type this table belongs to.
    pub fn listener(&self) -> TypeId {
        self.listener
    }

    /// Name of the listener type this table belongs to.
    pub fn listener_name(&self) -> &'static str {
        self.listener_name
    }

    /// Resolve the table into the flat, active handler list.
    pub(crate) fn resolve(&self) -> EventResult<Vec<Arc<ResolvedHandler>>> {
        let mut resolved = Vec::new();
        let mut shadowed: HashSet<&'static str> = HashSet::new();
        let mut queue: VecDeque<&HandlerTable> = VecDeque::new();
        queue.push_back(self);

        while let Some(table) = queue.pop_front() {
            for entry in &table.entries {
                if !shadowed.insert(entry.key) {
                    continue;
                }

                let overrides = find_inherited(table, entry.key, |_| Some(())).is_some();
                let subscribe = entry
                    .subscribe
                    .or_else(|| find_inherited(table, entry.key, |base| base.subscribe))
                    .unwrap_or_default();

                // A declaration that marks itself deferred only activates
                // through an override; an inherited flag on an override is
                // already that activation.
                let declared_deferred = entry.subscribe.map_or(false, |s| s.deferred);
                if subscribe.deferred && (declared_deferred || !overrides) {
                    tracing::debug!(
                        listener = table.listener_name,
                        handler = entry.key,
                        "skipping deferred handler without an override"
                    );
                    continue;
                }

                let mut bindings = Vec::with_capacity(entry.bindings.len());
                for (index, binding) in entry.bindings.iter().enumerate() {
                    match binding {
                        Binding::Inherited => {
                            let inherited =
                                find_inherited(table, entry.key, |base| match base.bindings.get(index) {
                                    Some(Binding::Inherited) | None => None,
                                    Some(other) => Some(other.clone()),
                                });
                            bindings.push(inherited.ok_or_else(|| {
                                EventError::malformed(
                                    entry.key,
                                    format!("parameter {index} has no binding to inherit"),
                                )
                            })?);
                        }
                        other => bindings.push(other.clone()),
                    }
                }

                resolved.push(Arc::new(ResolvedHandler {
                    key: entry.key,
                    listener_name: table.listener_name,
                    event_type: entry.event_type,
                    event_name: entry.event_name,
                    kind: entry.kind,
                    subscribe,
                    side: entry.side,
                    generic_args: entry.generic_args.clone(),
                    bindings,
                    invoke: entry.invoke.clone(),
                }));
            }
            queue.extend(table.bases.iter());
        }

        Ok(resolved)
    }
}

/// Borrow `owner` as `L`: either the concrete listener or a projected
/// base representation.
fn owner_as<'a, L: Listener>(
    owner: Option<&'a dyn Listener>,
    key: &'static str,
) -> EventResult<&'a L> {
    let owner = owner
        .ok_or_else(|| EventError::malformed(key, "instance handler invoked without an owner"))?;
    owner
        .as_any()
        .downcast_ref::<L>()
        .or_else(|| {
            owner
                .as_base(TypeId::of::<L>())
                .and_then(|base| base.downcast_ref::<L>())
        })
        .ok_or_else(|| {
            EventError::malformed(
                key,
                "owner is neither the declared listener type nor projects it as a base",
            )
        })
}

/// Borrow `event` as `E`: either the concrete type or a projected
/// ancestor representation.
fn view_as<'a, E: Event>(event: &'a dyn Event, key: &'static str) -> EventResult<&'a E> {
    event
        .as_any()
        .downcast_ref::<E>()
        .or_else(|| {
            event
                .as_ancestor(TypeId::of::<E>())
                .and_then(|ancestor| ancestor.downcast_ref::<E>())
        })
        .ok_or_else(|| {
            EventError::malformed(
                key,
                "event is neither the declared event type nor projects it as an ancestor",
            )
        })
}

/// Search the base tables of `start` breadth-first for a same-key
/// declaration that `pick` accepts.
fn find_inherited<T>(
    start: &HandlerTable,
    key: &'static str,
    pick: impl Fn(&HandlerDecl) -> Option<T>,
) -> Option<T> {
    let mut queue: VecDeque<&HandlerTable> = start.bases.iter().collect();
    while let Some(table) = queue.pop_front() {
        if let Some(entry) = table.entries.iter().find(|entry| entry.key == key) {
            if let Some(value) = pick(entry) {
                return Some(value);
            }
        }
        queue.extend(table.bases.iter());
    }
    None
}

/// A handler declaration after table resolution: options and bindings are
/// final, inheritance has been applied, deferred declarations are gone.
pub(crate) struct ResolvedHandler {
    pub key: &'static str,
    pub listener_name: &'static str,
    pub event_type: TypeId,
    pub event_name: &'static str,
    pub kind: HandlerKind,
    pub subscribe: Subscribe,
    pub side: Option<Side>,
    pub generic_args: Option<Vec<GenericArg>>,
    pub bindings: Vec<Binding>,
    pub invoke: HandlerFn,
}

impl std::fmt::Debug for ResolvedHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedHandler")
            .field("key", &self.key)
            .field("listener_name", &self.listener_name)
            .field("event_type", &self.event_type)
            .field("event_name", &self.event_name)
            .field("kind", &self.kind)
            .field("subscribe", &self.subscribe)
            .field("side", &self.side)
            .field("generic_args", &self.generic_args)
            .field("bindings", &self.bindings)
            .field("invoke", &"<fn>")
            .finish()
    }
}
