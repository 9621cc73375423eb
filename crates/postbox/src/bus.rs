//! The event bus facade: registration, locking, and posting.

use crate::config::BusConfig;
use crate::dispatch::PostedEvent;
use crate::error::{EventError, EventResult};
use crate::event::{Event, Generic, TypeArg, WithResult};
use crate::registry::{HandlerDescriptor, HandlerIndex, OwnerKey};
use crate::subscribe::GenericArg;
use crate::table::{HandlerKind, Listener, ResolvedHandler};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::any::TypeId;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Dispatches events to registered listeners.
///
/// A bus is explicitly constructed and owned; pass it by reference (or
/// `Arc`) to every collaborator that registers listeners or posts events.
/// Registration mutates shared state under an exclusive lock; posting takes
/// an ordered snapshot of the matching handlers and runs them on the
/// calling thread with no lock held, so handlers may post further events on
/// the same bus (nested posts complete before the outer phase continues).
///
/// ```
/// use postbox::{Event, EventBus, HandlerDecl, HandlerTable, Listener};
/// use std::any::Any;
/// use std::sync::Arc;
///
/// struct Tick;
///
/// impl Event for Tick {
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// struct TickCounter;
///
/// impl Listener for TickCounter {
///     fn table() -> HandlerTable {
///         HandlerTable::of::<TickCounter>().with(HandlerDecl::instance(
///             "on_tick",
///             |_this: &TickCounter, _event: &Tick, _args| Ok(None),
///         ))
///     }
///
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
/// }
///
/// let bus = EventBus::new();
/// bus.register(Arc::new(TickCounter))?;
/// bus.post(Tick)?;
/// # Ok::<(), postbox::EventError>(())
/// ```
pub struct EventBus {
    config: BusConfig,
    registry: RwLock<HandlerIndex>,
    locked: AtomicBool,
    /// Resolved tables per listener type, so the inheritance walk runs once
    /// no matter how many instances register.
    resolved_tables: DashMap<TypeId, Arc<Vec<Arc<ResolvedHandler>>>>,
    /// Generic type arguments, bound per event type at its first post.
    generic_bindings: DashMap<TypeId, Arc<Vec<TypeArg>>>,
    /// Generic match decisions per (event type, handler), kept for the bus
    /// lifetime since bindings never change.
    generic_matches: DashMap<(TypeId, u64), bool>,
}

impl EventBus {
    /// A bus with the default configuration.
    pub fn new() -> Self {
        Self::with_config(BusConfig::default())
    }

    /// A bus with the given configuration.
    pub fn with_config(config: BusConfig) -> Self {
        Self {
            config,
            registry: RwLock::new(HandlerIndex::default()),
            locked: AtomicBool::new(false),
            resolved_tables: DashMap::new(),
            generic_bindings: DashMap::new(),
            generic_matches: DashMap::new(),
        }
    }

    /// The bus name.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// Lock the bus: from here on, registration mutations fail fast.
    ///
    /// Locking is one-way; hosts typically lock after startup so the
    /// handler set stays fixed while the system runs.
    pub fn lock(&self) {
        self.locked.store(true, Ordering::Release);
        tracing::debug!(bus = %self.config.name, "bus locked");
    }

    /// Whether the bus has been locked.
    pub fn is_locked(&self) -> bool {
        self.locked.load(Ordering::Acquire)
    }

    /// Register the instance handlers of `listener`.
    ///
    /// Fails if the bus is locked, or if the listener's table declares a
    /// static handler (register those through
    /// [`register_static`](EventBus::register_static)).
    pub fn register<L: Listener>(&self, listener: Arc<L>) -> EventResult<()> {
        self.ensure_unlocked()?;
        let resolved = self.resolved_table::<L>()?;
        self.ensure_kind(&resolved, HandlerKind::Instance)?;

        let owner = OwnerKey::Instance(Arc::as_ptr(&listener) as usize);
        let instance: Arc<dyn Listener> = listener;
        self.registry.write().attach(&resolved, owner, Some(instance));
        tracing::debug!(
            bus = %self.config.name,
            listener = std::any::type_name::<L>(),
            handlers = resolved.len(),
            "registered listener instance"
        );
        Ok(())
    }

    /// Register the static handlers of listener type `L`.
    ///
    /// Fails if the bus is locked, or if the type's table declares an
    /// instance handler.
    pub fn register_static<L: Listener>(&self) -> EventResult<()> {
        self.ensure_unlocked()?;
        let resolved = self.resolved_table::<L>()?;
        self.ensure_kind(&resolved, HandlerKind::Static)?;

        let owner = OwnerKey::Class(TypeId::of::<L>());
        self.registry.write().attach(&resolved, owner, None);
        tracing::debug!(
            bus = %self.config.name,
            listener = std::any::type_name::<L>(),
            handlers = resolved.len(),
            "registered listener type"
        );
        Ok(())
    }

    /// Remove every handler registered for `listener`.
    ///
    /// Fails fast if the bus is locked; the registry is left unchanged.
    pub fn unregister<L: Listener>(&self, listener: &Arc<L>) -> EventResult<()> {
        self.ensure_unlocked()?;
        let owner = OwnerKey::Instance(Arc::as_ptr(listener) as usize);
        let removed = self.registry.write().detach(owner);
        tracing::debug!(
            bus = %self.config.name,
            listener = std::any::type_name::<L>(),
            handlers = removed,
            "unregistered listener instance"
        );
        Ok(())
    }

    /// Remove every static handler registered for listener type `L`.
    pub fn unregister_static<L: Listener>(&self) -> EventResult<()> {
        self.ensure_unlocked()?;
        let removed = self.registry.write().detach(OwnerKey::Class(TypeId::of::<L>()));
        tracing::debug!(
            bus = %self.config.name,
            listener = std::any::type_name::<L>(),
            handlers = removed,
            "unregistered listener type"
        );
        Ok(())
    }

    /// Post an event through all phases and return it.
    pub fn post<E: Event>(&self, event: E) -> EventResult<E> {
        let mut posted = self.post_manually(event)?;
        posted.fire_pre()?;
        posted.fire_default()?;
        posted.fire_post()?;
        Ok(posted.into_event())
    }

    /// Post a result-bearing event through all phases and return the
    /// chained result.
    pub fn post_with_result<E: WithResult>(&self, event: E) -> EventResult<E::Output> {
        let mut posted = self.post_manually(event)?;
        posted.fire_pre()?;
        posted.fire_default()?;
        posted.fire_post()?;
        posted.result()
    }

    /// Post an event but leave firing the functional phases to the caller.
    ///
    /// The cancellation phase runs before this returns, so
    /// [`PostedEvent::was_cancelled`] is immediately meaningful.
    pub fn post_manually<E: Event>(&self, event: E) -> EventResult<PostedEvent<E>> {
        let type_id = TypeId::of::<E>();
        let mut lineage = vec![type_id];
        for ancestor in E::ancestors() {
            if !lineage.contains(&ancestor) {
                lineage.push(ancestor);
            }
        }

        let snapshot = self.registry.read().snapshot(&lineage);
        let eligible = self.filter_eligible(&event, type_id, snapshot)?;
        tracing::debug!(
            bus = %self.config.name,
            event = std::any::type_name::<E>(),
            facets = ?event.facets(),
            handlers = eligible.len(),
            "posting event"
        );

        let mut posted = PostedEvent::new(event, eligible, self.config.trace_dispatch);
        posted.run_cancellation()?;
        Ok(posted)
    }

    /// Whether any handler is registered for `E` or one of its ancestors.
    ///
    /// Lets callers skip building expensive events nobody listens to.
    pub fn has_listeners<E: Event>(&self) -> bool {
        let mut lineage = vec![TypeId::of::<E>()];
        lineage.extend(E::ancestors());
        // Duplicates are harmless here; has_any only checks existence.
        self.registry.read().has_any(&lineage)
    }

    /// Total number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.registry.read().len()
    }

    fn ensure_unlocked(&self) -> EventResult<()> {
        if self.is_locked() {
            return Err(EventError::locked(self.config.name.as_str()));
        }
        Ok(())
    }

    fn ensure_kind(
        &self,
        resolved: &[Arc<ResolvedHandler>],
        target: HandlerKind,
    ) -> EventResult<()> {
        if let Some(wrong) = resolved.iter().find(|h| h.kind != target) {
            return Err(EventError::MismatchedHandlerKind {
                listener: wrong.listener_name,
                handler: wrong.key,
                declared: wrong.kind.label(),
                target: target.label(),
            });
        }
        Ok(())
    }

    /// Resolve (or fetch the cached resolution of) `L`'s handler table.
    fn resolved_table<L: Listener>(&self) -> EventResult<Arc<Vec<Arc<ResolvedHandler>>>> {
        let key = TypeId::of::<L>();
        if let Some(hit) = self.resolved_tables.get(&key) {
            return Ok(hit.clone());
        }
        let resolved = Arc::new(L::table().resolve()?);
        self.resolved_tables.insert(key, resolved.clone());
        Ok(resolved)
    }

    /// Drop handlers the event can never reach: wrong side, or generic
    /// slot expectations its bound type arguments fail.
    fn filter_eligible<E: Event>(
        &self,
        event: &E,
        type_id: TypeId,
        mut handlers: Vec<Arc<HandlerDescriptor>>,
    ) -> EventResult<Vec<Arc<HandlerDescriptor>>> {
        // The side is read once per post, not once per handler.
        let side = event.as_side_aware().map(|s| s.event_side());
        let generic = event.as_generic();
        let bound = match generic {
            Some(g) => Some(self.generic_binding::<E>(type_id, g)?),
            None => None,
        };

        handlers.retain(|handler| {
            if let (Some(declared), Some(event_side)) = (handler.resolved.side, side) {
                if declared != event_side {
                    return false;
                }
            }
            if let (Some(g), Some(bound), Some(expect)) =
                (generic, bound.as_deref(), handler.resolved.generic_args.as_ref())
            {
                if !self.generic_match(type_id, handler.seq, g, bound, expect) {
                    return false;
                }
            }
            true
        });
        Ok(handlers)
    }

    /// Cached per (event type, handler) for the bus lifetime; bindings are
    /// immutable once established, so the decision never changes.
    fn generic_match(
        &self,
        type_id: TypeId,
        handler_seq: u64,
        generic: &dyn Generic,
        bound: &[TypeArg],
        expect: &[GenericArg],
    ) -> bool {
        let key = (type_id, handler_seq);
        if let Some(hit) = self.generic_matches.get(&key) {
            return *hit;
        }
        let matches = expect.len() == bound.len()
            && expect.iter().enumerate().all(|(index, slot)| match slot {
                GenericArg::Wildcard => true,
                GenericArg::Is { id, .. } => generic.matches_generic_type(bound, index, *id),
            });
        self.generic_matches.insert(key, matches);
        matches
    }

    /// Fetch (or establish, on first post) the type arguments bound to the
    /// event type.
    fn generic_binding<E: Event>(
        &self,
        type_id: TypeId,
        generic: &dyn Generic,
    ) -> EventResult<Arc<Vec<TypeArg>>> {
        if let Some(bound) = self.generic_bindings.get(&type_id) {
            return Ok(bound.clone());
        }
        let args = generic.type_arguments();
        if args.is_empty() {
            return Err(EventError::UnresolvedGenericArguments {
                event: std::any::type_name::<E>(),
            });
        }
        tracing::debug!(
            bus = %self.config.name,
            event = std::any::type_name::<E>(),
            arguments = args.len(),
            "established generic type arguments"
        );
        let args = Arc::new(args);
        self.generic_bindings.insert(type_id, args.clone());
        Ok(args)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("name", &self.config.name)
            .field("locked", &self.is_locked())
            .field("handlers", &self.handler_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{HandlerDecl, HandlerTable};
    use std::any::Any;

    struct Ping;

    impl Event for Ping {
        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct InstanceHooks;

    impl Listener for InstanceHooks {
        fn table() -> HandlerTable {
            HandlerTable::of::<InstanceHooks>().with(HandlerDecl::instance(
                "on_ping",
                |_this: &InstanceHooks, _event: &Ping, _args| Ok(None),
            ))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    struct StaticHooks;

    impl Listener for StaticHooks {
        fn table() -> HandlerTable {
            HandlerTable::of::<StaticHooks>()
                .with(HandlerDecl::static_fn("on_ping", |_event: &Ping, _args| Ok(None)))
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_locked_bus_rejects_mutation() {
        let bus = EventBus::new();
        bus.register(Arc::new(InstanceHooks)).expect("register");
        bus.lock();

        let listener = Arc::new(InstanceHooks);
        assert!(matches!(
            bus.register(listener.clone()),
            Err(EventError::LockedBus { .. })
        ));
        assert!(matches!(
            bus.unregister(&listener),
            Err(EventError::LockedBus { .. })
        ));
        // The registry is untouched by the failed mutations.
        assert_eq!(bus.handler_count(), 1);
    }

    #[test]
    fn test_kind_mismatch_rejects_registration() {
        let bus = EventBus::new();
        let err = bus.register(Arc::new(StaticHooks)).expect_err("static via instance");
        assert!(matches!(err, EventError::MismatchedHandlerKind { .. }));
        assert_eq!(bus.handler_count(), 0);

        let err = bus.register_static::<InstanceHooks>().expect_err("instance via class");
        assert!(matches!(err, EventError::MismatchedHandlerKind { .. }));
        assert_eq!(bus.handler_count(), 0);
    }

    #[test]
    fn test_has_listeners() {
        let bus = EventBus::new();
        assert!(!bus.has_listeners::<Ping>());
        bus.register_static::<StaticHooks>().expect("register");
        assert!(bus.has_listeners::<Ping>());
    }

    #[test]
    fn test_unregister_removes_only_that_owner() {
        let bus = EventBus::new();
        let first = Arc::new(InstanceHooks);
        let second = Arc::new(InstanceHooks);
        bus.register(first.clone()).expect("register first");
        bus.register(second.clone()).expect("register second");
        assert_eq!(bus.handler_count(), 2);

        bus.unregister(&first).expect("unregister");
        assert_eq!(bus.handler_count(), 1);
        assert!(bus.has_listeners::<Ping>());
    }
}
