//! The handler index behind the bus: resolved handlers bound to their
//! owners, keyed by declared event type.

use crate::dispatch::HandlerArgs;
use crate::error::EventResult;
use crate::event::{Event, ResultValue};
use crate::table::{Listener, ResolvedHandler};
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

/// Identity of a registration owner, used to remove its handlers again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum OwnerKey {
    /// A listener type registered for its static handlers.
    Class(TypeId),
    /// A listener instance, identified by its allocation.
    Instance(usize),
}

/// A resolved handler attached to one owner for its lifetime.
pub(crate) struct HandlerDescriptor {
    pub resolved: Arc<ResolvedHandler>,
    pub owner: OwnerKey,
    /// Keeps instance owners alive while registered; `None` for static
    /// handlers.
    instance: Option<Arc<dyn Listener>>,
    /// Global registration order, used to merge handler sets across event
    /// types deterministically.
    pub seq: u64,
}

impl HandlerDescriptor {
    /// Invoke the handler against `event` with materialized `args`.
    pub fn invoke(&self, event: &dyn Event, args: &HandlerArgs) -> EventResult<Option<ResultValue>> {
        (self.resolved.invoke)(self.instance.as_deref(), event, args)
    }
}

/// The descriptor index, keyed by declared event type.
///
/// Mutation happens under the bus's exclusive lock; dispatch takes an
/// ordered snapshot and never observes a partially-updated index.
#[derive(Default)]
pub(crate) struct HandlerIndex {
    by_event: HashMap<TypeId, Vec<Arc<HandlerDescriptor>>>,
    next_seq: u64,
}

impl HandlerIndex {
    /// Attach every handler in `resolved` to `owner`.
    pub fn attach(
        &mut self,
        resolved: &[Arc<ResolvedHandler>],
        owner: OwnerKey,
        instance: Option<Arc<dyn Listener>>,
    ) {
        for handler in resolved {
            let seq = self.next_seq;
            self.next_seq += 1;
            self.by_event
                .entry(handler.event_type)
                .or_default()
                .push(Arc::new(HandlerDescriptor {
                    resolved: handler.clone(),
                    owner,
                    instance: instance.clone(),
                    seq,
                }));
        }
    }

    /// Remove every handler attached to `owner`; returns how many were
    /// removed.
    pub fn detach(&mut self, owner: OwnerKey) -> usize {
        let mut removed = 0;
        self.by_event.retain(|_, handlers| {
            let before = handlers.len();
            handlers.retain(|h| h.owner != owner);
            removed += before - handlers.len();
            !handlers.is_empty()
        });
        removed
    }

    /// The merged handler set for an event lineage, in registration order.
    pub fn snapshot(&self, lineage: &[TypeId]) -> Vec<Arc<HandlerDescriptor>> {
        let mut merged: Vec<Arc<HandlerDescriptor>> = lineage
            .iter()
            .filter_map(|ty| self.by_event.get(ty))
            .flatten()
            .cloned()
            .collect();
        merged.sort_by_key(|h| h.seq);
        merged
    }

    /// Whether any handler is registered for the lineage.
    pub fn has_any(&self, lineage: &[TypeId]) -> bool {
        lineage
            .iter()
            .any(|ty| self.by_event.get(ty).is_some_and(|handlers| !handlers.is_empty()))
    }

    /// Total number of registered handlers.
    pub fn len(&self) -> usize {
        self.by_event.values().map(Vec::len).sum()
    }
}
