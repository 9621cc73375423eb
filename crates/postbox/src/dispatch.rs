//! Post sessions: phase execution, cancellation, and result chaining.
//!
//! A [`PostedEvent`] is the short-lived session behind one post. It holds
//! the snapshot of eligible handlers (side and generic filters are applied
//! when the session is created), the cancellation flag, the chained-result
//! accumulator, and the per-post property cache.
//! [`post`](crate::EventBus::post) drives the whole session;
//! [`post_manually`](crate::EventBus::post_manually) hands it to the
//! caller to fire the functional phases one by one.

use crate::error::{EventError, EventResult};
use crate::event::{Event, ResultValue, WithResult};
use crate::phase::EventPhase;
use crate::property::{PropertyDef, PropertyValue};
use crate::registry::HandlerDescriptor;
use crate::subscribe::Binding;
use std::collections::HashMap;
use std::sync::Arc;

/// Extra arguments materialized for one handler invocation, one per
/// declared binding, in declaration order.
pub struct HandlerArgs {
    handler: &'static str,
    values: Vec<ResultValue>,
}

impl HandlerArgs {
    pub(crate) fn new(handler: &'static str, values: Vec<ResultValue>) -> Self {
        Self { handler, values }
    }

    /// The argument at `index`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> EventResult<&T> {
        self.values
            .get(index)
            .and_then(|value| value.downcast_ref::<T>())
            .ok_or(EventError::ArgumentType {
                handler: self.handler,
                index,
                expected: std::any::type_name::<T>(),
            })
    }

    /// Number of materialized arguments.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether no arguments were materialized.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A live post of one event instance.
///
/// Created by [`EventBus::post_manually`](crate::EventBus::post_manually).
/// The cancellation phase has already run by the time the caller holds the
/// session; the functional phases fire through
/// [`fire_pre`](PostedEvent::fire_pre),
/// [`fire_default`](PostedEvent::fire_default) and
/// [`fire_post`](PostedEvent::fire_post), each at most once and never after
/// a later phase.
pub struct PostedEvent<E: Event> {
    event: E,
    event_name: &'static str,
    handlers: Vec<Arc<HandlerDescriptor>>,
    properties: Vec<PropertyDef>,
    property_cache: HashMap<&'static str, PropertyValue>,
    fired: [bool; 4],
    canceled: bool,
    result: Option<ResultValue>,
    trace: bool,
}

impl<E: Event> PostedEvent<E> {
    pub(crate) fn new(event: E, handlers: Vec<Arc<HandlerDescriptor>>, trace: bool) -> Self {
        let properties = event.properties();
        let result = event.as_with_result().map(|r| r.default_result_value());
        Self {
            event,
            event_name: std::any::type_name::<E>(),
            handlers,
            properties,
            property_cache: HashMap::new(),
            fired: [false; 4],
            canceled: false,
            result,
            trace,
        }
    }

    /// Run the cancellation phase, threading the flag through each handler.
    ///
    /// Events without the cancelable facet are never canceled and skip the
    /// phase entirely.
    pub(crate) fn run_cancellation(&mut self) -> EventResult<()> {
        self.fired[EventPhase::Cancellation.index()] = true;
        if self.event.as_cancelable().is_none() {
            return Ok(());
        }

        let voters: Vec<_> = self
            .handlers
            .iter()
            .filter(|h| h.resolved.subscribe.phase == EventPhase::Cancellation)
            .cloned()
            .collect();
        for handler in voters {
            let args = self.materialize(&handler, EventPhase::Cancellation)?;
            if self.trace {
                tracing::trace!(
                    event = self.event_name,
                    handler = handler.resolved.key,
                    "invoking cancellation handler"
                );
            }
            let returned = handler.invoke(&self.event, &args)?;
            self.canceled = returned
                .as_ref()
                .and_then(|value| value.downcast_ref::<bool>())
                .copied()
                .ok_or(EventError::ResultType {
                    handler: handler.resolved.key,
                    expected: "bool",
                })?;
        }
        if self.canceled {
            tracing::debug!(event = self.event_name, "event canceled");
        }
        Ok(())
    }

    /// Fire the `Pre` phase.
    pub fn fire_pre(&mut self) -> EventResult<()> {
        self.fire(EventPhase::Pre)
    }

    /// Fire the `Default` phase.
    pub fn fire_default(&mut self) -> EventResult<()> {
        self.fire(EventPhase::Default)
    }

    /// Fire the `Post` phase.
    pub fn fire_post(&mut self) -> EventResult<()> {
        self.fire(EventPhase::Post)
    }

    /// Whether the cancellation phase canceled this post.
    pub fn was_cancelled(&self) -> bool {
        self.canceled
    }

    /// Whether any handler will receive this event.
    ///
    /// Callers can check this before building expensive event payloads.
    pub fn has_listeners(&self) -> bool {
        !self.handlers.is_empty()
    }

    /// The event being posted.
    pub fn event(&self) -> &E {
        &self.event
    }

    /// Consume the session and return the event.
    pub fn into_event(self) -> E {
        self.event
    }

    fn fire(&mut self, phase: EventPhase) -> EventResult<()> {
        let index = phase.index();
        if self.fired[index] {
            return Err(EventError::PhaseAlreadyFired { phase });
        }
        for later in index + 1..EventPhase::ALL.len() {
            if self.fired[later] {
                return Err(EventError::PhaseOutOfOrder {
                    phase,
                    later: EventPhase::ALL[later],
                });
            }
        }
        self.fired[index] = true;

        let eligible: Vec<_> = self
            .handlers
            .iter()
            .filter(|h| h.resolved.subscribe.phase == phase)
            .cloned()
            .collect();
        if self.canceled && !eligible.iter().any(|h| h.resolved.subscribe.receive_canceled) {
            tracing::debug!(
                event = self.event_name,
                phase = %phase,
                "phase skipped: event is canceled"
            );
            return Ok(());
        }

        for handler in eligible {
            if self.canceled && !handler.resolved.subscribe.receive_canceled {
                continue;
            }
            let args = self.materialize(&handler, phase)?;
            if self.trace {
                tracing::trace!(
                    event = self.event_name,
                    phase = %phase,
                    handler = handler.resolved.key,
                    "invoking handler"
                );
            }
            if let Some(value) = handler.invoke(&self.event, &args)? {
                if self.result.is_some() {
                    self.result = Some(value);
                } else if self.trace {
                    tracing::trace!(
                        event = self.event_name,
                        handler = handler.resolved.key,
                        "handler result ignored: event carries no result"
                    );
                }
            }
        }
        Ok(())
    }

    /// Build the extra arguments for one handler from its bindings.
    fn materialize(
        &mut self,
        handler: &HandlerDescriptor,
        phase: EventPhase,
    ) -> EventResult<HandlerArgs> {
        let mut values = Vec::with_capacity(handler.resolved.bindings.len());
        for binding in &handler.resolved.bindings {
            match binding {
                Binding::Unpack(name) => values.push(self.property_value(*name)?),
                // During the cancellation phase the previous result is the
                // current flag; in functional phases it is the accumulator.
                Binding::PreviousResult if phase == EventPhase::Cancellation => {
                    values.push(Arc::new(self.canceled) as ResultValue);
                }
                Binding::PreviousResult => {
                    values.push(self.result.clone().ok_or(EventError::ResultType {
                        handler: handler.resolved.key,
                        expected: "previous result on a result-bearing event",
                    })?);
                }
                // Resolution replaces inherited bindings before a handler
                // can ever be indexed.
                Binding::Inherited => {
                    return Err(EventError::malformed(
                        handler.resolved.key,
                        "unresolved inherited binding reached dispatch",
                    ));
                }
            }
        }
        Ok(HandlerArgs::new(handler.resolved.key, values))
    }

    /// Read a named property, caching immutable values for the post.
    fn property_value(&mut self, name: &'static str) -> EventResult<PropertyValue> {
        let def = self
            .properties
            .iter()
            .find(|p| p.name() == name)
            .ok_or(EventError::MissingProperty {
                event: self.event_name,
                property: name,
            })?;
        if def.is_mutable() {
            return def.get(&self.event);
        }
        if let Some(cached) = self.property_cache.get(name) {
            return Ok(cached.clone());
        }
        let value = def.get(&self.event)?;
        self.property_cache.insert(name, value.clone());
        Ok(value)
    }
}

impl<E: WithResult> PostedEvent<E> {
    /// The chained result after the phases fired so far.
    pub fn result(&self) -> EventResult<E::Output> {
        let value = self.result.as_ref().ok_or(EventError::ResultChainType {
            event: self.event_name,
            expected: std::any::type_name::<E::Output>(),
        })?;
        value
            .downcast_ref::<E::Output>()
            .cloned()
            .ok_or(EventError::ResultChainType {
                event: self.event_name,
                expected: std::any::type_name::<E::Output>(),
            })
    }
}
