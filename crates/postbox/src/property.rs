//! Named event properties that handlers can unpack as extra arguments.

use crate::error::{EventError, EventResult};
use crate::event::Event;
use std::any::Any;
use std::sync::Arc;

/// A type-erased property value.
pub type PropertyValue = Arc<dyn Any + Send + Sync>;

/// A named, typed accessor declared by an event type.
///
/// Handlers reference properties by name through
/// [`Binding::Unpack`](crate::subscribe::Binding). Properties default to
/// immutable, meaning the value is computed at most once per post and
/// cached for its duration; mark a property [`mutable`](PropertyDef::mutable)
/// to re-read it on every access.
///
/// ```
/// use postbox::{Event, PropertyDef};
/// use std::any::Any;
///
/// struct ChunkLoaded {
///     x: i32,
///     z: i32,
/// }
///
/// impl Event for ChunkLoaded {
///     fn as_any(&self) -> &dyn Any {
///         self
///     }
///
///     fn properties(&self) -> Vec<PropertyDef> {
///         vec![
///             PropertyDef::of("x", |e: &ChunkLoaded| e.x),
///             PropertyDef::of("z", |e: &ChunkLoaded| e.z),
///         ]
///     }
/// }
/// ```
#[derive(Clone)]
pub struct PropertyDef {
    name: &'static str,
    mutable: bool,
    getter: Arc<dyn Fn(&dyn Event) -> EventResult<PropertyValue> + Send + Sync>,
}

impl PropertyDef {
    /// Declare an immutable property read by `get`.
    pub fn of<E, T, F>(name: &'static str, get: F) -> Self
    where
        E: Event,
        T: Send + Sync + 'static,
        F: Fn(&E) -> T + Send + Sync + 'static,
    {
        let getter = Arc::new(move |event: &dyn Event| {
            let event = event
                .as_any()
                .downcast_ref::<E>()
                .ok_or(EventError::ForeignProperty {
                    property: name,
                    event: std::any::type_name::<E>(),
                })?;
            Ok(Arc::new(get(event)) as PropertyValue)
        });
        Self {
            name,
            mutable: false,
            getter,
        }
    }

    /// Mark the property mutable, so the value is re-read on every access.
    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    /// The property name used by unpack bindings.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether the value can change between accesses within one post.
    pub fn is_mutable(&self) -> bool {
        self.mutable
    }

    /// Read the property from `event`.
    pub(crate) fn get(&self, event: &dyn Event) -> EventResult<PropertyValue> {
        (self.getter)(event)
    }
}

impl std::fmt::Debug for PropertyDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropertyDef")
            .field("name", &self.name)
            .field("mutable", &self.mutable)
            .finish()
    }
}
