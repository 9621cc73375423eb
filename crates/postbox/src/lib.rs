//! Typed, phase-ordered event dispatch for embedding in plugin hosts.
//!
//! `postbox` is an in-process event bus: listeners describe their handlers
//! in declarative tables, the bus indexes them by event type, and posting
//! an event runs every matching handler on the calling thread in a fixed
//! phase order.
//!
//! # Key pieces
//!
//! - [`Event`] and its facets [`Cancelable`], [`Generic`], [`SideAware`],
//!   [`WithResult`]: what can be posted
//! - [`Listener`], [`HandlerTable`], [`HandlerDecl`], [`Subscribe`]: how
//!   handlers are declared
//! - [`EventBus`]: registration, locking, and posting
//! - [`PostedEvent`]: manual phase-by-phase control over one post
//!
//! # Example
//!
//! ```
//! use postbox::{Event, EventBus, HandlerDecl, HandlerTable, Listener, WithResult};
//! use std::any::Any;
//! use std::sync::Arc;
//!
//! struct Load;
//!
//! impl Event for Load {
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//!
//!     fn as_with_result(&self) -> Option<&dyn postbox::ProvidesResult> {
//!         Some(self)
//!     }
//! }
//!
//! impl WithResult for Load {
//!     type Output = i32;
//!
//!     fn default_result(&self) -> i32 {
//!         0
//!     }
//! }
//!
//! struct Loader;
//!
//! impl Listener for Loader {
//!     fn table() -> HandlerTable {
//!         HandlerTable::of::<Loader>().with(
//!             HandlerDecl::instance("on_load", |_this: &Loader, _event: &Load, args| {
//!                 let previous: i32 = *args.get(0)?;
//!                 Ok(Some(Arc::new(previous + 1) as postbox::ResultValue))
//!             })
//!             .previous_result(),
//!         )
//!     }
//!
//!     fn as_any(&self) -> &dyn Any {
//!         self
//!     }
//! }
//!
//! let bus = EventBus::new();
//! bus.register(Arc::new(Loader))?;
//! assert_eq!(bus.post_with_result(Load)?, 1);
//! # Ok::<(), postbox::EventError>(())
//! ```

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod phase;
pub mod property;
mod registry;
pub mod side;
pub mod subscribe;
pub mod table;

pub use bus::EventBus;
pub use config::BusConfig;
pub use dispatch::{HandlerArgs, PostedEvent};
pub use error::{EventError, EventResult};
pub use event::{
    Cancelable, Event, Facets, Generic, ProvidesResult, ResultValue, SideAware, TypeArg, WithResult,
};
pub use phase::EventPhase;
pub use property::{PropertyDef, PropertyValue};
pub use side::Side;
pub use subscribe::{Binding, GenericArg, Subscribe};
pub use table::{HandlerDecl, HandlerKind, HandlerTable, Listener};
