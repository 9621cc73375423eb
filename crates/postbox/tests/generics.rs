//! Generic-argument filtering: per-slot matching, wildcards, and the
//! first-post binding rules.

use postbox::{
    Event, EventBus, EventError, Generic, GenericArg, HandlerDecl, HandlerTable, Listener, TypeArg,
};
use std::any::Any;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Default)]
struct Journal(Mutex<Vec<String>>);

impl Journal {
    fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

// Argument types bound by the events below. `Furnace` declares `Machine`
// as its supertype; `Chest` is unrelated.
struct Machine;
struct Furnace;
struct Chest;

struct AttachParts;

impl Event for AttachParts {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_generic(&self) -> Option<&dyn Generic> {
        Some(self)
    }
}

impl Generic for AttachParts {
    fn type_arguments(&self) -> Vec<TypeArg> {
        vec![TypeArg::of::<Furnace>().extending::<Machine>()]
    }
}

struct AttachHooks {
    journal: Arc<Journal>,
}

impl Listener for AttachHooks {
    fn table() -> HandlerTable {
        HandlerTable::of::<AttachHooks>()
            .with(
                HandlerDecl::instance("exact", |this: &AttachHooks, _: &AttachParts, _args| {
                    this.journal.push("exact");
                    Ok(None)
                })
                .generic_args(vec![GenericArg::of::<Furnace>()]),
            )
            .with(
                HandlerDecl::instance("supertype", |this: &AttachHooks, _: &AttachParts, _args| {
                    this.journal.push("supertype");
                    Ok(None)
                })
                .generic_args(vec![GenericArg::of::<Machine>()]),
            )
            .with(
                HandlerDecl::instance("unrelated", |this: &AttachHooks, _: &AttachParts, _args| {
                    this.journal.push("unrelated");
                    Ok(None)
                })
                .generic_args(vec![GenericArg::of::<Chest>()]),
            )
            .with(
                HandlerDecl::instance("wildcard", |this: &AttachHooks, _: &AttachParts, _args| {
                    this.journal.push("wildcard");
                    Ok(None)
                })
                .generic_args(vec![GenericArg::wildcard()]),
            )
            .with(
                HandlerDecl::instance("two_slots", |this: &AttachHooks, _: &AttachParts, _args| {
                    this.journal.push("two_slots");
                    Ok(None)
                })
                .generic_args(vec![GenericArg::wildcard(), GenericArg::wildcard()]),
            )
            .with(HandlerDecl::instance(
                "untyped",
                |this: &AttachHooks, _: &AttachParts, _args| {
                    this.journal.push("untyped");
                    Ok(None)
                },
            ))
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn slots_match_exact_supertype_and_wildcard() {
    let journal = Arc::new(Journal::default());
    let bus = EventBus::new();
    bus.register(Arc::new(AttachHooks {
        journal: journal.clone(),
    }))
    .unwrap();

    bus.post(AttachParts).unwrap();
    // `unrelated` fails its slot; `two_slots` expects more arguments than
    // the event binds; everything else matches.
    assert_eq!(journal.entries(), vec!["exact", "supertype", "wildcard", "untyped"]);
}

#[test]
fn match_decisions_are_stable_across_posts() {
    let journal = Arc::new(Journal::default());
    let bus = EventBus::new();
    bus.register(Arc::new(AttachHooks {
        journal: journal.clone(),
    }))
    .unwrap();

    bus.post(AttachParts).unwrap();
    bus.post(AttachParts).unwrap();
    let entries = journal.entries();
    assert_eq!(entries.len(), 8);
    assert_eq!(entries[..4], entries[4..]);
}

// ─────────────────────────────────────────────────────────────────────
// First-post binding
// ─────────────────────────────────────────────────────────────────────

/// Claims different type arguments depending on the instance, to show the
/// binding is fixed at the first post.
struct ShiftyAttach {
    claims_chest: bool,
}

impl Event for ShiftyAttach {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_generic(&self) -> Option<&dyn Generic> {
        Some(self)
    }
}

impl Generic for ShiftyAttach {
    fn type_arguments(&self) -> Vec<TypeArg> {
        if self.claims_chest {
            vec![TypeArg::of::<Chest>()]
        } else {
            vec![TypeArg::of::<Furnace>()]
        }
    }
}

struct ShiftyHooks {
    furnace_hits: Arc<AtomicUsize>,
}

impl Listener for ShiftyHooks {
    fn table() -> HandlerTable {
        HandlerTable::of::<ShiftyHooks>().with(
            HandlerDecl::instance("furnace_only", |this: &ShiftyHooks, _: &ShiftyAttach, _args| {
                this.furnace_hits.fetch_add(1, Ordering::SeqCst);
                Ok(None)
            })
            .generic_args(vec![GenericArg::of::<Furnace>()]),
        )
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[test]
fn type_arguments_bind_at_first_post_and_stay_fixed() {
    let furnace_hits = Arc::new(AtomicUsize::new(0));
    let bus = EventBus::new();
    bus.register(Arc::new(ShiftyHooks {
        furnace_hits: furnace_hits.clone(),
    }))
    .unwrap();

    bus.post(ShiftyAttach {
        claims_chest: false,
    })
    .unwrap();
    assert_eq!(furnace_hits.load(Ordering::SeqCst), 1);

    // The second instance claims Chest, but the Furnace binding from the
    // first post is authoritative for the event type.
    bus.post(ShiftyAttach { claims_chest: true }).unwrap();
    assert_eq!(furnace_hits.load(Ordering::SeqCst), 2);
}

// ─────────────────────────────────────────────────────────────────────
// Unestablished arguments
// ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct UnboundAttach;

impl Event for UnboundAttach {
    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_generic(&self) -> Option<&dyn Generic> {
        Some(self)
    }
}

impl Generic for UnboundAttach {
    fn type_arguments(&self) -> Vec<TypeArg> {
        Vec::new()
    }
}

#[test]
fn posting_without_type_arguments_fails() {
    let bus = EventBus::new();
    let err = bus.post(UnboundAttach).expect_err("no arguments to bind");
    assert!(matches!(err, EventError::UnresolvedGenericArguments { .. }));
}
