//! Process-wide (thread-confined) registry of live allocations.
//!
//! Every [`crate::GcRef::new`] call registers a type-erased weak handle
//! here. The collector walks the registry to trace and sweep without
//! needing a generic `Vec<GcRef<T>>` per type.

use crate::header::GcHeader;
use std::cell::RefCell;

/// Type-erased operations the collector needs on a registered allocation.
pub(crate) trait ErasedNode {
    fn is_alive(&self) -> bool;
    fn needs_trace(&self) -> bool;
    fn with_header(&self, f: &mut dyn FnMut(&GcHeader));
    fn trace_children(&self, tracer: &mut dyn FnMut(&GcHeader));
    fn break_cycle(&self);
}

thread_local! {
    static REGISTRY: RefCell<Vec<Box<dyn ErasedNode>>> = const { RefCell::new(Vec::new()) };
}

pub(crate) fn register(node: impl ErasedNode + 'static) {
    REGISTRY.with(|r| r.borrow_mut().push(Box::new(node)));
}

/// Run `f` with the live entries of the registry, then drop any entry
/// whose backing allocation has already been freed (all `GcRef`s dropped
/// normally, without collector involvement).
pub(crate) fn with_registry<R>(f: impl FnOnce(&[Box<dyn ErasedNode>]) -> R) -> R {
    REGISTRY.with(|r| {
        r.borrow_mut().retain(|n| n.is_alive());
        let guard = r.borrow();
        f(&guard)
    })
}

/// Number of still-live allocations tracked by the registry.
pub fn live_count() -> usize {
    REGISTRY.with(|r| {
        r.borrow_mut().retain(|n| n.is_alive());
        r.borrow().len()
    })
}
