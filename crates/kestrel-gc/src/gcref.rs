//! `GcRef<T>` — a handle to a GC-managed allocation.

use crate::header::GcHeader;
use crate::registry::{register, ErasedNode};
use crate::traceable::GcTraceable;
use std::rc::{Rc, Weak};

struct GcBox<T: GcTraceable> {
    header: GcHeader,
    value: T,
}

/// A handle to a garbage-collected allocation of `T`.
///
/// Internally reference-counted: the allocation is freed as soon as the
/// last `GcRef` (and any cycle-breaking performed by [`crate::Collector`])
/// drops it. This is the "reference counting with cycle breaking" strategy
/// the runtime's object model documents as its reclamation choice — see
/// [`crate::Collector::collect`].
pub struct GcRef<T: GcTraceable>(Rc<GcBox<T>>);

// SAFETY: the VM confines all GcRef access to a single owning thread per
// `Context`; Send/Sync here documents that contract rather than providing
// real cross-thread safety (mirrors the upstream engine's Value/GcRef).
unsafe impl<T: GcTraceable> Send for GcRef<T> {}
unsafe impl<T: GcTraceable> Sync for GcRef<T> {}

impl<T: GcTraceable + 'static> GcRef<T> {
    /// Allocate `value` on the GC heap and register it with the collector.
    pub fn new(value: T) -> Self {
        let rc = Rc::new(GcBox {
            header: GcHeader::new(),
            value,
        });
        register(WeakNode(Rc::downgrade(&rc)));
        GcRef(rc)
    }

    /// Raw pointer to the payload. Used only as an address-identity key
    /// (e.g. by `Value`'s NaN-boxed payload bits); never dereferenced
    /// through the returned pointer.
    pub fn as_ptr(&self) -> *const T {
        &self.0.value as *const T
    }

    /// The allocation's GC metadata.
    pub fn header(&self) -> &GcHeader {
        &self.0.header
    }

    /// Number of live `GcRef` handles to this allocation.
    pub fn strong_count(&self) -> usize {
        Rc::strong_count(&self.0)
    }

    /// Pointer identity comparison, independent of `T: PartialEq`.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl<T: GcTraceable> Clone for GcRef<T> {
    fn clone(&self) -> Self {
        GcRef(Rc::clone(&self.0))
    }
}

impl<T: GcTraceable> std::ops::Deref for GcRef<T> {
    type Target = T;
    fn deref(&self) -> &T {
        &self.0.value
    }
}

impl<T: GcTraceable + std::fmt::Debug> std::fmt::Debug for GcRef<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.0.value, f)
    }
}

/// Type-erased weak handle kept in the collector's registry so it can
/// trace and sweep allocations without knowing their concrete type.
struct WeakNode<T: GcTraceable>(Weak<GcBox<T>>);

impl<T: GcTraceable> ErasedNode for WeakNode<T> {
    fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    fn needs_trace(&self) -> bool {
        T::NEEDS_TRACE
    }

    fn with_header(&self, f: &mut dyn FnMut(&GcHeader)) {
        if let Some(rc) = self.0.upgrade() {
            f(&rc.header);
        }
    }

    fn trace_children(&self, tracer: &mut dyn FnMut(&GcHeader)) {
        if let Some(rc) = self.0.upgrade() {
            rc.value.trace(tracer);
        }
    }

    fn break_cycle(&self) {
        if let Some(rc) = self.0.upgrade() {
            rc.value.break_cycle();
        }
    }
}
