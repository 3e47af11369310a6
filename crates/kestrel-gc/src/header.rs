//! Per-allocation GC metadata.

use std::cell::Cell;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Metadata attached to every GC-managed allocation.
///
/// `marked` is flipped during the mark phase of a [`crate::Collector::collect`]
/// pass and cleared again at the start of the next pass. `id` is a stable,
/// process-wide identity used only for diagnostics (trace logs, `Debug`
/// output) — never for pointer arithmetic.
pub struct GcHeader {
    marked: Cell<bool>,
    id: u64,
}

impl GcHeader {
    /// Create a fresh, unmarked header with a new identity.
    pub fn new() -> Self {
        Self {
            marked: Cell::new(false),
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Stable allocation id, for debug output only.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Whether this allocation survived the last mark phase.
    pub fn is_marked(&self) -> bool {
        self.marked.get()
    }

    /// Mark this allocation as reachable. Returns `true` if this call
    /// transitioned it from unmarked to marked (so callers can avoid
    /// re-tracing an already-visited subgraph).
    pub fn mark(&self) -> bool {
        if self.marked.get() {
            false
        } else {
            self.marked.set(true);
            true
        }
    }

    /// Reset the mark bit ahead of a new collection pass.
    pub fn clear_mark(&self) {
        self.marked.set(false);
    }
}

impl Default for GcHeader {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for GcHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "GcHeader(#{})", self.id)
    }
}
