//! # Kestrel GC
//!
//! Thread-confined garbage collector for the Kestrel ECMAScript runtime's
//! object heap. Allocations are reference-counted (`GcRef<T>` wraps an
//! `Rc`); [`Collector`] adds a mark pass that detects cycles `Rc` alone
//! cannot reclaim and breaks them via [`GcTraceable::break_cycle`].
//!
//! This is independent of [`MemoryPool`]-style arenas used for transient,
//! non-heap allocations elsewhere in the runtime — see `kestrel-core::memory`.

#![warn(clippy::all)]

mod collector;
mod gcref;
mod header;
mod registry;
mod traceable;

pub use collector::{Collector, GcStats};
pub use gcref::GcRef;
pub use header::GcHeader;
pub use registry::live_count;
pub use traceable::GcTraceable;
