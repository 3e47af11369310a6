//! Tree-walking evaluator, the host-API registry, the built-in global
//! object, and the per-site inline-cache/type-feedback tables the
//! accelerator crates (`kestrel-bytecode`, `kestrel-jit`) consult (spec.md
//! §4.3, §6).

mod accelerate;
pub mod builtins;
pub mod coercion;
pub mod completion;
pub mod context;
pub mod engine;
pub mod evaluator;
pub mod host;
pub mod inline_cache;
pub mod type_feedback;

pub use completion::Completion;
pub use context::{Context, ContextOptions, Intrinsics, NativeFn, DEFAULT_MAX_DEPTH};
pub use evaluator::Evaluator;
pub use host::HostRegistry;
