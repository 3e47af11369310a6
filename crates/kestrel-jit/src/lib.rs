//! The tiered accelerator (spec.md §4.5): AST-pattern recognition for
//! closed-form native emission, and the `cranelift-jit` backend that
//! compiles the two recognised kernels.
//!
//! `kestrel-jit` never runs arbitrary script — it only ever (a) hands a
//! whole function body to `kestrel-bytecode::compile_function` for the
//! `Bytecode` tier, or (b) recognises one of two narrowly-scoped counted-
//! loop shapes in `pattern.rs` and, if recognised, calls a pre-compiled
//! native kernel for the `Optimized`/`MachineCode` tiers. Both paths
//! degrade silently to `Decision::Interpret` on anything they don't
//! understand (spec.md §4.5: "JIT failures degrade silently").

pub mod accelerator;
pub mod bailout;
pub mod compiler;
pub mod pattern;

pub use accelerator::{exclusive_bound, resolve_bound, Accelerator, Decision};
pub use bailout::{is_sum_bailout, DEOPT_THRESHOLD, MAX_NATIVE_TRIP_COUNT, PUSH_BAILOUT};
pub use compiler::{NativeCompiler, NativeError, PushTripKernelFn, SumKernelFn};
pub use pattern::{match_push_loop, match_sum_loop, LoopBound, PushLoopPattern, SumLoopPattern};
