//! Ties `pattern.rs` recognition, `compiler.rs` native kernels, and
//! `kestrel-bytecode`'s compiler/VM into the four-tier state machine
//! spec.md §4.5 and §9 describe (`Interpreter -> Bytecode -> Optimized ->
//! MachineCode`, with a deopt edge back to `Bytecode`).
//!
//! One `Accelerator` lives on a `Context` (spec.md §5: "`JITCompiler`
//! state... is owned by one `Context` and not shared"). It owns the two
//! compiled-once native kernels and a per-AST-node cache of bytecode
//! compiles, keyed the same way `Context::node_state` keys its tier/
//! feedback counters: by the node's stable pointer identity.

use std::cell::RefCell;
use std::rc::Rc;

use kestrel_bytecode::{compile_function, CompiledFunction};
use kestrel_core::Value;
use kestrel_parser::{Function, Statement};
use rustc_hash::FxHashMap;

use crate::bailout::{is_sum_bailout, DEOPT_THRESHOLD, PUSH_BAILOUT};
use crate::compiler::{NativeCompiler, PushTripKernelFn, SumKernelFn};
use crate::pattern::{self, LoopBound, PushLoopPattern, SumLoopPattern};

/// What the caller should do with a given AST node this call.
pub enum Decision {
    /// Stay at the tree-walking tier (not hot yet, or compilation failed
    /// and won't be retried).
    Interpret,
    /// Run the cached bytecode compile of a whole function body.
    Bytecode(Rc<CompiledFunction>),
    /// A recognised, native-eligible `for` loop inside the current
    /// function/program body.
    NativeSum { pattern: SumLoopPattern, kernel: SumKernelFn },
    NativePush { pattern: PushLoopPattern, kernel: PushTripKernelFn },
}

#[derive(Default)]
struct SiteState {
    bytecode: Option<Rc<CompiledFunction>>,
    bytecode_attempted: bool,
    native_attempted: bool,
    deopt_count: u32,
    blocked: bool,
}

pub struct Accelerator {
    native: RefCell<Option<NativeCompiler>>,
    sum_kernel: RefCell<Option<SumKernelFn>>,
    push_kernel: RefCell<Option<PushTripKernelFn>>,
    sites: RefCell<FxHashMap<usize, SiteState>>,
}

impl Accelerator {
    pub fn new() -> Self {
        Self {
            native: RefCell::new(None),
            sum_kernel: RefCell::new(None),
            push_kernel: RefCell::new(None),
            sites: RefCell::new(FxHashMap::default()),
        }
    }

    fn native_compiler(&self) -> std::cell::RefMut<'_, Option<NativeCompiler>> {
        let mut slot = self.native.borrow_mut();
        if slot.is_none() {
            match NativeCompiler::new() {
                Ok(c) => *slot = Some(c),
                Err(e) => tracing::warn!(error = %e, "native code backend unavailable, machine-code tier disabled"),
            }
        }
        slot
    }

    fn sum_kernel(&self) -> Option<SumKernelFn> {
        if let Some(k) = *self.sum_kernel.borrow() {
            return Some(k);
        }
        let mut compiler_slot = self.native_compiler();
        let compiler = compiler_slot.as_mut()?;
        match compiler.compile_sum_kernel() {
            Ok(k) => {
                *self.sum_kernel.borrow_mut() = Some(k);
                Some(k)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to compile sum-loop native kernel");
                None
            }
        }
    }

    fn push_kernel(&self) -> Option<PushTripKernelFn> {
        if let Some(k) = *self.push_kernel.borrow() {
            return Some(k);
        }
        let mut compiler_slot = self.native_compiler();
        let compiler = compiler_slot.as_mut()?;
        match compiler.compile_push_trip_kernel() {
            Ok(k) => {
                *self.push_kernel.borrow_mut() = Some(k);
                Some(k)
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to compile push-loop native kernel");
                None
            }
        }
    }

    /// Try to recognise and natively accelerate a `for` statement at the
    /// `Optimized`/`MachineCode` tier. Falls back to [`Decision::Interpret`]
    /// (never to bytecode — a loop statement isn't a whole function body)
    /// when the shape doesn't match or the kernel isn't available.
    pub fn accelerate_loop(&self, node_ptr: usize, stmt: &Statement) -> Decision {
        let mut sites = self.sites.borrow_mut();
        let site = sites.entry(node_ptr).or_default();
        if site.blocked {
            return Decision::Interpret;
        }
        site.native_attempted = true;

        if let Some(p) = pattern::match_sum_loop(stmt) {
            if let Some(kernel) = self.sum_kernel() {
                return Decision::NativeSum { pattern: p, kernel };
            }
        } else if let Some(p) = pattern::match_push_loop(stmt) {
            if let Some(kernel) = self.push_kernel() {
                return Decision::NativePush { pattern: p, kernel };
            }
        }
        Decision::Interpret
    }

    /// Record that a native kernel bailed out (inputs outside its safe
    /// range); after [`DEOPT_THRESHOLD`] such bailouts this site is
    /// permanently blocked from retrying native emission (spec.md §4.5:
    /// "a guard failure also increments a counter that, if it crosses a
    /// threshold, permanently blocks re-promotion of that site").
    pub fn record_bailout(&self, node_ptr: usize) {
        let mut sites = self.sites.borrow_mut();
        let site = sites.entry(node_ptr).or_default();
        site.deopt_count += 1;
        if site.deopt_count >= DEOPT_THRESHOLD {
            site.blocked = true;
        }
    }

    /// Get or compile the bytecode tier for a whole function body,
    /// caching the result (or the fact that compilation was rejected) per
    /// node so a function that can't compile isn't retried every call
    /// (spec.md §4.5: "Bytecode is cached per AST node").
    pub fn bytecode_for(&self, node_ptr: usize, func: &Function) -> Option<Rc<CompiledFunction>> {
        let mut sites = self.sites.borrow_mut();
        let site = sites.entry(node_ptr).or_default();
        if let Some(cached) = &site.bytecode {
            return Some(cached.clone());
        }
        if site.bytecode_attempted {
            return None;
        }
        site.bytecode_attempted = true;
        match compile_function(func) {
            Ok(compiled) => {
                let rc = Rc::new(compiled);
                site.bytecode = Some(rc.clone());
                Some(rc)
            }
            Err(e) => {
                tracing::debug!(error = %e, "function not eligible for bytecode tier");
                None
            }
        }
    }
}

impl Default for Accelerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Resolve a [`LoopBound`] to a concrete `f64`, reading an outer variable
/// through `read_var` when the bound isn't a literal. Returns `None` (the
/// caller should fall back to interpretation) when the variable can't be
/// read or isn't a plain finite number, matching spec.md §4.5's guard-
/// before-native-call contract.
pub fn resolve_bound(bound: &LoopBound, read_var: impl FnOnce(&str) -> Option<Value>) -> Option<f64> {
    match bound {
        LoopBound::Literal(n) => Some(*n),
        LoopBound::Variable(name) => match read_var(name)? {
            Value::Number(n) if n.is_finite() => Some(n),
            _ => None,
        },
    }
}

/// Adjust a `<`/`<=` comparison bound into the exclusive bound the
/// closed-form kernels expect (both patterns step by exactly 1).
pub fn exclusive_bound(bound: f64, inclusive: bool) -> f64 {
    if inclusive {
        bound + 1.0
    } else {
        bound
    }
}

pub use is_sum_bailout as is_sum_kernel_bailout;
pub use PUSH_BAILOUT as PUSH_KERNEL_BAILOUT;
