//! `Context`: the embedding surface (spec.md §6) — owns the global
//! object, the active environment, the call stack, the memory pool, the
//! host registry, and the accelerator's per-node feedback/cache tables.
//!
//! Grounded on `otter-vm-core::context::VmContext`'s role as the single
//! per-execution-thread state owner, adapted from a register file to an
//! `Environment` chain since this engine tree-walks rather than runs
//! compiled bytecode by default.

use crate::inline_cache::SiteCache;
use crate::type_feedback::{JitThresholds, NodeAccelState};
use kestrel_core::{CallStack, Environment, JsObject, MemoryPool, VmResult};
use kestrel_gc::{Collector, GcRef, GcStats};
use rustc_hash::FxHashMap;
use std::cell::RefCell;

pub use kestrel_core::DEFAULT_MAX_DEPTH;

pub type NativeFn = std::sync::Arc<dyn Fn(&kestrel_core::Value, &[kestrel_core::Value]) -> VmResult<kestrel_core::Value> + Send + Sync>;

#[derive(Clone, Debug)]
pub struct ContextOptions {
    pub strict_by_default: bool,
    pub max_stack_depth: usize,
    pub jit_thresholds: JitThresholds,
    /// Optional operation budget; when set, the evaluator decrements it
    /// per statement/expression step and raises `VmError::Interrupted`
    /// at zero, modelling the host-provided deadline counter (spec.md §6).
    pub deadline: Option<u64>,
}

impl Default for ContextOptions {
    fn default() -> Self {
        Self {
            strict_by_default: false,
            max_stack_depth: kestrel_core::DEFAULT_MAX_DEPTH,
            jit_thresholds: JitThresholds::default(),
            deadline: None,
        }
    }
}

/// Per-`Context` prototype objects backing primitive boxing (spec.md
/// §4.3: "property access on a primitive boxes it transparently").
pub struct Intrinsics {
    pub object_prototype: GcRef<JsObject>,
    pub array_prototype: GcRef<JsObject>,
    pub function_prototype: GcRef<JsObject>,
    pub string_prototype: GcRef<JsObject>,
    pub number_prototype: GcRef<JsObject>,
    pub boolean_prototype: GcRef<JsObject>,
    pub error_prototype: GcRef<JsObject>,
}

pub struct Context {
    pub global: GcRef<JsObject>,
    pub global_env: GcRef<Environment>,
    pub call_stack: RefCell<CallStack>,
    pub options: ContextOptions,
    pub memory_pool: MemoryPool,
    pub intrinsics: Intrinsics,
    /// Bytecode-compile cache and native-kernel emitter backing the
    /// `Bytecode`/`Optimized`/`MachineCode` tiers (spec.md §4.5). Owned
    /// by this `Context`, not process-wide (spec.md §5).
    pub jit: kestrel_jit::Accelerator,
    jit_state: RefCell<FxHashMap<usize, NodeAccelState>>,
    inline_caches: RefCell<FxHashMap<usize, SiteCache>>,
    deadline_remaining: std::cell::Cell<Option<u64>>,
    next_source_id: std::cell::Cell<u32>,
}

impl Context {
    pub fn new() -> Self {
        Self::with_options(ContextOptions::default())
    }

    pub fn with_options(options: ContextOptions) -> Self {
        let global_env = GcRef::new(Environment::root());
        let call_stack = RefCell::new(CallStack::new(options.max_stack_depth));
        let intrinsics = crate::builtins::install(&global_env);
        Self {
            global: intrinsics.global.clone(),
            global_env,
            call_stack,
            deadline_remaining: std::cell::Cell::new(options.deadline),
            options,
            memory_pool: MemoryPool::new(1 << 20),
            intrinsics: intrinsics.intrinsics,
            jit: kestrel_jit::Accelerator::new(),
            jit_state: RefCell::new(FxHashMap::default()),
            inline_caches: RefCell::new(FxHashMap::default()),
            next_source_id: std::cell::Cell::new(0),
        }
    }

    pub fn next_source_id(&self) -> u32 {
        let id = self.next_source_id.get();
        self.next_source_id.set(id + 1);
        id
    }

    /// Per-AST-node accelerator state, keyed by the node's stable address
    /// (valid for the lifetime of the `Rc<Function>`/`Program` tree that
    /// owns it, which outlives the `Context` using it).
    pub fn node_state(&self, node_ptr: usize) -> std::cell::RefMut<'_, NodeAccelState> {
        std::cell::RefMut::map(self.jit_state.borrow_mut(), |m| m.entry(node_ptr).or_default())
    }

    pub fn site_cache(&self, node_ptr: usize) -> std::cell::RefMut<'_, SiteCache> {
        std::cell::RefMut::map(self.inline_caches.borrow_mut(), |m| m.entry(node_ptr).or_default())
    }

    /// Run one mark-and-cycle-break pass over the GC heap (spec.md §4.1's
    /// "reference counting with cycle breaking"), rooted at the global
    /// object/environment and the prototype intrinsics.
    ///
    /// Only safe to call between top-level evaluations: it walks the
    /// rooted reference graph, not the Rust call stack, so any `GcRef`
    /// held only by a local variable mid-evaluation (a function call's
    /// `call_env`, a loop's `iter_env`, a completion value not yet
    /// returned to the caller) looks unreachable and would have its
    /// children incorrectly cleared. `kestrel`'s REPL calls this between
    /// lines, after the previous completion value has already been
    /// printed and dropped (`commands/repl.rs`).
    pub fn collect_garbage(&self) -> GcStats {
        Collector::collect(|mark| {
            mark(self.global.header());
            mark(self.global_env.header());
            mark(self.intrinsics.object_prototype.header());
            mark(self.intrinsics.array_prototype.header());
            mark(self.intrinsics.function_prototype.header());
            mark(self.intrinsics.string_prototype.header());
            mark(self.intrinsics.number_prototype.header());
            mark(self.intrinsics.boolean_prototype.header());
            mark(self.intrinsics.error_prototype.header());
        })
    }

    /// Tick the deadline counter by one operation; returns `false` once a
    /// configured deadline is exhausted.
    pub fn tick(&self) -> bool {
        match self.deadline_remaining.get() {
            None => true,
            Some(0) => false,
            Some(n) => {
                self.deadline_remaining.set(Some(n - 1));
                true
            }
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collect_garbage_breaks_an_unreachable_object_cycle() {
        let ctx = Context::new();
        ctx.evaluate("var o = {}; o.self = o; o = null;", "<test>").unwrap();
        let stats = ctx.collect_garbage();
        assert!(stats.cycles_broken >= 1, "expected the orphaned self-cycle to be swept: {stats:?}");
    }

    #[test]
    fn collect_garbage_keeps_reachable_globals_marked() {
        let ctx = Context::new();
        ctx.evaluate("var kept = { value: 42 };", "<test>").unwrap();
        ctx.collect_garbage();
        let kept = ctx.get_global("kept");
        assert!(!kept.is_undefined());
    }
}
