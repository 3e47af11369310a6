//! The tree-walking evaluator: statements and expressions execute
//! directly against the AST produced by `kestrel-parser` (spec.md §4.3).
//!
//! Grounded on `otter-vm-core::interpreter`'s direct-AST-walk dispatch,
//! adapted to the explicit `Completion` value (spec.md §9 Design Notes:
//! "replace exception-based `return` in the tree walker with an explicit
//! completion value") instead of the teacher's exception-based control
//! flow, and to this engine's `Environment`-chain closures rather than its
//! register file.

use crate::coercion::{self, PreferredType};
use crate::completion::Completion;
use crate::context::Context;
use kestrel_core::{
    well_known_symbols, Attributes, BindingError, BigInt, CallFrame, Callable, Environment, FunctionData, JsObject,
    PropertyDescriptor, PropertyKey, SlotKind, StackFrame, Value, VmError, VmResult,
};
use kestrel_gc::GcRef;
use kestrel_parser::{
    ArrayElement, Argument, AssignOp, BinaryOp, Class, ClassMemberKind, DeclKind, Expr, ForBinding, ForInit,
    Function, FunctionBody, LogicalOp, MemberProperty, ObjectProp, Pattern, Program, PropertyKeyNode, Statement,
    UnaryOp,
};
use std::rc::Rc;

/// Binding mode threaded through pattern destructuring: `var`, `let`/
/// `const`, and parameters each land in the environment a different way
/// (spec.md §4.2).
#[derive(Clone, Copy, PartialEq, Eq)]
enum BindMode {
    Var,
    LetConst,
    Param,
}

/// Result of evaluating one link of a member/call chain. `ShortCircuit`
/// propagates up through an entire `?.` chain without evaluating what
/// follows, per spec.md §4.3's optional-chaining short-circuit.
enum ChainEval {
    Value(Value),
    ShortCircuit,
}

/// What an abrupt loop-body completion should do to the enclosing loop.
enum LoopSignal {
    Break,
    Continue,
    Propagate(Completion),
}

/// Executes a program or function body against a `Context`. Carries no
/// state of its own beyond the borrowed `Context` — every recursive call
/// takes its environment explicitly, so a getter invoked mid-expression or
/// a callback passed to a builtin just recurses through the same methods.
pub struct Evaluator<'ctx> {
    ctx: &'ctx Context,
}

impl<'ctx> Evaluator<'ctx> {
    pub fn new(ctx: &'ctx Context) -> Self {
        Self { ctx }
    }

    /// Run a top-level program, normalizing any propagating `VmError` into
    /// a catchable `Exception` the way an uncaught `try`/`catch` boundary
    /// would, so the embedding surface always sees a throwable value.
    pub fn run_program(&self, program: &Program, env: &GcRef<Environment>) -> VmResult<Value> {
        self.eval_program(program, env).map_err(|e| self.normalize_error(e))
    }

    pub fn eval_program(&self, program: &Program, env: &GcRef<Environment>) -> VmResult<Value> {
        self.hoist_var_scope(&program.body, env)?;
        self.declare_lexical(&program.body, env)?;
        Ok(self.run_stmts(&program.body, env)?.value())
    }

    // ---------------------------------------------------------------
    // Hoisting
    // ---------------------------------------------------------------

    /// Collects every `var` and function declaration reachable from
    /// `stmts` without descending into nested function/arrow bodies
    /// (those hoist into their own call), and binds function declarations
    /// eagerly. Legacy ("Annex B") sloppy-mode behavior: a function
    /// declaration nested in a block still hoists to the nearest
    /// function/program scope.
    fn hoist_var_scope(&self, stmts: &[Statement], env: &GcRef<Environment>) -> VmResult<()> {
        for s in stmts {
            self.hoist_stmt(s, env)?;
        }
        Ok(())
    }

    fn hoist_stmt(&self, stmt: &Statement, env: &GcRef<Environment>) -> VmResult<()> {
        match stmt {
            Statement::VarDecl { kind: DeclKind::Var, declarations } => {
                for (pat, _) in declarations {
                    let mut names = Vec::new();
                    pattern_names(pat, &mut names);
                    for n in names {
                        env.declare_var(&n);
                    }
                }
                Ok(())
            }
            Statement::FunctionDecl(func_rc) => {
                if let Some(name) = &func_rc.name {
                    env.declare_var(name);
                    let value = self.make_function_value(func_rc.clone(), env.clone());
                    env.set(name, value)?;
                }
                Ok(())
            }
            Statement::If { consequent, alternate, .. } => {
                self.hoist_stmt(consequent, env)?;
                if let Some(a) = alternate {
                    self.hoist_stmt(a, env)?;
                }
                Ok(())
            }
            Statement::Block(stmts) => self.hoist_var_scope(stmts, env),
            Statement::While { body, .. } | Statement::DoWhile { body, .. } => self.hoist_stmt(body, env),
            Statement::For { init, body, .. } => {
                if let Some(init) = init {
                    if let ForInit::VarDecl { kind: DeclKind::Var, declarations } = &**init {
                        for (pat, _) in declarations {
                            let mut names = Vec::new();
                            pattern_names(pat, &mut names);
                            for n in names {
                                env.declare_var(&n);
                            }
                        }
                    }
                }
                self.hoist_stmt(body, env)
            }
            Statement::ForIn { decl, body, .. } | Statement::ForOf { decl, body, .. } => {
                if decl.kind == Some(DeclKind::Var) {
                    let mut names = Vec::new();
                    pattern_names(&decl.pattern, &mut names);
                    for n in names {
                        env.declare_var(&n);
                    }
                }
                self.hoist_stmt(body, env)
            }
            Statement::Switch { cases, .. } => {
                for c in cases {
                    self.hoist_var_scope(&c.consequent, env)?;
                }
                Ok(())
            }
            Statement::Try { block, handler, finalizer } => {
                self.hoist_var_scope(block, env)?;
                if let Some(h) = handler {
                    self.hoist_var_scope(&h.body, env)?;
                }
                if let Some(f) = finalizer {
                    self.hoist_var_scope(f, env)?;
                }
                Ok(())
            }
            Statement::Labeled { body, .. } => self.hoist_stmt(body, env),
            _ => Ok(()),
        }
    }

    /// Declares (but does not initialize) the `let`/`const`/class bindings
    /// directly in `stmts` — one block's worth, not recursing into nested
    /// blocks, matching each block's own lexical scope.
    fn declare_lexical(&self, stmts: &[Statement], env: &GcRef<Environment>) -> VmResult<()> {
        for s in stmts {
            match s {
                Statement::VarDecl { kind: DeclKind::Let, declarations } => {
                    for (pat, _) in declarations {
                        self.declare_pattern_names(pat, env, DeclKind::Let)?;
                    }
                }
                Statement::VarDecl { kind: DeclKind::Const, declarations } => {
                    for (pat, _) in declarations {
                        self.declare_pattern_names(pat, env, DeclKind::Const)?;
                    }
                }
                Statement::ClassDecl(class_rc) => {
                    if let Some(name) = &class_rc.name {
                        env.declare_let(name)?;
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn declare_pattern_names(&self, pattern: &Pattern, env: &GcRef<Environment>, kind: DeclKind) -> VmResult<()> {
        let mut names = Vec::new();
        pattern_names(pattern, &mut names);
        for n in names {
            match kind {
                DeclKind::Let => env.declare_let(&n)?,
                DeclKind::Const => env.declare_const(&n)?,
                DeclKind::Var => env.declare_var(&n),
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Statements
    // ---------------------------------------------------------------

    pub fn eval_statement(&self, stmt: &Statement, env: &GcRef<Environment>) -> VmResult<Completion> {
        self.eval_statement_labeled(stmt, env, &[])
    }

    fn eval_statement_labeled(&self, stmt: &Statement, env: &GcRef<Environment>, labels: &[String]) -> VmResult<Completion> {
        if !self.ctx.tick() {
            return Err(VmError::interrupted());
        }
        match stmt {
            Statement::Empty => Ok(Completion::Normal(Value::Undefined)),
            Statement::Expression(e) => Ok(Completion::Normal(self.eval_expr(e, env)?)),
            Statement::VarDecl { kind, declarations } => {
                self.eval_var_decl(*kind, declarations, env)?;
                Ok(Completion::Normal(Value::Undefined))
            }
            Statement::FunctionDecl(_) => Ok(Completion::Normal(Value::Undefined)),
            Statement::ClassDecl(class_rc) => {
                let v = self.eval_class(class_rc, env)?;
                if let Some(name) = &class_rc.name {
                    env.initialize(name, v)?;
                }
                Ok(Completion::Normal(Value::Undefined))
            }
            Statement::Return(expr) => {
                let v = match expr {
                    Some(e) => self.eval_expr(e, env)?,
                    None => Value::Undefined,
                };
                Ok(Completion::Return(v))
            }
            Statement::If { test, consequent, alternate } => {
                if self.eval_expr(test, env)?.to_boolean() {
                    self.eval_statement(consequent, env)
                } else if let Some(a) = alternate {
                    self.eval_statement(a, env)
                } else {
                    Ok(Completion::Normal(Value::Undefined))
                }
            }
            Statement::Block(stmts) => self.eval_block(stmts, env),
            Statement::While { test, body } => self.eval_while(test, body, env, labels),
            Statement::DoWhile { body, test } => self.eval_do_while(body, test, env, labels),
            Statement::For { init, test, update, body } => self.eval_for(stmt, init, test, update, body, env, labels),
            Statement::ForIn { decl, object, body } => self.eval_for_in(decl, object, body, env, labels),
            Statement::ForOf { decl, object, body, .. } => self.eval_for_of(decl, object, body, env, labels),
            Statement::Break(label) => Ok(Completion::Break(label.clone())),
            Statement::Continue(label) => Ok(Completion::Continue(label.clone())),
            Statement::Switch { discriminant, cases } => self.eval_switch(discriminant, cases, env, labels),
            Statement::Try { block, handler, finalizer } => self.eval_try(block, handler, finalizer, env),
            Statement::Throw(e) => {
                let v = self.eval_expr(e, env)?;
                Err(self.throw(v))
            }
            Statement::Labeled { label, body } => {
                let mut next_labels = vec![label.clone()];
                next_labels.extend_from_slice(labels);
                match self.eval_statement_labeled(body, env, &next_labels)? {
                    Completion::Break(Some(l)) if l == *label => Ok(Completion::Normal(Value::Undefined)),
                    other => Ok(other),
                }
            }
        }
    }

    fn eval_block(&self, stmts: &[Statement], env: &GcRef<Environment>) -> VmResult<Completion> {
        let block_env = GcRef::new(Environment::child(env));
        self.declare_lexical(stmts, &block_env)?;
        self.run_stmts(stmts, &block_env)
    }

    fn run_stmts(&self, stmts: &[Statement], env: &GcRef<Environment>) -> VmResult<Completion> {
        for s in stmts {
            let c = self.eval_statement(s, env)?;
            if c.is_abrupt() {
                return Ok(c);
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn eval_var_decl(&self, kind: DeclKind, declarations: &[(Pattern, Option<Expr>)], env: &GcRef<Environment>) -> VmResult<()> {
        for (pat, init) in declarations {
            match kind {
                DeclKind::Var => {
                    if let Some(e) = init {
                        let v = self.eval_expr(e, env)?;
                        self.bind_pattern(pat, v, env, BindMode::Var)?;
                    }
                }
                DeclKind::Let => {
                    let v = match init {
                        Some(e) => self.eval_expr(e, env)?,
                        None => Value::Undefined,
                    };
                    self.bind_pattern(pat, v, env, BindMode::LetConst)?;
                }
                DeclKind::Const => {
                    let e = init.as_ref().ok_or_else(|| VmError::syntax_error("Missing initializer in const declaration"))?;
                    let v = self.eval_expr(e, env)?;
                    self.bind_pattern(pat, v, env, BindMode::LetConst)?;
                }
            }
        }
        Ok(())
    }

    // ---------------------------------------------------------------
    // Loops
    // ---------------------------------------------------------------

    fn loop_signal(&self, c: Completion, labels: &[String]) -> LoopSignal {
        match c {
            Completion::Break(None) => LoopSignal::Break,
            Completion::Break(Some(l)) => {
                if labels.iter().any(|x| *x == l) {
                    LoopSignal::Break
                } else {
                    LoopSignal::Propagate(Completion::Break(Some(l)))
                }
            }
            Completion::Continue(None) => LoopSignal::Continue,
            Completion::Continue(Some(l)) => {
                if labels.iter().any(|x| *x == l) {
                    LoopSignal::Continue
                } else {
                    LoopSignal::Propagate(Completion::Continue(Some(l)))
                }
            }
            other => LoopSignal::Propagate(other),
        }
    }

    fn eval_while(&self, test: &Expr, body: &Statement, env: &GcRef<Environment>, labels: &[String]) -> VmResult<Completion> {
        while self.eval_expr(test, env)?.to_boolean() {
            if !self.ctx.tick() {
                return Err(VmError::interrupted());
            }
            match self.loop_signal(self.eval_statement(body, env)?, labels) {
                LoopSignal::Break => break,
                LoopSignal::Continue => {}
                LoopSignal::Propagate(c) => return Ok(c),
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn eval_do_while(&self, body: &Statement, test: &Expr, env: &GcRef<Environment>, labels: &[String]) -> VmResult<Completion> {
        loop {
            if !self.ctx.tick() {
                return Err(VmError::interrupted());
            }
            match self.loop_signal(self.eval_statement(body, env)?, labels) {
                LoopSignal::Break => break,
                LoopSignal::Continue => {}
                LoopSignal::Propagate(c) => return Ok(c),
            }
            if !self.eval_expr(test, env)?.to_boolean() {
                break;
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn copy_let_bindings(&self, from: &GcRef<Environment>, names: &[String]) -> VmResult<GcRef<Environment>> {
        let child = GcRef::new(Environment::child(from));
        for n in names {
            let v = from.get(n)?;
            child.declare_initialized(n, v);
        }
        Ok(child)
    }

    fn copy_back_let_bindings(&self, from: &GcRef<Environment>, to: &GcRef<Environment>, names: &[String]) -> VmResult<()> {
        for n in names {
            let v = from.get(n)?;
            to.set(n, v)?;
        }
        Ok(())
    }

    fn eval_for(
        &self,
        stmt: &Statement,
        init: &Option<Box<ForInit>>,
        test: &Option<Expr>,
        update: &Option<Expr>,
        body: &Statement,
        outer_env: &GcRef<Environment>,
        labels: &[String],
    ) -> VmResult<Completion> {
        let for_env = GcRef::new(Environment::child(outer_env));
        let mut per_iteration_names: Vec<String> = Vec::new();
        if let Some(init) = init {
            match &**init {
                ForInit::VarDecl { kind: DeclKind::Var, declarations } => {
                    self.eval_var_decl(DeclKind::Var, declarations, &for_env)?;
                }
                ForInit::VarDecl { kind, declarations } => {
                    for (pat, _) in declarations {
                        self.declare_pattern_names(pat, &for_env, *kind)?;
                        let mut names = Vec::new();
                        pattern_names(pat, &mut names);
                        per_iteration_names.extend(names);
                    }
                    self.eval_var_decl(*kind, declarations, &for_env)?;
                }
                ForInit::Expression(e) => {
                    self.eval_expr(e, &for_env)?;
                }
            }
        }
        let node_ptr = stmt as *const Statement as usize;
        let mut native_checked = false;
        loop {
            if let Some(t) = test {
                if !self.eval_expr(t, &for_env)?.to_boolean() {
                    break;
                }
            }
            if !self.ctx.tick() {
                return Err(VmError::interrupted());
            }
            let tier = {
                let mut state = self.ctx.node_state(node_ptr);
                state.record_execution(&self.ctx.options.jit_thresholds);
                state.tier
            };
            if !native_checked && matches!(tier, crate::type_feedback::Tier::Optimized | crate::type_feedback::Tier::MachineCode) {
                native_checked = true;
                if self.try_accelerate_for(node_ptr, stmt, &for_env)? {
                    return Ok(Completion::Normal(Value::Undefined));
                }
            }
            let iter_env = if per_iteration_names.is_empty() { for_env.clone() } else { self.copy_let_bindings(&for_env, &per_iteration_names)? };
            let body_completion = self.eval_statement(body, &iter_env)?;
            match self.loop_signal(body_completion, labels) {
                LoopSignal::Break => break,
                LoopSignal::Propagate(c) => return Ok(c),
                LoopSignal::Continue => {}
            }
            if !per_iteration_names.is_empty() {
                self.copy_back_let_bindings(&iter_env, &for_env, &per_iteration_names)?;
            }
            if let Some(u) = update {
                self.eval_expr(u, &for_env)?;
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    /// On-stack replacement for a hot counted `for` loop (spec.md §4.5's
    /// "Optimized"/"MachineCode" tiers): recognises the two closed-form
    /// shapes in `kestrel_jit::pattern` and, when the current loop state
    /// matches the kernel's safe range, folds the *remaining* iterations
    /// into one native call rather than restarting the loop. Returns
    /// `Ok(true)` when the remainder was resolved this way (the caller
    /// must stop tree-walking the loop); `Ok(false)` means the pattern
    /// didn't match, a guard failed, or the native backend isn't
    /// available, and the tree walk continues exactly as if this method
    /// had never been called (spec.md §4.5: "JIT failures degrade
    /// silently").
    fn try_accelerate_for(&self, node_ptr: usize, stmt: &Statement, for_env: &GcRef<Environment>) -> VmResult<bool> {
        match self.ctx.jit.accelerate_loop(node_ptr, stmt) {
            kestrel_jit::Decision::NativeSum { pattern, kernel } => {
                let Ok(Value::Number(current_i)) = for_env.get(&pattern.loop_var) else {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                };
                let Ok(Value::Number(current_acc)) = for_env.get(&pattern.acc_var) else {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                };
                let Some(bound) = kestrel_jit::resolve_bound(&pattern.bound, |name| for_env.get(name).ok()) else {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                };
                let exclusive = kestrel_jit::exclusive_bound(bound, pattern.inclusive);
                let result = kernel(current_i, exclusive, current_acc);
                if kestrel_jit::is_sum_kernel_bailout(result) {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                }
                for_env.set(&pattern.acc_var, Value::Number(result)).map_err(Into::into)?;
                for_env.set(&pattern.loop_var, Value::Number(exclusive)).map_err(Into::into)?;
                Ok(true)
            }
            kestrel_jit::Decision::NativePush { pattern, kernel } => {
                let Ok(Value::Number(current_i)) = for_env.get(&pattern.loop_var) else {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                };
                let Ok(Value::Object(array)) = for_env.get(&pattern.array_var) else {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                };
                if !array.is_array() {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                }
                let Some(bound) = kestrel_jit::resolve_bound(&pattern.bound, |name| for_env.get(name).ok()) else {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                };
                let exclusive = kestrel_jit::exclusive_bound(bound, pattern.inclusive);
                let trips = kernel(current_i, exclusive);
                if trips == kestrel_jit::PUSH_KERNEL_BAILOUT {
                    self.ctx.jit.record_bailout(node_ptr);
                    return Ok(false);
                }
                for _ in 0..trips {
                    array.array_push(Value::Number(pattern.pushed_value));
                }
                for_env.set(&pattern.loop_var, Value::Number(exclusive)).map_err(Into::into)?;
                Ok(true)
            }
            kestrel_jit::Decision::Interpret | kestrel_jit::Decision::Bytecode(_) => Ok(false),
        }
    }

    fn bind_for_target(&self, decl: &ForBinding, value: Value, env: &GcRef<Environment>) -> VmResult<()> {
        match decl.kind {
            Some(k @ (DeclKind::Let | DeclKind::Const)) => {
                self.declare_pattern_names(&decl.pattern, env, k)?;
                self.bind_pattern(&decl.pattern, value, env, BindMode::LetConst)
            }
            Some(DeclKind::Var) => self.bind_pattern(&decl.pattern, value, env, BindMode::Var),
            None => match &decl.pattern {
                Pattern::Ident(name) => env.set(name, value).map_err(Into::into),
                other => self.bind_pattern(other, value, env, BindMode::Var),
            },
        }
    }

    fn eval_for_in(&self, decl: &ForBinding, object: &Expr, body: &Statement, env: &GcRef<Environment>, labels: &[String]) -> VmResult<Completion> {
        let obj_val = self.eval_expr(object, env)?;
        let mut keys: Vec<String> = Vec::new();
        if let Value::Object(o) = &obj_val {
            let mut seen = std::collections::HashSet::new();
            let mut cur = Some(o.clone());
            while let Some(c) = cur {
                for k in c.own_enumerable_keys() {
                    if matches!(k, PropertyKey::Symbol(_)) {
                        continue;
                    }
                    let s = self.property_key_display(&k);
                    if seen.insert(s.clone()) {
                        keys.push(s);
                    }
                }
                cur = c.prototype();
            }
        }
        for k in keys {
            if !self.ctx.tick() {
                return Err(VmError::interrupted());
            }
            let iter_env = GcRef::new(Environment::child(env));
            self.bind_for_target(decl, Value::string(&k), &iter_env)?;
            match self.loop_signal(self.eval_statement(body, &iter_env)?, labels) {
                LoopSignal::Break => break,
                LoopSignal::Propagate(c) => return Ok(c),
                LoopSignal::Continue => {}
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn eval_for_of(&self, decl: &ForBinding, object: &Expr, body: &Statement, env: &GcRef<Environment>, labels: &[String]) -> VmResult<Completion> {
        let obj_val = self.eval_expr(object, env)?;
        let items = self.iterate(&obj_val)?;
        for item in items {
            if !self.ctx.tick() {
                return Err(VmError::interrupted());
            }
            let iter_env = GcRef::new(Environment::child(env));
            self.bind_for_target(decl, item, &iter_env)?;
            match self.loop_signal(self.eval_statement(body, &iter_env)?, labels) {
                LoopSignal::Break => break,
                LoopSignal::Propagate(c) => return Ok(c),
                LoopSignal::Continue => {}
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn eval_switch(&self, discriminant: &Expr, cases: &[kestrel_parser::SwitchCase], env: &GcRef<Environment>, labels: &[String]) -> VmResult<Completion> {
        let disc = self.eval_expr(discriminant, env)?;
        let switch_env = GcRef::new(Environment::child(env));
        for c in cases {
            self.declare_lexical(&c.consequent, &switch_env)?;
        }
        let mut matched_index = None;
        for (i, c) in cases.iter().enumerate() {
            if let Some(test) = &c.test {
                let tv = self.eval_expr(test, &switch_env)?;
                if tv.strict_equals(&disc) {
                    matched_index = Some(i);
                    break;
                }
            }
        }
        let start = match matched_index {
            Some(i) => i,
            None => match cases.iter().position(|c| c.test.is_none()) {
                Some(i) => i,
                None => return Ok(Completion::Normal(Value::Undefined)),
            },
        };
        for c in &cases[start..] {
            for s in &c.consequent {
                match self.eval_statement(s, &switch_env)? {
                    Completion::Normal(_) => {}
                    Completion::Break(None) => return Ok(Completion::Normal(Value::Undefined)),
                    Completion::Break(Some(l)) if labels.iter().any(|x| *x == l) => return Ok(Completion::Normal(Value::Undefined)),
                    other => return Ok(other),
                }
            }
        }
        Ok(Completion::Normal(Value::Undefined))
    }

    fn eval_try(
        &self,
        block: &[Statement],
        handler: &Option<kestrel_parser::CatchClause>,
        finalizer: &Option<Vec<Statement>>,
        env: &GcRef<Environment>,
    ) -> VmResult<Completion> {
        let body_result = self.eval_block(block, env);
        let after_catch: VmResult<Completion> = match body_result {
            Ok(c) => Ok(c),
            Err(e) => {
                let e = self.normalize_error(e);
                match (&e, handler) {
                    (VmError::Exception(thrown), Some(h)) => self.eval_catch(h, thrown.value.clone(), env),
                    _ => Err(e),
                }
            }
        };
        if let Some(fin) = finalizer {
            match self.eval_block(fin, env)? {
                Completion::Normal(_) => after_catch,
                abrupt => Ok(abrupt),
            }
        } else {
            after_catch
        }
    }

    fn eval_catch(&self, handler: &kestrel_parser::CatchClause, thrown_value: Value, env: &GcRef<Environment>) -> VmResult<Completion> {
        let catch_env = GcRef::new(Environment::child(env));
        if let Some(param) = &handler.param {
            self.declare_pattern_names(param, &catch_env, DeclKind::Let)?;
            self.bind_pattern(param, thrown_value, &catch_env, BindMode::LetConst)?;
        }
        self.declare_lexical(&handler.body, &catch_env)?;
        self.run_stmts(&handler.body, &catch_env)
    }

    // ---------------------------------------------------------------
    // Errors
    // ---------------------------------------------------------------

    /// Turns an internal `VmError` into a catchable `Exception` carrying a
    /// real `Error`-shaped object, so `try`/`catch` always sees a JS value
    /// regardless of which engine operation raised it.
    fn normalize_error(&self, err: VmError) -> VmError {
        match &err {
            VmError::Exception(_) | VmError::OutOfMemory => err,
            VmError::TypeError(msg) => self.make_exception("TypeError", msg),
            VmError::ReferenceError(msg) => self.make_exception("ReferenceError", msg),
            VmError::RangeError(msg) => self.make_exception("RangeError", msg),
            VmError::SyntaxError(msg) => self.make_exception("SyntaxError", msg),
            VmError::UriError(msg) => self.make_exception("URIError", msg),
            VmError::InternalError(msg) => self.make_exception("InternalError", msg),
            VmError::StackOverflow => self.make_exception("RangeError", "Maximum call stack size exceeded"),
            VmError::Interrupted => self.make_exception("RangeError", "Execution interrupted"),
        }
    }

    fn make_exception(&self, kind: &str, message: &str) -> VmError {
        let value = self.make_error_value(kind, message);
        VmError::exception(value, self.stack_trace())
    }

    fn stack_trace(&self) -> Vec<StackFrame> {
        self.ctx.call_stack.borrow().trace().iter().map(StackFrame::from).collect()
    }

    fn throw(&self, value: Value) -> VmError {
        VmError::exception(value, self.stack_trace())
    }

    fn make_error_value(&self, kind: &str, message: &str) -> Value {
        let obj = JsObject::new();
        obj.set_prototype(Some(self.ctx.intrinsics.error_prototype.clone()));
        let obj_ref = GcRef::new(obj);
        obj_ref.set(PropertyKey::string("name"), Value::string(kind));
        obj_ref.set(PropertyKey::string("message"), Value::string(message));
        let frames = self.stack_trace();
        let mut stack_str = format!("{kind}: {message}");
        for f in &frames {
            let name = if f.function_name.is_empty() { "<anonymous>" } else { f.function_name.as_str() };
            stack_str.push_str(&format!("\n    at {name} (source:{})", f.line));
        }
        obj_ref.set(PropertyKey::string("stack"), Value::string(&stack_str));
        Value::Object(obj_ref)
    }

    // ---------------------------------------------------------------
    // Property access
    // ---------------------------------------------------------------

    pub fn member_key(&self, prop: &MemberProperty, env: &GcRef<Environment>) -> VmResult<PropertyKey> {
        match prop {
            MemberProperty::Ident(name) => Ok(PropertyKey::string(name)),
            MemberProperty::Computed(e) => {
                let v = self.eval_expr(e, env)?;
                Ok(coercion::to_property_key(&v))
            }
        }
    }

    fn property_key_node(&self, node: &PropertyKeyNode, env: &GcRef<Environment>) -> VmResult<PropertyKey> {
        match node {
            PropertyKeyNode::Ident(s) | PropertyKeyNode::StringLit(s) => Ok(PropertyKey::string(s)),
            PropertyKeyNode::NumberLit(n) => Ok(coercion::to_property_key(&Value::Number(*n))),
            PropertyKeyNode::Computed(e) => {
                let v = self.eval_expr(e, env)?;
                Ok(coercion::to_property_key(&v))
            }
        }
    }

    fn property_key_display(&self, key: &PropertyKey) -> String {
        match key {
            PropertyKey::String(s) => s.as_str().to_string(),
            PropertyKey::Index(i) => i.to_string(),
            PropertyKey::Symbol(s) => format!("Symbol({})", s.description.as_deref().unwrap_or("")),
        }
    }

    /// `[[Get]]` with a real prototype-chain walk that honors accessors —
    /// `JsObject::get` alone cannot invoke a getter, since it has no access
    /// to the evaluator's call machinery.
    fn get_on_object_chain(&self, start: &GcRef<JsObject>, key: &PropertyKey, receiver: &Value) -> VmResult<Value> {
        if let Some(idx) = key.as_array_index() {
            if start.is_array() {
                if let Some(v) = start.array_get(idx) {
                    return Ok(v);
                }
            }
        }
        let mut cur = Some(start.clone());
        while let Some(o) = cur {
            if let Some(desc) = o.get_own_descriptor(key) {
                return match desc {
                    PropertyDescriptor::Data { value } => Ok(value),
                    PropertyDescriptor::Accessor { get, .. } => match get {
                        Some(getter) => self.call_value(&getter, receiver, &[]),
                        None => Ok(Value::Undefined),
                    },
                };
            }
            cur = o.prototype();
        }
        Ok(Value::Undefined)
    }

    /// `[[Set]]`: walks the chain only to find an inherited setter; a plain
    /// data property always lands as an *own* property of `start`.
    fn set_on_object_chain(&self, start: &GcRef<JsObject>, key: PropertyKey, value: Value, receiver: &Value) -> VmResult<()> {
        if let Some(idx) = key.as_array_index() {
            if start.is_array() {
                start.array_set(idx, value);
                return Ok(());
            }
        }
        let mut cur = Some(start.clone());
        while let Some(o) = cur {
            if let Some(desc) = o.get_own_descriptor(&key) {
                match desc {
                    PropertyDescriptor::Accessor { set, .. } => {
                        return match set {
                            Some(setter) => {
                                self.call_value(&setter, receiver, std::slice::from_ref(&value))?;
                                Ok(())
                            }
                            None => Ok(()),
                        };
                    }
                    PropertyDescriptor::Data { .. } => break,
                }
            }
            cur = o.prototype();
        }
        start.set(key, value);
        Ok(())
    }

    pub fn get_property(&self, base: &Value, key: &PropertyKey) -> VmResult<Value> {
        match base {
            Value::Undefined | Value::Null => {
                Err(VmError::type_error(format!("Cannot read properties of {base} (reading '{}')", self.property_key_display(key))))
            }
            Value::String(s) => {
                if matches!(key, PropertyKey::String(k) if k.as_str() == "length") {
                    return Ok(Value::Number(s.len_utf16() as f64));
                }
                if let Some(idx) = key.as_array_index() {
                    return Ok(s
                        .code_unit_at(idx as usize)
                        .map(|u| Value::string(&String::from_utf16_lossy(&[u])))
                        .unwrap_or(Value::Undefined));
                }
                self.get_on_object_chain(&self.ctx.intrinsics.string_prototype, key, base)
            }
            Value::Number(_) => self.get_on_object_chain(&self.ctx.intrinsics.number_prototype, key, base),
            Value::Boolean(_) => self.get_on_object_chain(&self.ctx.intrinsics.boolean_prototype, key, base),
            Value::BigInt(_) => self.get_on_object_chain(&self.ctx.intrinsics.object_prototype, key, base),
            Value::Symbol(_) => Ok(Value::Undefined),
            Value::Object(o) => self.get_on_object_chain(o, key, base),
        }
    }

    pub fn set_property(&self, base: &Value, key: PropertyKey, value: Value) -> VmResult<()> {
        match base {
            Value::Object(o) => self.set_on_object_chain(o, key, value, base),
            Value::Undefined | Value::Null => {
                Err(VmError::type_error(format!("Cannot set properties of {base} (setting '{}')", self.property_key_display(&key))))
            }
            _ => Ok(()),
        }
    }

    // ---------------------------------------------------------------
    // Calling and constructing
    // ---------------------------------------------------------------

    pub fn call_value(&self, callee: &Value, this: &Value, args: &[Value]) -> VmResult<Value> {
        let Value::Object(obj) = callee else {
            return Err(VmError::type_error(format!("{callee} is not a function")));
        };
        let Some(callable) = obj.callable_handle() else {
            return Err(VmError::type_error(format!("{callee} is not a function")));
        };
        match callable {
            Callable::Native(f) => f(this, args),
            Callable::NativeWithCall(f) => {
                let mut hook = |c: &Value, t: &Value, a: &[Value]| self.call_value(c, t, a);
                f(&mut hook, this, args)
            }
            Callable::Interpreted(data) => self.call_interpreted(&data, this, args),
        }
    }

    fn call_interpreted(&self, data: &FunctionData, this: &Value, args: &[Value]) -> VmResult<Value> {
        {
            let mut stack = self.ctx.call_stack.borrow_mut();
            stack.push(CallFrame::new(data.name(), 0, data.node.span.line)).map_err(|_| VmError::StackOverflow)?;
        }
        let result = self.call_interpreted_inner(data, this, args);
        self.ctx.call_stack.borrow_mut().pop();
        result
    }

    fn call_interpreted_inner(&self, data: &FunctionData, this: &Value, args: &[Value]) -> VmResult<Value> {
        let call_env = GcRef::new(Environment::child(&data.closure));
        if data.lexical_this.is_none() {
            call_env.declare_initialized("this", this.clone());
            let arguments_obj = self.make_arguments_object(args);
            call_env.declare_initialized("arguments", arguments_obj);
        }
        if let Some(result) = self.try_accelerated_call(data, args, &call_env)? {
            return Ok(result);
        }
        self.bind_params(&data.node.params, args, &call_env)?;
        match &data.node.body {
            FunctionBody::Expression(expr) => self.eval_expr(expr, &call_env),
            FunctionBody::Block(stmts) => {
                self.hoist_var_scope(stmts, &call_env)?;
                self.declare_lexical(stmts, &call_env)?;
                match self.run_stmts(stmts, &call_env)? {
                    Completion::Return(v) => Ok(v),
                    _ => Ok(Value::Undefined),
                }
            }
        }
    }

    /// Tries the `Bytecode` tier for a whole function body (spec.md
    /// §4.5) before the tree walk runs. Ticks this function's per-node
    /// execution counter and tier on every call, the way spec.md §3's
    /// `TypeFeedback` is sampled; only once the tier crosses into
    /// `Bytecode` does this attempt a compile at all, and only
    /// `FunctionBody::Block` bodies are ever candidates (an arrow
    /// function's bare expression body is cheap enough to tree-walk).
    /// Returns `Ok(None)` to fall back to the tree walk — never, when a
    /// compiled body actually runs, does it swallow an error: whatever
    /// `kestrel_bytecode::run` returns (including a thrown exception) is
    /// exactly what the tree walk would have produced.
    fn try_accelerated_call(&self, data: &FunctionData, args: &[Value], call_env: &GcRef<Environment>) -> VmResult<Option<Value>> {
        let FunctionBody::Block(_) = &data.node.body else { return Ok(None) };
        let node_ptr = Rc::as_ptr(&data.node) as usize;
        let tier = {
            let mut state = self.ctx.node_state(node_ptr);
            state.record_execution(&self.ctx.options.jit_thresholds);
            state.tier
        };
        if tier == crate::type_feedback::Tier::Interpreter {
            return Ok(None);
        }
        let Some(compiled) = self.ctx.jit.bytecode_for(node_ptr, &data.node) else { return Ok(None) };
        let host = crate::accelerate::BytecodeHost { evaluator: self, env: call_env };
        kestrel_bytecode::run(&compiled, args, &host).map(Some)
    }

    fn make_arguments_object(&self, args: &[Value]) -> Value {
        let arr = JsObject::new_array();
        for a in args {
            arr.array_push(a.clone());
        }
        let r = GcRef::new(arr);
        r.set_prototype(Some(self.ctx.intrinsics.array_prototype.clone()));
        Value::Object(r)
    }

    pub fn construct_value(&self, callee: &Value, args: &[Value]) -> VmResult<Value> {
        let Value::Object(ctor) = callee else {
            return Err(VmError::type_error("value is not a constructor"));
        };
        if !ctor.is_callable() {
            return Err(VmError::type_error("value is not a constructor"));
        }
        let proto_val = self.get_property(callee, &PropertyKey::string("prototype"))?;
        let this_obj = JsObject::new();
        match &proto_val {
            Value::Object(p) => this_obj.set_prototype(Some(p.clone())),
            _ => this_obj.set_prototype(Some(self.ctx.intrinsics.object_prototype.clone())),
        }
        let this_ref = GcRef::new(this_obj);
        this_ref.set_construct_prototype(this_ref.prototype());
        let this_val = Value::Object(this_ref.clone());
        let result = self.call_value(callee, &this_val, args)?;
        match result {
            Value::Object(_) => Ok(result),
            _ => Ok(this_val),
        }
    }

    fn make_function_value(&self, node: Rc<Function>, closure_env: GcRef<Environment>) -> Value {
        let lexical_this = if node.is_arrow { Some(closure_env.get("this").unwrap_or(Value::Undefined)) } else { None };
        let param_count = node.params.iter().filter(|p| !matches!(p, Pattern::Rest(_) | Pattern::Default(_, _))).count();
        let name = node.name.clone().unwrap_or_default();
        let is_arrow = node.is_arrow;
        let data = FunctionData::new(node, closure_env, lexical_this);
        let func_obj = JsObject::new_interpreted_function(data);
        func_obj.set_prototype(Some(self.ctx.intrinsics.function_prototype.clone()));
        let func_ref = GcRef::new(func_obj);
        func_ref.define_property(PropertyKey::string("name"), PropertyDescriptor::data(Value::string(&name)), SlotKind::Data, Attributes::non_enumerable());
        func_ref.define_property(
            PropertyKey::string("length"),
            PropertyDescriptor::data(Value::Number(param_count as f64)),
            SlotKind::Data,
            Attributes::non_enumerable(),
        );
        if !is_arrow {
            let proto_obj = JsObject::new();
            proto_obj.set_prototype(Some(self.ctx.intrinsics.object_prototype.clone()));
            let proto_ref = GcRef::new(proto_obj);
            proto_ref.define_property(
                PropertyKey::string("constructor"),
                PropertyDescriptor::data(Value::Object(func_ref.clone())),
                SlotKind::Data,
                Attributes::non_enumerable(),
            );
            func_ref.define_property(PropertyKey::string("prototype"), PropertyDescriptor::data(Value::Object(proto_ref)), SlotKind::Data, Attributes::non_enumerable());
        }
        Value::Object(func_ref)
    }

    // ---------------------------------------------------------------
    // Classes
    //
    // Simplification (see DESIGN.md): `this` is pre-allocated before the
    // constructor body runs, even for derived classes, and `super(...)`
    // simply invokes the parent constructor's function body against the
    // already-bound `this` rather than the real "uninitialized this until
    // super() returns" protocol. Instance fields are always initialized at
    // the very start of the (possibly synthesized) constructor body,
    // before any explicit `super()` call the user wrote.
    // ---------------------------------------------------------------

    fn eval_class(&self, class: &Rc<Class>, env: &GcRef<Environment>) -> VmResult<Value> {
        let class_env = GcRef::new(Environment::child(env));
        let mut super_ctor: Option<Value> = None;
        let mut super_proto: Option<Value> = None;
        if let Some(superclass_expr) = &class.superclass {
            let sc = self.eval_expr(superclass_expr, &class_env)?;
            let sp = self.get_property(&sc, &PropertyKey::string("prototype"))?;
            class_env.declare_initialized("%super%", sc.clone());
            class_env.declare_initialized("%superProto%", sp.clone());
            super_ctor = Some(sc);
            super_proto = Some(sp);
        }

        let proto_obj = JsObject::new();
        match &super_proto {
            Some(Value::Object(p)) => proto_obj.set_prototype(Some(p.clone())),
            _ => proto_obj.set_prototype(Some(self.ctx.intrinsics.object_prototype.clone())),
        }
        let proto_ref = GcRef::new(proto_obj);

        let mut ctor_function: Option<Rc<Function>> = None;
        let mut instance_fields: Vec<(PropertyKeyNode, Option<Expr>)> = Vec::new();

        for m in &class.members {
            if m.is_static {
                continue;
            }
            match &m.kind {
                ClassMemberKind::Method(f) => {
                    if matches!(&m.key, PropertyKeyNode::Ident(n) if n == "constructor") {
                        ctor_function = Some(f.clone());
                    } else {
                        let key = self.property_key_node(&m.key, &class_env)?;
                        let fv = self.make_function_value(f.clone(), class_env.clone());
                        proto_ref.define_property(key, PropertyDescriptor::data(fv), SlotKind::Method, Attributes::non_enumerable());
                    }
                }
                ClassMemberKind::Getter(f) => self.define_accessor(&proto_ref, &m.key, &class_env, Some(f.clone()), None, Attributes::non_enumerable())?,
                ClassMemberKind::Setter(f) => self.define_accessor(&proto_ref, &m.key, &class_env, None, Some(f.clone()), Attributes::non_enumerable())?,
                ClassMemberKind::Field(init) => instance_fields.push((m.key.clone(), init.clone())),
            }
        }

        let ctor_node = self.build_constructor_node(ctor_function, class.superclass.is_some(), &instance_fields);
        let ctor_data = FunctionData::new(ctor_node, class_env.clone(), None);
        let ctor_obj = JsObject::new_interpreted_function(ctor_data);
        match &super_ctor {
            Some(Value::Object(sc)) => ctor_obj.set_prototype(Some(sc.clone())),
            _ => ctor_obj.set_prototype(Some(self.ctx.intrinsics.function_prototype.clone())),
        }
        let ctor_ref = GcRef::new(ctor_obj);
        ctor_ref.define_property(
            PropertyKey::string("name"),
            PropertyDescriptor::data(Value::string(class.name.as_deref().unwrap_or(""))),
            SlotKind::Data,
            Attributes::non_enumerable(),
        );
        ctor_ref.define_property(PropertyKey::string("prototype"), PropertyDescriptor::data(Value::Object(proto_ref.clone())), SlotKind::Data, Attributes::non_enumerable());
        proto_ref.define_property(
            PropertyKey::string("constructor"),
            PropertyDescriptor::data(Value::Object(ctor_ref.clone())),
            SlotKind::Data,
            Attributes::non_enumerable(),
        );

        for m in &class.members {
            if !m.is_static {
                continue;
            }
            match &m.kind {
                ClassMemberKind::Method(f) => {
                    let key = self.property_key_node(&m.key, &class_env)?;
                    let fv = self.make_function_value(f.clone(), class_env.clone());
                    ctor_ref.define_property(key, PropertyDescriptor::data(fv), SlotKind::Method, Attributes::non_enumerable());
                }
                ClassMemberKind::Getter(f) => self.define_accessor(&ctor_ref, &m.key, &class_env, Some(f.clone()), None, Attributes::non_enumerable())?,
                ClassMemberKind::Setter(f) => self.define_accessor(&ctor_ref, &m.key, &class_env, None, Some(f.clone()), Attributes::non_enumerable())?,
                ClassMemberKind::Field(init) => {
                    let key = self.property_key_node(&m.key, &class_env)?;
                    let v = match init {
                        Some(e) => self.eval_expr(e, &class_env)?,
                        None => Value::Undefined,
                    };
                    ctor_ref.set(key, v);
                }
            }
        }

        Ok(Value::Object(ctor_ref))
    }

    /// Synthesizes the combined constructor body: instance-field
    /// initializers first, then the user's constructor body (or, for a
    /// class with no explicit constructor, a default one that forwards
    /// all arguments to `super(...)`).
    fn build_constructor_node(&self, ctor_fn: Option<Rc<Function>>, has_super: bool, fields: &[(PropertyKeyNode, Option<Expr>)]) -> Rc<Function> {
        let field_stmts: Vec<Statement> = fields
            .iter()
            .map(|(key, init)| {
                let value_expr = init.clone().unwrap_or(Expr::Undefined);
                let member = match key {
                    PropertyKeyNode::Ident(n) | PropertyKeyNode::StringLit(n) => MemberProperty::Ident(n.clone()),
                    PropertyKeyNode::NumberLit(n) => MemberProperty::Computed(Box::new(Expr::Number(*n))),
                    PropertyKeyNode::Computed(e) => MemberProperty::Computed(e.clone()),
                };
                Statement::Expression(Expr::Assign {
                    op: AssignOp::Assign,
                    target: Box::new(Expr::Member { object: Box::new(Expr::This), property: member, optional: false }),
                    value: Box::new(value_expr),
                })
            })
            .collect();

        match ctor_fn {
            Some(f) => {
                let mut body = field_stmts;
                if let FunctionBody::Block(stmts) = &f.body {
                    body.extend(stmts.clone());
                }
                Rc::new(Function {
                    name: f.name.clone(),
                    params: f.params.clone(),
                    body: FunctionBody::Block(body),
                    is_arrow: false,
                    is_async: false,
                    is_generator: false,
                    strict: true,
                    span: f.span,
                })
            }
            None => {
                let mut body = field_stmts;
                let params = if has_super {
                    body.push(Statement::Expression(Expr::Call {
                        callee: Box::new(Expr::Super),
                        args: vec![Argument::Spread(Expr::Ident("arguments".to_string()))],
                        optional: false,
                    }));
                    Vec::new()
                } else {
                    Vec::new()
                };
                Rc::new(Function {
                    name: None,
                    params,
                    body: FunctionBody::Block(body),
                    is_arrow: false,
                    is_async: false,
                    is_generator: false,
                    strict: true,
                    span: kestrel_lexer::Span::default(),
                })
            }
        }
    }

    fn define_accessor(
        &self,
        target: &GcRef<JsObject>,
        key_node: &PropertyKeyNode,
        env: &GcRef<Environment>,
        getter: Option<Rc<Function>>,
        setter: Option<Rc<Function>>,
        attrs: Attributes,
    ) -> VmResult<()> {
        let key = self.property_key_node(key_node, env)?;
        let existing = target.get_own_descriptor(&key);
        let (mut g, mut s) = match existing {
            Some(PropertyDescriptor::Accessor { get, set }) => (get, set),
            _ => (None, None),
        };
        if let Some(f) = getter {
            g = Some(self.make_function_value(f, env.clone()));
        }
        if let Some(f) = setter {
            s = Some(self.make_function_value(f, env.clone()));
        }
        target.define_property(key, PropertyDescriptor::Accessor { get: g, set: s }, SlotKind::Accessor, attrs);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Patterns: declaration binding and destructuring assignment
    // ---------------------------------------------------------------

    fn bind_name(&self, name: &str, value: Value, env: &GcRef<Environment>, mode: BindMode) -> VmResult<()> {
        match mode {
            BindMode::Var => env.set(name, value).map_err(Into::into),
            BindMode::LetConst => env.initialize(name, value).map_err(Into::into),
            BindMode::Param => {
                env.declare_initialized(name, value);
                Ok(())
            }
        }
    }

    fn bind_pattern(&self, pattern: &Pattern, value: Value, env: &GcRef<Environment>, mode: BindMode) -> VmResult<()> {
        match pattern {
            Pattern::Ident(name) => self.bind_name(name, value, env, mode),
            Pattern::Default(inner, default_expr) => {
                let v = if value.is_undefined() { self.eval_expr(default_expr, env)? } else { value };
                self.bind_pattern(inner, v, env, mode)
            }
            Pattern::Rest(inner) => self.bind_pattern(inner, value, env, mode),
            Pattern::Array(elems, rest) => {
                let items = self.iterate(&value)?;
                for (i, el) in elems.iter().enumerate() {
                    if let Some(p) = el {
                        let v = items.get(i).cloned().unwrap_or(Value::Undefined);
                        self.bind_pattern(p, v, env, mode)?;
                    }
                }
                if let Some(restp) = rest {
                    let restv = self.new_array_value(items.into_iter().skip(elems.len()).collect());
                    self.bind_pattern(restp, restv, env, mode)?;
                }
                Ok(())
            }
            Pattern::Object(props, rest) => {
                let mut seen = Vec::new();
                for p in props {
                    let pk = self.property_key_node(&p.key, env)?;
                    seen.push(pk.clone());
                    let v = self.get_property(&value, &pk)?;
                    self.bind_pattern(&p.value, v, env, mode)?;
                }
                if let Some(restp) = rest {
                    let rest_obj = JsObject::new();
                    rest_obj.set_prototype(Some(self.ctx.intrinsics.object_prototype.clone()));
                    let rest_ref = GcRef::new(rest_obj);
                    if let Value::Object(o) = &value {
                        for k in o.own_enumerable_keys() {
                            if !seen.contains(&k) {
                                let v = self.get_on_object_chain(o, &k, &value)?;
                                rest_ref.set(k, v);
                            }
                        }
                    }
                    self.bind_pattern(restp, Value::Object(rest_ref), env, mode)?;
                }
                Ok(())
            }
        }
    }

    fn bind_params(&self, params: &[Pattern], args: &[Value], env: &GcRef<Environment>) -> VmResult<()> {
        let mut i = 0;
        for p in params {
            if let Pattern::Rest(inner) = p {
                let restv = self.new_array_value(args.get(i..).map(|s| s.to_vec()).unwrap_or_default());
                self.bind_pattern(inner, restv, env, BindMode::Param)?;
                break;
            }
            let v = args.get(i).cloned().unwrap_or(Value::Undefined);
            self.bind_pattern(p, v, env, BindMode::Param)?;
            i += 1;
        }
        Ok(())
    }

    /// Destructuring *assignment* (`[a, b] = x`, `({a} = x)`), distinct
    /// from declaration binding because the targets are arbitrary
    /// expressions (identifiers, member accesses, or nested array/object
    /// literals), not a `Pattern` tree.
    fn destructure_assign(&self, target: &Expr, value: Value, env: &GcRef<Environment>) -> VmResult<()> {
        match target {
            Expr::Array(elems) => {
                let items = self.iterate(&value)?;
                for (i, el) in elems.iter().enumerate() {
                    match el {
                        None => {}
                        Some(ArrayElement::Item(t)) => {
                            let v = items.get(i).cloned().unwrap_or(Value::Undefined);
                            self.destructure_assign_target(t, v, env)?;
                        }
                        Some(ArrayElement::Spread(t)) => {
                            let rest = self.new_array_value(items[i.min(items.len())..].to_vec());
                            self.destructure_assign_target(t, rest, env)?;
                            break;
                        }
                    }
                }
                Ok(())
            }
            Expr::Object(props) => {
                let mut seen = Vec::new();
                for p in props {
                    match p {
                        ObjectProp::KeyValue { key, value: target_expr, .. } => {
                            let pk = self.property_key_node(key, env)?;
                            seen.push(pk.clone());
                            let v = self.get_property(&value, &pk)?;
                            self.destructure_assign_target(target_expr, v, env)?;
                        }
                        ObjectProp::Spread(t) => {
                            let rest_obj = JsObject::new();
                            rest_obj.set_prototype(Some(self.ctx.intrinsics.object_prototype.clone()));
                            let rest_ref = GcRef::new(rest_obj);
                            if let Value::Object(o) = &value {
                                for k in o.own_enumerable_keys() {
                                    if !seen.contains(&k) {
                                        let v = self.get_on_object_chain(o, &k, &value)?;
                                        rest_ref.set(k, v);
                                    }
                                }
                            }
                            self.destructure_assign_target(t, Value::Object(rest_ref), env)?;
                        }
                        _ => return Err(VmError::syntax_error("Invalid destructuring assignment target")),
                    }
                }
                Ok(())
            }
            _ => Err(VmError::syntax_error("Invalid destructuring assignment target")),
        }
    }

    fn destructure_assign_target(&self, target: &Expr, value: Value, env: &GcRef<Environment>) -> VmResult<()> {
        match target {
            Expr::Assign { op: AssignOp::Assign, target: inner, value: default_expr } => {
                let v = if value.is_undefined() { self.eval_expr(default_expr, env)? } else { value };
                self.destructure_assign_target(inner, v, env)
            }
            Expr::Array(_) | Expr::Object(_) => self.destructure_assign(target, value, env),
            Expr::Ident(_) | Expr::Member { .. } => self.assign_simple_target(target, value, env),
            _ => Err(VmError::syntax_error("Invalid destructuring assignment target")),
        }
    }

    fn assign_simple_target(&self, target: &Expr, value: Value, env: &GcRef<Environment>) -> VmResult<()> {
        match target {
            Expr::Ident(name) => env.set(name, value).map_err(Into::into),
            Expr::Member { object, property, .. } => {
                if matches!(&**object, Expr::Super) {
                    let this_v = env.get("this")?;
                    let key = self.member_key(property, env)?;
                    if let Value::Object(o) = &this_v {
                        o.set(key, value);
                    }
                    return Ok(());
                }
                let ov = self.eval_expr(object, env)?;
                let key = self.member_key(property, env)?;
                self.set_property(&ov, key, value)
            }
            _ => Err(VmError::syntax_error("Invalid assignment target")),
        }
    }

    // ---------------------------------------------------------------
    // Iteration
    // ---------------------------------------------------------------

    fn new_array_value(&self, items: Vec<Value>) -> Value {
        let arr = JsObject::new_array();
        for it in items {
            arr.array_push(it);
        }
        let r = GcRef::new(arr);
        r.set_prototype(Some(self.ctx.intrinsics.array_prototype.clone()));
        Value::Object(r)
    }

    /// Eagerly materializes an iterable (array, string, or a
    /// `Symbol.iterator`-protocol object) into a `Vec<Value>`, used by
    /// `for-of`, spread, and array-destructuring (spec.md §4.3: "for-of
    /// consumes `Symbol.iterator`"; spread/destructuring need the whole
    /// sequence up front regardless).
    pub fn iterate(&self, value: &Value) -> VmResult<Vec<Value>> {
        match value {
            Value::Object(o) if o.is_array() => Ok(o.array_iter()),
            Value::String(s) => Ok(s.as_str().chars().map(|c| Value::string(&c.to_string())).collect()),
            Value::Object(_) => {
                let iter_fn = self.get_property(value, &PropertyKey::Symbol(well_known_symbols::iterator()))?;
                if !iter_fn.is_callable() {
                    return Err(VmError::type_error("value is not iterable"));
                }
                let iterator = self.call_value(&iter_fn, value, &[])?;
                let next_fn = self.get_property(&iterator, &PropertyKey::string("next"))?;
                let mut out = Vec::new();
                loop {
                    let res = self.call_value(&next_fn, &iterator, &[])?;
                    let done = self.get_property(&res, &PropertyKey::string("done"))?.to_boolean();
                    if done {
                        break;
                    }
                    out.push(self.get_property(&res, &PropertyKey::string("value"))?);
                    if out.len() > 10_000_000 {
                        return Err(VmError::range_error("Iterator produced too many values"));
                    }
                }
                Ok(out)
            }
            _ => Err(VmError::type_error(format!("{} is not iterable", value.type_of()))),
        }
    }

    /// Builds a call's evaluated argument list. The `Vec` itself is an
    /// ordinary Rust heap allocation (it outlives this function, handed
    /// to `call_value`); what's reserved against `Context::memory_pool`
    /// is only a same-sized scratch accounting block for the span of
    /// assembling it — spec.md §4.7's "transient per-evaluation
    /// allocations where a GC is not desired". Pool exhaustion is not a
    /// language-visible error (spec.md §4.7), so a failed reservation is
    /// silently skipped rather than propagated.
    fn eval_args(&self, args: &[Argument], env: &GcRef<Environment>) -> VmResult<Vec<Value>> {
        let scratch = self.ctx.memory_pool.allocate(args.len() * std::mem::size_of::<Value>()).ok();
        let mut out = Vec::new();
        for a in args {
            match a {
                Argument::Normal(e) => out.push(self.eval_expr(e, env)?),
                Argument::Spread(e) => {
                    let v = self.eval_expr(e, env)?;
                    out.extend(self.iterate(&v)?);
                }
            }
        }
        if let Some(ptr) = scratch {
            let _ = self.ctx.memory_pool.deallocate(ptr);
        }
        Ok(out)
    }

    // ---------------------------------------------------------------
    // Expressions
    // ---------------------------------------------------------------

    pub fn eval_expr(&self, expr: &Expr, env: &GcRef<Environment>) -> VmResult<Value> {
        match expr {
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::BigInt(s) => BigInt::parse(s).map(Value::bigint).ok_or_else(|| VmError::syntax_error("Invalid BigInt literal")),
            Expr::String(s) => Ok(Value::string(s)),
            Expr::Bool(b) => Ok(Value::Boolean(*b)),
            Expr::Null => Ok(Value::Null),
            Expr::Undefined => Ok(Value::Undefined),
            Expr::Ident(name) => Ok(env.get(name)?),
            Expr::This => Ok(env.get("this").unwrap_or(Value::Undefined)),
            Expr::Super => Err(VmError::syntax_error("'super' keyword is only valid inside a class method")),
            Expr::Array(_) => self.eval_array_literal(expr, env),
            Expr::Object(props) => self.eval_object_literal(props, env),
            Expr::Function(f) => Ok(self.make_function_value(f.clone(), env.clone())),
            Expr::Class(c) => self.eval_class(c, env),
            Expr::Unary { op, argument, prefix } => self.eval_unary(*op, argument, *prefix, env),
            Expr::Binary { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                let r = self.eval_expr(right, env)?;
                self.eval_binary(*op, &l, &r)
            }
            Expr::Logical { op, left, right } => {
                let l = self.eval_expr(left, env)?;
                match op {
                    LogicalOp::And => {
                        if !l.to_boolean() {
                            Ok(l)
                        } else {
                            self.eval_expr(right, env)
                        }
                    }
                    LogicalOp::Or => {
                        if l.to_boolean() {
                            Ok(l)
                        } else {
                            self.eval_expr(right, env)
                        }
                    }
                    LogicalOp::Nullish => {
                        if !l.is_nullish() {
                            Ok(l)
                        } else {
                            self.eval_expr(right, env)
                        }
                    }
                }
            }
            Expr::Assign { op, target, value } => self.eval_assign(*op, target, value, env),
            Expr::Conditional { test, consequent, alternate } => {
                if self.eval_expr(test, env)?.to_boolean() {
                    self.eval_expr(consequent, env)
                } else {
                    self.eval_expr(alternate, env)
                }
            }
            Expr::Call { .. } | Expr::Member { .. } => match self.eval_chain(expr, env)? {
                ChainEval::Value(v) => Ok(v),
                ChainEval::ShortCircuit => Ok(Value::Undefined),
            },
            Expr::New { callee, args } => {
                let callee_val = self.eval_expr(callee, env)?;
                let argv = self.eval_args(args, env)?;
                self.construct_value(&callee_val, &argv)
            }
            Expr::Sequence(exprs) => {
                let mut last = Value::Undefined;
                for e in exprs {
                    last = self.eval_expr(e, env)?;
                }
                Ok(last)
            }
            Expr::Template { quasis, exprs } => {
                let mut out = String::new();
                for (i, q) in quasis.iter().enumerate() {
                    out.push_str(q);
                    if let Some(e) = exprs.get(i) {
                        let v = self.eval_expr(e, env)?;
                        out.push_str(&self.js_to_string(&v)?);
                    }
                }
                Ok(Value::string(&out))
            }
            Expr::TaggedTemplate { tag, quasis, raw, exprs } => self.eval_tagged_template(tag, quasis, raw, exprs, env),
            Expr::Regex { body, flags } => Ok(self.make_regex_value(body, flags)),
            Expr::Spread(_) => Err(VmError::internal("unexpected spread outside call/array/object position")),
            Expr::Assignment(..) => Err(VmError::internal("unexpected destructuring-assignment pattern node")),
        }
    }

    fn eval_array_literal(&self, expr: &Expr, env: &GcRef<Environment>) -> VmResult<Value> {
        let Expr::Array(elems) = expr else { unreachable!() };
        let mut items = Vec::new();
        for el in elems {
            match el {
                None => items.push(Value::Undefined),
                Some(ArrayElement::Item(e)) => items.push(self.eval_expr(e, env)?),
                Some(ArrayElement::Spread(e)) => {
                    let v = self.eval_expr(e, env)?;
                    items.extend(self.iterate(&v)?);
                }
            }
        }
        Ok(self.new_array_value(items))
    }

    fn eval_object_literal(&self, props: &[ObjectProp], env: &GcRef<Environment>) -> VmResult<Value> {
        let obj = JsObject::new();
        obj.set_prototype(Some(self.ctx.intrinsics.object_prototype.clone()));
        let obj_ref = GcRef::new(obj);
        for p in props {
            match p {
                ObjectProp::KeyValue { key, value, .. } => {
                    let k = self.property_key_node(key, env)?;
                    let v = self.eval_expr(value, env)?;
                    obj_ref.set(k, v);
                }
                ObjectProp::Method { key, function } => {
                    let k = self.property_key_node(key, env)?;
                    let v = self.make_function_value(function.clone(), env.clone());
                    obj_ref.set(k, v);
                }
                ObjectProp::Getter { key, function } => self.define_accessor(&obj_ref, key, env, Some(function.clone()), None, Attributes::data())?,
                ObjectProp::Setter { key, function } => self.define_accessor(&obj_ref, key, env, None, Some(function.clone()), Attributes::data())?,
                ObjectProp::Spread(e) => {
                    let v = self.eval_expr(e, env)?;
                    match &v {
                        Value::Object(src) => {
                            for k in src.own_enumerable_keys() {
                                let val = self.get_on_object_chain(src, &k, &v)?;
                                obj_ref.set(k, val);
                            }
                        }
                        Value::String(s) => {
                            for (i, c) in s.as_str().chars().enumerate() {
                                obj_ref.set(PropertyKey::index(i as u32), Value::string(&c.to_string()));
                            }
                        }
                        _ => {}
                    }
                }
            }
        }
        Ok(Value::Object(obj_ref))
    }

    fn eval_tagged_template(&self, tag: &Expr, quasis: &[String], raw: &[String], exprs: &[Expr], env: &GcRef<Environment>) -> VmResult<Value> {
        let strings_arr = self.new_array_value(quasis.iter().map(|q| Value::string(q)).collect());
        if let Value::Object(o) = &strings_arr {
            o.set(PropertyKey::string("raw"), self.new_array_value(raw.iter().map(|q| Value::string(q)).collect()));
        }
        let mut argv = vec![strings_arr];
        for e in exprs {
            argv.push(self.eval_expr(e, env)?);
        }
        let (tag_val, this_val) = match tag {
            Expr::Member { object, property, .. } => {
                let ov = self.eval_expr(object, env)?;
                let k = self.member_key(property, env)?;
                (self.get_property(&ov, &k)?, ov)
            }
            other => (self.eval_expr(other, env)?, Value::Undefined),
        };
        self.call_value(&tag_val, &this_val, &argv)
    }

    /// Best-effort `RegExp`: builds a plain object exposing `source`/
    /// `flags`/`lastIndex` plus `test`/`exec` backed directly by the
    /// `regex` crate, accepting that ECMAScript and Rust regex syntax
    /// diverge on some constructs (lookaround, backreferences).
    fn make_regex_value(&self, body: &str, flags: &str) -> Value {
        let obj = JsObject::new();
        obj.set_prototype(Some(self.ctx.intrinsics.object_prototype.clone()));
        let obj_ref = GcRef::new(obj);
        obj_ref.set(PropertyKey::string("source"), Value::string(body));
        obj_ref.set(PropertyKey::string("flags"), Value::string(flags));
        obj_ref.set(PropertyKey::string("global"), Value::Boolean(flags.contains('g')));
        obj_ref.set(PropertyKey::string("ignoreCase"), Value::Boolean(flags.contains('i')));
        obj_ref.set(PropertyKey::string("lastIndex"), Value::Number(0.0));

        let pattern = translate_regex_pattern(body, flags);
        let test_pattern = pattern.clone();
        let test_fn = JsObject::new_native_function(move |_this, args| {
            let input = args.first().cloned().unwrap_or(Value::Undefined).to_string();
            let compiled = regex::Regex::new(&test_pattern).map_err(|e| VmError::syntax_error(format!("Invalid regular expression: {e}")))?;
            Ok(Value::Boolean(compiled.is_match(&input)))
        });
        obj_ref.set(PropertyKey::string("test"), Value::Object(GcRef::new(test_fn)));

        let exec_pattern = pattern;
        let exec_fn = JsObject::new_native_function(move |_this, args| {
            let input = args.first().cloned().unwrap_or(Value::Undefined).to_string();
            let compiled = regex::Regex::new(&exec_pattern).map_err(|e| VmError::syntax_error(format!("Invalid regular expression: {e}")))?;
            match compiled.find(&input) {
                Some(m) => {
                    let arr = JsObject::new_array();
                    arr.array_push(Value::string(m.as_str()));
                    Ok(Value::Object(GcRef::new(arr)))
                }
                None => Ok(Value::Null),
            }
        });
        obj_ref.set(PropertyKey::string("exec"), Value::Object(GcRef::new(exec_fn)));

        Value::Object(obj_ref)
    }

    fn eval_unary(&self, op: UnaryOp, argument: &Expr, prefix: bool, env: &GcRef<Environment>) -> VmResult<Value> {
        match op {
            UnaryOp::Typeof => {
                if let Expr::Ident(name) = argument {
                    match env.get(name) {
                        Ok(v) => Ok(Value::string(v.type_of())),
                        Err(BindingError::NotDefined) => Ok(Value::string("undefined")),
                        Err(e) => Err(e.into()),
                    }
                } else {
                    let v = self.eval_expr(argument, env)?;
                    Ok(Value::string(v.type_of()))
                }
            }
            UnaryOp::Void => {
                self.eval_expr(argument, env)?;
                Ok(Value::Undefined)
            }
            UnaryOp::Delete => {
                if let Expr::Member { object, property, .. } = argument {
                    let ov = self.eval_expr(object, env)?;
                    let key = self.member_key(property, env)?;
                    if let Value::Object(o) = &ov {
                        o.delete(&key);
                    }
                    Ok(Value::Boolean(true))
                } else {
                    Ok(Value::Boolean(true))
                }
            }
            UnaryOp::Not => Ok(Value::Boolean(!self.eval_expr(argument, env)?.to_boolean())),
            UnaryOp::Minus => {
                let v = self.eval_expr(argument, env)?;
                self.negate_value(&v)
            }
            UnaryOp::Plus => {
                let v = self.eval_expr(argument, env)?;
                Ok(Value::Number(self.to_number_value(&v)?))
            }
            UnaryOp::BitNot => {
                let v = self.eval_expr(argument, env)?;
                let n = coercion::to_int32(self.to_number_value(&v)?);
                Ok(Value::Number(!n as f64))
            }
            UnaryOp::Increment | UnaryOp::Decrement => {
                let old = self.eval_expr(argument, env)?;
                let p = self.to_primitive_value(&old, PreferredType::Number)?;
                if let Value::BigInt(b) = p {
                    let one = BigInt::from_i64(1);
                    let new_big = if op == UnaryOp::Increment { &*b + &one } else { &*b - &one };
                    let new_value = Value::bigint(new_big);
                    self.assign_simple_target(argument, new_value.clone(), env)?;
                    return Ok(if prefix { new_value } else { Value::BigInt(b) });
                }
                let old_num = coercion::to_number(&p)?;
                let new_num = if op == UnaryOp::Increment { old_num + 1.0 } else { old_num - 1.0 };
                self.assign_simple_target(argument, Value::Number(new_num), env)?;
                Ok(Value::Number(if prefix { new_num } else { old_num }))
            }
        }
    }

    fn eval_assign(&self, op: AssignOp, target: &Expr, value_expr: &Expr, env: &GcRef<Environment>) -> VmResult<Value> {
        if op == AssignOp::Assign {
            return match target {
                Expr::Array(_) | Expr::Object(_) => {
                    let v = self.eval_expr(value_expr, env)?;
                    self.destructure_assign(target, v.clone(), env)?;
                    Ok(v)
                }
                _ => {
                    let v = self.eval_expr(value_expr, env)?;
                    self.assign_simple_target(target, v.clone(), env)?;
                    Ok(v)
                }
            };
        }
        if matches!(op, AssignOp::And | AssignOp::Or | AssignOp::Nullish) {
            let current = self.eval_expr(target, env)?;
            let should_assign = match op {
                AssignOp::And => current.to_boolean(),
                AssignOp::Or => !current.to_boolean(),
                AssignOp::Nullish => current.is_nullish(),
                _ => unreachable!(),
            };
            if !should_assign {
                return Ok(current);
            }
            let v = self.eval_expr(value_expr, env)?;
            self.assign_simple_target(target, v.clone(), env)?;
            return Ok(v);
        }
        let current = self.eval_expr(target, env)?;
        let rhs = self.eval_expr(value_expr, env)?;
        let result = self.eval_binary(compound_to_binary(op), &current, &rhs)?;
        self.assign_simple_target(target, result.clone(), env)?;
        Ok(result)
    }

    // ---------------------------------------------------------------
    // Member/call chains (with optional-chaining short circuit)
    // ---------------------------------------------------------------

    fn eval_chain(&self, expr: &Expr, env: &GcRef<Environment>) -> VmResult<ChainEval> {
        match expr {
            Expr::Member { object, property, optional } => {
                if matches!(&**object, Expr::Super) {
                    let this_v = env.get("this").unwrap_or(Value::Undefined);
                    let super_proto = env.get("%superProto%").unwrap_or(Value::Undefined);
                    let key = self.member_key(property, env)?;
                    let v = match &super_proto {
                        Value::Object(p) => self.get_on_object_chain(p, &key, &this_v)?,
                        _ => Value::Undefined,
                    };
                    return Ok(ChainEval::Value(v));
                }
                let obj_val = match self.eval_chain(object, env)? {
                    ChainEval::ShortCircuit => return Ok(ChainEval::ShortCircuit),
                    ChainEval::Value(v) => v,
                };
                if *optional && obj_val.is_nullish() {
                    return Ok(ChainEval::ShortCircuit);
                }
                let key = self.member_key(property, env)?;
                Ok(ChainEval::Value(self.get_property(&obj_val, &key)?))
            }
            Expr::Call { callee, args, optional } => {
                if matches!(&**callee, Expr::Super) {
                    let ctor = env.get("%super%")?;
                    let this_v = env.get("this")?;
                    let argv = self.eval_args(args, env)?;
                    self.call_value(&ctor, &this_v, &argv)?;
                    return Ok(ChainEval::Value(Value::Undefined));
                }
                if let Expr::Member { object, property, optional: member_optional } = &**callee {
                    if matches!(&**object, Expr::Super) {
                        let this_v = env.get("this").unwrap_or(Value::Undefined);
                        let super_proto = env.get("%superProto%").unwrap_or(Value::Undefined);
                        let key = self.member_key(property, env)?;
                        let f = match &super_proto {
                            Value::Object(p) => self.get_on_object_chain(p, &key, &this_v)?,
                            _ => Value::Undefined,
                        };
                        let argv = self.eval_args(args, env)?;
                        if !f.is_callable() {
                            return Err(VmError::type_error("super method is not a function"));
                        }
                        return Ok(ChainEval::Value(self.call_value(&f, &this_v, &argv)?));
                    }
                    let this_val = match self.eval_chain(object, env)? {
                        ChainEval::ShortCircuit => return Ok(ChainEval::ShortCircuit),
                        ChainEval::Value(v) => v,
                    };
                    if *member_optional && this_val.is_nullish() {
                        return Ok(ChainEval::ShortCircuit);
                    }
                    let key = self.member_key(property, env)?;
                    let callee_val = self.get_property(&this_val, &key)?;
                    if *optional && callee_val.is_nullish() {
                        return Ok(ChainEval::ShortCircuit);
                    }
                    let argv = self.eval_args(args, env)?;
                    if !callee_val.is_callable() {
                        return Err(VmError::type_error(format!("{}.{} is not a function", this_val, self.member_key_display(property))));
                    }
                    return Ok(ChainEval::Value(self.call_value(&callee_val, &this_val, &argv)?));
                }
                let callee_val = match self.eval_chain(callee, env)? {
                    ChainEval::ShortCircuit => return Ok(ChainEval::ShortCircuit),
                    ChainEval::Value(v) => v,
                };
                if *optional && callee_val.is_nullish() {
                    return Ok(ChainEval::ShortCircuit);
                }
                let argv = self.eval_args(args, env)?;
                if !callee_val.is_callable() {
                    return Err(VmError::type_error(format!("{callee_val} is not a function")));
                }
                Ok(ChainEval::Value(self.call_value(&callee_val, &Value::Undefined, &argv)?))
            }
            other => Ok(ChainEval::Value(self.eval_expr(other, env)?)),
        }
    }

    fn member_key_display(&self, prop: &MemberProperty) -> String {
        match prop {
            MemberProperty::Ident(name) => name.clone(),
            MemberProperty::Computed(_) => "<computed>".to_string(),
        }
    }

    // ---------------------------------------------------------------
    // Coercion wrappers (supply the call-hook these need to invoke
    // `valueOf`/`toString`/`Symbol.toPrimitive`-equivalent methods)
    // ---------------------------------------------------------------

    fn to_primitive_value(&self, value: &Value, hint: PreferredType) -> VmResult<Value> {
        let mut hook = |c: &Value, t: &Value, a: &[Value]| self.call_value(c, t, a);
        coercion::to_primitive(value, hint, &mut hook)
    }

    fn to_number_value(&self, value: &Value) -> VmResult<f64> {
        match value {
            Value::Object(_) => {
                let p = self.to_primitive_value(value, PreferredType::Number)?;
                coercion::to_number(&p)
            }
            _ => coercion::to_number(value),
        }
    }

    /// Unary `-`: shared by the tree-walking `UnaryOp::Minus` arm and the
    /// bytecode tier's `Host::unary_neg` (`accelerate.rs`), so both tiers
    /// apply identical `ToNumeric` coercion (spec.md §8: tiers must agree).
    pub(crate) fn negate_value(&self, value: &Value) -> VmResult<Value> {
        let p = self.to_primitive_value(value, PreferredType::Number)?;
        match p {
            Value::BigInt(b) => Ok(Value::bigint(-&*b)),
            other => Ok(Value::Number(-coercion::to_number(&other)?)),
        }
    }

    /// `ToString`, rejecting `Symbol` explicitly since
    /// `coercion::to_js_string` (shared with non-throwing display contexts
    /// like error messages) does not.
    fn js_to_string(&self, value: &Value) -> VmResult<String> {
        match value {
            Value::Symbol(_) => Err(VmError::type_error("Cannot convert a Symbol value to a string")),
            Value::Object(_) => {
                let p = self.to_primitive_value(value, PreferredType::String)?;
                self.js_to_string(&p)
            }
            other => Ok(coercion::to_js_string(other)),
        }
    }

    fn loose_equals_value(&self, a: &Value, b: &Value) -> VmResult<bool> {
        let mut hook = |c: &Value, t: &Value, args: &[Value]| self.call_value(c, t, args);
        coercion::loose_equals(a, b, &mut hook)
    }

    fn compare(&self, l: &Value, r: &Value) -> VmResult<Option<std::cmp::Ordering>> {
        let lp = self.to_primitive_value(l, PreferredType::Number)?;
        let rp = self.to_primitive_value(r, PreferredType::Number)?;
        if let (Value::String(a), Value::String(b)) = (&lp, &rp) {
            return Ok(Some(a.as_str().cmp(b.as_str())));
        }
        match (&lp, &rp) {
            (Value::BigInt(a), Value::BigInt(b)) => Ok((**a).partial_cmp(&**b)),
            (Value::BigInt(a), _) => {
                let rf = coercion::to_number(&rp)?;
                a.to_f64_lossy().partial_cmp(&rf).map(Some).unwrap_or(Ok(None))
            }
            (_, Value::BigInt(b)) => {
                let lf = coercion::to_number(&lp)?;
                lf.partial_cmp(&b.to_f64_lossy()).map(Some).unwrap_or(Ok(None))
            }
            _ => {
                let lf = coercion::to_number(&lp)?;
                let rf = coercion::to_number(&rp)?;
                Ok(lf.partial_cmp(&rf))
            }
        }
    }

    fn eval_instanceof(&self, l: &Value, r: &Value) -> VmResult<Value> {
        let Value::Object(ctor) = r else {
            return Err(VmError::type_error("Right-hand side of 'instanceof' is not callable"));
        };
        if !ctor.is_callable() {
            return Err(VmError::type_error("Right-hand side of 'instanceof' is not callable"));
        }
        let proto = self.get_property(r, &PropertyKey::string("prototype"))?;
        let Value::Object(proto_obj) = proto else {
            return Ok(Value::Boolean(false));
        };
        let Value::Object(mut cur) = l.clone() else {
            return Ok(Value::Boolean(false));
        };
        loop {
            match cur.prototype() {
                Some(p) => {
                    if p.ptr_eq(&proto_obj) {
                        return Ok(Value::Boolean(true));
                    }
                    cur = p;
                }
                None => return Ok(Value::Boolean(false)),
            }
        }
    }

    fn numeric_binop(&self, l: &Value, r: &Value, f64_op: impl Fn(f64, f64) -> f64, big_op: impl Fn(&BigInt, &BigInt) -> BigInt) -> VmResult<Value> {
        let lp = self.to_primitive_value(l, PreferredType::Number)?;
        let rp = self.to_primitive_value(r, PreferredType::Number)?;
        match (&lp, &rp) {
            (Value::BigInt(a), Value::BigInt(b)) => Ok(Value::bigint(big_op(a, b))),
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(VmError::type_error("Cannot mix BigInt and other types, use explicit conversions")),
            _ => Ok(Value::Number(f64_op(coercion::to_number(&lp)?, coercion::to_number(&rp)?))),
        }
    }

    fn numeric_binop_fallible(
        &self,
        l: &Value,
        r: &Value,
        f64_op: impl Fn(f64, f64) -> f64,
        big_op: impl Fn(&BigInt, &BigInt) -> Result<BigInt, &'static str>,
    ) -> VmResult<Value> {
        let lp = self.to_primitive_value(l, PreferredType::Number)?;
        let rp = self.to_primitive_value(r, PreferredType::Number)?;
        match (&lp, &rp) {
            (Value::BigInt(a), Value::BigInt(b)) => big_op(a, b).map(Value::bigint).map_err(VmError::range_error),
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(VmError::type_error("Cannot mix BigInt and other types, use explicit conversions")),
            _ => Ok(Value::Number(f64_op(coercion::to_number(&lp)?, coercion::to_number(&rp)?))),
        }
    }

    fn int_binop(&self, l: &Value, r: &Value, f: impl Fn(i32, i32) -> i32) -> VmResult<Value> {
        let a = coercion::to_int32(self.to_number_value(l)?);
        let b = coercion::to_int32(self.to_number_value(r)?);
        Ok(Value::Number(f(a, b) as f64))
    }

    fn eval_add(&self, left: &Value, right: &Value) -> VmResult<Value> {
        let lp = self.to_primitive_value(left, PreferredType::Default)?;
        let rp = self.to_primitive_value(right, PreferredType::Default)?;
        if matches!(lp, Value::String(_)) || matches!(rp, Value::String(_)) {
            let ls = self.js_to_string(&lp)?;
            let rs = self.js_to_string(&rp)?;
            return Ok(Value::string(&format!("{ls}{rs}")));
        }
        match (&lp, &rp) {
            (Value::BigInt(a), Value::BigInt(b)) => Ok(Value::bigint(&**a + &**b)),
            (Value::BigInt(_), _) | (_, Value::BigInt(_)) => Err(VmError::type_error("Cannot mix BigInt and other types, use explicit conversions")),
            _ => Ok(Value::Number(coercion::to_number(&lp)? + coercion::to_number(&rp)?)),
        }
    }

    /// `pub(crate)`, not private: the bytecode tier's `Host::binary`
    /// (`accelerate.rs`) calls this directly so both tiers apply
    /// identical operator semantics (spec.md §8).
    pub(crate) fn eval_binary(&self, op: BinaryOp, left: &Value, right: &Value) -> VmResult<Value> {
        use BinaryOp::*;
        match op {
            Add => self.eval_add(left, right),
            Sub => self.numeric_binop(left, right, |a, b| a - b, |a, b| a - b),
            Mul => self.numeric_binop(left, right, |a, b| a * b, |a, b| a * b),
            Div => self.numeric_binop_fallible(left, right, |a, b| a / b, |a, b| a / b),
            Mod => self.numeric_binop_fallible(left, right, |a, b| a % b, |a, b| a % b),
            Pow => self.numeric_binop_fallible(left, right, |a, b| a.powf(b), |a, b| a.checked_pow(b)),
            Eq => Ok(Value::Boolean(self.loose_equals_value(left, right)?)),
            NotEq => Ok(Value::Boolean(!self.loose_equals_value(left, right)?)),
            StrictEq => Ok(Value::Boolean(left.strict_equals(right))),
            StrictNotEq => Ok(Value::Boolean(!left.strict_equals(right))),
            Lt => Ok(Value::Boolean(matches!(self.compare(left, right)?, Some(std::cmp::Ordering::Less)))),
            Gt => Ok(Value::Boolean(matches!(self.compare(left, right)?, Some(std::cmp::Ordering::Greater)))),
            LtEq => Ok(Value::Boolean(matches!(self.compare(left, right)?, Some(std::cmp::Ordering::Less | std::cmp::Ordering::Equal)))),
            GtEq => Ok(Value::Boolean(matches!(self.compare(left, right)?, Some(std::cmp::Ordering::Greater | std::cmp::Ordering::Equal)))),
            Shl => {
                let a = coercion::to_int32(self.to_number_value(left)?);
                let b = coercion::to_uint32(self.to_number_value(right)?) & 31;
                Ok(Value::Number((a << b) as f64))
            }
            Shr => {
                let a = coercion::to_int32(self.to_number_value(left)?);
                let b = coercion::to_uint32(self.to_number_value(right)?) & 31;
                Ok(Value::Number((a >> b) as f64))
            }
            UShr => {
                let a = coercion::to_uint32(self.to_number_value(left)?);
                let b = coercion::to_uint32(self.to_number_value(right)?) & 31;
                Ok(Value::Number((a >> b) as f64))
            }
            BitAnd => self.int_binop(left, right, |a, b| a & b),
            BitOr => self.int_binop(left, right, |a, b| a | b),
            BitXor => self.int_binop(left, right, |a, b| a ^ b),
            In => {
                let key = coercion::to_property_key(left);
                match right {
                    Value::Object(o) => Ok(Value::Boolean(o.has(&key))),
                    _ => Err(VmError::type_error("Cannot use 'in' operator on a non-object")),
                }
            }
            InstanceOf => self.eval_instanceof(left, right),
        }
    }
}

fn compound_to_binary(op: AssignOp) -> BinaryOp {
    match op {
        AssignOp::Add => BinaryOp::Add,
        AssignOp::Sub => BinaryOp::Sub,
        AssignOp::Mul => BinaryOp::Mul,
        AssignOp::Div => BinaryOp::Div,
        AssignOp::Mod => BinaryOp::Mod,
        AssignOp::Pow => BinaryOp::Pow,
        AssignOp::Shl => BinaryOp::Shl,
        AssignOp::Shr => BinaryOp::Shr,
        AssignOp::UShr => BinaryOp::UShr,
        AssignOp::BitAnd => BinaryOp::BitAnd,
        AssignOp::BitOr => BinaryOp::BitOr,
        AssignOp::BitXor => BinaryOp::BitXor,
        AssignOp::Assign | AssignOp::And | AssignOp::Or | AssignOp::Nullish => unreachable!(),
    }
}

/// Collects every identifier a binding pattern introduces, recursing
/// through defaults/rests/nested array-object patterns. Used both by
/// `var`-hoisting (which needs every nested name up front) and by
/// `let`/`const` declaration (TDZ pre-declaration).
fn pattern_names(pattern: &Pattern, out: &mut Vec<String>) {
    match pattern {
        Pattern::Ident(name) => out.push(name.clone()),
        Pattern::Default(inner, _) => pattern_names(inner, out),
        Pattern::Rest(inner) => pattern_names(inner, out),
        Pattern::Array(elems, rest) => {
            for e in elems.iter().flatten() {
                pattern_names(e, out);
            }
            if let Some(r) = rest {
                pattern_names(r, out);
            }
        }
        Pattern::Object(props, rest) => {
            for p in props {
                pattern_names(&p.value, out);
            }
            if let Some(r) = rest {
                pattern_names(r, out);
            }
        }
    }
}

/// Translates the handful of ECMAScript regex syntax quirks the `regex`
/// crate rejects outright (named groups use the same `(?P<name>...)` the
/// crate wants `(?<name>...)` spelled as, inline flags are unsupported) —
/// best-effort, not a full translation layer. Known gap: lookaround and
/// backreferences have no `regex`-crate equivalent and simply fail to
/// compile at `test`/`exec` time.
fn translate_regex_pattern(body: &str, flags: &str) -> String {
    let translated = body.replace("(?<", "(?P<");
    let mut prefix = String::new();
    if flags.contains('i') {
        prefix.push('i');
    }
    if flags.contains('s') {
        prefix.push('s');
    }
    if flags.contains('m') {
        prefix.push('m');
    }
    if prefix.is_empty() {
        translated
    } else {
        format!("(?{prefix}){translated}")
    }
}
