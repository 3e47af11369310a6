//! AST → bytecode compiler (spec.md §4.5).
//!
//! Scope, deliberately narrow and rejection-first like the teacher's
//! `otter-vm-jit::translator` ("unsupported instructions are rejected at
//! compile time"): this compiler only accepts a **flat** function body —
//! plain identifier parameters, `let`/`const`/`var` declarations with a
//! plain identifier target, `if`/`while`/`for`/`return`/expression
//! statements and blocks built from those. Any destructuring pattern,
//! nested function/class/try/switch/for-in/for-of, `break`/`continue`,
//! template literal, or BigInt/regex literal anywhere in the body aborts
//! the whole compile with [`CompileError::Unsupported`] — the function
//! simply keeps running at the `Interpreter` tier (spec.md §4.5: "JIT
//! failures degrade silently; never change observable behaviour").
//!
//! Every identifier that isn't one of this function's own locals is
//! read/written through [`crate::host::Host`], i.e. through the real
//! environment chain — so closures over outer variables and globals work
//! exactly as the interpreter would resolve them, just not accelerated.

use crate::constant::{Constant, ConstantPool};
use crate::error::CompileError;
use crate::function::CompiledFunction;
use crate::instruction::{BinOp, Instruction};
use crate::operand::{ConstantIndex, JumpOffset, Register};
use kestrel_parser::{AssignOp, BinaryOp, DeclKind, Expr, ForInit, Function, FunctionBody, Pattern, Statement, UnaryOp};
use rustc_hash::FxHashMap;

pub fn compile_function(func: &Function) -> Result<CompiledFunction, CompileError> {
    if func.is_async || func.is_generator {
        return Err(CompileError::Unsupported("async/generator function"));
    }
    let mut param_names = Vec::with_capacity(func.params.len());
    for p in &func.params {
        match p {
            Pattern::Ident(name) => param_names.push(name.clone()),
            _ => return Err(CompileError::Unsupported("non-identifier parameter")),
        }
    }

    let mut compiler = Compiler {
        locals: FxHashMap::default(),
        next_register: 0,
        constants: ConstantPool::new(),
        instructions: Vec::new(),
    };
    for name in &param_names {
        compiler.bind_local(name)?;
    }

    match &func.body {
        FunctionBody::Expression(expr) => {
            collect_locals_expr(expr, &mut compiler)?;
            let r = compiler.compile_expr(expr)?;
            compiler.instructions.push(Instruction::Return { src: r });
        }
        FunctionBody::Block(stmts) => {
            for s in stmts {
                collect_locals_stmt(s, &mut compiler)?;
            }
            for s in stmts {
                compiler.compile_stmt(s)?;
            }
            compiler.instructions.push(Instruction::ReturnUndefined);
        }
    }

    if compiler.next_register > u16::MAX as usize {
        return Err(CompileError::TooManyLocals);
    }

    Ok(CompiledFunction {
        name: func.name.clone().unwrap_or_default(),
        param_names,
        register_count: compiler.next_register as u16,
        constants: compiler.constants,
        instructions: compiler.instructions,
    })
}

struct Compiler {
    locals: FxHashMap<String, Register>,
    next_register: usize,
    constants: ConstantPool,
    instructions: Vec<Instruction>,
}

impl Compiler {
    fn bind_local(&mut self, name: &str) -> Result<Register, CompileError> {
        if let Some(r) = self.locals.get(name) {
            return Ok(*r);
        }
        let r = Register::new(self.next_register as u16);
        self.next_register += 1;
        self.locals.insert(name.to_string(), r);
        Ok(r)
    }

    fn alloc_scratch(&mut self) -> Register {
        let r = Register::new(self.next_register as u16);
        self.next_register += 1;
        r
    }

    fn const_str(&mut self, s: &str) -> ConstantIndex {
        self.constants.add(Constant::String(s.to_string()))
    }

    fn emit(&mut self, instr: Instruction) {
        self.instructions.push(instr);
    }

    fn here(&self) -> usize {
        self.instructions.len()
    }

    /// Emit a placeholder jump, returning its index for later patching.
    fn emit_placeholder_jump(&mut self, make: impl FnOnce(JumpOffset) -> Instruction) -> usize {
        let idx = self.here();
        self.emit(make(JumpOffset(0)));
        idx
    }

    fn patch_jump(&mut self, idx: usize, target: usize) {
        let offset = JumpOffset(target as i32 - idx as i32);
        match &mut self.instructions[idx] {
            Instruction::Jump { offset: o } => *o = offset,
            Instruction::JumpIfFalse { offset: o, .. } => *o = offset,
            Instruction::JumpIfTrue { offset: o, .. } => *o = offset,
            _ => unreachable!("patch_jump on non-jump instruction"),
        }
    }

    fn compile_stmt(&mut self, stmt: &Statement) -> Result<(), CompileError> {
        match stmt {
            Statement::Empty => Ok(()),
            Statement::Expression(e) => {
                self.compile_expr(e)?;
                Ok(())
            }
            Statement::Block(stmts) => {
                for s in stmts {
                    self.compile_stmt(s)?;
                }
                Ok(())
            }
            Statement::VarDecl { declarations, .. } => {
                for (pat, init) in declarations {
                    let Pattern::Ident(name) = pat else {
                        return Err(CompileError::Unsupported("destructuring declaration"));
                    };
                    let dst = self.bind_local(name)?;
                    match init {
                        Some(expr) => {
                            let r = self.compile_expr(expr)?;
                            self.emit(Instruction::Move { dst, src: r });
                        }
                        None => self.emit(Instruction::LoadUndefined { dst }),
                    }
                }
                Ok(())
            }
            Statement::Return(expr) => {
                match expr {
                    Some(e) => {
                        let r = self.compile_expr(e)?;
                        self.emit(Instruction::Return { src: r });
                    }
                    None => self.emit(Instruction::ReturnUndefined),
                }
                Ok(())
            }
            Statement::If { test, consequent, alternate } => {
                let cond = self.compile_expr(test)?;
                let jump_to_else = self.emit_placeholder_jump(|offset| Instruction::JumpIfFalse { cond, offset });
                self.compile_stmt(consequent)?;
                if let Some(alt) = alternate {
                    let jump_to_end = self.emit_placeholder_jump(Instruction::Jump);
                    let else_pc = self.here();
                    self.patch_jump(jump_to_else, else_pc);
                    self.compile_stmt(alt)?;
                    let end_pc = self.here();
                    self.patch_jump(jump_to_end, end_pc);
                } else {
                    let end_pc = self.here();
                    self.patch_jump(jump_to_else, end_pc);
                }
                Ok(())
            }
            Statement::While { test, body } => {
                let loop_start = self.here();
                let cond = self.compile_expr(test)?;
                let jump_to_end = self.emit_placeholder_jump(|offset| Instruction::JumpIfFalse { cond, offset });
                self.compile_stmt(body)?;
                let back_idx = self.here();
                self.emit(Instruction::Jump { offset: JumpOffset(0) });
                self.patch_jump(back_idx, loop_start);
                let end_pc = self.here();
                self.patch_jump(jump_to_end, end_pc);
                Ok(())
            }
            Statement::DoWhile { body, test } => {
                let loop_start = self.here();
                self.compile_stmt(body)?;
                let cond = self.compile_expr(test)?;
                let back_idx = self.here();
                self.emit(Instruction::JumpIfTrue { cond, offset: JumpOffset(0) });
                self.patch_jump(back_idx, loop_start);
                Ok(())
            }
            Statement::For { init, test, update, body } => {
                if let Some(init) = init {
                    match &**init {
                        ForInit::VarDecl { kind: DeclKind::Var, declarations } | ForInit::VarDecl { declarations, .. } => {
                            for (pat, expr) in declarations {
                                let Pattern::Ident(name) = pat else {
                                    return Err(CompileError::Unsupported("destructuring for-init"));
                                };
                                let dst = self.bind_local(name)?;
                                match expr {
                                    Some(e) => {
                                        let r = self.compile_expr(e)?;
                                        self.emit(Instruction::Move { dst, src: r });
                                    }
                                    None => self.emit(Instruction::LoadUndefined { dst }),
                                }
                            }
                        }
                        ForInit::Expression(e) => {
                            self.compile_expr(e)?;
                        }
                    }
                }
                let loop_start = self.here();
                let jump_to_end = match test {
                    Some(t) => {
                        let cond = self.compile_expr(t)?;
                        Some(self.emit_placeholder_jump(|offset| Instruction::JumpIfFalse { cond, offset }))
                    }
                    None => None,
                };
                self.compile_stmt(body)?;
                if let Some(u) = update {
                    self.compile_expr(u)?;
                }
                let back_idx = self.here();
                self.emit(Instruction::Jump { offset: JumpOffset(0) });
                self.patch_jump(back_idx, loop_start);
                if let Some(idx) = jump_to_end {
                    let end_pc = self.here();
                    self.patch_jump(idx, end_pc);
                }
                Ok(())
            }
            _ => Err(CompileError::Unsupported("statement kind")),
        }
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<Register, CompileError> {
        match expr {
            Expr::Number(n) => {
                let dst = self.alloc_scratch();
                let idx = self.constants.add(Constant::Number(*n));
                self.emit(Instruction::LoadConst { dst, idx });
                Ok(dst)
            }
            Expr::String(s) => {
                let dst = self.alloc_scratch();
                let idx = self.constants.add(Constant::String(s.clone()));
                self.emit(Instruction::LoadConst { dst, idx });
                Ok(dst)
            }
            Expr::Bool(true) => {
                let dst = self.alloc_scratch();
                self.emit(Instruction::LoadTrue { dst });
                Ok(dst)
            }
            Expr::Bool(false) => {
                let dst = self.alloc_scratch();
                self.emit(Instruction::LoadFalse { dst });
                Ok(dst)
            }
            Expr::Null => {
                let dst = self.alloc_scratch();
                self.emit(Instruction::LoadNull { dst });
                Ok(dst)
            }
            Expr::Undefined => {
                let dst = self.alloc_scratch();
                self.emit(Instruction::LoadUndefined { dst });
                Ok(dst)
            }
            Expr::Ident(name) => {
                if let Some(r) = self.locals.get(name) {
                    Ok(*r)
                } else {
                    let dst = self.alloc_scratch();
                    let idx = self.const_str(name);
                    self.emit(Instruction::GetVar { dst, name: idx });
                    Ok(dst)
                }
            }
            Expr::Unary { op: UnaryOp::Minus, argument, .. } => {
                let src = self.compile_expr(argument)?;
                let dst = self.alloc_scratch();
                self.emit(Instruction::Neg { dst, src });
                Ok(dst)
            }
            Expr::Unary { op: UnaryOp::Not, argument, .. } => {
                let src = self.compile_expr(argument)?;
                let dst = self.alloc_scratch();
                self.emit(Instruction::Not { dst, src });
                Ok(dst)
            }
            Expr::Unary { op: UnaryOp::Plus, argument, .. } => self.compile_expr(argument),
            Expr::Binary { op, left, right } => {
                let binop = binary_op(*op).ok_or(CompileError::Unsupported("binary operator"))?;
                let lhs = self.compile_expr(left)?;
                let rhs = self.compile_expr(right)?;
                let dst = self.alloc_scratch();
                self.emit(Instruction::Binary { op: binop, dst, lhs, rhs });
                Ok(dst)
            }
            Expr::Assign { op: AssignOp::Assign, target, value } => {
                let Expr::Ident(name) = &**target else {
                    return Err(CompileError::Unsupported("non-identifier assignment target"));
                };
                let r = self.compile_expr(value)?;
                self.store_ident(name, r)
            }
            Expr::Assign { op, target, value } => {
                let Expr::Ident(name) = &**target else {
                    return Err(CompileError::Unsupported("non-identifier compound assignment target"));
                };
                let binop = compound_binary_op(*op).ok_or(CompileError::Unsupported("compound assignment operator"))?;
                let current = self.compile_expr(target)?;
                let rhs = self.compile_expr(value)?;
                let dst = self.alloc_scratch();
                self.emit(Instruction::Binary { op: binop, dst, lhs: current, rhs });
                self.store_ident(name, dst)
            }
            Expr::Call { callee, args, optional: false } => {
                let Expr::Ident(_) = &**callee else {
                    return Err(CompileError::Unsupported("non-identifier callee"));
                };
                let callee_reg = self.compile_expr(callee)?;
                // Evaluate each argument into a scratch register first (an
                // identifier argument would otherwise resolve straight to
                // its own local's register, breaking the contiguous
                // [first_arg, first_arg+count) range `Call` requires), then
                // copy into a fresh contiguous block in argument order.
                let mut arg_values = Vec::with_capacity(args.len());
                for a in args {
                    match a {
                        kestrel_parser::Argument::Normal(e) => arg_values.push(self.compile_expr(e)?),
                        kestrel_parser::Argument::Spread(_) => return Err(CompileError::Unsupported("spread call argument")),
                    }
                }
                let first_arg = Register::new(self.next_register as u16);
                for v in arg_values {
                    let slot = self.alloc_scratch();
                    self.emit(Instruction::Move { dst: slot, src: v });
                }
                let dst = self.alloc_scratch();
                self.emit(Instruction::Call { dst, callee: callee_reg, first_arg, arg_count: args.len() as u16 });
                Ok(dst)
            }
            _ => Err(CompileError::Unsupported("expression kind")),
        }
    }

    fn store_ident(&mut self, name: &str, value: Register) -> Result<Register, CompileError> {
        if let Some(r) = self.locals.get(name).copied() {
            self.emit(Instruction::Move { dst: r, src: value });
            Ok(r)
        } else {
            let idx = self.const_str(name);
            self.emit(Instruction::SetVar { name: idx, src: value });
            Ok(value)
        }
    }
}

fn binary_op(op: BinaryOp) -> Option<BinOp> {
    Some(match op {
        BinaryOp::Add => BinOp::Add,
        BinaryOp::Sub => BinOp::Sub,
        BinaryOp::Mul => BinOp::Mul,
        BinaryOp::Div => BinOp::Div,
        BinaryOp::Mod => BinOp::Mod,
        BinaryOp::Eq => BinOp::Eq,
        BinaryOp::NotEq => BinOp::Ne,
        BinaryOp::StrictEq => BinOp::StrictEq,
        BinaryOp::StrictNotEq => BinOp::StrictNe,
        BinaryOp::Lt => BinOp::Lt,
        BinaryOp::LtEq => BinOp::Le,
        BinaryOp::Gt => BinOp::Gt,
        BinaryOp::GtEq => BinOp::Ge,
        _ => return None,
    })
}

fn compound_binary_op(op: AssignOp) -> Option<BinOp> {
    Some(match op {
        AssignOp::Add => BinOp::Add,
        AssignOp::Sub => BinOp::Sub,
        AssignOp::Mul => BinOp::Mul,
        AssignOp::Div => BinOp::Div,
        AssignOp::Mod => BinOp::Mod,
        _ => return None,
    })
}

/// Shallow pre-pass collecting every `let`/`const`/`var` identifier
/// declared directly in this function body (descending into nested
/// blocks/if/while/for but never into a nested function, class, try, or
/// switch) so every local has a stable register before compilation
/// assigns them in execution order. Encountering any of those
/// unsupported constructs aborts the whole compile immediately.
fn collect_locals_stmt(stmt: &Statement, c: &mut Compiler) -> Result<(), CompileError> {
    match stmt {
        Statement::Empty | Statement::Expression(_) | Statement::Return(_) => Ok(()),
        Statement::Break(_) | Statement::Continue(_) => Err(CompileError::Unsupported("break/continue")),
        Statement::Block(stmts) => stmts.iter().try_for_each(|s| collect_locals_stmt(s, c)),
        Statement::VarDecl { declarations, .. } => {
            for (pat, _) in declarations {
                let Pattern::Ident(name) = pat else { return Err(CompileError::Unsupported("destructuring declaration")) };
                c.bind_local(name)?;
            }
            Ok(())
        }
        Statement::If { consequent, alternate, .. } => {
            collect_locals_stmt(consequent, c)?;
            if let Some(a) = alternate {
                collect_locals_stmt(a, c)?;
            }
            Ok(())
        }
        Statement::While { body, .. } | Statement::DoWhile { body, .. } => collect_locals_stmt(body, c),
        Statement::For { init, body, .. } => {
            if let Some(init) = init {
                if let ForInit::VarDecl { declarations, .. } = &**init {
                    for (pat, _) in declarations {
                        let Pattern::Ident(name) = pat else { return Err(CompileError::Unsupported("destructuring for-init")) };
                        c.bind_local(name)?;
                    }
                }
            }
            collect_locals_stmt(body, c)
        }
        _ => Err(CompileError::Unsupported("statement kind")),
    }
}

fn collect_locals_expr(_expr: &Expr, _c: &mut Compiler) -> Result<(), CompileError> {
    // Concise arrow bodies are a single expression with no declarations
    // of their own; parameters are already bound.
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_parser::Parser;

    fn compile_source(src: &str) -> CompiledFunction {
        let (program, errors) = Parser::parse_program(src, 0);
        assert!(errors.is_empty(), "parse errors: {errors:?}");
        let Statement::FunctionDecl(f) = &program.body[0] else { panic!("expected function decl") };
        compile_function(f).expect("compile")
    }

    #[test]
    fn compiles_square_function() {
        let f = compile_source("function f(x) { return x * x; }");
        assert_eq!(f.param_names, vec!["x".to_string()]);
        assert!(matches!(f.instructions.last(), Some(Instruction::Return { .. })));
    }

    #[test]
    fn compiles_counted_loop() {
        let f = compile_source("function f() { let s = 0; for (let i = 0; i < 10; i = i + 1) { s = s + i; } return s; }");
        assert!(f.register_count >= 2);
        assert!(matches!(f.instructions.last(), Some(Instruction::Return { .. })));
    }

    #[test]
    fn rejects_destructuring_params() {
        let (program, errors) = Parser::parse_program("function f([a, b]) { return a; }", 0);
        assert!(errors.is_empty());
        let Statement::FunctionDecl(f) = &program.body[0] else { panic!() };
        assert!(compile_function(f).is_err());
    }

    #[test]
    fn rejects_break_in_loop() {
        let (program, errors) = Parser::parse_program("function f() { while (true) { break; } }", 0);
        assert!(errors.is_empty());
        let Statement::FunctionDecl(f) = &program.body[0] else { panic!() };
        assert!(compile_function(f).is_err());
    }
}
