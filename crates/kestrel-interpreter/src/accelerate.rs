//! The seam that lets the tree-walking evaluator hand a hot AST node to
//! the tiered accelerator (spec.md §4.5, §2 "each node consults the
//! JIT, which may substitute a bytecode or native execution").
//!
//! Two call sites drive this: `Evaluator::call_interpreted_inner` (whole
//! function bodies, the `Bytecode` tier via `kestrel-bytecode`) and
//! `Evaluator::eval_for` (counted loops, the `Optimized`/`MachineCode`
//! tiers via `kestrel-jit`'s closed-form native kernels). Both consult
//! `Context::node_state` for the per-node tier/execution counters before
//! asking `Context::jit` (a [`kestrel_jit::Accelerator`]) to compile or
//! run anything, matching spec.md §3's `TypeFeedback`/tier split: the
//! interpreter owns *when* to accelerate, `kestrel-jit` owns *how*.

use crate::evaluator::Evaluator;
use kestrel_bytecode::{BinOp, Host};
use kestrel_core::{BindingError, Environment, Value, VmResult};
use kestrel_gc::GcRef;
use kestrel_parser::BinaryOp;

/// Implements the bytecode VM's [`Host`] seam by routing every variable
/// access, call, and operator straight back through the real evaluator
/// and its environment chain, so a compiled function's closure captures
/// and globals resolve exactly as the interpreter would (spec.md §8:
/// "observable result... identical at every tier").
pub(crate) struct BytecodeHost<'a, 'ctx> {
    pub evaluator: &'a Evaluator<'ctx>,
    pub env: &'a GcRef<Environment>,
}

impl Host for BytecodeHost<'_, '_> {
    fn get_variable(&self, name: &str) -> VmResult<Value> {
        match self.env.get(name) {
            Ok(v) => Ok(v),
            Err(BindingError::NotDefined) => Ok(Value::Undefined),
            Err(e) => Err(e.into()),
        }
    }

    fn set_variable(&self, name: &str, value: Value) -> VmResult<()> {
        self.env.set(name, value).map_err(Into::into)
    }

    fn call(&self, callee: &Value, this: &Value, args: &[Value]) -> VmResult<Value> {
        self.evaluator.call_value(callee, this, args)
    }

    fn binary(&self, op: BinOp, lhs: &Value, rhs: &Value) -> VmResult<Value> {
        self.evaluator.eval_binary(to_ast_binop(op), lhs, rhs)
    }

    fn unary_neg(&self, value: &Value) -> VmResult<Value> {
        self.evaluator.negate_value(value)
    }
}

fn to_ast_binop(op: BinOp) -> BinaryOp {
    match op {
        BinOp::Add => BinaryOp::Add,
        BinOp::Sub => BinaryOp::Sub,
        BinOp::Mul => BinaryOp::Mul,
        BinOp::Div => BinaryOp::Div,
        BinOp::Mod => BinaryOp::Mod,
        BinOp::Eq => BinaryOp::Eq,
        BinOp::Ne => BinaryOp::NotEq,
        BinOp::StrictEq => BinaryOp::StrictEq,
        BinOp::StrictNe => BinaryOp::StrictNotEq,
        BinOp::Lt => BinaryOp::Lt,
        BinOp::Le => BinaryOp::LtEq,
        BinOp::Gt => BinaryOp::Gt,
        BinOp::Ge => BinaryOp::GtEq,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;

    #[test]
    fn host_get_variable_resolves_through_closure_chain() {
        let ctx = Context::new();
        let env = ctx.global_env.clone();
        env.declare_var("outer");
        env.set("outer", Value::Number(7.0)).unwrap();
        let evaluator = Evaluator::new(&ctx);
        let host = BytecodeHost { evaluator: &evaluator, env: &env };
        assert_eq!(host.get_variable("outer").unwrap().as_number(), Some(7.0));
    }

    #[test]
    fn host_binary_matches_evaluator_semantics() {
        let ctx = Context::new();
        let env = ctx.global_env.clone();
        let evaluator = Evaluator::new(&ctx);
        let host = BytecodeHost { evaluator: &evaluator, env: &env };
        let sum = host.binary(BinOp::Add, &Value::string("a"), &Value::Number(1.0)).unwrap();
        assert_eq!(sum.to_string(), "a1");
    }

    #[test]
    fn host_unary_neg_handles_bigint() {
        let ctx = Context::new();
        let env = ctx.global_env.clone();
        let evaluator = Evaluator::new(&ctx);
        let host = BytecodeHost { evaluator: &evaluator, env: &env };
        let neg = host.unary_neg(&Value::Number(5.0)).unwrap();
        assert_eq!(neg.as_number(), Some(-5.0));
    }

    /// Exercises the actual tier-up path: a flat function called past the
    /// bytecode threshold must keep returning interpreter-identical
    /// results once `Evaluator::call_interpreted_inner` switches it over
    /// to running through `kestrel_bytecode::run` (spec.md §8 scenario 3).
    #[test]
    fn repeated_calls_tier_up_without_changing_the_result() {
        let ctx = Context::new();
        ctx.evaluate("function f(x) { return x * x; }", "<test>").unwrap();
        let f = ctx.get_global("f");
        for i in 0..150 {
            let result = ctx.call(&f, &Value::Undefined, &[Value::Number(i as f64)]).unwrap();
            assert_eq!(result.as_number(), Some((i * i) as f64));
        }
    }
}
