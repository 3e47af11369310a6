//! The embedding surface a host program drives a [`Context`] through
//! (spec.md §6): `evaluate(source, filename?)`, `call(fn, this, args)`,
//! and global-object `get`/`set`/`has`/`delete`.
//!
//! Grounded on `otterjs::commands::run`'s call sequence into its engine
//! (parse, then hand the program to the runtime, surface a `SyntaxError`
//! without ever constructing a `Context` on a parse failure) — adapted
//! from JavaScriptCore's C API to this crate's own `Lexer`/`Parser`/
//! `Evaluator` pipeline.

use kestrel_core::{PropertyKey, Value, VmError, VmResult};
use kestrel_parser::Parser;

use crate::context::Context;
use crate::evaluator::Evaluator;

impl Context {
    /// Parse and run a top-level program, returning its completion value
    /// (the last expression statement's value, per spec.md §6) or a
    /// `VmError` — a `SyntaxError` if parsing failed, otherwise whatever
    /// propagated out of evaluation.
    ///
    /// `filename` is only used for diagnostics; it has no effect on
    /// evaluation semantics.
    pub fn evaluate(&self, source: &str, filename: &str) -> VmResult<Value> {
        let source_id = self.next_source_id();
        let (program, errors) = Parser::parse_program(source, source_id);
        if let Some(first) = errors.first() {
            return Err(VmError::syntax_error(format!(
                "{filename}:{}:{}: {}",
                first.span.line, first.span.column, first.message
            )));
        }
        Evaluator::new(self).run_program(&program, &self.global_env)
    }

    /// Invoke a callable `Value` with an explicit `this` binding and
    /// argument list, the programmatic counterpart to a script-level call
    /// expression (spec.md §6).
    pub fn call(&self, function: &Value, this: &Value, args: &[Value]) -> VmResult<Value> {
        Evaluator::new(self).call_value(function, this, args)
    }

    pub fn get_global(&self, name: &str) -> Value {
        self.global.get(&PropertyKey::string(name))
    }

    pub fn set_global(&self, name: &str, value: Value) {
        self.global.set(PropertyKey::string(name), value);
    }

    pub fn has_global(&self, name: &str) -> bool {
        self.global.has(&PropertyKey::string(name))
    }

    pub fn delete_global(&self, name: &str) -> bool {
        self.global.delete(&PropertyKey::string(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evaluate_returns_completion_value() {
        let ctx = Context::new();
        let result = ctx.evaluate("1 + 2", "<test>").unwrap();
        assert_eq!(result.as_number(), Some(3.0));
    }

    #[test]
    fn evaluate_surfaces_syntax_errors() {
        let ctx = Context::new();
        let err = ctx.evaluate("let = ;", "<test>").unwrap_err();
        assert!(matches!(err, VmError::SyntaxError(_)));
    }

    #[test]
    fn call_invokes_a_global_function() {
        let ctx = Context::new();
        ctx.evaluate("function double(x) { return x * 2; }", "<test>").unwrap();
        let f = ctx.get_global("double");
        let result = ctx.call(&f, &Value::Undefined, &[Value::Number(21.0)]).unwrap();
        assert_eq!(result.as_number(), Some(42.0));
    }

    #[test]
    fn global_accessors_round_trip() {
        let ctx = Context::new();
        assert!(!ctx.has_global("foo"));
        ctx.set_global("foo", Value::Number(1.0));
        assert!(ctx.has_global("foo"));
        assert_eq!(ctx.get_global("foo").as_number(), Some(1.0));
        assert!(ctx.delete_global("foo"));
        assert!(!ctx.has_global("foo"));
    }
}
