//! Post-parse AST pattern recognition for the two native-emission shapes
//! spec.md §4.5 names: "sum of `i` from 0 to N" and "constant-per-
//! iteration push into an array".
//!
//! Grounded on spec.md §9 Design Notes' replacement for the teacher's
//! regex-based "ultra/aggressive" optimiser ("replace with post-parse
//! AST pattern recognition driven by type feedback; emission is then
//! guarded by runtime checks rather than textual coincidence") — matching
//! happens on the real `Statement`/`Expr` tree, not on source text, and
//! the matched shape is still re-checked against live values before a
//! native call is made (see `crate::accelerator`).

use kestrel_parser::{Argument, AssignOp, BinaryOp, DeclKind, Expr, ForInit, MemberProperty, Pattern, Statement, UnaryOp};

/// A recognised `for (let i = start; i <cmp> bound; i++) acc += i;` loop.
#[derive(Debug, Clone)]
pub struct SumLoopPattern {
    pub loop_var: String,
    pub start: f64,
    /// Either a literal bound or the name of an outer variable read
    /// through the host at dispatch time.
    pub bound: LoopBound,
    pub inclusive: bool,
    pub acc_var: String,
}

/// A recognised `for (let i = start; i <cmp> bound; i++) arr.push(k);`
/// loop, `k` a single literal repeated every iteration.
#[derive(Debug, Clone)]
pub struct PushLoopPattern {
    pub loop_var: String,
    pub start: f64,
    pub bound: LoopBound,
    pub inclusive: bool,
    pub array_var: String,
    pub pushed_value: f64,
}

#[derive(Debug, Clone)]
pub enum LoopBound {
    Literal(f64),
    Variable(String),
}

fn single_body_stmt(body: &Statement) -> Option<&Statement> {
    match body {
        Statement::Block(stmts) if stmts.len() == 1 => Some(&stmts[0]),
        other @ Statement::Expression(_) => Some(other),
        _ => None,
    }
}

/// Destructure `for (let <var> = <start:number>; <var> <cmp> <bound>; <var>++) <body>`
/// into its loop-variable name, numeric start, comparison bound, and
/// inclusivity, or `None` if the statement isn't exactly this shape.
fn match_counted_header<'a>(
    init: &'a Option<Box<ForInit>>,
    test: &'a Option<Expr>,
    update: &'a Option<Expr>,
) -> Option<(String, f64, LoopBound, bool)> {
    let ForInit::VarDecl { kind: DeclKind::Let, declarations } = init.as_deref()? else {
        return None;
    };
    let [(Pattern::Ident(loop_var), Some(Expr::Number(start)))] = declarations.as_slice() else {
        return None;
    };

    let Expr::Binary { op, left, right } = test.as_ref()? else { return None };
    let Expr::Ident(test_var) = left.as_ref() else { return None };
    if test_var != loop_var {
        return None;
    }
    let inclusive = match op {
        BinaryOp::Lt => false,
        BinaryOp::LtEq => true,
        _ => return None,
    };
    let bound = match right.as_ref() {
        Expr::Number(n) => LoopBound::Literal(*n),
        Expr::Ident(name) => LoopBound::Variable(name.clone()),
        _ => return None,
    };

    let is_increment_update = match update.as_ref()? {
        Expr::Unary { op: UnaryOp::Increment, argument, .. } => {
            matches!(argument.as_ref(), Expr::Ident(n) if n == loop_var)
        }
        Expr::Assign { op: AssignOp::Add, target, value } => {
            matches!(target.as_ref(), Expr::Ident(n) if n == loop_var) && matches!(value.as_ref(), Expr::Number(n) if *n == 1.0)
        }
        _ => false,
    };
    if !is_increment_update {
        return None;
    }

    Some((loop_var.clone(), *start, bound, inclusive))
}

pub fn match_sum_loop(stmt: &Statement) -> Option<SumLoopPattern> {
    let Statement::For { init, test, update, body } = stmt else { return None };
    let (loop_var, start, bound, inclusive) = match_counted_header(init, test, update)?;

    let Statement::Expression(Expr::Assign { op: AssignOp::Add, target, value }) = single_body_stmt(body)? else {
        return None;
    };
    let Expr::Ident(acc_var) = target.as_ref() else { return None };
    let Expr::Ident(added) = value.as_ref() else { return None };
    if added != &loop_var {
        return None;
    }

    Some(SumLoopPattern { loop_var, start, bound, inclusive, acc_var: acc_var.clone() })
}

pub fn match_push_loop(stmt: &Statement) -> Option<PushLoopPattern> {
    let Statement::For { init, test, update, body } = stmt else { return None };
    let (loop_var, start, bound, inclusive) = match_counted_header(init, test, update)?;

    let Statement::Expression(Expr::Call { callee, args, optional: false }) = single_body_stmt(body)? else {
        return None;
    };
    let Expr::Member { object, property: MemberProperty::Ident(method), optional: false } = callee.as_ref() else {
        return None;
    };
    if method != "push" {
        return None;
    }
    let Expr::Ident(array_var) = object.as_ref() else { return None };
    let [Argument::Normal(Expr::Number(pushed_value))] = args.as_slice() else {
        return None;
    };

    Some(PushLoopPattern { loop_var, start, bound, inclusive, array_var: array_var.clone(), pushed_value: *pushed_value })
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_parser::Parser;

    fn parse_stmt(src: &str) -> Statement {
        let (program, errors) = Parser::parse_program(src, 0);
        assert!(errors.is_empty(), "{errors:?}");
        program.body.into_iter().next().unwrap()
    }

    #[test]
    fn recognises_sum_loop_with_literal_bound() {
        let stmt = parse_stmt("for (let i = 0; i < 1000; i++) { s += i; }");
        let m = match_sum_loop(&stmt).expect("should match");
        assert_eq!(m.loop_var, "i");
        assert_eq!(m.start, 0.0);
        assert!(matches!(m.bound, LoopBound::Literal(n) if n == 1000.0));
        assert!(!m.inclusive);
        assert_eq!(m.acc_var, "s");
    }

    #[test]
    fn recognises_sum_loop_with_variable_bound_and_inclusive_cmp() {
        let stmt = parse_stmt("for (let i = 1; i <= n; i++) total = total + i;");
        let m = match_sum_loop(&stmt).expect("should match");
        assert!(matches!(m.bound, LoopBound::Variable(ref name) if name == "n"));
        assert!(m.inclusive);
    }

    #[test]
    fn rejects_non_matching_body() {
        let stmt = parse_stmt("for (let i = 0; i < 10; i++) { s = s * i; }");
        assert!(match_sum_loop(&stmt).is_none());
    }

    #[test]
    fn recognises_push_loop() {
        let stmt = parse_stmt("for (let i = 0; i < 5; i++) { arr.push(7); }");
        let m = match_push_loop(&stmt).expect("should match");
        assert_eq!(m.array_var, "arr");
        assert_eq!(m.pushed_value, 7.0);
    }

    #[test]
    fn rejects_non_constant_push_value() {
        let stmt = parse_stmt("for (let i = 0; i < 5; i++) { arr.push(i); }");
        assert!(match_push_loop(&stmt).is_none());
    }
}
