//! The runtime representation of a user-defined (interpreted) function:
//! its AST plus the environment it closed over (spec.md §4.3 closures).

use crate::environment::Environment;
use kestrel_gc::GcRef;
use kestrel_parser::Function as FunctionNode;
use std::rc::Rc;

#[derive(Clone)]
pub struct FunctionData {
    pub node: Rc<FunctionNode>,
    pub closure: GcRef<Environment>,
    /// `this` captured lexically at creation time for arrow functions;
    /// `None` for ordinary functions, which take `this` from the call.
    pub lexical_this: Option<crate::value::Value>,
}

impl FunctionData {
    pub fn new(node: Rc<FunctionNode>, closure: GcRef<Environment>, lexical_this: Option<crate::value::Value>) -> Self {
        Self { node, closure, lexical_this }
    }

    pub fn name(&self) -> &str {
        self.node.name.as_deref().unwrap_or("")
    }

    pub fn param_count(&self) -> usize {
        self.node.params.iter().filter(|p| !matches!(p, kestrel_parser::Pattern::Rest(_))).count()
    }
}
