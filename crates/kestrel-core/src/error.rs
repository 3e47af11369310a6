//! VM-level error types shared by every execution tier (spec.md §3/§6).
//!
//! Grounded on `otter-vm-core::error`: the same `VmError` taxonomy and
//! `ThrownValue`/`StackFrame` shapes, trimmed of the teacher's
//! bytecode-crate `#[from]` conversion and VM-internal interception
//! signals, which are specific to its compiled-pipeline architecture and
//! have no counterpart here.

use crate::call_stack::CallFrame;
use crate::value::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VmError {
    #[error("TypeError: {0}")]
    TypeError(String),

    #[error("ReferenceError: {0}")]
    ReferenceError(String),

    #[error("RangeError: {0}")]
    RangeError(String),

    #[error("SyntaxError: {0}")]
    SyntaxError(String),

    #[error("URIError: {0}")]
    UriError(String),

    #[error("InternalError: {0}")]
    InternalError(String),

    #[error("RangeError: Maximum call stack size exceeded")]
    StackOverflow,

    #[error("OutOfMemory")]
    OutOfMemory,

    #[error("Uncaught exception: {0}")]
    Exception(Box<ThrownValue>),

    #[error("Execution interrupted")]
    Interrupted,
}

#[derive(Debug)]
pub struct ThrownValue {
    pub value: Value,
    pub message: String,
    pub stack: Vec<StackFrame>,
}

impl std::fmt::Display for ThrownValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl ThrownValue {
    /// The user-visible `stack` string (spec.md §7): a header line
    /// followed by one `    at <function> (<file>:<line>:<column>)` frame
    /// per captured call-stack entry, innermost first.
    pub fn stack_string(&self) -> String {
        let header = match &self.value {
            Value::Object(o) => {
                let name = o.get(&crate::property::PropertyKey::string("name"));
                if name.is_undefined() {
                    self.message.clone()
                } else {
                    format!("{name}: {}", self.message)
                }
            }
            _ => self.message.clone(),
        };
        let mut out = header;
        for frame in &self.stack {
            out.push_str(&format!(
                "\n    at {} ({}:{}:{})",
                frame.function_name, frame.file, frame.line, frame.column
            ));
        }
        out
    }
}

#[derive(Debug, Clone)]
pub struct StackFrame {
    pub function_name: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl From<&CallFrame> for StackFrame {
    fn from(frame: &CallFrame) -> Self {
        Self { function_name: frame.function_name.clone(), file: frame.source_id.to_string(), line: frame.line, column: 0 }
    }
}

impl VmError {
    pub fn type_error(msg: impl Into<String>) -> Self {
        Self::TypeError(msg.into())
    }

    pub fn reference_error(msg: impl Into<String>) -> Self {
        Self::ReferenceError(msg.into())
    }

    pub fn range_error(msg: impl Into<String>) -> Self {
        Self::RangeError(msg.into())
    }

    pub fn syntax_error(msg: impl Into<String>) -> Self {
        Self::SyntaxError(msg.into())
    }

    pub fn uri_error(msg: impl Into<String>) -> Self {
        Self::UriError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::InternalError(msg.into())
    }

    pub fn interrupted() -> Self {
        Self::Interrupted
    }

    /// Wrap a thrown JS value (the target of a `throw` statement, or a
    /// constructed `Error` object bubbling out of a builtin) as a `VmError`
    /// so `?` can propagate it through Rust call frames.
    pub fn exception(value: Value, stack: Vec<StackFrame>) -> Self {
        let message = match &value {
            Value::Object(o) => {
                let msg = o.get(&crate::property::PropertyKey::string("message"));
                if msg.is_undefined() { value.to_string() } else { msg.to_string() }
            }
            _ => value.to_string(),
        };
        Self::Exception(Box::new(ThrownValue { message, value, stack }))
    }
}

pub type VmResult<T> = Result<T, VmError>;

impl From<crate::environment::BindingError> for VmError {
    fn from(e: crate::environment::BindingError) -> Self {
        use crate::environment::BindingError::*;
        match e {
            NotDefined => VmError::reference_error("variable is not defined"),
            TemporalDeadZone => VmError::reference_error("cannot access variable before initialization"),
            AssignToConst => VmError::type_error("assignment to constant variable"),
            AlreadyDeclared => VmError::syntax_error("identifier has already been declared"),
        }
    }
}
