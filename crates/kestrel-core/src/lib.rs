//! Value model, object/shape system, environments, and the error/memory
//! ambient stack shared by every execution tier (spec.md §3).

pub mod bigint;
pub mod call_stack;
pub mod environment;
pub mod error;
pub mod format;
pub mod function;
pub mod memory;
pub mod object;
pub mod property;
pub mod shape;
pub mod string;
pub mod symbol;
pub mod value;

pub use bigint::BigInt;
pub use call_stack::{CallFrame, CallStack, StackOverflow, DEFAULT_MAX_DEPTH};
pub use environment::{BindingError, Environment};
pub use error::{StackFrame, ThrownValue, VmError, VmResult};
pub use function::FunctionData;
pub use memory::{MemoryPool, PoolPtr};
pub use object::{Callable, JsObject};
pub use property::{Attributes, PropertyDescriptor, PropertyKey, SlotKind};
pub use shape::{cache as shape_cache, Shape, ShapeCache, ShapeState};
pub use string::JsString;
pub use symbol::{well_known as well_known_symbols, Symbol, SymbolRegistry};
pub use value::Value;
