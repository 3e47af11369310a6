//! The global environment: prototypes, constructors, and the minimal
//! `console`/`Object`/`Array`/`String`/`Number`/`Boolean`/`Math`/`JSON`/
//! error-constructor surface needed to run real programs (SPEC_FULL.md
//! §10). Scope is deliberately the concrete scenarios and GLOSSARY terms,
//! not a faithful `Array.prototype`.
//!
//! Grounded on `otter-vm-builtins`'s one-file-per-global layout, collapsed
//! into one module here since this engine's surface is intentionally much
//! smaller; the prototype-object wiring (a plain `JsObject` per
//! `Intrinsics` field, methods installed as non-enumerable data slots)
//! follows `otter-vm-core::object`'s own bootstrap of `Object.prototype`.

use crate::context::Intrinsics;
use kestrel_core::{Attributes, JsObject, PropertyDescriptor, PropertyKey, SlotKind, Value, VmError, VmResult};
use kestrel_gc::GcRef;
use std::cell::Cell;

pub struct Builtins {
    pub global: GcRef<JsObject>,
    pub intrinsics: Intrinsics,
}

fn native(f: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static) -> Value {
    Value::Object(GcRef::new(JsObject::new_native_function(f)))
}

fn native_with_call(
    f: impl Fn(&mut dyn FnMut(&Value, &Value, &[Value]) -> VmResult<Value>, &Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
) -> Value {
    Value::Object(GcRef::new(JsObject::new_native_with_call(f)))
}

/// Install a method as a non-enumerable own property, matching how
/// ECMAScript's own prototype methods are configured (enumerable: false,
/// so `for-in`/`Object.keys` on a plain object don't surface them).
fn method(obj: &GcRef<JsObject>, name: &str, f: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static) {
    obj.define_property(PropertyKey::string(name), PropertyDescriptor::Data { value: native(f) }, SlotKind::Method, Attributes::non_enumerable());
}

fn method_with_call(
    obj: &GcRef<JsObject>,
    name: &str,
    f: impl Fn(&mut dyn FnMut(&Value, &Value, &[Value]) -> VmResult<Value>, &Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
) {
    obj.define_property(PropertyKey::string(name), PropertyDescriptor::Data { value: native_with_call(f) }, SlotKind::Method, Attributes::non_enumerable());
}

fn accessor(obj: &GcRef<JsObject>, name: &str, getter: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static) {
    let get = Some(native(getter));
    obj.define_property(PropertyKey::string(name), PropertyDescriptor::Accessor { get, set: None }, SlotKind::Accessor, Attributes::non_enumerable());
}

fn data(obj: &GcRef<JsObject>, name: &str, value: Value) {
    obj.define_property(PropertyKey::string(name), PropertyDescriptor::Data { value }, SlotKind::Constant, Attributes::non_enumerable());
}

fn arg(args: &[Value], i: usize) -> Value {
    args.get(i).cloned().unwrap_or(Value::Undefined)
}

fn require_object<'a>(v: &'a Value, op: &str) -> VmResult<&'a GcRef<JsObject>> {
    match v {
        Value::Object(o) => Ok(o),
        _ => Err(VmError::type_error(format!("{op} called on non-object"))),
    }
}

pub fn install(global_env: &GcRef<kestrel_core::Environment>) -> Builtins {
    let object_prototype = GcRef::new(JsObject::new());
    let function_prototype = GcRef::new(JsObject::new());
    let array_prototype = GcRef::new(JsObject::new());
    let string_prototype = GcRef::new(JsObject::new());
    let number_prototype = GcRef::new(JsObject::new());
    let boolean_prototype = GcRef::new(JsObject::new());
    let error_prototype = GcRef::new(JsObject::new());

    function_prototype.set_prototype(Some(object_prototype.clone()));
    array_prototype.set_prototype(Some(object_prototype.clone()));
    string_prototype.set_prototype(Some(object_prototype.clone()));
    number_prototype.set_prototype(Some(object_prototype.clone()));
    boolean_prototype.set_prototype(Some(object_prototype.clone()));
    error_prototype.set_prototype(Some(object_prototype.clone()));

    install_object_prototype(&object_prototype);
    install_function_prototype(&function_prototype);
    install_array_prototype(&array_prototype);
    install_string_prototype(&string_prototype);
    install_number_prototype(&number_prototype);
    install_boolean_prototype(&boolean_prototype);
    install_error_prototype(&error_prototype);

    let global = GcRef::new(JsObject::new());
    global.set_prototype(Some(object_prototype.clone()));

    let mut define = |name: &str, value: Value| {
        global_env.declare_initialized(name, value.clone());
        global.set(PropertyKey::string(name), value);
    };

    define("undefined", Value::Undefined);
    define("NaN", Value::Number(f64::NAN));
    define("Infinity", Value::Number(f64::INFINITY));
    define("console", make_console());
    define("Math", make_math());
    define("JSON", make_json());
    define(
        "Object",
        make_object_ctor(&object_prototype, &array_prototype),
    );
    define("Array", make_array_ctor(&array_prototype));
    define("Function", make_function_ctor(&function_prototype));
    define("String", make_string_ctor(&string_prototype));
    define("Number", make_number_ctor(&number_prototype));
    define("Boolean", make_boolean_ctor(&boolean_prototype));
    for kind in ["Error", "TypeError", "RangeError", "ReferenceError", "SyntaxError", "URIError"] {
        define(kind, make_error_ctor(kind, &error_prototype));
    }

    global_env.declare_initialized("globalThis", Value::Object(global.clone()));
    global.set(PropertyKey::string("globalThis"), Value::Object(global.clone()));

    Builtins {
        global,
        intrinsics: Intrinsics {
            object_prototype,
            array_prototype,
            function_prototype,
            string_prototype,
            number_prototype,
            boolean_prototype,
            error_prototype,
        },
    }
}

// ---------------------------------------------------------------------
// Object.prototype
// ---------------------------------------------------------------------

fn install_object_prototype(proto: &GcRef<JsObject>) {
    method(proto, "hasOwnProperty", |this, args| {
        let obj = require_object(this, "hasOwnProperty")?;
        let key = crate::coercion::to_property_key(&arg(args, 0));
        Ok(Value::Boolean(obj.get_own(&key).is_some()))
    });
    method(proto, "toString", |this, _args| {
        Ok(Value::string(&this.to_string()))
    });
    method(proto, "valueOf", |this, _args| Ok(this.clone()));
    accessor(proto, "shape", |this, _args| match this {
        Value::Object(o) => Ok(Value::Number(o.shape_id() as f64)),
        _ => Ok(Value::Undefined),
    });
}

// ---------------------------------------------------------------------
// Function.prototype
// ---------------------------------------------------------------------

fn install_function_prototype(proto: &GcRef<JsObject>) {
    method(proto, "toString", |this, _args| {
        let _ = this;
        Ok(Value::string("function () { [native code] }"))
    });
}

// ---------------------------------------------------------------------
// Array.prototype
// ---------------------------------------------------------------------

fn install_array_prototype(proto: &GcRef<JsObject>) {
    method(proto, "push", |this, args| {
        let obj = require_object(this, "push")?;
        let mut len = 0;
        for v in args {
            len = obj.array_push(v.clone());
        }
        Ok(Value::Number(len as f64))
    });
    method(proto, "pop", |this, _args| {
        let obj = require_object(this, "pop")?;
        let len = obj.array_length();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let last = obj.array_get(len - 1).unwrap_or(Value::Undefined);
        obj.set_array_length(len - 1);
        Ok(last)
    });
    method(proto, "shift", |this, _args| {
        let obj = require_object(this, "shift")?;
        let len = obj.array_length();
        if len == 0 {
            return Ok(Value::Undefined);
        }
        let first = obj.array_get(0).unwrap_or(Value::Undefined);
        let rest: Vec<Value> = (1..len).map(|i| obj.array_get(i).unwrap_or(Value::Undefined)).collect();
        obj.set_array_length(0);
        for v in rest {
            obj.array_push(v);
        }
        Ok(first)
    });
    method(proto, "slice", |this, args| {
        let obj = require_object(this, "slice")?;
        let len = obj.array_length() as i64;
        let start = normalize_index(arg(args, 0), len, 0);
        let end = normalize_index(arg(args, 1), len, len);
        let out = GcRef::new(JsObject::new_array());
        for i in start..end.max(start) {
            out.array_push(obj.array_get(i as u32).unwrap_or(Value::Undefined));
        }
        Ok(Value::Object(out))
    });
    method(proto, "concat", |this, args| {
        let obj = require_object(this, "concat")?;
        let out = GcRef::new(JsObject::new_array());
        for v in obj.array_iter() {
            out.array_push(v);
        }
        for a in args {
            if let Value::Object(o) = a {
                if o.is_array() {
                    for v in o.array_iter() {
                        out.array_push(v);
                    }
                    continue;
                }
            }
            out.array_push(a.clone());
        }
        Ok(Value::Object(out))
    });
    method(proto, "join", |this, args| {
        let obj = require_object(this, "join")?;
        let sep_val = arg(args, 0);
        let sep = if sep_val.is_undefined() { ",".to_string() } else { sep_val.to_string() };
        let parts: Vec<String> = obj
            .array_iter()
            .into_iter()
            .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
            .collect();
        Ok(Value::string(&parts.join(&sep)))
    });
    method(proto, "indexOf", |this, args| {
        let obj = require_object(this, "indexOf")?;
        let needle = arg(args, 0);
        for (i, v) in obj.array_iter().into_iter().enumerate() {
            if v.strict_equals(&needle) {
                return Ok(Value::Number(i as f64));
            }
        }
        Ok(Value::Number(-1.0))
    });
    method(proto, "includes", |this, args| {
        let obj = require_object(this, "includes")?;
        let needle = arg(args, 0);
        Ok(Value::Boolean(obj.array_iter().into_iter().any(|v| v.same_value(&needle))))
    });
    method(proto, "reverse", |this, _args| {
        let obj = require_object(this, "reverse")?;
        let mut items = obj.array_iter();
        items.reverse();
        let len = items.len() as u32;
        for (i, v) in items.into_iter().enumerate() {
            obj.array_set(i as u32, v);
        }
        obj.set_array_length(len);
        Ok(this.clone())
    });
    method(proto, "toString", |this, _args| {
        let obj = require_object(this, "toString")?;
        let parts: Vec<String> = obj
            .array_iter()
            .into_iter()
            .map(|v| if v.is_nullish() { String::new() } else { v.to_string() })
            .collect();
        Ok(Value::string(&parts.join(",")))
    });
    method_with_call(proto, "forEach", |call, this, args| {
        let obj = require_object(this, "forEach")?;
        let f = arg(args, 0);
        for (i, v) in obj.array_iter().into_iter().enumerate() {
            call(&f, &Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?;
        }
        Ok(Value::Undefined)
    });
    method_with_call(proto, "map", |call, this, args| {
        let obj = require_object(this, "map")?;
        let f = arg(args, 0);
        let out = GcRef::new(JsObject::new_array());
        for (i, v) in obj.array_iter().into_iter().enumerate() {
            out.array_push(call(&f, &Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?);
        }
        Ok(Value::Object(out))
    });
    method_with_call(proto, "filter", |call, this, args| {
        let obj = require_object(this, "filter")?;
        let f = arg(args, 0);
        let out = GcRef::new(JsObject::new_array());
        for (i, v) in obj.array_iter().into_iter().enumerate() {
            if call(&f, &Value::Undefined, &[v.clone(), Value::Number(i as f64), this.clone()])?.to_boolean() {
                out.array_push(v);
            }
        }
        Ok(Value::Object(out))
    });
    method_with_call(proto, "find", |call, this, args| {
        let obj = require_object(this, "find")?;
        let f = arg(args, 0);
        for (i, v) in obj.array_iter().into_iter().enumerate() {
            if call(&f, &Value::Undefined, &[v.clone(), Value::Number(i as f64), this.clone()])?.to_boolean() {
                return Ok(v);
            }
        }
        Ok(Value::Undefined)
    });
    method_with_call(proto, "some", |call, this, args| {
        let obj = require_object(this, "some")?;
        let f = arg(args, 0);
        for (i, v) in obj.array_iter().into_iter().enumerate() {
            if call(&f, &Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?.to_boolean() {
                return Ok(Value::Boolean(true));
            }
        }
        Ok(Value::Boolean(false))
    });
    method_with_call(proto, "every", |call, this, args| {
        let obj = require_object(this, "every")?;
        let f = arg(args, 0);
        for (i, v) in obj.array_iter().into_iter().enumerate() {
            if !call(&f, &Value::Undefined, &[v, Value::Number(i as f64), this.clone()])?.to_boolean() {
                return Ok(Value::Boolean(false));
            }
        }
        Ok(Value::Boolean(true))
    });
    method_with_call(proto, "reduce", |call, this, args| {
        let obj = require_object(this, "reduce")?;
        let f = arg(args, 0);
        let items = obj.array_iter();
        let mut iter = items.into_iter().enumerate();
        let mut acc = if args.len() > 1 {
            arg(args, 1)
        } else {
            match iter.next() {
                Some((_, v)) => v,
                None => return Err(VmError::type_error("Reduce of empty array with no initial value")),
            }
        };
        for (i, v) in iter {
            acc = call(&f, &Value::Undefined, &[acc, v, Value::Number(i as f64), this.clone()])?;
        }
        Ok(acc)
    });
}

fn normalize_index(v: Value, len: i64, default: i64) -> i64 {
    if v.is_undefined() {
        return default.clamp(0, len);
    }
    let n = crate::coercion::to_number(&v).unwrap_or(default as f64);
    let n = if n.is_nan() { 0.0 } else { n.trunc() };
    let idx = if n < 0.0 { (len as f64 + n).max(0.0) } else { n.min(len as f64) };
    idx as i64
}

// ---------------------------------------------------------------------
// String.prototype
// ---------------------------------------------------------------------

fn this_string(this: &Value) -> String {
    this.to_string()
}

fn install_string_prototype(proto: &GcRef<JsObject>) {
    method(proto, "toString", |this, _args| Ok(Value::string(&this_string(this))));
    method(proto, "valueOf", |this, _args| Ok(Value::string(&this_string(this))));
    method(proto, "charAt", |this, args| {
        let s = this_string(this);
        let i = crate::coercion::to_number(&arg(args, 0)).unwrap_or(0.0) as i64;
        Ok(Value::string(s.encode_utf16().nth(i.max(0) as usize).map(|u| String::from_utf16_lossy(&[u])).unwrap_or_default().as_str()))
    });
    method(proto, "charCodeAt", |this, args| {
        let s = this_string(this);
        let i = crate::coercion::to_number(&arg(args, 0)).unwrap_or(0.0) as i64;
        match s.encode_utf16().nth(i.max(0) as usize) {
            Some(u) => Ok(Value::Number(u as f64)),
            None => Ok(Value::Number(f64::NAN)),
        }
    });
    method(proto, "toUpperCase", |this, _args| Ok(Value::string(&this_string(this).to_uppercase())));
    method(proto, "toLowerCase", |this, _args| Ok(Value::string(&this_string(this).to_lowercase())));
    method(proto, "trim", |this, _args| Ok(Value::string(this_string(this).trim())));
    method(proto, "includes", |this, args| Ok(Value::Boolean(this_string(this).contains(&arg(args, 0).to_string()))));
    method(proto, "indexOf", |this, args| {
        let s = this_string(this);
        let needle = arg(args, 0).to_string();
        match s.find(&needle) {
            Some(byte_idx) => Ok(Value::Number(s[..byte_idx].encode_utf16().count() as f64)),
            None => Ok(Value::Number(-1.0)),
        }
    });
    method(proto, "slice", |this, args| {
        let s = this_string(this);
        let units: Vec<u16> = s.encode_utf16().collect();
        let len = units.len() as i64;
        let start = normalize_index(arg(args, 0), len, 0);
        let end = normalize_index(arg(args, 1), len, len);
        let slice = &units[start as usize..end.max(start) as usize];
        Ok(Value::string(&String::from_utf16_lossy(slice)))
    });
    method(proto, "concat", |this, args| {
        let mut s = this_string(this);
        for a in args {
            s.push_str(&a.to_string());
        }
        Ok(Value::string(&s))
    });
    method(proto, "repeat", |this, args| {
        let s = this_string(this);
        let n = crate::coercion::to_number(&arg(args, 0)).unwrap_or(0.0);
        if n < 0.0 || !n.is_finite() {
            return Err(VmError::range_error("Invalid count value"));
        }
        Ok(Value::string(&s.repeat(n as usize)))
    });
    method(proto, "split", |this, args| {
        let s = this_string(this);
        let out = GcRef::new(JsObject::new_array());
        let sep = arg(args, 0);
        if sep.is_undefined() {
            out.array_push(Value::string(&s));
        } else {
            let sep_str = sep.to_string();
            if sep_str.is_empty() {
                for c in s.chars() {
                    out.array_push(Value::string(&c.to_string()));
                }
            } else {
                for part in s.split(&sep_str) {
                    out.array_push(Value::string(part));
                }
            }
        }
        Ok(Value::Object(out))
    });
    method(proto, "padStart", |this, args| pad(this, args, true));
    method(proto, "padEnd", |this, args| pad(this, args, false));
}

fn pad(this: &Value, args: &[Value], start: bool) -> VmResult<Value> {
    let s = this_string(this);
    let target_len = crate::coercion::to_number(&arg(args, 0)).unwrap_or(0.0).max(0.0) as usize;
    let pad_str_val = arg(args, 1);
    let pad_str = if pad_str_val.is_undefined() { " ".to_string() } else { pad_str_val.to_string() };
    let current_len = s.encode_utf16().count();
    if pad_str.is_empty() || current_len >= target_len {
        return Ok(Value::string(&s));
    }
    let needed = target_len - current_len;
    let mut filler = String::new();
    while filler.encode_utf16().count() < needed {
        filler.push_str(&pad_str);
    }
    let filler: String = filler.encode_utf16().take(needed).collect::<Vec<_>>().pipe(|u| String::from_utf16_lossy(&u));
    Ok(Value::string(&if start { format!("{filler}{s}") } else { format!("{s}{filler}") }))
}

trait Pipe: Sized {
    fn pipe<R>(self, f: impl FnOnce(Self) -> R) -> R {
        f(self)
    }
}
impl<T> Pipe for T {}

// ---------------------------------------------------------------------
// Number.prototype / Boolean.prototype
// ---------------------------------------------------------------------

fn install_number_prototype(proto: &GcRef<JsObject>) {
    method(proto, "toString", |this, args| {
        let n = match this {
            Value::Number(n) => *n,
            _ => return Err(VmError::type_error("Number.prototype.toString called on non-number")),
        };
        let radix = arg(args, 0);
        if radix.is_undefined() || matches!(&radix, Value::Number(r) if *r == 10.0) {
            return Ok(Value::string(&kestrel_core::format::number_to_string(n)));
        }
        let radix = crate::coercion::to_number(&radix).unwrap_or(10.0) as u32;
        if !(2..=36).contains(&radix) || n.fract() != 0.0 {
            return Ok(Value::string(&kestrel_core::format::number_to_string(n)));
        }
        Ok(Value::string(&to_radix_string(n as i64, radix)))
    });
    method(proto, "valueOf", |this, _args| match this {
        Value::Number(_) => Ok(this.clone()),
        _ => Err(VmError::type_error("Number.prototype.valueOf called on non-number")),
    });
    method(proto, "toFixed", |this, args| {
        let n = match this {
            Value::Number(n) => *n,
            _ => return Err(VmError::type_error("Number.prototype.toFixed called on non-number")),
        };
        let digits = crate::coercion::to_number(&arg(args, 0)).unwrap_or(0.0) as usize;
        Ok(Value::string(&format!("{n:.digits$}")))
    });
}

fn to_radix_string(mut n: i64, radix: u32) -> String {
    if n == 0 {
        return "0".to_string();
    }
    let negative = n < 0;
    if negative {
        n = -n;
    }
    let digits = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut out = Vec::new();
    while n > 0 {
        out.push(digits[(n as u32 % radix) as usize]);
        n /= radix as i64;
    }
    if negative {
        out.push(b'-');
    }
    out.reverse();
    String::from_utf8(out).unwrap()
}

fn install_boolean_prototype(proto: &GcRef<JsObject>) {
    method(proto, "toString", |this, _args| Ok(Value::string(if this.to_boolean() { "true" } else { "false" })));
    method(proto, "valueOf", |this, _args| Ok(this.clone()));
}

// ---------------------------------------------------------------------
// Error.prototype
// ---------------------------------------------------------------------

fn install_error_prototype(proto: &GcRef<JsObject>) {
    data(proto, "name", Value::string("Error"));
    data(proto, "message", Value::string(""));
    method(proto, "toString", |this, _args| {
        let obj = require_object(this, "toString")?;
        let name = obj.get(&PropertyKey::string("name"));
        let message = obj.get(&PropertyKey::string("message"));
        let message_str = message.to_string();
        if message_str.is_empty() {
            Ok(Value::string(&name.to_string()))
        } else {
            Ok(Value::string(&format!("{name}: {message_str}")))
        }
    });
}

// ---------------------------------------------------------------------
// console
// ---------------------------------------------------------------------

fn make_console() -> Value {
    let console = GcRef::new(JsObject::new());
    method(&console, "log", |_this, args| {
        println!("{}", format_args_for_console(args));
        Ok(Value::Undefined)
    });
    method(&console, "info", |_this, args| {
        println!("{}", format_args_for_console(args));
        Ok(Value::Undefined)
    });
    method(&console, "debug", |_this, args| {
        println!("{}", format_args_for_console(args));
        Ok(Value::Undefined)
    });
    method(&console, "warn", |_this, args| {
        eprintln!("{}", format_args_for_console(args));
        Ok(Value::Undefined)
    });
    method(&console, "error", |_this, args| {
        eprintln!("{}", format_args_for_console(args));
        Ok(Value::Undefined)
    });
    Value::Object(console)
}

fn format_args_for_console(args: &[Value]) -> String {
    args.iter().map(|v| v.to_string()).collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------
// Math
// ---------------------------------------------------------------------

thread_local! {
    static RANDOM_STATE: Cell<u64> = Cell::new(0x9E3779B97F4A7C15);
}

fn next_random() -> f64 {
    RANDOM_STATE.with(|state| {
        let mut x = state.get();
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        state.set(x);
        (x >> 11) as f64 / (1u64 << 53) as f64
    })
}

fn make_math() -> Value {
    let math = GcRef::new(JsObject::new());
    data(&math, "PI", Value::Number(std::f64::consts::PI));
    data(&math, "E", Value::Number(std::f64::consts::E));
    data(&math, "LN2", Value::Number(std::f64::consts::LN_2));
    data(&math, "LN10", Value::Number(std::f64::consts::LN_10));
    method(&math, "abs", |_t, a| Ok(Value::Number(num0(a).abs())));
    method(&math, "floor", |_t, a| Ok(Value::Number(num0(a).floor())));
    method(&math, "ceil", |_t, a| Ok(Value::Number(num0(a).ceil())));
    method(&math, "round", |_t, a| Ok(Value::Number((num0(a) + 0.5).floor())));
    method(&math, "trunc", |_t, a| Ok(Value::Number(num0(a).trunc())));
    method(&math, "sqrt", |_t, a| Ok(Value::Number(num0(a).sqrt())));
    method(&math, "cbrt", |_t, a| Ok(Value::Number(num0(a).cbrt())));
    method(&math, "sign", |_t, a| Ok(Value::Number(num0(a).signum())));
    method(&math, "pow", |_t, a| Ok(Value::Number(num0(a).powf(num_at(a, 1)))));
    method(&math, "random", |_t, _a| Ok(Value::Number(next_random())));
    method(&math, "max", |_t, a| {
        Ok(Value::Number(a.iter().map(|v| crate::coercion::to_number(v).unwrap_or(f64::NAN)).fold(f64::NEG_INFINITY, f64::max)))
    });
    method(&math, "min", |_t, a| {
        Ok(Value::Number(a.iter().map(|v| crate::coercion::to_number(v).unwrap_or(f64::NAN)).fold(f64::INFINITY, f64::min)))
    });
    method(&math, "log", |_t, a| Ok(Value::Number(num0(a).ln())));
    method(&math, "log2", |_t, a| Ok(Value::Number(num0(a).log2())));
    method(&math, "log10", |_t, a| Ok(Value::Number(num0(a).log10())));
    method(&math, "sin", |_t, a| Ok(Value::Number(num0(a).sin())));
    method(&math, "cos", |_t, a| Ok(Value::Number(num0(a).cos())));
    method(&math, "tan", |_t, a| Ok(Value::Number(num0(a).tan())));
    Value::Object(math)
}

fn num0(args: &[Value]) -> f64 {
    crate::coercion::to_number(&arg(args, 0)).unwrap_or(f64::NAN)
}

fn num_at(args: &[Value], i: usize) -> f64 {
    crate::coercion::to_number(&arg(args, i)).unwrap_or(f64::NAN)
}

// ---------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------

fn make_json() -> Value {
    let json = GcRef::new(JsObject::new());
    method_with_call(&json, "parse", |call, _this, args| {
        let text = arg(args, 0).to_string();
        let reviver = arg(args, 1);
        let opts = kestrel_json::JsonParseOptions::default();
        if reviver.is_callable() {
            kestrel_json::parse(&text, Some((&reviver, call)), opts)
        } else {
            kestrel_json::parse(&text, None, opts)
        }
    });
    method_with_call(&json, "stringify", |call, _this, args| {
        let value = arg(args, 0);
        let replacer_arg = arg(args, 1);
        let replacer = match &replacer_arg {
            Value::Object(o) if o.is_callable() => Some(kestrel_json::Replacer::Function(&replacer_arg)),
            Value::Object(o) if o.is_array() => Some(kestrel_json::Replacer::AllowList(
                o.array_iter().into_iter().map(|v| v.to_string()).collect(),
            )),
            _ => None,
        };
        let space_arg = arg(args, 2);
        let space_string;
        let space = match &space_arg {
            Value::Number(n) => {
                let count = (*n as usize).min(10);
                space_string = " ".repeat(count);
                if space_string.is_empty() { None } else { Some(space_string.as_str()) }
            }
            Value::String(_) => {
                space_string = space_arg.to_string();
                if space_string.is_empty() { None } else { Some(space_string.as_str()) }
            }
            _ => None,
        };
        kestrel_json::stringify(&value, replacer, space, call)
    });
    Value::Object(json)
}

// ---------------------------------------------------------------------
// Object / Array / Function / String / Number / Boolean constructors
// ---------------------------------------------------------------------

fn make_ctor(
    prototype: &GcRef<JsObject>,
    call_impl: impl Fn(&Value, &[Value]) -> VmResult<Value> + Send + Sync + 'static,
) -> GcRef<JsObject> {
    let ctor = GcRef::new(JsObject::new_native_function(call_impl));
    ctor.set_construct_prototype(Some(prototype.clone()));
    ctor.set(PropertyKey::string("prototype"), Value::Object(prototype.clone()));
    prototype.set(PropertyKey::string("constructor"), Value::Object(ctor.clone()));
    ctor
}

fn make_object_ctor(object_prototype: &GcRef<JsObject>, array_prototype: &GcRef<JsObject>) -> Value {
    let ctor = make_ctor(object_prototype, |_this, args| match arg(args, 0) {
        Value::Object(o) => Ok(Value::Object(o)),
        _ => Ok(Value::Object(GcRef::new(JsObject::new()))),
    });
    let array_prototype = array_prototype.clone();
    method(&ctor, "keys", move |_this, args| {
        keys_values_entries(args, KvMode::Keys)
    });
    method(&ctor, "values", |_this, args| keys_values_entries(args, KvMode::Values));
    let ap = array_prototype.clone();
    method(&ctor, "entries", move |_this, args| {
        let out = keys_values_entries(args, KvMode::Entries)?;
        if let Value::Object(o) = &out {
            o.set_prototype(Some(ap.clone()));
        }
        Ok(out)
    });
    method(&ctor, "is", |_this, args| Ok(Value::Boolean(arg(args, 0).same_value(&arg(args, 1)))));
    method(&ctor, "freeze", |_this, args| {
        if let Value::Object(o) = arg(args, 0) {
            o.prevent_extensions();
            for key in o.own_enumerable_keys() {
                if let Some(desc) = o.get_own_descriptor(&key) {
                    o.define_property(key, desc, SlotKind::Constant, Attributes::frozen());
                }
            }
        }
        Ok(arg(args, 0))
    });
    method(&ctor, "isFrozen", |_this, args| match arg(args, 0) {
        Value::Object(o) => {
            let shape = o.shape();
            let all_frozen = shape.own_keys().all(|k| {
                shape
                    .property_named(k)
                    .map(|p| !p.attributes.writable && !p.attributes.configurable)
                    .unwrap_or(true)
            });
            Ok(Value::Boolean(!o.is_extensible() && all_frozen))
        }
        _ => Ok(Value::Boolean(true)),
    });
    method(&ctor, "getPrototypeOf", |_this, args| match arg(args, 0) {
        Value::Object(o) => Ok(o.prototype().map(Value::Object).unwrap_or(Value::Null)),
        _ => Ok(Value::Null),
    });
    method(&ctor, "defineProperty", |_this, args| {
        let obj = match arg(args, 0) {
            Value::Object(o) => o,
            _ => return Err(VmError::type_error("Object.defineProperty called on non-object")),
        };
        let key = crate::coercion::to_property_key(&arg(args, 1));
        let descriptor_obj = match arg(args, 2) {
            Value::Object(o) => o,
            _ => return Err(VmError::type_error("Property description must be an object")),
        };
        let value = descriptor_obj.get(&PropertyKey::string("value"));
        let get = descriptor_obj.get(&PropertyKey::string("get"));
        let set = descriptor_obj.get(&PropertyKey::string("set"));
        let writable = descriptor_obj.get(&PropertyKey::string("writable")).to_boolean();
        let enumerable = descriptor_obj.get(&PropertyKey::string("enumerable")).to_boolean();
        let configurable = descriptor_obj.get(&PropertyKey::string("configurable")).to_boolean();
        let attrs = Attributes { writable, enumerable, configurable };
        if get.is_callable() || set.is_callable() {
            let get = if get.is_callable() { Some(get) } else { None };
            let set = if set.is_callable() { Some(set) } else { None };
            obj.define_property(key, PropertyDescriptor::Accessor { get, set }, SlotKind::Accessor, attrs);
        } else {
            obj.define_property(key, PropertyDescriptor::Data { value }, SlotKind::Data, attrs);
        }
        Ok(Value::Object(obj))
    });
    Value::Object(ctor)
}

enum KvMode {
    Keys,
    Values,
    Entries,
}

fn keys_values_entries(args: &[Value], mode: KvMode) -> VmResult<Value> {
    let obj = match arg(args, 0) {
        Value::Object(o) => o,
        _ => return Err(VmError::type_error("Object.keys/values/entries called on non-object")),
    };
    let out = GcRef::new(JsObject::new_array());
    for key in obj.own_enumerable_keys() {
        if matches!(key, PropertyKey::Symbol(_)) {
            continue;
        }
        let name = match &key {
            PropertyKey::String(s) => s.as_str().to_string(),
            PropertyKey::Index(i) => i.to_string(),
            PropertyKey::Symbol(_) => unreachable!(),
        };
        let value = obj.get(&key);
        push_kv(&out, &mode, &name, value);
    }
    Ok(Value::Object(out))
}

fn push_kv(out: &GcRef<JsObject>, mode: &KvMode, name: &str, value: Value) {
    match mode {
        KvMode::Keys => out.array_push(Value::string(name)),
        KvMode::Values => out.array_push(value),
        KvMode::Entries => {
            let pair = GcRef::new(JsObject::new_array());
            pair.array_push(Value::string(name));
            pair.array_push(value);
            out.array_push(Value::Object(pair));
        }
    }
}

fn make_array_ctor(array_prototype: &GcRef<JsObject>) -> Value {
    let ctor = make_ctor(array_prototype, |_this, args| {
        let arr = GcRef::new(JsObject::new_array());
        if args.len() == 1 {
            if let Value::Number(n) = &args[0] {
                arr.set_array_length(*n as u32);
                return Ok(Value::Object(arr));
            }
        }
        for a in args {
            arr.array_push(a.clone());
        }
        Ok(Value::Object(arr))
    });
    method(&ctor, "isArray", |_this, args| {
        Ok(Value::Boolean(matches!(arg(args, 0), Value::Object(o) if o.is_array())))
    });
    Value::Object(ctor)
}

fn make_function_ctor(function_prototype: &GcRef<JsObject>) -> Value {
    let ctor = make_ctor(function_prototype, |_this, _args| {
        Err(VmError::type_error("Function constructor is not supported"))
    });
    Value::Object(ctor)
}

fn make_string_ctor(string_prototype: &GcRef<JsObject>) -> Value {
    let ctor = make_ctor(string_prototype, |_this, args| {
        Ok(Value::string(&arg(args, 0).to_string()))
    });
    method(&ctor, "fromCharCode", |_this, args| {
        let units: Vec<u16> = args.iter().map(|v| crate::coercion::to_number(v).unwrap_or(0.0) as u16).collect();
        Ok(Value::string(&String::from_utf16_lossy(&units)))
    });
    Value::Object(ctor)
}

fn make_number_ctor(number_prototype: &GcRef<JsObject>) -> Value {
    let ctor = make_ctor(number_prototype, |_this, args| {
        Ok(Value::Number(crate::coercion::to_number(&arg(args, 0)).unwrap_or(0.0)))
    });
    data(&ctor, "MAX_SAFE_INTEGER", Value::Number(9007199254740991.0));
    data(&ctor, "MIN_SAFE_INTEGER", Value::Number(-9007199254740991.0));
    data(&ctor, "EPSILON", Value::Number(f64::EPSILON));
    data(&ctor, "POSITIVE_INFINITY", Value::Number(f64::INFINITY));
    data(&ctor, "NEGATIVE_INFINITY", Value::Number(f64::NEG_INFINITY));
    data(&ctor, "NaN", Value::Number(f64::NAN));
    method(&ctor, "isFinite", |_this, args| Ok(Value::Boolean(matches!(arg(args, 0), Value::Number(n) if n.is_finite()))));
    method(&ctor, "isNaN", |_this, args| Ok(Value::Boolean(matches!(arg(args, 0), Value::Number(n) if n.is_nan()))));
    method(&ctor, "isInteger", |_this, args| Ok(Value::Boolean(matches!(arg(args, 0), Value::Number(n) if n.is_finite() && n.fract() == 0.0))));
    method(&ctor, "parseFloat", |_this, args| {
        let s = arg(args, 0).to_string();
        let trimmed = s.trim_start();
        let end = trimmed
            .char_indices()
            .take_while(|(i, c)| c.is_ascii_digit() || *c == '.' || (*i == 0 && (*c == '-' || *c == '+')) || *c == 'e' || *c == 'E')
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(0);
        Ok(Value::Number(trimmed[..end].parse().unwrap_or(f64::NAN)))
    });
    method(&ctor, "parseInt", |_this, args| {
        let s = arg(args, 0).to_string();
        let radix = crate::coercion::to_number(&arg(args, 1)).unwrap_or(10.0) as u32;
        let radix = if radix == 0 { 10 } else { radix };
        let trimmed = s.trim();
        let (sign, rest) = match trimmed.strip_prefix('-') {
            Some(r) => (-1.0, r),
            None => (1.0, trimmed.strip_prefix('+').unwrap_or(trimmed)),
        };
        let end = rest.char_indices().take_while(|(_, c)| c.is_digit(radix)).count();
        if end == 0 {
            return Ok(Value::Number(f64::NAN));
        }
        match i64::from_str_radix(&rest[..end], radix) {
            Ok(n) => Ok(Value::Number(sign * n as f64)),
            Err(_) => Ok(Value::Number(f64::NAN)),
        }
    });
    Value::Object(ctor)
}

fn make_boolean_ctor(boolean_prototype: &GcRef<JsObject>) -> Value {
    let ctor = make_ctor(boolean_prototype, |_this, args| Ok(Value::Boolean(arg(args, 0).to_boolean())));
    Value::Object(ctor)
}

fn make_error_ctor(kind: &'static str, error_prototype: &GcRef<JsObject>) -> Value {
    let proto_for_instances = error_prototype.clone();
    let ctor = make_ctor(error_prototype, move |_this, args| {
        let obj = GcRef::new(JsObject::new());
        obj.set_prototype(Some(proto_for_instances.clone()));
        let message = arg(args, 0);
        let message = if message.is_undefined() { String::new() } else { message.to_string() };
        obj.set(PropertyKey::string("name"), Value::string(kind));
        obj.set(PropertyKey::string("message"), Value::string(&message));
        let stack = if message.is_empty() { kind.to_string() } else { format!("{kind}: {message}") };
        obj.set(PropertyKey::string("stack"), Value::string(&stack));
        Ok(Value::Object(obj))
    });
    Value::Object(ctor)
}
