//! ECMAScript abstract operations: `ToPrimitive`, `ToNumber`, `ToString`,
//! `ToBoolean` (already on `Value`), `ToInt32`, `ToUint32`, loose (`==`)
//! equality, and property-key coercion (spec.md §4.3).
//!
//! Grounded on `otter-vm-core::interpreter`'s `PreferredType`/`Numeric`
//! split for `ToPrimitive` and its abstract-equality recursion-depth
//! guard (`MAX_ABSTRACT_EQUAL_DEPTH`).

use kestrel_core::{PropertyKey, Value, VmError, VmResult};

/// Hint passed to `ToPrimitive` / a `Symbol.toPrimitive`-equivalent
/// protocol. `valueOf`/`toString` are tried in the order this hint
/// implies.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum PreferredType {
    Default,
    Number,
    String,
}

/// Guards against unbounded recursion through a malicious/cyclic
/// `valueOf`/`toString` implementation during `==`.
const MAX_ABSTRACT_EQUAL_DEPTH: usize = 128;

/// `ToPrimitive(value, hint)`: objects reduce via `valueOf`/`toString`
/// (order depends on hint); everything else is already primitive.
pub fn to_primitive(
    value: &Value,
    hint: PreferredType,
    call: &mut dyn FnMut(&Value, &Value, &[Value]) -> VmResult<Value>,
) -> VmResult<Value> {
    let Value::Object(obj) = value else { return Ok(value.clone()) };
    let method_names: [&str; 2] = match hint {
        PreferredType::String => ["toString", "valueOf"],
        PreferredType::Number | PreferredType::Default => ["valueOf", "toString"],
    };
    for name in method_names {
        let method = obj.get(&PropertyKey::string(name));
        if method.is_callable() {
            let result = call(&method, value, &[])?;
            if !matches!(result, Value::Object(_)) {
                return Ok(result);
            }
        }
    }
    Err(VmError::type_error("Cannot convert object to primitive value"))
}

/// `ToNumber(value)`. Objects must already have been reduced by
/// `to_primitive` — callers that might see an object should call that
/// first since this needs the ability to invoke `valueOf`.
pub fn to_number(value: &Value) -> VmResult<f64> {
    match value {
        Value::Undefined => Ok(f64::NAN),
        Value::Null => Ok(0.0),
        Value::Boolean(b) => Ok(if *b { 1.0 } else { 0.0 }),
        Value::Number(n) => Ok(*n),
        Value::String(s) => Ok(string_to_number(s.as_str())),
        Value::BigInt(_) => Err(VmError::type_error("Cannot convert a BigInt value to a number")),
        Value::Symbol(_) => Err(VmError::type_error("Cannot convert a Symbol value to a number")),
        Value::Object(_) => Err(VmError::internal("to_number called on an un-reduced object")),
    }
}

fn string_to_number(s: &str) -> f64 {
    let trimmed = s.trim_matches(|c: char| c.is_whitespace());
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    if let Some(oct) = trimmed.strip_prefix("0o").or_else(|| trimmed.strip_prefix("0O")) {
        return i64::from_str_radix(oct, 8).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    if let Some(bin) = trimmed.strip_prefix("0b").or_else(|| trimmed.strip_prefix("0B")) {
        return i64::from_str_radix(bin, 2).map(|v| v as f64).unwrap_or(f64::NAN);
    }
    if trimmed == "Infinity" || trimmed == "+Infinity" {
        return f64::INFINITY;
    }
    if trimmed == "-Infinity" {
        return f64::NEG_INFINITY;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

/// `ToString(value)`, for contexts (string concatenation, template
/// literals, property keys) that must already have non-object input
/// since objects need `to_primitive` + a `call` hook first.
pub fn to_js_string(value: &Value) -> String {
    value.to_string()
}

/// `ToInt32` (spec.md §4.3): wraps through `ToNumber` and 32-bit modular
/// reduction.
pub fn to_int32(n: f64) -> i32 {
    if !n.is_finite() {
        return 0;
    }
    let n = n.trunc();
    let m = n.rem_euclid(4294967296.0);
    if m >= 2147483648.0 {
        (m - 4294967296.0) as i32
    } else {
        m as i32
    }
}

/// `ToUint32`.
pub fn to_uint32(n: f64) -> u32 {
    if !n.is_finite() {
        return 0;
    }
    let n = n.trunc();
    n.rem_euclid(4294967296.0) as u32
}

/// `ToPropertyKey`: strings and symbols pass through; everything else is
/// stringified (numbers format without scientific notation where
/// possible, matching array-index detection in `PropertyKey::as_array_index`).
pub fn to_property_key(value: &Value) -> PropertyKey {
    match value {
        Value::Symbol(s) => PropertyKey::Symbol(s.clone()),
        Value::String(s) => PropertyKey::String(s.clone()),
        Value::Number(n) if n.fract() == 0.0 && *n >= 0.0 && *n < u32::MAX as f64 => PropertyKey::Index(*n as u32),
        other => PropertyKey::string(&to_js_string(other)),
    }
}

/// Loose (`==`) equality per the ECMAScript coercion table, with a depth
/// guard against cyclic `valueOf`/`toString` chains.
pub fn loose_equals(a: &Value, b: &Value, call: &mut dyn FnMut(&Value, &Value, &[Value]) -> VmResult<Value>) -> VmResult<bool> {
    loose_equals_inner(a, b, call, 0)
}

fn loose_equals_inner(
    a: &Value,
    b: &Value,
    call: &mut dyn FnMut(&Value, &Value, &[Value]) -> VmResult<Value>,
    depth: usize,
) -> VmResult<bool> {
    if depth > MAX_ABSTRACT_EQUAL_DEPTH {
        return Err(VmError::range_error("Maximum equality-coercion depth exceeded"));
    }
    if a.type_of() == b.type_of() {
        return Ok(a.strict_equals(b));
    }
    match (a, b) {
        (Value::Null, Value::Undefined) | (Value::Undefined, Value::Null) => Ok(true),
        (Value::Number(_), Value::String(s)) => Ok(to_number(a)? == string_to_number(s.as_str())),
        (Value::String(s), Value::Number(_)) => Ok(string_to_number(s.as_str()) == to_number(b)?),
        (Value::BigInt(n), Value::String(s)) => {
            match kestrel_core::BigInt::parse(s.as_str()) {
                Some(parsed) => Ok(**n == parsed),
                None => Ok(false),
            }
        }
        (Value::String(_), Value::BigInt(_)) => loose_equals_inner(b, a, call, depth + 1),
        (Value::Boolean(bl), _) => loose_equals_inner(&Value::Number(if *bl { 1.0 } else { 0.0 }), b, call, depth + 1),
        (_, Value::Boolean(bl)) => loose_equals_inner(a, &Value::Number(if *bl { 1.0 } else { 0.0 }), call, depth + 1),
        (Value::Number(_) | Value::String(_) | Value::BigInt(_) | Value::Symbol(_), Value::Object(_)) => {
            let prim = to_primitive(b, PreferredType::Default, call)?;
            loose_equals_inner(a, &prim, call, depth + 1)
        }
        (Value::Object(_), Value::Number(_) | Value::String(_) | Value::BigInt(_) | Value::Symbol(_)) => {
            let prim = to_primitive(a, PreferredType::Default, call)?;
            loose_equals_inner(&prim, b, call, depth + 1)
        }
        (Value::BigInt(n), Value::Number(f)) | (Value::Number(f), Value::BigInt(n)) => {
            Ok(f.fract() == 0.0 && n.to_f64_lossy() == *f)
        }
        _ => Ok(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_call(_: &Value, _: &Value, _: &[Value]) -> VmResult<Value> {
        Ok(Value::Undefined)
    }

    #[test]
    fn null_loosely_equals_undefined() {
        assert!(loose_equals(&Value::Null, &Value::Undefined, &mut noop_call).unwrap());
    }

    #[test]
    fn string_number_coerces_through_to_number() {
        assert!(loose_equals(&Value::Number(1.0), &Value::string("1"), &mut noop_call).unwrap());
    }

    #[test]
    fn to_int32_wraps_large_values() {
        assert_eq!(to_int32(4294967296.0 + 5.0), 5);
    }
}
