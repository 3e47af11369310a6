//! `JSON.stringify`: a depth-first walk producing JSON text, with
//! `toJSON`, `replacer` (allow-list or transform function), `space`
//! indentation, and path-based circular-reference detection grounded on
//! `otter-vm-core::intrinsics_impl::json`'s `CircularTracker`.

use crate::CallHook;
use kestrel_core::{JsObject, PropertyKey, Value, VmError, VmResult};
use kestrel_gc::GcRef;
use std::collections::HashSet;

/// How `stringify` filters/transforms properties before serializing them.
pub enum Replacer<'a> {
    /// `JSON.stringify(v, ["a", "b"])`: only these own keys are visited,
    /// and array elements are still visited in full.
    AllowList(Vec<String>),
    /// `JSON.stringify(v, fn)`: called as `fn.call(holder, key, value)` for
    /// every key (including the synthetic `""` root key), its return value
    /// replacing the property before the rest of the algorithm runs.
    Function(&'a Value),
}

const MAX_SPACE: usize = 10;

/// `JSON.stringify(value, replacer?, space?)`. Returns `Value::Undefined`
/// when the top-level value itself serializes to nothing (a function,
/// `undefined`, or a symbol), matching `JSON.stringify(undefined) ===
/// undefined` rather than throwing.
pub fn stringify(value: &Value, replacer: Option<Replacer<'_>>, space: Option<&str>, call: &mut CallHook<'_>) -> VmResult<Value> {
    let mut ctx = StringifyCtx {
        replacer,
        seen: HashSet::new(),
        indent_unit: normalize_space(space),
    };
    let holder = Value::Undefined;
    let root_key = PropertyKey::string("");
    let transformed = ctx.apply_replacer(&holder, &root_key, value.clone(), call)?;
    match ctx.serialize(&transformed, 0, call)? {
        Some(text) => Ok(Value::string(&text)),
        None => Ok(Value::Undefined),
    }
}

fn normalize_space(space: Option<&str>) -> Option<String> {
    space
        .map(|s| {
            let n = s.chars().count().min(MAX_SPACE);
            s.chars().take(n).collect::<String>()
        })
        .filter(|s: &String| !s.is_empty())
}

struct StringifyCtx<'a> {
    replacer: Option<Replacer<'a>>,
    seen: HashSet<usize>,
    indent_unit: Option<String>,
}

impl<'a> StringifyCtx<'a> {
    fn apply_replacer(&mut self, holder: &Value, key: &PropertyKey, value: Value, call: &mut CallHook<'_>) -> VmResult<Value> {
        let value = call_to_json(&value, key, call)?;
        match &self.replacer {
            Some(Replacer::Function(f)) => {
                let key_str = Value::string(&property_key_display(key));
                call(f, holder, &[key_str, value])
            }
            _ => Ok(value),
        }
    }

    /// Returns `None` when the value has no JSON representation (function,
    /// `undefined`, symbol) — the caller either omits the property (inside
    /// an object) or skips the element, substituting `null` (inside an
    /// array), or returns `undefined` (top level).
    fn serialize(&mut self, value: &Value, depth: usize, call: &mut CallHook<'_>) -> VmResult<Option<String>> {
        match value {
            Value::Undefined => Ok(None),
            Value::Null => Ok(Some("null".to_string())),
            Value::Boolean(b) => Ok(Some(b.to_string())),
            Value::Number(n) => {
                if n.is_finite() {
                    Ok(Some(kestrel_core::format::number_to_string(*n)))
                } else {
                    Ok(Some("null".to_string()))
                }
            }
            Value::String(s) => Ok(Some(quote(s.as_str()))),
            Value::BigInt(_) => Err(VmError::type_error("Do not know how to serialize a BigInt")),
            Value::Symbol(_) => Ok(None),
            Value::Object(obj) => {
                if obj.is_callable() {
                    return Ok(None);
                }
                let ptr = obj.as_ptr() as usize;
                if self.seen.contains(&ptr) {
                    return Err(VmError::type_error("Converting circular structure to JSON"));
                }
                self.seen.insert(ptr);
                let result = if obj.is_array() {
                    self.serialize_array(obj, depth, call)
                } else {
                    self.serialize_object(value, obj, depth, call)
                };
                self.seen.remove(&ptr);
                result.map(Some)
            }
        }
    }

    fn serialize_array(&mut self, obj: &GcRef<JsObject>, depth: usize, call: &mut CallHook<'_>) -> VmResult<String> {
        let len = obj.array_length();
        let holder = Value::Object(obj.clone());
        let mut items = Vec::with_capacity(len as usize);
        for i in 0..len {
            let element = obj.array_get(i).unwrap_or(Value::Undefined);
            let key = PropertyKey::index(i);
            let transformed = self.apply_replacer(&holder, &key, element, call)?;
            let text = self.serialize(&transformed, depth + 1, call)?.unwrap_or_else(|| "null".to_string());
            items.push(text);
        }
        Ok(self.wrap("[", "]", items, depth))
    }

    fn serialize_object(&mut self, holder: &Value, obj: &GcRef<JsObject>, depth: usize, call: &mut CallHook<'_>) -> VmResult<String> {
        let keys = self.keys_to_visit(obj);
        let mut items = Vec::new();
        for key in keys {
            let raw = obj.get(&key);
            let transformed = self.apply_replacer(holder, &key, raw, call)?;
            if let Some(text) = self.serialize(&transformed, depth + 1, call)? {
                let key_text = quote(&property_key_display(&key));
                let sep = if self.indent_unit.is_some() { ": " } else { ":" };
                items.push(format!("{key_text}{sep}{text}"));
            }
        }
        Ok(self.wrap("{", "}", items, depth))
    }

    fn keys_to_visit(&self, obj: &GcRef<JsObject>) -> Vec<PropertyKey> {
        match &self.replacer {
            Some(Replacer::AllowList(names)) => names.iter().map(|n| PropertyKey::string(n)).collect(),
            _ => obj.own_enumerable_keys(),
        }
    }

    fn wrap(&self, open: &str, close: &str, items: Vec<String>, depth: usize) -> String {
        if items.is_empty() {
            return format!("{open}{close}");
        }
        match &self.indent_unit {
            None => format!("{open}{}{close}", items.join(",")),
            Some(unit) => {
                let inner_indent = unit.repeat(depth + 1);
                let outer_indent = unit.repeat(depth);
                let body = items
                    .iter()
                    .map(|item| format!("{inner_indent}{item}"))
                    .collect::<Vec<_>>()
                    .join(",\n");
                format!("{open}\n{body}\n{outer_indent}{close}")
            }
        }
    }
}

/// Invoke `toJSON` when a value provides one, matching `SerializeJSONProperty`'s
/// first step (`if (IsCallable(value.toJSON)) value = value.toJSON(key)`).
fn call_to_json(value: &Value, key: &PropertyKey, call: &mut CallHook<'_>) -> VmResult<Value> {
    let Value::Object(obj) = value else {
        return Ok(value.clone());
    };
    let to_json = obj.get(&PropertyKey::string("toJSON"));
    if to_json.is_callable() {
        let key_str = Value::string(&property_key_display(key));
        call(&to_json, value, &[key_str])
    } else {
        Ok(value.clone())
    }
}

fn property_key_display(key: &PropertyKey) -> String {
    match key {
        PropertyKey::String(s) => s.as_str().to_string(),
        PropertyKey::Index(i) => i.to_string(),
        PropertyKey::Symbol(_) => String::new(),
    }
}

fn quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\u{8}' => out.push_str("\\b"),
            '\u{c}' => out.push_str("\\f"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop_call(_callee: &Value, _this: &Value, _args: &[Value]) -> VmResult<Value> {
        Ok(Value::Undefined)
    }

    #[test]
    fn stringifies_object_and_array() {
        let obj = GcRef::new(JsObject::new());
        obj.set(PropertyKey::string("a"), Value::Number(1.0));
        let arr = GcRef::new(JsObject::new_array());
        arr.array_push(Value::Number(2.0));
        obj.set(PropertyKey::string("b"), Value::Object(arr));
        let mut call = noop_call;
        let result = stringify(&Value::Object(obj), None, None, &mut call).unwrap();
        assert_eq!(result.to_string(), r#"{"a":1,"b":[2]}"#);
    }

    #[test]
    fn drops_undefined_and_function_valued_properties() {
        let obj = GcRef::new(JsObject::new());
        obj.set(PropertyKey::string("a"), Value::Undefined);
        obj.set(PropertyKey::string("b"), Value::Number(1.0));
        let mut call = noop_call;
        let result = stringify(&Value::Object(obj), None, None, &mut call).unwrap();
        assert_eq!(result.to_string(), r#"{"b":1}"#);
    }

    #[test]
    fn non_finite_numbers_become_null() {
        let mut call = noop_call;
        let result = stringify(&Value::Number(f64::NAN), None, None, &mut call).unwrap();
        assert_eq!(result.to_string(), "null");
    }

    #[test]
    fn detects_circular_reference() {
        let obj = GcRef::new(JsObject::new());
        obj.set(PropertyKey::string("self"), Value::Object(obj.clone()));
        let mut call = noop_call;
        assert!(stringify(&Value::Object(obj), None, None, &mut call).is_err());
    }
}
