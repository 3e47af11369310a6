//! `JSON.parse`: a recursive-descent parser over strict JSON text (RFC
//! 8259 by default; spec.md §4.6/§6), building `kestrel_core::Value`
//! directly rather than an intermediate tree, since the reviver walk
//! (also here) needs real `Object`/array values to call back into.

use crate::CallHook;
use kestrel_core::{JsObject, PropertyKey, Value, VmError, VmResult};
use kestrel_gc::GcRef;

/// Default maximum nesting depth (spec.md §4.6: "Enforces a maximum
/// nesting depth (default 100); exceeding fails with a syntax error").
pub const MAX_NESTING_DEPTH: usize = 100;

/// Non-default parsing leniencies (spec.md §6: "Options may enable
/// trailing commas and single-quoted strings; these never apply to the
/// emitted output" — i.e. `stringify` never produces either).
#[derive(Debug, Clone, Copy)]
pub struct JsonParseOptions {
    pub allow_trailing_commas: bool,
    pub allow_single_quotes: bool,
    pub max_depth: usize,
}

impl Default for JsonParseOptions {
    fn default() -> Self {
        Self { allow_trailing_commas: false, allow_single_quotes: false, max_depth: MAX_NESTING_DEPTH }
    }
}

#[derive(Debug, thiserror::Error)]
#[error("JSON syntax error at offset {offset}: {message}")]
pub struct JsonParseError {
    pub offset: usize,
    pub message: String,
}

struct Parser<'a> {
    bytes: &'a [u8],
    pos: usize,
    opts: JsonParseOptions,
}

/// `JSON.parse(text, reviver?)`. `reviver`, if given, is applied by a
/// depth-first post-order walk (spec.md §4.6): for each key the reviver's
/// return value replaces it, or deletes it if the reviver returns
/// `undefined`.
pub fn parse(text: &str, reviver: Option<(&Value, &mut CallHook<'_>)>, opts: JsonParseOptions) -> VmResult<Value> {
    let mut parser = Parser { bytes: text.as_bytes(), pos: 0, opts };
    parser.skip_ws();
    let value = parser.parse_value(0).map_err(to_vm_error)?;
    parser.skip_ws();
    if parser.pos != parser.bytes.len() {
        return Err(to_vm_error(JsonParseError { offset: parser.pos, message: "unexpected trailing content".into() }));
    }
    match reviver {
        Some((reviver_fn, call)) => {
            let holder = GcRef::new(JsObject::new());
            holder.set(PropertyKey::string(""), value);
            apply_reviver(&Value::Object(holder.clone()), &PropertyKey::string(""), reviver_fn, call)
        }
        None => Ok(value),
    }
}

/// Walk `holder[key]`, recursively revive its children first (post-order,
/// matching the ECMAScript `InternalizeJSONProperty` algorithm), then call
/// the reviver with `(key, value)` and return its replacement.
fn apply_reviver(holder: &Value, key: &PropertyKey, reviver: &Value, call: &mut CallHook<'_>) -> VmResult<Value> {
    let Value::Object(holder_obj) = holder else {
        return Ok(holder.clone());
    };
    let value = holder_obj.get(key);
    let revived = if let Value::Object(obj) = &value {
        if obj.is_array() {
            let len = obj.array_length();
            for i in 0..len {
                let child_key = PropertyKey::Index(i);
                let new_val = apply_reviver(&value, &child_key, reviver, call)?;
                if new_val.is_undefined() {
                    obj.array_set(i, Value::Undefined);
                } else {
                    obj.array_set(i, new_val);
                }
            }
            value.clone()
        } else {
            let keys = obj.own_enumerable_keys();
            for k in keys {
                let new_val = apply_reviver(&value, &k, reviver, call)?;
                if new_val.is_undefined() {
                    obj.delete(&k);
                } else {
                    obj.set(k, new_val);
                }
            }
            value.clone()
        }
    } else {
        value
    };
    let key_str = Value::string(&property_key_display(key));
    call(reviver, holder, &[key_str, revived])
}

fn property_key_display(key: &PropertyKey) -> String {
    match key {
        PropertyKey::String(s) => s.as_str().to_string(),
        PropertyKey::Index(i) => i.to_string(),
        PropertyKey::Symbol(_) => String::new(),
    }
}

fn to_vm_error(e: JsonParseError) -> VmError {
    VmError::syntax_error(e.to_string())
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<u8> {
        self.bytes.get(self.pos).copied()
    }

    fn bump(&mut self) -> Option<u8> {
        let b = self.peek();
        if b.is_some() {
            self.pos += 1;
        }
        b
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    fn err(&self, message: impl Into<String>) -> JsonParseError {
        JsonParseError { offset: self.pos, message: message.into() }
    }

    fn expect(&mut self, byte: u8) -> Result<(), JsonParseError> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.err(format!("expected '{}'", byte as char)))
        }
    }

    fn parse_value(&mut self, depth: usize) -> Result<Value, JsonParseError> {
        if depth > self.opts.max_depth {
            return Err(self.err("maximum nesting depth exceeded"));
        }
        self.skip_ws();
        match self.peek() {
            Some(b'{') => self.parse_object(depth),
            Some(b'[') => self.parse_array(depth),
            Some(b'"') => Ok(Value::string(&self.parse_string_literal(b'"')?)),
            Some(b'\'') if self.opts.allow_single_quotes => Ok(Value::string(&self.parse_string_literal(b'\'')?)),
            Some(b't') => self.parse_literal("true", Value::Boolean(true)),
            Some(b'f') => self.parse_literal("false", Value::Boolean(false)),
            Some(b'n') => self.parse_literal("null", Value::Null),
            Some(c) if c == b'-' || c.is_ascii_digit() => self.parse_number(),
            _ => Err(self.err("unexpected token")),
        }
    }

    fn parse_literal(&mut self, text: &str, value: Value) -> Result<Value, JsonParseError> {
        if self.bytes[self.pos..].starts_with(text.as_bytes()) {
            self.pos += text.len();
            Ok(value)
        } else {
            Err(self.err(format!("expected `{text}`")))
        }
    }

    fn parse_number(&mut self) -> Result<Value, JsonParseError> {
        let start = self.pos;
        if self.peek() == Some(b'-') {
            self.pos += 1;
        }
        match self.peek() {
            Some(b'0') => self.pos += 1,
            Some(c) if c.is_ascii_digit() => {
                while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                    self.pos += 1;
                }
            }
            _ => return Err(self.err("invalid number")),
        }
        if self.peek() == Some(b'.') {
            self.pos += 1;
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.err("expected digit after decimal point"));
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            self.pos += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) {
                self.pos += 1;
            }
            if !matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                return Err(self.err("expected digit in exponent"));
            }
            while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
                self.pos += 1;
            }
        }
        let text = std::str::from_utf8(&self.bytes[start..self.pos]).unwrap();
        text.parse::<f64>().map(Value::Number).map_err(|_| self.err("invalid number"))
    }

    fn parse_string_literal(&mut self, quote: u8) -> Result<String, JsonParseError> {
        self.expect(quote)?;
        let mut out = String::new();
        loop {
            match self.bump() {
                None => return Err(self.err("unterminated string")),
                Some(c) if c == quote => break,
                Some(b'\\') => match self.bump() {
                    Some(b'"') => out.push('"'),
                    Some(b'\'') => out.push('\''),
                    Some(b'\\') => out.push('\\'),
                    Some(b'/') => out.push('/'),
                    Some(b'b') => out.push('\u{8}'),
                    Some(b'f') => out.push('\u{c}'),
                    Some(b'n') => out.push('\n'),
                    Some(b'r') => out.push('\r'),
                    Some(b't') => out.push('\t'),
                    Some(b'u') => {
                        let hi = self.parse_hex4()?;
                        if (0xD800..=0xDBFF).contains(&hi) && self.bytes[self.pos..].starts_with(b"\\u") {
                            let save = self.pos;
                            self.pos += 2;
                            let lo = self.parse_hex4()?;
                            if (0xDC00..=0xDFFF).contains(&lo) {
                                let c = 0x10000 + ((hi - 0xD800) as u32) * 0x400 + (lo - 0xDC00) as u32;
                                out.push(char::from_u32(c).unwrap_or('\u{FFFD}'));
                            } else {
                                self.pos = save;
                                out.push(char::from_u32(hi as u32).unwrap_or('\u{FFFD}'));
                            }
                        } else {
                            out.push(char::from_u32(hi as u32).unwrap_or('\u{FFFD}'));
                        }
                    }
                    _ => return Err(self.err("invalid escape sequence")),
                },
                Some(c) if c < 0x80 => out.push(c as char),
                Some(c) => {
                    // Multi-byte UTF-8 sequence: back up and decode from source text.
                    self.pos -= 1;
                    let remaining = std::str::from_utf8(&self.bytes[self.pos..]).map_err(|_| self.err("invalid UTF-8"))?;
                    let ch = remaining.chars().next().ok_or_else(|| self.err("invalid UTF-8"))?;
                    out.push(ch);
                    self.pos += ch.len_utf8();
                    let _ = c;
                }
            }
        }
        Ok(out)
    }

    fn parse_hex4(&mut self) -> Result<u16, JsonParseError> {
        if self.pos + 4 > self.bytes.len() {
            return Err(self.err("truncated unicode escape"));
        }
        let text = std::str::from_utf8(&self.bytes[self.pos..self.pos + 4]).map_err(|_| self.err("invalid unicode escape"))?;
        let value = u16::from_str_radix(text, 16).map_err(|_| self.err("invalid unicode escape"))?;
        self.pos += 4;
        Ok(value)
    }

    fn parse_array(&mut self, depth: usize) -> Result<Value, JsonParseError> {
        self.expect(b'[')?;
        let arr = GcRef::new(JsObject::new_array());
        self.skip_ws();
        if self.peek() == Some(b']') {
            self.pos += 1;
            return Ok(Value::Object(arr));
        }
        loop {
            let element = self.parse_value(depth + 1)?;
            arr.array_push(element);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.skip_ws();
                    if self.opts.allow_trailing_commas && self.peek() == Some(b']') {
                        break;
                    }
                }
                Some(b']') => break,
                _ => return Err(self.err("expected ',' or ']'")),
            }
        }
        self.expect(b']')?;
        Ok(Value::Object(arr))
    }

    fn parse_object(&mut self, depth: usize) -> Result<Value, JsonParseError> {
        self.expect(b'{')?;
        let obj = GcRef::new(JsObject::new());
        self.skip_ws();
        if self.peek() == Some(b'}') {
            self.pos += 1;
            return Ok(Value::Object(obj));
        }
        loop {
            self.skip_ws();
            let key = match self.peek() {
                Some(b'"') => self.parse_string_literal(b'"')?,
                Some(b'\'') if self.opts.allow_single_quotes => self.parse_string_literal(b'\'')?,
                _ => return Err(self.err("expected string key")),
            };
            self.skip_ws();
            self.expect(b':')?;
            let value = self.parse_value(depth + 1)?;
            obj.set(PropertyKey::string(&key), value);
            self.skip_ws();
            match self.peek() {
                Some(b',') => {
                    self.pos += 1;
                    self.skip_ws();
                    if self.opts.allow_trailing_commas && self.peek() == Some(b'}') {
                        break;
                    }
                }
                Some(b'}') => break,
                _ => return Err(self.err("expected ',' or '}'")),
            }
        }
        self.expect(b'}')?;
        Ok(Value::Object(obj))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_nested_object_and_array() {
        let v = parse(r#"{"a":1,"b":[2,3],"c":"x"}"#, None, JsonParseOptions::default()).unwrap();
        let Value::Object(o) = v else { panic!("expected object") };
        assert_eq!(o.get(&PropertyKey::string("a")), Value::Number(1.0));
        let Value::Object(arr) = o.get(&PropertyKey::string("b")) else { panic!("expected array") };
        assert_eq!(arr.array_length(), 2);
    }

    #[test]
    fn rejects_trailing_comma_by_default() {
        assert!(parse("[1,2,]", None, JsonParseOptions::default()).is_err());
    }

    #[test]
    fn allows_trailing_comma_when_enabled() {
        let opts = JsonParseOptions { allow_trailing_commas: true, ..Default::default() };
        assert!(parse("[1,2,]", None, opts).is_ok());
    }

    #[test]
    fn exceeds_max_depth_fails() {
        let opts = JsonParseOptions { max_depth: 2, ..Default::default() };
        assert!(parse("[[[1]]]", None, opts).is_err());
    }

    #[test]
    fn decodes_surrogate_pair_escape() {
        let v = parse(r#""😀""#, None, JsonParseOptions::default()).unwrap();
        assert_eq!(v.to_string(), "\u{1F600}");
    }
}
