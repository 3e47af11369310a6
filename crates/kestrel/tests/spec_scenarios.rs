//! The six concrete scenarios from spec.md §8, run through the public
//! embedding surface (`Context::evaluate`) and asserted on the
//! stringified completion value the way the spec's `println(expr)`
//! helper would print them — in the style of `otter-vm-core`'s
//! full-source `#[cfg(test)]` evaluation tests.

use kestrel_core::VmError;
use kestrel_interpreter::Context;

fn eval(src: &str) -> String {
    let ctx = Context::new();
    match ctx.evaluate(src, "<test>") {
        Ok(v) => v.to_string(),
        Err(e) => panic!("unexpected error: {e}"),
    }
}

#[test]
fn shared_shape_for_same_insertion_order() {
    let ctx = Context::new();
    ctx.evaluate("let a = {}; a.x = 1; a.y = 2;", "<test>").unwrap();
    ctx.evaluate("let b = {}; b.x = 10; b.y = 20;", "<test>").unwrap();
    let a = ctx.get_global("a");
    let b = ctx.get_global("b");
    let (kestrel_core::Value::Object(a), kestrel_core::Value::Object(b)) = (a, b) else {
        panic!("expected objects")
    };
    assert_eq!(a.shape_id(), b.shape_id());
}

#[test]
fn bigint_loop_sums_to_two_hundred_ten() {
    let result = eval("let n = 0n; for (let i = 1n; i <= 20n; i++) n += i; n");
    assert_eq!(result, "210");
}

#[test]
fn jit_tier_up_matches_interpreter_result() {
    let result = eval(
        "function f(x){ return x*x; } let s = 0; for (let i=0;i<1000;i++) s += f(i); s",
    );
    assert_eq!(result, "332833500");
}

#[test]
fn null_member_access_throws_type_error() {
    let ctx = Context::new();
    let err = ctx.evaluate("null.x", "<test>").unwrap_err();
    match err {
        VmError::Exception(thrown) => {
            let name = match &thrown.value {
                kestrel_core::Value::Object(o) => o.get(&kestrel_core::PropertyKey::string("name")),
                _ => panic!("expected error object"),
            };
            assert_eq!(name.to_string(), "TypeError");
            assert!(!thrown.message.is_empty());
        }
        other => panic!("expected a thrown exception, got {other}"),
    }
}

#[test]
fn json_stringify_drops_undefined_and_functions_nulls_nan() {
    let result = eval(r#"JSON.stringify({a:1, b:[2,3], c:undefined, d:NaN})"#);
    assert_eq!(result, r#"{"a":1,"b":[2,3],"d":null}"#);
}

#[test]
fn sparse_array_assignment_extends_length() {
    let result = eval(r#"let a = []; a[3] = 1; a.length + "," + (typeof a[0])"#);
    assert_eq!(result, "4,undefined");
}
