//! Integration tests for snippet execution through the sandbox.
//!
//! Each test runs real worker processes and is skipped when no Python 3
//! interpreter can be found.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use snipbox_core::{ExecuteOptions, ExecuteRequest, Sandbox, SandboxConfig, Value};

fn sandbox() -> Option<Sandbox> {
    sandbox_with(SandboxConfig::default())
}

fn sandbox_with(config: SandboxConfig) -> Option<Sandbox> {
    match Sandbox::new(config) {
        Ok(sandbox) => Some(sandbox),
        Err(e) => {
            eprintln!("skipping: {}", e);
            None
        }
    }
}

#[test]
fn test_trailing_expression_and_delta() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("x = 5\ny = 10\nx + y", ExecuteOptions::default());

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, "15");
    assert_eq!(result.namespace.get("x"), Some(&Value::from(5)));
    assert_eq!(result.namespace.get("y"), Some(&Value::from(10)));
    assert_eq!(result.namespace.len(), 2);
}

#[test]
fn test_non_persistent_calls_are_isolated() {
    let Some(sandbox) = sandbox() else { return };

    assert!(sandbox.execute("temp = 100", ExecuteOptions::default()).success);
    let result = sandbox.execute("temp", ExecuteOptions::default());

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, "NameError");
    assert!(sandbox.persistent_namespace().is_empty());
}

#[test]
fn test_persistent_namespace() {
    let Some(sandbox) = sandbox() else { return };

    let first = sandbox.execute("x = 10", ExecuteOptions::persistent());
    assert!(first.success, "{:?}", first.error);

    let second = sandbox.execute("x + 5", ExecuteOptions::persistent());
    assert!(second.success, "{:?}", second.error);
    assert_eq!(second.output, "15");

    // Rebinding an existing name is not part of the delta.
    let third = sandbox.execute("x = 11\nz = 1", ExecuteOptions::persistent());
    assert!(third.success);
    assert!(!third.namespace.contains_key("x"));
    assert!(third.namespace.contains_key("z"));
}

#[test]
fn test_print_output_and_none() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("print('hello')", ExecuteOptions::default());
    assert_eq!(result.output, "hello");

    let result = sandbox.execute("for i in range(3):\n    print(i)", ExecuteOptions::default());
    assert_eq!(result.output, "0\n1\n2");

    let result = sandbox.execute("None", ExecuteOptions::default());
    assert_eq!(result.output, "None");

    // A non-None value replaces anything printed.
    let result = sandbox.execute("print('ignored')\n2 * 21", ExecuteOptions::default());
    assert_eq!(result.output, "42");
}

#[test]
fn test_stderr_is_tagged() {
    let Some(sandbox) = sandbox() else { return };

    let code = "print('hi')\nimport warnings\nwarnings.warn('careful')";
    let result = sandbox.execute(code, ExecuteOptions::default());

    assert!(result.success, "{:?}", result.error);
    assert!(result.output.starts_with("hi\n[stderr]: "), "{}", result.output);
    assert!(result.output.contains("careful"));
}

#[test]
fn test_snippet_exception_keeps_partial_output() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("print('before')\n1 / 0", ExecuteOptions::default());

    assert!(!result.success);
    assert_eq!(result.output, "before");
    let error = result.error.unwrap();
    assert_eq!(error.kind, "ZeroDivisionError");
    assert!(error.trace.contains("<snippet>"));
    assert!(result.namespace.is_empty());
}

#[test]
fn test_system_exit_is_captured() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("raise SystemExit(3)", ExecuteOptions::default());

    assert!(!result.success);
    assert_eq!(result.error.unwrap().kind, "SystemExit");
}

#[test]
fn test_syntax_error_has_location() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("x = 1\ny = (2 +\n", ExecuteOptions::default());

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, "SyntaxError");
    assert!(error.extra_context.contains_key("line"));
}

#[test]
fn test_timeout_kills_worker() {
    let Some(sandbox) = sandbox() else { return };

    let options = ExecuteOptions::persistent().with_timeout(Duration::from_secs(1));
    let start = Instant::now();
    let result = sandbox.execute("import time\nleft = 1\ntime.sleep(30)", options);
    let elapsed = start.elapsed();

    assert!(!result.success);
    let error = result.error.unwrap();
    assert_eq!(error.kind, "TimeoutError");
    assert_eq!(error.extra_context["timeout_seconds"], serde_json::json!(1.0));
    // timeout + grace + process startup slack
    assert!(elapsed < Duration::from_secs(6), "took {:?}", elapsed);
    assert!(sandbox.persistent_namespace().is_empty());
}

#[test]
fn test_unserializable_value_becomes_placeholder() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("f = lambda x: x\nn = 3", ExecuteOptions::persistent());

    assert!(result.success, "{:?}", result.error);
    assert_eq!(
        result.namespace.get("f"),
        Some(&Value::from("<unserializable>: function"))
    );
    assert!(result.namespace["f"].is_placeholder());
    assert_eq!(result.namespace.get("n"), Some(&Value::from(3)));
}

#[test]
fn test_pickled_values_survive_between_calls() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("pair = (1, 2)\nseen = {3, 4}", ExecuteOptions::persistent());
    assert!(result.success, "{:?}", result.error);
    match &result.namespace["pair"] {
        Value::Pickled(pickled) => {
            assert_eq!(pickled.type_name, "tuple");
            assert_eq!(pickled.repr, "(1, 2)");
        }
        other => panic!("expected a pickled tuple, got {:?}", other),
    }

    let result = sandbox.execute("pair[1] + len(seen)", ExecuteOptions::persistent());
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, "4");
}

#[test]
fn test_module_aliases_are_restored() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("import math as m", ExecuteOptions::persistent());
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.modules.get("m").map(String::as_str), Some("math"));
    assert!(result.namespace.is_empty());

    let result = sandbox.execute("m.sqrt(16)", ExecuteOptions::persistent());
    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, "4.0");
}

#[test]
fn test_reserved_names_never_cross() {
    let Some(sandbox) = sandbox() else { return };

    let result = sandbox.execute("__hidden__ = 1\n_private = 2", ExecuteOptions::persistent());

    assert!(result.success);
    assert!(!result.namespace.contains_key("__hidden__"));
    assert!(!result.namespace.contains_key("__builtins__"));
    assert!(result.namespace.contains_key("_private"));
}

#[test]
fn test_execute_request_json() {
    let Some(sandbox) = sandbox() else { return };

    let request: ExecuteRequest = serde_json::from_str(r#"{"code": "sum([1, 2, 3])"}"#).unwrap();
    let result = sandbox.execute_request(&request);
    let value = serde_json::to_value(&result).unwrap();

    assert_eq!(value["output"], "6");
    assert_eq!(value["success"], true);
    assert!(value["error"].is_null());
}

#[test]
fn test_concurrent_non_persistent_calls() {
    let Some(sandbox) = sandbox() else { return };
    let sandbox = Arc::new(sandbox);

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let sandbox = Arc::clone(&sandbox);
            thread::spawn(move || {
                let code = format!("value = {}\nvalue * 2", i);
                sandbox.execute(&code, ExecuteOptions::default())
            })
        })
        .collect();

    for (i, handle) in handles.into_iter().enumerate() {
        let result = handle.join().unwrap();
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.output, (i * 2).to_string());
    }
}

#[test]
fn test_oversized_value_keeps_the_rest_of_the_result() {
    let Some(sandbox) = sandbox() else { return };

    let code = "small = 1\nbig = bytes(80_000_000)\nprint('done')";
    let result = sandbox.execute(code, ExecuteOptions::persistent());

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, "done");
    assert_eq!(result.namespace.get("small"), Some(&Value::from(1)));
    assert_eq!(
        result.namespace.get("big"),
        Some(&Value::from("<unserializable>: bytes"))
    );
    assert!(sandbox.persistent_namespace().contains("small"));
}

#[test]
fn test_value_budget_is_configurable() {
    let Some(sandbox) = sandbox_with(SandboxConfig::default().with_max_value_bytes(1024)) else {
        return;
    };

    let result = sandbox.execute("blob = 'x' * 5000\npair = [1, 2]", ExecuteOptions::default());

    assert!(result.success, "{:?}", result.error);
    assert!(result.namespace["blob"].is_placeholder());
    assert_eq!(result.namespace.get("pair"), Some(&Value::from(serde_json::json!([1, 2]))));
}

#[test]
fn test_frame_cap_drops_largest_binding_first() {
    // No per-value budget: only the frame cap applies.
    let Some(sandbox) = sandbox_with(SandboxConfig::default().with_max_value_bytes(usize::MAX))
    else {
        return;
    };

    let code = "a = bytes(10_000_000)\nb = bytes(70_000_000)\nc = 1\nprint('ok')";
    let result = sandbox.execute(code, ExecuteOptions::default());

    assert!(result.success, "{:?}", result.error);
    assert_eq!(result.output, "ok");
    assert!(result.namespace["b"].is_placeholder());
    assert!(matches!(result.namespace["a"], Value::Pickled(_)));
    assert_eq!(result.namespace.get("c"), Some(&Value::from(1)));
}
