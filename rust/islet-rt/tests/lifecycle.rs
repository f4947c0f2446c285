//! Handle lifecycle, compile errors and result shape.

use islet_rt::{
    create_interpreter, ErrorKind, ExecutionResult, FaultKind, InterpreterConfig, ResourceLimits, Runtime,
    RuntimeConfig, RuntimeError, Value,
};

// ===========================================================================
// Creation and close
// ===========================================================================

#[test]
fn empty_source_is_ok_with_no_output() {
    let h = create_interpreter(None).unwrap();
    for source in ["", "   \n\n", "# only a comment\n"] {
        let r = h.run_code(source);
        assert!(r.is_ok(), "{:?}", r);
        assert_eq!(r.output(), "");
    }
}

#[test]
fn run_after_close_is_unknown() {
    let h = create_interpreter(None).unwrap();
    h.close().unwrap();
    let r = h.run_code("print(1)");
    assert_eq!(r.error_kind(), Some(ErrorKind::UnknownInterpreter));
    assert!(matches!(h.close(), Err(RuntimeError::UnknownInterpreter(_))));
    assert!(matches!(h.namespace_snapshot(), Err(RuntimeError::UnknownInterpreter(_))));
}

#[test]
fn close_through_one_clone_closes_all() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    let other = h.clone();
    other.close().unwrap();
    assert!(h.is_closed());
    assert_eq!(h.run_code("x = 1").error_kind(), Some(ErrorKind::UnknownInterpreter));
}

#[test]
fn ids_are_never_reused() {
    let rt = Runtime::default();
    let a = rt.create_interpreter(None).unwrap();
    let first = a.id();
    a.close().unwrap();
    let b = rt.create_interpreter(None).unwrap();
    assert_ne!(first, b.id());
    assert_eq!(rt.interpreter_ids(), vec![b.id()]);
}

#[test]
fn max_interpreters_is_enforced() {
    let rt = Runtime::new(RuntimeConfig::default().with_max_interpreters(2));
    let a = rt.create_interpreter(None).unwrap();
    let _b = rt.create_interpreter(None).unwrap();
    assert!(matches!(rt.create_interpreter(None), Err(RuntimeError::ResourceExhausted(_))));
    a.close().unwrap();
    assert!(rt.create_interpreter(None).is_ok());
}

#[test]
fn invalid_config_is_rejected() {
    let rt = Runtime::default();
    let limits = ResourceLimits::default().with_max_call_depth(0);
    let err = rt.create_interpreter(Some(InterpreterConfig::default().with_limits(limits))).unwrap_err();
    assert!(matches!(err, RuntimeError::InvalidConfig(_)));

    let config = InterpreterConfig::default().with_allowed_modules(["math"]).with_baseline_modules(["json"]);
    assert!(matches!(rt.create_interpreter(Some(config)), Err(RuntimeError::InvalidConfig(_))));
    assert_eq!(rt.interpreter_count(), 0);
}

// ===========================================================================
// Compile errors
// ===========================================================================

#[test]
fn compile_error_leaves_namespace_unchanged() {
    let h = create_interpreter(None).unwrap();
    h.run_code("a = 1\nb = [1, 2]");
    let before = h.namespace_snapshot().unwrap();

    for bad in ["x = = 1", "a = 2\nif a\n    b = 3", "print('unterminated", "break", "def f(a, a):\n    pass"] {
        let r = h.run_code(bad);
        assert_eq!(r.error_kind(), Some(ErrorKind::CompileError), "{:?}", bad);
        assert_eq!(h.namespace_snapshot().unwrap(), before);
    }
}

#[test]
fn compile_error_reports_line() {
    let h = create_interpreter(None).unwrap();
    let r = h.run_code("x = 1\ny = (2\nz = 3\n\n\n");
    let failure = r.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::CompileError);
    assert!(failure.message.starts_with("syntax error"), "{}", failure.message);
}

#[test]
fn deeply_nested_source_is_a_compile_error() {
    let h = create_interpreter(None).unwrap();
    let source = format!("x = {}1{}", "(".repeat(200_000), ")".repeat(200_000));
    assert_eq!(h.run_code(&source).error_kind(), Some(ErrorKind::CompileError));
    let chain = format!("x = 1{}", " + 1".repeat(100_000));
    assert_eq!(h.run_code(&chain).error_kind(), Some(ErrorKind::CompileError));
    assert!(h.run_code("x = 1").is_ok());
}

#[test]
fn deeply_nested_host_value_is_rejected() {
    let h = create_interpreter(None).unwrap();
    let mut deep = Value::List(vec![]);
    for _ in 0..1000 {
        deep = Value::List(vec![deep]);
    }
    assert!(matches!(h.set_global("deep", deep), Err(RuntimeError::InvalidValue(_))));
    assert_eq!(h.get_global("deep").unwrap(), None);

    let mut shallow = Value::List(vec![]);
    for _ in 1..100 {
        shallow = Value::List(vec![shallow]);
    }
    h.set_global("shallow", shallow).unwrap();
    let r = h.run_code("print(len(shallow))");
    assert_eq!(r.output(), "1\n");
}

// ===========================================================================
// Source handling
// ===========================================================================

#[test]
fn indented_sources_are_dedented() {
    let h = create_interpreter(None).unwrap();
    let r = h.run_code(
        "
        def greet(name):
            return 'hello ' + name

        print(greet('islet'))
        ",
    );
    assert_eq!(r.output(), "hello islet\n");
}

#[test]
fn runtime_fault_keeps_output_and_line() {
    let h = create_interpreter(None).unwrap();
    let r = h.run_code("print('a')\nprint('b')\nitems = []\nitems[3]\n");
    let failure = r.failure().unwrap();
    assert_eq!(failure.kind, ErrorKind::RuntimeFault);
    assert_eq!(failure.fault, Some(FaultKind::IndexError));
    assert_eq!(failure.line, Some(4));
    assert_eq!(failure.output, "a\nb\n");
    assert_eq!(h.get_global("items").unwrap(), Some(Value::List(vec![])));
}

// ===========================================================================
// Result shape
// ===========================================================================

#[test]
fn results_serialize_as_tagged_json() {
    let h = create_interpreter(None).unwrap();
    let ok: serde_json::Value = serde_json::from_str(&h.run_code("print('hi')").to_json()).unwrap();
    assert_eq!(ok, serde_json::json!({"status": "ok", "output": "hi\n"}));

    let err = h.run_code("undefined_name");
    let json: serde_json::Value = serde_json::from_str(&err.to_json()).unwrap();
    assert_eq!(json["status"], "error");
    assert_eq!(json["kind"], "RuntimeFault");
    assert_eq!(json["fault"], "NameError");
    assert_eq!(json["line"], 1);

    let back: ExecutionResult = serde_json::from_str(&err.to_json()).unwrap();
    assert_eq!(back, err);
}
