//! Isolation between interpreters: names, module state and parallel runs.

use islet_rt::{ErrorKind, FaultKind, InterpreterConfig, Runtime, Value};
use std::sync::Arc;
use std::thread;

fn runtime() -> Runtime {
    Runtime::default()
}

// ===========================================================================
// Namespaces
// ===========================================================================

#[test]
fn define_in_one_use_in_another_faults() {
    let rt = runtime();
    let i1 = rt.create_interpreter(None).unwrap();
    let i2 = rt.create_interpreter(None).unwrap();

    let r = i1.run_code("x = 5");
    assert!(r.is_ok());
    let r = i1.run_code("print(x)");
    assert_eq!(r.output(), "5\n");

    let r = i2.run_code("print(x)");
    assert_eq!(r.error_kind(), Some(ErrorKind::RuntimeFault));
    assert_eq!(r.fault_kind(), Some(FaultKind::NameError));
}

#[test]
fn later_runs_see_earlier_definitions() {
    let rt = runtime();
    let h = rt.create_interpreter(None).unwrap();
    assert!(h.run_code("def square(n):\n    return n * n\n").is_ok());
    assert_eq!(h.run_code("print(square(12))").output(), "144\n");
}

#[test]
fn names_from_a_never_appear_in_b() {
    let rt = runtime();
    let a = rt.create_interpreter(None).unwrap();
    let b = rt.create_interpreter(None).unwrap();
    a.run_code("alpha = [1, 2]\nbeta = {'k': 'v'}\nimport math");
    let names: Vec<String> = b.namespace_snapshot().unwrap().keys().cloned().collect();
    assert_eq!(names, vec!["__name__".to_string()]);
}

#[test]
fn host_values_are_copied_in() {
    let rt = runtime();
    let a = rt.create_interpreter(None).unwrap();
    let b = rt.create_interpreter(None).unwrap();
    let shared = Value::from(vec![1i64, 2, 3]);
    a.set_global("xs", shared.clone()).unwrap();
    b.set_global("xs", shared).unwrap();
    a.run_code("xs.append(4)");
    assert_eq!(b.get_global("xs").unwrap(), Some(Value::from(vec![1i64, 2, 3])));
    assert_eq!(a.get_global("xs").unwrap(), Some(Value::from(vec![1i64, 2, 3, 4])));
}

#[test]
fn faults_do_not_leak_across_interpreters() {
    let rt = runtime();
    let a = rt.create_interpreter(None).unwrap();
    let b = rt.create_interpreter(None).unwrap();
    assert_eq!(a.run_code("1 / 0").fault_kind(), Some(FaultKind::ZeroDivisionError));
    assert!(b.run_code("print('fine')").is_ok());
    assert_eq!(b.stats().unwrap().faults, 0);
}

// ===========================================================================
// Module state
// ===========================================================================

#[test]
fn seeded_random_is_per_interpreter() {
    let rt = runtime();
    let config = InterpreterConfig::default().with_random_seed(42);
    let a = rt.create_interpreter(Some(config.clone())).unwrap();
    let b = rt.create_interpreter(Some(config)).unwrap();
    let draw = "import random\nprint(random.randint(1, 1000000), random.randint(1, 1000000))";

    let first_a = a.run_code(draw).output().to_string();
    // Drawing more in `a` must not advance `b`.
    a.run_code("random.random()\nrandom.random()");
    let first_b = b.run_code(draw).output().to_string();
    assert_eq!(first_a, first_b);
}

#[test]
fn module_cache_is_per_interpreter() {
    let rt = runtime();
    let a = rt.create_interpreter(None).unwrap();
    let b = rt.create_interpreter(None).unwrap();
    assert!(a.run_code("import json").is_ok());
    let r = b.run_code("json.dumps(1)");
    assert_eq!(r.fault_kind(), Some(FaultKind::NameError));
}

#[test]
fn baseline_modules_are_bound_at_creation() {
    let rt = runtime();
    let h = rt
        .create_interpreter(Some(InterpreterConfig::default().with_baseline_modules(["math", "json"])))
        .unwrap();
    assert_eq!(h.run_code("print(math.sqrt(4), json.dumps([1]))").output(), "2.0 [1]\n");
}

// ===========================================================================
// Parallelism
// ===========================================================================

#[test]
fn two_threads_thousand_mutations_each() {
    let rt = Arc::new(runtime());
    let handles: Vec<_> = (0..2).map(|_| rt.create_interpreter(None).unwrap()).collect();
    for h in &handles {
        assert!(h.run_code("counter = 0\nseen = []").is_ok());
    }

    let workers: Vec<_> = handles
        .iter()
        .cloned()
        .enumerate()
        .map(|(tag, h)| {
            thread::spawn(move || {
                for i in 0..1000 {
                    let r = h.run_code(&format!("counter += 1\nseen.append({})", tag * 10_000 + i));
                    assert!(r.is_ok(), "{:?}", r);
                }
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }

    for (tag, h) in handles.iter().enumerate() {
        assert_eq!(h.get_global("counter").unwrap(), Some(Value::Int(1000)));
        let seen = h.get_global("seen").unwrap().unwrap();
        let seen = seen.as_list().unwrap();
        assert_eq!(seen.len(), 1000);
        let base = (tag * 10_000) as i64;
        assert!(seen.iter().enumerate().all(|(i, v)| v.as_int() == Some(base + i as i64)));
    }
}

#[test]
fn many_interpreters_in_parallel() {
    let rt = Arc::new(runtime());
    let workers: Vec<_> = (0..8)
        .map(|n| {
            let rt = Arc::clone(&rt);
            thread::spawn(move || {
                let h = rt.create_interpreter(None).unwrap();
                let r = h.run_code(&format!("total = 0\nfor i in range({}):\n    total += i\nprint(total)", n * 100));
                let expected: i64 = (0..n * 100).sum();
                assert_eq!(r.output(), format!("{}\n", expected));
            })
        })
        .collect();
    for w in workers {
        w.join().unwrap();
    }
    assert_eq!(rt.interpreter_count(), 0);
}
