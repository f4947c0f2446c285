//! Timeouts, cancellation, busy policies and closing during a run.

use islet_rt::{
    BusyPolicy, CancelToken, ErrorKind, ExecutionResult, Handle, InterpreterConfig, ResourceLimits, RunOptions,
    Runtime, Value,
};
use std::thread;
use std::time::{Duration, Instant};

const SPIN: &str = "while True:\n    pass\n";

fn spawn_run(h: &Handle, source: &'static str, options: RunOptions) -> thread::JoinHandle<ExecutionResult> {
    let h = h.clone();
    thread::spawn(move || h.run_code_with(source, options))
}

/// Poll with short-timeout probe runs until `h` reports busy.
fn wait_until_busy(h: &Handle) {
    let started = Instant::now();
    loop {
        let probe = h.run_code_with("pass", RunOptions::default().with_timeout(Duration::from_millis(5)));
        if probe.error_kind() == Some(ErrorKind::ContextBusy) {
            return;
        }
        assert!(started.elapsed() < Duration::from_secs(5), "run never started");
        thread::sleep(Duration::from_millis(2));
    }
}

// ===========================================================================
// Timeouts
// ===========================================================================

#[test]
fn timeout_stops_infinite_loop() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    let started = Instant::now();
    let r = h.run_code_with(SPIN, RunOptions::default().with_timeout(Duration::from_millis(50)));
    assert_eq!(r.error_kind(), Some(ErrorKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(h.run_code("print('still usable')").is_ok());
}

#[test]
fn default_timeout_comes_from_config() {
    let rt = Runtime::default();
    let limits = ResourceLimits::default().with_timeout(Duration::from_millis(30));
    let h = rt.create_interpreter(Some(InterpreterConfig::default().with_limits(limits))).unwrap();
    assert_eq!(h.run_code(SPIN).error_kind(), Some(ErrorKind::Timeout));
}

#[test]
fn timeout_keeps_completed_statements_and_drops_the_interrupted_one() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    h.run_code("counter = 0");
    let source = "
        done = 'yes'
        def spin():
            global counter
            counter = 100
            while True:
                pass
        spin()
        after = 1
    ";
    let r = h.run_code_with(source, RunOptions::default().with_timeout(Duration::from_millis(50)));
    assert_eq!(r.error_kind(), Some(ErrorKind::Timeout));
    assert_eq!(h.get_global("done").unwrap(), Some(Value::from("yes")));
    assert!(h.get_global("spin").unwrap().is_some());
    assert_eq!(h.get_global("counter").unwrap(), Some(Value::Int(0)));
    assert_eq!(h.get_global("after").unwrap(), None);
}

#[test]
fn timeout_interrupts_sleep() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    let started = Instant::now();
    let r = h.run_code_with("import time\ntime.sleep(30)", RunOptions::default().with_timeout(Duration::from_millis(50)));
    assert_eq!(r.error_kind(), Some(ErrorKind::Timeout));
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[test]
fn instruction_limit_reports_timeout() {
    let rt = Runtime::default();
    let limits = ResourceLimits::default().with_max_instructions(1000);
    let h = rt.create_interpreter(Some(InterpreterConfig::default().with_limits(limits))).unwrap();
    assert_eq!(h.run_code(SPIN).error_kind(), Some(ErrorKind::Timeout));
    assert!(h.run_code("x = 1").is_ok());
}

// ===========================================================================
// Cancellation
// ===========================================================================

#[test]
fn cancel_token_stops_the_run() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    h.run_code("x = 1");
    let token = CancelToken::new();
    let runner = spawn_run(&h, "x = 2\nwhile True:\n    pass\n", RunOptions::default().with_cancel(token.clone()));
    thread::sleep(Duration::from_millis(50));
    token.cancel();

    let r = runner.join().unwrap();
    assert_eq!(r.error_kind(), Some(ErrorKind::Cancelled));
    assert_eq!(h.get_global("x").unwrap(), Some(Value::Int(2)));
}

#[test]
fn handle_cancel_stops_the_run() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    let runner = spawn_run(&h, SPIN, RunOptions::default());
    let started = Instant::now();
    while !h.cancel() {
        assert!(started.elapsed() < Duration::from_secs(5), "run never started");
        thread::sleep(Duration::from_millis(2));
    }
    assert_eq!(runner.join().unwrap().error_kind(), Some(ErrorKind::Cancelled));
    assert!(!h.cancel());
}

// ===========================================================================
// Busy policies
// ===========================================================================

#[test]
fn fail_fast_reports_busy() {
    let rt = Runtime::default();
    let config = InterpreterConfig::default().with_busy_policy(BusyPolicy::FailFast);
    let h = rt.create_interpreter(Some(config)).unwrap();
    let runner = spawn_run(&h, "import time\ntime.sleep(10)", RunOptions::default());

    let started = Instant::now();
    let mut saw_busy = false;
    while started.elapsed() < Duration::from_secs(5) {
        if h.run_code("y = 1").error_kind() == Some(ErrorKind::ContextBusy) {
            saw_busy = true;
            break;
        }
        thread::sleep(Duration::from_millis(2));
    }
    h.cancel();
    assert_eq!(runner.join().unwrap().error_kind(), Some(ErrorKind::Cancelled));
    assert!(saw_busy);
}

#[test]
fn blocking_wait_is_bounded_by_the_timeout() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    let token = CancelToken::new();
    let runner = spawn_run(&h, SPIN, RunOptions::default().with_cancel(token.clone()));
    wait_until_busy(&h);

    let started = Instant::now();
    let r = h.run_code_with("y = 1", RunOptions::default().with_timeout(Duration::from_millis(30)));
    assert_eq!(r.error_kind(), Some(ErrorKind::ContextBusy));
    assert!(started.elapsed() >= Duration::from_millis(20));

    token.cancel();
    runner.join().unwrap();
    assert!(h.run_code("y = 1").is_ok());
    assert_eq!(h.get_global("y").unwrap(), Some(Value::Int(1)));
}

#[test]
fn blocked_run_proceeds_once_the_holder_finishes() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    let runner = spawn_run(&h, "import time\ntime.sleep(0.1)\nfirst = True", RunOptions::default());
    wait_until_busy(&h);
    let r = h.run_code("second = first");
    assert!(r.is_ok(), "{:?}", r);
    assert!(runner.join().unwrap().is_ok());
    assert_eq!(h.get_global("second").unwrap(), Some(Value::Bool(true)));
}

// ===========================================================================
// Closing during a run
// ===========================================================================

#[test]
fn close_stops_a_running_interpreter() {
    let rt = Runtime::default();
    let h = rt.create_interpreter(None).unwrap();
    let runner = spawn_run(&h, SPIN, RunOptions::default());
    wait_until_busy(&h);

    h.close().unwrap();
    let r = runner.join().unwrap();
    assert_eq!(r.error_kind(), Some(ErrorKind::ContextDestroyed));
    assert_eq!(h.run_code("x = 1").error_kind(), Some(ErrorKind::UnknownInterpreter));
    assert_eq!(rt.interpreter_count(), 0);
}
