//! BDD-style tests for a script host wired through the `deferloop` facade.
//!
//! These tests follow the Given-When-Then pattern and cover:
//! - Building a pool from a config file on disk
//! - Passing script values through to callbacks
//! - Surfacing script exceptions to the host after a drain

#![allow(clippy::unwrap_used)]
#![allow(clippy::expect_used)]
#![allow(clippy::panic)]
#![allow(clippy::indexing_slicing)]

use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;
use std::thread;
use std::time::{Duration, Instant};

use deferloop::{
    Callback, CallbackError, Delay, EventLoop, PoolConfig, RecordingReporter, ScriptEventLoop,
    ScriptValue, TimerPool,
};
use serde_json::json;
use tempfile::NamedTempFile;

fn drain_until_idle<A: 'static>(event_loop: &EventLoop<A>) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !event_loop.is_idle() && Instant::now() < deadline {
        event_loop.process();
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn given_config_file_when_host_builds_pool_then_timers_run_with_script_args() {
    // GIVEN: a pool configured from a TOML file
    let mut file = NamedTempFile::new().expect("temp file");
    writeln!(file, "worker_threads = 1\nthread_name = \"host-timer\"").expect("write config");
    let config = PoolConfig::load(file.path()).expect("config loads");
    assert_eq!(config.worker_threads, 1);
    let pool = TimerPool::new(config).expect("pool starts");

    // AND: a script event loop with a callback that records its args
    let event_loop = ScriptEventLoop::new(pool);
    let seen: Rc<RefCell<Vec<ScriptValue>>> = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&seen);
    let callback = Callback::new("function (a, b) { log(a, b) }", move |args: &[ScriptValue]| {
        sink.borrow_mut().extend_from_slice(args);
        Ok(())
    });

    // WHEN: a timeout with two script values is registered and drained
    event_loop
        .set_timeout(callback, vec![json!("hello"), json!({"n": 3})], Delay::from_millis(5))
        .expect("timeout registers");
    drain_until_idle(&event_loop);

    // THEN: the callback saw both values in order
    assert_eq!(*seen.borrow(), vec![json!("hello"), json!({"n": 3})]);
}

#[test]
fn given_throwing_script_when_drained_then_host_reads_failure_from_reporter() {
    // GIVEN: a loop that records failures for the host
    let recorder = Rc::new(RecordingReporter::new());
    let event_loop: ScriptEventLoop =
        EventLoop::with_reporter(TimerPool::shared().expect("shared pool"), Rc::clone(&recorder));

    let callback = Callback::new("() => { throw new TypeError('x') }", |_: &[ScriptValue]| {
        Err(CallbackError::thrown("TypeError: x"))
    });

    // WHEN: the immediate runs
    let id = event_loop
        .set_immediate(callback, vec![json!(1)])
        .expect("immediate registers");
    let summary = event_loop.process();

    // THEN: the drain counts the failure and the host can read it back
    assert_eq!(summary.failed, 1);
    let failures = recorder.take();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].timer_id, id);
    assert_eq!(failures[0].descriptor, "() => { throw new TypeError('x') }");
    assert_eq!(failures[0].args.len(), 1);
}
