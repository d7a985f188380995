//! Integration tests for the process-backed tube channel
//!
//! These tests spawn real child processes (`cat`, `sh`, `sleep`, `echo`
//! equivalents) and verify:
//! - Duplex round-trips through the merged stdout+stderr pipe
//! - Timeout-bounded receives that distinguish "no data yet" from EOF
//! - The half-close / termination state machine and its idempotence
//! - Exactly-once lifecycle notifications

#![cfg(unix)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};
use tubing::{Direction, NullReporter, ProcessSpec, ProcessTube, Reporter, Tube, TubeError};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("tubing=debug")
        .with_test_writer()
        .try_init();
}

fn spawn_quiet(spec: ProcessSpec) -> ProcessTube {
    init_tracing();
    ProcessTube::from_spec(spec, Box::new(NullReporter)).expect("failed to spawn child")
}

/// Reporter that records every notification for assertion
#[derive(Clone, Default)]
struct RecordingReporter {
    events: Rc<RefCell<Vec<String>>>,
}

impl RecordingReporter {
    fn matching(&self, needle: &str) -> usize {
        self.events
            .borrow()
            .iter()
            .filter(|event| event.contains(needle))
            .count()
    }
}

impl Reporter for RecordingReporter {
    fn info(&self, message: &str) {
        self.events.borrow_mut().push(format!("info: {message}"));
    }

    fn success(&self, message: &str) {
        self.events.borrow_mut().push(format!("success: {message}"));
    }

    fn error(&self, message: &str) {
        self.events.borrow_mut().push(format!("error: {message}"));
    }
}

/// Drain a channel to EOF using its default timeout, collecting the bytes
fn drain(tube: &mut ProcessTube) -> Vec<u8> {
    let mut collected = Vec::new();
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        match tube.recv_raw(64) {
            Ok(Some(chunk)) => collected.extend_from_slice(&chunk),
            Ok(None) => assert!(Instant::now() < deadline, "child never reached EOF"),
            Err(TubeError::EndOfStream) => return collected,
            Err(e) => panic!("unexpected receive failure: {e}"),
        }
    }
}

#[test]
fn test_echo_child_round_trips_ping() {
    let mut tube = spawn_quiet(ProcessSpec::new(["cat"]));
    assert!(tube.connected());

    tube.send_raw(b"ping").expect("send failed");
    let data = tube
        .recv_raw(4)
        .expect("recv failed")
        .expect("no data within the default timeout");
    assert_eq!(data, b"ping");

    tube.close().unwrap();
}

#[test]
fn test_exit_code_is_polled_and_disconnects() {
    let mut tube = spawn_quiet(ProcessSpec::shell("exit 7"));

    let deadline = Instant::now() + Duration::from_secs(5);
    let code = loop {
        if let Some(code) = tube.poll_exit().expect("poll failed") {
            break code;
        }
        assert!(Instant::now() < deadline, "child never exited");
        std::thread::sleep(Duration::from_millis(10));
    };
    assert_eq!(code, 7);
    assert!(!tube.connected());

    // Idempotent after exit
    assert_eq!(tube.poll_exit().unwrap(), Some(7));
}

#[test]
fn test_quiet_child_times_out_without_error() {
    let spec = ProcessSpec::new(["sleep", "5"]).timeout(Duration::from_millis(100));
    let mut tube = spawn_quiet(spec);

    let started = Instant::now();
    let result = tube.recv_raw(1024).expect("timeout must not be an error");
    assert!(result.is_none());
    assert!(started.elapsed() >= Duration::from_millis(100));
    assert!(started.elapsed() < Duration::from_secs(4));

    tube.close().unwrap();
}

#[test]
fn test_eof_is_idempotent() {
    let mut tube = spawn_quiet(ProcessSpec::shell("echo done"));

    let collected = drain(&mut tube);
    assert_eq!(collected, b"done\n");

    // Every call after EOF keeps failing the same way
    for _ in 0..3 {
        match tube.recv_raw(16) {
            Err(TubeError::EndOfStream) => {}
            other => panic!("expected EndOfStream, got {other:?}"),
        }
    }
}

#[test]
fn test_send_after_half_close_raises_end_of_stream() {
    let mut tube = spawn_quiet(ProcessSpec::new(["cat"]));

    tube.shutdown(Direction::Out).unwrap();
    match tube.send_raw(b"late") {
        Err(TubeError::EndOfStream) => {}
        other => panic!("expected EndOfStream, got {other:?}"),
    }

    tube.close().unwrap();
}

#[test]
fn test_shutdown_both_directions_closes_channel() {
    let mut tube = spawn_quiet(ProcessSpec::new(["sleep", "30"]));

    tube.shutdown(Direction::Out).unwrap();
    assert!(tube.connected(), "half-close must not stop the child");

    tube.shutdown(Direction::In).unwrap();
    assert!(!tube.connected());
}

#[test]
fn test_shutdown_reverse_order_closes_channel() {
    let mut tube = spawn_quiet(ProcessSpec::new(["sleep", "30"]));

    tube.shutdown(Direction::In).unwrap();
    assert!(tube.connected());

    tube.shutdown(Direction::Out).unwrap();
    assert!(!tube.connected());
}

#[test]
fn test_close_is_idempotent_and_leaves_no_child() {
    let mut tube = spawn_quiet(ProcessSpec::new(["sleep", "30"]));
    let pid = tube.pid();

    tube.close().unwrap();
    tube.close().unwrap();
    tube.kill().unwrap();

    // Existence probe: signal 0 fails once the child is fully gone
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let alive = unsafe { libc::kill(pid as i32, 0) } == 0;
        if !alive {
            break;
        }
        assert!(Instant::now() < deadline, "child process leaked past close");
        std::thread::sleep(Duration::from_millis(20));
    }
}

#[test]
fn test_lifecycle_notifications_are_emitted_exactly_once() {
    init_tracing();
    let reporter = RecordingReporter::default();
    let mut tube = ProcessTube::from_spec(
        ProcessSpec::shell("exit 3"),
        Box::new(reporter.clone()),
    )
    .expect("failed to spawn child");

    assert_eq!(reporter.matching("Started program"), 1);

    assert_eq!(tube.wait_exit().unwrap(), 3);
    for _ in 0..3 {
        assert_eq!(tube.poll_exit().unwrap(), Some(3));
    }
    assert_eq!(reporter.matching("exit code 3"), 1);

    // close() after an observed exit neither kills nor re-notifies
    tube.close().unwrap();
    assert_eq!(reporter.matching("Stopped program"), 0);
}

#[test]
fn test_close_of_running_child_notifies_stop_once() {
    init_tracing();
    let reporter = RecordingReporter::default();
    let mut tube = ProcessTube::from_spec(
        ProcessSpec::new(["sleep", "30"]),
        Box::new(reporter.clone()),
    )
    .expect("failed to spawn child");

    tube.close().unwrap();
    tube.close().unwrap();
    assert_eq!(reporter.matching("Stopped program"), 1);
}

#[test]
fn test_fileno_while_connected_and_after_exit() {
    let mut tube = spawn_quiet(ProcessSpec::new(["cat"]));
    let fd = tube.fileno().expect("connected channel has a descriptor");
    assert!(fd >= 0);

    tube.close().unwrap();
    match tube.fileno() {
        Err(TubeError::Usage(_)) => {}
        other => panic!("expected a usage error, got {other:?}"),
    }
}

#[test]
fn test_communicate_echo_round_trip() {
    let mut tube = spawn_quiet(ProcessSpec::new(["cat"]));
    let output = tube.communicate(Some(b"hello")).expect("communicate failed");
    assert_eq!(output, b"hello");
}

#[test]
fn test_stderr_is_merged_into_the_channel() {
    let mut tube = spawn_quiet(ProcessSpec::shell("echo out; echo err 1>&2"));
    let output = tube.communicate(None).expect("communicate failed");
    let text = String::from_utf8_lossy(&output);
    assert!(text.contains("out"));
    assert!(text.contains("err"));
}

#[test]
fn test_empty_argv_fails_before_spawning() {
    init_tracing();
    let spec = ProcessSpec::new(Vec::<String>::new());
    match ProcessTube::from_spec(spec, Box::new(NullReporter)) {
        Err(TubeError::Configuration(_)) => {}
        other => panic!("expected a configuration error, got {other:?}"),
    }
}

#[test]
fn test_spawn_nonexistent_command() {
    init_tracing();
    let spec = ProcessSpec::new(["nonexistent_command_12345"]);
    match ProcessTube::from_spec(spec, Box::new(NullReporter)) {
        Err(TubeError::Spawn(_)) => {}
        other => panic!("expected a spawn error, got {other:?}"),
    }
}

#[test]
fn test_executable_override_controls_what_runs() {
    // argv[0] says "not-a-shell" but the override points at /bin/sh
    let spec = ProcessSpec::new(["not-a-shell", "-c", "exit 5"]).executable("/bin/sh");
    let mut tube = spawn_quiet(spec);
    assert_eq!(tube.wait_exit().unwrap(), 5);
}

#[test]
fn test_replacement_environment_reaches_the_child() {
    let spec = ProcessSpec::shell("printf '%s' \"$TUBE_MARKER\"")
        .env([("TUBE_MARKER", "present"), ("PATH", "/usr/bin:/bin")]);
    let mut tube = spawn_quiet(spec);
    let output = tube.communicate(None).expect("communicate failed");
    assert_eq!(output, b"present");
}
