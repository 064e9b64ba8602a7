//! Supervisor tests against real child processes

use super::*;
use crate::CoreError;
use schema::StdStream;
use std::time::Instant;

fn supervisor(capacity: usize) -> Supervisor {
    Supervisor::new(SupervisorConfig {
        capacity,
        destroy_grace: Duration::from_millis(200),
    })
}

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Poll `probe` until it yields a value or five seconds pass
fn eventually<T>(mut probe: impl FnMut() -> Option<T>) -> Option<T> {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(value) = probe() {
            return Some(value);
        }
        if Instant::now() >= deadline {
            return None;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
}

/// Drain `stream` until it contains `expected` bytes in total
fn drain_until(sup: &Supervisor, pid: u32, stream: StdStream, expected: usize) -> Vec<u8> {
    let mut collected = Vec::new();
    eventually(|| {
        collected.extend(sup.drain(pid, stream).expect("drain"));
        (collected.len() >= expected).then_some(())
    });
    collected
}

#[test]
fn test_create_echo_and_read_output() {
    let sup = supervisor(10);
    let pid = sup.create("/bin/echo", &args(&["hello"])).expect("create echo");
    assert!(pid > 0);
    assert_eq!(sup.len(), 1);

    let out = drain_until(&sup, pid, StdStream::Stdout, 6);
    assert_eq!(out, b"hello\n");

    let code = eventually(|| sup.return_code(pid).expect("return code"));
    assert_eq!(code, Some(0));

    sup.destroy(pid).expect("destroy");
    assert!(sup.is_empty());
}

#[test]
fn test_return_code_is_sentinel_then_stable() {
    let sup = supervisor(10);
    let pid = sup.create("sh", &args(&["-c", "sleep 0.3; exit 3"])).expect("create sh");

    assert_eq!(sup.return_code(pid).unwrap(), None);

    let code = eventually(|| sup.return_code(pid).unwrap());
    assert_eq!(code, Some(3));
    for _ in 0..3 {
        assert_eq!(sup.return_code(pid).unwrap(), Some(3));
    }

    sup.destroy(pid).unwrap();
}

#[test]
fn test_capacity_is_enforced_without_forking() {
    let sup = supervisor(2);
    let a = sup.create("sleep", &args(&["10"])).unwrap();
    let _b = sup.create("sleep", &args(&["10"])).unwrap();

    match sup.create("sleep", &args(&["10"])) {
        Err(CoreError::CapacityExceeded(2)) => {}
        other => panic!("expected CapacityExceeded, got {:?}", other),
    }
    assert_eq!(sup.len(), 2);

    sup.destroy(a).unwrap();
    let c = sup.create("sleep", &args(&["10"])).expect("slot freed by destroy");
    assert!(sup.contains(c));

    assert_eq!(sup.terminate_all(), 2);
    assert!(sup.is_empty());
}

#[test]
fn test_failed_launch_releases_slot() {
    let sup = supervisor(1);
    for _ in 0..3 {
        match sup.create("nonexistent_command_12345", &[]) {
            Err(CoreError::ProcessSpawn(_)) => {}
            other => panic!("expected ProcessSpawn, got {:?}", other),
        }
    }
    assert!(sup.is_empty());

    let pid = sup.create("true", &[]).expect("slot still available");
    sup.destroy(pid).unwrap();
}

#[test]
fn test_send_input_round_trip_through_cat() {
    let sup = supervisor(10);
    let pid = sup.create("cat", &[]).unwrap();

    sup.send_input(pid, b"hello  world").unwrap();
    let out = drain_until(&sup, pid, StdStream::Stdout, 13);
    assert_eq!(out, b"hello  world\n");

    sup.close_input(pid).unwrap();
    assert!(matches!(sup.send_input(pid, b"again"), Err(CoreError::InputClosed(p)) if p == pid));
    // Closing twice is not an error
    sup.close_input(pid).unwrap();

    // cat exits once its input is closed
    let code = eventually(|| sup.return_code(pid).unwrap());
    assert_eq!(code, Some(0));

    sup.destroy(pid).unwrap();
}

#[test]
fn test_send_input_passes_non_utf8_bytes_unchanged() {
    let sup = supervisor(10);
    let pid = sup.create("cat", &[]).unwrap();

    sup.send_input(pid, b"\xff\xfe").unwrap();
    let out = drain_until(&sup, pid, StdStream::Stdout, 3);
    assert_eq!(out, b"\xff\xfe\n");

    sup.destroy(pid).unwrap();
}

#[test]
fn test_send_input_after_exit_is_rejected() {
    let sup = supervisor(10);
    let pid = sup.create("true", &[]).unwrap();

    assert_eq!(eventually(|| sup.return_code(pid).unwrap()), Some(0));
    assert!(matches!(
        sup.send_input(pid, b"too late"),
        Err(CoreError::ProcessTerminated(p)) if p == pid
    ));

    sup.destroy(pid).unwrap();
}

#[test]
fn test_drain_delivers_each_byte_once() {
    let sup = supervisor(10);
    let pid = sup
        .create("sh", &args(&["-c", "echo one; sleep 0.3; echo two"]))
        .unwrap();

    let mut chunks = Vec::new();
    eventually(|| {
        chunks.push(sup.drain(pid, StdStream::Stdout).unwrap());
        sup.return_code(pid).unwrap()
    })
    .expect("sh should exit");
    // Pick up anything written between the last drain and the exit
    chunks.push(sup.drain(pid, StdStream::Stdout).unwrap());

    assert_eq!(chunks.concat(), b"one\ntwo\n");
    assert!(sup.drain(pid, StdStream::Stdout).unwrap().is_empty());

    sup.destroy(pid).unwrap();
}

#[test]
fn test_stderr_is_drained_separately() {
    let sup = supervisor(10);
    let pid = sup.create("sh", &args(&["-c", "echo out; echo oops 1>&2"])).unwrap();

    let err = drain_until(&sup, pid, StdStream::Stderr, 5);
    assert_eq!(err, b"oops\n");
    let out = drain_until(&sup, pid, StdStream::Stdout, 4);
    assert_eq!(out, b"out\n");

    sup.destroy(pid).unwrap();
}

#[test]
fn test_unknown_pid_is_rejected_everywhere() {
    let sup = supervisor(10);
    let pid = 999_999;

    assert!(matches!(sup.destroy(pid), Err(CoreError::NotFound(p)) if p == pid));
    assert!(matches!(sup.send_input(pid, b"x"), Err(CoreError::NotFound(_))));
    assert!(matches!(sup.close_input(pid), Err(CoreError::NotFound(_))));
    assert!(matches!(sup.drain(pid, StdStream::Stdout), Err(CoreError::NotFound(_))));
    assert!(matches!(sup.drain(pid, StdStream::Stderr), Err(CoreError::NotFound(_))));
    assert!(matches!(sup.return_code(pid), Err(CoreError::NotFound(_))));
}

#[test]
fn test_destroy_running_process() {
    let sup = supervisor(10);
    let pid = sup.create("sleep", &args(&["30"])).unwrap();
    assert_eq!(sup.return_code(pid).unwrap(), None);

    sup.destroy(pid).unwrap();
    assert!(!sup.contains(pid));
    assert!(matches!(sup.return_code(pid), Err(CoreError::NotFound(_))));
    assert!(matches!(sup.destroy(pid), Err(CoreError::NotFound(_))));
}

#[test]
fn test_list_in_slot_order_with_status() {
    let sup = supervisor(10);
    let first = sup.create("sleep", &args(&["30"])).unwrap();
    let second = sup.create("true", &[]).unwrap();
    eventually(|| sup.return_code(second).unwrap());

    let rows = sup.list();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].pid, first);
    assert_eq!(rows[0].exit_status, None);
    assert_eq!(rows[0].command_line, "sleep 30");
    assert_eq!(rows[1].pid, second);
    assert_eq!(rows[1].exit_status, Some(0));
    assert_eq!(rows[1].command_line, "true");

    assert_eq!(sup.terminate_all(), 2);
}

#[test]
fn test_clones_share_one_table() {
    let sup = supervisor(10);
    let other = sup.clone();
    let pid = sup.create("sleep", &args(&["30"])).unwrap();
    assert!(other.contains(pid));

    let handle = std::thread::spawn(move || other.destroy(pid));
    handle.join().unwrap().unwrap();
    assert!(sup.is_empty());
}
