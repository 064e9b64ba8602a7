//! Integration tests for Unix process launching
//!
//! These tests verify that the launcher:
//! - Starts each child as the leader of its own session and process group
//! - Signals the whole group, including grandchildren
//! - Hands back pipes that never block the caller

#![cfg(unix)]
#![allow(unsafe_code)] // Required for libc calls in tests

use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};
use tether_core::process::unix::{
    exit_code, poll_exit, signal_kill_group, signal_term_group, spawn_piped, terminate,
};

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

/// Whether `pid` exists and is not a zombie
fn is_running(pid: i32) -> bool {
    if unsafe { libc::kill(pid, 0) } == -1 {
        return false;
    }
    match std::fs::read_to_string(format!("/proc/{}/stat", pid)) {
        // State is the first field after the parenthesised command name
        Ok(stat) => stat
            .rsplit_once(')')
            .map(|(_, rest)| !rest.trim_start().starts_with('Z'))
            .unwrap_or(true),
        Err(_) => true,
    }
}

/// Test that spawned processes lead their own process group
#[test]
fn test_process_group_isolation() {
    let mut launched = spawn_piped("sleep", &args(&["5"])).expect("Failed to spawn sleep");
    let pid = launched.pid() as i32;

    let parent_pgid = unsafe { libc::getpgrp() };
    let child_pgid = unsafe { libc::getpgid(pid) };
    let child_sid = unsafe { libc::getsid(pid) };

    assert_eq!(child_pgid, pid);
    assert_eq!(child_sid, pid);
    assert_ne!(child_pgid, parent_pgid);

    signal_kill_group(launched.pid()).expect("Failed to send SIGKILL");
    let status = poll_exit(&mut launched.child, Duration::from_secs(5)).unwrap();
    assert!(status.is_some());
}

/// Test that SIGTERM reaches the group and is reported as 128 + signal
#[test]
fn test_sigterm_termination() {
    let mut launched = spawn_piped("sleep", &args(&["10"])).expect("Failed to spawn sleep");

    signal_term_group(launched.pid()).expect("Failed to send SIGTERM");
    let status = poll_exit(&mut launched.child, Duration::from_secs(5))
        .expect("wait")
        .expect("sleep should exit on SIGTERM");
    assert_eq!(exit_code(status), 128 + libc::SIGTERM);
}

/// Test that grandchildren are killed with the group
#[test]
fn test_group_kill_reaches_grandchildren() {
    let mut launched = spawn_piped("sh", &args(&["-c", "sleep 30 & echo $!; wait"]))
        .expect("Failed to spawn sh");

    // Read the grandchild pid printed by the shell
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    while !out.ends_with(b"\n") && Instant::now() < deadline {
        match launched.stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10))
            }
            Err(e) => panic!("read failed: {}", e),
        }
    }
    let grandchild: i32 = String::from_utf8_lossy(&out)
        .trim()
        .parse()
        .expect("grandchild pid");

    terminate(&mut launched.child, Duration::from_millis(500)).expect("sh should be reaped");

    // The grandchild was reparented; wait until it is gone or a zombie
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut alive = true;
    while Instant::now() < deadline {
        if !is_running(grandchild) {
            alive = false;
            break;
        }
        std::thread::sleep(Duration::from_millis(20));
    }
    assert!(!alive, "grandchild {} survived the group kill", grandchild);
}

/// Test that stdin and stdout pipes are wired through
#[test]
fn test_pipes_round_trip() {
    let mut launched = spawn_piped("cat", &[]).expect("Failed to spawn cat");

    launched.stdin.write_all(b"ping\n").expect("write stdin");
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut out = Vec::new();
    let mut buf = [0u8; 64];
    while out.len() < 5 && Instant::now() < deadline {
        match launched.stdout.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => out.extend_from_slice(&buf[..n]),
            Err(e) if e.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(Duration::from_millis(10))
            }
            Err(e) => panic!("read failed: {}", e),
        }
    }
    assert_eq!(out, b"ping\n");

    drop(launched.stdin);
    let status = poll_exit(&mut launched.child, Duration::from_secs(5))
        .expect("wait")
        .expect("cat should exit on EOF");
    assert_eq!(exit_code(status), 0);
}

/// Test that signalling an already reaped group is not an error
#[test]
fn test_signal_after_exit() {
    let mut launched = spawn_piped("true", &[]).expect("Failed to spawn true");
    let pid = launched.pid();
    poll_exit(&mut launched.child, Duration::from_secs(5))
        .expect("wait")
        .expect("true should exit");

    assert!(signal_term_group(pid).is_ok());
    assert!(signal_kill_group(pid).is_ok());
}
