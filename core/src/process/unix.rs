//! Unix process launching with piped stdio and process-group signalling
//!
//! This module owns every raw OS interaction of the engine:
//!
//! - Spawning a child with all three standard streams redirected onto pipes
//! - Switching the parent's read ends to non-blocking mode
//! - Signalling the child's process group (SIGTERM, then SIGKILL)
//! - Bounded, non-blocking polling for exit
//!
//! ## Process Groups
//!
//! Every child calls `setsid()` before `exec()`, so it leads its own session
//! and process group and has no controlling terminal. Signals are sent to the
//! whole group, which also reaches grandchildren spawned by a shell. A Ctrl-C
//! delivered to the daemon's terminal never reaches the children directly.

// Allow unsafe code for this module since process management requires libc::setsid() calls
#![allow(unsafe_code)]

use crate::{CoreError, Result};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use std::fs::File;
use std::os::fd::{AsRawFd, OwnedFd};
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// A freshly launched child together with the parent's ends of its pipes
#[derive(Debug)]
pub struct PipedChild {
    /// Handle used for non-blocking waits
    pub child: Child,
    /// Write end feeding the child's standard input
    pub stdin: File,
    /// Non-blocking read end of the child's standard output
    pub stdout: File,
    /// Non-blocking read end of the child's standard error
    pub stderr: File,
}

impl PipedChild {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.child.id()
    }
}

/// Spawn `program` with `args`, stdio on pipes, in its own process group
///
/// Pipe creation, fork and exec failures are all reported by this call: the
/// standard library forwards an `exec` error from the child over a
/// close-on-exec pipe, so a program that cannot be executed never yields a
/// pid. On every error path the pipes are closed and any child that was
/// created is killed and reaped.
///
/// ## Example
///
/// ```rust,no_run
/// use tether_core::process::unix::spawn_piped;
///
/// let child = spawn_piped("echo", &["hello".to_string()])?;
/// println!("Spawned process with PID: {}", child.pid());
/// # Ok::<(), tether_core::CoreError>(())
/// ```
pub fn spawn_piped(program: &str, args: &[String]) -> Result<PipedChild> {
    debug!("Spawning process: {} {:?}", program, args);

    let mut command = Command::new(program);
    command
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    // Safety: setsid() is async-signal-safe and appropriate for use in pre_exec
    #[deny(unsafe_op_in_unsafe_fn)]
    unsafe {
        command.pre_exec(|| {
            if libc::setsid() == -1 {
                return Err(std::io::Error::last_os_error());
            }
            Ok(())
        });
    }

    let mut child = command.spawn().map_err(|e| {
        error!("Failed to spawn process '{}': {}", program, e);
        CoreError::ProcessSpawn(format!("Failed to spawn '{}': {}", program, e))
    })?;

    let pipes = (child.stdin.take(), child.stdout.take(), child.stderr.take());
    let (stdin, stdout, stderr) = match pipes {
        (Some(stdin), Some(stdout), Some(stderr)) => (
            File::from(OwnedFd::from(stdin)),
            File::from(OwnedFd::from(stdout)),
            File::from(OwnedFd::from(stderr)),
        ),
        _ => {
            discard(&mut child);
            return Err(CoreError::ProcessSpawn(format!(
                "Spawned '{}' without all three pipes",
                program
            )));
        }
    };

    if let Err(e) = set_nonblocking(&stdout).and_then(|()| set_nonblocking(&stderr)) {
        error!("Failed to make pipes of '{}' non-blocking: {}", program, e);
        discard(&mut child);
        return Err(e);
    }

    debug!("Successfully spawned process {} in new process group", child.id());

    Ok(PipedChild {
        child,
        stdin,
        stdout,
        stderr,
    })
}

/// Put `file` into `O_NONBLOCK` mode, keeping its other status flags
pub fn set_nonblocking(file: &File) -> Result<()> {
    let fd = file.as_raw_fd();
    let flags = fcntl(fd, FcntlArg::F_GETFL).map_err(errno_to_io)?;
    let flags = OFlag::from_bits_truncate(flags) | OFlag::O_NONBLOCK;
    fcntl(fd, FcntlArg::F_SETFL(flags)).map_err(errno_to_io)?;
    Ok(())
}

fn errno_to_io(e: Errno) -> CoreError {
    CoreError::IoError(std::io::Error::from(e))
}

/// Kill and reap a child that will never be registered
fn discard(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!("Failed to kill discarded child {}: {}", child.id(), e);
    }
    if let Err(e) = child.wait() {
        warn!("Failed to reap discarded child {}: {}", child.id(), e);
    }
}

/// Map an exit status onto a single integer code
///
/// Normal exits yield their code; a child killed by a signal yields
/// `128 + signal`, like a shell does.
pub fn exit_code(status: ExitStatus) -> i32 {
    match status.code() {
        Some(code) => code,
        None => 128 + status.signal().unwrap_or(0),
    }
}

fn signal_group(pid: u32, signal: Signal) -> Result<()> {
    let pgid = Pid::from_raw(pid as i32);
    debug!("Sending {} to process group {}", signal, pgid);

    match killpg(pgid, signal) {
        Ok(()) => Ok(()),
        Err(Errno::ESRCH) => {
            // Process group doesn't exist, which means it already exited
            debug!("Process group {} already exited", pgid);
            Ok(())
        }
        Err(Errno::EPERM) => {
            // Permission denied - process may have already exited or changed ownership
            debug!(
                "Permission denied signaling process group {} (likely already exited)",
                pgid
            );
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process group {}: {}", signal, pgid, e);
            Err(CoreError::ProcessSignal(format!(
                "Failed to send {} to process group {}: {}",
                signal, pgid, e
            )))
        }
    }
}

/// Send SIGTERM to the process group led by `pid`
///
/// `ESRCH` and `EPERM` are treated as success: the group is already gone.
pub fn signal_term_group(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGTERM)
}

/// Send SIGKILL to the process group led by `pid`
pub fn signal_kill_group(pid: u32) -> Result<()> {
    signal_group(pid, Signal::SIGKILL)
}

/// Poll `child` without blocking until it exits or `timeout` elapses
///
/// A zero timeout performs exactly one non-blocking check.
pub fn poll_exit(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let start = Instant::now();
    loop {
        let status = child.try_wait().map_err(|e| {
            CoreError::ProcessWait(format!(
                "Failed to try_wait for process {}: {}",
                child.id(),
                e
            ))
        })?;
        if status.is_some() || start.elapsed() >= timeout {
            return Ok(status);
        }
        std::thread::sleep(POLL_INTERVAL.min(timeout));
    }
}

/// Terminate `child` gracefully, escalating to SIGKILL after `grace`
///
/// Returns the exit status if the child was observed to exit within the
/// bounded waits, `None` otherwise. Signalling errors are logged, not
/// propagated: the caller frees its bookkeeping either way.
pub fn terminate(child: &mut Child, grace: Duration) -> Option<ExitStatus> {
    let pid = child.id();

    if let Err(e) = signal_term_group(pid) {
        warn!("{}", e);
    }
    match poll_exit(child, grace) {
        Ok(Some(status)) => {
            debug!("Process {} exited gracefully with status: {}", pid, status);
            return Some(status);
        }
        Ok(None) => {}
        Err(e) => warn!("{}", e),
    }

    warn!(
        "Process {} did not exit within {:?} of SIGTERM, using SIGKILL",
        pid, grace
    );
    if let Err(e) = signal_kill_group(pid) {
        warn!("{}", e);
    }
    match poll_exit(child, grace) {
        Ok(Some(status)) => {
            debug!("Process {} exited after SIGKILL with status: {}", pid, status);
            Some(status)
        }
        Ok(None) => {
            warn!("Process {} not yet reaped after SIGKILL", pid);
            None
        }
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}
