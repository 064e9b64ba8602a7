//! Process supervision engine
//!
//! The [`Supervisor`] is a cheaply cloneable handle to the process table,
//! shared by every connection. All table access goes through one mutex;
//! work that may take a while (fork/exec, pipe reads and writes, waiting for
//! a signalled child) happens outside of it on cloned handles.
//!
//! The engine is split by concern:
//! - this module: construction, launching, listing and shutdown
//! - [`relay`]: stdin writes and non-blocking stdout/stderr drains
//! - [`reaper`]: lazy exit-status collection and destruction

use crate::process::unix;
use crate::table::{ProcessEntry, ProcessSummary, ProcessTable};
use crate::{CoreError, Result};
use schema::DaemonConfig;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

pub mod reaper;
pub mod relay;

#[cfg(test)]
mod supervisor_tests;

/// Configuration for a [`Supervisor`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Capacity of the process table
    pub capacity: usize,
    /// Bounded wait after each termination signal in a destroy
    pub destroy_grace: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self::from(&DaemonConfig::default())
    }
}

impl From<&DaemonConfig> for SupervisorConfig {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            capacity: config.max_processes,
            destroy_grace: Duration::from_millis(config.destroy_grace_ms),
        }
    }
}

#[derive(Debug)]
struct Shared {
    table: Mutex<ProcessTable>,
    destroy_grace: Duration,
}

/// Shared handle to the process table and the operations acting on it
#[derive(Debug, Clone)]
pub struct Supervisor {
    inner: Arc<Shared>,
}

impl Default for Supervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl Supervisor {
    /// Create a supervisor with an empty table
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            inner: Arc::new(Shared {
                table: Mutex::new(ProcessTable::new(config.capacity)),
                destroy_grace: config.destroy_grace,
            }),
        }
    }

    /// Lock the table.
    ///
    /// Table state is consistent between operations, so a lock poisoned by a
    /// panicking holder is still usable.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ProcessTable> {
        self.inner.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn destroy_grace(&self) -> Duration {
        self.inner.destroy_grace
    }

    /// Capacity of the process table
    pub fn capacity(&self) -> usize {
        self.lock().capacity()
    }

    /// Number of tracked processes
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no process is tracked
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Whether `pid` is tracked
    pub fn contains(&self, pid: u32) -> bool {
        self.lock().contains(pid)
    }

    /// Launch `program` with `args` and start tracking it
    ///
    /// Capacity is claimed before anything is spawned. Any failure releases
    /// the claim and leaves no descriptor or child behind.
    pub fn create(&self, program: &str, args: &[String]) -> Result<u32> {
        self.lock().reserve()?;
        let reservation = Reservation {
            supervisor: self,
            committed: false,
        };

        let launched = unix::spawn_piped(program, args)?;
        let pid = launched.pid();
        let command_line = std::iter::once(program)
            .chain(args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");
        let entry = ProcessEntry::new(
            launched.child,
            launched.stdin,
            launched.stdout,
            launched.stderr,
            command_line,
        );

        reservation.commit(entry)?;
        info!("Created process {}", pid);
        Ok(pid)
    }

    /// Listing rows in slot order
    ///
    /// Running entries are given a chance to report their exit status first.
    pub fn list(&self) -> Vec<ProcessSummary> {
        let mut table = self.lock();
        for pid in table.pids() {
            if let Ok(entry) = table.find_mut(pid) {
                reaper::refresh(entry);
            }
        }
        table.list()
    }

    /// Destroy every tracked process; returns how many were destroyed
    ///
    /// Called on daemon shutdown so that no child outlives the daemon.
    pub fn terminate_all(&self) -> usize {
        let pids = self.lock().pids();
        let mut destroyed = 0;
        for pid in pids {
            match self.destroy(pid) {
                Ok(()) => destroyed += 1,
                Err(e) => debug!("Skipping process {} during shutdown: {}", pid, e),
            }
        }
        if destroyed > 0 {
            info!("Terminated {} tracked process(es)", destroyed);
        }
        destroyed
    }
}

/// A claimed table slot, released on drop unless committed
struct Reservation<'a> {
    supervisor: &'a Supervisor,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, mut entry: ProcessEntry) -> Result<u32> {
        self.committed = true;
        let pid = entry.pid();
        let mut table = self.supervisor.lock();
        if table.contains(pid) {
            table.release_reservation();
            drop(table);
            warn!("Process {} is already tracked, discarding the new child", pid);
            unix::terminate(&mut entry.child, self.supervisor.destroy_grace());
            return Err(CoreError::ValidationError(format!(
                "pid {} is already tracked",
                pid
            )));
        }
        table.insert(entry)
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.supervisor.lock().release_reservation();
        }
    }
}
