//! Fixed-capacity registry of tracked child processes
//!
//! The table owns the bookkeeping of every child: its pid, pipe handles,
//! cached exit status and command line. Entries are keyed by pid; each also
//! occupies a positional slot that only fixes the listing order.
//!
//! Capacity is claimed with [`ProcessTable::reserve`] before any OS resource
//! is created, so a full table never leads to a fork. The table itself is not
//! synchronized; the [`Supervisor`](crate::supervisor::Supervisor) keeps it
//! behind a single mutex.

use crate::{CoreError, Result};
use std::collections::HashMap;
use std::fs::File;
use std::process::Child;
use std::sync::Arc;

/// One tracked child process
#[derive(Debug)]
pub struct ProcessEntry {
    pid: u32,
    slot: usize,
    pub(crate) child: Child,
    pub(crate) exit_status: Option<i32>,
    pub(crate) stdin: Option<Arc<File>>,
    pub(crate) stdout: Arc<File>,
    pub(crate) stderr: Arc<File>,
    command_line: String,
}

impl ProcessEntry {
    /// Build an entry from a launched child. The slot is assigned on insert.
    pub fn new(child: Child, stdin: File, stdout: File, stderr: File, command_line: String) -> Self {
        Self {
            pid: child.id(),
            slot: 0,
            child,
            exit_status: None,
            stdin: Some(Arc::new(stdin)),
            stdout: Arc::new(stdout),
            stderr: Arc::new(stderr),
            command_line,
        }
    }

    /// OS process identifier
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Positional slot occupied in the table
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Cached exit status, if the child has been observed to exit
    pub fn exit_status(&self) -> Option<i32> {
        self.exit_status
    }

    /// Whether the stdin write end is still open
    pub fn input_open(&self) -> bool {
        self.stdin.is_some()
    }

    /// Program and arguments the child was launched with
    pub fn command_line(&self) -> &str {
        &self.command_line
    }
}

/// Listing row for one entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessSummary {
    /// OS process identifier
    pub pid: u32,
    /// Exit code, `None` while running
    pub exit_status: Option<i32>,
    /// Program and arguments
    pub command_line: String,
}

/// Fixed-capacity process registry
#[derive(Debug)]
pub struct ProcessTable {
    capacity: usize,
    reserved: usize,
    entries: HashMap<u32, ProcessEntry>,
}

impl ProcessTable {
    /// Create an empty table with `capacity` slots
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            reserved: 0,
            entries: HashMap::with_capacity(capacity),
        }
    }

    /// Number of slots
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no entry is live
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether every slot is live or reserved
    pub fn is_full(&self) -> bool {
        self.entries.len() + self.reserved >= self.capacity
    }

    /// Claim one slot for a launch in progress
    pub fn reserve(&mut self) -> Result<()> {
        if self.is_full() {
            return Err(CoreError::CapacityExceeded(self.capacity));
        }
        self.reserved += 1;
        Ok(())
    }

    /// Give back a slot claimed by [`reserve`](Self::reserve) that was not committed
    pub fn release_reservation(&mut self) {
        self.reserved = self.reserved.saturating_sub(1);
    }

    /// Commit a reservation into a live entry at the lowest free slot
    ///
    /// Fails with a validation error if the pid is already tracked; the
    /// reservation is consumed either way.
    pub fn insert(&mut self, mut entry: ProcessEntry) -> Result<u32> {
        self.release_reservation();
        if self.entries.contains_key(&entry.pid) {
            return Err(CoreError::ValidationError(format!(
                "pid {} is already tracked",
                entry.pid
            )));
        }
        entry.slot = self.lowest_free_slot();
        let pid = entry.pid;
        self.entries.insert(pid, entry);
        Ok(pid)
    }

    fn lowest_free_slot(&self) -> usize {
        let mut used: Vec<usize> = self.entries.values().map(|e| e.slot).collect();
        used.sort_unstable();
        let mut slot = 0;
        for s in used {
            if s != slot {
                break;
            }
            slot += 1;
        }
        slot
    }

    /// Look up an entry by pid
    pub fn find(&self, pid: u32) -> Result<&ProcessEntry> {
        self.entries.get(&pid).ok_or(CoreError::NotFound(pid))
    }

    /// Look up an entry by pid for mutation
    pub fn find_mut(&mut self, pid: u32) -> Result<&mut ProcessEntry> {
        self.entries.get_mut(&pid).ok_or(CoreError::NotFound(pid))
    }

    /// Whether `pid` is tracked
    pub fn contains(&self, pid: u32) -> bool {
        self.entries.contains_key(&pid)
    }

    /// Remove and return the entry for `pid`
    pub fn remove(&mut self, pid: u32) -> Option<ProcessEntry> {
        self.entries.remove(&pid)
    }

    /// Tracked pids in slot order
    pub fn pids(&self) -> Vec<u32> {
        let mut slots: Vec<(usize, u32)> = self.entries.values().map(|e| (e.slot, e.pid)).collect();
        slots.sort_unstable();
        slots.into_iter().map(|(_, pid)| pid).collect()
    }

    /// Listing rows in slot order
    pub fn list(&self) -> Vec<ProcessSummary> {
        self.pids()
            .into_iter()
            .filter_map(|pid| self.entries.get(&pid))
            .map(|e| ProcessSummary {
                pid: e.pid,
                exit_status: e.exit_status,
                command_line: e.command_line.clone(),
            })
            .collect()
    }
}
