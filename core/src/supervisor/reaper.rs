//! Lazy exit-status collection and process destruction
//!
//! Children are reaped only when a client asks about them (return code,
//! listing) or destroys them. There is no background sweep: a child that
//! exits unobserved stays a zombie until one of those happens.

use super::Supervisor;
use crate::process::unix;
use crate::table::ProcessEntry;
use crate::{CoreError, Result};
use tracing::{info, warn};

impl Supervisor {
    /// Exit code of `pid`, or `None` while it is still running
    ///
    /// The first observed status is cached and returned unchanged afterwards.
    pub fn return_code(&self, pid: u32) -> Result<Option<i32>> {
        let mut table = self.lock();
        let entry = table.find_mut(pid)?;
        Ok(refresh(entry))
    }

    /// Stop tracking `pid`, terminating it first if it is still running
    ///
    /// The entry is removed even when the child cannot be signalled; such
    /// failures are only logged.
    pub fn destroy(&self, pid: u32) -> Result<()> {
        let entry = self.lock().remove(pid).ok_or(CoreError::NotFound(pid))?;
        dispose(entry, self);
        Ok(())
    }
}

/// Return the cached exit status, polling the child once if none is cached
pub(crate) fn refresh(entry: &mut ProcessEntry) -> Option<i32> {
    if let Some(code) = entry.exit_status {
        return Some(code);
    }
    match entry.child.try_wait() {
        Ok(Some(status)) => {
            let code = unix::exit_code(status);
            entry.exit_status = Some(code);
            info!("Process {} exited with code {}", entry.pid(), code);
            Some(code)
        }
        Ok(None) => None,
        Err(e) => {
            warn!("Failed to query status of process {}: {}", entry.pid(), e);
            None
        }
    }
}

/// Terminate a removed entry if needed and release its descriptors
fn dispose(mut entry: ProcessEntry, supervisor: &Supervisor) {
    let pid = entry.pid();
    if refresh(&mut entry).is_none() {
        match unix::terminate(&mut entry.child, supervisor.destroy_grace()) {
            Some(status) => info!(
                "Process {} terminated with code {}",
                pid,
                unix::exit_code(status)
            ),
            None => warn!("Process {} signalled but not yet reaped", pid),
        }
    }
    // Dropping the entry closes stdin and both read ends
    drop(entry);
    info!("Destroyed process {}", pid);
}
