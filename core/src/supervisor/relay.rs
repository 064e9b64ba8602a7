//! I/O relay between clients and a child's standard streams
//!
//! Handles are looked up under the table lock and used after it is released:
//! a slow child never holds up unrelated table operations.

use super::Supervisor;
use crate::{CoreError, Result};
use schema::StdStream;
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, warn};

const READ_CHUNK: usize = 4096;

impl Supervisor {
    /// Write the raw bytes of `text` followed by a single newline to the child's stdin
    ///
    /// Fails if the pid is unknown, its exit status has already been
    /// observed, or its input was closed. A failed write is logged and
    /// reported for this call only.
    pub fn send_input(&self, pid: u32, text: &[u8]) -> Result<()> {
        let stdin = {
            let table = self.lock();
            let entry = table.find(pid)?;
            if entry.exit_status.is_some() {
                return Err(CoreError::ProcessTerminated(pid));
            }
            entry.stdin.clone().ok_or(CoreError::InputClosed(pid))?
        };

        let mut data = Vec::with_capacity(text.len() + 1);
        data.extend_from_slice(text);
        data.push(b'\n');

        (&*stdin).write_all(&data).map_err(|e| {
            warn!("Failed to write to stdin of process {}: {}", pid, e);
            CoreError::IoError(e)
        })?;
        debug!("Sent {} byte(s) to process {}", data.len(), pid);
        Ok(())
    }

    /// Close the child's stdin; closing twice is a no-op
    pub fn close_input(&self, pid: u32) -> Result<()> {
        let mut table = self.lock();
        let entry = table.find_mut(pid)?;
        if entry.stdin.take().is_some() {
            debug!("Closed stdin of process {}", pid);
        }
        Ok(())
    }

    /// Read everything `stream` has available right now
    ///
    /// An empty result means nothing was produced since the last drain.
    pub fn drain(&self, pid: u32, stream: StdStream) -> Result<Vec<u8>> {
        let pipe = {
            let table = self.lock();
            let entry = table.find(pid)?;
            match stream {
                StdStream::Stdout => entry.stdout.clone(),
                StdStream::Stderr => entry.stderr.clone(),
            }
        };

        let mut reader = &*pipe;
        let data = read_available(&mut reader, pid, stream);
        debug!("Drained {} byte(s) of {} from process {}", data.len(), stream, pid);
        Ok(data)
    }
}

/// Read from a non-blocking `reader` until it would block or reaches end of stream
pub(crate) fn read_available<R: Read>(reader: &mut R, pid: u32, stream: StdStream) -> Vec<u8> {
    let mut data = Vec::new();
    let mut chunk = [0u8; READ_CHUNK];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => data.extend_from_slice(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) if e.kind() == ErrorKind::WouldBlock => break,
            Err(e) => {
                warn!("Failed to read {} of process {}: {}", stream, pid, e);
                break;
            }
        }
    }
    data
}
