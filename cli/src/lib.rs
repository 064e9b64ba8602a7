//! Client library behind the `tether` binary
//!
//! Sends protocol lines to the daemon and prints replies the way the daemon
//! sent them: payload bytes verbatim, then the status line.

pub mod error;

pub use error::{CliError, Result};

use ipc::{Connection, ProtocolReply};
use std::io::Write;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::debug;

/// Prompt printed before each interactive command
pub const PROMPT: &str = ">> ";

/// Write `reply` as received: payload, then its status line
pub fn print_reply(out: &mut impl Write, reply: &ProtocolReply) -> Result<()> {
    out.write_all(&reply.payload)?;
    if !reply.payload.is_empty() && !reply.payload.ends_with(b"\n") {
        out.write_all(b"\n")?;
    }
    writeln!(out, "{}", reply.status_line())?;
    out.flush()?;
    Ok(())
}

/// Whether `reply` ends the session
fn is_quit(reply: &ProtocolReply) -> bool {
    reply.is_ok() && reply.detail == "QUIT"
}

/// Send one command and print its reply
///
/// # Errors
///
/// Returns `CommandFailed` with the daemon's detail when it answers `ERR`.
pub async fn run_command(conn: &mut Connection, line: &str, out: &mut impl Write) -> Result<()> {
    let reply = conn.request(line).await?;
    print_reply(out, &reply)?;
    if reply.is_ok() {
        Ok(())
    } else {
        Err(CliError::CommandFailed(reply.detail))
    }
}

/// Interactive session: read commands from `input` until `Quit` or end of input
///
/// `ERR` replies are printed and the session goes on. At end of input the
/// session is closed with `Quit`.
pub async fn repl<R, W>(mut conn: Connection, input: R, out: &mut W, prompt: bool) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: Write,
{
    let mut lines = input.lines();
    loop {
        if prompt {
            write!(out, "{}", PROMPT)?;
            out.flush()?;
        }
        let Some(line) = lines.next_line().await? else {
            debug!("End of input, closing session");
            if prompt {
                writeln!(out)?;
            }
            conn.quit().await?;
            return Ok(());
        };
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            continue;
        }

        let reply = conn.request(line).await?;
        print_reply(out, &reply)?;
        if is_quit(&reply) {
            return Ok(());
        }
    }
}
