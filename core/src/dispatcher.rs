//! Command dispatcher for the line protocol
//!
//! Each client line is parsed into a [`Command`], executed against the
//! [`Supervisor`], and answered with exactly one [`Reply`]. Every failure is
//! turned into an `ERR` reply here; nothing propagates to the transport.
//!
//! ## Wire format
//!
//! A reply is an optional raw payload followed by one status line:
//!
//! ```text
//! hello
//! OK
//! ```
//!
//! The status line is `OK` or `ERR`, followed by a space and a detail when
//! the detail is not empty. A payload that does not end in a newline gets one
//! appended so the status line always starts a line; a client cannot tell
//! that newline from one the process wrote.

use crate::supervisor::Supervisor;
use crate::table::ProcessSummary;
use crate::CoreError;
use schema::{ReplyStatus, StdStream};
use std::fmt;
use tracing::{debug, warn};

pub const CREATE_PROCESS: &str = "CreateProcess";
pub const DESTROY_PROCESS: &str = "DestroyProcess";
pub const SEND_INPUT: &str = "SendInput";
pub const CLOSE_INPUT: &str = "CloseInput";
pub const GET_OUTPUT: &str = "GetOutput";
pub const GET_ERROR: &str = "GetError";
pub const GET_RETURN_CODE: &str = "GetReturnCode";
pub const LIST_PROCESS: &str = "ListProcess";
pub const HELP: &str = "Help";
pub const QUIT: &str = "Quit";

/// Help text sent in reply to `Help`
pub const HELP_TEXT: &str = "\
CreateProcess <command line>   start a process, replies with its pid
DestroyProcess <pid>           terminate a process and forget it
SendInput <pid> <input>        write a line to the standard input of a process
CloseInput <pid>               close the standard input of a process
GetOutput <pid>                fetch pending standard output of a process
GetError <pid>                 fetch pending standard error of a process
GetReturnCode <pid>            fetch the exit code of a terminated process
ListProcess                    list tracked processes
Help                           show this help
Quit                           close the connection
";

/// A parsed protocol command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    CreateProcess { program: String, args: Vec<String> },
    DestroyProcess(u32),
    SendInput { pid: u32, text: Vec<u8> },
    CloseInput(u32),
    GetOutput(u32),
    GetError(u32),
    GetReturnCode(u32),
    ListProcess,
    Help,
    Quit,
}

/// Why a line could not be parsed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Missing or malformed argument; carries the usage of the verb
    Syntax(&'static str),
    /// First token is not a known verb
    UnknownCommand(String),
    /// A command line token is not valid UTF-8
    NotUtf8,
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseError::Syntax(usage) => write!(f, "usage: {}", usage),
            ParseError::UnknownCommand(_) => f.write_str("unknown command"),
            ParseError::NotUtf8 => f.write_str("command line is not valid UTF-8"),
        }
    }
}

const CREATE_SYNTAX: &str = "CreateProcess <command line>";
const DESTROY_SYNTAX: &str = "DestroyProcess <pid>";
const SEND_SYNTAX: &str = "SendInput <pid> <input>";
const CLOSE_SYNTAX: &str = "CloseInput <pid>";
const OUTPUT_SYNTAX: &str = "GetOutput <pid>";
const ERROR_SYNTAX: &str = "GetError <pid>";
const RETURN_CODE_SYNTAX: &str = "GetReturnCode <pid>";

/// Split off the next space-separated token, skipping leading separators.
///
/// The remainder starts right after the single space ending the token.
fn next_token(input: &[u8]) -> Option<(&[u8], &[u8])> {
    let start = input.iter().position(|&b| b != b' ')?;
    let trimmed = &input[start..];
    match trimmed.iter().position(|&b| b == b' ') {
        Some(i) => Some((&trimmed[..i], &trimmed[i + 1..])),
        None => Some((trimmed, &trimmed[trimmed.len()..])),
    }
}

fn tokens(mut input: &[u8]) -> Result<Vec<String>, ParseError> {
    let mut out = Vec::new();
    while let Some((token, rest)) = next_token(input) {
        let word = std::str::from_utf8(token).map_err(|_| ParseError::NotUtf8)?;
        out.push(word.to_string());
        input = rest;
    }
    Ok(out)
}

fn parse_pid<'a>(input: &'a [u8], usage: &'static str) -> Result<(u32, &'a [u8]), ParseError> {
    let (token, rest) = next_token(input).ok_or(ParseError::Syntax(usage))?;
    let pid = std::str::from_utf8(token)
        .ok()
        .and_then(|t| t.parse::<u32>().ok())
        .ok_or(ParseError::Syntax(usage))?;
    Ok((pid, rest))
}

impl Command {
    /// Parse one request line; `Ok(None)` for a blank line
    ///
    /// A trailing `\n` or `\r\n` is ignored. Verbs, pids and command lines
    /// must be UTF-8. For `SendInput` the input is every byte after the pid
    /// and its separating space, kept verbatim.
    pub fn parse(line: &[u8]) -> Result<Option<Command>, ParseError> {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        let line = line.strip_suffix(b"\r").unwrap_or(line);

        let Some((verb, rest)) = next_token(line) else {
            return Ok(None);
        };
        let Ok(verb) = std::str::from_utf8(verb) else {
            return Err(ParseError::UnknownCommand(String::from_utf8_lossy(verb).into_owned()));
        };

        let command = match verb {
            CREATE_PROCESS => {
                let mut words = tokens(rest)?.into_iter();
                let program = words.next().ok_or(ParseError::Syntax(CREATE_SYNTAX))?;
                Command::CreateProcess {
                    program,
                    args: words.collect(),
                }
            }
            DESTROY_PROCESS => Command::DestroyProcess(parse_pid(rest, DESTROY_SYNTAX)?.0),
            SEND_INPUT => {
                let (pid, text) = parse_pid(rest, SEND_SYNTAX)?;
                if text.is_empty() {
                    return Err(ParseError::Syntax(SEND_SYNTAX));
                }
                Command::SendInput {
                    pid,
                    text: text.to_vec(),
                }
            }
            CLOSE_INPUT => Command::CloseInput(parse_pid(rest, CLOSE_SYNTAX)?.0),
            GET_OUTPUT => Command::GetOutput(parse_pid(rest, OUTPUT_SYNTAX)?.0),
            GET_ERROR => Command::GetError(parse_pid(rest, ERROR_SYNTAX)?.0),
            GET_RETURN_CODE => Command::GetReturnCode(parse_pid(rest, RETURN_CODE_SYNTAX)?.0),
            LIST_PROCESS => Command::ListProcess,
            HELP => Command::Help,
            QUIT => Command::Quit,
            other => return Err(ParseError::UnknownCommand(other.to_string())),
        };
        Ok(Some(command))
    }

    /// Protocol verb of this command
    pub fn verb(&self) -> &'static str {
        match self {
            Command::CreateProcess { .. } => CREATE_PROCESS,
            Command::DestroyProcess(_) => DESTROY_PROCESS,
            Command::SendInput { .. } => SEND_INPUT,
            Command::CloseInput(_) => CLOSE_INPUT,
            Command::GetOutput(_) => GET_OUTPUT,
            Command::GetError(_) => GET_ERROR,
            Command::GetReturnCode(_) => GET_RETURN_CODE,
            Command::ListProcess => LIST_PROCESS,
            Command::Help => HELP,
            Command::Quit => QUIT,
        }
    }
}

/// The answer to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Raw bytes sent before the status line
    pub payload: Vec<u8>,
    /// `OK` or `ERR`
    pub status: ReplyStatus,
    /// Verb-specific detail, possibly empty
    pub detail: String,
    /// Whether the connection must be closed after this reply
    pub close: bool,
}

impl Reply {
    /// Successful reply with a detail
    pub fn ok(detail: impl Into<String>) -> Self {
        Self {
            payload: Vec::new(),
            status: ReplyStatus::Ok,
            detail: detail.into(),
            close: false,
        }
    }

    /// Failed reply with a detail
    pub fn err(detail: impl Into<String>) -> Self {
        Self {
            status: ReplyStatus::Err,
            ..Self::ok(detail)
        }
    }

    /// Attach raw payload bytes
    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }

    /// Whether this reply reports success
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// The status line, without its newline
    pub fn status_line(&self) -> String {
        if self.detail.is_empty() {
            self.status.to_string()
        } else {
            // A detail never spans lines
            let detail = self.detail.replace(&['\r', '\n'][..], " ");
            format!("{} {}", self.status, detail)
        }
    }

    /// Bytes to write on the wire
    pub fn encode(&self) -> Vec<u8> {
        let line = self.status_line();
        let mut out = Vec::with_capacity(self.payload.len() + line.len() + 2);
        out.extend_from_slice(&self.payload);
        if !self.payload.is_empty() && !self.payload.ends_with(b"\n") {
            out.push(b'\n');
        }
        out.extend_from_slice(line.as_bytes());
        out.push(b'\n');
        out
    }
}

/// Map an engine error onto the detail of an `ERR` reply
fn failure(context: &str, err: CoreError) -> Reply {
    match err {
        CoreError::NotFound(_) => Reply::err("unknown process"),
        CoreError::ProcessTerminated(_) => Reply::err("process already terminated"),
        CoreError::InputClosed(_) => Reply::err("input closed"),
        other => {
            warn!("{}: {}", context, other);
            Reply::err(format!("{}: {}", context, other))
        }
    }
}

/// Format the `ListProcess` payload
pub fn format_listing(rows: &[ProcessSummary]) -> Vec<u8> {
    let mut out = String::from("Ret.\tPID\tCommand\n");
    for row in rows {
        let ret = row
            .exit_status
            .map(|code| code.to_string())
            .unwrap_or_else(|| "-".to_string());
        out.push_str(&format!("{:>4}\t{}\t{}\n", ret, row.pid, row.command_line));
    }
    out.into_bytes()
}

/// Routes parsed commands to the supervisor
#[derive(Debug, Clone)]
pub struct Dispatcher {
    supervisor: Supervisor,
}

impl Dispatcher {
    /// Create a dispatcher over `supervisor`
    pub fn new(supervisor: Supervisor) -> Self {
        Self { supervisor }
    }

    /// The supervisor commands act on
    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    /// Handle one request line; `None` for a blank line, which gets no reply
    pub fn dispatch(&self, line: &[u8]) -> Option<Reply> {
        match Command::parse(line) {
            Ok(Some(command)) => Some(self.execute(command)),
            Ok(None) => None,
            Err(e) => {
                debug!("Rejected request {:?}: {}", String::from_utf8_lossy(line), e);
                Some(Reply::err(e.to_string()))
            }
        }
    }

    /// Run a parsed command
    pub fn execute(&self, command: Command) -> Reply {
        debug!("Dispatching {}", command.verb());
        let sup = &self.supervisor;
        match command {
            Command::CreateProcess { program, args } => match sup.create(&program, &args) {
                Ok(pid) => Reply::ok(pid.to_string()),
                Err(e) => failure("cannot create process", e),
            },
            Command::DestroyProcess(pid) => match sup.destroy(pid) {
                Ok(()) => Reply::ok(""),
                Err(e) => failure("cannot destroy process", e),
            },
            Command::SendInput { pid, text } => match sup.send_input(pid, &text) {
                Ok(()) => Reply::ok(""),
                Err(e) => failure("cannot send input", e),
            },
            Command::CloseInput(pid) => match sup.close_input(pid) {
                Ok(()) => Reply::ok(""),
                Err(e) => failure("cannot close input", e),
            },
            Command::GetOutput(pid) => match sup.drain(pid, StdStream::Stdout) {
                Ok(data) => Reply::ok("").with_payload(data),
                Err(e) => failure("cannot read output", e),
            },
            Command::GetError(pid) => match sup.drain(pid, StdStream::Stderr) {
                Ok(data) => Reply::ok("").with_payload(data),
                Err(e) => failure("cannot read error output", e),
            },
            Command::GetReturnCode(pid) => match sup.return_code(pid) {
                Ok(Some(code)) => Reply::ok(code.to_string()),
                Ok(None) => Reply::err("process not terminated"),
                Err(e) => failure("cannot read return code", e),
            },
            Command::ListProcess => Reply::ok("").with_payload(format_listing(&sup.list())),
            Command::Help => Reply::ok("").with_payload(HELP_TEXT.as_bytes().to_vec()),
            Command::Quit => Reply {
                close: true,
                ..Reply::ok("QUIT")
            },
        }
    }
}
