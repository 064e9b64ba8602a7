//! IPC (Inter-Process Communication) module
//!
//! Client side of the daemon's line protocol. A [`Connection`] sends one
//! command line at a time and collects the reply: any raw payload lines
//! followed by a single `OK`/`ERR` status line.

pub mod error;


pub use error::{IpcError, Result};

use schema::{ClientConfig, ReplyStatus};
use std::future::Future;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tracing::debug;

/// Maximum allowed size of a single reply line (1MB)
/// This prevents unbounded memory growth from a misbehaving peer
const MAX_LINE_SIZE: usize = 1024 * 1024;

/// IPC client for communicating with the daemon
#[derive(Debug, Clone)]
pub struct IpcClient {
    host: String,
    port: u16,
    timeout: Option<Duration>,
}

impl IpcClient {
    /// Create a new IPC client
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            timeout: None,
        }
    }

    /// Create a client from the client configuration
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.daemon_host.clone(), config.daemon_port)
            .with_timeout(Duration::from_secs(config.timeout_seconds))
    }

    /// Bound connecting and every request by `timeout`; zero disables the bound
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = (!timeout.is_zero()).then_some(timeout);
        self
    }

    /// Address this client connects to
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Connect to the daemon and read its banner
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or the daemon closes it
    /// before sending a banner.
    pub async fn connect(&self) -> Result<Connection> {
        let addr = self.addr();
        debug!("Connecting to daemon at {}", addr);

        bounded(self.timeout, "connect", open(addr, self.timeout)).await
    }
}

/// Open a TCP session and read the banner
async fn open(addr: String, timeout: Option<Duration>) -> Result<Connection> {
    let stream = TcpStream::connect(&addr)
        .await
        .map_err(|e| IpcError::ConnectionFailed(format!("{}: {}", addr, e)))?;
    let (reader, writer) = stream.into_split();
    let mut reader = BufReader::new(reader);

    let banner = match read_line(&mut reader).await? {
        Some(line) => line,
        None => return Err(IpcError::ConnectionClosed),
    };
    let banner = String::from_utf8_lossy(&banner).trim_end().to_string();
    debug!("Daemon banner: {}", banner);

    // A daemon at its connection limit answers with a status line instead
    if let Some((ReplyStatus::Err, detail)) = ReplyStatus::parse_line(&banner) {
        return Err(IpcError::ConnectionFailed(detail));
    }

    Ok(Connection {
        reader,
        writer,
        banner,
        timeout,
    })
}

/// Reply to one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolReply {
    /// Raw payload bytes preceding the status line
    pub payload: Vec<u8>,
    /// `OK` or `ERR`
    pub status: ReplyStatus,
    /// Text after the status word, possibly empty
    pub detail: String,
}

impl ProtocolReply {
    /// Whether the daemon reported success
    pub fn is_ok(&self) -> bool {
        self.status == ReplyStatus::Ok
    }

    /// Payload decoded as UTF-8, replacing invalid sequences
    pub fn payload_text(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }

    /// The status line as sent by the daemon
    pub fn status_line(&self) -> String {
        if self.detail.is_empty() {
            self.status.to_string()
        } else {
            format!("{} {}", self.status, self.detail)
        }
    }
}

/// An open session with the daemon
#[derive(Debug)]
pub struct Connection {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    banner: String,
    timeout: Option<Duration>,
}

impl Connection {
    /// Banner sent by the daemon on connect
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Send one command line and wait for its reply
    ///
    /// # Errors
    ///
    /// Returns an error if `line` spans several lines, the write fails, or
    /// the connection ends before a status line arrives.
    pub async fn request(&mut self, line: &str) -> Result<ProtocolReply> {
        if line.contains('\n') {
            return Err(IpcError::ProtocolError(
                "request must be a single line".to_string(),
            ));
        }
        debug!("Sending request: {}", line);

        let timeout = self.timeout;
        bounded(timeout, "request", self.exchange(line)).await
    }

    async fn exchange(&mut self, line: &str) -> Result<ProtocolReply> {
        let mut data = Vec::with_capacity(line.len() + 1);
        data.extend_from_slice(line.as_bytes());
        data.push(b'\n');
        self.writer
            .write_all(&data)
            .await
            .map_err(|e| IpcError::SendFailed(e.to_string()))?;
        self.writer
            .flush()
            .await
            .map_err(|e| IpcError::SendFailed(e.to_string()))?;

        self.read_reply().await
    }

    /// Read lines until a status line, collecting everything before it as payload
    async fn read_reply(&mut self) -> Result<ProtocolReply> {
        let mut payload = Vec::new();
        loop {
            let Some(line) = read_line(&mut self.reader).await? else {
                return Err(IpcError::ConnectionClosed);
            };
            let text = String::from_utf8_lossy(&line);
            if let Some((status, detail)) = ReplyStatus::parse_line(text.trim_end_matches(&['\r', '\n'][..])) {
                return Ok(ProtocolReply {
                    payload,
                    status,
                    detail,
                });
            }
            payload.extend_from_slice(&line);
        }
    }

    /// Send `Quit` and wait for the daemon to close the connection
    pub async fn quit(mut self) -> Result<ProtocolReply> {
        let reply = self.request("Quit").await?;
        match read_line(&mut self.reader).await {
            Ok(None) => Ok(reply),
            Ok(Some(_)) => Err(IpcError::ProtocolError(
                "data received after Quit".to_string(),
            )),
            Err(e) => Err(e),
        }
    }
}

/// Run `fut`, failing with `Timeout` if it outlives `timeout`
async fn bounded<T>(
    timeout: Option<Duration>,
    what: &str,
    fut: impl Future<Output = Result<T>>,
) -> Result<T> {
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| IpcError::Timeout(format!("{} timed out after {:?}", what, limit)))?,
        None => fut.await,
    }
}

/// Read one newline-terminated line with bounded buffering
///
/// Returns `None` on a clean end of stream, keeping the terminator otherwise.
async fn read_line(reader: &mut BufReader<OwnedReadHalf>) -> Result<Option<Vec<u8>>> {
    let mut buffer = Vec::with_capacity(256);
    loop {
        let chunk = reader
            .fill_buf()
            .await
            .map_err(|e| IpcError::ReceiveFailed(e.to_string()))?;
        if chunk.is_empty() {
            if buffer.is_empty() {
                return Ok(None);
            }
            return Err(IpcError::ProtocolError(
                "incomplete frame: connection closed before newline terminator".to_string(),
            ));
        }

        let newline_pos = chunk.iter().position(|b| *b == b'\n');
        let to_copy = newline_pos.map_or(chunk.len(), |idx| idx + 1);
        let next_len = buffer.len() + to_copy;
        if next_len > MAX_LINE_SIZE {
            return Err(IpcError::ProtocolError(format!(
                "Reply line size {next_len} exceeds maximum allowed size of {MAX_LINE_SIZE} bytes"
            )));
        }

        buffer.extend_from_slice(&chunk[..to_copy]);
        reader.consume(to_copy);
        if newline_pos.is_some() {
            return Ok(Some(buffer));
        }
    }
}
