//! Daemon library for the Tether project
//!
//! Serves the line protocol over TCP. Each connection gets a banner, then
//! one reply per non-blank command line until `Quit` or end of stream.
//! Commands run on the blocking pool against the shared [`Supervisor`].
//!
//! [`Daemon::stop`] ends the accept loop and every open session. Shutdown
//! waits for in-flight commands before destroying the tracked processes, so
//! no child is created after the final sweep.

pub mod simple_error;


use schema::DaemonConfig;
pub use simple_error::{DaemonError, Result};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tether_core::{Dispatcher, Supervisor, SupervisorConfig};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{watch, Semaphore};
use tracing::{debug, error, info, warn};

/// Reply sent to connections above the configured limit
const TOO_MANY_CONNECTIONS: &[u8] = b"ERR too many connections\n";
/// Reply sent before closing a connection whose request line is too long
const LINE_TOO_LONG: &[u8] = b"ERR line too long\n";

/// The main daemon server
#[derive(Debug)]
pub struct Daemon {
    config: DaemonConfig,
    dispatcher: Dispatcher,
    banner: Arc<str>,
    running: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
    connections: Arc<Semaphore>,
}

impl Daemon {
    /// Create a new daemon instance with an empty process table
    #[must_use]
    pub fn new(config: DaemonConfig) -> Self {
        let supervisor = Supervisor::new(SupervisorConfig::from(&config));
        let connections = Arc::new(Semaphore::new(config.max_connections));
        Self {
            dispatcher: Dispatcher::new(supervisor),
            banner: banner().into(),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(watch::channel(false).0),
            connections,
            config,
        }
    }

    /// Configuration this daemon was built with
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// The shared process supervisor
    pub fn supervisor(&self) -> &Supervisor {
        self.dispatcher.supervisor()
    }

    /// Greeting sent to every accepted connection
    pub fn banner(&self) -> &str {
        &self.banner
    }

    /// Whether the accept loop is running
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Bind the configured address
    ///
    /// # Errors
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        TcpListener::bind(&addr)
            .await
            .map_err(|e| DaemonError::ServerError(format!("Failed to bind to {addr}: {e}")))
    }

    /// Bind and serve until [`Daemon::stop`] is called
    ///
    /// # Errors
    /// Returns an error if the TCP listener cannot be bound.
    pub async fn start(&self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Accept connections on `listener` until [`Daemon::stop`] is called
    ///
    /// Once the loop ends, open sessions are waited for and every tracked
    /// process is destroyed.
    ///
    /// # Errors
    /// Returns an error if the shutdown cleanup task fails.
    pub async fn serve(&self, listener: TcpListener) -> Result<()> {
        let local = listener.local_addr()?;
        let mut shutdown = self.shutdown.subscribe();
        if *shutdown.borrow_and_update() {
            warn!("Daemon on {} was stopped before it started", local);
        } else {
            self.running.store(true, Ordering::SeqCst);
            info!("Daemon started on {}", local);
        }

        while self.is_running() {
            tokio::select! {
                _ = shutdown.wait_for(|&stopping| stopping) => break,
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer)) => self.admit(stream, peer),
                    Err(e) => error!("Failed to accept connection: {}", e),
                },
            }
        }
        self.running.store(false, Ordering::SeqCst);
        drop(listener);

        // Every session holds a permit until it has stopped dispatching
        let all = u32::try_from(self.config.max_connections).unwrap_or(u32::MAX);
        debug!("Waiting for open sessions to end");
        let _drained = self
            .connections
            .acquire_many(all)
            .await
            .map_err(|e| DaemonError::ServerError(format!("Connection limiter closed: {e}")))?;

        let supervisor = self.supervisor().clone();
        let destroyed = tokio::task::spawn_blocking(move || supervisor.terminate_all()).await?;
        info!("Daemon stopped, {} process(es) destroyed", destroyed);
        Ok(())
    }

    /// Hand an accepted connection to its own task, or turn it away at the limit
    fn admit(&self, stream: TcpStream, peer: SocketAddr) {
        match Arc::clone(&self.connections).try_acquire_owned() {
            Ok(permit) => {
                info!("New connection from {}", peer);
                let daemon = self.clone();
                tokio::spawn(async move {
                    if let Err(e) = daemon.handle_connection(stream).await {
                        error!("Error handling connection from {}: {}", peer, e);
                    }
                    drop(permit);
                    debug!("Connection from {} closed", peer);
                });
            }
            Err(_) => {
                warn!("Rejecting connection from {}: too many connections", peer);
                tokio::spawn(async move {
                    let mut stream = stream;
                    if let Err(e) = stream.write_all(TOO_MANY_CONNECTIONS).await {
                        debug!("Failed to notify rejected connection {}: {}", peer, e);
                    }
                });
            }
        }
    }

    /// Serve one client until `Quit`, end of stream, an over-long line, or
    /// [`Daemon::stop`]
    ///
    /// A request read after `stop` is dropped without being executed.
    ///
    /// # Errors
    /// Returns an error if reading a request or delivering a reply fails;
    /// only this connection is affected.
    pub async fn handle_connection(&self, stream: TcpStream) -> Result<()> {
        let (reader_half, mut writer_half) = stream.into_split();
        let mut reader = BufReader::new(reader_half);
        let max_line = self.config.max_line_length;
        let mut frame = Vec::with_capacity(max_line.min(4096));
        let mut shutdown = self.shutdown.subscribe();

        writer_half.write_all(format!("{}\n", self.banner).as_bytes()).await?;
        writer_half.flush().await?;

        loop {
            frame.clear();
            // Room for the longest line plus a CRLF terminator
            let limit = (max_line + 2) as u64;
            let mut bounded = (&mut reader).take(limit);
            let n = tokio::select! {
                _ = shutdown.wait_for(|&stopping| stopping) => {
                    debug!("Closing session: daemon is shutting down");
                    break;
                }
                read = bounded.read_until(b'\n', &mut frame) => read?,
            };
            if n == 0 {
                break;
            }
            if *shutdown.borrow() {
                debug!("Dropping request received during shutdown");
                break;
            }

            let terminated = frame.last() == Some(&b'\n');
            if terminated {
                frame.pop();
                if frame.last() == Some(&b'\r') {
                    frame.pop();
                }
            }
            if frame.len() > max_line {
                warn!("Closing connection: request exceeds {} bytes", max_line);
                writer_half.write_all(LINE_TOO_LONG).await?;
                writer_half.flush().await?;
                break;
            }

            let line = frame.clone();
            let dispatcher = self.dispatcher.clone();
            let reply = tokio::task::spawn_blocking(move || dispatcher.dispatch(&line)).await?;

            if let Some(reply) = reply {
                let encoded = reply.encode();
                // A peer that stops reading must not hold up shutdown
                tokio::select! {
                    biased;
                    written = deliver(&mut writer_half, &encoded) => written?,
                    _ = shutdown.wait_for(|&stopping| stopping) => break,
                }
                if reply.close {
                    break;
                }
            }
            if !terminated {
                // Unterminated final line: the peer already closed its side
                break;
            }
        }

        Ok(())
    }

    /// Stop the daemon: the accept loop and all open sessions end
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        self.shutdown.send_replace(true);
    }
}

impl Clone for Daemon {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            dispatcher: self.dispatcher.clone(),
            banner: Arc::clone(&self.banner),
            running: Arc::clone(&self.running),
            shutdown: Arc::clone(&self.shutdown),
            connections: Arc::clone(&self.connections),
        }
    }
}

async fn deliver(writer: &mut OwnedWriteHalf, bytes: &[u8]) -> std::io::Result<()> {
    writer.write_all(bytes).await?;
    writer.flush().await
}

/// `Welcome to tetherd <version> on <hostname>`
fn banner() -> String {
    let host = match nix::unistd::gethostname() {
        Ok(name) => name.to_string_lossy().into_owned(),
        Err(e) => {
            warn!("Failed to read hostname: {}", e);
            "localhost".to_string()
        }
    };
    format!("Welcome to tetherd {} on {}", env!("CARGO_PKG_VERSION"), host)
}
