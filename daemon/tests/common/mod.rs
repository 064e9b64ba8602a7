//! Test utilities for integration tests in the daemon crate.

#![allow(dead_code)]

use daemon::Daemon;
use ipc::{Connection, IpcClient, ProtocolReply};
use schema::DaemonConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Run the given future with a timeout, failing the test if it elapses.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Run a future with a default timeout of 60 seconds.
pub async fn run_with_default_timeout<F, T>(fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    run_with_timeout(Duration::from_secs(60), fut).await
}

/// Loopback config with the given process capacity
pub fn loopback_config(max_processes: usize) -> DaemonConfig {
    DaemonConfig {
        host: "127.0.0.1".to_string(),
        max_processes,
        ..DaemonConfig::default()
    }
}

/// A daemon serving on an ephemeral loopback port
pub struct TestDaemon {
    pub daemon: Daemon,
    pub addr: SocketAddr,
    server: JoinHandle<daemon::Result<()>>,
}

impl TestDaemon {
    /// Start serving `config` on port 0
    pub async fn start(config: DaemonConfig) -> Self {
        let daemon = Daemon::new(config);
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("local addr");
        let server = {
            let daemon = daemon.clone();
            tokio::spawn(async move { daemon.serve(listener).await })
        };
        Self {
            daemon,
            addr,
            server,
        }
    }

    /// Client for this daemon
    pub fn client(&self) -> IpcClient {
        IpcClient::new(self.addr.ip().to_string(), self.addr.port())
            .with_timeout(Duration::from_secs(10))
    }

    /// Open a new session
    pub async fn connect(&self) -> Connection {
        self.client().connect().await.expect("connect")
    }

    /// Stop the accept loop and wait for shutdown cleanup
    pub async fn shutdown(self) {
        self.daemon.stop();
        self.server
            .await
            .expect("server task")
            .expect("daemon shut down cleanly");
    }
}

/// Send `line`, retrying every 20ms until `done` accepts the reply or five seconds pass
pub async fn poll_until(
    conn: &mut Connection,
    line: &str,
    mut done: impl FnMut(&ProtocolReply) -> bool,
) -> ProtocolReply {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let reply = conn.request(line).await.expect("request");
        if done(&reply) || tokio::time::Instant::now() >= deadline {
            return reply;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

/// Parse the pid out of a `CreateProcess` reply
pub fn created_pid(reply: &ProtocolReply) -> u32 {
    assert!(reply.is_ok(), "create failed: {}", reply.status_line());
    reply.detail.parse().expect("numeric pid")
}
