//! Test utilities for CLI crate integration tests.
#![allow(missing_docs)]
#![allow(dead_code)]

use daemon::Daemon;
use schema::DaemonConfig;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;

/// Run the given future with a timeout, failing the test if it elapses.
///
/// # Panics
///
/// Panics if the timeout elapses before the future completes.
pub async fn run_with_timeout<F, T>(duration: Duration, fut: F) -> T
where
    F: std::future::Future<Output = T>,
{
    tokio::time::timeout(duration, fut)
        .await
        .expect("test timed out")
}

/// Serve a fresh daemon on an ephemeral loopback port
pub async fn spawn_daemon() -> (Daemon, SocketAddr) {
    let daemon = Daemon::new(DaemonConfig {
        host: "127.0.0.1".to_string(),
        ..DaemonConfig::default()
    });
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    let server = daemon.clone();
    tokio::spawn(async move { server.serve(listener).await });
    (daemon, addr)
}
