//! Tether CLI binary
//!
//! Interactive client for the Tether daemon. With a command on the command
//! line it sends that one command; otherwise it reads commands from stdin.

use anyhow::Context;
use clap::Parser;
use cli::CliError;
use ipc::IpcClient;
use schema::ClientConfig;
use std::io::IsTerminal;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "tether")]
#[command(about = "Control processes on a Tether daemon")]
#[command(version)]
struct Cli {
    /// Daemon host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Daemon port
    #[arg(short, long, default_value_t = schema::DEFAULT_PORT)]
    port: u16,

    /// Seconds to wait for the daemon; 0 waits forever
    #[arg(long, default_value_t = 30)]
    timeout: u64,

    /// Command to send, e.g. `CreateProcess /bin/echo hello`
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr so they never mix with replies
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig {
        daemon_host: cli.host,
        daemon_port: cli.port,
        timeout_seconds: cli.timeout,
    };
    let client = IpcClient::from_config(&config);

    let mut conn = client
        .connect()
        .await
        .with_context(|| format!("cannot reach daemon at {}", client.addr()))?;

    let mut stdout = std::io::stdout();
    if cli.command.is_empty() {
        let interactive = std::io::stdin().is_terminal();
        if interactive {
            println!("{}", conn.banner());
        }
        let input = BufReader::new(tokio::io::stdin());
        cli::repl(conn, input, &mut stdout, interactive).await?;
        return Ok(());
    }

    let line = cli.command.join(" ");
    if line.trim().is_empty() {
        return Err(CliError::InvalidArgument("empty command".to_string()).into());
    }
    match cli::run_command(&mut conn, &line, &mut stdout).await {
        Ok(()) => {}
        // The reply was already printed
        Err(CliError::CommandFailed(_)) => std::process::exit(1),
        Err(e) => return Err(e.into()),
    }
    if let Err(e) = conn.quit().await {
        tracing::debug!("Closing session failed: {}", e);
    }
    Ok(())
}
