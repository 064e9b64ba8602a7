//! Tether daemon binary
//!
//! Remote process-control daemon speaking a line protocol over TCP.

use clap::Parser;
use daemon::Daemon;
use schema::DaemonConfig;
use std::path::PathBuf;
use tether_core::config::load_daemon_config_from_toml_path;
use tether_core::utils::{init_tracing, validate_config};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "tetherd")]
#[command(about = "Remote process-control daemon")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long)]
    port: Option<u16>,

    /// Address to bind
    #[arg(long)]
    host: Option<String>,

    /// Path to a TOML config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(long)]
    verbose: bool,

    /// Print the JSON Schema of the config file and exit
    #[arg(long)]
    print_config_schema: bool,
}

impl Args {
    /// Config file values overridden by command-line flags
    fn resolve(&self) -> daemon::Result<DaemonConfig> {
        let mut config = match &self.config {
            Some(path) => load_daemon_config_from_toml_path(path)?,
            None => DaemonConfig::default(),
        };
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if self.verbose {
            config.log_level = "debug".to_string();
        }
        validate_config(&config)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> daemon::Result<()> {
    let args = Args::parse();

    if args.print_config_schema {
        let schema = schemars::schema_for!(DaemonConfig);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config = args.resolve()?;
    init_tracing(&config.log_level)?;

    info!("Starting Tether Daemon");
    let daemon = Daemon::new(config);

    // Handle graceful shutdown
    let daemon_clone = daemon.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down..."),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        daemon_clone.stop();
    });

    if let Err(e) = daemon.start().await {
        error!("Daemon failed: {}", e);
        return Err(e);
    }

    info!("Daemon stopped");
    Ok(())
}
