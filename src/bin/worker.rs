//! Hosts a supervisor and serves the bridge protocol on stdin/stdout.
//!
//! Usage: `tomcat-worker [CONFIG]`. When a configuration file is given, its
//! `Supervisor` section is used. Logs go to stderr, filtered by `RUST_LOG`.

use anyhow::Context;
use tomcat_runner::Config;
use tomcat_runner::bridge::serve_connection;
use tomcat_runner::config::{SupervisorConfig, validate_config};
use tomcat_runner::server::ProcessSupervisor;
use tracing_subscriber::{EnvFilter, fmt};

fn supervisor_config() -> anyhow::Result<SupervisorConfig> {
    let Some(path) = std::env::args().nth(1) else {
        return Ok(SupervisorConfig::default());
    };

    let config = Config::from_file(&path).with_context(|| format!("loading {}", path))?;
    validate_config(&config).with_context(|| format!("validating {}", path))?;
    Ok(config.supervisor)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries the protocol
    fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config = supervisor_config()?;
    tracing::info!(?config, "Starting tomcat-worker");

    let handle = ProcessSupervisor::spawn(config);

    tokio::select! {
        result = serve_connection(handle, tokio::io::stdin(), tokio::io::stdout()) => {
            result.context("serving bridge connection")?;
            tracing::info!("Controller disconnected");
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("waiting for ctrl-c")?;
            tracing::info!("Interrupted");
        }
    }

    Ok(())
}
