//! CLI command implementations
//!
//! `serve` builds a runtime, wires the process logger into a control server
//! and runs it until Ctrl-C, then drains within the configured grace period.

use std::sync::Arc;
use std::time::Duration;

use crate::http_server::{ControlServer, ControlServerConfig, ServerOptions};
use crate::observability::{LevelController, Logger};

use super::args::{Command, ServerArgs};
use super::errors::{CliError, CliResult};

/// Dispatch a parsed command
pub fn run_command(command: Command) -> CliResult<()> {
    match command {
        Command::Serve(args) => serve(&args),
        Command::Config(args) => show_config(&args),
    }
}

/// Config file first, then flags on top
pub fn resolve_config(args: &ServerArgs) -> CliResult<ControlServerConfig> {
    let mut config = match &args.config {
        Some(path) => ControlServerConfig::load(path)?,
        None => ControlServerConfig::default(),
    };

    if let Some(addr) = &args.addr {
        let from_flag = ControlServerConfig::from_addr(addr)?;
        config.host = from_flag.host;
        config.port = from_flag.port;
    }
    if let Some(level) = args.level {
        config.log_level = level;
    }
    Ok(config)
}

/// Print the effective configuration
pub fn show_config(args: &ServerArgs) -> CliResult<()> {
    let config = resolve_config(args)?;
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

/// Run the control server until interrupted
pub fn serve(args: &ServerArgs) -> CliResult<()> {
    let config = resolve_config(args)?;

    let controller = LevelController::for_logger();
    controller
        .set_level(config.log_level, Duration::ZERO)
        .map_err(|e| CliError::config_error(e.to_string()))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        let options = ServerOptions::new().with_level_controller(&controller);
        let server = Arc::new(ControlServer::with_config(&config, options)?);

        let stopper = Arc::clone(&server);
        let grace = config.shutdown_timeout();
        let stopping = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_err() {
                return;
            }
            Logger::info("SHUTDOWN_REQUESTED", &[("grace_ms", &grace.as_millis().to_string())]);
            if let Err(e) = stopper.shutdown(grace).await {
                Logger::warn("SHUTDOWN_INCOMPLETE", &[("error", &e.to_string())]);
            }
        });

        match server.serve().await {
            Err(e) if e.is_server_closed() => {
                // serve returns as soon as draining starts; let it finish
                let _ = stopping.await;
                Ok::<(), CliError>(())
            }
            Err(e) => {
                Logger::error("CONTROL_SERVER_FAILED", &[("error", &e.to_string())]);
                stopping.abort();
                Err(e.into())
            }
            Ok(()) => Ok(()),
        }
    })
}
