//! # Relay Core Binary
//!
//! Runs the configured relay components on a fixed-rate control loop.
//!
//! # Usage
//!
//! ```bash
//! # Run with the default configuration
//! relay_core --config /etc/relay/relay.toml
//!
//! # Feed a passthrough component from stdin, one record per line
//! relay_core --config relay.toml --stdin-commands forward_position
//!
//! # Verbose JSON logging
//! relay_core --config relay.toml -v --json
//! ```

#![deny(warnings)]

use clap::Parser;
use relay_common::config::{ConfigLoader, LogLevel};
use relay_common::consts::DEFAULT_CONFIG_PATH;
use relay_common::relay::component::CommandSink;
use relay_common::relay::config::RelayConfig;
use relay_core::components::register_all_components;
use relay_core::producer::parse_command_line;
use relay_core::{ComponentRegistry, ControlLoop};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Relay Core - real-time command relay with pluggable components
#[derive(Parser, Debug)]
#[command(name = "relay_core")]
#[command(version)]
#[command(about = "Real-time command relay with pluggable components")]
#[command(long_about = None)]
struct Args {
    /// Path to the relay configuration file (relay.toml)
    #[arg(short, long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Enable verbose logging (overrides the configured log level)
    #[arg(short, long)]
    verbose: bool,

    /// Output logs in JSON format
    #[arg(long)]
    json: bool,

    /// Feed the named component from stdin, one whitespace or comma
    /// separated record per line
    #[arg(long, value_name = "COMPONENT")]
    stdin_commands: Option<String>,
}

fn main() {
    if let Err(e) = run() {
        error!("Relay startup failed: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let loaded = RelayConfig::load(&args.config);
    let level = loaded
        .as_ref()
        .map(|config| config.shared.log_level)
        .unwrap_or_default();
    setup_tracing(&args, level);

    info!("Relay Core v{} starting...", env!("CARGO_PKG_VERSION"));
    let config = loaded.map_err(|e| format!("{}: {}", args.config.display(), e))?;

    let mut registry = ComponentRegistry::new();
    register_all_components(&mut registry);
    info!("Registered component kinds: {:?}", registry.list_kinds());

    let mut control = ControlLoop::new(config, &registry)?;

    let running = control.running_flag();
    ctrlc::set_handler(move || {
        info!("Received shutdown signal");
        running.store(false, Ordering::SeqCst);
    })?;

    if let Err(e) = bring_up(&control) {
        control.shutdown();
        return Err(e.into());
    }

    if let Some(name) = args.stdin_commands.as_deref() {
        match control.component(name) {
            Some(component) => {
                let sink = component
                    .lock()
                    .map_err(|_| format!("{}: lock poisoned", name))?
                    .command_sink();
                match sink {
                    Some(sink) => spawn_stdin_feeder(name.to_string(), sink)?,
                    None => warn!("{}: component has no command input, ignoring --stdin-commands", name),
                }
            }
            None => warn!("--stdin-commands: no component named {}", name),
        }
    }

    control.run();
    control.shutdown();

    info!("Relay Core shutdown complete");
    Ok(())
}

/// Configure all components, create missing hardware handles, activate.
fn bring_up(control: &ControlLoop) -> Result<(), relay_common::relay::component::ComponentError> {
    control.configure_all()?;
    for name in control.register_hardware_handles() {
        info!("Simulated hardware handle {}", name);
    }
    control.activate_all()
}

/// Forward stdin lines to a component's command input until EOF.
fn spawn_stdin_feeder(name: String, sink: Arc<dyn CommandSink>) -> std::io::Result<()> {
    std::thread::Builder::new()
        .name(format!("{}-stdin", name))
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        warn!("{}: stdin read failed: {}", name, e);
                        break;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match parse_command_line(&line) {
                    Ok(values) => {
                        sink.on_message(&values);
                    }
                    Err(e) => warn!("{}: malformed command {:?}: {}", name, line, e),
                }
            }
            info!("{}: stdin closed", name);
        })?;
    Ok(())
}

/// Setup tracing subscriber based on CLI arguments and the configured level.
fn setup_tracing(args: &Args, level: LogLevel) {
    let directive = if args.verbose {
        LogLevel::Debug.as_directive()
    } else {
        level.as_directive()
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}
