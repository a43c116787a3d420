// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Synapse CLI
//!
//! The `synapse` binary runs a Synapse node and talks to one.
//!
//! ## Commands
//!
//! - `synapse serve` - Run the node (graph, neurogenesis, REST API) in the foreground
//! - `synapse status` - Check whether a node answers on `--host`/`--port`
//! - `synapse graph seed|node|relate|agents|discover|feedback|decay|snapshot` - Graph operations
//! - `synapse lifecycle provision|attempts` - Neurogenesis
//! - `synapse agent host` - Serve one generated agent from a manifest (used by subprocess factories)
//! - `synapse config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;
use tracing::info;

use synapse_cli::commands::{self, AgentCommand, ConfigCommand, GraphCommand, LifecycleCommand};
use synapse_cli::daemon;
use synapse_core::domain::config::SynapseConfig;

/// Synapse - adaptive knowledge graph with neurogenesis
#[derive(Parser)]
#[command(name = "synapse")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "SYNAPSE_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Node HTTP port used by client commands
    #[arg(long, global = true, env = "SYNAPSE_PORT", default_value = "8080")]
    port: u16,

    /// Node host used by client commands
    #[arg(long, global = true, env = "SYNAPSE_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Log level (trace, debug, info, warn, error); overrides the config file
    #[arg(long, global = true, env = "SYNAPSE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (compact, pretty, json); overrides the config file
    #[arg(long, global = true, env = "SYNAPSE_LOG_FORMAT")]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the node in the foreground
    #[command(name = "serve")]
    Serve,

    /// Check whether a node is reachable
    #[command(name = "status")]
    Status,

    /// Knowledge graph operations
    #[command(name = "graph")]
    Graph {
        #[command(subcommand)]
        command: GraphCommand,
    },

    /// Neurogenesis operations
    #[command(name = "lifecycle")]
    Lifecycle {
        #[command(subcommand)]
        command: LifecycleCommand,
    },

    /// Generated agent hosting
    #[command(name = "agent")]
    Agent {
        #[command(subcommand)]
        command: AgentCommand,
    },

    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let mut cli = Cli::parse();

    match cli.command.take() {
        Some(Commands::Serve) => {
            let config = SynapseConfig::load_or_default(cli.config)
                .context("Failed to load configuration")?;
            let logging = &config.spec.observability.logging;
            init_logging(
                cli.log_level.as_deref().unwrap_or(&logging.level),
                cli.log_format.as_deref().unwrap_or(&logging.format),
            )?;
            info!("Starting Synapse node");
            daemon::start_node(config).await
        }
        Some(Commands::Status) => {
            init_default_logging(&cli)?;
            commands::status(&cli.host, cli.port).await
        }
        Some(Commands::Graph { command }) => {
            init_default_logging(&cli)?;
            commands::graph::handle_command(command, &cli.host, cli.port).await
        }
        Some(Commands::Lifecycle { command }) => {
            init_default_logging(&cli)?;
            commands::lifecycle::handle_command(command, &cli.host, cli.port).await
        }
        Some(Commands::Agent { command }) => {
            init_default_logging(&cli)?;
            commands::agent::handle_command(command).await
        }
        Some(Commands::Config { command }) => {
            init_default_logging(&cli)?;
            commands::config::handle_command(command, cli.config).await
        }
        None => {
            // No command provided - show help
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}

/// Client commands log warnings only unless asked otherwise
fn init_default_logging(cli: &Cli) -> Result<()> {
    init_logging(
        cli.log_level.as_deref().unwrap_or("warn"),
        cli.log_format.as_deref().unwrap_or("compact"),
    )
}

/// Initialize tracing subscriber for logging
fn init_logging(level: &str, format: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .or_else(|_| tracing_subscriber::EnvFilter::try_new(level))
        .context("Failed to create log filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false);

    match format {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}
