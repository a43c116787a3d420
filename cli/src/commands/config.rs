// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use synapse_core::domain::config::SynapseConfig;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate a configuration file with every default spelled out
    Generate {
        /// Output path (default: ./synapse-config.yaml)
        #[arg(short, long, default_value = "./synapse-config.yaml")]
        output: PathBuf,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, force } => generate(output, force).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = SynapseConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. SYNAPSE_CONFIG_PATH: {}",
            std::env::var("SYNAPSE_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./synapse-config.yaml");
        println!("  4. ~/.synapse/config.yaml");
        println!("  5. /etc/synapse/config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!();

    println!("{}", "Node:".bold());
    println!("  Name: {}", config.metadata.name);
    println!("  Listen: {}:{}", spec.server.bind_address, spec.server.port);
    println!();

    println!("{}", "Graph:".bold());
    match &spec.graph.snapshot_path {
        Some(path) => println!("  Snapshot: {}", path.display()),
        None => println!("  Snapshot: {}", "(in memory only)".dimmed()),
    }
    if let Some(seed) = &spec.graph.seed_file {
        println!("  Seed file: {}", seed.display());
    }
    println!(
        "  Initial weights: manual {} / provisional {}",
        spec.graph.manual_edge_weight, spec.graph.provisional_edge_weight
    );
    println!();

    println!("{}", "Hebbian learning:".bold());
    println!(
        "  Strengthen/weaken: +{} / -{}",
        spec.hebbian.strengthen_delta, spec.hebbian.weaken_delta
    );
    println!(
        "  Decay: {} ({:?}, every {:?})",
        if spec.hebbian.decay_enabled { "enabled" } else { "disabled" },
        spec.hebbian.decay_policy,
        spec.hebbian.decay_interval
    );
    println!();

    println!("{}", "Neurogenesis:".bold());
    println!("  Adequate score: {}", spec.lifecycle.adequate_score);
    println!("  Factory: {:?}", spec.factory.kind);
    println!(
        "  Host pool: {} slot(s) from {}:{} ({:?})",
        spec.host_pool.size, spec.host_pool.host, spec.host_pool.base_port, spec.host_pool.acquire
    );
    println!("  Research sources: up to {}", spec.research.max_sources);
    println!();

    println!("{}", "Observability:".bold());
    println!(
        "  Logging: {} ({})",
        spec.observability.logging.level, spec.observability.logging.format
    );
    if spec.observability.metrics.enabled {
        println!("  Metrics: port {}", spec.observability.metrics.port);
    } else {
        println!("  Metrics: {}", "disabled".dimmed());
    }

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = SynapseConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, force: bool) -> Result<()> {
    if output.exists() && !force {
        anyhow::bail!(
            "{} already exists; pass --force to overwrite",
            output.display()
        );
    }

    SynapseConfig::default()
        .to_yaml_file(&output)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_generated_config_validates() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("synapse-config.yaml");

        generate(output.clone(), false).await.unwrap();
        validate(Some(output.clone())).await.unwrap();

        // Refuses to clobber without --force
        assert!(generate(output.clone(), false).await.is_err());
        generate(output, true).await.unwrap();
    }
}
