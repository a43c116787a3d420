// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Generated agent commands
//!
//! `synapse agent host` is what the subprocess factory launches for each
//! generated agent; `synapse agent ask` renders an answer offline.

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use synapse_core::domain::archetype::AgentBlueprint;
use synapse_core::infrastructure::{AgentGenerator, HostedAgent};

#[derive(Subcommand)]
pub enum AgentCommand {
    /// Serve one agent from a blueprint manifest until interrupted
    Host {
        /// Blueprint manifest written by the node
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,

        #[arg(long)]
        port: u16,

        #[arg(long, default_value = "127.0.0.1")]
        bind: String,
    },

    /// Answer a question with a blueprint without serving it
    Ask {
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,

        question: String,
    },
}

pub async fn handle_command(command: AgentCommand) -> Result<()> {
    match command {
        AgentCommand::Host {
            manifest,
            port,
            bind,
        } => host(&manifest, &bind, port).await,
        AgentCommand::Ask { manifest, question } => {
            let blueprint = load_blueprint(&manifest)?;
            let answer = AgentGenerator::new()
                .answer(&blueprint, &question)
                .context("Failed to render answer")?;
            println!("{} {}", format!("{}:", blueprint.name).bold(), answer);
            Ok(())
        }
    }
}

pub fn load_blueprint(path: &Path) -> Result<AgentBlueprint> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read manifest {:?}", path))?;
    serde_yaml::from_str(&content).with_context(|| format!("Invalid agent manifest {:?}", path))
}

async fn host(manifest: &Path, bind: &str, port: u16) -> Result<()> {
    let blueprint = load_blueprint(manifest)?;
    let addr = format!("{}:{}", bind, port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let shutdown = CancellationToken::new();
    let token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C signal"),
            Err(e) => {
                error!("Failed to install Ctrl+C handler: {}", e);
                return;
            }
        }
        token.cancel();
    });

    HostedAgent::new(blueprint, Arc::new(AgentGenerator::new()))
        .serve(listener, shutdown)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use synapse_core::domain::archetype::Archetype;
    use synapse_core::domain::knowledge::KnowledgeSummary;

    #[test]
    fn test_manifest_round_trips_through_yaml_file() {
        let generator = AgentGenerator::new();
        let mut knowledge = KnowledgeSummary::new("lightbulb");
        knowledge
            .facts
            .insert("definition".to_string(), json!("an electric light"));
        let blueprint = generator
            .generate("lightbulb", "electrical", Archetype::Specialist, &knowledge)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lightbulb.yaml");
        std::fs::write(&path, serde_yaml::to_string(&blueprint).unwrap()).unwrap();

        let loaded = load_blueprint(&path).unwrap();
        assert_eq!(loaded, blueprint);
        assert!(load_blueprint(&dir.path().join("missing.yaml")).is_err());
    }
}
