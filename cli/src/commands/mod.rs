// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Synapse CLI

pub mod agent;
pub mod config;
pub mod graph;
pub mod lifecycle;

pub use self::agent::AgentCommand;
pub use self::config::ConfigCommand;
pub use self::graph::GraphCommand;
pub use self::lifecycle::LifecycleCommand;

use anyhow::Result;
use colored::Colorize;

use crate::daemon::{check_node_running, NodeStatus};

/// `synapse status`
pub async fn status(host: &str, port: u16) -> Result<()> {
    match check_node_running(host, port).await? {
        NodeStatus::Running { name } => {
            println!("{} {} at {}:{}", "✓ Node running:".green(), name.bold(), host, port);
        }
        NodeStatus::Unhealthy { error } => {
            println!("{} {}", "⚠ Node unhealthy:".yellow(), error);
        }
        NodeStatus::Stopped => {
            println!("{} no node answers at {}:{}", "✗ Node stopped:".red(), host, port);
        }
    }
    Ok(())
}
