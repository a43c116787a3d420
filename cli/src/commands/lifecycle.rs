// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Neurogenesis commands
//!
//! Commands: provision, attempts

use anyhow::Result;
use clap::Subcommand;
use colored::Colorize;

use synapse_core::domain::lifecycle::{LifecycleState, ProvisioningAttempt};

use crate::daemon::NodeClient;

#[derive(Subcommand)]
pub enum LifecycleCommand {
    /// Make sure an agent exists for a concept, generating one if needed
    Provision {
        concept: String,

        /// What the caller wants to do with the concept
        #[arg(short, long, default_value = "")]
        intent: String,
    },

    /// List recent provisioning attempts
    Attempts {
        /// Include the state history of each attempt
        #[arg(long)]
        history: bool,
    },
}

pub async fn handle_command(command: LifecycleCommand, host: &str, port: u16) -> Result<()> {
    let client = NodeClient::new(host, port)?;

    match command {
        LifecycleCommand::Provision { concept, intent } => {
            println!("Provisioning an agent for {}...", concept.bold());
            let outcome = client.create_concept(&concept, &intent).await?;
            if outcome.created {
                println!("{} {}", "✓ Agent created:".green(), outcome.agent_id);
            } else {
                println!("{} {}", "✓ Existing agent:".green(), outcome.agent_id);
            }
            println!("  Endpoint: {}", outcome.endpoint);
            Ok(())
        }
        LifecycleCommand::Attempts { history } => {
            let attempts = client.attempts().await?;
            if attempts.is_empty() {
                println!("No provisioning attempts");
                return Ok(());
            }
            for attempt in &attempts {
                print_attempt(attempt, history);
            }
            Ok(())
        }
    }
}

fn print_attempt(attempt: &ProvisioningAttempt, history: bool) {
    let state = match attempt.state {
        LifecycleState::Registered => attempt.state.to_string().green(),
        LifecycleState::Failed => attempt.state.to_string().red(),
        _ => attempt.state.to_string().yellow(),
    };
    println!(
        "{}  {:<24} {:<11} {}",
        attempt.id.to_string().dimmed(),
        attempt.concept.bold(),
        state,
        attempt.started_at.format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(archetype) = &attempt.archetype {
        println!("    archetype: {}", archetype);
    }
    if let Some(endpoint) = &attempt.endpoint {
        println!("    endpoint:  {}", endpoint);
    }
    if let Some(error) = &attempt.error {
        println!("    error:     {}", error.red());
    }
    if history {
        for step in &attempt.history {
            match &step.detail {
                Some(detail) => println!("      {} {} ({})", step.at.format("%H:%M:%S%.3f"), step.state, detail),
                None => println!("      {} {}", step.at.format("%H:%M:%S%.3f"), step.state),
            }
        }
    }
}
