// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Knowledge graph commands
//!
//! Commands: seed, node, relate, agents, discover, feedback, decay, snapshot

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use serde_json::{Map, Value};
use std::path::PathBuf;

use synapse_core::domain::seed::GraphSeed;

use crate::daemon::NodeClient;

#[derive(Subcommand)]
pub enum GraphCommand {
    /// Push a YAML seed file to the node
    Seed {
        /// Seed file with agents, concepts, regions and edges
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },

    /// Create or update a node
    Create {
        /// Node label (Agent, Concept, Region)
        label: String,

        /// Properties as `key=value`; values are parsed as JSON when possible
        #[arg(short, long = "prop", value_name = "KEY=VALUE")]
        props: Vec<String>,
    },

    /// Show a node by id or `Label:Name`
    Node {
        id: String,
    },

    /// Create a relationship between two nodes
    Relate {
        /// Source node (`Label:Name` or UUID)
        from: String,

        /// Target node (`Label:Name` or UUID)
        to: String,

        /// Relationship type (HANDLES_CONCEPT, RELATED_TO, BELONGS_TO, ...)
        #[arg(short = 't', long = "type", default_value = "HANDLES_CONCEPT")]
        kind: String,

        /// Initial weight
        #[arg(short, long)]
        weight: Option<f64>,
    },

    /// List agents handling a concept
    Agents {
        concept: String,
    },

    /// Rank agents for a concept
    Discover {
        concept: String,

        /// What the caller wants to do with the concept
        #[arg(short, long, default_value = "")]
        intent: String,

        /// Provision a new agent when none is adequate
        #[arg(long)]
        provision: bool,
    },

    /// Record the outcome of using an agent for a concept
    Feedback {
        /// Agent id, `Agent:Name` or bare name
        agent: String,

        concept: String,

        /// Record a failure instead of a success
        #[arg(long)]
        failure: bool,
    },

    /// Run a decay sweep now
    Decay,

    /// Write a graph snapshot now
    Snapshot,
}

pub async fn handle_command(command: GraphCommand, host: &str, port: u16) -> Result<()> {
    let client = NodeClient::new(host, port)?;

    match command {
        GraphCommand::Seed { file } => seed(&client, file).await,
        GraphCommand::Create { label, props } => create(&client, &label, &props).await,
        GraphCommand::Node { id } => show_node(&client, &id).await,
        GraphCommand::Relate {
            from,
            to,
            kind,
            weight,
        } => relate(&client, &from, &to, &kind, weight).await,
        GraphCommand::Agents { concept } => agents(&client, &concept).await,
        GraphCommand::Discover {
            concept,
            intent,
            provision,
        } => discover(&client, &concept, &intent, provision).await,
        GraphCommand::Feedback {
            agent,
            concept,
            failure,
        } => feedback(&client, &agent, &concept, !failure).await,
        GraphCommand::Decay => decay(&client).await,
        GraphCommand::Snapshot => snapshot(&client).await,
    }
}

/// Nodes first so edges can reference them by name
async fn seed(client: &NodeClient, file: PathBuf) -> Result<()> {
    let seed = GraphSeed::from_yaml_file(&file)
        .with_context(|| format!("Failed to read seed file {:?}", file))?;

    for region in &seed.regions {
        let mut props = Map::new();
        props.insert("name".to_string(), Value::from(region.name.clone()));
        props.insert("description".to_string(), Value::from(region.description.clone()));
        client.create_node("Region", props).await?;
    }
    for concept in &seed.concepts {
        let props = to_properties(concept)?;
        client.create_node("Concept", props).await?;
    }
    for agent in &seed.agents {
        let props = to_properties(agent)?;
        client.create_node("Agent", props).await?;
    }
    for edge in &seed.edges {
        let mut props = Map::new();
        if let Some(weight) = edge.weight {
            props.insert("weight".to_string(), Value::from(weight));
        }
        client
            .create_relationship(&edge.from, &edge.to, &edge.kind, props)
            .await?;
    }

    println!(
        "{}",
        format!(
            "✓ Seeded {} agent(s), {} concept(s), {} region(s), {} edge(s)",
            seed.agents.len(),
            seed.concepts.len(),
            seed.regions.len(),
            seed.edges.len()
        )
        .green()
    );
    Ok(())
}

fn to_properties(value: &impl serde::Serialize) -> Result<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(mut map) => {
            map.retain(|_, v| !v.is_null());
            Ok(map)
        }
        other => anyhow::bail!("expected an object, got {}", other),
    }
}

/// `key=value` pairs; JSON literals keep their type, anything else is a string
pub fn parse_properties(pairs: &[String]) -> Result<Map<String, Value>> {
    let mut props = Map::new();
    for pair in pairs {
        let (key, raw) = pair
            .split_once('=')
            .with_context(|| format!("Invalid property {:?}, expected KEY=VALUE", pair))?;
        let value = serde_json::from_str(raw).unwrap_or_else(|_| Value::from(raw));
        props.insert(key.trim().to_string(), value);
    }
    Ok(props)
}

async fn create(client: &NodeClient, label: &str, props: &[String]) -> Result<()> {
    let id = client.create_node(label, parse_properties(props)?).await?;
    println!("{} {}", "✓ Node:".green(), id);
    Ok(())
}

async fn show_node(client: &NodeClient, id: &str) -> Result<()> {
    let node = client.get_node(id).await?;
    println!("{}", serde_json::to_string_pretty(&node)?);
    Ok(())
}

async fn relate(
    client: &NodeClient,
    from: &str,
    to: &str,
    kind: &str,
    weight: Option<f64>,
) -> Result<()> {
    let mut props = Map::new();
    if let Some(weight) = weight {
        props.insert("weight".to_string(), Value::from(weight));
    }
    let id = client.create_relationship(from, to, kind, props).await?;
    println!("{} {} -[{}]-> {} ({})", "✓ Relationship:".green(), from, kind, to, id);
    Ok(())
}

async fn agents(client: &NodeClient, concept: &str) -> Result<()> {
    let response = client.agents_for_concept(concept).await?;
    if response.agents.is_empty() {
        println!("No agents handle {}", response.concept.bold());
        return Ok(());
    }

    println!("Agents for {}:", response.concept.bold());
    for handler in &response.agents {
        println!(
            "  {:<28} weight {:.2}  success {:.0}%  uses {:<4} {:?}  {}",
            handler.name.bold(),
            handler.weight,
            handler.success_rate * 100.0,
            handler.usage_count,
            handler.status,
            handler.endpoint.dimmed()
        );
    }
    Ok(())
}

async fn discover(client: &NodeClient, concept: &str, intent: &str, provision: bool) -> Result<()> {
    let response = client.discover(concept, intent, provision).await?;
    if let Some(outcome) = &response.provisioned {
        let verb = if outcome.created { "Provisioned" } else { "Reused" };
        println!(
            "{} {} at {}",
            format!("✓ {}:", verb).green(),
            outcome.agent_id,
            outcome.endpoint
        );
    }
    if response.agents.is_empty() {
        println!("{}", "No matching agents".yellow());
        return Ok(());
    }

    for (rank, agent) in response.agents.iter().enumerate() {
        println!(
            "  {}. {:<28} score {:.3}  {}",
            rank + 1,
            agent.name.bold(),
            agent.score,
            agent.endpoint.dimmed()
        );
    }
    Ok(())
}

async fn feedback(client: &NodeClient, agent: &str, concept: &str, success: bool) -> Result<()> {
    let response = client.feedback(agent, concept, success).await?;
    if !response.applied {
        println!(
            "{} {} does not handle {}; nothing to update",
            "⚠".yellow(),
            agent,
            concept
        );
        return Ok(());
    }

    println!(
        "{} weight {:.2}, success rate {:.0}%, {} use(s)",
        "✓ Recorded:".green(),
        response.new_weight.unwrap_or_default(),
        response.success_rate.unwrap_or_default() * 100.0,
        response.usage_count.unwrap_or_default()
    );
    Ok(())
}

async fn decay(client: &NodeClient) -> Result<()> {
    let report = client.decay().await?;
    println!(
        "{} {} edge(s) decayed in {}ms",
        "✓ Decay sweep:".green(),
        report["decayedCount"],
        report["durationMs"]
    );
    Ok(())
}

async fn snapshot(client: &NodeClient) -> Result<()> {
    let result = client.snapshot().await?;
    if result["persisted"].as_bool().unwrap_or(false) {
        println!(
            "{} {} node(s), {} edge(s)",
            "✓ Snapshot written:".green(),
            result["nodes"],
            result["edges"]
        );
    } else {
        println!("{}", "⚠ Node has no snapshot store configured".yellow());
    }
    Ok(())
}
