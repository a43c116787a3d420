// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node mode implementation
//!
//! Handles:
//! - Wiring and serving a Synapse node
//! - HTTP client used by every other command
//! - Reachability checks

use anyhow::Result;
use std::time::Duration;

pub mod client;
pub mod server;

pub use client::NodeClient;
pub use server::start_node;

#[derive(Debug, Clone, PartialEq)]
pub enum NodeStatus {
    Running { name: String },
    Stopped,
    Unhealthy { error: String },
}

/// Check whether a node answers `GET /health`
pub async fn check_node_running(host: &str, port: u16) -> Result<NodeStatus> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_millis(500)) // Fast timeout for local checks
        .build()?;

    let health_url = format!("{}/health", base_url(host, port));

    match client.get(&health_url).send().await {
        Ok(resp) if resp.status().is_success() => {
            let name = resp
                .json::<serde_json::Value>()
                .await
                .ok()
                .and_then(|v| v["agent"].as_str().map(str::to_string))
                .unwrap_or_else(|| "unknown".to_string());
            Ok(NodeStatus::Running { name })
        }
        Ok(resp) => Ok(NodeStatus::Unhealthy {
            error: format!("HTTP {}", resp.status()),
        }),
        Err(e) if e.is_connect() || e.is_timeout() => Ok(NodeStatus::Stopped),
        Err(e) => Ok(NodeStatus::Unhealthy { error: e.to_string() }),
    }
}

/// `http://host:port`, keeping an explicit scheme when one is given
pub fn base_url(host: &str, port: u16) -> String {
    if host.starts_with("http://") || host.starts_with("https://") {
        format!("{}:{}", host.trim_end_matches('/'), port)
    } else {
        format!("http://{}:{}", host, port)
    }
}
