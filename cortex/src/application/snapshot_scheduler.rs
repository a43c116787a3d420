// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Periodic graph snapshots
//!
//! Writes the graph to its snapshot store whenever it is dirty on a fixed
//! interval, and once more on shutdown. Write-count triggered snapshots are
//! handled by the store itself.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use chrono::Utc;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::EventBus;
use crate::domain::events::CortexEvent;
use crate::infrastructure::{GraphRepository, GraphStore};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotSchedulerConfig {
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    pub enabled: bool,
}

impl Default for SnapshotSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            enabled: true,
        }
    }
}

pub struct SnapshotScheduler {
    graph: Arc<GraphStore>,
    event_bus: Arc<dyn EventBus>,
    config: SnapshotSchedulerConfig,
    shutdown_token: CancellationToken,
}

impl SnapshotScheduler {
    pub fn new(
        graph: Arc<GraphStore>,
        event_bus: Arc<dyn EventBus>,
        config: SnapshotSchedulerConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            graph,
            event_bus,
            config,
            shutdown_token,
        }
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Periodic graph snapshots are disabled");
            self.shutdown_token.cancelled().await;
            self.flush("shutdown").await;
            return;
        }

        let period = self.config.interval.max(Duration::from_millis(10));
        info!(interval_secs = period.as_secs(), "Starting graph snapshot scheduler");
        let mut tick = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.graph.is_dirty() {
                        self.flush("interval").await;
                    } else {
                        debug!("Graph unchanged since last snapshot");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, writing final graph snapshot");
                    self.flush("shutdown").await;
                    break;
                }
            }
        }

        info!("Graph snapshot scheduler stopped");
    }

    /// Persist now; failures are logged and the in-memory state is kept
    async fn flush(&self, trigger: &'static str) {
        match self.graph.persist().await {
            Ok(true) => {
                let stats = match self.graph.stats().await {
                    Ok(stats) => stats,
                    Err(e) => {
                        warn!(error = %e, "Could not read graph stats after snapshot");
                        return;
                    }
                };
                debug!(trigger, nodes = stats.nodes(), edges = stats.edges, "Graph snapshot written");
                let event = CortexEvent::SnapshotWritten {
                    nodes: stats.nodes(),
                    edges: stats.edges,
                    timestamp: Utc::now(),
                };
                if let Err(e) = self.event_bus.publish(event).await {
                    warn!(error = %e, "Failed to publish snapshot event");
                }
            }
            Ok(false) => debug!("Graph has no snapshot store, nothing to write"),
            Err(e) => warn!(trigger, error = %e, "Graph snapshot failed"),
        }
    }
}
