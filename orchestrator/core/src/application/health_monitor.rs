// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Health Monitor - Background polling of registered agents
//!
//! Each interval every agent in the graph is probed at `GET {endpoint}/health`.
//! A success resets the agent to Healthy. Consecutive failures mark it
//! Degraded, and once they reach the configured threshold, Failed. Status
//! changes are written to the graph and published as `AgentStatusChanged`.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Keeps the availability sub-score of discovery current

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use synapse_cortex::{AgentStatus, CortexEvent, GraphError, GraphRepository, Node, NodeId};

use crate::domain::config::HealthMonitorConfig;
use crate::domain::runtime::HealthProbe;
use crate::infrastructure::event_bus::DomainEventBus;

/// Status implied by a run of consecutive probe failures
pub fn status_for_failures(failures: u32, threshold: u32) -> AgentStatus {
    match failures {
        0 => AgentStatus::Healthy,
        n if n >= threshold => AgentStatus::Failed,
        _ => AgentStatus::Degraded,
    }
}

pub struct HealthMonitor {
    graph: Arc<dyn GraphRepository>,
    probe: Arc<dyn HealthProbe>,
    events: DomainEventBus,
    config: HealthMonitorConfig,
    failures: DashMap<NodeId, u32>,
    shutdown_token: CancellationToken,
}

impl HealthMonitor {
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        probe: Arc<dyn HealthProbe>,
        events: DomainEventBus,
        config: HealthMonitorConfig,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            graph,
            probe,
            events,
            config,
            failures: DashMap::new(),
            shutdown_token,
        }
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        if !self.config.enabled {
            info!("Agent health monitor is disabled");
            return;
        }

        let period = self.config.interval.max(Duration::from_millis(10));
        info!(
            interval_secs = period.as_secs(),
            failure_threshold = self.config.failure_threshold,
            "Starting agent health monitor"
        );
        let mut tick = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if let Err(e) = self.poll_once().await {
                        warn!("Health poll cycle failed: {}", e);
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping health monitor");
                    break;
                }
            }
        }
    }

    /// Probe every agent once; returns how many changed status
    pub async fn poll_once(&self) -> Result<usize, GraphError> {
        let agents = self
            .graph
            .find_nodes(&|n: &Node| n.as_agent().is_some())
            .await?;

        let probes = agents.iter().filter_map(|node| {
            let agent = node.as_agent()?;
            Some(async move {
                let healthy = self
                    .probe
                    .probe(&agent.endpoint, self.config.probe_timeout)
                    .await;
                (node.id, agent.name.clone(), agent.status, healthy)
            })
        });
        let results = futures::future::join_all(probes).await;

        let mut changed = 0;
        for (id, name, current, healthy) in results {
            let failures = if healthy {
                self.failures.remove(&id);
                0
            } else {
                let mut entry = self.failures.entry(id).or_insert(0);
                *entry += 1;
                *entry
            };

            let next = status_for_failures(failures, self.config.failure_threshold);
            if next == current {
                continue;
            }

            let previous = match self.graph.set_agent_status(id, next).await {
                Ok(previous) => previous,
                // Removed between listing and probing
                Err(GraphError::NodeNotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            changed += 1;
            metrics::counter!("synapse_agent_status_changes_total", "status" => format!("{:?}", next)).increment(1);
            info!(agent = %name, from = ?previous, to = ?next, failures, "Agent status changed");
            self.events.publish_cortex_event(CortexEvent::AgentStatusChanged {
                agent_id: id,
                agent_name: name,
                old_status: previous,
                new_status: next,
                timestamp: Utc::now(),
            });
        }

        debug!(agents = agents.len(), changed, "Health poll finished");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use synapse_cortex::{AgentNode, GraphStore};

    struct SwitchProbe(AtomicBool);

    #[async_trait]
    impl HealthProbe for SwitchProbe {
        async fn probe(&self, _endpoint: &str, _timeout: Duration) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    async fn fixture(healthy: bool) -> (Arc<GraphStore>, Arc<SwitchProbe>, NodeId, HealthMonitor) {
        let graph = Arc::new(GraphStore::in_memory());
        let id = graph
            .upsert_node(Node::agent(AgentNode::new("Lightbulb_AI", "http://127.0.0.1:1")))
            .await
            .unwrap();
        let probe = Arc::new(SwitchProbe(AtomicBool::new(healthy)));
        let monitor = HealthMonitor::new(
            graph.clone(),
            probe.clone(),
            DomainEventBus::new(16),
            HealthMonitorConfig::default(),
            CancellationToken::new(),
        );
        (graph, probe, id, monitor)
    }

    async fn status(graph: &GraphStore, id: NodeId) -> AgentStatus {
        graph.get_node(id).await.unwrap().unwrap().as_agent().unwrap().status
    }

    #[test]
    fn test_status_for_failures() {
        assert_eq!(status_for_failures(0, 3), AgentStatus::Healthy);
        assert_eq!(status_for_failures(1, 3), AgentStatus::Degraded);
        assert_eq!(status_for_failures(2, 3), AgentStatus::Degraded);
        assert_eq!(status_for_failures(3, 3), AgentStatus::Failed);
        assert_eq!(status_for_failures(7, 3), AgentStatus::Failed);
    }

    #[tokio::test]
    async fn test_failures_degrade_then_fail_then_recover() {
        let (graph, probe, id, monitor) = fixture(false).await;
        let mut events = monitor.events.subscribe();

        assert_eq!(monitor.poll_once().await.unwrap(), 1);
        assert_eq!(status(&graph, id).await, AgentStatus::Degraded);

        assert_eq!(monitor.poll_once().await.unwrap(), 0);
        monitor.poll_once().await.unwrap();
        assert_eq!(status(&graph, id).await, AgentStatus::Failed);

        probe.0.store(true, Ordering::SeqCst);
        monitor.poll_once().await.unwrap();
        assert_eq!(status(&graph, id).await, AgentStatus::Healthy);

        let first = events.try_recv().unwrap();
        assert_eq!(first.name(), "agent_status_changed");
    }

    #[tokio::test]
    async fn test_healthy_agents_are_untouched() {
        let (graph, _probe, id, monitor) = fixture(true).await;
        assert_eq!(monitor.poll_once().await.unwrap(), 0);
        assert_eq!(status(&graph, id).await, AgentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_monitor_stops_on_cancel() {
        let (_graph, _probe, _id, monitor) = fixture(true).await;
        let monitor = Arc::new(monitor);
        let token = monitor.shutdown_token();
        let handle = monitor.start();
        token.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
