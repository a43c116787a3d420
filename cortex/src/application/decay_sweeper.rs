// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decay Sweeper - Background task for Hebbian time-decay
//!
//! Every decay interval, recently active HANDLES_CONCEPT edges lose a small
//! fraction of their weight so routes that stop earning reinforcement fade.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Drives `HebbianLearner::decay_sweep` on a timer

use std::sync::Arc;
use std::time::Duration;
use tokio::time::{interval_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::application::hebbian::{DecayReport, HebbianLearner};
use crate::domain::error::GraphError;

/// Decay Sweeper - Background task
pub struct DecaySweeper {
    learner: Arc<HebbianLearner>,
    shutdown_token: CancellationToken,
}

impl DecaySweeper {
    pub fn new(learner: Arc<HebbianLearner>, shutdown_token: CancellationToken) -> Self {
        Self {
            learner,
            shutdown_token,
        }
    }

    /// Get a handle to trigger shutdown
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown_token.clone()
    }

    /// Start the sweeper background task
    pub fn start(self: Arc<Self>) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&self) {
        let config = self.learner.config();
        if !config.decay_enabled {
            info!("Hebbian decay sweeper is disabled");
            return;
        }

        let period = config.decay_interval.max(Duration::from_millis(10));
        info!(
            interval_secs = period.as_secs(),
            policy = ?config.decay_policy,
            window_secs = config.active_window().as_secs(),
            "Starting Hebbian decay sweeper"
        );

        // First sweep one full interval after startup
        let mut tick = interval_at(Instant::now() + period, period);

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    debug!("Running decay sweep cycle");
                    if let Err(e) = self.sweep_cycle().await {
                        warn!("Decay sweep cycle failed: {}", e);
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    info!("Shutdown signal received, stopping decay sweeper");
                    break;
                }
            }
        }

        info!("Decay sweeper background task stopped");
    }

    async fn sweep_cycle(&self) -> Result<DecayReport, GraphError> {
        self.learner.decay_sweep().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::hebbian::HebbianConfig;
    use crate::application::NoopEventBus;
    use crate::domain::graph::{AgentNode, ConceptNode, EdgeKind, EdgeSpec, Node};
    use crate::infrastructure::{GraphRepository, GraphStore};

    #[tokio::test]
    async fn test_sweeper_decays_on_interval_and_stops() {
        let graph = Arc::new(GraphStore::default());
        let agent = graph
            .upsert_node(Node::agent(AgentNode::new("Lightbulb_AI", "http://x")))
            .await
            .unwrap();
        let concept = graph
            .upsert_node(Node::concept(ConceptNode::new("lightbulb", "electrical")))
            .await
            .unwrap();
        graph
            .add_edge(EdgeSpec::handles_concept(agent, concept).with_weight(0.8))
            .await
            .unwrap();

        let config = HebbianConfig {
            decay_interval: Duration::from_millis(20),
            ..HebbianConfig::default()
        };
        let learner = Arc::new(HebbianLearner::new(graph.clone(), Arc::new(NoopEventBus), config));
        let sweeper = Arc::new(DecaySweeper::new(learner, CancellationToken::new()));
        let token = sweeper.shutdown_token();
        let handle = sweeper.start();

        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
        handle.await.unwrap();

        let edge = graph
            .edge_between(agent, concept, EdgeKind::HandlesConcept)
            .await
            .unwrap()
            .unwrap();
        assert!(edge.weight < 0.8);
    }

    #[tokio::test]
    async fn test_sweeper_disabled() {
        let graph = Arc::new(GraphStore::default());
        let config = HebbianConfig {
            decay_enabled: false,
            ..HebbianConfig::default()
        };
        let learner = Arc::new(HebbianLearner::new(graph, Arc::new(NoopEventBus), config));
        let sweeper = Arc::new(DecaySweeper::new(learner, CancellationToken::new()));

        // Returns immediately without waiting for cancellation
        tokio::time::timeout(Duration::from_secs(1), sweeper.start())
            .await
            .unwrap()
            .unwrap();
    }
}
