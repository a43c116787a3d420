// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Hebbian learning on agent -> concept edges
//!
//! Successful answers strengthen the edge, failures weaken it, and a periodic
//! sweep lets recently used edges drift down so stale routes lose ground.
//! Every update is a single read-modify-write under the store's write lock;
//! concurrent feedback on the same edge never loses an increment.

use anyhow::{bail, Result as AnyResult};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::application::EventBus;
use crate::domain::error::GraphError;
use crate::domain::events::CortexEvent;
use crate::domain::graph::{
    is_valid_decay_rate, normalize_concept_name, Edge, EdgeKind, EdgeUpdate, NodeId, NodeLabel,
    DEFAULT_DECAY_RATE,
};
use crate::infrastructure::repository::{EdgeChange, GraphRepository};

/// Which edges a decay sweep touches
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DecayPolicy {
    /// Only edges updated within the active window
    #[default]
    ActiveWindow,
    /// Every HANDLES_CONCEPT edge
    AllEdges,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HebbianConfig {
    pub strengthen_delta: f64,
    pub weaken_delta: f64,
    /// Decay rate given to new edges
    pub decay_rate: f64,
    #[serde(with = "humantime_serde")]
    pub decay_interval: Duration,
    /// Active window, in decay intervals
    pub active_window_intervals: u32,
    pub decay_policy: DecayPolicy,
    pub decay_enabled: bool,
}

impl Default for HebbianConfig {
    fn default() -> Self {
        Self {
            strengthen_delta: 0.05,
            weaken_delta: 0.02,
            decay_rate: DEFAULT_DECAY_RATE,
            decay_interval: Duration::from_secs(15 * 60),
            active_window_intervals: 10,
            decay_policy: DecayPolicy::ActiveWindow,
            decay_enabled: true,
        }
    }
}

impl HebbianConfig {
    /// `decay_interval * active_window_intervals`, saturating
    pub fn active_window(&self) -> Duration {
        self.decay_interval.saturating_mul(self.active_window_intervals)
    }

    pub fn validate(&self) -> AnyResult<()> {
        for (name, value) in [
            ("strengthen_delta", self.strengthen_delta),
            ("weaken_delta", self.weaken_delta),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("hebbian.{} must be within [0, 1], got {}", name, value);
            }
        }
        if !is_valid_decay_rate(self.decay_rate) {
            bail!("hebbian.decay_rate must be within (0, 1), got {}", self.decay_rate);
        }
        if self.decay_interval.is_zero() {
            bail!("hebbian.decay_interval must be greater than zero");
        }
        if self.active_window_intervals == 0 {
            bail!("hebbian.active_window_intervals must be at least 1");
        }
        let window = self
            .decay_interval
            .checked_mul(self.active_window_intervals)
            .filter(|w| chrono::Duration::from_std(*w).is_ok());
        if window.is_none() {
            bail!(
                "hebbian active window ({:?} x {}) is out of range",
                self.decay_interval,
                self.active_window_intervals
            );
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayReport {
    pub decayed_count: usize,
    pub policy: DecayPolicy,
    pub duration_ms: u64,
}

pub struct HebbianLearner {
    graph: Arc<dyn GraphRepository>,
    event_bus: Arc<dyn EventBus>,
    config: HebbianConfig,
}

impl HebbianLearner {
    pub fn new(
        graph: Arc<dyn GraphRepository>,
        event_bus: Arc<dyn EventBus>,
        config: HebbianConfig,
    ) -> Self {
        Self {
            graph,
            event_bus,
            config,
        }
    }

    pub fn config(&self) -> &HebbianConfig {
        &self.config
    }

    /// Successful use with the configured delta
    pub async fn strengthen(
        &self,
        agent: NodeId,
        concept: NodeId,
    ) -> Result<Option<Edge>, GraphError> {
        self.strengthen_by(agent, concept, self.config.strengthen_delta)
            .await
    }

    pub async fn strengthen_by(
        &self,
        agent: NodeId,
        concept: NodeId,
        delta: f64,
    ) -> Result<Option<Edge>, GraphError> {
        let change = self
            .graph
            .apply_edge_update(
                agent,
                concept,
                EdgeKind::HandlesConcept,
                EdgeUpdate::Reinforce { delta },
            )
            .await?;
        self.finish(agent, concept, change, true).await
    }

    /// Failed use with the configured delta
    pub async fn weaken(&self, agent: NodeId, concept: NodeId) -> Result<Option<Edge>, GraphError> {
        self.weaken_by(agent, concept, self.config.weaken_delta).await
    }

    pub async fn weaken_by(
        &self,
        agent: NodeId,
        concept: NodeId,
        delta: f64,
    ) -> Result<Option<Edge>, GraphError> {
        let change = self
            .graph
            .apply_edge_update(
                agent,
                concept,
                EdgeKind::HandlesConcept,
                EdgeUpdate::Weaken { delta },
            )
            .await?;
        self.finish(agent, concept, change, false).await
    }

    /// Feedback addressed by concept name, as it arrives from callers
    pub async fn record_outcome(
        &self,
        agent: NodeId,
        concept: &str,
        success: bool,
    ) -> Result<Option<Edge>, GraphError> {
        let name = normalize_concept_name(concept);
        let Some(concept_node) = self.graph.find_by_name(NodeLabel::Concept, &name).await? else {
            warn!(%agent, concept = %name, "Feedback for unknown concept ignored");
            metrics::counter!("synapse_hebbian_feedback_total", "outcome" => "ignored")
                .increment(1);
            return Ok(None);
        };

        if success {
            self.strengthen(agent, concept_node.id).await
        } else {
            self.weaken(agent, concept_node.id).await
        }
    }

    async fn finish(
        &self,
        agent: NodeId,
        concept: NodeId,
        change: Option<EdgeChange>,
        success: bool,
    ) -> Result<Option<Edge>, GraphError> {
        let timestamp = Utc::now();
        let Some(EdgeChange {
            previous_weight,
            edge,
        }) = change
        else {
            warn!(%agent, %concept, "No HANDLES_CONCEPT edge for feedback, ignoring");
            metrics::counter!("synapse_hebbian_feedback_total", "outcome" => "ignored")
                .increment(1);
            self.publish(CortexEvent::FeedbackIgnored {
                agent_id: agent,
                concept_id: concept,
                timestamp,
            })
            .await;
            return Ok(None);
        };

        let outcome = if success { "success" } else { "failure" };
        metrics::counter!("synapse_hebbian_feedback_total", "outcome" => outcome).increment(1);
        debug!(
            edge_id = %edge.id,
            outcome,
            old_weight = previous_weight,
            new_weight = edge.weight,
            usage_count = edge.usage_count,
            "Applied Hebbian feedback"
        );

        let event = if success {
            CortexEvent::EdgeReinforced {
                edge_id: edge.id,
                agent_id: agent,
                concept_id: concept,
                old_weight: previous_weight,
                new_weight: edge.weight,
                success_rate: edge.success_rate(),
                timestamp,
            }
        } else {
            CortexEvent::EdgeWeakened {
                edge_id: edge.id,
                agent_id: agent,
                concept_id: concept,
                old_weight: previous_weight,
                new_weight: edge.weight,
                success_rate: edge.success_rate(),
                timestamp,
            }
        };
        self.publish(event).await;

        Ok(Some(edge))
    }

    /// Decay according to the configured policy
    pub async fn decay_sweep(&self) -> Result<DecayReport, GraphError> {
        let window = match self.config.decay_policy {
            DecayPolicy::ActiveWindow => Some(self.config.active_window()),
            DecayPolicy::AllEdges => None,
        };
        self.decay_sweep_window(window).await
    }

    /// Decay edges updated within `window`, or every edge when `None`
    pub async fn decay_sweep_window(
        &self,
        window: Option<Duration>,
    ) -> Result<DecayReport, GraphError> {
        let started = Instant::now();
        // A window reaching back past what a timestamp can hold covers every edge
        let active_since = window.and_then(|window| {
            chrono::Duration::from_std(window)
                .ok()
                .and_then(|window| Utc::now().checked_sub_signed(window))
        });

        let decayed_count = self
            .graph
            .decay_edges(EdgeKind::HandlesConcept, active_since)
            .await?;
        let duration_ms = started.elapsed().as_millis() as u64;

        metrics::counter!("synapse_hebbian_decayed_edges_total").increment(decayed_count as u64);
        metrics::histogram!("synapse_hebbian_decay_sweep_seconds")
            .record(started.elapsed().as_secs_f64());
        info!(
            decayed_count,
            window_secs = window.map(|w| w.as_secs()),
            duration_ms,
            "Decay sweep completed"
        );

        self.publish(CortexEvent::DecaySweepCompleted {
            decayed_count,
            active_window_secs: window.map(|w| i64::try_from(w.as_secs()).unwrap_or(i64::MAX)),
            duration_ms,
            timestamp: Utc::now(),
        })
        .await;

        Ok(DecayReport {
            decayed_count,
            policy: if window.is_some() {
                DecayPolicy::ActiveWindow
            } else {
                DecayPolicy::AllEdges
            },
            duration_ms,
        })
    }

    async fn publish(&self, event: CortexEvent) {
        if let Err(e) = self.event_bus.publish(event).await {
            warn!(error = %e, "Failed to publish cortex event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::graph::{AgentNode, ConceptNode, EdgeSpec, Node};
    use crate::infrastructure::GraphStore;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct RecordingEventBus {
        events: Mutex<Vec<CortexEvent>>,
    }

    #[async_trait]
    impl EventBus for RecordingEventBus {
        async fn publish(&self, event: CortexEvent) -> anyhow::Result<()> {
            self.events.lock().await.push(event);
            Ok(())
        }
    }

    struct Fixture {
        graph: Arc<GraphStore>,
        events: Arc<RecordingEventBus>,
        learner: HebbianLearner,
        agent: NodeId,
        concept: NodeId,
    }

    async fn lightbulb(weight: f64) -> Fixture {
        let graph = Arc::new(GraphStore::default());
        let events = Arc::new(RecordingEventBus::default());
        let agent = graph
            .upsert_node(Node::agent(
                AgentNode::new("Lightbulb_AI", "http://127.0.0.1:9100")
                    .with_capabilities(["lightbulb"]),
            ))
            .await
            .unwrap();
        let concept = graph
            .upsert_node(Node::concept(ConceptNode::new("lightbulb", "electrical")))
            .await
            .unwrap();
        graph
            .add_edge(EdgeSpec::handles_concept(agent, concept).with_weight(weight))
            .await
            .unwrap();

        let learner = HebbianLearner::new(graph.clone(), events.clone(), HebbianConfig::default());
        Fixture {
            graph,
            events,
            learner,
            agent,
            concept,
        }
    }

    #[tokio::test]
    async fn test_lightbulb_scenario() {
        let f = lightbulb(0.5).await;

        for _ in 0..3 {
            f.learner.strengthen(f.agent, f.concept).await.unwrap();
        }
        let edge = f
            .graph
            .edge_between(f.agent, f.concept, EdgeKind::HandlesConcept)
            .await
            .unwrap()
            .unwrap();
        assert!((edge.weight - 0.65).abs() < 1e-9);
        assert_eq!(edge.usage_count, 3);
        assert_eq!(edge.success_count, 3);
        assert_eq!(edge.success_rate(), 1.0);

        let edge = f.learner.weaken(f.agent, f.concept).await.unwrap().unwrap();
        assert!((edge.weight - 0.63).abs() < 1e-9);
        assert_eq!(edge.usage_count, 4);
        assert_eq!(edge.failure_count, 1);
        assert_eq!(edge.success_rate(), 0.75);

        let events = f.events.events.lock().await;
        assert_eq!(events.len(), 4);
        assert_eq!(events[3].event_type(), "edge_weakened");
    }

    #[tokio::test]
    async fn test_weight_stays_in_bounds() {
        let f = lightbulb(0.99).await;
        for _ in 0..10 {
            f.learner.strengthen(f.agent, f.concept).await.unwrap();
        }
        for _ in 0..100 {
            f.learner.weaken(f.agent, f.concept).await.unwrap();
        }
        let edge = f
            .graph
            .edge_between(f.agent, f.concept, EdgeKind::HandlesConcept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.weight, 0.0);
        assert_eq!(edge.usage_count, edge.success_count + edge.failure_count);
        assert_eq!(edge.usage_count, 110);
    }

    #[tokio::test]
    async fn test_concurrent_feedback_loses_nothing() {
        let f = lightbulb(0.5).await;
        let learner = Arc::new(f.learner);

        let mut handles = Vec::new();
        for i in 0..40 {
            let learner = learner.clone();
            let agent = f.agent;
            handles.push(tokio::spawn(async move {
                learner.record_outcome(agent, "lightbulb", i % 4 != 0).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let edge = f
            .graph
            .edge_between(f.agent, f.concept, EdgeKind::HandlesConcept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.usage_count, 40);
        assert_eq!(edge.success_count, 30);
        assert_eq!(edge.failure_count, 10);
    }

    #[tokio::test]
    async fn test_missing_edge_is_noop() {
        let f = lightbulb(0.5).await;
        let stranger = f
            .graph
            .upsert_node(Node::agent(AgentNode::new("Stranger", "http://x")))
            .await
            .unwrap();

        assert!(f.learner.strengthen(stranger, f.concept).await.unwrap().is_none());
        assert!(f
            .learner
            .record_outcome(f.agent, "no_such_concept", true)
            .await
            .unwrap()
            .is_none());

        let events = f.events.events.lock().await;
        assert_eq!(events[0].event_type(), "feedback_ignored");
    }

    #[tokio::test]
    async fn test_decay_sweep_exact_factor() {
        let f = lightbulb(0.8).await;
        let report = f.learner.decay_sweep().await.unwrap();
        assert_eq!(report.decayed_count, 1);
        assert_eq!(report.policy, DecayPolicy::ActiveWindow);

        let edge = f
            .graph
            .edge_between(f.agent, f.concept, EdgeKind::HandlesConcept)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(edge.weight, 0.8 * (1.0 - DEFAULT_DECAY_RATE));
        assert_eq!(edge.usage_count, 0);
    }

    #[tokio::test]
    async fn test_decay_skips_dormant_edges() {
        let f = lightbulb(0.8).await;
        tokio::time::sleep(Duration::from_millis(50)).await;

        let windowed = f
            .learner
            .decay_sweep_window(Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(windowed.decayed_count, 0);

        let all = f.learner.decay_sweep_window(None).await.unwrap();
        assert_eq!(all.decayed_count, 1);
        assert_eq!(all.policy, DecayPolicy::AllEdges);

        // Decay leaves last_updated alone, so the edge stays dormant
        let again = f
            .learner
            .decay_sweep_window(Some(Duration::from_millis(10)))
            .await
            .unwrap();
        assert_eq!(again.decayed_count, 0);
    }

    #[test]
    fn test_config_validation() {
        let config = HebbianConfig::default();
        config.validate().unwrap();
        assert_eq!(config.active_window(), Duration::from_secs(150 * 60));

        let bad = HebbianConfig {
            decay_rate: 1.0,
            ..HebbianConfig::default()
        };
        assert!(bad.validate().is_err());
    }

    #[tokio::test]
    async fn test_oversized_active_window_is_rejected_not_overflowed() {
        let config = HebbianConfig {
            decay_interval: Duration::from_secs(u64::MAX / 2),
            active_window_intervals: 10,
            ..HebbianConfig::default()
        };
        assert_eq!(config.active_window(), Duration::MAX);
        assert!(config.validate().is_err());

        // Still in u64 range, but beyond any timestamp
        let config = HebbianConfig {
            decay_interval: Duration::from_secs(u64::MAX / 100),
            active_window_intervals: 10,
            ..HebbianConfig::default()
        };
        assert!(config.validate().is_err());

        // A sweep over such a window treats every edge as active
        let f = lightbulb(0.8).await;
        let report = f
            .learner
            .decay_sweep_window(Some(config.active_window()))
            .await
            .unwrap();
        assert_eq!(report.decayed_count, 1);
        assert_eq!(report.policy, DecayPolicy::ActiveWindow);
    }
}
